use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;

use crate::io::offset_index::OffsetIndex;
use crate::io::traits::{ScanAccessError, ScanResult, ScanStore};
use crate::params::{CvRole, Param, ParamDescribed, ParamLike, Unit};
use crate::spectrum::bindata::{ArrayType, BinaryCompressionType, BinaryDataArrayType, DataArray};
use crate::spectrum::{
    DissociationType, MassAnalyzerType, PrecursorInfo, ScanPolarity, ScanRecord, Spectrum,
};

use super::tree::Node;

/// The two root shapes an mzML document may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentVariant {
    /// A plain `<mzML>` root
    Bare,
    /// An `<indexedmzML>` envelope wrapping the `<mzML>` element and a byte offset index
    IndexWrapped,
}

impl Display for DocumentVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The `mzML` element of a document, the shape it was found in, and its
/// offset index when there was one
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub variant: DocumentVariant,
    pub mzml: Node,
    pub offset_index: Option<OffsetIndex>,
}

impl DocumentVariant {
    /// Work out which variant `root` is, trying the index-wrapped shape first
    pub fn resolve(mut root: Node) -> Result<ResolvedDocument, String> {
        match Self::take_index_wrapped(&mut root) {
            Ok(resolved) => return Ok(resolved),
            Err(reason) => debug!("Not an index-wrapped document: {reason}"),
        }
        if root.tag == "mzML" && root.child("run").is_some() {
            return Ok(ResolvedDocument {
                variant: Self::Bare,
                mzml: root,
                offset_index: None,
            });
        }
        Err(format!(
            "expected an <indexedmzML> or <mzML> root with a <run>, found <{}>",
            root.tag
        ))
    }

    fn take_index_wrapped(root: &mut Node) -> Result<ResolvedDocument, String> {
        if root.tag != "indexedmzML" {
            return Err(format!("root element is <{}>", root.tag));
        }
        let offset_index = root
            .children("indexList")
            .first()
            .and_then(|index_list| {
                index_list
                    .children("index")
                    .iter()
                    .find(|idx| idx.attribute("name") == Some("spectrum"))
            })
            .map(read_offset_index);
        let mzml = root
            .children
            .swap_remove("mzML")
            .and_then(|v| v.into_iter().next())
            .ok_or_else(|| "no <mzML> element inside <indexedmzML>".to_string())?;
        if mzml.child("run").is_none() {
            return Err("no <run> element inside <mzML>".to_string());
        }
        Ok(ResolvedDocument {
            variant: Self::IndexWrapped,
            mzml,
            offset_index,
        })
    }
}

fn read_offset_index(index: &Node) -> OffsetIndex {
    let mut offsets = OffsetIndex::new(index.attribute("name").unwrap_or("spectrum").to_string());
    for offset in index.children("offset") {
        let key = offset.attribute("idRef");
        let value = offset.text.as_deref().map(|t| t.trim().parse::<u64>());
        match (key, value) {
            (Some(key), Some(Ok(value))) => {
                offsets.insert(key, value);
            }
            _ => warn!("Skipping malformed offset entry {:?}", offset.attributes),
        }
    }
    offsets
}

fn filter_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]*").unwrap())
}

fn parse_param<T: FromStr>(param: &Param, field: &'static str, index: usize) -> ScanResult<T> {
    param
        .coerce::<T>()
        .map_err(|_| ScanAccessError::InvalidValue {
            field,
            index,
            value: param.value.clone(),
        })
}

fn optional<T>(result: ScanResult<T>) -> ScanResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone)]
enum MzMLSource {
    Path(PathBuf),
    Buffer { name: String, content: Vec<u8> },
}

impl MzMLSource {
    fn name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Buffer { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug)]
struct OpenDocument {
    variant: DocumentVariant,
    mzml: Node,
    offset_index: Option<OffsetIndex>,
    id_to_index: HashMap<String, usize>,
    cache: Vec<Option<ScanRecord>>,
}

impl OpenDocument {
    fn spectra(&self) -> &[Node] {
        self.mzml
            .descend(&["run", "spectrumList"])
            .map(|list| list.children("spectrum"))
            .unwrap_or(&[])
    }
}

/**
A [`ScanStore`] over an mzML document, either bare or wrapped in an `<indexedmzML>`
envelope.

[`ScanStore::open`] reads and parses the whole document into a [`Node`] tree once.
Binary data arrays stay base64 text in that tree until a scan's peaks are requested,
and with [`MzMLScanStore::with_cache`] each decoded [`ScanRecord`] is kept for reuse.

Every accessor takes the 1-based scan index used throughout [`ScanStore`].
*/
#[derive(Debug)]
pub struct MzMLScanStore {
    source: MzMLSource,
    document: Option<OpenDocument>,
    cache_enabled: bool,
}

impl MzMLScanStore {
    /// Create a closed store reading from the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            source: MzMLSource::Path(path.as_ref().to_path_buf()),
            document: None,
            cache_enabled: false,
        }
    }

    /// Create a closed store over an in-memory document. `name` is used in error messages.
    pub fn from_bytes<S: Into<String>>(name: S, content: Vec<u8>) -> Self {
        Self {
            source: MzMLSource::Buffer {
                name: name.into(),
                content,
            },
            document: None,
            cache_enabled: false,
        }
    }

    /// Read all of `reader` into a closed, in-memory store
    pub fn from_reader<S: Into<String>, R: io::Read>(name: S, mut reader: R) -> io::Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(Self::from_bytes(name, content))
    }

    /// Keep each decoded [`ScanRecord`] after its first access
    pub fn with_cache(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        if let Some(doc) = self.document.as_mut() {
            if cache_enabled && doc.cache.is_empty() {
                doc.cache = vec![None; doc.spectra().len()];
            } else if !cache_enabled {
                doc.cache.clear();
            }
        }
        self
    }

    pub fn source_name(&self) -> String {
        self.source.name()
    }

    /// Which root shape the document had, once opened
    pub fn variant(&self) -> Option<DocumentVariant> {
        self.document.as_ref().map(|d| d.variant)
    }

    /// Whether the document was opened and found to be index-wrapped
    pub fn is_indexed(&self) -> bool {
        matches!(self.variant(), Some(DocumentVariant::IndexWrapped))
    }

    /// The spectrum byte offset index read from an index-wrapped document
    pub fn offset_index(&self) -> Option<&OffsetIndex> {
        self.document.as_ref().and_then(|d| d.offset_index.as_ref())
    }

    /// The `mzML` element of the opened document
    pub fn document_root(&self) -> ScanResult<&Node> {
        self.document().map(|d| &d.mzml)
    }

    /// Find the 1-based index of the scan whose native ID is `id`
    pub fn index_of_id(&self, id: &str) -> Option<usize> {
        self.document
            .as_ref()
            .and_then(|d| d.id_to_index.get(id).copied())
    }

    fn document(&self) -> ScanResult<&OpenDocument> {
        self.document.as_ref().ok_or(ScanAccessError::StoreNotOpen)
    }

    fn load(&self) -> ScanResult<Node> {
        let name = self.source.name();
        let parsed = match &self.source {
            MzMLSource::Path(path) => {
                let handle = fs::File::open(path).map_err(|error| {
                    ScanAccessError::SourceUnavailable {
                        source_name: name.clone(),
                        error,
                    }
                })?;
                Node::parse(BufReader::new(handle))
            }
            MzMLSource::Buffer { content, .. } => Node::parse(content.as_slice()),
        };
        parsed.map_err(|e| ScanAccessError::MalformedDocument(format!("{name}: {e}")))
    }

    fn spectrum_node(&self, index: usize) -> ScanResult<&Node> {
        self.check_index(index)?;
        let doc = self.document()?;
        doc.spectra()
            .get(index - 1)
            .ok_or_else(|| ScanAccessError::not_found("spectrum", index))
    }

    /// The first `scanList/scan` of the spectrum
    fn scan_node(&self, index: usize) -> ScanResult<Option<&Node>> {
        Ok(self.spectrum_node(index)?.descend(&["scanList", "scan"]))
    }

    fn precursor_node(&self, index: usize) -> ScanResult<&Node> {
        self.spectrum_node(index)?
            .descend(&["precursorList", "precursor"])
            .ok_or_else(|| ScanAccessError::not_found("precursor", index))
    }

    fn selected_ion_param(
        &self,
        index: usize,
        role: CvRole,
        field: &'static str,
    ) -> ScanResult<&Param> {
        self.precursor_node(index)?
            .descend(&["selectedIonList", "selectedIon"])
            .and_then(|ion| ion.get_param_by_role(role))
            .ok_or_else(|| ScanAccessError::not_found(field, index))
    }

    pub fn spectrum_id(&self, index: usize) -> ScanResult<String> {
        self.spectrum_node(index)?
            .attribute("id")
            .map(|s| s.to_string())
            .ok_or_else(|| ScanAccessError::not_found("spectrum id", index))
    }

    pub fn ms_order(&self, index: usize) -> ScanResult<u8> {
        let param = self
            .spectrum_node(index)?
            .get_param_by_role(CvRole::MsLevel)
            .ok_or_else(|| ScanAccessError::not_found("ms level", index))?;
        let order: u8 = parse_param(param, "ms level", index)?;
        if order < 1 {
            return Err(ScanAccessError::InvalidValue {
                field: "ms level",
                index,
                value: param.value.clone(),
            });
        }
        Ok(order)
    }

    /// The scan polarity, from the spectrum's parameters or those of its first scan
    pub fn polarity(&self, index: usize) -> ScanResult<ScanPolarity> {
        let roles = [CvRole::PositiveScan, CvRole::NegativeScan];
        let spectrum = self.spectrum_node(index)?;
        spectrum
            .find_param_by_roles(&roles)
            .or_else(|| {
                spectrum
                    .descend(&["scanList", "scan"])
                    .and_then(|scan| scan.find_param_by_roles(&roles))
            })
            .and_then(|(role, _)| ScanPolarity::from_role(role))
            .ok_or_else(|| ScanAccessError::not_found("polarity", index))
    }

    pub fn is_centroid(&self, index: usize) -> ScanResult<bool> {
        self.spectrum_node(index)?
            .find_param_by_roles(&[CvRole::CentroidSpectrum, CvRole::ProfileSpectrum])
            .map(|(role, _)| role == CvRole::CentroidSpectrum)
            .ok_or_else(|| ScanAccessError::not_found("spectrum representation", index))
    }

    /**
    The scan start time of the first scan, in minutes.

    A scan with no parameters at all yields `NaN`, as does a spectrum with no scan list.
    A scan with parameters but no start time, or one whose start time is negative, is
    reported as [`ScanAccessError::NotFound`]. A start time written as `NaN` is read as `NaN`.
    */
    pub fn retention_time(&self, index: usize) -> ScanResult<f64> {
        let scan = match self.scan_node(index)? {
            Some(scan) if !scan.params.is_empty() => scan,
            _ => return Ok(f64::NAN),
        };
        let param = scan
            .get_param_by_role(CvRole::ScanStartTime)
            .ok_or_else(|| ScanAccessError::not_found("retention time", index))?;
        let value: f64 = parse_param(param, "retention time", index)?;
        let value = match param.unit {
            Unit::Second => value / 60.0,
            Unit::Millisecond => value / 60000.0,
            _ => value,
        };
        // A NaN start time is how an unknown time is written back out
        if value >= 0.0 || value.is_nan() {
            Ok(value)
        } else {
            Err(ScanAccessError::not_found("retention time", index))
        }
    }

    /// The lowest and highest observed m/z
    pub fn mz_range(&self, index: usize) -> ScanResult<(f64, f64)> {
        let spectrum = self.spectrum_node(index)?;
        let low = spectrum
            .get_param_by_role(CvRole::LowestObservedMz)
            .ok_or_else(|| ScanAccessError::not_found("lowest observed m/z", index))?;
        let high = spectrum
            .get_param_by_role(CvRole::HighestObservedMz)
            .ok_or_else(|| ScanAccessError::not_found("highest observed m/z", index))?;
        Ok((
            parse_param(low, "lowest observed m/z", index)?,
            parse_param(high, "highest observed m/z", index)?,
        ))
    }

    /// The distance between the upper and lower isolation window offset values
    pub fn isolation_width(&self, index: usize) -> ScanResult<f64> {
        let window = self
            .precursor_node(index)?
            .child("isolationWindow")
            .ok_or_else(|| ScanAccessError::not_found("isolation window", index))?;
        let low = window
            .get_param_by_role(CvRole::IsolationWindowLowerOffset)
            .ok_or_else(|| ScanAccessError::not_found("isolation window lower offset", index))?;
        let high = window
            .get_param_by_role(CvRole::IsolationWindowUpperOffset)
            .ok_or_else(|| ScanAccessError::not_found("isolation window upper offset", index))?;
        let low: f64 = parse_param(low, "isolation window lower offset", index)?;
        let high: f64 = parse_param(high, "isolation window upper offset", index)?;
        Ok(high - low)
    }

    /// The isolation window target m/z
    pub fn isolation_mz(&self, index: usize) -> ScanResult<f64> {
        let param = self
            .precursor_node(index)?
            .child("isolationWindow")
            .and_then(|window| window.get_param_by_role(CvRole::IsolationWindowTargetMz))
            .ok_or_else(|| ScanAccessError::not_found("isolation window target m/z", index))?;
        parse_param(param, "isolation window target m/z", index)
    }

    /// The dissociation method of the first precursor's activation. A method this crate
    /// does not enumerate is [`DissociationType::Unknown`].
    pub fn dissociation_type(&self, index: usize) -> ScanResult<DissociationType> {
        let precursor = self.precursor_node(index)?;
        let dissociation = precursor
            .child("activation")
            .and_then(|activation| activation.find_param_by_roles(CvRole::DISSOCIATION))
            .map(|(role, _)| DissociationType::from_role(role))
            .unwrap_or(DissociationType::Unknown);
        Ok(dissociation)
    }

    pub fn scan_filter(&self, index: usize) -> ScanResult<String> {
        self.scan_node(index)?
            .and_then(|scan| scan.param_value(CvRole::FilterString))
            .map(|s| s.to_string())
            .ok_or_else(|| ScanAccessError::not_found("filter string", index))
    }

    /// Ion injection time in milliseconds
    pub fn injection_time(&self, index: usize) -> ScanResult<f64> {
        let param = self
            .scan_node(index)?
            .and_then(|scan| scan.get_param_by_role(CvRole::IonInjectionTime))
            .ok_or_else(|| ScanAccessError::not_found("ion injection time", index))?;
        parse_param(param, "ion injection time", index)
    }

    /**
    The mass analyzer that acquired scan `index`.

    The leading letters of the filter string are checked first. When they do not name an
    analyzer, the first instrument configuration's analyzer is used instead.
    */
    pub fn analyzer(&self, index: usize) -> ScanResult<MassAnalyzerType> {
        if let Some(filter) = optional(self.scan_filter(index))? {
            let token = filter_token_pattern()
                .find(&filter)
                .map(|m| m.as_str())
                .unwrap_or_default();
            match token {
                "ITMS" => return Ok(MassAnalyzerType::IonTrap2D),
                "TOFMS" => return Ok(MassAnalyzerType::TOF),
                "FTMS" => return Ok(MassAnalyzerType::Orbitrap),
                "Sector" => return Ok(MassAnalyzerType::Sector),
                "TQMS" | "SQMS" => {
                    return Err(ScanAccessError::MalformedDocument(format!(
                        "unsupported analyzer token {token:?} in filter string of scan {index}"
                    )))
                }
                _ => {}
            }
        }
        self.configured_analyzer()
            .map_err(|_| ScanAccessError::not_found("instrument configuration", index))
    }

    /// The analyzer declared by the first instrument configuration
    pub fn configured_analyzer(&self) -> ScanResult<MassAnalyzerType> {
        let config = self
            .document()?
            .mzml
            .descend(&["instrumentConfigurationList", "instrumentConfiguration"])
            .ok_or_else(|| ScanAccessError::not_found("instrument configuration", 0))?;
        let declared = config.find_param_by_roles(CvRole::ANALYZER).or_else(|| {
            config.child("componentList").and_then(|components| {
                components
                    .children("analyzer")
                    .iter()
                    .find_map(|analyzer| analyzer.find_param_by_roles(CvRole::ANALYZER))
            })
        });
        match declared {
            Some((role, _)) => Ok(MassAnalyzerType::from_role(role)),
            None => {
                warn!(
                    "Instrument configuration {:?} declares no recognized analyzer",
                    config.attribute("id")
                );
                Ok(MassAnalyzerType::Unknown)
            }
        }
    }

    pub fn precursor_id(&self, index: usize) -> ScanResult<String> {
        self.precursor_node(index)?
            .attribute("spectrumRef")
            .map(|s| s.to_string())
            .ok_or_else(|| ScanAccessError::not_found("precursor spectrum reference", index))
    }

    pub fn precursor_charge(&self, index: usize) -> ScanResult<i32> {
        let param = self.selected_ion_param(index, CvRole::ChargeState, "precursor charge")?;
        parse_param(param, "precursor charge", index)
    }

    /// The selected ion m/z, taken as the precursor's monoisotopic m/z
    pub fn precursor_mz(&self, index: usize) -> ScanResult<f64> {
        let param = self.selected_ion_param(index, CvRole::SelectedIonMz, "precursor m/z")?;
        parse_param(param, "precursor m/z", index)
    }

    pub fn precursor_intensity(&self, index: usize) -> ScanResult<f64> {
        let param =
            self.selected_ion_param(index, CvRole::PeakIntensity, "precursor intensity")?;
        parse_param(param, "precursor intensity", index)
    }

    /// The 1-based index of the scan named by this scan's precursor reference
    pub fn parent_index(&self, index: usize) -> ScanResult<usize> {
        let precursor_id = self.precursor_id(index)?;
        self.index_of_id(&precursor_id)
            .ok_or_else(|| ScanAccessError::not_found("parent scan", index))
    }

    fn data_array(node: &Node) -> DataArray {
        let compression = if node.has_param(CvRole::ZlibCompression) {
            BinaryCompressionType::Zlib
        } else {
            BinaryCompressionType::NoCompression
        };
        let dtype = match node.find_param_by_roles(&[CvRole::Float32, CvRole::Float64]) {
            Some((CvRole::Float64, _)) => BinaryDataArrayType::Float64,
            _ => BinaryDataArrayType::Float32,
        };
        let name = node
            .find_param_by_roles(&[CvRole::MzArray, CvRole::IntensityArray])
            .and_then(|(role, _)| ArrayType::from_role(role))
            .unwrap_or_default();
        let data = node
            .child("binary")
            .and_then(|b| b.text.clone())
            .unwrap_or_default();
        DataArray::new(data, dtype, compression, name)
    }

    fn read_array(&self, index: usize, array_type: ArrayType) -> ScanResult<Vec<f64>> {
        let field = match array_type {
            ArrayType::MZArray => "m/z array",
            ArrayType::IntensityArray => "intensity array",
            ArrayType::Unknown => "data array",
        };
        let array = self
            .spectrum_node(index)?
            .child("binaryDataArrayList")
            .map(|list| list.children("binaryDataArray"))
            .unwrap_or(&[])
            .iter()
            .map(Self::data_array)
            .find(|array| array.name == array_type)
            .ok_or_else(|| ScanAccessError::not_found(field, index))?;
        Ok(array.to_f64()?)
    }

    /// Decode the m/z array of scan `index`
    pub fn masses(&self, index: usize) -> ScanResult<Vec<f64>> {
        self.read_array(index, ArrayType::MZArray)
    }

    /// Decode the intensity array of scan `index`
    pub fn intensities(&self, index: usize) -> ScanResult<Vec<f64>> {
        self.read_array(index, ArrayType::IntensityArray)
    }

    fn read_spectrum(&self, index: usize) -> ScanResult<Spectrum> {
        let masses = self.masses(index)?;
        let intensities = self.intensities(index)?;
        if masses.len() != intensities.len() {
            return Err(ScanAccessError::MalformedDocument(format!(
                "scan {index} has {} m/z values but {} intensities",
                masses.len(),
                intensities.len()
            )));
        }
        if masses.windows(2).all(|w| w[0] <= w[1]) {
            Spectrum::new(masses, intensities)
                .map_err(|e| ScanAccessError::MalformedDocument(e.to_string()))
        } else {
            warn!("The m/z array of scan {index} is not sorted, sorting it");
            Ok(Spectrum::from_unsorted(masses.into_iter().zip(intensities)))
        }
    }

    fn read_precursor(&self, index: usize) -> ScanResult<PrecursorInfo> {
        let mut precursor = PrecursorInfo::new(
            self.precursor_id(index)?,
            self.precursor_mz(index)?,
            self.precursor_charge(index)?,
            self.precursor_intensity(index)?,
        );
        precursor.isolation_mz = optional(self.isolation_mz(index))?;
        precursor.isolation_width = optional(self.isolation_width(index))?;
        precursor.dissociation = self.dissociation_type(index)?;
        precursor.parent_index = optional(self.parent_index(index))?;
        Ok(precursor)
    }

    fn build_record(&self, index: usize) -> ScanResult<ScanRecord> {
        let ms_order = self.ms_order(index)?;
        let precursor = if ms_order >= 2 {
            Some(self.read_precursor(index)?)
        } else {
            None
        };
        Ok(ScanRecord {
            index,
            id: self.spectrum_id(index)?,
            ms_order,
            centroid: self.is_centroid(index)?,
            polarity: self.polarity(index)?,
            retention_time: self.retention_time(index)?,
            mz_range: optional(self.mz_range(index))?,
            scan_filter: optional(self.scan_filter(index))?,
            injection_time: optional(self.injection_time(index))?,
            precursor,
            spectrum: self.read_spectrum(index)?,
        })
    }

    fn cached(&self, index: usize) -> Option<&ScanRecord> {
        self.document
            .as_ref()
            .and_then(|d| d.cache.get(index.checked_sub(1)?))
            .and_then(|slot| slot.as_ref())
    }
}

impl ScanStore for MzMLScanStore {
    fn open(&mut self) -> ScanResult<()> {
        if self.document.is_some() {
            return Ok(());
        }
        let root = self.load()?;
        let resolved = DocumentVariant::resolve(root).map_err(|reason| {
            ScanAccessError::MalformedDocument(format!("{}: {reason}", self.source.name()))
        })?;
        let mut doc = OpenDocument {
            variant: resolved.variant,
            mzml: resolved.mzml,
            offset_index: resolved.offset_index,
            id_to_index: HashMap::new(),
            cache: Vec::new(),
        };
        let n_spectra = doc.spectra().len();
        let id_to_index: HashMap<String, usize> = doc
            .spectra()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.attribute("id").map(|id| (id.to_string(), i + 1)))
            .collect();
        doc.id_to_index = id_to_index;
        if let Some(count) = doc
            .mzml
            .descend(&["run", "spectrumList"])
            .and_then(|list| list.attribute("count"))
            .and_then(|c| c.parse::<usize>().ok())
        {
            if count != n_spectra {
                warn!(
                    "spectrumList declares {count} spectra but {n_spectra} were found in {}",
                    self.source.name()
                );
            }
        }
        if self.cache_enabled {
            doc.cache = vec![None; n_spectra];
        }
        debug!(
            "Opened {} as a {} document with {} spectra",
            self.source.name(),
            doc.variant,
            n_spectra
        );
        self.document = Some(doc);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.document.is_some()
    }

    fn first_index(&self) -> ScanResult<usize> {
        self.document().map(|_| 1)
    }

    fn last_index(&self) -> ScanResult<usize> {
        self.document().map(|d| d.spectra().len())
    }

    fn scan(&mut self, index: usize) -> ScanResult<ScanRecord> {
        self.check_index(index)?;
        if let Some(record) = self.cached(index) {
            return Ok(record.clone());
        }
        let record = self.build_record(index)?;
        if let Some(slot) = self
            .document
            .as_mut()
            .and_then(|d| d.cache.get_mut(index - 1))
        {
            *slot = Some(record.clone());
        }
        Ok(record)
    }

    fn spectrum(&mut self, index: usize) -> ScanResult<Spectrum> {
        self.check_index(index)?;
        if let Some(record) = self.cached(index) {
            return Ok(record.spectrum.clone());
        }
        self.read_spectrum(index)
    }

    fn retention_time_of(&mut self, index: usize) -> ScanResult<f64> {
        self.retention_time(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub(crate) const TINY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<indexedmzML xmlns="http://psi.hupo.org/ms/mzml">
  <mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
    <instrumentConfigurationList count="1">
      <instrumentConfiguration id="IC1">
        <cvParam cvRef="MS" accession="MS:1000449" name="LTQ Orbitrap" value=""/>
        <componentList count="2">
          <source order="1"/>
          <analyzer order="2">
            <cvParam cvRef="MS" accession="MS:1000484" name="orbitrap" value=""/>
          </analyzer>
        </componentList>
      </instrumentConfiguration>
    </instrumentConfigurationList>
    <run id="run1">
      <spectrumList count="2">
        <spectrum id="scan=1" index="0" defaultArrayLength="2">
          <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="1"/>
          <cvParam cvRef="MS" accession="MS:1000128" name="profile spectrum" value=""/>
          <cvParam cvRef="MS" accession="MS:1000130" name="positive scan" value=""/>
          <cvParam cvRef="MS" accession="MS:1000528" name="lowest observed m/z" value="100"/>
          <cvParam cvRef="MS" accession="MS:1000527" name="highest observed m/z" value="200"/>
          <scanList count="1">
            <scan>
              <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="90" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
              <cvParam cvRef="MS" accession="MS:1000512" name="filter string" value="FTMS + p NSI Full ms [100.00-200.00]"/>
              <cvParam cvRef="MS" accession="MS:1000927" name="ion injection time" value="12.5" unitCvRef="UO" unitAccession="UO:0000028" unitName="millisecond"/>
            </scan>
          </scanList>
          <binaryDataArrayList count="2">
            <binaryDataArray encodedLength="24">
              <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
              <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
              <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" value=""/>
              <binary>AAAAAAAAWUAAAAAAAABpQA==</binary>
            </binaryDataArray>
            <binaryDataArray encodedLength="12">
              <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float" value=""/>
              <cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>
              <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value=""/>
              <binary>AAAgQQAAoEE=</binary>
            </binaryDataArray>
          </binaryDataArrayList>
        </spectrum>
        <spectrum id="scan=2" index="1" defaultArrayLength="0">
          <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="2"/>
          <cvParam cvRef="MS" accession="MS:1000127" name="centroid spectrum" value=""/>
          <cvParam cvRef="MS" accession="MS:1000129" name="negative scan" value=""/>
          <scanList count="1">
            <scan>
              <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="1.75" unitCvRef="UO" unitAccession="UO:0000031" unitName="minute"/>
              <cvParam cvRef="MS" accession="MS:1000512" name="filter string" value="TQMS - c NSI"/>
            </scan>
          </scanList>
          <precursorList count="1">
            <precursor spectrumRef="scan=1">
              <isolationWindow>
                <cvParam cvRef="MS" accession="MS:1000827" name="isolation window target m/z" value="150.5"/>
                <cvParam cvRef="MS" accession="MS:1000828" name="isolation window lower offset" value="0.5"/>
                <cvParam cvRef="MS" accession="MS:1000829" name="isolation window upper offset" value="1.5"/>
              </isolationWindow>
              <selectedIonList count="1">
                <selectedIon>
                  <cvParam cvRef="MS" accession="MS:1000744" name="selected ion m/z" value="150.5"/>
                  <cvParam cvRef="MS" accession="MS:1000041" name="charge state" value="-2"/>
                  <cvParam cvRef="MS" accession="MS:1000042" name="peak intensity" value="1000"/>
                </selectedIon>
              </selectedIonList>
              <activation>
                <cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="35"/>
                <cvParam cvRef="MS" accession="MS:1000598" name="electron transfer dissociation" value=""/>
              </activation>
            </precursor>
          </precursorList>
          <binaryDataArrayList count="2">
            <binaryDataArray encodedLength="0">
              <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
              <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" value=""/>
              <binary></binary>
            </binaryDataArray>
            <binaryDataArray encodedLength="0">
              <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>
              <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value=""/>
              <binary></binary>
            </binaryDataArray>
          </binaryDataArrayList>
        </spectrum>
      </spectrumList>
    </run>
  </mzML>
  <indexList count="1">
    <index name="spectrum">
      <offset idRef="scan=1">400</offset>
      <offset idRef="scan=2">4000</offset>
    </index>
  </indexList>
  <indexListOffset>5000</indexListOffset>
</indexedmzML>"#;

    fn open_tiny() -> MzMLScanStore {
        let mut store = MzMLScanStore::from_bytes("tiny", TINY.as_bytes().to_vec());
        store.open().unwrap();
        store
    }

    #[test_log::test]
    fn test_open_lifecycle() {
        let mut store = MzMLScanStore::from_bytes("tiny", TINY.as_bytes().to_vec());
        assert!(!store.is_open());
        assert!(!store.is_indexed());
        assert!(matches!(store.first_index(), Err(ScanAccessError::StoreNotOpen)));
        store.open().unwrap();
        assert!(store.is_open());
        assert!(store.is_indexed());
        store.open().unwrap();
        assert_eq!(store.first_index().unwrap(), 1);
        assert_eq!(store.last_index().unwrap(), 2);
        assert_eq!(store.offset_index().unwrap().get("scan=2"), Some(4000));
    }

    #[test_log::test]
    fn test_missing_and_malformed_sources() {
        let mut store = MzMLScanStore::new("/definitely/not/here.mzML");
        assert!(matches!(
            store.open(),
            Err(ScanAccessError::SourceUnavailable { .. })
        ));

        let mut store = MzMLScanStore::from_bytes("junk", b"<mzML><run>".to_vec());
        assert!(matches!(
            store.open(),
            Err(ScanAccessError::MalformedDocument(_))
        ));

        let mut store = MzMLScanStore::from_bytes("wrong", b"<mzIdentML/>".to_vec());
        match store.open() {
            Err(ScanAccessError::MalformedDocument(msg)) => assert!(msg.contains("wrong")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test_log::test]
    fn test_bare_variant() {
        let start = TINY.find("<mzML ").unwrap();
        let end = TINY.find("</mzML>").unwrap() + "</mzML>".len();
        let bare = &TINY[start..end];
        let mut store = MzMLScanStore::from_bytes("bare", bare.as_bytes().to_vec());
        store.open().unwrap();
        assert_eq!(store.variant(), Some(DocumentVariant::Bare));
        assert!(!store.is_indexed());
        assert!(store.offset_index().is_none());

        let mut indexed = open_tiny();
        for i in 1..=2 {
            assert_eq!(store.scan(i).unwrap(), indexed.scan(i).unwrap());
        }
    }

    #[test_log::test]
    fn test_survey_scan() {
        let mut store = open_tiny();
        assert_eq!(store.ms_order(1).unwrap(), 1);
        assert!(!store.is_centroid(1).unwrap());
        assert_eq!(store.polarity(1).unwrap(), ScanPolarity::Positive);
        assert_eq!(store.retention_time(1).unwrap(), 1.5);
        assert_eq!(store.mz_range(1).unwrap(), (100.0, 200.0));
        assert_eq!(store.injection_time(1).unwrap(), 12.5);
        assert_eq!(store.masses(1).unwrap(), vec![100.0, 200.0]);
        assert_eq!(store.intensities(1).unwrap(), vec![10.0, 20.0]);
        assert_eq!(store.analyzer(1).unwrap(), MassAnalyzerType::Orbitrap);

        let record = store.scan(1).unwrap();
        assert_eq!(record.id, "scan=1");
        assert!(record.precursor.is_none());
        assert_eq!(record.spectrum.masses(), &[100.0, 200.0]);

        for result in [
            store.precursor_mz(1).map(|_| ()),
            store.precursor_charge(1).map(|_| ()),
            store.precursor_intensity(1).map(|_| ()),
            store.precursor_id(1).map(|_| ()),
            store.isolation_width(1).map(|_| ()),
            store.dissociation_type(1).map(|_| ()),
        ] {
            assert!(result.unwrap_err().is_not_found());
        }
    }

    #[test_log::test]
    fn test_product_scan() {
        let mut store = open_tiny();
        assert_eq!(store.ms_order(2).unwrap(), 2);
        assert_eq!(store.retention_time(2).unwrap(), 1.75);
        assert_eq!(store.polarity(2).unwrap(), ScanPolarity::Negative);
        assert_eq!(store.precursor_charge(2).unwrap(), -2);
        assert_eq!(store.isolation_width(2).unwrap(), 1.0);
        assert_eq!(
            store.dissociation_type(2).unwrap(),
            DissociationType::ETD
        );
        assert!(store.mz_range(2).unwrap_err().is_not_found());
        assert!(matches!(
            store.analyzer(2),
            Err(ScanAccessError::MalformedDocument(_))
        ));

        let record = store.scan(2).unwrap();
        let precursor = record.precursor.unwrap();
        assert_eq!(precursor.precursor_id, "scan=1");
        assert_eq!(precursor.mz, 150.5);
        assert_eq!(precursor.intensity, 1000.0);
        assert_eq!(precursor.isolation_mz, Some(150.5));
        assert_eq!(precursor.parent_index, Some(1));
        assert!(record.spectrum.is_empty());
        assert_eq!(record.mz_range, None);
    }

    #[test_log::test]
    fn test_bounds_and_lookup() {
        let mut store = open_tiny().with_cache(true);
        assert!(matches!(
            store.scan(0),
            Err(ScanAccessError::IndexOutOfRange { index: 0, first: 1, last: 2 })
        ));
        assert!(matches!(
            store.scan(3),
            Err(ScanAccessError::IndexOutOfRange { .. })
        ));
        let first = store.scan(1).unwrap();
        assert_eq!(store.scan(1).unwrap(), first);
        assert_eq!(store.spectrum(1).unwrap(), first.spectrum);

        assert_eq!(store.index_for_retention_time(1.75).unwrap(), 2);
        assert!(matches!(
            store.index_for_retention_time(1.7),
            Err(ScanAccessError::RetentionTimeNotFound(_))
        ));
        assert_eq!(store.index_of_id("scan=2"), Some(2));

        let records: Vec<_> = store.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test_log::test]
    fn test_retention_time_soft_default() {
        let mut doc = TINY.to_string();
        for line in [
            r#"<cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="90" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>"#,
            r#"<cvParam cvRef="MS" accession="MS:1000512" name="filter string" value="FTMS + p NSI Full ms [100.00-200.00]"/>"#,
            r#"<cvParam cvRef="MS" accession="MS:1000927" name="ion injection time" value="12.5" unitCvRef="UO" unitAccession="UO:0000028" unitName="millisecond"/>"#,
        ] {
            doc = doc.replace(line, "");
        }
        let mut store = MzMLScanStore::from_bytes("no-time", doc.into_bytes());
        store.open().unwrap();
        assert!(store.retention_time(1).unwrap().is_nan());
        assert!(store.scan(1).unwrap().retention_time.is_nan());
        // With no filter string, the instrument configuration decides
        assert_eq!(store.analyzer(1).unwrap(), MassAnalyzerType::Orbitrap);
    }

    #[test_log::test]
    fn test_lookup_skips_untimed_scans() {
        // Scan 1 keeps its filter string, so its time is missing rather than unknown
        let doc = TINY.replace(
            r#"<cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="90" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>"#,
            "",
        );
        let mut store = MzMLScanStore::from_bytes("untimed", doc.into_bytes());
        store.open().unwrap();
        assert!(store.retention_time(1).unwrap_err().is_not_found());
        assert_eq!(store.index_for_retention_time(1.75).unwrap(), 2);
        assert!(matches!(
            store.index_for_retention_time(1.5),
            Err(ScanAccessError::RetentionTimeNotFound(_))
        ));
    }

    #[test_log::test]
    fn test_ms_level_below_one() {
        let doc = TINY.replacen(
            r#"name="ms level" value="1""#,
            r#"name="ms level" value="0""#,
            1,
        );
        let mut store = MzMLScanStore::from_bytes("level-zero", doc.into_bytes());
        store.open().unwrap();
        assert!(matches!(
            store.ms_order(1),
            Err(ScanAccessError::InvalidValue { field: "ms level", index: 1, .. })
        ));
        assert!(store.scan(1).is_err());
        assert_eq!(store.ms_order(2).unwrap(), 2);
    }

    #[test_log::test]
    fn test_zlib_array() {
        let compressed = DataArray::from_f64_compressed(ArrayType::MZArray, &[100.0, 200.0]).unwrap();
        let doc = TINY
            .replace("AAAAAAAAWUAAAAAAAABpQA==", &compressed.data)
            .replacen(
                r#"<cvParam cvRef="MS" accession="MS:1000576" name="no compression" value=""/>"#,
                r#"<cvParam cvRef="MS" accession="MS:1000574" name="zlib compression" value=""/>"#,
                1,
            );
        let mut store = MzMLScanStore::from_bytes("zlib", doc.into_bytes());
        store.open().unwrap();
        assert_eq!(store.masses(1).unwrap(), vec![100.0, 200.0]);
        assert_eq!(store.spectrum(1).unwrap().intensities(), &[10.0, 20.0]);
    }
}
