use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;
use thiserror::Error;

use crate::io::offset_index::OffsetIndex;
use crate::io::traits::{ScanAccessError, ScanStore};
use crate::io::utils::MD5HashingStream;
use crate::params::{ControlledVocabulary, CvRole, ParamDescribed, Unit};
use crate::spectrum::bindata::{encoded_length, ArrayType, DataArray};
use crate::spectrum::ScanRecord;

use super::tree::{param_element, start_element, text_event, Node};

const BUFFER_SIZE: usize = 10000;

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::new($e)
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let key = $name.as_bytes();
        let value = $value.as_bytes();
        $elt.push_attribute((key, value));
    };
}

macro_rules! start_event {
    ($handle:ident, $target:ident) => {
        $handle.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($handle:ident, $target:ident) => {
        $handle.write_event(Event::End($target.to_end()))?;
    };
}

/// All the ways writing a document can fail
#[derive(Debug, Error)]
pub enum MzMLWriterError {
    #[error("An XML error occurred while writing: {0}")]
    XMLError(#[from] XMLError),
    #[error("An IO error occurred while writing: {0}")]
    IOError(#[from] io::Error),
    #[error("Scan {index} cannot be written: {reason}")]
    InvalidScan { index: usize, reason: String },
    #[error("Failed to read from the scan store: {0}")]
    StoreError(#[from] ScanAccessError),
}

impl From<MzMLWriterError> for io::Error {
    fn from(value: MzMLWriterError) -> Self {
        match value {
            MzMLWriterError::IOError(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

pub type WriterResult = Result<(), MzMLWriterError>;

/// The provenance written into each document's software and data processing lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub software_id: String,
    pub software_version: String,
    pub data_processing_id: String,
    /// The number of spaces each nesting level is indented by
    pub indent: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            software_id: "mzstore".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            data_processing_id: "mzstore_processing".to_string(),
            indent: 2,
        }
    }
}

type XMLHandle<W> = Writer<MD5HashingStream<BufWriter<W>>>;

/**
Writes the contents of any [`ScanStore`] as an indexed mzML document.

Every scan is read and checked before the first byte is written, so a store holding
an inconsistent record produces [`MzMLWriterError::InvalidScan`] and no output. The
document is then assembled as a [`Node`] tree and serialized in one pass, recording
the byte offset of each `<spectrum>` and `<chromatogram>` start tag for the trailing
index. The file checksum is an MD5 digest of everything before it.

Arrays are always written as uncompressed 64-bit floats.
*/
#[derive(Debug, Clone, Default)]
pub struct MzMLWriter {
    pub config: WriterConfig,
    spectrum_offsets: OffsetIndex,
    chromatogram_offsets: OffsetIndex,
}

impl MzMLWriter {
    const PSIMS_VERSION: &'static str = "4.1.57";
    const UNIT_VERSION: &'static str = "releases/2020-03-10";
    const MZML_VERSION: &'static str = "1.1.0";

    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            spectrum_offsets: OffsetIndex::new("spectrum".into()),
            chromatogram_offsets: OffsetIndex::new("chromatogram".into()),
        }
    }

    /// The spectrum offsets recorded by the most recent write
    pub fn spectrum_offsets(&self) -> &OffsetIndex {
        &self.spectrum_offsets
    }

    /// The chromatogram offsets recorded by the most recent write
    pub fn chromatogram_offsets(&self) -> &OffsetIndex {
        &self.chromatogram_offsets
    }

    /// Write every scan of `store` to `sink`, opening the store first if needed
    pub fn write_store<S: ScanStore, W: Write>(&mut self, store: &mut S, sink: W) -> WriterResult {
        let records = Self::collect_records(store)?;
        self.write_records(&records, sink)
    }

    /// Write every scan of `store` to a new file at `path`. The file is only created
    /// once every scan has been read and checked.
    pub fn write_to_path<S: ScanStore, P: AsRef<Path>>(
        &mut self,
        store: &mut S,
        path: P,
    ) -> WriterResult {
        let records = Self::collect_records(store)?;
        let handle = fs::File::create(path.as_ref())?;
        self.write_records(&records, handle)
    }

    fn write_records<W: Write>(&mut self, records: &[ScanRecord], sink: W) -> WriterResult {
        let document = self.build_document(records);
        self.spectrum_offsets = OffsetIndex::new("spectrum".into());
        self.chromatogram_offsets = OffsetIndex::new("chromatogram".into());

        let stream = MD5HashingStream::new(BufWriter::with_capacity(BUFFER_SIZE, sink));
        let mut handle = Writer::new_with_indent(stream, b' ', self.config.indent);
        handle.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut indexed = bstart!("indexedmzML");
        indexed.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
        indexed.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        indexed.push_attribute((
            "xsi:schemaLocation",
            "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.2_idx.xsd",
        ));
        start_event!(handle, indexed);
        self.write_node(&mut handle, &document)?;
        self.write_index_list(&mut handle)?;
        end_event!(handle, indexed);

        let mut inner = handle.into_inner().into_inner();
        inner.flush()?;
        debug!(
            "Wrote {} spectra and {} chromatograms",
            self.spectrum_offsets.len(),
            self.chromatogram_offsets.len()
        );
        Ok(())
    }

    /// Write `store` to `<out_dir>/<stem of source_path>.mzML`, returning the path written
    pub fn write_beside<S: ScanStore, P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        store: &mut S,
        source_path: P,
        out_dir: Q,
    ) -> Result<PathBuf, MzMLWriterError> {
        let stem = source_path.as_ref().file_stem().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", source_path.as_ref().display()),
            )
        })?;
        let destination = out_dir
            .as_ref()
            .join(format!("{}.mzML", stem.to_string_lossy()));
        self.write_to_path(store, &destination)?;
        Ok(destination)
    }

    fn collect_records<S: ScanStore>(store: &mut S) -> Result<Vec<ScanRecord>, MzMLWriterError> {
        if !store.is_open() {
            store.open()?;
        }
        let records: Vec<ScanRecord> = store.iter().collect::<Result<_, _>>()?;
        for record in records.iter() {
            Self::validate(record)?;
        }
        Ok(records)
    }

    fn validate(record: &ScanRecord) -> WriterResult {
        let invalid = |reason: String| {
            Err(MzMLWriterError::InvalidScan {
                index: record.index,
                reason,
            })
        };
        let masses = record.spectrum.masses();
        let intensities = record.spectrum.intensities();
        if masses.len() != intensities.len() {
            return invalid(format!(
                "{} m/z values but {} intensities",
                masses.len(),
                intensities.len()
            ));
        }
        if let Some(i) = masses.windows(2).position(|w| w[0] > w[1]) {
            return invalid(format!("m/z values decrease at position {}", i + 1));
        }
        if record.ms_order < 1 {
            return invalid(format!("MS order {} is below 1", record.ms_order));
        }
        if !record.precursor_consistent() {
            return invalid(format!(
                "MS order {} with{} a precursor",
                record.ms_order,
                if record.precursor.is_some() { "" } else { "out" }
            ));
        }
        Ok(())
    }

    fn build_cv_list(&self) -> Node {
        let ms = Node::new("cv")
            .with_attribute("id", "MS")
            .with_attribute("fullName", "PSI-MS")
            .with_attribute("URI", "http://purl.obolibrary.org/obo/ms.obo")
            .with_attribute("version", Self::PSIMS_VERSION);
        let uo = Node::new("cv")
            .with_attribute("id", "UO")
            .with_attribute("fullName", "UNIT-ONTOLOGY")
            .with_attribute("URI", "http://ontologies.berkeleybop.org/uo.obo")
            .with_attribute("version", Self::UNIT_VERSION);
        Node::new("cvList")
            .with_attribute("count", 2)
            .with_child(ms)
            .with_child(uo)
    }

    fn build_header(&self, mzml: &mut Node) {
        let config = &self.config;
        mzml.push_child(self.build_cv_list());

        let file_content = Node::new("fileContent")
            .with_param(CvRole::MS1Spectrum.to_param())
            .with_param(CvRole::MSnSpectrum.to_param());
        mzml.push_child(Node::new("fileDescription").with_child(file_content));

        let software = Node::new("software")
            .with_attribute("id", &config.software_id)
            .with_attribute("version", &config.software_version)
            .with_param(CvRole::CustomSoftware.to_param_val(&config.software_id));
        mzml.push_child(
            Node::new("softwareList")
                .with_attribute("count", 1)
                .with_child(software),
        );

        mzml.push_child(
            Node::new("instrumentConfigurationList")
                .with_attribute("count", 1)
                .with_child(Node::new("instrumentConfiguration").with_attribute("id", "IC1")),
        );

        let method = Node::new("processingMethod")
            .with_attribute("order", 0)
            .with_attribute("softwareRef", &config.software_id)
            .with_param(ControlledVocabulary::MS.param(1000544, "Conversion to mzML"));
        mzml.push_child(
            Node::new("dataProcessingList")
                .with_attribute("count", 1)
                .with_child(
                    Node::new("dataProcessing")
                        .with_attribute("id", &config.data_processing_id)
                        .with_child(method),
                ),
        );
    }

    fn build_binary_array(name: ArrayType, values: &[f64]) -> Node {
        let array = DataArray::from_f64(name, values);
        let byte_length = std::mem::size_of_val(values);
        let mut node = Node::new("binaryDataArray")
            .with_attribute("encodedLength", encoded_length(byte_length))
            .with_param(array.dtype.role().to_param())
            .with_param(array.compression.role().to_param());
        if let Some(role) = name.role() {
            let param = match name {
                ArrayType::MZArray => role.to_param().with_unit_t(&Unit::MZ),
                _ => role.to_param().with_unit_t(&Unit::DetectorCounts),
            };
            node.add_param(param);
        }
        let mut binary = Node::new("binary");
        if !array.data.is_empty() {
            binary.text = Some(array.data);
        }
        node.with_child(binary)
    }

    fn build_spectrum(position: usize, record: &ScanRecord) -> Node {
        let spectrum = &record.spectrum;
        let mut node = Node::new("spectrum")
            .with_attribute("index", position)
            .with_attribute("id", &record.id)
            .with_attribute("defaultArrayLength", spectrum.len())
            .with_param(CvRole::MsLevel.to_param_val(record.ms_order));
        node.add_param(if record.is_survey() {
            CvRole::MS1Spectrum.to_param()
        } else {
            CvRole::MSnSpectrum.to_param()
        });
        node.add_param(if record.centroid {
            CvRole::CentroidSpectrum.to_param()
        } else {
            CvRole::ProfileSpectrum.to_param()
        });
        node.add_param(record.polarity.role().to_param());
        node.add_param(CvRole::SpectrumTitle.to_param_val(&record.id));
        if !spectrum.is_empty() {
            if let Some((low, high)) = record.mz_range.or_else(|| spectrum.mz_range()) {
                node.add_param(CvRole::LowestObservedMz.to_param_val(low).with_unit_t(&Unit::MZ));
                node.add_param(CvRole::HighestObservedMz.to_param_val(high).with_unit_t(&Unit::MZ));
            }
        }

        let mut scan = Node::new("scan").with_param(
            CvRole::ScanStartTime
                .to_param_val(record.retention_time)
                .with_unit_t(&Unit::Minute),
        );
        if let Some(filter) = record.scan_filter.as_ref() {
            scan.add_param(CvRole::FilterString.to_param_val(filter));
        }
        if let Some(injection_time) = record.injection_time {
            scan.add_param(
                CvRole::IonInjectionTime
                    .to_param_val(injection_time)
                    .with_unit_t(&Unit::Millisecond),
            );
        }
        node.push_child(
            Node::new("scanList")
                .with_attribute("count", 1)
                .with_param(ControlledVocabulary::MS.param(1000795, "no combination"))
                .with_child(scan),
        );

        if let Some(precursor) = record.precursor.as_ref() {
            let selected_ion = Node::new("selectedIon")
                .with_param(CvRole::SelectedIonMz.to_param_val(precursor.mz).with_unit_t(&Unit::MZ))
                .with_param(CvRole::ChargeState.to_param_val(precursor.charge))
                .with_param(
                    CvRole::PeakIntensity
                        .to_param_val(precursor.intensity)
                        .with_unit_t(&Unit::DetectorCounts),
                );
            let mut activation = Node::new("activation");
            if let Some(role) = precursor.dissociation.role() {
                activation.add_param(role.to_param());
            }
            let precursor_node = Node::new("precursor")
                .with_attribute("spectrumRef", &precursor.precursor_id)
                .with_child(
                    Node::new("selectedIonList")
                        .with_attribute("count", 1)
                        .with_child(selected_ion),
                )
                .with_child(activation);
            node.push_child(
                Node::new("precursorList")
                    .with_attribute("count", 1)
                    .with_child(precursor_node),
            );
        }

        node.push_child(
            Node::new("binaryDataArrayList")
                .with_attribute("count", 2)
                .with_child(Self::build_binary_array(ArrayType::MZArray, spectrum.masses()))
                .with_child(Self::build_binary_array(
                    ArrayType::IntensityArray,
                    spectrum.intensities(),
                )),
        );
        node
    }

    /// Assemble the `<mzML>` element for `records`
    pub fn build_document(&self, records: &[ScanRecord]) -> Node {
        let mut mzml = Node::new("mzML")
            .with_attribute("xmlns", "http://psi.hupo.org/ms/mzml")
            .with_attribute("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .with_attribute(
                "xsi:schemaLocation",
                "http://psi.hupo.org/ms/mzml http://psidev.info/files/ms/mzML/xsd/mzML1.1.0.xsd",
            )
            .with_attribute("version", Self::MZML_VERSION);
        self.build_header(&mut mzml);

        let mut spectrum_list = Node::new("spectrumList")
            .with_attribute("count", records.len())
            .with_attribute("defaultDataProcessingRef", &self.config.data_processing_id);
        for (position, record) in records.iter().enumerate() {
            spectrum_list.push_child(Self::build_spectrum(position, record));
        }

        let chromatogram_list = Node::new("chromatogramList")
            .with_attribute("count", 1)
            .with_attribute("defaultDataProcessingRef", &self.config.data_processing_id)
            .with_child(
                Node::new("chromatogram")
                    .with_attribute("index", 0)
                    .with_attribute("id", "TIC")
                    .with_attribute("defaultArrayLength", 0),
            );

        mzml.push_child(
            Node::new("run")
                .with_attribute("id", "run")
                .with_attribute("defaultInstrumentConfigurationRef", "IC1")
                .with_child(spectrum_list)
                .with_child(chromatogram_list),
        );
        mzml
    }

    fn record_offset(&mut self, node: &Node, offset: u64) {
        let index = match node.tag.as_str() {
            "spectrum" => &mut self.spectrum_offsets,
            "chromatogram" => &mut self.chromatogram_offsets,
            _ => return,
        };
        if let Some(id) = node.attribute("id") {
            trace!("{} {id} starts at byte {offset}", node.tag);
            index.insert(id, offset);
        }
    }

    fn write_node<W: Write>(&mut self, handle: &mut XMLHandle<W>, node: &Node) -> WriterResult {
        let start = start_element(node);
        let tag_length = start.len() as u64;
        if node.params.is_empty() && node.children.is_empty() && node.text.is_none() {
            handle.write_event(Event::Empty(start))?;
            let offset = handle.get_mut().position() - (tag_length + 3);
            self.record_offset(node, offset);
            return Ok(());
        }

        start_event!(handle, start);
        let offset = handle.get_mut().position() - (tag_length + 2);
        self.record_offset(node, offset);
        for param in node.params() {
            handle.write_event(Event::Empty(param_element(param)))?;
        }
        if let Some(text) = node.text.as_deref() {
            handle.write_event(text_event(text))?;
        }
        for children in node.children.values() {
            for child in children {
                self.write_node(handle, child)?;
            }
        }
        end_event!(handle, start);
        Ok(())
    }

    fn write_index<W: Write>(handle: &mut XMLHandle<W>, index: &OffsetIndex) -> WriterResult {
        let mut outer = bstart!("index");
        attrib!("name", index.name, outer);
        start_event!(handle, outer);
        for (id, offset) in index.iter() {
            let mut tag = bstart!("offset");
            attrib!("idRef", id, tag);
            start_event!(handle, tag);
            let content = offset.to_string();
            handle.write_event(Event::Text(BytesText::new(&content)))?;
            end_event!(handle, tag);
        }
        end_event!(handle, outer);
        Ok(())
    }

    fn write_index_list<W: Write>(&mut self, handle: &mut XMLHandle<W>) -> WriterResult {
        let mut outer = bstart!("indexList");
        attrib!("count", "2", outer);
        start_event!(handle, outer);
        let index_list_offset = handle.get_mut().position() - (outer.len() as u64 + 2);
        Self::write_index(handle, &self.spectrum_offsets)?;
        Self::write_index(handle, &self.chromatogram_offsets)?;
        end_event!(handle, outer);

        let tag = bstart!("indexListOffset");
        start_event!(handle, tag);
        let content = index_list_offset.to_string();
        handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(handle, tag);

        let tag = bstart!("fileChecksum");
        start_event!(handle, tag);
        let content = format!("{:x}", handle.get_mut().compute());
        handle.write_event(Event::Text(BytesText::new(&content)))?;
        end_event!(handle, tag);
        Ok(())
    }
}
