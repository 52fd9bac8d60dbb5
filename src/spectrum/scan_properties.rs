use std::fmt::Display;

use crate::params::CvRole;

use super::peaks::Spectrum;

/// Describe the polarity of a mass spectrum.
///
/// A scan without a resolvable polarity never becomes a [`ScanRecord`], so there is no
/// "unknown" state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ScanPolarity {
    /// The spectrum is composed of positive ions
    Positive = 1,
    /// The spectrum is composed of negative ions
    Negative = -1,
}

impl ScanPolarity {
    pub fn from_role(role: CvRole) -> Option<Self> {
        match role {
            CvRole::PositiveScan => Some(Self::Positive),
            CvRole::NegativeScan => Some(Self::Negative),
            _ => None,
        }
    }

    pub const fn role(&self) -> CvRole {
        match self {
            Self::Positive => CvRole::PositiveScan,
            Self::Negative => CvRole::NegativeScan,
        }
    }

    /// The sign applied to charge states of ions observed with this polarity
    pub const fn sign(&self) -> i32 {
        *self as i8 as i32
    }
}

/// The fragmentation method used to produce a product ion spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DissociationType {
    /// Collision-induced dissociation
    CID,
    /// Beam-type collision-induced dissociation
    HCD,
    /// Electron transfer dissociation
    ETD,
    /// Multiphoton dissociation
    MPD,
    /// Electron capture dissociation
    ECD,
    /// Pulsed-Q dissociation
    PQD,
    #[default]
    Unknown,
}

impl DissociationType {
    pub fn from_role(role: CvRole) -> Self {
        match role {
            CvRole::CollisionInducedDissociation
            | CvRole::InSourceCollisionInducedDissociation => Self::CID,
            CvRole::BeamTypeCollisionInducedDissociation => Self::HCD,
            CvRole::ElectronTransferDissociation => Self::ETD,
            CvRole::Photodissociation => Self::MPD,
            CvRole::ElectronCaptureDissociation => Self::ECD,
            CvRole::PulsedQDissociation => Self::PQD,
            _ => Self::Unknown,
        }
    }

    pub const fn role(&self) -> Option<CvRole> {
        match self {
            Self::CID => Some(CvRole::CollisionInducedDissociation),
            Self::HCD => Some(CvRole::BeamTypeCollisionInducedDissociation),
            Self::ETD => Some(CvRole::ElectronTransferDissociation),
            Self::MPD => Some(CvRole::Photodissociation),
            Self::ECD => Some(CvRole::ElectronCaptureDissociation),
            Self::PQD => Some(CvRole::PulsedQDissociation),
            Self::Unknown => None,
        }
    }
}

impl Display for DissociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The kind of mass analyzer that acquired a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MassAnalyzerType {
    Quadrupole,
    IonTrap2D,
    IonTrap3D,
    Orbitrap,
    TOF,
    FTICR,
    Sector,
    #[default]
    Unknown,
}

impl MassAnalyzerType {
    pub fn from_role(role: CvRole) -> Self {
        match role {
            CvRole::Quadrupole => Self::Quadrupole,
            CvRole::LinearIonTrap
            | CvRole::AxialEjectionLinearIonTrap
            | CvRole::RadialEjectionLinearIonTrap => Self::IonTrap2D,
            CvRole::QuadrupoleIonTrap => Self::IonTrap3D,
            CvRole::Orbitrap => Self::Orbitrap,
            CvRole::TimeOfFlight => Self::TOF,
            CvRole::FourierTransformIonCyclotronResonance => Self::FTICR,
            CvRole::MagneticSector => Self::Sector,
            _ => Self::Unknown,
        }
    }
}

/// The precursor ion description attached to an MSn scan
#[derive(Debug, Clone, PartialEq)]
pub struct PrecursorInfo {
    /// The native ID of the scan the precursor was selected from
    pub precursor_id: String,
    /// The selected ion m/z, treated as the monoisotopic m/z
    pub mz: f64,
    /// The signed charge state. The sign follows the scan polarity.
    pub charge: i32,
    /// The intensity of the selected ion. May be `NaN` when the source did not
    /// report one.
    pub intensity: f64,
    pub isolation_mz: Option<f64>,
    pub isolation_width: Option<f64>,
    pub dissociation: DissociationType,
    /// The 1-based index of the scan identified by `precursor_id`, when it
    /// is part of the same store
    pub parent_index: Option<usize>,
}

impl PrecursorInfo {
    pub fn new(precursor_id: String, mz: f64, charge: i32, intensity: f64) -> Self {
        Self {
            precursor_id,
            mz,
            charge,
            intensity,
            isolation_mz: None,
            isolation_width: None,
            dissociation: DissociationType::Unknown,
            parent_index: None,
        }
    }

    pub fn with_isolation(mut self, isolation_mz: f64, isolation_width: f64) -> Self {
        self.isolation_mz = Some(isolation_mz);
        self.isolation_width = Some(isolation_width);
        self
    }

    pub fn with_dissociation(mut self, dissociation: DissociationType) -> Self {
        self.dissociation = dissociation;
        self
    }

    pub fn with_parent_index(mut self, parent_index: usize) -> Self {
        self.parent_index = Some(parent_index);
        self
    }
}

/**
One fully decoded scan: its descriptive metadata and its peak arrays.

Records are produced by a [`ScanStore`](crate::io::ScanStore) on demand. A record with
an MS order of 1 never carries a [`PrecursorInfo`], and a record with a higher MS order
always does.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    /// The 1-based position of the scan in its store
    pub index: usize,
    /// The native ID of the scan, unique within its source
    pub id: String,
    pub ms_order: u8,
    pub centroid: bool,
    pub polarity: ScanPolarity,
    /// Scan start time in minutes, `NaN` when the source records none
    pub retention_time: f64,
    /// The lowest and highest observed m/z
    pub mz_range: Option<(f64, f64)>,
    pub scan_filter: Option<String>,
    /// Ion injection time in milliseconds
    pub injection_time: Option<f64>,
    pub precursor: Option<PrecursorInfo>,
    pub spectrum: Spectrum,
}

impl ScanRecord {
    /// Create a survey scan record. The observed m/z range is taken from the peaks.
    pub fn new_ms1(
        index: usize,
        id: String,
        polarity: ScanPolarity,
        centroid: bool,
        retention_time: f64,
        spectrum: Spectrum,
    ) -> Self {
        Self {
            index,
            id,
            ms_order: 1,
            centroid,
            polarity,
            retention_time,
            mz_range: spectrum.mz_range(),
            scan_filter: None,
            injection_time: None,
            precursor: None,
            spectrum,
        }
    }

    /// Create a product ion scan record of `ms_order` for `precursor`. An order below 2
    /// is kept as given and fails [`ScanRecord::precursor_consistent`].
    #[allow(clippy::too_many_arguments)]
    pub fn new_msn(
        index: usize,
        id: String,
        ms_order: u8,
        polarity: ScanPolarity,
        centroid: bool,
        retention_time: f64,
        precursor: PrecursorInfo,
        spectrum: Spectrum,
    ) -> Self {
        Self {
            index,
            id,
            ms_order,
            centroid,
            polarity,
            retention_time,
            mz_range: spectrum.mz_range(),
            scan_filter: None,
            injection_time: None,
            precursor: Some(precursor),
            spectrum,
        }
    }

    pub fn with_scan_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.scan_filter = Some(filter.into());
        self
    }

    pub fn with_injection_time(mut self, injection_time: f64) -> Self {
        self.injection_time = Some(injection_time);
        self
    }

    pub fn is_survey(&self) -> bool {
        self.ms_order == 1
    }

    /// Check that the precursor is present exactly when the MS order calls for one
    pub fn precursor_consistent(&self) -> bool {
        (self.ms_order >= 2) == self.precursor.is_some()
    }
}
