//! Read and write mass spectrometry scan data in mzML through a uniform,
//! lazily decoded, random-access [`ScanStore`](crate::io::ScanStore).
pub mod io;
pub mod params;
pub mod spectrum;

pub use crate::params::{CvRole, Param, ParamDescribed, ParamLike, Unit};

pub use crate::io::{
    InMemoryScanStore, MzMLScanStore, MzMLWriter, ScanAccessError, ScanResult, ScanStore,
    WriterConfig,
};

pub use crate::spectrum::{
    DissociationType, MassAnalyzerType, PrecursorInfo, ScanPolarity, ScanRecord, Spectrum,
};
