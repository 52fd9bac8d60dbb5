//! The scan data model: peak arrays, per-scan metadata, and binary array codecs.
pub mod bindata;
pub mod peaks;
pub mod scan_properties;

pub use crate::spectrum::bindata::{
    ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType, DataArray,
};
pub use crate::spectrum::peaks::{Spectrum, SpectrumError};
pub use crate::spectrum::scan_properties::{
    DissociationType, MassAnalyzerType, PrecursorInfo, ScanPolarity, ScanRecord,
};
