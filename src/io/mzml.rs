//! Implements a reader and writer for the PSI-MS mzML and indexedmzML XML file formats
//! for representing raw and processed mass spectra.

mod reading_shared;
pub mod reader;
pub mod tree;
pub mod writer;

pub use crate::io::mzml::reading_shared::{MzMLParserError, MzMLParserState};

pub use crate::io::mzml::reader::{DocumentVariant, MzMLScanStore, ResolvedDocument};
pub use crate::io::mzml::tree::Node;
pub use crate::io::mzml::writer::{MzMLWriter, MzMLWriterError, WriterConfig, WriterResult};
