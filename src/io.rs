pub mod memory;
pub mod mzml;
mod offset_index;
pub mod traits;
mod utils;

pub use crate::io::memory::InMemoryScanStore;
pub use crate::io::mzml::{MzMLParserError, MzMLScanStore, MzMLWriter, MzMLWriterError, WriterConfig};
pub use crate::io::offset_index::OffsetIndex;
pub use crate::io::traits::{ScanAccessError, ScanIter, ScanResult, ScanStore};
