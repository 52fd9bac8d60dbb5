use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::io::traits::{ScanAccessError, ScanResult, ScanStore};
use crate::spectrum::{ScanRecord, Spectrum};

/**
A [`ScanStore`] over records that are already in memory.

This is the shape an adapter for a proprietary acquisition format takes: the adapter
decodes scans into [`ScanRecord`]s and hands them over, and everything downstream,
including [`MzMLWriter`](crate::io::mzml::MzMLWriter), only sees the [`ScanStore`]
contract. When built with [`InMemoryScanStore::from_source`], [`ScanStore::open`]
fails the same way an adapter would if its raw file has gone missing.

Records are renumbered so that their `index` always matches their 1-based position.
*/
#[derive(Debug, Clone, Default)]
pub struct InMemoryScanStore {
    records: Vec<ScanRecord>,
    source: Option<PathBuf>,
    is_open: bool,
    instrument_name: Option<String>,
    instrument_model: Option<String>,
    software_version: Option<String>,
}

impl InMemoryScanStore {
    pub fn new(records: Vec<ScanRecord>) -> Self {
        let mut this = Self::default();
        for record in records {
            this.push(record);
        }
        this
    }

    /// Create a store standing in for the raw file at `path`. The file must exist when
    /// the store is opened.
    pub fn from_source<P: AsRef<Path>>(path: P, records: Vec<ScanRecord>) -> Self {
        let mut this = Self::new(records);
        this.source = Some(path.as_ref().to_path_buf());
        this
    }

    /// Append `record`, assigning it the next index
    pub fn push(&mut self, mut record: ScanRecord) {
        record.index = self.records.len() + 1;
        self.records.push(record);
    }

    pub fn with_instrument<S: Into<String>, T: Into<String>>(mut self, name: S, model: T) -> Self {
        self.instrument_name = Some(name.into());
        self.instrument_model = Some(model.into());
        self
    }

    pub fn with_software_version<S: Into<String>>(mut self, version: S) -> Self {
        self.software_version = Some(version.into());
        self
    }

    pub fn instrument_name(&self) -> Option<&str> {
        self.instrument_name.as_deref()
    }

    pub fn instrument_model(&self) -> Option<&str> {
        self.instrument_model.as_deref()
    }

    /// The version of the acquisition software that produced the source
    pub fn software_version(&self) -> Option<&str> {
        self.software_version.as_deref()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ScanRecord> {
        self.records
    }

    fn record(&self, index: usize) -> ScanResult<&ScanRecord> {
        self.check_index(index)?;
        self.records
            .get(index - 1)
            .ok_or_else(|| ScanAccessError::not_found("scan", index))
    }
}

impl FromIterator<ScanRecord> for InMemoryScanStore {
    fn from_iter<T: IntoIterator<Item = ScanRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ScanStore for InMemoryScanStore {
    fn open(&mut self) -> ScanResult<()> {
        if self.is_open {
            return Ok(());
        }
        if let Some(source) = self.source.as_ref() {
            fs::metadata(source).map_err(|error| ScanAccessError::SourceUnavailable {
                source_name: source.display().to_string(),
                error,
            })?;
        }
        debug!("Opened an in-memory store of {} scans", self.records.len());
        self.is_open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn first_index(&self) -> ScanResult<usize> {
        if self.is_open {
            Ok(1)
        } else {
            Err(ScanAccessError::StoreNotOpen)
        }
    }

    fn last_index(&self) -> ScanResult<usize> {
        if self.is_open {
            Ok(self.records.len())
        } else {
            Err(ScanAccessError::StoreNotOpen)
        }
    }

    fn scan(&mut self, index: usize) -> ScanResult<ScanRecord> {
        self.record(index).cloned()
    }

    fn spectrum(&mut self, index: usize) -> ScanResult<Spectrum> {
        self.record(index).map(|r| r.spectrum.clone())
    }

    fn retention_time_of(&mut self, index: usize) -> ScanResult<f64> {
        self.record(index).map(|r| r.retention_time)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::{PrecursorInfo, ScanPolarity};

    fn store() -> InMemoryScanStore {
        let ms1 = ScanRecord::new_ms1(
            7,
            "scan=1".to_string(),
            ScanPolarity::Negative,
            true,
            0.5,
            Spectrum::new(vec![300.0, 301.0], vec![1.0, 2.0]).unwrap(),
        );
        let ms2 = ScanRecord::new_msn(
            9,
            "scan=2".to_string(),
            2,
            ScanPolarity::Negative,
            true,
            0.75,
            PrecursorInfo::new("scan=1".to_string(), 300.0, -1, 1.0),
            Spectrum::empty(),
        );
        [ms1, ms2].into_iter().collect()
    }

    #[test_log::test]
    fn test_lifecycle() -> ScanResult<()> {
        let mut store = store().with_instrument("Thermo", "LTQ Orbitrap");
        assert!(!store.is_open());
        assert!(matches!(store.len(), Err(ScanAccessError::StoreNotOpen)));
        assert!(matches!(
            store.iter().next(),
            Some(Err(ScanAccessError::StoreNotOpen))
        ));
        store.open()?;
        store.open()?;
        assert_eq!(store.len()?, 2);
        assert_eq!(store.instrument_model(), Some("LTQ Orbitrap"));
        assert_eq!(store.software_version(), None);

        let scan = store.scan(2)?;
        assert_eq!(scan.index, 2);
        assert_eq!(scan.precursor.unwrap().charge, -1);
        assert!(matches!(
            store.scan(3),
            Err(ScanAccessError::IndexOutOfRange { index: 3, first: 1, last: 2 })
        ));
        assert_eq!(store.index_for_retention_time(0.75)?, 2);
        assert!(matches!(
            store.index_for_retention_time(0.7),
            Err(ScanAccessError::RetentionTimeNotFound(_))
        ));
        let ids: Vec<String> = store.iter().map(|s| s.map(|s| s.id)).collect::<Result<_, _>>()?;
        assert_eq!(ids, ["scan=1", "scan=2"]);
        Ok(())
    }

    #[test_log::test]
    fn test_missing_source() {
        let mut store = InMemoryScanStore::from_source("/no/such/file.raw", store().into_records());
        assert!(matches!(
            store.open(),
            Err(ScanAccessError::SourceUnavailable { .. })
        ));
        assert!(!store.is_open());

        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("present.raw");
        fs::write(&raw, b"").unwrap();
        let mut store = InMemoryScanStore::from_source(&raw, Vec::new());
        store.open().unwrap();
        assert!(store.is_empty().unwrap());
    }
}
