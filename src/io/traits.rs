use std::io;

use thiserror::Error;

use crate::spectrum::{ArrayRetrievalError, ScanRecord, Spectrum};

/// Errors that may occur when opening a [`ScanStore`] or reading a scan from it
#[derive(Debug, Error)]
pub enum ScanAccessError {
    /// A value required by the requested accessor is absent from the scan
    #[error("Could not determine {field} for scan {index}")]
    NotFound { field: &'static str, index: usize },
    /// A value was present but could not be interpreted
    #[error("Could not interpret {field} value {value:?} for scan {index}")]
    InvalidValue {
        field: &'static str,
        index: usize,
        value: String,
    },
    /// The source could not be parsed, or described something this crate cannot represent
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    /// The requested scan index lies outside of `[first, last]`
    #[error("Scan index {index} is outside of the valid range {first}..={last}")]
    IndexOutOfRange {
        index: usize,
        first: usize,
        last: usize,
    },
    /// No scan has exactly the requested retention time
    #[error("No scan with retention time {0}")]
    RetentionTimeNotFound(f64),
    /// The backing source could not be read at open time
    #[error("The source {source_name} is unavailable: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: io::Error,
    },
    /// The store has not been opened yet
    #[error("The scan store has not been opened")]
    StoreNotOpen,
    #[error("Failed to decode binary data array: {0}")]
    ArrayDecode(#[from] ArrayRetrievalError),
}

impl ScanAccessError {
    pub fn not_found(field: &'static str, index: usize) -> Self {
        Self::NotFound { field, index }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ScanAccessError> for io::Error {
    fn from(value: ScanAccessError) -> Self {
        let s = value.to_string();
        match value {
            ScanAccessError::NotFound { .. }
            | ScanAccessError::IndexOutOfRange { .. }
            | ScanAccessError::RetentionTimeNotFound(_) => io::Error::new(io::ErrorKind::NotFound, s),
            ScanAccessError::SourceUnavailable { error, .. } => error,
            ScanAccessError::ArrayDecode(e) => e.into(),
            ScanAccessError::InvalidValue { .. } | ScanAccessError::MalformedDocument(_) => {
                io::Error::new(io::ErrorKind::InvalidData, s)
            }
            ScanAccessError::StoreNotOpen => io::Error::new(io::ErrorKind::Other, s),
        }
    }
}

pub type ScanResult<T> = Result<T, ScanAccessError>;

/**
A random-access, lazily decoded collection of scans addressed by a 1-based index.

A store starts closed. [`ScanStore::open`] performs whatever one-time work the backing
source needs and is a no-op once it has succeeded. After that, scans are materialized
on request with [`ScanStore::scan`]. There is no explicit close; resources are released
when the store is dropped.
*/
pub trait ScanStore {
    /// Establish readiness. Calling this again after it succeeded does nothing.
    fn open(&mut self) -> ScanResult<()>;

    fn is_open(&self) -> bool;

    /// The smallest valid scan index
    fn first_index(&self) -> ScanResult<usize>;

    /// The largest valid scan index
    fn last_index(&self) -> ScanResult<usize>;

    /// Build the fully populated record for scan `index`
    fn scan(&mut self, index: usize) -> ScanResult<ScanRecord>;

    /// Retrieve only the peaks of scan `index`
    fn spectrum(&mut self, index: usize) -> ScanResult<Spectrum> {
        self.scan(index).map(|s| s.spectrum)
    }

    /// The number of scans in the store
    fn len(&self) -> ScanResult<usize> {
        let first = self.first_index()?;
        let last = self.last_index()?;
        Ok((last + 1).saturating_sub(first))
    }

    fn is_empty(&self) -> ScanResult<bool> {
        self.len().map(|n| n == 0)
    }

    /// Fail with [`ScanAccessError::IndexOutOfRange`] unless `index` is a valid scan index
    fn check_index(&self, index: usize) -> ScanResult<()> {
        let first = self.first_index()?;
        let last = self.last_index()?;
        if index < first || index > last {
            Err(ScanAccessError::IndexOutOfRange { index, first, last })
        } else {
            Ok(())
        }
    }

    /// The retention time of scan `index` in minutes, without decoding its peaks
    /// if the implementation can avoid it
    fn retention_time_of(&mut self, index: usize) -> ScanResult<f64> {
        self.scan(index).map(|s| s.retention_time)
    }

    /// Find the scan whose retention time is exactly `time`, searching linearly.
    /// There is no nearest-match fallback. Scans without a retention time are skipped.
    fn index_for_retention_time(&mut self, time: f64) -> ScanResult<usize> {
        let first = self.first_index()?;
        let last = self.last_index()?;
        for index in first..=last {
            match self.retention_time_of(index) {
                Ok(t) if t == time => return Ok(index),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Err(ScanAccessError::RetentionTimeNotFound(time))
    }

    /// Iterate over every scan in index order
    fn iter(&mut self) -> ScanIter<'_, Self>
    where
        Self: Sized,
    {
        ScanIter::new(self)
    }
}

/// An iterator over the scans of a [`ScanStore`], from the first index to the last
pub struct ScanIter<'a, S: ScanStore> {
    store: &'a mut S,
    index: usize,
    last: Option<usize>,
}

impl<'a, S: ScanStore> ScanIter<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        let (index, last) = match (store.first_index(), store.last_index()) {
            (Ok(first), Ok(last)) => (first, Some(last)),
            _ => (1, None),
        };
        Self { store, index, last }
    }
}

impl<S: ScanStore> Iterator for ScanIter<'_, S> {
    type Item = ScanResult<ScanRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(last) = self.last else {
            self.last = Some(0);
            self.index = 1;
            return Some(Err(ScanAccessError::StoreNotOpen));
        };
        if self.index > last {
            return None;
        }
        let result = self.store.scan(self.index);
        self.index += 1;
        Some(result)
    }
}
