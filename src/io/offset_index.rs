use indexmap::map::Iter;
use indexmap::IndexMap;

/**
The byte offsets of one `<index>` element of an indexed mzML document, keyed by
the `idRef` of each `<spectrum>` or `<chromatogram>` in document order.

[`MzMLScanStore`](crate::io::mzml::MzMLScanStore) fills one from the `spectrum`
index it finds, and [`MzMLWriter`](crate::io::mzml::MzMLWriter) records one per
element kind while it writes.
*/
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    /// The `name` attribute of the `<index>` element
    pub name: String,
    pub offsets: IndexMap<Box<str>, u64>,
}

impl OffsetIndex {
    pub fn new(name: String) -> OffsetIndex {
        OffsetIndex {
            name,
            ..Default::default()
        }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<u64> {
        self.offsets.get(id).copied()
    }

    /// Record `offset` for `id`, replacing and returning any earlier offset
    pub fn insert<T: Into<Box<str>>>(&mut self, id: T, offset: u64) -> Option<u64> {
        self.offsets.insert(id.into(), offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The `(idRef, offset)` pairs in the order they were recorded
    pub fn iter(&self) -> Iter<'_, Box<str>, u64> {
        self.offsets.iter()
    }
}
