use std::sync::Arc;

use mzpeaks::Tolerance;
use thiserror::Error;

/// Reasons a pair of arrays cannot form a [`Spectrum`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpectrumError {
    #[error("m/z array has {masses} entries but intensity array has {intensities}")]
    LengthMismatch { masses: usize, intensities: usize },
    #[error("m/z array decreases at position {0}")]
    Unsorted(usize),
}

/**
An immutable pair of m/z and intensity arrays, sorted by m/z.

The arrays are shared behind reference counting, so cloning a [`Spectrum`] is cheap
and decoded payloads may be handed out freely. Every operation that would change the
peaks produces a new [`Spectrum`] instead.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    masses: Arc<[f64]>,
    intensities: Arc<[f64]>,
}

impl Default for Spectrum {
    fn default() -> Self {
        Self {
            masses: Vec::new().into(),
            intensities: Vec::new().into(),
        }
    }
}

impl Spectrum {
    /// Build a spectrum, checking that the arrays line up and that m/z never decreases
    pub fn new(masses: Vec<f64>, intensities: Vec<f64>) -> Result<Self, SpectrumError> {
        if masses.len() != intensities.len() {
            return Err(SpectrumError::LengthMismatch {
                masses: masses.len(),
                intensities: intensities.len(),
            });
        }
        if let Some(i) = masses.windows(2).position(|w| w[1] < w[0]) {
            return Err(SpectrumError::Unsorted(i + 1));
        }
        Ok(Self {
            masses: masses.into(),
            intensities: intensities.into(),
        })
    }

    /// Build a spectrum from peaks in any order, sorting them by m/z first
    pub fn from_unsorted<I: IntoIterator<Item = (f64, f64)>>(peaks: I) -> Self {
        let mut peaks: Vec<(f64, f64)> = peaks.into_iter().collect();
        peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (masses, intensities): (Vec<f64>, Vec<f64>) = peaks.into_iter().unzip();
        Self {
            masses: masses.into(),
            intensities: intensities.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn get(&self, index: usize) -> Option<(f64, f64)> {
        Some((*self.masses.get(index)?, *self.intensities.get(index)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.masses
            .iter()
            .copied()
            .zip(self.intensities.iter().copied())
    }

    pub fn first_mz(&self) -> Option<f64> {
        self.masses.first().copied()
    }

    pub fn last_mz(&self) -> Option<f64> {
        self.masses.last().copied()
    }

    /// The lowest and highest m/z, or `None` for an empty spectrum
    pub fn mz_range(&self) -> Option<(f64, f64)> {
        Some((self.first_mz()?, self.last_mz()?))
    }

    pub fn total_ion_current(&self) -> f64 {
        self.intensities.iter().sum()
    }

    /// The most intense peak, preferring the lowest m/z on ties
    pub fn base_peak(&self) -> Option<(f64, f64)> {
        self.iter()
            .fold(None, |best: Option<(f64, f64)>, peak| match best {
                Some(b) if b.1 >= peak.1 => Some(b),
                _ => Some(peak),
            })
    }

    /// Find the index of the peak closest to `query` within `error_tolerance`
    pub fn peak_for(&self, query: f64, error_tolerance: Tolerance) -> Option<usize> {
        let (lower, upper) = error_tolerance.bounds(query);
        let start = self.masses.partition_point(|m| *m < lower);
        let end = start + self.masses[start..].partition_point(|m| *m <= upper);
        (start..end).min_by(|a, b| {
            let ea = (self.masses[*a] - query).abs();
            let eb = (self.masses[*b] - query).abs();
            ea.total_cmp(&eb)
        })
    }

    pub fn has_peak(&self, query: f64, error_tolerance: Tolerance) -> bool {
        self.peak_for(query, error_tolerance).is_some()
    }

    /// A new spectrum holding only the peaks with `low <= m/z <= high`
    pub fn extract(&self, low: f64, high: f64) -> Spectrum {
        let start = self.masses.partition_point(|m| *m < low);
        let end = start + self.masses[start..].partition_point(|m| *m <= high);
        Self {
            masses: self.masses[start..end].into(),
            intensities: self.intensities[start..end].into(),
        }
    }

    /// A new spectrum holding only the peaks at least as intense as `threshold`
    pub fn filter_by_intensity(&self, threshold: f64) -> Spectrum {
        let (masses, intensities): (Vec<f64>, Vec<f64>) =
            self.iter().filter(|(_, i)| *i >= threshold).unzip();
        Self {
            masses: masses.into(),
            intensities: intensities.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make() -> Spectrum {
        Spectrum::new(
            vec![100.0, 200.0, 200.5, 350.25, 500.0],
            vec![10.0, 50.0, 5.0, 50.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_construction_checks() {
        assert_eq!(
            Spectrum::new(vec![1.0, 2.0], vec![1.0]),
            Err(SpectrumError::LengthMismatch {
                masses: 2,
                intensities: 1
            })
        );
        assert_eq!(
            Spectrum::new(vec![1.0, 3.0, 2.0], vec![1.0, 1.0, 1.0]),
            Err(SpectrumError::Unsorted(2))
        );
        let s = Spectrum::from_unsorted([(3.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
        assert_eq!(s.masses(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.intensities(), &[2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_bounds() {
        let s = make();
        assert_eq!(s.first_mz(), Some(100.0));
        assert_eq!(s.last_mz(), Some(500.0));
        assert_eq!(s.mz_range(), Some((100.0, 500.0)));
        assert_eq!(Spectrum::empty().mz_range(), None);
        assert_eq!(s.total_ion_current(), 116.0);
        assert_eq!(s.base_peak(), Some((200.0, 50.0)));
    }

    #[test]
    fn test_peak_lookup() {
        let s = make();
        assert_eq!(s.peak_for(200.1, Tolerance::Da(0.5)), Some(1));
        assert_eq!(s.peak_for(200.4, Tolerance::Da(0.5)), Some(2));
        assert_eq!(s.peak_for(350.25, Tolerance::PPM(5.0)), Some(3));
        assert!(!s.has_peak(300.0, Tolerance::Da(0.5)));
    }

    #[test]
    fn test_derived_views() {
        let s = make();
        let sub = s.extract(150.0, 350.25);
        assert_eq!(sub.masses(), &[200.0, 200.5, 350.25]);
        assert_eq!(s.len(), 5);

        let filtered = s.filter_by_intensity(10.0);
        assert_eq!(filtered.masses(), &[100.0, 200.0, 350.25]);
        assert_eq!(filtered.intensities(), &[10.0, 50.0, 50.0]);
    }
}
