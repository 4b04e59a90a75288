//! Percentile ranks, per-image landmarks, and the learned landmark table
//!
//! A landmark is the intensity found at one percentile rank of an image's
//! intensity distribution. Training and mapping both compute landmarks at the
//! ranks of a [`PercentileSet`]; the learned [`LandmarkTable`] stores one
//! averaged standard-space value per rank and remembers the set it was
//! trained with, so a table is never applied with a different set.
//!
//! # Example
//!
//! ```
//! use nyulnorm_core::landmarks::{LandmarkTable, PercentileSet};
//!
//! let set = PercentileSet::standard();
//! assert_eq!(set.len(), 11);
//!
//! let values = (0..1000).map(|v| v as f32);
//! let landmarks = set.landmarks(values).unwrap();
//! assert_eq!(landmarks[5], 499.5);
//!
//! let values = vec![
//!     0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0,
//! ];
//! let table = LandmarkTable::new(set, values)?;
//! assert_eq!(table.get(50.0), Some(500.0));
//! # Ok::<(), nyulnorm_core::landmarks::LandmarkTableError>(())
//! ```

use std::{fmt, iter};

use nyulnorm_stats::percentiles::Percentiles;
use serde::{Deserialize, Serialize};

/// Minimum number of ranks a set needs: the two lowest ranks fit the lower
/// tail and the two ranks below the highest fit the upper tail.
pub const MIN_PERCENTILE_RANKS: usize = 3;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum PercentileSetError {
    #[display("a percentile set needs at least {min} ranks, got {len}")]
    TooFewRanks { len: usize, min: usize },
    #[display("percentile rank {rank} is outside [0, 100]")]
    OutOfRange { rank: f64 },
    #[display("percentile ranks must be strictly increasing ({previous} is followed by {rank})")]
    NotIncreasing { previous: f64, rank: f64 },
}

/// Ordered percentile ranks landmarks are computed at.
///
/// Landmark tables are keyed positionally to these ranks, so any change to
/// the set invalidates tables trained with another one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct PercentileSet {
    ranks: Vec<f64>,
}

impl Default for PercentileSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl PercentileSet {
    /// Ranks of the standard set: the 1st and 99th percentiles plus every decile.
    pub const STANDARD_RANKS: [f64; 11] = [
        1.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 99.0,
    ];

    /// Version of [`Self::STANDARD_RANKS`]; bumped whenever the ranks change.
    pub const STANDARD_VERSION: u32 = 1;

    /// The standard set of ranks.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            ranks: Self::STANDARD_RANKS.to_vec(),
        }
    }

    /// Builds a custom set, validating that ranks are strictly increasing
    /// values in `[0, 100]` and that there are enough of them.
    ///
    /// ```
    /// use nyulnorm_core::landmarks::PercentileSet;
    ///
    /// assert!(PercentileSet::new(vec![2.0, 25.0, 50.0, 75.0, 98.0]).is_ok());
    /// assert!(PercentileSet::new(vec![2.0, 50.0]).is_err());
    /// assert!(PercentileSet::new(vec![50.0, 25.0, 75.0]).is_err());
    /// ```
    pub fn new(ranks: Vec<f64>) -> Result<Self, PercentileSetError> {
        if ranks.len() < MIN_PERCENTILE_RANKS {
            return Err(PercentileSetError::TooFewRanks {
                len: ranks.len(),
                min: MIN_PERCENTILE_RANKS,
            });
        }
        if let Some(&rank) = ranks.iter().find(|r| !(0.0..=100.0).contains(*r)) {
            return Err(PercentileSetError::OutOfRange { rank });
        }
        if let Some(pair) = ranks.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(PercentileSetError::NotIncreasing {
                previous: pair[0],
                rank: pair[1],
            });
        }
        Ok(Self { ranks })
    }

    #[must_use]
    pub fn ranks(&self) -> &[f64] {
        &self.ranks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    #[must_use]
    pub fn is_standard(&self) -> bool {
        self.ranks == Self::STANDARD_RANKS
    }

    /// [`Self::STANDARD_VERSION`] for the standard set, `None` for a custom one.
    #[must_use]
    pub fn standard_version(&self) -> Option<u32> {
        self.is_standard().then_some(Self::STANDARD_VERSION)
    }

    /// Computes the landmarks of a set of intensities at these ranks.
    ///
    /// NaN intensities are ignored. Returns `None` when no intensity is left.
    pub fn landmarks<I>(&self, values: I) -> Option<Vec<f64>>
    where
        I: IntoIterator<Item = f32>,
    {
        let percentiles = Percentiles::new(values, &self.ranks);
        let landmarks = percentiles.values().collect::<Vec<_>>();
        if landmarks.iter().any(|v| v.is_nan()) {
            return None;
        }
        Some(landmarks)
    }
}

impl TryFrom<Vec<f64>> for PercentileSet {
    type Error = PercentileSetError;

    fn try_from(ranks: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(ranks)
    }
}

impl From<PercentileSet> for Vec<f64> {
    fn from(set: PercentileSet) -> Self {
        set.ranks
    }
}

impl fmt::Display for PercentileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, rank) in self.ranks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rank}")?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum LandmarkTableError {
    #[display("landmark table has {actual} values but its percentile set has {expected} ranks")]
    LengthMismatch { expected: usize, actual: usize },
    #[display("landmark value at index {index} is not finite")]
    NonFinite { index: usize },
    #[display("landmark values decrease at index {index}")]
    NotMonotonic { index: usize },
}

/// The learned model: averaged standard-space landmark values, one per rank.
///
/// Values are non-decreasing in rank order. Deserialization goes through
/// [`LandmarkTable::new`], so a reloaded table satisfies the same checks as
/// a freshly trained one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLandmarkTable")]
pub struct LandmarkTable {
    percentiles: PercentileSet,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawLandmarkTable {
    percentiles: PercentileSet,
    values: Vec<f64>,
}

impl TryFrom<RawLandmarkTable> for LandmarkTable {
    type Error = LandmarkTableError;

    fn try_from(raw: RawLandmarkTable) -> Result<Self, Self::Error> {
        Self::new(raw.percentiles, raw.values)
    }
}

impl LandmarkTable {
    pub fn new(percentiles: PercentileSet, values: Vec<f64>) -> Result<Self, LandmarkTableError> {
        if values.len() != percentiles.len() {
            return Err(LandmarkTableError::LengthMismatch {
                expected: percentiles.len(),
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(LandmarkTableError::NonFinite { index });
        }
        if let Some(index) = values.windows(2).position(|pair| pair[0] > pair[1]) {
            return Err(LandmarkTableError::NotMonotonic { index: index + 1 });
        }
        Ok(Self {
            percentiles,
            values,
        })
    }

    #[must_use]
    pub fn percentiles(&self) -> &PercentileSet {
        &self.percentiles
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Lowest standard-space value (at the first rank).
    #[must_use]
    pub fn first(&self) -> f64 {
        self.values[0]
    }

    /// Highest standard-space value (at the last rank).
    #[must_use]
    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Value learned for a specific rank, if the rank is part of the set.
    #[must_use]
    pub fn get(&self, rank: f64) -> Option<f64> {
        self.iter()
            .find(|(r, _)| (*r - rank).abs() < f64::EPSILON)
            .map(|(_, value)| value)
    }

    /// Iterates over (rank, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        iter::zip(self.percentiles.ranks(), &self.values).map(|(r, v)| (*r, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_values() -> Vec<f64> {
        (0..=10).map(|i| f64::from(i) * 100.0).collect()
    }

    #[test]
    fn test_standard_set() {
        let set = PercentileSet::default();
        assert!(set.is_standard());
        assert_eq!(set.ranks(), PercentileSet::STANDARD_RANKS);
        assert_eq!(
            set.to_string(),
            "[1, 10, 20, 30, 40, 50, 60, 70, 80, 90, 99]"
        );
        assert_eq!(set.standard_version(), Some(PercentileSet::STANDARD_VERSION));

        let custom = PercentileSet::new(vec![2.0, 50.0, 98.0]).unwrap();
        assert!(!custom.is_standard());
        assert_eq!(custom.standard_version(), None);
    }

    #[test]
    fn test_invalid_sets() {
        assert_eq!(
            PercentileSet::new(vec![1.0, 99.0]),
            Err(PercentileSetError::TooFewRanks { len: 2, min: 3 })
        );
        assert_eq!(
            PercentileSet::new(vec![1.0, 50.0, 101.0]),
            Err(PercentileSetError::OutOfRange { rank: 101.0 })
        );
        assert_eq!(
            PercentileSet::new(vec![1.0, 50.0, 50.0]),
            Err(PercentileSetError::NotIncreasing {
                previous: 50.0,
                rank: 50.0
            })
        );
        assert!(PercentileSet::new(vec![1.0, f64::NAN, 99.0]).is_err());
    }

    #[test]
    fn test_landmarks_of_empty_input() {
        let set = PercentileSet::standard();
        assert_eq!(set.landmarks([]), None);
        assert_eq!(set.landmarks([f32::NAN; 4]), None);
    }

    #[test]
    fn test_table_validation() {
        let set = PercentileSet::standard();
        assert!(LandmarkTable::new(set.clone(), linear_values()).is_ok());
        assert_eq!(
            LandmarkTable::new(set.clone(), vec![0.0; 3]),
            Err(LandmarkTableError::LengthMismatch {
                expected: 11,
                actual: 3
            })
        );

        let mut values = linear_values();
        values.swap(3, 4);
        assert_eq!(
            LandmarkTable::new(set.clone(), values),
            Err(LandmarkTableError::NotMonotonic { index: 4 })
        );

        let mut values = linear_values();
        values[7] = f64::INFINITY;
        assert_eq!(
            LandmarkTable::new(set, values),
            Err(LandmarkTableError::NonFinite { index: 7 })
        );
    }

    #[test]
    fn test_table_serde_round_trip() {
        let table = LandmarkTable::new(
            PercentileSet::standard(),
            vec![
                0.0,
                97.123_456_789,
                180.5,
                260.1,
                333.3,
                500.0,
                600.25,
                700.0,
                812.0,
                903.0,
                1000.0,
            ],
        )
        .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let reloaded: LandmarkTable = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn test_table_deserialization_rejects_inconsistent_tables() {
        let json = r#"{"percentiles":[1,50,99],"values":[0.0,600.0,500.0]}"#;
        assert!(serde_json::from_str::<LandmarkTable>(json).is_err());

        let json = r#"{"percentiles":[1,50,99],"values":[0.0,1000.0]}"#;
        assert!(serde_json::from_str::<LandmarkTable>(json).is_err());

        let json = r#"{"percentiles":[99,50,1],"values":[0.0,500.0,1000.0]}"#;
        assert!(serde_json::from_str::<LandmarkTable>(json).is_err());
    }
}
