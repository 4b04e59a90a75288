use crate::landmarks::PercentileSet;

/// Default lower bound of the standard intensity space.
pub const DEFAULT_I_MIN: f64 = 0.0;
/// Default upper bound of the standard intensity space.
pub const DEFAULT_I_MAX: f64 = 1000.0;

/// Axis along which per-slice mode cuts volumes into 2D slices.
pub const SLICE_AXIS: usize = 2;

/// Training parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Standard-space value the first landmark of every object is mapped to
    pub i_min: f64,
    /// Standard-space value the last landmark of every object is mapped to
    pub i_max: f64,
    /// Learn from every slice along [`SLICE_AXIS`] instead of whole volumes.
    ///
    /// The caller is responsible for that axis being anatomically meaningful
    /// (e.g. superior to inferior for axial slices).
    pub per_slice: bool,
    pub percentiles: PercentileSet,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            i_min: DEFAULT_I_MIN,
            i_max: DEFAULT_I_MAX,
            per_slice: false,
            percentiles: PercentileSet::standard(),
        }
    }
}
