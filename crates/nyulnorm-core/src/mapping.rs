//! Mapping image intensities into the standard space of a [`LandmarkTable`]
//!
//! For each image (or slice) the mapper computes the image's own landmarks,
//! then:
//!
//! 1. rejects landmark vectors with two equal neighbours
//!    ([`MapError::SingleIntensityAccumulation`]),
//! 2. interpolates linearly between image landmarks and table values inside
//!    the landmark range (both ends inclusive),
//! 3. extrapolates below the lowest landmark with an exponential tail fitted
//!    on the two lowest pairs, approaching the table's lowest value,
//! 4. extrapolates above the highest landmark according to [`TailMode`].
//!
//! NaN voxels stay NaN.
//!
//! # Example
//!
//! ```
//! use ndarray::Array1;
//! use nyulnorm_core::{
//!     landmarks::{LandmarkTable, PercentileSet},
//!     mapping::IntensityMapper,
//!     tail::TailMode,
//! };
//!
//! let table = LandmarkTable::new(
//!     PercentileSet::standard(),
//!     vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0],
//! )?;
//! let image = Array1::from_iter((0..1000).map(|v| v as f32)).into_dyn();
//!
//! let mapper = IntensityMapper::new(&table, TailMode::Flat);
//! let standardized = mapper.apply(image.view())?;
//! assert_eq!(standardized.shape(), image.shape());
//! assert_eq!(standardized[[999]], 1000.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use ndarray::{ArrayD, ArrayViewD, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    config::SLICE_AXIS,
    landmarks::{LandmarkTable, PercentileSet},
    tail::{ExponentialTail, ExtrapolationError, LinearTail, TailMode, UpperTail},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum MapError {
    #[display("image has no intensity values to compute landmarks from")]
    EmptyImage,
    #[display(
        "the image shows an unusual single-intensity accumulation: landmarks at percentiles \
         {lower_rank} and {upper_rank} are both {value} (percentile set {percentiles}, landmarks \
         {landmarks:?}). This is usually caused by a background that has not been removed; \
         otherwise retrain the model with fewer percentile ranks"
    )]
    SingleIntensityAccumulation {
        percentiles: PercentileSet,
        landmarks: Vec<f64>,
        lower_rank: f64,
        upper_rank: f64,
        value: f64,
    },
    #[display("failed to fit the {side} tail: {source}")]
    Extrapolation {
        side: TailSide,
        source: ExtrapolationError,
    },
    #[display(
        "percentile set {actual} of the landmark table does not match the expected set {expected}"
    )]
    PercentileMismatch {
        expected: PercentileSet,
        actual: PercentileSet,
    },
    #[display(
        "per-slice mapping needs at least {} dimensions, image has {ndim}",
        SLICE_AXIS + 1
    )]
    NotVolumetric { ndim: usize },
    #[display("slice {slice}: {source}")]
    Slice { slice: usize, source: Box<MapError> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TailSide {
    #[display("lower")]
    Lower,
    #[display("upper")]
    Upper,
}

/// Piecewise map from one image's intensities to standard space.
///
/// Built from the image's landmarks and a table; owns everything it needs so
/// it can be evaluated voxel by voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizationMap {
    /// Image landmarks, strictly increasing
    knots: Vec<f64>,
    /// Table values at the knots
    targets: Vec<f64>,
    lower: ExponentialTail,
    upper: UpperTail,
}

impl StandardizationMap {
    /// Builds the map for an image whose landmarks are `landmarks`.
    pub fn new(
        landmarks: Vec<f64>,
        table: &LandmarkTable,
        tail_mode: TailMode,
    ) -> Result<Self, MapError> {
        let percentiles = table.percentiles();
        assert_eq!(
            landmarks.len(),
            percentiles.len(),
            "one landmark per percentile rank"
        );
        if let Some(i) = landmarks.windows(2).position(|pair| pair[0] >= pair[1]) {
            let ranks = percentiles.ranks();
            return Err(MapError::SingleIntensityAccumulation {
                percentiles: percentiles.clone(),
                lower_rank: ranks[i],
                upper_rank: ranks[i + 1],
                value: landmarks[i],
                landmarks,
            });
        }

        let targets = table.values().to_vec();
        let pair = |i: usize| (landmarks[i], targets[i]);
        let n = landmarks.len();

        let lower = ExponentialTail::fit(pair(0), pair(1), table.first()).map_err(|e| {
            MapError::Extrapolation {
                side: TailSide::Lower,
                source: e,
            }
        })?;
        let upper = match tail_mode {
            // the highest pair itself lies on the asymptote, so the curve is
            // fitted on the two pairs below it
            TailMode::Exp => ExponentialTail::fit(pair(n - 3), pair(n - 2), table.last())
                .map(UpperTail::Exponential),
            TailMode::Linear => LinearTail::fit(pair(n - 2), pair(n - 1)).map(UpperTail::Linear),
            TailMode::Flat => Ok(UpperTail::Flat(table.last())),
        }
        .map_err(|e| MapError::Extrapolation {
            side: TailSide::Upper,
            source: e,
        })?;

        Ok(Self {
            knots: landmarks,
            targets,
            lower,
            upper,
        })
    }

    /// The image landmarks the map interpolates between.
    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let first = self.knots[0];
        let last = self.knots[self.knots.len() - 1];
        if x < first {
            return self.lower.eval(x);
        }
        if x > last {
            return self.upper.eval(x);
        }
        // first knot >= x; exists because x <= last
        let upper = self.knots.partition_point(|&k| k < x);
        if self.knots[upper] == x {
            return self.targets[upper];
        }
        let lower = upper - 1;
        let (x0, x1) = (self.knots[lower], self.knots[upper]);
        let (y0, y1) = (self.targets[lower], self.targets[upper]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

/// Applies a [`LandmarkTable`] to images.
///
/// The mapper only borrows the table, so one table can serve any number of
/// mappers and threads.
#[derive(Debug, Clone, Copy)]
pub struct IntensityMapper<'a> {
    table: &'a LandmarkTable,
    tail_mode: TailMode,
}

impl<'a> IntensityMapper<'a> {
    #[must_use]
    pub fn new(table: &'a LandmarkTable, tail_mode: TailMode) -> Self {
        Self { table, tail_mode }
    }

    /// Like [`Self::new`], but fails if the table was trained with a
    /// different percentile set than `expected`.
    pub fn with_expected_percentiles(
        table: &'a LandmarkTable,
        tail_mode: TailMode,
        expected: &PercentileSet,
    ) -> Result<Self, MapError> {
        if table.percentiles() != expected {
            return Err(MapError::PercentileMismatch {
                expected: expected.clone(),
                actual: table.percentiles().clone(),
            });
        }
        Ok(Self::new(table, tail_mode))
    }

    #[must_use]
    pub fn table(&self) -> &'a LandmarkTable {
        self.table
    }

    #[must_use]
    pub fn tail_mode(&self) -> TailMode {
        self.tail_mode
    }

    /// Computes the landmarks of an image with the table's percentile set.
    pub fn landmarks(&self, image: ArrayViewD<'_, f32>) -> Result<Vec<f64>, MapError> {
        self.table
            .percentiles()
            .landmarks(image.iter().copied())
            .ok_or(MapError::EmptyImage)
    }

    /// Builds the intensity map for one image without applying it.
    pub fn fit(&self, image: ArrayViewD<'_, f32>) -> Result<StandardizationMap, MapError> {
        let landmarks = self.landmarks(image)?;
        StandardizationMap::new(landmarks, self.table, self.tail_mode)
    }

    /// Maps every voxel of `image` into standard space using the image's own
    /// landmarks. The output has the shape of the input.
    #[expect(clippy::cast_possible_truncation)]
    pub fn apply(&self, image: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, MapError> {
        let map = self.fit(image.view())?;
        Ok(image.mapv(|v| map.eval(f64::from(v)) as f32))
    }

    /// Maps a whole volume, either at once or slice by slice along
    /// [`SLICE_AXIS`].
    ///
    /// In per-slice mode every slice is mapped with its own landmarks; the
    /// first failing slice fails the volume.
    pub fn apply_volume(
        &self,
        volume: ArrayViewD<'_, f32>,
        per_slice: bool,
    ) -> Result<ArrayD<f32>, MapError> {
        if !per_slice {
            return self.apply(volume);
        }
        if volume.ndim() <= SLICE_AXIS {
            return Err(MapError::NotVolumetric {
                ndim: volume.ndim(),
            });
        }

        let slices = volume.axis_iter(Axis(SLICE_AXIS)).collect::<Vec<_>>();
        debug!(num_slices = slices.len(), "mapping volume slice by slice");
        let mapped = slices
            .par_iter()
            .enumerate()
            .map(|(slice, view)| {
                self.apply(view.view()).map_err(|e| MapError::Slice {
                    slice,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut output = ArrayD::zeros(volume.raw_dim());
        for (slice, mapped) in mapped.iter().enumerate() {
            output
                .index_axis_mut(Axis(SLICE_AXIS), slice)
                .assign(mapped);
        }
        Ok(output)
    }
}

/// Maps one image with `table`; see [`IntensityMapper::apply`].
pub fn apply(
    image: ArrayViewD<'_, f32>,
    table: &LandmarkTable,
    tail_mode: TailMode,
) -> Result<ArrayD<f32>, MapError> {
    IntensityMapper::new(table, tail_mode).apply(image)
}
