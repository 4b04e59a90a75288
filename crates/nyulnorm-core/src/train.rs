//! Learning a [`LandmarkTable`] from a training corpus
//!
//! Every training object (a whole image, or one slice of it in per-slice
//! mode) contributes one landmark row: its landmarks rescaled by the affine
//! transform sending the first landmark to `i_min` and the last to `i_max`.
//! The table is the per-rank mean of all rows, so object order does not
//! matter.
//!
//! # Example
//!
//! ```
//! use ndarray::Array1;
//! use nyulnorm_core::{config::TrainConfig, train::train};
//!
//! let a = Array1::from_iter((0..1000).map(|v| v as f32)).into_dyn();
//! let b = Array1::from_iter((0..1000).map(|v| v as f32 * 2.0)).into_dyn();
//!
//! let table = train([a.view(), b.view()], &TrainConfig::default())?;
//! assert_eq!(table.first(), 0.0);
//! assert!((table.last() - 1000.0).abs() < 1e-9);
//! assert!((table.get(50.0).unwrap() - 500.0).abs() < 1e-9);
//! # Ok::<(), nyulnorm_core::train::TrainError>(())
//! ```

use std::fmt;

use ndarray::{ArrayViewD, Axis};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    config::{SLICE_AXIS, TrainConfig},
    landmarks::{LandmarkTable, LandmarkTableError, PercentileSet},
};

/// Identifies one training object in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId {
    pub image: usize,
    pub slice: Option<usize>,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slice {
            Some(slice) => write!(f, "image #{} slice {slice}", self.image),
            None => write!(f, "image #{}", self.image),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum TrainError {
    #[display("no training images were provided")]
    NoImages,
    #[display("invalid intensity bounds: i_min ({i_min}) must be finite and below i_max ({i_max})")]
    InvalidBounds { i_min: f64, i_max: f64 },
    #[display("{object} has no intensity values to compute landmarks from")]
    EmptyObject { object: ObjectId },
    #[display(
        "{object} has equal landmarks at the lowest and highest percentile ({value}, percentile \
         set {percentiles}); remove the background or train with a different percentile set"
    )]
    DegenerateObject {
        object: ObjectId,
        value: f64,
        percentiles: PercentileSet,
    },
    #[display(
        "per-slice training needs at least {} dimensions, image #{image} has {ndim}",
        SLICE_AXIS + 1
    )]
    NotVolumetric { image: usize, ndim: usize },
    #[display("learned landmarks are inconsistent: {source}")]
    Table { source: LandmarkTableError },
}

/// Rescales landmarks with the affine transform mapping the first landmark to
/// `i_min` and the last one to `i_max`.
///
/// Returns `None` if the first and last landmark are equal.
fn rescale(landmarks: &[f64], i_min: f64, i_max: f64) -> Option<Vec<f64>> {
    let first = *landmarks.first()?;
    let last = *landmarks.last()?;
    let span = last - first;
    if span == 0.0 || !span.is_finite() {
        return None;
    }
    Some(
        landmarks
            .iter()
            .map(|v| i_min + (v - first) / span * (i_max - i_min))
            .collect(),
    )
}

/// Incremental trainer.
///
/// Images are added one at a time so a caller can stream a corpus from disk;
/// only the running per-rank sums are kept.
#[derive(Debug, Clone)]
pub struct LandmarkTrainer {
    config: TrainConfig,
    sums: Vec<f64>,
    num_images: usize,
    num_objects: usize,
}

impl LandmarkTrainer {
    pub fn new(config: TrainConfig) -> Result<Self, TrainError> {
        let TrainConfig { i_min, i_max, .. } = config;
        if !i_min.is_finite() || !i_max.is_finite() || i_min >= i_max {
            return Err(TrainError::InvalidBounds { i_min, i_max });
        }
        if config.per_slice {
            warn!(
                "training per slice: make sure axis {SLICE_AXIS} of the input volumes runs \
                 along the anatomical axis to standardize (e.g. superior to inferior)"
            );
        }
        Ok(Self {
            sums: vec![0.0; config.percentiles.len()],
            config,
            num_images: 0,
            num_objects: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Number of images added so far.
    #[must_use]
    pub fn num_images(&self) -> usize {
        self.num_images
    }

    /// Number of training objects (images or slices) added so far.
    #[must_use]
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// Adds one image to the corpus.
    ///
    /// On error the trainer is left unchanged, so the caller may skip the
    /// image and continue.
    pub fn add_image(&mut self, image: ArrayViewD<'_, f32>) -> Result<(), TrainError> {
        let index = self.num_images;
        let objects = if self.config.per_slice {
            if image.ndim() <= SLICE_AXIS {
                return Err(TrainError::NotVolumetric {
                    image: index,
                    ndim: image.ndim(),
                });
            }
            image
                .axis_iter(Axis(SLICE_AXIS))
                .enumerate()
                .map(|(slice, view)| {
                    let id = ObjectId {
                        image: index,
                        slice: Some(slice),
                    };
                    (id, view)
                })
                .collect::<Vec<_>>()
        } else {
            let id = ObjectId {
                image: index,
                slice: None,
            };
            vec![(id, image.view())]
        };

        let rows = objects
            .par_iter()
            .map(|(id, view)| self.landmark_row(*id, view))
            .collect::<Result<Vec<_>, _>>()?;

        for row in &rows {
            for (sum, value) in self.sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        self.num_images += 1;
        self.num_objects += rows.len();
        debug!(
            image = index,
            objects = rows.len(),
            "added landmark rows to the training corpus"
        );
        Ok(())
    }

    fn landmark_row(
        &self,
        object: ObjectId,
        view: &ArrayViewD<'_, f32>,
    ) -> Result<Vec<f64>, TrainError> {
        let TrainConfig {
            i_min,
            i_max,
            ref percentiles,
            ..
        } = self.config;
        let landmarks = percentiles
            .landmarks(view.iter().copied())
            .ok_or(TrainError::EmptyObject { object })?;
        rescale(&landmarks, i_min, i_max).ok_or_else(|| TrainError::DegenerateObject {
            object,
            value: landmarks[0],
            percentiles: percentiles.clone(),
        })
    }

    /// Averages the collected rows into the landmark table.
    #[expect(clippy::cast_precision_loss)]
    pub fn finish(self) -> Result<LandmarkTable, TrainError> {
        if self.num_objects == 0 {
            return Err(TrainError::NoImages);
        }
        let n = self.num_objects as f64;
        let values = self.sums.into_iter().map(|sum| sum / n).collect();
        LandmarkTable::new(self.config.percentiles, values)
            .map_err(|source| TrainError::Table { source })
    }
}

/// Learns a landmark table from a corpus of images.
pub fn train<'a, I>(images: I, config: &TrainConfig) -> Result<LandmarkTable, TrainError>
where
    I: IntoIterator<Item = ArrayViewD<'a, f32>>,
{
    let mut trainer = LandmarkTrainer::new(config.clone())?;
    for image in images {
        trainer.add_image(image)?;
    }
    trainer.finish()
}
