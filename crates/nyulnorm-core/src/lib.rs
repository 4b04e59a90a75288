//! Landmark-based intensity standardization (Nyul et al. 2000)
//!
//! Raw intensities of scans such as MRI are not comparable across scanners
//! and protocols. This crate learns a standard intensity space from a
//! training corpus and maps new images onto it.
//!
//! # Overview
//!
//! 1. **Train** ([`train::LandmarkTrainer`]): compute every training image's
//!    landmarks at the ranks of a [`landmarks::PercentileSet`], rescale them
//!    to `[i_min, i_max]`, and average them into a [`landmarks::LandmarkTable`].
//! 2. **Map** ([`mapping::IntensityMapper`]): compute an image's own
//!    landmarks, interpolate piecewise linearly onto the table, and extrapolate
//!    beyond the landmark range with the models in [`tail`].
//!
//! Training runs once per corpus; mapping runs once per image, whether or not
//! the image was part of training. The table is immutable after training and
//! can be shared freely across threads.
//!
//! # Example
//!
//! ```
//! use ndarray::Array1;
//! use nyulnorm_core::{
//!     config::TrainConfig, mapping::IntensityMapper, tail::TailMode, train::train,
//! };
//!
//! let scans = [
//!     Array1::from_iter((0..1000).map(|v| v as f32)).into_dyn(),
//!     Array1::from_iter((0..1000).map(|v| v as f32 * 3.0 + 20.0)).into_dyn(),
//! ];
//! let table = train(scans.iter().map(|scan| scan.view()), &TrainConfig::default())?;
//!
//! let mapper = IntensityMapper::new(&table, TailMode::Exp);
//! let standardized = mapper.apply(scans[1].view())?;
//! assert_eq!(standardized.len(), 1000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod landmarks;
pub mod mapping;
pub mod tail;
pub mod train;
