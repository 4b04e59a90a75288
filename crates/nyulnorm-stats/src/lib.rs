//! Statistical utilities for intensity standardization.
//!
//! This crate provides the small set of statistics the landmark pipeline
//! needs:
//!
//! - **Percentiles**: percentile estimation with linear interpolation between
//!   order statistics
//! - **Descriptive statistics**: min, max, mean and standard deviation of an
//!   intensity set
//!
//! # Modules
//!
//! - [`percentiles`]: Percentile computation and storage
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//!
//! # Examples
//!
//! ## Computing percentiles
//!
//! ```
//! use nyulnorm_stats::percentiles::Percentiles;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let percentiles = Percentiles::new(values, &[25.0, 50.0, 75.0]);
//! assert_eq!(percentiles.get(50.0), Some(3.0));
//! ```
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use nyulnorm_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```

pub mod descriptive;
pub mod percentiles;
