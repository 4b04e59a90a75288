use std::path::Path;

use anyhow::ensure;
use chrono::{DateTime, Utc};
use nyulnorm_core::{
    config::TrainConfig,
    landmarks::{LandmarkTable, PercentileSet},
};
use serde::{Deserialize, Serialize};

use crate::util;

/// Version of the model file layout written by this binary.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// File name used when a trained model is saved next to the standardized images.
pub const DEFAULT_MODEL_FILE_NAME: &str = "intensity_standardization_model.json";

/// A learned landmark table plus the training metadata needed to reuse it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StandardizationModel {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub i_min: f64,
    pub i_max: f64,
    pub per_slice: bool,
    pub num_images: usize,
    pub num_objects: usize,
    /// Version of the standard percentile set, absent for custom ranks
    #[serde(default)]
    pub percentile_version: Option<u32>,
    pub landmarks: LandmarkTable,
}

impl StandardizationModel {
    pub fn new(
        config: &TrainConfig,
        num_images: usize,
        num_objects: usize,
        landmarks: LandmarkTable,
    ) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            trained_at: Utc::now(),
            i_min: config.i_min,
            i_max: config.i_max,
            per_slice: config.per_slice,
            num_images,
            num_objects,
            percentile_version: landmarks.percentiles().standard_version(),
            landmarks,
        }
    }

    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let model: Self = util::read_json_file("standardization model", path)?;
        ensure!(
            model.format_version == MODEL_FORMAT_VERSION,
            "Unsupported standardization model format version {} in {} (expected {})",
            model.format_version,
            path.display(),
            MODEL_FORMAT_VERSION
        );
        let percentiles = model.landmarks.percentiles();
        ensure!(
            model.percentile_version == percentiles.standard_version(),
            "Percentile set version {:?} in {} does not match its ranks {} (standard: version {})",
            model.percentile_version,
            path.display(),
            percentiles,
            PercentileSet::STANDARD_VERSION
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Output;

    fn model() -> StandardizationModel {
        let landmarks = LandmarkTable::new(
            PercentileSet::standard(),
            vec![
                0.0,
                71.831_234_5,
                160.2,
                251.9,
                349.0,
                452.777_777_7,
                551.3,
                650.0,
                760.4,
                880.1,
                1000.0,
            ],
        )
        .unwrap();
        StandardizationModel::new(&TrainConfig::default(), 2, 2, landmarks)
    }

    #[test]
    fn test_model_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_MODEL_FILE_NAME);
        let model = model();
        Output::save_json(&model, Some(path.clone())).unwrap();
        let reloaded = StandardizationModel::open(&path).unwrap();
        assert_eq!(reloaded, model);
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_MODEL_FILE_NAME);
        let mut model = model();
        model.format_version = MODEL_FORMAT_VERSION + 1;
        Output::save_json(&model, Some(path.clone())).unwrap();
        assert!(StandardizationModel::open(&path).is_err());
    }

    #[test]
    fn test_percentile_version_is_recorded_and_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_MODEL_FILE_NAME);
        let mut model = model();
        assert_eq!(
            model.percentile_version,
            Some(PercentileSet::STANDARD_VERSION)
        );

        model.percentile_version = Some(PercentileSet::STANDARD_VERSION + 1);
        Output::save_json(&model, Some(path.clone())).unwrap();
        assert!(StandardizationModel::open(&path).is_err());

        let custom = LandmarkTable::new(
            PercentileSet::new(vec![2.0, 50.0, 98.0]).unwrap(),
            vec![0.0, 480.0, 1000.0],
        )
        .unwrap();
        let mut model = StandardizationModel::new(&TrainConfig::default(), 1, 1, custom);
        assert_eq!(model.percentile_version, None);
        Output::save_json(&model, Some(path.clone())).unwrap();
        assert!(StandardizationModel::open(&path).is_ok());

        model.percentile_version = Some(PercentileSet::STANDARD_VERSION);
        Output::save_json(&model, Some(path.clone())).unwrap();
        assert!(StandardizationModel::open(&path).is_err());
    }

    #[test]
    fn test_inconsistent_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_MODEL_FILE_NAME);
        let mut json = serde_json::to_value(model()).unwrap();
        json["landmarks"]["values"][3] = serde_json::json!(5000.0);
        Output::save_json(&json, Some(path.clone())).unwrap();
        assert!(StandardizationModel::open(&path).is_err());
    }
}
