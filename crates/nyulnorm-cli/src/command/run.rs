use std::path::PathBuf;

use anyhow::Context as _;
use nyulnorm_core::{
    config::{DEFAULT_I_MAX, DEFAULT_I_MIN, TrainConfig},
    mapping::IntensityMapper,
    tail::TailMode,
};
use tracing::{info, warn};

use crate::{
    command::{
        apply::standardize_images,
        train::{percentile_set, print_model_summary, train_model},
    },
    model::standardization_model::{DEFAULT_MODEL_FILE_NAME, StandardizationModel},
    util::{self, Output},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Folder containing the images to train on and standardize
    #[arg(long)]
    pub(super) input_dir: PathBuf,
    /// Folder for the standardized images (default: `<input-dir>/standardized_data`)
    #[arg(long)]
    pub(super) output_dir: Option<PathBuf>,
    /// Model file to reuse, or to create if missing (default: inside the output folder)
    #[arg(long)]
    pub(super) model: Option<PathBuf>,
    /// Train and map slice by slice along the third axis
    #[arg(long)]
    pub(super) per_slice: bool,
    /// Model for intensities above the highest landmark (exp, linear or flat)
    #[arg(long, default_value = "exp")]
    pub(super) tail: TailMode,
    /// Lower bound of the standard intensity space
    #[arg(long, default_value_t = DEFAULT_I_MIN, allow_negative_numbers = true)]
    pub(super) i_min: f64,
    /// Upper bound of the standard intensity space
    #[arg(long, default_value_t = DEFAULT_I_MAX, allow_negative_numbers = true)]
    pub(super) i_max: f64,
    /// Comma-separated percentile ranks [default: 1,10,20,30,40,50,60,70,80,90,99]
    #[arg(long, value_delimiter = ',')]
    pub(super) percentiles: Option<Vec<f64>>,
}

/// Trains on the input folder unless the model file already exists, then
/// standardizes every input image with it.
pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let RunArg {
        input_dir,
        output_dir,
        model,
        per_slice,
        tail,
        i_min,
        i_max,
        percentiles,
    } = arg;

    let images = util::list_images(input_dir)?;
    if images.is_empty() {
        info!("No image found in {}", input_dir.display());
        return Ok(());
    }
    let output_dir = util::resolve_output_dir(input_dir, output_dir.as_deref())?;
    let model_path = model
        .clone()
        .unwrap_or_else(|| output_dir.join(DEFAULT_MODEL_FILE_NAME));

    let model = if model_path.is_file() {
        info!("Using existing model {}", model_path.display());
        let model = StandardizationModel::open(&model_path)?;
        if let Some(ranks) = percentiles {
            let expected = percentile_set(Some(ranks.as_slice()))?;
            IntensityMapper::with_expected_percentiles(&model.landmarks, *tail, &expected)
                .with_context(|| format!("Model {} cannot be applied", model_path.display()))?;
        }
        if model.per_slice != *per_slice {
            warn!(
                "Model {} was trained {}, but {} mapping was requested",
                model_path.display(),
                if model.per_slice { "per slice" } else { "per volume" },
                if *per_slice { "per-slice" } else { "per-volume" },
            );
        }
        model
    } else {
        let config = TrainConfig {
            i_min: *i_min,
            i_max: *i_max,
            per_slice: *per_slice,
            percentiles: percentile_set(percentiles.as_deref())?,
        };
        let model = train_model(&images, config)?;
        Output::save_json(&model, Some(model_path.clone()))?;

        eprintln!();
        eprintln!("Model saved successfully");
        eprintln!("  Path: {}", model_path.display());
        print_model_summary(&model);
        model
    };

    standardize_images(&images, &model, &output_dir, *tail, *per_slice)
}
