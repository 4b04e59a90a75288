use std::path::{Path, PathBuf};

use anyhow::Context as _;
use nyulnorm_core::{
    config::{DEFAULT_I_MAX, DEFAULT_I_MIN, TrainConfig},
    landmarks::PercentileSet,
    train::LandmarkTrainer,
};
use tracing::{info, warn};

use crate::{
    image::NiftiImage,
    model::standardization_model::StandardizationModel,
    util::{self, Output},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Folder containing the training images (`.nii` or `.nii.gz`)
    #[arg(long)]
    pub(super) input_dir: PathBuf,
    /// Learn from every slice along the third axis instead of whole volumes
    #[arg(long)]
    pub(super) per_slice: bool,
    /// Lower bound of the standard intensity space
    #[arg(long, default_value_t = DEFAULT_I_MIN, allow_negative_numbers = true)]
    pub(super) i_min: f64,
    /// Upper bound of the standard intensity space
    #[arg(long, default_value_t = DEFAULT_I_MAX, allow_negative_numbers = true)]
    pub(super) i_max: f64,
    /// Comma-separated percentile ranks [default: 1,10,20,30,40,50,60,70,80,90,99]
    #[arg(long, value_delimiter = ',')]
    pub(super) percentiles: Option<Vec<f64>>,
    /// Output file path (default: stdout)
    #[arg(long)]
    pub(super) output: Option<PathBuf>,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg {
        input_dir,
        per_slice,
        i_min,
        i_max,
        percentiles,
        output,
    } = arg;

    let config = TrainConfig {
        i_min: *i_min,
        i_max: *i_max,
        per_slice: *per_slice,
        percentiles: percentile_set(percentiles.as_deref())?,
    };
    let images = util::list_images(input_dir)?;
    if images.is_empty() {
        info!("No image found in {}", input_dir.display());
        return Ok(());
    }

    let model = train_model(&images, config)?;
    Output::save_json(&model, output.clone())?;

    eprintln!();
    eprintln!("Model saved successfully");
    if let Some(path) = &output {
        eprintln!("  Path: {}", path.display());
    }
    print_model_summary(&model);

    Ok(())
}

/// Builds the percentile set from ranks given on the command line.
pub(super) fn percentile_set(ranks: Option<&[f64]>) -> anyhow::Result<PercentileSet> {
    match ranks {
        Some(ranks) => PercentileSet::new(ranks.to_vec())
            .with_context(|| format!("Invalid percentile ranks: {ranks:?}")),
        None => Ok(PercentileSet::standard()),
    }
}

/// Streams `images` through a trainer, one file in memory at a time.
///
/// An image that cannot be read or yields unusable landmarks is skipped with a
/// warning; it never contributes to the table.
pub(super) fn train_model(
    images: &[PathBuf],
    config: TrainConfig,
) -> anyhow::Result<StandardizationModel> {
    let mut trainer = LandmarkTrainer::new(config)?;
    let mut skipped = 0;
    for (i, path) in images.iter().enumerate() {
        info!(
            "Learning landmarks from image {}/{}: {}",
            i + 1,
            images.len(),
            path.display()
        );
        if let Err(e) = add_image(&mut trainer, path) {
            skipped += 1;
            warn!(
                "Skipping {} for training (percentile set {}): {e:#}",
                path.display(),
                trainer.config().percentiles
            );
        }
    }
    if skipped > 0 {
        warn!("{skipped} of {} images were skipped for training", images.len());
    }

    let config = trainer.config().clone();
    let num_images = trainer.num_images();
    let num_objects = trainer.num_objects();
    let landmarks = trainer
        .finish()
        .context("Failed to learn the standard landmarks")?;
    info!(num_images, num_objects, "Standard landmarks learned");
    Ok(StandardizationModel::new(
        &config,
        num_images,
        num_objects,
        landmarks,
    ))
}

fn add_image(trainer: &mut LandmarkTrainer, path: &Path) -> anyhow::Result<()> {
    let image = NiftiImage::open(path)?;
    trainer.add_image(image.data())?;
    Ok(())
}

pub(super) fn print_model_summary(model: &StandardizationModel) {
    eprintln!("  Trained at: {}", model.trained_at);
    eprintln!("  Images: {}", model.num_images);
    eprintln!(
        "  Objects: {} ({})",
        model.num_objects,
        if model.per_slice { "slices" } else { "volumes" }
    );
    eprintln!("  Standard range: [{}, {}]", model.i_min, model.i_max);
    eprintln!("  Landmarks:");
    for (rank, value) in model.landmarks.iter() {
        eprintln!("    {rank:5.1}%: {value:.3}");
    }
}
