use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use nyulnorm_core::{mapping::IntensityMapper, tail::TailMode};
use nyulnorm_stats::descriptive::DescriptiveStats;
use tracing::{info, warn};

use crate::{
    command::train::percentile_set,
    image::NiftiImage,
    model::standardization_model::StandardizationModel,
    util,
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ApplyArg {
    /// Model file written by `train` or `run`
    #[arg(long)]
    pub(super) model: PathBuf,
    /// Folder containing the images to standardize
    #[arg(long)]
    pub(super) input_dir: PathBuf,
    /// Folder for the standardized images (default: `<input-dir>/standardized_data`)
    #[arg(long)]
    pub(super) output_dir: Option<PathBuf>,
    /// Model for intensities above the highest landmark (exp, linear or flat)
    #[arg(long, default_value = "exp")]
    pub(super) tail: TailMode,
    /// Map each slice with its own landmarks (implied by a per-slice model)
    #[arg(long)]
    pub(super) per_slice: bool,
    /// Percentile ranks the model must have been trained with
    #[arg(long, value_delimiter = ',')]
    pub(super) percentiles: Option<Vec<f64>>,
}

pub(crate) fn run(arg: &ApplyArg) -> anyhow::Result<()> {
    let ApplyArg {
        model,
        input_dir,
        output_dir,
        tail,
        per_slice,
        percentiles,
    } = arg;

    let model_path = model;
    let model = StandardizationModel::open(model_path)?;
    if let Some(ranks) = percentiles {
        let expected = percentile_set(Some(ranks.as_slice()))?;
        IntensityMapper::with_expected_percentiles(&model.landmarks, *tail, &expected)
            .with_context(|| format!("Model {} cannot be applied", model_path.display()))?;
    }

    let images = util::list_images(input_dir)?;
    if images.is_empty() {
        info!("No image found in {}", input_dir.display());
        return Ok(());
    }
    let output_dir = util::resolve_output_dir(input_dir, output_dir.as_deref())?;
    let per_slice = *per_slice || model.per_slice;

    standardize_images(&images, &model, &output_dir, *tail, per_slice)
}

/// Standardizes every image in `images` into `output_dir`, keeping file names.
///
/// Images are processed independently: a failure is logged and the batch
/// continues. The batch fails at the end if any image failed.
pub(super) fn standardize_images(
    images: &[PathBuf],
    model: &StandardizationModel,
    output_dir: &Path,
    tail_mode: TailMode,
    per_slice: bool,
) -> anyhow::Result<()> {
    let mapper = IntensityMapper::new(&model.landmarks, tail_mode);
    info!(
        tail = %tail_mode,
        per_slice,
        output_dir = %output_dir.display(),
        "Standardizing {} images",
        images.len()
    );

    let mut failed = 0;
    for (i, path) in images.iter().enumerate() {
        info!(
            "Standardizing image {}/{}: {}",
            i + 1,
            images.len(),
            path.display()
        );
        if let Err(e) = standardize_image(&mapper, path, output_dir, per_slice) {
            failed += 1;
            warn!(
                "Failed to standardize {} (percentile set {}): {e:#}",
                path.display(),
                model.landmarks.percentiles()
            );
        }
    }

    eprintln!();
    eprintln!("Standardization completed");
    eprintln!("  Output folder: {}", output_dir.display());
    eprintln!("  Images: {}", images.len() - failed);
    if failed > 0 {
        eprintln!("  Failed: {failed}");
        bail!("{failed} of {} images could not be standardized", images.len());
    }
    Ok(())
}

fn standardize_image(
    mapper: &IntensityMapper<'_>,
    path: &Path,
    output_dir: &Path,
    per_slice: bool,
) -> anyhow::Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid image path: {}", path.display()))?;
    let output_path = output_dir.join(file_name);

    let image = NiftiImage::open(path)?;
    let standardized = mapper.apply_volume(image.data(), per_slice)?;

    if let Some(stats) = DescriptiveStats::new(standardized.iter().copied()) {
        info!(
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            std_dev = stats.std_dev,
            "Standardized intensities"
        );
    }
    if output_path.exists() {
        warn!("Overwriting existing file {}", output_path.display());
    }
    image.save_with_data(&output_path, &standardized)?;
    Ok(output_path)
}
