use std::path::Path;

use anyhow::Context;
use ndarray::{ArrayD, ArrayViewD};
use nifti::{IntoNdArray as _, NiftiHeader, NiftiObject as _, ReaderOptions, writer::WriterOptions};

/// A NIfTI image held in memory as `f32` voxels.
///
/// The header is kept so that standardized data can be written back with the
/// geometry of the source image.
#[derive(Debug, Clone)]
pub struct NiftiImage {
    header: NiftiHeader,
    data: ArrayD<f32>,
}

impl NiftiImage {
    /// Reads a `.nii` or `.nii.gz` file.
    ///
    /// Stored values are converted to `f32` with the header's scaling applied.
    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let object = ReaderOptions::new()
            .read_file(path)
            .with_context(|| format!("Failed to read NIfTI image: {}", path.display()))?;
        let header = object.header().clone();
        let data = object
            .into_volume()
            .into_ndarray::<f32>()
            .with_context(|| format!("Failed to decode NIfTI volume: {}", path.display()))?;
        Ok(Self { header, data })
    }

    pub fn data(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// Writes `data` to `path` using this image's header as reference.
    ///
    /// The scaling of the reference is reset since `data` already holds
    /// final values.
    pub fn save_with_data<P>(&self, path: P, data: &ArrayD<f32>) -> anyhow::Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mut header = self.header.clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(data)
            .with_context(|| format!("Failed to write NIfTI image: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    #[test]
    fn test_write_then_read_keeps_voxels() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.nii");
        #[expect(clippy::cast_precision_loss)]
        let data = Array3::from_shape_fn((4, 3, 2), |(x, y, z)| (x * 6 + y * 2 + z) as f32 * 1.5)
            .into_dyn();
        WriterOptions::new(&source).write_nifti(&data).unwrap();

        let image = NiftiImage::open(&source).unwrap();
        assert_eq!(image.data().shape(), &[4, 3, 2]);
        assert_eq!(image.data(), data.view());

        let copy = dir.path().join("copy.nii.gz");
        let doubled = data.mapv(|v| v * 2.0);
        image.save_with_data(&copy, &doubled).unwrap();
        let reread = NiftiImage::open(&copy).unwrap();
        assert_eq!(reread.data(), doubled.view());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NiftiImage::open(dir.path().join("missing.nii")).is_err());
    }
}
