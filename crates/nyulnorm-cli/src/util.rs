use std::{
    fs::{self, File},
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;

/// File name suffixes recognized as NIfTI images.
pub const IMAGE_EXTENSIONS: [&str; 2] = [".nii", ".nii.gz"];

/// Folder created inside the input folder when no output folder is given.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "standardized_data";

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Whether `path` names a NIfTI image by its extension
pub fn is_image_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// List the NIfTI images directly inside a folder
///
/// Sub-folders are not searched. The result is sorted by path so that
/// training and batch order are reproducible.
///
/// # Errors
///
/// Returns error if the folder cannot be read
pub fn list_images<P>(dir: P) -> anyhow::Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
{
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read input folder: {}", dir.display()))?;

    let mut images = vec![];
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read entry of {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Resolve the folder standardized images are written to
///
/// An explicitly requested folder is used if it exists; otherwise the images
/// go to `standardized_data` inside the input folder, which is created when
/// missing.
///
/// # Errors
///
/// Returns error if the default folder cannot be created
pub fn resolve_output_dir(input_dir: &Path, requested: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = requested {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        tracing::warn!(
            "Output folder {} does not exist, falling back to {}",
            dir.display(),
            input_dir.join(DEFAULT_OUTPUT_DIR_NAME).display()
        );
    }
    let dir = input_dir.join(DEFAULT_OUTPUT_DIR_NAME);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output folder: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extensions() {
        assert!(is_image_file("scan.nii"));
        assert!(is_image_file("/data/t1/scan.nii.gz"));
        assert!(!is_image_file("scan.gz"));
        assert!(!is_image_file("scan.nii.bak"));
        assert!(!is_image_file("model.json"));
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nii.gz", "a.nii", "notes.txt", "c.nii.zip"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested.nii")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, ["a.nii", "b.nii.gz"]);
    }

    #[test]
    fn test_resolve_output_dir() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let resolved = resolve_output_dir(input.path(), Some(output.path())).unwrap();
        assert_eq!(resolved, output.path());

        let missing = input.path().join("missing");
        let resolved = resolve_output_dir(input.path(), Some(&missing)).unwrap();
        assert_eq!(resolved, input.path().join(DEFAULT_OUTPUT_DIR_NAME));
        assert!(resolved.is_dir());

        let resolved = resolve_output_dir(input.path(), None).unwrap();
        assert_eq!(resolved, input.path().join(DEFAULT_OUTPUT_DIR_NAME));
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        Output::save_json(&vec![1.5, 2.25], Some(path.clone())).unwrap();
        let values: Vec<f64> = read_json_file("values", &path).unwrap();
        assert_eq!(values, [1.5, 2.25]);
    }
}
