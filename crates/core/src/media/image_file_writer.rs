use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageWriteError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to clear {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Writes result images into one output directory, creating it on first use.
pub struct ImageFileWriter {
    out_dir: PathBuf,
}

impl ImageFileWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write already-encoded bytes (e.g. a PNG crop) as `file_name`.
    pub fn write_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ImageWriteError> {
        let path = self.prepare(file_name)?;
        fs::write(&path, bytes).map_err(|source| ImageWriteError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Encode and write an image; the format follows the file extension.
    pub fn write_image(&self, file_name: &str, image: &RgbImage) -> Result<PathBuf, ImageWriteError> {
        let path = self.prepare(file_name)?;
        image.save(&path).map_err(|source| ImageWriteError::Encode {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Deletes files left by an earlier run whose names start with `prefix`
    /// and end with `suffix`. A missing output directory has nothing to clear.
    pub fn remove_matching(&self, prefix: &str, suffix: &str) -> Result<usize, ImageWriteError> {
        let clear_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ImageWriteError::Clear { path, source }
        };
        let entries = match fs::read_dir(&self.out_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(clear_error(&self.out_dir)(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(clear_error(&self.out_dir))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(prefix) && name.ends_with(suffix) && path.is_file() {
                fs::remove_file(&path).map_err(clear_error(&path))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn prepare(&self, file_name: &str) -> Result<PathBuf, ImageWriteError> {
        fs::create_dir_all(&self.out_dir).map_err(|source| ImageWriteError::CreateDir {
            path: self.out_dir.clone(),
            source,
        })?;
        Ok(self.out_dir.join(file_name))
    }
}
