use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ImageReadError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {0} has no pixels")]
    Empty(PathBuf),
}

/// Decodes an image file at native resolution into an RGB [`Frame`].
///
/// The format is sniffed from the file contents, falling back to the
/// extension for formats without a signature (e.g. TGA). Alpha is dropped and
/// grayscale or 16-bit sources are converted to RGB8.
pub fn read_image(path: &Path) -> Result<Frame, ImageReadError> {
    let open_error = |source| ImageReadError::Open {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(open_error)?
        .with_guessed_format()
        .map_err(open_error)?
        .decode()
        .map_err(|source| ImageReadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ImageReadError::Empty(path.to_path_buf()));
    }
    log::info!("Read {} ({}x{})", path.display(), img.width(), img.height());
    Ok(Frame::from_rgb_image(img.into_rgb8()))
}
