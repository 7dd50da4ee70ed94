use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::engine::domain::asset_fetcher::{AssetFetcher, FetchError, ProgressFn};
use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum AssetResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write asset to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("cannot derive a file name from {0}")]
    UnnamedAsset(String),
}

/// Resolve an asset file by name, checking cache locations before downloading.
///
/// Resolution order:
/// 1. `cache_dir`
/// 2. Bundled path (for development / pre-packaged installs)
/// 3. Download from URL into `cache_dir`
///
/// Probing for an existing file before downloading means an asset is
/// fetched at most once per cache directory.
pub fn resolve(
    name: &str,
    url: &str,
    cache_dir: &Path,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, AssetResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = bundled_dir {
        let bundled_path = dir.join(name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    fs::create_dir_all(cache_dir).map_err(AssetResolveError::CacheDir)?;
    log::info!("Downloading {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific asset cache directory.
///
/// - macOS: `~/Library/Application Support/FaceCompare/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceCompare/models/` or `~/.cache/FaceCompare/models/`
/// - Windows: `%LOCALAPPDATA%/FaceCompare/models/`
pub fn asset_cache_dir() -> Result<PathBuf, AssetResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(AssetResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(AssetResolveError::NoCacheDir)
    }
}

/// File name for an asset URL: the last path segment, without query or fragment.
pub fn asset_name(url: &str) -> Result<&str, AssetResolveError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .ok_or_else(|| AssetResolveError::UnnamedAsset(url.to_string()))
}

/// [`AssetFetcher`] backed by [`resolve`]: on-disk cache first, HTTP second.
pub struct CachedAssetFetcher {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
}

impl CachedAssetFetcher {
    pub fn new(cache_dir: PathBuf, bundled_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir,
            bundled_dir,
        }
    }

    /// Fetcher rooted at the platform cache directory.
    pub fn with_default_cache() -> Result<Self, AssetResolveError> {
        Ok(Self::new(asset_cache_dir()?, None))
    }
}

impl AssetFetcher for CachedAssetFetcher {
    fn fetch(&self, url: &str, progress: Option<ProgressFn>) -> Result<PathBuf, FetchError> {
        let name = asset_name(url)?;
        let path = resolve(
            name,
            url,
            &self.cache_dir,
            self.bundled_dir.as_deref(),
            progress,
        )?;
        Ok(path)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), AssetResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), AssetResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| AssetResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(|e| AssetResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    // Stream in chunks so large models never sit in memory whole.
    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| AssetResolveError::Write {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| AssetResolveError::Write {
                path: temp_path.to_path_buf(),
                source: e,
            })?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| AssetResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| AssetResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
