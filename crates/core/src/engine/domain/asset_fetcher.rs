use std::path::PathBuf;

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Makes a remote engine asset available as a local file.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str, progress: Option<ProgressFn>) -> Result<PathBuf, FetchError>;
}
