use std::path::Path;

use async_trait::async_trait;

use crate::Result;

use super::types::{CompressionOptions, ExtractOptions};

/// Media extraction backend (yt-dlp in production).
///
/// Implementations report failures as `Error::External` carrying the tool's
/// own message; the downloader maps that text into typed, user-facing
/// failures.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Metadata-only mode: must not write any file.
    async fn dump_metadata(&self, url: &str, opts: &ExtractOptions) -> Result<serde_json::Value>;

    /// Download the media for `url` into exactly `output`.
    async fn download(&self, url: &str, output: &Path, opts: &ExtractOptions) -> Result<()>;
}

/// Video transcoding backend (ffmpeg in production).
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Re-encode `source` into `target`. Never touches `source`.
    async fn transcode(&self, source: &Path, target: &Path, opts: &CompressionOptions)
        -> Result<()>;
}
