//! Per-platform downloaders.
//!
//! One strategy ([`ExtractorDownloader`]) drives the media extractor; platform
//! quirks (headers, auth context, error wording) live in a [`PlatformProfile`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{DownloadResult, Platform, VideoInfo},
    errors::{Error, FetchFailure, FetchFailureKind},
    media::{
        client::MediaExtractor,
        types::{ExtractOptions, BROWSER_USER_AGENT, DEFAULT_CONTAINER, DEFAULT_FORMAT},
    },
    utils::{bytes_to_mb, remove_with_siblings, unique_temp_path, wait_for_file},
    Result,
};

/// Capability set shared by every platform downloader.
#[async_trait]
pub trait Downloader: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch_metadata(&self, url: &str) -> Result<VideoInfo>;

    /// Fetch the media into the temp directory. On failure no partial file remains.
    async fn fetch_media(&self, url: &str) -> Result<DownloadResult>;
}

/// Maps a known upstream failure string to a typed, user-facing failure.
#[derive(Clone, Debug)]
pub struct ErrorRule {
    pub needles: &'static [&'static str],
    pub kind: FetchFailureKind,
    pub message: &'static str,
}

/// Platform-specific configuration injected into the shared strategy.
#[derive(Clone, Debug)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub headers: Vec<String>,
    /// Stored session-cookie artifact passed to the extractor, if any.
    pub cookies_file: Option<PathBuf>,
    pub no_playlist: bool,
    pub no_check_certificates: bool,
    pub error_rules: Vec<ErrorRule>,
}

const YOUTUBE_ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        needles: &["Sign in to confirm you're not a bot", "Sign in to confirm you’re not a bot"],
        kind: FetchFailureKind::AuthRequired,
        message: "YouTube requires authentication. Please try again later or use a different video.",
    },
    ErrorRule {
        needles: &["Video unavailable"],
        kind: FetchFailureKind::Unavailable,
        message: "This video is unavailable. It may be private or deleted.",
    },
    ErrorRule {
        needles: &["Private video"],
        kind: FetchFailureKind::Private,
        message: "This video is private and cannot be downloaded.",
    },
    ErrorRule {
        needles: &["Age restricted", "age-restricted", "Sign in to confirm your age"],
        kind: FetchFailureKind::AgeRestricted,
        message: "This video is age-restricted and cannot be downloaded.",
    },
];

impl PlatformProfile {
    pub fn youtube(cookies_file: Option<PathBuf>) -> Self {
        Self {
            platform: Platform::YouTube,
            headers: vec![
                "referer:youtube.com".to_string(),
                format!("user-agent:{BROWSER_USER_AGENT}"),
            ],
            cookies_file,
            no_playlist: true,
            no_check_certificates: false,
            error_rules: YOUTUBE_ERROR_RULES.to_vec(),
        }
    }

    pub fn facebook() -> Self {
        Self {
            platform: Platform::Facebook,
            headers: vec![format!("user-agent:{BROWSER_USER_AGENT}")],
            cookies_file: None,
            no_playlist: false,
            no_check_certificates: true,
            error_rules: Vec::new(),
        }
    }

    pub fn instagram() -> Self {
        Self {
            platform: Platform::Instagram,
            headers: vec![format!("user-agent:{BROWSER_USER_AGENT}")],
            cookies_file: None,
            no_playlist: false,
            no_check_certificates: false,
            error_rules: Vec::new(),
        }
    }

    fn metadata_options(&self) -> ExtractOptions {
        ExtractOptions {
            headers: self.headers.clone(),
            cookies_file: self.cookies_file.clone(),
            no_playlist: self.no_playlist,
            no_check_certificates: self.no_check_certificates,
            format: None,
            merge_output_format: None,
        }
    }

    fn download_options(&self) -> ExtractOptions {
        ExtractOptions {
            format: Some(DEFAULT_FORMAT.to_string()),
            merge_output_format: Some(DEFAULT_CONTAINER.to_string()),
            ..self.metadata_options()
        }
    }

    /// Special-case known upstream failures; `None` means "use the generic message".
    pub fn classify_failure(&self, detail: &str) -> Option<FetchFailure> {
        self.error_rules
            .iter()
            .find(|rule| rule.needles.iter().any(|n| detail.contains(n)))
            .map(|rule| FetchFailure::new(rule.kind, rule.message))
    }
}

/// Settings shared by all platform downloaders.
#[derive(Clone, Debug)]
pub struct DownloadSettings {
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
    pub settle_timeout: Duration,
}

impl DownloadSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            temp_dir: cfg.temp_dir.clone(),
            max_file_size: cfg.max_file_size,
            settle_timeout: cfg.file_settle_timeout,
        }
    }

    fn max_file_size_mb(&self) -> f64 {
        bytes_to_mb(self.max_file_size)
    }
}

/// Downloader strategy over a [`MediaExtractor`].
pub struct ExtractorDownloader {
    profile: PlatformProfile,
    extractor: Arc<dyn MediaExtractor>,
    settings: DownloadSettings,
}

impl ExtractorDownloader {
    pub fn new(
        profile: PlatformProfile,
        extractor: Arc<dyn MediaExtractor>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            profile,
            extractor,
            settings,
        }
    }

    fn map_failure(&self, err: &Error, generic_prefix: String) -> FetchFailure {
        let detail = match err {
            Error::External(s) => s.clone(),
            other => other.to_string(),
        };
        self.profile
            .classify_failure(&detail)
            .unwrap_or_else(|| FetchFailure::generic(format!("{generic_prefix}: {detail}")))
    }

    async fn download_into(&self, url: &str, output: &Path) -> Result<DownloadResult> {
        tokio::fs::create_dir_all(&self.settings.temp_dir).await?;

        self.extractor
            .download(url, output, &self.profile.download_options())
            .await?;

        if !wait_for_file(output, self.settings.settle_timeout).await {
            return Err(Error::External(format!(
                "Output file not found at {}",
                output.display()
            )));
        }

        let size = tokio::fs::metadata(output).await?.len();
        let size_mb = bytes_to_mb(size);
        Ok(DownloadResult {
            path: output.to_path_buf(),
            size_mb,
            needs_compression: size_mb > self.settings.max_file_size_mb(),
        })
    }
}

#[async_trait]
impl Downloader for ExtractorDownloader {
    fn platform(&self) -> Platform {
        self.profile.platform
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoInfo> {
        let platform = self.profile.platform;
        let raw = self
            .extractor
            .dump_metadata(url, &self.profile.metadata_options())
            .await
            .map_err(|e| {
                warn!(%platform, error = %e, "metadata fetch failed");
                Error::MetadataFetchFailed(
                    self.map_failure(&e, "Failed to get video info".to_string()),
                )
            })?;

        Ok(video_info_from_json(platform, &raw))
    }

    async fn fetch_media(&self, url: &str) -> Result<DownloadResult> {
        let platform = self.profile.platform;
        let output = unique_temp_path(&self.settings.temp_dir, platform.as_str(), "mp4");
        debug!(%platform, output = %output.display(), "starting media download");

        match self.download_into(url, &output).await {
            Ok(result) => {
                info!(
                    %platform,
                    size_mb = result.size_mb,
                    needs_compression = result.needs_compression,
                    "media downloaded"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(%platform, error = %e, "media download failed");
                if let Err(cleanup) = remove_with_siblings(&output).await {
                    warn!(path = %output.display(), error = %cleanup, "failed to remove partial files");
                }
                Err(Error::MediaFetchFailed(self.map_failure(
                    &e,
                    format!("{} download failed", platform.display_name()),
                )))
            }
        }
    }
}

/// Build [`VideoInfo`] from extractor JSON, substituting defaults for missing fields.
pub fn video_info_from_json(platform: Platform, raw: &serde_json::Value) -> VideoInfo {
    let str_field = |k: &str| {
        raw.get(k)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
    };

    VideoInfo {
        title: str_field("title")
            .unwrap_or_else(|| format!("{} Video", platform.display_name())),
        duration_seconds: raw
            .get("duration")
            .and_then(|v| v.as_f64())
            .filter(|d| *d > 0.0),
        thumbnail: str_field("thumbnail"),
        description: str_field("description").unwrap_or_default(),
    }
}

/// Platform -> downloader lookup used by the pipeline.
#[derive(Clone, Default)]
pub struct DownloaderRegistry {
    inner: HashMap<Platform, Arc<dyn Downloader>>,
}

impl DownloaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard registry: one extractor-backed downloader per platform.
    pub fn standard(cfg: &Config, extractor: Arc<dyn MediaExtractor>) -> Self {
        let settings = DownloadSettings::from_config(cfg);

        let cookies = if cfg.youtube_cookies_file.is_file() {
            Some(cfg.youtube_cookies_file.clone())
        } else {
            warn!(
                path = %cfg.youtube_cookies_file.display(),
                "YouTube cookie file not found; downloads may hit bot checks"
            );
            None
        };

        let mut registry = Self::new();
        for profile in [
            PlatformProfile::youtube(cookies),
            PlatformProfile::facebook(),
            PlatformProfile::instagram(),
        ] {
            registry.register(Arc::new(ExtractorDownloader::new(
                profile,
                extractor.clone(),
                settings.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, downloader: Arc<dyn Downloader>) {
        self.inner.insert(downloader.platform(), downloader);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Downloader>> {
        self.inner.get(&platform).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    enum Behavior {
        Write(usize),
        WritePartialThenFail(&'static str),
        WriteFragmentsThenFail(&'static str),
        Fail(&'static str),
        Succeed,
    }

    struct FakeExtractor {
        behavior: Behavior,
        metadata: std::result::Result<serde_json::Value, &'static str>,
        seen: Mutex<Vec<ExtractOptions>>,
    }

    impl FakeExtractor {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                metadata: Ok(json!({})),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaExtractor for FakeExtractor {
        async fn dump_metadata(
            &self,
            _url: &str,
            opts: &ExtractOptions,
        ) -> Result<serde_json::Value> {
            self.seen.lock().unwrap().push(opts.clone());
            self.metadata
                .clone()
                .map_err(|e| Error::External(e.to_string()))
        }

        async fn download(&self, _url: &str, output: &Path, opts: &ExtractOptions) -> Result<()> {
            self.seen.lock().unwrap().push(opts.clone());
            match &self.behavior {
                Behavior::Write(n) => {
                    std::fs::write(output, vec![0u8; *n])?;
                    Ok(())
                }
                Behavior::WritePartialThenFail(msg) => {
                    std::fs::write(output, b"partial")?;
                    Err(Error::External(msg.to_string()))
                }
                Behavior::WriteFragmentsThenFail(msg) => {
                    std::fs::write(output.with_extension("mp4.part"), b"partial")?;
                    std::fs::write(output.with_extension("f137.mp4"), b"video only")?;
                    Err(Error::External(msg.to_string()))
                }
                Behavior::Fail(msg) => Err(Error::External(msg.to_string())),
                Behavior::Succeed => Ok(()),
            }
        }
    }

    fn settings(dir: &Path, max_file_size: u64) -> DownloadSettings {
        DownloadSettings {
            temp_dir: dir.join("temp"),
            max_file_size,
            settle_timeout: Duration::from_millis(50),
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn small_download_does_not_need_compression() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new(Behavior::Write(1024)));
        let dl = ExtractorDownloader::new(
            PlatformProfile::facebook(),
            extractor.clone(),
            settings(dir.path(), 2048),
        );

        let result = dl.fetch_media("https://fb.watch/abc").await.unwrap();
        assert!(!result.needs_compression);
        assert!(result.path.exists());
        assert!(result
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("facebook_"));

        let opts = extractor.seen.lock().unwrap()[0].clone();
        assert_eq!(opts.format.as_deref(), Some(DEFAULT_FORMAT));
        assert_eq!(opts.merge_output_format.as_deref(), Some("mp4"));
        assert!(opts.no_check_certificates);
        assert!(opts.cookies_file.is_none());
    }

    #[tokio::test]
    async fn oversized_download_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let dl = ExtractorDownloader::new(
            PlatformProfile::instagram(),
            Arc::new(FakeExtractor::new(Behavior::Write(4096))),
            settings(dir.path(), 2048),
        );

        let result = dl.fetch_media("https://instagram.com/p/abc").await.unwrap();
        assert!(result.needs_compression);
    }

    #[tokio::test]
    async fn failed_download_removes_partial_file_and_maps_known_errors() {
        let dir = tempfile::tempdir().unwrap();
        let dl = ExtractorDownloader::new(
            PlatformProfile::youtube(Some(PathBuf::from("cookies.txt"))),
            Arc::new(FakeExtractor::new(Behavior::WritePartialThenFail(
                "ERROR: [youtube] abc: Private video. Sign in if you've been granted access",
            ))),
            settings(dir.path(), 2048),
        );

        let err = dl.fetch_media("https://youtu.be/abc").await.unwrap_err();
        match err {
            Error::MediaFetchFailed(f) => {
                assert_eq!(f.kind, FetchFailureKind::Private);
                assert_eq!(f.message, "This video is private and cannot be downloaded.");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(files_in(&dir.path().join("temp")), 0);
    }

    #[tokio::test]
    async fn timed_out_download_leaves_no_intermediate_files() {
        let dir = tempfile::tempdir().unwrap();
        let dl = ExtractorDownloader::new(
            PlatformProfile::youtube(None),
            Arc::new(FakeExtractor::new(Behavior::WriteFragmentsThenFail(
                "yt-dlp timed out after 600s",
            ))),
            settings(dir.path(), 2048),
        );

        let err = dl.fetch_media("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, Error::MediaFetchFailed(_)));
        assert_eq!(files_in(&dir.path().join("temp")), 0);
    }

    #[tokio::test]
    async fn missing_output_is_a_generic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dl = ExtractorDownloader::new(
            PlatformProfile::facebook(),
            Arc::new(FakeExtractor::new(Behavior::Succeed)),
            settings(dir.path(), 2048),
        );

        let err = dl.fetch_media("https://fb.watch/abc").await.unwrap_err();
        match err {
            Error::MediaFetchFailed(f) => {
                assert_eq!(f.kind, FetchFailureKind::Generic);
                assert!(f.message.starts_with("Facebook download failed: Output file not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generic_extractor_error_keeps_detail() {
        let dir = tempfile::tempdir().unwrap();
        let dl = ExtractorDownloader::new(
            PlatformProfile::instagram(),
            Arc::new(FakeExtractor::new(Behavior::Fail("HTTP Error 404"))),
            settings(dir.path(), 2048),
        );

        let err = dl.fetch_media("https://instagram.com/p/abc").await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Instagram download failed: HTTP Error 404"
        );
    }

    #[test]
    fn youtube_error_table_covers_known_failures() {
        let p = PlatformProfile::youtube(None);
        let kind = |s: &str| p.classify_failure(s).map(|f| f.kind);

        assert_eq!(
            kind("ERROR: Sign in to confirm you're not a bot. Use --cookies"),
            Some(FetchFailureKind::AuthRequired)
        );
        assert_eq!(kind("ERROR: Video unavailable"), Some(FetchFailureKind::Unavailable));
        assert_eq!(kind("ERROR: Private video"), Some(FetchFailureKind::Private));
        assert_eq!(
            kind("ERROR: Sign in to confirm your age. This video may be inappropriate"),
            Some(FetchFailureKind::AgeRestricted)
        );
        // Rules are checked in table order: unavailable wins over private.
        assert_eq!(
            kind("ERROR: Video unavailable. This is a Private video"),
            Some(FetchFailureKind::Unavailable)
        );
        assert_eq!(kind("ERROR: HTTP Error 500"), None);
        assert_eq!(PlatformProfile::facebook().classify_failure("Private video"), None);
    }

    #[tokio::test]
    async fn metadata_defaults_fill_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = FakeExtractor::new(Behavior::Succeed);
        extractor.metadata = Ok(json!({ "title": "", "duration": null }));
        let dl = ExtractorDownloader::new(
            PlatformProfile::youtube(None),
            Arc::new(extractor),
            settings(dir.path(), 2048),
        );

        let info = dl.fetch_metadata("https://youtu.be/abc").await.unwrap();
        assert_eq!(info.title, "YouTube Video");
        assert_eq!(info.duration_seconds, None);
        assert_eq!(info.thumbnail, None);
        assert_eq!(info.description, "");
        // Metadata mode never creates the temp dir or any file.
        assert!(!dir.path().join("temp").exists());
    }

    #[tokio::test]
    async fn metadata_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = FakeExtractor::new(Behavior::Succeed);
        extractor.metadata = Err("ERROR: Sign in to confirm you're not a bot");
        let dl = ExtractorDownloader::new(
            PlatformProfile::youtube(None),
            Arc::new(extractor),
            settings(dir.path(), 2048),
        );

        match dl.fetch_metadata("https://youtu.be/abc").await.unwrap_err() {
            Error::MetadataFetchFailed(f) => assert_eq!(f.kind, FetchFailureKind::AuthRequired),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_full_metadata() {
        let raw = json!({
            "title": "Never Gonna Give You Up",
            "duration": 212.0,
            "thumbnail": "https://i.ytimg.com/vi/x/hq.jpg",
            "description": "classic",
        });
        let info = video_info_from_json(Platform::YouTube, &raw);
        assert_eq!(info.title, "Never Gonna Give You Up");
        assert_eq!(info.duration_seconds, Some(212.0));
        assert_eq!(info.thumbnail.as_deref(), Some("https://i.ytimg.com/vi/x/hq.jpg"));
        assert_eq!(info.description, "classic");
    }
}
