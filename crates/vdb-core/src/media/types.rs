use std::path::PathBuf;

/// Browser user agent sent with every extractor request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Format selector: best single-file mp4, falling back to the best available.
pub const DEFAULT_FORMAT: &str = "best[ext=mp4]/best";

/// Container requested when formats have to be merged.
pub const DEFAULT_CONTAINER: &str = "mp4";

/// Per-call extractor options, built from a platform profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// `name:value` header lines.
    pub headers: Vec<String>,
    pub cookies_file: Option<PathBuf>,
    pub no_playlist: bool,
    pub no_check_certificates: bool,
    pub format: Option<String>,
    pub merge_output_format: Option<String>,
}

/// Re-encode settings for the compression stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionOptions {
    pub video_codec: String,
    /// Constant rate factor; higher means smaller and lower quality.
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl CompressionOptions {
    /// Upper bound of the x264/x265 CRF scale.
    pub const MAX_CRF: u8 = 51;

    /// Same settings at a lower quality target.
    pub fn with_crf(&self, crf: u8) -> Self {
        Self {
            crf: crf.min(Self::MAX_CRF),
            ..self.clone()
        }
    }
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 28,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// A concrete CLI invocation (used by the subprocess adapters).
#[derive(Clone, Debug)]
pub struct CliInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}
