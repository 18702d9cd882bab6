use std::{fmt, path::PathBuf};

/// Messenger user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Messenger chat (conversation) id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Messenger message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Supported video sources, in detection order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Facebook, Platform::Instagram];

    /// Lowercase identifier, also used for temp file prefixes and download subfolders.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Facebook => "Facebook",
            Platform::Instagram => "Instagram",
        }
    }

    /// Chat command (without the leading slash) that requests this platform.
    pub fn command(self) -> &'static str {
        match self {
            Platform::YouTube => "yt",
            Platform::Facebook => "fb",
            Platform::Instagram => "insta",
        }
    }

    pub fn from_command(cmd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.command() == cmd)
    }

    pub fn example_url(self) -> &'static str {
        match self {
            Platform::YouTube => "https://youtube.com/watch?v=example",
            Platform::Facebook => "https://facebook.com/video/example",
            Platform::Instagram => "https://instagram.com/p/example",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound download command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    pub platform: Platform,
    pub url: String,
}

impl DownloadRequest {
    pub fn new(platform: Platform, url: impl Into<String>) -> Self {
        Self {
            platform,
            url: url.into(),
        }
    }
}

/// Metadata shown in the progress message.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub title: String,
    pub duration_seconds: Option<f64>,
    pub thumbnail: Option<String>,
    pub description: String,
}

impl VideoInfo {
    /// Whole seconds, or `Unknown`.
    pub fn duration_label(&self) -> String {
        match self.duration_seconds {
            Some(d) if d.is_finite() && d >= 0.0 => format!("{}", d.round() as u64),
            _ => "Unknown".to_string(),
        }
    }
}

/// A media file fetched into the temp directory.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size_mb: f64,
    pub needs_compression: bool,
}
