use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::debug;

use crate::{domain::Platform, errors::Error, media::types::CompressionOptions, Result};

/// 16MB in bytes: the outbound attachment ceiling the bot targets by default.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Typed configuration, loaded from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Messaging backend
    pub telegram_bot_token: String,
    pub connect_timeout: Duration,
    pub poll_timeout: Duration,
    pub logout_timeout: Duration,

    // Reconnect policy
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub wipe_reason_codes: Vec<u16>,

    // Filesystem layout
    pub auth_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub download_dir: PathBuf,
    pub youtube_cookies_file: PathBuf,

    // External tools
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,

    // Downloads
    pub max_file_size: u64,
    pub file_settle_timeout: Duration,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,

    // Compression
    pub compression: CompressionOptions,
    pub compression_timeout: Duration,
    pub compression_max_attempts: u32,
    pub compression_crf_step: u8,

    // Job admission
    pub max_concurrent_jobs: usize,
    pub max_queued_per_chat: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        inject_extra_paths();

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let connect_timeout =
            Duration::from_millis(env_u64("CONNECT_TIMEOUT_MS").unwrap_or(60_000));
        let poll_timeout = Duration::from_secs(env_u64("POLL_TIMEOUT_SECS").unwrap_or(30));
        let logout_timeout = Duration::from_millis(env_u64("LOGOUT_TIMEOUT_MS").unwrap_or(5_000));

        let max_retries = env_u32("MAX_RETRIES").unwrap_or(5);
        let retry_base_delay =
            Duration::from_millis(env_u64("RETRY_BASE_DELAY_MS").unwrap_or(1_000));
        let retry_max_delay =
            Duration::from_millis(env_u64("RETRY_MAX_DELAY_MS").unwrap_or(30_000));
        let wipe_reason_codes = parse_csv_u16(env_str("WIPE_REASON_CODES"))
            .unwrap_or_else(|| vec![405, 428]);

        let auth_dir = env_path("AUTH_DIR").unwrap_or_else(|| PathBuf::from("./auth"));
        let temp_dir = env_path("TEMP_DIR").unwrap_or_else(|| PathBuf::from("./temp"));
        let download_dir =
            env_path("DOWNLOAD_DIR").unwrap_or_else(|| PathBuf::from("./downloads"));
        let youtube_cookies_file =
            env_path("YOUTUBE_COOKIES_FILE").unwrap_or_else(|| PathBuf::from("cookies.txt"));

        let yt_dlp_path = env_path("YT_DLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let ffmpeg_path = env_path("FFMPEG_PATH")
            .or_else(|| which_in_path("ffmpeg"))
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        let max_file_size = env_u64("MAX_FILE_SIZE")
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE);
        let file_settle_timeout =
            Duration::from_millis(env_u64("FILE_SETTLE_TIMEOUT_MS").unwrap_or(1_000));
        let metadata_timeout =
            Duration::from_secs(env_u64("METADATA_TIMEOUT_SECS").unwrap_or(120));
        let download_timeout =
            Duration::from_secs(env_u64("DOWNLOAD_TIMEOUT_SECS").unwrap_or(600));

        let defaults = CompressionOptions::default();
        let compression = CompressionOptions {
            video_codec: env_str("COMPRESSION_VIDEO_CODEC")
                .and_then(non_empty)
                .unwrap_or(defaults.video_codec),
            crf: env_u8("COMPRESSION_CRF")
                .filter(|v| *v <= CompressionOptions::MAX_CRF)
                .unwrap_or(defaults.crf),
            preset: env_str("COMPRESSION_PRESET")
                .and_then(non_empty)
                .unwrap_or(defaults.preset),
            audio_codec: env_str("COMPRESSION_AUDIO_CODEC")
                .and_then(non_empty)
                .unwrap_or(defaults.audio_codec),
            audio_bitrate: env_str("COMPRESSION_AUDIO_BITRATE")
                .and_then(non_empty)
                .unwrap_or(defaults.audio_bitrate),
        };
        let compression_timeout =
            Duration::from_secs(env_u64("COMPRESSION_TIMEOUT_SECS").unwrap_or(900));
        let compression_max_attempts = env_u32("COMPRESSION_MAX_ATTEMPTS")
            .filter(|v| *v > 0)
            .unwrap_or(3);
        let compression_crf_step = env_u8("COMPRESSION_CRF_STEP").unwrap_or(4);

        let max_concurrent_jobs = env_usize("MAX_CONCURRENT_JOBS")
            .filter(|v| *v > 0)
            .unwrap_or(2);
        let max_queued_per_chat = env_usize("MAX_QUEUED_PER_CHAT")
            .filter(|v| *v > 0)
            .unwrap_or(3);

        Ok(Self {
            telegram_bot_token,
            connect_timeout,
            poll_timeout,
            logout_timeout,
            max_retries,
            retry_base_delay,
            retry_max_delay,
            wipe_reason_codes,
            auth_dir,
            temp_dir,
            download_dir,
            youtube_cookies_file,
            yt_dlp_path,
            ffmpeg_path,
            max_file_size,
            file_settle_timeout,
            metadata_timeout,
            download_timeout,
            compression,
            compression_timeout,
            compression_max_attempts,
            compression_crf_step,
            max_concurrent_jobs,
            max_queued_per_chat,
        })
    }

    /// Create the auth, temp and download directories (with per-platform subfolders).
    pub fn ensure_directories(&self) -> Result<()> {
        let mut dirs = vec![
            self.auth_dir.clone(),
            self.download_dir.clone(),
            self.temp_dir.clone(),
        ];
        dirs.extend(
            Platform::ALL
                .iter()
                .map(|p| self.download_dir.join(p.as_str())),
        );

        for dir in dirs {
            fs::create_dir_all(&dir)?;
            debug!(dir = %dir.display(), "directory ready");
        }
        Ok(())
    }
}

fn inject_extra_paths() {
    let Some(home) = home_dir() else {
        return;
    };

    // yt-dlp/ffmpeg are commonly installed via pipx or Homebrew.
    let extras = [
        home.join(".local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
    ];

    let current = env::var_os("PATH").unwrap_or_else(|| OsString::from(""));
    let mut parts: Vec<OsString> = env::split_paths(&current)
        .map(|p| p.into_os_string())
        .collect();

    for extra in extras.into_iter().rev() {
        let extra_os = extra.into_os_string();
        if !parts.iter().any(|p| p == &extra_os) {
            parts.insert(0, extra_os);
        }
    }

    let joined = env::join_paths(parts.into_iter().map(PathBuf::from).collect::<Vec<_>>())
        .unwrap_or(current);
    env::set_var("PATH", joined);
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_u8(key: &str) -> Option<u8> {
    env_str(key).and_then(|s| s.trim().parse::<u8>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_u16(v: Option<String>) -> Option<Vec<u16>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u16>().ok())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
