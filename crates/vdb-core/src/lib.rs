//! Core domain + application logic for the video downloader bot.
//!
//! Framework-agnostic: the messenger (Telegram), the media extractor (yt-dlp)
//! and the transcoder (ffmpeg) live behind ports implemented in adapter crates.

pub mod classifier;
pub mod commands;
pub mod compression;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod utils;

pub use errors::{Error, Result};
