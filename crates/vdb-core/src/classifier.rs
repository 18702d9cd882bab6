//! URL validation and platform detection.
//!
//! Pure and total: no network access, no panics on arbitrary input.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::domain::Platform;

fn pattern_sources(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::YouTube => &[
            r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+",
            r"^(https?://)?(www\.)?youtube\.com/watch\?v=.+",
            r"^(https?://)?(www\.)?youtu\.be/.+",
        ],
        Platform::Facebook => &[
            r"^(https?://)?(www\.)?facebook\.com/.+/videos/.+",
            r"^(https?://)?(www\.)?fb\.watch/.+",
        ],
        Platform::Instagram => &[
            r"^(https?://)?(www\.)?instagram\.com/p/.+",
            r"^(https?://)?(www\.)?instagram\.com/reel/.+",
        ],
    }
}

fn pattern_table() -> &'static [(Platform, Vec<Regex>)] {
    static TABLE: OnceLock<Vec<(Platform, Vec<Regex>)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Platform::ALL
            .iter()
            .map(|&p| {
                let patterns = pattern_sources(p)
                    .iter()
                    .filter_map(|src| Regex::new(src).ok())
                    .collect();
                (p, patterns)
            })
            .collect()
    })
}

fn matching_platform(candidate: &str) -> Option<Platform> {
    pattern_table()
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(candidate)))
        .map(|(p, _)| *p)
}

/// True only if `candidate` parses as a URL and matches a platform pattern.
pub fn is_supported_url(candidate: &str) -> bool {
    if Url::parse(candidate).is_err() {
        return false;
    }
    matching_platform(candidate).is_some()
}

/// First platform (in `Platform::ALL` order) whose patterns match.
pub fn detect_platform(candidate: &str) -> Option<Platform> {
    if !is_supported_url(candidate) {
        return None;
    }
    matching_platform(candidate)
}
