use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Default: info for our crates and everything else. Can be overridden with
/// `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,vdb=info,vdb_core=info,vdb_telegram=info,vdb_ytdlp=info,vdb_ffmpeg=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
