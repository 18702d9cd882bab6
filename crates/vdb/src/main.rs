use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vdb_core::{
    compression::CompressionStage,
    config::Config,
    downloader::DownloaderRegistry,
    jobs::JobGate,
    pipeline::DeliveryPipeline,
    router::CommandRouter,
    session::{
        credentials::CredentialStore,
        policy::ReconnectPolicy,
        SessionManager, SessionTimeouts,
    },
};
use vdb_ffmpeg::FfmpegTranscoder;
use vdb_telegram::TelegramConnector;
use vdb_ytdlp::{YtDlpClient, YtDlpConfig};

#[tokio::main]
async fn main() -> Result<(), vdb_core::Error> {
    vdb_core::logging::init("vdb")?;

    let cfg = Config::load()?;
    cfg.ensure_directories()?;
    info!(
        yt_dlp = %cfg.yt_dlp_path.display(),
        ffmpeg = %cfg.ffmpeg_path.display(),
        temp_dir = %cfg.temp_dir.display(),
        max_file_size = cfg.max_file_size,
        "starting video downloader bot"
    );

    let extractor = Arc::new(YtDlpClient::new(YtDlpConfig::from_config(&cfg)));
    let transcoder = Arc::new(FfmpegTranscoder::from_config(&cfg));

    let pipeline = Arc::new(DeliveryPipeline::new(
        DownloaderRegistry::standard(&cfg, extractor),
        CompressionStage::from_config(&cfg, transcoder),
        cfg.temp_dir.clone(),
    ));
    let router = Arc::new(CommandRouter::new(
        pipeline,
        Arc::new(JobGate::from_config(&cfg)),
    ));

    let connector = TelegramConnector::from_config(&cfg)
        .map_err(|e| vdb_core::Error::Config(format!("telegram setup failed: {e:#}")))?;

    let manager = SessionManager::new(
        Arc::new(connector),
        CredentialStore::new(cfg.auth_dir.clone()),
        ReconnectPolicy::from_config(&cfg),
        SessionTimeouts::from_config(&cfg),
        router,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("shutting down bot");
            shutdown.cancel();
        }
    });

    manager.run(shutdown).await
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
