//! Download-and-deliver pipeline.
//!
//! One run per download command:
//! `Validating -> MetadataFetch -> Downloading -> (Compressing) -> Delivering
//! -> CleaningUp -> Done`, with `Failed` reachable from any non-terminal stage.
//! Every temp file a run creates is gone by the time [`DeliveryPipeline::run`]
//! returns, and a failed run answers with exactly one error message.

use std::path::PathBuf;

use tracing::{debug, error, info, Instrument, Span};

use crate::{
    classifier::{detect_platform, is_supported_url},
    compression::CompressionStage,
    domain::{ChatId, DownloadRequest, VideoInfo},
    downloader::DownloaderRegistry,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, OutboundPayload},
    },
    utils::{bytes_to_mb, unique_temp_path, TempArtifact},
    Result,
};

pub const PROCESSING_TEXT: &str = "⏳ Processing your request...";
pub const COMPRESSING_TEXT: &str = "⚠️ Video is too large. Compressing...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    MetadataFetch,
    Downloading,
    Compressing,
    Delivering,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Validating => "validating",
            PipelineStage::MetadataFetch => "metadata_fetch",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Compressing => "compressing",
            PipelineStage::Delivering => "delivering",
            PipelineStage::CleaningUp => "cleaning_up",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOutcome {
    Delivered { compressed: bool },
    Failed { stage: PipelineStage, cause: String },
}

pub fn downloading_text(info: &VideoInfo) -> String {
    format!(
        "📥 Downloading: {}\n⏱ Duration: {} seconds",
        info.title,
        info.duration_label()
    )
}

pub fn delivery_caption(title: &str, size_mb: f64) -> String {
    format!("✅ {title}\n\n📊 Size: {size_mb:.2}MB")
}

pub fn compressed_caption(title: &str, original_size_mb: f64, transport: &str) -> String {
    format!("✅ {title}\n\n📊 Original size: {original_size_mb:.2}MB\n🔄 Compressed for {transport}")
}

pub fn error_text(cause: &str) -> String {
    format!("❌ Error: {cause}\n\nPlease try again or contact support if the problem persists.")
}

/// Per-run bookkeeping: current stage plus the temp files to clean up.
struct Run {
    stage: PipelineStage,
    original: Option<TempArtifact>,
    compressed: Option<TempArtifact>,
}

impl Run {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Validating,
            original: None,
            compressed: None,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        Span::current().record("stage", stage.as_str());
        debug!(stage = stage.as_str(), "pipeline stage");
    }

    async fn cleanup(&mut self) {
        if let Some(a) = self.compressed.take() {
            a.remove().await;
        }
        if let Some(a) = self.original.take() {
            a.remove().await;
        }
    }
}

pub struct DeliveryPipeline {
    downloaders: DownloaderRegistry,
    compression: CompressionStage,
    temp_dir: PathBuf,
}

impl DeliveryPipeline {
    pub fn new(
        downloaders: DownloaderRegistry,
        compression: CompressionStage,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloaders,
            compression,
            temp_dir: temp_dir.into(),
        }
    }

    /// Run one request to completion. Errors never escape: they are logged and
    /// reported to the chat.
    pub async fn run(
        &self,
        chat_id: ChatId,
        request: &DownloadRequest,
        messenger: &dyn MessagingPort,
    ) -> PipelineOutcome {
        let span = tracing::info_span!(
            "pipeline",
            chat_id = chat_id.0,
            platform = %request.platform,
            stage = tracing::field::Empty,
        );
        self.run_inner(chat_id, request, messenger)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        chat_id: ChatId,
        request: &DownloadRequest,
        messenger: &dyn MessagingPort,
    ) -> PipelineOutcome {
        let mut run = Run::new();
        run.enter(PipelineStage::Validating);

        let result = self.execute(&mut run, chat_id, request, messenger).await;
        let failed_at = run.stage;

        run.enter(PipelineStage::CleaningUp);
        run.cleanup().await;

        match result {
            Ok(compressed) => {
                run.enter(PipelineStage::Done);
                info!(compressed, "video delivered");
                PipelineOutcome::Delivered { compressed }
            }
            Err(e) => {
                run.enter(PipelineStage::Failed);
                error!(failed_at = failed_at.as_str(), error = %e, url = %request.url, "pipeline failed");
                let cause = e.user_message();
                if let Err(send_err) = messenger.send_text(chat_id, &error_text(&cause)).await {
                    error!(error = %send_err, "failed to send error reply");
                }
                PipelineOutcome::Failed {
                    stage: failed_at,
                    cause,
                }
            }
        }
    }

    /// Returns whether the delivered file was a compressed copy.
    async fn execute(
        &self,
        run: &mut Run,
        chat_id: ChatId,
        request: &DownloadRequest,
        messenger: &dyn MessagingPort,
    ) -> Result<bool> {
        if !is_supported_url(&request.url) {
            return Err(Error::InvalidUrl);
        }
        let detected = detect_platform(&request.url);
        if detected != Some(request.platform) {
            return Err(Error::PlatformMismatch {
                expected: request.platform,
                detected,
            });
        }

        let downloader = self.downloaders.get(request.platform).ok_or_else(|| {
            Error::Config(format!("no downloader registered for {}", request.platform))
        })?;

        messenger.send_text(chat_id, PROCESSING_TEXT).await?;

        run.enter(PipelineStage::MetadataFetch);
        let info = downloader.fetch_metadata(&request.url).await?;
        messenger.send_text(chat_id, &downloading_text(&info)).await?;

        run.enter(PipelineStage::Downloading);
        let download = downloader.fetch_media(&request.url).await?;
        run.original = Some(TempArtifact::new(download.path.clone()));

        if !download.needs_compression {
            run.enter(PipelineStage::Delivering);
            check_upload_limit(download.size_mb, &messenger.capabilities())?;
            let payload = OutboundPayload::Video {
                path: download.path.clone(),
                caption: delivery_caption(&info.title, download.size_mb),
            };
            messenger
                .send(chat_id, &payload)
                .await
                .map_err(into_delivery_error)?;
            return Ok(false);
        }

        run.enter(PipelineStage::Compressing);
        messenger.send_text(chat_id, COMPRESSING_TEXT).await?;

        let target = unique_temp_path(&self.temp_dir, "compressed", "mp4");
        run.compressed = Some(TempArtifact::new(target.clone()));
        let report = self.compression.compress(&download.path, &target).await?;
        debug!(attempts = report.attempts, size_mb = report.size_mb, "compressed");

        run.enter(PipelineStage::Delivering);
        check_upload_limit(report.size_mb, &messenger.capabilities())?;
        let payload = OutboundPayload::Video {
            path: target.clone(),
            caption: compressed_caption(
                &info.title,
                download.size_mb,
                messenger.capabilities().transport_name,
            ),
        };
        messenger
            .send(chat_id, &payload)
            .await
            .map_err(into_delivery_error)?;

        if let Some(a) = run.compressed.take() {
            a.remove().await;
        }
        Ok(true)
    }
}

fn into_delivery_error(e: Error) -> Error {
    match e {
        Error::DeliveryFailed(_) => e,
        other => Error::DeliveryFailed(other.detail()),
    }
}

/// Refuse uploads the transport would reject anyway.
fn check_upload_limit(size_mb: f64, caps: &MessagingCapabilities) -> Result<()> {
    let limit_mb = bytes_to_mb(caps.max_upload_bytes);
    if size_mb > limit_mb {
        return Err(Error::DeliveryFailed(format!(
            "video is {size_mb:.2}MB, above the {} upload limit of {limit_mb:.0}MB",
            caps.transport_name
        )));
    }
    Ok(())
}
