//! Size-gated re-encoding.

use std::{path::Path, sync::Arc};

use tracing::{info, warn};

use crate::{
    config::Config,
    errors::Error,
    media::{client::Transcoder, types::CompressionOptions},
    utils::{bytes_to_mb, remove_file_if_exists},
    Result,
};

/// Outcome of a successful compression.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionReport {
    pub size_mb: f64,
    pub attempts: u32,
    pub crf: u8,
}

/// Re-encodes a file until it fits under `max_file_size`, lowering quality
/// between attempts.
pub struct CompressionStage {
    transcoder: Arc<dyn Transcoder>,
    options: CompressionOptions,
    max_file_size: u64,
    max_attempts: u32,
    crf_step: u8,
}

impl CompressionStage {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        options: CompressionOptions,
        max_file_size: u64,
        max_attempts: u32,
        crf_step: u8,
    ) -> Self {
        Self {
            transcoder,
            options,
            max_file_size,
            max_attempts: max_attempts.max(1),
            crf_step,
        }
    }

    pub fn from_config(cfg: &Config, transcoder: Arc<dyn Transcoder>) -> Self {
        Self::new(
            transcoder,
            cfg.compression.clone(),
            cfg.max_file_size,
            cfg.compression_max_attempts,
            cfg.compression_crf_step,
        )
    }

    /// CRF used for the given zero-based attempt.
    fn crf_for_attempt(&self, attempt: u32) -> u8 {
        let bump = u32::from(self.crf_step).saturating_mul(attempt);
        let crf = u32::from(self.options.crf).saturating_add(bump);
        crf.min(u32::from(CompressionOptions::MAX_CRF)) as u8
    }

    /// Compress `source` into `target`. `source` is never modified or removed;
    /// `target` is removed again on failure.
    pub async fn compress(&self, source: &Path, target: &Path) -> Result<CompressionReport> {
        let mut last_crf = None;

        for attempt in 0..self.max_attempts {
            let crf = self.crf_for_attempt(attempt);
            if last_crf == Some(crf) {
                // Already at the CRF ceiling; another pass would produce the same file.
                break;
            }
            last_crf = Some(crf);

            let options = self.options.with_crf(crf);
            if let Err(e) = self.transcoder.transcode(source, target, &options).await {
                self.discard(target).await;
                return Err(match e {
                    Error::CompressionFailed(_) => e,
                    other => Error::CompressionFailed(other.to_string()),
                });
            }

            let size = match tokio::fs::metadata(target).await {
                Ok(md) => md.len(),
                Err(e) => {
                    self.discard(target).await;
                    return Err(Error::CompressionFailed(format!(
                        "compressed output missing: {e}"
                    )));
                }
            };

            if size <= self.max_file_size {
                let report = CompressionReport {
                    size_mb: bytes_to_mb(size),
                    attempts: attempt + 1,
                    crf,
                };
                info!(
                    attempt = report.attempts,
                    crf,
                    size_mb = report.size_mb,
                    "compression fits size limit"
                );
                return Ok(report);
            }

            warn!(
                attempt = attempt + 1,
                crf,
                size_mb = bytes_to_mb(size),
                "compressed video still too large"
            );
        }

        self.discard(target).await;
        Err(Error::CompressionFailed(format!(
            "compressed video is still larger than {}MB",
            bytes_to_mb(self.max_file_size).round() as u64
        )))
    }

    async fn discard(&self, target: &Path) {
        if let Err(e) = remove_file_if_exists(target).await {
            warn!(path = %target.display(), error = %e, "failed to remove compression output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes an output whose size is taken from a script, one entry per call.
    struct ScriptedTranscoder {
        sizes: Mutex<Vec<Option<usize>>>,
        crfs: Mutex<Vec<u8>>,
    }

    impl ScriptedTranscoder {
        fn new(sizes: Vec<Option<usize>>) -> Self {
            Self {
                sizes: Mutex::new(sizes),
                crfs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transcoder for ScriptedTranscoder {
        async fn transcode(
            &self,
            _source: &Path,
            target: &Path,
            opts: &CompressionOptions,
        ) -> Result<()> {
            self.crfs.lock().unwrap().push(opts.crf);
            let next = self.sizes.lock().unwrap().remove(0);
            match next {
                Some(n) => {
                    std::fs::write(target, vec![0u8; n])?;
                    Ok(())
                }
                None => {
                    std::fs::write(target, b"partial")?;
                    Err(Error::External("ffmpeg exited with status 1".to_string()))
                }
            }
        }
    }

    fn stage(t: Arc<ScriptedTranscoder>, max: u64) -> CompressionStage {
        CompressionStage::new(t, CompressionOptions::default(), max, 3, 4)
    }

    fn paths(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let src = dir.join("src.mp4");
        std::fs::write(&src, vec![0u8; 4096]).unwrap();
        (src, dir.join("out.mp4"))
    }

    #[tokio::test]
    async fn first_attempt_that_fits_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![Some(1000)]));

        let report = stage(t.clone(), 2048).compress(&src, &out).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.crf, 28);
        assert!(out.exists());
        assert!(src.exists());
    }

    #[tokio::test]
    async fn retries_with_higher_crf_until_it_fits() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![Some(3000), Some(2500), Some(2000)]));

        let report = stage(t.clone(), 2048).compress(&src, &out).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(*t.crfs.lock().unwrap(), vec![28, 32, 36]);
    }

    #[tokio::test]
    async fn still_oversized_after_all_attempts_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![Some(3000); 3]));

        let err = stage(t, 2048).compress(&src, &out).await.unwrap_err();
        assert!(matches!(err, Error::CompressionFailed(_)));
        assert!(!out.exists());
        assert!(src.exists());
    }

    #[tokio::test]
    async fn reports_limit_in_megabytes() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![Some(2 * 1024 * 1024); 3]));

        let err = CompressionStage::new(t, CompressionOptions::default(), 1024 * 1024, 3, 4)
            .compress(&src, &out)
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "Compression failed: compressed video is still larger than 1MB"
        );
    }

    #[tokio::test]
    async fn transcoder_failure_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![None]));

        let err = stage(t, 2048).compress(&src, &out).await.unwrap_err();
        assert!(matches!(err, Error::CompressionFailed(_)));
        assert!(!out.exists());
        assert!(src.exists());
    }

    #[tokio::test]
    async fn stops_early_at_crf_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let (src, out) = paths(dir.path());
        let t = Arc::new(ScriptedTranscoder::new(vec![Some(3000); 3]));
        let opts = CompressionOptions::default().with_crf(50);

        let _ = CompressionStage::new(t.clone(), opts, 2048, 3, 4)
            .compress(&src, &out)
            .await;
        assert_eq!(*t.crfs.lock().unwrap(), vec![50, 51]);
    }
}
