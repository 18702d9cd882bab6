//! ffmpeg adapter: implements the core `Transcoder` port.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tracing::{info, warn};

use vdb_core::{
    config::Config,
    errors::Error,
    media::{
        client::Transcoder,
        process::run_captured,
        types::{CliInvocation, CompressionOptions},
    },
    Result,
};

const LABEL: &str = "ffmpeg";

#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.ffmpeg_path.clone(), cfg.compression_timeout)
    }

    pub fn invocation(
        &self,
        source: &Path,
        target: &Path,
        opts: &CompressionOptions,
    ) -> CliInvocation {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(source.to_string_lossy().to_string());
        for (flag, value) in [
            ("-c:v", opts.video_codec.clone()),
            ("-crf", opts.crf.to_string()),
            ("-preset", opts.preset.clone()),
            ("-c:a", opts.audio_codec.clone()),
            ("-b:a", opts.audio_bitrate.clone()),
        ] {
            args.push(flag.to_string());
            args.push(value);
        }
        args.push(target.to_string_lossy().to_string());

        CliInvocation {
            program: self.program.clone(),
            args,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        target: &Path,
        opts: &CompressionOptions,
    ) -> Result<()> {
        if source == target {
            return Err(Error::CompressionFailed(
                "source and target must differ".to_string(),
            ));
        }

        let inv = self.invocation(source, target, opts);
        info!(crf = opts.crf, preset = %opts.preset, "compressing video");
        let out = run_captured(&inv, LABEL, self.timeout, false).await?;

        if !out.status.success() {
            let summary = out.error_summary(LABEL);
            warn!(status = %out.status, error = %summary, "ffmpeg failed");
            return Err(Error::CompressionFailed(summary));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_reencode_arguments() {
        let t = FfmpegTranscoder::new("ffmpeg", Duration::from_secs(1));
        let inv = t.invocation(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/compressed_1.mp4"),
            &CompressionOptions::default().with_crf(32),
        );
        assert_eq!(
            inv.args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "/tmp/in.mp4",
                "-c:v",
                "libx264",
                "-crf",
                "32",
                "-preset",
                "medium",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "/tmp/compressed_1.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn refuses_in_place_transcode() {
        let t = FfmpegTranscoder::new("ffmpeg", Duration::from_secs(1));
        let p = Path::new("/tmp/same.mp4");
        let err = t
            .transcode(p, p, &CompressionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CompressionFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_compression_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("ffmpeg");
        std::fs::write(
            &tool,
            "#!/bin/sh\necho 'Unknown encoder libx264' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = FfmpegTranscoder::new(tool, Duration::from_secs(10))
            .transcode(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                &CompressionOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "Compression failed: Unknown encoder libx264"
        );
    }
}
