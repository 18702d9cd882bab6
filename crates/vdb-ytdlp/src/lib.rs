//! yt-dlp adapter: implements the core `MediaExtractor` port.
//!
//! Metadata mode runs `yt-dlp --dump-single-json` and parses stdout; download
//! mode writes exactly one file at the requested output path.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, warn};

use vdb_core::{
    config::Config,
    errors::Error,
    media::{
        client::MediaExtractor,
        process::run_captured,
        types::{CliInvocation, ExtractOptions},
    },
    Result,
};

const LABEL: &str = "yt-dlp";

#[derive(Clone, Debug)]
pub struct YtDlpConfig {
    pub program: PathBuf,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
}

impl YtDlpConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.yt_dlp_path.clone(),
            metadata_timeout: cfg.metadata_timeout,
            download_timeout: cfg.download_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct YtDlpClient {
    cfg: YtDlpConfig,
}

impl YtDlpClient {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self { cfg }
    }

    pub fn metadata_invocation(&self, url: &str, opts: &ExtractOptions) -> CliInvocation {
        let mut args = vec!["--dump-single-json".to_string(), "--no-warnings".to_string()];
        push_common_args(&mut args, opts);
        args.push("--".to_string());
        args.push(url.to_string());
        CliInvocation {
            program: self.cfg.program.clone(),
            args,
        }
    }

    pub fn download_invocation(
        &self,
        url: &str,
        output: &Path,
        opts: &ExtractOptions,
    ) -> CliInvocation {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-part".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];
        if let Some(format) = &opts.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        if let Some(container) = &opts.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }
        push_common_args(&mut args, opts);
        args.push("--".to_string());
        args.push(url.to_string());
        CliInvocation {
            program: self.cfg.program.clone(),
            args,
        }
    }
}

fn push_common_args(args: &mut Vec<String>, opts: &ExtractOptions) {
    for header in &opts.headers {
        args.push("--add-header".to_string());
        args.push(header.clone());
    }
    if let Some(cookies) = &opts.cookies_file {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().to_string());
    }
    if opts.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if opts.no_check_certificates {
        args.push("--no-check-certificates".to_string());
    }
}

#[async_trait]
impl MediaExtractor for YtDlpClient {
    async fn dump_metadata(&self, url: &str, opts: &ExtractOptions) -> Result<serde_json::Value> {
        let inv = self.metadata_invocation(url, opts);
        let out = run_captured(&inv, LABEL, self.cfg.metadata_timeout, true).await?;

        if !out.status.success() {
            let summary = out.error_summary(LABEL);
            warn!(status = %out.status, error = %summary, "yt-dlp metadata failed");
            return Err(Error::External(summary));
        }

        let value: serde_json::Value = serde_json::from_str(out.stdout.trim())
            .map_err(|e| Error::External(format!("yt-dlp returned invalid JSON: {e}")))?;
        if !value.is_object() {
            return Err(Error::External(
                "yt-dlp returned unexpected metadata".to_string(),
            ));
        }
        Ok(value)
    }

    async fn download(&self, url: &str, output: &Path, opts: &ExtractOptions) -> Result<()> {
        let inv = self.download_invocation(url, output, opts);
        let out = run_captured(&inv, LABEL, self.cfg.download_timeout, false).await?;

        if !out.status.success() {
            let summary = out.error_summary(LABEL);
            warn!(status = %out.status, error = %summary, "yt-dlp download failed");
            return Err(Error::External(summary));
        }
        debug!(output = %output.display(), "yt-dlp finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(program: impl Into<PathBuf>) -> YtDlpClient {
        YtDlpClient::new(YtDlpConfig {
            program: program.into(),
            metadata_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(10),
        })
    }

    fn youtube_opts() -> ExtractOptions {
        ExtractOptions {
            headers: vec!["referer:youtube.com".to_string()],
            cookies_file: Some(PathBuf::from("cookies.txt")),
            no_playlist: true,
            ..Default::default()
        }
    }

    #[test]
    fn metadata_invocation_dumps_json_only() {
        let inv = client("yt-dlp").metadata_invocation("https://youtu.be/x", &youtube_opts());
        assert_eq!(
            inv.args,
            vec![
                "--dump-single-json",
                "--no-warnings",
                "--add-header",
                "referer:youtube.com",
                "--cookies",
                "cookies.txt",
                "--no-playlist",
                "--",
                "https://youtu.be/x",
            ]
        );
        assert!(!inv.args.iter().any(|a| a == "-o"));
    }

    #[test]
    fn download_invocation_sets_output_and_format() {
        let opts = ExtractOptions {
            format: Some("best[ext=mp4]/best".to_string()),
            merge_output_format: Some("mp4".to_string()),
            no_check_certificates: true,
            ..Default::default()
        };
        let inv = client("/usr/bin/yt-dlp").download_invocation(
            "https://fb.watch/x",
            Path::new("/tmp/facebook_1.mp4"),
            &opts,
        );
        assert_eq!(inv.program, PathBuf::from("/usr/bin/yt-dlp"));
        assert_eq!(
            inv.args,
            vec![
                "--no-warnings",
                "--no-progress",
                "--no-part",
                "-o",
                "/tmp/facebook_1.mp4",
                "-f",
                "best[ext=mp4]/best",
                "--merge-output-format",
                "mp4",
                "--no-check-certificates",
                "--",
                "https://fb.watch/x",
            ]
        );
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parses_metadata_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), r#"echo '{"title":"Clip","duration":12.5}'"#);

        let value = client(tool)
            .dump_metadata("https://youtu.be/x", &ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(value["title"], "Clip");
        assert_eq!(value["duration"], 12.5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_carries_the_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "echo \"ERROR: [youtube] x: Sign in to confirm you're not a bot\" >&2; exit 1",
        );

        let err = client(tool)
            .download(
                "https://youtu.be/x",
                &dir.path().join("out.mp4"),
                &ExtractOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            Error::External(msg) => assert!(msg.contains("Sign in to confirm you're not a bot")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn garbage_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'not json'");

        let err = client(tool)
            .dump_metadata("https://youtu.be/x", &ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }
}
