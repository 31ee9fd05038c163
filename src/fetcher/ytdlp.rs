//! `yt-dlp` backed retriever

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{FetchError, Retriever};
use crate::config::FetchConfig;
use crate::utils::lines::OutputLines;

/// Number of trailing diagnostic lines kept for error reports
const STDERR_TAIL_LINES: usize = 5;

/// Retriever that shells out to `yt-dlp`
#[derive(Debug, Clone)]
pub struct YtDlpRetriever {
    program: String,
    format: String,
    retries: u32,
}

impl YtDlpRetriever {
    pub fn new(program: impl Into<String>, format: impl Into<String>, retries: u32) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
            retries,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(&config.ytdlp_path, &config.format, config.ytdlp_retries)
    }

    /// Build command arguments
    pub fn args(&self, url: &str, output: &Path) -> Vec<String> {
        vec![
            String::from("--format"),
            self.format.clone(),
            String::from("--retries"),
            self.retries.to_string(),
            String::from("--merge-output-format"),
            String::from("mp4"),
            // Keep the download time as mtime so retention ages from acquisition
            String::from("--no-mtime"),
            String::from("--no-playlist"),
            String::from("--newline"),
            String::from("--output"),
            output.to_string_lossy().into_owned(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl Retriever for YtDlpRetriever {
    async fn retrieve(&self, url: &str, output: &Path) -> Result<(), FetchError> {
        let args = self.args(url, output);
        tracing::debug!(program = %self.program, args = ?args, "Starting yt-dlp");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FetchError::Spawn)?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                OutputLines::new(stderr)
                    .for_each(|line| {
                        tracing::debug!(target: "rebroadcast::ytdlp", "{line}");
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    })
                    .await;
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            OutputLines::new(stdout)
                .for_each(|line| {
                    let line = line.trim();
                    if !line.is_empty() {
                        tracing::debug!(target: "rebroadcast::ytdlp", "{line}");
                    }
                })
                .await;
        }

        let status = child.wait().await.map_err(FetchError::Io)?;
        let detail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(FetchError::ToolFailed {
                status: status.to_string(),
                detail,
            })
        }
    }
}
