//! Media probing with `ffprobe`

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DURATION_ARGS: &[&str] = &[
    "-v",
    "error",
    "-show_entries",
    "format=duration",
    "-of",
    "default=noprint_wrappers=1:nokey=1",
];

const AUDIO_STREAM_ARGS: &[&str] = &[
    "-v",
    "error",
    "-select_streams",
    "a",
    "-show_entries",
    "stream=index",
    "-of",
    "csv=p=0",
];

/// Runs `ffprobe` queries against local artifacts
#[derive(Debug, Clone)]
pub struct MediaProbe {
    program: String,
}

impl MediaProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Container duration of the file
    pub async fn duration(&self, path: &Path) -> Option<Duration> {
        let stdout = self.run(DURATION_ARGS, path).await?;

        let duration = parse_duration_output(&stdout);
        if duration.is_none() {
            tracing::warn!(
                path = %path.display(),
                output = %stdout.trim(),
                "Unreadable duration from ffprobe"
            );
        }
        duration
    }

    /// Whether the file carries at least one audio stream
    pub async fn has_audio(&self, path: &Path) -> Option<bool> {
        let stdout = self.run(AUDIO_STREAM_ARGS, path).await?;

        Some(!stdout.trim().is_empty())
    }

    async fn run(&self, args: &[&str], path: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                tracing::warn!(
                    path = %path.display(),
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "ffprobe failed"
                );
                None
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Failed to run ffprobe");
                None
            }
        }
    }
}

/// Parse the bare seconds value printed by `ffprobe` (e.g. `25212.480000`)
pub fn parse_duration_output(output: &str) -> Option<Duration> {
    let secs: f64 = output.lines().next()?.trim().parse().ok()?;
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
