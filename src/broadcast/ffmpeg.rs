//! `ffmpeg` broadcaster
//!
//! The artifact is read at native frame rate (`-re`) and pushed as FLV to the
//! RTMP ingest. Video is passed through untouched; audio is re-encoded so that
//! a synthetic silent track can stand in when the recording has none.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use super::probe::MediaProbe;
use super::process::ProcessHandle;
use super::{validate_artifact, BroadcastProcess, Broadcaster, LaunchError};
use crate::config::Config;
use crate::models::LocalArtifact;
use crate::utils::format_bytes;

/// Synthetic stereo silence used when the artifact has no audio track
const SILENT_AUDIO: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Which audio track goes on air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// The artifact's own audio
    Original,
    /// Synthetic silence
    Silent,
    /// Probe failed; let the transcoder pick among both inputs
    Auto,
}

impl AudioSource {
    /// Choose from the result of an audio probe
    pub fn from_probe(has_audio: Option<bool>) -> Self {
        match has_audio {
            Some(true) => Self::Original,
            Some(false) => Self::Silent,
            None => Self::Auto,
        }
    }
}

/// Broadcaster driving `ffmpeg`, probing with `ffprobe`
#[derive(Debug, Clone)]
pub struct FfmpegBroadcaster {
    program: String,
    probe: MediaProbe,
    ingest_url: String,
    target: String,
    frame_rate: u32,
    keyframe_interval: u32,
    audio_codec: String,
}

impl FfmpegBroadcaster {
    pub fn from_config(config: &Config) -> Self {
        let broadcast = &config.broadcast;
        Self {
            program: broadcast.ffmpeg_path.clone(),
            probe: MediaProbe::new(&broadcast.ffprobe_path),
            ingest_url: broadcast.ingest_url.trim_end_matches('/').to_string(),
            target: config.broadcast_target(),
            frame_rate: broadcast.frame_rate,
            keyframe_interval: broadcast.keyframe_interval,
            audio_codec: broadcast.audio_codec.clone(),
        }
    }

    /// Build command arguments
    pub fn args(&self, artifact: &Path, audio: AudioSource) -> Vec<String> {
        let mut args: Vec<String> = ["-v", "info", "-re", "-i"].map(String::from).to_vec();
        args.push(artifact.to_string_lossy().into_owned());
        args.extend(["-f", "lavfi", "-i", SILENT_AUDIO].map(String::from));

        match audio {
            AudioSource::Original => {
                args.extend(["-map", "0:v:0", "-map", "0:a:0"].map(String::from));
            }
            AudioSource::Silent => {
                args.extend(["-map", "0:v:0", "-map", "1:a:0", "-shortest"].map(String::from));
            }
            // The silent input never ends, so cap output at the recording
            AudioSource::Auto => args.push(String::from("-shortest")),
        }

        args.extend(["-c:v", "copy", "-c:a", self.audio_codec.as_str(), "-g"].map(String::from));
        args.push(self.keyframe_interval.to_string());
        args.extend(["-f", "flv"].map(String::from));
        args.push(self.target.clone());
        args
    }

    /// Arguments with the stream key masked, for logging
    fn redacted(&self, args: &[String]) -> String {
        args.iter()
            .map(|arg| {
                if *arg == self.target {
                    format!("{}/****", self.ingest_url)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Broadcaster for FfmpegBroadcaster {
    async fn start(
        &self,
        artifact: &LocalArtifact,
    ) -> Result<Box<dyn BroadcastProcess>, LaunchError> {
        let size = validate_artifact(&artifact.path).await?;
        tracing::info!(
            path = %artifact.path.display(),
            size = %format_bytes(size),
            "Video file size"
        );

        let audio = AudioSource::from_probe(self.probe.has_audio(&artifact.path).await);
        if audio == AudioSource::Silent {
            tracing::info!(path = %artifact.path.display(), "No audio track, broadcasting silence");
        }

        let args = self.args(&artifact.path, audio);
        tracing::info!(
            command = %format!("{} {}", self.program, self.redacted(&args)),
            keyframe_secs = f64::from(self.keyframe_interval) / f64::from(self.frame_rate.max(1)),
            "Starting ffmpeg"
        );

        let mut command = Command::new(&self.program);
        command.args(&args);

        let handle = ProcessHandle::spawn(command, "ffmpeg")?;
        Ok(Box::new(handle))
    }

    async fn probe_duration(&self, artifact: &LocalArtifact) -> Option<Duration> {
        self.probe.duration(&artifact.path).await
    }
}
