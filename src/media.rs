use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Error taxonomy for the media backend.
///
/// Classification is decided here, by the converter implementation, instead
/// of by matching substrings of error text downstream. `Transient` marks a
/// cross-thread rendering/decoding conflict in the underlying library that
/// is worth exactly one automatic retry; everything else is fatal for the
/// current batch attempt.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("transient media backend conflict: {0}")]
    Transient(String),

    #[error("probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("no audio stream in {0}")]
    NoAudioStream(PathBuf),

    #[error("audio write failed for {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl MediaError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::Transient(_))
    }
}

/// Audio stream of an opened media file, ready to be written out.
#[async_trait]
pub trait AudioStream: Send + Sync {
    /// Write the audio to `output_path`. Blocking and uninterruptible once
    /// started; cancellation is only observed between calls.
    async fn write_to(&self, output_path: &Path) -> Result<(), MediaError>;
}

/// Opened media file: its duration plus a writable audio stream.
pub struct MediaHandle {
    pub duration_secs: f64,
    pub stream: Box<dyn AudioStream>,
}

/// External collaborator that opens media files. The coordinator only relies
/// on this contract, never on a concrete backend.
#[async_trait]
pub trait MediaConverter: Send + Sync + 'static {
    async fn open(&self, path: &Path) -> Result<MediaHandle, MediaError>;
}

/// Production converter backed by the ffmpeg command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    /// Audio codec passed to ffmpeg (libmp3lame for mp3 output).
    pub codec: String,
    /// Output bitrate, e.g. "192k".
    pub bitrate: String,
}

impl FfmpegConverter {
    pub fn new(codec: impl Into<String>, bitrate: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            bitrate: bitrate.into(),
        }
    }

    /// Probe duration and audio-stream presence with ffprobe.
    async fn probe(&self, path: &Path) -> Result<f64, MediaError> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| MediaError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MediaError::Probe {
                path: path.to_path_buf(),
                reason: format!("ffprobe exited with {}", output.status),
            });
        }

        let data: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| MediaError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let has_audio = data["streams"]
            .as_array()
            .map(|streams| streams.iter().any(|s| s["codec_type"] == "audio"))
            .unwrap_or(false);
        if !has_audio {
            return Err(MediaError::NoAudioStream(path.to_path_buf()));
        }

        let duration: f64 = data["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok(duration)
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new("libmp3lame", "192k")
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn open(&self, path: &Path) -> Result<MediaHandle, MediaError> {
        let duration_secs = self.probe(path).await?;

        info!(
            "🎬 Opened {} ({:.1}s)",
            path.display(),
            duration_secs
        );

        Ok(MediaHandle {
            duration_secs,
            stream: Box::new(FfmpegAudioStream {
                source: path.to_path_buf(),
                codec: self.codec.clone(),
                bitrate: self.bitrate.clone(),
            }),
        })
    }
}

struct FfmpegAudioStream {
    source: PathBuf,
    codec: String,
    bitrate: String,
}

#[async_trait]
impl AudioStream for FfmpegAudioStream {
    async fn write_to(&self, output_path: &Path) -> Result<(), MediaError> {
        let status = tokio::process::Command::new("ffmpeg")
            .arg("-i")
            .arg(&self.source)
            .args(["-vn", "-acodec", &self.codec, "-b:a", &self.bitrate, "-y"])
            .arg(output_path)
            .status()
            .await
            .map_err(|e| MediaError::Write {
                path: output_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(MediaError::Write {
                path: output_path.to_path_buf(),
                reason: format!("ffmpeg exited with {}", status),
            });
        }

        info!("🎵 Audio written: {}", output_path.display());
        Ok(())
    }
}
