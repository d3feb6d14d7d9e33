//! # Audio Transcoding
//!
//! Wraps the external ffmpeg tool behind a byte-in/byte-out contract:
//! merged container audio (WebM/Opus/Ogg) goes in, PCM WAV (s16le,
//! 16 kHz, mono) comes out. The call is blocking and must always be
//! dispatched off the event-handling threads via `spawn_blocking`.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Decide whether a merged buffer needs transcoding before speech
/// recognition. Compressed/container formats do; WAV/PCM passes through.
/// An unknown MIME type transcodes, the safe default.
pub fn needs_transcode(mime_type: Option<&str>) -> bool {
    match mime_type {
        None => true,
        Some(mime) => {
            let m = mime.to_ascii_lowercase();
            (m.contains("webm") || m.contains("opus") || m.contains("ogg")) && !m.contains("wav")
        }
    }
}

/// Blocking byte-in/byte-out transcode collaborator.
pub trait Transcoder: Send + Sync {
    fn to_pcm_wav_16k_mono(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// Shells out to ffmpeg through a pair of temp files.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn temp_path(prefix: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.{}", prefix, Uuid::new_v4(), ext))
    }
}

impl Transcoder for FfmpegTranscoder {
    fn to_pcm_wav_16k_mono(&self, input: &[u8]) -> Result<Vec<u8>> {
        let in_path = Self::temp_path("audio-in", "webm");
        let out_path = Self::temp_path("audio-out", "wav");

        fs::write(&in_path, input).context("writing transcode input")?;

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .args(["-i"])
            .arg(&in_path)
            .args(["-vn", "-sn"])
            .args(["-ac", "1", "-ar", "16000"])
            .args(["-c:a", "pcm_s16le"])
            .args(["-map_metadata", "-1"])
            .arg(&out_path)
            .output();

        let wav = match result {
            Ok(output) if output.status.success() => {
                debug!(
                    "ffmpeg transcode ok: {} -> {} bytes",
                    input.len(),
                    fs::metadata(&out_path).map(|m| m.len()).unwrap_or(0)
                );
                fs::read(&out_path).context("reading transcode output")
            }
            Ok(output) => Err(anyhow!(
                "ffmpeg failed: exit={}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            )),
            Err(err) => Err(anyhow!("failed to launch ffmpeg: {}", err)),
        };

        let _ = fs::remove_file(&in_path);
        let _ = fs::remove_file(&out_path);

        wav
    }
}
