//! Technical audio properties via an external ffprobe binary.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Bound on a single probe invocation; a hung binary must not stall a scan
/// worker indefinitely.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bit depth assumed when the codec does not report one (lossy formats).
const DEFAULT_BIT_DEPTH: i64 = 16;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed: {0}")]
    Failed(String),

    #[error("ffprobe timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("No duration reported")]
    NoDuration,
}

/// Technical properties of an audio file.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub duration_ms: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channels: i64,
    pub bitrate_kbps: Option<i64>,
    pub codec: String,
}

/// ffprobe JSON output structure.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<i64>,
    bit_rate: Option<String>,
    bits_per_raw_sample: Option<String>,
    bits_per_sample: Option<i64>,
    sample_fmt: Option<String>,
}

/// Seam for the scanner: tests substitute a canned implementation because a
/// real ffprobe is not available in every environment.
#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;
}

pub struct FfprobeAudioProbe {
    binary: String,
}

impl FfprobeAudioProbe {
    pub fn new(binary: impl Into<String>) -> FfprobeAudioProbe {
        FfprobeAudioProbe {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl AudioProbe for FfprobeAudioProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let child = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, child)
            .await
            .map_err(|_| ProbeError::Timeout)??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let probe: FfprobeOutput = serde_json::from_str(&stdout)
            .map_err(|e| ProbeError::InvalidOutput(format!("JSON parse error: {}", e)))?;

        parse_probe_output(probe)
    }
}

fn parse_probe_output(probe: FfprobeOutput) -> Result<ProbeResult, ProbeError> {
    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or(ProbeError::NoAudioStream)?;

    // ffprobe reports duration in (fractional) seconds
    let duration_secs: f64 = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);
    let duration_ms = (duration_secs * 1000.0) as i64;
    if duration_ms <= 0 {
        return Err(ProbeError::NoDuration);
    }

    // Prefer stream bitrate, fall back to format bitrate
    let bitrate_kbps = audio_stream
        .bit_rate
        .as_ref()
        .or(probe.format.bit_rate.as_ref())
        .and_then(|b| b.parse::<i64>().ok())
        .map(|b| b / 1000)
        .filter(|kbps| *kbps > 0);

    let sample_rate = audio_stream
        .sample_rate
        .as_ref()
        .and_then(|sr| sr.parse().ok())
        .unwrap_or(44_100);

    Ok(ProbeResult {
        duration_ms,
        sample_rate,
        bit_depth: bit_depth_of(audio_stream),
        channels: audio_stream.channels.unwrap_or(2),
        bitrate_kbps,
        codec: audio_stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

fn bit_depth_of(stream: &FfprobeStream) -> i64 {
    if let Some(raw) = stream
        .bits_per_raw_sample
        .as_ref()
        .and_then(|b| b.parse::<i64>().ok())
        .filter(|b| *b > 0)
    {
        return raw;
    }
    if let Some(bits) = stream.bits_per_sample.filter(|b| *b > 0) {
        return bits;
    }
    match stream.sample_fmt.as_deref() {
        Some("u8" | "u8p") => 8,
        Some("s16" | "s16p") => 16,
        Some("s32" | "s32p") => 32,
        _ => DEFAULT_BIT_DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> FfprobeStream {
        FfprobeStream {
            codec_type: "audio".to_string(),
            codec_name: Some("flac".to_string()),
            sample_rate: Some("44100".to_string()),
            channels: Some(2),
            bit_rate: None,
            bits_per_raw_sample: None,
            bits_per_sample: None,
            sample_fmt: None,
        }
    }

    #[test]
    fn parses_full_output() {
        let out = FfprobeOutput {
            format: FfprobeFormat {
                duration: Some("200.5".to_string()),
                bit_rate: Some("320000".to_string()),
            },
            streams: vec![FfprobeStream {
                bits_per_raw_sample: Some("24".to_string()),
                ..stream()
            }],
        };
        let result = parse_probe_output(out).unwrap();
        assert_eq!(result.duration_ms, 200_500);
        assert_eq!(result.sample_rate, 44_100);
        assert_eq!(result.bit_depth, 24);
        assert_eq!(result.channels, 2);
        assert_eq!(result.bitrate_kbps, Some(320));
        assert_eq!(result.codec, "flac");
    }

    #[test]
    fn lossy_defaults_to_16_bit() {
        let out = FfprobeOutput {
            format: FfprobeFormat {
                duration: Some("10".to_string()),
                bit_rate: None,
            },
            streams: vec![FfprobeStream {
                codec_name: Some("mp3".to_string()),
                bits_per_sample: Some(0),
                ..stream()
            }],
        };
        assert_eq!(parse_probe_output(out).unwrap().bit_depth, 16);
    }

    #[test]
    fn missing_duration_is_an_error() {
        let out = FfprobeOutput {
            format: FfprobeFormat {
                duration: None,
                bit_rate: None,
            },
            streams: vec![stream()],
        };
        assert!(matches!(parse_probe_output(out), Err(ProbeError::NoDuration)));
    }

    #[test]
    fn video_only_file_is_rejected() {
        let out = FfprobeOutput {
            format: FfprobeFormat {
                duration: Some("10".to_string()),
                bit_rate: None,
            },
            streams: vec![FfprobeStream {
                codec_type: "video".to_string(),
                ..stream()
            }],
        };
        assert!(matches!(parse_probe_output(out), Err(ProbeError::NoAudioStream)));
    }
}
