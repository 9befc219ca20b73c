//! On-the-fly transcoding: format/bitrate validation, ffmpeg command lines
//! and the analytic WAV size/seek math.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::{Child, Command};

/// Size of a canonical RIFF/WAVE header preceding the PCM data.
pub const WAV_HEADER_BYTES: u64 = 44;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("invalid format '{0}'")]
    InvalidFormat(String),

    #[error("invalid bitrate {bitrate} for format '{format}'")]
    InvalidBitrate { format: &'static str, bitrate: u32 },

    #[error("encoder binary '{0}' is not available")]
    EncoderUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Mp3,
    Aac,
    Opus,
    Wav,
    Flac,
}

impl Format {
    pub fn parse(s: &str) -> Result<Format, TranscodeError> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Format::Mp3),
            "aac" => Ok(Format::Aac),
            "opus" => Ok(Format::Opus),
            "wav" => Ok(Format::Wav),
            "flac" => Ok(Format::Flac),
            other => Err(TranscodeError::InvalidFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Mp3 => "mp3",
            Format::Aac => "aac",
            Format::Opus => "opus",
            Format::Wav => "wav",
            Format::Flac => "flac",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Format::Mp3 => "audio/mpeg",
            Format::Aac => "audio/mp4",
            Format::Opus => "audio/ogg",
            Format::Wav => "audio/wav",
            Format::Flac => "audio/flac",
        }
    }

    /// Allowed bitrates in kbps; lossless formats ignore bitrate (0).
    pub fn allowed_bitrates(&self) -> &'static [u32] {
        match self {
            Format::Mp3 => &[128, 192, 256, 320],
            Format::Aac => &[128, 192, 256],
            Format::Opus => &[64, 96, 128, 192, 256],
            Format::Wav => &[0],
            Format::Flac => &[0],
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Format::Wav | Format::Flac)
    }
}

/// Check a (format, bitrate) pair and return the response MIME type.
/// A bitrate of 0 on a lossy format selects that format's default.
pub fn validate(format: &str, bitrate: u32) -> Result<(Format, &'static str), TranscodeError> {
    let format = Format::parse(format)?;
    if format.is_lossless() {
        return Ok((format, format.mime()));
    }
    if bitrate != 0 && !format.allowed_bitrates().contains(&bitrate) {
        return Err(TranscodeError::InvalidBitrate {
            format: format.as_str(),
            bitrate,
        });
    }
    Ok((format, format.mime()))
}

/// Default bitrate when the client names a lossy format without one.
pub fn default_bitrate(format: Format) -> u32 {
    match format {
        Format::Mp3 => 192,
        Format::Aac => 192,
        Format::Opus => 128,
        Format::Wav | Format::Flac => 0,
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub format: Format,
    pub bitrate_kbps: u32,
    /// Seek offset in seconds, placed before the input for decode-accurate
    /// seeking.
    pub seek_secs: Option<f64>,
    /// Source bit depth; only WAV output honors it.
    pub bit_depth: i64,
}

fn pcm_codec(bit_depth: i64) -> &'static str {
    match bit_depth {
        8 => "pcm_u8",
        24 => "pcm_s24le",
        32 => "pcm_s32le",
        _ => "pcm_s16le",
    }
}

fn raw_pcm_muxer(bit_depth: i64) -> &'static str {
    match bit_depth {
        8 => "u8",
        24 => "s24le",
        32 => "s32le",
        _ => "s16le",
    }
}

/// Build the encoder's argument list; output goes to stdout.
pub fn build_args(request: &TranscodeRequest) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if let Some(seek) = request.seek_secs.filter(|s| *s > 0.0) {
        args.push("-ss".into());
        args.push(format!("{:.3}", seek));
    }
    args.push("-i".into());
    args.push(request.input.display().to_string());
    args.push("-vn".into());

    match request.format {
        Format::Mp3 => {
            args.extend(["-c:a".into(), "libmp3lame".into()]);
            args.extend(["-b:a".into(), format!("{}k", request.bitrate_kbps)]);
            args.extend(["-f".into(), "mp3".into()]);
        }
        Format::Aac => {
            args.extend(["-c:a".into(), "aac".into()]);
            args.extend(["-b:a".into(), format!("{}k", request.bitrate_kbps)]);
            args.extend(["-f".into(), "adts".into()]);
        }
        Format::Opus => {
            args.extend(["-c:a".into(), "libopus".into()]);
            args.extend(["-b:a".into(), format!("{}k", request.bitrate_kbps)]);
            args.extend(["-f".into(), "ogg".into()]);
        }
        Format::Wav => {
            args.extend(["-c:a".into(), pcm_codec(request.bit_depth).into()]);
            args.extend(["-f".into(), "wav".into()]);
        }
        Format::Flac => {
            args.extend(["-c:a".into(), "flac".into()]);
            args.extend(["-f".into(), "flac".into()]);
        }
    }
    args.push("pipe:1".into());
    args
}

/// Total byte size of a synthesized WAV stream:
/// header + floor(sample_rate * channels * (bit_depth / 8) * seconds).
pub fn wav_size(duration_ms: i64, sample_rate: i64, bit_depth: i64, channels: i64) -> u64 {
    let bytes_per_second = sample_rate as u128 * channels as u128 * (bit_depth as u128 / 8);
    WAV_HEADER_BYTES + (bytes_per_second * duration_ms as u128 / 1000) as u64
}

/// Map a byte offset in the synthesized WAV stream to a seek time.
pub fn wav_seek_secs(byte_offset: u64, sample_rate: i64, bit_depth: i64, channels: i64) -> f64 {
    let bytes_per_second = (sample_rate * channels * (bit_depth / 8)) as f64;
    if bytes_per_second <= 0.0 {
        return 0.0;
    }
    byte_offset.saturating_sub(WAV_HEADER_BYTES) as f64 / bytes_per_second
}

/// Arguments serving a WAV byte-range continuation: seek to the offset's
/// time and emit raw PCM in the matching depth (the client already holds
/// the header).
pub fn wav_seek_args(
    input: &Path,
    byte_offset: u64,
    sample_rate: i64,
    bit_depth: i64,
    channels: i64,
) -> Vec<String> {
    let seek = wav_seek_secs(byte_offset, sample_rate, bit_depth, channels);
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        format!("{:.6}", seek),
        "-i".into(),
        input.display().to_string(),
        "-vn".into(),
        "-c:a".into(),
        pcm_codec(bit_depth).into(),
        "-f".into(),
        raw_pcm_muxer(bit_depth).into(),
        "pipe:1".into(),
    ]
}

pub struct Transcoder {
    ffmpeg: String,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<String>) -> Transcoder {
        Transcoder {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.ffmpeg
    }

    /// Resolve the encoder binary: an explicit path must exist, a bare name
    /// is searched on PATH. Used to answer service-unavailable up front.
    pub fn resolve_binary(&self) -> Option<PathBuf> {
        let candidate = Path::new(&self.ffmpeg);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.ffmpeg))
            .find(|p| p.is_file())
    }

    /// Spawn the encoder with stdout piped. The child is killed when the
    /// handle drops, which covers client disconnects.
    pub fn spawn(&self, args: &[String]) -> Result<Child, TranscodeError> {
        if self.resolve_binary().is_none() {
            return Err(TranscodeError::EncoderUnavailable(self.ffmpeg.clone()));
        }
        let child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_format_bitrate_table() {
        assert!(validate("mp3", 320).is_ok());
        assert!(validate("opus", 64).is_ok());
        assert!(matches!(
            validate("mp3", 300),
            Err(TranscodeError::InvalidBitrate { .. })
        ));
        assert!(matches!(
            validate("aac", 64),
            Err(TranscodeError::InvalidBitrate { .. })
        ));
        assert!(matches!(
            validate("wma", 128),
            Err(TranscodeError::InvalidFormat(_))
        ));
        // Lossless ignores bitrate entirely
        assert_eq!(validate("wav", 12345).unwrap().1, "audio/wav");
        assert_eq!(validate("flac", 0).unwrap().1, "audio/flac");
    }

    #[test]
    fn wav_size_matches_analytic_formula() {
        // 200 s of 44.1 kHz 16-bit stereo
        assert_eq!(wav_size(200_000, 44_100, 16, 2), 35_280_044);
        // Header only for zero duration
        assert_eq!(wav_size(0, 44_100, 16, 2), 44);
        // Fractional second floors
        assert_eq!(wav_size(1_500, 44_100, 16, 2), 44 + 44_100 * 4 * 3 / 2);
    }

    #[test]
    fn wav_seek_maps_bytes_to_seconds() {
        let bytes_per_second = 44_100 * 2 * 2;
        assert_eq!(wav_seek_secs(44, 44_100, 16, 2), 0.0);
        let one_second_in = 44 + bytes_per_second as u64;
        assert!((wav_seek_secs(one_second_in, 44_100, 16, 2) - 1.0).abs() < 1e-9);
        // Offsets inside the header clamp to zero
        assert_eq!(wav_seek_secs(10, 44_100, 16, 2), 0.0);
    }

    #[test]
    fn seek_is_placed_before_input() {
        let args = build_args(&TranscodeRequest {
            input: PathBuf::from("/m/a.flac"),
            format: Format::Mp3,
            bitrate_kbps: 192,
            seek_secs: Some(12.5),
            bit_depth: 16,
        });
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "12.500");
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn wav_seek_args_emit_raw_pcm() {
        let args = wav_seek_args(Path::new("/m/a.flac"), 44 + 176_400, 44_100, 24, 2);
        assert!(args.contains(&"pcm_s24le".to_string()));
        assert!(args.contains(&"s24le".to_string()));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
    }
}
