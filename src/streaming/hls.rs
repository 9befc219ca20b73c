//! HLS artifacts: m3u8 manifests, fMP4 init segments and numbered media
//! segments, generated on demand through the bounded disk cache.

use super::cache::HlsCache;
use super::transcoder::{Format, TranscodeError, Transcoder};
use crate::store::Song;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum HlsError {
    #[error("segment {0} is out of range")]
    SegmentOutOfRange(u64),

    #[error("format '{0}' is not supported for HLS")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Formats that can live in an fMP4 container.
fn hls_codec(format: Format) -> Result<&'static str, HlsError> {
    match format {
        Format::Aac => Ok("aac"),
        Format::Flac => Ok("flac"),
        other => Err(HlsError::UnsupportedFormat(other.as_str().to_string())),
    }
}

pub struct HlsGenerator {
    transcoder: Arc<Transcoder>,
    cache: Arc<HlsCache>,
    segment_ms: u64,
}

impl HlsGenerator {
    pub fn new(transcoder: Arc<Transcoder>, cache: Arc<HlsCache>, segment_secs: u64) -> HlsGenerator {
        HlsGenerator {
            transcoder,
            cache,
            segment_ms: segment_secs.max(1) * 1000,
        }
    }

    pub fn segment_count(&self, duration_ms: i64) -> u64 {
        let duration_ms = duration_ms.max(0) as u64;
        duration_ms.div_ceil(self.segment_ms)
    }

    /// Media playlist for one (track, format, bitrate) rendition. Segment
    /// URIs are relative to the manifest and carry the rendition query so
    /// every artifact resolves to the same cache key family.
    pub fn manifest(&self, song: &Song, format: Format, bitrate_kbps: u32) -> String {
        let segment_secs = self.segment_ms / 1000;
        let count = self.segment_count(song.duration_ms);
        let duration_ms = song.duration_ms.max(0) as u64;
        let rendition = format!("?format={}&bitrate={}", format.as_str(), bitrate_kbps);

        let mut manifest = String::new();
        manifest.push_str("#EXTM3U\n");
        manifest.push_str("#EXT-X-VERSION:7\n");
        manifest.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", segment_secs));
        manifest.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
        manifest.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        manifest.push_str(&format!("#EXT-X-MAP:URI=\"init.mp4{}\"\n", rendition));

        for index in 0..count {
            let start = index * self.segment_ms;
            let length_ms = (duration_ms - start).min(self.segment_ms);
            manifest.push_str(&format!("#EXTINF:{:.3},\n", length_ms as f64 / 1000.0));
            manifest.push_str(&format!("{}.m4s{}\n", index, rendition));
        }
        manifest.push_str("#EXT-X-ENDLIST\n");
        manifest
    }

    /// The fMP4 initialization blob for the chosen codec.
    pub async fn init_segment(
        &self,
        song: &Song,
        format: Format,
        bitrate_kbps: u32,
    ) -> Result<PathBuf, HlsError> {
        let codec = hls_codec(format)?;
        self.ensure_encoder()?;
        let key = artifact_key(song.id, format, bitrate_kbps, "init.mp4");
        let args = init_args(&song.file_path, codec, bitrate_kbps);
        let ffmpeg = self.transcoder.binary().to_string();
        let path = self
            .cache
            .get_or_create(&key, || run_encoder(ffmpeg, args))
            .await?;
        Ok(path)
    }

    /// One numbered media segment; the last may be shorter than the target
    /// duration.
    pub async fn media_segment(
        &self,
        song: &Song,
        format: Format,
        bitrate_kbps: u32,
        index: u64,
    ) -> Result<PathBuf, HlsError> {
        let codec = hls_codec(format)?;
        if index >= self.segment_count(song.duration_ms) {
            return Err(HlsError::SegmentOutOfRange(index));
        }
        self.ensure_encoder()?;

        let key = artifact_key(song.id, format, bitrate_kbps, &format!("{index}.m4s"));
        let start_secs = (index * self.segment_ms) as f64 / 1000.0;
        let length_secs = self.segment_ms as f64 / 1000.0;
        let args = segment_args(&song.file_path, codec, bitrate_kbps, start_secs, length_secs);
        let ffmpeg = self.transcoder.binary().to_string();
        let path = self
            .cache
            .get_or_create(&key, || run_encoder(ffmpeg, args))
            .await?;
        Ok(path)
    }

    fn ensure_encoder(&self) -> Result<(), HlsError> {
        if self.transcoder.resolve_binary().is_none() {
            return Err(HlsError::Transcode(TranscodeError::EncoderUnavailable(
                self.transcoder.binary().to_string(),
            )));
        }
        Ok(())
    }
}

fn artifact_key(song_id: i64, format: Format, bitrate_kbps: u32, artifact: &str) -> String {
    format!("{}.{}.{}.{}", song_id, format.as_str(), bitrate_kbps, artifact)
}

fn codec_args(codec: &str, bitrate_kbps: u32) -> Vec<String> {
    let mut args = vec!["-c:a".to_string(), codec.to_string()];
    if codec == "aac" && bitrate_kbps > 0 {
        args.push("-b:a".to_string());
        args.push(format!("{}k", bitrate_kbps));
    }
    args
}

fn init_args(input: &str, codec: &str, bitrate_kbps: u32) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string(),
        "-vn".to_string(),
    ];
    args.extend(codec_args(codec, bitrate_kbps));
    args.extend([
        "-t".to_string(),
        "0".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        "-movflags".to_string(),
        "+empty_moov+default_base_moof".to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

fn segment_args(
    input: &str,
    codec: &str,
    bitrate_kbps: u32,
    start_secs: f64,
    length_secs: f64,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", start_secs),
        "-t".to_string(),
        format!("{:.3}", length_secs),
        "-i".to_string(),
        input.to_string(),
        "-vn".to_string(),
    ];
    args.extend(codec_args(codec, bitrate_kbps));
    args.extend([
        "-f".to_string(),
        "mp4".to_string(),
        "-movflags".to_string(),
        "+frag_keyframe+empty_moov+default_base_moof".to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

async fn run_encoder(ffmpeg: String, args: Vec<String>) -> Result<Vec<u8>> {
    let output = Command::new(&ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("encoder exited with {}: {}", output.status, stderr.trim());
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(duration_ms: i64) -> Song {
        Song {
            id: 7,
            album_id: 1,
            artist_id: 1,
            title: "T".to_string(),
            track_number: None,
            disc_number: None,
            duration_ms,
            sample_rate: 44_100,
            bit_depth: 16,
            channels: 2,
            bitrate_kbps: None,
            format: "flac".to_string(),
            file_path: "/m/t.flac".to_string(),
            file_size: 1,
            file_modified: 0,
            cover_path: None,
            external_id: None,
            created_at: 0,
        }
    }

    fn generator() -> (tempfile::TempDir, HlsGenerator) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(HlsCache::new(dir.path().join("hls"), 1024 * 1024).unwrap());
        let generator = HlsGenerator::new(Arc::new(Transcoder::new("ffmpeg")), cache, 4);
        (dir, generator)
    }

    #[test]
    fn segment_count_is_ceiling() {
        let (_dir, generator) = generator();
        assert_eq!(generator.segment_count(0), 0);
        assert_eq!(generator.segment_count(4_000), 1);
        assert_eq!(generator.segment_count(4_001), 2);
        assert_eq!(generator.segment_count(200_000), 50);
    }

    #[test]
    fn manifest_lists_every_segment_and_ends() {
        let (_dir, generator) = generator();
        let manifest = generator.manifest(&song(10_000), Format::Aac, 192);

        assert!(manifest.starts_with("#EXTM3U\n"));
        assert!(manifest.contains("#EXT-X-TARGETDURATION:4\n"));
        assert!(manifest.contains("#EXT-X-MAP:URI=\"init.mp4?format=aac&bitrate=192\"\n"));
        assert!(manifest.contains("0.m4s?format=aac&bitrate=192\n"));
        assert!(manifest.contains("1.m4s?format=aac&bitrate=192\n"));
        assert!(manifest.contains("2.m4s?format=aac&bitrate=192\n"));
        assert!(!manifest.contains("3.m4s?format=aac&bitrate=192\n"));
        // The last segment carries the 2 s remainder
        assert!(manifest.contains("#EXTINF:2.000,\n"));
        assert!(manifest.trim_end().ends_with("#EXT-X-ENDLIST"));
    }

    #[tokio::test]
    async fn out_of_range_segment_is_rejected() {
        let (_dir, generator) = generator();
        let result = generator
            .media_segment(&song(10_000), Format::Aac, 192, 3)
            .await;
        assert!(matches!(result, Err(HlsError::SegmentOutOfRange(3))));
    }

    #[test]
    fn only_fmp4_codecs_are_accepted() {
        assert!(hls_codec(Format::Aac).is_ok());
        assert!(hls_codec(Format::Flac).is_ok());
        assert!(matches!(
            hls_codec(Format::Mp3),
            Err(HlsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn segment_args_seek_before_input() {
        let args = segment_args("/m/t.flac", "aac", 192, 8.0, 4.0);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "8.000");
        assert!(args.contains(&"+frag_keyframe+empty_moov+default_base_moof".to_string()));
    }
}
