//! Streaming endpoints: original files with range semantics, on-the-fly
//! transcoding (including synthesized WAV with byte-range seek), HLS
//! artifacts and downloads.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::ServerState;
use crate::store::Song;
use crate::streaming::{
    self, parse_range_header, transcoder, Format, RangeHeader, TranscodeRequest,
};
use axum::body::Body;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};
use tokio::process::{Child, ChildStdout};
use tokio_util::io::ReaderStream;
use tracing::debug;

const STREAM_BUFFER: usize = 4096 * 16;

/// Encoder stdout that owns its child process: dropping the body stream
/// (client disconnect) drops the child, and `kill_on_drop` terminates the
/// encoder.
struct ChildStream {
    _child: Child,
    stdout: ChildStdout,
}

impl ChildStream {
    fn take(mut child: Child) -> Option<ChildStream> {
        let stdout = child.stdout.take()?;
        Some(ChildStream {
            _child: child,
            stdout,
        })
    }
}

impl AsyncRead for ChildStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub format: Option<String>,
    pub bitrate: Option<u32>,
    pub seek: Option<f64>,
}

fn source_mime(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn http_date(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp())
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn stream_song(
    _session: Session,
    State(state): State<ServerState>,
    AxumPath(id): AxumPath<i64>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let song = state
        .store
        .get_song(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    debug!("Streaming song {} ({})", song.id, song.file_path);

    match &query.format {
        None => serve_original(&song, &headers, None).await,
        Some(format) => {
            let bitrate = query.bitrate.unwrap_or(0);
            let (format, mime) = transcoder::validate(format, bitrate)?;
            match format {
                Format::Wav => serve_wav(&state, &song, &headers).await,
                other => serve_transcoded(&state, &song, other, mime, bitrate, query.seek, None),
            }
        }
    }
}

pub async fn download_song(
    _session: Session,
    State(state): State<ServerState>,
    AxumPath(id): AxumPath<i64>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let details = state
        .store
        .get_song_details(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    let song = details.song.clone();

    match &query.format {
        None => {
            let filename = format!(
                "{} - {}.{}",
                details.artist_name, song.title, song.format
            );
            serve_original(&song, &headers, Some(&filename)).await
        }
        Some(format) => {
            let bitrate = query.bitrate.unwrap_or(0);
            let (format, mime) = transcoder::validate(format, bitrate)?;
            let filename = format!(
                "{} - {}.{}",
                details.artist_name, song.title, format.as_str()
            );
            serve_transcoded(&state, &song, format, mime, bitrate, None, Some(&filename))
        }
    }
}

/// Serve the file as-is with single-range and conditional-request support.
async fn serve_original(
    song: &Song,
    headers: &HeaderMap,
    attachment: Option<&str>,
) -> ApiResult<Response> {
    let path = Path::new(&song.file_path);
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::NotFound("file"))?;
    let metadata = file.metadata().await.map_err(ApiError::internal)?;
    let size = metadata.len();
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(song.file_modified);

    if let Some(since) = header_str(headers, header::IF_MODIFIED_SINCE).and_then(parse_http_date) {
        if modified <= since {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }
    if let Some(unmodified_since) =
        header_str(headers, header::IF_UNMODIFIED_SINCE).and_then(parse_http_date)
    {
        if modified > unmodified_since {
            return Ok(StatusCode::PRECONDITION_FAILED.into_response());
        }
    }

    let mime = source_mime(&song.format);
    let range = match header_str(headers, header::RANGE) {
        None => None,
        Some(value) => match parse_range_header(value) {
            RangeHeader::Invalid => return Err(ApiError::RangeNotSatisfiable { size }),
            RangeHeader::Single(range) => {
                Some(range.resolve(size).ok_or(ApiError::RangeNotSatisfiable { size })?)
            }
        },
    };

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::LAST_MODIFIED, http_date(modified));
    if let Some(filename) = attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "_")),
        );
    }

    let response = match range {
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, size)
            .body(Body::from_stream(ReaderStream::with_capacity(
                file,
                STREAM_BUFFER,
            ))),
        Some((start, end)) => {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(ApiError::internal)?;
            let length = end - start + 1;
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, size),
                )
                .body(Body::from_stream(ReaderStream::with_capacity(
                    file.take(length),
                    STREAM_BUFFER,
                )))
        }
    };
    response.map_err(ApiError::internal)
}

/// Synthesized WAV: the total size and byte-to-time mapping are computed
/// analytically, so byte ranges seek into a stream that does not exist as
/// a file.
async fn serve_wav(state: &ServerState, song: &Song, headers: &HeaderMap) -> ApiResult<Response> {
    let total = transcoder::wav_size(
        song.duration_ms,
        song.sample_rate,
        song.bit_depth,
        song.channels,
    );

    let range = match header_str(headers, header::RANGE) {
        None => None,
        Some(value) => match parse_range_header(value) {
            RangeHeader::Invalid => return Err(ApiError::RangeNotSatisfiable { size: total }),
            RangeHeader::Single(range) => Some(
                range
                    .resolve(total)
                    .ok_or(ApiError::RangeNotSatisfiable { size: total })?,
            ),
        },
    };

    match range {
        // A range starting at the header is the whole stream
        None | Some((0, _)) => {
            let args = streaming::build_args(&TranscodeRequest {
                input: song.file_path.clone().into(),
                format: Format::Wav,
                bitrate_kbps: 0,
                seek_secs: None,
                bit_depth: song.bit_depth,
            });
            let child = state.transcoder.spawn(&args)?;
            let stream =
                ChildStream::take(child).ok_or_else(|| ApiError::internal(anyhow::anyhow!("encoder stdout unavailable")))?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "audio/wav")
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_LENGTH, total)
                .body(Body::from_stream(ReaderStream::with_capacity(
                    stream.take(total),
                    STREAM_BUFFER,
                )))
                .map_err(ApiError::internal)
        }
        Some((start, end)) => {
            let args = transcoder::wav_seek_args(
                Path::new(&song.file_path),
                start,
                song.sample_rate,
                song.bit_depth,
                song.channels,
            );
            let child = state.transcoder.spawn(&args)?;
            let stream =
                ChildStream::take(child).ok_or_else(|| ApiError::internal(anyhow::anyhow!("encoder stdout unavailable")))?;
            let length = end - start + 1;
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "audio/wav")
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_LENGTH, length)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, total),
                )
                .body(Body::from_stream(ReaderStream::with_capacity(
                    stream.take(length),
                    STREAM_BUFFER,
                )))
                .map_err(ApiError::internal)
        }
    }
}

/// Lossy/lossless transcode to a chunked 200 response. Range requests are
/// not honored for these streams.
fn serve_transcoded(
    state: &ServerState,
    song: &Song,
    format: Format,
    mime: &'static str,
    bitrate: u32,
    seek_secs: Option<f64>,
    attachment: Option<&str>,
) -> ApiResult<Response> {
    let bitrate = if bitrate == 0 {
        streaming::default_bitrate(format)
    } else {
        bitrate
    };
    let args = streaming::build_args(&TranscodeRequest {
        input: song.file_path.clone().into(),
        format,
        bitrate_kbps: bitrate,
        seek_secs,
        bit_depth: song.bit_depth,
    });
    let child = state.transcoder.spawn(&args)?;
    let stream = ChildStream::take(child)
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("encoder stdout unavailable")))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime);
    if let Some(filename) = attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "_")),
        );
    }
    builder
        .body(Body::from_stream(ReaderStream::with_capacity(
            stream,
            STREAM_BUFFER,
        )))
        .map_err(ApiError::internal)
}

// -- HLS ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct HlsQuery {
    pub format: Option<String>,
    pub bitrate: Option<u32>,
}

fn hls_format(query: &HlsQuery) -> ApiResult<(Format, u32)> {
    let format = Format::parse(query.format.as_deref().unwrap_or("aac"))?;
    let bitrate = match query.bitrate {
        Some(bitrate) => {
            transcoder::validate(format.as_str(), bitrate)?;
            bitrate
        }
        None => streaming::default_bitrate(format),
    };
    Ok((format, bitrate))
}

pub async fn hls_manifest(
    _session: Session,
    State(state): State<ServerState>,
    AxumPath(id): AxumPath<i64>,
    Query(query): Query<HlsQuery>,
) -> ApiResult<Response> {
    let song = state
        .store
        .get_song(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    let (format, bitrate) = hls_format(&query)?;

    let manifest = state.hls.manifest(&song, format, bitrate);
    Ok((
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        manifest,
    )
        .into_response())
}

pub async fn hls_init(
    _session: Session,
    State(state): State<ServerState>,
    AxumPath(id): AxumPath<i64>,
    Query(query): Query<HlsQuery>,
) -> ApiResult<Response> {
    let song = state
        .store
        .get_song(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    let (format, bitrate) = hls_format(&query)?;

    let path = state.hls.init_segment(&song, format, bitrate).await?;
    let bytes = tokio::fs::read(&path).await.map_err(ApiError::internal)?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], bytes).into_response())
}

pub async fn hls_segment(
    _session: Session,
    State(state): State<ServerState>,
    AxumPath((id, segment)): AxumPath<(i64, String)>,
    Query(query): Query<HlsQuery>,
) -> ApiResult<Response> {
    let index: u64 = segment
        .strip_suffix(".m4s")
        .and_then(|n| n.parse().ok())
        .ok_or(ApiError::NotFound("segment"))?;
    let song = state
        .store
        .get_song(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    let (format, bitrate) = hls_format(&query)?;

    let path = state
        .hls
        .media_segment(&song, format, bitrate, index)
        .await?;
    let bytes = tokio::fs::read(&path).await.map_err(ApiError::internal)?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], bytes).into_response())
}
