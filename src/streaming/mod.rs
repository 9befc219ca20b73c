//! The adaptive streaming engine: range parsing, the external encoder
//! adapter with WAV synthesis math, and the segmented HLS generator with its
//! bounded cache.

pub mod cache;
pub mod hls;
pub mod range;
pub mod transcoder;

pub use cache::HlsCache;
pub use hls::{HlsError, HlsGenerator};
pub use range::{parse_range_header, ByteRange, RangeHeader};
pub use transcoder::{
    build_args, default_bitrate, validate, wav_seek_args, wav_size, Format, TranscodeError,
    TranscodeRequest, Transcoder,
};
