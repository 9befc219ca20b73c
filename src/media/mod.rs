//! Adapters around media files: technical probing, embedded tags, cover art
//! and lyrics resolution.

pub mod covers;
pub mod lyrics;
pub mod probe;
pub mod tags;

pub use covers::CoverResolver;
pub use probe::{AudioProbe, FfprobeAudioProbe, ProbeError, ProbeResult};
pub use tags::{read_tags, EmbeddedPicture, FileTags};
