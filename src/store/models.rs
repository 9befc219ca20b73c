//! Row types for the library database.
//!
//! Timestamps are unix seconds (UTC). Identifiers are SQLite rowids.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn from_str(s: &str) -> UserRole {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token_hash: String,
    pub user_id: i64,
    pub session_token: String,
    pub expires_at: i64,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub sort_name: String,
    pub external_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Album {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub year: Option<i64>,
    pub cover_path: Option<String>,
    pub external_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: i64,
    pub album_id: i64,
    pub artist_id: i64,
    pub title: String,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration_ms: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channels: i64,
    pub bitrate_kbps: Option<i64>,
    pub format: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: i64,
    pub cover_path: Option<String>,
    pub external_id: Option<String>,
    pub created_at: i64,
}

/// A song hydrated with its album title and primary artist name, the shape
/// most API responses use.
#[derive(Debug, Clone, Serialize)]
pub struct SongDetails {
    #[serde(flatten)]
    pub song: Song,
    pub artist_name: String,
    pub album_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumDetails {
    #[serde(flatten)]
    pub album: Album,
    pub artist_name: String,
    pub song_count: i64,
}

/// Fields of a song row under the scanner's control. Keyed by `file_path`;
/// rescanning the same path updates in place.
#[derive(Debug, Clone)]
pub struct SongUpsert {
    pub album_id: i64,
    pub artist_id: i64,
    pub title: String,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration_ms: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channels: i64,
    pub bitrate_kbps: Option<i64>,
    pub format: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: i64,
    pub cover_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsKind {
    Synced,
    Unsynced,
}

impl LyricsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsKind::Synced => "synced",
            LyricsKind::Unsynced => "unsynced",
        }
    }

    pub fn from_str(s: &str) -> LyricsKind {
        match s {
            "synced" => LyricsKind::Synced,
            _ => LyricsKind::Unsynced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsSource {
    Embedded,
    ExternalLrc,
    ExternalTxt,
}

impl LyricsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsSource::Embedded => "embedded",
            LyricsSource::ExternalLrc => "external_lrc",
            LyricsSource::ExternalTxt => "external_txt",
        }
    }

    pub fn from_str(s: &str) -> LyricsSource {
        match s {
            "embedded" => LyricsSource::Embedded,
            "external_lrc" => LyricsSource::ExternalLrc,
            _ => LyricsSource::ExternalTxt,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Lyrics {
    pub id: i64,
    pub song_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: LyricsKind,
    pub source: LyricsSource,
    /// ISO 639-2 code, e.g. "eng".
    pub language: String,
    pub created_at: i64,
}

/// Lyrics fields produced by the resolver, before a song id is attached.
#[derive(Debug, Clone)]
pub struct NewLyrics {
    pub content: String,
    pub kind: LyricsKind,
    pub source: LyricsSource,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub source_path: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayEvent {
    pub id: i64,
    pub user_id: i64,
    pub song_id: i64,
    pub played_at: i64,
    pub duration_listened_sec: i64,
    pub completion_rate: f64,
    pub source: String,
}

/// A play event hydrated with whatever survives of the song it referenced.
/// The history log is append-only, so the song may be gone.
#[derive(Debug, Clone, Serialize)]
pub struct PlayEventDetails {
    #[serde(flatten)]
    pub event: PlayEvent,
    pub song_title: Option<String>,
    pub artist_name: Option<String>,
    pub album_title: Option<String>,
    pub cover_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Running,
    Completed,
    Failed,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Running => "running",
            ScanState::Completed => "completed",
            ScanState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> ScanState {
        match s {
            "running" => ScanState::Running,
            "completed" => ScanState::Completed,
            _ => ScanState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub id: i64,
    pub status: ScanState,
    pub progress: i64,
    pub total: i64,
    pub errors: i64,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            _ => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

/// Per-user playback state, persisted verbatim for session restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub current_song_id: Option<i64>,
    #[serde(default)]
    pub queue: Vec<i64>,
    #[serde(default)]
    pub queue_index: i64,
    #[serde(default)]
    pub progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }

    pub fn from_str(s: &str) -> RepeatMode {
        match s {
            "one" => RepeatMode::One,
            "all" => RepeatMode::All,
            _ => RepeatMode::Off,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            shuffle: false,
            repeat: RepeatMode::Off,
        }
    }
}
