//! Embedded metadata via lofty, with filename-derived fallbacks for
//! untagged files.

use anyhow::Result;
use lofty::picture::PictureType;
use lofty::prelude::*;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct EmbeddedPicture {
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct FileTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i64>,
    pub track: Option<i64>,
    pub disc: Option<i64>,
    pub picture: Option<EmbeddedPicture>,
    pub lyrics: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn read_tags(path: &Path) -> Result<FileTags> {
    let tagged = lofty::read_from_path(path)?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let Some(tag) = tag else {
        return Ok(FileTags::default());
    };

    let picture = {
        let pictures = tag.pictures();
        pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.iter().max_by_key(|p| p.data().len()))
            .map(|p| EmbeddedPicture {
                mime: p.mime_type().map(|m| m.as_str().to_string()),
                data: p.data().to_vec(),
            })
    };

    Ok(FileTags {
        title: non_empty(tag.title().map(|s| s.to_string())),
        artist: non_empty(tag.artist().map(|s| s.to_string())),
        album: non_empty(tag.album().map(|s| s.to_string())),
        album_artist: non_empty(
            tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()),
        ),
        year: tag.year().map(|y| y as i64),
        track: tag.track().map(|t| t as i64),
        disc: tag.disk().map(|d| d as i64),
        picture,
        lyrics: non_empty(tag.get_string(&ItemKey::Lyrics).map(|s| s.to_string())),
    })
}

/// Derive (title, artist) from a file name when tags are missing.
/// "03 - Artist - Title.mp3" and "Artist - Title.mp3" split on " - ";
/// otherwise the cleaned stem becomes the title.
pub fn fallback_from_filename(file_name: &str) -> (String, Option<String>) {
    let stem = match file_name.rfind('.') {
        Some(i) => &file_name[..i],
        None => file_name,
    };
    let clean = stem.replace('_', " ");

    // Strip a leading track number ("03 - ", "03.", "03)")
    let without_number = clean
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(|c: char| c == '.' || c == ')' || c == '-' || c == ' ');
    let base = if without_number.is_empty() {
        clean.trim()
    } else {
        without_number
    };

    if let Some(idx) = base.find(" - ") {
        let artist = base[..idx].trim();
        let title = base[idx + 3..].trim();
        if !artist.is_empty() && !title.is_empty() {
            return (title.to_string(), Some(artist.to_string()));
        }
    }

    (base.trim().to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_parses_artist_dash_title() {
        let (title, artist) = fallback_from_filename("Wire - Ex Lion Tamer.mp3");
        assert_eq!(title, "Ex Lion Tamer");
        assert_eq!(artist.as_deref(), Some("Wire"));
    }

    #[test]
    fn fallback_strips_track_numbers_and_underscores() {
        let (title, artist) = fallback_from_filename("03_-_Reuters.flac");
        assert_eq!(title, "Reuters");
        assert_eq!(artist, None);

        let (title, _) = fallback_from_filename("01. Three Girl Rhumba.mp3");
        assert_eq!(title, "Three Girl Rhumba");
    }

    #[test]
    fn fallback_handles_bare_names() {
        let (title, artist) = fallback_from_filename("track");
        assert_eq!(title, "track");
        assert_eq!(artist, None);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(read_tags(Path::new("/nonexistent/file.mp3")).is_err());
    }
}
