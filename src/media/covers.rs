//! Cover art selection and the content-addressed image cache.
//!
//! Selection order per song: a sibling image sharing the song's basename,
//! the embedded picture, then a conventional folder image. Chosen bytes are
//! written once under `{sha256}.{ext}` and referenced by that file name.

use super::tags::EmbeddedPicture;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COVER_BASENAMES: &[&str] = &["cover", "folder", "front", "albumart", "album"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

pub struct CoverResolver {
    cache_dir: PathBuf,
}

impl CoverResolver {
    pub fn new(cache_dir: PathBuf) -> std::io::Result<CoverResolver> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(CoverResolver { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a song's cover, returning the cache file name.
    pub fn resolve_song_cover(
        &self,
        song_path: &Path,
        embedded: Option<&EmbeddedPicture>,
    ) -> Option<String> {
        if let Some(name) = self.sibling_image(song_path) {
            return Some(name);
        }
        if let Some(picture) = embedded {
            if let Some(name) = self.store_bytes(&picture.data) {
                return Some(name);
            }
        }
        song_path
            .parent()
            .and_then(|dir| self.folder_image(dir))
    }

    /// Album covers prefer the folder image so one file represents the whole
    /// album; falls back to a song's already-resolved cover.
    pub fn resolve_album_cover(&self, folder: &Path, fallback: Option<&str>) -> Option<String> {
        self.folder_image(folder)
            .or_else(|| fallback.map(|s| s.to_string()))
    }

    fn sibling_image(&self, song_path: &Path) -> Option<String> {
        let stem = song_path.file_stem()?.to_str()?;
        let dir = song_path.parent()?;
        for ext in COVER_EXTENSIONS {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                if let Some(name) = self.store_file(&candidate) {
                    return Some(name);
                }
            }
        }
        None
    }

    fn folder_image(&self, dir: &Path) -> Option<String> {
        let entries = std::fs::read_dir(dir).ok()?;
        let mut candidates: Vec<(usize, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !COVER_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                continue;
            }
            let stem = stem.to_lowercase();
            if let Some(rank) = COVER_BASENAMES.iter().position(|b| *b == stem) {
                candidates.push((rank, path));
            }
        }
        candidates.sort_by_key(|(rank, _)| *rank);
        candidates
            .into_iter()
            .find_map(|(_, path)| self.store_file(&path))
    }

    fn store_file(&self, path: &Path) -> Option<String> {
        match std::fs::read(path) {
            Ok(bytes) => self.store_bytes(&bytes),
            Err(err) => {
                warn!("Failed to read cover candidate {:?}: {}", path, err);
                None
            }
        }
    }

    /// Validate, hash and persist image bytes; returns the cache file name.
    /// Non-image bytes are rejected by magic-byte sniffing.
    fn store_bytes(&self, bytes: &[u8]) -> Option<String> {
        let kind = infer::get(bytes)?;
        if kind.matcher_type() != infer::MatcherType::Image {
            debug!("Rejecting cover bytes with non-image type {}", kind.mime_type());
            return None;
        }
        let ext = kind.extension();
        if !COVER_EXTENSIONS.contains(&ext) {
            debug!("Rejecting cover bytes with unsupported extension {}", ext);
            return None;
        }

        let hash = format!("{:x}", Sha256::digest(bytes));
        let file_name = format!("{hash}.{ext}");
        let target = self.cache_dir.join(&file_name);
        if !target.exists() {
            if let Err(err) = std::fs::write(&target, bytes) {
                warn!("Failed to write cover cache file {:?}: {}", target, err);
                return None;
            }
        }
        Some(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid header bytes of a PNG file; infer only sniffs magic
    // numbers so this is enough for validation.
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0];

    fn resolver() -> (tempfile::TempDir, CoverResolver) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CoverResolver::new(dir.path().join("cache")).unwrap();
        (dir, resolver)
    }

    #[test]
    fn embedded_picture_is_cached_content_addressed() {
        let (_dir, resolver) = resolver();
        let picture = EmbeddedPicture {
            mime: Some("image/png".to_string()),
            data: PNG_MAGIC.to_vec(),
        };

        let name = resolver
            .resolve_song_cover(Path::new("/nonexistent/song.mp3"), Some(&picture))
            .unwrap();
        assert!(name.ends_with(".png"));
        assert!(resolver.cache_dir().join(&name).is_file());

        // Same bytes, same cache entry
        let again = resolver
            .resolve_song_cover(Path::new("/nonexistent/other.mp3"), Some(&picture))
            .unwrap();
        assert_eq!(name, again);
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let (_dir, resolver) = resolver();
        let picture = EmbeddedPicture {
            mime: Some("image/png".to_string()),
            data: b"definitely not an image".to_vec(),
        };
        assert!(resolver
            .resolve_song_cover(Path::new("/nonexistent/song.mp3"), Some(&picture))
            .is_none());
    }

    #[test]
    fn sibling_image_wins_over_embedded() {
        let (dir, resolver) = resolver();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        let song = media.join("track.mp3");
        std::fs::write(&song, b"audio").unwrap();
        std::fs::write(media.join("track.jpg"), JPEG_MAGIC).unwrap();

        let picture = EmbeddedPicture {
            mime: Some("image/png".to_string()),
            data: PNG_MAGIC.to_vec(),
        };
        let name = resolver.resolve_song_cover(&song, Some(&picture)).unwrap();
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn folder_image_respects_basename_priority() {
        let (dir, resolver) = resolver();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        let song = media.join("track.mp3");
        std::fs::write(&song, b"audio").unwrap();
        std::fs::write(media.join("AlbumArt.jpg"), JPEG_MAGIC).unwrap();
        std::fs::write(media.join("Cover.png"), PNG_MAGIC).unwrap();

        // "cover" ranks before "albumart"
        let name = resolver.resolve_song_cover(&song, None).unwrap();
        assert!(name.ends_with(".png"));

        let album = resolver.resolve_album_cover(&media, None).unwrap();
        assert_eq!(album, name);
    }
}
