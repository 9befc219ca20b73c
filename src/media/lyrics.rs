//! Lyrics resolution: embedded tag, sibling `.lrc`, sibling `.txt`.
//!
//! Synced lyrics are stored as a serialized document (metadata + timed
//! lines). Language comes from the LRC `[la:]` tag when present, otherwise
//! it is inferred from the text itself.

use crate::store::{LyricsKind, LyricsSource, NewLyrics};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LrcMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub by: Option<String>,
    #[serde(default)]
    pub offset_ms: i64,
    pub length: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrcLine {
    pub time_ms: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrcDocument {
    pub metadata: LrcMetadata,
    pub lines: Vec<LrcLine>,
}

lazy_static! {
    static ref LRC_META: Regex =
        Regex::new(r"^\[(ti|ar|al|by|offset|length|la):\s*(.*?)\s*\]\s*$").unwrap();
    static ref LRC_TIME: Regex = Regex::new(r"\[(\d+):(\d{2})(?:[.:](\d{1,3}))?\]").unwrap();
}

/// Parse LRC text. Returns None when no timestamped line is present, in
/// which case the caller should treat the content as unsynced.
pub fn parse_lrc(text: &str) -> Option<LrcDocument> {
    let mut metadata = LrcMetadata::default();
    let mut lines: Vec<LrcLine> = Vec::new();

    for raw_line in text.lines() {
        let raw_line = raw_line.trim();
        if raw_line.is_empty() {
            continue;
        }

        if let Some(captures) = LRC_META.captures(raw_line) {
            let value = captures[2].to_string();
            match &captures[1] {
                "ti" => metadata.title = Some(value),
                "ar" => metadata.artist = Some(value),
                "al" => metadata.album = Some(value),
                "by" => metadata.by = Some(value),
                "offset" => metadata.offset_ms = value.parse().unwrap_or(0),
                "length" => metadata.length = Some(value),
                "la" => metadata.language = Some(value),
                _ => {}
            }
            continue;
        }

        // One text line may carry several timestamps: [00:01.00][00:05.00]la la
        let text_part = LRC_TIME.replace_all(raw_line, "").trim().to_string();
        for captures in LRC_TIME.captures_iter(raw_line) {
            let minutes: i64 = captures[1].parse().ok()?;
            let seconds: i64 = captures[2].parse().ok()?;
            let fraction_ms = match captures.get(3) {
                None => 0,
                Some(frac) => {
                    let digits = frac.as_str();
                    let value: i64 = digits.parse().ok()?;
                    match digits.len() {
                        1 => value * 100,
                        2 => value * 10,
                        _ => value,
                    }
                }
            };
            lines.push(LrcLine {
                time_ms: minutes * 60_000 + seconds * 1_000 + fraction_ms,
                text: text_part.clone(),
            });
        }
    }

    if lines.is_empty() {
        return None;
    }
    lines.sort_by_key(|line| line.time_ms);
    Some(LrcDocument { metadata, lines })
}

/// Map common ISO 639-1 codes to the 639-2 codes the store uses; already
/// three-letter codes pass through when recognized.
pub fn normalize_language(code: &str) -> Option<&'static str> {
    const KNOWN: &[&str] = &[
        "eng", "ara", "urd", "hin", "spa", "fre", "ger", "jpn", "kor", "chi", "por", "ita", "rus",
    ];
    let lowered = code.trim().to_lowercase();
    if let Some(known) = KNOWN.iter().find(|k| **k == lowered) {
        return Some(known);
    }
    match lowered.as_str() {
        "en" => Some("eng"),
        "ar" => Some("ara"),
        "ur" => Some("urd"),
        "hi" => Some("hin"),
        "es" => Some("spa"),
        "fr" => Some("fre"),
        "de" => Some("ger"),
        "ja" => Some("jpn"),
        "ko" => Some("kor"),
        "zh" => Some("chi"),
        "pt" => Some("por"),
        "it" => Some("ita"),
        "ru" => Some("rus"),
        _ => None,
    }
}

/// Infer the language of lyrics text.
///
/// Non-Latin scripts identify themselves by Unicode block; Latin-script
/// languages are told apart by counting common function words, defaulting
/// to English.
pub fn detect_language(text: &str) -> &'static str {
    let mut arabic = 0usize;
    let mut urdu_specific = 0usize;
    let mut devanagari = 0usize;
    let mut hangul = 0usize;
    let mut kana = 0usize;
    let mut han = 0usize;
    let mut cyrillic = 0usize;
    let mut latin = 0usize;

    for c in text.chars() {
        match c {
            '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' => {
                arabic += 1;
                if matches!(c, 'ٹ' | 'ڈ' | 'ڑ' | 'ں' | 'ھ' | 'ے') {
                    urdu_specific += 1;
                }
            }
            '\u{0900}'..='\u{097F}' => devanagari += 1,
            '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => hangul += 1,
            '\u{3040}'..='\u{30FF}' => kana += 1,
            '\u{4E00}'..='\u{9FFF}' => han += 1,
            '\u{0400}'..='\u{04FF}' => cyrillic += 1,
            'a'..='z' | 'A'..='Z' | '\u{00C0}'..='\u{024F}' => latin += 1,
            _ => {}
        }
    }

    let scripts = [
        (arabic, if urdu_specific > 0 { "urd" } else { "ara" }),
        (devanagari, "hin"),
        (hangul, "kor"),
        // Kana dominates any Han characters in Japanese text
        (kana, "jpn"),
        (cyrillic, "rus"),
    ];
    if let Some((count, language)) = scripts.iter().max_by_key(|(count, _)| *count) {
        if *count > 0 && *count * 2 >= latin.max(han) {
            return language;
        }
    }
    if han > 0 && han >= latin {
        return "chi";
    }

    latin_language(text)
}

fn latin_language(text: &str) -> &'static str {
    const STOPWORDS: &[(&str, &[&str])] = &[
        ("spa", &["el", "la", "los", "las", "que", "de", "y", "es", "por", "con", "mi", "te"]),
        ("fre", &["le", "la", "les", "des", "et", "est", "je", "tu", "dans", "pour", "pas", "mon"]),
        ("ger", &["der", "die", "das", "und", "ich", "du", "nicht", "ist", "ein", "mit", "wir"]),
        ("por", &["o", "os", "um", "uma", "que", "de", "e", "em", "não", "para", "meu", "você"]),
        ("ita", &["il", "lo", "gli", "che", "di", "e", "non", "per", "un", "una", "mio", "sono"]),
        ("eng", &["the", "and", "you", "is", "of", "to", "in", "my", "it", "that", "me", "on"]),
    ];

    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return "eng";
    }

    let mut best = "eng";
    let mut best_hits = 0usize;
    for (language, stopwords) in STOPWORDS {
        let set: HashSet<&str> = stopwords.iter().copied().collect();
        let hits = words.iter().filter(|w| set.contains(w.as_str())).count();
        if hits > best_hits {
            best_hits = hits;
            best = language;
        }
    }
    best
}

/// Resolve every lyrics record for a song: embedded first, then the sibling
/// `.lrc`, then the sibling `.txt`. All sources that yield content are kept,
/// capped at one per (language, type); earlier sources win collisions.
pub fn resolve_lyrics(
    song_path: &Path,
    embedded: Option<&str>,
    tag_title: Option<&str>,
    tag_artist: Option<&str>,
    tag_album: Option<&str>,
) -> Vec<NewLyrics> {
    let mut results: Vec<NewLyrics> = Vec::new();
    let mut seen: HashSet<(String, LyricsKind)> = HashSet::new();

    let mut push = |entry: NewLyrics| {
        if seen.insert((entry.language.clone(), entry.kind)) {
            results.push(entry);
        }
    };

    if let Some(text) = embedded {
        push(lyrics_from_text(
            text,
            LyricsSource::Embedded,
            tag_title,
            tag_artist,
            tag_album,
        ));
    }

    if let Ok(lrc_text) = std::fs::read_to_string(song_path.with_extension("lrc")) {
        push(lyrics_from_text(
            &lrc_text,
            LyricsSource::ExternalLrc,
            tag_title,
            tag_artist,
            tag_album,
        ));
    }

    if let Ok(txt) = std::fs::read_to_string(song_path.with_extension("txt")) {
        let trimmed = txt.trim();
        if !trimmed.is_empty() {
            push(NewLyrics {
                content: trimmed.to_string(),
                kind: LyricsKind::Unsynced,
                source: LyricsSource::ExternalTxt,
                language: detect_language(trimmed).to_string(),
            });
        }
    }

    results
}

fn lyrics_from_text(
    text: &str,
    source: LyricsSource,
    tag_title: Option<&str>,
    tag_artist: Option<&str>,
    tag_album: Option<&str>,
) -> NewLyrics {
    match parse_lrc(text) {
        Some(mut document) => {
            // Back-fill document metadata from the song's tags
            if document.metadata.title.is_none() {
                document.metadata.title = tag_title.map(|s| s.to_string());
            }
            if document.metadata.artist.is_none() {
                document.metadata.artist = tag_artist.map(|s| s.to_string());
            }
            if document.metadata.album.is_none() {
                document.metadata.album = tag_album.map(|s| s.to_string());
            }

            let language = document
                .metadata
                .language
                .as_deref()
                .and_then(normalize_language)
                .unwrap_or_else(|| {
                    let joined: String = document
                        .lines
                        .iter()
                        .map(|l| l.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    detect_language(&joined)
                });
            document.metadata.language = Some(language.to_string());

            NewLyrics {
                content: serde_json::to_string(&document)
                    .expect("LRC document serialization cannot fail"),
                kind: LyricsKind::Synced,
                source,
                language: language.to_string(),
            }
        }
        None => NewLyrics {
            content: text.trim().to_string(),
            kind: LyricsKind::Unsynced,
            source,
            language: detect_language(text).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamped_lines_in_order() {
        let text = "[la:es]\n[00:05.67]World\n[00:01.23]Hello\n";
        let document = parse_lrc(text).unwrap();
        assert_eq!(document.metadata.language.as_deref(), Some("es"));
        assert_eq!(
            document.lines,
            vec![
                LrcLine { time_ms: 1230, text: "Hello".to_string() },
                LrcLine { time_ms: 5670, text: "World".to_string() },
            ]
        );
    }

    #[test]
    fn parses_metadata_and_repeated_timestamps() {
        let text = "[ti:Song]\n[ar:Artist]\n[offset:-200]\n[00:01.0][01:02.500]chorus\n";
        let document = parse_lrc(text).unwrap();
        assert_eq!(document.metadata.title.as_deref(), Some("Song"));
        assert_eq!(document.metadata.artist.as_deref(), Some("Artist"));
        assert_eq!(document.metadata.offset_ms, -200);
        assert_eq!(document.lines[0].time_ms, 1_000);
        assert_eq!(document.lines[1].time_ms, 62_500);
        assert_eq!(document.lines[1].text, "chorus");
    }

    #[test]
    fn plain_text_is_not_lrc() {
        assert!(parse_lrc("just some lyrics\nwithout timestamps").is_none());
    }

    #[test]
    fn language_codes_normalize_to_iso_639_2() {
        assert_eq!(normalize_language("es"), Some("spa"));
        assert_eq!(normalize_language("ES"), Some("spa"));
        assert_eq!(normalize_language("spa"), Some("spa"));
        assert_eq!(normalize_language("xx"), None);
    }

    #[test]
    fn detects_scripts() {
        assert_eq!(detect_language("사랑해요 그대여"), "kor");
        assert_eq!(detect_language("君のことが好きだよ"), "jpn");
        assert_eq!(detect_language("我爱你 永远"), "chi");
        assert_eq!(detect_language("Я тебя люблю"), "rus");
        assert_eq!(detect_language("أحبك يا حبيبي"), "ara");
        assert_eq!(detect_language("میں تجھ سے پیار کرتا ہوں تمہارے لیے"), "urd");
        assert_eq!(detect_language("मैं तुमसे प्यार करता हूँ"), "hin");
    }

    #[test]
    fn detects_latin_languages_by_stopwords() {
        assert_eq!(detect_language("the night is young and you are mine"), "eng");
        assert_eq!(detect_language("el corazón que te quiere y la luna"), "spa");
        assert_eq!(detect_language("je pense à toi dans la nuit pour toujours"), "fre");
        assert_eq!(detect_language("ich liebe dich und du bist nicht allein"), "ger");
        assert_eq!(detect_language(""), "eng");
    }

    #[test]
    fn resolver_prefers_earlier_sources_per_language_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let song = dir.path().join("track.mp3");
        std::fs::write(&song, b"audio").unwrap();
        std::fs::write(
            dir.path().join("track.lrc"),
            "[la:es]\n[00:01.23]Hello\n[00:05.67]World\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("track.txt"), "the plain text version\n").unwrap();

        let resolved = resolve_lyrics(&song, None, Some("T"), Some("Art"), Some("Alb"));
        assert_eq!(resolved.len(), 2);

        let synced = resolved
            .iter()
            .find(|l| l.kind == LyricsKind::Synced)
            .unwrap();
        assert_eq!(synced.source, LyricsSource::ExternalLrc);
        assert_eq!(synced.language, "spa");
        let document: LrcDocument = serde_json::from_str(&synced.content).unwrap();
        assert_eq!(document.metadata.title.as_deref(), Some("T"));
        assert_eq!(
            document.lines,
            vec![
                LrcLine { time_ms: 1230, text: "Hello".to_string() },
                LrcLine { time_ms: 5670, text: "World".to_string() },
            ]
        );

        let unsynced = resolved
            .iter()
            .find(|l| l.kind == LyricsKind::Unsynced)
            .unwrap();
        assert_eq!(unsynced.source, LyricsSource::ExternalTxt);
        assert_eq!(unsynced.language, "eng");
    }
}
