//! End-to-end scan pipeline tests: walk, ingest, reconcile, rescan,
//! playlist import and lyrics resolution, driven with a canned probe.

mod common;

use chorale_server::media::lyrics::LrcDocument;
use chorale_server::scanner::ScanError;
use chorale_server::store::{LyricsKind, LyricsSource, ScanState};
use common::harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scan_builds_library_from_files() {
    let h = harness(false);
    h.write_media("Art/Unknown Album/Art - One.mp3", b"not really audio");
    h.write_media("Art/Unknown Album/Art - Two.mp3", b"not really audio");
    h.write_media("Other/Other - Three.flac", b"not really audio");

    let scan_id = h.scan().await;

    let status = h.store.get_scan(scan_id).unwrap().unwrap();
    assert_eq!(status.status, ScanState::Completed);
    assert_eq!(status.total, 3);
    assert_eq!(status.progress, 3);
    assert_eq!(status.errors, 0);
    assert!(status.completed_at.is_some());

    assert_eq!(h.store.count_songs().unwrap(), 3);
    assert_eq!(h.store.count_artists().unwrap(), 2);

    // Tagless files fall back to filename-derived artist/title
    let hits = h.store.search_songs("one", 10, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].artist_name, "Art");
    assert_eq!(hits[0].album_title, "Unknown Album");
    assert_eq!(hits[0].song.duration_ms, 200_000);
    assert_eq!(hits[0].song.sample_rate, 44_100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rescan_is_idempotent_and_preserves_ids() {
    let h = harness(false);
    h.write_media("Art/Art - One.mp3", b"x");
    h.write_media("Art/Art - Two.mp3", b"x");

    h.scan().await;
    let before: Vec<i64> = h
        .store
        .list_songs(10, 0)
        .unwrap()
        .iter()
        .map(|s| s.song.id)
        .collect();

    h.scan().await;
    let after: Vec<i64> = h
        .store
        .list_songs(10, 0)
        .unwrap()
        .iter()
        .map(|s| s.song.id)
        .collect();

    assert_eq!(before, after);
    assert_eq!(h.store.count_songs().unwrap(), 2);
    assert_eq!(h.store.count_albums().unwrap(), 1);
    assert_eq!(h.store.count_artists().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_files_are_reconciled_away() {
    let h = harness(false);
    h.write_media("Keep/Keep - A.mp3", b"x");
    h.write_media("Gone/Gone - B.mp3", b"x");

    h.scan().await;
    assert_eq!(h.store.count_songs().unwrap(), 2);

    std::fs::remove_dir_all(h.media_root.join("Gone")).unwrap();
    h.scan().await;

    assert_eq!(h.store.count_songs().unwrap(), 1);
    // No orphan albums or artists survive
    assert_eq!(h.store.count_albums().unwrap(), 1);
    assert_eq!(h.store.count_artists().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_files_are_skipped_not_inserted() {
    let h = harness(false);
    h.write_media("Art/Art - Good.mp3", b"x");
    h.write_media("Art/Art - broken.mp3", b"x");

    let scan_id = h.scan().await;
    let status = h.store.get_scan(scan_id).unwrap().unwrap();

    assert_eq!(status.status, ScanState::Completed);
    assert_eq!(status.errors, 1);
    assert_eq!(h.store.count_songs().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_scan_conflicts_while_scheduled() {
    let h = harness(false);
    h.write_media("Art/Art - One.mp3", b"x");

    let first = h.scanner.start_scan();
    assert!(first.is_ok());
    assert!(matches!(
        h.scanner.start_scan(),
        Err(ScanError::AlreadyRunning)
    ));

    // After the scheduled scan runs, a new one may start
    std::sync::Arc::clone(&h.scanner)
        .run_scan(first.unwrap(), tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();
    assert!(h.scanner.start_scan().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lrc_sidecar_becomes_synced_lyrics() {
    let h = harness(false);
    h.write_media("Art/Art - One.mp3", b"x");
    h.write_media(
        "Art/Art - One.lrc",
        b"[la:es]\n[00:01.23]Hello\n[00:05.67]World\n",
    );

    h.scan().await;

    let song_id = h.store.search_songs("one", 10, 0).unwrap()[0].song.id;
    let lyrics = h.store.get_lyrics(song_id).unwrap();
    assert_eq!(lyrics.len(), 1);
    assert_eq!(lyrics[0].kind, LyricsKind::Synced);
    assert_eq!(lyrics[0].source, LyricsSource::ExternalLrc);
    assert_eq!(lyrics[0].language, "spa");

    let document: LrcDocument = serde_json::from_str(&lyrics[0].content).unwrap();
    assert_eq!(document.lines.len(), 2);
    assert_eq!(document.lines[0].time_ms, 1_230);
    assert_eq!(document.lines[0].text, "Hello");
    assert_eq!(document.lines[1].time_ms, 5_670);
    assert_eq!(document.lines[1].text, "World");
    // Metadata is back-filled from the song's resolved tags
    assert_eq!(document.metadata.title.as_deref(), Some("One"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playlists_import_under_the_admin_user() {
    let h = harness(true);
    h.write_media("Art/Art - One.mp3", b"x");
    h.write_media("Art/Art - Two.mp3", b"x");
    h.write_media(
        "lists/road.m3u",
        b"#EXTM3U\n../Art/Art - Two.mp3\n../Art/Art - One.mp3\n../Art/missing.mp3\n",
    );

    h.scan().await;

    let admin = h.store.get_user_by_username("admin").unwrap().unwrap();
    let playlists = h.store.list_playlists(admin.id).unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "road");
    assert!(playlists[0].source_path.is_some());

    // File order preserved; the missing entry is dropped
    let songs = h.store.playlist_songs(playlists[0].id).unwrap();
    let titles: Vec<&str> = songs.iter().map(|s| s.song.title.as_str()).collect();
    assert_eq!(titles, vec!["Two", "One"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn excluded_directories_are_not_scanned() {
    let h = harness(false);
    h.write_media("Keep/Keep - A.mp3", b"x");
    h.write_media(".hidden/secret.mp3", b"x");

    h.scan().await;
    assert_eq!(h.store.count_songs().unwrap(), 1);
}
