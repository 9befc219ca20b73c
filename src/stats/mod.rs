//! Listening analytics: period rollups, rankings, patterns, discovery,
//! streaks and the yearly "wrapped" retrospective. Everything is derived
//! from the play history on demand.

use crate::store::{
    HistoryOverview, PatternBucket, RankedAlbum, RankedArtist, RankedSong, SqliteStore,
};
use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

const TOP_LIMIT: i64 = 10;
const WRAPPED_TOP_LIMIT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Hour,
    Today,
    Week,
    Month,
    Year,
    AllTime,
    /// The default 30-day window used when no period is given.
    Default,
}

impl Period {
    pub fn parse(s: Option<&str>) -> Period {
        match s {
            Some("hour") => Period::Hour,
            Some("today") => Period::Today,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            Some("year") => Period::Year,
            Some("all_time") => Period::AllTime,
            _ => Period::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hour => "hour",
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::AllTime => "all_time",
            Period::Default => "30_days",
        }
    }

    /// Resolve to a `[start, end)` window in unix seconds.
    pub fn window(&self, now_ts: i64) -> (i64, i64) {
        const DAY: i64 = 86_400;
        let start = match self {
            Period::Hour => now_ts - 3_600,
            Period::Today => {
                let now = Utc.timestamp_opt(now_ts, 0).single().unwrap_or_else(Utc::now);
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time");
                Utc.from_utc_datetime(&midnight).timestamp()
            }
            Period::Week => now_ts - 7 * DAY,
            Period::Month | Period::Default => now_ts - 30 * DAY,
            Period::Year => now_ts - 365 * DAY,
            Period::AllTime => 0,
        };
        (start, now_ts + 1)
    }
}

#[derive(Debug, Serialize)]
pub struct ListeningPatterns {
    pub by_hour: Vec<PatternBucket>,
    pub by_day: Vec<PatternBucket>,
    pub by_month: Vec<PatternBucket>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryStats {
    pub new_songs: i64,
    pub new_artists: i64,
    pub exploration_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Streaks {
    pub current: i64,
    pub longest: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub period: &'static str,
    pub overview: HistoryOverview,
    pub top_songs: Vec<RankedSong>,
    pub top_artists: Vec<RankedArtist>,
    pub top_albums: Vec<RankedAlbum>,
    /// Placeholder until genres are modeled.
    pub top_genres: Vec<serde_json::Value>,
    pub listening_patterns: ListeningPatterns,
}

#[derive(Debug, Serialize)]
pub struct InsightsReport {
    pub period: &'static str,
    pub listening_patterns: ListeningPatterns,
    pub discovery: DiscoveryStats,
    pub streaks: Streaks,
}

#[derive(Debug, Serialize)]
pub struct WrappedReport {
    pub period: &'static str,
    pub overview: HistoryOverview,
    pub top_songs: Vec<RankedSong>,
    pub top_artists: Vec<RankedArtist>,
    pub top_albums: Vec<RankedAlbum>,
    pub days_listened: i64,
    pub avg_plays_per_day: f64,
    pub streaks: Streaks,
}

/// Streaks over distinct play-days. The current streak counts backward from
/// the most recent play-day, but only when that day is `today` or yesterday;
/// anything older means the streak is broken.
pub fn compute_streaks(days: &[NaiveDate], today: NaiveDate) -> Streaks {
    if days.is_empty() {
        return Streaks { current: 0, longest: 0 };
    }

    let mut longest: i64 = 1;
    let mut run: i64 = 1;
    for pair in days.windows(2) {
        if pair[1] == pair[0] + chrono::Days::new(1) {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    let last = days[days.len() - 1];
    let current = if last == today || last + chrono::Days::new(1) == today {
        let mut streak: i64 = 1;
        for pair in days.windows(2).rev() {
            if pair[1] == pair[0] + chrono::Days::new(1) {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    } else {
        0
    };

    Streaks { current, longest }
}

pub struct StatsService {
    store: Arc<SqliteStore>,
}

impl StatsService {
    pub fn new(store: Arc<SqliteStore>) -> StatsService {
        StatsService { store }
    }

    pub fn report(&self, user_id: i64, period: Period) -> Result<StatsReport> {
        self.report_at(user_id, period, crate::store::now_ts())
    }

    pub fn report_at(&self, user_id: i64, period: Period, now_ts: i64) -> Result<StatsReport> {
        let (start, end) = period.window(now_ts);
        Ok(StatsReport {
            period: period.as_str(),
            overview: self.store.history_overview(user_id, start, end)?,
            top_songs: self.store.top_songs(user_id, start, end, TOP_LIMIT)?,
            top_artists: self.store.top_artists(user_id, start, end, TOP_LIMIT)?,
            top_albums: self.store.top_albums(user_id, start, end, TOP_LIMIT)?,
            top_genres: Vec::new(),
            listening_patterns: self.patterns(user_id, start, end)?,
        })
    }

    pub fn insights(&self, user_id: i64, period: Period) -> Result<InsightsReport> {
        self.insights_at(user_id, period, crate::store::now_ts())
    }

    pub fn insights_at(&self, user_id: i64, period: Period, now_ts: i64) -> Result<InsightsReport> {
        let (start, end) = period.window(now_ts);
        Ok(InsightsReport {
            period: period.as_str(),
            listening_patterns: self.patterns(user_id, start, end)?,
            discovery: self.discovery(user_id, start, end)?,
            streaks: self.streaks(user_id, now_ts)?,
        })
    }

    pub fn wrapped(&self, user_id: i64) -> Result<WrappedReport> {
        self.wrapped_at(user_id, crate::store::now_ts())
    }

    pub fn wrapped_at(&self, user_id: i64, now_ts: i64) -> Result<WrappedReport> {
        let (start, end) = Period::Year.window(now_ts);
        let overview = self.store.history_overview(user_id, start, end)?;
        let days_listened = self.store.days_listened(user_id, start, end)?;
        let avg_plays_per_day = if days_listened > 0 {
            overview.total_plays as f64 / days_listened as f64
        } else {
            0.0
        };
        Ok(WrappedReport {
            period: Period::Year.as_str(),
            top_songs: self.store.top_songs(user_id, start, end, WRAPPED_TOP_LIMIT)?,
            top_artists: self.store.top_artists(user_id, start, end, WRAPPED_TOP_LIMIT)?,
            top_albums: self.store.top_albums(user_id, start, end, WRAPPED_TOP_LIMIT)?,
            overview,
            days_listened,
            avg_plays_per_day,
            streaks: self.streaks(user_id, now_ts)?,
        })
    }

    fn patterns(&self, user_id: i64, start: i64, end: i64) -> Result<ListeningPatterns> {
        Ok(ListeningPatterns {
            by_hour: self.store.play_pattern(user_id, start, end, "%H")?,
            by_day: self.store.play_pattern(user_id, start, end, "%w")?,
            by_month: self.store.play_pattern(user_id, start, end, "%m")?,
        })
    }

    fn discovery(&self, user_id: i64, start: i64, end: i64) -> Result<DiscoveryStats> {
        let overview = self.store.history_overview(user_id, start, end)?;
        let new_songs = self.store.new_songs_in_window(user_id, start, end)?;
        let new_artists = self.store.new_artists_in_window(user_id, start, end)?;
        let exploration_rate = if overview.total_plays > 0 {
            new_songs as f64 / overview.total_plays as f64
        } else {
            0.0
        };
        Ok(DiscoveryStats {
            new_songs,
            new_artists,
            exploration_rate,
        })
    }

    fn streaks(&self, user_id: i64, now_ts: i64) -> Result<Streaks> {
        let day_strings = self.store.play_days(user_id)?;
        let days: Vec<NaiveDate> = day_strings
            .iter()
            .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .collect();
        let today = Utc
            .timestamp_opt(now_ts, 0)
            .single()
            .unwrap_or_else(Utc::now)
            .date_naive();
        Ok(compute_streaks(&days, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SongUpsert, UserRole};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn longest_streak_is_longest_consecutive_run() {
        let days = vec![
            date(2025, 1, 1),
            date(2025, 1, 2),
            date(2025, 1, 3),
            date(2025, 1, 10),
            date(2025, 1, 11),
        ];
        let streaks = compute_streaks(&days, date(2025, 2, 1));
        assert_eq!(streaks.longest, 3);
        assert_eq!(streaks.current, 0);
    }

    #[test]
    fn current_streak_counts_from_today_or_yesterday() {
        let days = vec![date(2025, 5, 30), date(2025, 5, 31), date(2025, 6, 1)];
        assert_eq!(
            compute_streaks(&days, date(2025, 6, 1)),
            Streaks { current: 3, longest: 3 }
        );
        // Last play yesterday still counts
        assert_eq!(
            compute_streaks(&days, date(2025, 6, 2)),
            Streaks { current: 3, longest: 3 }
        );
        // Two days of silence break it
        assert_eq!(
            compute_streaks(&days, date(2025, 6, 3)),
            Streaks { current: 0, longest: 3 }
        );
    }

    #[test]
    fn empty_history_has_no_streaks() {
        assert_eq!(
            compute_streaks(&[], date(2025, 6, 1)),
            Streaks { current: 0, longest: 0 }
        );
    }

    #[test]
    fn today_window_starts_at_utc_midnight() {
        // 2025-06-01T10:00:00Z
        let now = 1_748_772_000;
        let (start, end) = Period::Today.window(now);
        assert_eq!(start, 1_748_736_000);
        assert_eq!(end, now + 1);

        let (start, _) = Period::AllTime.window(now);
        assert_eq!(start, 0);
    }

    fn seeded() -> (StatsService, i64, Vec<i64>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let user = store.create_user("u", "$h", None, UserRole::User).unwrap();
        let mut ids = Vec::new();
        for n in 0..3 {
            let artist_id = store.upsert_artist(&format!("Artist {n}")).unwrap();
            let album_id = store.upsert_album("Alb", artist_id, None).unwrap();
            ids.push(
                store
                    .upsert_song(&SongUpsert {
                        album_id,
                        artist_id,
                        title: format!("T{n}"),
                        track_number: None,
                        disc_number: None,
                        duration_ms: 200_000,
                        sample_rate: 44_100,
                        bit_depth: 16,
                        channels: 2,
                        bitrate_kbps: None,
                        format: "mp3".to_string(),
                        file_path: format!("/m/{n}.mp3"),
                        file_size: 1,
                        file_modified: 0,
                        cover_path: None,
                    })
                    .unwrap(),
            );
        }
        (StatsService::new(store.clone()), user.id, ids)
    }

    // 2025-06-01T10:00:00Z
    const NOW: i64 = 1_748_772_000;

    #[test]
    fn report_for_today_rolls_up_the_day() {
        let (stats, user, songs) = seeded();
        let store = &stats.store;
        store
            .record_play(user, songs[0], NOW - 600, 180, 0.9, "library")
            .unwrap();

        let report = stats.report_at(user, Period::Today, NOW).unwrap();
        assert_eq!(report.overview.total_plays, 1);
        assert_eq!(report.overview.total_time_sec, 180);
        assert_eq!(report.top_songs[0].song.song.id, songs[0]);
        assert!(report
            .listening_patterns
            .by_hour
            .iter()
            .any(|b| b.label == "09" || b.label == "10"));
        assert!(report.top_genres.is_empty());
    }

    #[test]
    fn wrapped_reports_days_and_averages() {
        let (stats, user, songs) = seeded();
        let store = &stats.store;
        // Two days, three plays
        store.record_play(user, songs[0], NOW, 100, 1.0, "l").unwrap();
        store.record_play(user, songs[1], NOW - 120, 100, 1.0, "l").unwrap();
        store.record_play(user, songs[2], NOW - 86_400, 100, 1.0, "l").unwrap();

        let wrapped = stats.wrapped_at(user, NOW).unwrap();
        assert_eq!(wrapped.days_listened, 2);
        assert_eq!(wrapped.overview.total_plays, 3);
        assert!((wrapped.avg_plays_per_day - 1.5).abs() < 1e-9);
        assert_eq!(wrapped.streaks.current, 2);
        assert_eq!(wrapped.top_songs.len(), 3);
    }

    #[test]
    fn insights_compute_discovery() {
        let (stats, user, songs) = seeded();
        let store = &stats.store;
        store
            .record_play(user, songs[0], NOW - 40 * 86_400, 100, 1.0, "l")
            .unwrap();
        store.record_play(user, songs[0], NOW, 100, 1.0, "l").unwrap();
        store.record_play(user, songs[1], NOW, 100, 1.0, "l").unwrap();

        let insights = stats.insights_at(user, Period::Month, NOW).unwrap();
        assert_eq!(insights.discovery.new_songs, 1);
        assert_eq!(insights.discovery.new_artists, 1);
        assert!((insights.discovery.exploration_rate - 0.5).abs() < 1e-9);
    }
}
