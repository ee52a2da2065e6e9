//! Read-only views over a song list: setlist search and dashboard stats

use super::types::Song;
use serde::Serialize;

/// Songs whose title or artist contains `term` (case-insensitive)
///
/// An empty or whitespace term matches everything.
pub fn search<'a>(songs: &'a [Song], term: &str) -> Vec<&'a Song> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return songs.iter().collect();
    }

    songs
        .iter()
        .filter(|song| {
            song.title.to_lowercase().contains(&needle)
                || song
                    .artist
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Tempo ranges used by the BPM breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BpmBucket {
    /// Below 80
    Slow,
    /// 80 to 109
    Mid,
    /// 110 to 139
    Fast,
    /// 140 and up
    Rapid,
}

impl BpmBucket {
    pub fn all() -> &'static [BpmBucket] {
        &[BpmBucket::Slow, BpmBucket::Mid, BpmBucket::Fast, BpmBucket::Rapid]
    }

    pub fn for_bpm(bpm: i64) -> Self {
        match bpm {
            i64::MIN..=79 => BpmBucket::Slow,
            80..=109 => BpmBucket::Mid,
            110..=139 => BpmBucket::Fast,
            _ => BpmBucket::Rapid,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BpmBucket::Slow => "Slow (<80)",
            BpmBucket::Mid => "Mid (80-110)",
            BpmBucket::Fast => "Fast (110-140)",
            BpmBucket::Rapid => "Rapid (>140)",
        }
    }
}

/// Summary figures for the setlist dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    /// Rounded mean tempo, 0 for an empty catalog
    pub average_bpm: i64,
    /// Newest `created_at`, if any
    pub last_added: Option<i64>,
    /// Song count per bucket, in `BpmBucket::all()` order
    pub bpm_buckets: Vec<(BpmBucket, usize)>,
}

impl CatalogStats {
    pub fn from_songs(songs: &[Song]) -> Self {
        let total = songs.len();
        let average_bpm = if total == 0 {
            0
        } else {
            // Stored tempos are unbounded, so sum wide
            let sum: i128 = songs.iter().map(|s| i128::from(s.bpm)).sum();
            (sum as f64 / total as f64).round() as i64
        };

        let bpm_buckets = BpmBucket::all()
            .iter()
            .map(|bucket| {
                let count = songs
                    .iter()
                    .filter(|s| BpmBucket::for_bpm(s.bpm) == *bucket)
                    .count();
                (*bucket, count)
            })
            .collect();

        Self {
            total,
            average_bpm,
            last_added: songs.iter().map(|s| s.created_at).max(),
            bpm_buckets,
        }
    }

    pub fn bucket_count(&self, bucket: BpmBucket) -> usize {
        self.bpm_buckets
            .iter()
            .find(|(b, _)| *b == bucket)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}
