//! Song record and draft types
//!
//! `Song` is the persisted record. `SongDraft` is what an editor (human or
//! suggestion service) hands in; it fills defaults, assigns an id and a
//! creation timestamp, and validates before anything touches storage.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tempo used when a draft does not specify one
pub const DEFAULT_BPM: i64 = 120;

/// Content used when a draft does not specify any
pub const DEFAULT_CONTENT: &str = "<p>No content provided.</p>";

/// A song in the setlist catalog
///
/// `folder` and `program` are the device routing fields (Bank Select LSB and
/// Program Change). They are stored as given; range enforcement happens when
/// the controller builds the MIDI sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub folder: i64,
    pub program: i64,
    pub bpm: i64,
    #[serde(default)]
    pub content: String,
    /// Epoch milliseconds, set once at creation
    pub created_at: i64,
}

impl Song {
    /// Check the fields required at save time
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        Ok(())
    }

    /// `Title - Artist`, or just the title when there is no artist
    pub fn display_title(&self) -> String {
        match self.artist.as_deref().map(str::trim) {
            Some(artist) if !artist.is_empty() => format!("{} - {}", self.title, artist),
            _ => self.title.clone(),
        }
    }
}

/// Editable song fields, as submitted by an editor form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDraft {
    /// Present when editing an existing song
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub folder: Option<i64>,
    #[serde(default)]
    pub program: Option<i64>,
    #[serde(default)]
    pub bpm: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    /// Preserved when editing so the creation time never moves
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl SongDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Start a draft from an existing song (edit flow)
    pub fn from_song(song: &Song) -> Self {
        Self {
            id: Some(song.id.clone()),
            title: song.title.clone(),
            artist: song.artist.clone(),
            folder: Some(song.folder),
            program: Some(song.program),
            bpm: Some(song.bpm),
            content: Some(song.content.clone()),
            created_at: Some(song.created_at),
        }
    }

    pub fn routing(mut self, folder: i64, program: i64) -> Self {
        self.folder = Some(folder);
        self.program = Some(program);
        self
    }

    pub fn bpm(mut self, bpm: i64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Turn the draft into a song
    ///
    /// A missing id becomes `now_ms` in decimal. A blank artist is dropped.
    pub fn into_song(self, now_ms: i64) -> Result<Song, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }

        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => now_ms.to_string(),
        };

        let content = self
            .content
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT.to_string());

        Ok(Song {
            id,
            title: self.title,
            artist: self.artist.filter(|a| !a.trim().is_empty()),
            folder: self.folder.unwrap_or(0),
            program: self.program.unwrap_or(0),
            bpm: self.bpm.unwrap_or(DEFAULT_BPM),
            content,
            created_at: self.created_at.unwrap_or(now_ms),
        })
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The example setlist written on first access
pub fn seed_songs(created_at: i64) -> Vec<Song> {
    vec![
        Song {
            id: "1".to_string(),
            title: "Sweet Home Alabama".to_string(),
            artist: Some("Lynyrd Skynyrd".to_string()),
            folder: 0,
            program: 1,
            bpm: 98,
            content: concat!(
                "<h2>Sweet Home Alabama</h2>\n",
                "<p><strong>[Intro]</strong></p>\n",
                "<p>D C G (x4)</p>\n",
                "<br/>\n",
                "<p><strong>[Verse 1]</strong></p>\n",
                "<p>Big wheels keep on turning</p>\n",
                "<p>Carry me home to see my kin</p>\n",
            )
            .to_string(),
            created_at,
        },
        Song {
            id: "2".to_string(),
            title: "Hotel California".to_string(),
            artist: Some("Eagles".to_string()),
            folder: 0,
            program: 2,
            bpm: 72,
            content: concat!(
                "<h2>Hotel California</h2>\n",
                "<p><strong>[Intro]</strong></p>\n",
                "<p>Bm F# A E G D Em F#</p>\n",
            )
            .to_string(),
            created_at,
        },
        Song {
            id: "3".to_string(),
            title: "Uptown Funk".to_string(),
            artist: Some("Mark Ronson ft. Bruno Mars".to_string()),
            folder: 1,
            program: 5,
            bpm: 115,
            content: concat!(
                "<h2>Uptown Funk</h2>\n",
                "<p><strong>[Intro]</strong></p>\n",
                "<p>Doh, doh doh doh, doh doh doh, doh doh</p>\n",
            )
            .to_string(),
            created_at,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_defaults() {
        let song = SongDraft::new("New Song").into_song(1_700_000_000_000).unwrap();

        assert_eq!(song.id, "1700000000000");
        assert_eq!(song.folder, 0);
        assert_eq!(song.program, 0);
        assert_eq!(song.bpm, DEFAULT_BPM);
        assert_eq!(song.content, DEFAULT_CONTENT);
        assert_eq!(song.created_at, 1_700_000_000_000);
        assert_eq!(song.artist, None);
    }

    #[test]
    fn test_draft_requires_title() {
        assert_eq!(
            SongDraft::new("   ").into_song(1),
            Err(ValidationError::MissingTitle)
        );
    }

    #[test]
    fn test_edit_keeps_id_and_created_at() {
        let original = SongDraft::new("Song").into_song(100).unwrap();
        let mut draft = SongDraft::from_song(&original);
        draft.title = "Renamed".to_string();

        let edited = draft.into_song(999).unwrap();
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.created_at, 100);
        assert_eq!(edited.title, "Renamed");
    }

    #[test]
    fn test_routing_not_clamped_at_storage() {
        let song = SongDraft::new("Wide").routing(-5, 200).into_song(1).unwrap();
        assert_eq!(song.folder, -5);
        assert_eq!(song.program, 200);
    }

    #[test]
    fn test_blank_artist_dropped() {
        let song = SongDraft::new("Solo").artist("  ").into_song(1).unwrap();
        assert_eq!(song.artist, None);
        assert_eq!(song.display_title(), "Solo");
    }

    #[test]
    fn test_json_uses_camel_case() {
        let song = SongDraft::new("X").into_song(42).unwrap();
        let json = serde_json::to_value(&song).unwrap();

        assert_eq!(json["createdAt"], 42);
        assert!(json.get("artist").is_none());
    }

    #[test]
    fn test_parses_camel_case_blob() {
        let json = r#"[{"id":"1","title":"T","folder":0,"program":1,"bpm":98,
                        "content":"<p/>","createdAt":1700000000000}]"#;
        let songs: Vec<Song> = serde_json::from_str(json).unwrap();
        assert_eq!(songs[0].created_at, 1_700_000_000_000);
        assert_eq!(songs[0].artist, None);
    }

    #[test]
    fn test_seed_set() {
        let seed = seed_songs(5);
        let ids: Vec<_> = seed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert!(seed.iter().all(|s| s.validate().is_ok()));
        assert_eq!((seed[2].folder, seed[2].program, seed[2].bpm), (1, 5, 115));
    }
}
