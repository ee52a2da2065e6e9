//! CatalogStore - list / upsert / remove over a single JSON blob

use super::backend::BlobStore;
use super::types::{now_millis, seed_songs, Song};
use crate::error::CatalogError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Blob key the catalog is stored under
pub const DEFAULT_CATALOG_KEY: &str = "beatbuddy_songs";

/// The canonical song list
///
/// There is no in-memory cache: every read goes to the backend, so a write
/// is visible to the next read without any invalidation step.
#[derive(Clone)]
pub struct CatalogStore {
    backend: Arc<dyn BlobStore>,
    key: String,
}

impl CatalogStore {
    /// Create a store using the default blob key
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self::with_key(backend, DEFAULT_CATALOG_KEY)
    }

    pub fn with_key(backend: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// All songs in stored order
    ///
    /// Seeds the example setlist when nothing is persisted yet. Corrupt or
    /// unreadable data yields an empty list (logged, never propagated).
    pub fn list(&self) -> Vec<Song> {
        match self.load() {
            Ok(songs) => songs,
            Err(e) => {
                error!("Failed to read catalog from {} backend: {}", self.backend.name(), e);
                Vec::new()
            }
        }
    }

    /// Look up a single song by id
    pub fn get(&self, id: &str) -> Option<Song> {
        self.list().into_iter().find(|s| s.id == id)
    }

    /// Insert a song, or replace the one with the same id in place
    ///
    /// Validation runs first; a rejected song causes no write.
    pub fn upsert(&self, song: Song) -> Result<(), CatalogError> {
        song.validate()?;

        let mut songs = self.load()?;
        match songs.iter_mut().find(|s| s.id == song.id) {
            Some(existing) => {
                debug!("Replacing song '{}' ({})", song.id, song.title);
                *existing = song;
            }
            None => {
                debug!("Appending song '{}' ({})", song.id, song.title);
                songs.push(song);
            }
        }

        self.persist(&songs)
    }

    /// Remove a song by id; absent ids are a no-op
    pub fn remove(&self, id: &str) -> Result<(), CatalogError> {
        let mut songs = self.load()?;
        let before = songs.len();
        songs.retain(|s| s.id != id);

        if songs.len() == before {
            debug!("Remove ignored, song '{}' not in catalog", id);
            return Ok(());
        }

        self.persist(&songs)
    }

    /// Read and decode the blob
    ///
    /// Absent → seed (persisted). Corrupt → empty. Backend failure → error,
    /// so a write path never overwrites data it could not read.
    fn load(&self) -> Result<Vec<Song>, CatalogError> {
        let blob = self
            .backend
            .read(&self.key)
            .map_err(CatalogError::Persistence)?;

        match blob {
            None => {
                let seed = seed_songs(now_millis());
                info!("No catalog found under '{}', seeding {} example songs", self.key, seed.len());
                if let Err(e) = self.persist(&seed) {
                    warn!("Failed to persist seed catalog: {}", e);
                }
                Ok(seed)
            }
            Some(bytes) => match serde_json::from_slice::<Vec<Song>>(&bytes) {
                Ok(songs) => Ok(songs),
                Err(e) => {
                    error!("Failed to parse catalog '{}', treating as empty: {}", self.key, e);
                    Ok(Vec::new())
                }
            },
        }
    }

    fn persist(&self, songs: &[Song]) -> Result<(), CatalogError> {
        let json = serde_json::to_vec(songs)?;
        self.backend
            .write(&self.key, &json)
            .map_err(CatalogError::Persistence)?;

        debug!("Catalog persisted ({} songs, {} bytes)", songs.len(), json.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::backend::MemoryBlobStore;
    use crate::catalog::types::SongDraft;
    use crate::error::ValidationError;
    use proptest::prelude::*;

    fn make_store() -> (CatalogStore, Arc<MemoryBlobStore>) {
        let backend = Arc::new(MemoryBlobStore::new());
        (CatalogStore::new(backend.clone()), backend)
    }

    fn make_song(id: &str, title: &str) -> Song {
        let mut draft = SongDraft::new(title).routing(2, 9).bpm(100);
        draft.id = Some(id.to_string());
        draft.into_song(1000).unwrap()
    }

    /// Backend that fails every call
    struct BrokenBackend;

    impl BlobStore for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }
        fn read(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            anyhow::bail!("device not ready")
        }
        fn write(&self, _key: &str, _data: &[u8]) -> anyhow::Result<()> {
            anyhow::bail!("device not ready")
        }
    }

    #[test]
    fn test_first_list_seeds_and_persists() {
        let (store, backend) = make_store();

        let songs = store.list();
        assert_eq!(songs.len(), 3);

        let blob = backend.read(DEFAULT_CATALOG_KEY).unwrap().unwrap();
        let persisted: Vec<Song> = serde_json::from_slice(&blob).unwrap();
        assert_eq!(persisted, songs);
    }

    #[test]
    fn test_corrupt_blob_reads_as_empty() {
        let backend = Arc::new(MemoryBlobStore::new().with_blob(DEFAULT_CATALOG_KEY, "{not json"));
        let store = CatalogStore::new(backend);

        assert!(store.list().is_empty());
    }

    #[test]
    fn test_empty_array_is_not_reseeded() {
        let backend = Arc::new(MemoryBlobStore::new().with_blob(DEFAULT_CATALOG_KEY, "[]"));
        let store = CatalogStore::new(backend);

        assert!(store.list().is_empty());
    }

    #[test]
    fn test_upsert_appends_then_replaces_in_place() {
        let (store, _) = make_store();
        store.upsert(make_song("4", "New Song")).unwrap();
        assert_eq!(store.list().len(), 4);

        let mut changed = make_song("2", "Hotel California (live)");
        changed.bpm = 75;
        store.upsert(changed.clone()).unwrap();

        let songs = store.list();
        assert_eq!(songs.len(), 4);
        assert_eq!(songs[1], changed);
        assert_eq!(songs[3].id, "4");
    }

    #[test]
    fn test_upsert_rejects_empty_title_without_writing() {
        let (store, backend) = make_store();
        let before = store.list();

        let mut song = make_song("9", "x");
        song.title = " ".to_string();
        let err = store.upsert(song).unwrap_err();

        assert!(matches!(err, CatalogError::Validation(ValidationError::MissingTitle)));
        assert_eq!(store.list(), before);
        let blob = backend.read(DEFAULT_CATALOG_KEY).unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Vec<Song>>(&blob).unwrap(), before);
    }

    #[test]
    fn test_upsert_after_corruption_starts_fresh() {
        let backend = Arc::new(MemoryBlobStore::new().with_blob(DEFAULT_CATALOG_KEY, "garbage"));
        let store = CatalogStore::new(backend);

        store.upsert(make_song("4", "Recovered")).unwrap();
        let songs = store.list();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "Recovered");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _) = make_store();
        store.remove("2").unwrap();
        let once = store.list();
        store.remove("2").unwrap();
        assert_eq!(store.list(), once);
        assert_eq!(once.len(), 2);

        store.remove("does-not-exist").unwrap();
        assert_eq!(store.list(), once);
    }

    #[test]
    fn test_get() {
        let (store, _) = make_store();
        assert_eq!(store.get("3").map(|s| s.title), Some("Uptown Funk".to_string()));
        assert!(store.get("42").is_none());
    }

    #[test]
    fn test_backend_failure() {
        let store = CatalogStore::new(Arc::new(BrokenBackend));

        assert!(store.list().is_empty());
        assert!(matches!(
            store.upsert(make_song("1", "x")),
            Err(CatalogError::Persistence(_))
        ));
        assert!(matches!(store.remove("1"), Err(CatalogError::Persistence(_))));
    }

    #[test]
    fn test_custom_key() {
        let backend = Arc::new(MemoryBlobStore::new());
        let store = CatalogStore::with_key(backend.clone(), "setlist_b");
        store.list();

        assert!(backend.read("setlist_b").unwrap().is_some());
        assert!(backend.read(DEFAULT_CATALOG_KEY).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn upsert_keeps_one_record_per_id(ids in proptest::collection::vec(0u8..8, 1..24)) {
            let store = CatalogStore::new(Arc::new(MemoryBlobStore::new().with_blob(DEFAULT_CATALOG_KEY, "[]")));

            for (n, id) in ids.iter().enumerate() {
                let song = make_song(&id.to_string(), &format!("take {}", n));
                store.upsert(song.clone()).unwrap();
                let songs = store.list();
                prop_assert_eq!(songs.iter().filter(|s| s.id == song.id).count(), 1);
                prop_assert!(songs.contains(&song));
            }

            // First-seen order is preserved
            let mut expected: Vec<String> = Vec::new();
            for id in &ids {
                let id = id.to_string();
                if !expected.contains(&id) {
                    expected.push(id);
                }
            }
            let actual: Vec<String> = store.list().into_iter().map(|s| s.id).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
