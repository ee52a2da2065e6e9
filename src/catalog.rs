//! Song catalog - durable setlist storage
//!
//! The catalog is a single named blob holding a JSON array of songs. All
//! mutations rewrite the whole blob synchronously, so every read in the same
//! process observes the latest write. Corrupt or unreadable data degrades to
//! an empty catalog instead of failing the caller.

mod backend;
mod query;
mod store;
mod types;

pub use backend::{BlobStore, FileBlobStore, MemoryBlobStore, SledBlobStore};
pub use query::{search, BpmBucket, CatalogStats};
pub use store::{CatalogStore, DEFAULT_CATALOG_KEY};
pub use types::{now_millis, seed_songs, Song, SongDraft, DEFAULT_BPM, DEFAULT_CONTENT};
