//! Orchestrator - the API the presentation layer talks to
//!
//! Ties catalog, change bus and controller together. Selecting a song
//! re-reads it from the catalog, sends the MIDI sequence, records it as
//! active and tells the other clients. A change announced by another client
//! runs the same path except the announcement, so two clients never echo a
//! selection back and forth.

use crate::bus::{ChangeBus, SubscriptionId};
use crate::catalog::{now_millis, search, CatalogStats, CatalogStore, Song, SongDraft};
use crate::controller::{MidiController, SendOutcome, TransportState};
use crate::device::{OutputDescriptor, SessionStatus};
use crate::error::CatalogError;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

type RemoteListenerFn = Arc<dyn Fn(&Song) + Send + Sync>;

/// Handle for a listener registered with `on_remote_song_change`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteListenerId(u64);

/// Result of a local selection
#[derive(Debug, Clone)]
pub struct SelectOutcome {
    /// The song as re-read from the catalog
    pub song: Song,
    pub midi: SendOutcome,
}

/// One logical client of the setlist
pub struct Orchestrator {
    catalog: CatalogStore,
    bus: ChangeBus,
    controller: Arc<MidiController>,
    subscription: SubscriptionId,
    active: RwLock<Option<Song>>,
    remote_listeners: RwLock<Vec<(RemoteListenerId, RemoteListenerFn)>>,
    next_listener_id: AtomicU64,
}

impl Orchestrator {
    /// Create an orchestrator and subscribe it to `bus`
    pub fn attach(
        catalog: CatalogStore,
        bus: ChangeBus,
        controller: Arc<MidiController>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Orchestrator>| {
            let weak = this.clone();
            let subscription = bus.subscribe(move |song_id| {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.handle_remote_change(song_id);
                }
            });
            debug!("Orchestrator attached to bus as {:?}", subscription);

            Self {
                catalog,
                bus,
                controller,
                subscription,
                active: RwLock::new(None),
                remote_listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }
        })
    }

    pub fn list_songs(&self) -> Vec<Song> {
        self.catalog.list()
    }

    /// Songs whose title or artist matches `term`
    pub fn search_songs(&self, term: &str) -> Vec<Song> {
        let songs = self.catalog.list();
        search(&songs, term).into_iter().cloned().collect()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats::from_songs(&self.catalog.list())
    }

    /// Validate and store a draft, returning the saved song
    ///
    /// Editing an existing id keeps its stored creation time even when the
    /// draft does not carry one.
    pub fn save_song(&self, mut draft: SongDraft) -> Result<Song, CatalogError> {
        if draft.created_at.is_none() {
            if let Some(existing) = draft.id.as_deref().and_then(|id| self.catalog.get(id)) {
                draft.created_at = Some(existing.created_at);
            }
        }
        let song = draft.into_song(now_millis())?;
        self.catalog.upsert(song.clone())?;
        info!("💾 Saved song '{}' ({})", song.title, song.id);

        // Keep the active copy in step with an edit
        let mut active = self.active.write();
        if active.as_ref().is_some_and(|a| a.id == song.id) {
            *active = Some(song.clone());
        }
        Ok(song)
    }

    pub fn delete_song(&self, id: &str) -> Result<(), CatalogError> {
        self.catalog.remove(id)?;
        let mut active = self.active.write();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
        info!("Deleted song '{}'", id);
        Ok(())
    }

    /// Select a song: MIDI send, mark active, notify other clients
    pub fn select_song(&self, id: &str) -> Result<SelectOutcome, CatalogError> {
        let song = self
            .catalog
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        let midi = self.controller.send_song(&song);
        *self.active.write() = Some(song.clone());
        info!("🎵 Active song: {}", song.display_title());

        self.bus.broadcast_from(self.subscription, &song.id);
        Ok(SelectOutcome { song, midi })
    }

    /// Send the active song's sequence again, on this client only
    ///
    /// The song is re-read from the catalog first. Returns `None` when no
    /// song is active or it has been deleted meanwhile.
    pub fn resync(&self) -> Option<SendOutcome> {
        let Some(song) = self.refresh_active() else {
            debug!("Resync requested with no active song");
            return None;
        };
        info!("🔁 Resync: {}", song.display_title());
        Some(self.controller.send_song(&song))
    }

    /// Be told when another client changes the active song
    ///
    /// The listener receives the song as re-read from the catalog.
    pub fn on_remote_song_change<F>(&self, listener: F) -> RemoteListenerId
    where
        F: Fn(&Song) + Send + Sync + 'static,
    {
        let id = RemoteListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.remote_listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_remote_listener(&self, id: RemoteListenerId) {
        self.remote_listeners.write().retain(|(lid, _)| *lid != id);
    }

    pub fn active_song(&self) -> Option<Song> {
        self.active.read().clone()
    }

    /// Rebind the MIDI output; an unknown id leaves nothing bound
    ///
    /// When the new output binds and a song is active, its sequence is sent
    /// to the new device right away.
    pub fn set_output_device(&self, id: Option<&str>) -> SessionStatus {
        let session = self.controller.session();
        session.bind(id);

        if session.is_bound() {
            if let Some(song) = self.refresh_active() {
                debug!("Output changed, re-sending '{}'", song.id);
                self.controller.send_song(&song);
            }
        }
        session.status()
    }

    pub fn outputs(&self) -> Vec<OutputDescriptor> {
        self.controller.session().list_outputs()
    }

    pub fn device_status(&self) -> SessionStatus {
        self.controller.session().status()
    }

    pub fn toggle_transport(&self) -> (TransportState, SendOutcome) {
        self.controller.toggle_transport()
    }

    pub fn controller(&self) -> &Arc<MidiController> {
        &self.controller
    }

    /// Re-read the active song from the catalog, dropping it if deleted
    fn refresh_active(&self) -> Option<Song> {
        let id = self.active.read().as_ref().map(|s| s.id.clone())?;
        let fresh = self.catalog.get(&id);
        *self.active.write() = fresh.clone();
        fresh
    }

    fn handle_remote_change(&self, song_id: &str) {
        // The notification carries only the id; the catalog is the truth
        let Some(song) = self.catalog.get(song_id) else {
            warn!("Remote selected unknown song '{}', ignoring", song_id);
            return;
        };

        debug!("Remote song change: {} ({})", song.title, song.id);
        self.controller.send_song(&song);
        *self.active.write() = Some(song.clone());

        let listeners: Vec<_> = self
            .remote_listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&song))).is_err() {
                error!("Remote song listener panicked on '{}'", song.id);
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}
