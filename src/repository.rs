//! Cached repositories over the persistent collections.
//!
//! Each repository owns an in-memory snapshot of one collection plus a
//! loading flag and the last load error. Writes persist first and mutate the
//! cache only after the store confirms, so the cache never shows a record
//! the store does not hold. Load failures keep the previous snapshot.

use std::sync::Arc;

use log::{error, info};

use crate::error::StoreError;
use crate::model::{Playlist, PlaylistDraft, Track, TrackDraft};
use crate::model::{new_record_id, now_millis, BY_DATE};
use crate::notifier::Notifier;
use crate::store::{Collection, Record};

pub type TrackRepository = Repository<Track>;
pub type PlaylistRepository = Repository<Playlist>;

/// Snapshot-keeping façade over one collection.
pub struct Repository<T: Record> {
    collection: Collection<T>,
    notifier: Notifier,
    items: Vec<T>,
    loading: bool,
    last_error: Option<String>,
}

impl<T: Record> Repository<T> {
    pub fn new(collection: Collection<T>, notifier: Notifier) -> Self {
        Self {
            collection,
            notifier,
            items: Vec::new(),
            loading: false,
            last_error: None,
        }
    }

    /// Cached records in creation order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message from the most recent failed operation, cleared at the start
    /// of the next one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Reloads the snapshot from storage, ordered by creation time. On
    /// failure the previous snapshot stays in place and the error is kept
    /// for observers.
    pub fn load(&mut self) -> Result<(), StoreError> {
        self.loading = true;
        self.last_error = None;
        let result = self.collection.get_all_from_index(BY_DATE);
        self.loading = false;

        match result {
            Ok(items) => {
                self.items = items;
                Ok(())
            }
            Err(err) => {
                error!(
                    "Repository: Failed to load {}: {}",
                    self.collection.name(),
                    err
                );
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Cached record by id.
    pub fn find(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Persists a replacement record, then swaps it into the cache. A record
    /// absent from the cache is persisted but not appended; the next load
    /// picks it up in order.
    pub fn update(&mut self, item: T) -> Result<(), StoreError> {
        self.last_error = None;
        if let Err(err) = self.collection.update(&item) {
            error!(
                "Repository: Failed to update '{}' in {}: {}",
                item.id(),
                self.collection.name(),
                err
            );
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        if let Some(slot) = self.items.iter_mut().find(|cached| cached.id() == item.id()) {
            *slot = item;
        }
        Ok(())
    }

    /// Deletes by id; idempotent like the store beneath it.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.last_error = None;
        if let Err(err) = self.collection.delete(id) {
            error!(
                "Repository: Failed to delete '{}' from {}: {}",
                id,
                self.collection.name(),
                err
            );
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.items.retain(|item| item.id() != id);
        Ok(())
    }

    fn persist_new(&mut self, item: T) -> Result<(), StoreError> {
        self.last_error = None;
        if let Err(err) = self.collection.add(&item) {
            error!(
                "Repository: Failed to add '{}' to {}: {}",
                item.id(),
                self.collection.name(),
                err
            );
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.items.push(item);
        Ok(())
    }
}

impl Repository<Track> {
    /// Persists a drafted track under a fresh id, notifying either way.
    pub fn add(&mut self, draft: TrackDraft) -> Result<Track, StoreError> {
        let track = draft.into_track(new_record_id(), now_millis());
        let title = track.title.clone();
        match self.persist_new(track.clone()) {
            Ok(()) => {
                info!("Repository: Added track '{}' ({})", title, track.id);
                self.notifier.success(&format!("Track '{}' saved", title));
                Ok(track)
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Could not save track '{}'", title));
                Err(err)
            }
        }
    }

    /// Resolves ids against the cache, dropping dangling references while
    /// preserving the given order.
    pub fn resolve(&self, ids: &[String]) -> Vec<Arc<Track>> {
        ids.iter()
            .filter_map(|id| self.find(id).cloned().map(Arc::new))
            .collect()
    }
}

impl Repository<Playlist> {
    /// Persists a validated playlist draft under a fresh id.
    pub fn add(&mut self, draft: PlaylistDraft) -> Result<Playlist, StoreError> {
        let playlist = draft.into_playlist(new_record_id(), now_millis());
        let name = playlist.name.clone();
        match self.persist_new(playlist.clone()) {
            Ok(()) => {
                info!("Repository: Created playlist '{}' ({})", name, playlist.id);
                self.notifier
                    .success(&format!("Playlist '{}' created", name));
                Ok(playlist)
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Could not create playlist '{}'", name));
                Err(err)
            }
        }
    }

    /// Appends a track id to a playlist. Duplicate membership is rejected
    /// with a notification and no write; a missing playlist only notifies.
    pub fn add_track(&mut self, playlist_id: &str, track_id: &str) -> Result<(), StoreError> {
        self.last_error = None;
        let Some(playlist) = self.find(playlist_id) else {
            self.last_error = Some(format!("playlist '{}' not found", playlist_id));
            self.notifier.error("Playlist not found");
            return Ok(());
        };
        if playlist.track_ids.iter().any(|id| id == track_id) {
            self.notifier.error("Already in playlist");
            return Ok(());
        }

        let mut updated = playlist.clone();
        updated.track_ids.push(track_id.to_string());
        let name = updated.name.clone();
        match self.update(updated) {
            Ok(()) => {
                self.notifier
                    .success(&format!("Added to playlist '{}'", name));
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Could not update playlist '{}'", name));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Genre, PLAYLISTS, TRACKS};
    use crate::protocol::{Message, NotificationKind, NotificationMessage};
    use crate::store::{CollectionSpec, StoreProvider};
    use tokio::sync::broadcast::{self, Receiver};

    fn provider() -> StoreProvider {
        StoreProvider::open_in_memory(vec![
            CollectionSpec::new(TRACKS).with_index(BY_DATE),
            CollectionSpec::new(PLAYLISTS).with_index(BY_DATE),
        ])
        .expect("in-memory store should open")
    }

    fn repositories() -> (TrackRepository, PlaylistRepository, Receiver<Message>) {
        let provider = provider();
        let (bus_sender, receiver) = broadcast::channel(64);
        let notifier = Notifier::new(bus_sender);
        (
            Repository::new(provider.collection(TRACKS).unwrap(), notifier.clone()),
            Repository::new(provider.collection(PLAYLISTS).unwrap(), notifier),
            receiver,
        )
    }

    fn draft(title: &str) -> TrackDraft {
        TrackDraft {
            title: title.to_string(),
            artist: "Tester".to_string(),
            description: None,
            genre: Genre::Other,
            duration: 30.0,
            mime_type: "audio/mpeg".to_string(),
            size: 3,
            file: vec![1, 2, 3],
            cover_image: None,
        }
    }

    fn next_notification(receiver: &mut Receiver<Message>) -> (String, NotificationKind) {
        loop {
            match receiver.try_recv() {
                Ok(Message::Notification(NotificationMessage::Show { text, kind })) => {
                    return (text, kind)
                }
                Ok(_) => {}
                Err(err) => panic!("expected a notification, got {:?}", err),
            }
        }
    }

    #[test]
    fn test_add_track_persists_before_caching_and_notifies() {
        let (mut tracks, _, mut receiver) = repositories();
        let track = tracks.add(draft("First Light")).expect("add should succeed");

        assert_eq!(tracks.items().len(), 1);
        assert!(tracks.find(&track.id).is_some());
        let (text, kind) = next_notification(&mut receiver);
        assert_eq!(kind, NotificationKind::Success);
        assert!(text.contains("First Light"));

        // A fresh load sees the same record, so storage led the cache.
        tracks.load().expect("load should succeed");
        assert_eq!(tracks.items().len(), 1);
    }

    #[test]
    fn test_load_orders_by_creation_and_survives_failures() {
        let provider = provider();
        let (bus_sender, _receiver) = broadcast::channel(16);
        let notifier = Notifier::new(bus_sender);
        let mut tracks: TrackRepository =
            Repository::new(provider.collection(TRACKS).unwrap(), notifier.clone());

        let first = tracks.add(draft("older")).expect("add");
        let second = tracks.add(draft("newer")).expect("add");
        tracks.load().expect("load should succeed");
        let ids: Vec<&str> = tracks.items().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert!(tracks.last_error().is_none());

        // A collection without the creation index cannot load; the snapshot
        // it already holds stays put and the error is recorded.
        let bare = StoreProvider::open_in_memory(vec![CollectionSpec::new(TRACKS)])
            .expect("store should open");
        let mut broken: TrackRepository =
            Repository::new(bare.collection(TRACKS).unwrap(), notifier);
        broken.items = tracks.items().to_vec();
        assert!(broken.load().is_err());
        assert_eq!(broken.items().len(), 2);
        assert!(broken.last_error().is_some());
        assert!(!broken.is_loading());
    }

    #[test]
    fn test_delete_is_idempotent_and_clears_the_cache() {
        let (mut tracks, _, _receiver) = repositories();
        let track = tracks.add(draft("ephemeral")).expect("add");

        tracks.delete(&track.id).expect("delete should succeed");
        assert!(tracks.items().is_empty());
        tracks.delete(&track.id).expect("repeat delete should succeed");
    }

    #[test]
    fn test_update_replaces_in_place_without_reordering() {
        let (mut tracks, _, _receiver) = repositories();
        let first = tracks.add(draft("a")).expect("add");
        let _second = tracks.add(draft("b")).expect("add");

        let mut renamed = first.clone();
        renamed.title = "a, remastered".to_string();
        tracks.update(renamed).expect("update should succeed");

        assert_eq!(tracks.items()[0].title, "a, remastered");
        assert_eq!(tracks.items()[0].id, first.id);
    }

    #[test]
    fn test_duplicate_playlist_membership_is_rejected_without_a_write() {
        let (_, mut playlists, mut receiver) = repositories();
        let playlist = playlists
            .add(PlaylistDraft::new("Drive", "me", None, None).unwrap())
            .expect("create should succeed");
        let _ = next_notification(&mut receiver); // playlist created

        playlists
            .add_track(&playlist.id, "track-1")
            .expect("first add should succeed");
        let _ = next_notification(&mut receiver); // added

        playlists
            .add_track(&playlist.id, "track-1")
            .expect("duplicate add should not error");
        let (text, kind) = next_notification(&mut receiver);
        assert_eq!(kind, NotificationKind::Error);
        assert_eq!(text, "Already in playlist");

        playlists.load().expect("load should succeed");
        assert_eq!(playlists.items()[0].track_ids, vec!["track-1"]);
    }

    #[test]
    fn test_adding_to_a_missing_playlist_only_notifies() {
        let (_, mut playlists, mut receiver) = repositories();
        playlists
            .add_track("no-such-playlist", "track-1")
            .expect("missing playlist should not error");
        let (text, kind) = next_notification(&mut receiver);
        assert_eq!(kind, NotificationKind::Error);
        assert_eq!(text, "Playlist not found");
        assert!(playlists.last_error().is_some());
    }

    #[test]
    fn test_failed_mutations_record_an_error_and_later_ones_clear_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("library.db");
        let provider = StoreProvider::open(
            &path,
            vec![CollectionSpec::new(TRACKS).with_index(BY_DATE)],
        )
        .expect("store should open");
        let (bus_sender, _receiver) = broadcast::channel(16);
        let mut tracks: TrackRepository = Repository::new(
            provider.collection(TRACKS).unwrap(),
            Notifier::new(bus_sender),
        );
        let track = tracks.add(draft("fragile")).expect("add");

        // The backing store goes away mid-session.
        let raw = rusqlite::Connection::open(&path).expect("raw connection");
        raw.execute_batch("DROP TABLE tracks").expect("drop table");

        let mut renamed = track.clone();
        renamed.title = "renamed".to_string();
        assert!(tracks.update(renamed).is_err());
        assert!(tracks.last_error().is_some());
        // The cache keeps the last consistent record.
        assert_eq!(tracks.find(&track.id).unwrap().title, "fragile");

        assert!(tracks.delete(&track.id).is_err());
        assert!(tracks.last_error().is_some());

        // Once the store is healthy again the next operation clears the
        // error.
        raw.execute_batch(
            "CREATE TABLE tracks (id TEXT PRIMARY KEY, \
             idx_by_date INTEGER NOT NULL DEFAULT 0, record TEXT NOT NULL)",
        )
        .expect("recreate table");
        tracks.delete(&track.id).expect("delete should succeed");
        assert!(tracks.last_error().is_none());
    }

    #[test]
    fn test_resolve_filters_dangling_ids_preserving_order() {
        let (mut tracks, _, _receiver) = repositories();
        let first = tracks.add(draft("one")).expect("add");
        let second = tracks.add(draft("two")).expect("add");

        let ids = vec![
            second.id.clone(),
            "deleted-long-ago".to_string(),
            first.id.clone(),
        ];
        let resolved = tracks.resolve(&ids);
        let titles: Vec<&str> = resolved.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one"]);
    }
}
