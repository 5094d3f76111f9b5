//! Library manager: owns the track and playlist repositories and serves
//! library commands from the bus.
//!
//! Every mutation broadcasts a fresh `TracksChanged`/`PlaylistsChanged`
//! snapshot so observers never query the repositories directly. Playback
//! requests are resolved here into `LoadAndPlay` commands carrying the full
//! queue context.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::intake;
use crate::model::PlaylistDraft;
use crate::notifier::Notifier;
use crate::protocol::{
    LibraryMessage, Message, PlaybackMessage, PlaylistSummary, TrackSummary,
};
use crate::repository::{PlaylistRepository, TrackRepository};

pub struct LibraryManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    tracks: TrackRepository,
    playlists: PlaylistRepository,
    notifier: Notifier,
}

impl LibraryManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        tracks: TrackRepository,
        playlists: PlaylistRepository,
        notifier: Notifier,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            tracks,
            playlists,
            notifier,
        }
    }

    pub fn run(&mut self) {
        // Initial snapshots; a failed load keeps an empty cache and is
        // already logged by the repository.
        let _ = self.tracks.load();
        let _ = self.playlists.load();
        self.broadcast_tracks();
        self.broadcast_playlists();
        info!(
            "LibraryManager: Ready with {} tracks, {} playlists",
            self.tracks.items().len(),
            self.playlists.items().len()
        );

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Library(message)) => self.handle_message(message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("LibraryManager: Bus lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("LibraryManager: Bus closed, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, message: LibraryMessage) {
        match message {
            LibraryMessage::ImportTrack(path) => self.import_track(&path),
            LibraryMessage::ReloadTracks => {
                let _ = self.tracks.load();
                self.broadcast_tracks();
            }
            LibraryMessage::ReloadPlaylists => {
                let _ = self.playlists.load();
                self.broadcast_playlists();
            }
            LibraryMessage::DeleteTrack { id } => {
                // Playlist member ids are weak references; no cascade here,
                // dangling ids are dropped when a playlist is resolved.
                match self.tracks.delete(&id) {
                    Ok(()) => {
                        self.notifier.success("Track deleted");
                        self.broadcast_tracks();
                    }
                    Err(_) => self.notifier.error("Could not delete track"),
                }
            }
            LibraryMessage::CreatePlaylist {
                name,
                artist,
                description,
            } => {
                match PlaylistDraft::new(&name, &artist, description.as_deref(), None) {
                    Ok(draft) => {
                        let _ = self.playlists.add(draft);
                        self.broadcast_playlists();
                    }
                    Err(reason) => self.notifier.error(&reason),
                }
            }
            LibraryMessage::DeletePlaylist { id } => {
                match self.playlists.delete(&id) {
                    Ok(()) => {
                        self.notifier.success("Playlist deleted");
                        self.broadcast_playlists();
                    }
                    Err(_) => self.notifier.error("Could not delete playlist"),
                }
            }
            LibraryMessage::AddTrackToPlaylist {
                playlist_id,
                track_id,
            } => {
                if self.playlists.add_track(&playlist_id, &track_id).is_ok() {
                    self.broadcast_playlists();
                }
            }
            LibraryMessage::PlayTrack { track_id } => self.play_track(&track_id),
            LibraryMessage::PlayPlaylist {
                playlist_id,
                start_index,
            } => self.play_playlist(&playlist_id, start_index),
            // Outbound snapshots; nothing to do on receipt.
            LibraryMessage::TracksChanged(_)
            | LibraryMessage::PlaylistsChanged(_)
            | LibraryMessage::ImportSucceeded { .. }
            | LibraryMessage::ImportFailed { .. } => {}
        }
    }

    fn import_track(&mut self, path: &Path) {
        match intake::draft_from_file(path) {
            Ok(draft) => {
                if let Ok(track) = self.tracks.add(draft) {
                    self.broadcast_tracks();
                    let _ = self
                        .bus_producer
                        .send(Message::Library(LibraryMessage::ImportSucceeded {
                            path: path.to_path_buf(),
                            track_id: track.id,
                        }));
                }
            }
            Err(err) => {
                warn!("LibraryManager: Import of {} failed: {}", path.display(), err);
                self.notifier
                    .error(&format!("Could not import {}", path.display()));
                let _ = self
                    .bus_producer
                    .send(Message::Library(LibraryMessage::ImportFailed {
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    }));
            }
        }
    }

    /// Plays one library track with the whole library, in creation order,
    /// as the queue context.
    fn play_track(&mut self, track_id: &str) {
        let Some(track) = self.tracks.find(track_id) else {
            self.notifier.error("Track not found");
            return;
        };
        let track = Arc::new(track.clone());
        let context: Vec<Arc<crate::model::Track>> = self
            .tracks
            .items()
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::LoadAndPlay {
                track,
                context: Some(context),
            }));
    }

    /// Plays a playlist from `start_index` over its resolved members.
    /// Dangling member ids are dropped before indexing, so the index refers
    /// to playable tracks only.
    fn play_playlist(&mut self, playlist_id: &str, start_index: usize) {
        let Some(playlist) = self.playlists.find(playlist_id) else {
            self.notifier.error("Playlist not found");
            return;
        };
        let resolved = self.tracks.resolve(&playlist.track_ids);
        let Some(track) = resolved.get(start_index) else {
            self.notifier.error("Playlist has no track at that position");
            return;
        };
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::LoadAndPlay {
                track: Arc::clone(track),
                context: Some(resolved.clone()),
            }));
    }

    fn broadcast_tracks(&self) {
        let summaries: Vec<TrackSummary> = self
            .tracks
            .items()
            .iter()
            .map(|track| TrackSummary {
                id: track.id.clone(),
                title: track.title.clone(),
                artist: track.artist.clone(),
                duration: track.duration,
            })
            .collect();
        let _ = self
            .bus_producer
            .send(Message::Library(LibraryMessage::TracksChanged(summaries)));
    }

    fn broadcast_playlists(&self) {
        let summaries: Vec<PlaylistSummary> = self
            .playlists
            .items()
            .iter()
            .map(|playlist| PlaylistSummary {
                id: playlist.id.clone(),
                name: playlist.name.clone(),
                artist: playlist.artist.clone(),
                track_count: playlist.track_ids.len(),
            })
            .collect();
        let _ = self
            .bus_producer
            .send(Message::Library(LibraryMessage::PlaylistsChanged(
                summaries,
            )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BY_DATE, PLAYLISTS, TRACKS};
    use crate::protocol::{NotificationKind, NotificationMessage};
    use crate::repository::Repository;
    use crate::store::{CollectionSpec, StoreProvider};
    use std::io::Write;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::{self, error::TryRecvError};

    fn spawn_manager() -> (Sender<Message>, Receiver<Message>) {
        let provider = StoreProvider::open_in_memory(vec![
            CollectionSpec::new(TRACKS).with_index(BY_DATE),
            CollectionSpec::new(PLAYLISTS).with_index(BY_DATE),
        ])
        .expect("in-memory store should open");
        let (bus_sender, receiver) = broadcast::channel(256);
        let notifier = Notifier::new(bus_sender.clone());
        let tracks = Repository::new(provider.collection(TRACKS).unwrap(), notifier.clone());
        let playlists = Repository::new(provider.collection(PLAYLISTS).unwrap(), notifier.clone());
        let mut manager = LibraryManager::new(
            bus_sender.subscribe(),
            bus_sender.clone(),
            tracks,
            playlists,
            notifier,
        );
        thread::spawn(move || manager.run());
        (bus_sender, receiver)
    }

    fn wait_for_message<F, R>(
        receiver: &mut Receiver<Message>,
        timeout: Duration,
        mut extract: F,
    ) -> R
    where
        F: FnMut(&Message) -> Option<R>,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timed out waiting for expected message");
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if let Some(result) = extract(&message) {
                        return result;
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(2)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("bus closed while waiting"),
            }
        }
    }

    fn wait_for_tracks(receiver: &mut Receiver<Message>) -> Vec<TrackSummary> {
        wait_for_message(receiver, Duration::from_secs(5), |message| match message {
            Message::Library(LibraryMessage::TracksChanged(tracks)) => Some(tracks.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_import_broadcasts_the_updated_track_list() {
        let (bus_sender, mut receiver) = spawn_manager();
        // Initial snapshot is empty.
        assert!(wait_for_tracks(&mut receiver).is_empty());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo take.mp3");
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(&[0x41; 64]))
            .expect("write sample file");

        bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(path)))
            .expect("send should succeed");

        let tracks = wait_for_tracks(&mut receiver);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "demo take");
    }

    #[test]
    fn test_import_outcome_is_correlated_by_path() {
        let (bus_sender, mut receiver) = spawn_manager();

        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("keeper.mp3");
        std::fs::File::create(&good)
            .and_then(|mut file| file.write_all(&[0x43; 48]))
            .expect("write sample file");

        // A failing import first, then a succeeding one; each outcome must
        // name its own file, startup snapshots satisfy neither.
        bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(
                "/no/such/first.mp3".into(),
            )))
            .expect("send should succeed");
        bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(good.clone())))
            .expect("send should succeed");

        let failed_path = wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
            match message {
                Message::Library(LibraryMessage::ImportFailed { path, .. }) => {
                    Some(path.clone())
                }
                _ => None,
            }
        });
        assert_eq!(failed_path.to_str(), Some("/no/such/first.mp3"));

        let (done_path, track_id) =
            wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
                match message {
                    Message::Library(LibraryMessage::ImportSucceeded { path, track_id }) => {
                        Some((path.clone(), track_id.clone()))
                    }
                    _ => None,
                }
            });
        assert_eq!(done_path, good);

        // The reported id belongs to the broadcast snapshot.
        bus_sender
            .send(Message::Library(LibraryMessage::ReloadTracks))
            .expect("send should succeed");
        let tracks = loop {
            let tracks = wait_for_tracks(&mut receiver);
            if !tracks.is_empty() {
                break tracks;
            }
        };
        assert!(tracks.iter().any(|track| track.id == track_id));
    }

    #[test]
    fn test_import_failure_is_reported_not_fatal() {
        let (bus_sender, mut receiver) = spawn_manager();
        bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(
                "/no/such/file.mp3".into(),
            )))
            .expect("send should succeed");

        wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
            match message {
                Message::Library(LibraryMessage::ImportFailed { path, .. }) => {
                    assert_eq!(path.to_str(), Some("/no/such/file.mp3"));
                    Some(())
                }
                _ => None,
            }
        });

        // The manager is still serving commands afterwards.
        bus_sender
            .send(Message::Library(LibraryMessage::ReloadTracks))
            .expect("send should succeed");
        assert!(wait_for_tracks(&mut receiver).is_empty());
    }

    #[test]
    fn test_invalid_playlist_names_are_rejected_with_a_notification() {
        let (bus_sender, mut receiver) = spawn_manager();
        bus_sender
            .send(Message::Library(LibraryMessage::CreatePlaylist {
                name: "   ".to_string(),
                artist: "me".to_string(),
                description: None,
            }))
            .expect("send should succeed");

        let text = wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
            match message {
                Message::Notification(NotificationMessage::Show { text, kind })
                    if *kind == NotificationKind::Error =>
                {
                    Some(text.clone())
                }
                _ => None,
            }
        });
        assert!(text.contains("name"));
    }

    #[test]
    fn test_playing_a_playlist_sends_its_resolved_queue() {
        let (bus_sender, mut receiver) = spawn_manager();

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("only song.mp3");
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(&[0x42; 32]))
            .expect("write sample file");
        bus_sender
            .send(Message::Library(LibraryMessage::ImportTrack(path)))
            .expect("send should succeed");
        let track_id = loop {
            let tracks = wait_for_tracks(&mut receiver);
            if let Some(track) = tracks.first() {
                break track.id.clone();
            }
        };

        bus_sender
            .send(Message::Library(LibraryMessage::CreatePlaylist {
                name: "Roadtrip".to_string(),
                artist: "me".to_string(),
                description: None,
            }))
            .expect("send should succeed");
        let playlist_id = wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
            match message {
                Message::Library(LibraryMessage::PlaylistsChanged(playlists)) => {
                    playlists.first().map(|playlist| playlist.id.clone())
                }
                _ => None,
            }
        });

        bus_sender
            .send(Message::Library(LibraryMessage::AddTrackToPlaylist {
                playlist_id: playlist_id.clone(),
                track_id: track_id.clone(),
            }))
            .expect("send should succeed");
        bus_sender
            .send(Message::Library(LibraryMessage::PlayPlaylist {
                playlist_id,
                start_index: 0,
            }))
            .expect("send should succeed");

        let (loaded_id, queue_len) =
            wait_for_message(&mut receiver, Duration::from_secs(5), |message| {
                match message {
                    Message::Playback(PlaybackMessage::LoadAndPlay { track, context }) => Some((
                        track.id.clone(),
                        context.as_ref().map(|queue| queue.len()).unwrap_or(0),
                    )),
                    _ => None,
                }
            });
        assert_eq!(loaded_id, track_id);
        assert_eq!(queue_len, 1);
    }
}
