//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the message payloads exchanged between the library
//! manager, the playback engine, media backends and the notification center.

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::Track;
use crate::playback::PlaybackState;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Library(LibraryMessage),
    Playback(PlaybackMessage),
    Media(MediaEvent),
    Notification(NotificationMessage),
}

/// Library-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    /// Import one audio file from disk into the track collection.
    ImportTrack(PathBuf),
    ReloadTracks,
    ReloadPlaylists,
    DeleteTrack {
        id: String,
    },
    CreatePlaylist {
        name: String,
        artist: String,
        description: Option<String>,
    },
    DeletePlaylist {
        id: String,
    },
    AddTrackToPlaylist {
        playlist_id: String,
        track_id: String,
    },
    /// Play one library track with the whole library as queue context.
    PlayTrack {
        track_id: String,
    },
    /// Play a playlist from `start_index`, with its resolved members as the
    /// queue context.
    PlayPlaylist {
        playlist_id: String,
        start_index: usize,
    },
    /// Snapshot of the track cache after a load or mutation.
    TracksChanged(Vec<TrackSummary>),
    /// Snapshot of the playlist cache after a load or mutation.
    PlaylistsChanged(Vec<PlaylistSummary>),
    /// Per-file import outcome, correlated by path.
    ImportSucceeded {
        path: PathBuf,
        track_id: String,
    },
    ImportFailed {
        path: PathBuf,
        reason: String,
    },
}

/// Playback commands accepted by the engine, plus its published state.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    /// Load a track and begin playback, optionally replacing the queue with
    /// an ordered context.
    LoadAndPlay {
        track: Arc<Track>,
        context: Option<Vec<Arc<Track>>>,
    },
    TogglePlayPause,
    Pause,
    Stop,
    Next,
    Previous,
    /// Absolute position in seconds.
    Seek(f64),
    /// Target volume in [0, 1]; raising above 0 while muted also unmutes.
    SetVolume(f64),
    ToggleMute,
    /// Read-only session view published after every observable change.
    SessionChanged(SessionSnapshot),
}

/// Asynchronous events reported by the bound media resource.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// Play intent acknowledged; playback is progressing.
    Playing,
    /// Pause acknowledged.
    Paused,
    /// The resource stalled waiting for data.
    Waiting,
    /// Position progressed, in seconds.
    TimeUpdate { position: f64 },
    /// The resource learned its effective duration, in seconds.
    DurationChanged { duration: f64 },
    /// Playback reached the natural end of the payload.
    Ended,
    /// Decode or playback failure; non-fatal to the engine.
    Error(String),
}

/// Lightweight view of the playback session for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_track_id: Option<String>,
    pub current_track_title: Option<String>,
    /// Queue member ids in navigation order.
    pub queue_ids: Vec<String>,
    /// Position of the current track in the queue, when present.
    pub current_index: Option<usize>,
    pub has_next: bool,
    pub has_previous: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
}

/// Fire-and-forget user-facing notifications.
#[derive(Debug, Clone)]
pub enum NotificationMessage {
    Show { text: String, kind: NotificationKind },
    /// Auto-dismiss timer elapsed for the toast with this generation.
    DismissElapsed { generation: u64 },
}

/// Notification severity shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// One indexed track entry as broadcast to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Duration in seconds.
    pub duration: f64,
}

/// One playlist entry as broadcast to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub track_count: usize,
}
