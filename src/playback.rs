//! Playback session state machine and queue navigation.
//!
//! The engine owns the single playback session: lifecycle state, current
//! track, navigable queue, position, volume and mute. Commands arrive on the
//! bus; state only moves to Playing/Paused/Buffering when the bound media
//! resource acknowledges with a [`MediaEvent`], never optimistically. After
//! every observable change the engine publishes a [`SessionSnapshot`].

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::error::PlayerError;
use crate::media::{MediaBackend, MediaBinding};
use crate::model::Track;
use crate::notifier::Notifier;
use crate::protocol::{MediaEvent, Message, PlaybackMessage, SessionSnapshot};

/// Lifecycle of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// A resource is bound and asked to play but has not confirmed yet.
    Buffering,
    Playing,
    Paused,
}

/// Mutable session fields, kept apart from the engine so snapshots are a
/// straight read.
struct PlaybackSession {
    state: PlaybackState,
    current_track: Option<Arc<Track>>,
    queue: Vec<Arc<Track>>,
    current_time: f64,
    duration: f64,
    volume: f64,
    muted: bool,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            current_track: None,
            queue: Vec::new(),
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
        }
    }
}

/// Drives one playback session against a media backend.
pub struct PlaybackEngine<B: MediaBackend> {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    backend: B,
    notifier: Notifier,
    session: PlaybackSession,
    // At most one live binding; replaced bindings are dropped, which
    // releases the underlying resource.
    binding: Option<B::Binding>,
}

impl<B: MediaBackend> PlaybackEngine<B> {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        backend: B,
        notifier: Notifier,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            backend,
            notifier,
            session: PlaybackSession::default(),
            binding: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn current_track(&self) -> Option<&Arc<Track>> {
        self.session.current_track.as_ref()
    }

    pub fn handle_command(&mut self, command: PlaybackMessage) {
        match command {
            PlaybackMessage::LoadAndPlay { track, context } => {
                self.load_and_play(track, context)
            }
            PlaybackMessage::TogglePlayPause => self.toggle_play_pause(),
            PlaybackMessage::Pause => self.pause(),
            PlaybackMessage::Stop => self.stop(),
            PlaybackMessage::Next => self.next(),
            PlaybackMessage::Previous => self.previous(),
            PlaybackMessage::Seek(seconds) => self.seek(seconds),
            PlaybackMessage::SetVolume(volume) => self.set_volume(volume),
            PlaybackMessage::ToggleMute => self.toggle_mute(),
            // Published by this engine; nothing to do on receipt.
            PlaybackMessage::SessionChanged(_) => {}
        }
    }

    /// Makes `track` current and asks the backend to play it.
    ///
    /// With a context the queue is replaced wholesale; without one the queue
    /// collapses to just this track unless the track is already a queue
    /// member, in which case the queue is left alone so navigation keeps
    /// working mid-queue.
    pub fn load_and_play(&mut self, track: Arc<Track>, context: Option<Vec<Arc<Track>>>) {
        if track.file.is_empty() {
            let err = PlayerError::NoPlayableSource(track.title.clone());
            warn!("Playback: {}", err);
            self.notifier.error(&err.to_string());
            return;
        }

        // Release the previous resource before binding the next one.
        self.binding = None;

        match context {
            Some(context) => self.session.queue = context,
            None => {
                let in_queue = self
                    .session
                    .queue
                    .iter()
                    .any(|queued| queued.id == track.id);
                if !in_queue {
                    self.session.queue = vec![Arc::clone(&track)];
                }
            }
        }
        self.session.current_time = 0.0;
        self.session.duration = track.duration;
        self.session.current_track = Some(Arc::clone(&track));

        match self.backend.bind(&track.file, &track.mime_type) {
            Ok(mut binding) => {
                binding.set_volume(self.session.volume);
                binding.set_muted(self.session.muted);
                self.session.state = PlaybackState::Buffering;
                binding.play();
                self.binding = Some(binding);
                debug!("Playback: Loading '{}'", track.title);
            }
            Err(err) => {
                error!("Playback: Could not bind '{}': {}", track.title, err);
                self.notifier
                    .error(&format!("Could not play '{}'", track.title));
                self.session.state = PlaybackState::Stopped;
            }
        }
        self.publish_session();
    }

    pub fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Playing => self.session.state = PlaybackState::Playing,
            MediaEvent::Paused => {
                // A forced stop wins over a late pause acknowledgement.
                if self.session.state != PlaybackState::Stopped {
                    self.session.state = PlaybackState::Paused;
                }
            }
            MediaEvent::Waiting => self.session.state = PlaybackState::Buffering,
            MediaEvent::TimeUpdate { position } => self.session.current_time = position,
            MediaEvent::DurationChanged { duration } => self.session.duration = duration,
            MediaEvent::Ended => {
                if self.has_next() {
                    self.next();
                    return;
                }
                self.binding = None;
                self.session.state = PlaybackState::Stopped;
                self.session.current_time = 0.0;
                // The current track stays selected so play can restart it.
            }
            MediaEvent::Error(reason) => {
                error!("Playback: Media error: {}", reason);
                self.notifier.error("Playback failed");
                self.binding = None;
                self.session.state = PlaybackState::Stopped;
            }
        }
        self.publish_session();
    }

    /// Playing pauses, paused resumes, stopped restarts the current track
    /// from the beginning. No track selected means nothing to do.
    pub fn toggle_play_pause(&mut self) {
        match self.session.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => {
                if let Some(binding) = self.binding.as_mut() {
                    binding.play();
                }
            }
            PlaybackState::Stopped => {
                if let Some(track) = self.session.current_track.clone() {
                    self.load_and_play(track, None);
                }
            }
            PlaybackState::Buffering => {}
        }
    }

    pub fn pause(&mut self) {
        if let Some(binding) = self.binding.as_mut() {
            binding.pause();
        }
    }

    /// Forced stop: position resets and the state moves to Stopped without
    /// waiting for the resource to acknowledge.
    pub fn stop(&mut self) {
        if let Some(binding) = self.binding.as_mut() {
            binding.pause();
        }
        self.session.current_time = 0.0;
        self.session.state = PlaybackState::Stopped;
        self.publish_session();
    }

    pub fn seek(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        if let Some(binding) = self.binding.as_mut() {
            binding.seek(seconds);
        }
        self.session.current_time = seconds;
        self.publish_session();
    }

    /// Clamps to [0, 1]. Raising the volume above zero while muted also
    /// unmutes; setting it to zero leaves the mute flag alone.
    pub fn set_volume(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.session.volume = volume;
        if volume > 0.0 && self.session.muted {
            self.session.muted = false;
            if let Some(binding) = self.binding.as_mut() {
                binding.set_muted(false);
            }
        }
        if let Some(binding) = self.binding.as_mut() {
            binding.set_volume(volume);
        }
        self.publish_session();
    }

    /// Mute is independent of volume; the stored volume survives a
    /// mute/unmute cycle.
    pub fn toggle_mute(&mut self) {
        self.session.muted = !self.session.muted;
        if let Some(binding) = self.binding.as_mut() {
            binding.set_muted(self.session.muted);
        }
        self.publish_session();
    }

    /// Advances to the next queue member; a no-op at the tail or with no
    /// current track.
    pub fn next(&mut self) {
        if let Some(index) = self.current_index() {
            if let Some(next) = self.session.queue.get(index + 1) {
                self.load_and_play(Arc::clone(next), None);
            }
        }
    }

    /// Steps back to the previous queue member; a no-op at the head.
    pub fn previous(&mut self) {
        if let Some(index) = self.current_index() {
            if index > 0 {
                let previous = Arc::clone(&self.session.queue[index - 1]);
                self.load_and_play(previous, None);
            }
        }
    }

    /// Queue position of the current track, matched by id.
    fn current_index(&self) -> Option<usize> {
        let current = self.session.current_track.as_ref()?;
        self.session
            .queue
            .iter()
            .position(|queued| queued.id == current.id)
    }

    fn has_next(&self) -> bool {
        self.current_index()
            .is_some_and(|index| index + 1 < self.session.queue.len())
    }

    fn has_previous(&self) -> bool {
        self.current_index().is_some_and(|index| index > 0)
    }

    fn publish_session(&self) {
        let snapshot = SessionSnapshot {
            state: self.session.state,
            current_track_id: self
                .session
                .current_track
                .as_ref()
                .map(|track| track.id.clone()),
            current_track_title: self
                .session
                .current_track
                .as_ref()
                .map(|track| track.title.clone()),
            queue_ids: self
                .session
                .queue
                .iter()
                .map(|track| track.id.clone())
                .collect(),
            current_index: self.current_index(),
            has_next: self.has_next(),
            has_previous: self.has_previous(),
            current_time: self.session.current_time,
            duration: self.session.duration,
            volume: self.session.volume,
            muted: self.session.muted,
        };
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::SessionChanged(snapshot)));
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Playback(PlaybackMessage::SessionChanged(_))) => {}
                Ok(Message::Playback(command)) => self.handle_command(command),
                Ok(Message::Media(event)) => self.handle_media_event(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("PlaybackEngine: Bus lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("PlaybackEngine: Bus closed, shutting down");
                    break;
                }
            }
        }
    }
}
