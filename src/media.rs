//! Media backend seam: transient payload bindings and their event stream.
//!
//! The playback engine never decodes audio itself. It asks a
//! [`MediaBackend`] to bind the current track's payload, drives the returned
//! [`MediaBinding`] with commands, and observes readiness/progress/end/error
//! as [`MediaEvent`]s on the bus. Dropping a binding releases the underlying
//! resource; at most one binding is live per engine at any time.
//!
//! [`ClockBackend`] is the headless implementation shipped with the crate:
//! it probes the payload for its duration and advances the play position on
//! a wall-clock thread, emitting the full event vocabulary without touching
//! an output device.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use tokio::sync::broadcast::Sender;

use crate::error::PlayerError;
use crate::intake;
use crate::protocol::{MediaEvent, Message};

/// Factory for transient payload bindings.
pub trait MediaBackend {
    type Binding: MediaBinding;

    /// Establishes a new binding to an audio payload. The caller must drop
    /// any previous binding first; backends may assume exclusive ownership
    /// of the playback resource.
    fn bind(&mut self, payload: &[u8], mime_type: &str) -> Result<Self::Binding, PlayerError>;
}

/// Live, resource-owning handle to one loaded payload. Commands are
/// acknowledged asynchronously through [`MediaEvent`]s; dropping the binding
/// releases the resource.
pub trait MediaBinding {
    fn play(&mut self);
    fn pause(&mut self);
    /// Absolute position in seconds. No bounds-checking beyond what the
    /// resource itself enforces.
    fn seek(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
}

/// Headless backend that simulates playback against the wall clock.
pub struct ClockBackend {
    bus_producer: Sender<Message>,
    tick_interval: Duration,
}

impl ClockBackend {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self::with_tick_interval(bus_producer, Duration::from_millis(200))
    }

    pub fn with_tick_interval(bus_producer: Sender<Message>, tick_interval: Duration) -> Self {
        Self {
            bus_producer,
            tick_interval,
        }
    }
}

impl MediaBackend for ClockBackend {
    type Binding = ClockBinding;

    fn bind(&mut self, payload: &[u8], mime_type: &str) -> Result<ClockBinding, PlayerError> {
        if payload.is_empty() {
            return Err(PlayerError::MediaResource("empty payload".to_string()));
        }
        // Duration probed from the payload; 0 when unprobeable, in which
        // case the simulated track ends on the first tick after play.
        let duration = intake::probe_duration(payload, mime_type).unwrap_or(0.0);
        debug!(
            "ClockBackend: Bound payload of {} bytes ({}), duration {:.1}s",
            payload.len(),
            mime_type,
            duration
        );

        let (control, commands) = mpsc::channel();
        let worker = ClockWorker {
            bus_producer: self.bus_producer.clone(),
            commands,
            tick_interval: self.tick_interval,
            duration,
            position: 0.0,
            playing: false,
            last_tick: Instant::now(),
        };
        thread::spawn(move || worker.run());
        Ok(ClockBinding { control })
    }
}

enum ClockCommand {
    Play,
    Pause,
    Seek(f64),
    Release,
}

/// Binding produced by [`ClockBackend`]; drop to release the worker.
pub struct ClockBinding {
    control: mpsc::Sender<ClockCommand>,
}

impl MediaBinding for ClockBinding {
    fn play(&mut self) {
        let _ = self.control.send(ClockCommand::Play);
    }

    fn pause(&mut self) {
        let _ = self.control.send(ClockCommand::Pause);
    }

    fn seek(&mut self, seconds: f64) {
        let _ = self.control.send(ClockCommand::Seek(seconds));
    }

    fn set_volume(&mut self, volume: f64) {
        // No audible output; recorded for trace diagnostics only.
        trace!("ClockBinding: Volume set to {:.2}", volume);
    }

    fn set_muted(&mut self, muted: bool) {
        trace!("ClockBinding: Muted set to {}", muted);
    }
}

impl Drop for ClockBinding {
    fn drop(&mut self) {
        let _ = self.control.send(ClockCommand::Release);
    }
}

struct ClockWorker {
    bus_producer: Sender<Message>,
    commands: mpsc::Receiver<ClockCommand>,
    tick_interval: Duration,
    duration: f64,
    position: f64,
    playing: bool,
    last_tick: Instant,
}

impl ClockWorker {
    fn run(mut self) {
        // Idle bindings wake rarely; playing ones tick at the configured
        // progress interval.
        let idle_wait = Duration::from_millis(500);
        loop {
            let wait = if self.playing {
                self.tick_interval
            } else {
                idle_wait
            };
            match self.commands.recv_timeout(wait) {
                Ok(ClockCommand::Play) => {
                    if !self.playing {
                        self.playing = true;
                        self.last_tick = Instant::now();
                        self.emit(MediaEvent::DurationChanged {
                            duration: self.duration,
                        });
                        self.emit(MediaEvent::Playing);
                    }
                }
                Ok(ClockCommand::Pause) => {
                    if self.playing {
                        self.advance();
                        self.playing = false;
                        self.emit(MediaEvent::Paused);
                    }
                }
                Ok(ClockCommand::Seek(seconds)) => {
                    self.position = seconds.max(0.0);
                    self.last_tick = Instant::now();
                    self.emit(MediaEvent::TimeUpdate {
                        position: self.position,
                    });
                }
                Ok(ClockCommand::Release) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if self.playing {
                        self.advance();
                        self.emit(MediaEvent::TimeUpdate {
                            position: self.position,
                        });
                        if self.position >= self.duration {
                            self.emit(MediaEvent::Ended);
                            break;
                        }
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn advance(&mut self) {
        let now = Instant::now();
        self.position += now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        if self.position > self.duration {
            self.position = self.duration;
        }
    }

    fn emit(&self, event: MediaEvent) {
        let _ = self.bus_producer.send(Message::Media(event));
    }
}
