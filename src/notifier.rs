//! Fire-and-forget user-facing notifications with timed dismissal.
//!
//! Repositories and the playback engine report noteworthy outcomes through a
//! cloneable [`Notifier`]; the [`NotificationCenter`] manager keeps the
//! active toasts and dismisses each one after a fixed delay, using a
//! generation-counted timeout message so stale timers never remove a newer
//! toast.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::protocol::{Message, NotificationKind, NotificationMessage};

/// Default auto-dismiss delay.
pub const DISMISS_AFTER_MS: u64 = 3_000;

/// Cloneable handle used by the core to emit notifications. Senders never
/// depend on delivery, ordering, or a return value.
#[derive(Clone)]
pub struct Notifier {
    bus_producer: Sender<Message>,
}

impl Notifier {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self { bus_producer }
    }

    pub fn success(&self, text: &str) {
        self.show(text, NotificationKind::Success);
    }

    pub fn error(&self, text: &str) {
        self.show(text, NotificationKind::Error);
    }

    fn show(&self, text: &str, kind: NotificationKind) {
        let _ = self
            .bus_producer
            .send(Message::Notification(NotificationMessage::Show {
                text: text.to_string(),
                kind,
            }));
    }
}

/// One active toast.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub generation: u64,
    pub text: String,
    pub kind: NotificationKind,
}

/// Manages the active toast list on its own thread.
pub struct NotificationCenter {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    active: Vec<Toast>,
    next_generation: u64,
    dismiss_after: Duration,
}

impl NotificationCenter {
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        Self::with_dismiss_after(
            bus_consumer,
            bus_producer,
            Duration::from_millis(DISMISS_AFTER_MS),
        )
    }

    pub fn with_dismiss_after(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        dismiss_after: Duration,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            active: Vec::new(),
            next_generation: 0,
            dismiss_after,
        }
    }

    /// Currently visible toasts, oldest first.
    pub fn active_toasts(&self) -> &[Toast] {
        &self.active
    }

    pub fn handle_message(&mut self, message: NotificationMessage) {
        match message {
            NotificationMessage::Show { text, kind } => {
                let generation = self.next_generation;
                self.next_generation += 1;

                match kind {
                    NotificationKind::Success => info!("Notification: {}", text),
                    NotificationKind::Error => warn!("Notification: {}", text),
                }
                self.active.push(Toast {
                    generation,
                    text,
                    kind,
                });

                let bus_producer = self.bus_producer.clone();
                let dismiss_after = self.dismiss_after;
                thread::spawn(move || {
                    thread::sleep(dismiss_after);
                    let _ = bus_producer.send(Message::Notification(
                        NotificationMessage::DismissElapsed { generation },
                    ));
                });
            }
            NotificationMessage::DismissElapsed { generation } => {
                self.active.retain(|toast| toast.generation != generation);
            }
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Notification(message)) => self.handle_message(message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("NotificationCenter: Bus lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("NotificationCenter: Bus closed, shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    fn center() -> NotificationCenter {
        let (bus_sender, _) = broadcast::channel(64);
        let receiver = bus_sender.subscribe();
        NotificationCenter::with_dismiss_after(receiver, bus_sender, Duration::from_millis(10))
    }

    #[test]
    fn test_show_assigns_increasing_generations() {
        let mut center = center();
        center.handle_message(NotificationMessage::Show {
            text: "saved".to_string(),
            kind: NotificationKind::Success,
        });
        center.handle_message(NotificationMessage::Show {
            text: "failed".to_string(),
            kind: NotificationKind::Error,
        });

        let generations: Vec<u64> = center
            .active_toasts()
            .iter()
            .map(|toast| toast.generation)
            .collect();
        assert_eq!(generations, vec![0, 1]);
    }

    #[test]
    fn test_dismiss_removes_only_the_matching_generation() {
        let mut center = center();
        center.handle_message(NotificationMessage::Show {
            text: "first".to_string(),
            kind: NotificationKind::Success,
        });
        center.handle_message(NotificationMessage::Show {
            text: "second".to_string(),
            kind: NotificationKind::Success,
        });

        center.handle_message(NotificationMessage::DismissElapsed { generation: 0 });
        assert_eq!(center.active_toasts().len(), 1);
        assert_eq!(center.active_toasts()[0].text, "second");

        // A stale timer for an already-dismissed toast is a no-op.
        center.handle_message(NotificationMessage::DismissElapsed { generation: 0 });
        assert_eq!(center.active_toasts().len(), 1);
    }

    #[test]
    fn test_notifier_emits_show_messages_on_the_bus() {
        let (bus_sender, mut receiver) = broadcast::channel(8);
        let notifier = Notifier::new(bus_sender);

        notifier.success("Track saved");
        notifier.error("Already in playlist");

        match receiver.try_recv() {
            Ok(Message::Notification(NotificationMessage::Show { text, kind })) => {
                assert_eq!(text, "Track saved");
                assert_eq!(kind, NotificationKind::Success);
            }
            other => panic!("expected Show, got {:?}", other),
        }
        match receiver.try_recv() {
            Ok(Message::Notification(NotificationMessage::Show { text, kind })) => {
                assert_eq!(text, "Already in playlist");
                assert_eq!(kind, NotificationKind::Error);
            }
            other => panic!("expected Show, got {:?}", other),
        }
    }
}
