use crossbeam_channel::{Receiver, Sender};

use super::PlaybackState;
use crate::catalog::Track;

/// Notifications fanned out to every observer surface.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Any observable field of the session changed.
    StateChanged(PlaybackState),
    /// The current track changed identity (skip, auto-advance, catalog swap).
    TrackChanged { index: usize, track: Track },
    /// A catalog refresh replaced the playable list.
    CatalogReplaced { playable: usize },
    /// Recoverable failure worth showing to the user.
    Notice(String),
}

/// Unbounded fan-out; disconnected subscribers are dropped on the next send.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn publish(&mut self, event: PlaybackEvent) {
        match self.subscribers.len() {
            0 => {}
            1 => {
                if self.subscribers[0].send(event).is_err() {
                    self.subscribers.clear();
                }
            }
            _ => self
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_events_in_order() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(PlaybackEvent::Notice("one".into()));
        bus.publish(PlaybackEvent::CatalogReplaced { playable: 2 });

        for receiver in [&first, &second] {
            assert_eq!(receiver.try_recv().unwrap(), PlaybackEvent::Notice("one".into()));
            assert_eq!(receiver.try_recv().unwrap(), PlaybackEvent::CatalogReplaced { playable: 2 });
            assert!(receiver.try_recv().is_err());
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(PlaybackEvent::Notice("hello".into()));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
