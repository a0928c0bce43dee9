use std::time::Duration;

use super::{MediaEvent, SampleTap};

/// Turns the tap's position and end-of-stream flag into [`MediaEvent`]s.
///
/// Position reports are only emitted when the position moved, and `Ended`
/// fires once per source until a seek or a new source reopens the stream.
#[derive(Debug)]
pub struct ProgressTracker {
    tap: SampleTap,
    events: Vec<MediaEvent>,
    last_position: Option<Duration>,
    ended_reported: bool,
    active: bool,
}

impl ProgressTracker {
    pub fn new(tap: SampleTap) -> Self {
        Self {
            tap,
            events: Vec::new(),
            last_position: None,
            ended_reported: false,
            active: false,
        }
    }

    pub fn tap(&self) -> &SampleTap {
        &self.tap
    }

    /// A new source is being fetched. Signals queued for the previous one
    /// are dropped and nothing is reported until it opens.
    pub fn loading(&mut self) {
        self.events.clear();
        self.last_position = None;
        self.ended_reported = false;
        self.active = false;
    }

    /// A new source opened and feeds the tap.
    pub fn opened(&mut self, duration: Option<Duration>) {
        self.loading();
        self.active = true;
        if let Some(duration) = duration {
            self.events.push(MediaEvent::MetadataLoaded { duration });
        }
    }

    pub fn seeked(&mut self, position: Duration) {
        self.ended_reported = false;
        self.last_position = Some(position);
        self.events.push(MediaEvent::TimeUpdate { position });
    }

    pub fn failed(&mut self, reason: impl Into<String>) {
        self.loading();
        self.events.push(MediaEvent::LoadFailed { reason: reason.into() });
    }

    /// Drains queued signals, oldest first.
    pub fn poll(&mut self) -> Vec<MediaEvent> {
        if self.active {
            let position = self.tap.position();
            if self.last_position != Some(position) {
                self.events.push(MediaEvent::TimeUpdate { position });
                self.last_position = Some(position);
            }

            if self.tap.is_finished() && !self.ended_reported {
                self.ended_reported = true;
                self.events.push(MediaEvent::Ended);
            }
        }

        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended_count(events: &[MediaEvent]) -> usize {
        events.iter().filter(|e| **e == MediaEvent::Ended).count()
    }

    fn opened_tracker() -> (ProgressTracker, SampleTap, u64) {
        let tap = SampleTap::new(64);
        let mut tracker = ProgressTracker::new(tap.clone());
        let session = tap.begin_session(1000, Duration::ZERO);
        tracker.opened(Some(Duration::from_secs(3)));
        (tracker, tap, session)
    }

    #[test]
    fn ended_fires_once_per_session() {
        let (mut tracker, tap, session) = opened_tracker();
        tap.push(session, &[0.1; 100]);
        tap.mark_finished(session);

        let first = tracker.poll();
        assert_eq!(first[0], MediaEvent::MetadataLoaded { duration: Duration::from_secs(3) });
        assert_eq!(ended_count(&first), 1);
        assert_eq!(ended_count(&tracker.poll()), 0);
        assert_eq!(ended_count(&tracker.poll()), 0);
    }

    #[test]
    fn unchanged_position_is_not_reported_twice() {
        let (mut tracker, tap, session) = opened_tracker();
        tap.push(session, &[0.1; 250]);

        let first = tracker.poll();
        assert!(first.contains(&MediaEvent::TimeUpdate { position: Duration::from_millis(250) }));
        assert!(tracker.poll().is_empty());

        tap.push(session, &[0.1; 250]);
        assert_eq!(
            tracker.poll(),
            vec![MediaEvent::TimeUpdate { position: Duration::from_millis(500) }]
        );
    }

    #[test]
    fn loading_drops_signals_of_the_previous_source() {
        let (mut tracker, tap, session) = opened_tracker();
        tap.push(session, &[0.1; 100]);
        tap.mark_finished(session);
        tracker.seeked(Duration::from_secs(1));

        tracker.loading();
        assert!(tracker.poll().is_empty());

        let next = tap.begin_session(1000, Duration::ZERO);
        tracker.opened(Some(Duration::from_secs(9)));
        tap.push(next, &[0.1; 10]);
        let events = tracker.poll();
        assert_eq!(
            events,
            vec![
                MediaEvent::MetadataLoaded { duration: Duration::from_secs(9) },
                MediaEvent::TimeUpdate { position: Duration::from_millis(10) },
            ]
        );
    }

    #[test]
    fn seeking_rearms_end_of_stream() {
        let (mut tracker, tap, session) = opened_tracker();
        tap.mark_finished(session);
        assert_eq!(ended_count(&tracker.poll()), 1);

        // The source reopens its session at the seek target.
        let reopened = tap.begin_session(1000, Duration::from_secs(2));
        tracker.seeked(Duration::from_secs(2));
        let events = tracker.poll();
        assert_eq!(events, vec![MediaEvent::TimeUpdate { position: Duration::from_secs(2) }]);

        tap.push(reopened, &[0.1; 1000]);
        tap.mark_finished(reopened);
        let events = tracker.poll();
        assert_eq!(ended_count(&events), 1);
        assert!(events.contains(&MediaEvent::TimeUpdate { position: Duration::from_secs(3) }));
    }

    #[test]
    fn failures_replace_pending_signals() {
        let (mut tracker, _tap, _session) = opened_tracker();
        tracker.failed("connection reset");
        assert_eq!(
            tracker.poll(),
            vec![MediaEvent::LoadFailed { reason: "connection reset".to_string() }]
        );
        assert!(tracker.poll().is_empty());
    }
}
