//! Network-idle detection.
//!
//! The browser backend feeds request lifecycle events into
//! [`NetworkActivity`] and polls [`IdleTracker`] with snapshots of it. A page
//! is idle once the document is complete, nothing is in flight and no new
//! request has started for the whole quiet window.

use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Requests seen on one page
#[derive(Debug, Default)]
pub struct NetworkActivity {
    in_flight: HashSet<String>,
    started: u64,
}

impl NetworkActivity {
    pub fn request_started(&mut self, request_id: &str) {
        // Redirects reuse the id of the original request.
        if self.in_flight.insert(request_id.to_string()) {
            self.started += 1;
        }
    }

    pub fn request_settled(&mut self, request_id: &str) {
        self.in_flight.remove(request_id);
    }

    pub fn snapshot(&self, document_complete: bool) -> NetworkSnapshot {
        NetworkSnapshot {
            document_complete,
            in_flight: self.in_flight.len(),
            started: self.started,
        }
    }
}

/// Point-in-time view of a page's network state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub document_complete: bool,
    pub in_flight: usize,
    /// Total requests ever started; a change means activity since the last poll
    pub started: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Busy,
    Idle,
    TimedOut,
}

/// Quiet-window state machine, driven by explicit timestamps.
#[derive(Debug)]
pub struct IdleTracker {
    quiet: Duration,
    deadline: Instant,
    quiet_since: Option<Instant>,
    last_started: Option<u64>,
}

impl IdleTracker {
    pub fn new(started: Instant, quiet: Duration, timeout: Duration) -> Self {
        Self {
            quiet,
            deadline: started + timeout,
            quiet_since: None,
            last_started: None,
        }
    }

    pub fn observe(&mut self, now: Instant, snapshot: NetworkSnapshot) -> IdleState {
        let new_activity = self.last_started != Some(snapshot.started);
        self.last_started = Some(snapshot.started);

        if !snapshot.document_complete || snapshot.in_flight > 0 || new_activity {
            self.quiet_since = None;
        }

        if snapshot.document_complete && snapshot.in_flight == 0 {
            let since = *self.quiet_since.get_or_insert(now);
            if now.duration_since(since) >= self.quiet {
                return IdleState::Idle;
            }
        }

        if now >= self.deadline {
            IdleState::TimedOut
        } else {
            IdleState::Busy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(500);
    const TIMEOUT: Duration = Duration::from_secs(30);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn quiet_page_goes_idle_after_window() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(t0, QUIET, TIMEOUT);
        let activity = NetworkActivity::default();

        assert_eq!(tracker.observe(t0, activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(499), activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(500), activity.snapshot(true)), IdleState::Idle);
    }

    #[test]
    fn in_flight_request_holds_off_idle() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(t0, QUIET, TIMEOUT);
        let mut activity = NetworkActivity::default();

        assert_eq!(tracker.observe(t0, activity.snapshot(true)), IdleState::Busy);
        // fetch() fired from onload, after the document is already complete
        activity.request_started("slow-2s");
        for step in 1..=20 {
            let now = t0 + ms(100 * step);
            assert_eq!(tracker.observe(now, activity.snapshot(true)), IdleState::Busy);
        }

        activity.request_settled("slow-2s");
        let done = t0 + ms(2100);
        assert_eq!(tracker.observe(done, activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(done + ms(499), activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(done + ms(500), activity.snapshot(true)), IdleState::Idle);
    }

    #[test]
    fn request_finishing_between_polls_restarts_window() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(t0, QUIET, TIMEOUT);
        let mut activity = NetworkActivity::default();

        tracker.observe(t0, activity.snapshot(true));
        activity.request_started("img");
        activity.request_settled("img");
        assert_eq!(tracker.observe(t0 + ms(400), activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(600), activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(900), activity.snapshot(true)), IdleState::Idle);
    }

    #[test]
    fn incomplete_document_is_never_idle() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(t0, QUIET, ms(1000));
        let activity = NetworkActivity::default();

        assert_eq!(tracker.observe(t0 + ms(600), activity.snapshot(false)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(1000), activity.snapshot(false)), IdleState::TimedOut);
    }

    #[test]
    fn stuck_request_times_out() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(t0, QUIET, ms(1000));
        let mut activity = NetworkActivity::default();
        activity.request_started("event-stream");

        assert_eq!(tracker.observe(t0 + ms(999), activity.snapshot(true)), IdleState::Busy);
        assert_eq!(tracker.observe(t0 + ms(1000), activity.snapshot(true)), IdleState::TimedOut);
    }

    #[test]
    fn redirects_and_failures_are_counted_once() {
        let mut activity = NetworkActivity::default();
        activity.request_started("a");
        activity.request_started("a");
        activity.request_started("b");
        activity.request_settled("b");
        let snap = activity.snapshot(true);
        assert_eq!(snap.in_flight, 1);
        assert_eq!(snap.started, 2);
    }
}
