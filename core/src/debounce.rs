//! Trailing-edge debouncer driven by explicit instants.
//!
//! Each `schedule` pushes the deadline to `now + delay`; `fire` reports
//! true once the latest deadline has passed. A burst of schedules inside
//! one delay window therefore fires exactly once.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Consume the pending trigger if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_fires_once_after_last_trigger() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.schedule(t0);
        d.schedule(t0 + ms(50));
        d.schedule(t0 + ms(100));

        assert!(!d.fire(t0 + ms(300)), "must wait for the last trigger's window");
        assert!(!d.fire(t0 + ms(399)));
        assert!(d.fire(t0 + ms(400)));
        assert!(!d.fire(t0 + ms(800)), "a burst fires exactly once");
    }

    #[test]
    fn idle_debouncer_never_fires() {
        let mut d = Debouncer::new(ms(300));
        assert!(d.deadline().is_none());
        assert!(!d.fire(Instant::now() + ms(10_000)));
    }

    #[test]
    fn deadline_tracks_latest_trigger() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(300));
        d.schedule(t0);
        d.schedule(t0 + ms(120));
        assert_eq!(d.deadline(), Some(t0 + ms(420)));
        assert!(d.fire(t0 + ms(420)));
        assert!(d.deadline().is_none());
    }
}
