//! Infinite-scroll trigger
//!
//! Turns sentinel visibility changes into next-page requests. Fires on the
//! not-intersecting to intersecting edge only, never while a fetch is in
//! flight, and never once the feed is exhausted.

/// Edge detector for the end-of-list sentinel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollTrigger {
    intersecting: bool,
    in_flight: bool,
    exhausted: bool,
}

impl ScrollTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visibility change; returns true when a fetch should start
    ///
    /// A `true` return already marks the fetch as in flight.
    pub fn on_visibility(&mut self, intersecting: bool) -> bool {
        let rising = intersecting && !self.intersecting;
        self.intersecting = intersecting;

        if !rising || self.in_flight || self.exhausted {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// A fetch was started by something other than the sentinel
    pub fn begin_fetch(&mut self) {
        self.in_flight = true;
    }

    /// The in-flight fetch settled, or the feed was replaced
    ///
    /// Visibility is kept, so a sentinel still on screen needs to leave and
    /// come back before it fires again.
    pub fn finish_fetch(&mut self, has_more: bool) {
        self.in_flight = false;
        self.exhausted = !has_more;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_rising_edge() {
        let mut trigger = ScrollTrigger::new();
        assert!(trigger.on_visibility(true));
        trigger.finish_fetch(true);
        // Still visible: no new edge
        assert!(!trigger.on_visibility(true));
        assert!(!trigger.on_visibility(false));
        assert!(trigger.on_visibility(true));
    }

    #[test]
    fn test_jitter_while_in_flight_fires_once() {
        let mut trigger = ScrollTrigger::new();
        let fired = (0..10)
            .map(|i| trigger.on_visibility(i % 2 == 0))
            .filter(|fired| *fired)
            .count();
        assert_eq!(fired, 1);
        assert!(trigger.is_in_flight());
    }

    #[test]
    fn test_stops_when_exhausted() {
        let mut trigger = ScrollTrigger::new();
        assert!(trigger.on_visibility(true));
        trigger.finish_fetch(false);
        assert!(!trigger.on_visibility(false));
        assert!(!trigger.on_visibility(true));
        assert!(trigger.is_exhausted());

        // A reload with more pages re-enables it
        trigger.finish_fetch(true);
        assert!(!trigger.on_visibility(true));
        assert!(!trigger.on_visibility(false));
        assert!(trigger.on_visibility(true));
    }

    #[test]
    fn test_external_fetch_blocks_sentinel() {
        let mut trigger = ScrollTrigger::new();
        trigger.begin_fetch();
        assert!(!trigger.on_visibility(true));
    }
}
