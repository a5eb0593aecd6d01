//! Highlight controller - scrolls a deep-linked entity into view once
//!
//! Owns the `idle -> armed -> fired` state machine:
//! - `arm` when a resolution becomes active (cancels any pending scroll)
//! - `observe_render` after each render of the list, with whether the
//!   highlighted node exists
//! - `tick` from the event loop; fires the scroll after the settle delay
//!
//! Observation is driven by renders, never by a timer loop. A target that
//! never shows up (collapsed replies) leaves the controller armed but dormant.

use std::time::{Duration, Instant};

use super::model::CommentId;
use crate::constants;

/// How the list should scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
}

/// Command to scroll a node into view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollIntoView {
    pub target: CommentId,
    pub behavior: ScrollBehavior,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HighlightPhase {
    Idle,
    Armed {
        target: CommentId,
        /// Absent-node renders seen so far
        observations: u32,
        /// When the scroll should fire, once the node has been seen
        due_at: Option<Instant>,
        /// Stopped watching; waits for the next `arm`
        dormant: bool,
    },
    Fired {
        target: CommentId,
    },
}

/// Snapshot of the highlight for the UI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightStatus {
    pub highlight_id: Option<CommentId>,
    pub fired: bool,
}

/// Scroll/highlight state machine
#[derive(Debug, Clone)]
pub struct HighlightController {
    phase: HighlightPhase,
    settle_delay: Duration,
    max_observations: u32,
}

impl HighlightController {
    pub fn new(settle_delay: Duration, max_observations: u32) -> Self {
        Self {
            phase: HighlightPhase::Idle,
            settle_delay,
            max_observations,
        }
    }

    /// Start watching for `target`, dropping any scroll still pending
    pub fn arm(&mut self, target: CommentId) {
        if let HighlightPhase::Armed {
            target: previous,
            due_at: Some(_),
            ..
        } = &self.phase
        {
            tracing::debug!(%previous, next = %target, "Cancelling pending scroll");
        }
        self.phase = HighlightPhase::Armed {
            target,
            observations: 0,
            due_at: None,
            dormant: false,
        };
    }

    /// Back to idle (reference cleared)
    pub fn reset(&mut self) {
        self.phase = HighlightPhase::Idle;
    }

    /// Record one render of the list
    ///
    /// `present` says whether a node tagged with the highlight id exists.
    /// `feed_settled` says whether the feed has finished loading with no
    /// fetch pending, after which an absent node is not worth watching for.
    pub fn observe_render(&mut self, present: bool, feed_settled: bool, now: Instant) {
        let max_observations = self.max_observations;
        let settle_delay = self.settle_delay;
        let HighlightPhase::Armed {
            target,
            observations,
            due_at,
            dormant,
        } = &mut self.phase
        else {
            return;
        };
        if *dormant || due_at.is_some() {
            return;
        }

        if present {
            *due_at = Some(now + settle_delay);
            tracing::debug!(%target, "Highlight target rendered, scroll scheduled");
            return;
        }

        *observations += 1;
        if feed_settled || *observations >= max_observations {
            *dormant = true;
            tracing::debug!(
                %target,
                observations = *observations,
                "Highlight target not rendered, giving up"
            );
        }
    }

    /// Fire the scheduled scroll if its delay has elapsed
    pub fn tick(&mut self, now: Instant) -> Option<ScrollIntoView> {
        let HighlightPhase::Armed {
            target,
            due_at: Some(due),
            ..
        } = &self.phase
        else {
            return None;
        };
        if now < *due {
            return None;
        }

        let target = target.clone();
        tracing::info!(%target, "Scrolling highlight into view");
        self.phase = HighlightPhase::Fired {
            target: target.clone(),
        };
        Some(ScrollIntoView {
            target,
            behavior: ScrollBehavior::Smooth,
        })
    }

    /// When the pending scroll is due, for event loops that sleep until then
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            HighlightPhase::Armed { due_at, .. } => *due_at,
            _ => None,
        }
    }

    /// Whether the controller is armed but no longer acting
    pub fn is_dormant(&self) -> bool {
        matches!(self.phase, HighlightPhase::Armed { dormant: true, .. })
    }

    pub fn status(&self) -> HighlightStatus {
        match &self.phase {
            HighlightPhase::Idle => HighlightStatus::default(),
            HighlightPhase::Armed { target, .. } => HighlightStatus {
                highlight_id: Some(target.clone()),
                fired: false,
            },
            HighlightPhase::Fired { target } => HighlightStatus {
                highlight_id: Some(target.clone()),
                fired: true,
            },
        }
    }
}

impl Default for HighlightController {
    fn default() -> Self {
        Self::new(
            constants::feed::SETTLE_DELAY,
            constants::feed::MAX_OBSERVATIONS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> HighlightController {
        HighlightController::new(Duration::from_millis(100), 3)
    }

    #[test]
    fn test_fires_once_after_settle_delay() {
        let mut hl = controller();
        let t0 = Instant::now();
        hl.arm(CommentId::new("item#18"));
        assert_eq!(hl.status().highlight_id, Some(CommentId::new("item#18")));

        hl.observe_render(true, false, t0);
        assert_eq!(hl.tick(t0 + Duration::from_millis(50)), None);
        assert_eq!(hl.next_deadline(), Some(t0 + Duration::from_millis(100)));

        let scroll = hl.tick(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(scroll.target.as_str(), "item#18");
        assert_eq!(scroll.behavior, ScrollBehavior::Smooth);
        assert!(hl.status().fired);

        // Later renders and ticks do nothing
        hl.observe_render(true, true, t0 + Duration::from_secs(1));
        assert_eq!(hl.tick(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_rerender_does_not_push_deadline_back() {
        let mut hl = controller();
        let t0 = Instant::now();
        hl.arm(CommentId::new("c3"));
        hl.observe_render(true, false, t0);
        hl.observe_render(true, false, t0 + Duration::from_millis(90));
        assert!(hl.tick(t0 + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_missing_node_goes_dormant_after_bounded_observations() {
        let mut hl = controller();
        let t0 = Instant::now();
        hl.arm(CommentId::new("r7"));
        hl.observe_render(false, false, t0);
        hl.observe_render(false, false, t0);
        assert!(!hl.is_dormant());
        hl.observe_render(false, false, t0);
        assert!(hl.is_dormant());

        // Even if the node shows up later, a dormant controller stays quiet
        hl.observe_render(true, false, t0);
        assert_eq!(hl.tick(t0 + Duration::from_secs(5)), None);
        let status = hl.status();
        assert_eq!(status.highlight_id, Some(CommentId::new("r7")));
        assert!(!status.fired);
    }

    #[test]
    fn test_settled_feed_stops_observation_immediately() {
        let mut hl = controller();
        hl.arm(CommentId::new("r7"));
        hl.observe_render(false, true, Instant::now());
        assert!(hl.is_dormant());
    }

    #[test]
    fn test_rearm_cancels_pending_scroll() {
        let mut hl = controller();
        let t0 = Instant::now();
        hl.arm(CommentId::new("c1"));
        hl.observe_render(true, false, t0);
        hl.arm(CommentId::new("c2"));
        assert_eq!(hl.tick(t0 + Duration::from_secs(1)), None);

        hl.observe_render(true, false, t0 + Duration::from_secs(1));
        let scroll = hl.tick(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(scroll.target.as_str(), "c2");
    }

    #[test]
    fn test_idle_ignores_everything() {
        let mut hl = controller();
        hl.observe_render(true, false, Instant::now());
        assert_eq!(hl.tick(Instant::now()), None);
        assert_eq!(hl.status(), HighlightStatus::default());
        hl.arm(CommentId::new("c1"));
        hl.reset();
        assert_eq!(hl.status(), HighlightStatus::default());
    }
}
