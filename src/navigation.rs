//! Pane navigation: intake, presentation and end panes with timed,
//! supersedable transitions.

use crate::model::{AudioSources, BreakdownMap, Pane, Slide, SlideDirection};
use crate::scheduler::{Scheduler, TimerId};
use tracing::{debug, info};

pub const COMMIT_DELAY_MS: u64 = 300;
pub const CLEAR_DELAY_MS: u64 = 1000;

/// The gate on leaving the intake pane.
pub fn is_ready(sources: &AudioSources, breakdown: &BreakdownMap) -> bool {
    sources.is_loaded() && !breakdown.is_default_placeholder()
}

/// Pure transition table. `None` means the request is a no-op.
pub fn destination(current: Pane, slide: Slide, ready: bool) -> Option<Pane> {
    match (current, slide) {
        (Pane::Intro, Slide::Right) if ready => Some(Pane::Content),
        (Pane::Content, Slide::Right) => Some(Pane::End),
        (Pane::Content, Slide::Left) => Some(Pane::Intro),
        (Pane::End, Slide::Left) => Some(Pane::Content),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavRequest {
    pub from: Pane,
    pub to: Pane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    Committed { from: Pane, to: Pane },
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavPhase {
    Commit(Pane),
    Clear,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    pane: Pane,
    target: Option<Pane>,
    direction: SlideDirection,
    transition_active: bool,
    commit_timer: Option<TimerId>,
    clear_timer: Option<TimerId>,
    timers: Scheduler<NavPhase>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            pane: Pane::Intro,
            target: None,
            direction: SlideDirection::None,
            transition_active: false,
            commit_timer: None,
            clear_timer: None,
            timers: Scheduler::default(),
        }
    }
}

impl Navigator {
    /// The committed pane.
    pub fn pane(&self) -> Pane {
        self.pane
    }

    /// Destination of the transition in flight, until it commits.
    pub fn target(&self) -> Option<Pane> {
        self.target
    }

    pub fn direction(&self) -> SlideDirection {
        self.direction
    }

    /// While true, positional changes animate; data-driven resets wait.
    pub fn transition_active(&self) -> bool {
        self.transition_active
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Starts a transition if the table permits one, replacing any transition
    /// still in flight.
    pub fn request(&mut self, slide: Slide, ready: bool, now_ms: u64) -> Option<NavRequest> {
        let Some(to) = destination(self.pane, slide, ready) else {
            debug!(pane = ?self.pane, ?slide, ready, "slide request ignored");
            return None;
        };

        for timer in [self.commit_timer.take(), self.clear_timer.take()]
            .into_iter()
            .flatten()
        {
            if self.timers.cancel(timer) {
                debug!(?timer, "superseded navigation timer cancelled");
            }
        }

        self.transition_active = true;
        self.direction = SlideDirection::from(slide);
        self.target = Some(to);
        self.commit_timer = Some(self.timers.schedule(now_ms, COMMIT_DELAY_MS, NavPhase::Commit(to)));
        self.clear_timer = Some(self.timers.schedule(now_ms, CLEAR_DELAY_MS, NavPhase::Clear));

        info!(from = ?self.pane, ?to, ?slide, "navigation started");
        Some(NavRequest {
            from: self.pane,
            to,
        })
    }

    /// Applies every phase due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Vec<NavEvent> {
        let mut events = Vec::new();
        for phase in self.timers.poll(now_ms) {
            match phase {
                NavPhase::Commit(to) => {
                    let from = self.pane;
                    self.pane = to;
                    self.target = None;
                    self.direction = SlideDirection::None;
                    self.commit_timer = None;
                    info!(?from, ?to, "navigation committed");
                    events.push(NavEvent::Committed { from, to });
                }
                NavPhase::Clear => {
                    self.transition_active = false;
                    self.clear_timer = None;
                    debug!(pane = ?self.pane, "navigation settled");
                    events.push(NavEvent::Settled);
                }
            }
        }
        events
    }
}
