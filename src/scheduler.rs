use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Millisecond clock the event loop reads once per tick.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Clock advanced by hand; used by tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn at(now_ms: u64) -> Self {
        Self {
            now: Cell::new(now_ms),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.set(self.now.get().saturating_add(delta_ms));
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// One-shot timers fired by polling. Events due at the same instant fire in
/// scheduling order.
#[derive(Debug, Clone)]
pub struct Scheduler<E> {
    timers: BTreeMap<(u64, TimerId), E>,
    next_id: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<E> Scheduler<E> {
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert((now_ms.saturating_add(delay_ms), id), event);
        id
    }

    /// Returns true if the timer was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let key = self.timers.keys().find(|(_, timer)| *timer == id).copied();
        key.and_then(|key| self.timers.remove(&key)).is_some()
    }

    /// Removes and returns every event due at or before `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<E> {
        let due = match now_ms.checked_add(1) {
            Some(bound) => {
                let pending = self.timers.split_off(&(bound, TimerId(0)));
                std::mem::replace(&mut self.timers, pending)
            }
            None => std::mem::take(&mut self.timers),
        };
        due.into_values().collect()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn is_idle(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }
}
