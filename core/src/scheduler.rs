//! Cooperative single-threaded timer queue.
//!
//! Stands in for the host's `setTimeout`/`setInterval`. Tasks fire in
//! `(due, scheduling order)` order, one at a time, so two timers never run
//! at once. A zero-delay timeout fires after the work that scheduled it,
//! which is what deferred layout checks rely on.

use crate::{clock::ConsoleClock, types::Millis};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    timer: TimerId,
    every: Option<Millis>,
    task:  T,
}

pub struct EventLoop<T> {
    clock:      ConsoleClock,
    queue:      BTreeMap<(Millis, u64), Entry<T>>,
    next_seq:   u64,
    next_timer: u64,
}

impl<T: Clone> EventLoop<T> {
    pub fn new() -> Self {
        Self {
            clock:      ConsoleClock::new(),
            queue:      BTreeMap::new(),
            next_seq:   0,
            next_timer: 0,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now
    }

    pub fn set_timeout(&mut self, delay: Millis, task: T) -> TimerId {
        let timer = self.allocate_timer();
        self.enqueue(self.clock.now + delay, Entry { timer, every: None, task });
        timer
    }

    /// Repeat `task` every `period` ms, first firing one period from now.
    /// A zero period runs as 1 ms.
    pub fn set_interval(&mut self, period: Millis, task: T) -> TimerId {
        let period = period.max(1);
        let timer = self.allocate_timer();
        self.enqueue(self.clock.now + period, Entry { timer, every: Some(period), task });
        timer
    }

    /// Cancel a timeout or interval. Returns false if it already fired or
    /// was never scheduled.
    pub fn clear(&mut self, timer: TimerId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|_, entry| entry.timer != timer);
        self.queue.len() != before
    }

    pub fn is_scheduled(&self, timer: TimerId) -> bool {
        self.queue.values().any(|entry| entry.timer == timer)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Pop the earliest task due at or before `until`, moving the clock to
    /// its due time. Intervals are re-armed before the task is handed out,
    /// so clearing them from inside the task still works.
    pub fn pop_due(&mut self, until: Millis) -> Option<(TimerId, T)> {
        let key = *self.queue.keys().next()?;
        if key.0 > until {
            return None;
        }
        let entry = self.queue.remove(&key)?;
        let due = self.clock.advance_to(key.0);

        if let Some(period) = entry.every {
            self.enqueue(
                due + period,
                Entry { timer: entry.timer, every: entry.every, task: entry.task.clone() },
            );
        }
        Some((entry.timer, entry.task))
    }

    /// Move the clock to `until` once everything due has been drained.
    pub fn settle_at(&mut self, until: Millis) {
        self.clock.advance_to(until);
    }

    fn allocate_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }

    fn enqueue(&mut self, due: Millis, entry: Entry<T>) {
        self.next_seq += 1;
        self.queue.insert((due, self.next_seq), entry);
    }
}

impl<T: Clone> Default for EventLoop<T> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(lp: &mut EventLoop<&'static str>, until: Millis) -> Vec<(Millis, &'static str)> {
        let mut fired = Vec::new();
        while let Some((_, task)) = lp.pop_due(until) {
            fired.push((lp.now(), task));
        }
        lp.settle_at(until);
        fired
    }

    #[test]
    fn timeouts_fire_in_due_then_fifo_order() {
        let mut lp = EventLoop::new();
        lp.set_timeout(10, "late");
        lp.set_timeout(0, "first");
        lp.set_timeout(0, "second");
        let fired = drain(&mut lp, 20);
        assert_eq!(fired, vec![(0, "first"), (0, "second"), (10, "late")]);
        assert_eq!(lp.now(), 20);
    }

    #[test]
    fn intervals_rearm_until_cleared() {
        let mut lp = EventLoop::new();
        let timer = lp.set_interval(5, "tick");
        assert_eq!(drain(&mut lp, 12).len(), 2);
        assert!(lp.clear(timer));
        assert!(drain(&mut lp, 100).is_empty());
        assert!(!lp.clear(timer), "second clear is a no-op");
    }

    #[test]
    fn zero_period_interval_runs_every_millisecond() {
        let mut lp = EventLoop::new();
        lp.set_interval(0, "tick");
        assert_eq!(drain(&mut lp, 3), vec![(1, "tick"), (2, "tick"), (3, "tick")]);
    }
}
