use std::time::{Duration, Instant};

/// Wall-clock timers owned by one adapter. A timer is always disarmed
/// before being rearmed, so a kind can never fire twice for one arming.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimerKind {
    /// Revert Discoverable/Limited back to Connectable.
    Discoverable,
    /// Clear the pairable flag.
    Pairable,
    /// Safety stop for an LE scan phase.
    LeScanStop,
    /// Software-scheduled rescan between inquiry bouts.
    PeriodicRescan,
}

const TIMER_COUNT: usize = 4;

/// Deadline table polled by the engine loop. Firing is explicit
/// (`take_due`), which keeps timer behavior deterministic under test.
#[derive(Default, Debug)]
pub struct Timers {
    deadlines: [Option<Instant>; TIMER_COUNT],
}

impl Timers {
    pub fn new() -> Self {
        Timers::default()
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.deadlines[kind as usize] = Some(Instant::now() + after);
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        self.deadlines[kind as usize] = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind as usize].is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Claims the next timer due at `now`, disarming it.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerKind> {
        const KINDS: [TimerKind; TIMER_COUNT] = [
            TimerKind::Discoverable,
            TimerKind::Pairable,
            TimerKind::LeScanStop,
            TimerKind::PeriodicRescan,
        ];

        for kind in KINDS {
            if self.deadlines[kind as usize].is_some_and(|at| at <= now) {
                self.deadlines[kind as usize] = None;
                return Some(kind);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearm_replaces_deadline() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Discoverable, Duration::from_secs(120));
        timers.arm(TimerKind::Discoverable, Duration::from_secs(1));
        let next = timers.next_deadline().unwrap();
        assert!(next <= Instant::now() + Duration::from_secs(1));
    }

    #[test]
    fn take_due_fires_once() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::Pairable, Duration::from_secs(0));
        let later = Instant::now() + Duration::from_millis(10);
        assert_eq!(timers.take_due(later), Some(TimerKind::Pairable));
        assert_eq!(timers.take_due(later), None);
    }

    #[test]
    fn nothing_due_before_deadline() {
        let mut timers = Timers::new();
        timers.arm(TimerKind::LeScanStop, Duration::from_secs(60));
        assert_eq!(timers.take_due(Instant::now()), None);
        assert!(timers.is_armed(TimerKind::LeScanStop));
    }
}
