//! Windowed call accounting for one `(capacity, period)` rule.

use std::time::Duration;

use tokio::time::Instant;

use crate::quota::QuotaRule;

/// Call count inside a time-bounded window.
///
/// `count <= capacity` is upheld by making the caller wait for the window to
/// clear, never by rejecting the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    capacity: u32,
    period: Duration,
    window_start: Option<Instant>,
    count: u32,
}

/// Outcome of admitting one call against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Time to wait before the call is legal.
    pub wait: Duration,
    /// The window restarts once the call proceeds.
    pub rolled: bool,
}

impl Window {
    /// A window that has never seen a call.
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self {
            capacity,
            period,
            window_start: None,
            count: 0,
        }
    }

    /// A window picking up server-reported usage, started at `now`.
    pub fn seeded(rule: &QuotaRule, now: Instant) -> Self {
        Self {
            capacity: rule.capacity,
            period: rule.period,
            window_start: Some(now),
            count: rule.starting_count,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start(&self) -> Option<Instant> {
        self.window_start
    }

    /// Account for one call at `now`.
    ///
    /// An elapsed window resets its count. A saturated window reports the
    /// time left until it clears and also resets, since the call will land
    /// in the next window. Either way the window is marked rolled and the
    /// caller restarts it once every window of the batch is evaluated.
    pub fn admit(&mut self, now: Instant, count_call: bool) -> Admission {
        let mut admission = Admission {
            wait: Duration::ZERO,
            rolled: false,
        };

        match self.window_start {
            Some(start) if now.saturating_duration_since(start) <= self.period => {
                if self.count >= self.capacity {
                    let elapsed = now.saturating_duration_since(start);
                    admission.wait = self.period.saturating_sub(elapsed);
                    admission.rolled = true;
                    self.count = 0;
                }
            }
            _ => {
                admission.rolled = true;
                self.count = 0;
            }
        }

        if count_call {
            self.count = self.count.saturating_add(1);
        }
        admission
    }

    /// Start a fresh window at `now`.
    pub fn restart(&mut self, now: Instant) {
        self.window_start = Some(now);
    }
}

/// Result of admitting one call against every window of a region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAdmission {
    /// The slowest window to clear decides the wait.
    pub wait: Duration,
    /// Indices of windows to restart after the wait.
    pub rolled: Vec<usize>,
}

/// Admit one call against all `windows` at `now`.
pub fn admit_all(windows: &mut [Window], now: Instant, count_call: bool) -> BatchAdmission {
    let mut batch = BatchAdmission::default();
    for (index, window) in windows.iter_mut().enumerate() {
        let admission = window.admit(now, count_call);
        batch.wait = batch.wait.max(admission.wait);
        if admission.rolled {
            batch.rolled.push(index);
        }
    }
    batch
}

/// Restart the rolled windows of a batch.
pub fn restart_rolled(windows: &mut [Window], rolled: &[usize], now: Instant) {
    for &index in rolled {
        if let Some(window) = windows.get_mut(index) {
            window.restart(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn admit_and_restart(window: &mut Window, now: Instant) -> Duration {
        let admission = window.admit(now, true);
        if admission.rolled {
            window.restart(now);
        }
        admission.wait
    }

    #[test]
    fn test_fourth_call_waits_for_window() {
        let t0 = Instant::now();
        let mut window = Window::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert_eq!(admit_and_restart(&mut window, t0), Duration::ZERO);
        }
        assert_eq!(window.count(), 3);

        let later = t0 + Duration::from_secs(4);
        let wait = admit_and_restart(&mut window, later);
        assert_eq!(wait, Duration::from_secs(6));
    }

    #[test]
    fn test_saturated_window_restarts_with_the_waiting_call() {
        let t0 = Instant::now();
        let mut window = Window::new(1, Duration::from_secs(10));
        admit_and_restart(&mut window, t0);

        let admission = window.admit(t0, true);
        assert_eq!(admission.wait, Duration::from_secs(10));
        assert!(admission.rolled);
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn test_elapsed_window_resets() {
        let t0 = Instant::now();
        let mut window = Window::new(2, Duration::from_secs(1));
        admit_and_restart(&mut window, t0);
        admit_and_restart(&mut window, t0);

        let wait = admit_and_restart(&mut window, t0 + Duration::from_millis(1001));
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn test_uncounted_call_does_not_consume_capacity() {
        let t0 = Instant::now();
        let mut window = Window::new(1, Duration::from_secs(10));
        window.admit(t0, false);
        window.restart(t0);
        assert_eq!(window.count(), 0);
        assert_eq!(admit_and_restart(&mut window, t0), Duration::ZERO);
    }

    #[test]
    fn test_seeded_window_picks_up_usage() {
        let t0 = Instant::now();
        let rule = QuotaRule::new(20, Duration::from_secs(10)).with_starting_count(20);
        let mut window = Window::seeded(&rule, t0);
        let wait = window.admit(t0 + Duration::from_secs(2), true).wait;
        assert_eq!(wait, Duration::from_secs(8));
    }

    #[test]
    fn test_batch_takes_longest_wait_and_restarts_only_rolled() {
        let t0 = Instant::now();
        let short = QuotaRule::new(1, Duration::from_secs(2)).with_starting_count(1);
        let long = QuotaRule::new(1, Duration::from_secs(10)).with_starting_count(1);
        let roomy = QuotaRule::new(100, Duration::from_secs(60));
        let mut windows = vec![
            Window::seeded(&short, t0),
            Window::seeded(&long, t0),
            Window::seeded(&roomy, t0),
        ];

        let now = t0 + Duration::from_secs(1);
        let batch = admit_all(&mut windows, now, true);
        assert_eq!(batch.wait, Duration::from_secs(9));
        assert_eq!(batch.rolled, vec![0, 1]);

        restart_rolled(&mut windows, &batch.rolled, now);
        assert_eq!(windows[0].window_start(), Some(now));
        assert_eq!(windows[2].window_start(), Some(t0));
    }

    proptest! {
        /// Whatever the call pattern, a window never holds more calls than
        /// its capacity and never asks for more than one period of waiting.
        #[test]
        fn prop_count_never_exceeds_capacity(
            capacity in 1u32..10,
            period_ms in 1u64..5_000,
            seed in 0u32..10,
            gaps_ms in prop::collection::vec(0u64..3_000, 1..60),
        ) {
            let period = Duration::from_millis(period_ms);
            let rule = QuotaRule::new(capacity, period).with_starting_count(seed.min(capacity));
            let mut now = Instant::now();
            let mut windows = vec![Window::seeded(&rule, now)];

            for gap in gaps_ms {
                now += Duration::from_millis(gap);
                let batch = admit_all(&mut windows, now, true);
                prop_assert!(batch.wait <= period);
                prop_assert!(windows[0].count() <= capacity);

                // The call proceeds once the wait is over.
                now += batch.wait;
                restart_rolled(&mut windows, &batch.rolled, now);
            }
        }
    }
}
