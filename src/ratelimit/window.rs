//! Fixed counting window state.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Time window unit for rate limiting.
///
/// A limiter built from a unit counts calls over exactly one unit of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Per-millisecond rate limiting
    Millisecond,
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Millisecond => Duration::from_millis(1),
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Second
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "millisecond" | "ms" => Ok(TimeWindow::Millisecond),
            "second" | "s" => Ok(TimeWindow::Second),
            "minute" | "m" => Ok(TimeWindow::Minute),
            "hour" | "h" => Ok(TimeWindow::Hour),
            "day" | "d" => Ok(TimeWindow::Day),
            other => Err(format!("unknown time window unit: {}", other)),
        }
    }
}

/// Outcome of a single admission attempt against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// A quota slot was consumed; `count` is the post-increment count.
    Admitted { count: u32 },
    /// The window is saturated; retry no earlier than `retry_at`.
    Saturated { retry_at: Instant },
}

/// Call counter and expiry of the live counting window.
///
/// Plain data: callers serialize access through a single mutex so that the
/// count and the window end always change together.
#[derive(Debug)]
pub(crate) struct WindowState {
    /// Calls admitted in the current window
    count: u32,
    /// Instant at which the current window expires
    window_end: Instant,
}

impl WindowState {
    /// Open the first window at `now`.
    ///
    /// Returns `None` if the window end is not representable.
    pub(crate) fn new(now: Instant, duration: Duration) -> Option<Self> {
        Some(Self {
            count: 0,
            window_end: now.checked_add(duration)?,
        })
    }

    /// Try to take one quota slot at `now`.
    ///
    /// A window that has reached its end is replaced before counting, so a
    /// call arriving exactly at the boundary belongs to the new window. The
    /// new window end is derived from `now`, which makes the reset happen
    /// once per window no matter how many callers observed the expiry.
    pub(crate) fn try_admit(&mut self, now: Instant, limit: u32, duration: Duration) -> Admission {
        let reset = self.roll(now, duration);
        if reset {
            tracing::trace!(window_end = ?self.window_end, "Counting window reset");
        }

        if self.count < limit {
            self.count += 1;
            Admission::Admitted { count: self.count }
        } else {
            Admission::Saturated {
                retry_at: self.window_end,
            }
        }
    }

    /// Read-only view of the window at `now`.
    pub(crate) fn snapshot(&self, now: Instant, limit: u32) -> WindowSnapshot {
        if now >= self.window_end {
            return WindowSnapshot {
                limit,
                admitted: 0,
                remaining: limit,
                until_reset: Duration::ZERO,
            };
        }

        WindowSnapshot {
            limit,
            admitted: self.count,
            remaining: limit.saturating_sub(self.count),
            until_reset: self.window_end - now,
        }
    }

    fn roll(&mut self, now: Instant, duration: Duration) -> bool {
        if now < self.window_end {
            return false;
        }
        // An unrepresentable end keeps the saturated window rather than
        // admitting past the limit.
        match now.checked_add(duration) {
            Some(window_end) => {
                self.count = 0;
                self.window_end = window_end;
                true
            }
            None => false,
        }
    }
}

/// Point-in-time view of a limiter's counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Maximum admissions per window
    pub limit: u32,
    /// Admissions in the live window (0 once the window has expired)
    pub admitted: u32,
    /// Slots left in the live window
    pub remaining: u32,
    /// Time until the live window expires
    pub until_reset: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_time_window_duration() {
        assert_eq!(TimeWindow::Millisecond.duration(), Duration::from_millis(1));
        assert_eq!(TimeWindow::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeWindow::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeWindow::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeWindow::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_time_window_from_str() {
        assert_eq!("second".parse::<TimeWindow>(), Ok(TimeWindow::Second));
        assert_eq!("Minute".parse::<TimeWindow>(), Ok(TimeWindow::Minute));
        assert_eq!("ms".parse::<TimeWindow>(), Ok(TimeWindow::Millisecond));
        assert!("fortnight".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn test_admits_up_to_limit() {
        let start = Instant::now();
        let mut state = WindowState::new(start, ONE_SEC).unwrap();

        assert_eq!(state.try_admit(start, 2, ONE_SEC), Admission::Admitted { count: 1 });
        assert_eq!(state.try_admit(start, 2, ONE_SEC), Admission::Admitted { count: 2 });
        assert_eq!(
            state.try_admit(start, 2, ONE_SEC),
            Admission::Saturated { retry_at: start + ONE_SEC }
        );
    }

    #[test]
    fn test_saturation_does_not_consume_slots() {
        let start = Instant::now();
        let mut state = WindowState::new(start, ONE_SEC).unwrap();

        state.try_admit(start, 1, ONE_SEC);
        for _ in 0..5 {
            state.try_admit(start, 1, ONE_SEC);
        }

        assert_eq!(state.snapshot(start, 1).admitted, 1);
    }

    #[test]
    fn test_boundary_call_opens_new_window() {
        let start = Instant::now();
        let mut state = WindowState::new(start, ONE_SEC).unwrap();
        state.try_admit(start, 1, ONE_SEC);

        let boundary = start + ONE_SEC;
        assert_eq!(state.try_admit(boundary, 1, ONE_SEC), Admission::Admitted { count: 1 });
        assert_eq!(
            state.try_admit(boundary, 1, ONE_SEC),
            Admission::Saturated { retry_at: boundary + ONE_SEC }
        );
    }

    #[test]
    fn test_reset_happens_once_per_window() {
        let start = Instant::now();
        let mut state = WindowState::new(start, ONE_SEC).unwrap();
        state.try_admit(start, 3, ONE_SEC);
        state.try_admit(start, 3, ONE_SEC);

        // Two callers that both saw the old window expire.
        let late = start + Duration::from_millis(1500);
        assert_eq!(state.try_admit(late, 3, ONE_SEC), Admission::Admitted { count: 1 });
        assert_eq!(state.try_admit(late, 3, ONE_SEC), Admission::Admitted { count: 2 });

        let snapshot = state.snapshot(late, 3);
        assert_eq!(snapshot.admitted, 2);
        assert_eq!(snapshot.until_reset, ONE_SEC);
    }

    #[test]
    fn test_snapshot_of_expired_window() {
        let start = Instant::now();
        let mut state = WindowState::new(start, ONE_SEC).unwrap();
        state.try_admit(start, 4, ONE_SEC);

        let snapshot = state.snapshot(start + Duration::from_secs(2), 4);
        assert_eq!(snapshot.admitted, 0);
        assert_eq!(snapshot.remaining, 4);
        assert_eq!(snapshot.until_reset, Duration::ZERO);

        // Snapshots are read-only.
        assert_eq!(state.snapshot(start, 4).admitted, 1);
    }

    #[test]
    fn test_unrepresentable_window_end() {
        assert!(WindowState::new(Instant::now(), Duration::MAX).is_none());
    }

    #[test]
    fn test_time_window_serde() {
        let unit: TimeWindow = serde_yaml::from_str("minute").unwrap();
        assert_eq!(unit, TimeWindow::Minute);
    }
}
