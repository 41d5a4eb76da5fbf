//! Local countdown to inbox expiry and the one-second ticker driving it.

use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const TICK: Duration = Duration::from_secs(1);

/// Remaining above this is shown as plenty of time.
pub const HIGH_TIER_SECS: u64 = 30 * 60;
/// Remaining at or below this is shown as urgent.
pub const LOW_TIER_SECS: u64 = 10 * 60;

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn for_remaining(secs: u64) -> Self {
        if secs > HIGH_TIER_SECS {
            Tier::High
        } else if secs > LOW_TIER_SECS {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Counting(u64),
    AlreadyExpired,
    /// The inbox has no known expiry; nothing to count down.
    NoDeadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to count down; the tick was ignored.
    Idle,
    Counting(u64),
    /// Zero was reached on this tick. Reported once per arming.
    Expired,
}

/// Countdown derived from the session expiry.
#[derive(Debug, Clone)]
pub struct ExpiryTimer {
    total_secs: u64,
    remaining_secs: u64,
    expired_locally: bool,
}

impl ExpiryTimer {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            total_secs: lifetime.as_secs().max(1),
            remaining_secs: 0,
            expired_locally: false,
        }
    }

    /// Recompute from `expires_at`. Without an expiry the timer stays at zero
    /// and never latches.
    pub fn arm(&mut self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ArmOutcome {
        let Some(at) = expires_at else {
            self.disarm();
            debug!("timer idle, inbox has no expiry");
            return ArmOutcome::NoDeadline;
        };
        self.remaining_secs = (at - now).num_seconds().max(0) as u64;
        self.expired_locally = self.remaining_secs == 0;
        debug!(
            "timer armed with {}s left (expired: {})",
            self.remaining_secs, self.expired_locally
        );
        if self.expired_locally {
            ArmOutcome::AlreadyExpired
        } else {
            ArmOutcome::Counting(self.remaining_secs)
        }
    }

    pub fn disarm(&mut self) {
        self.remaining_secs = 0;
        self.expired_locally = false;
    }

    pub fn is_running(&self) -> bool {
        !self.expired_locally && self.remaining_secs > 0
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Idle;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.expired_locally = true;
            TickOutcome::Expired
        } else {
            TickOutcome::Counting(self.remaining_secs)
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn has_expired_locally(&self) -> bool {
        self.expired_locally
    }

    pub fn progress_percent(&self) -> f64 {
        (self.remaining_secs as f64 / self.total_secs as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn tier(&self) -> Tier {
        Tier::for_remaining(self.remaining_secs)
    }

    /// `MM:SS`; minutes are not wrapped into hours.
    pub fn display(&self) -> String {
        format_mm_ss(self.remaining_secs)
    }
}

pub fn format_mm_ss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Owned handle to a repeating one-second tick. Dropping it cancels the tick.
pub struct Ticker {
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Call `on_tick` every `period` on a background thread until cancelled or
    /// until `on_tick` returns false.
    pub fn spawn<F>(period: Duration, on_tick: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let thread = thread::spawn(move || {
            let mut next = Instant::now() + period;
            loop {
                // park so cancel() can wake us early
                loop {
                    if flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let now = Instant::now();
                    if now >= next {
                        break;
                    }
                    thread::park_timeout(next - now);
                }
                if !on_tick() {
                    return;
                }
                next += period;
                // after a suspension, skip the backlog instead of bursting
                let now = Instant::now();
                if next < now {
                    next = now + period;
                }
            }
        });
        Self {
            cancelled,
            thread: Some(thread),
        }
    }

    /// A handle with no thread behind it; ticks are fed in by hand.
    pub fn manual() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(t) = &self.thread {
            t.thread().unpark();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::atomic::AtomicUsize;

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_full_hour() {
        let mut timer = ExpiryTimer::new(Duration::from_secs(3600));
        let out = timer.arm(Some(now() + TimeDelta::seconds(3600)), now());
        assert_eq!(out, ArmOutcome::Counting(3600));
        assert_eq!(timer.display(), "60:00");
        assert_eq!(timer.progress_percent(), 100.0);
        assert_eq!(timer.tier(), Tier::High);
    }

    #[test]
    fn test_past_expiry_starts_latched() {
        for past in [0, 1, 90, 86_400] {
            let mut timer = ExpiryTimer::new(Duration::from_secs(3600));
            let out = timer.arm(Some(now() - TimeDelta::seconds(past)), now());
            assert_eq!(out, ArmOutcome::AlreadyExpired);
            assert_eq!(timer.remaining_secs(), 0);
            assert!(timer.has_expired_locally());
            assert!(!timer.is_running());
            assert_eq!(timer.tick(), TickOutcome::Idle);
        }
    }

    #[test]
    fn test_partial_second_rounds_down() {
        let mut timer = ExpiryTimer::new(Duration::from_secs(3600));
        timer.arm(Some(now() + TimeDelta::milliseconds(1500)), now());
        assert_eq!(timer.remaining_secs(), 1);
        timer.arm(Some(now() + TimeDelta::milliseconds(999)), now());
        assert!(timer.has_expired_locally());
    }

    #[test]
    fn test_counts_down_once_per_tick_and_fires_once() {
        let mut timer = ExpiryTimer::new(Duration::from_secs(3600));
        timer.arm(Some(now() + TimeDelta::seconds(3)), now());
        assert_eq!(timer.tick(), TickOutcome::Counting(2));
        assert_eq!(timer.tick(), TickOutcome::Counting(1));
        assert_eq!(timer.tick(), TickOutcome::Expired);
        assert_eq!(timer.remaining_secs(), 0);
        for _ in 0..5 {
            assert_eq!(timer.tick(), TickOutcome::Idle);
            assert_eq!(timer.remaining_secs(), 0);
        }
    }

    #[test]
    fn test_tiers_and_progress() {
        assert_eq!(Tier::for_remaining(1801), Tier::High);
        assert_eq!(Tier::for_remaining(1800), Tier::Medium);
        assert_eq!(Tier::for_remaining(601), Tier::Medium);
        assert_eq!(Tier::for_remaining(600), Tier::Low);
        assert_eq!(Tier::for_remaining(500), Tier::Low);

        let mut timer = ExpiryTimer::new(Duration::from_secs(3600));
        timer.arm(Some(now() + TimeDelta::seconds(1800)), now());
        assert_eq!(timer.progress_percent(), 50.0);

        // longer than the configured lifetime still caps at 100
        timer.arm(Some(now() + TimeDelta::seconds(7200)), now());
        assert_eq!(timer.progress_percent(), 100.0);
        assert_eq!(timer.display(), "120:00");
    }

    #[test]
    fn test_missing_expiry_does_not_count() {
        let mut timer = ExpiryTimer::new(Duration::from_secs(600));
        timer.arm(Some(now() + TimeDelta::seconds(30)), now());
        assert_eq!(timer.arm(None, now()), ArmOutcome::NoDeadline);
        assert_eq!(timer.remaining_secs(), 0);
        assert!(!timer.is_running());
        assert!(!timer.has_expired_locally());
        for _ in 0..3 {
            assert_eq!(timer.tick(), TickOutcome::Idle);
        }
        assert!(!timer.has_expired_locally());
        assert_eq!(format_mm_ss(61), "01:01");
    }

    #[test]
    fn test_ticker_stops_after_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::spawn(Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        thread::sleep(Duration::from_millis(60));
        drop(ticker);
        thread::sleep(Duration::from_millis(20));
        let seen = count.load(Ordering::SeqCst);
        assert!(seen > 0);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
