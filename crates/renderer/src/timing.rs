//! Bounded GPU interval timing.
//!
//! [`GpuTimer`] pairs a start and an end timestamp around the scene draw and
//! waits for the device to make both available. The wait is a busy-poll, but
//! it gives up after a fixed number of attempts so a stuck driver costs one
//! missing FPS sample rather than a hung window.

use std::time::Duration;

/// Poll attempts made by [`GpuTimer::end`] before reporting
/// [`TimingError::Unavailable`].
pub const DEFAULT_MAX_POLLS: u64 = 1_000_000;

/// Which end of the interval a timestamp request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSlot {
    Start,
    End,
}

/// Raw device ticks for one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPair {
    pub start: u64,
    pub end: u64,
}

impl TimestampPair {
    /// Converts ticks to nanoseconds. A device that reports `end < start`
    /// yields zero.
    pub fn elapsed(&self, period_ns: f64) -> ElapsedNanos {
        let ticks = self.end.saturating_sub(self.start);
        ElapsedNanos((ticks as f64 * period_ns).round() as u64)
    }
}

/// Non-negative GPU time spent between the two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ElapsedNanos(pub u64);

impl ElapsedNanos {
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    pub fn as_millis_f32(self) -> f32 {
        self.0 as f32 / 1_000_000.0
    }
}

/// Proof that [`GpuTimer::begin`] opened the interval being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an opened interval must be closed with GpuTimer::end"]
pub struct TimerToken {
    interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("timestamps still unavailable after {attempts} polls")]
    Unavailable { attempts: u64 },
    #[error("a timing interval is already open")]
    Overlapping,
    #[error("timer token does not belong to the open interval")]
    StaleToken,
    #[error("timestamp readback failed: {0}")]
    Device(String),
}

/// Device side of the timer: records timestamps and reports when both ends
/// of an interval can be read.
pub trait TimestampDevice {
    /// Arms the timestamp for `slot`.
    fn request(&mut self, slot: TimestampSlot) -> Result<(), TimingError>;

    /// Makes one availability check. `Ok(None)` means "not yet".
    fn poll(&mut self) -> Result<Option<TimestampPair>, TimingError>;

    /// Nanoseconds per device tick.
    fn period_ns(&self) -> f64;

    /// Drops any readback still in flight after the poll bound was hit.
    fn abandon(&mut self) {}

    /// Short name for logs and the overlay.
    fn label(&self) -> &'static str;
}

#[derive(Debug)]
pub struct GpuTimer<D> {
    device: D,
    max_polls: u64,
    next_interval: u64,
    open: Option<u64>,
}

impl<D: TimestampDevice> GpuTimer<D> {
    /// Creates a timer over `device`. `max_polls` is raised to at least one.
    pub fn new(device: D, max_polls: u64) -> Self {
        Self {
            device,
            max_polls: max_polls.max(1),
            next_interval: 0,
            open: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn max_polls(&self) -> u64 {
        self.max_polls
    }

    /// True between a successful `begin` and its `end`.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Arms the start timestamp of a new interval.
    pub fn begin(&mut self) -> Result<TimerToken, TimingError> {
        if self.open.is_some() {
            return Err(TimingError::Overlapping);
        }
        self.device.request(TimestampSlot::Start)?;
        let interval = self.next_interval;
        self.next_interval = self.next_interval.wrapping_add(1);
        self.open = Some(interval);
        Ok(TimerToken { interval })
    }

    /// Arms the end timestamp and waits, bounded, for both values.
    pub fn end(&mut self, token: TimerToken) -> Result<ElapsedNanos, TimingError> {
        if self.open != Some(token.interval) {
            return Err(TimingError::StaleToken);
        }
        self.open = None;

        if let Err(err) = self.device.request(TimestampSlot::End) {
            self.device.abandon();
            return Err(err);
        }

        for attempt in 1..=self.max_polls {
            match self.device.poll() {
                Ok(Some(pair)) => {
                    tracing::trace!(attempt, start = pair.start, end = pair.end, "timestamps ready");
                    return Ok(pair.elapsed(self.device.period_ns()));
                }
                Ok(None) => std::hint::spin_loop(),
                Err(err) => {
                    self.device.abandon();
                    return Err(err);
                }
            }
        }

        self.device.abandon();
        Err(TimingError::Unavailable {
            attempts: self.max_polls,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scripted device: reports `pair` once `ready_after` polls have passed.
    #[derive(Debug)]
    pub(crate) struct FakeDevice {
        pub pair: TimestampPair,
        pub ready_after: u64,
        pub period_ns: f64,
        pub polls: u64,
        pub requests: Vec<TimestampSlot>,
        pub abandoned: u32,
    }

    impl FakeDevice {
        pub(crate) fn ready(start: u64, end: u64) -> Self {
            Self {
                pair: TimestampPair { start, end },
                ready_after: 0,
                period_ns: 1.0,
                polls: 0,
                requests: Vec::new(),
                abandoned: 0,
            }
        }
    }

    impl TimestampDevice for FakeDevice {
        fn request(&mut self, slot: TimestampSlot) -> Result<(), TimingError> {
            if slot == TimestampSlot::Start {
                self.polls = 0;
            }
            self.requests.push(slot);
            Ok(())
        }

        fn poll(&mut self) -> Result<Option<TimestampPair>, TimingError> {
            self.polls += 1;
            Ok((self.polls > self.ready_after).then_some(self.pair))
        }

        fn period_ns(&self) -> f64 {
            self.period_ns
        }

        fn abandon(&mut self) {
            self.abandoned += 1;
        }

        fn label(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn elapsed_scales_ticks_by_period() {
        let mut device = FakeDevice::ready(1_000, 1_250);
        device.period_ns = 4.0;
        let mut timer = GpuTimer::new(device, 10);
        let token = timer.begin().unwrap();
        assert_eq!(timer.end(token).unwrap(), ElapsedNanos(1_000));
        assert_eq!(
            timer.device().requests,
            vec![TimestampSlot::Start, TimestampSlot::End]
        );
    }

    #[test]
    fn backwards_timestamps_saturate_to_zero() {
        let mut timer = GpuTimer::new(FakeDevice::ready(900, 100), 10);
        let token = timer.begin().unwrap();
        assert_eq!(timer.end(token).unwrap(), ElapsedNanos(0));
    }

    #[test]
    fn waits_for_late_timestamps_within_bound() {
        let mut device = FakeDevice::ready(0, 16_000_000);
        device.ready_after = 99;
        let mut timer = GpuTimer::new(device, 100);
        let token = timer.begin().unwrap();
        let elapsed = timer.end(token).unwrap();
        assert_eq!(elapsed.as_duration(), Duration::from_millis(16));
        assert_eq!(timer.device().polls, 100);
    }

    #[test]
    fn poll_bound_reports_unavailable() {
        let mut device = FakeDevice::ready(0, 10);
        device.ready_after = u64::MAX;
        let mut timer = GpuTimer::new(device, 25);
        let token = timer.begin().unwrap();
        assert_eq!(
            timer.end(token),
            Err(TimingError::Unavailable { attempts: 25 })
        );
        assert_eq!(timer.device().polls, 25);
        assert_eq!(timer.device().abandoned, 1);
        assert!(!timer.is_open());
    }

    #[test]
    fn second_begin_while_open_is_rejected() {
        let mut timer = GpuTimer::new(FakeDevice::ready(0, 1), 10);
        let token = timer.begin().unwrap();
        assert_eq!(timer.begin(), Err(TimingError::Overlapping));
        assert!(timer.end(token).is_ok());
        assert!(timer.begin().is_ok());
    }

    #[test]
    fn stale_token_is_rejected() {
        let mut timer = GpuTimer::new(FakeDevice::ready(0, 1), 10);
        let first = timer.begin().unwrap();
        timer.end(first).unwrap();
        let second = timer.begin().unwrap();
        assert_eq!(timer.end(first), Err(TimingError::StaleToken));
        assert!(timer.is_open());
        assert!(timer.end(second).is_ok());
    }

    #[test]
    fn zero_poll_limit_is_raised_to_one() {
        let timer = GpuTimer::new(FakeDevice::ready(0, 1), 0);
        assert_eq!(timer.max_polls(), 1);
    }
}
