//! Where `iTime` and `iFrame` come from.

use std::time::Instant;

/// Time handed to the scene uniforms for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub seconds: f32,
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

pub trait Clock {
    /// Samples the time for the next frame and advances the frame index.
    fn tick(&mut self) -> TimeSample;
}

pub type BoxedClock = Box<dyn Clock>;

/// Seconds since [`WallClock::start`].
#[derive(Debug)]
pub struct WallClock {
    started: Instant,
    frames: u64,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
        }
    }
}

impl Clock for WallClock {
    fn tick(&mut self) -> TimeSample {
        let seconds = self.started.elapsed().as_secs_f32();
        TimeSample::new(seconds, advance(&mut self.frames))
    }
}

/// Stuck at one instant while frames keep counting.
#[cfg(test)]
pub(crate) struct FrozenClock {
    seconds: f32,
    frames: u64,
}

#[cfg(test)]
impl FrozenClock {
    pub fn at(seconds: f32) -> Self {
        Self { seconds, frames: 0 }
    }
}

#[cfg(test)]
impl Clock for FrozenClock {
    fn tick(&mut self) -> TimeSample {
        TimeSample::new(self.seconds, advance(&mut self.frames))
    }
}

fn advance(frames: &mut u64) -> u64 {
    let current = *frames;
    *frames = current.saturating_add(1);
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_never_runs_backwards() {
        let mut clock = WallClock::start();
        let first = clock.tick();
        let second = clock.tick();
        assert_eq!((first.frame_index, second.frame_index), (0, 1));
        assert!(second.seconds >= first.seconds);
    }

    #[test]
    fn frozen_clock_only_counts_frames() {
        let mut clock = FrozenClock::at(2.5);
        clock.tick();
        assert_eq!(clock.tick(), TimeSample::new(2.5, 1));
    }

    #[test]
    fn frame_index_saturates() {
        let mut frames = u64::MAX;
        assert_eq!(advance(&mut frames), u64::MAX);
        assert_eq!(frames, u64::MAX);
    }
}
