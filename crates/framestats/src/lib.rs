//! Frame-rate bookkeeping for the preview overlay.
//!
//! The render loop pushes one FPS value per frame into [`FpsHistory`]; the
//! overlay reads [`FpsHistory::stats`] and [`FpsHistory::chart_range`] to draw
//! its text and line chart. Everything here is recomputed on read, which is
//! fine for a few hundred samples.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples kept when no explicit capacity is requested.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Upper clamp for a single FPS sample. A zero-length GPU interval maps here
/// (equivalent to a 1µs frame) instead of producing infinity.
pub const MAX_REPORTED_FPS: f32 = 1_000_000.0;

/// Minimum vertical padding applied around the charted FPS range.
const CHART_MIN_PADDING: f32 = 10.0;
/// Fraction of the observed span added above and below the chart.
const CHART_PADDING_RATIO: f32 = 0.1;

/// Converts a measured frame interval into frames per second.
pub fn fps_from_elapsed(elapsed: Duration) -> f32 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return MAX_REPORTED_FPS;
    }
    ((1.0 / seconds) as f32).min(MAX_REPORTED_FPS)
}

/// Bounded FIFO of recent FPS samples, oldest first.
#[derive(Debug, Clone)]
pub struct FpsHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FpsHistory {
    /// Creates an empty history. A zero capacity is bumped to one so the most
    /// recent sample is always observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends a sample, evicting the oldest ones once the bound is exceeded.
    pub fn push(&mut self, fps: f32) {
        self.samples.push_back(fps);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Copies the samples out in push order.
    pub fn snapshot(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// Derived statistics over the whole buffer.
    pub fn stats(&self) -> FpsStats {
        let Some(current) = self.latest() else {
            return FpsStats::default();
        };

        let (sum, min, max) = self.samples.iter().fold(
            (0.0f64, f32::INFINITY, f32::NEG_INFINITY),
            |(sum, min, max), &value| (sum + f64::from(value), min.min(value), max.max(value)),
        );

        FpsStats {
            current,
            average: (sum / self.samples.len() as f64) as f32,
            min,
            max,
            frame_time_ms: frame_time_ms(current),
        }
    }

    /// Vertical axis bounds for the FPS chart.
    pub fn chart_range(&self) -> ChartRange {
        let stats = self.stats();
        ChartRange::around(stats.min, stats.max)
    }
}

impl Default for FpsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Summary of an [`FpsHistory`]. An empty history reports zeros and a
/// one-second frame time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsStats {
    pub current: f32,
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub frame_time_ms: f32,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            current: 0.0,
            average: 0.0,
            min: 0.0,
            max: 0.0,
            frame_time_ms: frame_time_ms(0.0),
        }
    }
}

fn frame_time_ms(fps: f32) -> f32 {
    1000.0 / if fps > 0.0 { fps } else { 1.0 }
}

/// Inclusive bounds of the chart's value axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRange {
    pub lower: f32,
    pub upper: f32,
}

impl ChartRange {
    /// Pads `[min, max]` by 10% of the span (at least 10 FPS) and keeps the
    /// lower bound non-negative.
    pub fn around(min: f32, max: f32) -> Self {
        let padding = CHART_MIN_PADDING.max((max - min) * CHART_PADDING_RATIO);
        Self {
            lower: (min - padding).max(0.0),
            upper: max + padding,
        }
    }

    pub fn span(&self) -> f32 {
        self.upper - self.lower
    }

    /// Maps `value` into `0.0..=1.0` along the axis, clamping outliers.
    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.span();
        if span <= f32::EPSILON {
            return 0.0;
        }
        ((value - self.lower) / span).clamp(0.0, 1.0)
    }
}
