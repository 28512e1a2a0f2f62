//! Run-time sampler for a piecewise-linear envelope.
//!
//! `Modulator` walks a reference-counted, read-only buffer of `(delaySamples, value)`
//! points shared with every voice playing the same part — building the points once at
//! pack time and cloning only the `Arc` handle per voice. Points are cumulative sample
//! offsets from the start of the envelope; the modulator never sees curve shape, only
//! the already-linearized points produced by
//! [`crate::envelope::Envelope::sample_points`].

use std::sync::Arc;

/// A single linearized envelope breakpoint: `(cumulative sample offset, value)`.
pub type SampledPoint = (u32, f32);

/// Stateful cursor over an envelope's sampled points.
#[derive(Debug, Clone)]
pub struct Modulator {
    points: Arc<[SampledPoint]>,
    next_index: usize,
    last_point_value: f32,
    offset_samples: u32,
    current_value: f32,
}

impl Modulator {
    /// Builds a modulator over `points`, which must start at sample offset 0 and be
    /// sorted by offset. An empty buffer holds `initial_value` forever.
    pub fn new(points: Arc<[SampledPoint]>, initial_value: f32) -> Self {
        let current_value = points.first().map_or(initial_value, |p| p.1);
        Self {
            points,
            next_index: if points.is_empty() { 0 } else { 1 },
            last_point_value: current_value,
            offset_samples: 0,
            current_value,
        }
    }

    /// Restarts from the beginning. When `from_current` is set, the held base value
    /// becomes the modulator's current value instead of the envelope's first point,
    /// so a retriggered note resumes from wherever its amplitude already was.
    pub fn start(&mut self, from_current: bool) {
        self.next_index = if self.points.is_empty() { 0 } else { 1 };
        self.offset_samples = 0;
        if from_current {
            self.last_point_value = self.current_value;
        } else {
            self.last_point_value = self.points.first().map_or(self.current_value, |p| p.1);
            // Walk past any further points coincident with the first one, so an
            // envelope that opens with an instant jump starts at the jump's target
            // value instead of its stale pre-jump value.
            while let Some(&(offset, value)) = self.points.get(self.next_index) {
                if offset != self.offset_samples {
                    break;
                }
                self.last_point_value = value;
                self.next_index += 1;
            }
            self.current_value = self.last_point_value;
        }
    }

    /// Current value without advancing.
    #[inline]
    pub fn current_value(&self) -> f32 {
        self.current_value
    }

    /// Jumps straight to the trailing sentinel, freezing `current_value` at
    /// whatever it holds right now. Used to cut a voice's amplitude short instead of
    /// waiting out the rest of its envelope.
    pub fn stop(&mut self) {
        self.next_index = self.points.len();
        self.last_point_value = self.current_value;
    }

    /// `true` once this modulator has no more breakpoints ahead, whether because it
    /// ran off the end of its points naturally or was [`Self::stop`]ped early.
    #[inline]
    pub fn stopped(&self) -> bool {
        self.next_index >= self.points.len()
    }

    /// Maximum number of samples `advance` can consume before it must stop at the
    /// next breakpoint (used to size render-loop chunks). `u32::MAX` once the last
    /// point has been passed, since the tail value holds forever.
    pub fn max_continuous_advance(&self) -> u32 {
        match self.points.get(self.next_index) {
            Some((offset, _)) => offset.saturating_sub(self.offset_samples),
            None => u32::MAX,
        }
    }

    /// Consumes `samples`, interpolating linearly between the last and next
    /// breakpoint, advancing past any breakpoints fully consumed. Returns the
    /// maximum value observed during this advance (used for peak/gain estimation).
    pub fn advance(&mut self, samples: u32) -> f32 {
        let mut remaining = samples;
        let mut peak = self.current_value;
        while remaining > 0 {
            let Some(&(next_offset, next_value)) = self.points.get(self.next_index) else {
                self.offset_samples += remaining;
                self.current_value = self.last_point_value;
                peak = peak.max(self.current_value);
                break;
            };
            let until_next = next_offset.saturating_sub(self.offset_samples);
            if until_next == 0 {
                // Zero-length segment (coincident breakpoints): skip it without
                // consuming any samples.
                self.last_point_value = next_value;
                self.current_value = next_value;
                self.next_index += 1;
                peak = peak.max(self.current_value);
                continue;
            }

            let step = remaining.min(until_next);
            self.offset_samples += step;
            remaining -= step;

            let prev_offset = segment_start(&self.points, self.next_index);
            let span = next_offset.saturating_sub(prev_offset).max(1);
            let progressed = self.offset_samples.saturating_sub(prev_offset).min(span);
            let t = progressed as f32 / span as f32;
            self.current_value = self.last_point_value + (next_value - self.last_point_value) * t;
            peak = peak.max(self.current_value);

            if self.offset_samples >= next_offset {
                self.last_point_value = next_value;
                self.next_index += 1;
            }
        }
        peak
    }
}

fn segment_start(points: &[SampledPoint], next_index: usize) -> u32 {
    if next_index == 0 {
        0
    } else {
        points[next_index - 1].0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_modulator_holds_initial_value() {
        let mut modulator = Modulator::new(Arc::from([]), 0.5);
        assert_eq!(modulator.advance(1000), 0.5);
        assert_eq!(modulator.current_value(), 0.5);
    }

    #[test]
    fn linear_ramp_reaches_target_exactly() {
        let points: Arc<[SampledPoint]> = Arc::from([(0, 0.0), (1000, 1.0)]);
        let mut modulator = Modulator::new(points, 0.0);
        modulator.advance(500);
        assert!((modulator.current_value() - 0.5).abs() < 1e-4);
        modulator.advance(500);
        assert!((modulator.current_value() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn holds_last_value_past_final_point() {
        let points: Arc<[SampledPoint]> = Arc::from([(0, 0.0), (100, 1.0)]);
        let mut modulator = Modulator::new(points, 0.0);
        modulator.advance(1000);
        assert_eq!(modulator.current_value(), 1.0);
    }

    #[test]
    fn advance_reports_peak_seen() {
        let points: Arc<[SampledPoint]> = Arc::from([(0, 0.0), (100, 1.0), (200, 0.0)]);
        let mut modulator = Modulator::new(points, 0.0);
        let peak = modulator.advance(200);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn start_from_current_resumes_amplitude() {
        let points: Arc<[SampledPoint]> = Arc::from([(0, 0.0), (1000, 1.0)]);
        let mut modulator = Modulator::new(points, 0.0);
        modulator.advance(500);
        let resumed_from = modulator.current_value();
        modulator.start(true);
        assert!((modulator.current_value() - resumed_from).abs() < 1e-4);
    }

    #[test]
    fn max_continuous_advance_stops_at_next_point() {
        let points: Arc<[SampledPoint]> = Arc::from([(0, 0.0), (100, 1.0)]);
        let modulator = Modulator::new(points, 0.0);
        assert_eq!(modulator.max_continuous_advance(), 100);
    }
}
