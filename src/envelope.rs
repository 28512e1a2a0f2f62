//! Envelope definitions and their pack-time subdivision into linear sample points.
//!
//! An [`Envelope`] is authored as a short list of [`EnvelopeChange`]s, each carrying a
//! duration, a target value, and an [`EnvelopeShape`] curve hint. [`EnvelopeShape`] is a
//! vocabulary distinct from [`crate::shaper::WaveShape`]: it only ever applies to one
//! envelope segment at pack time, never to a running oscillator. The run-time
//! [`crate::modulator::Modulator`] only ever sees linear points; curved segments are
//! subdivided into [`ENVELOPE_SUBDIVISIONS`] linear sub-points here, once, when the
//! owning composition is built.

use crate::shaper::{Shaper, ShaperData, SharpQuadraticShaper, SmoothQuadraticShaper};

/// Number of linear sub-points a non-linear envelope segment is subdivided into.
pub const ENVELOPE_SUBDIVISIONS: u32 = 16;

/// Curve hint for one envelope segment, applied only at pack time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    Linear,
    SmoothQuadratic2,
    SmoothQuadratic4,
    SharpQuadratic2,
    SharpQuadratic4,
}

/// One authored segment of an [`Envelope`]: move to `value` over `duration_ms`,
/// following `shape`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeChange {
    pub duration_ms: f32,
    pub value: f32,
    pub shape: EnvelopeShape,
}

impl EnvelopeChange {
    pub fn new(duration_ms: f32, value: f32, shape: EnvelopeShape) -> Self {
        debug_assert!((0.0..=60_000.0).contains(&duration_ms));
        Self {
            duration_ms,
            value,
            shape,
        }
    }
}

/// An ordered list of [`EnvelopeChange`]s, starting from an initial value at time zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub changes: Vec<EnvelopeChange>,
}

impl Envelope {
    pub fn new(changes: Vec<EnvelopeChange>) -> Self {
        Self { changes }
    }

    /// Total authored duration across all segments, in milliseconds.
    pub fn duration_ms(&self) -> f32 {
        self.changes.iter().map(|c| c.duration_ms).sum()
    }

    /// Converts this envelope into `(delay_samples, value)` points at `sampling_rate`,
    /// starting from `initial_value` at `(0, initial_value)`. Non-linear segments are
    /// subdivided per [`ENVELOPE_SUBDIVISIONS`]; a trailing sentinel is not included
    /// here, `Modulator` supplies it.
    pub fn sample_points(&self, initial_value: f32, sampling_rate: u32) -> Vec<(u32, f32)> {
        let mut points = vec![(0u32, initial_value)];
        let mut last_value = initial_value;
        let mut cumulative_samples: u64 = 0;
        for change in &self.changes {
            let segment_samples =
                ((change.duration_ms as f64) * sampling_rate as f64 / 1000.0).round() as u32;
            match change.shape {
                EnvelopeShape::Linear => {
                    cumulative_samples += segment_samples as u64;
                    points.push((cumulative_samples as u32, change.value));
                }
                shape => {
                    let delta_y = change.value - last_value;
                    for step in 1..=ENVELOPE_SUBDIVISIONS {
                        let offset_x = segment_samples as f32 * step as f32
                            / ENVELOPE_SUBDIVISIONS as f32;
                        let sub_value = sample_shaped(shape, last_value, delta_y, segment_samples, offset_x);
                        let sample_offset =
                            cumulative_samples + (offset_x.round() as u64).min(segment_samples as u64);
                        points.push((sample_offset as u32, sub_value));
                    }
                    cumulative_samples += segment_samples as u64;
                }
            }
            last_value = change.value;
        }
        points
    }
}

/// Evaluates a single shaped envelope point at `offset_x` using the closed form that
/// matches `shape`'s polynomial degree. Degree-4 variants apply the degree-2 curve
/// twice, reparameterized around the segment midpoint, for a gentler knee.
fn sample_shaped(shape: EnvelopeShape, first_y: f32, delta_y: f32, delta_x: u32, offset_x: f32) -> f32 {
    if delta_x == 0 {
        return first_y + delta_y;
    }
    let delta_x = delta_x as f32;
    match shape {
        EnvelopeShape::Linear => first_y + delta_y * (offset_x / delta_x),
        EnvelopeShape::SmoothQuadratic2 => {
            SmoothQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, offset_x)
        }
        EnvelopeShape::SharpQuadratic2 => {
            SharpQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, offset_x)
        }
        EnvelopeShape::SmoothQuadratic4 => {
            let half = SmoothQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, offset_x);
            SmoothQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, normalized_reapply(offset_x, delta_x, half, first_y, delta_y))
        }
        EnvelopeShape::SharpQuadratic4 => {
            let half = SharpQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, offset_x);
            SharpQuadraticShaper::value(first_y, delta_y, delta_x, 0.0, normalized_reapply(offset_x, delta_x, half, first_y, delta_y))
        }
    }
}

/// Maps an already-once-curved value back onto the `[0, delta_x]` domain so the
/// degree-2 shaper can be applied a second time, producing a degree-4 knee while
/// preserving the segment's endpoints exactly.
fn normalized_reapply(offset_x: f32, delta_x: f32, curved_value: f32, first_y: f32, delta_y: f32) -> f32 {
    if delta_y.abs() < f32::EPSILON {
        return offset_x;
    }
    let normalized = (curved_value - first_y) / delta_y;
    (normalized * delta_x).clamp(0.0, delta_x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_segment_has_one_point() {
        let envelope = Envelope::new(vec![EnvelopeChange::new(1000.0, 1.0, EnvelopeShape::Linear)]);
        let points = envelope.sample_points(0.0, 1000);
        assert_eq!(points, vec![(0, 0.0), (1000, 1.0)]);
    }

    #[test]
    fn shaped_segment_is_subdivided() {
        let envelope = Envelope::new(vec![EnvelopeChange::new(
            1000.0,
            1.0,
            EnvelopeShape::SmoothQuadratic2,
        )]);
        let points = envelope.sample_points(0.0, 1000);
        assert_eq!(points.len() as u32, ENVELOPE_SUBDIVISIONS + 1);
        assert_eq!(points[0], (0, 0.0));
        let (last_offset, last_value) = *points.last().unwrap();
        assert_eq!(last_offset, 1000);
        assert!((last_value - 1.0).abs() < 1e-4);
    }

    #[test]
    fn multiple_segments_accumulate_offsets() {
        let envelope = Envelope::new(vec![
            EnvelopeChange::new(500.0, 1.0, EnvelopeShape::Linear),
            EnvelopeChange::new(500.0, 0.0, EnvelopeShape::Linear),
        ]);
        let points = envelope.sample_points(0.0, 1000);
        assert_eq!(points, vec![(0, 0.0), (500, 1.0), (1000, 0.0)]);
    }

    #[test]
    fn zero_duration_change_collapses_immediately() {
        let envelope = Envelope::new(vec![EnvelopeChange::new(0.0, 1.0, EnvelopeShape::Linear)]);
        let points = envelope.sample_points(0.0, 44_100);
        assert_eq!(points, vec![(0, 0.0), (0, 1.0)]);
    }
}
