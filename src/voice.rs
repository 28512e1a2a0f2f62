//! Single-note oscillator: combines a wave shaper, four modulators, and one or two
//! period machines into a renderable voice.

use std::sync::Arc;

use crate::envelope::Envelope;
use crate::modulator::{Modulator, SampledPoint};
use crate::period::WavePeriod;
use crate::shaper::{Shaper, ShaperData, WaveShape};

/// How a track steals and reuses voices when more notes are requested than it has
/// polyphony for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polyphony {
    /// Only the highest note not already assigned may steal a voice; suits chords
    /// played on a small number of simultaneous voices.
    Chord,
    /// Retriggering the same note reuses its own voice; every distinct note gets its
    /// own voice for the life of the track.
    Full,
}

/// Timbre shared by every voice instance playing the same part: envelopes, wave
/// shape, and stereo placement.
#[derive(Debug, Clone)]
pub struct VoiceData {
    pub wave_shape: WaveShape,
    pub amplitude_envelope: Envelope,
    pub frequency_envelope: Envelope,
    pub asymmetry_envelope: Envelope,
    pub oscillation_envelope: Envelope,
    pub stereo_delay_ms: f32,
    pub stereo_radius_ms: f32,
    pub stereo_pan: f32,
    pub stereo_inversion: bool,
    pub polyphony: Polyphony,
}

impl VoiceData {
    /// Builds the shared sampled-point buffers for this timbre's four envelopes at
    /// `sampling_rate`, ready to be cloned cheaply into every voice instance.
    pub fn sampled_points(&self, sampling_rate: u32) -> EnvelopePoints {
        EnvelopePoints {
            amplitude: Arc::from(self.amplitude_envelope.sample_points(0.0, sampling_rate)),
            frequency: Arc::from(self.frequency_envelope.sample_points(0.0, sampling_rate)),
            asymmetry: Arc::from(self.asymmetry_envelope.sample_points(0.0, sampling_rate)),
            oscillation: Arc::from(self.oscillation_envelope.sample_points(0.0, sampling_rate)),
        }
    }
}

/// Pre-sampled envelope points for one timbre at one sampling rate, shared by every
/// voice instance that plays it.
#[derive(Debug, Clone)]
pub struct EnvelopePoints {
    pub amplitude: Arc<[SampledPoint]>,
    pub frequency: Arc<[SampledPoint]>,
    pub asymmetry: Arc<[SampledPoint]>,
    pub oscillation: Arc<[SampledPoint]>,
}

/// One channel's worth of period + output gain state within a (possibly stereo)
/// voice.
#[derive(Debug, Clone, Copy)]
struct Channel {
    period: WavePeriod,
    gain: f32,
    /// Remaining silent lead-in frames before this channel starts emitting, used to
    /// implement the per-ear stereo delay.
    lead_in_frames: u32,
}

impl Channel {
    fn new(gain: f32, lead_in_frames: u32) -> Self {
        Self {
            period: WavePeriod::new(),
            gain,
            lead_in_frames,
        }
    }
}

/// A single playing note: one or two oscillator channels driven by a shared set of
/// modulators.
pub struct Voice<S: Shaper> {
    sampling_rate: u32,
    shape_parameter: f32,
    base_frequency: f32,
    base_amplitude: f32,
    amplitude: Modulator,
    frequency: Modulator,
    asymmetry: Modulator,
    oscillation: Modulator,
    channels: Vec<Channel>,
    _shaper: std::marker::PhantomData<S>,
}

impl<S: Shaper> Voice<S> {
    /// Builds an idle voice for the given timbre; call [`Self::start`] to trigger a
    /// note.
    pub fn new(data: &VoiceData, points: &EnvelopePoints, sampling_rate: u32) -> Self {
        let channel_count = if data.stereo_delay_ms != 0.0 || data.stereo_pan != 0.0 {
            2
        } else {
            1
        };
        Self {
            sampling_rate,
            shape_parameter: data.wave_shape.parameter(),
            base_frequency: 0.0,
            base_amplitude: 0.0,
            amplitude: Modulator::new(points.amplitude.clone(), 0.0),
            frequency: Modulator::new(points.frequency.clone(), 0.0),
            asymmetry: Modulator::new(points.asymmetry.clone(), 0.0),
            oscillation: Modulator::new(points.oscillation.clone(), 0.0),
            channels: (0..channel_count).map(|_| Channel::new(1.0, 0)).collect(),
            _shaper: std::marker::PhantomData,
        }
    }

    /// `true` while the amplitude modulator still has envelope ahead of it (not yet
    /// stopped and not yet run off the end of its points).
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.amplitude.stopped()
    }

    /// Triggers a new note. `stereo_delay_frames` is applied as a silent lead-in on
    /// whichever channel trails (sign picks which ear), `left_gain`/`right_gain`
    /// scale each channel's output (mono voices ignore the second).
    pub fn start(
        &mut self,
        note_frequency: f32,
        amplitude: f32,
        stereo_delay_frames: i32,
        left_gain: f32,
        right_gain: f32,
        from_current: bool,
    ) {
        self.base_frequency = note_frequency;
        self.base_amplitude = amplitude;
        self.amplitude.start(from_current);
        self.frequency.start(false);
        self.asymmetry.start(false);
        self.oscillation.start(false);

        let asymmetry = self.asymmetry.current_value();
        let period_length = self.sampling_rate as f32 / note_frequency;

        match self.channels.len() {
            1 => {
                self.channels[0].period.start(period_length, asymmetry, from_current);
                self.channels[0].gain = left_gain;
                self.channels[0].lead_in_frames = 0;
            }
            _ => {
                let (left_lead, right_lead) = if stereo_delay_frames >= 0 {
                    (stereo_delay_frames as u32, 0)
                } else {
                    (0, (-stereo_delay_frames) as u32)
                };
                self.channels[0].period.start(period_length, asymmetry, from_current);
                self.channels[0].gain = left_gain;
                self.channels[0].lead_in_frames = left_lead;
                self.channels[1].period.start(period_length, asymmetry, from_current);
                self.channels[1].gain = right_gain;
                self.channels[1].lead_in_frames = right_lead;
            }
        }
    }

    /// Stops the amplitude modulator; the voice keeps emitting until the wave half
    /// in progress completes and the amplitude reaches (and holds at) zero.
    pub fn stop(&mut self) {
        self.amplitude.stop();
    }

    /// `true` once the amplitude modulator has run off the end of its envelope
    /// (naturally or via [`Self::stop`]), regardless of the value it settled at.
    pub fn is_finished(&self) -> bool {
        self.amplitude.stopped()
    }

    /// Renders up to `max_frames` samples of this voice, **adding** into `output`
    /// (one `f32` per channel, interleaved if stereo). Returns the number of frames
    /// written, which is always `<= max_frames` and can be `0` only when the voice
    /// has nothing left to contribute.
    pub fn render(&mut self, output: &mut [f32], max_frames: u32) -> u32 {
        let channel_count = self.channels.len();
        let mut written = 0u32;
        while written < max_frames {
            let lead = self.channels.iter().map(|c| c.lead_in_frames).min().unwrap_or(0);
            if lead > 0 {
                let step = lead.min(max_frames - written);
                for channel in &mut self.channels {
                    channel.lead_in_frames = channel.lead_in_frames.saturating_sub(step);
                }
                written += step;
                continue;
            }
            if self.is_finished() {
                break;
            }

            let amplitude_budget = self.amplitude.max_continuous_advance();
            let period_budget = self
                .channels
                .iter()
                .map(|c| c.period.max_advance())
                .fold(f32::INFINITY, f32::min);
            let frames_this_step = (max_frames - written)
                .min(amplitude_budget)
                .min(period_budget.max(1.0) as u32)
                .max(1);

            for (channel_index, channel) in self.channels.iter_mut().enumerate() {
                let sign = channel.period.current_part_sign();
                let first_y = self.base_amplitude * sign;
                let delta_y = -2.0 * self.base_amplitude * sign;
                let mut wave_shaper = S::new(ShaperData::new(
                    first_y,
                    delta_y,
                    channel.period.current_part_length(),
                    self.shape_parameter,
                    channel.period.current_part_offset(),
                ));
                for frame in 0..frames_this_step {
                    let amp = self.amplitude.current_value();
                    let sample = wave_shaper.advance() * amp * channel.gain;
                    let index = ((written + frame) as usize) * channel_count + channel_index;
                    if let Some(slot) = output.get_mut(index) {
                        *slot += sample;
                    }
                }
            }

            self.amplitude.advance(frames_this_step);
            self.frequency.advance(frames_this_step);
            self.asymmetry.advance(frames_this_step);
            self.oscillation.advance(frames_this_step);
            written += frames_this_step;

            let asymmetry = self.asymmetry.current_value();
            for channel in &mut self.channels {
                if !channel.period.advance(frames_this_step as f32) {
                    let glide = 2f32.powf(self.frequency.current_value());
                    let new_period = self.sampling_rate as f32 / (self.base_frequency * glide);
                    channel.period.restart(new_period, asymmetry);
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeChange, EnvelopeShape};
    use crate::shaper::LinearShaper;

    fn sustained(value: f32) -> Envelope {
        Envelope::new(vec![EnvelopeChange::new(0.0, value, EnvelopeShape::Linear)])
    }

    fn mono_data() -> VoiceData {
        VoiceData {
            wave_shape: WaveShape::Linear,
            amplitude_envelope: sustained(1.0),
            frequency_envelope: sustained(0.0),
            asymmetry_envelope: sustained(1.0),
            oscillation_envelope: sustained(0.0),
            stereo_delay_ms: 0.0,
            stereo_radius_ms: 0.0,
            stereo_pan: 0.0,
            stereo_inversion: false,
            polyphony: Polyphony::Chord,
        }
    }

    #[test]
    fn mono_voice_renders_requested_frames() {
        let data = mono_data();
        let points = data.sampled_points(8000);
        let mut voice = Voice::<LinearShaper>::new(&data, &points, 8000);
        voice.start(440.0, 1.0, 0, 1.0, 1.0, false);
        let mut output = vec![0.0f32; 256];
        let written = voice.render(&mut output, 256);
        assert_eq!(written, 256);
        assert!(output.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn voice_finishes_once_its_decay_reaches_zero() {
        let mut data = mono_data();
        data.amplitude_envelope = Envelope::new(vec![
            EnvelopeChange::new(50.0, 1.0, EnvelopeShape::Linear),
            EnvelopeChange::new(50.0, 0.0, EnvelopeShape::Linear),
        ]);
        let points = data.sampled_points(8000);
        let mut voice = Voice::<LinearShaper>::new(&data, &points, 8000);
        voice.start(440.0, 1.0, 0, 1.0, 1.0, false);
        let mut output = vec![0.0f32; 8000];
        voice.render(&mut output, 8000);
        assert!(voice.is_finished());
    }

    #[test]
    fn stereo_lead_in_delays_one_channel() {
        let mut data = mono_data();
        data.stereo_delay_ms = 5.0;
        let points = data.sampled_points(8000);
        let mut voice = Voice::<LinearShaper>::new(&data, &points, 8000);
        voice.start(440.0, 1.0, 40, 1.0, 1.0, false);
        let mut output = vec![0.0f32; 20 * 2];
        voice.render(&mut output, 20);
        for frame in 0..20 {
            assert_eq!(output[frame * 2], 0.0, "left channel should be in lead-in");
        }
    }
}
