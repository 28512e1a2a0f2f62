//! The composition data model and the top-level renderer built from it.

use std::sync::Arc;

use log::warn;

use crate::error::ParseError;
use crate::format::{AudioFormat, ChannelLayout};
use crate::note::Note;
use crate::shaper::{CosineShaper, LinearShaper, QuinticShaper, SharpQuadraticShaper, SmoothCubicShaper, SmoothQuadraticShaper, WaveShape};
use crate::track::{TrackProperties, TrackRenderer, TrackSound};
use crate::voice::VoiceData;

/// One note placed within a [`Sequence`]. `delay_steps` is the offset from the
/// previous sound in the same sequence; `0` marks a chord member of the previous
/// sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sound {
    pub delay_steps: u32,
    pub note: Note,
}

/// A finite, ordered list of [`Sound`]s. Not restartable from within itself; a track
/// loops only via the composition-level restart mechanism.
pub type Sequence = Vec<Sound>;

/// Places a [`Sequence`] onto a track's timeline. `delay_steps` is relative to the
/// previous fragment's starting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub delay_steps: u32,
    pub sequence_index: usize,
}

/// One `(part, track)` pair: its spatialization/weight and the fragments/sequences
/// that place its notes on the timeline.
#[derive(Debug, Clone, Default)]
pub struct TrackData {
    pub properties: TrackProperties,
    pub sequences: Vec<Sequence>,
    pub fragments: Vec<Fragment>,
}

impl TrackData {
    /// Flattens this track's fragments and sequences into an absolute-step sound
    /// list, absorbing fragment overlap (a later fragment erases everything placed
    /// by earlier fragments at or after its own start step), and annotating each
    /// chord's leader with its `chord_length`.
    pub fn flatten(&self) -> Vec<TrackSound> {
        let mut by_step: Vec<(u32, Note)> = Vec::new();
        let mut fragment_step = 0u32;
        for fragment in &self.fragments {
            fragment_step += fragment.delay_steps;
            by_step.retain(|&(step, _)| step < fragment_step);
            let Some(sequence) = self.sequences.get(fragment.sequence_index) else {
                continue;
            };
            let mut step = fragment_step;
            for sound in sequence {
                step += sound.delay_steps;
                by_step.push((step, sound.note));
            }
        }
        by_step.sort_by_key(|&(step, _)| step);

        let mut sounds = Vec::with_capacity(by_step.len());
        let mut previous_step = 0u32;
        let mut index = 0usize;
        while index < by_step.len() {
            let (step, note) = by_step[index];
            let delay_steps = if sounds.is_empty() { step } else { step - previous_step };
            let mut chord_len = 1u32;
            while index + (chord_len as usize) < by_step.len() && by_step[index + chord_len as usize].0 == step {
                chord_len += 1;
            }
            sounds.push(TrackSound {
                delay_steps,
                note,
                chord_length: chord_len,
            });
            for offset in 1..chord_len {
                sounds.push(TrackSound {
                    delay_steps: 0,
                    note: by_step[index + offset as usize].1,
                    chord_length: 0,
                });
            }
            previous_step = step;
            index += chord_len as usize;
        }
        sounds
    }
}

/// One voice part: its timbre and the tracks that play it.
#[derive(Debug, Clone)]
pub struct PartData {
    pub voice: VoiceData,
    pub voice_name: String,
    pub tracks: Vec<TrackData>,
}

/// The full in-memory representation of a parsed composition text. Immutable once
/// rendering begins.
#[derive(Debug, Clone)]
pub struct Composition {
    pub speed: u32,
    pub loop_offset: u32,
    pub loop_length: u32,
    pub parts: Vec<PartData>,
    pub title: String,
    pub author: String,
    pub gain_divisor: f32,
}

impl Composition {
    pub fn new(speed: u32) -> Self {
        debug_assert!((1..=32).contains(&speed));
        Self {
            speed,
            loop_offset: 0,
            loop_length: 0,
            parts: Vec::new(),
            title: String::new(),
            author: String::new(),
            gain_divisor: 1.0,
        }
    }

    /// Parses composition text into a data model, per the grammar described by the
    /// composition text format.
    pub fn create(text: &str) -> Result<Self, ParseError> {
        crate::parser::parse(text)
    }

    /// Renders this composition back into its textual form. `parse(serialize(parse(text)))`
    /// is structurally equal to `parse(text)`.
    pub fn serialize(&self) -> String {
        crate::parser::serialize(self)
    }

    #[inline]
    pub fn has_loop(&self) -> bool {
        self.loop_length > 0
    }

    /// Recomputes [`Self::gain_divisor`] by rendering this composition once at
    /// `max_sampling_rate`, mono, with unity gain, measuring the peak absolute
    /// sample value, and storing `max(peak, epsilon)`.
    pub fn normalize_gain(&mut self, max_sampling_rate: u32) {
        self.gain_divisor = 1.0;
        let format = match AudioFormat::new(max_sampling_rate, ChannelLayout::Mono) {
            Some(format) => format,
            None => return,
        };
        let Some(mut renderer) = Renderer::create(Arc::new(self.clone()), format, false) else {
            return;
        };
        let mut peak = 0.0f32;
        let mut buffer = vec![0.0f32; 4096];
        loop {
            let written = renderer.render(&mut buffer, 4096 / format.channel_count() as u32);
            if written == 0 {
                break;
            }
            for &sample in &buffer[..(written as usize * format.channel_count() as usize)] {
                peak = peak.max(sample.abs());
            }
        }
        // An empty composition (peak 0) keeps unity gain rather than dividing by a
        // near-zero epsilon.
        self.gain_divisor = if peak > 0.0 { peak } else { 1.0 };
    }
}

/// Dispatches to the monomorphized [`TrackRenderer`] matching a part's `WaveShape`,
/// chosen once at construction time instead of per-sample.
enum AnyTrackRenderer {
    Linear(TrackRenderer<LinearShaper>),
    SmoothQuadratic(TrackRenderer<SmoothQuadraticShaper>),
    SharpQuadratic(TrackRenderer<SharpQuadraticShaper>),
    SmoothCubic(TrackRenderer<SmoothCubicShaper>),
    Quintic(TrackRenderer<QuinticShaper>),
    Cosine(TrackRenderer<CosineShaper>),
}

impl AnyTrackRenderer {
    fn new(
        data: &VoiceData,
        properties: &TrackProperties,
        sounds: Vec<TrackSound>,
        sampling_rate: u32,
        composition_speed: u32,
        gain_divisor: f32,
        channels: u16,
    ) -> Self {
        match data.wave_shape {
            WaveShape::Linear => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::Linear(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
            WaveShape::SmoothQuadratic => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::SmoothQuadratic(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
            WaveShape::SharpQuadratic => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::SharpQuadratic(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
            WaveShape::SmoothCubic(_) => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::SmoothCubic(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
            WaveShape::Quintic(_) => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::Quintic(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
            WaveShape::Cosine => {
                let points = data.sampled_points(sampling_rate);
                AnyTrackRenderer::Cosine(TrackRenderer::new(
                    data, &points, properties, sounds, sampling_rate, composition_speed, gain_divisor, channels,
                ))
            }
        }
    }

    fn render(&mut self, output: &mut [f32], max_frames: u32, sampling_rate: u32) -> u32 {
        match self {
            AnyTrackRenderer::Linear(t) => t.render(output, max_frames, sampling_rate),
            AnyTrackRenderer::SmoothQuadratic(t) => t.render(output, max_frames, sampling_rate),
            AnyTrackRenderer::SharpQuadratic(t) => t.render(output, max_frames, sampling_rate),
            AnyTrackRenderer::SmoothCubic(t) => t.render(output, max_frames, sampling_rate),
            AnyTrackRenderer::Quintic(t) => t.render(output, max_frames, sampling_rate),
            AnyTrackRenderer::Cosine(t) => t.render(output, max_frames, sampling_rate),
        }
    }

    fn restart(&mut self) {
        match self {
            AnyTrackRenderer::Linear(t) => t.restart(),
            AnyTrackRenderer::SmoothQuadratic(t) => t.restart(),
            AnyTrackRenderer::SharpQuadratic(t) => t.restart(),
            AnyTrackRenderer::SmoothCubic(t) => t.restart(),
            AnyTrackRenderer::Quintic(t) => t.restart(),
            AnyTrackRenderer::Cosine(t) => t.restart(),
        }
    }

    fn set_gain(&mut self, weight: u32, gain_divisor: f32) {
        match self {
            AnyTrackRenderer::Linear(t) => t.set_gain(weight, gain_divisor),
            AnyTrackRenderer::SmoothQuadratic(t) => t.set_gain(weight, gain_divisor),
            AnyTrackRenderer::SharpQuadratic(t) => t.set_gain(weight, gain_divisor),
            AnyTrackRenderer::SmoothCubic(t) => t.set_gain(weight, gain_divisor),
            AnyTrackRenderer::Quintic(t) => t.set_gain(weight, gain_divisor),
            AnyTrackRenderer::Cosine(t) => t.set_gain(weight, gain_divisor),
        }
    }
}

/// Renders a [`Composition`] into PCM frames at a fixed [`AudioFormat`], with
/// optional looping.
pub struct Renderer {
    composition: Arc<Composition>,
    format: AudioFormat,
    looping: bool,
    step_frames: u32,
    loop_offset_frames: u64,
    loop_length_frames: u64,
    tracks: Vec<(u32, AnyTrackRenderer)>,
    current_offset: u64,
}

impl Renderer {
    /// Builds a renderer for `composition` at `format`. Returns `None` only if
    /// `format`'s sampling rate validation already failed upstream (the format is
    /// assumed pre-validated by [`AudioFormat::new`]); never fails otherwise.
    pub fn create(composition: Arc<Composition>, format: AudioFormat, looping: bool) -> Option<Self> {
        let step_frames = (format.sampling_rate as f32 / composition.speed as f32).round() as u32;
        let mut tracks = Vec::new();
        for part in &composition.parts {
            if part.tracks.is_empty() {
                warn!("part {:?} contributes zero tracks", part.voice_name);
            }
            for track in &part.tracks {
                if part.voice.amplitude_envelope.duration_ms() <= 0.0 {
                    continue;
                }
                let sounds = track.flatten();
                let renderer = AnyTrackRenderer::new(
                    &part.voice,
                    &track.properties,
                    sounds,
                    format.sampling_rate,
                    composition.speed,
                    composition.gain_divisor,
                    format.channel_count(),
                );
                tracks.push((track.properties.weight, renderer));
            }
        }
        Some(Self {
            loop_offset_frames: composition.loop_offset as u64 * step_frames as u64,
            loop_length_frames: composition.loop_length as u64 * step_frames as u64,
            composition,
            format,
            looping,
            step_frames,
            tracks,
            current_offset: 0,
        })
    }

    #[inline]
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    #[inline]
    pub fn loop_offset(&self) -> u64 {
        self.loop_offset_frames
    }

    #[inline]
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Zeroes `output[..max_frames * channels]`, then renders additively into it.
    /// Returns frames actually written.
    pub fn render(&mut self, output: &mut [f32], max_frames: u32) -> u32 {
        let channels = self.format.channel_count() as usize;
        let needed = max_frames as usize * channels;
        for slot in output.iter_mut().take(needed) {
            *slot = 0.0;
        }

        if self.tracks.is_empty() {
            return self.render_empty_composition(max_frames);
        }

        let mut total = 0u32;
        while total < max_frames {
            let remaining = max_frames - total;
            let mut produced = 0u32;
            let start = total as usize * channels;
            for (weight, track) in &mut self.tracks {
                let _ = weight;
                let slice = &mut output[start..];
                produced = produced.max(track.render(slice, remaining, self.format.sampling_rate));
            }
            total += produced;
            self.current_offset += produced as u64;
            self.wrap_loop();

            if produced < remaining {
                if !self.looping {
                    break;
                }
                if self.loop_length_frames > 0 {
                    let step = remaining - produced;
                    self.current_offset += step as u64;
                    total += step;
                    self.wrap_loop();
                } else {
                    // No explicit loop window: advance silently to the next step
                    // boundary before restarting, so the restarted tracks line up
                    // with the stride clock instead of restarting mid-step.
                    let into_step = self.current_offset % self.step_frames as u64;
                    let to_boundary = if into_step == 0 { 0 } else { self.step_frames as u64 - into_step };
                    let quota = (remaining - produced) as u64;
                    let step = to_boundary.min(quota) as u32;
                    self.current_offset += step as u64;
                    total += step;
                    if step as u64 == to_boundary {
                        self.restart();
                    }
                }
                continue;
            }
        }
        total
    }

    fn render_empty_composition(&mut self, max_frames: u32) -> u32 {
        if !self.looping {
            return 0;
        }
        // Loop-on-empty-composition: emit silence for one step then restart.
        self.current_offset += self.step_frames.min(max_frames) as u64;
        self.wrap_loop();
        self.step_frames.min(max_frames)
    }

    fn wrap_loop(&mut self) {
        if self.looping && self.loop_length_frames > 0 && self.current_offset >= self.loop_offset_frames {
            let into_loop = (self.current_offset - self.loop_offset_frames) % self.loop_length_frames;
            self.current_offset = self.loop_offset_frames + into_loop;
        }
    }

    /// Renders and discards up to `max_frames` frames in bounded-size chunks.
    /// Returns frames actually skipped.
    pub fn skip_frames(&mut self, max_frames: u32) -> u32 {
        const CHUNK_FRAMES: u32 = 4096;
        let mut scratch = vec![0.0f32; CHUNK_FRAMES as usize * self.format.channel_count() as usize];
        let mut total = 0u32;
        while total < max_frames {
            let chunk = (max_frames - total).min(CHUNK_FRAMES);
            let written = self.render(&mut scratch, chunk);
            total += written;
            if written < chunk {
                break;
            }
        }
        total
    }

    /// Stops all playing voices, resets every track to its first sound, and
    /// recomputes each track's per-voice gain from its weight and the
    /// composition's gain divisor.
    pub fn restart(&mut self) {
        let gain_divisor = self.composition.gain_divisor;
        for (weight, track) in &mut self.tracks {
            track.restart();
            track.set_gain(*weight, gain_divisor);
        }
        self.current_offset = self.loop_offset_frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, EnvelopeChange, EnvelopeShape};
    use crate::track::TrackProperties;
    use crate::voice::Polyphony;

    fn sustained(value: f32) -> Envelope {
        Envelope::new(vec![EnvelopeChange::new(1001.0, value, EnvelopeShape::Linear)])
    }

    fn single_voice_composition(notes: &[(u32, Note)]) -> Composition {
        let voice = VoiceData {
            wave_shape: WaveShape::SmoothCubic(1.0),
            amplitude_envelope: sustained(1.0),
            frequency_envelope: sustained(0.0),
            asymmetry_envelope: sustained(1.0),
            oscillation_envelope: sustained(0.0),
            stereo_delay_ms: 0.0,
            stereo_radius_ms: 0.0,
            stereo_pan: 0.0,
            stereo_inversion: false,
            polyphony: Polyphony::Chord,
        };
        let sequence: Sequence = notes
            .iter()
            .map(|&(delay, note)| Sound { delay_steps: delay, note })
            .collect();
        let track = TrackData {
            properties: TrackProperties::new(255),
            sequences: vec![sequence],
            fragments: vec![Fragment {
                delay_steps: 0,
                sequence_index: 0,
            }],
        };
        let mut composition = Composition::new(1);
        composition.parts.push(PartData {
            voice,
            voice_name: "lead".into(),
            tracks: vec![track],
        });
        composition
    }

    #[test]
    fn no_notes_no_loop_renders_nothing() {
        let composition = single_voice_composition(&[]);
        let format = AudioFormat::new(8000, ChannelLayout::Mono).unwrap();
        let mut renderer = Renderer::create(Arc::new(composition), format, false).unwrap();
        let mut buffer = vec![0.0f32; 1];
        assert_eq!(renderer.render(&mut buffer, 1), 0);
        assert_eq!(renderer.current_offset(), 0);
    }

    #[test]
    fn two_notes_total_duration_matches_envelope_plus_gap() {
        let composition = single_voice_composition(&[(0, Note::A4), (1, Note::A4)]);
        let format = AudioFormat::new(8000, ChannelLayout::Mono).unwrap();
        let mut renderer = Renderer::create(Arc::new(composition), format, false).unwrap();
        let mut buffer = vec![0.0f32; 32_000];
        let mut total = 0u32;
        loop {
            let written = renderer.render(&mut buffer, 16_008);
            if written == 0 {
                break;
            }
            total += written;
        }
        assert_eq!(total, 16_008);
        assert_eq!(renderer.render(&mut buffer[..1], 1), 0);
    }

    #[test]
    fn gain_normalization_bounds_peak_amplitude() {
        let mut composition = single_voice_composition(&[(0, Note::A4), (1, Note::B4)]);
        composition.normalize_gain(48_000);
        assert!(composition.gain_divisor > 0.0);
        let format = AudioFormat::new(8000, ChannelLayout::Mono).unwrap();
        let mut renderer = Renderer::create(Arc::new(composition), format, false).unwrap();
        let mut buffer = vec![0.0f32; 16_008];
        renderer.render(&mut buffer, 16_008);
        for &sample in &buffer {
            assert!(sample.abs() <= 1.0 + 1e-4, "{sample} exceeds unity");
        }
    }

    #[test]
    fn track_flatten_assigns_chord_length_to_leader() {
        let track = TrackData {
            properties: TrackProperties::new(1),
            sequences: vec![vec![
                Sound { delay_steps: 0, note: Note::C4 },
                Sound { delay_steps: 0, note: Note::E4 },
                Sound { delay_steps: 1, note: Note::G4 },
            ]],
            fragments: vec![Fragment {
                delay_steps: 0,
                sequence_index: 0,
            }],
        };
        let sounds = track.flatten();
        assert_eq!(sounds[0].chord_length, 2);
        assert_eq!(sounds[1].chord_length, 0);
        assert_eq!(sounds[2].note, Note::G4);
    }
}
