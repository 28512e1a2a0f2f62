//! Per-track polyphonic voice management: chord/full polyphony, voice pooling,
//! stride clock, and stereo circular-acoustics placement.

use std::f32::consts::PI;

use crate::note::{Note, NOTE_COUNT};
use crate::shaper::Shaper;
use crate::voice::{EnvelopePoints, Polyphony, Voice, VoiceData};

/// Optional note-dependent stereo delay model, layered on top of a voice's fixed
/// `stereoDelay`. Angle-maps each note's pitch onto a circular source in front of a
/// listener and converts the resulting path-length difference into a frame offset.
/// All fields default to zero, which collapses [`Self::stereo_delay`] to always `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CircularAcoustics {
    /// Listener head radius, in samples.
    pub head_radius: f32,
    /// Source radius, in head radiuses.
    pub source_radius: f32,
    /// Angular extent of the note source, in right angles (1.0 == 90 degrees).
    pub source_size: f32,
    /// Angular offset of the source's center, in right angles; zero is straight
    /// ahead, positive is to the right.
    pub source_offset: f32,
}

impl CircularAcoustics {
    pub fn new(head_radius_ms: f32, source_radius: f32, source_size: f32, source_offset: f32, sampling_rate: u32) -> Self {
        Self {
            head_radius: sampling_rate as f32 * head_radius_ms / 1000.0,
            source_radius,
            source_size,
            source_offset,
        }
    }

    /// Signed stereo delay, in frames, for `note`. Positive delays the right ear.
    pub fn stereo_delay(&self, note: Note) -> i32 {
        const LAST_NOTE_INDEX: i32 = (NOTE_COUNT - 1) as i32;
        let note_angle = (2 * note.index() as i32 - LAST_NOTE_INDEX) as f32 / (2 * LAST_NOTE_INDEX) as f32;
        let double_sin = 2.0 * ((note_angle * self.source_size + self.source_offset) * PI / 2.0).sin();
        let left = (1.0 + self.source_radius * (self.source_radius + double_sin)).sqrt();
        let right = (1.0 + self.source_radius * (self.source_radius - double_sin)).sqrt();
        (self.head_radius * (left - right)) as i32
    }
}

/// A single scheduled note event within a track's flattened sound list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSound {
    /// Steps since the previous sound in this track (0 means "same step", a chord
    /// member of the previous sound).
    pub delay_steps: u32,
    pub note: Note,
    /// Number of immediately following sounds sharing this step (0 for non-leaders).
    pub chord_length: u32,
}

/// Static per-track configuration: spatialization and mix weight. Spatialization
/// fields are API-only — the text grammar does not expose them, see `weight`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackProperties {
    pub weight: u32,
    pub head_radius_ms: f32,
    pub source_radius: f32,
    pub source_size: f32,
    pub source_offset: f32,
}

impl TrackProperties {
    pub fn new(weight: u32) -> Self {
        Self {
            weight,
            ..Default::default()
        }
    }
}

struct PlayingVoice<S: Shaper> {
    voice: Voice<S>,
    note: Note,
}

/// Renders one track (a `(part, track)` pair) of a composition: owns a pool of
/// voices, the flattened sound list, and the stride clock that decides when the next
/// chord fires.
pub struct TrackRenderer<S: Shaper> {
    step_frames: u32,
    sounds: Vec<TrackSound>,
    gain: f32,
    acoustics: CircularAcoustics,
    stereo_delay_frames: i32,
    stereo_pan: f32,
    stereo_inversion: bool,
    polyphony: Polyphony,
    idle: Vec<Voice<S>>,
    playing: Vec<PlayingVoice<S>>,
    next_sound: usize,
    stride_frames_remaining: u32,
    channels: u16,
}

impl<S: Shaper> TrackRenderer<S> {
    /// `sounds` must already be flattened (see the parser's sequence/fragment
    /// replay). Once `sounds` is exhausted the track stays silent until
    /// [`Self::restart`] is called by the owning composition renderer.
    pub fn new(
        data: &VoiceData,
        points: &EnvelopePoints,
        properties: &TrackProperties,
        sounds: Vec<TrackSound>,
        sampling_rate: u32,
        composition_speed: u32,
        gain_divisor: f32,
        channels: u16,
    ) -> Self {
        let step_frames = (sampling_rate as f32 / composition_speed as f32).round() as u32;
        let pool_size = match data.polyphony {
            Polyphony::Chord => sounds.iter().map(|s| s.chord_length.max(1)).max().unwrap_or(1),
            Polyphony::Full => {
                let mut notes: Vec<Note> = sounds.iter().map(|s| s.note).collect();
                notes.sort();
                notes.dedup();
                notes.len().max(1) as u32
            }
        };
        let idle = (0..pool_size).map(|_| Voice::new(data, points, sampling_rate)).collect();
        let stereo_delay_frames = (data.stereo_delay_ms * sampling_rate as f32 / 1000.0).round() as i32;
        let acoustics = CircularAcoustics::new(
            properties.head_radius_ms,
            properties.source_radius,
            properties.source_size,
            properties.source_offset,
            sampling_rate,
        );
        let stride_frames_remaining = sounds.first().map_or(0, |s| s.delay_steps * step_frames);
        Self {
            step_frames,
            sounds,
            gain: properties.weight as f32 / gain_divisor,
            acoustics,
            stereo_delay_frames,
            stereo_pan: data.stereo_pan,
            stereo_inversion: data.stereo_inversion,
            polyphony: data.polyphony,
            idle,
            playing: Vec::new(),
            next_sound: 0,
            stride_frames_remaining,
            channels,
        }
    }

    fn stereo_delay_frames(&self, note: Note) -> i32 {
        self.stereo_delay_frames + self.acoustics.stereo_delay(note)
    }

    fn gains(&self) -> (f32, f32) {
        let left = (1.0 - self.stereo_pan).min(1.0);
        let sign = if self.stereo_inversion { -1.0 } else { 1.0 };
        let right = sign * (1.0 + self.stereo_pan).min(1.0);
        (left, right)
    }

    fn steal_for_chord(&mut self, incoming_notes: &[Note]) -> Vec<Voice<S>> {
        let mut acquired = Vec::with_capacity(incoming_notes.len());
        for &note in incoming_notes {
            let voice = match self.polyphony {
                Polyphony::Full => {
                    if let Some(pos) = self.playing.iter().position(|p| p.note == note) {
                        self.playing.remove(pos).voice
                    } else {
                        self.idle.pop().or_else(|| {
                            self.playing
                                .iter()
                                .enumerate()
                                .max_by_key(|(_, p)| p.note)
                                .map(|(i, _)| i)
                                .map(|i| self.playing.remove(i).voice)
                        })
                    }
                }
                Polyphony::Chord => self.idle.pop().or_else(|| {
                    self.playing
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, p)| p.note)
                        .map(|(i, _)| i)
                        .map(|i| self.playing.remove(i).voice)
                }),
            };
            if let Some(voice) = voice {
                acquired.push(voice);
            }
        }
        acquired
    }

    fn start_next_chord(&mut self, sampling_rate: u32) {
        let Some(leader) = self.sounds.get(self.next_sound).copied() else {
            return;
        };
        let chord_len = leader.chord_length.max(1) as usize;
        let notes: Vec<Note> = (0..chord_len)
            .filter_map(|i| self.sounds.get(self.next_sound + i))
            .map(|s| s.note)
            .collect();
        let mut voices = self.steal_for_chord(&notes);
        let (left_gain, right_gain) = self.gains();
        for (note, mut voice) in notes.into_iter().zip(voices.drain(..)) {
            let frequency = note.frequency();
            let delay_frames = self.stereo_delay_frames(note);
            voice.start(frequency, self.gain, delay_frames, left_gain, right_gain, false);
            self.playing.push(PlayingVoice { voice, note });
        }
        let _ = sampling_rate;
        self.next_sound += chord_len;
        self.advance_stride();
    }

    fn advance_stride(&mut self) {
        self.stride_frames_remaining = match self.sounds.get(self.next_sound) {
            Some(sound) => sound.delay_steps * self.step_frames,
            None => 0,
        };
    }

    /// Renders up to `max_frames` frames into `output` (interleaved by
    /// `self.channels`), mixing additively. Returns frames produced; this can be
    /// less than `max_frames` once the track has run out of sounds and every voice
    /// has finished.
    pub fn render(&mut self, output: &mut [f32], max_frames: u32, sampling_rate: u32) -> u32 {
        let mut total = 0u32;
        while total < max_frames {
            if self.stride_frames_remaining == 0 {
                if self.next_sound < self.sounds.len() {
                    self.start_next_chord(sampling_rate);
                } else if self.playing.is_empty() {
                    break;
                }
            }
            let chunk = if self.stride_frames_remaining > 0 {
                self.stride_frames_remaining.min(max_frames - total)
            } else {
                // No more scheduled events: let already-playing voices ride out.
                max_frames - total
            };

            let channels = self.channels as usize;
            for playing in &mut self.playing {
                let start = total as usize * channels;
                let end = (total + chunk) as usize * channels;
                let slice = &mut output[start..end.min(output.len())];
                playing.voice.render(slice, chunk);
            }
            let mut index = 0;
            while index < self.playing.len() {
                if self.playing[index].voice.is_finished() {
                    let finished = self.playing.remove(index);
                    self.idle.push(finished.voice);
                } else {
                    index += 1;
                }
            }
            total += chunk;
            if self.stride_frames_remaining > 0 {
                self.stride_frames_remaining -= chunk;
                if self.stride_frames_remaining == 0 {
                    self.advance_stride();
                }
            }
        }
        total
    }

    /// Stops every playing voice and resets to the first sound; `gain` is
    /// recomputed by the owning composition renderer via [`Self::set_gain`].
    pub fn restart(&mut self) {
        for mut playing in self.playing.drain(..) {
            playing.voice.stop();
            self.idle.push(playing.voice);
        }
        self.next_sound = 0;
        self.stride_frames_remaining = self.sounds.first().map_or(0, |s| s.delay_steps * self.step_frames);
    }

    pub fn set_gain(&mut self, weight: u32, gain_divisor: f32) {
        self.gain = weight as f32 / gain_divisor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, EnvelopeChange, EnvelopeShape};
    use crate::shaper::{LinearShaper, WaveShape};

    fn sustained(value: f32) -> Envelope {
        Envelope::new(vec![EnvelopeChange::new(0.0, value, EnvelopeShape::Linear)])
    }

    fn simple_voice_data() -> VoiceData {
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
    fn disabled_acoustics_returns_zero_delay() {
        let acoustics = CircularAcoustics::default();
        assert_eq!(acoustics.stereo_delay(Note::A4), 0);
    }

    #[test]
    fn track_renders_a_single_note() {
        let data = simple_voice_data();
        let points = data.sampled_points(8000);
        let sounds = vec![TrackSound {
            delay_steps: 0,
            note: Note::A4,
            chord_length: 0,
        }];
        let mut track = TrackRenderer::<LinearShaper>::new(
            &data,
            &points,
            &TrackProperties::new(255),
            sounds,
            8000,
            4,
            1.0,
            1,
        );
        let mut output = vec![0.0f32; 2000];
        let written = track.render(&mut output, 2000, 8000);
        assert_eq!(written, 2000);
        assert!(output.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn track_falls_silent_once_the_decaying_note_finishes() {
        let mut data = simple_voice_data();
        data.amplitude_envelope = Envelope::new(vec![
            EnvelopeChange::new(100.0, 1.0, EnvelopeShape::Linear),
            EnvelopeChange::new(100.0, 0.0, EnvelopeShape::Linear),
        ]);
        let points = data.sampled_points(8000);
        let sounds = vec![TrackSound {
            delay_steps: 0,
            note: Note::A4,
            chord_length: 0,
        }];
        let mut track = TrackRenderer::<LinearShaper>::new(
            &data,
            &points,
            &TrackProperties::new(255),
            sounds,
            8000,
            4,
            1.0,
            1,
        );
        let mut output = vec![0.0f32; 20_000];
        track.render(&mut output, 10_000, 8000);
        let written_after = track.render(&mut output[10_000..], 10_000, 8000);
        assert_eq!(written_after, 0);
    }
}
