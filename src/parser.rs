//! Hand-written recursive-descent parser and serializer for composition text.
//!
//! The format is line-based, case-sensitive ASCII: a handful of global commands,
//! then four sections (`@voice`, `@tracks`, `@sequences`, `@fragments`) each with
//! their own command grammar. Parsing never recovers from an error — the first
//! malformed token aborts with a `(line:column) message` [`ParseError`].

use crate::composition::{Composition, Fragment, PartData, Sequence, Sound, TrackData};
use crate::envelope::{Envelope, EnvelopeChange, EnvelopeShape};
use crate::error::ParseError;
use crate::note::Note;
use crate::shaper::{QuinticShaper, SmoothCubicShaper, WaveShape};
use crate::track::TrackProperties;
use crate::voice::{Polyphony, VoiceData};

const MIN_SPEED: u32 = 1;
const MAX_SPEED: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Global,
    Voice,
    Tracks,
    Sequences,
    Fragments,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column(), message)
    }

    fn error_at(&self, start: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, start - self.line_start + 1, message)
    }

    fn skip_spaces(&mut self) -> Result<(), ParseError> {
        let c = self.peek();
        if c != b' ' && c != b'\t' && c != b'\n' && c != b'\r' && c != 0 {
            return Err(self.error("Space expected"));
        }
        while self.peek() == b' ' || self.peek() == b'\t' {
            self.pos += 1;
        }
        Ok(())
    }

    fn consume_end_of_line(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            b'\r' => {
                self.pos += 1;
                if self.peek() == b'\n' {
                    self.pos += 1;
                }
            }
            b'\n' => self.pos += 1,
            0 => return Ok(()),
            _ => return Err(self.error("End of line expected")),
        }
        self.line += 1;
        self.line_start = self.pos;
        Ok(())
    }

    fn try_read_identifier(&mut self) -> Result<Option<&'a str>, ParseError> {
        let c = self.peek();
        if !(c.is_ascii_lowercase() || c == b'_') {
            return Ok(None);
        }
        let begin = self.pos;
        loop {
            self.pos += 1;
            let c = self.peek();
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_') {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        self.skip_spaces()?;
        Ok(Some(text))
    }

    fn read_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.try_read_identifier()?.ok_or_else(|| self.error("Identifier expected"))
    }

    fn try_read_unsigned(&mut self, min: u32, max: u32) -> Result<Option<u32>, ParseError> {
        if !self.peek().is_ascii_digit() {
            return Ok(None);
        }
        let begin = self.pos;
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        let value: u32 = text.parse().map_err(|_| self.error_at(begin, "Number expected"))?;
        if value < min || value > max {
            return Err(self.error_at(begin, "Number is out of range"));
        }
        self.skip_spaces()?;
        Ok(Some(value))
    }

    fn read_unsigned(&mut self, min: u32, max: u32) -> Result<u32, ParseError> {
        self.try_read_unsigned(min, max)?.ok_or_else(|| self.error("Number expected"))
    }

    fn try_read_float(&mut self, min: f32, max: f32) -> Result<Option<f32>, ParseError> {
        if !self.peek().is_ascii_digit() && self.peek() != b'-' {
            return Ok(None);
        }
        let begin = self.pos;
        if self.peek() == b'-' {
            self.pos += 1;
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' {
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        let value: f32 = text.parse().map_err(|_| self.error_at(begin, "Bad number"))?;
        if value < min || value > max {
            return Err(self.error_at(begin, "Number is out of range"));
        }
        self.skip_spaces()?;
        Ok(Some(value))
    }

    fn read_float(&mut self, min: f32, max: f32) -> Result<f32, ParseError> {
        self.try_read_float(min, max)?.ok_or_else(|| self.error("Number expected"))
    }

    fn try_read_string(&mut self) -> Result<Option<String>, ParseError> {
        if self.peek() != b'"' {
            return Ok(None);
        }
        self.pos += 1;
        let begin = self.pos;
        while self.peek() != b'"' && self.peek() != 0 {
            self.pos += 1;
        }
        if self.peek() == 0 {
            return Err(self.error_at(begin, "Unexpected end of file"));
        }
        let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap().to_string();
        self.pos += 1;
        self.skip_spaces()?;
        Ok(Some(text))
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        self.try_read_string()?.ok_or_else(|| self.error("String expected"))
    }

    fn end_of_line_expected(&self) -> Result<(), ParseError> {
        let c = self.peek();
        if c != 0 && c != b'\n' && c != b'\r' {
            return Err(self.error("End of line expected"));
        }
        Ok(())
    }
}

fn map_note_letter(cursor: &Cursor<'_>, letter: u8) -> Result<i8, ParseError> {
    match letter {
        b'A' => Ok(9),
        b'B' => Ok(11),
        b'C' => Ok(0),
        b'D' => Ok(2),
        b'E' => Ok(4),
        b'F' => Ok(5),
        b'G' => Ok(7),
        _ => Err(cursor.error("Bad note")),
    }
}

fn parse_note(cursor: &mut Cursor<'_>, delay_steps: u32, sequence: &mut Sequence) -> Result<(), ParseError> {
    let letter = cursor.peek();
    let mut offset = map_note_letter(cursor, letter)?;
    cursor.pos += 1;
    let accidental = cursor.peek();
    if accidental == b'#' {
        if offset == 11 {
            return Err(cursor.error("Note overflow"));
        }
        offset += 1;
        cursor.pos += 1;
    } else if accidental == b'b' {
        if offset == 0 {
            return Err(cursor.error("Note underflow"));
        }
        offset -= 1;
        cursor.pos += 1;
    }
    let octave = cursor.peek();
    if !octave.is_ascii_digit() {
        return Err(cursor.error("Bad note"));
    }
    cursor.pos += 1;
    let note = Note::from_parts(offset, 0, octave - b'0').ok_or_else(|| cursor.error("Bad note"))?;
    sequence.push(Sound { delay_steps, note });
    Ok(())
}

fn parse_sequence(cursor: &mut Cursor<'_>) -> Result<Sequence, ParseError> {
    let mut sequence = Sequence::new();
    let mut delay = 0u32;
    loop {
        match cursor.peek() {
            0 => return Ok(sequence),
            b'\r' | b'\n' => {
                cursor.consume_end_of_line()?;
                return Ok(sequence);
            }
            b',' => {
                delay += 1;
                cursor.pos += 1;
            }
            _ => {
                parse_note(cursor, delay, &mut sequence)?;
                delay = 0;
            }
        }
    }
}

fn read_envelope(cursor: &mut Cursor<'_>, min_value: f32, max_value: f32) -> Result<Envelope, ParseError> {
    let mut changes = Vec::new();
    while let Some(duration) = cursor.try_read_unsigned(0, 60_000)? {
        let mut shape = EnvelopeShape::Linear;
        if let Some(name) = cursor.try_read_identifier()? {
            shape = match name {
                "smooth_quadratic_2" => EnvelopeShape::SmoothQuadratic2,
                "smooth_quadratic_4" => EnvelopeShape::SmoothQuadratic4,
                "sharp_quadratic_2" => EnvelopeShape::SharpQuadratic2,
                "sharp_quadratic_4" => EnvelopeShape::SharpQuadratic4,
                _ => return Err(cursor.error("Unknown envelope shape")),
            };
        }
        let value = cursor.read_float(min_value, max_value)?;
        changes.push(EnvelopeChange::new(duration as f32, value, shape));
    }
    Ok(Envelope::new(changes))
}

fn default_voice() -> VoiceData {
    VoiceData {
        wave_shape: WaveShape::Linear,
        amplitude_envelope: Envelope::default(),
        frequency_envelope: Envelope::default(),
        asymmetry_envelope: Envelope::default(),
        oscillation_envelope: Envelope::default(),
        stereo_delay_ms: 0.0,
        stereo_radius_ms: 0.0,
        stereo_pan: 0.0,
        stereo_inversion: false,
        polyphony: Polyphony::Chord,
    }
}

struct Builder {
    composition: Composition,
}

impl Builder {
    fn parse_command(&mut self, cursor: &mut Cursor<'_>, section: Section, voice_index: Option<usize>, command: &str) -> Result<(), ParseError> {
        let in_voice = |section: Section, cursor: &Cursor<'_>| -> Result<(), ParseError> {
            if section != Section::Voice {
                return Err(cursor.error("Unexpected command"));
            }
            Ok(())
        };
        match command {
            "amplitude" => {
                in_voice(section, cursor)?;
                let envelope = read_envelope(cursor, 0.0, 1.0)?;
                self.voice_mut(voice_index).amplitude_envelope = envelope;
            }
            "asymmetry" => {
                in_voice(section, cursor)?;
                let envelope = read_envelope(cursor, 0.0, 1.0)?;
                self.voice_mut(voice_index).asymmetry_envelope = envelope;
            }
            "frequency" => {
                in_voice(section, cursor)?;
                let envelope = read_envelope(cursor, -1.0, 1.0)?;
                self.voice_mut(voice_index).frequency_envelope = envelope;
            }
            "oscillation" => {
                in_voice(section, cursor)?;
                let envelope = read_envelope(cursor, 0.0, 1.0)?;
                self.voice_mut(voice_index).oscillation_envelope = envelope;
            }
            "loop" => {
                if section != Section::Global {
                    return Err(cursor.error("Unexpected command"));
                }
                self.composition.loop_offset = cursor.read_unsigned(0, u32::MAX)?;
                self.composition.loop_length = cursor.read_unsigned(0, u32::MAX)?;
            }
            "polyphony" => {
                in_voice(section, cursor)?;
                let kind = cursor.read_identifier()?;
                let polyphony = match kind {
                    "chord" => Polyphony::Chord,
                    "full" => Polyphony::Full,
                    _ => return Err(cursor.error("Bad voice polyphony")),
                };
                self.voice_mut(voice_index).polyphony = polyphony;
            }
            "stereo_delay" => {
                in_voice(section, cursor)?;
                let value = cursor.read_float(-1000.0, 1000.0)?;
                self.voice_mut(voice_index).stereo_delay_ms = value;
            }
            "stereo_inversion" => {
                in_voice(section, cursor)?;
                let value = cursor.read_unsigned(0, 1)? == 1;
                self.voice_mut(voice_index).stereo_inversion = value;
            }
            "stereo_pan" => {
                in_voice(section, cursor)?;
                let value = cursor.read_float(-1.0, 1.0)?;
                self.voice_mut(voice_index).stereo_pan = value;
            }
            "stereo_radius" => {
                in_voice(section, cursor)?;
                let value = cursor.read_float(-1000.0, 1000.0)?;
                self.voice_mut(voice_index).stereo_radius_ms = value;
            }
            "wave" => {
                in_voice(section, cursor)?;
                let kind = cursor.read_identifier()?;
                let (mut min_shape, mut max_shape) = (0.0, 0.0);
                let shape = match kind {
                    "linear" => WaveShape::Linear,
                    "smooth_quadratic" => WaveShape::SmoothQuadratic,
                    "sharp_quadratic" => WaveShape::SharpQuadratic,
                    "cubic" => {
                        min_shape = SmoothCubicShaper::MIN_SHAPE;
                        max_shape = SmoothCubicShaper::MAX_SHAPE;
                        WaveShape::SmoothCubic(0.0)
                    }
                    "quintic" => {
                        min_shape = QuinticShaper::MIN_SHAPE;
                        max_shape = QuinticShaper::MAX_SHAPE;
                        WaveShape::Quintic(0.0)
                    }
                    "cosine" => WaveShape::Cosine,
                    _ => return Err(cursor.error("Bad voice wave type")),
                };
                let parameter = cursor.try_read_float(min_shape, max_shape)?.unwrap_or(0.0);
                self.voice_mut(voice_index).wave_shape = match shape {
                    WaveShape::SmoothCubic(_) => WaveShape::SmoothCubic(parameter),
                    WaveShape::Quintic(_) => WaveShape::Quintic(parameter),
                    other => other,
                };
            }
            "speed" => {
                if section != Section::Global {
                    return Err(cursor.error("Unexpected command"));
                }
                self.composition.speed = cursor.read_unsigned(MIN_SPEED, MAX_SPEED)?;
            }
            "title" => {
                if section != Section::Global {
                    return Err(cursor.error("Unexpected command"));
                }
                self.composition.title = cursor.read_string()?;
            }
            "author" => {
                if section != Section::Global {
                    return Err(cursor.error("Unexpected command"));
                }
                self.composition.author = cursor.read_string()?;
            }
            other => return Err(cursor.error(format!("Unknown command \"{other}\""))),
        }
        cursor.end_of_line_expected()
    }

    fn voice_mut(&mut self, voice_index: Option<usize>) -> &mut VoiceData {
        let index = voice_index.expect("command gated behind Section::Voice");
        &mut self.composition.parts[index].voice
    }
}

/// Parses composition text, per the grammar sketched in the format documentation.
pub fn parse(text: &str) -> Result<Composition, ParseError> {
    let mut cursor = Cursor::new(text);
    let mut builder = Builder {
        composition: Composition::new(MIN_SPEED),
    };
    let mut section = Section::Global;
    let mut voice_index: Option<usize> = None;

    loop {
        match cursor.peek() {
            0 => return Ok(builder.composition),
            b'\r' | b'\n' => cursor.consume_end_of_line()?,
            b' ' | b'\t' => {
                while cursor.peek() == b' ' || cursor.peek() == b'\t' {
                    cursor.pos += 1;
                }
            }
            b'0'..=b'9' => match section {
                Section::Sequences => {
                    let part_index = cursor.read_unsigned(1, builder.composition.parts.len() as u32)? as usize - 1;
                    let track_count = builder.composition.parts[part_index].tracks.len() as u32;
                    let track_index = cursor.read_unsigned(1, track_count)? as usize - 1;
                    let track = &mut builder.composition.parts[part_index].tracks[track_index];
                    let expected = track.sequences.len() as u32 + 1;
                    cursor.read_unsigned(expected, expected)?;
                    let sequence = parse_sequence(&mut cursor)?;
                    track.sequences.push(sequence);
                }
                Section::Tracks => {
                    let part_index = cursor.read_unsigned(1, builder.composition.parts.len() as u32)? as usize - 1;
                    let part = &mut builder.composition.parts[part_index];
                    let expected = part.tracks.len() as u32 + 1;
                    cursor.read_unsigned(expected, expected)?;
                    let weight = cursor.try_read_unsigned(1, 255)?.unwrap_or(1);
                    part.tracks.push(TrackData {
                        properties: TrackProperties::new(weight),
                        sequences: Vec::new(),
                        fragments: Vec::new(),
                    });
                }
                Section::Fragments => {
                    let part_index = cursor.read_unsigned(1, builder.composition.parts.len() as u32)? as usize - 1;
                    let track_count = builder.composition.parts[part_index].tracks.len() as u32;
                    let track_index = cursor.read_unsigned(1, track_count)? as usize - 1;
                    let track = &mut builder.composition.parts[part_index].tracks[track_index];
                    while let Some(delay) = cursor.try_read_unsigned(0, u32::MAX)? {
                        let sequence_count = track.sequences.len() as u32;
                        let sequence_index = cursor.read_unsigned(1, sequence_count)? as usize - 1;
                        track.fragments.push(Fragment {
                            delay_steps: delay,
                            sequence_index,
                        });
                    }
                    cursor.consume_end_of_line()?;
                }
                _ => return Err(cursor.error("Unexpected token")),
            },
            b'@' => {
                cursor.pos += 1;
                let name = cursor.read_identifier()?;
                match name {
                    "voice" => {
                        let expected = builder.composition.parts.len() as u32 + 1;
                        cursor.read_unsigned(expected, expected)?;
                        let name = cursor.try_read_string()?;
                        cursor.consume_end_of_line()?;
                        section = Section::Voice;
                        builder.composition.parts.push(PartData {
                            voice: default_voice(),
                            voice_name: name.unwrap_or_default(),
                            tracks: Vec::new(),
                        });
                        voice_index = Some(builder.composition.parts.len() - 1);
                    }
                    "tracks" => {
                        cursor.consume_end_of_line()?;
                        section = Section::Tracks;
                    }
                    "sequences" => {
                        cursor.consume_end_of_line()?;
                        section = Section::Sequences;
                    }
                    "fragments" => {
                        cursor.consume_end_of_line()?;
                        section = Section::Fragments;
                    }
                    other => return Err(cursor.error(format!("Unknown section \"@{other}\""))),
                }
            }
            _ => {
                let command = cursor.read_identifier()?;
                builder.parse_command(&mut cursor, section, voice_index, command)?;
            }
        }
    }
}

fn format_float(value: f32) -> String {
    let rounded = (value.abs() * 100.0).round() as i64;
    let whole = rounded / 100;
    let remainder = rounded % 100;
    let sign = if value < 0.0 { "-" } else { "" };
    if remainder >= 10 {
        format!("{sign}{whole}.{remainder}")
    } else {
        format!("{sign}{whole}.0{remainder}")
    }
}

fn envelope_shape_keyword(shape: EnvelopeShape) -> &'static str {
    match shape {
        EnvelopeShape::Linear => "",
        EnvelopeShape::SmoothQuadratic2 => " smooth_quadratic_2",
        EnvelopeShape::SmoothQuadratic4 => " smooth_quadratic_4",
        EnvelopeShape::SharpQuadratic2 => " sharp_quadratic_2",
        EnvelopeShape::SharpQuadratic4 => " sharp_quadratic_4",
    }
}

fn save_envelope(text: &mut String, name: &str, envelope: &Envelope) {
    if envelope.changes.is_empty() {
        return;
    }
    text.push('\n');
    text.push_str(name);
    for change in &envelope.changes {
        text.push_str(&format!(" {}", change.duration_ms.round() as u32));
        text.push_str(envelope_shape_keyword(change.shape));
        text.push(' ');
        text.push_str(&format_float(change.value));
    }
}

fn note_text(note: Note) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let index = note.index();
    format!("{}{}", NAMES[index % 12], index / 12)
}

/// Serializes `composition` back into text, in the canonical section order.
/// `parse(serialize(parse(text)))` is structurally equal to `parse(text)`.
pub fn serialize(composition: &Composition) -> String {
    let mut text = String::new();
    if !composition.author.is_empty() {
        text.push_str(&format!("\nauthor \"{}\"", composition.author));
    }
    if composition.loop_length > 0 {
        text.push_str(&format!("\nloop {} {}", composition.loop_offset, composition.loop_length));
    }
    text.push_str(&format!("\nspeed {}", composition.speed));
    if !composition.title.is_empty() {
        text.push_str(&format!("\ntitle \"{}\"", composition.title));
    }

    for (part_index, part) in composition.parts.iter().enumerate() {
        text.push_str(&format!("\n\n@voice {}", part_index + 1));
        if !part.voice_name.is_empty() {
            text.push_str(&format!(" \"{}\"", part.voice_name));
        }
        save_envelope(&mut text, "amplitude", &part.voice.amplitude_envelope);
        save_envelope(&mut text, "asymmetry", &part.voice.asymmetry_envelope);
        save_envelope(&mut text, "frequency", &part.voice.frequency_envelope);
        save_envelope(&mut text, "oscillation", &part.voice.oscillation_envelope);
        text.push_str("\npolyphony ");
        text.push_str(match part.voice.polyphony {
            Polyphony::Chord => "chord",
            Polyphony::Full => "full",
        });
        text.push_str(&format!("\nstereo_delay {}", format_float(part.voice.stereo_delay_ms)));
        text.push_str(&format!("\nstereo_inversion {}", part.voice.stereo_inversion as u8));
        text.push_str(&format!("\nstereo_pan {}", format_float(part.voice.stereo_pan)));
        text.push_str(&format!("\nstereo_radius {}", format_float(part.voice.stereo_radius_ms)));
        text.push_str("\nwave ");
        match part.voice.wave_shape {
            WaveShape::Linear => text.push_str("linear"),
            WaveShape::SmoothQuadratic => text.push_str("smooth_quadratic"),
            WaveShape::SharpQuadratic => text.push_str("sharp_quadratic"),
            WaveShape::SmoothCubic(parameter) => text.push_str(&format!("cubic {}", format_float(parameter))),
            WaveShape::Quintic(parameter) => text.push_str(&format!("quintic {}", format_float(parameter))),
            WaveShape::Cosine => text.push_str("cosine"),
        }
    }

    text.push_str("\n\n@tracks");
    for (part_index, part) in composition.parts.iter().enumerate() {
        for (track_index, track) in part.tracks.iter().enumerate() {
            text.push_str(&format!(
                "\n{} {} {}",
                part_index + 1,
                track_index + 1,
                track.properties.weight
            ));
        }
    }

    text.push_str("\n\n@sequences");
    for (part_index, part) in composition.parts.iter().enumerate() {
        for (track_index, track) in part.tracks.iter().enumerate() {
            for (sequence_index, sequence) in track.sequences.iter().enumerate() {
                text.push_str(&format!(
                    "\n{} {} {}",
                    part_index + 1,
                    track_index + 1,
                    sequence_index + 1
                ));
                if !sequence.is_empty() {
                    text.push(' ');
                }
                for sound in sequence {
                    for _ in 0..sound.delay_steps {
                        text.push(',');
                    }
                    text.push_str(&note_text(sound.note));
                }
            }
        }
    }

    text.push_str("\n\n@fragments");
    for (part_index, part) in composition.parts.iter().enumerate() {
        for (track_index, track) in part.tracks.iter().enumerate() {
            text.push_str(&format!("\n{} {}", part_index + 1, track_index + 1));
            for fragment in &track.fragments {
                text.push_str(&format!(" {} {}", fragment.delay_steps, fragment.sequence_index + 1));
            }
        }
    }
    text.push('\n');

    text.trim_start_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "speed 4\n\n@voice 1 \"lead\"\namplitude 100 1.0\nwave linear\npolyphony chord\nstereo_delay 0.0\nstereo_inversion 0\nstereo_pan 0.0\nstereo_radius 0.0\n\n@tracks\n1 1 255\n\n@sequences\n1 1 1 A4\n\n@fragments\n1 1 0 1\n";

    #[test]
    fn parses_minimal_composition() {
        let composition = parse(SIMPLE).unwrap();
        assert_eq!(composition.speed, 4);
        assert_eq!(composition.parts.len(), 1);
        assert_eq!(composition.parts[0].voice_name, "lead");
        assert_eq!(composition.parts[0].tracks[0].sequences[0][0].note, Note::A4);
    }

    #[test]
    fn rejects_out_of_order_index() {
        let text = "speed 4\n\n@voice 1\n\n@tracks\n1 2 1\n";
        let error = parse(text).unwrap_err();
        assert_eq!(error.message, "Number is out of range");
    }

    #[test]
    fn reports_line_and_column_for_unknown_command() {
        let text = "bogus 1\n";
        let error = parse(text).unwrap_err();
        assert_eq!(error.line, 1);
        assert!(error.message.contains("Unknown command"));
    }

    #[test]
    fn round_trips_through_serialize() {
        let composition = parse(SIMPLE).unwrap();
        let text = serialize(&composition);
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.speed, composition.speed);
        assert_eq!(
            reparsed.parts[0].tracks[0].sequences[0][0].note,
            composition.parts[0].tracks[0].sequences[0][0].note
        );
    }

    #[test]
    fn note_with_sharp_and_flat_resolves_correctly() {
        let mut cursor = Cursor::new("C#4");
        let mut sequence = Sequence::new();
        parse_note(&mut cursor, 0, &mut sequence).unwrap();
        assert_eq!(sequence[0].note, Note::Db4);
    }
}
