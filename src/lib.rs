//! scorewave: a compact text format for musical compositions and the synthesis
//! engine that renders it to PCM.
//!
//! Text goes in via [`composition::Composition::create`]; PCM frames come out via
//! [`composition::Renderer`]. Everything in between — shapers, envelopes,
//! modulators, the period state machine, voices, and per-track polyphony — is
//! exposed as its own module so the pipeline can be exercised or extended a stage
//! at a time.

pub mod composition;
pub mod envelope;
pub mod error;
pub mod format;
pub mod modulator;
pub mod note;
pub mod parser;
pub mod period;
pub mod shaper;
pub mod track;
pub mod voice;

pub use composition::{Composition, Renderer};
pub use error::ParseError;
pub use format::{AudioFormat, ChannelLayout, RenderConfig};
pub use note::Note;
