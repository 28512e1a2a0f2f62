//! Offline WAV rendering for scorewave.
//!
//! Renders a composition text file to a WAV file instead of real-time playback.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{error, info};
use scorewave::format::{AudioFormat, ChannelLayout};
use scorewave::{Composition, Renderer};

#[derive(Parser)]
#[command(name = "scorewave-render")]
#[command(about = "Render a composition text file to a WAV file", long_about = None)]
struct Args {
    /// Path to the composition text source.
    composition: PathBuf,

    /// Output WAV file path.
    #[arg(short, long)]
    output: PathBuf,

    /// Sampling rate, Hz (8000..=48000).
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Number of output channels.
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Loop the composition's loop window instead of stopping once it ends.
    #[arg(long)]
    looping: bool,

    /// Maximum duration to render, in seconds. Required when `--looping` is set
    /// (a looping render never stops on its own).
    #[arg(short, long)]
    duration: Option<f32>,

    /// Skip gain normalization (renders at the composition's authored gain divisor).
    #[arg(long)]
    no_normalize: bool,

    /// Print a JSON summary of the composition instead of rendering.
    #[arg(long)]
    dump_json: bool,
}

#[derive(serde::Serialize)]
struct CompositionSummary {
    speed: u32,
    parts: usize,
    has_loop: bool,
    title: String,
    author: String,
}

fn main() {
    env_logger_init();
    let args = Args::parse();

    let text = match fs::read_to_string(&args.composition) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to read {}: {e}", args.composition.display());
            std::process::exit(1);
        }
    };

    let mut composition = match Composition::create(&text) {
        Ok(composition) => composition,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if args.dump_json {
        let summary = CompositionSummary {
            speed: composition.speed,
            parts: composition.parts.len(),
            has_loop: composition.has_loop(),
            title: composition.title.clone(),
            author: composition.author.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&summary).unwrap());
        return;
    }

    if args.looping && args.duration.is_none() {
        error!("--looping requires --duration");
        std::process::exit(1);
    }

    if !args.no_normalize {
        composition.normalize_gain(48_000.max(args.sample_rate));
    }

    let channels = if args.channels == 1 { ChannelLayout::Mono } else { ChannelLayout::Stereo };
    let Some(format) = AudioFormat::new(args.sample_rate, channels) else {
        error!("sample rate {} out of supported range", args.sample_rate);
        std::process::exit(1);
    };

    let mut renderer = Renderer::create(Arc::new(composition), format, args.looping).expect("renderer construction");

    let total_frames = args.duration.map(|seconds| (seconds * args.sample_rate as f32) as u64);
    const BLOCK_FRAMES: u32 = 4096;
    let mut block = vec![0.0f32; BLOCK_FRAMES as usize * format.channel_count() as usize];

    let spec = WavSpec {
        channels: format.channel_count(),
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec).expect("failed to create WAV file");

    let mut written_frames = 0u64;
    loop {
        if let Some(limit) = total_frames {
            if written_frames >= limit {
                break;
            }
        }
        let request = total_frames
            .map(|limit| (limit - written_frames).min(BLOCK_FRAMES as u64) as u32)
            .unwrap_or(BLOCK_FRAMES);
        let produced = renderer.render(&mut block, request);
        if produced == 0 {
            break;
        }
        let sample_count = produced as usize * format.channel_count() as usize;
        for &sample in &block[..sample_count] {
            writer.write_sample(sample).expect("failed to write sample");
        }
        written_frames += produced as u64;
    }
    writer.finalize().expect("failed to finalize WAV");

    info!(
        "rendered {} frames ({:.2}s) to {} ({} Hz, {} ch)",
        written_frames,
        written_frames as f32 / args.sample_rate as f32,
        args.output.display(),
        args.sample_rate,
        format.channel_count()
    );
}

fn env_logger_init() {
    let _ = env_logger::try_init();
}
