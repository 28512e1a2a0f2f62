//! Benchmarks the composition renderer's hot path: mixed chord polyphony across
//! several tracks at a typical real-time block size.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use scorewave::format::{AudioFormat, ChannelLayout};
use scorewave::{Composition, Renderer};

const SOURCE: &str = "\
speed 8

@voice 1 \"lead\"
amplitude 20 1.0 400 0.6 200 0.0
frequency 0 0.0
asymmetry 0 0.5
oscillation 0 0.0
polyphony chord
stereo_delay 0.0
stereo_inversion 0
stereo_pan 0.0
stereo_radius 0.0
wave cubic 1.5

@voice 2 \"bass\"
amplitude 10 1.0 600 0.0
frequency 0 0.0
asymmetry 0 0.3
oscillation 0 0.0
polyphony full
stereo_delay 0.0
stereo_inversion 0
stereo_pan 0.0
stereo_radius 0.0
wave sharp_quadratic

@tracks
1 1 255
2 1 255

@sequences
1 1 1 C4,E4,G4,,C5,,,G4,E4,,C4
2 1 1 C3,,,,,,,G2,,,,,,,

@fragments
1 1 0 1
2 1 0 1
";

fn render_block(c: &mut Criterion) {
    let composition = Composition::create(SOURCE).expect("bench composition parses");
    let format = AudioFormat::new(44_100, ChannelLayout::Stereo).unwrap();

    c.bench_function("render_4096_frames", |b| {
        b.iter_batched(
            || Renderer::create(Arc::new(composition.clone()), format, true).unwrap(),
            |mut renderer| {
                let mut buffer = vec![0.0f32; 4096 * format.channel_count() as usize];
                renderer.render(&mut buffer, 4096);
                buffer
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, render_block);
criterion_main!(benches);
