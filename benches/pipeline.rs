use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reverbrt::control::ControlMessage;
use reverbrt::pipeline::Pipeline;
use reverbrt::{AmplifierSettings, ReverbSettings};

const FRAMES: usize = 1024;
const CHANNELS: usize = 2;

fn configured_pipeline(taps: u32) -> Pipeline {
    let pipeline = Pipeline::new(CHANNELS);
    pipeline.apply_message(ControlMessage::ReverbSettings(ReverbSettings {
        enabled: true,
        decay: 0.5,
        delay_samples: 2205,
        wet_level: 0.3,
        taps,
        allow_clipping: false,
    }));
    pipeline.apply_message(ControlMessage::AmplifierSettings(AmplifierSettings {
        scale: 1.5,
        enabled: true,
        allow_clipping: false,
    }));
    pipeline
}

fn bench_pipeline(c: &mut Criterion) {
    let input: Vec<f32> = (0..FRAMES * CHANNELS)
        .map(|i| ((i as f32) * 0.01).sin() * 0.5)
        .collect();

    for taps in [1u32, 4, 8] {
        let pipeline = configured_pipeline(taps);
        let mut block = input.clone();
        c.bench_function(&format!("pipeline_1024x2_{}_taps", taps), |b| {
            b.iter(|| {
                block.copy_from_slice(&input);
                pipeline.process(black_box(&mut block), CHANNELS);
            })
        });
    }
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
