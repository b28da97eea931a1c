//! Per-frame hot path benchmarks: the rainbow particle step and LED dot
//! detection. Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use subburn::effects::{detect_dots, RainbowEffect, LED_TILE_SIZE};
use subburn::raster::Surface;

fn bench_rainbow_step(c: &mut Criterion) {
    let mut effect = RainbowEffect::new(1280, 720, 1);
    let mut aux = Surface::new(1280, 720).expect("create scratch surface");

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(30);

    group.bench_function("rainbow_advance_720p", |b| {
        b.iter(|| {
            effect.advance_and_draw(&mut aux);
            black_box(aux.pixels().len())
        });
    });

    group.finish();
}

fn bench_led_detection(c: &mut Criterion) {
    // Synthetic text-ish buffer: a band of lit pixels across the middle.
    let (width, height) = (1280u32, 720u32);
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    for y in 300..420 {
        for x in 100..1180 {
            if (x / 12 + y / 12) % 2 == 0 {
                let idx = ((y * width + x) * 4) as usize;
                pixels[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }

    let mut group = c.benchmark_group("render_frame");
    group.sample_size(50);

    group.bench_function("led_detect_720p", |b| {
        b.iter(|| black_box(detect_dots(&pixels, width, height, LED_TILE_SIZE)).len());
    });

    group.finish();
}

criterion_group!(benches, bench_rainbow_step, bench_led_detection);
criterion_main!(benches);
