//! Projection table build and per-frame remap throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use panorama_streamer::capture::{FrameSource, SyntheticSource};
use panorama_streamer::compose::SeamBlender;
use panorama_streamer::projection::{remap, CalibrationSet, ProjectionMapper, Resolution};

fn bench_table_build(c: &mut Criterion) {
    let calibration = CalibrationSet::default();
    let source = Resolution::new(1920, 960);
    let output = Resolution::new(960, 480);

    c.bench_function("table_build_960x480", |b| {
        b.iter(|| ProjectionMapper::build(black_box(&calibration), output, source))
    });
}

fn bench_remap_and_blend(c: &mut Criterion) {
    let source = Resolution::new(1920, 960);
    let output = Resolution::new(1920, 960);
    let table = ProjectionMapper::build(&CalibrationSet::default(), output, source);
    let raw = SyntheticSource::new(source.width, source.height, 1000)
        .read_frame()
        .expect("synthetic frame");
    let blender = SeamBlender::from_percent(output.width, 10);

    c.bench_function("remap_1920x960", |b| {
        b.iter(|| remap(black_box(&raw), &table, 0))
    });

    let panorama = remap(&raw, &table, 0);
    c.bench_function("seam_blend_1920x960", |b| {
        b.iter(|| blender.blend(black_box(&panorama)))
    });
}

criterion_group!(benches, bench_table_build, bench_remap_and_blend);
criterion_main!(benches);
