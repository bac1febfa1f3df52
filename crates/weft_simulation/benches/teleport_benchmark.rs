//! # Teleport Selection Benchmark
//!
//! Per-sync cost of the clothing decisions:
//! 1. Mode selection from two root poses
//! 2. Bone-name mapping for a full skeleton

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_shared::{Mat44, Vec3};
use weft_simulation::clothing::{build_bone_mapping, select_teleport_mode};
use weft_simulation::{TeleportRequest, TeleportThresholds};

fn bench_select_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("teleport_select");
    let thresholds = TeleportThresholds::default();
    let poses: Vec<Mat44> = (0..256)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 * 0.05;
            Mat44::from_axis_angle(Vec3::Y, t).with_position(Vec3::new(t, 0.0, 0.0))
        })
        .collect();

    group.throughput(criterion::Throughput::Elements(poses.len() as u64 - 1));
    group.bench_function("consecutive_poses", |b| {
        b.iter(|| {
            for pair in poses.windows(2) {
                black_box(select_teleport_mode(
                    TeleportRequest::default(),
                    Some(&pair[0]),
                    &pair[1],
                    &thresholds,
                ));
            }
        });
    });
    group.finish();
}

fn bench_bone_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("bone_mapping");
    for bones in [16_usize, 64, 128] {
        let skeleton: Vec<String> = (0..bones).map(|i| format!("Bone_{i:03}")).collect();
        let asset: Vec<String> = (0..bones).rev().map(|i| format!("bone-{i:03}")).collect();
        group.bench_with_input(BenchmarkId::from_parameter(bones), &bones, |b, _| {
            b.iter(|| black_box(build_bone_mapping(&asset, &skeleton)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select_mode, bench_bone_mapping);
criterion_main!(benches);
