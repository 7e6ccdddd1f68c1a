//! Container parsing and verification throughput.
//!
//! Measures `ExecutableDef::parse` (structure + HSACO header checks) across
//! export counts typical of compiled models.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use hip_hal::executable_def::{ExecutableDef, ExportDebugInfo, ExportDef, FileLineLoc, ModuleDef};
use hip_hal::hsaco::minimal_image;

const GFX942: u32 = 0x04c;

fn build_container(module_count: usize, export_count: usize) -> Vec<u8> {
    let image = minimal_image(GFX942);
    let names: Vec<String> = (0..export_count)
        .map(|i| format!("main_dispatch_{i}_generic"))
        .collect();
    ExecutableDef {
        modules: vec![ModuleDef { hsaco_image: &image }; module_count],
        source_files: Vec::new(),
        exports: names
            .iter()
            .enumerate()
            .map(|(i, name)| ExportDef {
                module_ordinal: (i % module_count) as u32,
                kernel_name: name,
                block_dims: [256, 1, 1],
                block_shared_memory_size: 16 * 1024,
                debug_info: ExportDebugInfo {
                    name: None,
                    location: Some(FileLineLoc {
                        filename: "model.mlir",
                        line: i as u32 + 1,
                    }),
                },
            })
            .collect(),
    }
    .encode()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("executable_def/parse");
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(3));

    for &(modules, exports) in &[(1usize, 1usize), (1, 64), (4, 256), (16, 2048)] {
        let data = build_container(modules, exports);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{modules}m_{exports}e")),
            &data,
            |bench, data| {
                bench.iter(|| {
                    let def = ExecutableDef::parse(black_box(data)).unwrap();
                    black_box(def.exports.len());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
