//! Benchmarks for the relocation pass.
//!
//! Measures rewriting a dictionary of typical composition (colon definitions with code fields,
//! primitive calls, references and literals) for each dispatch strategy, plus the full load path.

extern crate forthboot;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forthboot::{
    config::Config,
    engine::{CodeFieldKind, DispatchStrategy, Engine, MachineState, PrimitiveTable},
    file::io::WORD,
    image::{header::HEADER_WORDS, magic::MAGIC_LEN, ImageBuilder, ImageHeader, Relocator},
};
use std::hint::black_box;

struct Table {
    table: PrimitiveTable,
    strategy: DispatchStrategy,
}

impl Engine for Table {
    fn primitives(&self) -> &PrimitiveTable {
        &self.table
    }

    fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    fn dispatch(&mut self, _state: MachineState) -> i32 {
        0
    }
}

fn table() -> PrimitiveTable {
    let entries: Vec<usize> = (1..=256).map(|index| 0x40_0000 + index * 0x20).collect();
    PrimitiveTable::new(&entries).unwrap()
}

/// Builds `definitions` colon definitions of eight words each.
fn dictionary(definitions: usize) -> Vec<u8> {
    let mut builder = ImageBuilder::new();
    let mut previous = builder.here();
    for index in 0..definitions {
        let here = builder.push_code_field(CodeFieldKind::DoCol);
        builder.push_primitive(8 + index % 200);
        builder.push_literal(index as isize);
        builder.push_offset(previous);
        builder.push_primitive(9);
        builder.push_null();
        builder.push_primitive(10 + index % 50);
        builder.push_offset(here);
        previous = here;
    }
    builder.set_boot_entry(previous).set_throw_entry(previous);
    builder.build()
}

/// Benchmark the relocation pass alone, per strategy.
fn bench_relocate(c: &mut Criterion) {
    let table = table();
    let bytes = dictionary(2048);
    let header = ImageHeader::from_bytes(&bytes[MAGIC_LEN..]).unwrap();
    let image_end = MAGIC_LEN + header.image_size;

    let mut group = c.benchmark_group("relocate");
    group.throughput(Throughput::Elements(
        (header.image_size / WORD - HEADER_WORDS) as u64,
    ));

    for strategy in [
        DispatchStrategy::Direct,
        DispatchStrategy::Indirect,
        DispatchStrategy::DoublyIndirect,
    ] {
        let relocator = Relocator::new(&table, strategy);
        group.bench_with_input(BenchmarkId::from_parameter(strategy), &bytes, |b, bytes| {
            b.iter_batched(
                || bytes[MAGIC_LEN..image_end].to_vec(),
                |mut image| {
                    let stats = relocator
                        .relocate(&mut image, &bytes[image_end..], 0x10_0000)
                        .unwrap();
                    black_box((image, stats))
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark the whole load path: allocation, copy, relocation and checksum.
fn bench_load(c: &mut Criterion) {
    let engine = Table {
        table: table(),
        strategy: DispatchStrategy::Indirect,
    };
    let config = Config::new();
    let bytes = dictionary(2048);

    c.bench_function("load_image", |b| {
        b.iter(|| {
            let image = forthboot::image::ImageLoader::new(&config, &engine)
                .load(black_box(&bytes))
                .unwrap();
            black_box(image.address())
        });
    });
}

criterion_group!(benches, bench_relocate, bench_load);
criterion_main!(benches);
