//! Run-log parsing benchmark suite
//!
//! The results collector reads one log per iteration; large sessions produce
//! logs with one line per executed transaction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kernel_tps_bench::results::{parse_log, parse_timing};

fn synthetic_log(executes: usize) -> String {
    let mut log = String::from("\"StartOfLevel\"\n\"Deploy\"\n");
    for i in 0..executes {
        if i % 100 == 0 {
            log.push_str("{\"Info\":\"Internal message: transfer\"}\n");
        }
        log.push_str("{\"Execute\":\"0x0000000000000000000000000000000000000000000000000000000000000001\"}\n");
    }
    log.push_str("\"EndOfLevel\"\nRun took 1.234567s\n");
    log
}

fn bench_parse_log(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_log");
    for executes in [1_000usize, 10_000, 100_000] {
        let log = synthetic_log(executes);
        group.throughput(Throughput::Bytes(log.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(executes), &log, |b, log| {
            b.iter(|| black_box(parse_log(black_box(log.as_bytes())).unwrap()))
        });
    }
    group.finish();
}

fn bench_parse_timing(c: &mut Criterion) {
    c.bench_function("parse_timing", |b| {
        b.iter(|| black_box(parse_timing(black_box("Run took 1.234567s"))))
    });
}

criterion_group!(benches, bench_parse_log, bench_parse_timing);
criterion_main!(benches);
