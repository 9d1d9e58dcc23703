use criterion::{black_box, criterion_group, criterion_main, Criterion};

use piecework::parse::{byteparser::ByteParser, Parser};

const INPUT: &[u8] = b"This is a sample buffer we wish to parse out, two bytes at a time, or else in one go.";

fn take_u16_bench(c: &mut Criterion) {
    c.bench_function("byteparser_take_u16", |b| {
        b.iter(|| {
            let mut p = ByteParser::new(black_box(INPUT));
            while let Ok(x) = p.take_u16() {
                black_box(x);
            }
        })
    });
}

fn take_dynamic_bench(c: &mut Criterion) {
    c.bench_function("byteparser_take_dynamic", |b| {
        b.iter(|| {
            let mut p = ByteParser::new(black_box(INPUT));
            black_box(p.take_dynamic(INPUT.len()).unwrap())
        })
    });
}

criterion_group! {
    name = parser_benches;
    config = Criterion::default();
    targets = take_u16_bench, take_dynamic_bench
}

criterion_main!(parser_benches);
