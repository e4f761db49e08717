use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use egtb::{
    BlockCache, CacheConfig, ChunkKey, Color, Enumerator, IndexCalculator, Position, ProbeResult,
};

fn calculator(name: &str, turn: Color, enumerator: &Enumerator) -> IndexCalculator {
    IndexCalculator::new(name.parse().expect("valid composition"), turn, enumerator)
}

fn bench_enumerator(c: &mut Criterion) {
    c.bench_function("enumerator", |b| b.iter(Enumerator::new));
}

fn bench_calculator(c: &mut Criterion) {
    let enumerator = Enumerator::new();
    c.bench_function("calculator_krpkp", |b| {
        b.iter(|| calculator(black_box("krpkp"), Color::White, &enumerator))
    });
}

fn bench_index(c: &mut Criterion) {
    let enumerator = Enumerator::new();
    let mut group = c.benchmark_group("index");

    let krk = calculator("krk", Color::White, &enumerator);
    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    group.bench_function("krk", |b| b.iter(|| krk.index_unchecked(black_box(&pos))));

    let diagonal: Position = "8/8/8/8/8/2k5/8/KR6 w - -".parse().expect("valid");
    group.bench_function("krk_diagonal", |b| {
        b.iter(|| krk.index_unchecked(black_box(&diagonal)))
    });

    let kppkp = calculator("kppkp", Color::White, &enumerator);
    let pos: Position = "4k3/8/8/3pP3/8/8/2P5/4K3 w - d6".parse().expect("valid");
    group.bench_function("kppkp_ep", |b| b.iter(|| kppkp.index_unchecked(black_box(&pos))));

    let kqkrn = calculator("kqkrn", Color::Black, &enumerator);
    let pos: Position = "4k3/2n5/8/8/5r2/8/8/Q3K3 b - -".parse().expect("valid");
    group.bench_function("kqkrn", |b| b.iter(|| kqkrn.index_unchecked(black_box(&pos))));

    group.finish();
}

fn bench_unindex(c: &mut Criterion) {
    let enumerator = Enumerator::new();
    let kqkr = calculator("kqkr", Color::White, &enumerator);
    c.bench_function("unindex_kqkr", |b| {
        b.iter(|| kqkr.unindex(black_box(1_000_000)))
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let cache = BlockCache::new(CacheConfig::default(), 2);
    let key = ChunkKey {
        table: 1,
        side: Color::White,
        chunk: 7,
    };
    let fill = |buf: &mut [u8]| -> ProbeResult<usize> {
        buf[..8192].fill(3);
        Ok(8192)
    };
    cache.read::<1, _>(key, 0, fill).expect("fill");
    c.bench_function("cache_hit", |b| {
        b.iter(|| cache.read::<1, _>(black_box(key), 100, fill))
    });
}

criterion_group!(
    benches,
    bench_enumerator,
    bench_calculator,
    bench_index,
    bench_unindex,
    bench_cache_hit
);
criterion_main!(benches);
