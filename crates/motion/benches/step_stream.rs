use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::command::{chase_steps, collapse_runs};
use motion::Steps;

fn benchmark_chase_steps(c: &mut Criterion) {
    c.bench_function("chase_long_diagonal", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            chase_steps(
                &mut out,
                black_box(&Steps([0, 0, 0, 0])),
                black_box(&Steps([20_000, 15_000, -3_000, 0])),
            );
            out
        })
    });
}

fn benchmark_collapse(c: &mut Criterion) {
    let mut stream = Vec::new();
    chase_steps(&mut stream, &Steps([0, 0, 0, 0]), &Steps([20_000, 15_000, -3_000, 0]));
    c.bench_function("collapse_runs", |b| {
        b.iter(|| collapse_runs(black_box(&stream)))
    });
}

criterion_group!(benches, benchmark_chase_steps, benchmark_collapse);
criterion_main!(benches);
