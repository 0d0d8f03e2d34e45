use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ghostvec::{Context, NormType, UniverseComm, Vector};

fn bench_vector_kernels(c: &mut Criterion) {
    let ctx = Context::new(UniverseComm::Serial);
    let mut group = c.benchmark_group("vector kernels");
    for n in [1_000usize, 100_000] {
        let x = Vector::<f64>::with_sizes(&ctx, Some(n), None, 1).unwrap();
        let mut y = x.duplicate().unwrap();
        {
            let mut view = x.write_local().unwrap();
            for (i, v) in view.as_mut_slice().unwrap().iter_mut().enumerate() {
                *v = (i as f64).sin();
            }
        }
        y.fill(0.5).unwrap();

        group.bench_with_input(BenchmarkId::new("axpy", n), &n, |b, _| {
            b.iter(|| y.axpy(black_box(1e-6), &x).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("dot", n), &n, |b, _| {
            b.iter(|| black_box(x.dot(&y).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("norm2", n), &n, |b, _| {
            b.iter(|| black_box(x.norm(NormType::Two).unwrap()))
        });
    }
    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let ctx = Context::new(UniverseComm::Serial);
    let n = 10_000;
    let mut v = Vector::<f64>::with_sizes(&ctx, Some(n), None, 1).unwrap();
    let idx: Vec<usize> = (0..n).step_by(7).collect();
    let vals = vec![1.0; idx.len()];
    c.bench_function("staged writes + assembly", |b| {
        b.iter(|| {
            v.with_assembly(|v| v.set_values(&idx, &vals, ghostvec::InsertMode::Insert))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_vector_kernels, bench_assembly);
criterion_main!(benches);
