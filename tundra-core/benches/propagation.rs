//! Cascade throughput over long dependency chains.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tundra_core::{CellId, CellKind, EngineConfig, Notebook};

/// A chain `c0 = 1`, `c{n} = c{n-1} + 1`.
fn chain(len: usize) -> (Notebook, CellId) {
    let mut notebook = Notebook::new(EngineConfig::default());
    let head = notebook.push(CellKind::Code, "1").expect("push head");
    for n in 1..len {
        notebook
            .push(CellKind::Code, format!("c{} + 1", n - 1))
            .expect("push link");
    }
    (notebook, head)
}

fn bench_chain_edit(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");
    let mut group = c.benchmark_group("chain_edit");

    for len in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (mut notebook, head) = chain(len);
            rt.block_on(notebook.settle());
            let mut seed = 0u64;

            b.iter(|| {
                seed += 1;
                notebook.edit(head, seed.to_string()).expect("edit head");
                rt.block_on(notebook.settle());
                black_box(notebook.state(head));
            });
        });
    }

    group.finish();
}

fn bench_build_and_settle(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");

    c.bench_function("build_and_settle_100", |b| {
        b.iter(|| {
            let (mut notebook, _) = chain(100);
            rt.block_on(notebook.settle());
            black_box(notebook.len());
        });
    });
}

criterion_group!(benches, bench_chain_edit, bench_build_and_settle);
criterion_main!(benches);
