use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kspec::expr::{eval_literal, simplify};
use kspec::fold::{fold, Bindings};
use kspec::rewrite::rewrite_allocations;

// Benchmark scenarios mirror the shapes the verified pipeline emits:
// identity-wrapped size expressions and scratch-buffer kernels.

const SIZE_EXPRS: [(&str, &str); 3] = [
    ("plain", "N"),
    ("wrapped", "((N) * (M) - (0))"),
    ("deep", "(((W + 2) * ((H + 2) - (0)) - (0)) + (0))"),
];

const KERNEL: &str = "\
void blurtwo(int W, int H, float* img, float* output) {
  float *t0 = calloc(((W) * (H) - (0)), sizeof(float));
  float *t1 = calloc((W) * (H), sizeof(float));
  for (int i = 0; i < (W) * (H); i++) {
    t0[i - 0] = img[i] * 0.2;
  }
  for (int i = 0; i < (W) * (H); i++) {
    t1[i] = t0[i - 0] + img[i + 0];
  }
  for (int i = 0; i < W * H; i++) {
    output[i] = t1[i];
  }
  free(t0);
  free(t1);
}
";

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplify");
    for (name, expr) in SIZE_EXPRS {
        group.bench_with_input(BenchmarkId::from_parameter(name), expr, |b, expr| {
            b.iter(|| simplify(black_box(expr)));
        });
    }
    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    c.bench_function("eval_literal", |b| {
        b.iter(|| eval_literal(black_box("((60 + 4) * (100 - 36)) / 2")));
    });
}

fn bench_fold(c: &mut Criterion) {
    let mut bindings = Bindings::new();
    bindings.bind("W", 640);
    bindings.bind("H", 480);
    c.bench_function("fold_kernel", |b| {
        b.iter(|| fold(black_box(KERNEL), &bindings));
    });
}

fn bench_rewrite(c: &mut Criterion) {
    c.bench_function("rewrite_kernel", |b| {
        b.iter(|| rewrite_allocations(black_box(KERNEL)));
    });
}

criterion_group!(benches, bench_simplify, bench_eval, bench_fold, bench_rewrite);
criterion_main!(benches);
