use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use luanext_analysis::{AnalysisOptions, Compilation, SyntaxRef};

fn bare_options() -> AnalysisOptions {
    AnalysisOptions {
        load_builtins: false,
        ..Default::default()
    }
}

fn generate_synthetic_locals(count: usize) -> String {
    let mut code = String::new();
    for i in 0..count {
        code.push_str(&format!("local x{} = 1 + 2 * 3\n", i));
        code.push_str(&format!("local y{} = \"test\" .. x{}\n", i, i));
        code.push_str(&format!("local z{} = x{} and y{} ~= nil\n", i, i, i));
    }
    code
}

fn generate_dependency_chain(length: usize) -> String {
    // each local waits on the next one, declared later as a global
    let mut code = String::new();
    for i in 0..length {
        code.push_str(&format!("local l{} = g{}\n", i, i));
    }
    for i in 0..length {
        code.push_str(&format!("g{} = {}\n", i, i));
    }
    code
}

fn generate_class_hierarchy(depth: usize) -> String {
    let mut code = String::from("---@class C0\n---@field value integer\nlocal C0 = {}\n");
    for i in 1..=depth {
        code.push_str(&format!("---@class C{} : C{}\nlocal C{} = {{}}\n", i, i - 1, i));
    }
    code.push_str(&format!("---@type C{}\nlocal leaf\nlocal v = leaf.value\n", depth));
    code
}

fn bench_add_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_document");
    for count in [10, 100, 500] {
        let source = generate_synthetic_locals(count);
        group.bench_with_input(BenchmarkId::new("locals", count), &source, |b, source| {
            b.iter(|| {
                let mut compilation = Compilation::new(bare_options());
                black_box(compilation.add_document("bench.lua", source));
            })
        });
    }
    for length in [10, 100] {
        let source = generate_dependency_chain(length);
        group.bench_with_input(BenchmarkId::new("dependency_chain", length), &source, |b, source| {
            b.iter(|| {
                let mut compilation = Compilation::new(bare_options());
                black_box(compilation.add_document("bench.lua", source));
            })
        });
    }
    group.finish();
}

fn bench_member_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("member_lookup");
    for depth in [5, 50] {
        let mut compilation = Compilation::new(bare_options());
        let doc = compilation.add_document("bench.lua", &generate_class_hierarchy(depth));
        let expr = compilation
            .syntax(doc)
            .and_then(|tree| tree.find_expr("leaf.value"))
            .expect("member expression");
        group.bench_with_input(BenchmarkId::new("supers", depth), &expr, |b, expr| {
            b.iter(|| {
                let mut ctx = compilation.search_context();
                black_box(ctx.infer(SyntaxRef::new(doc, *expr)));
            })
        });
    }
    group.finish();
}

fn bench_builtins(c: &mut Criterion) {
    c.bench_function("load_builtins", |b| {
        b.iter(|| black_box(Compilation::default()));
    });
}

criterion_group!(benches, bench_add_document, bench_member_lookup, bench_builtins);
criterion_main!(benches);
