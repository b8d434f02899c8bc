//! Benchmarks for statement splitting
//!
//! Measures tokenizing and splitting generated scripts of increasing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stmtflow_sql::{split, Lexer};

/// Generate a two-session script with N statement pairs
fn generate_script(num_pairs: usize) -> String {
    let mut script = String::from("/* init */ create table t (id int primary key, v varchar(64));\n");
    for i in 0..num_pairs {
        script.push_str(&format!(
            "/* s1 */ insert into t values ({}, 'value;{}'); -- row {}\n",
            i, i, i
        ));
        script.push_str(&format!(
            "/* s2:wait */ select id, v\n  from t\n  where id = {};\n",
            i
        ));
    }
    script
}

fn bench_lexer(c: &mut Criterion) {
    let script = generate_script(500);

    c.bench_function("lex_1000_statements", |b| {
        b.iter(|| black_box(Lexer::new(&script).count()));
    });
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for size in [10, 100, 1000] {
        let script = generate_script(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &script, |b, script| {
            b.iter(|| black_box(split(script)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lexer, bench_split);
criterion_main!(benches);
