//! Compilation and decompilation throughput.
//!
//! Rule files are generated with a growing number of `if` blocks so the
//! benchmarks cover string interning, condition parsing and jump fixups.

use config_rules::batch::compile_batch;
use config_rules::config::{BatchConfig, CompileOptions};
use config_rules::{compile, decompile, Compiler};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Generate a rule file with `blocks` if/elseif/else blocks.
fn generate_rules(blocks: usize) -> String {
    let mut source = String::from("// version:1\nset:(Profile=\"default\")\n");
    for i in 0..blocks {
        source.push_str(&format!(
            "if:((SourceType=SRC_DeviceModel,CompareType=CMP_Regex,MatchString=\"^SM-G{i}[0-9]+\"))\n\
             \tset:(Profile=\"p{i}\",r.Pool=\"{}\")\n\
             elseif:((SourceType=SRC_GPUFamily,CompareType=CMP_ContainsIgnore,MatchString=\"Adreno {i}\"))\n\
             \tset:(APPEND_Cmd=\" -a{i}\")\n\
             else:\n\
             \tclear:(Tmp{i})\n\
             endif:\n",
            i * 64
        ));
    }
    source
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for blocks in [10, 100, 1000] {
        let source = generate_rules(blocks);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &source, |b, source| {
            let compiler = Compiler::new();
            b.iter(|| black_box(compiler.compile(black_box(source))))
        });
    }
    group.finish();
}

fn bench_decompile(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompile");
    for blocks in [10, 100, 1000] {
        let bytes = compile(&generate_rules(blocks), false).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &bytes, |b, bytes| {
            b.iter(|| black_box(decompile(black_box(bytes), false)))
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let sources: Vec<(String, String)> = (0..64)
        .map(|i| (format!("rules_{i}.txt"), generate_rules(50)))
        .collect();
    let options = CompileOptions::default();

    let mut group = c.benchmark_group("batch_compile");
    group.bench_function("sequential", |b| {
        let config = BatchConfig {
            enable_parallelism: false,
            ..Default::default()
        };
        b.iter(|| black_box(compile_batch(black_box(&sources), &options, &config)))
    });
    group.bench_function("parallel", |b| {
        let config = BatchConfig::default();
        b.iter(|| black_box(compile_batch(black_box(&sources), &options, &config)))
    });
    group.finish();
}

criterion_group!(benches, bench_compile, bench_decompile, bench_batch);
criterion_main!(benches);
