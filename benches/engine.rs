//! Rule evaluation throughput.

use config_rules::tokens::SourceType;
use config_rules::{compile, EvalContext, RuleEngine};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_rules(blocks: usize) -> String {
    let mut source = String::from("// version:1\n");
    for i in 0..blocks {
        source.push_str(&format!(
            "if:((SourceType=SRC_DeviceMake,CompareType=CMP_EqualIgnore,MatchString=\"make{i}\"))\n\
             \tset:(Profile=\"p{i}\")\n\
             elseif:((SourceType=SRC_GPUFamily,CompareType=CMP_Regex,MatchString=\"Mali-G({i}\\d*)\"))\n\
             \tset:(Gpu=\"$(Profile)-mali\")\n\
             endif:\n\
             condition:((SourceType=SRC_AndroidVersion,CompareType=CMP_VersionGreaterEqual,MatchString=\"{}\")),(Api{i}=\"1\")\n",
            i % 15
        ));
    }
    source
}

fn device() -> EvalContext {
    EvalContext::new()
        .with_source(SourceType::DeviceMake, "Make42")
        .with_source(SourceType::GpuFamily, "Mali-G710")
        .with_source(SourceType::AndroidVersion, "13.1")
        .with_variable("Profile", "base")
}

fn bench_engine_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_load");
    for blocks in [10, 100, 1000] {
        let bytes = compile(&generate_rules(blocks), false).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &bytes, |b, bytes| {
            b.iter(|| black_box(RuleEngine::from_bytes(black_box(bytes))))
        });
    }
    group.finish();
}

fn bench_engine_run(c: &mut Criterion) {
    let context = device();
    let mut group = c.benchmark_group("engine_run");
    for blocks in [10, 100, 1000] {
        let engine = RuleEngine::from_bytes(&compile(&generate_rules(blocks), false).unwrap())
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &engine, |b, engine| {
            b.iter(|| black_box(engine.run(black_box(&context))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_engine_load, bench_engine_run);
criterion_main!(benches);
