use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, SamplingMode};

use phgen::{Config, Keyword, Search};

const SAMPLE_SIZE: usize = 20;
const WARM_UP_TIME: Duration = Duration::from_secs(2);
const MEASURE_TIME: Duration = Duration::from_secs(5);

const C89_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while",
];

fn keywords() -> Vec<Keyword> {
    C89_KEYWORDS
        .iter()
        .map(|w| Keyword::new(w.as_bytes(), ""))
        .collect()
}

fn criterion_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize/c89");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP_TIME);
    group.measurement_time(MEASURE_TIME);
    group.sampling_mode(SamplingMode::Flat);

    group.bench_function("thorough", |b| {
        b.iter(|| {
            Search::new(keywords(), Config::default())
                .optimize()
                .unwrap()
        });
    });

    group.bench_function("fast", |b| {
        let config = Config {
            fast: true,
            iterations: 7,
            ..Config::default()
        };
        b.iter(|| {
            Search::new(keywords(), config.clone())
                .optimize()
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, criterion_optimize);
criterion_main!(benches);
