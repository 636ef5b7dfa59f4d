use criterion::{criterion_group, criterion_main, Criterion};
use sitesearch_core::tokenizer::tokenize;
use sitesearch_core::{Document, EngineConfig, SearchEngine};

const TEXT: &str = "RV College of Engineering offers undergraduate and postgraduate programmes. \
    The admission process for 2024 opens in May; hostel allotment, fee payment and library \
    registration follow the counselling rounds. Research centres publish annual reports.";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_paragraph", |b| b.iter(|| tokenize(TEXT)));
}

fn bench_search(c: &mut Criterion) {
    let engine = SearchEngine::new(EngineConfig::default());
    for id in 0..2_000u32 {
        let body = format!("{TEXT} page {id} section {}", id % 37);
        engine.put(Document::new(id, format!("https://rvce.edu.in/{id}"), format!("Page {id}"), body), false).unwrap();
    }
    c.bench_function("search_admission_fees", |b| b.iter(|| engine.search("admission fees", 0, 10).unwrap()));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
