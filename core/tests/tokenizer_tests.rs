use sitesearch_core::config::TokenizerConfig;
use sitesearch_core::tokenizer::{tokenize, Tokenizer};

fn words(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|t| t.term).collect()
}

#[test]
fn it_normalizes_and_stems() {
    let words = words("Running Runners RUN! The café's menu.");
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Diacritic folding: café -> cafe
    assert!(words.contains(&"cafe".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = words("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn empty_and_whitespace_input_yield_nothing() {
    assert!(tokenize("").is_empty());
    assert!(tokenize(" \t\n  ").is_empty());
    assert!(tokenize("!!! ... ---").is_empty());
}

#[test]
fn it_is_deterministic() {
    let text = "RVCE admission process 2024: Admissions open for B.E. courses";
    assert_eq!(tokenize(text), tokenize(text));
    assert!(words(text).contains(&"2024".to_string()));
}

#[test]
fn custom_stopwords_and_no_stemming() {
    let tok = Tokenizer::new(&TokenizerConfig { stemming: false, stopwords: Some(vec!["RVCE".into()]) });
    let terms = tok.terms("RVCE admissions and the process");
    assert_eq!(terms, vec!["admissions", "and", "the", "process"]);
}

#[test]
fn positions_are_strictly_increasing() {
    let toks = tokenize("one two the three, four! five");
    assert!(toks.windows(2).all(|w| w[0].position < w[1].position));
}
