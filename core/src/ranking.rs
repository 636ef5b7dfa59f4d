//! BM25 scoring over the inverted index.
//!
//! Output is ordered by descending score with ties broken by ascending
//! document id, so paging over the same index is reproducible.

use crate::config::RankingConfig;
use crate::error::{Result, SearchError};
use crate::index::InvertedIndex;
use crate::DocId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

/// Deadline is checked once per this many postings.
const DEADLINE_STRIDE: usize = 1024;

/// `ln(1 + (N - df + 0.5) / (df + 0.5))`, never negative.
pub fn idf(document_count: usize, document_frequency: usize) -> f32 {
    let n = document_count as f32;
    let df = document_frequency as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Score every document that contains at least one query term.
///
/// Repeated query terms count once. Returns [`SearchError::Timeout`] when the
/// deadline passes; partial scores are dropped with the local accumulator.
pub fn score(
    query_terms: &[String],
    index: &InvertedIndex,
    config: &RankingConfig,
    deadline: Option<Instant>,
) -> Result<Vec<(DocId, f32)>> {
    let distinct: BTreeSet<&str> = query_terms.iter().map(String::as_str).collect();
    let n = index.document_count();
    let avg_len = index.average_doc_length().max(f32::EPSILON);

    let mut scores: HashMap<DocId, f32> = HashMap::new();
    let mut visited = 0usize;
    for term in distinct {
        let Some(postings) = index.postings(term) else { continue };
        let w = idf(n, postings.len());
        for p in postings {
            visited += 1;
            if visited % DEADLINE_STRIDE == 0 {
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        return Err(SearchError::Timeout);
                    }
                }
            }
            let stats = index.doc_stats(p.doc_id).ok_or_else(|| {
                SearchError::IndexCorruption(format!("posting for '{term}' references unknown document {}", p.doc_id))
            })?;
            let title_hits = p.positions.iter().take_while(|&&pos| pos < stats.title_span).count() as f32;
            let tf = (p.term_frequency as f32 - title_hits) + title_hits * config.title_boost;
            let len_norm = 1.0 - config.b + config.b * (stats.length as f32 / avg_len);
            let contrib = w * tf * (config.k1 + 1.0) / (tf + config.k1 * len_norm);
            *scores.entry(p.doc_id).or_insert(0.0) += contrib;
        }
    }

    let mut scored: Vec<(DocId, f32)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(scored)
}

/// Keep only the best-ranked document of each content fingerprint.
pub fn collapse_duplicates(ranked: Vec<(DocId, f32)>, index: &InvertedIndex) -> Vec<(DocId, f32)> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|(id, _)| match index.doc_stats(*id) {
            Some(stats) => seen.insert(stats.fingerprint),
            None => true,
        })
        .collect()
}
