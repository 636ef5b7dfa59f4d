//! Typo-tolerant expansion of query terms.
//!
//! A query term with no postings is replaced by the indexed terms within an
//! edit distance chosen from its length: none up to 2 chars, 1 up to 5 chars,
//! 2 beyond that. Terms that are in the index are kept as they are.

use crate::index::InvertedIndex;
use std::cmp::min;

/// Allowed edits for a term of `len` chars.
pub fn auto_distance(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Levenshtein distance between `a` and `b` if it is at most `max`.
pub fn distance_within(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = min(min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
            row_min = min(row_min, curr[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let d = prev[b.len()];
    (d <= max).then_some(d)
}

/// Query terms with every unknown term replaced by its closest indexed terms,
/// at most `max_expansions` each, nearest first and then alphabetical.
pub fn expand(terms: &[String], index: &InvertedIndex, max_expansions: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(terms.len());
    for term in terms {
        if index.postings(term).is_some() {
            out.push(term.clone());
            continue;
        }
        let max = auto_distance(term.chars().count());
        if max == 0 {
            continue;
        }
        let mut near: Vec<(usize, &str)> = index
            .vocabulary()
            .filter_map(|candidate| distance_within(term, candidate, max).map(|d| (d, candidate)))
            .collect();
        near.sort_unstable();
        near.truncate(max_expansions);
        if !near.is_empty() {
            tracing::debug!(term = %term, expansions = near.len(), "expanded unknown query term");
        }
        out.extend(near.into_iter().map(|(_, t)| t.to_string()));
    }
    out
}
