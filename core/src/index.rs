use crate::error::{Result, SearchError};
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_frequency: u32,
    /// Strictly increasing word positions; title words come first.
    pub positions: Vec<u32>,
}

/// Per-document statistics kept next to the postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStats {
    /// Indexed token count (title + body, stop words excluded).
    pub length: u32,
    /// Positions below this value belong to the title.
    pub title_span: u32,
    /// Distinct terms, used to retract postings without a full scan.
    pub terms: Vec<String>,
    pub fingerprint: [u8; 20],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>, // postings sorted by doc_id
    docs: BTreeMap<DocId, DocStats>,
    total_length: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize `doc` and merge its postings. Nothing is modified unless every
    /// posting passes validation.
    pub fn index(&mut self, doc: &Document, tokenizer: &Tokenizer) -> Result<()> {
        if self.docs.contains_key(&doc.id) {
            return Err(SearchError::AlreadyIndexed(doc.id));
        }
        let (per_term, stats) = analyze(doc, tokenizer);
        self.validate(doc.id, &per_term)?;

        for (term, positions) in per_term {
            let list = self.postings.entry(term).or_default();
            let posting = Posting { doc_id: doc.id, term_frequency: positions.len() as u32, positions };
            // validate() guarantees the id is absent
            let at = list.binary_search_by_key(&doc.id, |p| p.doc_id).unwrap_or_else(|i| i);
            list.insert(at, posting);
        }
        self.total_length += u64::from(stats.length);
        tracing::debug!(doc_id = doc.id, length = stats.length, terms = stats.terms.len(), "indexed document");
        self.docs.insert(doc.id, stats);
        Ok(())
    }

    fn validate(&self, doc_id: DocId, per_term: &BTreeMap<String, Vec<u32>>) -> Result<()> {
        for (term, positions) in per_term {
            if positions.is_empty() || positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SearchError::IndexCorruption(format!(
                    "positions for '{term}' in document {doc_id} are not strictly increasing"
                )));
            }
            if let Some(list) = self.postings.get(term) {
                if list.binary_search_by_key(&doc_id, |p| p.doc_id).is_ok() {
                    return Err(SearchError::IndexCorruption(format!(
                        "stale posting for '{term}' references unindexed document {doc_id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Remove every posting of `doc_id` and update the statistics.
    pub fn retract(&mut self, doc_id: DocId) -> Result<()> {
        let stats = self.docs.remove(&doc_id).ok_or(SearchError::NotFound(doc_id))?;
        for term in &stats.terms {
            let emptied = match self.postings.get_mut(term) {
                Some(list) => {
                    if let Ok(at) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                        list.remove(at);
                    }
                    list.is_empty()
                }
                None => false,
            };
            if emptied {
                self.postings.remove(term);
            }
        }
        self.total_length -= u64::from(stats.length);
        tracing::debug!(doc_id, "retracted document");
        Ok(())
    }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    pub fn average_doc_length(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.docs.len() as f32
        }
    }

    pub fn doc_stats(&self, doc_id: DocId) -> Option<&DocStats> {
        self.docs.get(&doc_id)
    }

    pub fn is_indexed(&self, doc_id: DocId) -> bool {
        self.docs.contains_key(&doc_id)
    }

    /// Every indexed term, in no particular order.
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Full invariant check, run on indexes loaded from disk.
    pub fn check_invariants(&self) -> Result<()> {
        let mut total = 0u64;
        for stats in self.docs.values() {
            total += u64::from(stats.length);
        }
        if total != self.total_length {
            return Err(SearchError::IndexCorruption(format!(
                "total length {} does not match document lengths {total}",
                self.total_length
            )));
        }
        for (term, list) in &self.postings {
            if list.is_empty() || list.windows(2).any(|w| w[0].doc_id >= w[1].doc_id) {
                return Err(SearchError::IndexCorruption(format!("postings for '{term}' are not sorted by document")));
            }
            for p in list {
                if p.term_frequency as usize != p.positions.len() || p.positions.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(SearchError::IndexCorruption(format!("bad posting for '{term}' in document {}", p.doc_id)));
                }
                if !self.docs.contains_key(&p.doc_id) {
                    return Err(SearchError::IndexCorruption(format!("'{term}' references unknown document {}", p.doc_id)));
                }
            }
        }
        Ok(())
    }
}

/// Title and body become one position stream, title first.
fn analyze(doc: &Document, tokenizer: &Tokenizer) -> (BTreeMap<String, Vec<u32>>, DocStats) {
    let title = tokenizer.tokenize(&doc.title);
    let body = tokenizer.tokenize(&doc.body);
    let title_span = title.last().map_or(0, |t| t.position + 1);
    let length = (title.len() + body.len()) as u32;

    let mut per_term: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for tok in title {
        per_term.entry(tok.term).or_default().push(tok.position);
    }
    for tok in body {
        per_term.entry(tok.term).or_default().push(tok.position + title_span);
    }
    let stats = DocStats {
        length,
        title_span,
        terms: per_term.keys().cloned().collect(),
        fingerprint: doc.fingerprint(),
    };
    (per_term, stats)
}
