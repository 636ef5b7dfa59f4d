//! Query executor and index lifecycle.
//!
//! The engine publishes an immutable [`Snapshot`] behind an `Arc`. Queries
//! clone the pointer and run without holding any lock. Mutations are
//! serialized by the writer mutex, applied to a private copy of the current
//! snapshot and published with a single swap, so a reader sees either the
//! state before a batch or the state after it, never a half-applied batch.

use crate::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::fuzzy;
use crate::index::InvertedIndex;
use crate::persist::{self, IndexPaths, MetaFile, FORMAT_VERSION};
use crate::query::{Pagination, SearchPage, SearchResult};
use crate::ranking;
use crate::snippet;
use crate::store::DocumentStore;
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;

/// Documents, postings and the loader's id map at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub store: DocumentStore,
    pub index: InvertedIndex,
    pub external_ids: HashMap<String, DocId>,
}

#[derive(Debug, Clone)]
pub enum Mutation {
    Put { doc: Document, overwrite: bool },
    Delete(DocId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub documents: usize,
    pub terms: usize,
    pub average_doc_length: f32,
}

pub struct SearchEngine {
    config: EngineConfig,
    tokenizer: Tokenizer,
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    dir: Option<PathBuf>,
}

impl SearchEngine {
    /// Empty in-memory engine; `flush` is a no-op.
    pub fn new(config: EngineConfig) -> Self {
        let tokenizer = Tokenizer::new(&config.tokenizer);
        Self { config, tokenizer, current: RwLock::new(Arc::new(Snapshot::default())), writer: Mutex::new(()), dir: None }
    }

    /// Engine backed by `dir`. A previously flushed index is loaded and checked;
    /// otherwise the engine starts empty and creates the files on first flush.
    pub fn open<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self> {
        let paths = IndexPaths::new(&dir);
        let mut engine = Self::new(config);
        if paths.exists() {
            let meta = persist::load_meta(&paths)?;
            let index = persist::load_index(&paths, meta.generation)?;
            index.check_invariants()?;
            let mut store = DocumentStore::new();
            for doc in persist::load_documents(&paths, meta.generation)? {
                if !index.is_indexed(doc.id) {
                    return Err(SearchError::IndexCorruption(format!("stored document {} is not indexed", doc.id)));
                }
                store.put(doc, false)?;
            }
            if store.len() != index.document_count() {
                return Err(SearchError::IndexCorruption(format!(
                    "{} stored documents but {} indexed",
                    store.len(),
                    index.document_count()
                )));
            }
            let external_ids = persist::load_doc_id_map(&paths, meta.generation)?;
            tracing::info!(
                dir = %paths.root.display(),
                num_docs = meta.num_docs,
                generation = meta.generation,
                created_at = %meta.created_at,
                "loaded index"
            );
            *engine.current.get_mut() = Arc::new(Snapshot { store, index, external_ids });
        } else {
            tracing::info!(dir = %paths.root.display(), "starting empty index");
        }
        engine.dir = Some(paths.root);
        Ok(engine)
    }

    /// Empty engine that replaces whatever is stored in `dir` on the next flush.
    pub fn create<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Self {
        let mut engine = Self::new(config);
        engine.dir = Some(dir.as_ref().to_path_buf());
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Current published state; stays valid while later mutations are applied.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Store and index a document in one step.
    pub fn put(&self, doc: Document, overwrite: bool) -> Result<DocId> {
        let mut results = self.apply(vec![Mutation::Put { doc, overwrite }])?;
        results.pop().unwrap_or_else(|| Err(SearchError::IndexCorruption("empty batch result".into())))
    }

    pub fn get(&self, id: DocId) -> Result<Arc<Document>> {
        self.snapshot().store.get(id)
    }

    /// Remove a document and retract its postings.
    pub fn delete(&self, id: DocId) -> Result<()> {
        let mut results = self.apply(vec![Mutation::Delete(id)])?;
        results.pop().unwrap_or_else(|| Err(SearchError::IndexCorruption("empty batch result".into()))).map(|_| ())
    }

    pub fn lookup_external(&self, external_id: &str) -> Option<DocId> {
        self.snapshot().external_ids.get(external_id).copied()
    }

    /// Apply a batch and publish it with one swap.
    ///
    /// Each mutation gets its own result; rejected ones leave no trace. An
    /// [`SearchError::IndexCorruption`] aborts the whole batch and nothing is
    /// published.
    pub fn apply(&self, batch: Vec<Mutation>) -> Result<Vec<Result<DocId>>> {
        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.snapshot());
        let mut results = Vec::with_capacity(batch.len());
        for mutation in batch {
            match apply_one(&mut next, mutation, &self.tokenizer) {
                Err(e @ SearchError::IndexCorruption(_)) => {
                    tracing::error!(error = %e, "ingestion step aborted");
                    return Err(e);
                }
                other => results.push(other),
            }
        }
        *self.current.write() = Arc::new(next);
        Ok(results)
    }

    /// Rank all matches for `query` and return one page of them.
    pub fn search(&self, query: &str, page: i64, page_size: i64) -> Result<SearchPage> {
        let pagination = Pagination::new(page, page_size, self.config.search.max_page_size)?;
        let deadline = Instant::now() + self.config.search.query_timeout();
        let terms = self.tokenizer.terms(query);
        if terms.is_empty() {
            return Ok(SearchPage::empty());
        }

        let snap = self.snapshot();
        let terms = if self.config.search.fuzzy {
            fuzzy::expand(&terms, &snap.index, self.config.search.max_expansions)
        } else {
            terms
        };
        let ranked = match ranking::score(&terms, &snap.index, &self.config.ranking, Some(deadline)) {
            Ok(r) => r,
            Err(SearchError::Timeout) => {
                tracing::warn!(query, "query abandoned at deadline");
                return Ok(SearchPage::timed_out());
            }
            Err(e) => return Err(e),
        };
        let ranked = if self.config.search.collapse_duplicates {
            ranking::collapse_duplicates(ranked, &snap.index)
        } else {
            ranked
        };

        let total_matches = ranked.len();
        let (start, end) = pagination.bounds(total_matches);
        let term_set: HashSet<String> = terms.into_iter().collect();
        let mut results = Vec::with_capacity(end - start);
        for &(doc_id, score) in &ranked[start..end] {
            let doc = snap.store.get(doc_id).map_err(|_| {
                SearchError::IndexCorruption(format!("ranked document {doc_id} is missing from the store"))
            })?;
            let snippet = snippet::extract(&doc.body, &term_set, &self.tokenizer, &self.config.snippet);
            results.push(SearchResult { doc_id, url: doc.url.clone(), title: doc.title.clone(), score, snippet });
        }
        if Instant::now() >= deadline {
            tracing::warn!(query, "query abandoned at deadline");
            return Ok(SearchPage::timed_out());
        }
        tracing::debug!(query, total_matches, page = pagination.page, returned = results.len(), "search");
        Ok(SearchPage { results, total_matches, timed_out: false })
    }

    pub fn stats(&self) -> EngineStats {
        let snap = self.snapshot();
        EngineStats {
            documents: snap.index.document_count(),
            terms: snap.index.term_count(),
            average_doc_length: snap.index.average_doc_length(),
        }
    }

    /// Persist the current snapshot as a new generation. The rename of
    /// `meta.json` commits it; a flush torn before that leaves the previous
    /// generation in force and its partial files are swept by the next one.
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let _guard = self.writer.lock();
        let snap = self.snapshot();
        let paths = IndexPaths::new(dir);
        let generation = paths.next_generation();
        persist::save_documents(&paths, generation, snap.store.iter().map(|d| &**d))?;
        persist::save_index(&paths, generation, &snap.index)?;
        persist::save_doc_id_map(&paths, generation, &snap.external_ids)?;
        let meta = MetaFile {
            num_docs: snap.index.document_count() as u32,
            num_terms: snap.index.term_count() as u32,
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            version: FORMAT_VERSION,
            generation,
        };
        persist::save_meta(&paths, &meta)?;
        if let Err(e) = paths.remove_stale(generation) {
            tracing::warn!(dir = %dir.display(), error = %e, "could not remove old index files");
        }
        tracing::info!(dir = %dir.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, generation, "index flushed");
        Ok(())
    }

    /// Flush and release the engine.
    pub fn close(self) -> Result<()> {
        self.flush()
    }
}

fn apply_one(snap: &mut Snapshot, mutation: Mutation, tokenizer: &Tokenizer) -> Result<DocId> {
    match mutation {
        Mutation::Put { doc, overwrite } => {
            let id = doc.id;
            if snap.store.contains(id) {
                if !overwrite {
                    return Err(SearchError::DuplicateId(id));
                }
                retract_indexed(snap, id)?;
                if let Some(old) = snap.store.delete(id)?.external_id.as_ref() {
                    snap.external_ids.remove(old);
                }
            }
            snap.index.index(&doc, tokenizer).map_err(|e| match e {
                SearchError::AlreadyIndexed(id) => {
                    SearchError::IndexCorruption(format!("document {id} is indexed but not stored"))
                }
                other => other,
            })?;
            if let Some(ext) = &doc.external_id {
                snap.external_ids.insert(ext.clone(), id);
            }
            snap.store.put(doc, true)
        }
        Mutation::Delete(id) => {
            let doc = snap.store.delete(id)?;
            retract_indexed(snap, id)?;
            if let Some(ext) = &doc.external_id {
                snap.external_ids.remove(ext);
            }
            Ok(id)
        }
    }
}

fn retract_indexed(snap: &mut Snapshot, id: DocId) -> Result<()> {
    snap.index.retract(id).map_err(|e| match e {
        SearchError::NotFound(id) => SearchError::IndexCorruption(format!("document {id} is stored but not indexed")),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(docs: &[(DocId, &str, &str)]) -> SearchEngine {
        let engine = SearchEngine::new(EngineConfig::default());
        for (id, title, body) in docs {
            engine.put(Document::new(*id, format!("https://rvce.edu.in/{id}"), *title, *body), false).unwrap();
        }
        engine
    }

    #[test]
    fn admission_example() {
        let engine = engine_with(&[(1, "Admissions", "RVCE admission process 2024")]);
        let page = engine.search("admission", 0, 10).unwrap();
        assert_eq!(page.total_matches, 1);
        assert_eq!(page.results[0].doc_id, 1);
        let words: Vec<&str> = page.results[0].snippet.highlighted().collect();
        assert_eq!(words, vec!["admission"]);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        assert_eq!(engine.search("", 0, 10).unwrap(), SearchPage::empty());
        assert_eq!(engine.search("   the of  ", 0, 10).unwrap(), SearchPage::empty());
    }

    #[test]
    fn invalid_paging_is_rejected() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        assert!(matches!(engine.search("alpha", -1, 10), Err(SearchError::InvalidPage { .. })));
        assert!(matches!(engine.search("alpha", 0, 0), Err(SearchError::InvalidPage { .. })));
    }

    #[test]
    fn overwrite_reindexes_document() {
        let engine = engine_with(&[(1, "Old", "hostel fees")]);
        assert!(matches!(
            engine.put(Document::new(1, "u", "New", "library hours"), false),
            Err(SearchError::DuplicateId(1))
        ));
        engine.put(Document::new(1, "u", "New", "library hours"), true).unwrap();
        assert_eq!(engine.search("hostel", 0, 10).unwrap().total_matches, 0);
        assert_eq!(engine.search("library", 0, 10).unwrap().total_matches, 1);
        assert_eq!(engine.stats().documents, 1);
    }

    #[test]
    fn delete_retracts_postings() {
        let engine = engine_with(&[(1, "a", "alpha"), (2, "b", "alpha beta")]);
        engine.delete(1).unwrap();
        let page = engine.search("alpha", 0, 10).unwrap();
        assert_eq!(page.results.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![2]);
        assert!(matches!(engine.delete(1), Err(SearchError::NotFound(1))));
        assert!(matches!(engine.get(1), Err(SearchError::NotFound(1))));
    }

    #[test]
    fn failed_mutations_in_a_batch_leave_no_trace() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        let results = engine
            .apply(vec![
                Mutation::Put { doc: Document::new(1, "u", "dup", "gamma"), overwrite: false },
                Mutation::Put { doc: Document::new(2, "u", "b", "beta"), overwrite: false },
                Mutation::Delete(42),
            ])
            .unwrap();
        assert!(matches!(results[0], Err(SearchError::DuplicateId(1))));
        assert_eq!(results[1].as_ref().unwrap(), &2);
        assert!(matches!(results[2], Err(SearchError::NotFound(42))));
        assert_eq!(engine.search("gamma", 0, 10).unwrap().total_matches, 0);
        assert_eq!(engine.stats().documents, 2);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        let before = engine.snapshot();
        engine.put(Document::new(2, "u", "b", "alpha"), false).unwrap();
        assert_eq!(before.index.document_frequency("alpha"), 1);
        assert_eq!(engine.snapshot().index.document_frequency("alpha"), 2);
    }

    #[test]
    fn external_ids_follow_documents() {
        let engine = SearchEngine::new(EngineConfig::default());
        let mut doc = Document::new(3, "u", "t", "body");
        doc.external_id = Some("abc".into());
        engine.put(doc, false).unwrap();
        assert_eq!(engine.lookup_external("abc"), Some(3));
        engine.delete(3).unwrap();
        assert_eq!(engine.lookup_external("abc"), None);
    }

    #[test]
    fn corruption_aborts_the_whole_batch() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        // doc 5 is indexed but missing from the store
        let mut broken = Snapshot::clone(&engine.snapshot());
        broken.index.index(&Document::new(5, "u", "ghost", "ghost"), &engine.tokenizer).unwrap();
        *engine.current.write() = Arc::new(broken);
        let published = engine.snapshot();

        let res = engine.apply(vec![
            Mutation::Put { doc: Document::new(2, "u", "b", "beta"), overwrite: false },
            Mutation::Put { doc: Document::new(5, "u", "c", "gamma"), overwrite: false },
        ]);
        assert!(matches!(res, Err(SearchError::IndexCorruption(_))));
        assert!(Arc::ptr_eq(&published, &engine.snapshot()));
        assert!(matches!(engine.get(2), Err(SearchError::NotFound(2))));
        assert_eq!(engine.search("beta", 0, 10).unwrap().total_matches, 0);
    }

    #[test]
    fn stored_but_unindexed_document_is_corruption_on_delete() {
        let engine = engine_with(&[(1, "a", "alpha")]);
        let mut broken = Snapshot::clone(&engine.snapshot());
        broken.index.retract(1).unwrap();
        *engine.current.write() = Arc::new(broken);
        let published = engine.snapshot();

        assert!(matches!(engine.delete(1), Err(SearchError::IndexCorruption(_))));
        assert!(Arc::ptr_eq(&published, &engine.snapshot()));
        assert!(engine.get(1).is_ok());
    }

    #[test]
    fn torn_reflush_keeps_the_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SearchEngine::open(dir.path(), EngineConfig::default()).unwrap();
        engine.put(Document::new(1, "u", "Hostel", "hostel fees"), false).unwrap();
        engine.flush().unwrap();

        // the next flush dies after writing only its document file
        engine.put(Document::new(2, "u", "Library", "library hours"), false).unwrap();
        let paths = IndexPaths::new(dir.path());
        let snap = engine.snapshot();
        persist::save_documents(&paths, paths.next_generation(), snap.store.iter().map(|d| &**d)).unwrap();
        drop(engine);

        let reopened = SearchEngine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(reopened.stats().documents, 1);
        assert_eq!(reopened.search("hostel", 0, 10).unwrap().total_matches, 1);

        reopened.put(Document::new(3, "u", "Exams", "exam schedule"), false).unwrap();
        reopened.close().unwrap();
        let again = SearchEngine::open(dir.path(), EngineConfig::default()).unwrap();
        assert_eq!(again.stats().documents, 2);
        assert!(!paths.docs(1).exists());
        assert!(paths.docs(2).is_file());
    }

    #[test]
    fn misspelled_terms_match_when_fuzzy() {
        let docs = [(1, "Admissions", "RVCE admission process 2024"), (2, "Library", "library hours")];
        let strict = engine_with(&docs);
        assert_eq!(strict.search("admision", 0, 10).unwrap().total_matches, 0);

        let mut config = EngineConfig::default();
        config.search.fuzzy = true;
        let engine = SearchEngine::new(config);
        for (id, title, body) in docs {
            engine.put(Document::new(id, "u", title, body), false).unwrap();
        }
        let page = engine.search("admision", 0, 10).unwrap();
        assert_eq!(page.results.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(page.results[0].snippet.highlighted().collect::<Vec<_>>(), vec!["admission"]);
        assert_eq!(engine.search("libary", 0, 10).unwrap().results[0].doc_id, 2);
    }

    #[test]
    fn identical_documents_are_both_returned_by_default() {
        let body = "hostel admission fees and rules";
        let engine = engine_with(&[(1, "Hostel", body), (2, "Hostel", body)]);
        let page = engine.search(body, 0, 10).unwrap();
        assert_eq!(page.total_matches, 2);
        assert_eq!(page.results.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![1, 2]);

        let mut config = EngineConfig::default();
        config.search.collapse_duplicates = true;
        let collapsing = SearchEngine::new(config);
        collapsing.put(Document::new(1, "u", "Hostel", body), false).unwrap();
        collapsing.put(Document::new(2, "u", "Hostel", body), false).unwrap();
        let page = collapsing.search(body, 0, 10).unwrap();
        assert_eq!(page.total_matches, 1);
        assert_eq!(page.results[0].doc_id, 1);
    }
}
