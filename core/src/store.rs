use crate::error::{Result, SearchError};
use crate::{DocId, Document};
use std::collections::HashMap;
use std::sync::Arc;

/// Raw documents keyed by id. Documents are shared by `Arc` so snapshot
/// copies only clone pointers.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: HashMap<DocId, Arc<Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document. An existing id is replaced only when `overwrite` is set.
    pub fn put(&mut self, doc: Document, overwrite: bool) -> Result<DocId> {
        let id = doc.id;
        if !overwrite && self.docs.contains_key(&id) {
            return Err(SearchError::DuplicateId(id));
        }
        self.docs.insert(id, Arc::new(doc));
        Ok(id)
    }

    pub fn get(&self, id: DocId) -> Result<Arc<Document>> {
        self.docs.get(&id).cloned().ok_or(SearchError::NotFound(id))
    }

    pub fn delete(&mut self, id: DocId) -> Result<Arc<Document>> {
        self.docs.remove(&id).ok_or(SearchError::NotFound(id))
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.docs.values()
    }

    pub fn next_id(&self) -> DocId {
        self.docs.keys().max().map_or(0, |m| m + 1)
    }
}
