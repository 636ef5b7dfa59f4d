use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

pub type DocId = u32;

/// A fetched page as stored and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    /// Identifier assigned by the loader (e.g. SHA-1 of the URL from the crawler).
    #[serde(default)]
    pub external_id: Option<String>,
    pub url: String,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

impl Document {
    pub fn new(id: DocId, url: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            external_id: None,
            url: url.into(),
            title: title.into(),
            body: body.into(),
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    /// SHA-1 over the case-folded alphanumeric content of title and body.
    /// Pages reachable under several URLs share a fingerprint.
    pub fn fingerprint(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        for part in [&self.title, &self.body] {
            for word in part.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                hasher.update(word.to_lowercase().as_bytes());
                hasher.update(b" ");
            }
            hasher.update(b"\x1f");
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}
