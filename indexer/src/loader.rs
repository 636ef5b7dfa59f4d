use anyhow::Result;
use serde::{Deserialize, Deserializer};
use sitesearch_core::{DocId, Document};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

/// One input record. Accepts the crawler's JSONL (`body`, `fetched_at`) as
/// well as page dumps using `content` and `timestamp`.
#[derive(Debug, Deserialize)]
pub struct InputDoc {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "content")]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub fetched_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

/// Ids arrive as strings from the crawler and as numbers from hand-written dumps.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}

impl InputDoc {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Stable loader key: the explicit id, else the URL.
    pub fn external_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.url.as_deref()).filter(|s| !s.trim().is_empty())
    }

    pub fn into_document(self, id: DocId) -> Document {
        let external_id = self.external_id().map(str::to_string);
        let fetched_at = self
            .fetched_at
            .as_deref()
            .and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);
        Document {
            id,
            external_id,
            url: self.url.unwrap_or_default(),
            title: self.title.trim().to_string(),
            body: self.body,
            fetched_at,
        }
    }
}

/// JSON and JSONL files under `input` (or `input` itself), in path order.
pub fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

/// Raw records of one file. A `.jsonl` line that is not JSON is returned as a
/// string value so the caller can report it with the other failures.
pub fn read_records(file: &Path) -> Result<Vec<serde_json::Value>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(v) => out.push(v),
                Err(e) => {
                    tracing::warn!(file = %file.display(), line = n + 1, error = %e, "malformed record");
                    out.push(serde_json::Value::String(line));
                }
            }
        }
        return Ok(out);
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    Ok(match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_jsonl_and_arrays() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("crawl.jsonl"),
            "{\"id\":\"a\",\"title\":\"Admissions\",\"body\":\"RVCE admission\",\"url\":\"https://rvce.edu.in/a\"}\n\nnot json\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("pages.json"),
            r#"[{"url":"https://rvce.edu.in/b","title":" Hostel ","content":"hostel fees","timestamp":"2024-05-01T10:00:00Z"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_files(dir.path());
        assert_eq!(files.len(), 2);

        let jsonl = read_records(&files[0]).unwrap();
        assert_eq!(jsonl.len(), 2);
        assert!(jsonl[1].is_string());

        let pages = read_records(&files[1]).unwrap();
        let input = InputDoc::from_value(&pages[0]).unwrap();
        assert_eq!(input.external_id(), Some("https://rvce.edu.in/b"));
        let doc = input.into_document(4);
        assert_eq!(doc.id, 4);
        assert_eq!(doc.title, "Hostel");
        assert_eq!(doc.body, "hostel fees");
        assert_eq!(doc.fetched_at.year(), 2024);
    }

    #[test]
    fn record_without_id_or_url_has_no_key() {
        let input = InputDoc::from_value(&serde_json::json!({ "title": "t", "body": "b" })).unwrap();
        assert_eq!(input.external_id(), None);
    }

    #[test]
    fn numeric_ids_become_keys() {
        let raw = serde_json::json!({ "id": 1, "title": "Admissions", "body": "RVCE admission process 2024" });
        let input = InputDoc::from_value(&raw).unwrap();
        assert_eq!(input.external_id(), Some("1"));
        assert_eq!(input.into_document(0).external_id.as_deref(), Some("1"));

        let null = InputDoc::from_value(&serde_json::json!({ "id": null, "url": "https://rvce.edu.in/x" })).unwrap();
        assert_eq!(null.external_id(), Some("https://rvce.edu.in/x"));
        assert!(InputDoc::from_value(&serde_json::json!({ "id": [1] })).is_err());
    }
}
