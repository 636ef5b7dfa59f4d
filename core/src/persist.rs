use crate::error::{Result, SearchError};
use crate::{DocId, Document, InvertedIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, read_dir, remove_file, rename, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 2;

/// Commit record of a flush. Data files carry the generation in their name,
/// so `meta.json` always points at one complete set of them.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
    pub generation: u64,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

const DATA_FILES: [&str; 3] = ["docs", "index", "doc_id_map"];

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn docs(&self, generation: u64) -> PathBuf { self.root.join(format!("docs.{generation}.bin")) }
    pub fn index(&self, generation: u64) -> PathBuf { self.root.join(format!("index.{generation}.bin")) }
    pub fn doc_id_map(&self, generation: u64) -> PathBuf { self.root.join(format!("doc_id_map.{generation}.bin")) }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// An index was flushed here before.
    pub fn exists(&self) -> bool {
        self.meta().is_file()
    }

    /// Generation the next flush should write.
    pub fn next_generation(&self) -> u64 {
        load_meta(self).map_or(1, |m| m.generation + 1)
    }

    /// Delete data files of every generation other than `keep`, including
    /// leftovers of flushes that never committed.
    pub fn remove_stale(&self, keep: u64) -> Result<()> {
        for entry in read_dir(&self.root)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some((stem, generation)) = parse_data_file(name) else { continue };
            if DATA_FILES.contains(&stem) && generation != keep {
                remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// `docs.3.bin` -> `("docs", 3)`; also matches the `.tmp` files of a torn write.
fn parse_data_file(name: &str) -> Option<(&str, u64)> {
    let name = name.strip_suffix(".tmp").unwrap_or(name);
    let rest = name.strip_suffix(".bin")?;
    let (stem, generation) = rest.rsplit_once('.')?;
    Some((stem, generation.parse().ok()?))
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut f = File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    rename(&tmp, path)?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn save_documents<'a, I>(paths: &IndexPaths, generation: u64, docs: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut docs: Vec<&Document> = docs.into_iter().collect();
    docs.sort_by_key(|d| d.id);
    write_atomic(&paths.docs(generation), &bincode::serialize(&docs)?)
}

pub fn load_documents(paths: &IndexPaths, generation: u64) -> Result<Vec<Document>> {
    Ok(bincode::deserialize(&read_all(&paths.docs(generation))?)?)
}

pub fn save_index(paths: &IndexPaths, generation: u64, index: &InvertedIndex) -> Result<()> {
    write_atomic(&paths.index(generation), &bincode::serialize(index)?)
}

pub fn load_index(paths: &IndexPaths, generation: u64) -> Result<InvertedIndex> {
    Ok(bincode::deserialize(&read_all(&paths.index(generation))?)?)
}

pub fn save_doc_id_map(paths: &IndexPaths, generation: u64, map: &HashMap<String, DocId>) -> Result<()> {
    write_atomic(&paths.doc_id_map(generation), &bincode::serialize(map)?)
}

pub fn load_doc_id_map(paths: &IndexPaths, generation: u64) -> Result<HashMap<String, DocId>> {
    Ok(bincode::deserialize(&read_all(&paths.doc_id_map(generation))?)?)
}

/// Commit point of a flush: the rename of `meta.json` switches generations.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read_all(&paths.meta())?;
    let meta: MetaFile = serde_json::from_slice(&buf)?;
    if meta.version != FORMAT_VERSION {
        return Err(SearchError::Serialization(format!(
            "unsupported index version {} (expected {FORMAT_VERSION})",
            meta.version
        )));
    }
    Ok(meta)
}
