use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokenizer: TokenizerConfig,
    pub ranking: RankingConfig,
    pub snippet: SnippetConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Load from a JSON file; missing sections and fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(f))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would silently drop or misorder matches.
    pub fn validate(&self) -> Result<()> {
        let r = &self.ranking;
        if !(r.k1.is_finite() && r.k1 >= 0.0) {
            return Err(SearchError::InvalidConfig(format!("ranking.k1 must be >= 0, got {}", r.k1)));
        }
        if !(0.0..=1.0).contains(&r.b) {
            return Err(SearchError::InvalidConfig(format!("ranking.b must be within [0, 1], got {}", r.b)));
        }
        if !(r.title_boost.is_finite() && r.title_boost > 0.0) {
            return Err(SearchError::InvalidConfig(format!("ranking.title_boost must be > 0, got {}", r.title_boost)));
        }
        if self.search.max_page_size == 0 {
            return Err(SearchError::InvalidConfig("search.max_page_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Apply the English Snowball stemmer.
    pub stemming: bool,
    /// Replaces the built-in English stop-word list when set. Empty disables filtering.
    pub stopwords: Option<Vec<String>>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { stemming: true, stopwords: None }
    }
}

/// BM25 parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub k1: f32,
    pub b: f32,
    /// Weight of an occurrence inside the title relative to one in the body.
    pub title_boost: f32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, title_boost: 2.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    pub max_chars: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self { max_chars: 150 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub query_timeout_ms: u64,
    /// Drop results whose title+body fingerprint matches a better-ranked result.
    pub collapse_duplicates: bool,
    /// Expand query terms absent from the index to indexed terms within an
    /// edit distance that grows with term length (0, 1 or 2).
    pub fuzzy: bool,
    /// Most indexed terms one query term may expand to.
    pub max_expansions: usize,
}

impl SearchConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            query_timeout_ms: 2_000,
            collapse_duplicates: false,
            fuzzy: false,
            max_expansions: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "ranking": {{ "k1": 2.0 }}, "snippet": {{ "max_chars": 80 }} }}"#).unwrap();
        let cfg = EngineConfig::from_file(f.path()).unwrap();
        assert_eq!(cfg.ranking.k1, 2.0);
        assert_eq!(cfg.ranking.b, 0.75);
        assert_eq!(cfg.snippet.max_chars, 80);
        assert_eq!(cfg.search.default_page_size, 10);
        assert!(cfg.tokenizer.stemming);
        assert!(!cfg.search.collapse_duplicates);
        assert!(!cfg.search.fuzzy);
    }

    #[test]
    fn out_of_range_ranking_parameters_are_rejected() {
        for body in [
            r#"{ "ranking": { "title_boost": 0.0 } }"#,
            r#"{ "ranking": { "title_boost": -1.0 } }"#,
            r#"{ "ranking": { "k1": -0.5 } }"#,
            r#"{ "ranking": { "b": 1.5 } }"#,
            r#"{ "search": { "max_page_size": 0 } }"#,
        ] {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            write!(f, "{body}").unwrap();
            let err = EngineConfig::from_file(f.path()).unwrap_err();
            assert!(matches!(err, SearchError::InvalidConfig(_)), "{body}");
        }
    }

    #[test]
    fn boundary_values_are_accepted() {
        let mut cfg = EngineConfig::default();
        cfg.ranking.k1 = 0.0;
        cfg.ranking.b = 1.0;
        cfg.ranking.title_boost = 0.5;
        assert!(cfg.validate().is_ok());
    }
}
