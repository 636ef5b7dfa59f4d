use crate::config::TokenizerConfig;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}][\p{L}\p{M}\p{N}_'’]*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref DEFAULT: Tokenizer = Tokenizer::default();
}

/// A normalized term and where it came from in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Word index in the source, counting dropped stop words.
    pub position: u32,
    /// Byte span of the original word.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
enum Stopwords {
    English,
    Custom(HashSet<String>),
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    stemming: bool,
    stopwords: Stopwords,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { stemming: true, stopwords: Stopwords::English }
    }
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let stopwords = match &config.stopwords {
            Some(words) => Stopwords::Custom(words.iter().map(|w| normalize(w)).collect()),
            None => Stopwords::English,
        };
        Self { stemming: config.stemming, stopwords }
    }

    fn is_stopword(&self, token: &str) -> bool {
        match &self.stopwords {
            Stopwords::English => STOPWORDS.contains(token),
            Stopwords::Custom(set) => set.contains(token),
        }
    }

    /// Tokenize text with diacritic folding, lowercase, stopword removal and optional stemming.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(text).enumerate() {
            let word = normalize(mat.as_str());
            if word.is_empty() || self.is_stopword(&word) {
                continue;
            }
            let term = if self.stemming { STEMMER.stem(&word).into_owned() } else { word };
            tokens.push(Token { term, position: pos as u32, start: mat.start(), end: mat.end() });
        }
        tokens
    }

    /// Normalized terms only, in order.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|t| t.term).collect()
    }
}

fn normalize(word: &str) -> String {
    word.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == '’' { '\'' } else { c })
        .collect::<String>()
        .to_lowercase()
        .trim_end_matches('\'')
        .to_string()
}

/// Tokenize with the default English configuration.
pub fn tokenize(text: &str) -> Vec<Token> {
    DEFAULT.tokenize(text)
}
