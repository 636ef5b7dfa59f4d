//! Snippet extraction around matched query terms.
//!
//! A snippet is an unescaped excerpt plus highlight spans given as byte
//! offsets into that excerpt. Rendering (and escaping) is left to the
//! consumer; [`Snippet::to_html`] is the escaping renderer used by the server.

use crate::config::SnippetConfig;
use crate::tokenizer::{Token, Tokenizer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub highlights: Vec<Highlight>,
    /// The excerpt does not start at the beginning of the source.
    pub truncated_start: bool,
    /// The excerpt stops before the end of the source.
    pub truncated_end: bool,
}

impl Snippet {
    /// HTML with every byte of source text escaped and highlights wrapped in `<tag>`.
    pub fn to_html(&self, tag: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + self.highlights.len() * (tag.len() * 2 + 5));
        if self.truncated_start {
            out.push('…');
        }
        let mut cursor = 0;
        for h in &self.highlights {
            escape_into(&mut out, &self.text[cursor..h.start]);
            out.push('<');
            out.push_str(tag);
            out.push('>');
            escape_into(&mut out, &self.text[h.start..h.end]);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            cursor = h.end;
        }
        escape_into(&mut out, &self.text[cursor..]);
        if self.truncated_end {
            out.push('…');
        }
        out
    }

    /// The highlighted substrings, in order.
    pub fn highlighted(&self) -> impl Iterator<Item = &str> {
        self.highlights.iter().map(|h| &self.text[h.start..h.end])
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
}

/// A matched word with its char span in the source.
struct Hit<'a> {
    token: &'a Token,
    char_start: usize,
    char_end: usize,
}

/// Build a snippet of at most `config.max_chars` characters from `text`.
///
/// Picks the shortest window covering every distinct matched term; when that
/// window does not fit, falls back to the fitting window holding the most
/// matches. With no match at all the snippet is the start of the text.
pub fn extract(text: &str, query_terms: &HashSet<String>, tokenizer: &Tokenizer, config: &SnippetConfig) -> Snippet {
    let max = config.max_chars.max(1);
    let tokens: Vec<Token> = tokenizer
        .tokenize(text)
        .into_iter()
        .filter(|t| query_terms.contains(&t.term))
        .collect();
    if tokens.is_empty() {
        return leading(text, max);
    }
    let hits = char_spans(text, &tokens);

    let (first, last) = match shortest_cover(&hits) {
        Some((i, j)) if hits[j].char_end - hits[i].char_start <= max => (i, j),
        _ => densest_window(&hits, max),
    };

    let total_chars = text.chars().count();
    let win_start = hits[first].char_start;
    let win_end = hits[last].char_end.min(win_start + max);
    let slack = max.saturating_sub(win_end - win_start);
    let mut left = slack / 2;
    let mut right = slack - left;
    if win_start < left {
        right += left - win_start;
        left = win_start;
    }
    if win_end + right > total_chars {
        let over = win_end + right - total_chars;
        right -= over;
        left = (left + over).min(win_start);
    }
    let mut start = byte_at(text, win_start - left);
    let mut end = byte_at(text, win_end + right);
    let anchor_start = hits[first].token.start;
    let anchor_end = hits[last].token.end.min(byte_at(text, win_end));

    // avoid cutting words at the edges
    if start > 0 && start < anchor_start && !text[..start].ends_with(char::is_whitespace) {
        if let Some(ws) = text[start..anchor_start].find(char::is_whitespace) {
            start += ws;
        }
    }
    if end < text.len() && end > anchor_end && !text[end..].starts_with(char::is_whitespace) {
        if let Some(ws) = text[anchor_end..end].rfind(char::is_whitespace) {
            end = anchor_end + ws;
        }
    }
    let slice = &text[start..end];
    let trimmed_front = slice.len() - slice.trim_start().len();
    start += trimmed_front;
    end = start + text[start..end].trim_end().len();

    let highlights = hits
        .iter()
        .filter(|h| h.token.start >= start && h.token.end <= end)
        .map(|h| Highlight { start: h.token.start - start, end: h.token.end - start })
        .collect();
    Snippet {
        text: text[start..end].to_string(),
        highlights,
        truncated_start: start > 0,
        truncated_end: end < text.trim_end().len(),
    }
}

fn char_spans<'a>(text: &str, tokens: &'a [Token]) -> Vec<Hit<'a>> {
    let mut hits = Vec::with_capacity(tokens.len());
    let mut cursor = 0;
    let mut chars = 0;
    for token in tokens {
        chars += text[cursor..token.start].chars().count();
        let char_start = chars;
        chars += text[token.start..token.end].chars().count();
        cursor = token.end;
        hits.push(Hit { token, char_start, char_end: chars });
    }
    hits
}

/// Smallest char window containing every distinct matched term, as hit indices.
fn shortest_cover(hits: &[Hit<'_>]) -> Option<(usize, usize)> {
    let distinct = hits.iter().map(|h| h.token.term.as_str()).collect::<HashSet<_>>().len();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<(usize, usize)> = None;
    let mut i = 0;
    for j in 0..hits.len() {
        *counts.entry(hits[j].token.term.as_str()).or_insert(0) += 1;
        while counts.len() == distinct {
            let len = hits[j].char_end - hits[i].char_start;
            if best.map_or(true, |(bi, bj)| len < hits[bj].char_end - hits[bi].char_start) {
                best = Some((i, j));
            }
            let term = hits[i].token.term.as_str();
            if let Some(c) = counts.get_mut(term) {
                *c -= 1;
                if *c == 0 {
                    counts.remove(term);
                }
            }
            i += 1;
        }
    }
    best
}

/// Window of at most `max` chars with the most hits; more distinct terms and
/// then earlier position win ties.
fn densest_window(hits: &[Hit<'_>], max: usize) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_key = (0usize, 0usize);
    let mut j = 0;
    for i in 0..hits.len() {
        if j < i {
            j = i;
        }
        while j + 1 < hits.len() && hits[j + 1].char_end - hits[i].char_start <= max {
            j += 1;
        }
        let distinct = hits[i..=j].iter().map(|h| h.token.term.as_str()).collect::<HashSet<_>>().len();
        let key = (j - i + 1, distinct);
        if key > best_key {
            best_key = key;
            best = (i, j);
        }
    }
    best
}

fn leading(text: &str, max: usize) -> Snippet {
    let trimmed = text.trim();
    let offset = text.len() - text.trim_start().len();
    let mut end = byte_at(trimmed, max);
    if end < trimmed.len() && !trimmed[end..].starts_with(char::is_whitespace) {
        if let Some(ws) = trimmed[..end].rfind(char::is_whitespace) {
            end = ws;
        }
    }
    let excerpt = trimmed[..end].trim_end();
    Snippet {
        text: excerpt.to_string(),
        highlights: Vec::new(),
        truncated_start: false,
        truncated_end: offset + excerpt.len() < text.trim_end().len(),
    }
}

/// Byte offset of the char at index `chars`, or the text length past the end.
fn byte_at(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(b, _)| b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(q: &str) -> HashSet<String> {
        Tokenizer::default().terms(q).into_iter().collect()
    }

    fn snip(text: &str, q: &str, max: usize) -> Snippet {
        extract(text, &terms(q), &Tokenizer::default(), &SnippetConfig { max_chars: max })
    }

    #[test]
    fn highlights_matched_word() {
        let s = snip("RVCE admission process 2024", "admission", 150);
        assert_eq!(s.text, "RVCE admission process 2024");
        assert_eq!(s.highlighted().collect::<Vec<_>>(), vec!["admission"]);
        assert_eq!(s.to_html("em"), "RVCE <em>admission</em> process 2024");
        assert!(!s.truncated_start && !s.truncated_end);
    }

    #[test]
    fn prefers_window_covering_all_terms() {
        let text = format!("alpha {} beta gamma alpha beta {}", "filler ".repeat(30), "tail ".repeat(30));
        let s = snip(&text, "alpha beta", 20);
        assert!(s.text.chars().count() <= 20);
        let words: Vec<&str> = s.highlighted().collect();
        assert!(words.contains(&"alpha"));
        assert!(words.contains(&"beta"));
        assert!(s.truncated_start && s.truncated_end);
    }

    #[test]
    fn falls_back_to_densest_window() {
        let text = format!("{} alpha alpha alpha {} beta", "lead ".repeat(10), "filler ".repeat(50));
        let s = snip(&text, "alpha beta", 25);
        let words: Vec<&str> = s.highlighted().collect();
        assert_eq!(words, vec!["alpha", "alpha", "alpha"]);
    }

    #[test]
    fn no_match_uses_leading_text() {
        let s = snip("  Campus library opens at nine every weekday morning  ", "admission", 20);
        assert_eq!(s.text, "Campus library opens");
        assert!(s.highlights.is_empty());
        assert!(s.truncated_end);
    }

    #[test]
    fn html_rendering_escapes_source() {
        let s = snip("<script>alert(1)</script> admission", "admission", 150);
        let html = s.to_html("em");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.ends_with("<em>admission</em>"));
    }
}
