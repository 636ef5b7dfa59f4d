use anyhow::{anyhow, Result};
use url::Url;
use scraper::{ElementRef, Html, Selector};

pub struct Selectors {
    title: Selector,
    body: Selector,
    link: Selector,
}

impl Selectors {
    pub fn new() -> Result<Self> {
        let parse = |s: &str| Selector::parse(s).map_err(|e| anyhow!("bad selector {s}: {e:?}"));
        Ok(Self { title: parse("title")?, body: parse("body")?, link: parse("a[href]")? })
    }
}

pub struct Page {
    pub title: String,
    pub body: String,
    pub links: Vec<Url>,
}

/// Title, visible body text and outgoing links of an HTML page.
pub fn parse_html(base: &Url, html: &str, sel: &Selectors) -> Page {
    let doc = Html::parse_document(html);
    let title = doc.select(&sel.title).next().map(|n| collapse(n.text())).unwrap_or_default();
    let body = doc.select(&sel.body).next().map(visible_text).unwrap_or_default();
    let links = doc
        .select(&sel.link)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| follow_link(base, href))
        .collect();
    Page { title, body, links }
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn visible_text(body: ElementRef<'_>) -> String {
    let texts = body.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let parent = node.parent()?.value().as_element()?;
        (!matches!(parent.name(), "script" | "style" | "noscript")).then_some(&**text)
    });
    collapse(texts)
}

/// Resolve `href` against `base`; only http(s) targets, fragment removed.
pub fn follow_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("javascript:") || lower.starts_with("tel:") {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Host equals one of `domains` or is a subdomain of it. No domains means no restriction.
pub fn in_scope(url: &Url, domains: &[String]) -> bool {
    if domains.is_empty() {
        return true;
    }
    let Some(host) = url.host_str() else { return false };
    domains.iter().any(|d| host == d || host.ends_with(&format!(".{d}")))
}

pub fn is_pdf(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

/// Last path segment, used as the title of linked files.
pub fn file_title(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url.to_string())
}
