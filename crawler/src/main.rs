use anyhow::{anyhow, Result};
use clap::Parser;
use reqwest::{header, Client, Url};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing_subscriber::{fmt, EnvFilter};

mod page;
mod pdf;
mod robots;

use page::{file_title, in_scope, is_pdf, parse_html, Selectors};
use robots::RobotsCache;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl a site to JSONL for the indexer, respecting robots.txt")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Output JSONL file path
    #[arg(long, default_value = "./data/crawl.jsonl")]
    output: String,
    /// Only follow links on these domains and their subdomains (repeatable).
    /// Defaults to the seed hosts.
    #[arg(long = "allowed-domain")]
    allowed_domains: Vec<String>,
    /// Maximum number of documents to emit
    #[arg(long, default_value_t = 10_000)]
    max_docs: usize,
    /// Maximum pages to crawl per host (politeness)
    #[arg(long, default_value_t = 5_000)]
    max_per_host: usize,
    /// Concurrency (number of in-flight fetches)
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// Largest HTML page accepted, in bytes
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    max_page_bytes: usize,
    /// Largest linked PDF downloaded for text extraction, in bytes
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    max_pdf_bytes: usize,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "sitesearch-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
}

/// One line of output, in the shape the indexer reads.
#[derive(Serialize)]
struct OutDoc {
    id: String,
    url: String,
    title: String,
    body: String,
    fetched_at: String,
}

struct Fetched {
    doc: Option<OutDoc>,
    links: Vec<Url>,
}

impl Fetched {
    fn nothing() -> Self {
        Self { doc: None, links: Vec::new() }
    }
}

struct Ctx {
    client: Client,
    robots: RobotsCache,
    selectors: Selectors,
    agent_token: String,
    max_page_bytes: usize,
    max_pdf_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent() {
        fs::create_dir_all(dir)?;
    }

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    // Load seeds
    let mut frontier: VecDeque<Url> = VecDeque::new();
    for line in BufReader::new(File::open(&args.seeds)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{s}"))) {
            Ok(u) => frontier.push_back(u),
            Err(e) => tracing::warn!(seed = %s, error = %e, "invalid seed"),
        }
    }
    if frontier.is_empty() {
        return Err(anyhow!("no valid seeds"));
    }
    let domains: Vec<String> = if args.allowed_domains.is_empty() {
        frontier.iter().filter_map(|u| u.host_str().map(str::to_string)).collect()
    } else {
        args.allowed_domains.iter().map(|d| d.trim().to_lowercase()).collect()
    };
    tracing::info!(
        seeds = frontier.len(),
        max_docs = args.max_docs,
        concurrency = args.concurrency,
        ?domains,
        output = %args.output,
        "crawl starting"
    );

    let ctx = Arc::new(Ctx {
        client,
        robots: RobotsCache::default(),
        selectors: Selectors::new()?,
        agent_token: args.user_agent.split('/').next().unwrap_or("").trim().to_string(),
        max_page_bytes: args.max_page_bytes,
        max_pdf_bytes: args.max_pdf_bytes,
    });
    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut seen: HashSet<String> = HashSet::new();
    let mut per_host: HashMap<String, usize> = HashMap::new();
    let mut tasks: JoinSet<Result<Fetched>> = JoinSet::new();
    let mut emitted = 0usize;

    while emitted < args.max_docs && (!frontier.is_empty() || !tasks.is_empty()) {
        // Fill workers
        while tasks.len() < args.concurrency.max(1) && emitted + tasks.len() < args.max_docs {
            let Some(url) = frontier.pop_front() else { break };
            if !seen.insert(url.to_string()) {
                continue;
            }
            if let Some(h) = url.host_str() {
                let cnt = per_host.entry(h.to_string()).or_insert(0);
                if *cnt >= args.max_per_host {
                    continue;
                }
                *cnt += 1;
            }
            tasks.spawn(fetch(ctx.clone(), url));
        }

        let Some(joined) = tasks.join_next().await else { break };
        let fetched = match joined {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "fetch failed");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "fetch task panicked");
                continue;
            }
        };
        for link in fetched.links {
            if in_scope(&link, &domains) && !seen.contains(link.as_str()) {
                frontier.push_back(link);
            }
        }
        if let Some(doc) = fetched.doc {
            serde_json::to_writer(&mut out, &doc)?;
            out.write_all(b"\n")?;
            emitted += 1;
            if emitted % 100 == 0 {
                tracing::info!(emitted, visited = seen.len(), frontier = frontier.len(), "progress");
            }
        }
    }
    tasks.abort_all();
    out.flush()?;

    tracing::info!(emitted, visited = seen.len(), frontier = frontier.len(), output = %args.output, "crawl done");
    Ok(())
}

async fn fetch(ctx: Arc<Ctx>, url: Url) -> Result<Fetched> {
    let Some(rules) = ctx.robots.rules(&ctx.client, &url, &ctx.agent_token).await? else {
        return Ok(Fetched::nothing());
    };
    if !rules.path_allowed(url.path()) {
        tracing::debug!(%url, "disallowed by robots.txt");
        return Ok(Fetched::nothing());
    }

    if let Some(delay) = rules.crawl_delay {
        sleep(delay).await;
    }
    let resp = ctx.client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        return Ok(Fetched::nothing());
    }
    if is_pdf(&url) {
        return fetch_pdf(&ctx, url, resp).await;
    }
    let is_html = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.starts_with("text/html"));
    if !is_html {
        return Ok(Fetched::nothing());
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > ctx.max_page_bytes {
        tracing::debug!(%url, size = bytes.len(), "page too large");
        return Ok(Fetched::nothing());
    }
    let html = String::from_utf8_lossy(&bytes);
    let page = parse_html(&url, &html, &ctx.selectors);
    Ok(Fetched { doc: Some(out_doc(&url, page.title, page.body)), links: page.links })
}

/// Linked PDFs become documents titled by file name, with their text as body.
/// Files without a text layer are dropped.
async fn fetch_pdf(ctx: &Ctx, url: Url, resp: reqwest::Response) -> Result<Fetched> {
    let is_pdf_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("application/pdf"));
    if !is_pdf_type {
        tracing::debug!(%url, "pdf link did not return a pdf");
        return Ok(Fetched::nothing());
    }
    if resp.content_length().is_some_and(|n| n as usize > ctx.max_pdf_bytes) {
        tracing::debug!(%url, "pdf too large");
        return Ok(Fetched::nothing());
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > ctx.max_pdf_bytes {
        tracing::debug!(%url, size = bytes.len(), "pdf too large");
        return Ok(Fetched::nothing());
    }
    let body = match tokio::task::spawn_blocking(move || pdf::extract_text(&bytes)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(%url, error = %e, "pdf text extraction failed");
            return Ok(Fetched::nothing());
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "pdf extraction task panicked");
            return Ok(Fetched::nothing());
        }
    };
    if body.is_empty() {
        tracing::debug!(%url, "pdf has no text layer");
        return Ok(Fetched::nothing());
    }
    Ok(Fetched { doc: Some(out_doc(&url, file_title(&url), body)), links: Vec::new() })
}

fn out_doc(url: &Url, title: String, body: String) -> OutDoc {
    let mut hasher = Sha1::new();
    hasher.update(url.as_str().as_bytes());
    OutDoc {
        id: format!("{:x}", hasher.finalize()),
        url: url.to_string(),
        title,
        body,
        fetched_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    }
}
