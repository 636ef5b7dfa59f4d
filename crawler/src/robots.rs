use anyhow::Result;
use parking_lot::RwLock;
use reqwest::{header, Client, Url};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    pub crawl_delay: Option<Duration>,
}

impl Robots {
    /// Rules of the group naming our agent token, falling back to the `*` group.
    /// Only the product token (before any `/version`) is compared, case-insensitively.
    pub fn parse(txt: &str, agent_token: &str) -> Robots {
        let agent_token = product_token(agent_token);
        let mut star = Robots::default();
        let mut ours = Robots::default();
        let mut saw_ours = false;
        // which groups the current record applies to: (star, ours)
        let mut active = (false, false);
        let mut in_agents = false;
        for line in txt.lines() {
            let l = line.split('#').next().unwrap_or("").trim();
            let Some((k, v)) = l.split_once(':') else { continue };
            let key = k.trim().to_lowercase();
            let val = v.trim();
            if key == "user-agent" {
                if !in_agents {
                    active = (false, false);
                    in_agents = true;
                }
                let ua = product_token(val);
                if ua == "*" {
                    active.0 = true;
                } else if !ua.is_empty() && ua == agent_token {
                    active.1 = true;
                    saw_ours = true;
                }
                continue;
            }
            in_agents = false;
            for (on, group) in [(active.0, &mut star), (active.1, &mut ours)] {
                if !on {
                    continue;
                }
                match key.as_str() {
                    "allow" => group.allows.push(val.to_string()),
                    "disallow" if !val.is_empty() => group.disallows.push(val.to_string()),
                    "crawl-delay" => {
                        if let Ok(n) = val.parse::<f64>() {
                            group.crawl_delay = Some(Duration::from_millis((n * 1000.0) as u64));
                        }
                    }
                    _ => {}
                }
            }
        }
        if saw_ours { ours } else { star }
    }

    /// Longest matching rule wins; ties go to Allow.
    pub fn path_allowed(&self, path: &str) -> bool {
        let longest = |rules: &[String]| rules.iter().filter(|r| path.starts_with(r.as_str())).map(String::len).max();
        match (longest(&self.allows), longest(&self.disallows)) {
            (Some(a), Some(d)) => a >= d,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

fn product_token(agent: &str) -> String {
    agent.split('/').next().unwrap_or("").trim().to_lowercase()
}

/// Per-host robots rules, fetched once.
#[derive(Clone, Default)]
pub struct RobotsCache {
    hosts: Arc<RwLock<HashMap<String, Robots>>>,
}

impl RobotsCache {
    pub async fn rules(&self, client: &Client, url: &Url, agent_token: &str) -> Result<Option<Robots>> {
        let Some(host) = url.host_str().map(str::to_string) else { return Ok(None) };
        let cached = self.hosts.read().get(&host).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let robots_url = format!("{}://{}/robots.txt", url.scheme(), url.authority());
        let txt = match client.get(&robots_url).header(header::ACCEPT, "text/plain").send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                tracing::debug!(%robots_url, status = %resp.status(), "no robots.txt");
                String::new()
            }
            Err(e) => {
                tracing::debug!(%robots_url, error = %e, "robots.txt fetch failed");
                String::new()
            }
        };
        let parsed = Robots::parse(&txt, agent_token);
        self.hosts.write().insert(host, parsed.clone());
        Ok(Some(parsed))
    }
}
