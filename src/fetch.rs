//! Remote element retrieval.
//!
//! Read-only HTTP GET against enumerable catalog sources. Each source is
//! `{name, url, refresh interval}`; a fetch retries on empty or failed
//! responses up to the configured attempt count and reports failures
//! tagged with the source name. Responses are parsed with the TLE batch
//! parser, so malformed blocks inside an otherwise good feed are skipped
//! rather than failing the fetch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::elements::ElementRecord;
use crate::error::{Error, Result};
use crate::tle::Tle;

/// Default retry budget per fetch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_USER_AGENT: &str = "cicada/0.3 (satellite conjunction screening)";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote element catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSource {
    pub name: String,
    pub url: String,
    /// Suggested refresh cadence (minutes).
    pub refresh_minutes: u64,
    pub enabled: bool,
}

impl ElementSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, refresh_minutes: u64) -> Self {
        ElementSource {
            name: name.into(),
            url: url.into(),
            refresh_minutes,
            enabled: true,
        }
    }
}

/// Well-known CelesTrak GP feeds.
pub mod celestrak {
    use super::ElementSource;

    fn gp(name: &str, group: &str, refresh_minutes: u64) -> ElementSource {
        ElementSource::new(
            name,
            format!("https://celestrak.org/NORAD/elements/gp.php?GROUP={group}&FORMAT=tle"),
            refresh_minutes,
        )
    }

    pub fn stations() -> ElementSource {
        gp("Space Stations", "stations", 30)
    }

    pub fn starlink() -> ElementSource {
        gp("Starlink", "starlink", 60)
    }

    pub fn active() -> ElementSource {
        gp("Active Satellites", "active", 120)
    }

    pub fn debris() -> ElementSource {
        ElementSource::new(
            "Space Debris",
            "https://celestrak.org/NORAD/elements/gp.php?SPECIAL=debris&FORMAT=tle",
            180,
        )
    }

    pub fn weather() -> ElementSource {
        gp("Weather Satellites", "weather", 60)
    }
}

/// Result of one successful fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source_name: String,
    pub fetch_time: DateTime<Utc>,
    pub bytes_downloaded: usize,
    pub elements: Vec<ElementRecord>,
}

/// Cumulative fetch statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FetchStats {
    pub total_fetches: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub total_elements_fetched: u64,
    pub last_successful_fetch: Option<DateTime<Utc>>,
}

/// Blocking element fetcher over a set of sources.
pub struct ElementFetcher {
    agent: ureq::Agent,
    sources: Vec<ElementSource>,
    user_agent: String,
    max_retries: u32,
    stats: FetchStats,
}

impl Default for ElementFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementFetcher {
    pub fn new() -> Self {
        ElementFetcher {
            agent: build_agent(DEFAULT_USER_AGENT),
            sources: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            stats: FetchStats::default(),
        }
    }

    /// Replace the user agent sent with every request.
    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.user_agent = user_agent.into();
        self.agent = build_agent(&self.user_agent);
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn set_max_retries(&mut self, retries: u32) {
        self.max_retries = retries.max(1);
    }

    /// Add or replace (by name) a source.
    pub fn add_source(&mut self, source: ElementSource) {
        match self.sources.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    pub fn remove_source(&mut self, name: &str) {
        self.sources.retain(|s| s.name != name);
    }

    pub fn sources(&self) -> &[ElementSource] {
        &self.sources
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    /// Fetch one source, retrying on error or empty body.
    pub fn fetch(&mut self, source: &ElementSource) -> Result<FetchOutcome> {
        self.stats.total_fetches += 1;

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=self.max_retries {
            match self.http_get(&source.url) {
                Ok(body) if body.trim().is_empty() => {
                    last_error = "empty response body".to_string();
                }
                Ok(body) => {
                    let elements = parse_elements(&body);
                    if elements.is_empty() {
                        last_error = "no valid element sets in response".to_string();
                    } else {
                        self.stats.successful_fetches += 1;
                        self.stats.total_elements_fetched += elements.len() as u64;
                        let fetch_time = Utc::now();
                        self.stats.last_successful_fetch = Some(fetch_time);
                        log::info!(
                            "fetched {} elements from '{}' ({} bytes, attempt {attempt})",
                            elements.len(),
                            source.name,
                            body.len()
                        );
                        return Ok(FetchOutcome {
                            source_name: source.name.clone(),
                            fetch_time,
                            bytes_downloaded: body.len(),
                            elements,
                        });
                    }
                }
                Err(e) => {
                    last_error = e;
                }
            }
            log::debug!("fetch '{}' attempt {attempt} failed: {last_error}", source.name);
        }

        self.stats.failed_fetches += 1;
        Err(Error::external(&source.name, self.max_retries, last_error))
    }

    /// Fetch every enabled source, collecting per-source outcomes.
    pub fn fetch_all(&mut self) -> Vec<Result<FetchOutcome>> {
        let sources: Vec<ElementSource> = self.sources.iter().filter(|s| s.enabled).cloned().collect();
        sources.iter().map(|s| self.fetch(s)).collect()
    }

    fn http_get(&self, url: &str) -> std::result::Result<String, String> {
        match self.agent.get(url).call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| format!("body read failed: {e}")),
            Err(e) => Err(format!("request failed: {e}")),
        }
    }
}

fn build_agent(user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .user_agent(user_agent)
        .timeout(HTTP_TIMEOUT)
        .build()
}

/// Parse a fetched body into element records, skipping malformed blocks.
pub fn parse_elements(text: &str) -> Vec<ElementRecord> {
    Tle::parse_batch(text)
        .iter()
        .map(Tle::to_elements)
        .collect()
}
