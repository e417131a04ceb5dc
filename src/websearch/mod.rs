
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt::Write;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, Settings};
use crate::llm::ChatClient;

pub const DEFAULT_RESULT_COUNT: usize = 3;

const SEARCH_ENDPOINT: &str = "https://serpapi.com/search.json";
const SEARCH_TIMEOUT_SECONDS: u64 = 15;
const FETCH_TIMEOUT_SECONDS: u64 = 8;
const RETRY_ATTEMPTS: u32 = 3;
const PAGE_FETCH_CHAR_LIMIT: usize = 30_000;
const EXCERPT_CHAR_LIMIT: usize = 1_500;

const WEB_ANSWER_PROMPT: &str = "You are a helpful AI that answers questions based on web search \
    results. Use the provided search results to inform your response, but answer in a natural \
    way. If the search results don't contain relevant information, acknowledge this and provide \
    a general response based on your knowledge.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Client for a SerpAPI-compatible search endpoint.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    endpoint: Url,
    api_key: String,
    agent: ureq::Agent,
}

impl WebSearchClient {
    #[inline]
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .serpapi_key()
            .context("SERPAPI_KEY not configured")?;

        let endpoint = Url::parse(SEARCH_ENDPOINT).context("Failed to parse search endpoint")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(SEARCH_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            api_key,
            agent,
        })
    }

    #[inline]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Top organic results for a query. Rate limits and transient server
    /// errors are retried with a doubling delay; auth errors fail fast.
    #[inline]
    pub fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("api_key", &self.api_key)
            .append_pair("num", &num_results.to_string());

        let response_text = request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Web search request failed")?;

        let response: SerpResponse =
            serde_json::from_str(&response_text).context("Failed to parse search response")?;

        let hits: Vec<SearchHit> = response
            .organic_results
            .into_iter()
            .take(num_results)
            .map(|result| SearchHit {
                title: result.title,
                link: result.link,
                snippet: result.snippet,
            })
            .collect();

        debug!("Web search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Fetch a page and reduce it to a plain-text excerpt.
    #[inline]
    pub fn page_excerpt(&self, url: &str) -> Result<String> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(FETCH_TIMEOUT_SECONDS)))
            .build()
            .into();

        let body = request_with_retry(|| {
            agent
                .get(url)
                .header("User-Agent", "Mozilla/5.0 (compatible; ragline)")
                .header("Accept", "text/html,application/xhtml+xml,application/xml")
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to fetch {}", url))?;

        let body: String = body.chars().take(PAGE_FETCH_CHAR_LIMIT).collect();
        Ok(extract_text(&body))
    }

    /// Assemble the numbered search-results block handed to the generation
    /// caller. The first hit is enriched with a page excerpt when the page
    /// can be fetched.
    #[inline]
    pub fn summary_for_query(&self, query: &str) -> Result<Option<String>> {
        let hits = self.search(query, DEFAULT_RESULT_COUNT)?;
        if hits.is_empty() {
            return Ok(None);
        }

        let mut summary = String::from("Search results information:\n\n");
        for (position, hit) in hits.iter().enumerate() {
            let _ = write!(
                summary,
                "{}. {}\n   URL: {}\n   Summary: {}\n\n",
                position + 1,
                hit.title,
                hit.link,
                hit.snippet
            );

            if position == 0 {
                match self.page_excerpt(&hit.link) {
                    Ok(excerpt) if !excerpt.is_empty() => {
                        let _ = write!(
                            summary,
                            "Extracted content from the top result:\n{}\n\n",
                            excerpt
                        );
                    }
                    Ok(_) => {}
                    Err(error) => debug!("Could not enrich top result: {}", error),
                }
            }
        }

        Ok(Some(summary))
    }
}

/// Answer a query from live web results, or `None` when web search is
/// disabled or unavailable.
#[inline]
pub fn answer_with_web_search(config: &Config, settings: &Settings, query: &str) -> Option<String> {
    if !settings.web_search_enabled() {
        debug!("Web search is disabled");
        return None;
    }

    let client = match WebSearchClient::new(settings) {
        Ok(client) => client,
        Err(error) => {
            warn!("Cannot search the web: {}", error);
            return None;
        }
    };

    let summary = match client.summary_for_query(query) {
        Ok(Some(summary)) => summary,
        Ok(None) => return None,
        Err(error) => {
            warn!("Web search failed: {}", error);
            return None;
        }
    };

    let chat = match ChatClient::new(config, settings) {
        Ok(chat) => chat,
        Err(error) => {
            warn!("Cannot generate web answer: {}", error);
            return None;
        }
    };

    match chat.generate(query, WEB_ANSWER_PROMPT, Some(&summary)) {
        Ok(answer) => {
            info!("Generated answer from web search results");
            Some(answer)
        }
        Err(error) => {
            warn!("Failed to generate web answer: {}", error);
            None
        }
    }
}

/// Strip scripts, styles and markup from an HTML fragment and collapse the
/// remaining whitespace.
fn extract_text(html: &str) -> String {
    static SCRIPT_RE: OnceLock<fancy_regex::Regex> = OnceLock::new();
    static STYLE_RE: OnceLock<fancy_regex::Regex> = OnceLock::new();
    static TAG_RE: OnceLock<fancy_regex::Regex> = OnceLock::new();
    static SPACE_RE: OnceLock<fancy_regex::Regex> = OnceLock::new();

    let script_re = SCRIPT_RE.get_or_init(|| {
        fancy_regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex")
    });
    let style_re = STYLE_RE.get_or_init(|| {
        fancy_regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex")
    });
    let tag_re =
        TAG_RE.get_or_init(|| fancy_regex::Regex::new(r"<[^>]+>").expect("valid regex"));
    let space_re = SPACE_RE.get_or_init(|| fancy_regex::Regex::new(r"\s+").expect("valid regex"));

    let text = script_re.replace_all(html, " ");
    let text = style_re.replace_all(&text, " ");
    let text = tag_re.replace_all(&text, " ");
    let text = space_re.replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() > EXCERPT_CHAR_LIMIT {
        let mut capped: String = text.chars().take(EXCERPT_CHAR_LIMIT).collect();
        capped.push_str("...");
        capped
    } else {
        text.to_string()
    }
}

fn request_with_retry<F>(mut request_fn: F) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let mut last_error = None;
    let mut delay = Duration::from_secs(1);

    for attempt in 1..=RETRY_ATTEMPTS {
        match request_fn() {
            Ok(response_text) => return Ok(response_text),
            Err(error) => {
                let should_retry = match &error {
                    ureq::Error::StatusCode(status) => {
                        if *status == 429 || *status >= 500 {
                            warn!(
                                "Retryable HTTP status {}, attempt {}/{}",
                                status, attempt, RETRY_ATTEMPTS
                            );
                            true
                        } else {
                            return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                        }
                    }
                    ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_) => {
                        warn!(
                            "Transport error: {}, attempt {}/{}",
                            error, attempt, RETRY_ATTEMPTS
                        );
                        true
                    }
                    _ => false,
                };

                if !should_retry {
                    return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                }

                last_error = Some(anyhow::anyhow!("Request error: {}", error));

                if attempt < RETRY_ATTEMPTS {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
}
