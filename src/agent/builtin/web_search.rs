//! Web search tool backed by DuckDuckGo.
//!
//! Result snippets come from the HTML results page. When that page has no
//! organic results the Instant Answer API is tried for an encyclopedia-style
//! abstract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::agent::tools::{Tool, ToolKind};
use crate::error::{LanternError, Result};

const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const INSTANT_ENDPOINT: &str = "https://api.duckduckgo.com/";
const BROWSER_AGENT: &str = "Mozilla/5.0 (compatible; Lantern/0.1)";
const MAX_RESULTS: usize = 5;
const MAX_RELATED: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One organic result from the HTML results page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    client: Client,
    html_endpoint: String,
    instant_endpoint: String,
    budget: usize,
}

impl WebSearchTool {
    pub fn new(budget: usize) -> Self {
        Self::with_endpoints(HTML_ENDPOINT, INSTANT_ENDPOINT, budget)
    }

    pub fn with_endpoints(html_endpoint: &str, instant_endpoint: &str, budget: usize) -> Self {
        crate::ensure_tls_provider();
        Self {
            client: Client::new(),
            html_endpoint: html_endpoint.to_string(),
            instant_endpoint: instant_endpoint.to_string(),
            budget,
        }
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String> {
        let url = Url::parse_with_params(endpoint, params)
            .map_err(|e| LanternError::Tool(format!("Invalid search URL: {}", e)))?;
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LanternError::Tool(format!(
                "Search returned status {}",
                resp.status()
            )));
        }
        Ok(resp.text().await?)
    }

    async fn search_html(&self, query: &str) -> Result<Vec<SearchResult>> {
        let html = self.fetch(&self.html_endpoint, &[("q", query)]).await?;
        if is_captcha_page(&html) {
            return Err(LanternError::Tool(
                "DuckDuckGo blocked the request with a CAPTCHA. Try again later.".into(),
            ));
        }
        Ok(extract_results(&html))
    }

    async fn search_instant(&self, query: &str) -> Result<String> {
        let text = self
            .fetch(
                &self.instant_endpoint,
                &[
                    ("q", query),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ],
            )
            .await?;
        // DuckDuckGo serves JSON as application/x-javascript
        let body: Value = serde_json::from_str(&text)?;
        Ok(format_instant_answer(query, &body))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information, facts, news or definitions. \
         Input should be a short search query."
    }

    fn budget(&self) -> usize {
        self.budget
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        let query = input.trim().trim_matches('"').trim();
        if query.is_empty() {
            return Err(LanternError::Tool("Empty search query".into()));
        }

        let results = self.search_html(query).await?;
        if !results.is_empty() {
            return Ok(format_results(&results));
        }
        tracing::debug!("No HTML results for '{}', trying instant answer", query);
        self.search_instant(query).await
    }
}

fn is_captcha_page(html: &str) -> bool {
    html.contains("anomaly-modal") || html.contains("Unfortunately, bots")
}

/// Pull the organic results out of a DuckDuckGo HTML results page.
pub fn extract_results(html: &str) -> Vec<SearchResult> {
    html.split("result__body")
        .skip(1)
        .filter_map(|block| {
            let title = element_text(block, "result__a")?;
            let url = element_text(block, "result__url").unwrap_or_default();
            let snippet = element_text(block, "result__snippet").unwrap_or_default();
            Some(SearchResult {
                title,
                url,
                snippet,
            })
        })
        .take(MAX_RESULTS)
        .collect()
}

/// Text content of the first element carrying `class`, tags stripped.
fn element_text(block: &str, class: &str) -> Option<String> {
    let marker = format!("class=\"{}\"", class);
    let rest = &block[block.find(&marker)? + marker.len()..];
    let rest = &rest[rest.find('>')? + 1..];
    let end = ["</a>", "</div>", "</td>"]
        .iter()
        .filter_map(|close| rest.find(close))
        .min()
        .unwrap_or(rest.len());
    let text = decode_html_entities(&strip_tags(&rest[..end]));
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_html_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Render organic results as a numbered observation.
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut entry = format!("{}. {}", i + 1, r.title);
            if !r.snippet.is_empty() {
                entry.push_str(&format!("\n{}", r.snippet));
            }
            if !r.url.is_empty() {
                entry.push_str(&format!("\nURL: {}", r.url));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turn an Instant Answer payload into a compact text observation.
pub fn format_instant_answer(query: &str, body: &Value) -> String {
    let text = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let mut sections = Vec::new();

    if let Some(answer) = text("Answer") {
        sections.push(format!("Answer: {}", answer));
    }
    if let Some(abstract_text) = text("AbstractText") {
        let heading = text("Heading").unwrap_or(query);
        let mut line = format!("{}: {}", heading, abstract_text);
        if let Some(url) = text("AbstractURL") {
            line.push_str(&format!(" ({})", url));
        }
        sections.push(line);
    }
    if let Some(definition) = text("Definition") {
        sections.push(format!("Definition: {}", definition));
    }

    let related = related_topics(body);
    if !related.is_empty() {
        let lines: Vec<String> = related
            .iter()
            .take(MAX_RELATED)
            .map(|(text, url)| match url {
                Some(url) => format!("- {} ({})", text, url),
                None => format!("- {}", text),
            })
            .collect();
        sections.push(format!("Related:\n{}", lines.join("\n")));
    }

    if sections.is_empty() {
        format!("No results found for '{}'.", query)
    } else {
        sections.join("\n\n")
    }
}

/// Flatten `RelatedTopics`, including topics nested inside category groups.
fn related_topics(body: &Value) -> Vec<(String, Option<String>)> {
    fn collect(topics: &[Value], out: &mut Vec<(String, Option<String>)>) {
        for topic in topics {
            if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
                collect(nested, out);
                continue;
            }
            let Some(text) = topic.get("Text").and_then(Value::as_str) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            let url = topic
                .get("FirstURL")
                .and_then(Value::as_str)
                .map(String::from);
            out.push((text.trim().to_string(), url));
        }
    }

    let mut out = Vec::new();
    if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
        collect(topics, &mut out);
    }
    out
}
