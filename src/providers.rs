//! Thin HTTP clients for the four external capability providers.
//!
//! Each client owns a `reqwest::Client`, a base URL, and an API key from
//! configuration. Base URLs come from config so tests can point the clients
//! at a mock server. Provider responses are parsed into minimal typed shapes
//! here; the capability tools in `tools` own the normalized result contract.

use crate::config::Config;
use crate::errors::AppError;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Network failure mapping shared by all four clients. Deadline expiry is
/// kept distinct so callers can record the `timeout` log status.
fn request_error(provider_label: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ProviderTimeout(format!("{} request timed out", provider_label))
    } else {
        AppError::ExternalApiError(format!("{} request failed: {}", provider_label, e))
    }
}

/// One document returned by the search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDocument {
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "publishedDate", default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchDocument>,
}

/// News/company-signal search provider client.
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.search_base_url.clone(),
            api_key: config.search_api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Neural search with content, restricted to documents published within
    /// the last `days` days. Returns at most `num_results` documents.
    pub async fn search_recent(
        &self,
        query: &str,
        num_results: u32,
        days: i64,
    ) -> Result<Vec<SearchDocument>, AppError> {
        let start_published = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();

        tracing::debug!("Search provider query: {}", query);

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "query": query,
                "type": "neural",
                "numResults": num_results,
                "startPublishedDate": start_published,
                "contents": {
                    "text": { "maxCharacters": 1000, "includeHtmlTags": false }
                }
            }))
            .send()
            .await
            .map_err(|e| request_error("Search provider", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Search provider returned status {}: {}",
                status, error_text
            )));
        }

        let result: SearchResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse search response: {}", e))
        })?;

        Ok(result.results)
    }
}

/// One page returned by the crawl provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Main-content markdown excerpt.
    pub markdown: String,
}

#[derive(Debug, Deserialize)]
struct CrawlPageEnvelope {
    markdown: Option<String>,
    metadata: Option<CrawlPageMetadata>,
}

#[derive(Debug, Deserialize)]
struct CrawlPageMetadata {
    #[serde(rename = "sourceURL", default)]
    source_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    #[serde(default)]
    data: Vec<CrawlPageEnvelope>,
}

/// Website crawl provider client.
pub struct CrawlClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl CrawlClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.crawl_base_url.clone(),
            api_key: config.crawl_api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Crawl a site with an explicit path allow/deny list, main content only.
    pub async fn crawl(
        &self,
        url: &str,
        max_pages: u32,
        include_paths: &[&str],
        exclude_paths: &[&str],
    ) -> Result<Vec<CrawledPage>, AppError> {
        tracing::debug!("Crawl provider request: {} (limit {})", url, max_pages);

        let response = self
            .client
            .post(format!("{}/v1/crawl", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "url": url,
                "limit": max_pages,
                "includePaths": include_paths,
                "excludePaths": exclude_paths,
                "scrapeOptions": {
                    "formats": ["markdown"],
                    "onlyMainContent": true
                }
            }))
            .send()
            .await
            .map_err(|e| request_error("Crawl provider", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Crawl provider returned status {}: {}",
                status, error_text
            )));
        }

        let result: CrawlResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse crawl response: {}", e))
        })?;

        let pages = result
            .data
            .into_iter()
            .filter_map(|page| {
                let markdown = page.markdown?;
                let metadata = page.metadata.unwrap_or(CrawlPageMetadata {
                    source_url: None,
                    title: None,
                });
                Some(CrawledPage {
                    url: metadata.source_url.unwrap_or_else(|| url.to_string()),
                    title: metadata.title,
                    markdown,
                })
            })
            .collect();

        Ok(pages)
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// A chat-completion result with its token usage for cost tracking.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tokens_used: u64,
}

async fn chat_completion(
    client: &Client,
    base_url: &str,
    api_key: &str,
    timeout: Duration,
    body: Value,
    provider_label: &str,
) -> Result<Completion, AppError> {
    let response = client
        .post(format!("{}/v1/chat/completions", base_url))
        .timeout(timeout)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| request_error(provider_label, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AppError::ExternalApiError(format!(
            "{} returned status {}: {}",
            provider_label, status, error_text
        )));
    }

    let result: ChatResponse = response.json().await.map_err(|e| {
        AppError::ExternalApiError(format!("Failed to parse {} response: {}", provider_label, e))
    })?;

    let content = result
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| {
            AppError::ExternalApiError(format!("{} returned no choices", provider_label))
        })?;

    Ok(Completion {
        content,
        tokens_used: result.usage.unwrap_or_default().total_tokens,
    })
}

/// Language-model provider client for structured generation.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    pub model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            model: config.llm_model.clone(),
        }
    }

    /// Structured generation: low temperature, JSON-object response format.
    /// Returns the parsed JSON value plus token usage.
    pub async fn generate_json(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<(Value, u64), AppError> {
        let completion = chat_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            self.timeout,
            json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt }
                ],
                "temperature": 0.2,
                "response_format": { "type": "json_object" }
            }),
            "LLM provider",
        )
        .await?;

        let value: Value = serde_json::from_str(&completion.content).map_err(|e| {
            AppError::ExternalApiError(format!("LLM returned malformed JSON: {}", e))
        })?;

        Ok((value, completion.tokens_used))
    }
}

/// Market-research provider client (search-grounded text synthesis).
pub struct ResearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    pub model: String,
}

impl ResearchClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.research_base_url.clone(),
            api_key: config.research_api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            model: config.research_model.clone(),
        }
    }

    /// Free-text research synthesis for competitive intelligence.
    pub async fn generate_text(&self, prompt: &str) -> Result<Completion, AppError> {
        chat_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            self.timeout,
            json!({
                "model": self.model,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
                "temperature": 0.3
            }),
            "Research provider",
        )
        .await
    }
}
