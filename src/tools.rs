//! Capability tools wrapping the external providers.
//!
//! Each tool normalizes its provider's response into a typed result and
//! returns a `ToolOutcome` instead of an error: provider failures degrade
//! the outcome, they never abort the enrichment run. Every call is wrapped
//! in start/complete/fail logging against the run's `LogContext`.

use crate::config::Config;
use crate::costs::{self, Provider};
use crate::enrichment_log::{EnrichmentLogStore, LogContext, LogId};
use crate::errors::AppError;
use crate::models::{BuyingStage, IntentSignals, Sentiment, Urgency};
use crate::providers::{CrawlClient, LlmClient, ResearchClient, SearchClient};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const NEWS_LOOKBACK_DAYS: i64 = 90;
const NEWS_MAX_RESULTS: u32 = 5;
const NEWS_EXCERPT_MAX_CHARS: usize = 800;
const CRAWL_MAX_PAGES: u32 = 10;

const CRAWL_INCLUDE_PATHS: &[&str] = &[
    "/about.*",
    "/pricing.*",
    "/customers.*",
    "/case-studies.*",
    "/solutions.*",
];
const CRAWL_EXCLUDE_PATHS: &[&str] = &["/blog.*", "/news.*", "/careers.*"];

/// Result of one tool call. `Degraded` carries the provider failure so the
/// synthesis prompt can state which signals are missing; it is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome<T> {
    Ok { data: T },
    Degraded {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl<T> ToolOutcome<T> {
    pub fn ok(data: T) -> Self {
        ToolOutcome::Ok { data }
    }

    pub fn degraded(error: impl Into<String>) -> Self {
        ToolOutcome::Degraded {
            error: error.into(),
            details: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ToolOutcome::Degraded { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ToolOutcome::Ok { data } => Some(data),
            ToolOutcome::Degraded { .. } => None,
        }
    }
}

impl<T: Serialize> ToolOutcome<T> {
    /// JSON view for prompts and log rows.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"status": "degraded"}))
    }
}

/// Research focus for the company news search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelFocus {
    Funding,
    Growth,
    Leadership,
    General,
}

impl IntelFocus {
    fn query_suffix(&self) -> &'static str {
        match self {
            IntelFocus::Funding => "funding round investment raise",
            IntelFocus::Growth => "growth expansion hiring revenue",
            IntelFocus::Leadership => "CEO executive leadership appointment",
            IntelFocus::General => "company news announcement",
        }
    }
}

/// Research focus for competitive intelligence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitiveFocus {
    Competitors,
    MarketPosition,
    Differentiation,
}

impl CompetitiveFocus {
    fn question(&self) -> &'static str {
        match self {
            CompetitiveFocus::Competitors => {
                "Who are the main competitors? List them with a one-line description each."
            }
            CompetitiveFocus::MarketPosition => {
                "What is the company's market position, approximate market share, and trajectory?"
            }
            CompetitiveFocus::Differentiation => {
                "What differentiates this company from its competitors in product and pricing?"
            }
        }
    }
}

/// A normalized news document from the search tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDocument {
    pub title: String,
    pub url: String,
    pub excerpt: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub relevance: Option<f64>,
}

/// One crawled page summary from the website tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub excerpt: String,
}

/// Crawl findings for a company website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteFindings {
    pub pages: Vec<PageSummary>,
    pub pages_crawled: u32,
}

/// Free-text competitive analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitiveAnalysis {
    pub analysis: String,
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

/// The four capability tools, sharing the provider clients and log store.
pub struct Tools {
    search: SearchClient,
    crawl: CrawlClient,
    llm: LlmClient,
    research: ResearchClient,
    logs: EnrichmentLogStore,
}

impl Tools {
    pub fn new(config: &Config, logs: EnrichmentLogStore) -> Self {
        Self {
            search: SearchClient::new(config),
            crawl: CrawlClient::new(config),
            llm: LlmClient::new(config),
            research: ResearchClient::new(config),
            logs,
        }
    }

    /// Close out a failed log row with the right terminal status. Deadline
    /// expiry records `timeout`, everything else `failed`.
    async fn record_failure(&self, log_id: LogId, e: &AppError) {
        match e {
            AppError::ProviderTimeout(_) => self.logs.mark_timeout(log_id).await,
            _ => self.logs.fail_log(log_id, &e.to_string(), None).await,
        }
    }

    /// Recent company news and signals. At most five documents from the
    /// last ninety days, excerpts capped for prompt budget.
    pub async fn company_intelligence(
        &self,
        ctx: &LogContext,
        company: &str,
        focus: IntelFocus,
    ) -> ToolOutcome<Vec<NewsDocument>> {
        let query = format!("{} {}", company, focus.query_suffix());
        let log_id = self
            .logs
            .start_log(
                ctx,
                Provider::Search,
                "company_intelligence",
                json!({ "query": query, "num_results": NEWS_MAX_RESULTS }),
            )
            .await;

        match self
            .search
            .search_recent(&query, NEWS_MAX_RESULTS, NEWS_LOOKBACK_DAYS)
            .await
        {
            Ok(documents) => {
                let documents: Vec<NewsDocument> = documents
                    .into_iter()
                    .take(NEWS_MAX_RESULTS as usize)
                    .map(|doc| NewsDocument {
                        title: doc.title.unwrap_or_else(|| "Untitled".to_string()),
                        url: doc.url,
                        excerpt: truncate_chars(
                            doc.text.as_deref().unwrap_or(""),
                            NEWS_EXCERPT_MAX_CHARS,
                        ),
                        published_date: doc.published_date,
                        relevance: doc.score,
                    })
                    .collect();

                self.logs
                    .complete_log(
                        log_id,
                        Provider::Search,
                        "",
                        json!({ "result_count": documents.len() }),
                        None,
                        Some(costs::search_cost(true)),
                    )
                    .await;

                ToolOutcome::ok(documents)
            }
            Err(e) => {
                tracing::warn!("Company intelligence degraded for {}: {}", company, e);
                self.record_failure(log_id, &e).await;
                ToolOutcome::degraded(e.to_string())
            }
        }
    }

    /// Crawl a company website for positioning pages. Marketing noise
    /// (blog, news, careers) is excluded up front.
    pub async fn website_analysis(
        &self,
        ctx: &LogContext,
        website_url: &str,
        max_pages: u32,
    ) -> ToolOutcome<WebsiteFindings> {
        let max_pages = max_pages.min(CRAWL_MAX_PAGES);
        let log_id = self
            .logs
            .start_log(
                ctx,
                Provider::Crawl,
                "website_analysis",
                json!({ "url": website_url, "max_pages": max_pages }),
            )
            .await;

        match self
            .crawl
            .crawl(website_url, max_pages, CRAWL_INCLUDE_PATHS, CRAWL_EXCLUDE_PATHS)
            .await
        {
            Ok(pages) => {
                let pages: Vec<PageSummary> = pages
                    .into_iter()
                    .map(|page| PageSummary {
                        url: page.url,
                        title: page.title,
                        excerpt: truncate_chars(&page.markdown, NEWS_EXCERPT_MAX_CHARS),
                    })
                    .collect();
                let pages_crawled = pages.len() as u32;

                self.logs
                    .complete_log(
                        log_id,
                        Provider::Crawl,
                        "",
                        json!({ "pages_crawled": pages_crawled }),
                        None,
                        Some(costs::crawl_cost(pages_crawled)),
                    )
                    .await;

                ToolOutcome::ok(WebsiteFindings {
                    pages,
                    pages_crawled,
                })
            }
            Err(e) => {
                tracing::warn!("Website analysis degraded for {}: {}", website_url, e);
                self.record_failure(log_id, &e).await;
                ToolOutcome::degraded(e.to_string())
            }
        }
    }

    /// Search-grounded competitive analysis from the research provider.
    pub async fn competitive_intelligence(
        &self,
        ctx: &LogContext,
        company: &str,
        industry: &str,
        focus: CompetitiveFocus,
    ) -> ToolOutcome<CompetitiveAnalysis> {
        let prompt = format!(
            "Company: {} (industry: {}). {} Be concise and factual; \
             cite only what you can verify.",
            company,
            industry,
            focus.question()
        );
        let log_id = self
            .logs
            .start_log(
                ctx,
                Provider::Research,
                "competitive_intelligence",
                json!({ "company": company, "industry": industry }),
            )
            .await;

        match self.research.generate_text(&prompt).await {
            Ok(completion) => {
                self.logs
                    .complete_log(
                        log_id,
                        Provider::Research,
                        &self.research.model,
                        json!({ "length": completion.content.len() }),
                        Some(completion.tokens_used),
                        None,
                    )
                    .await;

                ToolOutcome::ok(CompetitiveAnalysis {
                    analysis: completion.content,
                })
            }
            Err(e) => {
                tracing::warn!("Competitive intelligence degraded for {}: {}", company, e);
                self.record_failure(log_id, &e).await;
                ToolOutcome::degraded(e.to_string())
            }
        }
    }

    /// Structured buying-intent extraction from the submission's free text.
    ///
    /// Never degrades: on provider failure the result carries neutral base
    /// values with the fallback marker set, except urgency which is read
    /// from the text itself so time-pressure language survives an outage.
    pub async fn intent_analysis(
        &self,
        ctx: &LogContext,
        text: &str,
        company_context: Option<&str>,
    ) -> ToolOutcome<IntentSignals> {
        let system = "You extract structured buying intent from sales inquiries. \
                      Respond with a single JSON object with keys: urgency \
                      (low|medium|high), budget_mentioned (bool), buying_stage \
                      (awareness|consideration|decision), pain_points (string[]), \
                      timeline (string), decision_makers (bool), keywords \
                      (string[]), sentiment (positive|neutral|negative), \
                      intent_score (0-100), reasoning (string).";
        let prompt = match company_context {
            Some(context) => format!("Inquiry: {}\n\nCompany context: {}", text, context),
            None => format!("Inquiry: {}", text),
        };

        let log_id = self
            .logs
            .start_log(
                ctx,
                Provider::Llm,
                "intent_analysis",
                json!({ "text_length": text.len() }),
            )
            .await;

        match self.llm.generate_json(system, &prompt).await {
            Ok((value, tokens)) => match serde_json::from_value::<IntentSignals>(value.clone()) {
                Ok(signals) => {
                    self.logs
                        .complete_log(
                            log_id,
                            Provider::Llm,
                            &self.llm.model,
                            value,
                            Some(tokens),
                            None,
                        )
                        .await;
                    ToolOutcome::ok(signals)
                }
                Err(e) => {
                    tracing::warn!("Intent analysis returned unusable shape: {}", e);
                    self.logs.fail_log(log_id, &e.to_string(), None).await;
                    ToolOutcome::ok(fallback_intent(text))
                }
            },
            Err(e) => {
                tracing::warn!("Intent analysis fell back to lexical scan: {}", e);
                self.record_failure(log_id, &e).await;
                ToolOutcome::ok(fallback_intent(text))
            }
        }
    }
}

/// Neutral intent signals used when the provider is unavailable. Urgency is
/// the one field still derived from the text: a lexical scan for
/// time-pressure language.
pub fn fallback_intent(text: &str) -> IntentSignals {
    IntentSignals {
        urgency: lexical_urgency(text),
        budget_mentioned: mentions_budget(text),
        buying_stage: BuyingStage::Consideration,
        pain_points: Vec::new(),
        timeline: "unknown".to_string(),
        decision_makers: false,
        keywords: Vec::new(),
        sentiment: Sentiment::Neutral,
        intent_score: 50.0,
        reasoning: "Intent provider unavailable; neutral baseline with lexical urgency scan."
            .to_string(),
        fallback: true,
    }
}

/// Urgency from time-pressure phrases alone.
pub fn lexical_urgency(text: &str) -> Urgency {
    // Literal patterns, checked at test time.
    let high = Regex::new(
        r"(?i)\b(urgent|urgently|asap|immediately|right away|this quarter|this month|end of (the )?quarter)\b",
    )
    .unwrap();
    let medium =
        Regex::new(r"(?i)\b(soon|next quarter|this year|in the coming months|shortly)\b").unwrap();

    if high.is_match(text) {
        Urgency::High
    } else if medium.is_match(text) {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

fn mentions_budget(text: &str) -> bool {
    let budget =
        Regex::new(r"(?i)(\b(budget|budgeted|allocated funds?)\b|\$\s?\d)").unwrap();
    budget.is_match(text)
}

/// Company domain from a work email. Free mail providers yield nothing, so
/// enrichment does not crawl gmail.com.
pub fn extract_domain(email: &str) -> Option<String> {
    const FREE_PROVIDERS: &[&str] = &[
        "gmail.com",
        "yahoo.com",
        "hotmail.com",
        "outlook.com",
        "icloud.com",
        "aol.com",
        "proton.me",
        "protonmail.com",
    ];

    let domain = email.rsplit('@').next()?.trim().to_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        return None;
    }
    if FREE_PROVIDERS.contains(&domain.as_str()) {
        return None;
    }
    Some(domain)
}

/// Best-effort company name when the submission left it blank: the domain's
/// registrable label, capitalized.
pub fn company_name_from_domain(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or(domain);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => domain.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_scan_reads_time_pressure() {
        assert_eq!(
            lexical_urgency("We urgently need a solution this quarter"),
            Urgency::High
        );
        assert_eq!(lexical_urgency("Need this ASAP please"), Urgency::High);
        assert_eq!(
            lexical_urgency("We are planning for next quarter"),
            Urgency::Medium
        );
        assert_eq!(lexical_urgency("Just browsing your docs"), Urgency::Low);
    }

    #[test]
    fn fallback_keeps_neutral_base_but_real_urgency() {
        let signals = fallback_intent("This is urgent, we need rollout this quarter");
        assert!(signals.fallback);
        assert_eq!(signals.urgency, Urgency::High);
        assert_eq!(signals.intent_score, 50.0);
        assert_eq!(signals.buying_stage, BuyingStage::Consideration);
    }

    #[test]
    fn free_mail_domains_are_skipped() {
        assert_eq!(extract_domain("jane@gmail.com"), None);
        assert_eq!(
            extract_domain("jane@acme-corp.io"),
            Some("acme-corp.io".to_string())
        );
        assert_eq!(extract_domain("not-an-email"), None);
    }

    #[test]
    fn company_name_from_domain_capitalizes_label() {
        assert_eq!(company_name_from_domain("acme.io"), "Acme");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(900);
        let cut = truncate_chars(&text, NEWS_EXCERPT_MAX_CHARS);
        assert_eq!(cut.chars().count(), NEWS_EXCERPT_MAX_CHARS);
    }
}
