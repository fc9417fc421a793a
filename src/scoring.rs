//! Two-phase scoring engine: gather signals, then synthesize one structured
//! scoring result.
//!
//! Phase 1 runs all four capability tools concurrently and keeps whatever
//! came back; a degraded tool contributes its absence marker to the prompt
//! instead of failing the run. Phase 2 is a single structured generation
//! call behind a circuit breaker. The overall score is always recomputed
//! from the fixed weights here, never taken from the model's arithmetic.

use crate::config::Config;
use crate::enrichment_log::{EnrichmentLogStore, LogContext};
use crate::errors::AppError;
use crate::models::{Classification, EnrichmentInput, SynthesisOutcome};
use crate::providers::LlmClient;
use crate::tools::{
    self, CompetitiveAnalysis, CompetitiveFocus, IntelFocus, NewsDocument, Tools, ToolOutcome,
    WebsiteFindings,
};
use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config as BreakerConfig, StateMachine};
use serde_json::json;
use std::time::Duration;

/// Fixed category weights. They must sum to 1.0 and are never reweighted,
/// even when a category's signals were degraded.
pub const FIRMOGRAPHIC_WEIGHT: f64 = 0.35;
pub const BEHAVIORAL_WEIGHT: f64 = 0.25;
pub const INTENT_WEIGHT: f64 = 0.25;
pub const TECHNOGRAPHIC_WEIGHT: f64 = 0.15;

/// Weighted overall score from the four 0-100 category scores.
pub fn weighted_total(
    firmographic: f64,
    behavioral: f64,
    intent: f64,
    technographic: f64,
) -> f64 {
    firmographic * FIRMOGRAPHIC_WEIGHT
        + behavioral * BEHAVIORAL_WEIGHT
        + intent * INTENT_WEIGHT
        + technographic * TECHNOGRAPHIC_WEIGHT
}

/// Classification from the overall score against the configured thresholds.
pub fn classify(overall: f64, sql_threshold: f64, mql_threshold: f64) -> Classification {
    if overall >= sql_threshold {
        Classification::Sql
    } else if overall >= mql_threshold {
        Classification::Mql
    } else {
        Classification::Unqualified
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Company-level signals, reusable across submissions from the same domain.
#[derive(Debug, Clone)]
pub struct CompanySignals {
    pub news: ToolOutcome<Vec<NewsDocument>>,
    pub website: ToolOutcome<WebsiteFindings>,
    pub competitive: ToolOutcome<CompetitiveAnalysis>,
}

impl CompanySignals {
    fn fully_present(&self) -> bool {
        !self.news.is_degraded() && !self.website.is_degraded() && !self.competitive.is_degraded()
    }
}

/// Everything phase 1 produced, degraded entries included.
#[derive(Debug, Clone)]
pub struct GatherResults {
    pub news: ToolOutcome<Vec<NewsDocument>>,
    pub website: ToolOutcome<WebsiteFindings>,
    pub competitive: ToolOutcome<CompetitiveAnalysis>,
    pub intent: ToolOutcome<crate::models::IntentSignals>,
}

impl GatherResults {
    pub fn degraded_count(&self) -> usize {
        [
            self.news.is_degraded(),
            self.website.is_degraded(),
            self.competitive.is_degraded(),
            self.intent.is_degraded(),
        ]
        .iter()
        .filter(|d| **d)
        .count()
    }

    fn prompt_json(&self) -> serde_json::Value {
        json!({
            "company_news": self.news.to_json(),
            "website_analysis": self.website.to_json(),
            "competitive_intelligence": self.competitive.to_json(),
            "intent_signals": self.intent.to_json(),
        })
    }
}

type SynthesisBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

fn synthesis_breaker() -> SynthesisBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);
    BreakerConfig::new().failure_policy(failure_policy).build()
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a B2B lead qualification analyst. \
Given a sales inquiry and gathered research signals, respond with a single JSON \
object with this exact shape: { \"company\": { \"name\", \"industry\", \
\"employee_count\" (int|null), \"revenue\" (number|null), \"location\" \
(string|null), \"enriched_data\" (object) }, \"intent_analysis\": { \"urgency\" \
(low|medium|high), \"budget_mentioned\" (bool), \"buying_stage\" \
(awareness|consideration|decision), \"pain_points\" (string[]), \"timeline\" \
(string), \"decision_makers\" (bool), \"keywords\" (string[]), \"sentiment\" \
(positive|neutral|negative), \"intent_score\" (0-100), \"reasoning\" (string) }, \
\"scoring\": { \"firmographic_score\", \"behavioral_score\", \"intent_score\", \
\"technographic_score\" (all 0-100), \"overall_score\", \"classification\" \
(SQL|MQL|UNQUALIFIED), \"classification_confidence\" (0-1), \"reasoning\": { \
\"firmographic\", \"behavioral\", \"intent\", \"technographic\", \"overall\" } } }. \
Signals marked degraded were unavailable; score conservatively from what is \
present, never invent facts for missing categories.";

/// The two-phase engine. Owns the tools, the synthesis model client, and the
/// circuit breaker guarding the synthesis call.
pub struct ScoringEngine {
    tools: Tools,
    llm: LlmClient,
    logs: EnrichmentLogStore,
    breaker: SynthesisBreaker,
    /// Company-level signals by domain, so back-to-back submissions from the
    /// same company do not re-run the search/crawl/research tools. Intent is
    /// per-submission and never cached.
    company_signals: moka::future::Cache<String, CompanySignals>,
    sql_threshold: f64,
    mql_threshold: f64,
    max_retries: u32,
}

impl ScoringEngine {
    pub fn new(config: &Config, logs: EnrichmentLogStore) -> Self {
        Self {
            tools: Tools::new(config, logs.clone()),
            llm: LlmClient::new(config),
            logs,
            breaker: synthesis_breaker(),
            company_signals: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(10_000)
                .build(),
            sql_threshold: config.sql_threshold,
            mql_threshold: config.mql_threshold,
            max_retries: config.synthesis_max_retries,
        }
    }

    async fn gather_company_signals(
        &self,
        ctx: &LogContext,
        input: &EnrichmentInput,
        domain: Option<&str>,
        company_name: &str,
    ) -> CompanySignals {
        if let Some(domain) = domain {
            if let Some(cached) = self.company_signals.get(domain).await {
                tracing::info!("Reusing cached company signals for {}", domain);
                return cached;
            }
        }

        let (news, website, competitive) = tokio::join!(
            self.tools
                .company_intelligence(ctx, company_name, IntelFocus::General),
            self.tools.website_analysis(ctx, &input.company_website, 10),
            self.tools.competitive_intelligence(
                ctx,
                company_name,
                &input.product_interest,
                CompetitiveFocus::Competitors,
            ),
        );

        let signals = CompanySignals {
            news,
            website,
            competitive,
        };
        // Degraded sets are not cached; the next run gets a fresh attempt.
        if signals.fully_present() {
            if let Some(domain) = domain {
                self.company_signals
                    .insert(domain.to_string(), signals.clone())
                    .await;
            }
        }
        signals
    }

    /// Phase 1: run all four tools concurrently, keep all four outcomes.
    pub async fn gather(&self, ctx: &LogContext, input: &EnrichmentInput) -> GatherResults {
        let domain = tools::extract_domain(&input.company_email);
        let company_name = domain
            .as_deref()
            .map(tools::company_name_from_domain)
            .unwrap_or_else(|| input.contact_name.clone());

        let (signals, intent) = tokio::join!(
            self.gather_company_signals(ctx, input, domain.as_deref(), &company_name),
            self.tools
                .intent_analysis(ctx, &input.how_can_we_help, domain.as_deref()),
        );

        let results = GatherResults {
            news: signals.news,
            website: signals.website,
            competitive: signals.competitive,
            intent,
        };
        if results.degraded_count() > 0 {
            tracing::warn!(
                "Gather completed with {} degraded signal(s)",
                results.degraded_count()
            );
        }
        results
    }

    /// Phase 2: one structured generation call. The model's overall score and
    /// classification are discarded and recomputed from the fixed weights.
    pub async fn synthesize(
        &self,
        ctx: &LogContext,
        input: &EnrichmentInput,
        gathered: &GatherResults,
    ) -> Result<SynthesisOutcome, AppError> {
        if !self.breaker.is_call_permitted() {
            return Err(AppError::SynthesisFailure(
                "Synthesis circuit open; skipping call".to_string(),
            ));
        }

        let prompt = format!(
            "Inquiry:\n{}\n\nGathered signals:\n{}",
            serde_json::to_string_pretty(&json!({
                "contact_name": input.contact_name,
                "company_email": input.company_email,
                "company_website": input.company_website,
                "country": input.country,
                "company_size": input.company_size,
                "product_interest": input.product_interest,
                "how_can_we_help": input.how_can_we_help,
                "behavioral_data": input.behavioral_data,
            }))
            .unwrap_or_default(),
            serde_json::to_string_pretty(&gathered.prompt_json()).unwrap_or_default()
        );

        let log_id = self
            .logs
            .start_log(
                ctx,
                crate::costs::Provider::Llm,
                "lead_synthesis",
                json!({ "degraded_signals": gathered.degraded_count() }),
            )
            .await;

        let (value, tokens) = match self.llm.generate_json(SYNTHESIS_SYSTEM_PROMPT, &prompt).await
        {
            Ok(ok) => {
                self.breaker.on_success();
                ok
            }
            Err(e) => {
                self.breaker.on_error();
                match &e {
                    AppError::ProviderTimeout(_) => self.logs.mark_timeout(log_id).await,
                    _ => self.logs.fail_log(log_id, &e.to_string(), None).await,
                }
                return Err(AppError::SynthesisFailure(e.to_string()));
            }
        };

        let mut outcome: SynthesisOutcome =
            serde_json::from_value(value.clone()).map_err(|e| {
                AppError::SynthesisFailure(format!("Synthesis returned unusable shape: {}", e))
            })?;

        // The intent tool already produced authoritative signals; keep them
        // over the model's restatement when they exist.
        if let Some(signals) = gathered.intent.data() {
            outcome.intent_analysis = signals.clone();
        }

        let scoring = &mut outcome.scoring;
        scoring.firmographic_score = clamp_score(scoring.firmographic_score);
        scoring.behavioral_score = clamp_score(scoring.behavioral_score);
        scoring.intent_score = clamp_score(scoring.intent_score);
        scoring.technographic_score = clamp_score(scoring.technographic_score);
        scoring.overall_score = weighted_total(
            scoring.firmographic_score,
            scoring.behavioral_score,
            scoring.intent_score,
            scoring.technographic_score,
        );
        scoring.classification =
            classify(scoring.overall_score, self.sql_threshold, self.mql_threshold);
        scoring.classification_confidence = scoring.classification_confidence.clamp(0.0, 1.0);

        self.logs
            .complete_log(
                log_id,
                crate::costs::Provider::Llm,
                &self.llm.model,
                value,
                Some(tokens),
                None,
            )
            .await;

        tracing::info!(
            "Synthesis complete: overall {:.1} -> {}",
            outcome.scoring.overall_score,
            outcome.scoring.classification
        );
        Ok(outcome)
    }

    /// Gather once, then synthesize with bounded retries on failure.
    pub async fn enrich(
        &self,
        ctx: &LogContext,
        input: &EnrichmentInput,
    ) -> Result<SynthesisOutcome, AppError> {
        let gathered = self.gather(ctx, input).await;

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.synthesize(ctx, input, &gathered).await {
                Ok(outcome) => return Ok(outcome),
                Err(e @ AppError::SynthesisFailure(_)) => {
                    tracing::warn!(
                        "Synthesis attempt {}/{} failed: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::SynthesisFailure("Synthesis failed with no attempts recorded".to_string())
        }))
    }
}
