use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Database Models ============

/// Raw form capture from the intake boundary.
///
/// Immutable once created; the enrichment workflow only ever reads it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    /// Unique identifier for the submission.
    pub id: Uuid,
    /// Contact person name.
    pub contact_name: String,
    /// Company email address.
    pub company_email: String,
    /// Optional contact phone.
    pub contact_phone: Option<String>,
    /// Company website URL.
    pub company_website: String,
    /// Company country.
    pub country: String,
    /// Declared company size bracket (e.g. "51-200").
    pub company_size: String,
    /// Product the prospect is interested in.
    pub product_interest: String,
    /// Free-text "how can we help" field, input to intent analysis.
    pub how_can_we_help: String,
    /// Privacy policy consent flag.
    pub privacy_policy: bool,
    /// When set, synthetic behavioral data is injected during enrichment.
    pub mock_behavioral_data: bool,
    /// Client IP captured at submission time.
    pub ip_address: Option<String>,
    /// Client user agent captured at submission time.
    pub user_agent: Option<String>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// Email engagement counters inside behavioral data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEngagement {
    pub opened: u32,
    pub clicked: u32,
}

/// Behavioral signals attached to an enrichment run.
///
/// Real collection is out of scope; when `mock_behavioral_data` is set these
/// values are synthesized deterministically from the submission id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralData {
    pub page_views: u32,
    /// Seconds spent on site.
    pub time_on_site: u32,
    pub visited_resources: Vec<String>,
    pub email_engagement: EmailEngagement,
    pub previous_visits: u32,
}

/// Normalized view of a Submission handed to the scoring engine.
///
/// Created once per workflow run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentInput {
    pub contact_name: String,
    pub company_email: String,
    pub contact_phone: Option<String>,
    pub company_website: String,
    pub country: String,
    pub company_size: String,
    pub product_interest: String,
    pub how_can_we_help: String,
    pub behavioral_data: Option<BehavioralData>,
    /// Correlation hooks set only when the records already exist.
    pub lead_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

/// Company record, keyed by unique domain.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    /// Globally unique domain; re-enrichment upserts on this key.
    pub domain: String,
    pub name: String,
    pub industry: Option<String>,
    pub employee_count: Option<i32>,
    pub revenue: Option<BigDecimal>,
    pub location: Option<String>,
    /// pending, enriching, completed, failed
    pub enrichment_status: String,
    pub last_enriched_at: Option<DateTime<Utc>>,
    /// Flexible enriched payload: funding, tech stack, competitors, news
    /// signals, website findings, social links.
    pub enriched_data: Option<serde_json::Value>,
    /// Cache expiry for the enriched payload.
    pub data_cached_until: Option<DateTime<Utc>>,
    pub enrichment_cost: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lead record, created at the end of a successful enrichment run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Nullable until enrichment completes.
    pub company_id: Option<Uuid>,
    pub contact_name: String,
    pub company_email: String,
    pub contact_phone: Option<String>,
    pub company_website: String,
    pub country: String,
    pub company_size: String,
    pub product_interest: String,
    pub how_can_we_help: String,
    pub mock_behavioral_data: bool,
    pub behavioral_data: Option<serde_json::Value>,
    /// Overall weighted score, rounded to an integer for storage.
    pub lead_score: Option<i32>,
    pub firmographic_score: Option<i32>,
    pub behavioral_score: Option<i32>,
    pub intent_score: Option<i32>,
    pub technographic_score: Option<i32>,
    /// SQL, MQL, UNQUALIFIED
    pub classification: Option<String>,
    pub classification_confidence: Option<BigDecimal>,
    pub intent_analysis: Option<serde_json::Value>,
    /// pending, enriching, completed, failed
    pub enrichment_status: String,
    /// pending, routed, notified
    pub routing_status: String,
    pub routing_action: Option<String>,
    pub routing_message: Option<String>,
    pub routed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enriched_at: Option<DateTime<Utc>>,
}

/// One row per external-call attempt, with cost/performance telemetry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EnrichmentLogRow {
    pub id: Uuid,
    /// Temporary association key used before the Lead/Company exist.
    /// Distinct from the eventual foreign keys; rewritten by the backfill.
    pub correlation_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    /// search, crawl, llm, research
    pub provider: String,
    pub operation: String,
    pub request_data: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between start and completion.
    pub duration_ms: Option<i32>,
    pub tokens_used: Option<i32>,
    pub cost: Option<BigDecimal>,
    pub currency: String,
    /// pending, success, failed, timeout
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

// ============ Domain Enums ============

/// Lead classification tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "SQL")]
    Sql,
    #[serde(rename = "MQL")]
    Mql,
    #[serde(rename = "UNQUALIFIED")]
    Unqualified,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Sql => "SQL",
            Classification::Mql => "MQL",
            Classification::Unqualified => "UNQUALIFIED",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SQL" => Ok(Classification::Sql),
            "MQL" => Ok(Classification::Mql),
            "UNQUALIFIED" => Ok(Classification::Unqualified),
            other => Err(format!("unknown classification: {}", other)),
        }
    }
}

/// Enrichment lifecycle of a Company or Lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Enriching,
    Completed,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriching => "enriching",
            EnrichmentStatus::Completed => "completed",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

/// Routing lifecycle of a Lead, independent of the enrichment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStatus {
    Pending,
    Routed,
    Notified,
}

impl RoutingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStatus::Pending => "pending",
            RoutingStatus::Routed => "routed",
            RoutingStatus::Notified => "notified",
        }
    }
}

// ============ Synthesis Result Models ============

/// Prospect urgency extracted from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyingStage {
    Awareness,
    Consideration,
    Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Structured intent signals from the intent-analysis tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSignals {
    pub urgency: Urgency,
    pub budget_mentioned: bool,
    pub buying_stage: BuyingStage,
    pub pain_points: Vec<String>,
    pub timeline: String,
    pub decision_makers: bool,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
    /// 0-100 intent strength.
    pub intent_score: f64,
    pub reasoning: String,
    /// Explicit marker set when the provider failed and neutral fallback
    /// values were substituted.
    #[serde(default)]
    pub fallback: bool,
}

/// Company overview emitted by the synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyEnrichment {
    pub name: String,
    pub industry: String,
    #[serde(default)]
    pub employee_count: Option<i32>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    /// Flexible enriched payload (funding, tech stack, competitors, news
    /// signals, website findings, social links). Stored as JSONB.
    #[serde(default)]
    pub enriched_data: serde_json::Value,
}

/// Per-category reasoning strings from the synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReasoning {
    pub firmographic: String,
    pub behavioral: String,
    pub intent: String,
    pub technographic: String,
    pub overall: String,
}

/// Complete scoring breakdown. `overall_score` is always recomputed
/// server-side from the fixed weights before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoring {
    pub firmographic_score: f64,
    pub behavioral_score: f64,
    pub intent_score: f64,
    pub technographic_score: f64,
    pub overall_score: f64,
    pub classification: Classification,
    pub classification_confidence: f64,
    pub reasoning: ScoreReasoning,
}

/// Full structured result of the synthesis phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOutcome {
    pub company: CompanyEnrichment,
    pub intent_analysis: IntentSignals,
    pub scoring: Scoring,
}
