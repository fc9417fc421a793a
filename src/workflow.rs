//! Durable orchestration for enrichment and routing runs.
//!
//! Every step is memoized in `workflow_steps` keyed by (run_key, step_name):
//! a step that already completed returns its stored output instead of
//! re-executing. Duplicate event delivery therefore replays a run without
//! side effects, which is what makes the bus's at-least-once delivery safe.
//! The submission id doubles as the run's correlation id so replays keep
//! writing to the same enrichment log rows.

use crate::config::Config;
use crate::enrichment_log::{EnrichmentLogStore, LogContext};
use crate::errors::{AppError, ResultExt};
use crate::events::{self, EventBus, EventJob, LeadEnrichedEvent, LeadSubmittedEvent};
use crate::models::{BehavioralData, Classification, EmailEngagement, EnrichmentInput, Submission};
use crate::routing::{self, RoutingDecision};
use crate::scoring::ScoringEngine;
use crate::storage;
use crate::tools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrator for both workflows. One instance serves the whole process.
pub struct Workflow {
    pool: PgPool,
    engine: ScoringEngine,
    logs: EnrichmentLogStore,
    bus: EventBus,
}

/// Output of the store-enrichment-results step, kept small so the memo row
/// carries only what later steps need.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLead {
    lead_id: Uuid,
    company_id: Option<Uuid>,
    classification: String,
    score: i32,
    contact_name: String,
}

impl Workflow {
    pub fn new(pool: PgPool, config: &Config, bus: EventBus) -> Self {
        let logs = EnrichmentLogStore::new(pool.clone());
        Self {
            engine: ScoringEngine::new(config, logs.clone()),
            logs,
            pool,
            bus,
        }
    }

    /// Entry point for the event dispatcher.
    pub async fn handle_event(self: Arc<Self>, job: EventJob) -> Result<(), AppError> {
        match job.name.as_str() {
            events::LEAD_SUBMITTED => {
                let event: LeadSubmittedEvent = parse_payload(&job.payload)?;
                self.enrich(event).await
            }
            events::LEAD_ENRICHED => {
                let event: LeadEnrichedEvent = parse_payload(&job.payload)?;
                self.route(event).await
            }
            other => {
                tracing::warn!("Ignoring unknown event {}", other);
                Ok(())
            }
        }
    }

    /// Enrichment workflow: fetch, prepare, enrich, store, backfill, emit.
    async fn enrich(&self, event: LeadSubmittedEvent) -> Result<(), AppError> {
        let run_key = format!("enrich:{}", event.submission_id);
        let ctx = LogContext::new(event.submission_id);

        tracing::info!("Enrichment run {} starting", run_key);

        let submission: Submission = self
            .step(&run_key, "fetch-submission", || async {
                storage::fetch_submission(&self.pool, event.submission_id).await
            })
            .await?;

        let input: EnrichmentInput = self
            .step(&run_key, "prepare-enrichment-input", || async {
                Ok(prepare_input(&submission))
            })
            .await?;

        let outcome = self
            .step(&run_key, "run-enrichment", || async {
                self.engine.enrich(&ctx, &input).await
            })
            .await?;

        let stored: StoredLead = self
            .step(&run_key, "store-enrichment-results", || async {
                let domain = tools::extract_domain(&submission.company_email);
                let session_cost = self.logs.session_cost(ctx.correlation_id).await;

                let company = match domain {
                    Some(domain) => Some(
                        storage::upsert_company(&self.pool, &domain, &outcome.company, session_cost)
                            .await?,
                    ),
                    None => None,
                };
                let company_id = company.map(|c| c.id);

                let lead = storage::insert_lead(
                    &self.pool,
                    &submission,
                    company_id,
                    input.behavioral_data.as_ref(),
                    &outcome,
                )
                .await?;

                Ok(StoredLead {
                    lead_id: lead.id,
                    company_id,
                    classification: outcome.scoring.classification.to_string(),
                    score: outcome.scoring.overall_score.round() as i32,
                    contact_name: lead.contact_name,
                })
            })
            .await?;

        let _backfilled: u64 = self
            .step(&run_key, "update-enrichment-logs", || async {
                Ok(self
                    .logs
                    .backfill_ids(ctx.correlation_id, stored.lead_id, stored.company_id)
                    .await)
            })
            .await?;

        // Fire-and-confirm: enrichment completes without waiting on routing.
        let _event_id: Uuid = self
            .step(&run_key, "emit-enriched", || async {
                let payload = serde_json::to_value(LeadEnrichedEvent {
                    lead_id: stored.lead_id,
                    classification: stored.classification.clone(),
                    score: stored.score,
                    contact_name: stored.contact_name.clone(),
                    session_id: event.session_id.clone(),
                })
                .map_err(|e| AppError::InternalError(e.to_string()))?;
                self.bus.emit(events::LEAD_ENRICHED, payload).await
            })
            .await?;

        tracing::info!(
            "Enrichment run {} complete: lead {} classified {}",
            run_key,
            stored.lead_id,
            stored.classification
        );
        Ok(())
    }

    /// Routing workflow: determine, apply, notify.
    async fn route(&self, event: LeadEnrichedEvent) -> Result<(), AppError> {
        let run_key = format!("route:{}", event.lead_id);

        let classification = routing_classification(&event.classification);

        let decision: RoutingDecision = self
            .step(&run_key, "determine-routing", || async {
                Ok(routing::determine_routing(
                    classification,
                    event.score,
                    &event.contact_name,
                ))
            })
            .await?;

        self.step(&run_key, "apply-routing", || async {
            storage::apply_routing(&self.pool, event.lead_id, &decision).await
        })
        .await?;

        let _notified: String = self
            .step(&run_key, "send-notifications", || async {
                // Enumerate and log; actual delivery channels are downstream
                // systems fed from the leads table.
                let description = routing::action_description(decision.action);
                tracing::info!(
                    "Lead {} [{}]: {} -> {}",
                    event.lead_id,
                    decision.priority.as_str(),
                    decision.message,
                    description
                );
                storage::mark_notified(&self.pool, event.lead_id).await?;
                Ok(description.to_string())
            })
            .await?;

        tracing::info!("Routing run {} complete", run_key);
        Ok(())
    }

    /// Memoized step execution. A completed step's stored output is returned
    /// as-is; only steps with no memo row actually run.
    async fn step<T, F, Fut>(&self, run_key: &str, step_name: &str, f: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let memoized = sqlx::query_scalar::<_, Value>(
            "SELECT output FROM workflow_steps WHERE run_key = $1 AND step_name = $2",
        )
        .bind(run_key)
        .bind(step_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read workflow step memo")?;

        if let Some(output) = memoized {
            tracing::debug!("Step {} of {} replayed from memo", step_name, run_key);
            return serde_json::from_value(output).map_err(|e| {
                AppError::InternalError(format!(
                    "Stored output of step {} is unreadable: {}",
                    step_name, e
                ))
            });
        }

        let output = f().await?;

        let json = serde_json::to_value(&output)
            .map_err(|e| AppError::InternalError(format!("Step output not storable: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO workflow_steps (run_key, step_name, output, completed_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (run_key, step_name) DO NOTHING
            "#,
        )
        .bind(run_key)
        .bind(step_name)
        .bind(&json)
        .execute(&self.pool)
        .await
        .context("Failed to memoize workflow step")?;

        Ok(output)
    }
}

/// Unrecognized classification strings route like unqualified leads rather
/// than failing the run and stranding the lead unrouted.
fn routing_classification(raw: &str) -> Classification {
    Classification::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("{}; routing to newsletter", e);
        Classification::Unqualified
    })
}

fn parse_payload<T: DeserializeOwned>(payload: &Value) -> Result<T, AppError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| AppError::MalformedEvent(format!("Unusable event payload: {}", e)))
}

/// Normalize a submission into the engine's input, synthesizing behavioral
/// data when the submission asked for it.
fn prepare_input(submission: &Submission) -> EnrichmentInput {
    let behavioral_data = if submission.mock_behavioral_data {
        Some(mock_behavioral(submission.id))
    } else {
        None
    };

    EnrichmentInput {
        contact_name: submission.contact_name.clone(),
        company_email: submission.company_email.clone(),
        contact_phone: submission.contact_phone.clone(),
        company_website: submission.company_website.clone(),
        country: submission.country.clone(),
        company_size: submission.company_size.clone(),
        product_interest: submission.product_interest.clone(),
        how_can_we_help: submission.how_can_we_help.clone(),
        behavioral_data,
        lead_id: None,
        company_id: None,
    }
}

const MOCK_RESOURCES: &[&str] = &[
    "pricing-guide",
    "product-overview",
    "case-study-manufacturing",
    "integration-docs",
    "roi-calculator",
];

/// Deterministic synthetic behavioral data derived from the submission id.
/// The same submission always gets the same signals, so memoized replays and
/// test fixtures stay stable.
fn mock_behavioral(submission_id: Uuid) -> BehavioralData {
    let digest = Sha256::digest(submission_id.as_bytes());

    let page_views = 3 + (digest[0] % 16) as u32;
    let time_on_site = 120 + (u16::from_be_bytes([digest[1], digest[2]]) % 301) as u32;
    let resource_count = 1 + (digest[3] % 3) as usize;
    let resource_offset = (digest[7] as usize) % MOCK_RESOURCES.len();
    let visited_resources = (0..resource_count)
        .map(|i| MOCK_RESOURCES[(resource_offset + i) % MOCK_RESOURCES.len()].to_string())
        .collect();

    BehavioralData {
        page_views,
        time_on_site,
        visited_resources,
        email_engagement: EmailEngagement {
            opened: 1 + (digest[4] % 5) as u32,
            clicked: (digest[5] % 3) as u32,
        },
        previous_visits: 1 + (digest[6] % 5) as u32,
    }
}
