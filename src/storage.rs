//! Persistence for submissions, companies, and leads.
//!
//! Company and Lead writes are fatal on error; only enrichment log writes
//! (in `enrichment_log`) degrade to tracing. Company upsert is a single
//! atomic statement keyed on domain, so concurrent enrichment runs for the
//! same company converge on one row.

use crate::errors::{AppError, ResultExt};
use crate::models::{
    BehavioralData, Company, CompanyEnrichment, EnrichmentStatus, Lead, RoutingStatus, Submission,
    SynthesisOutcome,
};
use crate::routing::RoutingDecision;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

/// Enriched company payloads stay fresh for thirty days before a
/// re-enrichment refreshes them.
const COMPANY_CACHE_DAYS: i64 = 30;

/// New submission captured at the intake boundary.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub contact_name: String,
    pub company_email: String,
    pub contact_phone: Option<String>,
    pub company_website: String,
    pub country: String,
    pub company_size: String,
    pub product_interest: String,
    pub how_can_we_help: String,
    pub privacy_policy: bool,
    pub mock_behavioral_data: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

fn money(value: f64) -> Option<BigDecimal> {
    BigDecimal::from_str(&format!("{:.6}", value)).ok()
}

pub async fn insert_submission(
    pool: &PgPool,
    new: &NewSubmission,
) -> Result<Submission, AppError> {
    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions (
            id, contact_name, company_email, contact_phone, company_website,
            country, company_size, product_interest, how_can_we_help,
            privacy_policy, mock_behavioral_data, ip_address, user_agent,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.contact_name)
    .bind(&new.company_email)
    .bind(&new.contact_phone)
    .bind(&new.company_website)
    .bind(&new.country)
    .bind(&new.company_size)
    .bind(&new.product_interest)
    .bind(&new.how_can_we_help)
    .bind(new.privacy_policy)
    .bind(new.mock_behavioral_data)
    .bind(&new.ip_address)
    .bind(&new.user_agent)
    .fetch_one(pool)
    .await
    .context("Failed to store submission")?;

    Ok(submission)
}

pub async fn fetch_submission(pool: &PgPool, id: Uuid) -> Result<Submission, AppError> {
    sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch submission")?
        .ok_or_else(|| AppError::NotFound(format!("Submission {} not found", id)))
}

/// Atomic company upsert by domain. Re-enrichment refreshes the payload and
/// accumulates cost on the existing row instead of duplicating it.
pub async fn upsert_company(
    pool: &PgPool,
    domain: &str,
    enrichment: &CompanyEnrichment,
    enrichment_cost: f64,
) -> Result<Company, AppError> {
    let cached_until = Utc::now() + Duration::days(COMPANY_CACHE_DAYS);

    let company = sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO companies (
            id, domain, name, industry, employee_count, revenue, location,
            enrichment_status, last_enriched_at, enriched_data,
            data_cached_until, enrichment_cost, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed', now(), $8, $9, $10, now(), now())
        ON CONFLICT (domain) DO UPDATE
        SET name = EXCLUDED.name,
            industry = EXCLUDED.industry,
            employee_count = EXCLUDED.employee_count,
            revenue = EXCLUDED.revenue,
            location = EXCLUDED.location,
            enrichment_status = 'completed',
            last_enriched_at = now(),
            enriched_data = EXCLUDED.enriched_data,
            data_cached_until = EXCLUDED.data_cached_until,
            enrichment_cost = COALESCE(companies.enrichment_cost, 0) + EXCLUDED.enrichment_cost,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(domain)
    .bind(&enrichment.name)
    .bind(&enrichment.industry)
    .bind(enrichment.employee_count)
    .bind(enrichment.revenue.and_then(money))
    .bind(&enrichment.location)
    .bind(&enrichment.enriched_data)
    .bind(cached_until)
    .bind(money(enrichment_cost))
    .fetch_one(pool)
    .await
    .context("Failed to upsert company")?;

    Ok(company)
}

/// Insert the Lead at the end of a successful run. Category scores are
/// rounded to integers for storage; classification was already decided from
/// the unrounded overall.
pub async fn insert_lead(
    pool: &PgPool,
    submission: &Submission,
    company_id: Option<Uuid>,
    behavioral_data: Option<&BehavioralData>,
    outcome: &SynthesisOutcome,
) -> Result<Lead, AppError> {
    let scoring = &outcome.scoring;
    let intent_json = serde_json::to_value(&outcome.intent_analysis)
        .map_err(|e| AppError::InternalError(format!("Failed to encode intent signals: {}", e)))?;
    let behavioral_json = behavioral_data
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::InternalError(format!("Failed to encode behavioral data: {}", e)))?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (
            id, company_id, contact_name, company_email, contact_phone,
            company_website, country, company_size, product_interest,
            how_can_we_help, mock_behavioral_data, behavioral_data,
            lead_score, firmographic_score, behavioral_score, intent_score,
            technographic_score, classification, classification_confidence,
            intent_analysis, enrichment_status, routing_status,
            ip_address, user_agent, created_at, updated_at, enriched_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20,
            $21, $22, $23, $24, now(), now(), now()
        )
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(&submission.contact_name)
    .bind(&submission.company_email)
    .bind(&submission.contact_phone)
    .bind(&submission.company_website)
    .bind(&submission.country)
    .bind(&submission.company_size)
    .bind(&submission.product_interest)
    .bind(&submission.how_can_we_help)
    .bind(submission.mock_behavioral_data)
    .bind(behavioral_json)
    .bind(scoring.overall_score.round() as i32)
    .bind(scoring.firmographic_score.round() as i32)
    .bind(scoring.behavioral_score.round() as i32)
    .bind(scoring.intent_score.round() as i32)
    .bind(scoring.technographic_score.round() as i32)
    .bind(scoring.classification.as_str())
    .bind(money(scoring.classification_confidence))
    .bind(intent_json)
    .bind(EnrichmentStatus::Completed.as_str())
    .bind(RoutingStatus::Pending.as_str())
    .bind(&submission.ip_address)
    .bind(&submission.user_agent)
    .fetch_one(pool)
    .await
    .context("Failed to insert lead")?;

    Ok(lead)
}

pub async fn fetch_lead(pool: &PgPool, id: Uuid) -> Result<Lead, AppError> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch lead")?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
}

/// Persist a routing decision. Scoped to leads still pending so a replayed
/// routing step cannot clobber an already-routed lead.
pub async fn apply_routing(
    pool: &PgPool,
    lead_id: Uuid,
    decision: &RoutingDecision,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE leads
        SET routing_status = $4,
            routing_action = $2,
            routing_message = $3,
            routed_at = now(),
            updated_at = now()
        WHERE id = $1 AND routing_status = $5
        "#,
    )
    .bind(lead_id)
    .bind(decision.action.as_str())
    .bind(&decision.message)
    .bind(RoutingStatus::Routed.as_str())
    .bind(RoutingStatus::Pending.as_str())
    .execute(pool)
    .await
    .context("Failed to persist routing decision")?;

    Ok(())
}

pub async fn mark_notified(pool: &PgPool, lead_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE leads
        SET routing_status = $2, updated_at = now()
        WHERE id = $1 AND routing_status = $3
        "#,
    )
    .bind(lead_id)
    .bind(RoutingStatus::Notified.as_str())
    .bind(RoutingStatus::Routed.as_str())
    .execute(pool)
    .await
    .context("Failed to mark lead notified")?;

    Ok(())
}
