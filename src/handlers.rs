//! HTTP boundary: intake and read endpoints.
//!
//! Intake acks with 202 as soon as the submission row is durable; enrichment
//! runs asynchronously behind the event bus, so a provider outage never
//! turns into an intake failure.

use crate::enrichment_log::{CostSummary, EnrichmentLogStore};
use crate::errors::AppError;
use crate::events::{self, EventBus, LeadSubmittedEvent};
use crate::models::Lead;
use crate::storage::{self, NewSubmission};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Event bus handle for emitting `lead/submitted`.
    pub bus: EventBus,
    /// Enrichment log store backing the cost endpoint.
    pub logs: EnrichmentLogStore,
    /// Double-submit guard: digest of (email, message) -> submission id.
    /// A repeat within the TTL is acked with the original id and no new row.
    pub recent_submission_cache: Cache<String, Uuid>,
}

/// Intake payload for POST /api/v1/submissions.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub contact_name: String,
    pub company_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    pub company_website: String,
    pub country: String,
    pub company_size: String,
    pub product_interest: String,
    pub how_can_we_help: String,
    pub privacy_policy: bool,
    #[serde(default)]
    pub mock_behavioral_data: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionAck {
    pub submission_id: Uuid,
    pub status: &'static str,
    pub duplicate: bool,
}

/// Health check endpoint. Bypasses rate limiting.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-enrichment-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

fn validate_request(request: &SubmissionRequest) -> Result<(), AppError> {
    if !request.privacy_policy {
        return Err(AppError::BadRequest(
            "Privacy policy must be accepted".to_string(),
        ));
    }

    for (field, value) in [
        ("contact_name", &request.contact_name),
        ("company_email", &request.company_email),
        ("company_website", &request.company_website),
        ("country", &request.country),
        ("company_size", &request.company_size),
        ("product_interest", &request.product_interest),
        ("how_can_we_help", &request.how_can_we_help),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{} is required", field)));
        }
    }

    // RFC 5322 simplified: local@domain.tld
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap();
    if !email_regex.is_match(&request.company_email) {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    let website = Url::parse(&request.company_website)
        .map_err(|_| AppError::BadRequest("Invalid website URL".to_string()))?;
    if website.scheme() != "http" && website.scheme() != "https" {
        return Err(AppError::BadRequest(
            "Website URL must be http or https".to_string(),
        ));
    }

    Ok(())
}

fn dedup_key(request: &SubmissionRequest) -> String {
    let digest = Sha256::digest(
        format!(
            "{}|{}",
            request.company_email.trim().to_lowercase(),
            request.how_can_we_help.trim()
        )
        .as_bytes(),
    );
    hex::encode(digest)
}

/// POST /api/v1/submissions
///
/// Validates, stores, emits `lead/submitted`, and acks 202. A failed event
/// emit is logged but still acked: the row is durable and startup recovery
/// will not see it, but operators can re-trigger from the stored submission.
pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionAck>), AppError> {
    validate_request(&request)?;

    let key = dedup_key(&request);
    if let Some(existing) = state.recent_submission_cache.get(&key).await {
        tracing::info!(
            "Duplicate submission from {} within window; acking {}",
            request.company_email,
            existing
        );
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubmissionAck {
                submission_id: existing,
                status: "accepted",
                duplicate: true,
            }),
        ));
    }

    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let new = NewSubmission {
        contact_name: request.contact_name.clone(),
        company_email: request.company_email.clone(),
        contact_phone: request.contact_phone.clone(),
        company_website: request.company_website.clone(),
        country: request.country.clone(),
        company_size: request.company_size.clone(),
        product_interest: request.product_interest.clone(),
        how_can_we_help: request.how_can_we_help.clone(),
        privacy_policy: request.privacy_policy,
        mock_behavioral_data: request.mock_behavioral_data,
        ip_address,
        user_agent,
    };

    let submission = storage::insert_submission(&state.db, &new).await?;
    state
        .recent_submission_cache
        .insert(key, submission.id)
        .await;

    let payload = json!(LeadSubmittedEvent {
        submission_id: submission.id,
        session_id: request.session_id,
    });
    if let Err(e) = state.bus.emit(events::LEAD_SUBMITTED, payload).await {
        tracing::error!(
            "Submission {} stored but event emit failed: {}",
            submission.id,
            e
        );
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionAck {
            submission_id: submission.id,
            status: "accepted",
            duplicate: false,
        }),
    ))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    let lead = storage::fetch_lead(&state.db, id).await?;
    Ok(Json(lead))
}

/// GET /api/v1/leads/:id/costs
pub async fn get_lead_costs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CostSummary>, AppError> {
    // 404 for unknown leads rather than an empty summary.
    storage::fetch_lead(&state.db, id).await?;
    let summary = state.logs.cost_summary(id).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SubmissionRequest {
        SubmissionRequest {
            contact_name: "Jane Smith".to_string(),
            company_email: "jane@acme-corp.io".to_string(),
            contact_phone: None,
            company_website: "https://acme-corp.io".to_string(),
            country: "US".to_string(),
            company_size: "51-200".to_string(),
            product_interest: "Analytics Platform".to_string(),
            how_can_we_help: "Evaluating vendors this quarter".to_string(),
            privacy_policy: true,
            mock_behavioral_data: false,
            session_id: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_request(&sample_request()).is_ok());
    }

    #[test]
    fn privacy_policy_is_mandatory() {
        let mut request = sample_request();
        request.privacy_policy = false;
        assert!(matches!(
            validate_request(&request),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn bad_email_is_rejected() {
        let mut request = sample_request();
        request.company_email = "not-an-email".to_string();
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn non_http_website_is_rejected() {
        let mut request = sample_request();
        request.company_website = "ftp://acme-corp.io".to_string();
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn dedup_key_ignores_email_case() {
        let a = sample_request();
        let mut b = sample_request();
        b.company_email = "JANE@ACME-CORP.IO".to_string();
        assert_eq!(dedup_key(&a), dedup_key(&b));

        let mut c = sample_request();
        c.how_can_we_help = "Different message".to_string();
        assert_ne!(dedup_key(&a), dedup_key(&c));
    }
}
