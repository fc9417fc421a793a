//! Durable record of every external-call attempt made during enrichment.
//!
//! Logging must never break the enrichment flow: `start_log` always succeeds
//! (returning a sentinel id on storage failure that later calls no-op
//! against), and completion/failure updates swallow their own errors into
//! tracing output.

use crate::costs::{self, Provider};
use crate::errors::AppError;
use crate::models::EnrichmentLogRow;
use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Handle for one in-flight log row.
///
/// `Sentinel` is returned when the initial insert failed; every subsequent
/// call recognizes it and does nothing, so a broken log store cannot abort a
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogId {
    Row(Uuid),
    Sentinel,
}

/// Per-run logging context, passed explicitly into every tool call.
///
/// The correlation id associates log rows with a run before the Lead/Company
/// records exist; `backfill_ids` rewrites the real foreign keys afterwards.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub correlation_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

impl LogContext {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            lead_id: None,
            company_id: None,
        }
    }
}

/// Per-provider cost breakdown inside a summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderCost {
    pub cost: f64,
    pub operations: u32,
}

/// Aggregated cost view for one lead's enrichment session.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub operations_count: u32,
    pub cost_by_provider: HashMap<String, ProviderCost>,
    pub top_operation: Option<(String, f64)>,
}

fn money(value: f64) -> Option<BigDecimal> {
    BigDecimal::from_str(&format!("{:.6}", value)).ok()
}

/// The tokens_used column is INTEGER; counts beyond i32 saturate instead of
/// wrapping.
fn tokens_column(tokens: Option<u64>) -> Option<i32> {
    tokens.map(|t| i32::try_from(t).unwrap_or(i32::MAX))
}

#[derive(Clone)]
pub struct EnrichmentLogStore {
    pool: PgPool,
}

impl EnrichmentLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Start logging an external-call attempt. Always returns a usable id.
    pub async fn start_log(
        &self,
        ctx: &LogContext,
        provider: Provider,
        operation: &str,
        request_data: Value,
    ) -> LogId {
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO enrichment_logs (
                correlation_id, lead_id, company_id, provider, operation,
                request_data, started_at, status, currency
            )
            VALUES ($1, $2, $3, $4, $5, $6, now(), 'pending', 'USD')
            RETURNING id
            "#,
        )
        .bind(ctx.correlation_id)
        .bind(ctx.lead_id)
        .bind(ctx.company_id)
        .bind(provider.as_str())
        .bind(operation)
        .bind(&request_data)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => LogId::Row(id),
            Err(e) => {
                tracing::warn!("Failed to start enrichment log for {}: {}", operation, e);
                LogId::Sentinel
            }
        }
    }

    /// Mark an operation as completed. Duration is computed from the stored
    /// start time; cost falls back to the cost ledger's estimate when the
    /// caller has no explicit figure.
    pub async fn complete_log(
        &self,
        id: LogId,
        provider: Provider,
        model: &str,
        response_data: Value,
        tokens_used: Option<u64>,
        cost: Option<f64>,
    ) {
        let LogId::Row(log_id) = id else { return };

        let cost = cost.unwrap_or_else(|| costs::estimate(provider, tokens_used, model));

        let result = sqlx::query(
            r#"
            UPDATE enrichment_logs
            SET response_data = $2,
                completed_at = now(),
                duration_ms = (EXTRACT(EPOCH FROM (now() - started_at)) * 1000)::int,
                tokens_used = $3,
                cost = $4,
                status = 'success'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(log_id)
        .bind(&response_data)
        .bind(tokens_column(tokens_used))
        .bind(money(cost))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to complete enrichment log {}: {}", log_id, e);
        }
    }

    /// Mark an operation as failed.
    pub async fn fail_log(&self, id: LogId, error_message: &str, retry_count: Option<i32>) {
        let LogId::Row(log_id) = id else { return };

        let result = sqlx::query(
            r#"
            UPDATE enrichment_logs
            SET completed_at = now(),
                duration_ms = (EXTRACT(EPOCH FROM (now() - started_at)) * 1000)::int,
                status = 'failed',
                error_message = $2,
                retry_count = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(log_id)
        .bind(error_message)
        .bind(retry_count.unwrap_or(0))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record enrichment log failure {}: {}", log_id, e);
        }
    }

    /// Mark an operation as timed out.
    pub async fn mark_timeout(&self, id: LogId) {
        let LogId::Row(log_id) = id else { return };

        let result = sqlx::query(
            r#"
            UPDATE enrichment_logs
            SET completed_at = now(),
                duration_ms = (EXTRACT(EPOCH FROM (now() - started_at)) * 1000)::int,
                status = 'timeout'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(log_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record enrichment log timeout {}: {}", log_id, e);
        }
    }

    /// Rewrite all log rows for one correlation id with the real Lead and
    /// Company ids once those records exist. Rows with other correlation ids
    /// are untouched. Returns the number of rows updated; failures are
    /// swallowed because log writes never block enrichment.
    pub async fn backfill_ids(
        &self,
        correlation_id: Uuid,
        lead_id: Uuid,
        company_id: Option<Uuid>,
    ) -> u64 {
        match sqlx::query(
            r#"
            UPDATE enrichment_logs
            SET lead_id = $2, company_id = $3
            WHERE correlation_id = $1
            "#,
        )
        .bind(correlation_id)
        .bind(lead_id)
        .bind(company_id)
        .execute(&self.pool)
        .await
        {
            Ok(result) => result.rows_affected(),
            Err(e) => {
                tracing::warn!(
                    "Failed to backfill enrichment logs for correlation {}: {}",
                    correlation_id,
                    e
                );
                0
            }
        }
    }

    /// Total cost accrued so far under one correlation id. Used before the
    /// Lead row exists; errors read as zero because cost accounting never
    /// blocks enrichment.
    pub async fn session_cost(&self, correlation_id: Uuid) -> f64 {
        let total = sqlx::query_scalar::<_, Option<BigDecimal>>(
            "SELECT SUM(cost) FROM enrichment_logs WHERE correlation_id = $1",
        )
        .bind(correlation_id)
        .fetch_one(&self.pool)
        .await;

        match total {
            Ok(sum) => sum
                .and_then(|d| d.to_string().parse::<f64>().ok())
                .unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(
                    "Failed to sum session cost for correlation {}: {}",
                    correlation_id,
                    e
                );
                0.0
            }
        }
    }

    /// Cost summary for a lead's enrichment session: total, per-provider
    /// breakdown, and the single most expensive operation.
    pub async fn cost_summary(&self, lead_id: Uuid) -> Result<CostSummary, AppError> {
        let rows = sqlx::query_as::<_, EnrichmentLogRow>(
            "SELECT * FROM enrichment_logs WHERE lead_id = $1",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        let mut total_cost = 0.0;
        let mut cost_by_provider: HashMap<String, ProviderCost> = HashMap::new();
        let mut top_operation: Option<(String, f64)> = None;

        for row in rows.iter() {
            let cost: f64 = row
                .cost
                .as_ref()
                .and_then(|d| d.to_string().parse::<f64>().ok())
                .unwrap_or(0.0);

            total_cost += cost;
            let entry = cost_by_provider.entry(row.provider.clone()).or_default();
            entry.cost += cost;
            entry.operations += 1;

            if top_operation.as_ref().map_or(true, |(_, c)| cost > *c) {
                top_operation = Some((row.operation.clone(), cost));
            }
        }

        Ok(CostSummary {
            total_cost: (total_cost * 10_000.0).round() / 10_000.0,
            operations_count: rows.len() as u32,
            cost_by_provider,
            top_operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_counts_saturate_at_column_capacity() {
        assert_eq!(tokens_column(None), None);
        assert_eq!(tokens_column(Some(357)), Some(357));
        assert_eq!(tokens_column(Some(i32::MAX as u64)), Some(i32::MAX));
        assert_eq!(tokens_column(Some(u64::MAX)), Some(i32::MAX));
    }

    #[test]
    fn money_keeps_six_decimal_places() {
        assert_eq!(money(0.02).unwrap().to_string(), "0.020000");
        assert_eq!(money(1.2345678).unwrap().to_string(), "1.234568");
    }
}
