//! Durable in-process event bus.
//!
//! `emit` persists the event row first, then hands it to the in-process
//! dispatcher. Handlers run on a semaphore-bounded worker pool; completion
//! marks the row `done`, a handler error marks it `failed` with the
//! diagnostic. On startup, rows still `queued` or `processing` from a
//! previous run are re-enqueued, which gives at-least-once delivery after a
//! crash. Handlers are memoized downstream, so re-delivery is safe.

use crate::errors::{AppError, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

pub const LEAD_SUBMITTED: &str = "lead/submitted";
pub const LEAD_ENRICHED: &str = "lead/enriched";

/// Payload of `lead/submitted`, emitted by the intake handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSubmittedEvent {
    pub submission_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Payload of `lead/enriched`, emitted at the end of a successful
/// enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadEnrichedEvent {
    pub lead_id: Uuid,
    pub classification: String,
    pub score: i32,
    pub contact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One event handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct EventJob {
    pub id: Uuid,
    pub name: String,
    pub payload: Value,
}

/// Handle for emitting events. Cheap to clone into handlers and workflows.
#[derive(Clone)]
pub struct EventBus {
    pool: PgPool,
    tx: mpsc::UnboundedSender<EventJob>,
}

impl EventBus {
    /// Create the bus and the dispatcher's receiving end.
    pub fn new(pool: PgPool) -> (Self, mpsc::UnboundedReceiver<EventJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { pool, tx }, rx)
    }

    /// Persist the event, then dispatch it in-process. The row exists before
    /// the dispatcher sees the job, so a crash between the two re-delivers
    /// at startup instead of losing the event.
    pub async fn emit(&self, name: &str, payload: Value) -> Result<Uuid, AppError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO events (id, name, payload, status, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, 'queued', 0, now(), now())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .context("Failed to persist event")?;

        tracing::info!("Event {} emitted as {}", name, id);

        let job = EventJob {
            id,
            name: name.to_string(),
            payload,
        };
        if self.tx.send(job).is_err() {
            // Dispatcher gone; the row stays queued and the next startup
            // re-enqueues it.
            tracing::warn!("Event dispatcher unavailable; {} left queued", id);
        }

        Ok(id)
    }

    /// Re-enqueue events a previous process never finished.
    pub async fn recover_pending(&self) -> Result<usize, AppError> {
        let rows = sqlx::query_as::<_, (Uuid, String, Value)>(
            r#"
            SELECT id, name, payload FROM events
            WHERE status IN ('queued', 'processing')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load unfinished events")?;

        let count = rows.len();
        for (id, name, payload) in rows {
            let job = EventJob { id, name, payload };
            if self.tx.send(job).is_err() {
                return Err(AppError::InternalError(
                    "Event dispatcher closed during recovery".to_string(),
                ));
            }
        }

        if count > 0 {
            tracing::info!("Re-enqueued {} unfinished event(s)", count);
        }
        Ok(count)
    }

    async fn set_status(&self, id: Uuid, status: &str, error: Option<&str>) {
        // Each transition to processing is one delivery attempt.
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $2,
                error = $3,
                attempts = attempts + CASE WHEN $2 = 'processing' THEN 1 ELSE 0 END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to mark event {} {}: {}", id, status, e);
        }
    }
}

/// Dispatcher loop: pull jobs, bound concurrency with a semaphore, run the
/// handler on its own task. Handler errors mark the row failed and are
/// reported; they never stop the loop.
pub async fn run_dispatcher<H, Fut>(
    bus: EventBus,
    mut rx: mpsc::UnboundedReceiver<EventJob>,
    concurrency: usize,
    handler: H,
) where
    H: Fn(EventJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let handler = Arc::new(handler);

    while let Some(job) = rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Closed semaphore means shutdown.
            Err(_) => break,
        };

        let bus = bus.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let _permit = permit;
            bus.set_status(job.id, "processing", None).await;

            let id = job.id;
            let name = job.name.clone();
            match handler(job).await {
                Ok(()) => {
                    bus.set_status(id, "done", None).await;
                    tracing::info!("Event {} ({}) handled", id, name);
                }
                Err(e) => {
                    bus.set_status(id, "failed", Some(&e.to_string())).await;
                    tracing::error!("Event {} ({}) failed: {}", id, name, e);
                }
            }
        });
    }

    tracing::info!("Event dispatcher stopped");
}
