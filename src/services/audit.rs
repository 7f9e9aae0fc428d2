//! Best-effort audit trail.
//!
//! Callers hand records to [`QueuedAuditSink::submit`], which never awaits and
//! never fails. A background worker drains the queue into the configured
//! [`AuditSink`]; sink errors are logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub actor_id: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub meta: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor_id: Uuid,
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: Uuid,
    ) -> Self {
        Self {
            actor_id,
            action: action.into(),
            target_type: target_type.into(),
            target_id,
            meta: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Writes each record as a structured log line.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            actor_id = %record.actor_id,
            action = %record.action,
            target_type = %record.target_type,
            target_id = %record.target_id,
            meta = %record.meta,
            "audit"
        );
        Ok(())
    }
}

/// Appends records to the `audit_log` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: Pool,
}

impl PgAuditSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| AuditError::Backend(format!("get client: {e}")))?;
        client
            .execute(
                "INSERT INTO audit_log (actor_id, action, target_type, target_id, meta, at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &record.actor_id,
                    &record.action,
                    &record.target_type,
                    &record.target_id,
                    &record.meta,
                    &record.at,
                ],
            )
            .await
            .map_err(|e| AuditError::Backend(format!("insert audit_log: {e}")))?;
        Ok(())
    }
}

/// Bounded queue in front of a sink.
///
/// A full or closed queue drops the record with a warning.
#[derive(Clone)]
pub struct QueuedAuditSink {
    tx: mpsc::Sender<AuditRecord>,
}

impl QueuedAuditSink {
    /// Start the drain worker. Must be called inside a tokio runtime.
    pub fn spawn(inner: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let action = record.action.clone();
                if let Err(e) = inner.record(record).await {
                    tracing::warn!(error = %e, action = %action, "audit sink failed, record dropped");
                }
            }
            tracing::debug!("audit queue closed");
        });
        (Self { tx }, handle)
    }

    pub fn submit(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            crate::metrics::AUDIT_DROPPED_TOTAL.inc();
            let record = match e {
                mpsc::error::TrySendError::Full(r) | mpsc::error::TrySendError::Closed(r) => r,
            };
            tracing::warn!(
                action = %record.action,
                target_id = %record.target_id,
                "audit queue unavailable, record dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChannelSink(mpsc::UnboundedSender<AuditRecord>);

    #[async_trait]
    impl AuditSink for ChannelSink {
        async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
            let _ = self.0.send(record);
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_submitted_records_reach_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (queue, _worker) = QueuedAuditSink::spawn(Arc::new(ChannelSink(tx)), 8);

        let target = Uuid::new_v4();
        queue.submit(AuditRecord::new(Uuid::new_v4(), "message_sent", "message", target));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.action, "message_sent");
        assert_eq!(got.target_id, target);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_worker() {
        let (queue, worker) = QueuedAuditSink::spawn(Arc::new(BrokenSink), 8);
        for _ in 0..3 {
            queue.submit(AuditRecord::new(Uuid::new_v4(), "x", "message", Uuid::new_v4()));
        }
        drop(queue);
        // Worker exits cleanly once every sender is gone
        worker.await.unwrap();
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = QueuedAuditSink { tx };
        for _ in 0..5 {
            queue.submit(AuditRecord::new(Uuid::new_v4(), "x", "message", Uuid::new_v4()));
        }
    }
}
