//! Call-History Writer: durably records each inbound/outbound call as it
//! progresses through ring, answer, and hangup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, error};

use crate::correlator::state::{CorrelationId, PendingHistory};
use crate::error::Result;

pub struct HistoryWriter {
    pool: SqlitePool,
    /// Correlation ids with an open row awaiting finalization, keyed so
    /// `finalize` can compute duration without a round trip to the database.
    pending: HashMap<CorrelationId, PendingHistory>,
}

impl HistoryWriter {
    pub async fn connect(database_path: &str) -> Result<Self> {
        let url = format!("sqlite://{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            crate::error::MonitorError::Internal(format!("migration failed: {e}"))
        })?;
        Ok(Self { pool, pending: HashMap::new() })
    }

    /// Opens an in-memory database, migrated the same as a real one. Used by
    /// tests and by any caller that wants history tracking without a file on
    /// disk.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            crate::error::MonitorError::Internal(format!("migration failed: {e}"))
        })?;
        Ok(Self { pool, pending: HashMap::new() })
    }

    pub async fn insert_inbound_ring(&mut self, correlation_id: &str, external_number: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let result = sqlx::query(
            "INSERT INTO call_log (timestamp, direction, external_number, linkedid) \
             VALUES (?, 'inbound', ?, ?)",
        )
        .bind(&timestamp)
        .bind(external_number)
        .bind(correlation_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(correlation_id, error = %e, "failed to insert inbound call-log row");
            return;
        }
        self.pending
            .insert(correlation_id.to_string(), PendingHistory::default());
    }

    pub async fn mark_inbound_answered(
        &mut self,
        correlation_id: &str,
        internal_ext: &str,
        internal_name: &str,
        bridge_time: DateTime<Utc>,
    ) {
        let result = sqlx::query(
            "UPDATE call_log SET internal_ext = ?, internal_name = ?, answered = 1 \
             WHERE linkedid = ? AND direction = 'inbound' \
             AND id = (SELECT MAX(id) FROM call_log WHERE linkedid = ?)",
        )
        .bind(internal_ext)
        .bind(internal_name)
        .bind(correlation_id)
        .bind(correlation_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(correlation_id, error = %e, "failed to mark inbound call answered");
            return;
        }
        self.pending
            .entry(correlation_id.to_string())
            .or_default()
            .bridge_time = Some(bridge_time);
    }

    pub async fn insert_outbound(
        &mut self,
        correlation_id: &str,
        bridge_time: DateTime<Utc>,
        external_number: &str,
        internal_ext: &str,
        internal_name: &str,
    ) {
        let timestamp = bridge_time.format("%Y-%m-%d %H:%M:%S").to_string();
        let result = sqlx::query(
            "INSERT INTO call_log \
             (timestamp, direction, external_number, internal_ext, internal_name, answered, linkedid) \
             VALUES (?, 'outbound', ?, ?, ?, 1, ?)",
        )
        .bind(&timestamp)
        .bind(external_number)
        .bind(internal_ext)
        .bind(internal_name)
        .bind(correlation_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(correlation_id, error = %e, "failed to insert outbound call-log row");
            return;
        }
        self.pending.insert(
            correlation_id.to_string(),
            PendingHistory { bridge_time: Some(bridge_time) },
        );
    }

    /// Computes and persists the call duration if a bridge time was recorded;
    /// a no-op for calls that were never answered.
    pub async fn finalize(&mut self, correlation_id: &str) {
        let Some(pending) = self.pending.remove(correlation_id) else {
            debug!(correlation_id, "finalize on call with no pending history entry");
            return;
        };
        let Some(bridge_time) = pending.bridge_time else {
            return;
        };
        let duration = (Utc::now() - bridge_time).num_seconds().max(0);
        let result = sqlx::query(
            "UPDATE call_log SET duration = ? \
             WHERE linkedid = ? AND id = (SELECT MAX(id) FROM call_log WHERE linkedid = ?)",
        )
        .bind(duration)
        .bind(correlation_id)
        .bind(correlation_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!(correlation_id, error = %e, "failed to finalize call-log duration");
        }
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<CallLogRow>> {
        let rows = sqlx::query_as::<_, CallLogRow>(
            "SELECT id, timestamp, direction, external_number, internal_ext, internal_name, \
             answered, duration, linkedid FROM call_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct CallLogRow {
    pub id: i64,
    pub timestamp: String,
    pub direction: String,
    pub external_number: String,
    pub internal_ext: String,
    pub internal_name: String,
    pub answered: bool,
    pub duration: i64,
    pub linkedid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbound_ring_then_answer_then_finalize_records_duration() {
        let mut writer = HistoryWriter::connect_in_memory().await.unwrap();
        writer.insert_inbound_ring("link-1", "0712345678").await;
        writer
            .mark_inbound_answered("link-1", "1001", "Alice", Utc::now())
            .await;
        writer.finalize("link-1").await;
        let rows = writer.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].answered);
    }

    #[tokio::test]
    async fn missed_inbound_call_keeps_zero_duration() {
        let mut writer = HistoryWriter::connect_in_memory().await.unwrap();
        writer.insert_inbound_ring("link-2", "0700000000").await;
        writer.finalize("link-2").await;
        let rows = writer.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].answered);
        assert_eq!(rows[0].duration, 0);
    }
}
