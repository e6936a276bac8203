// @awa-component: AUD-AuditRecorder
//
//! Audit Recorder.
//!
//! Each invocation that reaches execution appends a `started` row and then
//! exactly one terminal row (`completed` or `failed`) with the same run id.
//! Rows are appended, never updated in place. If no sink is configured, or
//! the sink fails to initialise, the recorder is disabled and every call is a
//! no-op. Write failures are logged at `warn` and never reach the caller.

mod run_id;
mod store_sink;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::StoreError;

pub use run_id::RunId;
pub use store_sink::{DEFAULT_AUDIT_TABLE, StoreAuditSink};

/// Errors raised by audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub tool_id: String,
    pub date: String,
    pub run_id: RunId,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<String>,
}

/// Durable destination for audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Prepare the sink (e.g. create the table).
    async fn initialize(&self) -> Result<(), AuditError>;

    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Identity of one audited invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRun {
    pub tool_id: String,
    pub run_id: RunId,
    pub client_id: String,
    pub started_at: DateTime<Utc>,
    pub parameters: Value,
}

impl AuditRun {
    pub fn new(
        tool_id: impl Into<String>,
        run_id: RunId,
        client_id: impl Into<String>,
        started_at: DateTime<Utc>,
        parameters: Value,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            run_id,
            client_id: client_id.into(),
            started_at,
            parameters,
        }
    }

    fn base(&self, status: AuditStatus) -> AuditRecord {
        AuditRecord {
            tool_id: self.tool_id.clone(),
            date: self.started_at.format("%Y-%m-%d").to_string(),
            run_id: self.run_id,
            status,
            client_id: None,
            start_timestamp: None,
            end_timestamp: None,
            parameters: None,
            result: None,
            error: None,
            status_code: None,
            status_message: None,
            status_details: None,
        }
    }

    fn started_record(&self) -> AuditRecord {
        AuditRecord {
            client_id: Some(self.client_id.clone()),
            start_timestamp: Some(timestamp(self.started_at)),
            parameters: Some(self.parameters.to_string()),
            ..self.base(AuditStatus::Started)
        }
    }
}

/// Terminal transition of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditUpdate {
    pub status: AuditStatus,
    pub status_code: i32,
    pub status_message: String,
    pub status_details: Option<String>,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub ended_at: DateTime<Utc>,
}

impl AuditUpdate {
    pub fn completed(result: Value, ended_at: DateTime<Utc>) -> Self {
        Self {
            status: AuditStatus::Completed,
            status_code: 200,
            status_message: "OK".to_string(),
            status_details: None,
            error: None,
            result: Some(result),
            ended_at,
        }
    }

    pub fn failed(status_code: i32, error: impl Into<String>, ended_at: DateTime<Utc>) -> Self {
        let error = error.into();
        Self {
            status: AuditStatus::Failed,
            status_code,
            status_message: if status_code < 500 {
                "Bad Request".to_string()
            } else {
                "Internal Error".to_string()
            },
            status_details: Some(error.clone()),
            error: Some(error),
            result: None,
            ended_at,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// Appends lifecycle rows to an optional sink.
#[derive(Clone, Default)]
pub struct AuditRecorder {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditRecorder {
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Initialise `sink`; on failure the recorder is disabled.
    pub async fn new(sink: Arc<dyn AuditSink>) -> Self {
        match sink.initialize().await {
            Ok(()) => Self { sink: Some(sink) },
            Err(e) => {
                warn!("AuditRecorder: sink initialisation failed, auditing disabled: {e}");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append the `started` row for `run`.
    pub async fn start(&self, run: &AuditRun) {
        self.append(run.started_record()).await;
    }

    /// Append the terminal row for `run`.
    pub async fn update(&self, run: &AuditRun, update: AuditUpdate) {
        let record = AuditRecord {
            end_timestamp: Some(timestamp(update.ended_at)),
            result: update.result.map(|r| r.to_string()),
            error: update.error,
            status_code: Some(update.status_code),
            status_message: Some(update.status_message),
            status_details: update.status_details,
            ..run.base(update.status)
        };
        self.append(record).await;
    }

    async fn append(&self, record: AuditRecord) {
        let Some(sink) = &self.sink else {
            return;
        };
        let (run_id, status) = (record.run_id, record.status);
        match sink.append(record).await {
            Ok(()) => debug!(run_id = %run_id, ?status, "audit row appended"),
            Err(e) => warn!(run_id = %run_id, "AuditRecorder: failed to record audit row: {e}"),
        }
    }
}
