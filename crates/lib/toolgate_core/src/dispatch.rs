// @awa-component: DSP-QueryDispatcher
//
//! Query Dispatcher.
//!
//! Sends a compiled [`QueryDescriptor`] to the tool's collection or table and
//! wraps the outcome in a [`ResultEnvelope`]. Backend failures are reported in
//! the envelope, never returned as errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::query::QueryDescriptor;
use crate::spec::ToolSpec;
use crate::store::{Databases, Record, Source, StoreError};

/// Uniform result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    pub count: usize,
    pub documents: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn ok(documents: Vec<Record>) -> Self {
        Self {
            success: true,
            count: documents.len(),
            documents,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            documents: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// `{"success", "count"}` summary kept in the audit trail.
    pub fn summary(&self) -> Value {
        json!({"success": self.success, "count": self.count})
    }
}

/// Routes descriptors to database handles.
#[derive(Clone)]
pub struct Dispatcher {
    databases: Arc<Databases>,
}

impl Dispatcher {
    pub fn new(databases: Arc<Databases>) -> Self {
        Self { databases }
    }

    pub fn databases(&self) -> &Databases {
        &self.databases
    }

    /// Run `descriptor` against `spec`'s target.
    pub async fn dispatch(&self, spec: &ToolSpec, descriptor: &QueryDescriptor) -> ResultEnvelope {
        match self.find(spec, descriptor).await {
            Ok(documents) => {
                debug!(tool = %spec.name, count = documents.len(), "query dispatched");
                ResultEnvelope::ok(documents)
            }
            Err(e) => {
                warn!(tool = %spec.name, error = %e, "query failed");
                ResultEnvelope::failure(format!("Failed to find documents: {e}"))
            }
        }
    }

    async fn find(&self, spec: &ToolSpec, descriptor: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
        let target = spec.target.as_ref().ok_or_else(|| {
            StoreError::Unsupported(format!("tool {} has no collection or table", spec.name))
        })?;
        let db = self.databases.get(target.db_name()).await?;
        let source = Source::from(target);
        if !db.contains(&source).await? {
            return Err(StoreError::TargetNotFound {
                target: source,
                database: db.name().to_string(),
            });
        }
        db.find(&source, descriptor).await
    }

    /// Collection names of the default database as `{"name": ..}` records.
    pub async fn list_collections(&self) -> ResultEnvelope {
        let names = async {
            let db = self.databases.get(None).await?;
            db.list_collection_names().await
        };
        match names.await {
            Ok(names) => ResultEnvelope::ok(
                names
                    .into_iter()
                    .map(|name| {
                        let mut record = Record::new();
                        record.insert("name".into(), Value::String(name));
                        record
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "listing collections failed");
                ResultEnvelope::failure(format!("Failed to list collections: {e}"))
            }
        }
    }
}
