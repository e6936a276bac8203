// @zen-component: AUD-StoreSink
//
//! Audit sink writing rows into a table of the storage collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{AuditError, AuditRecord, AuditSink};
use crate::store::{ColumnType, Databases, Source, TableDefinition};

pub const DEFAULT_AUDIT_TABLE: &str = "tool_audit";

/// Appends audit rows with `insert_one`.
pub struct StoreAuditSink {
    databases: Arc<Databases>,
    table: String,
}

impl StoreAuditSink {
    /// Sink writing to `table` in the default database.
    pub fn new(databases: Arc<Databases>, table: impl Into<String>) -> Self {
        Self {
            databases,
            table: table.into(),
        }
    }

    /// Partitioned by `(tool_id, date)`, newest run first.
    pub fn table_definition(&self) -> TableDefinition {
        let columns = [
            ("tool_id", ColumnType::Text),
            ("date", ColumnType::Date),
            ("run_id", ColumnType::Uuid),
            ("client_id", ColumnType::Text),
            ("status", ColumnType::Text),
            ("start_timestamp", ColumnType::Timestamp),
            ("end_timestamp", ColumnType::Timestamp),
            ("keys", ColumnType::TextSet),
            ("parameters", ColumnType::Text),
            ("result", ColumnType::Text),
            ("error", ColumnType::Text),
            ("status_code", ColumnType::Int),
            ("status_message", ColumnType::Text),
            ("status_details", ColumnType::Text),
        ];
        TableDefinition {
            name: self.table.clone(),
            columns: columns
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
            partition_by: vec!["tool_id".to_string(), "date".to_string()],
            partition_sort: vec![("run_id".to_string(), -1)],
        }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn initialize(&self) -> Result<(), AuditError> {
        let db = self.databases.get(None).await?;
        let source = Source::table(self.table.clone());
        if !db.contains(&source).await? {
            info!(table = %self.table, database = db.name(), "creating audit table");
            db.create_table(&self.table_definition()).await?;
        }
        Ok(())
    }

    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let row = match serde_json::to_value(&record) {
            Ok(Value::Object(row)) => row,
            Ok(_) => return Err(AuditError::Unavailable("audit row is not an object".to_string())),
            Err(e) => return Err(AuditError::Unavailable(e.to_string())),
        };
        let db = self.databases.get(None).await?;
        db.insert_one(&Source::table(self.table.clone()), row).await?;
        Ok(())
    }
}
