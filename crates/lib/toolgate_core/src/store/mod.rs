// @awa-component: STO-StorageAPI
//
//! Storage collaborator.
//!
//! [`StorageClient`] opens [`Database`] handles by name; [`Databases`] caches
//! them for the life of the process. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] — in-process collections and tables, used for tests and
//!   local catalogs
//! - [`DataApiClient`] — HTTP client for an Astra-compatible Data API

mod cache;
pub mod data_api;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::query::QueryDescriptor;
use crate::spec::Target;

pub use cache::Databases;
pub use data_api::{DataApiClient, DataApiConfig};
pub use memory::{MemoryDatabase, MemoryStore};

/// A stored document or row.
pub type Record = Map<String, Value>;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("{target} not found in database {database}")]
    TargetNotFound { target: Source, database: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Collection,
    Table,
}

/// A collection or table inside a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub kind: SourceKind,
    pub name: String,
}

impl Source {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Collection,
            name: name.into(),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Table,
            name: name.into(),
        }
    }
}

impl From<&Target> for Source {
    fn from(target: &Target) -> Self {
        match target {
            Target::Collection { name, .. } => Self::collection(name.clone()),
            Target::Table { name, .. } => Self::table(name.clone()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SourceKind::Collection => write!(f, "Collection {}", self.name),
            SourceKind::Table => write!(f, "Table {}", self.name),
        }
    }
}

/// Entry returned by [`Database::list_tables`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub name: String,
    pub definition: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Uuid,
    Date,
    Timestamp,
    Int,
    TextSet,
}

impl ColumnType {
    pub fn to_json(self) -> Value {
        match self {
            Self::Text => json!({"type": "text"}),
            Self::Uuid => json!({"type": "uuid"}),
            Self::Date => json!({"type": "date"}),
            Self::Timestamp => json!({"type": "timestamp"}),
            Self::Int => json!({"type": "int"}),
            Self::TextSet => json!({"type": "set", "valueType": "text"}),
        }
    }
}

/// Schema for [`Database::create_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
    pub partition_by: Vec<String>,
    /// Clustering columns with direction (1 ascending, -1 descending).
    pub partition_sort: Vec<(String, i8)>,
}

impl TableDefinition {
    /// Data API `definition` object.
    pub fn to_json(&self) -> Value {
        let columns: Map<String, Value> = self
            .columns
            .iter()
            .map(|(name, ty)| (name.clone(), ty.to_json()))
            .collect();
        let sort: Map<String, Value> = self
            .partition_sort
            .iter()
            .map(|(name, dir)| (name.clone(), json!(dir)))
            .collect();
        json!({
            "columns": columns,
            "primaryKey": {
                "partitionBy": self.partition_by,
                "partitionSort": sort,
            }
        })
    }
}

/// Opens database handles.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Name of the database used when a tool names none.
    fn default_database(&self) -> &str;

    async fn connect(&self, name: &str) -> Result<Arc<dyn Database>, StoreError>;
}

/// One database: collections, tables and the operations tools need.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    async fn list_collection_names(&self) -> Result<Vec<String>, StoreError>;

    async fn list_tables(&self) -> Result<Vec<TableMetadata>, StoreError>;

    async fn find(&self, source: &Source, query: &QueryDescriptor)
    -> Result<Vec<Record>, StoreError>;

    async fn insert_one(&self, source: &Source, record: Record) -> Result<(), StoreError>;

    async fn create_table(&self, definition: &TableDefinition) -> Result<(), StoreError>;

    async fn contains(&self, source: &Source) -> Result<bool, StoreError> {
        Ok(match source.kind {
            SourceKind::Collection => self
                .list_collection_names()
                .await?
                .iter()
                .any(|n| *n == source.name),
            SourceKind::Table => self
                .list_tables()
                .await?
                .iter()
                .any(|t| t.name == source.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_definition_renders_primary_key() {
        let def = TableDefinition {
            name: "tool_audit".into(),
            columns: vec![("tool_id".into(), ColumnType::Text), ("keys".into(), ColumnType::TextSet)],
            partition_by: vec!["tool_id".into()],
            partition_sort: vec![("run_id".into(), -1)],
        };
        assert_eq!(
            def.to_json(),
            json!({
                "columns": {
                    "tool_id": {"type": "text"},
                    "keys": {"type": "set", "valueType": "text"}
                },
                "primaryKey": {"partitionBy": ["tool_id"], "partitionSort": {"run_id": -1}}
            })
        );
    }

    #[test]
    fn target_not_found_names_the_source() {
        let err = StoreError::TargetNotFound {
            target: Source::table("stores"),
            database: "retail".into(),
        };
        assert_eq!(err.to_string(), "Table stores not found in database retail");
    }
}
