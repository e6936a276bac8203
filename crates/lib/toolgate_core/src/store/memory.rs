// @awa-component: STO-MemoryStore
//
//! In-process storage backend.
//!
//! Holds named databases of collections and tables and evaluates the query
//! descriptor directly: the six filter operators (`in` also matches array
//! fields any-of), static and `$vector` sorts, projection and limit. Also
//! counts connects and finds, which makes it the storage spy in tests.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use super::{
    Database, Record, Source, SourceKind, StorageClient, StoreError, TableDefinition, TableMetadata,
};
use crate::query::{Clause, QueryDescriptor, SortDirective};
use crate::spec::{Operator, VECTOR_ATTRIBUTE};

#[derive(Debug, Default)]
struct Table {
    definition: Option<TableDefinition>,
    rows: Vec<Record>,
}

/// One in-memory database.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
    tables: RwLock<BTreeMap<String, Table>>,
    finds: AtomicUsize,
    queries: Mutex<Vec<(Source, QueryDescriptor)>>,
    fail_with: Option<String>,
}

fn records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::default(),
            tables: RwLock::default(),
            finds: AtomicUsize::new(0),
            queries: Mutex::default(),
            fail_with: None,
        }
    }

    /// Add a collection. Non-object rows are dropped.
    pub fn with_collection(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.collections.get_mut().insert(name.into(), records(rows));
        self
    }

    /// Add a table without a schema.
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.tables.get_mut().insert(
            name.into(),
            Table {
                definition: None,
                rows: records(rows),
            },
        );
        self
    }

    /// Make every `find` fail with a backend error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn find_count(&self) -> usize {
        self.finds.load(AtomicOrdering::SeqCst)
    }

    /// Every `find` received so far, in call order.
    pub async fn queries(&self) -> Vec<(Source, QueryDescriptor)> {
        self.queries.lock().await.clone()
    }

    /// Current rows of a collection or table (empty if it does not exist).
    pub async fn rows(&self, source: &Source) -> Vec<Record> {
        match source.kind {
            SourceKind::Collection => self
                .collections
                .read()
                .await
                .get(&source.name)
                .cloned()
                .unwrap_or_default(),
            SourceKind::Table => self
                .tables
                .read()
                .await
                .get(&source.name)
                .map(|t| t.rows.clone())
                .unwrap_or_default(),
        }
    }

    pub async fn table_definition(&self, name: &str) -> Option<TableDefinition> {
        self.tables
            .read()
            .await
            .get(name)
            .and_then(|t| t.definition.clone())
    }

    fn not_found(&self, source: &Source) -> StoreError {
        StoreError::TargetNotFound {
            target: source.clone(),
            database: self.name.clone(),
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn list_tables(&self) -> Result<Vec<TableMetadata>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .iter()
            .map(|(name, table)| TableMetadata {
                name: name.clone(),
                definition: table.definition.as_ref().map(TableDefinition::to_json),
            })
            .collect())
    }

    async fn find(&self, source: &Source, query: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
        self.finds.fetch_add(1, AtomicOrdering::SeqCst);
        self.queries.lock().await.push((source.clone(), query.clone()));
        if let Some(message) = &self.fail_with {
            return Err(StoreError::Backend(message.clone()));
        }

        let rows = match source.kind {
            SourceKind::Collection => self.collections.read().await.get(&source.name).cloned(),
            SourceKind::Table => self
                .tables
                .read()
                .await
                .get(&source.name)
                .map(|t| t.rows.clone()),
        }
        .ok_or_else(|| self.not_found(source))?;

        evaluate(rows, query)
    }

    async fn insert_one(&self, source: &Source, record: Record) -> Result<(), StoreError> {
        match source.kind {
            SourceKind::Collection => {
                self.collections
                    .write()
                    .await
                    .entry(source.name.clone())
                    .or_default()
                    .push(record);
            }
            SourceKind::Table => {
                let mut tables = self.tables.write().await;
                let table = tables
                    .get_mut(&source.name)
                    .ok_or_else(|| self.not_found(source))?;
                table.rows.push(record);
            }
        }
        Ok(())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .entry(definition.name.clone())
            .or_insert_with(|| Table {
                definition: Some(definition.clone()),
                rows: Vec::new(),
            });
        Ok(())
    }
}

/// Named in-memory databases.
#[derive(Debug)]
pub struct MemoryStore {
    default_database: String,
    databases: DashMap<String, Arc<MemoryDatabase>>,
    connects: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl MemoryStore {
    /// Store with an empty default database called `default_database`.
    pub fn new(default_database: impl Into<String>) -> Self {
        let default_database = default_database.into();
        let databases = DashMap::new();
        databases.insert(
            default_database.clone(),
            Arc::new(MemoryDatabase::new(default_database.clone())),
        );
        Self {
            default_database,
            databases,
            connects: AtomicUsize::new(0),
            connect_delay: None,
        }
    }

    /// Add or replace a database.
    pub fn with_database(self, database: MemoryDatabase) -> Self {
        self.databases
            .insert(database.name.clone(), Arc::new(database));
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn database(&self, name: &str) -> Option<Arc<MemoryDatabase>> {
        self.databases.get(name).map(|db| Arc::clone(db.value()))
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(AtomicOrdering::SeqCst)
    }

    /// Total `find` calls across all databases.
    pub fn find_count(&self) -> usize {
        self.databases.iter().map(|db| db.value().find_count()).sum()
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    fn default_database(&self) -> &str {
        &self.default_database
    }

    async fn connect(&self, name: &str) -> Result<Arc<dyn Database>, StoreError> {
        self.connects.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let db = self
            .database(name)
            .ok_or_else(|| StoreError::DatabaseNotFound(name.to_string()))?;
        Ok(db)
    }
}

// =============================================================================
// Query evaluation
// =============================================================================

fn evaluate(rows: Vec<Record>, query: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
    let mut matched: Vec<Record> = match &query.filter {
        Some(filter) => rows
            .into_iter()
            .filter(|row| filter.iter().all(|(attr, clause)| matches(row, attr, clause)))
            .collect(),
        None => rows,
    };

    match &query.sort {
        None => {}
        Some(SortDirective::Static(fields)) => matched.sort_by(|a, b| compare_rows(a, b, fields)),
        Some(SortDirective::Vector(vector)) => {
            let mut scored: Vec<(Option<f64>, Record)> = matched
                .into_iter()
                .map(|row| (similarity(&row, vector), row))
                .collect();
            // highest similarity first, unscored rows last
            scored.sort_by(|(a, _), (b, _)| match (a, b) {
                (Some(a), Some(b)) => b.partial_cmp(a).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
            matched = scored.into_iter().map(|(_, row)| row).collect();
        }
        Some(SortDirective::Vectorize(_)) => {
            return Err(StoreError::Unsupported(
                "$vectorize sort needs a store with server-side embeddings".to_string(),
            ));
        }
    }

    matched.truncate(query.limit as usize);

    Ok(match &query.projection {
        Some(projection) => matched.into_iter().map(|row| project(row, projection)).collect(),
        None => matched,
    })
}

fn lookup<'a>(row: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(row: &Record, attribute: &str, clause: &Clause) -> bool {
    let field = lookup(row, attribute);
    match clause.operator {
        Operator::Equals => match field {
            Some(Value::Array(items)) if !clause.value.is_array() => {
                items.iter().any(|item| equal(item, &clause.value))
            }
            Some(value) => equal(value, &clause.value),
            None => clause.value.is_null(),
        },
        Operator::In => {
            let Some(candidates) = clause.value.as_array() else {
                return false;
            };
            match field {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| candidates.iter().any(|c| equal(item, c))),
                Some(value) => candidates.iter().any(|c| equal(value, c)),
                None => false,
            }
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let Some(ordering) = field.and_then(|value| compare(value, &clause.value)) else {
                return false;
            };
            match clause.operator {
                Operator::Gt => ordering.is_gt(),
                Operator::Gte => ordering.is_ge(),
                Operator::Lt => ordering.is_lt(),
                _ => ordering.is_le(),
            }
        }
    }
}

fn compare_rows(a: &Record, b: &Record, fields: &Map<String, Value>) -> Ordering {
    for (field, direction) in fields {
        let descending = direction.as_i64().is_some_and(|d| d < 0);
        let ordering = match (lookup(a, field), lookup(b, field)) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn similarity(row: &Record, query: &[f32]) -> Option<f64> {
    let stored: Vec<f64> = row
        .get(VECTOR_ATTRIBUTE)?
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<_>>()?;
    if stored.len() != query.len() || stored.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (a, b) in stored.iter().zip(query) {
        let b = *b as f64;
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn project(row: Record, projection: &Map<String, Value>) -> Record {
    if projection.values().any(truthy) {
        let keep_id = projection.get("_id").is_none_or(truthy);
        row.into_iter()
            .filter(|(key, _)| {
                (key == "_id" && keep_id) || projection.get(key).is_some_and(truthy)
            })
            .collect()
    } else {
        row.into_iter()
            .filter(|(key, _)| !projection.contains_key(key))
            .collect()
    }
}
