// @zen-component: STO-DataApiClient
//
//! HTTP client for an Astra-compatible JSON Data API.
//!
//! Every operation is a JSON command POSTed to
//! `{endpoint}/api/json/v1/{keyspace}[/{collection}]` with a `Token` header.
//! Handles for the default database use the configured endpoint; other
//! databases are located through the DevOps API database listing.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{Database, Record, Source, StorageClient, StoreError, TableDefinition, TableMetadata};
use crate::query::QueryDescriptor;

pub const DEFAULT_DEVOPS_URL: &str = "https://api.astra.datastax.com";
pub const DEFAULT_KEYSPACE: &str = "default_keyspace";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct DataApiConfig {
    pub token: String,
    /// API endpoint of the default database.
    pub endpoint: Option<String>,
    /// Default database name; derived from `endpoint` when absent.
    pub database: Option<String>,
    pub keyspace: String,
    pub devops_url: String,
}

impl DataApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: None,
            database: None,
            keyspace: DEFAULT_KEYSPACE.to_string(),
            devops_url: DEFAULT_DEVOPS_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DevopsDatabase {
    id: String,
    info: DevopsDatabaseInfo,
}

#[derive(Debug, Deserialize)]
struct DevopsDatabaseInfo {
    name: String,
    #[serde(default)]
    region: Option<String>,
}

/// Database id embedded in an Astra API endpoint host
/// (`https://<uuid>-<region>.apps.astra.datastax.com`).
pub fn extract_database_id(endpoint: &str) -> Option<Uuid> {
    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    host.get(..36).and_then(|id| Uuid::parse_str(id).ok())
}

/// [`StorageClient`] backed by the Data API.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    http: Client,
    config: DataApiConfig,
    default_database: String,
}

impl DataApiClient {
    /// Build a client, resolving the default database name if needed.
    pub async fn new(config: DataApiConfig) -> Result<Self, StoreError> {
        let http = Client::new();
        let default_database = match (&config.database, &config.endpoint) {
            (Some(name), _) => name.clone(),
            (None, Some(endpoint)) => {
                let id = extract_database_id(endpoint).ok_or_else(|| {
                    StoreError::Request(format!("cannot derive a database id from {endpoint}"))
                })?;
                let databases = list_databases(&http, &config).await?;
                let name = databases
                    .into_iter()
                    .find(|db| db.id == id.to_string())
                    .map(|db| db.info.name)
                    .ok_or_else(|| StoreError::DatabaseNotFound(id.to_string()))?;
                info!(database = %name, "resolved default database from endpoint");
                name
            }
            (None, None) => {
                return Err(StoreError::Request(
                    "a database name or API endpoint is required".to_string(),
                ));
            }
        };
        Ok(Self {
            http,
            config,
            default_database,
        })
    }

    async fn endpoint_for(&self, name: &str) -> Result<String, StoreError> {
        if name == self.default_database
            && let Some(endpoint) = &self.config.endpoint
        {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }

        let db = list_databases(&self.http, &self.config)
            .await?
            .into_iter()
            .find(|db| db.info.name == name)
            .ok_or_else(|| StoreError::DatabaseNotFound(name.to_string()))?;
        let region = db.info.region.ok_or_else(|| {
            StoreError::Decode(format!("database {name} has no region in the DevOps listing"))
        })?;
        Ok(format!("https://{}-{}.apps.astra.datastax.com", db.id, region))
    }
}

async fn list_databases(
    http: &Client,
    config: &DataApiConfig,
) -> Result<Vec<DevopsDatabase>, StoreError> {
    let url = format!("{}/v2/databases", config.devops_url.trim_end_matches('/'));
    debug!(%url, "listing databases");
    let resp = http
        .get(&url)
        .bearer_auth(&config.token)
        .send()
        .await
        .map_err(|e| StoreError::Request(format!("DevOps request failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(StoreError::Backend(format!(
            "DevOps API returned {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| StoreError::Decode(format!("DevOps response: {e}")))
}

#[async_trait]
impl StorageClient for DataApiClient {
    fn default_database(&self) -> &str {
        &self.default_database
    }

    async fn connect(&self, name: &str) -> Result<Arc<dyn Database>, StoreError> {
        let endpoint = self.endpoint_for(name).await?;
        info!(database = name, %endpoint, "connected to Data API database");
        Ok(Arc::new(DataApiDatabase {
            name: name.to_string(),
            base: format!("{endpoint}/api/json/v1/{}", self.config.keyspace),
            token: self.config.token.clone(),
            http: self.http.clone(),
        }))
    }
}

/// One Data API database (keyspace-scoped).
#[derive(Debug)]
pub struct DataApiDatabase {
    name: String,
    base: String,
    token: String,
    http: Client,
}

impl DataApiDatabase {
    async fn command(&self, source: Option<&Source>, body: Value) -> Result<Value, StoreError> {
        let url = match source {
            Some(source) => format!("{}/{}", self.base, source.name),
            None => self.base.clone(),
        };
        let resp = self
            .http
            .post(&url)
            .header("Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("HTTP {status}: {e}")))?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect();
            return Err(StoreError::Backend(messages.join("; ")));
        }
        if !status.is_success() {
            return Err(StoreError::Backend(format!("HTTP {status}")));
        }
        Ok(payload)
    }

    fn names(payload: &Value, key: &str) -> Result<Vec<String>, StoreError> {
        payload
            .pointer(&format!("/status/{key}"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("name").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect()
            })
            .ok_or_else(|| StoreError::Decode(format!("response has no status.{key}")))
    }
}

/// Descriptor → Data API `find` command body.
pub fn find_command(query: &QueryDescriptor) -> Value {
    let mut find = Map::new();
    if let Some(filter) = &query.filter {
        let filter: Map<String, Value> = filter
            .iter()
            .map(|(attr, clause)| {
                (
                    attr.to_string(),
                    json!({ clause.operator.wire_name(): clause.value }),
                )
            })
            .collect();
        find.insert("filter".into(), Value::Object(filter));
    }
    if let Some(sort) = &query.sort {
        find.insert("sort".into(), json!(sort));
    }
    if let Some(projection) = &query.projection {
        find.insert("projection".into(), Value::Object(projection.clone()));
    }
    find.insert("options".into(), json!({"limit": query.limit}));
    json!({ "find": find })
}

#[async_trait]
impl Database for DataApiDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>, StoreError> {
        let payload = self.command(None, json!({"findCollections": {}})).await?;
        Self::names(&payload, "collections")
    }

    async fn list_tables(&self) -> Result<Vec<TableMetadata>, StoreError> {
        let payload = self.command(None, json!({"listTables": {}})).await?;
        Ok(Self::names(&payload, "tables")?
            .into_iter()
            .map(|name| TableMetadata {
                name,
                definition: None,
            })
            .collect())
    }

    async fn find(&self, source: &Source, query: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
        let limit = query.limit as usize;
        let mut command = find_command(query);
        let mut documents: Vec<Record> = Vec::new();

        loop {
            let payload = self.command(Some(source), command.clone()).await?;
            let page = payload
                .pointer("/data/documents")
                .and_then(Value::as_array)
                .ok_or_else(|| StoreError::Decode("response has no data.documents".to_string()))?;
            documents.extend(page.iter().filter_map(|d| d.as_object().cloned()));

            match payload.pointer("/data/nextPageState").and_then(Value::as_str) {
                Some(state) if documents.len() < limit => {
                    if let Some(options) = command
                        .pointer_mut("/find/options")
                        .and_then(Value::as_object_mut)
                    {
                        options.insert("pageState".into(), json!(state));
                    }
                }
                _ => break,
            }
        }

        documents.truncate(limit);
        Ok(documents)
    }

    async fn insert_one(&self, source: &Source, record: Record) -> Result<(), StoreError> {
        self.command(Some(source), json!({"insertOne": {"document": record}}))
            .await?;
        Ok(())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<(), StoreError> {
        self.command(
            None,
            json!({"createTable": {
                "name": definition.name,
                "definition": definition.to_json(),
                "options": {"ifNotExists": true}
            }}),
        )
        .await?;
        Ok(())
    }
}
