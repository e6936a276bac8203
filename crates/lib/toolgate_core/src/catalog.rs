// @awa-component: CAT-Catalog
//
//! The loaded tool set.
//!
//! Tools come from a local JSON document or from a catalog collection
//! (documents with `type: "tool"`, optionally narrowed by tags). Each entry
//! is validated on its own: invalid entries are logged and skipped, and a
//! duplicate name keeps the first definition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::query::{Clause, QueryDescriptor};
use crate::spec::{Operator, ToolSpec};
use crate::store::{Database, Source, StoreError};

/// Upper bound on catalog documents read from a store.
pub const CATALOG_FETCH_LIMIT: u32 = 1000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog must be a JSON array of tools or an object with a \"tools\" array")]
    Shape,

    #[error("failed to read catalog collection: {0}")]
    Store(#[from] StoreError),

    #[error("No tools found in catalog")]
    Empty,
}

/// Store documents cannot hold keys starting with `$`, so catalogs write
/// `_$vector` for `$vector`. Undo that at every depth.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let key = match k.strip_prefix('_') {
                        Some(rest) if rest.starts_with('$') => rest.to_string(),
                        _ => k,
                    };
                    (key, normalize_keys(v))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Validated tools in catalog order, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: Vec<Arc<ToolSpec>>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn from_specs(specs: impl IntoIterator<Item = ToolSpec>) -> Self {
        let mut catalog = Catalog::default();
        for spec in specs {
            if catalog.index.contains_key(&spec.name) {
                error!(tool = %spec.name, "duplicate tool name in catalog, keeping the first definition");
                continue;
            }
            catalog.index.insert(spec.name.clone(), catalog.tools.len());
            catalog.tools.push(Arc::new(spec));
        }
        catalog
    }

    /// Validate raw entries, skipping the invalid ones.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let specs = values.into_iter().enumerate().filter_map(|(i, value)| {
            match ToolSpec::from_value(normalize_keys(value)) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!(entry = i, "skipping invalid catalog entry: {e}");
                    None
                }
            }
        });
        Self::from_specs(specs)
    }

    /// Parse a catalog document: `[tool, ...]` or `{"tools": [tool, ...]}`.
    pub fn from_json_str(source: &str) -> Result<Self, CatalogError> {
        match serde_json::from_str::<Value>(source)? {
            Value::Array(items) => Ok(Self::from_values(items)),
            Value::Object(mut map) => match map.remove("tools") {
                Some(Value::Array(items)) => Ok(Self::from_values(items)),
                _ => Err(CatalogError::Shape),
            },
            _ => Err(CatalogError::Shape),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let catalog = Self::from_json_str(&source)?;
        info!(path = %path.display(), tools = catalog.len(), "loaded catalog file");
        Ok(catalog)
    }

    /// Read tool documents from `collection`, any-of matching `tags`.
    pub async fn from_store(
        db: &dyn Database,
        collection: &str,
        tags: &[String],
    ) -> Result<Self, CatalogError> {
        let mut filter: crate::query::Filter =
            [("type", Clause::new(Operator::Equals, json!("tool")))].into_iter().collect();
        if !tags.is_empty() {
            filter.insert("tags", Clause::new(Operator::In, json!(tags)));
        }
        let query = QueryDescriptor {
            filter: Some(filter),
            sort: None,
            projection: None,
            limit: CATALOG_FETCH_LIMIT,
        };
        let documents = db.find(&Source::collection(collection), &query).await?;
        let catalog = Self::from_values(documents.into_iter().map(strip_store_fields));
        info!(collection, tools = catalog.len(), "loaded catalog collection");
        Ok(catalog)
    }

    /// Fail with [`CatalogError::Empty`] when no tool survived loading.
    pub fn ensure_not_empty(self) -> Result<Self, CatalogError> {
        if self.is_empty() {
            Err(CatalogError::Empty)
        } else {
            Ok(self)
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolSpec>> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolSpec>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn strip_store_fields(mut document: Map<String, Value>) -> Value {
    document.remove("_id");
    Value::Object(document)
}
