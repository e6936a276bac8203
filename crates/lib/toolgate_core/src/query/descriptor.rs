// @awa-component: QRY-Descriptor
//
//! Compiled query shape handed to the dispatcher.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::spec::{Operator, VECTOR_ATTRIBUTE, VECTORIZE_ATTRIBUTE};

/// `attribute {operator} value`. Serializes as `{"<operator>": value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub operator: Operator,
    pub value: Value,
}

impl Clause {
    pub fn new(operator: Operator, value: Value) -> Self {
        Self { operator, value }
    }
}

impl Serialize for Clause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.operator.as_str(), &self.value)?;
        map.end()
    }
}

/// Attribute → clause. Inserting an attribute twice keeps the later clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, Clause>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: impl Into<String>, clause: Clause) {
        self.0.insert(attribute.into(), clause);
    }

    pub fn get(&self, attribute: &str) -> Option<&Clause> {
        self.0.get(attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Clause)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Clause)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, Clause)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (k, clause) in iter {
            filter.insert(k, clause);
        }
        filter
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum SortDirective {
    /// Field → 1 / -1, copied from the tool configuration.
    Static(Map<String, Value>),
    /// Similarity to a caller-side embedding.
    Vector(Vec<f32>),
    /// Similarity to text the store embeds itself.
    Vectorize(String),
}

impl Serialize for SortDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Static(map) => map.serialize(serializer),
            Self::Vector(vector) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(VECTOR_ATTRIBUTE, vector)?;
                map.end()
            }
            Self::Vectorize(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(VECTORIZE_ATTRIBUTE, text)?;
                map.end()
            }
        }
    }
}

/// Backend-agnostic query: filter, sort, projection, limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Map<String, Value>>,
    pub limit: u32,
}
