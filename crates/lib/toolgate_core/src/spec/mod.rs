// @awa-component: SPEC-ToolSpec
//
//! Strongly-typed tool configuration.
//!
//! A [`ToolSpec`] is produced from a catalog document in a single
//! deserialize-and-validate pass (see [`validation`]) and is immutable after
//! that. Everything the resolver and compiler need to know about a tool is
//! here; malformed documents never get this far.

mod validation;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::expr::{ExprError, Expression};

pub use validation::RawToolSpec;

/// Limit applied when a tool does not configure one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Attribute naming a dense-vector field; needs an embedding model.
pub const VECTOR_ATTRIBUTE: &str = "$vector";

/// Attribute naming a server-side vectorized field.
pub const VECTORIZE_ATTRIBUTE: &str = "$vectorize";

/// Argument key used by the search slot when it does not name one.
pub const DEFAULT_SEARCH_PARAM: &str = "search_query";

/// Errors raised while validating a catalog entry.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("malformed tool spec: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("tool name must not be empty")]
    EmptyName,

    #[error("tool {tool}: unknown method '{method}'")]
    UnknownMethod { tool: String, method: String },

    #[error("tool {tool}: find requires exactly one of collection_name or table_name")]
    MissingTarget { tool: String },

    #[error("tool {tool}: collection_name and table_name are mutually exclusive")]
    AmbiguousTarget { tool: String },

    #[error("tool {tool}: limit must be a positive integer")]
    InvalidLimit { tool: String },

    #[error("tool {tool}: unknown operator '{operator}'")]
    UnknownOperator { tool: String, operator: String },

    #[error("tool {tool}: parameter {param} sets both value and expr")]
    ConflictingResolution { tool: String, param: String },

    #[error("tool {tool}: parameter needs a param or attribute")]
    UnnamedParameter { tool: String },

    #[error("tool {tool}: parameter {attribute} has no param, value or expr")]
    UnboundParameter { tool: String, attribute: String },

    #[error("tool {tool}: at most one $vector/$vectorize parameter is allowed")]
    MultipleSearchSlots { tool: String },

    #[error("tool {tool}: parameter {param} has an invalid expr: {source}")]
    Expression {
        tool: String,
        param: String,
        #[source]
        source: ExprError,
    },
}

/// Supported tool methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Find,
    ListCollections,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::ListCollections => "list_collections",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" | "find_documents" => Ok(Self::Find),
            "list_collections" => Ok(Self::ListCollections),
            _ => Err(()),
        }
    }
}

/// Where a `find` tool reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Collection {
        name: String,
        db_name: Option<String>,
    },
    Table {
        name: String,
        db_name: Option<String>,
    },
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Self::Collection { name, .. } | Self::Table { name, .. } => name,
        }
    }

    /// Database override; `None` means the process default.
    pub fn db_name(&self) -> Option<&str> {
        match self {
            Self::Collection { db_name, .. } | Self::Table { db_name, .. } => db_name.as_deref(),
        }
    }
}

/// Filter comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Operator {
    #[default]
    Equals,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// Canonical name used in query descriptors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::In => "in",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// Data API spelling.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Equals => "$eq",
            Self::In => "$in",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('$').unwrap_or(s) {
            "equals" | "eq" => Ok(Self::Equals),
            "in" => Ok(Self::In),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter's resolution rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub param: Option<String>,
    pub attribute: String,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub operator: Operator,
    pub enum_values: Option<Vec<Value>>,
    pub value: Option<Value>,
    pub expr: Option<Expression>,
    pub embedding_model: Option<String>,
}

/// How a parameter obtains its clause value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterSource<'a> {
    /// The tool's search query, read from the named argument.
    SearchSlot(&'a str),
    Static(&'a Value),
    Expression(&'a Expression),
    Argument(&'a str),
}

impl ParameterSpec {
    /// Argument-bound parameter with default settings.
    pub fn argument(param: impl Into<String>) -> Self {
        let param = param.into();
        Self {
            attribute: param.clone(),
            param: Some(param),
            kind: None,
            description: None,
            required: false,
            operator: Operator::Equals,
            enum_values: None,
            value: None,
            expr: None,
            embedding_model: None,
        }
    }

    pub fn is_search_slot(&self) -> bool {
        self.attribute == VECTOR_ATTRIBUTE || self.attribute == VECTORIZE_ATTRIBUTE
    }

    /// Argument key callers supply for this parameter, if any.
    pub fn argument_key(&self) -> Option<&str> {
        match self.source() {
            ParameterSource::SearchSlot(key) | ParameterSource::Argument(key) => Some(key),
            _ => None,
        }
    }

    pub fn source(&self) -> ParameterSource<'_> {
        if self.is_search_slot() {
            return ParameterSource::SearchSlot(
                self.param.as_deref().unwrap_or(DEFAULT_SEARCH_PARAM),
            );
        }
        if let Some(value) = &self.value {
            return ParameterSource::Static(value);
        }
        if let Some(expr) = &self.expr {
            return ParameterSource::Expression(expr);
        }
        ParameterSource::Argument(self.param.as_deref().unwrap_or(&self.attribute))
    }

    /// JSON-Schema type for the declared `type`; unknown names map to string.
    pub fn json_type(&self) -> &'static str {
        match self.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("number" | "float" | "double" | "decimal") => "number",
            Some("integer" | "int" | "long") => "integer",
            Some("boolean" | "bool") => "boolean",
            _ => "string",
        }
    }
}

/// A validated tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub method: Method,
    pub target: Option<Target>,
    pub limit: Option<u32>,
    pub projection: Option<Map<String, Value>>,
    pub sort: Option<Map<String, Value>>,
    pub parameters: Vec<ParameterSpec>,
    pub tags: Vec<String>,
}

impl ToolSpec {
    /// Validate a single catalog entry.
    pub fn from_value(value: Value) -> Result<Self, SpecError> {
        let raw: RawToolSpec = serde_json::from_value(value)?;
        Self::try_from(raw)
    }

    pub fn search_slot(&self) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.is_search_slot())
    }

    /// Parameters a caller may supply, in declaration order.
    pub fn argument_parameters(&self) -> impl Iterator<Item = (&str, &ParameterSpec)> {
        self.parameters
            .iter()
            .filter_map(|p| p.argument_key().map(|key| (key, p)))
    }
}
