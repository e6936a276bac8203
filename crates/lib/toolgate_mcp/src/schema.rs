// @zen-component: MCP-ToolSchema
//
//! Catalog tool → MCP tool definition.
//!
//! Only argument-driven parameters are exposed; static `value` and `expr`
//! parameters never appear in the input schema.

use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value, json};

use toolgate_core::spec::{ParameterSource, ParameterSpec, ToolSpec};

/// JSON-Schema object for the tool's caller-supplied arguments.
pub fn input_schema(spec: &ToolSpec) -> JsonObject {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (key, parameter) in spec.argument_parameters() {
        if properties.contains_key(key) {
            continue;
        }
        properties.insert(key.to_string(), Value::Object(property(parameter)));
        if parameter.required {
            required.push(Value::String(key.to_string()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    schema
}

fn property(parameter: &ParameterSpec) -> Map<String, Value> {
    let mut property = Map::new();
    let search = matches!(parameter.source(), ParameterSource::SearchSlot(_));
    let kind = if search { "string" } else { parameter.json_type() };
    property.insert("type".into(), json!(kind));

    let description = match (&parameter.description, search) {
        (Some(description), _) => Some(description.clone()),
        (None, true) => Some("Text to search for by semantic similarity".to_string()),
        (None, false) => None,
    };
    if let Some(description) = description {
        property.insert("description".into(), Value::String(description));
    }
    if let Some(values) = &parameter.enum_values {
        property.insert("enum".into(), Value::Array(values.clone()));
    }
    property
}

/// MCP tool definition for a catalog entry.
pub fn tool_definition(spec: &ToolSpec) -> Tool {
    Tool::new(
        spec.name.clone(),
        spec.description.clone(),
        Arc::new(input_schema(spec)),
    )
}
