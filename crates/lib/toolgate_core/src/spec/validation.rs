// @awa-component: SPEC-Validation
//
//! Raw catalog document shape and the validation pass that turns it into a
//! [`ToolSpec`].

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::{Method, Operator, ParameterSpec, SpecError, Target, ToolSpec};
use crate::expr::Expression;

/// Catalog entry as it appears on disk or in the catalog collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub projection: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort: Option<Map<String, Value>>,
    #[serde(default)]
    pub parameters: Vec<RawParameterSpec>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Csv(String),
}

impl Tags {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Tags::List(items) => items,
            Tags::Csv(s) => s.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawParameterSpec {
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default, rename = "type", alias = "datatype")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    /// `Some(Value::Null)` when the key is present with `null`.
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
}

/// Keeps key presence: a present `null` becomes `Some(Value::Null)`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawToolSpec> for ToolSpec {
    type Error = SpecError;

    fn try_from(raw: RawToolSpec) -> Result<Self, Self::Error> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(SpecError::EmptyName);
        }

        let method = match raw.method.as_deref() {
            None => Method::Find,
            Some(m) => m.parse().map_err(|_| SpecError::UnknownMethod {
                tool: name.clone(),
                method: m.to_string(),
            })?,
        };

        let target = match (raw.collection_name, raw.table_name) {
            (Some(_), Some(_)) => return Err(SpecError::AmbiguousTarget { tool: name }),
            (Some(name), None) => Some(Target::Collection {
                name,
                db_name: raw.db_name,
            }),
            (None, Some(name)) => Some(Target::Table {
                name,
                db_name: raw.db_name,
            }),
            (None, None) => None,
        };
        if method == Method::Find && target.is_none() {
            return Err(SpecError::MissingTarget { tool: name });
        }

        let limit = match raw.limit {
            None => None,
            Some(n) if n > 0 => Some(
                u32::try_from(n).map_err(|_| SpecError::InvalidLimit { tool: name.clone() })?,
            ),
            Some(_) => return Err(SpecError::InvalidLimit { tool: name }),
        };

        let parameters = raw
            .parameters
            .into_iter()
            .map(|p| validate_parameter(&name, p))
            .collect::<Result<Vec<_>, _>>()?;
        if parameters.iter().filter(|p| p.is_search_slot()).count() > 1 {
            return Err(SpecError::MultipleSearchSlots { tool: name });
        }

        Ok(ToolSpec {
            description: raw.description.unwrap_or_default(),
            method,
            target,
            limit,
            projection: raw.projection,
            sort: raw.sort,
            parameters,
            tags: raw.tags.map(Tags::into_vec).unwrap_or_default(),
            name,
        })
    }
}

fn validate_parameter(tool: &str, raw: RawParameterSpec) -> Result<ParameterSpec, SpecError> {
    let attribute = raw
        .attribute
        .clone()
        .or_else(|| raw.param.clone())
        .ok_or_else(|| SpecError::UnnamedParameter {
            tool: tool.to_string(),
        })?;
    let label = raw.param.clone().unwrap_or_else(|| attribute.clone());

    let operator = match raw.operator.as_deref() {
        None => Operator::Equals,
        Some(op) => op.parse().map_err(|_| SpecError::UnknownOperator {
            tool: tool.to_string(),
            operator: op.to_string(),
        })?,
    };

    if raw.value.is_some() && raw.expr.is_some() {
        return Err(SpecError::ConflictingResolution {
            tool: tool.to_string(),
            param: label,
        });
    }

    let expr = raw
        .expr
        .as_deref()
        .map(Expression::parse)
        .transpose()
        .map_err(|source| SpecError::Expression {
            tool: tool.to_string(),
            param: label.clone(),
            source,
        })?;

    let parameter = ParameterSpec {
        param: raw.param,
        attribute,
        kind: raw.kind,
        description: raw.description,
        required: raw.required,
        operator,
        enum_values: raw.enum_values,
        value: raw.value,
        expr,
        embedding_model: raw.embedding_model,
    };

    let bound = parameter.is_search_slot()
        || parameter.param.is_some()
        || parameter.value.is_some()
        || parameter.expr.is_some();
    if !bound {
        return Err(SpecError::UnboundParameter {
            tool: tool.to_string(),
            attribute: parameter.attribute,
        });
    }

    Ok(parameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{DEFAULT_SEARCH_PARAM, ParameterSource};
    use serde_json::json;

    fn spec(value: Value) -> Result<ToolSpec, SpecError> {
        ToolSpec::from_value(value)
    }

    #[test]
    fn parses_table_tool_with_defaults() {
        let tool = spec(json!({
            "name": "by_city",
            "table_name": "stores",
            "parameters": [{"param": "city", "required": true}],
            "limit": 5
        }))
        .unwrap();

        assert_eq!(tool.method, Method::Find);
        assert_eq!(
            tool.target,
            Some(Target::Table {
                name: "stores".into(),
                db_name: None
            })
        );
        assert_eq!(tool.limit, Some(5));
        let p = &tool.parameters[0];
        assert_eq!(p.attribute, "city");
        assert_eq!(p.operator, Operator::Equals);
        assert!(p.required);
        assert_eq!(p.source(), ParameterSource::Argument("city"));
    }

    #[test]
    fn find_documents_is_an_alias_and_db_name_applies_to_collections() {
        let tool = spec(json!({
            "name": "products",
            "method": "find_documents",
            "collection_name": "catalog",
            "db_name": "retail"
        }))
        .unwrap();
        assert_eq!(tool.method, Method::Find);
        assert_eq!(tool.target.as_ref().and_then(Target::db_name), Some("retail"));
    }

    #[test]
    fn list_collections_needs_no_target() {
        let tool = spec(json!({"name": "collections", "method": "list_collections"})).unwrap();
        assert_eq!(tool.method, Method::ListCollections);
        assert!(tool.target.is_none());
    }

    #[test]
    fn operator_aliases_are_canonicalised() {
        let tool = spec(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [
                {"param": "a", "operator": "$eq"},
                {"param": "b", "operator": "eq"},
                {"param": "c", "operator": "$in"},
                {"param": "d", "operator": "gte"},
                {"param": "e", "operator": "$lt"}
            ]
        }))
        .unwrap();
        let ops: Vec<_> = tool.parameters.iter().map(|p| p.operator).collect();
        assert_eq!(
            ops,
            [Operator::Equals, Operator::Equals, Operator::In, Operator::Gte, Operator::Lt]
        );
    }

    #[test]
    fn search_slot_defaults_param_name() {
        let tool = spec(json!({
            "name": "search",
            "collection_name": "c",
            "parameters": [{"attribute": "$vectorize"}]
        }))
        .unwrap();
        assert_eq!(
            tool.search_slot().map(ParameterSpec::source),
            Some(ParameterSource::SearchSlot(DEFAULT_SEARCH_PARAM))
        );
    }

    #[test]
    fn explicit_null_value_is_a_static_binding() {
        let tool = spec(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "archived", "attribute": "archived", "value": null}]
        }))
        .unwrap();
        assert_eq!(tool.parameters[0].value, Some(Value::Null));
        assert_eq!(tool.argument_parameters().count(), 0);
    }

    #[test]
    fn datatype_alias_and_unknown_keys() {
        let tool = spec(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "n", "datatype": "int", "info": "ignored"}]
        }))
        .unwrap();
        assert_eq!(tool.parameters[0].json_type(), "integer");
    }

    #[test]
    fn tags_accept_list_or_csv() {
        let a = spec(json!({"name": "a", "collection_name": "c", "tags": ["x", " y "]})).unwrap();
        let b = spec(json!({"name": "b", "collection_name": "c", "tags": "x, y,"})).unwrap();
        assert_eq!(a.tags, ["x", "y"]);
        assert_eq!(b.tags, ["x", "y"]);
    }

    #[test]
    fn rejects_invalid_documents() {
        let cases = [
            json!({"name": "", "collection_name": "c"}),
            json!({"name": "t"}),
            json!({"name": "t", "collection_name": "c", "table_name": "t"}),
            json!({"name": "t", "method": "delete", "collection_name": "c"}),
            json!({"name": "t", "collection_name": "c", "limit": 0}),
            json!({"name": "t", "collection_name": "c", "limit": -3}),
            json!({"name": "t", "collection_name": "c",
                   "parameters": [{"param": "a", "operator": "like"}]}),
            json!({"name": "t", "collection_name": "c",
                   "parameters": [{"attribute": "a", "value": 1, "expr": "now()"}]}),
            json!({"name": "t", "collection_name": "c",
                   "parameters": [{"attribute": "a", "value": null, "expr": "now()"}]}),
            json!({"name": "t", "collection_name": "c", "parameters": [{"required": true}]}),
            json!({"name": "t", "collection_name": "c", "parameters": [{"attribute": "a"}]}),
            json!({"name": "t", "collection_name": "c",
                   "parameters": [{"attribute": "$vector"}, {"attribute": "$vectorize"}]}),
            json!({"name": "t", "collection_name": "c",
                   "parameters": [{"attribute": "a", "expr": "open('/etc/passwd')"}]}),
            json!({"name": "t", "collection_name": "c", "parameters": "nope"}),
        ];
        for case in cases {
            assert!(spec(case.clone()).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn expression_error_names_the_parameter() {
        let err = spec(json!({
            "name": "recent",
            "collection_name": "c",
            "parameters": [{"attribute": "updated", "expr": "now( - 1"}]
        }))
        .unwrap_err();
        assert!(matches!(err, SpecError::Expression { ref param, .. } if param == "updated"));
    }
}
