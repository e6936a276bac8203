// @awa-component: QRY-ParameterResolver
//
//! Parameter Resolver.
//!
//! Walks a tool's parameters in declaration order and produces one filter
//! clause per applicable parameter, plus the search query if the tool has a
//! search slot. Static values and expressions never read caller input. An
//! argument explicitly set to `null` counts as absent, and so does an empty
//! search query.

use serde_json::{Map, Value};

use super::{Clause, Filter, QueryError};
use crate::expr::EvalContext;
use crate::spec::{ParameterSource, ToolSpec};

/// Caller-supplied arguments.
pub type Arguments = Map<String, Value>;

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub filter: Filter,
    pub search_query: Option<String>,
}

/// Caller value bound to `key`, if it counts as supplied.
pub(crate) fn supplied<'a>(args: &'a Arguments, key: &str, search_slot: bool) -> Option<&'a Value> {
    args.get(key)
        .filter(|v| !v.is_null())
        .filter(|v| !(search_slot && v.as_str().is_some_and(str::is_empty)))
}

/// Resolve `spec`'s parameters against `args`.
pub fn resolve(spec: &ToolSpec, args: &Arguments, ctx: &EvalContext) -> Result<Resolution, QueryError> {
    let mut resolution = Resolution::default();

    for parameter in &spec.parameters {
        match parameter.source() {
            ParameterSource::SearchSlot(key) => match supplied(args, key, true) {
                Some(Value::String(s)) => resolution.search_query = Some(s.clone()),
                Some(other) => resolution.search_query = Some(other.to_string()),
                None if parameter.required => {
                    return Err(QueryError::MissingParameter(key.to_string()));
                }
                None => {}
            },
            ParameterSource::Static(value) => {
                resolution.filter.insert(
                    parameter.attribute.clone(),
                    Clause::new(parameter.operator, value.clone()),
                );
            }
            ParameterSource::Expression(expr) => {
                let value = expr.evaluate(ctx).map_err(|source| QueryError::Expression {
                    param: parameter.attribute.clone(),
                    source,
                })?;
                resolution.filter.insert(
                    parameter.attribute.clone(),
                    Clause::new(parameter.operator, value.into_json()),
                );
            }
            ParameterSource::Argument(key) => match supplied(args, key, false) {
                Some(value) => resolution.filter.insert(
                    parameter.attribute.clone(),
                    Clause::new(parameter.operator, value.clone()),
                ),
                None if parameter.required => {
                    return Err(QueryError::MissingParameter(key.to_string()));
                }
                None => {}
            },
        }
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Operator;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn tool(value: Value) -> ToolSpec {
        ToolSpec::from_value(value).unwrap()
    }

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    fn ctx() -> EvalContext {
        EvalContext::at(Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap())
    }

    #[test]
    fn argument_parameters_become_clauses() {
        let spec = tool(json!({
            "name": "by_city",
            "table_name": "stores",
            "parameters": [
                {"param": "city", "required": true},
                {"param": "min_rating", "attribute": "rating", "operator": "gte"}
            ]
        }));
        let r = resolve(&spec, &args(json!({"city": "Austin", "min_rating": 4})), &ctx()).unwrap();
        assert_eq!(r.filter.get("city"), Some(&Clause::new(Operator::Equals, json!("Austin"))));
        assert_eq!(r.filter.get("rating"), Some(&Clause::new(Operator::Gte, json!(4))));
        assert_eq!(r.search_query, None);
    }

    #[test]
    fn optional_absent_or_null_arguments_are_omitted() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "color"}, {"param": "size"}]
        }));
        let r = resolve(&spec, &args(json!({"size": null})), &ctx()).unwrap();
        assert!(r.filter.is_empty());
    }

    #[test]
    fn missing_required_argument_fails() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "sku", "attribute": "product_sku", "required": true}]
        }));
        let err = resolve(&spec, &Arguments::new(), &ctx()).unwrap_err();
        assert_eq!(err.to_string(), "Parameter sku is required");
    }

    #[test]
    fn static_clause_ignores_caller_input() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "in_stock", "attribute": "in_stock", "value": true}]
        }));
        let empty = resolve(&spec, &Arguments::new(), &ctx()).unwrap();
        let overridden = resolve(&spec, &args(json!({"in_stock": false})), &ctx()).unwrap();
        assert_eq!(empty, overridden);
        assert_eq!(
            empty.filter.get("in_stock"),
            Some(&Clause::new(Operator::Equals, json!(true)))
        );
    }

    #[test]
    fn expression_is_evaluated_against_the_clock() {
        let spec = tool(json!({
            "name": "recent",
            "collection_name": "orders",
            "parameters": [{"attribute": "created_at", "operator": "gte", "expr": "now() - days(7)"}]
        }));
        let r = resolve(&spec, &args(json!({"created_at": "ignored"})), &ctx()).unwrap();
        assert_eq!(
            r.filter.get("created_at"),
            Some(&Clause::new(Operator::Gte, json!("2025-01-24T00:00:00.000Z")))
        );
    }

    #[test]
    fn expression_failure_is_reported() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"attribute": "d", "expr": "date('soon')"}]
        }));
        let err = resolve(&spec, &Arguments::new(), &ctx()).unwrap_err();
        assert!(matches!(err, QueryError::Expression { ref param, .. } if param == "d"));
    }

    #[test]
    fn search_slot_sets_query_and_emits_no_clause() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "q", "attribute": "$vectorize", "required": true}]
        }));
        let r = resolve(&spec, &args(json!({"q": "blue pants"})), &ctx()).unwrap();
        assert_eq!(r.search_query.as_deref(), Some("blue pants"));
        assert!(r.filter.is_empty());

        let err = resolve(&spec, &Arguments::new(), &ctx()).unwrap_err();
        assert!(matches!(err, QueryError::MissingParameter(p) if p == "q"));
    }

    #[test]
    fn empty_search_query_counts_as_absent() {
        let optional = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"attribute": "$vectorize"}]
        }));
        let r = resolve(&optional, &args(json!({"search_query": ""})), &ctx()).unwrap();
        assert_eq!(r.search_query, None);

        let required = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "q", "attribute": "$vectorize", "required": true}]
        }));
        let err = resolve(&required, &args(json!({"q": ""})), &ctx()).unwrap_err();
        assert!(matches!(err, QueryError::MissingParameter(p) if p == "q"));
    }

    #[test]
    fn explicit_null_value_ignores_caller_input() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [{"param": "archived", "attribute": "archived", "value": null}]
        }));
        let empty = resolve(&spec, &Arguments::new(), &ctx()).unwrap();
        let overridden = resolve(&spec, &args(json!({"archived": true})), &ctx()).unwrap();
        assert_eq!(empty, overridden);
        assert_eq!(
            empty.filter.get("archived"),
            Some(&Clause::new(Operator::Equals, Value::Null))
        );
    }

    #[test]
    fn last_write_wins_on_shared_attribute() {
        let spec = tool(json!({
            "name": "t",
            "collection_name": "c",
            "parameters": [
                {"param": "status", "attribute": "status", "value": "draft"},
                {"param": "state", "attribute": "status"}
            ]
        }));
        let r = resolve(&spec, &args(json!({"state": "live"})), &ctx()).unwrap();
        assert_eq!(r.filter.get("status"), Some(&Clause::new(Operator::Equals, json!("live"))));

        let r = resolve(&spec, &Arguments::new(), &ctx()).unwrap();
        assert_eq!(r.filter.get("status"), Some(&Clause::new(Operator::Equals, json!("draft"))));
    }
}
