//! JSON representation of a [`QuerySpec`].
//!
//! ```json
//! {
//!   "select": ["id", "name"],
//!   "where": [
//!     { "field": "status", "op": "eq", "value": "active" },
//!     { "field": "age", "op": "between", "value": [18, 30] }
//!   ],
//!   "sort": ["-created_at"],
//!   "limit": 10,
//!   "offset": 0
//! }
//! ```
//!
//! Every key is optional. Conditions are applied in order, so a repeated field keeps
//! the position of its first occurrence and the value of its last.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::query::{Condition, Op, QuerySpec, Range, Value};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed query :: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("unsupported value `{value}` for `{field}`")]
    UnsupportedValue { field: String, value: Json },
    #[error("`{op}` on `{field}` expects {expected}")]
    Shape {
        field: String,
        op: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQuery {
    #[serde(default)]
    select: Vec<String>,
    #[serde(default, rename = "where")]
    conditions: Vec<RawCondition>,
    #[serde(default)]
    sort: Vec<String>,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCondition {
    field: String,
    op: String,
    value: Json,
}

pub fn query_spec_from_str(s: &str) -> Result<QuerySpec, Error> {
    query_spec_from_serde_value(serde_json::from_str(s)?)
}

/// Builds a [`QuerySpec`] from its JSON form.
///
/// Only the shape is checked here; field names and bounds are left to
/// [`QuerySpec::validate`].
pub fn query_spec_from_serde_value(v: Json) -> Result<QuerySpec, Error> {
    let raw: RawQuery = serde_json::from_value(v)?;

    let mut spec = QuerySpec::new()
        .select(raw.select)
        .sort(raw.sort)
        .limit(raw.limit)
        .offset(raw.offset);

    for c in raw.conditions {
        spec = spec.filter(condition(c)?);
    }

    Ok(spec)
}

fn condition(raw: RawCondition) -> Result<Condition, Error> {
    let RawCondition { field, op, value } = raw;

    let op = match op.to_lowercase().as_str() {
        "eq" => Op::Eq(scalar(&field, value)?),
        "in" => {
            let Json::Array(items) = value else {
                return Err(shape(&field, "in", "an array"));
            };
            Op::In(
                items
                    .into_iter()
                    .map(|v| scalar(&field, v))
                    .collect::<Result<_, _>>()?,
            )
        }
        "like" => match value {
            Json::String(pattern) => Op::Like(pattern),
            _ => return Err(shape(&field, "like", "a string pattern")),
        },
        "between" => {
            let Json::Array(items) = value else {
                return Err(shape(&field, "between", "a [low, high] pair"));
            };
            let [low, high]: [Json; 2] = items
                .try_into()
                .map_err(|_| shape(&field, "between", "a [low, high] pair"))?;
            Op::Between(Range::new(scalar(&field, low)?, scalar(&field, high)?))
        }
        _ => return Err(Error::UnknownOperator(op)),
    };

    Ok(Condition::new(field, op))
}

fn shape(field: &str, op: &'static str, expected: &'static str) -> Error {
    Error::Shape {
        field: field.to_owned(),
        op,
        expected,
    }
}

fn scalar(field: &str, v: Json) -> Result<Value, Error> {
    let value = match &v {
        Json::Bool(b) => Some(Value::Boolean(*b)),
        Json::String(s) => Some(Value::Text(s.clone())),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        _ => None,
    };

    value.ok_or_else(|| Error::UnsupportedValue {
        field: field.to_owned(),
        value: v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::to_sql;
    use serde_json::json;

    #[test]
    fn reference_query() {
        let spec = query_spec_from_serde_value(json!({
            "where": [
                { "field": "status", "op": "eq", "value": "active" },
                { "field": "age", "op": "between", "value": [18, 30] }
            ],
            "sort": ["-created_at"],
            "limit": 10
        }))
        .unwrap();

        let clause = to_sql(&spec).unwrap();
        assert_eq!(
            clause.clause,
            "WHERE status = $1 AND age BETWEEN $2 AND $3 ORDER BY created_at DESC LIMIT 10"
        );
        assert_eq!(
            clause.values,
            vec![Value::from("active"), Value::Integer(18), Value::Integer(30)]
        );
    }

    #[test]
    fn all_operators() {
        let spec = query_spec_from_str(
            r#"{
                "select": ["name"],
                "where": [
                    { "field": "tag", "op": "IN", "value": ["a", "b"] },
                    { "field": "name", "op": "like", "value": "ad%" },
                    { "field": "score", "op": "eq", "value": 1.5 },
                    { "field": "active", "op": "eq", "value": true }
                ],
                "offset": 4
            }"#,
        )
        .unwrap();

        assert_eq!(spec.projection, vec!["name".to_owned()]);
        assert_eq!(spec.offset, 4);
        assert_eq!(
            spec.conditions.get("tag"),
            Some(&Op::In(vec!["a".into(), "b".into()]))
        );
        assert_eq!(spec.conditions.get("name"), Some(&Op::Like("ad%".into())));
        assert_eq!(spec.conditions.get("score"), Some(&Op::Eq(Value::Float(1.5))));
        assert_eq!(spec.conditions.get("active"), Some(&Op::Eq(true.into())));
    }

    #[test]
    fn repeated_field_overwrites() {
        let spec = query_spec_from_serde_value(json!({
            "where": [
                { "field": "a", "op": "eq", "value": 1 },
                { "field": "b", "op": "eq", "value": 2 },
                { "field": "a", "op": "eq", "value": 3 }
            ]
        }))
        .unwrap();

        let fields: Vec<&str> = spec.conditions.iter().map(|c| c.field()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(spec.conditions.get("a"), Some(&Op::Eq(Value::Integer(3))));
    }

    #[test]
    fn malformed_queries() {
        let parse = |v: Json| query_spec_from_serde_value(v).unwrap_err();

        assert!(matches!(
            parse(json!({ "where": [{ "field": "a", "op": "gt", "value": 1 }] })),
            Error::UnknownOperator(_)
        ));
        assert!(matches!(
            parse(json!({ "where": [{ "field": "a", "op": "between", "value": [1] }] })),
            Error::Shape { .. }
        ));
        assert!(matches!(
            parse(json!({ "where": [{ "field": "a", "op": "in", "value": 1 }] })),
            Error::Shape { .. }
        ));
        assert!(matches!(
            parse(json!({ "where": [{ "field": "a", "op": "eq", "value": null }] })),
            Error::UnsupportedValue { .. }
        ));
        assert!(matches!(parse(json!({ "filter": [] })), Error::Json(_)));
    }
}
