use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

/// Structured predicate understood by every store.
///
/// Built either programmatically (the cascade resolver builds `Or` of `$in`
/// predicates) or parsed from the Mongo-style JSON accepted over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every record (`{}`)
    All,
    Where(FilterWhereInfo),
    And(Vec<Filter>),
    /// An empty `Or` matches nothing
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Where(FilterWhereInfo { column: column.into(), operator: FilterOp::Eq, data: value.into() })
    }

    /// `column IN values`; an empty set matches nothing
    pub fn any_of<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let data = Value::Array(values.into_iter().map(Into::into).collect());
        Filter::Where(FilterWhereInfo { column: column.into(), operator: FilterOp::In, data })
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq(crate::schema::ID_FIELD, Value::String(id.into()))
    }

    pub fn by_ids(ids: &[String]) -> Self {
        Self::any_of(crate::schema::ID_FIELD, ids.iter().cloned())
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Parse a JSON where-clause. `null` and `{}` mean "everything".
    pub fn from_json(where_data: &Value) -> Result<Self, FilterError> {
        match where_data {
            Value::Null => Ok(Filter::All),
            Value::Object(obj) => Self::parse_object(obj),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_object(obj: &Map<String, Value>) -> Result<Self, FilterError> {
        let mut parts = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                parts.push(Self::parse_logical_operator(key, value)?);
            } else {
                parts.extend(Self::parse_field_condition(key, value)?);
            }
        }
        Ok(match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }

    fn parse_logical_operator(op: &str, value: &Value) -> Result<Self, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let children = arr.iter().map(Self::from_json).collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "$and" { Filter::And(children) } else { Filter::Or(children) })
            }
            "$not" => Ok(Filter::Not(Box::new(Self::from_json(value)?))),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Vec<Self>, FilterError> {
        // Mongo clients send `_id`; records expose it as `id`
        let column = if field == "_id" { crate::schema::ID_FIELD } else { field };
        validate_column(column)?;

        match value {
            Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => obj
                .iter()
                .map(|(op_key, op_val)| {
                    let operator = Self::map_operator(op_key)?;
                    if matches!(operator, FilterOp::In | FilterOp::NIn) && !op_val.is_array() {
                        return Err(FilterError::InvalidOperatorData(format!("{} requires array", op_key)));
                    }
                    Ok(Filter::Where(FilterWhereInfo {
                        column: column.to_string(),
                        operator,
                        data: op_val.clone(),
                    }))
                })
                .collect(),
            // Implicit equality: { field: value }
            _ => Ok(vec![Filter::eq(column, value.clone())]),
        }
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    /// Evaluate against an in-memory document. Missing fields read as `null`.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Filter::All => true,
            Filter::Where(info) => {
                let actual = record.get(&info.column).unwrap_or(&Value::Null);
                match info.operator {
                    FilterOp::Eq => json_eq(actual, &info.data),
                    FilterOp::Ne => !json_eq(actual, &info.data),
                    FilterOp::In => as_set(&info.data).iter().any(|v| json_eq(actual, v)),
                    FilterOp::NIn => !as_set(&info.data).iter().any(|v| json_eq(actual, v)),
                    FilterOp::Gt => compare_values(actual, &info.data) == Some(Ordering::Greater),
                    FilterOp::Gte => matches!(compare_values(actual, &info.data), Some(Ordering::Greater | Ordering::Equal)),
                    FilterOp::Lt => compare_values(actual, &info.data) == Some(Ordering::Less),
                    FilterOp::Lte => matches!(compare_values(actual, &info.data), Some(Ordering::Less | Ordering::Equal)),
                }
            }
            Filter::And(children) => children.iter().all(|f| f.matches(record)),
            Filter::Or(children) => children.iter().any(|f| f.matches(record)),
            Filter::Not(inner) => !inner.matches(record),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

pub(crate) fn validate_column(column: &str) -> Result<(), FilterError> {
    let mut chars = column.chars();
    let valid = match chars.next() {
        Some(first) => (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FilterError::InvalidColumn(format!("Invalid column name format: {:?}", column)))
    }
}

fn as_set(data: &Value) -> &[Value] {
    match data {
        Value::Array(values) => values.as_slice(),
        other => std::slice::from_ref(other),
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
