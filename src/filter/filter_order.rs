use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter::{compare_values, validate_column};
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // ["createdAt desc", "name asc"]
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)),
                        other => {
                            return Err(FilterError::InvalidWhereClause(format!("Invalid sort entry: {}", other)))
                        }
                    }
                }
                out
            }
            Value::Object(obj) => Self::parse_order_object(obj),
            other => return Err(FilterError::InvalidWhereClause(format!("Invalid sort: {}", other))),
        };

        for info in &infos {
            validate_column(&info.column)?;
        }
        Ok(infos)
    }

    /// `{ "createdAt": -1, "name": "asc" }`; numeric directions follow Mongo
    fn parse_order_object(obj: &Map<String, Value>) -> Vec<FilterOrderInfo> {
        obj.iter()
            .map(|(k, v)| {
                let sort = match v {
                    Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                    Value::String(s) if s.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    _ => SortDirection::Asc,
                };
                FilterOrderInfo { column: Self::column_name(k), sort }
            })
            .collect()
    }

    fn parse_order_string(s: &str) -> Vec<FilterOrderInfo> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let (col, sort) = match col.strip_prefix('-') {
                    Some(stripped) => (stripped, SortDirection::Desc),
                    None => {
                        let dir = it.next().unwrap_or("asc");
                        let sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                        (col, sort)
                    }
                };
                out.push(FilterOrderInfo { column: Self::column_name(col), sort });
            }
        }
        out
    }

    fn column_name(raw: &str) -> String {
        if raw == "_id" { crate::schema::ID_FIELD.to_string() } else { raw.to_string() }
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> Result<String, FilterError> {
        if infos.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(infos.len());
        for info in infos {
            validate_column(&info.column)?;
            parts.push(format!("\"{}\" {}", info.column, info.sort.to_sql()));
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }

    /// In-memory counterpart of [`FilterOrder::generate`]; nulls sort last
    pub fn compare(a: &Map<String, Value>, b: &Map<String, Value>, infos: &[FilterOrderInfo]) -> Ordering {
        for info in infos {
            let left = a.get(&info.column).unwrap_or(&Value::Null);
            let right = b.get(&info.column).unwrap_or(&Value::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_values(left, right).unwrap_or(Ordering::Equal);
                    if info.sort == SortDirection::Desc { ord.reverse() } else { ord }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_array_and_object_forms() {
        let from_string = FilterOrder::validate_and_parse(&json!("createdAt desc, name")).unwrap();
        assert_eq!(from_string.len(), 2);
        assert_eq!(from_string[0].sort, SortDirection::Desc);
        assert_eq!(from_string[1].sort, SortDirection::Asc);

        let from_array = FilterOrder::validate_and_parse(&json!(["-createdAt"])).unwrap();
        assert_eq!(from_array[0].column, "createdAt");
        assert_eq!(from_array[0].sort, SortDirection::Desc);

        let from_object = FilterOrder::validate_and_parse(&json!({ "_id": -1 })).unwrap();
        assert_eq!(from_object[0].column, "id");
        assert_eq!(from_object[0].sort, SortDirection::Desc);
    }

    #[test]
    fn generates_order_by() {
        let infos = FilterOrder::validate_and_parse(&json!({ "name": "asc" })).unwrap();
        assert_eq!(FilterOrder::generate(&infos).unwrap(), "ORDER BY \"name\" ASC");
        assert_eq!(FilterOrder::generate(&[]).unwrap(), "");
    }

    #[test]
    fn rejects_bad_columns() {
        assert!(FilterOrder::validate_and_parse(&json!("name; drop table users")).is_err());
    }

    #[test]
    fn compare_sorts_documents() {
        let infos = FilterOrder::validate_and_parse(&json!("distance desc")).unwrap();
        let mut docs: Vec<Map<String, Value>> = vec![
            json!({ "distance": 1 }).as_object().cloned().unwrap(),
            json!({}).as_object().cloned().unwrap(),
            json!({ "distance": 7 }).as_object().cloned().unwrap(),
        ];
        docs.sort_by(|a, b| FilterOrder::compare(a, b, &infos));
        assert_eq!(docs[0]["distance"], json!(7));
        assert_eq!(docs[1]["distance"], json!(1));
        assert!(docs[2].get("distance").is_none());
    }
}
