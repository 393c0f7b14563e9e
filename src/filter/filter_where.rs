use serde_json::Value;

use super::error::FilterError;
use super::filter::{validate_column, Filter};
use super::types::{FilterOp, FilterWhereInfo, SqlParam};
use crate::schema::is_reference_column;

/// Renders a [`Filter`] into a Postgres WHERE clause with `$n` placeholders.
///
/// Identifier columns (`id`, `addedBy`, `userId`, ...) are compared as plain
/// text so their indexes apply; a membership test binds one `text[]` and
/// uses `= ANY`. Everything else is compared as `to_jsonb(column)` against a
/// `jsonb` parameter, so a single parameter type covers text, numeric,
/// boolean and timestamp columns.
pub struct FilterWhere<'a> {
    table: &'a str,
    param_values: Vec<SqlParam>,
    param_offset: usize,
}

impl<'a> FilterWhere<'a> {
    pub fn new(table: &'a str, starting_param_index: usize) -> Self {
        Self { table, param_values: vec![], param_offset: starting_param_index }
    }

    /// `starting_param_index` is the number of parameters already bound by
    /// the enclosing statement; the first placeholder emitted is one past it.
    pub fn generate(filter: &Filter, table: &str, starting_param_index: usize) -> Result<(String, Vec<SqlParam>), FilterError> {
        let mut filter_where = FilterWhere::new(table, starting_param_index);
        let sql = filter_where.build(filter)?;
        Ok((sql, filter_where.param_values))
    }

    fn build(&mut self, filter: &Filter) -> Result<String, FilterError> {
        match filter {
            Filter::All => Ok("1=1".to_string()),
            Filter::Where(info) => self.build_sql_condition(info),
            Filter::And(children) => self.join(children, " AND ", "1=1"),
            Filter::Or(children) => self.join(children, " OR ", "1=0"),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.build(inner)?)),
        }
    }

    fn join(&mut self, children: &[Filter], joiner: &str, empty: &str) -> Result<String, FilterError> {
        if children.is_empty() {
            return Ok(empty.to_string());
        }
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(format!("({})", self.build(child)?));
        }
        Ok(parts.join(joiner))
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        validate_column(&condition.column)?;
        let column = format!("\"{}\".\"{}\"", self.table, condition.column);
        let data = &condition.data;
        let text_column = is_reference_column(&condition.column);

        let sql = match (condition.operator, data) {
            (FilterOp::Eq, Value::Null) => format!("{} IS NULL", column),
            (FilterOp::Ne, Value::Null) => format!("{} IS NOT NULL", column),
            (FilterOp::Eq, Value::String(s)) if text_column => {
                format!("{} = {}", column, self.bind(SqlParam::Text(s.clone())))
            }
            (FilterOp::Ne, Value::String(s)) if text_column => {
                format!("{} IS DISTINCT FROM {}", column, self.bind(SqlParam::Text(s.clone())))
            }
            (FilterOp::Eq, _) => format!("to_jsonb({}) = {}", column, self.bind_json(data)),
            (FilterOp::Ne, _) => format!("to_jsonb({}) IS DISTINCT FROM {}", column, self.bind_json(data)),
            (FilterOp::Gt, _) => format!("to_jsonb({}) > {}", column, self.bind_json(data)),
            (FilterOp::Gte, _) => format!("to_jsonb({}) >= {}", column, self.bind_json(data)),
            (FilterOp::Lt, _) => format!("to_jsonb({}) < {}", column, self.bind_json(data)),
            (FilterOp::Lte, _) => format!("to_jsonb({}) <= {}", column, self.bind_json(data)),
            (FilterOp::In | FilterOp::NIn, _) => {
                let values = data.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!("{:?} requires an array", condition.operator))
                })?;
                let negate = condition.operator == FilterOp::NIn;
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let texts: Option<Vec<String>> = values.iter().map(|v| v.as_str().map(String::from)).collect();
                match texts {
                    Some(texts) if text_column => {
                        let param = self.bind(SqlParam::TextArray(texts));
                        if negate {
                            format!("({c} IS NULL OR {c} <> ALL({p}))", c = column, p = param)
                        } else {
                            format!("{} = ANY({})", column, param)
                        }
                    }
                    // One jsonb array parameter however many values there are
                    _ => {
                        let param = self.bind_json(data);
                        if negate {
                            format!("({c} IS NULL OR to_jsonb({c}) NOT IN (SELECT jsonb_array_elements({p})))", c = column, p = param)
                        } else {
                            format!("to_jsonb({}) IN (SELECT jsonb_array_elements({}))", column, param)
                        }
                    }
                }
            }
        };
        Ok(sql)
    }

    fn bind_json(&mut self, value: &Value) -> String {
        self.bind(SqlParam::Json(value.clone()))
    }

    fn bind(&mut self, param: SqlParam) -> String {
        self.param_values.push(param);
        format!("${}", self.param_offset + self.param_values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_renders_tautology() {
        let (sql, params) = FilterWhere::generate(&Filter::All, "trips", 0).unwrap();
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn equality_binds_jsonb_parameter() {
        let (sql, params) = FilterWhere::generate(&Filter::eq("tripKind", "bus"), "trips", 0).unwrap();
        assert_eq!(sql, "to_jsonb(\"trips\".\"tripKind\") = $1");
        assert_eq!(params, vec![SqlParam::Json(json!("bus"))]);
    }

    #[test]
    fn identifier_equality_compares_text() {
        let (sql, params) = FilterWhere::generate(&Filter::by_id("t1"), "trips", 0).unwrap();
        assert_eq!(sql, "\"trips\".\"id\" = $1");
        assert_eq!(params, vec![SqlParam::Text("t1".to_string())]);
    }

    #[test]
    fn membership_binds_one_array_per_field() {
        let ids: Vec<String> = (0..30_000).map(|i| format!("u{}", i)).collect();
        let filter = Filter::or(
            ["userId", "addedBy", "updatedBy"]
                .iter()
                .map(|field| Filter::any_of(*field, ids.iter().cloned()))
                .collect(),
        );
        let (sql, params) = FilterWhere::generate(&filter, "user_tokens", 1).unwrap();
        assert_eq!(
            sql,
            "(\"user_tokens\".\"userId\" = ANY($2)) OR (\"user_tokens\".\"addedBy\" = ANY($3)) OR (\"user_tokens\".\"updatedBy\" = ANY($4))"
        );
        assert_eq!(params.len(), 3);
        assert!(matches!(&params[0], SqlParam::TextArray(values) if values.len() == 30_000));
    }

    #[test]
    fn membership_on_other_columns_uses_one_jsonb_array() {
        let filter = Filter::from_json(&json!({ "distance": { "$in": [1, 2, 3] } })).unwrap();
        let (sql, params) = FilterWhere::generate(&filter, "trips", 0).unwrap();
        assert_eq!(sql, "to_jsonb(\"trips\".\"distance\") IN (SELECT jsonb_array_elements($1))");
        assert_eq!(params, vec![SqlParam::Json(json!([1, 2, 3]))]);
    }

    #[test]
    fn empty_sets_short_circuit() {
        let (sql, _) = FilterWhere::generate(&Filter::any_of("id", Vec::<String>::new()), "users", 0).unwrap();
        assert_eq!(sql, "1=0");
        let (sql, _) = FilterWhere::generate(&Filter::or(vec![]), "users", 0).unwrap();
        assert_eq!(sql, "1=0");
        let (sql, _) = FilterWhere::generate(&Filter::and(vec![]), "users", 0).unwrap();
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn null_equality_uses_is_null() {
        let filter = Filter::from_json(&json!({ "parentCategoryId": null, "name": { "$ne": null } })).unwrap();
        let (sql, params) = FilterWhere::generate(&filter, "categories", 0).unwrap();
        assert!(sql.contains("\"categories\".\"parentCategoryId\" IS NULL"));
        assert!(sql.contains("\"categories\".\"name\" IS NOT NULL"));
        assert!(params.is_empty());
    }

    #[test]
    fn not_in_tolerates_null_columns() {
        let filter = Filter::from_json(&json!({ "roleId": { "$nin": ["r1"] } })).unwrap();
        let (sql, _) = FilterWhere::generate(&filter, "user_roles", 0).unwrap();
        assert_eq!(
            sql,
            "(\"user_roles\".\"roleId\" IS NULL OR \"user_roles\".\"roleId\" <> ALL($1))"
        );
    }

    #[test]
    fn mixed_identifier_values_fall_back_to_jsonb() {
        let filter = Filter::from_json(&json!({ "id": { "$in": ["a", 7] } })).unwrap();
        let (sql, _) = FilterWhere::generate(&filter, "trips", 0).unwrap();
        assert_eq!(sql, "to_jsonb(\"trips\".\"id\") IN (SELECT jsonb_array_elements($1))");
    }

    #[test]
    fn rejects_injected_column_names() {
        let filter = Filter::eq("id\" OR 1=1 --", "x");
        assert!(matches!(
            FilterWhere::generate(&filter, "users", 0),
            Err(FilterError::InvalidColumn(_))
        ));
    }
}
