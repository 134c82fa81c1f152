//! Row filters, ordering and query descriptors.
//!
//! Filters are plain data so they can be rendered as REST parameters,
//! evaluated in process by the embedded backend, and persisted inside queued
//! mutations.

use super::row::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { column: String, value: Value },
    Neq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    Gte { column: String, value: Value },
    Lte { column: String, value: Value },
    IsNull { column: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. }
            | Self::Neq { column, .. }
            | Self::In { column, .. }
            | Self::Gte { column, .. }
            | Self::Lte { column, .. }
            | Self::IsNull { column } => column,
        }
    }

    /// Evaluates the filter against one row; missing columns read as null.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Eq { value, .. } => values_equal(cell, value),
            Self::Neq { value, .. } => !cell.is_null() && !values_equal(cell, value),
            Self::In { values, .. } => values.iter().any(|value| values_equal(cell, value)),
            Self::Gte { value, .. } => matches!(
                compare_values(cell, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lte { value, .. } => matches!(
                compare_values(cell, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::IsNull { .. } => cell.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Select descriptor: table, conjunctive filters, ordering and limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    /// Filters, sorts and truncates `rows` the way the hosted store would.
    ///
    /// Sorting is stable, so rows equal on every order column keep input
    /// order. Nulls sort last in both directions.
    pub fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        let mut selected = rows
            .into_iter()
            .filter(|row| self.matches(row))
            .collect::<Vec<_>>();

        if !self.order.is_empty() {
            selected.sort_by(|left, right| self.compare_rows(left, right));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit as usize);
        }
        selected
    }

    fn compare_rows(&self, left: &Row, right: &Row) -> Ordering {
        for order in &self.order {
            let left_cell = left.get(&order.column).unwrap_or(&Value::Null);
            let right_cell = right.get(&order.column).unwrap_or(&Value::Null);
            let ordering = match (left_cell.is_null(), right_cell.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let natural = compare_values(left_cell, right_cell).unwrap_or(Ordering::Equal);
                    match order.direction {
                        Direction::Asc => natural,
                        Direction::Desc => natural.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Filter, Query};
    use crate::gateway::row::Row;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            row(json!({"id": "a", "status": "active", "acquired_at": 30, "box": null})),
            row(json!({"id": "b", "status": "sold", "acquired_at": 10, "box": "inpa"})),
            row(json!({"id": "c", "status": "active", "acquired_at": 20.0, "box": "af"})),
        ]
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|row| row["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn eq_and_range_filters_combine_conjunctively() {
        let query = Query::table("hives")
            .filter(Filter::eq("status", "active"))
            .filter(Filter::gte("acquired_at", 20));
        assert_eq!(ids(&query.apply(rows())), vec!["a", "c"]);

        let query = Query::table("hives").filter(Filter::lte("acquired_at", 20));
        assert_eq!(ids(&query.apply(rows())), vec!["b", "c"]);
    }

    #[test]
    fn numeric_equality_ignores_integer_float_representation() {
        let query = Query::table("hives").filter(Filter::eq("acquired_at", 20));
        assert_eq!(ids(&query.apply(rows())), vec!["c"]);
    }

    #[test]
    fn in_neq_and_is_null_filters() {
        let query = Query::table("hives").filter(Filter::is_in("id", ["a", "b"]));
        assert_eq!(ids(&query.apply(rows())), vec!["a", "b"]);

        let query = Query::table("hives").filter(Filter::neq("box", "inpa"));
        assert_eq!(ids(&query.apply(rows())), vec!["c"]);

        let query = Query::table("hives").filter(Filter::is_null("box"));
        assert_eq!(ids(&query.apply(rows())), vec!["a"]);
    }

    #[test]
    fn ordering_puts_nulls_last_and_limit_truncates() {
        let query = Query::table("hives").order_by("box", Direction::Desc);
        assert_eq!(ids(&query.apply(rows())), vec!["b", "c", "a"]);

        let query = Query::table("hives")
            .order_by("acquired_at", Direction::Desc)
            .limit(2);
        assert_eq!(ids(&query.apply(rows())), vec!["a", "c"]);
    }

    #[test]
    fn filters_serialize_with_op_tag() {
        let filter = Filter::eq("hive_id", "x");
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value, json!({"op": "eq", "column": "hive_id", "value": "x"}));
    }
}
