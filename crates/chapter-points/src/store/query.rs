use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::engine::value::{compare_values, resolve_path, strict_equals};

use super::Document;

/// Comparison supported by store filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Conjunctive filter list with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(document))
    }

    /// Order and truncate an already filtered result set in place.
    pub fn arrange<T>(&self, rows: &mut Vec<T>, data: impl Fn(&T) -> &Document) {
        if let Some(order) = &self.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_path(data(a), data(b), &order.field);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
    }
}

fn compare_path(left: &Document, right: &Document, path: &str) -> Ordering {
    compare_values(resolve_field(left, path), resolve_field(right, path))
}

/// Dotted lookup starting at a document's top-level map.
pub fn resolve_field<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let top = document.get(head)?;
    match rest {
        Some(rest) => resolve_path(top, rest),
        None => Some(top),
    }
}

impl Filter {
    fn matches(&self, document: &Document) -> bool {
        let actual = resolve_field(document, &self.field);
        match self.op {
            FilterOp::Eq => strict_equals(actual, Some(&self.value)),
            FilterOp::Ne => actual.is_some() && !strict_equals(actual, Some(&self.value)),
            FilterOp::Lt => comparable(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                comparable(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => comparable(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                comparable(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::In => match &self.value {
                Value::Array(items) => items.iter().any(|item| strict_equals(actual, Some(item))),
                _ => false,
            },
            FilterOp::ArrayContains => match actual {
                Some(Value::Array(items)) => {
                    items.iter().any(|item| strict_equals(Some(item), Some(&self.value)))
                }
                _ => false,
            },
        }
    }
}

/// Range filters only compare values of the same kind, like document databases do.
fn comparable(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_)) => Some(compare_values(actual, Some(expected))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn filters_are_conjunctive() {
        let query = Query::all()
            .where_eq("trigger", "event_attendance")
            .where_eq("enabled", true);
        assert!(query.matches(&doc(json!({ "trigger": "event_attendance", "enabled": true }))));
        assert!(!query.matches(&doc(json!({ "trigger": "event_attendance", "enabled": false }))));
        assert!(!query.matches(&doc(json!({ "enabled": true }))));
    }

    #[test]
    fn range_filters_skip_mismatched_types() {
        let query = Query::all().filter("date", FilterOp::Gte, "2025-01-01");
        assert!(query.matches(&doc(json!({ "date": "2025-03-04" }))));
        assert!(!query.matches(&doc(json!({ "date": "2024-12-31" }))));
        assert!(!query.matches(&doc(json!({ "date": 20250304 }))));
    }

    #[test]
    fn membership_filters() {
        let query = Query::all().filter("status", FilterOp::In, json!(["active", "probation"]));
        assert!(query.matches(&doc(json!({ "status": "probation" }))));
        assert!(!query.matches(&doc(json!({ "status": "alumni" }))));

        let tagged = Query::all().filter("badges", FilterOp::ArrayContains, "first-event");
        assert!(tagged.matches(&doc(json!({ "badges": ["first-event"] }))));
        assert!(!tagged.matches(&doc(json!({ "badges": "first-event" }))));
    }

    #[test]
    fn arrange_orders_and_limits() {
        let mut rows = vec![
            doc(json!({ "n": 3 })),
            doc(json!({ "n": 1 })),
            doc(json!({ "n": 2 })),
        ];
        Query::all()
            .order_by("n", Direction::Descending)
            .limit(2)
            .arrange(&mut rows, |row| row);
        let values: Vec<_> = rows.iter().map(|row| row["n"].clone()).collect();
        assert_eq!(values, [json!(3), json!(2)]);
    }
}
