//! Document filters.
//!
//! Filters are evaluated by scanning a collection; the store keeps no
//! secondary indexes beyond the unique index.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::Document;

/// A filter expression over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals a value. `Null` also matches a missing field.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Numeric field within `[min, max]`, both ends inclusive.
    Between {
        /// Field name.
        field: String,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// Equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Inclusive numeric range filter.
    pub fn between(field: impl Into<String>, min: i64, max: i64) -> Self {
        Filter::Between {
            field: field.into(),
            min,
            max,
        }
    }

    /// Combine with another filter; both must match.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluate this filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => match doc.get(field) {
                Some(fv) => values_equal(fv, value),
                None => value.is_null(),
            },
            Filter::Between { field, min, max } => match doc.get(field) {
                Some(fv) => {
                    compare_number(fv, *min).is_some_and(Ordering::is_ge)
                        && compare_number(fv, *max).is_some_and(Ordering::is_le)
                }
                None => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Check if two values are equal. Numbers compare by value, not representation.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => a == b,
    }
}

fn compare_number(value: &Value, bound: i64) -> Option<Ordering> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.cmp(&bound)),
            None => n.as_f64().and_then(|f| f.partial_cmp(&(bound as f64))),
        },
        _ => None,
    }
}
