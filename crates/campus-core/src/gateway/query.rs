//! Table filters and query shapes passed to the Gateway.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A conjunction of column equality predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns true when every clause matches the given row.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }
}

/// Renders a filter value the way the backend's query syntax expects it.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for Filter {
    /// Formats as `col=eq.value` clauses joined by `&`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .clauses
            .iter()
            .map(|(column, value)| format!("{}=eq.{}", column, render_value(value)))
            .collect();
        write!(f, "{}", rendered.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    /// Compares two rows on the ordered column, honoring direction.
    ///
    /// Numbers compare numerically, everything else by rendered text (RFC 3339
    /// timestamps sort correctly this way). Missing columns sort first.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = match (a.get(&self.column), b.get(&self.column)) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => {
                let x = x.as_f64().unwrap_or_default();
                let y = y.as_f64().unwrap_or_default();
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Some(x), Some(y)) => render_value(x).cmp(&render_value(y)),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// A select request: filter, optional ordering, optional column projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<Order>,
    /// Column projection; `None` selects `*`. May embed joins such as
    /// `profiles(full_name, avatar_url)`.
    pub columns: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = self.filter.and_eq(column, value);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_display_matches_backend_syntax() {
        let filter = Filter::eq("user_id", "u-1").and_eq("is_read", false);
        assert_eq!(filter.to_string(), "user_id=eq.u-1&is_read=eq.false");
    }

    #[test]
    fn test_filter_matches_requires_every_clause() {
        let filter = Filter::eq("user_id", "u-1").and_eq("is_read", false);
        assert!(filter.matches(&json!({"user_id": "u-1", "is_read": false, "id": "n1"})));
        assert!(!filter.matches(&json!({"user_id": "u-1", "is_read": true})));
        assert!(!filter.matches(&json!({"is_read": false})));
        assert!(Filter::all().matches(&json!({})));
    }
}
