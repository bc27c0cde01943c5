//! Count filters understood by every backend.

use crate::value::{Document, Value};

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    GreaterOrEqual,
    LessThan,
}

/// A single field predicate.
///
/// A document lacking the field, or holding a value of a different type,
/// never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Equal,
            value: value.into(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::GreaterOrEqual,
            value: value.into(),
        }
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::LessThan,
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        let Some(ordering) = actual.compare(&self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => ordering.is_eq(),
            FilterOp::GreaterOrEqual => ordering.is_ge(),
            FilterOp::LessThan => ordering.is_lt(),
        }
    }
}

/// Conjunction of filters; an empty query counts every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountQuery {
    pub filters: Vec<Filter>,
}

impl CountQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}
