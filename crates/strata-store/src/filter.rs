//! Filter expression algebra.
//!
//! Every query the revision engine sends to storage is expressed in this
//! algebra: boolean composition (`and`, `or`, `not`) over three leaf
//! predicates (`exact_match`, `match_any`, `range`). Fields are dotted paths
//! into the document source; multi-valued fields match when any value does.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::document::resolve_path;

/// A boolean filter over document sources.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// Matches every document.
    MatchAll,
    /// Matches no document.
    MatchNone,
    /// The field holds exactly `value`.
    ExactMatch { field: String, value: Value },
    /// The field holds any of `values`.
    MatchAny { field: String, values: Vec<Value> },
    /// The field holds a value inside the inclusive `[from, to]` bounds.
    /// A missing bound is unbounded on that side.
    Range {
        field: String,
        from: Option<Value>,
        to: Option<Value>,
    },
    /// All children match. Empty means match-all.
    And(Vec<Expression>),
    /// At least one child matches. Empty means match-none.
    Or(Vec<Expression>),
    /// The child does not match.
    Not(Box<Expression>),
}

impl Expression {
    /// `field == value`.
    pub fn exact_match(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::ExactMatch {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field IN values`.
    pub fn match_any<V, I>(field: impl Into<String>, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Expression::MatchAny {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `from <= field <= to`.
    pub fn range(field: impl Into<String>, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Expression::Range {
            field: field.into(),
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    /// Conjunction, flattening nested `And`s and dropping `MatchAll`.
    pub fn and(children: impl IntoIterator<Item = Expression>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Expression::MatchAll => {}
                Expression::MatchNone => return Expression::MatchNone,
                Expression::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expression::MatchAll,
            1 => flat.pop().unwrap_or(Expression::MatchAll),
            _ => Expression::And(flat),
        }
    }

    /// Disjunction, flattening nested `Or`s and dropping `MatchNone`.
    pub fn or(children: impl IntoIterator<Item = Expression>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Expression::MatchNone => {}
                Expression::MatchAll => return Expression::MatchAll,
                Expression::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expression::MatchNone,
            1 => flat.pop().unwrap_or(Expression::MatchNone),
            _ => Expression::Or(flat),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Self {
        match child {
            Expression::MatchAll => Expression::MatchNone,
            Expression::MatchNone => Expression::MatchAll,
            Expression::Not(inner) => *inner,
            other => Expression::Not(Box::new(other)),
        }
    }

    /// Evaluate this expression against a document source.
    pub fn matches(&self, source: &Map<String, Value>) -> bool {
        match self {
            Expression::MatchAll => true,
            Expression::MatchNone => false,
            Expression::ExactMatch { field, value } => {
                resolve_path(source, field).into_iter().any(|v| v == value)
            }
            Expression::MatchAny { field, values } => resolve_path(source, field)
                .into_iter()
                .any(|v| values.iter().any(|candidate| candidate == v)),
            Expression::Range { field, from, to } => {
                resolve_path(source, field).into_iter().any(|v| {
                    let above = from
                        .as_ref()
                        .map_or(true, |f| matches!(compare(v, f), Some(Ordering::Greater | Ordering::Equal)));
                    let below = to
                        .as_ref()
                        .map_or(true, |t| matches!(compare(v, t), Some(Ordering::Less | Ordering::Equal)));
                    above && below
                })
            }
            Expression::And(children) => children.iter().all(|c| c.matches(source)),
            Expression::Or(children) => children.iter().any(|c| c.matches(source)),
            Expression::Not(child) => !child.matches(source),
        }
    }
}

/// Order two JSON scalars of the same kind. Mixed kinds are incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn src(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn exact_match() {
        let s = src(json!({"id": "1", "active": true}));
        assert!(Expression::exact_match("id", "1").matches(&s));
        assert!(!Expression::exact_match("id", "2").matches(&s));
        assert!(Expression::exact_match("active", true).matches(&s));
    }

    #[test]
    fn match_any_on_multi_valued_field() {
        let s = src(json!({"tags": ["x", "y"]}));
        assert!(Expression::match_any("tags", ["z", "y"]).matches(&s));
        assert!(!Expression::match_any("tags", ["z"]).matches(&s));
        assert!(!Expression::match_any("tags", Vec::<String>::new()).matches(&s));
    }

    #[test]
    fn string_range_is_inclusive() {
        let s = src(json!({"p": "b"}));
        assert!(Expression::range("p", "a", "b").matches(&s));
        assert!(Expression::range("p", "b", "c").matches(&s));
        assert!(!Expression::range("p", "c", "d").matches(&s));
    }

    #[test]
    fn numeric_range_and_mixed_kinds() {
        let s = src(json!({"n": 5, "big": u64::MAX}));
        assert!(Expression::range("n", 1, 5).matches(&s));
        assert!(!Expression::range("n", 6, 9).matches(&s));
        assert!(!Expression::range("n", "1", "9").matches(&s));
        assert!(Expression::range("big", 0, u64::MAX).matches(&s));
    }

    #[test]
    fn range_over_array_matches_any_element() {
        let s = src(json!({"revised": ["0005", "0100"]}));
        assert!(Expression::range("revised", "0050", "0200").matches(&s));
        assert!(!Expression::range("revised", "0006", "0099").matches(&s));
    }

    #[test]
    fn boolean_composition() {
        let s = src(json!({"a": 1, "b": 2}));
        let a1 = Expression::exact_match("a", 1);
        let b3 = Expression::exact_match("b", 3);
        assert!(!Expression::and([a1.clone(), b3.clone()]).matches(&s));
        assert!(Expression::or([a1.clone(), b3.clone()]).matches(&s));
        assert!(Expression::and([a1, Expression::not(b3)]).matches(&s));
    }

    #[test]
    fn constructors_simplify() {
        assert_eq!(Expression::and([]), Expression::MatchAll);
        assert_eq!(Expression::or([]), Expression::MatchNone);
        assert_eq!(
            Expression::and([Expression::MatchAll, Expression::MatchNone]),
            Expression::MatchNone
        );
        assert_eq!(Expression::not(Expression::not(Expression::MatchAll)), Expression::MatchAll);
        let leaf = Expression::exact_match("a", 1);
        assert_eq!(Expression::or([leaf.clone()]), leaf);
        assert_eq!(
            Expression::and([Expression::and([leaf.clone(), leaf.clone()]), leaf.clone()]),
            Expression::And(vec![leaf.clone(), leaf.clone(), leaf])
        );
    }

    #[test]
    fn missing_field_never_matches_leaf() {
        let s = src(json!({}));
        assert!(!Expression::exact_match("a", 1).matches(&s));
        assert!(!Expression::range("a", 0, 10).matches(&s));
        assert!(Expression::not(Expression::exact_match("a", 1)).matches(&s));
    }
}
