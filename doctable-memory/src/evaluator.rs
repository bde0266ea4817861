//! Query expression evaluation for in-memory document filtering.
//!
//! Expressions are evaluated against one BSON document at a time. Field names may be dotted
//! paths into nested documents. Matching follows the document-store conventions the table
//! layer relies on: an equality against an array field matches any element, negative
//! operators match documents where the field is missing, and string containment is
//! case-insensitive.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use doctable_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::{TableError, TableResult},
};

/// Comparable representation of BSON values.
///
/// Integers and floats are normalized to `f64` so that `1`, `1i64` and `1.0` compare equal.
/// Values with no natural ordering compare by raw equality only.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path (`"address.city"`) inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head)? {
            Bson::Document(inner) => lookup(inner, rest),
            _ => None,
        },
    }
}

/// Orders two documents by `field`, missing values first.
pub(crate) fn compare_by(a: &Document, b: &Document, field: &str) -> Ordering {
    let left = lookup(a, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);
    let right = lookup(b, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);

    match (&left, &right) {
        (Comparable::Null, Comparable::Null) => Ordering::Equal,
        (Comparable::Null, _) => Ordering::Less,
        (_, Comparable::Null) => Ordering::Greater,
        _ => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> TableResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` if `document` matches `filter`. A missing filter matches everything.
    pub fn matches(document: &'a Document, filter: Option<&Expr>) -> TableResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.to_lowercase())
}

/// Equality as the store applies it: an array field matches if it equals the value or any
/// of its elements does.
fn matches_eq(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    if field_value == value {
        return true;
    }

    match field_value {
        Comparable::Array(items) => items.iter().any(|item| item == value),
        _ => false,
    }
}

fn matches_contains(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    match (field_value, value) {
        (Comparable::String(left), Comparable::String(right)) => contains_ignore_case(left, right),
        (Comparable::Array(items), Comparable::String(right)) => items.iter().any(|item| match item {
            Comparable::String(left) => contains_ignore_case(left, right),
            _ => false,
        }),
        (Comparable::Array(items), Comparable::Array(values)) => values.iter().all(|val| items.contains(val)),
        _ => matches_eq(field_value, value),
    }
}

fn matches_any_of(field_value: &Comparable<'_>, values: &Comparable<'_>) -> bool {
    match values {
        Comparable::Array(values) => values.iter().any(|val| matches_eq(field_value, val)),
        single => matches_eq(field_value, single),
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = TableError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let value = Comparable::from(value);

        let Some(field_value) = lookup(self.document, field).map(Comparable::from) else {
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        Ok(match op {
            FieldOp::Eq => matches_eq(&field_value, &value),
            FieldOp::Ne => !matches_eq(&field_value, &value),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match field_value.partial_cmp(&value) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains => matches_contains(&field_value, &value),
            FieldOp::NotContains => !matches_contains(&field_value, &value),
            FieldOp::StartsWith => match (&field_value, &value) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&field_value, &value) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => matches_any_of(&field_value, &value),
            FieldOp::NoneOf => !matches_any_of(&field_value, &value),
        })
    }
}
