//! Query construction and filtering API for tables.
//!
//! This module provides filter expressions, structured queries with sorting, pagination and
//! projection, the option structs of the table's query operations, and a visitor trait that
//! backends implement to translate expressions into their native form.
//!
//! # Query Building
//!
//! ```ignore
//! use doctable::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("status", "active").and(Filter::gte("created", 0)))
//!     .sort("created", SortDirection::Desc)
//!     .offset(20)
//!     .limit(10)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Set membership: `any_of`, `none_of`
//! - Logical: `and`, `or`, and [`Expr::not`]
//! - Mappings: `from_document` turns `{ field: value, .. }` into an equality conjunction

use bson::{Bson, Document};
use chrono::Utc;

use crate::{
    document::{PRIMARY_KEY, RecordId},
    error::{TableError, TableResult},
};

/// Sort direction for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Case-insensitive substring for strings, element match for arrays.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field (or any of its array elements) is one of the values.
    AnyOf,
    /// Field (and every array element) is none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// ```ignore
/// let expr = Filter::and([
///     Filter::eq("status", "active"),
///     Filter::gt("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare. Dotted paths address nested documents.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Combines an optional caller filter with a required expression, flattening a conjunction
/// on the right into the result.
pub(crate) fn and_optional(filter: Option<Expr>, expr: Expr) -> Expr {
    match (filter, expr) {
        (None, expr) => expr,
        (Some(filter), Expr::And(exprs)) => exprs.into_iter().fold(filter, Expr::and),
        (Some(filter), expr) => filter.and(expr),
    }
}

/// Helper struct for constructing filter expressions.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field contains the value.
    ///
    /// For strings this is a case-insensitive substring match; the value is matched
    /// literally, never as a pattern.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field does not contain the value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field is a member of `values`.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field is not a member of `values`.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches the document with primary identifier `id`.
    pub fn id(id: &RecordId) -> Expr {
        Filter::eq(PRIMARY_KEY, id.as_bson().clone())
    }

    /// Matches every document whose primary identifier is a member of `ids`.
    pub fn ids(ids: &[RecordId]) -> Expr {
        Filter::any_of(PRIMARY_KEY, ids.iter().map(|id| id.as_bson().clone()))
    }

    /// Builds an equality conjunction from a field-to-value mapping.
    ///
    /// An empty mapping yields an empty conjunction, which matches every document.
    pub fn from_document(document: Document) -> Expr {
        Expr::And(
            document
                .into_iter()
                .map(|(field, value)| Filter::eq(field, value))
                .collect(),
        )
    }
}

/// A structured query: filter, sort, pagination and projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<usize>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
    /// Fields to return. `None` returns whole documents; `_id` is always included.
    pub projection: Option<Vec<String>>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// A query matching `filter` (or everything) with no other constraints.
    pub fn filtered(filter: Option<Expr>) -> Self {
        Query { filter, ..Query::default() }
    }

    /// Applies the pagination, sort and projection of `options` to this query.
    pub fn with_options(mut self, options: FindOptions) -> Self {
        self.limit = options.limit.or(self.limit);
        self.offset = options.offset.or(self.offset);
        self.sort = options.sort.or(self.sort);
        self.projection = options.projection.or(self.projection);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip (for pagination).
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort specification for the query results.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Restricts the returned fields.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Pagination, sort and projection for lookups such as `get_by`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Option<Sort>,
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Pagination for pattern searches. Defaults to `skip = 0`, `limit = 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub skip: usize,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

impl SearchOptions {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }
}

/// A range query over a numeric sort key, newest first.
///
/// Matches documents satisfying `filter` whose `sort_key` lies in the closed range
/// `[min, max]`, sorted by `sort_key` descending, then skips `skip` and returns at most
/// `limit` documents.
///
/// Defaults: no filter, `max` = now in Unix milliseconds, `min = 0`, `skip = 0`,
/// `limit = 100`, `sort_key = "created"`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub filter: Option<Expr>,
    pub max: i64,
    pub min: i64,
    pub skip: i64,
    pub limit: i64,
    pub sort_key: String,
}

impl Default for RangeQuery {
    fn default() -> Self {
        Self {
            filter: None,
            max: Utc::now().timestamp_millis(),
            min: 0,
            skip: 0,
            limit: 100,
            sort_key: "created".to_string(),
        }
    }
}

impl RangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = max;
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = min;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = sort_key.into();
        self
    }

    /// Checks the range and pagination bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Precondition`] unless `max > 0`, `min >= 0`, `skip >= 0`,
    /// `limit >= 1` and `sort_key` is non-empty.
    pub fn validate(&self) -> TableResult<()> {
        if self.max <= 0 {
            return Err(TableError::precondition(format!("max must be > 0, got {}", self.max)));
        }
        if self.min < 0 {
            return Err(TableError::precondition(format!("min must be >= 0, got {}", self.min)));
        }
        if self.skip < 0 {
            return Err(TableError::precondition(format!("skip must be >= 0, got {}", self.skip)));
        }
        if self.limit < 1 {
            return Err(TableError::precondition(format!("limit must be >= 1, got {}", self.limit)));
        }
        if self.sort_key.is_empty() {
            return Err(TableError::precondition("sort key must not be empty"));
        }

        Ok(())
    }

    /// Validates and lowers this range query into a structured [`Query`].
    pub fn into_query(self) -> TableResult<Query> {
        self.validate()?;

        let range = Filter::gte(self.sort_key.clone(), self.min)
            .and(Filter::lte(self.sort_key.clone(), self.max));

        Ok(Query {
            filter: Some(and_optional(self.filter, range)),
            limit: Some(self.limit as usize),
            offset: Some(self.skip as usize),
            sort: Some(Sort { field: self.sort_key, direction: SortDirection::Desc }),
            projection: None,
        })
    }
}

/// A single-document update applied by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Merge these fields into the document, leaving other fields untouched.
    Set(Document),
    /// Append each value to the array `field` unless already present.
    AddToSet { field: String, values: Vec<Bson> },
    /// Remove every occurrence of each value from the array `field`.
    PullAll { field: String, values: Vec<Bson> },
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<TableError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn range_query_rejects_out_of_bounds_arguments() {
        assert!(RangeQuery::new().limit(0).validate().unwrap_err().is_precondition());
        assert!(RangeQuery::new().min(-1).validate().unwrap_err().is_precondition());
        assert!(RangeQuery::new().max(0).validate().unwrap_err().is_precondition());
        assert!(RangeQuery::new().skip(-5).validate().unwrap_err().is_precondition());
        assert!(RangeQuery::new().sort_key("").validate().is_err());
        assert!(RangeQuery::new().validate().is_ok());
    }

    #[test]
    fn range_query_lowers_to_sorted_bounded_query() {
        let query = RangeQuery::new()
            .filter(Filter::eq("user", "a"))
            .min(10)
            .max(20)
            .skip(1)
            .limit(5)
            .sort_key("ts")
            .into_query()
            .unwrap();

        assert_eq!(
            query.filter,
            Some(Expr::And(vec![
                Filter::eq("user", "a"),
                Filter::gte("ts", 10i64),
                Filter::lte("ts", 20i64),
            ]))
        );
        assert_eq!(query.offset, Some(1));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.sort, Some(Sort { field: "ts".into(), direction: SortDirection::Desc }));
    }

    #[test]
    fn and_optional_flattens_conjunctions() {
        let range = Filter::gte("ts", 1).and(Filter::lte("ts", 2));

        assert_eq!(and_optional(None, range.clone()), range);
        assert_eq!(
            and_optional(Some(Filter::eq("a", 1)), range),
            Expr::And(vec![Filter::eq("a", 1), Filter::gte("ts", 1), Filter::lte("ts", 2)])
        );
        assert_eq!(
            and_optional(Some(Filter::eq("a", 1)), Filter::eq("b", 2)),
            Expr::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)])
        );
    }

    #[test]
    fn from_document_builds_equality_conjunction() {
        let expr = Filter::from_document(doc! { "a": 1, "b": "x" });

        assert_eq!(expr, Expr::And(vec![Filter::eq("a", 1), Filter::eq("b", "x")]));
    }

    #[test]
    fn options_override_query_pagination() {
        let query = Query::builder()
            .limit(5)
            .build()
            .with_options(FindOptions::new().offset(3));

        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(3));
    }
}
