//! Query translation from the doctable AST to MongoDB query syntax.
//!
//! String operators become anchored or unanchored `$regex` matches over the escaped input, so
//! search terms are always matched literally. Negation uses `$nor`, which is valid at the top
//! level of a filter.

use bson::{Document, Bson, doc};

use doctable_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::TableError,
};

/// Translates doctable query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter; `None` becomes the match-all filter `{}`.
    pub fn translate(filter: Option<&Expr>) -> Result<Document, TableError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }
}

fn string_operand<'a>(op: &str, value: &'a Bson) -> Result<&'a str, TableError> {
    match value {
        Bson::String(s) => Ok(s),
        _ => Err(TableError::precondition(format!("{} operator requires a string value", op))),
    }
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = TableError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": regex::escape(s), "$options": "i" },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$eq": other },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": regex::escape(s), "$options": "i" } },
                    Bson::Array(arr) => doc! { "$not": { "$all": arr } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => doc! {
                    "$regex": format!("^{}", regex::escape(string_operand("StartsWith", value)?)),
                },
                FieldOp::EndsWith => doc! {
                    "$regex": format!("{}$", regex::escape(string_operand("EndsWith", value)?)),
                },
                FieldOp::AnyOf => doc! { "$in": as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": as_array(value) },
            }
        })
    }
}
