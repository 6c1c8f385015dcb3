use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    BinaryOperator, Expr, ObjectName, ObjectNamePart, Query, Select, SetExpr, Statement,
    Value as SqlValue,
};
use sqlparser::ast::{Visit, VisitMut, Visitor, VisitorMut};

use crate::RewriteError;

pub(crate) fn object_name_matches(name: &ObjectName, target: &str) -> bool {
    object_name_last(name)
        .map(|last| last.eq_ignore_ascii_case(target))
        .unwrap_or(false)
}

/// Unqualified table name: the last part of a possibly schema-qualified name.
pub(crate) fn object_name_last(name: &ObjectName) -> Option<String> {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.clone())
}

/// Column name from a rendered identifier such as `` `t`.`id` ``.
pub(crate) fn column_name_from_display(rendered: &str) -> String {
    let last = rendered.rsplit('.').next().unwrap_or(rendered);
    last.trim_matches(|c| c == '`' || c == '"').to_string()
}

/// `(qualifier, column)` for plain and qualified column references.
pub(crate) fn column_ref(expr: &Expr) -> Option<(Option<&str>, &str)> {
    match unwrap_nested(expr) {
        Expr::Identifier(ident) => Some((None, ident.value.as_str())),
        Expr::CompoundIdentifier(idents) if idents.len() >= 2 => {
            let column = &idents[idents.len() - 1];
            let qualifier = &idents[idents.len() - 2];
            Some((Some(qualifier.value.as_str()), column.value.as_str()))
        }
        _ => None,
    }
}

pub(crate) fn unwrap_nested(expr: &Expr) -> &Expr {
    let mut current = expr;
    while let Expr::Nested(inner) = current {
        current = inner;
    }
    current
}

/// Top-level AND terms of a filter, parentheses removed.
pub(crate) fn split_conjuncts(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match unwrap_nested(expr) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

pub(crate) fn number_expr(value: u64) -> Expr {
    Expr::Value(SqlValue::Number(value.to_string(), false).into())
}

pub(crate) fn and_all(mut terms: Vec<Expr>) -> Option<Expr> {
    if terms.is_empty() {
        return None;
    }
    let first = terms.remove(0);
    Some(terms.into_iter().fold(first, |left, right| Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::And,
        right: Box::new(right),
    }))
}

pub(crate) fn or_all(mut terms: Vec<Expr>) -> Option<Expr> {
    if terms.is_empty() {
        return None;
    }
    let first = terms.remove(0);
    Some(terms.into_iter().fold(first, |left, right| Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::Or,
        right: Box::new(right),
    }))
}

/// Inserts the statement's leading comments after its first keyword.
pub(crate) fn with_comments(rendered: String, comments: &[String]) -> String {
    if comments.is_empty() {
        return rendered;
    }
    match rendered.split_once(' ') {
        Some((verb, rest)) => format!("{verb} {} {rest}", comments.join(" ")),
        None => format!("{rendered} {}", comments.join(" ")),
    }
}

pub(crate) fn rewrite_query_selects(
    query: &mut Query,
    rewrite_select: &mut dyn FnMut(&mut Select) -> Result<(), RewriteError>,
    rewrite_query: &mut dyn FnMut(&mut Query) -> Result<(), RewriteError>,
) -> Result<(), RewriteError> {
    let mut visitor = SelectRewriteVisitor {
        rewrite_select,
        rewrite_query,
    };
    if let ControlFlow::Break(error) = VisitMut::visit(query, &mut visitor) {
        return Err(error);
    }
    Ok(())
}

struct SelectRewriteVisitor<'a> {
    rewrite_select: &'a mut dyn FnMut(&mut Select) -> Result<(), RewriteError>,
    rewrite_query: &'a mut dyn FnMut(&mut Query) -> Result<(), RewriteError>,
}

impl VisitorMut for SelectRewriteVisitor<'_> {
    type Break = RewriteError;

    fn post_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        let result = rewrite_selects_in_set_expr(query.body.as_mut(), self.rewrite_select)
            .and_then(|()| (self.rewrite_query)(query));
        match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(error) => ControlFlow::Break(error),
        }
    }
}

fn rewrite_selects_in_set_expr(
    set_expr: &mut SetExpr,
    rewrite_select: &mut dyn FnMut(&mut Select) -> Result<(), RewriteError>,
) -> Result<(), RewriteError> {
    match set_expr {
        SetExpr::Select(select) => rewrite_select(select.as_mut()),
        SetExpr::SetOperation { left, right, .. } => {
            rewrite_selects_in_set_expr(left.as_mut(), rewrite_select)?;
            rewrite_selects_in_set_expr(right.as_mut(), rewrite_select)
        }
        // Nested Query bodies are visited as their own Query nodes by VisitorMut.
        _ => Ok(()),
    }
}

/// Unqualified names of every relation the statement reads or writes, sorted.
pub(crate) fn referenced_tables(statement: &Statement) -> Vec<String> {
    let mut collector = RelationCollector {
        names: BTreeSet::new(),
    };
    let _ = Visit::visit(statement, &mut collector);
    collector.names.into_iter().collect()
}

struct RelationCollector {
    names: BTreeSet<String>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(name) = object_name_last(relation) {
            self.names.insert(name.to_ascii_lowercase());
        }
        ControlFlow::Continue(())
    }
}

/// Statement text with every literal and placeholder replaced by `?`.
pub(crate) fn literal_free_shape(statement: &Statement) -> String {
    let mut erased = statement.clone();
    let _ = VisitMut::visit(&mut erased, &mut LiteralEraser);
    erased.to_string()
}

struct LiteralEraser;

impl VisitorMut for LiteralEraser {
    type Break = ();

    fn pre_visit_value(&mut self, value: &mut SqlValue) -> ControlFlow<Self::Break> {
        *value = SqlValue::Placeholder("?".to_string());
        ControlFlow::Continue(())
    }
}
