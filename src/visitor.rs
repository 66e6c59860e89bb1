// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;

use anyhow::Result;

/// A node handed to a [`Visitor`].
pub enum Node<'a> {
    Expr(&'a mut Expr),
    Limit(&'a mut Limit),
    TableName(&'a mut TableName),
    ColumnName(&'a mut ColumnName),
    TableAlias(&'a mut String),
    FieldAlias(&'a mut String),
    /// Database named by `USE`, `CREATE DATABASE` or `DROP DATABASE`.
    Database(&'a mut String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    SkipChildren,
}

/// Pre-order `enter`, post-order `leave`. Children are walked in source
/// order, so `leave` of a node runs only after all of its children have
/// been rewritten.
pub trait Visitor {
    fn enter(&mut self, _node: &Node<'_>) -> Visit {
        Visit::Continue
    }

    fn leave(&mut self, _node: Node<'_>) -> Result<()> {
        Ok(())
    }
}

pub fn walk_statement(v: &mut dyn Visitor, stmt: &mut Statement) -> Result<()> {
    match stmt {
        Statement::Query(q) => walk_query(v, q),
        Statement::Insert(ins) => {
            walk_table_name(v, &mut ins.table)?;
            for c in &mut ins.columns {
                walk_leaf(v, Node::ColumnName(c))?;
            }
            match &mut ins.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        for e in row {
                            walk_expr(v, e)?;
                        }
                    }
                }
                InsertSource::Query(q) => walk_query(v, q)?,
                InsertSource::Set(assignments) => walk_assignments(v, assignments)?,
            }
            walk_assignments(v, &mut ins.on_duplicate)
        }
        Statement::Update(upd) => {
            walk_table_ref(v, &mut upd.table)?;
            walk_assignments(v, &mut upd.set)?;
            if let Some(w) = &mut upd.where_ {
                walk_expr(v, w)?;
            }
            walk_by_items(v, &mut upd.order_by)?;
            if let Some(l) = &mut upd.limit {
                walk_limit(v, l)?;
            }
            Ok(())
        }
        Statement::Delete(del) => {
            walk_table_name(v, &mut del.table)?;
            if let Some(w) = &mut del.where_ {
                walk_expr(v, w)?;
            }
            walk_by_items(v, &mut del.order_by)?;
            if let Some(l) = &mut del.limit {
                walk_limit(v, l)?;
            }
            Ok(())
        }
        Statement::CreateTable(ct) => walk_table_name(v, &mut ct.name),
        Statement::DropTable { names, .. } => {
            for n in names {
                walk_table_name(v, n)?;
            }
            Ok(())
        }
        Statement::CreateDatabase { name, .. }
        | Statement::DropDatabase { name, .. }
        | Statement::Use(name) => walk_leaf(v, Node::Database(name)),
        Statement::Set(items) => {
            for item in items {
                if let SetItem::Variable { value, .. } = item {
                    walk_expr(v, value)?;
                }
            }
            Ok(())
        }
        Statement::Begin | Statement::Commit | Statement::Rollback => Ok(()),
    }
}

fn walk_leaf(v: &mut dyn Visitor, node: Node<'_>) -> Result<()> {
    // Leaves have no children, so the outcome of enter does not matter.
    v.enter(&node);
    v.leave(node)
}

fn walk_assignments(v: &mut dyn Visitor, assignments: &mut [Assignment]) -> Result<()> {
    for a in assignments {
        walk_leaf(v, Node::ColumnName(&mut a.column))?;
        walk_expr(v, &mut a.value)?;
    }
    Ok(())
}

fn walk_table_name(v: &mut dyn Visitor, name: &mut TableName) -> Result<()> {
    walk_leaf(v, Node::TableName(name))
}

pub fn walk_query(v: &mut dyn Visitor, q: &mut Query) -> Result<()> {
    walk_query_body(v, &mut q.body)?;
    walk_by_items(v, &mut q.order_by)?;
    if let Some(l) = &mut q.limit {
        walk_limit(v, l)?;
    }
    Ok(())
}

fn walk_query_body(v: &mut dyn Visitor, body: &mut QueryBody) -> Result<()> {
    match body {
        QueryBody::Select(s) => walk_select(v, s),
        QueryBody::Union { left, right, .. } => {
            walk_query_body(v, left)?;
            walk_query_body(v, right)
        }
        QueryBody::Nested(q) => walk_query(v, q),
    }
}

fn walk_select(v: &mut dyn Visitor, s: &mut Select) -> Result<()> {
    for field in &mut s.fields {
        if let SelectItem::Expr { expr, alias } = field {
            walk_expr(v, expr)?;
            if let Some(alias) = alias {
                walk_leaf(v, Node::FieldAlias(alias))?;
            }
        }
    }
    for t in &mut s.from {
        walk_table_ref(v, t)?;
    }
    if let Some(w) = &mut s.where_ {
        walk_expr(v, w)?;
    }
    walk_by_items(v, &mut s.group_by)?;
    if let Some(h) = &mut s.having {
        walk_expr(v, h)?;
    }
    Ok(())
}

fn walk_table_ref(v: &mut dyn Visitor, t: &mut TableRef) -> Result<()> {
    match t {
        TableRef::Table { name, alias } => {
            walk_table_name(v, name)?;
            if let Some(alias) = alias {
                walk_leaf(v, Node::TableAlias(alias))?;
            }
            Ok(())
        }
        TableRef::Derived { query, alias } => {
            walk_query(v, query)?;
            walk_leaf(v, Node::TableAlias(alias))
        }
        TableRef::Join {
            left, right, on, ..
        } => {
            walk_table_ref(v, left)?;
            walk_table_ref(v, right)?;
            if let Some(on) = on {
                walk_expr(v, on)?;
            }
            Ok(())
        }
    }
}

fn walk_by_items(v: &mut dyn Visitor, items: &mut [ByItem]) -> Result<()> {
    for item in items {
        if let ByItemExpr::Expr(e) = &mut item.expr {
            walk_expr(v, e)?;
        }
    }
    Ok(())
}

fn walk_limit(v: &mut dyn Visitor, l: &mut Limit) -> Result<()> {
    if v.enter(&Node::Limit(&mut *l)) == Visit::Continue {
        if let Some(o) = &mut l.offset {
            walk_expr(v, o)?;
        }
        walk_expr(v, &mut l.count)?;
    }
    v.leave(Node::Limit(l))
}

pub fn walk_expr(v: &mut dyn Visitor, expr: &mut Expr) -> Result<()> {
    if v.enter(&Node::Expr(&mut *expr)) == Visit::SkipChildren {
        return v.leave(Node::Expr(expr));
    }

    match &mut expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Bool(_)
        | ExprKind::Marker(_)
        | ExprKind::Param
        | ExprKind::Variable(_)
        | ExprKind::Default => (),

        ExprKind::Column(c) => walk_leaf(v, Node::ColumnName(c))?,

        ExprKind::Unary { expr, .. }
        | ExprKind::IsNull { expr, .. }
        | ExprKind::IsBool { expr, .. }
        | ExprKind::Cast { expr, .. }
        | ExprKind::Interval { expr, .. } => walk_expr(v, expr)?,

        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(v, lhs)?;
            walk_expr(v, rhs)?;
        }

        ExprKind::In { expr, list, .. } => {
            walk_expr(v, expr)?;
            for e in list {
                walk_expr(v, e)?;
            }
        }

        ExprKind::InSubquery { expr, query, .. } => {
            walk_expr(v, expr)?;
            walk_query(v, query)?;
        }

        ExprKind::Between {
            expr, low, high, ..
        } => {
            walk_expr(v, expr)?;
            walk_expr(v, low)?;
            walk_expr(v, high)?;
        }

        ExprKind::Like { expr, pattern, .. } | ExprKind::Regexp { expr, pattern, .. } => {
            walk_expr(v, expr)?;
            walk_expr(v, pattern)?;
        }

        ExprKind::Func { args, .. } | ExprKind::Row(args) => {
            for a in args {
                walk_expr(v, a)?;
            }
        }

        ExprKind::Case {
            operand,
            whens,
            else_,
        } => {
            if let Some(o) = operand {
                walk_expr(v, o)?;
            }
            for (cond, value) in whens {
                walk_expr(v, cond)?;
                walk_expr(v, value)?;
            }
            if let Some(e) = else_ {
                walk_expr(v, e)?;
            }
        }

        ExprKind::Subquery(q) | ExprKind::Exists { query: q, .. } => walk_query(v, q)?,
    }

    v.leave(Node::Expr(expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;

    #[derive(Default)]
    struct Collect {
        entered: Vec<String>,
        left: Vec<String>,
    }

    fn describe(node: &Node<'_>) -> String {
        match node {
            Node::Expr(e) => match &e.kind {
                ExprKind::Literal(d) => format!("lit:{d}"),
                ExprKind::Column(c) => format!("col:{}", c.dotted()),
                ExprKind::Func { name, .. } => format!("func:{name}"),
                _ => "expr".to_string(),
            },
            Node::Limit(_) => "limit".to_string(),
            Node::TableName(t) => format!("table:{}", t.dotted()),
            Node::ColumnName(c) => format!("column:{}", c.dotted()),
            Node::TableAlias(a) => format!("talias:{a}"),
            Node::FieldAlias(a) => format!("falias:{a}"),
            Node::Database(d) => format!("db:{d}"),
        }
    }

    impl Visitor for Collect {
        fn enter(&mut self, node: &Node<'_>) -> Visit {
            self.entered.push(describe(node));
            match node {
                Node::Limit(_) => Visit::SkipChildren,
                _ => Visit::Continue,
            }
        }

        fn leave(&mut self, node: Node<'_>) -> Result<()> {
            self.left.push(describe(&node));
            Ok(())
        }
    }

    #[test]
    fn source_order_and_skip() -> Result<()> {
        let mut stmt = parse_one("test", "SELECT a AS x FROM t u WHERE b = 1 LIMIT 5")?;
        let mut c = Collect::default();
        walk_statement(&mut c, &mut stmt)?;
        assert_eq!(
            c.entered,
            vec![
                "col:a", "column:a", "falias:x", "table:t", "talias:u", "expr", "col:b",
                "column:b", "lit:1", "limit"
            ]
        );
        // Children leave before their parents.
        assert_eq!(c.left[0], "column:a");
        assert_eq!(c.left[1], "col:a");
        assert!(!c.left.iter().any(|s| s == "lit:5"));
        Ok(())
    }
}
