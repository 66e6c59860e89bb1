// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Turns statements into typed plans. Names are resolved against the
//! catalog and every expression is given a type following MySQL's rules
//! for implicit conversions, with explicit `Cast` nodes wherever operands
//! of different evaluation types meet.

use std::iter;

use anyhow::{anyhow, bail, Result};

use crate::ast::*;
use crate::catalog::{Catalog, TableInfo};
use crate::datum::Datum;
use crate::format::render_expr;
use crate::frontend::builtins::{self, Ret};
use crate::frontend::plan::{self, ExprId, PhysicalPlan, Plan, TypedExpr, TypedExprKind};
use crate::lexer::Span;
use crate::types::{EvalType, FieldType, TypeCode};

#[derive(Debug, Clone)]
struct ScopeColumn {
    name: String,
    tp: FieldType,
    origin: String,
}

/// A table, alias or derived table visible in a FROM clause.
#[derive(Debug, Clone)]
struct ScopeSource {
    qualifier: String,
    /// Database that may qualify column references. None for aliases and
    /// derived tables.
    db: Option<String>,
    /// Origin of the integer primary key of a base table.
    handle: Option<String>,
    columns: Vec<ScopeColumn>,
}

impl ScopeSource {
    fn base(info: &TableInfo, alias: Option<&str>) -> Self {
        Self {
            qualifier: alias.unwrap_or(&info.name).to_string(),
            db: match alias {
                Some(_) => None,
                None => Some(info.db.clone()),
            },
            handle: info.int_handle().map(|c| info.origin(c)),
            columns: info
                .columns
                .iter()
                .map(|c| ScopeColumn {
                    name: c.name.clone(),
                    tp: c.tp.clone(),
                    origin: info.origin(c),
                })
                .collect(),
        }
    }

    fn matches(&self, c: &ColumnName) -> bool {
        let Some(table) = &c.table else {
            return true;
        };
        if !self.qualifier.eq_ignore_ascii_case(table) {
            return false;
        }
        match &c.db {
            Some(db) => self.db.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(db)),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    sources: Vec<ScopeSource>,
    /// Columns coalesced by `JOIN ... USING`.
    using: Vec<String>,
    /// Output fields of the select, by name.
    fields: Vec<(String, TypedExpr)>,
    /// Select aliases take precedence over columns (ORDER BY, HAVING).
    alias_first: bool,
    /// An aggregate function was met, so the select groups implicitly.
    aggregated: bool,
    /// Plans of subqueries met while planning expressions, with the column
    /// standing for each one's value.
    subplans: Vec<(PhysicalPlan, Option<TypedExpr>)>,
}

/// A planned query with the names of its output columns.
struct Planned {
    plan: PhysicalPlan,
    names: Vec<String>,
}

pub struct Planner<'a> {
    catalog: &'a Catalog,
    current_db: Option<&'a str>,
    next_id: ExprId,
    scope: Scope,
    outer: Vec<Scope>,
}

fn bool_type() -> FieldType {
    FieldType::with_len(TypeCode::LongLong, 1, 0)
}

/// Rank used to pick the result type of arithmetic.
fn arith_kind(et: EvalType) -> EvalType {
    match et {
        EvalType::Int => EvalType::Int,
        EvalType::Decimal | EvalType::Datetime | EvalType::Timestamp | EvalType::Duration => {
            EvalType::Decimal
        }
        EvalType::Real | EvalType::String | EvalType::Json => EvalType::Real,
    }
}

fn arith_rank(et: EvalType) -> u8 {
    match et {
        EvalType::Int => 0,
        EvalType::Decimal => 1,
        _ => 2,
    }
}

/// Type of a value produced from `tp`, without key attributes.
fn derived(tp: &FieldType) -> FieldType {
    let mut tp = tp.clone();
    tp.primary_key = false;
    tp
}

/// Common type of the branches of `IF`, `COALESCE`, `CASE` and friends.
fn unify(exprs: &[TypedExpr]) -> FieldType {
    let typed: Vec<&TypedExpr> = exprs.iter().filter(|e| e.tp.tp != TypeCode::Null).collect();
    let Some(first) = typed.first() else {
        return FieldType::new(TypeCode::Null);
    };
    let et = first.tp.eval_type();
    if typed.iter().all(|e| e.tp.eval_type() == et) {
        return derived(&first.tp);
    }
    if typed.iter().all(|e| e.tp.eval_type().is_numeric()) {
        if typed.iter().any(|e| e.tp.eval_type() == EvalType::Real) {
            return FieldType::from_eval_type(EvalType::Real);
        }
        return FieldType::from_eval_type(EvalType::Decimal);
    }
    FieldType::from_eval_type(EvalType::String)
}

/// Handle of `pk = <int>`.
fn point_handle(cond: &TypedExpr, pk: &str) -> Option<i64> {
    let TypedExprKind::ScalarFunc { name, args } = &cond.kind else {
        return None;
    };
    let [a, b] = args.as_slice() else {
        return None;
    };
    if name != "eq" {
        return None;
    }
    for (col, c) in [(a, b), (b, a)] {
        if col.origin() == Some(pk) {
            if let Some(Datum::Int(v)) = c.constant() {
                return Some(*v);
            }
        }
    }
    None
}

/// Handles of `pk = <int> OR pk = <int> ...`, the lowering of `pk IN (...)`.
fn batch_handles(cond: &TypedExpr, pk: &str, out: &mut Vec<i64>) -> bool {
    match &cond.kind {
        TypedExprKind::ScalarFunc { name, args } if name == "or" => {
            args.iter().all(|a| batch_handles(a, pk, out))
        }
        _ => match point_handle(cond, pk) {
            Some(h) => {
                out.push(h);
                true
            }
            None => false,
        },
    }
}

fn wrap_subplans(mut plan: PhysicalPlan, subplans: Vec<(PhysicalPlan, Option<TypedExpr>)>) -> PhysicalPlan {
    for (inner, result) in subplans {
        plan = PhysicalPlan::Apply {
            outer: Box::new(plan),
            inner: Box::new(inner),
            result,
        };
    }
    plan
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, current_db: Option<&'a str>) -> Self {
        Self {
            catalog,
            current_db,
            next_id: 0,
            scope: Scope::default(),
            outer: vec![],
        }
    }

    pub fn plan(mut self, stmt: &Statement) -> Result<Plan> {
        match stmt {
            Statement::Query(q) => Ok(Plan::Select(self.query(q)?.plan)),
            Statement::Insert(ins) => self.insert(ins),
            Statement::Update(upd) => self.update(upd),
            Statement::Delete(del) => self.delete(del),
            _ => Ok(Plan::Simple),
        }
    }

    fn enter_scope(&mut self) {
        let outer = std::mem::take(&mut self.scope);
        self.outer.push(outer);
    }

    fn leave_scope(&mut self) -> Scope {
        let outer = self.outer.pop().unwrap_or_default();
        std::mem::replace(&mut self.scope, outer)
    }

    fn table(&self, name: &TableName) -> Result<&'a TableInfo> {
        let db = match (&name.db, self.current_db) {
            (Some(db), _) => db.as_str(),
            (None, Some(db)) => db,
            (None, None) => bail!("No database selected"),
        };
        self.catalog
            .table(db, &name.name)
            .ok_or_else(|| anyhow!("Table '{db}.{}' doesn't exist", name.name))
    }

    fn make(&mut self, tp: FieldType, kind: TypedExprKind) -> TypedExpr {
        let id = self.next_id;
        self.next_id += 1;
        TypedExpr { id, tp, kind }
    }

    fn func(&mut self, name: &str, args: Vec<TypedExpr>, tp: FieldType) -> TypedExpr {
        self.make(
            tp,
            TypedExprKind::ScalarFunc {
                name: name.to_string(),
                args,
            },
        )
    }

    fn not(&mut self, e: TypedExpr, not: bool) -> TypedExpr {
        match not {
            true => self.func("not", vec![e], bool_type()),
            false => e,
        }
    }

    fn cast(&mut self, e: TypedExpr, tp: &FieldType) -> TypedExpr {
        if e.tp.eval_type() == tp.eval_type() || e.tp.tp == TypeCode::Null {
            return e;
        }
        self.make(derived(tp), TypedExprKind::Cast(Box::new(e)))
    }

    fn cast_to(&mut self, e: TypedExpr, et: EvalType) -> TypedExpr {
        self.cast(e, &FieldType::from_eval_type(et))
    }

    /// Left-deep chain of a binary logical function.
    fn chain(&mut self, name: &str, exprs: Vec<TypedExpr>) -> Result<TypedExpr> {
        let mut iter = exprs.into_iter();
        let Some(mut acc) = iter.next() else {
            bail!("empty `{name}` condition");
        };
        for e in iter {
            acc = self.func(name, vec![acc, e], bool_type());
        }
        Ok(acc)
    }

    // Name resolution.

    fn lookup_column(&self, c: &ColumnName) -> Result<Option<Resolved>> {
        for scope in iter::once(&self.scope).chain(self.outer.iter().rev()) {
            if scope.alias_first && c.table.is_none() {
                if let Some(found) = Self::lookup_field(scope, &c.name) {
                    return Ok(Some(found));
                }
            }
            let mut found: Option<&ScopeColumn> = None;
            for src in scope.sources.iter().filter(|s| s.matches(c)) {
                let Some(col) = src.columns.iter().find(|col| col.name.eq_ignore_ascii_case(&c.name))
                else {
                    continue;
                };
                if found.is_some() {
                    if c.table.is_none()
                        && scope.using.iter().any(|u| u.eq_ignore_ascii_case(&c.name))
                    {
                        continue;
                    }
                    bail!("Column '{}' is ambiguous", c.dotted());
                }
                found = Some(col);
            }
            if let Some(col) = found {
                return Ok(Some(Resolved::Source(col.tp.clone(), col.origin.clone())));
            }
        }
        if c.table.is_none() {
            if let Some(found) = Self::lookup_field(&self.scope, &c.name) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn lookup_field(scope: &Scope, name: &str) -> Option<Resolved> {
        scope
            .fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, e)| Resolved::Field(e.clone()))
    }

    fn column(&mut self, span: &Span, c: &ColumnName) -> Result<TypedExpr> {
        match self.lookup_column(c) {
            Ok(Some(Resolved::Source(tp, origin))) => {
                Ok(self.make(tp, TypedExprKind::Column { origin }))
            }
            Ok(Some(Resolved::Field(e))) => Ok(e),
            Ok(None) => bail!(span.error(&format!("Unknown column '{}'", c.dotted()))),
            Err(e) => bail!(span.error(&e.to_string())),
        }
    }

    fn table_column(&mut self, info: &TableInfo, c: &ColumnName) -> Result<TypedExpr> {
        match info.column(&c.name) {
            Some(col) => {
                let origin = info.origin(col);
                Ok(self.make(col.tp.clone(), TypedExprKind::Column { origin }))
            }
            None => bail!("Unknown column '{}' in '{}'", c.dotted(), info.name),
        }
    }

    // Queries.

    fn query(&mut self, q: &Query) -> Result<Planned> {
        let mut planned = match &q.body {
            QueryBody::Select(s) => self.select(s, &q.order_by)?,
            body => {
                let planned = self.query_body(body)?;
                self.order_output(planned, &q.order_by)?
            }
        };
        if q.limit.is_some() {
            planned.plan = PhysicalPlan::Limit {
                child: Box::new(planned.plan),
            };
        }
        Ok(planned)
    }

    fn query_body(&mut self, body: &QueryBody) -> Result<Planned> {
        match body {
            QueryBody::Select(s) => self.select(s, &[]),
            QueryBody::Nested(q) => self.query(q),
            QueryBody::Union { left, right, .. } => {
                let mut children = vec![];
                let mut names = vec![];
                for side in [left, right] {
                    let planned = self.query_body(side)?;
                    if names.is_empty() {
                        names = planned.names;
                    } else if names.len() != planned.names.len() {
                        bail!("The used SELECT statements have a different number of columns");
                    }
                    match planned.plan {
                        PhysicalPlan::Union { children: c } => children.extend(c),
                        p => children.push(p),
                    }
                }
                Ok(Planned {
                    plan: PhysicalPlan::Union { children },
                    names,
                })
            }
        }
    }

    /// ORDER BY over the output of a union.
    fn order_output(&mut self, planned: Planned, order_by: &[ByItem]) -> Result<Planned> {
        if order_by.is_empty() {
            return Ok(planned);
        }
        self.enter_scope();
        self.scope.alias_first = true;
        self.scope.fields = planned
            .names
            .iter()
            .cloned()
            .zip(planned.plan.output().iter().cloned())
            .collect();
        let by = self.by_items(order_by);
        self.leave_scope();
        Ok(Planned {
            plan: PhysicalPlan::Sort {
                child: Box::new(planned.plan),
                by: by?,
            },
            names: planned.names,
        })
    }

    fn by_items(&mut self, items: &[ByItem]) -> Result<Vec<TypedExpr>> {
        let mut exprs = vec![];
        for item in items {
            match &item.expr {
                ByItemExpr::Position(n) => {
                    let field = (*n as usize)
                        .checked_sub(1)
                        .and_then(|idx| self.scope.fields.get(idx));
                    match field {
                        Some((_, e)) => exprs.push(e.clone()),
                        None => bail!("Unknown column '{n}' in 'order clause'"),
                    }
                }
                ByItemExpr::Expr(e) => exprs.push(self.expr(e)?),
            }
        }
        Ok(exprs)
    }

    fn select(&mut self, s: &Select, order_by: &[ByItem]) -> Result<Planned> {
        self.enter_scope();
        let planned = self.select_in_scope(s, order_by);
        let scope = self.leave_scope();
        let planned = planned?;
        Ok(Planned {
            plan: wrap_subplans(planned.plan, scope.subplans),
            names: planned.names,
        })
    }

    fn select_in_scope(&mut self, s: &Select, order_by: &[ByItem]) -> Result<Planned> {
        let mut plan = self.from(&s.from)?;
        if let Some(w) = &s.where_ {
            let cond = self.expr(w)?;
            plan = self.filter(plan, cond);
        }

        let mut exprs = vec![];
        let mut names = vec![];
        for item in &s.fields {
            match item {
                SelectItem::Wildcard { table } => {
                    let sources: Vec<ScopeSource> = self
                        .scope
                        .sources
                        .iter()
                        .filter(|src| {
                            table
                                .as_ref()
                                .map_or(true, |t| src.qualifier.eq_ignore_ascii_case(t))
                        })
                        .cloned()
                        .collect();
                    if sources.is_empty() {
                        match table {
                            Some(t) => bail!("Unknown table '{t}'"),
                            None => bail!("No tables used"),
                        }
                    }
                    for col in sources.into_iter().flat_map(|src| src.columns) {
                        names.push(col.name);
                        exprs.push(self.make(col.tp, TypedExprKind::Column { origin: col.origin }));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let name = match (alias, &expr.kind) {
                        (Some(alias), _) => alias.clone(),
                        (None, ExprKind::Column(c)) => c.name.clone(),
                        (None, _) => render_expr(expr),
                    };
                    names.push(name);
                    exprs.push(self.expr(expr)?);
                }
            }
        }
        self.scope.fields = names.iter().cloned().zip(exprs.iter().cloned()).collect();

        if !s.group_by.is_empty() || self.scope.aggregated {
            let group_by = self.by_items(&s.group_by)?;
            plan = PhysicalPlan::Aggregation {
                child: Box::new(plan),
                group_by,
            };
        }
        self.scope.alias_first = true;
        if let Some(h) = &s.having {
            let cond = self.expr(h)?;
            plan = PhysicalPlan::Selection {
                child: Box::new(plan),
                conditions: vec![cond],
            };
        }
        if !order_by.is_empty() {
            let by = self.by_items(order_by)?;
            plan = PhysicalPlan::Sort {
                child: Box::new(plan),
                by,
            };
        }
        Ok(Planned {
            plan: PhysicalPlan::Projection {
                child: Box::new(plan),
                exprs,
            },
            names,
        })
    }

    fn from(&mut self, from: &[TableRef]) -> Result<PhysicalPlan> {
        let mut plan: Option<PhysicalPlan> = None;
        for t in from {
            let right = self.table_ref(t)?;
            plan = Some(match plan {
                Some(left) => PhysicalPlan::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    conditions: vec![],
                },
                None => right,
            });
        }
        Ok(plan.unwrap_or(PhysicalPlan::TableDual))
    }

    fn table_ref(&mut self, t: &TableRef) -> Result<PhysicalPlan> {
        match t {
            TableRef::Table { name, alias } => {
                let info = self.table(name)?;
                self.scope
                    .sources
                    .push(ScopeSource::base(info, alias.as_deref()));
                Ok(PhysicalPlan::TableScan {
                    table: format!("{}.{}", info.db, info.name),
                })
            }
            TableRef::Derived { query, alias } => {
                let planned = self.query(query)?;
                let columns = planned
                    .names
                    .iter()
                    .zip(planned.plan.output())
                    .map(|(name, e)| ScopeColumn {
                        name: name.clone(),
                        tp: e.tp.clone(),
                        origin: match e.origin() {
                            Some(o) => o.to_string(),
                            None => format!("{alias}.{name}").to_lowercase(),
                        },
                    })
                    .collect();
                self.scope.sources.push(ScopeSource {
                    qualifier: alias.clone(),
                    db: None,
                    handle: None,
                    columns,
                });
                Ok(planned.plan)
            }
            TableRef::Join {
                left,
                right,
                on,
                using,
                ..
            } => {
                let left = self.table_ref(left)?;
                let split = self.scope.sources.len();
                let right = self.table_ref(right)?;

                let mut conditions = vec![];
                if let Some(on) = on {
                    conditions.push(self.expr(on)?);
                }
                for name in using {
                    let l = self.using_column(&self.scope.sources[..split], name)?;
                    let r = self.using_column(&self.scope.sources[split..], name)?;
                    let (l, r) = (self.make_column(l), self.make_column(r));
                    conditions.push(self.compare("eq", l, r));
                    self.scope.using.push(name.clone());
                }
                Ok(PhysicalPlan::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    conditions,
                })
            }
        }
    }

    fn using_column(&self, sources: &[ScopeSource], name: &str) -> Result<ScopeColumn> {
        sources
            .iter()
            .flat_map(|s| s.columns.iter())
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| anyhow!("Unknown column '{name}' in 'from clause'"))
    }

    fn make_column(&mut self, col: ScopeColumn) -> TypedExpr {
        self.make(col.tp, TypedExprKind::Column { origin: col.origin })
    }

    /// Apply a WHERE condition, turning integer primary key lookups on a
    /// single table into point access.
    fn filter(&self, plan: PhysicalPlan, cond: TypedExpr) -> PhysicalPlan {
        if let (PhysicalPlan::TableScan { table }, [src]) = (&plan, self.scope.sources.as_slice())
        {
            if let Some(pk) = &src.handle {
                if let Some(handle) = point_handle(&cond, pk) {
                    return PhysicalPlan::PointGet {
                        table: table.clone(),
                        conditions: vec![cond],
                        handle,
                    };
                }
                let mut handles = vec![];
                if batch_handles(&cond, pk, &mut handles) {
                    return PhysicalPlan::BatchPointGet {
                        table: table.clone(),
                        conditions: vec![cond],
                        handles,
                    };
                }
            }
        }
        PhysicalPlan::Selection {
            child: Box::new(plan),
            conditions: vec![cond],
        }
    }

    // Data manipulation.

    fn insert(&mut self, ins: &Insert) -> Result<Plan> {
        let info = self.table(&ins.table)?;
        self.enter_scope();
        self.scope.sources.push(ScopeSource::base(info, None));
        let result = self.insert_in_scope(ins, info);
        let scope = self.leave_scope();
        let (select, assignments) = result?;

        let select = match (select, scope.subplans.is_empty()) {
            (select, true) => select,
            (Some(select), false) => Some(wrap_subplans(select, scope.subplans)),
            (None, false) => Some(wrap_subplans(PhysicalPlan::TableDual, scope.subplans)),
        };
        Ok(Plan::Insert {
            select,
            assignments,
        })
    }

    fn insert_in_scope(
        &mut self,
        ins: &Insert,
        info: &TableInfo,
    ) -> Result<(Option<PhysicalPlan>, Vec<plan::Assignment>)> {
        let mut targets = vec![];
        if ins.columns.is_empty() {
            for col in &info.columns {
                let origin = info.origin(col);
                targets.push(self.make(col.tp.clone(), TypedExprKind::Column { origin }));
            }
        } else {
            for c in &ins.columns {
                targets.push(self.table_column(info, c)?);
            }
        }

        let mut select = None;
        let mut assignments = vec![];
        match &ins.source {
            InsertSource::Values(rows) => {
                for (idx, row) in rows.iter().enumerate() {
                    if row.len() != targets.len() {
                        bail!("Column count doesn't match value count at row {}", idx + 1);
                    }
                    for (column, value) in targets.iter().zip(row) {
                        let value = self.expr(value)?;
                        assignments.push(plan::Assignment {
                            column: column.clone(),
                            value,
                        });
                    }
                }
            }
            InsertSource::Set(set) => {
                for a in set {
                    let column = self.table_column(info, &a.column)?;
                    let value = self.expr(&a.value)?;
                    assignments.push(plan::Assignment { column, value });
                }
            }
            InsertSource::Query(q) => {
                let planned = self.query(q)?;
                let output = planned.plan.output();
                if output.len() != targets.len() {
                    bail!("Column count doesn't match value count at row 1");
                }
                for (column, value) in targets.iter().zip(output) {
                    assignments.push(plan::Assignment {
                        column: column.clone(),
                        value: value.clone(),
                    });
                }
                select = Some(planned.plan);
            }
        }

        for a in &ins.on_duplicate {
            let column = self.table_column(info, &a.column)?;
            let value = self.expr(&a.value)?;
            assignments.push(plan::Assignment { column, value });
        }
        Ok((select, assignments))
    }

    fn update(&mut self, upd: &Update) -> Result<Plan> {
        self.enter_scope();
        let result = self.update_in_scope(upd);
        let scope = self.leave_scope();
        let (select, assignments) = result?;
        Ok(Plan::Update {
            select: wrap_subplans(select, scope.subplans),
            assignments,
        })
    }

    fn update_in_scope(&mut self, upd: &Update) -> Result<(PhysicalPlan, Vec<plan::Assignment>)> {
        let mut select = self.table_ref(&upd.table)?;
        if let Some(w) = &upd.where_ {
            let cond = self.expr(w)?;
            select = self.filter(select, cond);
        }
        select = self.order_and_limit(select, &upd.order_by, upd.limit.is_some())?;

        let mut assignments = vec![];
        for a in &upd.set {
            let span = a.value.span.clone();
            let column = self.column(&span, &a.column)?;
            let value = self.expr(&a.value)?;
            assignments.push(plan::Assignment { column, value });
        }
        Ok((select, assignments))
    }

    fn delete(&mut self, del: &Delete) -> Result<Plan> {
        self.enter_scope();
        let result = self.delete_in_scope(del);
        let scope = self.leave_scope();
        Ok(Plan::Delete {
            select: wrap_subplans(result?, scope.subplans),
        })
    }

    fn delete_in_scope(&mut self, del: &Delete) -> Result<PhysicalPlan> {
        let info = self.table(&del.table)?;
        self.scope.sources.push(ScopeSource::base(info, None));
        let mut select = PhysicalPlan::TableScan {
            table: format!("{}.{}", info.db, info.name),
        };
        if let Some(w) = &del.where_ {
            let cond = self.expr(w)?;
            select = self.filter(select, cond);
        }
        self.order_and_limit(select, &del.order_by, del.limit.is_some())
    }

    fn order_and_limit(
        &mut self,
        mut plan: PhysicalPlan,
        order_by: &[ByItem],
        limit: bool,
    ) -> Result<PhysicalPlan> {
        if !order_by.is_empty() {
            let by = self.by_items(order_by)?;
            plan = PhysicalPlan::Sort {
                child: Box::new(plan),
                by,
            };
        }
        if limit {
            plan = PhysicalPlan::Limit {
                child: Box::new(plan),
            };
        }
        Ok(plan)
    }

    // Expressions.

    fn subquery(&mut self, q: &Query) -> Result<TypedExpr> {
        let planned = self.query(q)?;
        let (tp, origin) = match planned.plan.output().first() {
            Some(e) => (derived(&e.tp), e.origin().unwrap_or_default().to_string()),
            None => bail!("subquery returns no columns"),
        };
        let result = self.make(tp, TypedExprKind::Column { origin });
        self.scope.subplans.push((planned.plan, Some(result.clone())));
        Ok(result)
    }

    /// Compare two operands, casting both to a common type when their
    /// evaluation types differ.
    fn compare(&mut self, name: &str, l: TypedExpr, r: TypedExpr) -> TypedExpr {
        let (lt, rt) = (l.tp.eval_type(), r.tp.eval_type());
        if lt == rt || l.tp.tp == TypeCode::Null || r.tp.tp == TypeCode::Null {
            return self.func(name, vec![l, r], bool_type());
        }
        let target = if lt.is_temporal() && !rt.is_temporal() {
            derived(&l.tp)
        } else if rt.is_temporal() && !lt.is_temporal() {
            derived(&r.tp)
        } else if lt.is_temporal() {
            FieldType::from_eval_type(EvalType::Datetime)
        } else if lt == EvalType::Json || rt == EvalType::Json {
            FieldType::from_eval_type(EvalType::Json)
        } else if lt == EvalType::Int && rt == EvalType::Decimal
            || lt == EvalType::Decimal && rt == EvalType::Int
        {
            FieldType::from_eval_type(EvalType::Decimal)
        } else {
            FieldType::from_eval_type(EvalType::Real)
        };
        let l = self.cast(l, &target);
        let r = self.cast(r, &target);
        self.func(name, vec![l, r], bool_type())
    }

    fn compare_exprs(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<TypedExpr> {
        if let (ExprKind::Row(ls), ExprKind::Row(rs)) = (&lhs.kind, &rhs.kind) {
            if ls.len() != rs.len() {
                bail!(rhs.span.error(&format!("Operand should contain {} column(s)", ls.len())));
            }
            let mut conds = vec![];
            for (l, r) in ls.iter().zip(rs) {
                conds.push(self.compare_exprs(op, l, r)?);
            }
            let join = if op == BinOp::Ne { "or" } else { "and" };
            return self.chain(join, conds);
        }
        let l = self.expr(lhs)?;
        let r = self.expr(rhs)?;
        Ok(self.compare(op.func_name(), l, r))
    }

    fn arithmetic(&mut self, op: BinOp, l: TypedExpr, r: TypedExpr) -> TypedExpr {
        if matches!(op, BinOp::Add | BinOp::Sub) {
            if let (Some(Datum::Int(a)), Some(Datum::Int(b))) = (l.constant(), r.constant()) {
                let folded = match op {
                    BinOp::Add => a.checked_add(*b),
                    _ => a.checked_sub(*b),
                };
                if let Some(v) = folded {
                    let d = Datum::Int(v);
                    return self.make(d.literal_type(), TypedExprKind::Constant(d));
                }
            }
        }

        let (lk, rk) = (arith_kind(l.tp.eval_type()), arith_kind(r.tp.eval_type()));
        let mut kind = if arith_rank(lk) >= arith_rank(rk) { lk } else { rk };
        if op == BinOp::Div && kind == EvalType::Int {
            kind = EvalType::Decimal;
        }
        let l = self.cast_to(l, kind);
        let r = self.cast_to(r, kind);
        let tp = match op {
            BinOp::IntDiv => FieldType::new(TypeCode::LongLong),
            _ => FieldType::from_eval_type(kind),
        };
        self.func(op.func_name(), vec![l, r], tp)
    }

    /// `date +/- INTERVAL n unit`.
    fn date_arith(&mut self, op: BinOp, date: &Expr, interval: &Expr) -> Result<TypedExpr> {
        let date = self.expr(date)?;
        let interval = self.expr(interval)?;
        let date = if date.tp.eval_type().is_temporal() {
            date
        } else {
            self.cast_to(date, EvalType::Datetime)
        };
        let tp = derived(&date.tp);
        let name = if op == BinOp::Sub { "date_sub" } else { "date_add" };
        Ok(self.func(name, vec![date, interval], tp))
    }

    fn negate(&mut self, arg: TypedExpr) -> TypedExpr {
        let folded = match arg.constant() {
            Some(Datum::Int(v)) => v.checked_neg(),
            _ => None,
        };
        if let Some(v) = folded {
            let d = Datum::Int(v);
            return self.make(d.literal_type(), TypedExprKind::Constant(d));
        }
        let kind = arith_kind(arg.tp.eval_type());
        let arg = self.cast_to(arg, kind);
        let tp = derived(&arg.tp);
        self.func("unaryminus", vec![arg], tp)
    }

    fn bitwise(&mut self, name: &str, args: Vec<TypedExpr>) -> TypedExpr {
        let args = args
            .into_iter()
            .map(|a| self.cast_to(a, EvalType::Int))
            .collect();
        self.func(name, args, FieldType::new(TypeCode::LongLong).unsigned())
    }

    fn function(&mut self, e: &Expr, name: &str, args: &[Expr], star: bool) -> Result<TypedExpr> {
        let lname = name.to_ascii_lowercase();
        if lname == "values" {
            if let [Expr {
                kind: ExprKind::Column(c),
                span,
            }] = args
            {
                let col = self.column(span, c)?;
                let tp = derived(&col.tp);
                return Ok(self.func("values", vec![col], tp));
            }
        }
        let Some(sig) = builtins::lookup(&lname) else {
            bail!(e.span.error(&format!("FUNCTION {name} does not exist")));
        };
        if sig.aggregate {
            self.scope.aggregated = true;
        }
        if star {
            if lname != "count" {
                bail!(e.span.error(&format!("`*` is not a valid argument of {name}")));
            }
            return Ok(self.func(&lname, vec![], FieldType::new(TypeCode::LongLong)));
        }
        if args.len() < sig.min_args {
            bail!(e.span.error(&format!(
                "Incorrect parameter count in the call to native function '{name}'"
            )));
        }

        let mut typed = vec![];
        for (idx, a) in args.iter().enumerate() {
            let te = self.expr(a)?;
            let te = match sig.arg_type(idx) {
                Some(et) if !matches!(a.kind, ExprKind::Interval { .. }) => self.cast_to(te, et),
                _ => te,
            };
            typed.push(te);
        }

        let tp = match sig.ret {
            Ret::Type(tc) => FieldType::new(tc),
            Ret::Arg(idx) => typed
                .get(idx)
                .map_or_else(|| FieldType::new(TypeCode::Null), |a| derived(&a.tp)),
            Ret::Unify(from) => unify(typed.get(from..).unwrap_or(&[])),
            Ret::Sum | Ret::Avg => match typed.first().map(|a| a.tp.eval_type()) {
                Some(EvalType::Real | EvalType::String) => FieldType::new(TypeCode::Double),
                _ => FieldType::from_eval_type(EvalType::Decimal),
            },
        };
        Ok(self.func(&lname, typed, tp))
    }

    pub fn expr(&mut self, e: &Expr) -> Result<TypedExpr> {
        Ok(match &e.kind {
            ExprKind::Literal(d) => self.make(d.literal_type(), TypedExprKind::Constant(d.clone())),
            ExprKind::Bool(b) => {
                self.make(bool_type(), TypedExprKind::Constant(Datum::Int(*b as i64)))
            }
            ExprKind::Marker(m) => {
                let d = Datum::Int(m.0);
                self.make(d.literal_type(), TypedExprKind::Constant(d))
            }
            ExprKind::Param => self.make(
                FieldType::new(TypeCode::Null),
                TypedExprKind::Constant(Datum::Null),
            ),
            ExprKind::Column(c) => self.column(&e.span, c)?,
            ExprKind::Unary { op, expr } => {
                let arg = self.expr(expr)?;
                match op {
                    UnaryOp::Plus => arg,
                    UnaryOp::Not => self.func("not", vec![arg], bool_type()),
                    UnaryOp::BitNeg => self.bitwise("bitneg", vec![arg]),
                    UnaryOp::Minus => self.negate(arg),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                _ if op.is_comparison() => self.compare_exprs(*op, lhs, rhs)?,
                _ if op.is_logical() => {
                    let l = self.expr(lhs)?;
                    let r = self.expr(rhs)?;
                    self.func(op.func_name(), vec![l, r], bool_type())
                }
                BinOp::Add | BinOp::Sub if matches!(rhs.kind, ExprKind::Interval { .. }) => {
                    self.date_arith(*op, lhs, rhs)?
                }
                BinOp::Add if matches!(lhs.kind, ExprKind::Interval { .. }) => {
                    self.date_arith(*op, rhs, lhs)?
                }
                _ if op.is_arithmetic() => {
                    let l = self.expr(lhs)?;
                    let r = self.expr(rhs)?;
                    self.arithmetic(*op, l, r)
                }
                _ => {
                    let l = self.expr(lhs)?;
                    let r = self.expr(rhs)?;
                    self.bitwise(op.func_name(), vec![l, r])
                }
            },
            ExprKind::IsNull { expr, not } => {
                let arg = self.expr(expr)?;
                let is_null = self.func("isnull", vec![arg], bool_type());
                self.not(is_null, *not)
            }
            ExprKind::IsBool { expr, value, not } => {
                let arg = self.expr(expr)?;
                let name = if *value { "istrue" } else { "isfalse" };
                let is = self.func(name, vec![arg], bool_type());
                self.not(is, *not)
            }
            ExprKind::In { expr, list, not } => {
                let mut conds = vec![];
                if matches!(expr.kind, ExprKind::Row(_)) {
                    for item in list {
                        conds.push(self.compare_exprs(BinOp::Eq, expr, item)?);
                    }
                } else {
                    let x = self.expr(expr)?;
                    for item in list {
                        let item = self.expr(item)?;
                        conds.push(self.compare("eq", x.clone(), item));
                    }
                }
                let any = self.chain("or", conds)?;
                self.not(any, *not)
            }
            ExprKind::InSubquery { expr, query, not } => {
                let x = self.expr(expr)?;
                let y = self.subquery(query)?;
                let eq = self.compare("eq", x, y);
                self.not(eq, *not)
            }
            ExprKind::Between {
                expr,
                low,
                high,
                not,
            } => {
                let x = self.expr(expr)?;
                let low = self.expr(low)?;
                let high = self.expr(high)?;
                let ge = self.compare("ge", x.clone(), low);
                let le = self.compare("le", x, high);
                let both = self.func("and", vec![ge, le], bool_type());
                self.not(both, *not)
            }
            ExprKind::Like {
                expr, pattern, not, ..
            } => {
                let x = self.expr(expr)?;
                let p = self.expr(pattern)?;
                let args = vec![
                    self.cast_to(x, EvalType::String),
                    self.cast_to(p, EvalType::String),
                ];
                let like = self.func("like", args, bool_type());
                self.not(like, *not)
            }
            ExprKind::Regexp { expr, pattern, not } => {
                let x = self.expr(expr)?;
                let p = self.expr(pattern)?;
                let args = vec![
                    self.cast_to(x, EvalType::String),
                    self.cast_to(p, EvalType::String),
                ];
                let re = self.func("regexp", args, bool_type());
                self.not(re, *not)
            }
            ExprKind::Func {
                name, args, star, ..
            } => self.function(e, name, args, *star)?,
            ExprKind::Cast { expr, target } => {
                let arg = self.expr(expr)?;
                self.make(target.tp.clone(), TypedExprKind::Cast(Box::new(arg)))
            }
            ExprKind::Case {
                operand,
                whens,
                else_,
            } => {
                let operand = match operand {
                    Some(o) => Some(self.expr(o)?),
                    None => None,
                };
                let mut args = vec![];
                let mut results = vec![];
                for (when, then) in whens {
                    let when = self.expr(when)?;
                    let cond = match &operand {
                        Some(x) => self.compare("eq", x.clone(), when),
                        None => when,
                    };
                    args.push(cond);
                    results.push(self.expr(then)?);
                }
                if let Some(e) = else_ {
                    results.push(self.expr(e)?);
                }
                let tp = unify(&results);
                let mut results = results.into_iter();
                let mut all = vec![];
                for cond in args {
                    all.push(cond);
                    all.extend(results.next());
                }
                all.extend(results);
                self.func("case", all, tp)
            }
            ExprKind::Interval { expr, .. } => self.expr(expr)?,
            ExprKind::Subquery(q) => self.subquery(q)?,
            ExprKind::Exists { query, not } => {
                let planned = self.query(query)?;
                self.scope.subplans.push((planned.plan, None));
                let exists = self.func("exists", vec![], bool_type());
                self.not(exists, *not)
            }
            ExprKind::Row(items) => {
                let mut args = vec![];
                for item in items {
                    args.push(self.expr(item)?);
                }
                self.func("row", args, FieldType::new(TypeCode::Varchar))
            }
            ExprKind::Variable(_) => self.func("getvar", vec![], FieldType::new(TypeCode::Varchar)),
            ExprKind::Default => self.func("default", vec![], FieldType::new(TypeCode::Null)),
        })
    }
}

/// A resolved column reference.
enum Resolved {
    /// A column of a FROM source: type and origin.
    Source(FieldType, String),
    /// A select field referenced by name.
    Field(TypedExpr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_all, parse_one};

    fn catalog() -> Result<Catalog> {
        let mut catalog = Catalog::new();
        catalog.create_database("test", false)?;
        let ddl = "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20), price DECIMAL(10,2), created DATETIME);
                   CREATE TABLE u (uid BIGINT, tid INT, note TEXT, PRIMARY KEY (uid))";
        for stmt in parse_all("ddl", ddl)? {
            if let Statement::CreateTable(ct) = stmt {
                catalog.create_table("test", &ct)?;
            }
        }
        Ok(catalog)
    }

    fn plan(catalog: &Catalog, sql: &str) -> Result<Plan> {
        Planner::new(catalog, Some("test")).plan(&parse_one("test", sql)?)
    }

    fn select(catalog: &Catalog, sql: &str) -> Result<PhysicalPlan> {
        match plan(catalog, sql)? {
            Plan::Select(p) => Ok(p),
            p => bail!("unexpected plan {p:?}"),
        }
    }

    fn first_condition(p: &PhysicalPlan) -> Option<&TypedExpr> {
        match p.exprs().first() {
            Some(e) if !matches!(p, PhysicalPlan::Projection { .. }) => Some(e),
            _ => p.children().into_iter().find_map(first_condition),
        }
    }

    #[test]
    fn point_access() -> Result<()> {
        let catalog = catalog()?;
        let p = select(&catalog, "SELECT * FROM t WHERE id = 1000")?;
        assert_eq!(p.output().len(), 4);
        assert!(matches!(p.children()[0], PhysicalPlan::PointGet { handle: 1000, .. }));

        let p = select(&catalog, "SELECT name FROM t WHERE id IN (1000, 2000)")?;
        assert_eq!(p.children()[0].handles(), [1000i64, 2000].as_slice());

        let p = select(&catalog, "SELECT name FROM t WHERE id = 1000 AND name = 'x'")?;
        assert!(matches!(p.children()[0], PhysicalPlan::Selection { .. }));
        Ok(())
    }

    #[test]
    fn implicit_casts() -> Result<()> {
        let catalog = catalog()?;
        let p = select(&catalog, "SELECT id FROM t WHERE created > 1000")?;
        let cond = first_condition(&p);
        let Some(TypedExprKind::ScalarFunc { name, args }) = cond.map(|c| &c.kind) else {
            bail!("no condition");
        };
        assert_eq!(name, "gt");
        assert!(args[1].is_cast() && args[1].tp.tp == TypeCode::Datetime);
        assert!(args[0].is_column());

        let p = select(&catalog, "SELECT price * 1000 FROM t")?;
        let out = &p.output()[0];
        assert_eq!(out.tp.eval_type(), EvalType::Decimal);
        assert!(out.args()[1].is_cast());

        let p = select(&catalog, "SELECT 1000 + 1")?;
        assert!(matches!(p.output()[0].constant(), Some(Datum::Int(1001))));
        Ok(())
    }

    #[test]
    fn resolution_errors() -> Result<()> {
        let catalog = catalog()?;
        assert!(select(&catalog, "SELECT nope FROM t").is_err());
        assert!(select(&catalog, "SELECT * FROM nope").is_err());
        assert!(select(&catalog, "SELECT id FROM t, t AS t2").is_err());
        assert!(select(&catalog, "SELECT no_such_func(1)").is_err());
        assert!(plan(&catalog, "INSERT INTO t (id, name) VALUES (1)").is_err());

        let stmt = parse_one("test", "SELECT 1 FROM t")?;
        assert!(Planner::new(&catalog, None).plan(&stmt).is_err());
        Ok(())
    }

    #[test]
    fn aggregates_group_implicitly() -> Result<()> {
        let catalog = catalog()?;
        let p = select(&catalog, "SELECT COUNT(*) FROM t WHERE name = 'a'")?;
        let PhysicalPlan::Projection { child, .. } = &p else {
            panic!("unexpected plan {p:?}");
        };
        assert!(matches!(**child, PhysicalPlan::Aggregation { ref group_by, .. } if group_by.is_empty()));

        let p = select(&catalog, "SELECT UPPER(name) FROM t")?;
        let PhysicalPlan::Projection { child, .. } = &p else {
            panic!("unexpected plan {p:?}");
        };
        assert!(!matches!(**child, PhysicalPlan::Aggregation { .. }));
        Ok(())
    }

    #[test]
    fn scopes_and_subqueries() -> Result<()> {
        let catalog = catalog()?;
        let p = select(
            &catalog,
            "SELECT x.name AS n, (SELECT note FROM u WHERE u.tid = x.id) FROM t AS x ORDER BY n",
        )?;
        assert!(matches!(p, PhysicalPlan::Apply { .. }));
        assert_eq!(p.output().len(), 2);
        assert_eq!(p.output()[1].origin(), Some("test.u.note"));

        let p = select(&catalog, "SELECT d.v FROM (SELECT name AS v FROM t) AS d")?;
        assert_eq!(p.output()[0].origin(), Some("test.t.name"));

        select(&catalog, "SELECT tid FROM t JOIN u ON t.id = u.tid GROUP BY tid HAVING COUNT(*) > 1")?;
        select(&catalog, "SELECT name FROM t UNION SELECT note FROM u ORDER BY 1")?;
        Ok(())
    }

    #[test]
    fn assignments() -> Result<()> {
        let catalog = catalog()?;
        let Plan::Insert { assignments, .. } = plan(
            &catalog,
            "INSERT INTO t (id, name) VALUES (1000, 2000), (3000, 4000) ON DUPLICATE KEY UPDATE name = VALUES(name)",
        )?
        else {
            bail!("not an insert");
        };
        assert_eq!(assignments.len(), 5);
        assert_eq!(assignments[3].column.origin(), Some("test.t.name"));
        assert_eq!(assignments[4].value.tp.tp, TypeCode::Varchar);

        let Plan::Insert { assignments, select } =
            plan(&catalog, "INSERT INTO u (uid, note) SELECT id, name FROM t")?
        else {
            bail!("not an insert");
        };
        assert!(select.is_some());
        assert_eq!(assignments[1].value.origin(), Some("test.t.name"));

        let Plan::Update { assignments, select } =
            plan(&catalog, "UPDATE t SET price = price + 1000 WHERE id = 2000")?
        else {
            bail!("not an update");
        };
        assert!(matches!(select, PhysicalPlan::PointGet { handle: 2000, .. }));
        assert_eq!(assignments[0].value.tp.eval_type(), EvalType::Decimal);
        Ok(())
    }
}
