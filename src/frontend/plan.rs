// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed plans produced by the planner. Every expression carries its
//! resolved type and an id that is unique within one plan.

use crate::datum::Datum;
use crate::types::FieldType;

pub type ExprId = usize;

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub id: ExprId,
    pub tp: FieldType,
    pub kind: TypedExprKind,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    /// A column of a base table (`origin` is `db.table.column`), a derived
    /// table or a subquery result.
    Column { origin: String },
    Constant(Datum),
    ScalarFunc { name: String, args: Vec<TypedExpr> },
    Cast(Box<TypedExpr>),
}

impl TypedExpr {
    pub fn args(&self) -> &[TypedExpr] {
        match &self.kind {
            TypedExprKind::ScalarFunc { args, .. } => args,
            TypedExprKind::Cast(arg) => std::slice::from_ref(arg.as_ref()),
            TypedExprKind::Column { .. } | TypedExprKind::Constant(_) => &[],
        }
    }

    pub fn is_cast(&self) -> bool {
        matches!(self.kind, TypedExprKind::Cast(_))
    }

    pub fn is_column(&self) -> bool {
        matches!(self.kind, TypedExprKind::Column { .. })
    }

    pub fn origin(&self) -> Option<&str> {
        match &self.kind {
            TypedExprKind::Column { origin } if !origin.is_empty() => Some(origin),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<&Datum> {
        match &self.kind {
            TypedExprKind::Constant(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    /// A query without a FROM clause.
    TableDual,
    TableScan {
        table: String,
    },
    /// Single-row access through the integer primary key.
    PointGet {
        table: String,
        conditions: Vec<TypedExpr>,
        handle: i64,
    },
    BatchPointGet {
        table: String,
        conditions: Vec<TypedExpr>,
        handles: Vec<i64>,
    },
    Selection {
        child: Box<PhysicalPlan>,
        conditions: Vec<TypedExpr>,
    },
    Projection {
        child: Box<PhysicalPlan>,
        exprs: Vec<TypedExpr>,
    },
    Aggregation {
        child: Box<PhysicalPlan>,
        group_by: Vec<TypedExpr>,
    },
    Sort {
        child: Box<PhysicalPlan>,
        by: Vec<TypedExpr>,
    },
    Join {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        conditions: Vec<TypedExpr>,
    },
    /// Evaluates `inner` (a subquery) for rows of `outer`.
    Apply {
        outer: Box<PhysicalPlan>,
        inner: Box<PhysicalPlan>,
        /// The column standing for the subquery's value in `outer`. `EXISTS`
        /// has none.
        result: Option<TypedExpr>,
    },
    Limit {
        child: Box<PhysicalPlan>,
    },
    Union {
        children: Vec<PhysicalPlan>,
    },
}

impl PhysicalPlan {
    pub fn children(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::TableDual
            | PhysicalPlan::TableScan { .. }
            | PhysicalPlan::PointGet { .. }
            | PhysicalPlan::BatchPointGet { .. } => vec![],
            PhysicalPlan::Selection { child, .. }
            | PhysicalPlan::Projection { child, .. }
            | PhysicalPlan::Aggregation { child, .. }
            | PhysicalPlan::Sort { child, .. }
            | PhysicalPlan::Limit { child } => vec![&**child],
            PhysicalPlan::Join { left, right, .. } => vec![&**left, &**right],
            PhysicalPlan::Apply { outer, inner, .. } => vec![&**outer, &**inner],
            PhysicalPlan::Union { children } => children.iter().collect(),
        }
    }

    /// Expressions evaluated by this node itself.
    pub fn exprs(&self) -> &[TypedExpr] {
        match self {
            PhysicalPlan::PointGet { conditions, .. }
            | PhysicalPlan::BatchPointGet { conditions, .. }
            | PhysicalPlan::Selection { conditions, .. }
            | PhysicalPlan::Join { conditions, .. } => conditions,
            PhysicalPlan::Projection { exprs, .. } => exprs,
            PhysicalPlan::Aggregation { group_by, .. } => group_by,
            PhysicalPlan::Sort { by, .. } => by,
            _ => &[],
        }
    }

    /// Integer row handles exposed by point access.
    pub fn handles(&self) -> &[i64] {
        match self {
            PhysicalPlan::PointGet { handle, .. } => std::slice::from_ref(handle),
            PhysicalPlan::BatchPointGet { handles, .. } => handles,
            _ => &[],
        }
    }

    /// Output expressions of the topmost projection.
    pub fn output(&self) -> &[TypedExpr] {
        match self {
            PhysicalPlan::Projection { exprs, .. } => exprs,
            PhysicalPlan::Union { children } => match children.first() {
                Some(c) => c.output(),
                None => &[],
            },
            _ => match self.children().first() {
                Some(&child) => child.output(),
                None => &[],
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: TypedExpr,
    pub value: TypedExpr,
}

#[derive(Debug, Clone)]
pub enum Plan {
    Select(PhysicalPlan),
    Insert {
        /// Source query of `INSERT ... SELECT`.
        select: Option<PhysicalPlan>,
        /// Target columns paired with values, positionally for `VALUES` and
        /// `SELECT` sources.
        assignments: Vec<Assignment>,
    },
    Update {
        select: PhysicalPlan,
        assignments: Vec<Assignment>,
    },
    Delete {
        select: PhysicalPlan,
    },
    /// Statements that are executed rather than planned.
    Simple,
}
