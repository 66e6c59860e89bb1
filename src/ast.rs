// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::datum::Datum;
use crate::lexer::Span;
use crate::marker::Marker;
use crate::types::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    Xor,
    And,
    Eq,
    NullEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitAnd,
    BitXor,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NullEq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::Or | BinOp::Xor | BinOp::And)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Mod
        )
    }

    /// Name used for the corresponding planned scalar function.
    pub fn func_name(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::And => "and",
            BinOp::Eq => "eq",
            BinOp::NullEq => "nulleq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::BitOr => "bitor",
            BinOp::BitAnd => "bitand",
            BinOp::BitXor => "bitxor",
            BinOp::Shl => "leftshift",
            BinOp::Shr => "rightshift",
            BinOp::Add => "plus",
            BinOp::Sub => "minus",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::IntDiv => "intdiv",
            BinOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNeg,
}

/// Target of `CAST(expr AS ...)` and `CONVERT(expr, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CastTarget {
    /// Keyword as written, for rendering (`SIGNED`, `CHAR(10)`, ...).
    pub text: String,
    pub tp: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub db: Option<String>,
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    pub fn dotted(&self) -> String {
        let mut parts = vec![];
        if let Some(db) = &self.db {
            parts.push(db.as_str());
        }
        if let Some(t) = &self.table {
            parts.push(t.as_str());
        }
        parts.push(self.name.as_str());
        parts.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub db: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn dotted(&self) -> String {
        match &self.db {
            Some(db) => format!("{db}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Datum),
    Bool(bool),
    Marker(Marker),
    Param,
    Column(ColumnName),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        not: bool,
    },
    IsBool {
        expr: Box<Expr>,
        value: bool,
        not: bool,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        not: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<Query>,
        not: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        not: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<char>,
        not: bool,
    },
    Regexp {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        not: bool,
    },
    Func {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
        star: bool,
    },
    Cast {
        expr: Box<Expr>,
        target: CastTarget,
    },
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
    Interval {
        expr: Box<Expr>,
        unit: String,
    },
    Subquery(Box<Query>),
    Exists {
        query: Box<Query>,
        not: bool,
    },
    Row(Vec<Expr>),
    Variable(String),
    Default,
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    /// `COUNT(<literal>)`, whose argument must stay as written.
    pub fn is_count_of_literal(&self) -> bool {
        match &self.kind {
            ExprKind::Func { name, args, .. } if name.eq_ignore_ascii_case("count") => {
                args.len() == 1
                    && matches!(
                        args[0].kind,
                        ExprKind::Literal(_) | ExprKind::Bool(_) | ExprKind::Marker(_)
                    )
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    Wildcard { table: Option<String> },
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone)]
pub enum TableRef {
    Table {
        name: TableName,
        alias: Option<String>,
    },
    Derived {
        query: Box<Query>,
        alias: String,
    },
    Join {
        left: Box<TableRef>,
        right: Box<TableRef>,
        kind: JoinKind,
        on: Option<Expr>,
        using: Vec<String>,
    },
}

/// An item of `ORDER BY` or `GROUP BY`.
#[derive(Debug, Clone)]
pub enum ByItemExpr {
    /// `ORDER BY 2` refers to the second select field, not to a value.
    Position(u64),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct ByItem {
    pub expr: ByItemExpr,
    pub desc: bool,
}

#[derive(Debug, Clone)]
pub struct Limit {
    pub count: Expr,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Select {
    pub distinct: bool,
    pub fields: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub where_: Option<Expr>,
    pub group_by: Vec<ByItem>,
    pub having: Option<Expr>,
    pub for_update: bool,
}

#[derive(Debug, Clone)]
pub enum QueryBody {
    Select(Box<Select>),
    Union {
        left: Box<QueryBody>,
        right: Box<QueryBody>,
        all: bool,
    },
    Nested(Box<Query>),
}

#[derive(Debug, Clone)]
pub struct Query {
    pub body: QueryBody,
    pub order_by: Vec<ByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: ColumnName,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<Query>),
    Set(Vec<Assignment>),
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub replace: bool,
    pub ignore: bool,
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    pub source: InsertSource,
    pub on_duplicate: Vec<Assignment>,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub table: TableRef,
    pub set: Vec<Assignment>,
    pub where_: Option<Expr>,
    pub order_by: Vec<ByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone)]
pub struct Delete {
    pub table: TableName,
    pub where_: Option<Expr>,
    pub order_by: Vec<ByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone)]
pub enum ColumnOption {
    PrimaryKey,
    NotNull,
    Null,
    AutoIncrement,
    Unique,
    Default(Expr),
    OnUpdate(Expr),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    /// Type as written, for rendering.
    pub type_text: String,
    pub tp: FieldType,
    pub options: Vec<ColumnOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Index,
    ForeignKey,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: Option<String>,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    /// Referenced table and columns of a foreign key.
    pub references: Option<(TableName, Vec<String>)>,
}

#[derive(Debug, Clone)]
pub struct CreateTable {
    pub name: TableName,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<Constraint>,
    /// Table options after the closing parenthesis, kept as written.
    pub options: String,
}

#[derive(Debug, Clone)]
pub enum SetItem {
    Variable { name: String, value: Expr },
    Names(String),
}

#[derive(Debug, Clone)]
pub enum Statement {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateDatabase { name: String, if_not_exists: bool },
    CreateTable(CreateTable),
    DropTable { names: Vec<TableName>, if_exists: bool },
    DropDatabase { name: String, if_exists: bool },
    Use(String),
    Set(Vec<SetItem>),
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// Statements that only change schema or session state.
    pub fn is_simple(&self) -> bool {
        !matches!(
            self,
            Statement::Query(_) | Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_)
        )
    }
}
