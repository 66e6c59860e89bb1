// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt::{self, Write as _};

use crate::ast::*;
use crate::datum::Datum;
use crate::parser::is_reserved;
use crate::time::TimeKind;

/// Render a statement back to SQL text.
pub fn render_statement(stmt: &Statement) -> String {
    let mut w = SqlWriter::default();
    w.statement(stmt);
    w.out
}

pub fn render_expr(expr: &Expr) -> String {
    let mut w = SqlWriter::default();
    w.expr(expr, 0);
    w.out
}

/// Render a value as a SQL literal.
pub fn render_datum(d: &Datum) -> String {
    match d {
        Datum::Null => "NULL".to_string(),
        Datum::Int(v) => v.to_string(),
        Datum::Uint(v) => v.to_string(),
        Datum::Float32(v) => format!("{v:?}"),
        Datum::Float64(v) => format!("{v:?}"),
        Datum::Decimal(v) => v.to_string(),
        Datum::String(s) => quote_string(s),
        Datum::Bytes(b) => format!("x'{}'", data_encoding::HEXLOWER.encode(b)),
        Datum::Time(t) => match t.kind {
            TimeKind::Date => format!("DATE {}", quote_string(&t.to_string())),
            _ => format!("TIMESTAMP {}", quote_string(&t.to_string())),
        },
        Datum::Duration(v) => format!("TIME {}", quote_string(&v.to_string())),
        Datum::Enum { name, .. } | Datum::Set { name, .. } => quote_string(name),
        Datum::Json(v) => quote_string(&v.to_string()),
    }
}

pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Identifiers are left bare unless they would not lex back as the same name.
pub fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !is_reserved(name);
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

pub fn column_text(c: &ColumnName) -> String {
    let mut parts = vec![];
    if let Some(db) = &c.db {
        parts.push(quote_ident(db));
    }
    if let Some(t) = &c.table {
        parts.push(quote_ident(t));
    }
    parts.push(quote_ident(&c.name));
    parts.join(".")
}

pub fn table_text(t: &TableName) -> String {
    match &t.db {
        Some(db) => format!("{}.{}", quote_ident(db), quote_ident(&t.name)),
        None => quote_ident(&t.name),
    }
}

// Operator binding strength, loosest first.
const PREC_OR: u8 = 1;
const PREC_XOR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_PREDICATE: u8 = 5;
const PREC_BITOR: u8 = 6;
const PREC_UNARY: u8 = 12;
const PREC_PRIMARY: u8 = 13;

fn binop_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Or => PREC_OR,
        BinOp::Xor => PREC_XOR,
        BinOp::And => PREC_AND,
        BinOp::Eq | BinOp::NullEq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            PREC_PREDICATE
        }
        BinOp::BitOr => PREC_BITOR,
        BinOp::BitAnd => 7,
        BinOp::Shl | BinOp::Shr => 8,
        BinOp::Add | BinOp::Sub => 9,
        BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Mod => 10,
        BinOp::BitXor => 11,
    }
}

fn binop_text(op: BinOp) -> &'static str {
    match op {
        BinOp::Or => "OR",
        BinOp::Xor => "XOR",
        BinOp::And => "AND",
        BinOp::Eq => "=",
        BinOp::NullEq => "<=>",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::BitOr => "|",
        BinOp::BitAnd => "&",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::IntDiv => "DIV",
        BinOp::Mod => "%",
    }
}

fn expr_prec(e: &Expr) -> u8 {
    match &e.kind {
        ExprKind::Binary { op, .. } => binop_prec(*op),
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => PREC_NOT,
        ExprKind::Unary { .. } => PREC_UNARY,
        ExprKind::IsNull { .. }
        | ExprKind::IsBool { .. }
        | ExprKind::In { .. }
        | ExprKind::InSubquery { .. }
        | ExprKind::Between { .. }
        | ExprKind::Like { .. }
        | ExprKind::Regexp { .. } => PREC_PREDICATE,
        _ => PREC_PRIMARY,
    }
}

#[derive(Default)]
struct SqlWriter {
    out: String,
}

impl SqlWriter {
    // Writing into a String never fails.
    fn put(&mut self, args: fmt::Arguments) {
        let _ = self.out.write_fmt(args);
    }

    fn s(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn list<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) {
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                self.s(", ");
            }
            f(self, item);
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Query(q) => self.query(q),
            Statement::Insert(ins) => self.insert(ins),
            Statement::Update(upd) => {
                self.s("UPDATE ");
                self.table_ref(&upd.table);
                self.s(" SET ");
                self.assignments(&upd.set);
                self.where_(upd.where_.as_ref());
                self.order_by(&upd.order_by);
                self.limit(upd.limit.as_ref());
            }
            Statement::Delete(del) => {
                self.put(format_args!("DELETE FROM {}", table_text(&del.table)));
                self.where_(del.where_.as_ref());
                self.order_by(&del.order_by);
                self.limit(del.limit.as_ref());
            }
            Statement::CreateDatabase {
                name,
                if_not_exists,
            } => {
                self.s("CREATE DATABASE ");
                if *if_not_exists {
                    self.s("IF NOT EXISTS ");
                }
                self.s(&quote_ident(name));
            }
            Statement::CreateTable(ct) => self.create_table(ct),
            Statement::DropTable { names, if_exists } => {
                self.s("DROP TABLE ");
                if *if_exists {
                    self.s("IF EXISTS ");
                }
                self.list(names, |w, n| w.s(&table_text(n)));
            }
            Statement::DropDatabase { name, if_exists } => {
                self.s("DROP DATABASE ");
                if *if_exists {
                    self.s("IF EXISTS ");
                }
                self.s(&quote_ident(name));
            }
            Statement::Use(db) => self.put(format_args!("USE {}", quote_ident(db))),
            Statement::Set(items) => {
                self.s("SET ");
                self.list(items, |w, item| match item {
                    SetItem::Names(charset) => w.put(format_args!("NAMES {charset}")),
                    SetItem::Variable { name, value } => {
                        w.put(format_args!("{name} = "));
                        w.expr(value, 0);
                    }
                });
            }
            Statement::Begin => self.s("BEGIN"),
            Statement::Commit => self.s("COMMIT"),
            Statement::Rollback => self.s("ROLLBACK"),
        }
    }

    fn query(&mut self, q: &Query) {
        self.query_body(&q.body);
        self.order_by(&q.order_by);
        self.limit(q.limit.as_ref());
        if let QueryBody::Select(s) = &q.body {
            if s.for_update {
                self.s(" FOR UPDATE");
            }
        }
    }

    fn query_body(&mut self, body: &QueryBody) {
        match body {
            QueryBody::Select(s) => self.select(s),
            QueryBody::Union { left, right, all } => {
                self.query_body(left);
                self.s(if *all { " UNION ALL " } else { " UNION " });
                self.query_body(right);
            }
            QueryBody::Nested(q) => {
                self.s("(");
                self.query(q);
                self.s(")");
            }
        }
    }

    fn select(&mut self, s: &Select) {
        self.s("SELECT ");
        if s.distinct {
            self.s("DISTINCT ");
        }
        self.list(&s.fields, |w, f| match f {
            SelectItem::Wildcard { table: None } => w.s("*"),
            SelectItem::Wildcard { table: Some(t) } => w.put(format_args!("{}.*", quote_ident(t))),
            SelectItem::Expr { expr, alias } => {
                w.expr(expr, 0);
                if let Some(alias) = alias {
                    w.put(format_args!(" AS {}", quote_ident(alias)));
                }
            }
        });
        if !s.from.is_empty() {
            self.s(" FROM ");
            self.list(&s.from, |w, t| w.table_ref(t));
        }
        self.where_(s.where_.as_ref());
        if !s.group_by.is_empty() {
            self.s(" GROUP BY ");
            self.by_items(&s.group_by);
        }
        if let Some(h) = &s.having {
            self.s(" HAVING ");
            self.expr(h, 0);
        }
    }

    fn table_ref(&mut self, t: &TableRef) {
        match t {
            TableRef::Table { name, alias } => {
                self.s(&table_text(name));
                if let Some(alias) = alias {
                    self.put(format_args!(" AS {}", quote_ident(alias)));
                }
            }
            TableRef::Derived { query, alias } => {
                self.s("(");
                self.query(query);
                self.put(format_args!(") AS {}", quote_ident(alias)));
            }
            TableRef::Join {
                left,
                right,
                kind,
                on,
                using,
            } => {
                self.table_ref(left);
                self.s(match kind {
                    JoinKind::Inner => " JOIN ",
                    JoinKind::Left => " LEFT JOIN ",
                    JoinKind::Right => " RIGHT JOIN ",
                    JoinKind::Cross => " CROSS JOIN ",
                });
                if matches!(right.as_ref(), TableRef::Join { .. }) {
                    self.s("(");
                    self.table_ref(right);
                    self.s(")");
                } else {
                    self.table_ref(right);
                }
                if let Some(on) = on {
                    self.s(" ON ");
                    self.expr(on, 0);
                } else if !using.is_empty() {
                    self.s(" USING (");
                    self.list(using, |w, c| w.s(&quote_ident(c)));
                    self.s(")");
                }
            }
        }
    }

    fn where_(&mut self, w: Option<&Expr>) {
        if let Some(w) = w {
            self.s(" WHERE ");
            self.expr(w, 0);
        }
    }

    fn by_items(&mut self, items: &[ByItem]) {
        self.list(items, |w, item| {
            match &item.expr {
                ByItemExpr::Position(p) => w.put(format_args!("{p}")),
                ByItemExpr::Expr(e) => w.expr(e, 0),
            }
            if item.desc {
                w.s(" DESC");
            }
        });
    }

    fn order_by(&mut self, items: &[ByItem]) {
        if !items.is_empty() {
            self.s(" ORDER BY ");
            self.by_items(items);
        }
    }

    fn limit(&mut self, limit: Option<&Limit>) {
        let Some(limit) = limit else {
            return;
        };
        self.s(" LIMIT ");
        match &limit.offset {
            // Keep the written order so that `?` placeholders keep their positions.
            Some(offset) if offset.span.start < limit.count.span.start => {
                self.expr(offset, 0);
                self.s(", ");
                self.expr(&limit.count, 0);
            }
            Some(offset) => {
                self.expr(&limit.count, 0);
                self.s(" OFFSET ");
                self.expr(offset, 0);
            }
            None => self.expr(&limit.count, 0),
        }
    }

    fn assignments(&mut self, assignments: &[Assignment]) {
        self.list(assignments, |w, a| {
            w.put(format_args!("{} = ", column_text(&a.column)));
            w.expr(&a.value, 0);
        });
    }

    fn insert(&mut self, ins: &Insert) {
        self.s(if ins.replace { "REPLACE " } else { "INSERT " });
        if ins.ignore {
            self.s("IGNORE ");
        }
        self.put(format_args!("INTO {}", table_text(&ins.table)));
        if !ins.columns.is_empty() {
            self.s(" (");
            self.list(&ins.columns, |w, c| w.s(&column_text(c)));
            self.s(")");
        }
        match &ins.source {
            InsertSource::Values(rows) => {
                self.s(" VALUES ");
                self.list(rows, |w, row| {
                    w.s("(");
                    w.list(row, |w, e| w.expr(e, 0));
                    w.s(")");
                });
            }
            InsertSource::Query(q) => {
                self.s(" ");
                self.query(q);
            }
            InsertSource::Set(assignments) => {
                self.s(" SET ");
                self.assignments(assignments);
            }
        }
        if !ins.on_duplicate.is_empty() {
            self.s(" ON DUPLICATE KEY UPDATE ");
            self.assignments(&ins.on_duplicate);
        }
    }

    fn create_table(&mut self, ct: &CreateTable) {
        self.s("CREATE TABLE ");
        if ct.if_not_exists {
            self.s("IF NOT EXISTS ");
        }
        self.s(&table_text(&ct.name));
        self.s(" (");
        self.list(&ct.columns, |w, c| w.column_def(c));
        for c in &ct.constraints {
            self.s(", ");
            self.constraint(c);
        }
        self.s(")");
        if !ct.options.is_empty() {
            self.put(format_args!(" {}", ct.options));
        }
    }

    fn column_def(&mut self, c: &ColumnDef) {
        self.put(format_args!("{} {}", quote_ident(&c.name), c.type_text));
        for opt in &c.options {
            match opt {
                ColumnOption::PrimaryKey => self.s(" PRIMARY KEY"),
                ColumnOption::NotNull => self.s(" NOT NULL"),
                ColumnOption::Null => self.s(" NULL"),
                ColumnOption::AutoIncrement => self.s(" AUTO_INCREMENT"),
                ColumnOption::Unique => self.s(" UNIQUE"),
                ColumnOption::Default(e) => {
                    self.s(" DEFAULT ");
                    self.expr(e, PREC_PRIMARY);
                }
                ColumnOption::OnUpdate(e) => {
                    self.s(" ON UPDATE ");
                    self.expr(e, PREC_PRIMARY);
                }
                ColumnOption::Comment(text) => {
                    self.put(format_args!(" COMMENT {}", quote_string(text)));
                }
            }
        }
    }

    fn constraint(&mut self, c: &Constraint) {
        let columns = |w: &mut Self, cols: &[String]| {
            w.s("(");
            w.list(cols, |w, c| w.s(&quote_ident(c)));
            w.s(")");
        };
        match c.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::ForeignKey => {
                if let Some(name) = &c.name {
                    self.put(format_args!("CONSTRAINT {} ", quote_ident(name)));
                }
                self.s(if c.kind == ConstraintKind::PrimaryKey {
                    "PRIMARY KEY "
                } else {
                    "FOREIGN KEY "
                });
            }
            ConstraintKind::Unique | ConstraintKind::Index => {
                self.s(if c.kind == ConstraintKind::Unique {
                    "UNIQUE KEY "
                } else {
                    "KEY "
                });
                if let Some(name) = &c.name {
                    self.put(format_args!("{} ", quote_ident(name)));
                }
            }
        }
        columns(self, &c.columns);
        if let Some((table, cols)) = &c.references {
            self.put(format_args!(" REFERENCES {} ", table_text(table)));
            columns(self, cols);
        }
    }

    /// Render `e`, parenthesized when it binds looser than `min`.
    fn expr(&mut self, e: &Expr, min: u8) {
        if expr_prec(e) < min {
            self.s("(");
            self.expr_inner(e);
            self.s(")");
        } else {
            self.expr_inner(e);
        }
    }

    fn expr_inner(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(d) => self.s(&render_datum(d)),
            ExprKind::Bool(b) => self.s(if *b { "TRUE" } else { "FALSE" }),
            ExprKind::Marker(m) => self.put(format_args!("{}", m.0)),
            ExprKind::Param => self.s("?"),
            ExprKind::Column(c) => self.s(&column_text(c)),
            ExprKind::Variable(v) => self.s(v),
            ExprKind::Default => self.s("DEFAULT"),
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    self.s("NOT ");
                    self.expr(expr, PREC_NOT);
                }
                _ => {
                    self.s(match op {
                        UnaryOp::Minus => "-",
                        UnaryOp::Plus => "+",
                        _ => "~",
                    });
                    let start = self.out.len();
                    self.expr(expr, PREC_UNARY);
                    // `--` would start a comment.
                    if matches!(op, UnaryOp::Minus) && self.out[start..].starts_with('-') {
                        self.out.insert(start, ' ');
                    }
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let p = binop_prec(*op);
                self.expr(lhs, p);
                self.put(format_args!(" {} ", binop_text(*op)));
                self.expr(rhs, p + 1);
            }
            ExprKind::IsNull { expr, not } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " IS NOT NULL" } else { " IS NULL" });
            }
            ExprKind::IsBool { expr, value, not } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " IS NOT " } else { " IS " });
                self.s(if *value { "TRUE" } else { "FALSE" });
            }
            ExprKind::In { expr, list, not } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " NOT IN (" } else { " IN (" });
                self.list(list, |w, e| w.expr(e, 0));
                self.s(")");
            }
            ExprKind::InSubquery { expr, query, not } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " NOT IN (" } else { " IN (" });
                self.query(query);
                self.s(")");
            }
            ExprKind::Between {
                expr,
                low,
                high,
                not,
            } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " NOT BETWEEN " } else { " BETWEEN " });
                self.expr(low, PREC_BITOR);
                self.s(" AND ");
                self.expr(high, PREC_BITOR);
            }
            ExprKind::Like {
                expr,
                pattern,
                escape,
                not,
            } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " NOT LIKE " } else { " LIKE " });
                self.expr(pattern, PREC_BITOR);
                if let Some(c) = escape {
                    self.put(format_args!(" ESCAPE {}", quote_string(&c.to_string())));
                }
            }
            ExprKind::Regexp { expr, pattern, not } => {
                self.expr(expr, PREC_PREDICATE);
                self.s(if *not { " NOT REGEXP " } else { " REGEXP " });
                self.expr(pattern, PREC_BITOR);
            }
            ExprKind::Func {
                name,
                args,
                distinct,
                star,
            } => {
                self.put(format_args!("{}(", name.to_uppercase()));
                if *star {
                    self.s("*");
                } else {
                    if *distinct {
                        self.s("DISTINCT ");
                    }
                    self.list(args, |w, a| w.expr(a, 0));
                }
                self.s(")");
            }
            ExprKind::Cast { expr, target } => {
                self.s("CAST(");
                self.expr(expr, 0);
                self.put(format_args!(" AS {})", target.text));
            }
            ExprKind::Case {
                operand,
                whens,
                else_,
            } => {
                self.s("CASE");
                if let Some(o) = operand {
                    self.s(" ");
                    self.expr(o, 0);
                }
                for (cond, value) in whens {
                    self.s(" WHEN ");
                    self.expr(cond, 0);
                    self.s(" THEN ");
                    self.expr(value, 0);
                }
                if let Some(e) = else_ {
                    self.s(" ELSE ");
                    self.expr(e, 0);
                }
                self.s(" END");
            }
            ExprKind::Interval { expr, unit } => {
                self.s("INTERVAL ");
                self.expr(expr, PREC_BITOR);
                self.put(format_args!(" {unit}"));
            }
            ExprKind::Subquery(q) => {
                self.s("(");
                self.query(q);
                self.s(")");
            }
            ExprKind::Exists { query, not } => {
                self.s(if *not { "NOT EXISTS (" } else { "EXISTS (" });
                self.query(query);
                self.s(")");
            }
            ExprKind::Row(items) => {
                self.s("(");
                self.list(items, |w, e| w.expr(e, 0));
                self.s(")");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use anyhow::Result;

    fn roundtrip(sql: &str) -> Result<String> {
        Ok(render_statement(&parse_one("test", sql)?))
    }

    #[test]
    fn canonical_text() -> Result<()> {
        assert_eq!(
            roundtrip("select * from t where id=42")?,
            "SELECT * FROM t WHERE id = 42"
        );
        assert_eq!(roundtrip("SELECT a - -5 FROM t")?, "SELECT a - -5 FROM t");
        assert_eq!(
            roundtrip("SELECT (a + b) * c, `select` FROM t")?,
            "SELECT (a + b) * c, `select` FROM t"
        );
        assert_eq!(
            roundtrip("SELECT * FROM t LIMIT ?, ?")?,
            "SELECT * FROM t LIMIT ?, ?"
        );
        Ok(())
    }

    #[test]
    fn strings() {
        assert_eq!(quote_string("it's"), "'it\\'s'");
        assert_eq!(quote_string("a\\b"), "'a\\\\b'");
    }
}
