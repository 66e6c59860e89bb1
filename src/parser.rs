// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::datum::Datum;
use crate::decimal::Decimal;
use crate::lexer::*;
use crate::time::{Duration, Time, TimeKind};
use crate::types::*;

use anyhow::{bail, Result};

/// Words that terminate an expression or cannot be used as an implicit alias.
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "cross", "delete", "desc", "distinct",
    "div", "else", "end", "escape", "exists", "false", "for", "force", "from", "group", "having",
    "ignore", "in", "inner", "insert", "interval", "into", "is", "join", "key", "left", "like",
    "limit", "lock", "mod", "natural", "not", "null", "offset", "on", "or", "order", "outer",
    "regexp", "replace", "right", "rlike", "select", "set", "straight_join", "then", "true",
    "union", "update", "use", "using", "values", "when", "where", "xor",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    line: u32,
    end: u32,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            line: 0,
            end: 0,
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            _ => "",
        }
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.line = self.tok.1.line;
        self.end = self.tok.1.end;
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn peek_token(&self) -> Result<Token> {
        self.lexer.clone().next_token()
    }

    fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.tok.1.line, self.tok.1.col, msg)
    }

    fn unexpected(&self, context: &str) -> anyhow::Error {
        let found = match self.tok.0 {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", self.tok.1.text()),
        };
        self.error(&format!("unexpected {found} {context}"))
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.tok.0 == TokenKind::Symbol && self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.error(&msg))
        }
    }

    fn is_sym(&self, text: &str) -> bool {
        self.tok.0 == TokenKind::Symbol && self.tok.1.text() == text
    }

    fn eat_sym(&mut self, text: &str) -> Result<bool> {
        if self.is_sym(text) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        self.tok.0 == TokenKind::Ident && self.tok.1.text().eq_ignore_ascii_case(kw)
    }

    fn eat_kw(&mut self, kw: &str) -> Result<bool> {
        if self.is_kw(kw) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_kw(&mut self, kw: &str, context: &str) -> Result<()> {
        if self.eat_kw(kw)? {
            Ok(())
        } else {
            let msg = format!("expecting `{}` {context}", kw.to_uppercase());
            Err(self.error(&msg))
        }
    }

    fn peek_is_kw(&self, kw: &str) -> Result<bool> {
        let tok = self.peek_token()?;
        Ok(tok.0 == TokenKind::Ident && tok.1.text().eq_ignore_ascii_case(kw))
    }

    fn peek_is_sym(&self, text: &str) -> Result<bool> {
        let tok = self.peek_token()?;
        Ok(tok.0 == TokenKind::Symbol && tok.1.text() == text)
    }

    fn span_from(&self, start: &Span) -> Span {
        Span {
            source: self.source.clone(),
            line: start.line,
            col: start.col,
            start: start.start,
            end: self.end.max(start.start),
        }
    }

    fn is_ident(&self) -> bool {
        match self.tok.0 {
            TokenKind::QuotedIdent => true,
            TokenKind::Ident => !is_reserved(self.tok.1.text()),
            _ => false,
        }
    }

    fn ident(&mut self, context: &str) -> Result<String> {
        let name = match self.tok.0 {
            TokenKind::QuotedIdent => self.tok.1.text().replace("``", "`"),
            TokenKind::Ident if !is_reserved(self.tok.1.text()) => self.tok.1.text().to_string(),
            _ => return Err(self.unexpected(context)),
        };
        self.next_token()?;
        Ok(name)
    }

    fn string(&mut self, context: &str) -> Result<String> {
        if self.tok.0 != TokenKind::String {
            return Err(self.unexpected(context));
        }
        let quote = self.source.contents()[..self.tok.1.start as usize]
            .chars()
            .last()
            .unwrap_or('\'');
        let s = unescape_string(self.tok.1.text(), quote);
        self.next_token()?;
        Ok(s)
    }

    fn parse_u64(&mut self, context: &str) -> Result<u64> {
        if self.tok.0 != TokenKind::Number {
            return Err(self.unexpected(context));
        }
        let v = match self.tok.1.text().parse::<u64>() {
            Ok(v) => v,
            Err(_) => return Err(self.error(&format!("expecting integer {context}"))),
        };
        self.next_token()?;
        Ok(v)
    }

    // Statements.

    pub fn parse_statement(&mut self) -> Result<Statement> {
        let stmt = match self.token_text().to_ascii_lowercase().as_str() {
            "select" | "(" => Statement::Query(self.parse_query()?),
            "insert" => Statement::Insert(self.parse_insert(false)?),
            "replace" => Statement::Insert(self.parse_insert(true)?),
            "update" => Statement::Update(self.parse_update()?),
            "delete" => Statement::Delete(self.parse_delete()?),
            "create" => self.parse_create()?,
            "drop" => self.parse_drop()?,
            "use" => {
                self.next_token()?;
                Statement::Use(self.ident("after USE")?)
            }
            "set" => self.parse_set()?,
            "begin" => {
                self.next_token()?;
                self.eat_kw("work")?;
                Statement::Begin
            }
            "start" => {
                self.next_token()?;
                self.expect_kw("transaction", "after START")?;
                Statement::Begin
            }
            "commit" => {
                self.next_token()?;
                self.eat_kw("work")?;
                Statement::Commit
            }
            "rollback" => {
                self.next_token()?;
                self.eat_kw("work")?;
                Statement::Rollback
            }
            _ => bail!(self.unexpected("at start of statement")),
        };
        Ok(stmt)
    }

    /// Parse exactly one statement, optionally terminated by `;`.
    pub fn parse_one(&mut self) -> Result<Statement> {
        let stmt = self.parse_statement()?;
        self.eat_sym(";")?;
        if self.tok.0 != TokenKind::Eof {
            bail!(self.unexpected("after end of statement"));
        }
        Ok(stmt)
    }

    pub fn parse_all(&mut self) -> Result<Vec<Statement>> {
        let mut stmts = vec![];
        loop {
            while self.eat_sym(";")? {}
            if self.tok.0 == TokenKind::Eof {
                break;
            }
            stmts.push(self.parse_statement()?);
            if self.tok.0 != TokenKind::Eof && !self.is_sym(";") {
                bail!(self.unexpected("after end of statement"));
            }
        }
        Ok(stmts)
    }

    fn parse_query(&mut self) -> Result<Query> {
        let mut body = self.parse_query_term()?;
        while self.eat_kw("union")? {
            let all = self.eat_kw("all")?;
            if !all {
                self.eat_kw("distinct")?;
            }
            let right = self.parse_query_term()?;
            body = QueryBody::Union {
                left: Box::new(body),
                right: Box::new(right),
                all,
            };
        }

        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        if self.eat_kw("for")? {
            self.expect_kw("update", "after FOR")?;
            if let QueryBody::Select(s) = &mut body {
                s.for_update = true;
            }
        } else if self.is_kw("lock") {
            // LOCK IN SHARE MODE
            self.next_token()?;
            self.expect_kw("in", "in LOCK IN SHARE MODE")?;
            self.expect_kw("share", "in LOCK IN SHARE MODE")?;
            self.expect_kw("mode", "in LOCK IN SHARE MODE")?;
        }

        Ok(Query {
            body,
            order_by,
            limit,
        })
    }

    fn parse_query_term(&mut self) -> Result<QueryBody> {
        if self.eat_sym("(")? {
            let q = self.parse_query()?;
            self.expect(")", "to close subquery")?;
            return Ok(QueryBody::Nested(Box::new(q)));
        }
        Ok(QueryBody::Select(Box::new(self.parse_select()?)))
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_kw("select", "at start of query")?;
        let mut distinct = false;
        loop {
            if self.eat_kw("distinct")? || self.eat_kw("distinctrow")? {
                distinct = true;
            } else if self.eat_kw("all")?
                || self.eat_kw("sql_calc_found_rows")?
                || self.eat_kw("sql_no_cache")?
                || self.eat_kw("sql_cache")?
                || self.eat_kw("high_priority")?
                || self.eat_kw("straight_join")?
            {
            } else {
                break;
            }
        }

        let mut fields = vec![self.parse_select_item()?];
        while self.eat_sym(",")? {
            fields.push(self.parse_select_item()?);
        }

        let from = if self.eat_kw("from")? {
            if self.eat_kw("dual")? {
                vec![]
            } else {
                self.parse_table_refs()?
            }
        } else {
            vec![]
        };

        let where_ = if self.eat_kw("where")? {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = vec![];
        if self.eat_kw("group")? {
            self.expect_kw("by", "after GROUP")?;
            group_by = self.parse_by_items()?;
        }

        let having = if self.eat_kw("having")? {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            fields,
            from,
            where_,
            group_by,
            having,
            for_update: false,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.eat_sym("*")? {
            return Ok(SelectItem::Wildcard { table: None });
        }
        // t.*
        if self.is_ident() && self.peek_is_sym(".")? {
            let state = self.clone();
            let table = self.ident("in select field")?;
            self.expect(".", "in select field")?;
            if self.eat_sym("*")? {
                return Ok(SelectItem::Wildcard { table: Some(table) });
            }
            *self = state;
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.eat_kw("as")? {
            if self.tok.0 == TokenKind::String {
                return Ok(Some(self.string("as alias")?));
            }
            return Ok(Some(self.ident("as alias")?));
        }
        if self.is_ident() {
            return Ok(Some(self.ident("as alias")?));
        }
        if self.tok.0 == TokenKind::String {
            return Ok(Some(self.string("as alias")?));
        }
        Ok(None)
    }

    fn parse_table_name(&mut self) -> Result<TableName> {
        let first = self.ident("as table name")?;
        if self.eat_sym(".")? {
            let name = self.ident("as table name")?;
            Ok(TableName {
                db: Some(first),
                name,
            })
        } else {
            Ok(TableName {
                db: None,
                name: first,
            })
        }
    }

    fn parse_table_refs(&mut self) -> Result<Vec<TableRef>> {
        let mut refs = vec![self.parse_table_ref()?];
        while self.eat_sym(",")? {
            refs.push(self.parse_table_ref()?);
        }
        Ok(refs)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let mut left = self.parse_table_factor()?;
        loop {
            let kind = if self.eat_kw("join")? || self.eat_kw("straight_join")? {
                JoinKind::Inner
            } else if self.is_kw("inner") || self.is_kw("cross") {
                let cross = self.is_kw("cross");
                self.next_token()?;
                self.expect_kw("join", "in join")?;
                if cross {
                    JoinKind::Cross
                } else {
                    JoinKind::Inner
                }
            } else if self.is_kw("left") || self.is_kw("right") {
                let is_left = self.is_kw("left");
                self.next_token()?;
                self.eat_kw("outer")?;
                self.expect_kw("join", "in outer join")?;
                if is_left {
                    JoinKind::Left
                } else {
                    JoinKind::Right
                }
            } else {
                break;
            };

            let right = self.parse_table_factor()?;
            let mut on = None;
            let mut using = vec![];
            if self.eat_kw("on")? {
                on = Some(self.parse_expr()?);
            } else if self.eat_kw("using")? {
                self.expect("(", "after USING")?;
                using.push(self.ident("in USING")?);
                while self.eat_sym(",")? {
                    using.push(self.ident("in USING")?);
                }
                self.expect(")", "to close USING")?;
            }
            left = TableRef::Join {
                left: Box::new(left),
                right: Box::new(right),
                kind,
                on,
                using,
            };
        }
        Ok(left)
    }

    fn parse_table_factor(&mut self) -> Result<TableRef> {
        if self.eat_sym("(")? {
            if self.is_kw("select") || self.is_sym("(") {
                let query = self.parse_query()?;
                self.expect(")", "to close derived table")?;
                self.eat_kw("as")?;
                let alias = self.ident("as derived table alias")?;
                return Ok(TableRef::Derived {
                    query: Box::new(query),
                    alias,
                });
            }
            let inner = self.parse_table_ref()?;
            self.expect(")", "to close table reference")?;
            return Ok(inner);
        }

        let name = self.parse_table_name()?;
        let alias = if self.eat_kw("as")? || self.is_ident() {
            Some(self.ident("as table alias")?)
        } else {
            None
        };
        self.skip_index_hints()?;
        Ok(TableRef::Table { name, alias })
    }

    fn skip_index_hints(&mut self) -> Result<()> {
        while (self.is_kw("use") || self.is_kw("force") || self.is_kw("ignore"))
            && (self.peek_is_kw("index")? || self.peek_is_kw("key")?)
        {
            self.next_token()?;
            self.next_token()?;
            if self.eat_kw("for")? {
                // FOR JOIN | FOR ORDER BY | FOR GROUP BY
                if !self.eat_kw("join")? {
                    self.next_token()?;
                    self.expect_kw("by", "in index hint")?;
                }
            }
            self.expect("(", "in index hint")?;
            while !self.is_sym(")") {
                if self.tok.0 == TokenKind::Eof {
                    bail!(self.unexpected("in index hint"));
                }
                self.next_token()?;
            }
            self.next_token()?;
        }
        Ok(())
    }

    fn parse_by_items(&mut self) -> Result<Vec<ByItem>> {
        let mut items = vec![];
        loop {
            let expr = self.parse_expr()?;
            let expr = match &expr.kind {
                ExprKind::Literal(Datum::Int(n)) if *n > 0 => ByItemExpr::Position(*n as u64),
                _ => ByItemExpr::Expr(expr),
            };
            let desc = if self.eat_kw("desc")? {
                true
            } else {
                self.eat_kw("asc")?;
                false
            };
            items.push(ByItem { expr, desc });
            if !self.eat_sym(",")? {
                break;
            }
        }
        Ok(items)
    }

    fn parse_order_by(&mut self) -> Result<Vec<ByItem>> {
        if self.eat_kw("order")? {
            self.expect_kw("by", "after ORDER")?;
            self.parse_by_items()
        } else {
            Ok(vec![])
        }
    }

    fn parse_limit_value(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Number => {
                let v = self.parse_u64("in LIMIT")?;
                let d = match i64::try_from(v) {
                    Ok(v) => Datum::Int(v),
                    Err(_) => Datum::Uint(v),
                };
                Ok(Expr::new(self.span_from(&start), ExprKind::Literal(d)))
            }
            TokenKind::Param => {
                self.next_token()?;
                Ok(Expr::new(self.span_from(&start), ExprKind::Param))
            }
            _ => Err(self.unexpected("in LIMIT")),
        }
    }

    fn parse_limit(&mut self) -> Result<Option<Limit>> {
        if !self.eat_kw("limit")? {
            return Ok(None);
        }
        let first = self.parse_limit_value()?;
        if self.eat_sym(",")? {
            let count = self.parse_limit_value()?;
            return Ok(Some(Limit {
                count,
                offset: Some(first),
            }));
        }
        if self.eat_kw("offset")? {
            let offset = self.parse_limit_value()?;
            return Ok(Some(Limit {
                count: first,
                offset: Some(offset),
            }));
        }
        Ok(Some(Limit {
            count: first,
            offset: None,
        }))
    }

    fn parse_column_name(&mut self) -> Result<ColumnName> {
        let first = self.ident("as column name")?;
        if !self.eat_sym(".")? {
            return Ok(ColumnName {
                db: None,
                table: None,
                name: first,
            });
        }
        let second = self.ident("as column name")?;
        if !self.eat_sym(".")? {
            return Ok(ColumnName {
                db: None,
                table: Some(first),
                name: second,
            });
        }
        let third = self.ident("as column name")?;
        Ok(ColumnName {
            db: Some(first),
            table: Some(second),
            name: third,
        })
    }

    fn parse_assignments(&mut self) -> Result<Vec<Assignment>> {
        let mut assignments = vec![];
        loop {
            let column = self.parse_column_name()?;
            if !self.eat_sym("=")? {
                self.expect(":=", "in assignment")?;
            }
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.eat_sym(",")? {
                break;
            }
        }
        Ok(assignments)
    }

    fn parse_insert(&mut self, replace: bool) -> Result<Insert> {
        self.next_token()?;
        let mut ignore = false;
        loop {
            if self.eat_kw("ignore")? {
                ignore = true;
            } else if !(self.eat_kw("low_priority")?
                || self.eat_kw("delayed")?
                || self.eat_kw("high_priority")?)
            {
                break;
            }
        }
        self.eat_kw("into")?;
        let table = self.parse_table_name()?;

        let mut columns = vec![];
        if self.is_sym("(") && !(self.peek_is_kw("select")? || self.peek_is_sym("(")?) {
            self.next_token()?;
            if !self.is_sym(")") {
                loop {
                    columns.push(self.parse_column_name()?);
                    if !self.eat_sym(",")? {
                        break;
                    }
                }
            }
            self.expect(")", "to close column list")?;
        }

        let source = if self.eat_kw("values")? || self.eat_kw("value")? {
            let mut rows = vec![];
            loop {
                self.expect("(", "at start of VALUES row")?;
                let mut row = vec![];
                if !self.is_sym(")") {
                    row.push(self.parse_expr()?);
                    while self.eat_sym(",")? {
                        row.push(self.parse_expr()?);
                    }
                }
                self.expect(")", "to close VALUES row")?;
                rows.push(row);
                if !self.eat_sym(",")? {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else if self.eat_kw("set")? {
            InsertSource::Set(self.parse_assignments()?)
        } else if self.is_kw("select") || self.is_sym("(") {
            InsertSource::Query(Box::new(self.parse_query()?))
        } else {
            bail!(self.unexpected("in INSERT"));
        };

        let mut on_duplicate = vec![];
        if self.eat_kw("on")? {
            self.expect_kw("duplicate", "after ON")?;
            self.expect_kw("key", "after ON DUPLICATE")?;
            self.expect_kw("update", "after ON DUPLICATE KEY")?;
            on_duplicate = self.parse_assignments()?;
        }

        Ok(Insert {
            replace,
            ignore,
            table,
            columns,
            source,
            on_duplicate,
        })
    }

    fn parse_update(&mut self) -> Result<Update> {
        self.next_token()?;
        while self.eat_kw("low_priority")? || self.eat_kw("ignore")? {}
        let table = self.parse_table_ref()?;
        self.expect_kw("set", "in UPDATE")?;
        let set = self.parse_assignments()?;
        let where_ = if self.eat_kw("where")? {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;
        Ok(Update {
            table,
            set,
            where_,
            order_by,
            limit,
        })
    }

    fn parse_delete(&mut self) -> Result<Delete> {
        self.next_token()?;
        while self.eat_kw("low_priority")? || self.eat_kw("quick")? || self.eat_kw("ignore")? {}
        self.expect_kw("from", "in DELETE")?;
        let table = self.parse_table_name()?;
        let where_ = if self.eat_kw("where")? {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;
        Ok(Delete {
            table,
            where_,
            order_by,
            limit,
        })
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if self.is_kw("if") {
            self.next_token()?;
            self.expect_kw("not", "in IF NOT EXISTS")?;
            self.expect_kw("exists", "in IF NOT EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if self.is_kw("if") {
            self.next_token()?;
            self.expect_kw("exists", "in IF EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Skip to the end of the current statement.
    fn skip_rest(&mut self) -> Result<()> {
        while self.tok.0 != TokenKind::Eof && !self.is_sym(";") {
            self.next_token()?;
        }
        Ok(())
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.next_token()?;
        if self.eat_kw("database")? || self.eat_kw("schema")? {
            let if_not_exists = self.parse_if_not_exists()?;
            let name = self.ident("as database name")?;
            // Charset and collation options carry no type information.
            self.skip_rest()?;
            return Ok(Statement::CreateDatabase {
                name,
                if_not_exists,
            });
        }
        self.eat_kw("temporary")?;
        self.expect_kw("table", "after CREATE")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_table_name()?;
        self.expect("(", "after table name")?;

        let mut columns = vec![];
        let mut constraints = vec![];
        loop {
            if let Some(c) = self.parse_constraint()? {
                constraints.push(c);
            } else {
                columns.push(self.parse_column_def()?);
            }
            if !self.eat_sym(",")? {
                break;
            }
        }
        self.expect(")", "to close table definition")?;

        let start = self.tok.1.start as usize;
        self.skip_rest()?;
        let end = self.tok.1.start as usize;
        let options = self.source.contents()[start..end.max(start)].trim().to_string();

        Ok(Statement::CreateTable(CreateTable {
            name,
            if_not_exists,
            columns,
            constraints,
            options,
        }))
    }

    fn parse_key_columns(&mut self) -> Result<Vec<String>> {
        self.expect("(", "before key columns")?;
        let mut cols = vec![];
        loop {
            cols.push(self.ident("as key column")?);
            if self.eat_sym("(")? {
                self.parse_u64("as key prefix length")?;
                self.expect(")", "after key prefix length")?;
            }
            if !self.eat_kw("asc")? {
                self.eat_kw("desc")?;
            }
            if !self.eat_sym(",")? {
                break;
            }
        }
        self.expect(")", "after key columns")?;
        Ok(cols)
    }

    fn skip_index_options(&mut self) -> Result<()> {
        loop {
            if self.eat_kw("using")? {
                self.next_token()?;
            } else if self.eat_kw("comment")? {
                self.string("as index comment")?;
            } else if self.is_kw("key_block_size") {
                self.next_token()?;
                self.eat_sym("=")?;
                self.next_token()?;
            } else if self.eat_kw("visible")? || self.eat_kw("invisible")? {
            } else {
                return Ok(());
            }
        }
    }

    fn parse_constraint(&mut self) -> Result<Option<Constraint>> {
        let mut name = None;
        if self.eat_kw("constraint")? {
            if self.is_ident() && !self.is_kw("primary") && !self.is_kw("unique") && !self.is_kw("foreign") {
                name = Some(self.ident("as constraint name")?);
            }
        }

        let kind = if self.is_kw("primary") {
            self.next_token()?;
            self.expect_kw("key", "after PRIMARY")?;
            ConstraintKind::PrimaryKey
        } else if self.is_kw("unique") {
            self.next_token()?;
            if !self.eat_kw("key")? {
                self.eat_kw("index")?;
            }
            ConstraintKind::Unique
        } else if self.is_kw("foreign") {
            self.next_token()?;
            self.expect_kw("key", "after FOREIGN")?;
            ConstraintKind::ForeignKey
        } else if (self.is_kw("key") || self.is_kw("index"))
            || ((self.is_kw("fulltext") || self.is_kw("spatial"))
                && (self.peek_is_kw("key")? || self.peek_is_kw("index")?))
        {
            if self.is_kw("fulltext") || self.is_kw("spatial") {
                self.next_token()?;
            }
            self.next_token()?;
            ConstraintKind::Index
        } else if name.is_some() {
            bail!(self.unexpected("in constraint"));
        } else {
            return Ok(None);
        };

        if !self.is_sym("(") {
            let index_name = self.ident("as index name")?;
            if name.is_none() {
                name = Some(index_name);
            }
        }
        self.skip_index_options()?;
        let columns = self.parse_key_columns()?;
        self.skip_index_options()?;

        let mut references = None;
        if kind == ConstraintKind::ForeignKey {
            self.expect_kw("references", "in foreign key")?;
            let table = self.parse_table_name()?;
            let cols = self.parse_key_columns()?;
            references = Some((table, cols));
            while self.eat_kw("on")? {
                // ON DELETE | ON UPDATE followed by the action.
                self.next_token()?;
                if !self.eat_kw("set")? {
                    self.eat_kw("no")?;
                }
                self.next_token()?;
            }
        }

        Ok(Some(Constraint {
            name,
            kind,
            columns,
            references,
        }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.ident("as column name")?;
        let start = self.tok.1.start as usize;
        let tp = self.parse_data_type()?;
        let type_text = self.source.contents()[start..self.end as usize].to_string();

        let mut options = vec![];
        loop {
            if self.is_kw("not") {
                self.next_token()?;
                self.expect_kw("null", "after NOT")?;
                options.push(ColumnOption::NotNull);
            } else if self.eat_kw("null")? {
                options.push(ColumnOption::Null);
            } else if self.eat_kw("default")? {
                let value = if self.eat_sym("(")? {
                    let e = self.parse_expr()?;
                    self.expect(")", "to close DEFAULT expression")?;
                    e
                } else {
                    self.parse_unary()?
                };
                options.push(ColumnOption::Default(value));
            } else if self.eat_kw("auto_increment")? {
                options.push(ColumnOption::AutoIncrement);
            } else if self.is_kw("primary") {
                self.next_token()?;
                self.expect_kw("key", "after PRIMARY")?;
                options.push(ColumnOption::PrimaryKey);
            } else if self.eat_kw("key")? {
                options.push(ColumnOption::PrimaryKey);
            } else if self.eat_kw("unique")? {
                self.eat_kw("key")?;
                options.push(ColumnOption::Unique);
            } else if self.eat_kw("comment")? {
                options.push(ColumnOption::Comment(self.string("as column comment")?));
            } else if self.is_kw("on") && self.peek_is_kw("update")? {
                self.next_token()?;
                self.next_token()?;
                options.push(ColumnOption::OnUpdate(self.parse_primary()?));
            } else if self.is_kw("collate") {
                self.next_token()?;
                self.next_token()?;
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            type_text,
            tp,
            options,
        })
    }

    fn parse_len(&mut self) -> Result<Option<(i32, Option<i32>)>> {
        if !self.eat_sym("(")? {
            return Ok(None);
        }
        let flen = self.parse_u64("as type length")? as i32;
        let decimal = if self.eat_sym(",")? {
            Some(self.parse_u64("as type scale")? as i32)
        } else {
            None
        };
        self.expect(")", "to close type length")?;
        Ok(Some((flen, decimal)))
    }

    fn parse_enum_elems(&mut self) -> Result<Vec<String>> {
        self.expect("(", "before enum members")?;
        let mut elems = vec![self.string("as enum member")?];
        while self.eat_sym(",")? {
            elems.push(self.string("as enum member")?);
        }
        self.expect(")", "after enum members")?;
        Ok(elems)
    }

    fn parse_data_type(&mut self) -> Result<FieldType> {
        if self.tok.0 != TokenKind::Ident {
            bail!(self.unexpected("as column type"));
        }
        let word = self.tok.1.text().to_ascii_lowercase();
        self.next_token()?;

        let mut tp = match word.as_str() {
            "tinyint" => FieldType::new(TypeCode::Tiny),
            "bool" | "boolean" => FieldType::with_len(TypeCode::Tiny, 1, 0),
            "smallint" => FieldType::new(TypeCode::Short),
            "mediumint" => FieldType::new(TypeCode::Int24),
            "int" | "integer" => FieldType::new(TypeCode::Long),
            "bigint" => FieldType::new(TypeCode::LongLong),
            "bit" => FieldType::new(TypeCode::Bit),
            "year" => FieldType::new(TypeCode::Year),
            "float" => FieldType::new(TypeCode::Float),
            "double" | "real" => {
                self.eat_kw("precision")?;
                FieldType::new(TypeCode::Double)
            }
            "decimal" | "numeric" | "dec" | "fixed" => FieldType::new(TypeCode::NewDecimal),
            "char" | "character" => {
                if self.eat_kw("varying")? {
                    FieldType::new(TypeCode::Varchar)
                } else {
                    FieldType::with_len(TypeCode::String, 1, 0)
                }
            }
            "varchar" => FieldType::new(TypeCode::Varchar),
            "binary" => FieldType::with_len(TypeCode::String, 1, 0).binary(),
            "varbinary" => FieldType::new(TypeCode::Varchar).binary(),
            "tinytext" | "text" | "mediumtext" | "longtext" => FieldType::new(TypeCode::Blob),
            "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                FieldType::new(TypeCode::Blob).binary()
            }
            "date" => FieldType::new(TypeCode::Date),
            "datetime" => FieldType::new(TypeCode::Datetime),
            "timestamp" => FieldType::new(TypeCode::Timestamp),
            "time" => FieldType::new(TypeCode::Duration),
            "json" => FieldType::new(TypeCode::Json),
            "enum" | "set" => {
                let mut tp = FieldType::new(if word == "enum" {
                    TypeCode::Enum
                } else {
                    TypeCode::Set
                });
                tp.elems = self.parse_enum_elems()?;
                tp
            }
            _ => bail!(self.source.error(self.line, self.tok.1.col, &format!("unsupported column type `{word}`"))),
        };

        if !matches!(tp.tp, TypeCode::Enum | TypeCode::Set) {
            let (line, col) = (self.line, self.tok.1.col);
            if let Some((flen, decimal)) = self.parse_len()? {
                match tp.tp {
                    TypeCode::Datetime | TypeCode::Timestamp | TypeCode::Duration => {
                        tp.decimal = flen.min(MAX_FSP);
                    }
                    TypeCode::NewDecimal => {
                        let decimal = decimal.unwrap_or(0);
                        let problem = if flen > MAX_DECIMAL_WIDTH {
                            Some(format!("too big precision {flen}, maximum is {MAX_DECIMAL_WIDTH}"))
                        } else if decimal > MAX_DECIMAL_SCALE {
                            Some(format!("too big scale {decimal}, maximum is {MAX_DECIMAL_SCALE}"))
                        } else if decimal > flen {
                            Some(format!("scale {decimal} is larger than precision {flen}"))
                        } else {
                            None
                        };
                        if let Some(problem) = problem {
                            bail!(self.source.error(line, col, &problem));
                        }
                        tp.flen = flen;
                        tp.decimal = decimal;
                    }
                    TypeCode::Float | TypeCode::Double => {
                        tp.flen = flen;
                        tp.decimal = decimal.unwrap_or(UNSPECIFIED);
                    }
                    _ => tp.flen = flen,
                }
            }
        }

        loop {
            if self.eat_kw("unsigned")? {
                tp.unsigned = true;
            } else if self.eat_kw("signed")? || self.eat_kw("zerofill")? {
            } else if self.eat_kw("binary")? {
                tp.binary = true;
            } else if self.is_kw("character") && self.peek_is_kw("set")? {
                self.next_token()?;
                self.next_token()?;
                self.charset()?;
            } else if self.eat_kw("charset")? {
                self.charset()?;
            } else if self.is_kw("collate") {
                self.next_token()?;
                self.next_token()?;
            } else {
                break;
            }
        }
        Ok(tp)
    }

    fn charset(&mut self) -> Result<()> {
        match self.tok.0 {
            TokenKind::Ident | TokenKind::QuotedIdent | TokenKind::String => self.next_token(),
            _ => Err(self.unexpected("as character set")),
        }
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.next_token()?;
        if self.eat_kw("database")? || self.eat_kw("schema")? {
            let if_exists = self.parse_if_exists()?;
            let name = self.ident("as database name")?;
            return Ok(Statement::DropDatabase { name, if_exists });
        }
        self.eat_kw("temporary")?;
        self.expect_kw("table", "after DROP")?;
        let if_exists = self.parse_if_exists()?;
        let mut names = vec![self.parse_table_name()?];
        while self.eat_sym(",")? {
            names.push(self.parse_table_name()?);
        }
        Ok(Statement::DropTable { names, if_exists })
    }

    fn parse_set(&mut self) -> Result<Statement> {
        self.next_token()?;
        if self.eat_kw("names")? {
            let charset = match self.tok.0 {
                TokenKind::String => self.string("as character set")?,
                _ => self.ident("as character set")?,
            };
            if self.eat_kw("collate")? {
                self.next_token()?;
            }
            return Ok(Statement::Set(vec![SetItem::Names(charset)]));
        }
        let mut items = vec![];
        loop {
            let mut scope = "";
            if self.eat_kw("global")? {
                scope = "@@global.";
            } else if self.eat_kw("session")? || self.eat_kw("local")? {
                scope = "@@session.";
            }
            let name = match self.tok.0 {
                TokenKind::Variable => {
                    let n = self.tok.1.text().to_string();
                    self.next_token()?;
                    n
                }
                _ => format!("{scope}{}", self.ident("as variable name")?),
            };
            if !self.eat_sym("=")? {
                self.expect(":=", "in SET")?;
            }
            let value = self.parse_expr()?;
            items.push(SetItem::Variable { name, value });
            if !self.eat_sym(",")? {
                break;
            }
        }
        Ok(Statement::Set(items))
    }

    // Expressions, in increasing order of precedence.

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn binary(&self, start: &Span, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            self.span_from(start),
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_xor()?;
        while self.eat_kw("or")? || self.eat_sym("||")? {
            let rhs = self.parse_xor()?;
            expr = self.binary(&start, BinOp::Or, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_xor(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_and()?;
        while self.eat_kw("xor")? {
            let rhs = self.parse_and()?;
            expr = self.binary(&start, BinOp::Xor, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_not()?;
        while self.eat_kw("and")? || self.eat_sym("&&")? {
            let rhs = self.parse_not()?;
            expr = self.binary(&start, BinOp::And, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        if self.is_kw("not") && !self.peek_is_kw("exists")? {
            self.next_token()?;
            let expr = self.parse_not()?;
            return Ok(Expr::new(
                self.span_from(&start),
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
            ));
        }
        self.parse_predicate()
    }

    fn comparison_op(&self) -> Option<BinOp> {
        if self.tok.0 != TokenKind::Symbol {
            return None;
        }
        Some(match self.tok.1.text() {
            "=" => BinOp::Eq,
            "<=>" => BinOp::NullEq,
            "!=" | "<>" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            _ => return None,
        })
    }

    fn parse_predicate(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_bitor()?;
        loop {
            if let Some(op) = self.comparison_op() {
                self.next_token()?;
                let rhs = self.parse_bitor()?;
                expr = self.binary(&start, op, expr, rhs);
                continue;
            }

            if self.eat_kw("is")? {
                let not = self.eat_kw("not")?;
                let kind = if self.eat_kw("null")? {
                    ExprKind::IsNull {
                        expr: Box::new(expr),
                        not,
                    }
                } else if self.is_kw("true") || self.is_kw("false") {
                    let value = self.is_kw("true");
                    self.next_token()?;
                    ExprKind::IsBool {
                        expr: Box::new(expr),
                        value,
                        not,
                    }
                } else {
                    bail!(self.unexpected("after IS"));
                };
                expr = Expr::new(self.span_from(&start), kind);
                continue;
            }

            let not = if self.is_kw("not")
                && (self.peek_is_kw("in")?
                    || self.peek_is_kw("between")?
                    || self.peek_is_kw("like")?
                    || self.peek_is_kw("regexp")?
                    || self.peek_is_kw("rlike")?)
            {
                self.next_token()?;
                true
            } else {
                false
            };

            if self.eat_kw("in")? {
                self.expect("(", "after IN")?;
                if self.is_kw("select") {
                    let query = self.parse_query()?;
                    self.expect(")", "to close IN subquery")?;
                    expr = Expr::new(
                        self.span_from(&start),
                        ExprKind::InSubquery {
                            expr: Box::new(expr),
                            query: Box::new(query),
                            not,
                        },
                    );
                } else {
                    let mut list = vec![self.parse_expr()?];
                    while self.eat_sym(",")? {
                        list.push(self.parse_expr()?);
                    }
                    self.expect(")", "to close IN list")?;
                    expr = Expr::new(
                        self.span_from(&start),
                        ExprKind::In {
                            expr: Box::new(expr),
                            list,
                            not,
                        },
                    );
                }
            } else if self.eat_kw("between")? {
                let low = self.parse_bitor()?;
                self.expect_kw("and", "in BETWEEN")?;
                let high = self.parse_bitor()?;
                expr = Expr::new(
                    self.span_from(&start),
                    ExprKind::Between {
                        expr: Box::new(expr),
                        low: Box::new(low),
                        high: Box::new(high),
                        not,
                    },
                );
            } else if self.eat_kw("like")? {
                let pattern = self.parse_bitor()?;
                let escape = if self.eat_kw("escape")? {
                    let s = self.string("as LIKE escape")?;
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c),
                        _ => bail!(self.error("escape must be a single character")),
                    }
                } else {
                    None
                };
                expr = Expr::new(
                    self.span_from(&start),
                    ExprKind::Like {
                        expr: Box::new(expr),
                        pattern: Box::new(pattern),
                        escape,
                        not,
                    },
                );
            } else if self.eat_kw("regexp")? || self.eat_kw("rlike")? {
                let pattern = self.parse_bitor()?;
                expr = Expr::new(
                    self.span_from(&start),
                    ExprKind::Regexp {
                        expr: Box::new(expr),
                        pattern: Box::new(pattern),
                        not,
                    },
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_bitand()?;
        while self.eat_sym("|")? {
            let rhs = self.parse_bitand()?;
            expr = self.binary(&start, BinOp::BitOr, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_shift()?;
        while self.eat_sym("&")? {
            let rhs = self.parse_shift()?;
            expr = self.binary(&start, BinOp::BitAnd, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_additive()?;
        loop {
            let op = if self.eat_sym("<<")? {
                BinOp::Shl
            } else if self.eat_sym(">>")? {
                BinOp::Shr
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            expr = self.binary(&start, op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+")? {
                BinOp::Add
            } else if self.eat_sym("-")? {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            expr = self.binary(&start, op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_bitxor()?;
        loop {
            let op = if self.eat_sym("*")? {
                BinOp::Mul
            } else if self.eat_sym("/")? {
                BinOp::Div
            } else if self.eat_sym("%")? || self.eat_kw("mod")? {
                BinOp::Mod
            } else if self.eat_kw("div")? {
                BinOp::IntDiv
            } else {
                break;
            };
            let rhs = self.parse_bitxor()?;
            expr = self.binary(&start, op, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let mut expr = self.parse_unary()?;
        while self.eat_sym("^")? {
            let rhs = self.parse_unary()?;
            expr = self.binary(&start, BinOp::BitXor, expr, rhs);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        let op = if self.eat_sym("-")? {
            UnaryOp::Minus
        } else if self.eat_sym("+")? {
            UnaryOp::Plus
        } else if self.eat_sym("~")? {
            UnaryOp::BitNeg
        } else if self.eat_sym("!")? {
            UnaryOp::Not
        } else {
            return self.parse_primary();
        };

        let operand = self.parse_unary()?;
        let span = self.span_from(&start);
        // Signs directly applied to numeric literals are part of the literal.
        if let ExprKind::Literal(d) = &operand.kind {
            match (op, negate_numeric(d)) {
                (UnaryOp::Minus, Some(neg)) => return Ok(Expr::new(span, ExprKind::Literal(neg))),
                (UnaryOp::Plus, Some(_)) => return Ok(Expr::new(span, operand.kind)),
                _ => (),
            }
        }
        Ok(Expr::new(
            span,
            ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
        ))
    }

    fn parse_number(&mut self) -> Result<Datum> {
        let text = self.tok.1.text();
        let d = if text.contains(['e', 'E']) {
            match text.parse::<f64>() {
                Ok(v) => Datum::Float64(v),
                Err(_) => bail!(self.error("invalid number")),
            }
        } else if text.contains('.') {
            Datum::Decimal(text.parse::<Decimal>()?)
        } else if let Ok(v) = text.parse::<i64>() {
            Datum::Int(v)
        } else if let Ok(v) = text.parse::<u64>() {
            Datum::Uint(v)
        } else {
            Datum::Decimal(text.parse::<Decimal>()?)
        };
        self.next_token()?;
        Ok(d)
    }

    fn parse_cast_target(&mut self) -> Result<CastTarget> {
        let start = self.tok.1.start as usize;
        let word = self.tok.1.text().to_ascii_lowercase();
        if self.tok.0 != TokenKind::Ident {
            bail!(self.unexpected("as cast type"));
        }
        self.next_token()?;
        let mut tp = match word.as_str() {
            "signed" => {
                if !self.eat_kw("integer")? {
                    self.eat_kw("int")?;
                }
                FieldType::new(TypeCode::LongLong)
            }
            "unsigned" => {
                if !self.eat_kw("integer")? {
                    self.eat_kw("int")?;
                }
                FieldType::new(TypeCode::LongLong).unsigned()
            }
            "char" | "nchar" => FieldType::new(TypeCode::Varchar),
            "binary" => FieldType::new(TypeCode::Varchar).binary(),
            "decimal" => FieldType::with_len(TypeCode::NewDecimal, 10, 0),
            "date" => FieldType::new(TypeCode::Date),
            "datetime" => FieldType::new(TypeCode::Datetime),
            "time" => FieldType::new(TypeCode::Duration),
            "double" | "real" => FieldType::new(TypeCode::Double),
            "float" => FieldType::new(TypeCode::Float),
            "json" => FieldType::new(TypeCode::Json),
            _ => bail!(self.source.error(self.line, self.tok.1.col, &format!("unsupported cast type `{word}`"))),
        };
        if let Some((flen, decimal)) = self.parse_len()? {
            match tp.tp {
                TypeCode::Datetime | TypeCode::Duration => tp.decimal = flen.min(MAX_FSP),
                TypeCode::NewDecimal => {
                    tp.flen = flen;
                    tp.decimal = decimal.unwrap_or(0);
                }
                _ => tp.flen = flen,
            }
        }
        if matches!(tp.tp, TypeCode::Varchar) {
            if self.is_kw("character") && self.peek_is_kw("set")? {
                self.next_token()?;
                self.next_token()?;
                self.charset()?;
            } else if self.eat_kw("charset")? {
                self.charset()?;
            }
        }
        let text = self.source.contents()[start..self.end as usize].to_uppercase();
        Ok(CastTarget { text, tp })
    }

    fn parse_func_args(&mut self, name: String, start: &Span) -> Result<Expr> {
        self.expect("(", "after function name")?;
        let mut args = vec![];
        let mut distinct = false;
        let mut star = false;
        if self.eat_sym("*")? {
            star = true;
        } else if !self.is_sym(")") {
            if self.eat_kw("distinct")? {
                distinct = true;
            } else {
                self.eat_kw("all")?;
            }
            args.push(self.parse_expr()?);
            while self.eat_sym(",")? {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(")", "to close function call")?;
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::Func {
                name,
                args,
                distinct,
                star,
            },
        ))
    }

    fn parse_case(&mut self, start: &Span) -> Result<Expr> {
        let operand = if self.is_kw("when") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut whens = vec![];
        while self.eat_kw("when")? {
            let cond = self.parse_expr()?;
            self.expect_kw("then", "in CASE")?;
            let value = self.parse_expr()?;
            whens.push((cond, value));
        }
        if whens.is_empty() {
            bail!(self.unexpected("in CASE"));
        }
        let else_ = if self.eat_kw("else")? {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_kw("end", "to close CASE")?;
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::Case {
                operand,
                whens,
                else_,
            },
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Number => {
                let d = self.parse_number()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Literal(d)));
            }
            TokenKind::String => {
                let mut s = self.string("as string")?;
                // Adjacent string literals are concatenated.
                while self.tok.0 == TokenKind::String {
                    s.push_str(&self.string("as string")?);
                }
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Literal(Datum::String(s)),
                ));
            }
            TokenKind::HexString => {
                let bytes = decode_hex(self.tok.1.text());
                let bytes = match bytes {
                    Some(b) => b,
                    None => bail!(self.error("invalid hexadecimal literal")),
                };
                self.next_token()?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Literal(Datum::Bytes(bytes)),
                ));
            }
            TokenKind::BitString => {
                let bytes = decode_bits(self.tok.1.text());
                self.next_token()?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Literal(Datum::Bytes(bytes)),
                ));
            }
            TokenKind::Param => {
                self.next_token()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Param));
            }
            TokenKind::Variable => {
                let name = self.tok.1.text().to_string();
                self.next_token()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Variable(name)));
            }
            TokenKind::Symbol if self.is_sym("(") => {
                self.next_token()?;
                if self.is_kw("select") {
                    let query = self.parse_query()?;
                    self.expect(")", "to close subquery")?;
                    return Ok(Expr::new(
                        self.span_from(&start),
                        ExprKind::Subquery(Box::new(query)),
                    ));
                }
                let first = self.parse_expr()?;
                if self.is_sym(",") {
                    let mut items = vec![first];
                    while self.eat_sym(",")? {
                        items.push(self.parse_expr()?);
                    }
                    self.expect(")", "to close row")?;
                    return Ok(Expr::new(self.span_from(&start), ExprKind::Row(items)));
                }
                self.expect(")", "to close parenthesis")?;
                return Ok(first);
            }
            TokenKind::QuotedIdent => {
                let col = self.parse_column_name()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Column(col)));
            }
            TokenKind::Ident => (),
            _ => bail!(self.unexpected("in expression")),
        }

        let word = self.tok.1.text().to_ascii_lowercase();
        let next_is_paren = self.peek_is_sym("(")?;
        let next_is_string = self.peek_token()?.0 == TokenKind::String;
        match word.as_str() {
            "null" => {
                self.next_token()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Literal(Datum::Null)));
            }
            "true" | "false" => {
                self.next_token()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Bool(word == "true")));
            }
            "case" => {
                self.next_token()?;
                return self.parse_case(&start);
            }
            "exists" | "not" => {
                let not = word == "not";
                self.next_token()?;
                if not {
                    self.expect_kw("exists", "after NOT")?;
                }
                self.expect("(", "after EXISTS")?;
                let query = self.parse_query()?;
                self.expect(")", "to close EXISTS")?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Exists {
                        query: Box::new(query),
                        not,
                    },
                ));
            }
            "interval" => {
                self.next_token()?;
                let expr = self.parse_bitor()?;
                if self.tok.0 != TokenKind::Ident {
                    bail!(self.unexpected("as interval unit"));
                }
                let unit = self.tok.1.text().to_uppercase();
                self.next_token()?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Interval {
                        expr: Box::new(expr),
                        unit,
                    },
                ));
            }
            "cast" if next_is_paren => {
                self.next_token()?;
                self.expect("(", "after CAST")?;
                let expr = self.parse_expr()?;
                self.expect_kw("as", "in CAST")?;
                let target = self.parse_cast_target()?;
                self.expect(")", "to close CAST")?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Cast {
                        expr: Box::new(expr),
                        target,
                    },
                ));
            }
            "convert" if next_is_paren => {
                self.next_token()?;
                self.expect("(", "after CONVERT")?;
                let expr = self.parse_expr()?;
                self.expect(",", "in CONVERT")?;
                let target = self.parse_cast_target()?;
                self.expect(")", "to close CONVERT")?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Cast {
                        expr: Box::new(expr),
                        target,
                    },
                ));
            }
            "date" | "time" | "timestamp" if next_is_string => {
                self.next_token()?;
                let text = self.string("as temporal literal")?;
                let d = match word.as_str() {
                    "date" => Time::parse(&text, TimeKind::Date, 0).map(Datum::Time),
                    "timestamp" => {
                        let fsp = fraction_digits(&text);
                        Time::parse(&text, TimeKind::Datetime, fsp).map(Datum::Time)
                    }
                    _ => Duration::parse(&text, fraction_digits(&text)).map(Datum::Duration),
                };
                let d = match d {
                    Ok(d) => d,
                    Err(e) => bail!(start.error(&e.to_string())),
                };
                return Ok(Expr::new(self.span_from(&start), ExprKind::Literal(d)));
            }
            "default" if !next_is_paren => {
                self.next_token()?;
                return Ok(Expr::new(self.span_from(&start), ExprKind::Default));
            }
            "current_timestamp" | "current_date" | "current_time" | "current_user"
            | "localtime" | "localtimestamp" | "utc_timestamp" | "utc_date" | "utc_time"
                if !next_is_paren =>
            {
                self.next_token()?;
                return Ok(Expr::new(
                    self.span_from(&start),
                    ExprKind::Func {
                        name: word,
                        args: vec![],
                        distinct: false,
                        star: false,
                    },
                ));
            }
            _ => (),
        }

        if next_is_paren {
            self.next_token()?;
            return self.parse_func_args(word, &start);
        }

        let col = self.parse_column_name()?;
        Ok(Expr::new(self.span_from(&start), ExprKind::Column(col)))
    }
}

fn fraction_digits(text: &str) -> u8 {
    match text.rsplit_once('.') {
        Some((_, frac)) if frac.chars().all(|c| c.is_ascii_digit()) => frac.len().min(6) as u8,
        _ => 0,
    }
}

/// Negate a numeric literal value. Returns None for non-numeric values.
pub fn negate_numeric(d: &Datum) -> Option<Datum> {
    Some(match d {
        Datum::Int(v) => match v.checked_neg() {
            Some(n) => Datum::Int(n),
            None => Datum::Decimal(format!("{}", -(*v as i128)).parse().ok()?),
        },
        Datum::Uint(v) if *v == 1u64 << 63 => Datum::Int(i64::MIN),
        Datum::Uint(v) => Datum::Decimal(format!("-{v}").parse().ok()?),
        Datum::Decimal(v) => {
            let s = v.to_string();
            let neg = match s.strip_prefix('-') {
                Some(abs) => abs.to_string(),
                None => format!("-{s}"),
            };
            Datum::Decimal(neg.parse().ok()?)
        }
        Datum::Float64(v) => Datum::Float64(-v),
        Datum::Float32(v) => Datum::Float32(-v),
        _ => return None,
    })
}

fn decode_hex(digits: &str) -> Option<Vec<u8>> {
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    data_encoding::HEXLOWER_PERMISSIVE
        .decode(padded.as_bytes())
        .ok()
}

fn decode_bits(digits: &str) -> Vec<u8> {
    let mut bytes = vec![];
    let pad = (8 - digits.len() % 8) % 8;
    let padded = format!("{}{digits}", "0".repeat(pad));
    for chunk in padded.as_bytes().chunks(8) {
        let mut b = 0u8;
        for c in chunk {
            b = (b << 1) | (c - b'0');
        }
        bytes.push(b);
    }
    bytes
}

/// Parse a single statement from text.
pub fn parse_one(file: &str, sql: &str) -> Result<Statement> {
    let source = Source::from_contents(file.to_string(), sql.to_string())?;
    let mut parser = Parser::new(&source)?;
    parser.parse_one()
}

/// Parse a script of `;`-separated statements.
pub fn parse_all(file: &str, sql: &str) -> Result<Vec<Statement>> {
    let source = Source::from_contents(file.to_string(), sql.to_string())?;
    let mut parser = Parser::new(&source)?;
    parser.parse_all()
}
