// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The SQL front end used by the masker: parsing, a schema catalog shared
//! by all sessions, and typed planning.

pub mod builtins;
pub mod plan;
pub mod planner;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::{Mutex, Once, RwLock};

use crate::ast::Statement;
use crate::catalog::{Catalog, ConstraintFilter};
use crate::format::{render_expr, render_statement};
use crate::parser;
use plan::Plan;
use planner::Planner;

/// What the masker needs from a SQL engine.
pub trait FrontEnd {
    fn parse_one(&self, sql: &str) -> Result<Statement>;

    /// Plan a statement, typically one whose literals were replaced by
    /// markers.
    fn plan(&mut self, stmt: &Statement) -> Result<Plan>;

    fn current_db(&self) -> Option<&str>;

    fn use_db(&mut self, db: &str) -> Result<()>;

    /// Apply schema and session statements. Data manipulation has no effect.
    fn execute(&mut self, stmt: &Statement) -> Result<()>;

    fn restore_sql(&self, stmt: &Statement) -> String;
}

/// A named SQL script, such as a schema dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub sql: String,
}

/// Process-wide state: the catalog and its one-time bootstrap.
pub struct Instance {
    catalog: Arc<RwLock<Catalog>>,
    bootstrap: Once,
    outcome: Mutex<Option<Result<(), String>>>,
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

impl Instance {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::new())),
            bootstrap: Once::new(),
            outcome: Mutex::new(None),
        }
    }

    /// Run `f` against a fresh context exactly once. Every caller, including
    /// later ones, observes the outcome of that single run.
    pub fn bootstrap<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Context) -> Result<()>,
    {
        self.bootstrap.call_once(|| {
            let mut ctx = self.open_context();
            let outcome = f(&mut ctx).map_err(|e| format!("{e:#}"));
            *self.outcome.lock() = Some(outcome);
        });
        match &*self.outcome.lock() {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => bail!("bootstrap failed: {e}"),
            None => bail!("bootstrap did not complete"),
        }
    }

    /// Bootstrap with the default database and the given schema scripts.
    pub fn load_schema(
        &self,
        default_db: &str,
        scripts: &[Script],
        filter: ConstraintFilter,
    ) -> Result<()> {
        self.bootstrap(|ctx| {
            ctx.create_and_use(default_db)?;
            for script in scripts {
                log::debug!("loading schema script {}", script.name);
                ctx.run_script(script, filter)?;
                // Scripts may switch databases; each starts from the default.
                ctx.use_db(default_db)?;
            }
            log::info!("loaded {} schema scripts", scripts.len());
            Ok(())
        })
    }

    pub fn open_context(&self) -> Context {
        Context {
            catalog: self.catalog.clone(),
            current_db: None,
            vars: BTreeMap::new(),
        }
    }
}

/// One session against the shared catalog. Not meant to be shared between
/// threads; open one per session.
pub struct Context {
    catalog: Arc<RwLock<Catalog>>,
    current_db: Option<String>,
    vars: BTreeMap<String, String>,
}

impl Context {
    pub fn create_and_use(&mut self, db: &str) -> Result<()> {
        self.catalog.write().create_database(db, true)?;
        self.use_db(db)
    }

    /// Execute every statement of a script. `CREATE TABLE` statements are
    /// stripped of constraints according to `filter`.
    pub fn run_script(&mut self, script: &Script, filter: ConstraintFilter) -> Result<()> {
        for mut stmt in parser::parse_all(&script.name, &script.sql)? {
            if let Statement::CreateTable(ct) = &mut stmt {
                filter.apply(ct);
            }
            self.execute(&stmt)?;
        }
        Ok(())
    }

    /// Value of a session variable set with `SET`.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    fn db_or_current<'s>(&'s self, db: &'s Option<String>) -> Result<&'s str> {
        match (db, &self.current_db) {
            (Some(db), _) | (None, Some(db)) => Ok(db),
            (None, None) => bail!("No database selected"),
        }
    }
}

impl FrontEnd for Context {
    fn parse_one(&self, sql: &str) -> Result<Statement> {
        parser::parse_one("<statement>", sql)
    }

    fn plan(&mut self, stmt: &Statement) -> Result<Plan> {
        let catalog = self.catalog.read();
        Planner::new(&catalog, self.current_db.as_deref()).plan(stmt)
    }

    fn current_db(&self) -> Option<&str> {
        self.current_db.as_deref()
    }

    fn use_db(&mut self, db: &str) -> Result<()> {
        if !self.catalog.read().has_database(db) {
            bail!("Unknown database '{db}'");
        }
        self.current_db = Some(db.to_string());
        Ok(())
    }

    fn execute(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::CreateDatabase {
                name,
                if_not_exists,
            } => self.catalog.write().create_database(name, *if_not_exists),
            Statement::DropDatabase { name, if_exists } => {
                self.catalog.write().drop_database(name, *if_exists)?;
                if self
                    .current_db
                    .as_ref()
                    .is_some_and(|db| db.eq_ignore_ascii_case(name))
                {
                    self.current_db = None;
                }
                Ok(())
            }
            Statement::CreateTable(ct) => {
                let db = self.db_or_current(&ct.name.db)?.to_string();
                self.catalog.write().create_table(&db, ct)
            }
            Statement::DropTable { names, if_exists } => {
                for name in names {
                    let db = self.db_or_current(&name.db)?.to_string();
                    self.catalog.write().drop_table(&db, &name.name, *if_exists)?;
                }
                Ok(())
            }
            Statement::Use(db) => self.use_db(db),
            Statement::Set(items) => {
                for item in items {
                    match item {
                        crate::ast::SetItem::Variable { name, value } => {
                            self.vars.insert(name.to_lowercase(), render_expr(value));
                        }
                        crate::ast::SetItem::Names(charset) => {
                            log::debug!("ignoring SET NAMES {charset}");
                        }
                    }
                }
                Ok(())
            }
            Statement::Begin | Statement::Commit | Statement::Rollback => Ok(()),
            Statement::Query(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_) => Ok(()),
        }
    }

    fn restore_sql(&self, stmt: &Statement) -> String {
        render_statement(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(sql: &str) -> Script {
        Script {
            name: "test.sql".to_string(),
            sql: sql.to_string(),
        }
    }

    #[test]
    fn bootstrap_runs_once() -> Result<()> {
        let instance = Instance::new();
        instance.load_schema(
            "test",
            &[script("CREATE TABLE t (id INT PRIMARY KEY, code VARCHAR(4) UNIQUE)")],
            ConstraintFilter::KeepIntPk,
        )?;
        // A second bootstrap is not run and reports the first outcome.
        instance.bootstrap(|_| bail!("not run"))?;

        let mut ctx = instance.open_context();
        assert_eq!(ctx.current_db(), None);
        ctx.use_db("test")?;
        let stmt = ctx.parse_one("SELECT code FROM t WHERE id = 1")?;
        assert!(matches!(ctx.plan(&stmt)?, Plan::Select(_)));
        Ok(())
    }

    #[test]
    fn failed_bootstrap_is_sticky() {
        let instance = Instance::new();
        let err = instance.load_schema("test", &[script("CREATE TABLE")], ConstraintFilter::All);
        assert!(err.is_err());
        assert!(instance.bootstrap(|_| Ok(())).is_err());
    }

    #[test]
    fn session_statements() -> Result<()> {
        let instance = Instance::new();
        let mut ctx = instance.open_context();
        assert!(ctx.use_db("nope").is_err());
        assert!(ctx.run_script(&script("CREATE TABLE t (a INT)"), ConstraintFilter::None).is_err());

        ctx.run_script(
            &script(
                "CREATE DATABASE app; USE app; CREATE TABLE t (a INT); SET @x = 1; BEGIN; INSERT INTO t VALUES (1); COMMIT",
            ),
            ConstraintFilter::None,
        )?;
        assert_eq!(ctx.current_db(), Some("app"));
        assert_eq!(ctx.var("@X"), Some("1"));

        // Other sessions share the catalog but not the current database.
        let mut other = instance.open_context();
        other.use_db("app")?;
        let stmt = other.parse_one("DROP DATABASE app")?;
        other.execute(&stmt)?;
        assert_eq!(other.current_db(), None);
        assert!(ctx.use_db("app").is_err());
        Ok(())
    }
}
