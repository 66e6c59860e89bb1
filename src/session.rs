// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use crate::ast::Statement;
use crate::catalog::ConstraintFilter;
use crate::cast_graph::{CastGraphBuilder, InferredTypeMap};
use crate::config::MaskSettings;
use crate::datum::Datum;
use crate::error::{MaskError, Outcome};
use crate::event::{Event, Param, Payload};
use crate::frontend::{Context, FrontEnd, Instance, Script};
use crate::marker::{substitute, Marker, SubstituteMode};
use crate::restore::{convert_and_mask, restore_names, restore_values};
use crate::stats::Stats;

/// What a prepare leaves behind for later executions.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub sql: String,
    pub types: InferredTypeMap,
    /// One slot per placeholder, in source order.
    pub params: Vec<Option<Marker>>,
}

/// Masks the statements and events of one connection. A session is used
/// by one thread at a time; open one per connection or input file.
pub struct Session<F: FrontEnd = Context> {
    frontend: F,
    settings: Arc<MaskSettings>,
    prepared: HashMap<u64, Prepared>,
    stats: Stats,
}

impl Session<Context> {
    /// Open a session on a bootstrapped instance, switch to the default
    /// database and run the per-session scripts.
    pub fn open(instance: &Instance, settings: Arc<MaskSettings>, scripts: &[Script]) -> Result<Self> {
        let mut ctx = instance.open_context();
        ctx.use_db(&settings.default_db)?;
        for script in scripts {
            ctx.run_script(script, ConstraintFilter::None)?;
        }
        Ok(Self::new(ctx, settings))
    }
}

fn failed(sql: &str, error: MaskError) -> Outcome<String> {
    Outcome::Failed {
        fallback: format!("/* FAILED: {error} */ {sql}"),
        error,
    }
}

impl<F: FrontEnd> Session<F> {
    pub fn new(frontend: F, settings: Arc<MaskSettings>) -> Self {
        Self {
            frontend,
            settings,
            prepared: HashMap::new(),
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn prepared(&self, stmt_id: u64) -> Option<&Prepared> {
        self.prepared.get(&stmt_id)
    }

    /// Mask one statement and count its outcome.
    pub fn mask_sql(&mut self, sql: &str) -> Outcome<String> {
        let outcome = self.mask_query(sql);
        self.stats.record(&outcome);
        outcome
    }

    fn parse(&self, sql: &str) -> Result<Statement, MaskError> {
        self.frontend
            .parse_one(sql)
            .map_err(|e| MaskError::Parse(format!("{e:#}")))
    }

    fn rename(&self, stmt: &mut Statement, columns: &[String]) -> Result<Vec<MaskError>, MaskError> {
        match &self.settings.name_map {
            Some(map) => restore_names(stmt, map, columns, self.frontend.current_db()),
            None => Ok(vec![]),
        }
    }

    /// Substitute, plan, infer, restore.
    fn mask_query(&mut self, sql: &str) -> Outcome<String> {
        let mut stmt = match self.parse(sql) {
            Ok(stmt) => stmt,
            Err(e) => return failed(sql, e),
        };

        if stmt.is_simple() {
            return match self.mask_simple(stmt) {
                Ok((text, errors)) => Outcome::from_parts(text, errors),
                Err(e) => failed(sql, e),
            };
        }

        let result = (|| {
            let sub = substitute(&mut stmt, SubstituteMode::Value)?;
            let plan = self.frontend.plan(&stmt)?;
            let builder = CastGraphBuilder::build(&plan);
            let types = builder.infer_types();
            let mut errors = restore_values(&mut stmt, &sub.origins, &types, &self.settings)?;
            errors.extend(self.rename(&mut stmt, &builder.columns)?);
            Ok::<_, MaskError>(errors)
        })();
        match result {
            Ok(errors) => Outcome::from_parts(self.frontend.restore_sql(&stmt), errors),
            Err(e) => failed(sql, e),
        }
    }

    /// Statements without values. Session statements take effect so that
    /// later statements resolve against them; schema changes are left to
    /// the schema scripts.
    fn mask_simple(&mut self, mut stmt: Statement) -> Result<(String, Vec<MaskError>), MaskError> {
        if matches!(stmt, Statement::Use(_) | Statement::Set(_)) {
            if let Err(e) = self.frontend.execute(&stmt) {
                log::debug!("ignoring failed session statement: {e:#}");
            }
        }
        let errors = self.rename(&mut stmt, &[])?;
        Ok((self.frontend.restore_sql(&stmt), errors))
    }

    /// A new logical connection: forget prepared statements and switch to
    /// `db`. Returns the database name to forward.
    pub fn handshake(&mut self, db: &str) -> String {
        self.prepared.clear();
        if db.is_empty() {
            return String::new();
        }
        if let Err(e) = self.frontend.use_db(db) {
            log::debug!("handshake keeps current database: {e:#}");
        }
        match &self.settings.name_map {
            Some(map) => map.db(db),
            None => db.to_string(),
        }
    }

    /// Analyze a statement with placeholders and remember its parameter
    /// types. The returned text only has its identifiers renamed.
    pub fn prepare(&mut self, stmt_id: u64, sql: &str) -> Outcome<String> {
        let result = (|| {
            let mut stmt = self.parse(sql)?;
            let sub = substitute(&mut stmt, SubstituteMode::ParamMarker)?;
            let plan = self.frontend.plan(&stmt)?;
            let builder = CastGraphBuilder::build(&plan);
            let types = builder.infer_types();

            let mut original = self.parse(sql)?;
            let errors = self.rename(&mut original, &builder.columns)?;
            let text = match self.settings.name_map {
                Some(_) => self.frontend.restore_sql(&original),
                None => sql.to_string(),
            };

            log::debug!(
                "prepared statement {stmt_id} with {} parameters and {} inferred types",
                sub.params.len(),
                types.len()
            );
            self.prepared.insert(
                stmt_id,
                Prepared {
                    sql: sql.to_string(),
                    types,
                    params: sub.params,
                },
            );
            Ok::<_, MaskError>((text, errors))
        })();
        match result {
            Ok((text, errors)) => Outcome::from_parts(text, errors),
            Err(error) => Outcome::Failed {
                fallback: sql.to_string(),
                error,
            },
        }
    }

    /// Mask the values bound to a prepared statement.
    pub fn execute(&mut self, stmt_id: u64, params: &[Datum]) -> Outcome<Vec<Datum>> {
        let Some(prepared) = self.prepared.get(&stmt_id) else {
            return Outcome::Failed {
                fallback: params.to_vec(),
                error: MaskError::PreparedStatementNotFound(stmt_id),
            };
        };
        if prepared.params.len() != params.len() {
            return Outcome::Failed {
                fallback: params.to_vec(),
                error: MaskError::ParamCountMismatch {
                    expected: prepared.params.len(),
                    actual: params.len(),
                },
            };
        }

        let mut errors = vec![];
        let mut masked = Vec::with_capacity(params.len());
        for (value, slot) in params.iter().zip(&prepared.params) {
            // Placeholders that were not substituted, such as `LIMIT ?`.
            let Some(marker) = slot else {
                masked.push(value.clone());
                continue;
            };
            // A parameter folded with a constant, as in `? + 1`, shows up
            // as a neighbor of its marker.
            let tp = std::iter::once(*marker)
                .chain(marker.neighbors())
                .find_map(|m| prepared.types.get(&m));
            let Some(tp) = tp else {
                errors.push(MaskError::TypeInferenceGap(value.to_text()));
                masked.push(value.clone());
                continue;
            };
            match convert_and_mask(value, tp, &self.settings) {
                Ok((d, _)) => masked.push(d),
                Err(e) => {
                    errors.push(e);
                    masked.push(value.clone());
                }
            }
        }
        Outcome::from_parts(masked, errors)
    }

    pub fn close(&mut self, stmt_id: u64) {
        if self.prepared.remove(&stmt_id).is_none() {
            log::debug!("closing unknown statement {stmt_id}");
        }
    }

    /// Mask one event and count its outcome. A failed event is returned
    /// unchanged.
    pub fn mask_event(&mut self, ev: &Event) -> Outcome<Event> {
        let with = |payload: Payload| Event {
            payload,
            ..ev.clone()
        };
        let outcome = match &ev.payload {
            Payload::Handshake { db } => {
                let db = self.handshake(db);
                Outcome::Masked(with(Payload::Handshake { db }))
            }
            Payload::Query { query } => match self.mask_query(query) {
                Outcome::Failed { error, .. } => Outcome::Failed {
                    fallback: ev.clone(),
                    error,
                },
                outcome => outcome.map(|query| with(Payload::Query { query })),
            },
            Payload::StmtPrepare { stmt_id, query } => {
                let stmt_id = *stmt_id;
                self.prepare(stmt_id, query)
                    .map(|query| with(Payload::StmtPrepare { stmt_id, query }))
            }
            Payload::StmtExecute { stmt_id, params } => {
                let stmt_id = *stmt_id;
                let values: Result<Vec<Datum>> = params.iter().map(Param::to_datum).collect();
                match values {
                    Ok(values) => match self.execute(stmt_id, &values) {
                        Outcome::Failed { error, .. } => Outcome::Failed {
                            fallback: ev.clone(),
                            error,
                        },
                        outcome => outcome.map(|values| {
                            with(Payload::StmtExecute {
                                stmt_id,
                                params: values.iter().map(Param::from_datum).collect(),
                            })
                        }),
                    },
                    Err(e) => Outcome::Failed {
                        fallback: ev.clone(),
                        error: MaskError::Parse(format!("{e:#}")),
                    },
                }
            }
            Payload::StmtClose { stmt_id } => {
                self.close(*stmt_id);
                Outcome::Masked(ev.clone())
            }
        };
        self.stats.record(&outcome);
        outcome
    }

    /// Mask a stream of JSON-lines events. Events that fail, and lines that
    /// are not events, are written unchanged, counted as failed and logged.
    /// Only I/O errors end the stream.
    pub fn mask_lines<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<Stats> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let ev = match Event::from_line(&line) {
                Ok(ev) => ev,
                Err(e) => {
                    log::warn!("{e:#}");
                    self.stats.record(&Outcome::Failed {
                        fallback: (),
                        error: MaskError::Parse(format!("{e:#}")),
                    });
                    writeln!(output, "{line}")?;
                    continue;
                }
            };
            let outcome = self.mask_event(&ev);
            if let Outcome::Failed { error, .. } = &outcome {
                log::warn!("failed to mask event {line}: {error}");
            }
            writeln!(output, "{}", outcome.output().to_line()?)?;
        }
        output.flush()?;
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_map::NameMap;

    fn open(mask: &str, ignore_int_pk: bool) -> Result<Session> {
        let instance = Instance::new();
        instance.load_schema(
            "test",
            &[Script {
                name: "schema.sql".to_string(),
                sql: "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20), bal INT)".to_string(),
            }],
            ConstraintFilter::KeepIntPk,
        )?;
        let mut settings = MaskSettings::with_mask(mask)?;
        settings.ignore_int_pk = ignore_int_pk;
        Session::open(&instance, Arc::new(settings), &[])
    }

    #[test]
    fn hashed_point_lookup() -> Result<()> {
        let mut session = open("bounded-hash", false)?;
        let outcome = session.mask_sql("SELECT * FROM t WHERE id = 42");
        let Outcome::Masked(text) = &outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        let value: i64 = text
            .strip_prefix("SELECT * FROM t WHERE id = ")
            .unwrap_or_default()
            .parse()?;
        assert_ne!(value, 42);
        assert!((0..=127).contains(&value));

        // Same key, same output.
        assert_eq!(session.mask_sql("SELECT * FROM t WHERE id = 42"), outcome);

        let mut session = open("bounded-hash", true)?;
        assert_eq!(
            session.mask_sql("SELECT * FROM t WHERE id = 42"),
            Outcome::Masked("SELECT * FROM t WHERE id = 42".to_string())
        );
        Ok(())
    }

    #[test]
    fn prepared_statement_reuse() -> Result<()> {
        let mut session = open("bounded-hash", false)?;
        let sql = "INSERT INTO t(name) VALUES (?)";
        assert_eq!(session.prepare(1, sql), Outcome::Masked(sql.to_string()));
        assert_eq!(session.prepared(1).map(|p| p.params.len()), Some(1));

        let mut masked = vec![];
        for name in ["alice", "bob"] {
            let outcome = session.execute(1, &[Datum::String(name.to_string())]);
            let Outcome::Masked(values) = outcome else {
                panic!("unexpected outcome {outcome:?}");
            };
            let [Datum::String(s)] = values.as_slice() else {
                panic!("unexpected values {values:?}");
            };
            assert_eq!(s.len(), name.len());
            assert_ne!(s, name);
            masked.push(s.clone());
        }
        assert_ne!(masked[0], masked[1]);
        Ok(())
    }

    #[test]
    fn prepare_without_placeholders() -> Result<()> {
        let mut session = open("identity", false)?;
        let sql = "UPDATE t SET bal = bal + 100 WHERE id = 7";
        assert!(session.prepare(3, sql).is_masked());
        let prepared = session.prepared(3).map(|p| p.params.len());
        assert_eq!(prepared, Some(0));
        assert!(session.execute(3, &[]).is_masked());
        Ok(())
    }

    #[test]
    fn folded_parameters_use_neighbor_types() -> Result<()> {
        let mut session = open("debug", false)?;
        for (stmt_id, sql, offset) in [
            (1, "UPDATE t SET bal = ? + 1 WHERE id = 3", 1),
            (2, "UPDATE t SET bal = ? - 1 WHERE id = 3", -1),
        ] {
            assert!(session.prepare(stmt_id, sql).is_masked(), "{sql}");
            let Some(prepared) = session.prepared(stmt_id) else {
                panic!("{sql} was not prepared");
            };
            let Some(Some(marker)) = prepared.params.first().copied() else {
                panic!("no marker for {sql}");
            };
            assert!(!prepared.types.contains_key(&marker));
            assert!(prepared.types.contains_key(&Marker(marker.0 + offset)));

            let outcome = session.execute(stmt_id, &[Datum::Int(5)]);
            assert_eq!(
                outcome,
                Outcome::Masked(vec![Datum::String("int(11) 5".to_string())]),
                "{sql}"
            );
        }
        Ok(())
    }

    #[test]
    fn bare_constant_is_problematic() -> Result<()> {
        let mut session = open("identity", false)?;
        let outcome = session.mask_sql("SELECT 42");
        match &outcome {
            Outcome::Problematic { output, errors } => {
                assert_eq!(output, "SELECT 42");
                assert_eq!(errors, &vec![MaskError::TypeInferenceGap("42".to_string())]);
            }
            _ => panic!("unexpected outcome {outcome:?}"),
        }
        let stats = session.stats();
        assert_eq!((stats.problematic, stats.failed()), (1, 0));
        Ok(())
    }

    #[test]
    fn unknown_and_closed_statements() -> Result<()> {
        let mut session = open("identity", false)?;
        assert_eq!(
            session.execute(9, &[Datum::Int(1)]).error(),
            Some(MaskError::PreparedStatementNotFound(9))
        );

        assert!(session.prepare(1, "SELECT name FROM t WHERE bal > ?").is_masked());
        assert_eq!(
            session.execute(1, &[]).error(),
            Some(MaskError::ParamCountMismatch {
                expected: 1,
                actual: 0
            })
        );
        session.close(1);
        assert!(session.execute(1, &[Datum::Int(1)]).is_failed());

        assert!(session.prepare(2, "SELECT name FROM t WHERE bal > ?").is_masked());
        session.handshake("test");
        assert!(session.prepared(2).is_none());
        Ok(())
    }

    #[test]
    fn failed_statements_keep_text() -> Result<()> {
        let mut session = open("identity", false)?;
        let outcome = session.mask_sql("SELECT nope FROM t");
        assert!(outcome.is_failed());
        assert!(outcome.output().starts_with("/* FAILED: plan error"));
        assert!(outcome.output().ends_with("*/ SELECT nope FROM t"));

        let outcome = session.prepare(1, "SELECT nope FROM t WHERE id = ?");
        assert!(outcome.is_failed());
        assert_eq!(outcome.output(), "SELECT nope FROM t WHERE id = ?");
        Ok(())
    }

    #[test]
    fn renamed_prepare_and_handshake() -> Result<()> {
        let instance = Instance::new();
        instance.load_schema(
            "test",
            &[Script {
                name: "schema.sql".to_string(),
                sql: "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20))".to_string(),
            }],
            ConstraintFilter::KeepIntPk,
        )?;
        let mut settings = MaskSettings::with_mask("identity")?;
        let mut map = NameMap::from_columns(
            [
                ("test.t.id".to_string(), "m.t0.c0".to_string()),
                ("test.t.name".to_string(), "m.t0.c1".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        map.dbs.insert("other".to_string(), "m2".to_string());
        settings.name_map = Some(map);
        let mut session = Session::open(&instance, Arc::new(settings), &[])?;

        assert_eq!(
            session.prepare(1, "SELECT name FROM t WHERE id = ?"),
            Outcome::Masked("SELECT c1 FROM t0 WHERE c0 = ?".to_string())
        );
        assert_eq!(session.handshake("test"), "m");
        assert_eq!(session.handshake("other"), "m2");
        Ok(())
    }
}
