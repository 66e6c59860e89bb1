// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::ast::{ColumnOption, ConstraintKind, CreateTable};
use crate::types::{EvalType, FieldType};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub tp: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub db: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The integer primary key, if the key is exactly one integer column.
    /// Such a key doubles as the row handle.
    pub fn int_handle(&self) -> Option<&ColumnInfo> {
        let mut pk = self.columns.iter().filter(|c| c.tp.primary_key);
        match (pk.next(), pk.next()) {
            (Some(c), None) if c.tp.eval_type() == EvalType::Int => Some(c),
            _ => None,
        }
    }

    /// `db.table.column`, lower case.
    pub fn origin(&self, column: &ColumnInfo) -> String {
        format!("{}.{}.{}", self.db, self.name, column.name).to_lowercase()
    }
}

/// Which constraints survive when schema scripts are loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintFilter {
    None,
    #[default]
    KeepIntPk,
    All,
}

impl ConstraintFilter {
    /// Drop constraints from a `CREATE TABLE`. With `KeepIntPk` only a
    /// single-column integer primary key is kept.
    pub fn apply(&self, ct: &mut CreateTable) {
        if *self == ConstraintFilter::None {
            return;
        }
        let is_int = |name: &str| {
            ct.columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(name) && c.tp.eval_type() == EvalType::Int)
        };
        let keep_pk = *self == ConstraintFilter::KeepIntPk;

        let table_pk: Option<String> = ct
            .constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
            .and_then(|c| match c.columns.as_slice() {
                [col] if keep_pk && is_int(col) => Some(col.clone()),
                _ => None,
            });
        ct.constraints.retain(|c| {
            c.kind == ConstraintKind::PrimaryKey
                && table_pk
                    .as_ref()
                    .is_some_and(|pk| c.columns.len() == 1 && c.columns[0] == *pk)
        });

        for col in &mut ct.columns {
            let int_col = col.tp.eval_type() == EvalType::Int;
            col.options.retain(|o| match o {
                ColumnOption::PrimaryKey => keep_pk && int_col,
                ColumnOption::Unique => false,
                _ => true,
            });
        }
    }
}

/// Databases, tables and column types known to an instance. Names are
/// matched case-insensitively.
#[derive(Debug, Default)]
pub struct Catalog {
    dbs: BTreeMap<String, BTreeMap<String, TableInfo>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_database(&self, db: &str) -> bool {
        self.dbs.contains_key(&db.to_lowercase())
    }

    pub fn create_database(&mut self, db: &str, if_not_exists: bool) -> Result<()> {
        let key = db.to_lowercase();
        if self.dbs.contains_key(&key) {
            if if_not_exists {
                return Ok(());
            }
            bail!("can't create database '{db}'; database exists");
        }
        self.dbs.insert(key, BTreeMap::new());
        Ok(())
    }

    pub fn drop_database(&mut self, db: &str, if_exists: bool) -> Result<()> {
        if self.dbs.remove(&db.to_lowercase()).is_none() && !if_exists {
            bail!("can't drop database '{db}'; database doesn't exist");
        }
        Ok(())
    }

    pub fn create_table(&mut self, db: &str, ct: &CreateTable) -> Result<()> {
        let tables = match self.dbs.get_mut(&db.to_lowercase()) {
            Some(t) => t,
            None => bail!("unknown database '{db}'"),
        };
        let key = ct.name.name.to_lowercase();
        if tables.contains_key(&key) {
            if ct.if_not_exists {
                return Ok(());
            }
            bail!("table '{db}.{}' already exists", ct.name.name);
        }

        let pk_columns: Vec<String> = ct
            .constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::PrimaryKey)
            .flat_map(|c| c.columns.iter().map(|n| n.to_lowercase()))
            .collect();

        let mut columns: Vec<ColumnInfo> = vec![];
        for def in &ct.columns {
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&def.name)) {
                bail!("duplicate column name '{}'", def.name);
            }
            let mut tp = def.tp.clone();
            tp.primary_key = def
                .options
                .iter()
                .any(|o| matches!(o, ColumnOption::PrimaryKey))
                || pk_columns.contains(&def.name.to_lowercase());
            columns.push(ColumnInfo {
                name: def.name.clone(),
                tp,
            });
        }
        for pk in &pk_columns {
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(pk)) {
                bail!("key column '{pk}' doesn't exist in table");
            }
        }

        tables.insert(
            key,
            TableInfo {
                db: db.to_lowercase(),
                name: ct.name.name.clone(),
                columns,
            },
        );
        Ok(())
    }

    pub fn drop_table(&mut self, db: &str, table: &str, if_exists: bool) -> Result<()> {
        let removed = self
            .dbs
            .get_mut(&db.to_lowercase())
            .and_then(|tables| tables.remove(&table.to_lowercase()));
        if removed.is_none() && !if_exists {
            bail!("unknown table '{db}.{table}'");
        }
        Ok(())
    }

    pub fn table(&self, db: &str, table: &str) -> Option<&TableInfo> {
        self.dbs
            .get(&db.to_lowercase())
            .and_then(|tables| tables.get(&table.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use crate::parser::parse_one;

    fn create_table(sql: &str) -> Result<CreateTable> {
        match parse_one("test", sql)? {
            Statement::CreateTable(ct) => Ok(ct),
            _ => bail!("not a create table"),
        }
    }

    #[test]
    fn primary_keys() -> Result<()> {
        let mut catalog = Catalog::new();
        catalog.create_database("Test", false)?;
        assert!(catalog.create_database("test", false).is_err());
        catalog.create_database("test", true)?;

        let ct = create_table("CREATE TABLE t (id INT, name VARCHAR(20), PRIMARY KEY (id))")?;
        catalog.create_table("test", &ct)?;
        assert!(catalog.create_table("test", &ct).is_err());

        let t = catalog.table("TEST", "T").map(|t| t.origin(&t.columns[1]));
        assert_eq!(t.as_deref(), Some("test.t.name"));

        let ct = create_table("CREATE TABLE u (a INT, b INT, PRIMARY KEY (a, b))")?;
        catalog.create_table("test", &ct)?;
        let u = catalog.table("test", "u");
        assert!(u.is_some_and(|u| u.int_handle().is_none() && u.columns[0].tp.primary_key));
        assert!(catalog
            .table("test", "t")
            .is_some_and(|t| t.int_handle().is_some_and(|c| c.name == "id")));

        catalog.drop_table("test", "u", false)?;
        assert!(catalog.drop_table("test", "u", false).is_err());
        catalog.drop_table("test", "u", true)?;
        Ok(())
    }

    #[test]
    fn filter_constraints() -> Result<()> {
        let sql = "CREATE TABLE t (id BIGINT, code VARCHAR(8) UNIQUE, PRIMARY KEY (id), UNIQUE KEY uk (code), KEY idx (code))";

        let mut ct = create_table(sql)?;
        ConstraintFilter::KeepIntPk.apply(&mut ct);
        assert_eq!(ct.constraints.len(), 1);
        assert!(ct.columns[1].options.is_empty());

        let mut ct = create_table(sql)?;
        ConstraintFilter::All.apply(&mut ct);
        assert!(ct.constraints.is_empty());

        let mut ct = create_table(sql)?;
        ConstraintFilter::None.apply(&mut ct);
        assert_eq!(ct.constraints.len(), 3);

        let mut ct = create_table("CREATE TABLE t (code VARCHAR(8) PRIMARY KEY)")?;
        ConstraintFilter::KeepIntPk.apply(&mut ct);
        assert!(ct.columns[0].options.is_empty());
        Ok(())
    }
}
