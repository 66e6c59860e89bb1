// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::ast::{ColumnName, Statement, TableName};
use crate::error::MaskError;
use crate::visitor::{walk_statement, Node, Visitor};

const DICT_CONTEXT: &str = "sql-masker name dictionary";
const DICT_PREFIX: &str = "_h";

/// Synthesizes stable names for identifiers that have no entry in a name
/// map. Each key maps to `_h` followed by a base-36 hash; collisions take
/// the next free value.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    names: HashMap<String, u32>,
    used: HashSet<u32>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, key: &str) -> String {
        if let Some(v) = self.names.get(key) {
            return render(*v);
        }
        let mut digest = [0u8; 4];
        blake3::Hasher::new_derive_key(DICT_CONTEXT)
            .update(key.as_bytes())
            .finalize_xof()
            .fill(&mut digest);
        let mut v = u32::from_le_bytes(digest);
        while !self.used.insert(v) {
            v = v.wrapping_add(1);
        }
        self.names.insert(key.to_string(), v);
        render(v)
    }
}

fn render(v: u32) -> String {
    format!("{DICT_PREFIX}{}", BigUint::from(v).to_str_radix(36))
}

/// Identifier renames for databases, tables (`db.table`) and columns
/// (`db.table.column`). All keys are lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMap {
    #[serde(default)]
    pub dbs: BTreeMap<String, String>,
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

/// Longest-suffix match of a dotted name. Returns the unmatched prefix
/// tokens and the mapped suffix, if any suffix matched.
fn find<'m>(from: &str, map: &'m BTreeMap<String, String>) -> (Vec<String>, Option<&'m str>) {
    if from.is_empty() {
        return (vec![], None);
    }
    let from = from.to_lowercase();
    let tokens: Vec<&str> = from.split('.').collect();
    for i in 0..tokens.len() {
        let suffix = tokens[i..].join(".");
        if let Some(mapped) = map.get(&suffix) {
            let prefix = tokens[..i].iter().map(|t| t.to_string()).collect();
            return (prefix, Some(mapped.as_str()));
        }
    }
    (tokens.iter().map(|t| t.to_string()).collect(), None)
}

fn join_mapped(mut prefix: Vec<String>, mapped: Option<&str>) -> String {
    if let Some(m) = mapped {
        prefix.push(m.to_string());
    }
    prefix.join(".")
}

impl NameMap {
    /// Build a map from column renames, deriving database and table renames
    /// from the column keys.
    pub fn from_columns(columns: BTreeMap<String, String>) -> Self {
        let mut dbs = BTreeMap::new();
        let mut tables = BTreeMap::new();
        for (from, to) in &columns {
            let from: Vec<&str> = from.split('.').collect();
            let to: Vec<&str> = to.split('.').collect();
            if from.len() < 2 || to.len() < 2 {
                continue;
            }
            dbs.insert(from[0].to_string(), to[0].to_string());
            tables.insert(from[..2].join("."), to[..2].join("."));
        }
        Self {
            dbs,
            tables,
            columns,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => bail!("failed to read name map {}: {e}", path.display()),
        };
        let map: NameMap = serde_json::from_str(&contents)?;
        Ok(map.normalized())
    }

    fn normalized(self) -> Self {
        let lower = |m: BTreeMap<String, String>| {
            m.into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            dbs: lower(self.dbs),
            tables: lower(self.tables),
            columns: lower(self.columns),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn db(&self, from: &str) -> String {
        match self.dbs.get(&from.to_lowercase()) {
            Some(to) => to.clone(),
            None => from.to_string(),
        }
    }

    fn column(&self, from: &str) -> String {
        let (prefix, mapped) = find(from, &self.columns);
        join_mapped(prefix, mapped)
    }

    /// Restrict the map to the given fully qualified columns. Every suffix
    /// of each column name becomes a key, so `t.id` and `id` resolve too.
    pub fn local<I, S>(&self, referenced: I, current_db: Option<&str>) -> LocalNameMap<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns = BTreeMap::new();
        for orig in referenced {
            let orig = orig.as_ref().to_lowercase();
            let mapped = self.column(&orig);
            let orig_tokens: Vec<&str> = orig.split('.').collect();
            let mapped_tokens: Vec<&str> = mapped.split('.').collect();
            for i in 0..orig_tokens.len() {
                let mapped_suffix = match mapped_tokens.get(i..) {
                    Some(t) if !t.is_empty() => t.join("."),
                    _ => continue,
                };
                columns.insert(orig_tokens[i..].join("."), mapped_suffix);
            }
        }
        LocalNameMap {
            global: self,
            columns,
            current_db: current_db.map(|d| d.to_lowercase()),
            dict: Dictionary::new(),
            misses: vec![],
        }
    }
}

/// A per-statement view of a [`NameMap`]. Lookups always produce a name;
/// unmatched qualifiers are synthesized through a [`Dictionary`].
#[derive(Debug)]
pub struct LocalNameMap<'a> {
    global: &'a NameMap,
    columns: BTreeMap<String, String>,
    current_db: Option<String>,
    dict: Dictionary,
    misses: Vec<MaskError>,
}

impl LocalNameMap<'_> {
    fn map_prefix(&mut self, prefix: Vec<String>) -> Vec<String> {
        prefix.iter().map(|p| self.dict.map(p)).collect()
    }

    pub fn column(&mut self, from: &str) -> String {
        let (prefix, mapped) = find(from, &self.columns);
        let mapped = mapped.map(str::to_string);
        let prefix = self.map_prefix(prefix);
        join_mapped(prefix, mapped.as_deref())
    }

    pub fn table(&mut self, from: &str) -> String {
        match self.current_db.clone() {
            Some(db) if !from.contains('.') => {
                let qualified = format!("{db}.{from}");
                let to = self.lookup_table(&qualified);
                match to.split_once('.') {
                    Some((_, table)) => table.to_string(),
                    None => to,
                }
            }
            _ => self.lookup_table(from),
        }
    }

    fn lookup_table(&mut self, from: &str) -> String {
        let global = self.global;
        let (prefix, mapped) = find(from, &global.tables);
        if mapped.is_none() && !from.is_empty() {
            self.misses
                .push(MaskError::NameMapLookupMiss(format!("table `{from}`")));
        }
        let prefix = self.map_prefix(prefix);
        join_mapped(prefix, mapped)
    }

    pub fn alias(&mut self, from: &str) -> String {
        self.dict.map(&from.to_lowercase())
    }

    pub fn db(&self, from: &str) -> String {
        self.global.db(from)
    }

    pub fn take_errors(&mut self) -> Vec<MaskError> {
        std::mem::take(&mut self.misses)
    }

    fn rename_column(&mut self, c: &mut ColumnName) {
        let mapped = self.column(&c.dotted());
        let mut tokens: Vec<&str> = mapped.split('.').collect();
        if let Some(name) = tokens.pop() {
            c.name = name.to_string();
        }
        if let Some(table) = tokens.pop() {
            c.table = Some(table.to_string());
        }
        if let Some(db) = tokens.pop() {
            c.db = Some(db.to_string());
        }
    }

    fn rename_table(&mut self, t: &mut TableName) {
        let mapped = self.table(&t.dotted());
        let mut tokens: Vec<&str> = mapped.split('.').collect();
        if let Some(name) = tokens.pop() {
            t.name = name.to_string();
        }
        if let Some(db) = tokens.pop() {
            t.db = Some(db.to_string());
        }
    }
}

struct NameRewriter<'m, 'a> {
    map: &'m mut LocalNameMap<'a>,
}

impl Visitor for NameRewriter<'_, '_> {
    fn leave(&mut self, node: Node<'_>) -> Result<()> {
        match node {
            Node::ColumnName(c) => self.map.rename_column(c),
            Node::TableName(t) => self.map.rename_table(t),
            Node::TableAlias(a) | Node::FieldAlias(a) => *a = self.map.alias(a),
            Node::Database(d) => *d = self.map.db(d),
            Node::Expr(_) | Node::Limit(_) => (),
        }
        Ok(())
    }
}

/// Rewrite every identifier of the statement through the name map. Table
/// misses are recorded on the map as soft errors.
pub fn rewrite_names(stmt: &mut Statement, map: &mut LocalNameMap<'_>) -> Result<()> {
    walk_statement(&mut NameRewriter { map }, stmt)
}

struct SchemaFile {
    db: String,
    table: String,
    columns: Vec<String>,
}

impl SchemaFile {
    fn parse(file_name: &str, contents: &str) -> Result<Self> {
        let stem = match file_name.strip_suffix("-schema.sql") {
            Some(s) => s.to_lowercase(),
            None => bail!("bad schema file name: `{file_name}`"),
        };
        let (db, table) = match stem.split('.').collect::<Vec<_>>().as_slice() {
            [db, table] => (db.to_string(), table.to_string()),
            _ => bail!("bad schema file name: `{file_name}`"),
        };
        let stmts = crate::parser::parse_all(file_name, contents)?;
        for stmt in stmts {
            if let Statement::CreateTable(ct) = stmt {
                return Ok(Self {
                    db,
                    table,
                    columns: ct.columns.iter().map(|c| c.name.to_lowercase()).collect(),
                });
            }
        }
        bail!("not a create table statement in `{file_name}`")
    }

    fn prefix(&self) -> String {
        format!("{}.{}", self.db, self.table)
    }
}

/// Build a name map by pairing original and masked schema files named
/// `<db>.<table>-schema.sql`. Masked files are those whose database starts
/// with `masked_prefix`. Pairs are matched in (db, table) order and their
/// columns positionally.
pub fn generate<I>(schemas: I, masked_prefix: &str) -> Result<NameMap>
where
    I: IntoIterator<Item = (String, String)>,
{
    let masked_prefix = masked_prefix.to_lowercase();
    let mut originals = vec![];
    let mut masked = vec![];
    for (file_name, contents) in schemas {
        let info = SchemaFile::parse(&file_name, &contents)?;
        if info.db.starts_with(&masked_prefix) {
            masked.push(info);
        } else {
            originals.push(info);
        }
    }
    if originals.len() != masked.len() {
        bail!(
            "bad number of masked schemas: {} original, {} masked",
            originals.len(),
            masked.len()
        );
    }
    let by_name = |a: &SchemaFile, b: &SchemaFile| (&a.db, &a.table).cmp(&(&b.db, &b.table));
    originals.sort_by(by_name);
    masked.sort_by(by_name);

    let mut columns = BTreeMap::new();
    for (o, m) in originals.iter().zip(&masked) {
        if o.columns.len() != m.columns.len() {
            bail!(
                "bad number of columns for `{}` and `{}`",
                o.prefix(),
                m.prefix()
            );
        }
        for (oc, mc) in o.columns.iter().zip(&m.columns) {
            columns.insert(
                format!("{}.{oc}", o.prefix()),
                format!("{}.{mc}", m.prefix()),
            );
        }
    }
    Ok(NameMap::from_columns(columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::render_statement;
    use crate::parser::parse_one;

    fn global() -> NameMap {
        let columns = [
            ("test.t.id", "db0.table0.col0"),
            ("test.t.name", "db0.table0.col1"),
            ("test.t.birth", "db0.table0.col2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        NameMap::from_columns(columns)
    }

    #[test]
    fn suffix_lookups() {
        let global = global();
        assert_eq!(global.db("test"), "db0");
        assert_eq!(global.db("other"), "other");

        let mut local = global.local(["test.t.id", "test.t.name"], Some("test"));
        assert_eq!(local.column("id"), "col0");
        assert_eq!(local.column("T.ID"), "table0.col0");
        assert_eq!(local.column("test.t.id"), "db0.table0.col0");
        // birth was not referenced by the statement.
        assert!(local.column("birth").starts_with("_h"));

        let alias = local.alias("t1");
        assert_eq!(local.column("t1.id"), format!("{alias}.col0"));
        assert_eq!(local.column("unknown"), local.column("unknown"));

        assert_eq!(local.table("t"), "table0");
        assert_eq!(local.table("test.t"), "db0.table0");
        assert!(local.take_errors().is_empty());

        assert!(local.table("missing").starts_with("_h"));
        assert!(matches!(
            local.take_errors().as_slice(),
            [MaskError::NameMapLookupMiss(_)]
        ));
    }

    #[test]
    fn dictionary_is_stable() {
        let mut a = Dictionary::new();
        let mut b = Dictionary::new();
        let x = a.map("users");
        assert_eq!(x, a.map("users"));
        assert_eq!(x, b.map("users"));
        assert_ne!(x, a.map("orders"));
    }

    #[test]
    fn rewrite_statement() -> Result<()> {
        let global = global();
        let mut stmt = parse_one("test", "SELECT u.id, name AS n FROM t u WHERE u.birth > 1")?;
        let mut local = global.local(["test.t.id", "test.t.name", "test.t.birth"], Some("test"));
        rewrite_names(&mut stmt, &mut local)?;
        let alias = local.alias("u");
        let n = local.alias("n");
        assert_eq!(
            render_statement(&stmt),
            format!("SELECT {alias}.col0, col1 AS {n} FROM table0 AS {alias} WHERE {alias}.col2 > 1")
        );
        Ok(())
    }

    #[test]
    fn generate_from_schemas() -> Result<()> {
        let schemas = vec![
            (
                "shop.users-schema.sql".to_string(),
                "CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(64));".to_string(),
            ),
            (
                "masked_shop.t0-schema.sql".to_string(),
                "CREATE TABLE t0 (c0 INT PRIMARY KEY, c1 VARCHAR(64));".to_string(),
            ),
        ];
        let map = generate(schemas, "masked_")?;
        assert_eq!(map.dbs.get("shop").map(String::as_str), Some("masked_shop"));
        assert_eq!(
            map.tables.get("shop.users").map(String::as_str),
            Some("masked_shop.t0")
        );
        assert_eq!(
            map.columns.get("shop.users.email").map(String::as_str),
            Some("masked_shop.t0.c1")
        );

        let reparsed: NameMap = serde_json::from_str(&map.to_json()?)?;
        assert_eq!(reparsed, map);

        assert!(generate(
            vec![("shop.users-schema.sql".to_string(), "SELECT 1".to_string())],
            "masked_"
        )
        .is_err());
        Ok(())
    }
}
