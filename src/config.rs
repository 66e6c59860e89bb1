// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::ConstraintFilter;
use crate::error::MaskError;
use crate::frontend::Script;
use crate::mask::{self, MaskFuncEntry, MaskKey};
use crate::name_map::NameMap;

/// Key material used when none is configured.
pub const DEFAULT_KEY: &str = "sql-masker";

/// User facing configuration, read from a YAML or JSON file and
/// overridden by command line flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mask_func: String,
    pub key: String,
    pub ignore_int_pk: bool,
    pub default_db: String,
    pub filter_constraints: ConstraintFilter,
    /// Schema scripts run once, before any session starts.
    pub ddl_dirs: Vec<PathBuf>,
    /// Scripts run at the start of every session.
    pub prepare_dirs: Vec<PathBuf>,
    pub name_map: Option<PathBuf>,
    /// Worker threads for event masking. Defaults to the number of CPUs.
    pub concurrency: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mask_func: "identity".to_string(),
            key: DEFAULT_KEY.to_string(),
            ignore_int_pk: false,
            default_db: "test".to_string(),
            filter_constraints: ConstraintFilter::KeepIntPk,
            ddl_dirs: vec![],
            prepare_dirs: vec![],
            name_map: None,
            concurrency: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
            Some("json") => Ok(serde_json::from_str(&contents)?),
            _ => bail!(
                "Unsupported config file `{}`. Must be json or yaml.",
                path.display()
            ),
        }
    }

    /// Resolve names into the immutable settings shared by every session.
    /// An unknown mask function or an unreadable name map fails here.
    pub fn resolve(&self) -> Result<MaskSettings, MaskError> {
        let mask = mask::lookup(&self.mask_func)?;
        let name_map = match &self.name_map {
            Some(path) => Some(
                NameMap::from_file(path).map_err(|e| MaskError::Config(format!("{e:#}")))?,
            ),
            None => None,
        };
        log::info!(
            "masking with `{}`{}",
            mask.name,
            if name_map.is_some() { ", renaming identifiers" } else { "" }
        );
        Ok(MaskSettings {
            mask,
            key: MaskKey::derive(&self.key),
            ignore_int_pk: self.ignore_int_pk,
            default_db: self.default_db.clone(),
            name_map,
        })
    }
}

/// Resolved configuration. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct MaskSettings {
    pub mask: MaskFuncEntry,
    pub key: MaskKey,
    /// Keep integer primary keys verbatim.
    pub ignore_int_pk: bool,
    pub default_db: String,
    pub name_map: Option<NameMap>,
}

impl MaskSettings {
    /// Settings for the given mask function with the default key.
    pub fn with_mask(name: &str) -> Result<Self, MaskError> {
        Config {
            mask_func: name.to_string(),
            ..Config::default()
        }
        .resolve()
    }
}

/// Read every `.sql` file under the given directories, in file name order.
pub fn read_scripts<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<Script>> {
    let mut scripts = vec![];
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            bail!("not a directory: {}", dir.display());
        }
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "sql") {
                continue;
            }
            let sql = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            scripts.push(Script {
                name: path.display().to_string(),
                sql,
            });
        }
    }
    log::debug!("read {} scripts from {} directories", scripts.len(), dirs.len());
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() -> Result<()> {
        let config: Config = serde_yaml::from_str("mask_func: bounded-hash\nfilter_constraints: all\n")?;
        assert_eq!(config.mask_func, "bounded-hash");
        assert_eq!(config.filter_constraints, ConstraintFilter::All);
        assert_eq!(config.key, DEFAULT_KEY);
        assert_eq!(config.default_db, "test");

        let config: Config = serde_json::from_str(r#"{"ignore_int_pk": true, "concurrency": 2}"#)?;
        assert!(config.ignore_int_pk);
        assert_eq!(config.concurrency, Some(2));

        assert!(serde_yaml::from_str::<Config>("mask: identity\n").is_err());
        Ok(())
    }

    #[test]
    fn resolve() {
        let settings = Config::default().resolve();
        assert!(settings.is_ok_and(|s| s.mask.name == "identity" && s.key == MaskKey::default()));

        let config = Config {
            mask_func: "scramble".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.resolve().err(),
            Some(MaskError::UnknownMaskFunction("scramble".to_string()))
        );

        let config = Config {
            name_map: Some(PathBuf::from("does/not/exist.json")),
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(MaskError::Config(_))));
    }
}
