// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sql_masker::*;
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum Expected {
    Masked,
    Problematic,
    Failed,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Case {
    pub note: String,
    pub sql: String,
    pub outcome: Expected,
    /// Expected output. Not checked for failed statements unless given.
    pub output: Option<String>,
    /// Substring of the reported error.
    pub error: Option<String>,
    /// Number of soft errors of a problematic statement.
    pub errors: Option<usize>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
struct Test {
    schema: String,
    #[serde(default)]
    config: Config,
    cases: Vec<Case>,
    stats: Option<Stats>,
}

fn check_case(session: &mut Session, case: &Case) -> Result<()> {
    let outcome = session.mask_sql(&case.sql);
    let actual = match &outcome {
        Outcome::Masked(_) => Expected::Masked,
        Outcome::Problematic { .. } => Expected::Problematic,
        Outcome::Failed { .. } => Expected::Failed,
    };
    if actual != case.outcome {
        bail!("expected {:?}, got {outcome:?}", case.outcome);
    }

    if let Some(expected) = &case.output {
        assert_eq!(outcome.output(), expected, "{}", case.note);
    }
    if let Some(expected) = &case.error {
        let error = outcome.error().map(|e| e.to_string()).unwrap_or_default();
        if !error.contains(expected.as_str()) {
            bail!("Error message\n`{error}\n`\ndoes not contain `{expected}`");
        }
    }
    if let (Some(n), Outcome::Problematic { errors, .. }) = (case.errors, &outcome) {
        assert_eq!(errors.len(), n, "{}: {errors:?}", case.note);
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {}", file);

    let yaml = std::fs::read_to_string(file)?;
    let test: Test = serde_yaml::from_str(&yaml)?;

    let settings = Arc::new(test.config.resolve()?);
    let instance = Instance::new();
    let schema = Script {
        name: file.to_string(),
        sql: test.schema.clone(),
    };
    instance.load_schema(
        &test.config.default_db,
        &[schema],
        test.config.filter_constraints,
    )?;
    let mut session = Session::open(&instance, settings, &[])?;

    for case in &test.cases {
        print!("case {} ", &case.note);
        check_case(&mut session, case)?;
        println!("passed");
    }

    if let Some(stats) = &test.stats {
        assert_eq!(&session.stats(), stats);
    }
    println!("{} cases passed.", test.cases.len());
    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test]
#[ignore = "intended for running a single yaml file"]
fn one_yaml() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut file = String::default();
    for a in env::args() {
        if a.ends_with(".yaml") {
            file = a;
            break;
        }
    }

    if file.is_empty() {
        bail!("missing <yaml-file>");
    }

    yaml_test(file.as_str())
}

#[test_resources("tests/masker/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
