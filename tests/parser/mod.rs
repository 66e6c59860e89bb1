// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use sql_masker::unstable::*;
use test_generator::test_resources;

macro_rules! my_assert_eq {
    ($left:expr, $right:expr, $($arg:tt)+) => {
	match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
		    return Err(anyhow!("mismatch:\nleft  = {}\nright = {}\n{}",
		     		       &$left, &$right, format_args!($($arg)+)));
                }
            }
	}
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Case {
    pub note: String,
    pub sql: String,
    /// Canonical text. Defaults to `sql`.
    pub rendered: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Test {
    cases: Vec<Case>,
}

fn check_case(case: &Case) -> Result<()> {
    let stmt = match parse_one("case.sql", &case.sql) {
        Ok(stmt) => stmt,
        Err(actual) => {
            return match &case.error {
                Some(expected) if actual.to_string().contains(expected.as_str()) => Ok(()),
                Some(expected) => bail!("Error message\n`{actual}\n`\ndoes not contain `{expected}`"),
                None => Err(actual),
            };
        }
    };
    if let Some(expected) = &case.error {
        bail!("expected error `{expected}`, parsed {stmt:?}");
    }

    let expected = case.rendered.as_ref().unwrap_or(&case.sql);
    let rendered = render_statement(&stmt);
    my_assert_eq!(rendered, *expected, "rendering of `{}`", case.sql);

    // Canonical text is a fixed point.
    let again = render_statement(&parse_one("rendered.sql", &rendered)?);
    my_assert_eq!(again, rendered, "re-rendering of `{}`", rendered);
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {}", file);

    let yaml = std::fs::read_to_string(file)?;
    let test: Test = serde_yaml::from_str(&yaml)?;

    for case in &test.cases {
        print!("case {} ", &case.note);
        check_case(case)?;
        println!("passed");
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
fn statement_list() -> Result<()> {
    let stmts = parse_all(
        "script.sql",
        "CREATE DATABASE IF NOT EXISTS app; USE app;; BEGIN; COMMIT;",
    )?;
    assert_eq!(stmts.len(), 4);
    assert!(matches!(stmts[1], Statement::Use(ref db) if db == "app"));
    assert!(stmts.iter().skip(1).all(|s| s.is_simple()));
    Ok(())
}

#[test_resources("tests/parser/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
