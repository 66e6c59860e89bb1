// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sql_masker::*;
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Step {
    pub event: serde_json::Value,
    pub outcome: String,
    /// Expected event. Defaults to the input event.
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Test {
    schema: String,
    #[serde(default)]
    config: Config,
    steps: Vec<Step>,
    stats: Stats,
}

fn outcome_name<T>(outcome: &Outcome<T>) -> &'static str {
    match outcome {
        Outcome::Masked(_) => "masked",
        Outcome::Problematic { .. } => "problematic",
        Outcome::Failed { .. } => "failed",
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {}", file);

    let yaml = std::fs::read_to_string(file)?;
    let test: Test = serde_yaml::from_str(&yaml)?;

    let instance = Instance::new();
    instance.load_schema(
        &test.config.default_db,
        &[Script {
            name: file.to_string(),
            sql: test.schema.clone(),
        }],
        test.config.filter_constraints,
    )?;
    let mut session = Session::open(&instance, Arc::new(test.config.resolve()?), &[])?;

    for (idx, step) in test.steps.iter().enumerate() {
        print!("step {idx} ");
        let ev: Event = serde_json::from_value(step.event.clone())?;
        let outcome = session.mask_event(&ev);
        if outcome_name(&outcome) != step.outcome {
            bail!("step {idx}: expected {}, got {outcome:?}", step.outcome);
        }
        let expected = step.output.as_ref().unwrap_or(&step.event);
        assert_eq!(
            &serde_json::to_value(outcome.output())?,
            expected,
            "step {idx}"
        );
        if let Some(expected) = &step.error {
            let error = outcome.error().map(|e| e.to_string()).unwrap_or_default();
            if !error.contains(expected.as_str()) {
                bail!("step {idx}: error `{error}` does not contain `{expected}`");
            }
        }
        println!("passed");
    }

    assert_eq!(session.stats(), test.stats);
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
fn json_lines() -> Result<()> {
    let instance = Instance::new();
    instance.load_schema(
        "test",
        &[Script {
            name: "schema.sql".to_string(),
            sql: "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20))".to_string(),
        }],
        ConstraintFilter::KeepIntPk,
    )?;
    let settings = Arc::new(MaskSettings::with_mask("identity")?);
    let mut session = Session::open(&instance, settings, &[])?;

    let input = concat!(
        r#"{"type":"handshake","conn_id":7,"db":"test"}"#,
        "\n\n",
        r#"{"type":"stmt_execute","stmt_id":3,"params":[1]}"#,
        "\n",
        r#"{"type":"query","query":"SELECT name FROM t WHERE id = 1"}"#,
        "\n",
    );
    let mut output = vec![];
    let stats = session.mask_lines(input.as_bytes(), &mut output)?;
    assert_eq!(stats.all, 3);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.failed(), 1);

    let lines: Vec<Event> = String::from_utf8(output)?
        .lines()
        .map(Event::from_line)
        .collect::<Result<_>>()?;
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].conn_id, Some(7));
    // Failed events are forwarded unchanged.
    assert_eq!(
        lines[1].payload,
        Payload::StmtExecute {
            stmt_id: 3,
            params: vec![Param::Int(1)]
        }
    );


    // Lines that are not events do not end the stream.
    let input = concat!(
        r#"{"type":"query","query":"SELECT name FROM t WHERE id = 1"}"#,
        "\nnot json\n",
        r#"{"type":"query","query":"SELECT name FROM t WHERE id = 2"}"#,
        "\n",
    );
    let mut output = vec![];
    let stats = session.mask_lines(input.as_bytes(), &mut output)?;
    assert_eq!(stats.all, 6);
    assert_eq!(stats.success, 4);
    assert_eq!(stats.failed(), 2);

    let output = String::from_utf8(output)?;
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "not json");
    assert_eq!(
        Event::from_line(lines[2])?.payload,
        Payload::Query {
            query: "SELECT name FROM t WHERE id = 2".to_string()
        }
    );
    Ok(())
}

#[test_resources("tests/event/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
