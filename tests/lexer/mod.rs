// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sql_masker::unstable::*;
use std::env;
use test_generator::test_resources;

fn get_tokens(source: &Source) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut lex = Lexer::new(source);
    loop {
        let tok = lex.next_token()?;
        tokens.push(tok.clone());
        if tok.0 == TokenKind::Eof {
            break;
        }
    }

    Ok(tokens)
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Case {
    pub note: String,
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    pub kinds: Option<Vec<String>>,
    pub error: Option<String>,
    /// When given, `sql` is split into statements instead of lexed.
    pub statements: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Test {
    cases: Vec<Case>,
}

fn check_tokens(case: &Case, source: &Source) -> Result<()> {
    match get_tokens(source) {
        Ok(tokens) => {
            if case.error.is_some() {
                bail!("expected error, lexed {tokens:?}");
            }
            for (idx, tok) in tokens.iter().enumerate() {
                if idx >= case.tokens.len() {
                    break;
                }
                assert_eq!(
                    tok.1.text(),
                    case.tokens[idx],
                    "{} Expected token `{}` not found",
                    tok.1.message("mismatch-error", &case.tokens[idx]),
                    &case.tokens[idx]
                );

                if let Some(k) = &case.kinds {
                    if idx >= k.len() {
                        break;
                    }
                    assert_eq!(
                        format!("{:?}", tok.0),
                        k[idx],
                        "{}",
                        tok.1.message("mismatch-error", "token kind mismatch")
                    );
                }
            }
            assert_eq!(
                tokens.len(),
                case.tokens.len(),
                "\n. Token count mismatch.\nLexed tokens:{:?}",
                tokens
            );
            if let Some(k) = &case.kinds {
                assert_eq!(
                    tokens.len(),
                    k.len(),
                    "\n. Kind count mismatch.\nLexed tokens:{:?}",
                    tokens
                );
            }
        }
        Err(actual) => match &case.error {
            Some(expected) => {
                let actual = actual.to_string();
                if !actual.contains(expected) {
                    bail!(
                        "Error message\n`{}\n`\ndoes not contain `{}`",
                        actual,
                        expected
                    );
                }
            }
            _ => return Err(actual),
        },
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {}", file);

    let yaml = std::fs::read_to_string(file)?;
    let test: Test = serde_yaml::from_str(&yaml)?;

    for case in &test.cases {
        print!("case {} ", &case.note);

        if let Some(expected) = &case.statements {
            assert_eq!(&split_statements(&case.sql), expected, "{}", case.note);
        } else {
            let source = Source::from_contents("case.sql".to_string(), case.sql.clone())?;
            check_tokens(case, &source)?;
        }

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
#[ignore = "intended for running a single yaml file"]
fn one_yaml() -> Result<()> {
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

#[test_resources("tests/lexer/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
fn invalid_line() -> Result<()> {
    let source = Source::from_contents("case.sql".to_string(), String::new())?;
    assert_eq!(
        source.message(2, 0, "", ""),
        "case.sql: invalid line 2 specified"
    );
    Ok(())
}
