// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Replay events, one JSON object per line.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::datum::Datum;

/// A bound parameter as carried by the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    /// Hex encoded bytes.
    Bytes { bytes: String },
}

impl Param {
    pub fn to_datum(&self) -> Result<Datum> {
        Ok(match self {
            Param::Null => Datum::Null,
            Param::Int(v) => Datum::Int(*v),
            Param::Uint(v) => Datum::Uint(*v),
            Param::Float(v) => Datum::Float64(*v),
            Param::String(s) => Datum::String(s.clone()),
            Param::Bytes { bytes } => Datum::Bytes(
                data_encoding::HEXLOWER_PERMISSIVE
                    .decode(bytes.as_bytes())
                    .map_err(|e| anyhow!("bad hex parameter `{bytes}`: {e}"))?,
            ),
        })
    }

    /// Decimals travel as floats, temporal values as strings.
    pub fn from_datum(d: &Datum) -> Self {
        match d {
            Datum::Null => Param::Null,
            Datum::Int(v) => Param::Int(*v),
            Datum::Uint(v) => Param::Uint(*v),
            Datum::Float32(v) => Param::Float(*v as f64),
            Datum::Float64(v) => Param::Float(*v),
            Datum::Decimal(v) => Param::Float(v.to_f64()),
            Datum::Bytes(b) => Param::Bytes {
                bytes: data_encoding::HEXLOWER.encode(b),
            },
            Datum::String(_)
            | Datum::Time(_)
            | Datum::Duration(_)
            | Datum::Enum { .. }
            | Datum::Set { .. }
            | Datum::Json(_) => Param::String(d.to_text()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Handshake {
        #[serde(default)]
        db: String,
    },
    Query {
        query: String,
    },
    StmtPrepare {
        stmt_id: u64,
        query: String,
    },
    StmtExecute {
        stmt_id: u64,
        #[serde(default)]
        params: Vec<Param>,
    },
    StmtClose {
        stmt_id: u64,
    },
}

/// One captured event. Connection id and timestamp are passed through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<serde_json::Value>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Event {
    pub fn new(payload: Payload) -> Self {
        Self {
            conn_id: None,
            time: None,
            payload,
        }
    }

    pub fn from_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| anyhow!("bad event `{line}`: {e}"))
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Decimal;

    #[test]
    fn wire_format() -> Result<()> {
        let ev = Event::from_line(
            r#"{"type":"stmt_execute","conn_id":3,"time":1620000000,"stmt_id":1,"params":[null,-1,18446744073709551615,1.5,"a",{"bytes":"00ff"}]}"#,
        )?;
        assert_eq!(ev.conn_id, Some(3));
        let Payload::StmtExecute { stmt_id, params } = &ev.payload else {
            panic!("unexpected payload {:?}", ev.payload);
        };
        assert_eq!(*stmt_id, 1);
        assert_eq!(
            params,
            &vec![
                Param::Null,
                Param::Int(-1),
                Param::Uint(u64::MAX),
                Param::Float(1.5),
                Param::String("a".into()),
                Param::Bytes {
                    bytes: "00ff".into()
                },
            ]
        );
        assert_eq!(params[5].to_datum()?, Datum::Bytes(vec![0, 255]));

        let line = ev.to_line()?;
        assert!(line.contains(r#""type":"stmt_execute""#));
        assert_eq!(Event::from_line(&line)?, ev);

        let ev = Event::from_line(r#"{"type":"handshake"}"#)?;
        assert_eq!(ev.payload, Payload::Handshake { db: String::new() });
        assert!(Event::from_line(r#"{"type":"stmt_fetch","stmt_id":1}"#).is_err());
        Ok(())
    }

    #[test]
    fn transport_values() -> Result<()> {
        let d: Decimal = "12.50".parse()?;
        assert_eq!(Param::from_datum(&Datum::Decimal(d)), Param::Float(12.5));
        assert_eq!(
            Param::from_datum(&Datum::Enum {
                name: "red".into(),
                index: 1
            }),
            Param::String("red".into())
        );
        assert!(Param::Bytes {
            bytes: "zz".into()
        }
        .to_datum()
        .is_err());
        Ok(())
    }
}
