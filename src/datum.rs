// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use anyhow::{anyhow, bail, Result};

use crate::decimal::Decimal;
use crate::time::{Duration, Time, TimeKind};
use crate::types::*;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Int(i64),
    Uint(u64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Time(Time),
    Duration(Duration),
    Enum { name: String, index: u64 },
    Set { name: String, value: u64 },
    Json(serde_json::Value),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The natural type of a literal carrying this value.
    pub fn literal_type(&self) -> FieldType {
        match self {
            Datum::Null => FieldType::new(TypeCode::Null),
            Datum::Int(v) => {
                FieldType::with_len(TypeCode::LongLong, v.to_string().len() as i32, 0)
            }
            Datum::Uint(v) => {
                FieldType::with_len(TypeCode::LongLong, v.to_string().len() as i32, 0).unsigned()
            }
            Datum::Float32(_) | Datum::Float64(_) => FieldType::new(TypeCode::Double),
            Datum::Decimal(d) => FieldType::with_len(
                TypeCode::NewDecimal,
                d.precision() as i32,
                d.scale() as i32,
            ),
            Datum::String(s) => FieldType::with_len(TypeCode::Varchar, s.len() as i32, 0),
            Datum::Bytes(b) => FieldType::with_len(TypeCode::Varchar, b.len() as i32, 0).binary(),
            Datum::Time(t) => {
                let tp = match t.kind {
                    TimeKind::Date => TypeCode::Date,
                    TimeKind::Datetime => TypeCode::Datetime,
                    TimeKind::Timestamp => TypeCode::Timestamp,
                };
                let mut ft = FieldType::new(tp);
                ft.decimal = t.fsp as i32;
                ft
            }
            Datum::Duration(d) => {
                let mut ft = FieldType::new(TypeCode::Duration);
                ft.decimal = d.fsp as i32;
                ft
            }
            Datum::Enum { .. } | Datum::Set { .. } => FieldType::new(TypeCode::Varchar),
            Datum::Json(_) => FieldType::new(TypeCode::Json),
        }
    }

    /// Best-effort string form, as MySQL would print the value.
    pub fn to_text(&self) -> String {
        match self {
            Datum::Null => "NULL".to_string(),
            Datum::Int(v) => v.to_string(),
            Datum::Uint(v) => v.to_string(),
            Datum::Float32(v) => v.to_string(),
            Datum::Float64(v) => v.to_string(),
            Datum::Decimal(d) => d.to_string(),
            Datum::String(s) => s.clone(),
            Datum::Bytes(b) => String::from_utf8_lossy(b).to_string(),
            Datum::Time(t) => t.to_string(),
            Datum::Duration(d) => d.to_string(),
            Datum::Enum { name, .. } | Datum::Set { name, .. } => name.clone(),
            Datum::Json(v) => v.to_string(),
        }
    }

    fn to_f64(&self) -> Result<f64> {
        Ok(match self {
            Datum::Int(v) => *v as f64,
            Datum::Uint(v) => *v as f64,
            Datum::Float32(v) => *v as f64,
            Datum::Float64(v) => *v,
            Datum::Decimal(d) => d.to_f64(),
            Datum::String(_) | Datum::Bytes(_) => {
                let s = self.to_text();
                match s.trim().parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => bail!("truncated incorrect DOUBLE value: '{s}'"),
                }
            }
            Datum::Time(t) => t.to_int() as f64,
            Datum::Duration(d) => d.to_int() as f64,
            Datum::Enum { index, .. } => *index as f64,
            Datum::Set { value, .. } => *value as f64,
            Datum::Null | Datum::Json(_) => bail!("cannot convert {} to DOUBLE", self.kind_name()),
        })
    }

    fn to_decimal(&self) -> Result<Decimal> {
        match self {
            Datum::Int(v) => Ok(Decimal::from_i64(*v)),
            Datum::Uint(v) => Ok(Decimal::from_u64(*v)),
            Datum::Float32(v) => Decimal::from_f64(*v as f64),
            Datum::Float64(v) => Decimal::from_f64(*v),
            Datum::Decimal(d) => Ok(d.clone()),
            Datum::String(_) | Datum::Bytes(_) => {
                let s = self.to_text();
                s.trim()
                    .parse::<Decimal>()
                    .map_err(|_| anyhow!("truncated incorrect DECIMAL value: '{s}'"))
            }
            Datum::Time(t) => Ok(Decimal::from_i64(t.to_int())),
            Datum::Duration(d) => Ok(Decimal::from_i64(d.to_int())),
            Datum::Enum { index, .. } => Ok(Decimal::from_u64(*index)),
            Datum::Set { value, .. } => Ok(Decimal::from_u64(*value)),
            Datum::Null | Datum::Json(_) => {
                bail!("cannot convert {} to DECIMAL", self.kind_name())
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Int(_) => "int64",
            Datum::Uint(_) => "uint64",
            Datum::Float32(_) => "float32",
            Datum::Float64(_) => "float64",
            Datum::Decimal(_) => "decimal",
            Datum::String(_) => "string",
            Datum::Bytes(_) => "bytes",
            Datum::Time(_) => "time",
            Datum::Duration(_) => "duration",
            Datum::Enum { .. } => "enum",
            Datum::Set { .. } => "set",
            Datum::Json(_) => "json",
        }
    }

    /// Cast the value to the given column type, following MySQL's rules for
    /// implicit conversions. Out-of-range and malformed values are errors.
    pub fn convert_to(&self, tp: &FieldType) -> Result<Datum> {
        if self.is_null() {
            return Ok(Datum::Null);
        }
        match tp.tp {
            TypeCode::Tiny
            | TypeCode::Short
            | TypeCode::Int24
            | TypeCode::Long
            | TypeCode::LongLong => self.convert_to_int(tp),
            TypeCode::Bit => {
                let v = self.to_index(tp)?;
                if tp.flen > 0 && tp.flen < 64 && v >= 1u64 << tp.flen {
                    bail!("bit value {v} out of range for {tp}");
                }
                Ok(Datum::Uint(v))
            }
            TypeCode::Year => self.convert_to_year(),
            TypeCode::Float => Ok(Datum::Float32(self.to_f64()? as f32)),
            TypeCode::Double => Ok(Datum::Float64(self.to_f64()?)),
            TypeCode::NewDecimal => self.convert_to_decimal(tp),
            TypeCode::Varchar | TypeCode::String | TypeCode::Blob => self.convert_to_string(tp),
            TypeCode::Date => self.convert_to_time(TimeKind::Date, tp),
            TypeCode::Datetime => self.convert_to_time(TimeKind::Datetime, tp),
            TypeCode::Timestamp => self.convert_to_time(TimeKind::Timestamp, tp),
            TypeCode::Duration => self.convert_to_duration(tp),
            TypeCode::Enum => self.convert_to_enum(tp),
            TypeCode::Set => self.convert_to_set(tp),
            TypeCode::Json => self.convert_to_json(),
            TypeCode::Null => Ok(Datum::Null),
        }
    }

    fn convert_to_int(&self, tp: &FieldType) -> Result<Datum> {
        let v = self.widen_int(tp)?;
        if tp.unsigned {
            if v < 0 || v > uint_upper_bound(tp.tp) as i128 {
                bail!("value {v} out of range for {tp}");
            }
            Ok(Datum::Uint(v as u64))
        } else {
            let max = int_upper_bound(tp.tp) as i128;
            if v > max || v < -max - 1 {
                bail!("value {v} out of range for {tp}");
            }
            Ok(Datum::Int(v as i64))
        }
    }

    /// Integer value of the datum, widened to i128 before any range check.
    fn widen_int(&self, tp: &FieldType) -> Result<i128> {
        Ok(match self {
            Datum::Int(v) => *v as i128,
            Datum::Uint(v) => *v as i128,
            Datum::Float32(_) | Datum::Float64(_) => {
                let f = self.to_f64()?.round();
                if !f.is_finite() || f.abs() > 1.9e19 {
                    bail!("value {} out of range for {tp}", self.to_text());
                }
                f as i128
            }
            Datum::Decimal(_) | Datum::String(_) | Datum::Bytes(_) => {
                let d = self.to_decimal()?;
                match d.round(0).to_string().parse::<i128>() {
                    Ok(v) => v,
                    Err(_) => bail!("value {} out of range for {tp}", self.to_text()),
                }
            }
            Datum::Time(t) => t.to_int() as i128,
            Datum::Duration(d) => d.to_int() as i128,
            Datum::Enum { index, .. } => *index as i128,
            Datum::Set { value, .. } => *value as i128,
            Datum::Null | Datum::Json(_) => {
                bail!("cannot convert {} to {tp}", self.kind_name())
            }
        })
    }

    fn to_index(&self, tp: &FieldType) -> Result<u64> {
        let v = self.widen_int(tp)?;
        if v < 0 || v > u64::MAX as i128 {
            bail!("value {v} out of range for {tp}");
        }
        Ok(v as u64)
    }

    fn convert_to_year(&self) -> Result<Datum> {
        let v = self.widen_int(&FieldType::new(TypeCode::Year))?;
        let year = match v {
            0 => 0,
            1..=69 => 2000 + v,
            70..=99 => 1900 + v,
            1901..=2155 => v,
            _ => bail!("year {v} out of range"),
        };
        Ok(Datum::Int(year as i64))
    }

    fn convert_to_decimal(&self, tp: &FieldType) -> Result<Datum> {
        let mut d = self.to_decimal()?;
        if tp.decimal != UNSPECIFIED {
            d = d.round(tp.decimal.clamp(0, MAX_DECIMAL_SCALE) as u32);
        }
        if tp.flen != UNSPECIFIED {
            let scale = tp.decimal.max(0);
            let max_int = (tp.flen - scale).max(0) as u32;
            if !d.is_fraction() && d.int_digits() > max_int {
                bail!("value {d} out of range for {tp}");
            }
        }
        if tp.unsigned && d.is_negative() {
            bail!("value {d} out of range for {tp}");
        }
        Ok(Datum::Decimal(d))
    }

    fn convert_to_string(&self, tp: &FieldType) -> Result<Datum> {
        if tp.binary {
            return Ok(match self {
                Datum::Bytes(b) => Datum::Bytes(b.clone()),
                _ => Datum::Bytes(self.to_text().into_bytes()),
            });
        }
        match self {
            Datum::Bytes(b) => match String::from_utf8(b.clone()) {
                Ok(s) => Ok(Datum::String(s)),
                Err(_) => bail!("invalid utf8 string for {tp}"),
            },
            _ => Ok(Datum::String(self.to_text())),
        }
    }

    fn convert_to_time(&self, kind: TimeKind, tp: &FieldType) -> Result<Datum> {
        let fsp = tp.fsp();
        let t = match self {
            Datum::Time(t) => t.convert(kind, fsp),
            Datum::Int(v) => Time::from_int(*v, kind, fsp)?,
            Datum::Uint(v) => Time::from_int(*v as i64, kind, fsp)?,
            Datum::Float32(_) | Datum::Float64(_) | Datum::Decimal(_) => {
                match self.to_decimal()?.to_i64() {
                    Some(v) => Time::from_int(v, kind, fsp)?,
                    None => bail!("invalid time value: {}", self.to_text()),
                }
            }
            Datum::String(_) | Datum::Bytes(_) => Time::parse(&self.to_text(), kind, fsp)?,
            _ => bail!("cannot convert {} to {tp}", self.kind_name()),
        };
        if kind == TimeKind::Timestamp {
            let year = chrono::Datelike::year(&t.value);
            if !(1970..=2038).contains(&year) {
                bail!("timestamp {t} out of range");
            }
        }
        Ok(Datum::Time(t))
    }

    fn convert_to_duration(&self, tp: &FieldType) -> Result<Datum> {
        let fsp = tp.fsp();
        let d = match self {
            Datum::Duration(d) => Duration::new(d.micros, fsp),
            Datum::Time(t) => Duration::new(t.time_of_day().micros, fsp),
            Datum::Int(v) => Duration::from_int(*v, fsp)?,
            Datum::Uint(v) => Duration::from_int(*v as i64, fsp)?,
            Datum::String(_) | Datum::Bytes(_) => Duration::parse(&self.to_text(), fsp)?,
            Datum::Float32(_) | Datum::Float64(_) | Datum::Decimal(_) => {
                Duration::parse(&self.to_decimal()?.to_string(), fsp)?
            }
            _ => bail!("cannot convert {} to {tp}", self.kind_name()),
        };
        Ok(Datum::Duration(d))
    }

    fn convert_to_enum(&self, tp: &FieldType) -> Result<Datum> {
        match self {
            Datum::String(_) | Datum::Bytes(_) | Datum::Enum { .. } | Datum::Set { .. } => {
                let s = self.to_text();
                match tp.elems.iter().position(|e| e.eq_ignore_ascii_case(&s)) {
                    Some(idx) => Ok(Datum::Enum {
                        name: tp.elems[idx].clone(),
                        index: idx as u64 + 1,
                    }),
                    None => bail!("'{s}' is not a member of {tp}"),
                }
            }
            _ => {
                let idx = self.to_index(tp)?;
                if idx == 0 || idx as usize > tp.elems.len() {
                    bail!("enum index {idx} out of range for {tp}");
                }
                Ok(Datum::Enum {
                    name: tp.elems[idx as usize - 1].clone(),
                    index: idx,
                })
            }
        }
    }

    fn convert_to_set(&self, tp: &FieldType) -> Result<Datum> {
        match self {
            Datum::String(_) | Datum::Bytes(_) | Datum::Enum { .. } | Datum::Set { .. } => {
                let s = self.to_text();
                let mut value = 0u64;
                let mut names = vec![];
                if !s.is_empty() {
                    for part in s.split(',') {
                        match tp.elems.iter().position(|e| e.eq_ignore_ascii_case(part)) {
                            Some(idx) if idx < 64 => {
                                if value & (1 << idx) == 0 {
                                    value |= 1 << idx;
                                }
                            }
                            _ => bail!("'{part}' is not a member of {tp}"),
                        }
                    }
                    for (idx, e) in tp.elems.iter().enumerate().take(64) {
                        if value & (1 << idx) != 0 {
                            names.push(e.clone());
                        }
                    }
                }
                Ok(Datum::Set {
                    name: names.join(","),
                    value,
                })
            }
            _ => {
                let value = self.to_index(tp)?;
                let names: Vec<String> = tp
                    .elems
                    .iter()
                    .enumerate()
                    .take(64)
                    .filter(|(idx, _)| value & (1 << idx) != 0)
                    .map(|(_, e)| e.clone())
                    .collect();
                if tp.elems.len() < 64 && value >> tp.elems.len() != 0 {
                    bail!("set value {value} out of range for {tp}");
                }
                Ok(Datum::Set {
                    name: names.join(","),
                    value,
                })
            }
        }
    }

    fn convert_to_json(&self) -> Result<Datum> {
        Ok(Datum::Json(match self {
            Datum::Json(v) => v.clone(),
            Datum::String(s) => serde_json::from_str(s)?,
            Datum::Bytes(b) => serde_json::from_slice(b)?,
            Datum::Int(v) => serde_json::Value::from(*v),
            Datum::Uint(v) => serde_json::Value::from(*v),
            Datum::Float32(v) => serde_json::Value::from(*v as f64),
            Datum::Float64(v) => serde_json::Value::from(*v),
            _ => serde_json::Value::String(self.to_text()),
        }))
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> FieldType {
        FieldType::new(TypeCode::Long)
    }

    #[test]
    fn to_int() -> Result<()> {
        assert_eq!(Datum::String("42".into()).convert_to(&int())?, Datum::Int(42));
        assert_eq!(Datum::Float64(2.5).convert_to(&int())?, Datum::Int(3));
        assert_eq!(
            Datum::Decimal("-2.5".parse()?).convert_to(&int())?,
            Datum::Int(-3)
        );
        assert!(Datum::Int(1000).convert_to(&FieldType::new(TypeCode::Tiny)).is_err());
        assert!(Datum::Int(-1)
            .convert_to(&FieldType::new(TypeCode::Long).unsigned())
            .is_err());
        assert!(Datum::String("abc".into()).convert_to(&int()).is_err());
        Ok(())
    }

    #[test]
    fn to_decimal() -> Result<()> {
        let tp = FieldType::with_len(TypeCode::NewDecimal, 5, 2);
        assert_eq!(
            Datum::Int(12).convert_to(&tp)?,
            Datum::Decimal("12.00".parse()?)
        );
        assert_eq!(
            Datum::String("1.005".into()).convert_to(&tp)?,
            Datum::Decimal("1.01".parse()?)
        );
        assert!(Datum::Int(1234).convert_to(&tp).is_err());
        Ok(())
    }

    #[test]
    fn to_temporal() -> Result<()> {
        let tp = FieldType::new(TypeCode::Date);
        let d = Datum::String("2021-01-02 03:04:05".into()).convert_to(&tp)?;
        assert_eq!(d.to_text(), "2021-01-02");
        let tp = FieldType::new(TypeCode::Datetime);
        let d = Datum::Int(20210102030405).convert_to(&tp)?;
        assert_eq!(d.to_text(), "2021-01-02 03:04:05");
        let tp = FieldType::new(TypeCode::Duration);
        let d = Datum::String("10:11:12".into()).convert_to(&tp)?;
        assert_eq!(d.to_text(), "10:11:12");
        Ok(())
    }

    #[test]
    fn to_enum_and_set() -> Result<()> {
        let mut tp = FieldType::new(TypeCode::Enum);
        tp.elems = vec!["small".into(), "large".into()];
        assert_eq!(
            Datum::String("LARGE".into()).convert_to(&tp)?,
            Datum::Enum {
                name: "large".into(),
                index: 2
            }
        );
        assert!(Datum::Int(3).convert_to(&tp).is_err());

        let mut tp = FieldType::new(TypeCode::Set);
        tp.elems = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            Datum::String("c,a".into()).convert_to(&tp)?,
            Datum::Set {
                name: "a,c".into(),
                value: 5
            }
        );
        Ok(())
    }
}
