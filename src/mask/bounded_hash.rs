// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Keyed hashing that keeps the shape of the original value: integers stay
//! in the width bracket of the original magnitude and keep their sign,
//! numerics keep their digit counts, strings keep their byte length and
//! temporal values stay valid for their type.

use super::{MaskFuncEntry, MaskFuncMap, MaskKey};
use crate::datum::Datum;
use crate::decimal::Decimal;
use crate::time::{days_in_month, Duration, Time, TimeKind, MAX_DURATION_MICROS};
use crate::types::{FieldType, TypeCode, UNSPECIFIED};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

pub fn register(m: &mut MaskFuncMap) {
    m.insert(
        "bounded-hash",
        MaskFuncEntry {
            name: "bounded-hash",
            description: "Hash each value with the configured key. Integers keep their sign and width, numerics their digit counts, strings their length and temporal values stay valid.",
            func: bounded_hash,
        },
    );
}

fn bounded_hash(d: &Datum, tp: &FieldType, key: &MaskKey) -> Result<(Datum, Option<FieldType>)> {
    let masked = match d {
        Datum::Null => Datum::Null,
        Datum::Int(v) if tp.tp == TypeCode::Year => Datum::Int(mask_year(*v, key)),
        Datum::Uint(v) if tp.tp == TypeCode::Bit => Datum::Uint(mask_bit(*v, tp.flen, key)),
        Datum::Int(v) => Datum::Int(mask_int(*v, key)),
        Datum::Uint(v) => Datum::Uint(mask_uint(*v, key)),
        Datum::Float32(v) => Datum::Float32(mask_float(*v as f64, key)? as f32),
        Datum::Float64(v) => Datum::Float64(mask_float(*v, key)?),
        Datum::Decimal(v) => Datum::Decimal(mask_decimal(v, tp, key)?),
        Datum::String(s) => Datum::String(mask_string(s, tp.flen, key)),
        Datum::Bytes(b) => Datum::Bytes(mask_bytes(b, tp.flen, key)),
        Datum::Time(t) => Datum::Time(mask_time(t, key)?),
        Datum::Duration(v) => Datum::Duration(mask_duration(v, key)),
        Datum::Enum { name, index } => Datum::Enum {
            name: mask_string(name, UNSPECIFIED, key),
            index: *index,
        },
        Datum::Set { name, value } => Datum::Set {
            name: name
                .split(',')
                .map(|n| mask_string(n, UNSPECIFIED, key))
                .collect::<Vec<_>>()
                .join(","),
            value: *value,
        },
        Datum::Json(v) => Datum::Json(mask_json(v, key)?),
    };
    Ok((masked, None))
}

const SIGNED_BRACKETS: [i64; 5] = [
    i8::MAX as i64,
    i16::MAX as i64,
    (1 << 23) - 1,
    i32::MAX as i64,
    i64::MAX,
];

const UNSIGNED_BRACKETS: [u64; 5] = [
    u8::MAX as u64,
    u16::MAX as u64,
    (1 << 24) - 1,
    u32::MAX as u64,
    u64::MAX,
];

fn mask_int(v: i64, key: &MaskKey) -> i64 {
    let bound = SIGNED_BRACKETS
        .into_iter()
        .find(|b| v <= *b && v >= -*b - 1)
        .unwrap_or(i64::MAX);
    let h = key.hash_u64("int", &v.to_le_bytes());
    let m = (h % (bound as u64 + 1)) as i64;
    let masked = if v < 0 { -m - 1 } else { m };
    // Flipping the low bit stays in the same bracket with the same sign.
    if masked == v {
        v ^ 1
    } else {
        masked
    }
}

fn mask_uint(v: u64, key: &MaskKey) -> u64 {
    let bound = UNSIGNED_BRACKETS
        .into_iter()
        .find(|b| v <= *b)
        .unwrap_or(u64::MAX);
    bounded_uint(v, bound, key)
}

fn mask_bit(v: u64, flen: i32, key: &MaskKey) -> u64 {
    let bound = if flen > 0 && flen < 64 {
        (1u64 << flen) - 1
    } else {
        u64::MAX
    };
    bounded_uint(v, bound, key)
}

fn bounded_uint(v: u64, bound: u64, key: &MaskKey) -> u64 {
    let h = key.hash_u64("uint", &v.to_le_bytes());
    let masked = match bound.checked_add(1) {
        Some(modulus) => h % modulus,
        None => h,
    };
    if masked == v {
        v ^ 1
    } else {
        masked
    }
}

fn mask_year(v: i64, key: &MaskKey) -> i64 {
    if v == 0 {
        return 0;
    }
    let offset = key.hash_u64("year", &v.to_le_bytes()) % 255;
    let masked = 1901 + offset as i64;
    if masked == v {
        1901 + (offset as i64 + 1) % 255
    } else {
        masked
    }
}

/// Produce a digit string with the given number of integer and fractional
/// digits. A multi-digit integer part never starts with zero and an empty
/// one renders as `0`.
fn masked_digits(key: &MaskKey, tag: &str, data: &[u8], int_digits: u32, scale: u32, original: &str) -> String {
    let total = (int_digits + scale) as usize;
    let mut buf = vec![0u8; total];
    key.fill(tag, data, &mut buf);
    let mut digits: Vec<u8> = buf.iter().map(|b| b'0' + b % 10).collect();
    if int_digits > 1 {
        digits[0] = b'1' + buf[0] % 9;
    }
    let render = |digits: &[u8]| {
        let (int, frac) = digits.split_at(int_digits as usize);
        let mut s = if int.is_empty() {
            String::from("0")
        } else {
            String::from_utf8_lossy(int).to_string()
        };
        if !frac.is_empty() {
            s.push('.');
            s.push_str(&String::from_utf8_lossy(frac));
        }
        s
    };
    let text = render(&digits);
    if text != original {
        return text;
    }
    if let Some(last) = digits.last_mut() {
        *last = if *last == b'9' { b'1' } else { *last + 1 };
    }
    render(&digits)
}

/// Integer digits to hash. A zero integer part in front of a fraction is kept.
fn whole_digits(abs: &Decimal) -> u32 {
    if abs.is_fraction() && abs.scale() > 0 {
        0
    } else {
        abs.int_digits()
    }
}

fn mask_float(v: f64, key: &MaskKey) -> Result<f64> {
    if !v.is_finite() {
        return Ok(v);
    }
    let abs = Decimal::from_f64(v.abs())?;
    let text = masked_digits(
        key,
        "float",
        &v.abs().to_bits().to_le_bytes(),
        whole_digits(&abs),
        abs.scale(),
        &abs.to_string(),
    );
    let masked: f64 = text.parse()?;
    Ok(if v < 0.0 { -masked } else { masked })
}

fn mask_decimal(v: &Decimal, tp: &FieldType, key: &MaskKey) -> Result<Decimal> {
    let abs = v.abs();
    let mut int_digits = whole_digits(&abs);
    if tp.flen != UNSPECIFIED {
        let max_int = (tp.flen - tp.decimal.max(0)).max(0) as u32;
        int_digits = int_digits.min(max_int);
    }
    let original = abs.to_string();
    let text = masked_digits(key, "decimal", original.as_bytes(), int_digits, abs.scale(), &original);
    if v.is_negative() {
        format!("-{text}").parse()
    } else {
        text.parse()
    }
}

fn hashed_hex(key: &MaskKey, tag: &str, data: &[u8], flen: i32) -> String {
    let n = data.len();
    let mut digest = vec![0u8; n / 2];
    key.fill(tag, data, &mut digest);
    let mut out = data_encoding::HEXLOWER.encode(&digest);
    while out.len() < n {
        out.push('*');
    }
    if flen > 0 && out.len() > flen as usize {
        out.truncate(flen as usize);
    }
    out
}

fn mask_string(s: &str, flen: i32, key: &MaskKey) -> String {
    hashed_hex(key, "string", s.as_bytes(), flen)
}

fn mask_bytes(b: &[u8], flen: i32, key: &MaskKey) -> Vec<u8> {
    hashed_hex(key, "bytes", b, flen).into_bytes()
}

/// Day of the month from a hash word. Every day of the month is equally
/// likely.
fn fold_day(h: u32, year: i32, month: u32) -> u32 {
    1 + h % days_in_month(year, month)
}

fn mask_time(t: &Time, key: &MaskKey) -> Result<Time> {
    let mut buf = [0u8; 28];
    key.fill("time", t.to_string().as_bytes(), &mut buf);
    let r = |i: usize| u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]]);

    let (lo, hi) = match t.kind {
        TimeKind::Timestamp => (1971, 2037),
        TimeKind::Date | TimeKind::Datetime => (1000, 9999),
    };
    let span = (hi - lo + 1) as u32;
    let mut year = lo + (r(0) % span) as i32;
    let month = 1 + r(1) % 12;
    let (hour, minute, second, micro) = (r(3) % 24, r(4) % 60, r(5) % 60, r(6) % 1_000_000);

    let build = |year: i32| -> Result<Time> {
        let day = fold_day(r(2), year, month);
        let value = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_micro_opt(hour, minute, second, micro))
            .ok_or_else(|| anyhow!("cannot build time {year}-{month}-{day}"))?;
        Ok(Time::new(t.kind, t.fsp, value))
    };
    let masked = build(year)?;
    if masked != *t {
        return Ok(masked);
    }
    year = lo + (year - lo + 1) % span as i32;
    build(year)
}

fn mask_duration(d: &Duration, key: &MaskKey) -> Duration {
    let h = key.hash_u64("duration", &d.micros.to_le_bytes());
    let mut total = (h % (MAX_DURATION_MICROS as u64 + 1)) as i64;
    if total == d.micros.abs() {
        total = (total + 1_000_000) % (MAX_DURATION_MICROS + 1);
    }
    Duration::new(if d.is_negative() { -total } else { total }, d.fsp)
}

fn mask_json(v: &serde_json::Value, key: &MaskKey) -> Result<serde_json::Value> {
    use serde_json::Value;
    Ok(match v {
        Value::String(s) => Value::String(mask_string(s, UNSPECIFIED, key)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(mask_int(i, key))
            } else if let Some(u) = n.as_u64() {
                Value::from(mask_uint(u, key))
            } else {
                let f = mask_float(n.as_f64().unwrap_or_default(), key)?;
                match serde_json::Number::from_f64(f) {
                    Some(n) => Value::Number(n),
                    None => v.clone(),
                }
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|i| mask_json(i, key))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(fields) => {
            let mut out = serde_json::Map::new();
            for (k, f) in fields {
                out.insert(k.clone(), mask_json(f, key)?);
            }
            Value::Object(out)
        }
        Value::Null | Value::Bool(_) => v.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn key() -> MaskKey {
        MaskKey::derive("test-key")
    }

    fn mask(d: Datum, tp: FieldType) -> Result<Datum> {
        Ok(bounded_hash(&d, &tp, &key())?.0)
    }

    #[test]
    fn ints_keep_sign_and_bracket() {
        let k = key();
        for v in [0i64, 1, 42, 127, -1, -128, 128, 40_000, -40_000, i64::MAX, i64::MIN] {
            let m = mask_int(v, &k);
            assert_ne!(m, v);
            assert_eq!(m < 0, v < 0, "{v} -> {m}");
            let bound = SIGNED_BRACKETS
                .into_iter()
                .find(|b| v <= *b && v >= -*b - 1)
                .unwrap();
            assert!(m <= bound && m >= -bound - 1, "{v} -> {m}");
        }
        assert!(mask_uint(255, &k) <= 255);
        assert!(mask_uint(256, &k) <= u16::MAX as u64);
        assert!(mask_bit(1, 1, &k) <= 1);
    }

    #[test]
    fn deterministic_per_key() {
        assert_eq!(mask_int(123_456, &key()), mask_int(123_456, &key()));
        assert_ne!(
            mask_int(123_456, &key()),
            mask_int(123_456, &MaskKey::derive("other"))
        );
    }

    #[test]
    fn numerics_keep_digit_counts() -> Result<()> {
        let m = mask_float(12.345, &key())?;
        let d = Decimal::from_f64(m)?;
        assert_eq!(d.int_digits(), 2);
        assert!(d.scale() <= 3);

        let m = mask_float(-0.5, &key())?;
        assert!(m <= 0.0 && m > -10.0);

        let tp = FieldType::with_len(TypeCode::NewDecimal, 5, 2);
        let original: Decimal = "123.45".parse()?;
        let m = mask(Datum::Decimal(original.clone()), tp.clone())?;
        match &m {
            Datum::Decimal(d) => {
                assert_eq!(d.scale(), 2);
                assert_eq!(d.int_digits(), 3);
                assert_ne!(*d, original);
            }
            other => panic!("unexpected {other:?}"),
        }
        m.convert_to(&tp)?;
        Ok(())
    }

    #[test]
    fn fractions_keep_zero_integer_part() -> Result<()> {
        for (flen, decimal, text) in [(2, 2, "0.45"), (2, 2, "0.05"), (4, 2, "0.45"), (4, 2, "-0.12")] {
            let tp = FieldType::with_len(TypeCode::NewDecimal, flen, decimal);
            let original: Decimal = text.parse()?;
            let m = mask(Datum::Decimal(original.clone()), tp.clone())?;
            let Datum::Decimal(d) = &m else {
                panic!("unexpected {m:?}");
            };
            assert!(d.is_fraction(), "{text} -> {d}");
            assert_eq!(d.scale(), 2);
            assert_eq!(d.is_negative(), original.is_negative());
            assert_ne!(*d, original);
            m.convert_to(&tp)?;
        }

        let m = mask_float(0.25, &key())?;
        assert!(m >= 0.0 && m < 1.0, "{m}");
        Ok(())
    }

    #[test]
    fn out_of_range_decimal_is_rejected() -> Result<()> {
        let tp = FieldType::with_len(TypeCode::NewDecimal, 2, 2);
        assert!(Datum::Decimal("6.82".parse()?).convert_to(&tp).is_err());
        Datum::Decimal("0.99".parse()?).convert_to(&tp)?;
        Ok(())
    }

    #[test]
    fn days_fold_into_month() -> Result<()> {
        assert_eq!(fold_day(27, 2001, 2), 28);
        assert_eq!(fold_day(28, 2001, 2), 1);
        assert_eq!(fold_day(30, 2001, 2), 3);
        assert_eq!(fold_day(28, 2000, 2), 29);
        assert_eq!(fold_day(30, 2001, 4), 1);

        let tp = FieldType::new(TypeCode::Date);
        for day in 1..=28 {
            let d = Datum::String(format!("2001-02-{day:02}")).convert_to(&tp)?;
            let Datum::Time(m) = mask(d, tp.clone())? else {
                panic!("expected time");
            };
            assert!(m.value.day() <= days_in_month(m.value.year(), m.value.month()));
        }
        Ok(())
    }

    #[test]
    fn strings_keep_length() -> Result<()> {
        let m = mask(Datum::String("hello world".into()), FieldType::new(TypeCode::Varchar))?;
        let s = m.to_text();
        assert_eq!(s.len(), 11);
        assert!(s.ends_with('*'));
        assert!(s[..10].chars().all(|c| c.is_ascii_hexdigit()));

        let m = mask(
            Datum::String("ab".into()),
            FieldType::with_len(TypeCode::Varchar, 2, 0),
        )?;
        assert_eq!(m.to_text().len(), 2);

        let m = mask(
            Datum::Bytes(vec![1, 2, 3, 4]),
            FieldType::new(TypeCode::Blob).binary(),
        )?;
        assert!(matches!(m, Datum::Bytes(b) if b.len() == 4));
        Ok(())
    }

    #[test]
    fn temporals_stay_valid() -> Result<()> {
        let tp = FieldType::new(TypeCode::Timestamp);
        let t = Datum::String("2021-06-01 12:00:00".into()).convert_to(&tp)?;
        let m = mask(t.clone(), tp.clone())?;
        assert_ne!(m, t);
        match &m {
            Datum::Time(masked) => {
                assert!((1971..=2037).contains(&masked.value.year()));
                assert_eq!(masked.value.nanosecond(), 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        m.convert_to(&tp)?;

        let tp = FieldType::new(TypeCode::Date);
        let d = Datum::String("2000-02-29".into()).convert_to(&tp)?;
        let m = mask(d, tp.clone())?;
        assert_eq!(m.to_text().len(), 10);
        m.convert_to(&tp)?;

        let tp = FieldType::new(TypeCode::Duration);
        let d = Datum::String("-10:00:00".into()).convert_to(&tp)?;
        match mask(d, tp)? {
            Datum::Duration(m) => assert!(m.is_negative() && m.micros % 1_000_000 == 0),
            other => panic!("unexpected {other:?}"),
        }

        let m = mask(Datum::Int(2021), FieldType::new(TypeCode::Year))?;
        assert!(matches!(m, Datum::Int(y) if (1901..=2155).contains(&y) && y != 2021));
        Ok(())
    }

    #[test]
    fn enums_keep_index() -> Result<()> {
        let m = mask(
            Datum::Enum {
                name: "large".into(),
                index: 2,
            },
            FieldType::new(TypeCode::Enum),
        )?;
        assert!(matches!(m, Datum::Enum { name, index: 2 } if name.len() == 5 && name != "large"));

        let m = mask(
            Datum::Json(serde_json::json!({"name": "bob", "age": 30, "ok": true})),
            FieldType::new(TypeCode::Json),
        )?;
        let Datum::Json(v) = m else {
            panic!("expected json");
        };
        assert_eq!(v["ok"], serde_json::json!(true));
        assert_ne!(v["name"], serde_json::json!("bob"));
        assert!(v["age"].as_i64().is_some());
        Ok(())
    }
}
