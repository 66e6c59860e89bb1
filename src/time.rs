// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    Date,
    Datetime,
    Timestamp,
}

/// A MySQL `DATE`, `DATETIME` or `TIMESTAMP` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Time {
    pub kind: TimeKind,
    pub fsp: u8,
    pub value: NaiveDateTime,
}

const FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
];

impl Time {
    pub fn new(kind: TimeKind, fsp: u8, value: NaiveDateTime) -> Self {
        let mut t = Self { kind, fsp, value };
        t.truncate();
        t
    }

    fn truncate(&mut self) {
        if self.kind == TimeKind::Date {
            self.value = self.value.date().and_time(NaiveTime::MIN);
            self.fsp = 0;
        }
        let step = 10u32.pow(6 - self.fsp.min(6) as u32) * 1000;
        let nanos = self.value.nanosecond() / step * step;
        if let Some(v) = self.value.with_nanosecond(nanos) {
            self.value = v;
        }
    }

    pub fn parse(s: &str, kind: TimeKind, fsp: u8) -> Result<Self> {
        let s = s.trim();
        for fmt in FORMATS {
            if let Ok(v) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self::new(kind, fsp, v));
            }
        }
        for fmt in ["%Y-%m-%d", "%Y%m%d"] {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return Ok(Self::new(kind, fsp, d.and_time(NaiveTime::MIN)));
            }
        }
        bail!("invalid time format: '{s}'")
    }

    /// Interpret an integer as `YYYYMMDD` or `YYYYMMDDHHMMSS`.
    pub fn from_int(v: i64, kind: TimeKind, fsp: u8) -> Result<Self> {
        let digits = v.to_string();
        match digits.len() {
            8 | 14 => Self::parse(&digits, kind, fsp),
            _ => bail!("invalid time value: {v}"),
        }
    }

    pub fn convert(&self, kind: TimeKind, fsp: u8) -> Self {
        Self::new(kind, fsp, self.value)
    }

    /// Numeric form `YYYYMMDDHHMMSS` (or `YYYYMMDD` for dates).
    pub fn to_int(&self) -> i64 {
        let d = self.value.date();
        let date = d.year() as i64 * 10000 + d.month() as i64 * 100 + d.day() as i64;
        if self.kind == TimeKind::Date {
            return date;
        }
        let t = self.value.time();
        date * 1_000_000 + t.hour() as i64 * 10000 + t.minute() as i64 * 100 + t.second() as i64
    }

    pub fn time_of_day(&self) -> Duration {
        let t = self.value.time();
        let micros = (t.num_seconds_from_midnight() as i64) * 1_000_000
            + (t.nanosecond() / 1000) as i64;
        Duration::new(micros, self.fsp)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TimeKind::Date => write!(f, "{}", self.value.format("%Y-%m-%d")),
            _ => {
                write!(f, "{}", self.value.format("%Y-%m-%d %H:%M:%S"))?;
                write_fraction(f, (self.value.nanosecond() / 1000) as i64, self.fsp)
            }
        }
    }
}

fn write_fraction(f: &mut fmt::Formatter<'_>, micros: i64, fsp: u8) -> fmt::Result {
    if fsp == 0 {
        return Ok(());
    }
    let fsp = fsp.min(6) as usize;
    let frac = format!("{micros:06}");
    write!(f, ".{}", &frac[..fsp])
}

pub const MAX_DURATION_HOURS: i64 = 838;
pub const MAX_DURATION_MICROS: i64 = ((MAX_DURATION_HOURS * 60 + 59) * 60 + 59) * 1_000_000;

/// A MySQL `TIME` value, stored as signed microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub micros: i64,
    pub fsp: u8,
}

impl Duration {
    pub fn new(micros: i64, fsp: u8) -> Self {
        let fsp = fsp.min(6);
        let step = 10i64.pow(6 - fsp as u32);
        Self {
            micros: micros / step * step,
            fsp,
        }
    }

    pub fn from_parts(negative: bool, hours: i64, minutes: i64, seconds: i64, micros: i64, fsp: u8) -> Result<Self> {
        if minutes > 59 || seconds > 59 {
            bail!("invalid time value: {hours}:{minutes}:{seconds}");
        }
        let total = ((hours * 60 + minutes) * 60 + seconds) * 1_000_000 + micros;
        if total > MAX_DURATION_MICROS {
            bail!("time value out of range: {hours}:{minutes}:{seconds}");
        }
        Ok(Self::new(if negative { -total } else { total }, fsp))
    }

    /// Accepts `[-][D ]HH:MM[:SS[.ffffff]]` and `[-]HHMMSS`.
    pub fn parse(s: &str, fsp: u8) -> Result<Self> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (days, body) = match body.split_once(' ') {
            Some((d, rest)) => match d.parse::<i64>() {
                Ok(d) => (d, rest),
                Err(_) => bail!("invalid time format: '{s}'"),
            },
            None => (0, body),
        };
        let (body, micros) = match body.split_once('.') {
            Some((b, frac)) => {
                if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                    bail!("invalid time format: '{s}'");
                }
                let mut frac = frac.to_string();
                frac.truncate(6);
                while frac.len() < 6 {
                    frac.push('0');
                }
                (b, frac.parse::<i64>().unwrap_or(0))
            }
            None => (body, 0),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let nums: Result<Vec<i64>> = parts
            .iter()
            .map(|p| match p.parse::<i64>() {
                Ok(n) if n >= 0 => Ok(n),
                _ => bail!("invalid time format: '{s}'"),
            })
            .collect();
        let nums = nums?;
        let (h, m, sec) = match nums.as_slice() {
            [h, m] => (*h, *m, 0),
            [h, m, sec] => (*h, *m, *sec),
            [n] => (n / 10000, n / 100 % 100, n % 100),
            _ => bail!("invalid time format: '{s}'"),
        };
        Self::from_parts(negative, days * 24 + h, m, sec, micros, fsp)
    }

    pub fn from_int(v: i64, fsp: u8) -> Result<Self> {
        let negative = v < 0;
        let n = v.abs();
        Self::from_parts(negative, n / 10000, n / 100 % 100, n % 100, 0, fsp)
    }

    pub fn is_negative(&self) -> bool {
        self.micros < 0
    }

    /// Returns (hours, minutes, seconds, microseconds) of the absolute value.
    pub fn parts(&self) -> (i64, i64, i64, i64) {
        let abs = self.micros.abs();
        let secs = abs / 1_000_000;
        (secs / 3600, secs / 60 % 60, secs % 60, abs % 1_000_000)
    }

    pub fn to_int(&self) -> i64 {
        let (h, m, s, _) = self.parts();
        let v = h * 10000 + m * 100 + s;
        if self.is_negative() {
            -v
        } else {
            v
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s, micros) = self.parts();
        if self.is_negative() {
            f.write_str("-")?;
        }
        write!(f, "{h:02}:{m:02}:{s:02}")?;
        write_fraction(f, micros, self.fsp)
    }
}

/// Days in the given month, accounting for leap years.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time() -> Result<()> {
        let t = Time::parse("2021-03-04 05:06:07.123456", TimeKind::Datetime, 3)?;
        assert_eq!(t.to_string(), "2021-03-04 05:06:07.123");
        let t = Time::parse("2021-03-04 05:06:07", TimeKind::Date, 0)?;
        assert_eq!(t.to_string(), "2021-03-04");
        let t = Time::from_int(20210304, TimeKind::Datetime, 0)?;
        assert_eq!(t.to_string(), "2021-03-04 00:00:00");
        assert_eq!(t.to_int(), 20210304000000);
        assert!(Time::parse("2021-02-30", TimeKind::Date, 0).is_err());
        Ok(())
    }

    #[test]
    fn parse_duration() -> Result<()> {
        assert_eq!(Duration::parse("12:34:56", 0)?.to_string(), "12:34:56");
        assert_eq!(Duration::parse("-1 01:00:00.5", 1)?.to_string(), "-25:00:00.5");
        assert_eq!(Duration::parse("123456", 0)?.to_string(), "12:34:56");
        assert!(Duration::parse("839:00:00", 0).is_err());
        assert!(Duration::parse("10:61:00", 0).is_err());
        Ok(())
    }

    #[test]
    fn leap_years() {
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 11), 30);
    }
}
