// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Column storage type, following the MySQL protocol type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCode {
    Tiny,
    Short,
    Int24,
    Long,
    LongLong,
    Year,
    Bit,
    Float,
    Double,
    NewDecimal,
    Varchar,
    String,
    Blob,
    Date,
    Datetime,
    Timestamp,
    Duration,
    Enum,
    Set,
    Json,
    Null,
}

/// Coarse evaluation category of a type. Type-linking edges in the cast
/// graph only connect expressions of the same evaluation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalType {
    Int,
    Real,
    Decimal,
    String,
    Datetime,
    Timestamp,
    Duration,
    Json,
}

impl EvalType {
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            EvalType::Datetime | EvalType::Timestamp | EvalType::Duration
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, EvalType::Int | EvalType::Real | EvalType::Decimal)
    }
}

pub const UNSPECIFIED: i32 = -1;

pub const MAX_DECIMAL_SCALE: i32 = 30;
pub const MAX_DECIMAL_WIDTH: i32 = 65;
pub const MAX_FSP: i32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub tp: TypeCode,
    pub flen: i32,
    pub decimal: i32,
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elems: Vec<String>,
}

impl FieldType {
    pub fn new(tp: TypeCode) -> Self {
        let (flen, decimal) = default_flen_and_decimal(tp);
        Self {
            tp,
            flen,
            decimal,
            unsigned: false,
            binary: false,
            primary_key: false,
            elems: vec![],
        }
    }

    pub fn with_len(tp: TypeCode, flen: i32, decimal: i32) -> Self {
        Self {
            flen,
            decimal,
            ..Self::new(tp)
        }
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn binary(mut self) -> Self {
        self.binary = true;
        self
    }

    /// The synthetic type given to integer row handles of point-access plans.
    pub fn int_handle() -> Self {
        let mut tp = Self::new(TypeCode::LongLong);
        tp.primary_key = true;
        tp
    }

    pub fn eval_type(&self) -> EvalType {
        match self.tp {
            TypeCode::Tiny
            | TypeCode::Short
            | TypeCode::Int24
            | TypeCode::Long
            | TypeCode::LongLong
            | TypeCode::Year
            | TypeCode::Bit => EvalType::Int,
            TypeCode::Float | TypeCode::Double => EvalType::Real,
            TypeCode::NewDecimal => EvalType::Decimal,
            TypeCode::Varchar
            | TypeCode::String
            | TypeCode::Blob
            | TypeCode::Enum
            | TypeCode::Set
            | TypeCode::Null => EvalType::String,
            TypeCode::Date | TypeCode::Datetime => EvalType::Datetime,
            TypeCode::Timestamp => EvalType::Timestamp,
            TypeCode::Duration => EvalType::Duration,
            TypeCode::Json => EvalType::Json,
        }
    }

    pub fn is_int_pk(&self) -> bool {
        self.primary_key && self.eval_type() == EvalType::Int
    }

    /// Default type used when a value of the given evaluation type is
    /// produced by an expression.
    pub fn from_eval_type(et: EvalType) -> Self {
        match et {
            EvalType::Int => Self::new(TypeCode::LongLong),
            EvalType::Real => Self::new(TypeCode::Double),
            EvalType::Decimal => Self::with_len(TypeCode::NewDecimal, UNSPECIFIED, UNSPECIFIED),
            EvalType::String => Self::new(TypeCode::Varchar),
            EvalType::Datetime => Self::new(TypeCode::Datetime),
            EvalType::Timestamp => Self::new(TypeCode::Timestamp),
            EvalType::Duration => Self::new(TypeCode::Duration),
            EvalType::Json => Self::new(TypeCode::Json),
        }
    }

    /// Fractional seconds precision of a temporal type.
    pub fn fsp(&self) -> u8 {
        self.decimal.clamp(0, MAX_FSP) as u8
    }

    pub fn type_name(&self) -> &'static str {
        match self.tp {
            TypeCode::Tiny => "tinyint",
            TypeCode::Short => "smallint",
            TypeCode::Int24 => "mediumint",
            TypeCode::Long => "int",
            TypeCode::LongLong => "bigint",
            TypeCode::Year => "year",
            TypeCode::Bit => "bit",
            TypeCode::Float => "float",
            TypeCode::Double => "double",
            TypeCode::NewDecimal => "decimal",
            TypeCode::Varchar if self.binary => "varbinary",
            TypeCode::Varchar => "varchar",
            TypeCode::String if self.binary => "binary",
            TypeCode::String => "char",
            TypeCode::Blob if self.binary => "blob",
            TypeCode::Blob => "text",
            TypeCode::Date => "date",
            TypeCode::Datetime => "datetime",
            TypeCode::Timestamp => "timestamp",
            TypeCode::Duration => "time",
            TypeCode::Enum => "enum",
            TypeCode::Set => "set",
            TypeCode::Json => "json",
            TypeCode::Null => "null",
        }
    }
}

fn default_flen_and_decimal(tp: TypeCode) -> (i32, i32) {
    match tp {
        TypeCode::Tiny => (4, 0),
        TypeCode::Short => (6, 0),
        TypeCode::Int24 => (9, 0),
        TypeCode::Long => (11, 0),
        TypeCode::LongLong => (20, 0),
        TypeCode::Year => (4, 0),
        TypeCode::Bit => (1, 0),
        TypeCode::Float => (12, UNSPECIFIED),
        TypeCode::Double => (22, UNSPECIFIED),
        TypeCode::NewDecimal => (10, 0),
        TypeCode::Date => (10, 0),
        TypeCode::Datetime | TypeCode::Timestamp => (19, 0),
        TypeCode::Duration => (10, 0),
        _ => (UNSPECIFIED, UNSPECIFIED),
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())?;
        match self.tp {
            TypeCode::Enum | TypeCode::Set => {
                let elems: Vec<String> = self
                    .elems
                    .iter()
                    .map(|e| format!("'{}'", e.replace('\'', "''")))
                    .collect();
                write!(f, "({})", elems.join(","))?;
            }
            TypeCode::NewDecimal | TypeCode::Float | TypeCode::Double
                if self.flen != UNSPECIFIED && self.decimal != UNSPECIFIED =>
            {
                write!(f, "({},{})", self.flen, self.decimal)?;
            }
            TypeCode::Date | TypeCode::Json | TypeCode::Null | TypeCode::Blob => (),
            TypeCode::Datetime | TypeCode::Timestamp | TypeCode::Duration => {
                if self.decimal > 0 {
                    write!(f, "({})", self.decimal)?;
                }
            }
            _ if self.flen != UNSPECIFIED => write!(f, "({})", self.flen)?,
            _ => (),
        }
        if self.unsigned {
            f.write_str(" UNSIGNED")?;
        }
        Ok(())
    }
}

/// Signed upper bound of an integer column type.
pub fn int_upper_bound(tp: TypeCode) -> i64 {
    match tp {
        TypeCode::Tiny => i8::MAX as i64,
        TypeCode::Short => i16::MAX as i64,
        TypeCode::Int24 => (1 << 23) - 1,
        TypeCode::Long => i32::MAX as i64,
        _ => i64::MAX,
    }
}

/// Unsigned upper bound of an integer column type.
pub fn uint_upper_bound(tp: TypeCode) -> u64 {
    match tp {
        TypeCode::Tiny => u8::MAX as u64,
        TypeCode::Short => u16::MAX as u64,
        TypeCode::Int24 => (1 << 24) - 1,
        TypeCode::Long => u32::MAX as u64,
        _ => u64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(FieldType::new(TypeCode::Long).to_string(), "int(11)");
        assert_eq!(
            FieldType::new(TypeCode::LongLong).unsigned().to_string(),
            "bigint(20) UNSIGNED"
        );
        assert_eq!(
            FieldType::with_len(TypeCode::NewDecimal, 10, 2).to_string(),
            "decimal(10,2)"
        );
        assert_eq!(
            FieldType::with_len(TypeCode::Varchar, 20, 0).binary().to_string(),
            "varbinary(20)"
        );
        assert_eq!(
            FieldType::with_len(TypeCode::Datetime, 19, 3).to_string(),
            "datetime(3)"
        );
    }

    #[test]
    fn eval_types() {
        assert_eq!(FieldType::new(TypeCode::Year).eval_type(), EvalType::Int);
        assert_eq!(FieldType::new(TypeCode::Enum).eval_type(), EvalType::String);
        assert_eq!(FieldType::new(TypeCode::Date).eval_type(), EvalType::Datetime);
        assert!(FieldType::int_handle().is_int_pk());
    }
}
