// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signatures of the builtin SQL functions known to the planner. Only the
//! typing behavior is modeled; functions are never evaluated.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::types::EvalType::{self, *};
use crate::types::TypeCode;

/// Expected evaluation types of the arguments. Arguments of a different
/// type are wrapped in casts by the planner.
#[derive(Debug, Clone, Copy)]
pub enum Args {
    Any,
    All(EvalType),
    /// Leading arguments; any further arguments keep their own type.
    Fixed(&'static [EvalType]),
}

#[derive(Debug, Clone, Copy)]
pub enum Ret {
    Type(TypeCode),
    /// Same type as the given argument.
    Arg(usize),
    /// Unified type of the arguments starting at the given position.
    Unify(usize),
    /// `SUM`: integers widen to decimal.
    Sum,
    /// `AVG`: decimal unless the argument is real.
    Avg,
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub args: Args,
    pub ret: Ret,
    pub min_args: usize,
    pub aggregate: bool,
}

type BuiltinMap = HashMap<&'static str, Signature>;

const fn scalar(args: Args, ret: Ret, min_args: usize) -> Signature {
    Signature {
        args,
        ret,
        min_args,
        aggregate: false,
    }
}

const fn aggregate(args: Args, ret: Ret) -> Signature {
    Signature {
        args,
        ret,
        min_args: 0,
        aggregate: true,
    }
}

const STR: Ret = Ret::Type(TypeCode::Varchar);
const INT: Ret = Ret::Type(TypeCode::LongLong);
const REAL: Ret = Ret::Type(TypeCode::Double);
const DATETIME: Ret = Ret::Type(TypeCode::Datetime);
const DATE: Ret = Ret::Type(TypeCode::Date);
const TIME: Ret = Ret::Type(TypeCode::Duration);
const JSON: Ret = Ret::Type(TypeCode::Json);

#[rustfmt::skip]
fn register_strings(m: &mut BuiltinMap) {
    m.insert("concat", scalar(Args::All(String), STR, 1));
    m.insert("concat_ws", scalar(Args::All(String), STR, 2));
    m.insert("lower", scalar(Args::All(String), STR, 1));
    m.insert("lcase", scalar(Args::All(String), STR, 1));
    m.insert("upper", scalar(Args::All(String), STR, 1));
    m.insert("ucase", scalar(Args::All(String), STR, 1));
    m.insert("length", scalar(Args::All(String), INT, 1));
    m.insert("char_length", scalar(Args::All(String), INT, 1));
    m.insert("character_length", scalar(Args::All(String), INT, 1));
    m.insert("trim", scalar(Args::All(String), STR, 1));
    m.insert("ltrim", scalar(Args::All(String), STR, 1));
    m.insert("rtrim", scalar(Args::All(String), STR, 1));
    m.insert("substring", scalar(Args::Fixed(&[String, Int, Int]), STR, 2));
    m.insert("substr", scalar(Args::Fixed(&[String, Int, Int]), STR, 2));
    m.insert("substring_index", scalar(Args::Fixed(&[String, String, Int]), STR, 3));
    m.insert("left", scalar(Args::Fixed(&[String, Int]), STR, 2));
    m.insert("right", scalar(Args::Fixed(&[String, Int]), STR, 2));
    m.insert("replace", scalar(Args::All(String), STR, 3));
    m.insert("locate", scalar(Args::Fixed(&[String, String, Int]), INT, 2));
    m.insert("instr", scalar(Args::All(String), INT, 2));
    m.insert("lpad", scalar(Args::Fixed(&[String, Int, String]), STR, 3));
    m.insert("rpad", scalar(Args::Fixed(&[String, Int, String]), STR, 3));
    m.insert("repeat", scalar(Args::Fixed(&[String, Int]), STR, 2));
    m.insert("reverse", scalar(Args::All(String), STR, 1));
    m.insert("md5", scalar(Args::All(String), STR, 1));
    m.insert("sha1", scalar(Args::All(String), STR, 1));
    m.insert("sha2", scalar(Args::Fixed(&[String, Int]), STR, 2));
    m.insert("hex", scalar(Args::Any, STR, 1));
    m.insert("unhex", scalar(Args::All(String), STR, 1));
    m.insert("format", scalar(Args::Fixed(&[Real, Int]), STR, 2));
    m.insert("ascii", scalar(Args::All(String), INT, 1));
    m.insert("field", scalar(Args::Any, INT, 2));
    m.insert("find_in_set", scalar(Args::All(String), INT, 2));
    m.insert("strcmp", scalar(Args::All(String), INT, 2));
}

#[rustfmt::skip]
fn register_numbers(m: &mut BuiltinMap) {
    m.insert("abs", scalar(Args::Any, Ret::Arg(0), 1));
    m.insert("ceil", scalar(Args::Any, INT, 1));
    m.insert("ceiling", scalar(Args::Any, INT, 1));
    m.insert("floor", scalar(Args::Any, INT, 1));
    m.insert("round", scalar(Args::Fixed(&[Decimal, Int]), Ret::Arg(0), 1));
    m.insert("truncate", scalar(Args::Fixed(&[Decimal, Int]), Ret::Arg(0), 2));
    m.insert("mod", scalar(Args::Any, Ret::Unify(0), 2));
    m.insert("pow", scalar(Args::All(Real), REAL, 2));
    m.insert("power", scalar(Args::All(Real), REAL, 2));
    m.insert("sqrt", scalar(Args::All(Real), REAL, 1));
    m.insert("exp", scalar(Args::All(Real), REAL, 1));
    m.insert("ln", scalar(Args::All(Real), REAL, 1));
    m.insert("log", scalar(Args::All(Real), REAL, 1));
    m.insert("rand", scalar(Args::All(Int), REAL, 0));
    m.insert("pi", scalar(Args::Any, REAL, 0));
    m.insert("sign", scalar(Args::Any, INT, 1));
    m.insert("greatest", scalar(Args::Any, Ret::Unify(0), 2));
    m.insert("least", scalar(Args::Any, Ret::Unify(0), 2));
    m.insert("crc32", scalar(Args::All(String), INT, 1));
    m.insert("conv", scalar(Args::Fixed(&[String, Int, Int]), STR, 3));
}

#[rustfmt::skip]
fn register_time(m: &mut BuiltinMap) {
    m.insert("now", scalar(Args::All(Int), DATETIME, 0));
    m.insert("current_timestamp", scalar(Args::All(Int), DATETIME, 0));
    m.insert("sysdate", scalar(Args::All(Int), DATETIME, 0));
    m.insert("curdate", scalar(Args::Any, DATE, 0));
    m.insert("current_date", scalar(Args::Any, DATE, 0));
    m.insert("curtime", scalar(Args::All(Int), TIME, 0));
    m.insert("current_time", scalar(Args::All(Int), TIME, 0));
    m.insert("utc_timestamp", scalar(Args::All(Int), DATETIME, 0));
    m.insert("unix_timestamp", scalar(Args::All(Datetime), INT, 0));
    m.insert("from_unixtime", scalar(Args::Fixed(&[Decimal, String]), DATETIME, 1));
    m.insert("date", scalar(Args::All(Datetime), DATE, 1));
    m.insert("time", scalar(Args::All(Duration), TIME, 1));
    m.insert("date_format", scalar(Args::Fixed(&[Datetime, String]), STR, 2));
    m.insert("str_to_date", scalar(Args::All(String), DATETIME, 2));
    m.insert("datediff", scalar(Args::All(Datetime), INT, 2));
    m.insert("timediff", scalar(Args::All(Duration), TIME, 2));
    m.insert("date_add", scalar(Args::Fixed(&[Datetime]), DATETIME, 2));
    m.insert("adddate", scalar(Args::Fixed(&[Datetime]), DATETIME, 2));
    m.insert("date_sub", scalar(Args::Fixed(&[Datetime]), DATETIME, 2));
    m.insert("subdate", scalar(Args::Fixed(&[Datetime]), DATETIME, 2));
    m.insert("year", scalar(Args::All(Datetime), INT, 1));
    m.insert("month", scalar(Args::All(Datetime), INT, 1));
    m.insert("day", scalar(Args::All(Datetime), INT, 1));
    m.insert("dayofmonth", scalar(Args::All(Datetime), INT, 1));
    m.insert("dayofweek", scalar(Args::All(Datetime), INT, 1));
    m.insert("dayofyear", scalar(Args::All(Datetime), INT, 1));
    m.insert("week", scalar(Args::Fixed(&[Datetime, Int]), INT, 1));
    m.insert("weekday", scalar(Args::All(Datetime), INT, 1));
    m.insert("hour", scalar(Args::All(Duration), INT, 1));
    m.insert("minute", scalar(Args::All(Duration), INT, 1));
    m.insert("second", scalar(Args::All(Duration), INT, 1));
    m.insert("to_days", scalar(Args::All(Datetime), INT, 1));
    m.insert("from_days", scalar(Args::All(Int), DATE, 1));
    m.insert("last_day", scalar(Args::All(Datetime), DATE, 1));
    m.insert("timestampdiff", scalar(Args::Fixed(&[String, Datetime, Datetime]), INT, 3));
}

#[rustfmt::skip]
fn register_control(m: &mut BuiltinMap) {
    m.insert("if", scalar(Args::Fixed(&[Int]), Ret::Unify(1), 3));
    m.insert("ifnull", scalar(Args::Any, Ret::Unify(0), 2));
    m.insert("coalesce", scalar(Args::Any, Ret::Unify(0), 1));
    m.insert("nullif", scalar(Args::Any, Ret::Arg(0), 2));
    m.insert("isnull", scalar(Args::Any, INT, 1));
}

#[rustfmt::skip]
fn register_aggregates(m: &mut BuiltinMap) {
    m.insert("count", aggregate(Args::Any, INT));
    m.insert("sum", aggregate(Args::Any, Ret::Sum));
    m.insert("avg", aggregate(Args::Any, Ret::Avg));
    m.insert("min", aggregate(Args::Any, Ret::Arg(0)));
    m.insert("max", aggregate(Args::Any, Ret::Arg(0)));
    m.insert("any_value", aggregate(Args::Any, Ret::Arg(0)));
    m.insert("group_concat", aggregate(Args::All(String), STR));
    m.insert("bit_and", aggregate(Args::All(Int), INT));
    m.insert("bit_or", aggregate(Args::All(Int), INT));
    m.insert("bit_xor", aggregate(Args::All(Int), INT));
    m.insert("std", aggregate(Args::All(Real), REAL));
    m.insert("stddev", aggregate(Args::All(Real), REAL));
    m.insert("variance", aggregate(Args::All(Real), REAL));
}

#[rustfmt::skip]
fn register_json(m: &mut BuiltinMap) {
    m.insert("json_extract", scalar(Args::Fixed(&[Json, String]), JSON, 2));
    m.insert("json_unquote", scalar(Args::All(String), STR, 1));
    m.insert("json_object", scalar(Args::Any, JSON, 0));
    m.insert("json_array", scalar(Args::Any, JSON, 0));
    m.insert("json_contains", scalar(Args::Fixed(&[Json, Json, String]), INT, 2));
    m.insert("json_length", scalar(Args::Fixed(&[Json, String]), INT, 1));
    m.insert("json_valid", scalar(Args::Any, INT, 1));
    m.insert("json_type", scalar(Args::All(Json), STR, 1));
    m.insert("json_set", scalar(Args::Fixed(&[Json]), JSON, 3));
}

#[rustfmt::skip]
fn register_misc(m: &mut BuiltinMap) {
    m.insert("last_insert_id", scalar(Args::All(Int), INT, 0));
    m.insert("database", scalar(Args::Any, STR, 0));
    m.insert("schema", scalar(Args::Any, STR, 0));
    m.insert("user", scalar(Args::Any, STR, 0));
    m.insert("current_user", scalar(Args::Any, STR, 0));
    m.insert("version", scalar(Args::Any, STR, 0));
    m.insert("uuid", scalar(Args::Any, STR, 0));
    m.insert("found_rows", scalar(Args::Any, INT, 0));
    m.insert("row_count", scalar(Args::Any, INT, 0));
    m.insert("connection_id", scalar(Args::Any, INT, 0));
    m.insert("sleep", scalar(Args::All(Real), INT, 1));
}

#[rustfmt::skip]
lazy_static! {
    pub static ref BUILTINS: BuiltinMap = {
	let mut m: BuiltinMap = HashMap::new();

	register_strings(&mut m);
	register_numbers(&mut m);
	register_time(&mut m);
	register_control(&mut m);
	register_aggregates(&mut m);
	register_json(&mut m);
	register_misc(&mut m);

	m
    };
}

/// Signature of a builtin, looked up case-insensitively.
pub fn lookup(name: &str) -> Option<&'static Signature> {
    BUILTINS.get(name.to_ascii_lowercase().as_str())
}

impl Signature {
    /// Evaluation type expected for the argument at `idx`, if any.
    pub fn arg_type(&self, idx: usize) -> Option<EvalType> {
        match self.args {
            Args::Any => None,
            Args::All(et) => Some(et),
            Args::Fixed(types) => types.get(idx).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert!(lookup("CONCAT").is_some_and(|s| !s.aggregate));
        assert!(lookup("count").is_some_and(|s| s.aggregate));
        assert!(lookup("no_such_function").is_none());

        let substr = lookup("substring");
        assert!(substr.is_some_and(|s| s.arg_type(1) == Some(Int) && s.arg_type(3).is_none()));
    }
}
