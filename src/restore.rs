// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Putting masked values back in place of markers, and renaming
//! identifiers.

use anyhow::Result;

use crate::ast::{ExprKind, Statement};
use crate::cast_graph::InferredTypeMap;
use crate::config::MaskSettings;
use crate::datum::Datum;
use crate::error::MaskError;
use crate::marker::OriginRegistry;
use crate::name_map::{rewrite_names, NameMap};
use crate::types::FieldType;
use crate::visitor::{walk_statement, Node, Visitor};

/// Cast `value` to `tp` and run the configured mask function on it.
/// Returns the masked value and its type. Integer primary keys are kept
/// as is when `ignore_int_pk` is set.
pub fn convert_and_mask(
    value: &Datum,
    tp: &FieldType,
    settings: &MaskSettings,
) -> Result<(Datum, FieldType), MaskError> {
    if settings.ignore_int_pk && tp.is_int_pk() {
        return Ok((value.clone(), tp.clone()));
    }
    let casted = value.convert_to(tp).map_err(|e| {
        MaskError::Cast(format!("cannot cast `{}` to `{tp}`: {e:#}", value.to_text()))
    })?;
    let (masked, new_tp) = (settings.mask.func)(&casted, tp, &settings.key).map_err(|e| {
        MaskError::MaskFunction(format!("failed to mask `{}`: {e:#}", casted.to_text()))
    })?;
    Ok((masked, new_tp.unwrap_or_else(|| tp.clone())))
}

/// A literal that was written as a string stays a string, so that a masked
/// date compared to a string column does not turn into a `TIMESTAMP` literal.
fn as_written(masked: Datum, original: &Datum) -> Datum {
    match (&masked, original) {
        (
            Datum::Time(_)
            | Datum::Duration(_)
            | Datum::Enum { .. }
            | Datum::Set { .. }
            | Datum::Json(_),
            Datum::String(_),
        ) => Datum::String(masked.to_text()),
        _ => masked,
    }
}

struct Restore<'a> {
    origins: &'a OriginRegistry,
    types: &'a InferredTypeMap,
    settings: &'a MaskSettings,
    errors: Vec<MaskError>,
    masked: usize,
}

impl Visitor for Restore<'_> {
    fn leave(&mut self, node: Node<'_>) -> Result<()> {
        let Node::Expr(e) = node else {
            return Ok(());
        };
        let ExprKind::Marker(marker) = e.kind else {
            return Ok(());
        };
        let Some(origin) = self.origins.get(marker) else {
            return Err(MaskError::MarkerNotRegistered(marker.0).into());
        };
        let value = match self.types.get(&marker) {
            None => {
                self.errors
                    .push(MaskError::TypeInferenceGap(origin.value.to_text()));
                origin.value.clone()
            }
            Some(tp) => match convert_and_mask(&origin.value, tp, self.settings) {
                Ok((masked, _)) => {
                    self.masked += 1;
                    as_written(masked, &origin.value)
                }
                Err(e) => {
                    self.errors.push(e);
                    origin.value.clone()
                }
            },
        };
        e.kind = ExprKind::Literal(value);
        Ok(())
    }
}

/// Replace every marker of `stmt` by the masked form of its original value.
/// Values that cannot be masked keep their original form and are reported
/// in the returned soft errors. A marker without a registered origin is a
/// hard error.
pub fn restore_values(
    stmt: &mut Statement,
    origins: &OriginRegistry,
    types: &InferredTypeMap,
    settings: &MaskSettings,
) -> Result<Vec<MaskError>, MaskError> {
    let mut restore = Restore {
        origins,
        types,
        settings,
        errors: vec![],
        masked: 0,
    };
    walk_statement(&mut restore, stmt)?;
    log::debug!(
        "restored {} of {} values",
        restore.masked,
        restore.masked + restore.errors.len()
    );
    Ok(restore.errors)
}

/// Rename the identifiers of `stmt`. `columns` are the fully qualified
/// columns the statement references. Returns the lookup misses.
pub fn restore_names<S: AsRef<str>>(
    stmt: &mut Statement,
    map: &NameMap,
    columns: &[S],
    current_db: Option<&str>,
) -> Result<Vec<MaskError>, MaskError> {
    let mut local = map.local(columns.iter().map(|c| c.as_ref()), current_db);
    rewrite_names(stmt, &mut local)?;
    Ok(local.take_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::render_statement;
    use crate::marker::{substitute, Marker, SubstituteMode};
    use crate::parser::parse_one;
    use crate::types::TypeCode;

    fn substituted(sql: &str) -> anyhow::Result<(Statement, OriginRegistry)> {
        let mut stmt = parse_one("test", sql)?;
        let sub = substitute(&mut stmt, SubstituteMode::Value)?;
        Ok((stmt, sub.origins))
    }

    #[test]
    fn gaps_keep_original_values() -> anyhow::Result<()> {
        let settings = MaskSettings::with_mask("debug")?;
        let (mut stmt, origins) = substituted("SELECT * FROM t WHERE a = 42 AND b = 'x'")?;
        let mut types = InferredTypeMap::new();
        types.insert(Marker(1000), FieldType::new(TypeCode::Long));

        let errors = restore_values(&mut stmt, &origins, &types, &settings)?;
        assert_eq!(errors, vec![MaskError::TypeInferenceGap("x".to_string())]);
        assert_eq!(
            render_statement(&stmt),
            "SELECT * FROM t WHERE a = 'int(11) 42' AND b = 'x'"
        );
        Ok(())
    }

    #[test]
    fn unregistered_marker_is_hard() -> anyhow::Result<()> {
        let settings = MaskSettings::with_mask("identity")?;
        let mut stmt = parse_one("test", "SELECT 1")?;
        substitute(&mut stmt, SubstituteMode::Value)?;
        let err = restore_values(&mut stmt, &OriginRegistry::default(), &InferredTypeMap::new(), &settings);
        assert_eq!(err, Err(MaskError::MarkerNotRegistered(1000)));
        Ok(())
    }

    #[test]
    fn casts_and_int_pk() -> anyhow::Result<()> {
        let mut settings = MaskSettings::with_mask("bounded-hash")?;
        settings.ignore_int_pk = true;
        let (mut stmt, origins) =
            substituted("SELECT * FROM t WHERE id = 7 AND created = 'oops' AND d = '2021-03-04'")?;
        let mut types = InferredTypeMap::new();
        types.insert(Marker(1000), FieldType::int_handle());
        types.insert(Marker(2000), FieldType::new(TypeCode::Datetime));
        types.insert(Marker(3000), FieldType::new(TypeCode::Date));

        let errors = restore_values(&mut stmt, &origins, &types, &settings)?;
        assert!(matches!(errors.as_slice(), [MaskError::Cast(_)]));
        let text = render_statement(&stmt);
        assert!(text.starts_with("SELECT * FROM t WHERE id = 7 AND created = 'oops' AND d = '"));
        assert!(!text.contains("DATE"));
        Ok(())
    }
}
