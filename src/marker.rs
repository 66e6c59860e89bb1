// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ast::*;
use crate::datum::Datum;
use crate::types::FieldType;
use crate::visitor::{walk_expr, walk_statement, Node, Visit, Visitor};

/// Integer stand-in for one literal or placeholder while a statement is analyzed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Marker(pub i64);

impl Marker {
    /// The markers that arithmetic folding may turn this one into.
    pub fn neighbors(self) -> [Marker; 2] {
        [Marker(self.0 + 1), Marker(self.0 - 1)]
    }
}

pub const MARKER_STEP: i64 = 1000;

/// Value that literals are neutralized to when parameters are substituted.
pub const PARAM_SENTINEL: i64 = 1;

/// Hands out multiples of [`MARKER_STEP`], skipping every `m` for which
/// `m - 1`, `m` or `m + 1` appears as an integer literal in the statement.
#[derive(Debug, Clone)]
pub struct MarkerAllocator {
    last: i64,
    reserved: BTreeSet<i64>,
}

impl MarkerAllocator {
    pub fn new(reserved: BTreeSet<i64>) -> Self {
        Self { last: 0, reserved }
    }

    pub fn allocate(&mut self) -> Marker {
        loop {
            self.last = self.last.saturating_add(MARKER_STEP);
            let m = self.last;
            if !(m - 1..=m + 1).any(|v| self.reserved.contains(&v)) {
                return Marker(m);
            }
        }
    }
}

/// Original value of a substituted literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub value: Datum,
    pub tp: FieldType,
}

#[derive(Debug, Clone, Default)]
pub struct OriginRegistry {
    entries: BTreeMap<Marker, Origin>,
}

impl OriginRegistry {
    pub fn insert(&mut self, marker: Marker, origin: Origin) {
        self.entries.insert(marker, origin);
    }

    pub fn get(&self, marker: Marker) -> Option<&Origin> {
        self.entries.get(&marker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Marker, &Origin)> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstituteMode {
    /// Replace every literal by a fresh marker.
    Value,
    /// Replace every `?` by a fresh marker and neutralize literals.
    ParamMarker,
}

#[derive(Debug, Clone, Default)]
pub struct Substitution {
    pub origins: OriginRegistry,
    /// One slot per `?` in source order. `None` for placeholders that were
    /// left in place, such as `LIMIT ?`.
    pub params: Vec<Option<Marker>>,
}

#[derive(Default)]
struct IntLiterals {
    values: BTreeSet<i64>,
}

impl Visitor for IntLiterals {
    fn leave(&mut self, node: Node<'_>) -> Result<()> {
        if let Node::Expr(e) = node {
            match &e.kind {
                ExprKind::Literal(Datum::Int(v)) => {
                    self.values.insert(*v);
                }
                ExprKind::Literal(Datum::Uint(v)) => {
                    if let Ok(v) = i64::try_from(*v) {
                        self.values.insert(v);
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}

struct Replace {
    mode: SubstituteMode,
    alloc: MarkerAllocator,
    origins: OriginRegistry,
    params: Vec<(u32, Option<Marker>)>,
}

impl Replace {
    fn skipped_params(&mut self, e: &mut Expr) -> Result<()> {
        struct Params<'a>(&'a mut Vec<(u32, Option<Marker>)>);
        impl Visitor for Params<'_> {
            fn leave(&mut self, node: Node<'_>) -> Result<()> {
                if let Node::Expr(e) = node {
                    if matches!(e.kind, ExprKind::Param) {
                        self.0.push((e.span.start, None));
                    }
                }
                Ok(())
            }
        }
        walk_expr(&mut Params(&mut self.params), e)
    }
}

impl Visitor for Replace {
    fn enter(&mut self, node: &Node<'_>) -> Visit {
        match node {
            Node::Limit(_) => Visit::SkipChildren,
            Node::Expr(e) if e.is_count_of_literal() => Visit::SkipChildren,
            _ => Visit::Continue,
        }
    }

    fn leave(&mut self, node: Node<'_>) -> Result<()> {
        match node {
            Node::Limit(l) => {
                if self.mode == SubstituteMode::ParamMarker {
                    if let Some(o) = &mut l.offset {
                        self.skipped_params(o)?;
                    }
                    self.skipped_params(&mut l.count)?;
                }
            }
            Node::Expr(e) => {
                let kind = match (&e.kind, self.mode) {
                    (ExprKind::Literal(d), SubstituteMode::Value) if !d.is_null() => {
                        let marker = self.alloc.allocate();
                        self.origins.insert(
                            marker,
                            Origin {
                                value: d.clone(),
                                tp: d.literal_type(),
                            },
                        );
                        ExprKind::Marker(marker)
                    }
                    (ExprKind::Literal(d), SubstituteMode::ParamMarker) if !d.is_null() => {
                        ExprKind::Literal(Datum::Int(PARAM_SENTINEL))
                    }
                    (ExprKind::Param, SubstituteMode::ParamMarker) => {
                        let marker = self.alloc.allocate();
                        self.params.push((e.span.start, Some(marker)));
                        ExprKind::Marker(marker)
                    }
                    _ => return Ok(()),
                };
                e.kind = kind;
            }
            _ => (),
        }
        Ok(())
    }
}

/// Replace literals (or placeholders) of `stmt` with markers.
pub fn substitute(stmt: &mut Statement, mode: SubstituteMode) -> Result<Substitution> {
    let mut ints = IntLiterals::default();
    walk_statement(&mut ints, stmt)?;

    let mut replace = Replace {
        mode,
        alloc: MarkerAllocator::new(ints.values),
        origins: OriginRegistry::default(),
        params: vec![],
    };
    walk_statement(&mut replace, stmt)?;

    // Offsets are unique per placeholder; sorting restores the written order.
    replace.params.sort_by_key(|(offset, _)| *offset);
    Ok(Substitution {
        origins: replace.origins,
        params: replace.params.into_iter().map(|(_, m)| m).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::render_statement;
    use crate::parser::parse_one;

    #[test]
    fn allocation_skips_neighbors_of_literals() {
        let mut alloc = MarkerAllocator::new([999, 3001].into_iter().collect());
        assert_eq!(alloc.allocate(), Marker(2000));
        assert_eq!(alloc.allocate(), Marker(4000));
        assert_eq!(alloc.allocate(), Marker(5000));
    }

    #[test]
    fn value_mode() -> Result<()> {
        let mut stmt = parse_one(
            "test",
            "SELECT COUNT(1) FROM t WHERE a = 2000 AND b = 'x' AND c IS NULL LIMIT 10",
        )?;
        let sub = substitute(&mut stmt, SubstituteMode::Value)?;
        assert_eq!(
            render_statement(&stmt),
            "SELECT COUNT(1) FROM t WHERE a = 1000 AND b = 3000 AND c IS NULL LIMIT 10"
        );
        assert_eq!(sub.origins.len(), 2);
        assert_eq!(
            sub.origins.get(Marker(1000)).map(|o| o.value.clone()),
            Some(Datum::Int(2000))
        );
        assert!(sub.params.is_empty());
        Ok(())
    }

    #[test]
    fn param_mode() -> Result<()> {
        let mut stmt = parse_one(
            "test",
            "UPDATE t SET a = a + 100, b = ? WHERE id = ? LIMIT ?",
        )?;
        let sub = substitute(&mut stmt, SubstituteMode::ParamMarker)?;
        assert_eq!(
            render_statement(&stmt),
            "UPDATE t SET a = a + 1, b = 1000 WHERE id = 2000 LIMIT ?"
        );
        assert!(sub.origins.is_empty());
        assert_eq!(sub.params, vec![Some(Marker(1000)), Some(Marker(2000)), None]);
        Ok(())
    }
}
