// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type inference for markers. Expressions that are known to be compared,
//! assigned or cast to each other are linked in an undirected graph; the
//! type of a marker is found by walking that graph from the marker.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::datum::Datum;
use crate::frontend::plan::{ExprId, PhysicalPlan, Plan, TypedExpr, TypedExprKind};
use crate::marker::Marker;
use crate::types::FieldType;

/// Inferred type of every marker found in a plan.
pub type InferredTypeMap = BTreeMap<Marker, FieldType>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    Normal(ExprId),
    /// An explicit cast, identified by the cast expression.
    Cast(ExprId),
}

#[derive(Debug, Clone)]
enum NodeData {
    Normal { tp: FieldType, column: bool },
    Cast { input: FieldType, output: FieldType },
}

#[derive(Debug, Default)]
pub struct CastGraph {
    data: HashMap<Node, NodeData>,
    adj: HashMap<Node, Vec<Node>>,
}

impl CastGraph {
    fn node(&mut self, e: &TypedExpr) -> Node {
        let (node, data) = match &e.kind {
            TypedExprKind::Cast(arg) => (
                Node::Cast(e.id),
                NodeData::Cast {
                    input: arg.tp.clone(),
                    output: e.tp.clone(),
                },
            ),
            _ => (
                Node::Normal(e.id),
                NodeData::Normal {
                    tp: e.tp.clone(),
                    column: e.is_column(),
                },
            ),
        };
        self.data.entry(node).or_insert(data);
        node
    }

    /// Link two expressions.
    pub fn add(&mut self, a: &TypedExpr, b: &TypedExpr) {
        let (a, b) = (self.node(a), self.node(b));
        let neighbors = self.adj.entry(a).or_default();
        if neighbors.contains(&b) {
            return;
        }
        neighbors.push(b);
        self.adj.entry(b).or_default().push(a);
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Type that the constant `c` is most likely meant to have.
    pub fn infer(&self, c: &TypedExpr) -> FieldType {
        let mut path = HashSet::new();
        let candidates = self.search(Node::Normal(c.id), &c.tp, &mut path);
        candidates.into_iter().next().unwrap_or_else(|| c.tp.clone())
    }

    /// Depth-first search. Nodes are marked only while they are on the
    /// current path, so a node may be reached again through another path.
    fn search(&self, u: Node, current: &FieldType, path: &mut HashSet<Node>) -> Vec<FieldType> {
        path.insert(u);
        let et = current.eval_type();
        let mut found = vec![];
        for v in self.adj.get(&u).into_iter().flatten() {
            if path.contains(v) {
                continue;
            }
            match self.data.get(v) {
                Some(NodeData::Cast { input, output }) => {
                    if et == input.eval_type() {
                        found.extend(self.search(*v, output, path));
                    } else if et == output.eval_type() {
                        found.extend(self.search(*v, input, path));
                    }
                }
                Some(NodeData::Normal { tp, column }) => {
                    if tp.eval_type() == et || *column {
                        found.push(tp.clone());
                    }
                }
                None => (),
            }
        }
        path.remove(&u);

        if found.is_empty() {
            found.push(current.clone());
        }
        found
    }
}

/// Walks a plan, building the cast graph and collecting constants, columns
/// and point-access handles.
#[derive(Debug, Default)]
pub struct CastGraphBuilder {
    pub graph: CastGraph,
    pub constants: Vec<TypedExpr>,
    /// Origins of the referenced columns.
    pub columns: Vec<String>,
    pub handles: Vec<i64>,
    seen: HashSet<ExprId>,
    /// Subquery result columns, mapped to the subquery's output expression.
    aliases: HashMap<ExprId, TypedExpr>,
}

/// Follow subquery result columns down to the expression producing them.
fn resolve<'e>(aliases: &'e HashMap<ExprId, TypedExpr>, mut e: &'e TypedExpr) -> &'e TypedExpr {
    for _ in 0..=aliases.len() {
        match aliases.get(&e.id) {
            Some(target) => e = target,
            None => break,
        }
    }
    e
}

impl CastGraphBuilder {
    pub fn build(plan: &Plan) -> Self {
        let mut b = Self::default();
        match plan {
            Plan::Select(p) | Plan::Delete { select: p } => {
                b.collect_aliases(p);
                b.visit_plan(p, true);
            }
            Plan::Insert {
                select,
                assignments,
            } => {
                if let Some(p) = select {
                    b.collect_aliases(p);
                    b.visit_plan(p, true);
                }
                b.visit_assignments(assignments);
            }
            Plan::Update {
                select,
                assignments,
            } => {
                b.collect_aliases(select);
                b.visit_plan(select, true);
                b.visit_assignments(assignments);
            }
            Plan::Simple => (),
        }
        b
    }

    fn visit_assignments(&mut self, assignments: &[crate::frontend::plan::Assignment]) {
        for a in assignments {
            self.graph.add(&a.column, resolve(&self.aliases, &a.value));
            self.visit_expr(&a.column);
            self.visit_expr(&a.value);
        }
    }

    fn collect_aliases(&mut self, p: &PhysicalPlan) {
        if let PhysicalPlan::Apply {
            inner,
            result: Some(result),
            ..
        } = p
        {
            if let Some(first) = inner.output().first() {
                self.aliases.insert(result.id, first.clone());
            }
        }
        for child in p.children() {
            self.collect_aliases(child);
        }
    }

    /// `result_set` is set while `p` produces the statement's own rows.
    fn visit_plan(&mut self, p: &PhysicalPlan, result_set: bool) {
        match p {
            PhysicalPlan::Apply { outer, inner, .. } => {
                self.visit_plan(outer, result_set);
                self.visit_plan(inner, false);
            }
            PhysicalPlan::Selection { child, .. }
            | PhysicalPlan::Aggregation { child, .. }
            | PhysicalPlan::Sort { child, .. }
            | PhysicalPlan::Limit { child } => self.visit_plan(child, result_set),
            PhysicalPlan::Union { children } => {
                for child in children {
                    self.visit_plan(child, result_set);
                }
            }
            _ => {
                for child in p.children() {
                    self.visit_plan(child, false);
                }
            }
        }
        let projection = result_set && matches!(p, PhysicalPlan::Projection { .. });
        for e in p.exprs() {
            // A constant in the result set constrains nothing.
            if projection && e.constant().is_some() {
                continue;
            }
            self.visit_expr(e);
        }
        self.handles.extend_from_slice(p.handles());
    }

    fn visit_expr(&mut self, e: &TypedExpr) {
        if !self.seen.insert(e.id) {
            return;
        }
        match &e.kind {
            TypedExprKind::ScalarFunc { args, .. } => {
                if let [l, r] = args.as_slice() {
                    if l.tp.eval_type() == r.tp.eval_type() {
                        self.graph.add(resolve(&self.aliases, l), resolve(&self.aliases, r));
                    }
                }
                for a in args {
                    self.visit_expr(a);
                }
            }
            TypedExprKind::Cast(arg) => {
                self.graph.add(resolve(&self.aliases, arg), e);
                self.visit_expr(arg);
            }
            TypedExprKind::Constant(_) => self.constants.push(e.clone()),
            TypedExprKind::Column { origin } => {
                if !origin.is_empty() {
                    self.columns.push(origin.clone());
                }
            }
        }
    }

    /// Types of every integer constant, keyed by value. Point-access handles
    /// are integer primary keys.
    pub fn infer_types(&self) -> InferredTypeMap {
        let mut types = InferredTypeMap::new();
        for c in &self.constants {
            let key = match c.constant() {
                Some(Datum::Int(v)) => *v,
                Some(Datum::Uint(v)) => match i64::try_from(*v) {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                _ => continue,
            };
            types
                .entry(Marker(key))
                .or_insert_with(|| self.graph.infer(c));
        }
        for h in &self.handles {
            types.insert(Marker(*h), FieldType::int_handle());
        }
        log::debug!(
            "inferred {} types from {} constants and {} edges",
            types.len(),
            self.constants.len(),
            self.graph.edge_count()
        );
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConstraintFilter;
    use crate::frontend::{FrontEnd, Instance, Script};
    use crate::types::TypeCode;
    use anyhow::Result;

    fn infer(sql: &str) -> Result<(InferredTypeMap, Vec<String>)> {
        let instance = Instance::new();
        let schema = Script {
            name: "schema.sql".to_string(),
            sql: "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20), price DECIMAL(10,2), \
                  created DATETIME, flag TINYINT UNSIGNED)"
                .to_string(),
        };
        instance.load_schema("test", &[schema], ConstraintFilter::KeepIntPk)?;
        let mut ctx = instance.open_context();
        ctx.use_db("test")?;
        let stmt = ctx.parse_one(sql)?;
        let plan = ctx.plan(&stmt)?;
        let b = CastGraphBuilder::build(&plan);
        Ok((b.infer_types(), b.columns))
    }

    fn type_of(types: &InferredTypeMap, m: i64) -> Option<String> {
        types.get(&Marker(m)).map(|t| t.to_string())
    }

    #[test]
    fn through_casts() -> Result<()> {
        let (types, columns) = infer(
            "SELECT * FROM t WHERE name = 1000 AND price > 2000 AND created < 3000 AND flag = 4000",
        )?;
        assert_eq!(type_of(&types, 1000).as_deref(), Some("varchar(20)"));
        assert_eq!(type_of(&types, 2000).as_deref(), Some("decimal(10,2)"));
        assert_eq!(type_of(&types, 3000).as_deref(), Some("datetime"));
        assert!(types
            .get(&Marker(4000))
            .is_some_and(|t| t.tp == TypeCode::Tiny && t.unsigned));
        assert!(columns.contains(&"test.t.created".to_string()));
        Ok(())
    }

    #[test]
    fn handles_and_fallback() -> Result<()> {
        let (types, _) = infer("SELECT name FROM t WHERE id = 1000")?;
        assert!(types.get(&Marker(1000)).is_some_and(|t| t.is_int_pk()));

        // Unlinked constants keep their own type.
        let (types, _) = infer("SELECT name FROM t WHERE 1000 > name + 2000")?;
        assert!(types
            .get(&Marker(1000))
            .is_some_and(|t| t.tp == TypeCode::Double || t.tp == TypeCode::Varchar));

        let (types, _) = infer("SELECT 1000")?;
        assert!(types.is_empty());
        Ok(())
    }

    #[test]
    fn assignments_and_folding() -> Result<()> {
        let (types, _) = infer("UPDATE t SET price = price + 1000, name = 2000 + 1 WHERE flag = 3000")?;
        assert_eq!(type_of(&types, 1000).as_deref(), Some("decimal(10,2)"));
        assert_eq!(type_of(&types, 2001).as_deref(), Some("varchar(20)"));
        assert_eq!(type_of(&types, 2000), None);

        let (types, _) = infer("INSERT INTO t (id, created) SELECT 1000, 2000")?;
        assert!(types.get(&Marker(1000)).is_some_and(|t| t.is_int_pk()));
        assert_eq!(type_of(&types, 2000).as_deref(), Some("datetime"));
        Ok(())
    }

    #[test]
    fn subquery_results() -> Result<()> {
        let (types, _) = infer("SELECT * FROM t WHERE id IN (SELECT 1000)")?;
        assert!(types.get(&Marker(1000)).is_some_and(|t| t.tp == TypeCode::Long));

        let (types, _) = infer("SELECT * FROM t WHERE name IN (SELECT 1000) OR created = (SELECT 2000)")?;
        assert_eq!(type_of(&types, 1000).as_deref(), Some("varchar(20)"));
        assert_eq!(type_of(&types, 2000).as_deref(), Some("datetime"));

        let (types, _) = infer("SELECT (SELECT 1000) FROM t")?;
        assert!(types.contains_key(&Marker(1000)));
        Ok(())
    }
}
