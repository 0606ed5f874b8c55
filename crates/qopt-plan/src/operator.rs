//! # Logical Operators
//!
//! The mutable operator tree the optimizer passes rewrite. Three design rules
//! keep rewriting tractable:
//!
//! - **Exclusive ownership**: every operator owns its children; a rewrite
//!   replaces an owned slot by move, so a partially-applied rewrite is never
//!   observable from the outside.
//! - **Uniform expression access**: operators store their scalar expressions
//!   in the shared `expressions` list where possible; kind-specific slots
//!   (group keys, order keys, join conditions) live in the payload but are
//!   reachable through [`LogicalOperator::visit_expressions`], so a visitor
//!   sees every expression of a node exactly once.
//! - **Cached output types**: `types` caches the operator's output column
//!   types. [`resolve_operator_types`](LogicalOperator::resolve_operator_types)
//!   recomputes the cache bottom-up; rewriters that change expressions must
//!   refresh the affected operators.
//!
//! Output *bindings* are computed on demand rather than cached: they depend
//! only on table indices and child structure, both of which rewrites change
//! deliberately and want reflected immediately.

use crate::expr::{ColumnBinding, ComparisonType, Expression};
use crate::types::LogicalType;
use serde::{Deserialize, Serialize};

/// Join semantics carried by the join operator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

/// A single equi/theta condition of a comparison join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: Expression,
    pub right: Expression,
    pub comparison: ComparisonType,
}

/// One key of an ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOrderByNode {
    pub expression: Expression,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// Kind discriminant for matching on operator type without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Get,
    Filter,
    Projection,
    Join,
    CrossProduct,
    ComparisonJoin,
    AnyJoin,
    DelimJoin,
    Aggregate,
    Distinct,
    Order,
    Limit,
    Subquery,
    TableFunction,
}

/// Kind-specific operator data.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorData {
    /// Base table scan. Leaf; produces `(table_index, i)` bindings.
    Get {
        table_index: u32,
        returned_types: Vec<LogicalType>,
        estimated_cardinality: u64,
    },
    /// Predicate application; `expressions` holds the conjuncts.
    Filter,
    /// Computes `expressions` and re-bases them under a fresh table index.
    Projection { table_index: u32 },
    /// Generic join as produced by planning, before join-specific lowering.
    /// `expressions` holds the (not yet classified) join predicates.
    Join { join_type: JoinType },
    /// Cartesian product of two children.
    CrossProduct,
    /// Join with explicit comparison conditions. The projection maps, when
    /// non-empty, select a subset of each side's columns as output.
    ComparisonJoin {
        join_type: JoinType,
        conditions: Vec<JoinCondition>,
        left_projection_map: Vec<u32>,
        right_projection_map: Vec<u32>,
    },
    /// Join on an arbitrary expression (`expressions[0]`).
    AnyJoin { join_type: JoinType },
    /// Duplicate-eliminated join used under correlated subplans.
    DelimJoin {
        join_type: JoinType,
        conditions: Vec<JoinCondition>,
    },
    /// Hash aggregate. `groups` are the grouping keys, `expressions` the
    /// aggregate computations; output is `(group_index, i)` bindings for the
    /// groups followed by `(aggregate_index, j)` for the aggregates.
    Aggregate {
        group_index: u32,
        aggregate_index: u32,
        groups: Vec<Expression>,
    },
    /// DISTINCT (ON) over its child; `targets` are the distinct keys.
    Distinct { targets: Vec<Expression> },
    /// Full sort of the child.
    Order { orders: Vec<BoundOrderByNode> },
    /// Row-count limit/offset.
    Limit { limit: u64, offset: u64 },
    /// Materialized subquery boundary. Blocks join reordering.
    Subquery {
        table_index: u32,
        returned_types: Vec<LogicalType>,
    },
    /// Table-producing function. Blocks join reordering.
    TableFunction {
        table_index: u32,
        returned_types: Vec<LogicalType>,
    },
}

impl OperatorData {
    pub fn kind(&self) -> OperatorKind {
        match self {
            OperatorData::Get { .. } => OperatorKind::Get,
            OperatorData::Filter => OperatorKind::Filter,
            OperatorData::Projection { .. } => OperatorKind::Projection,
            OperatorData::Join { .. } => OperatorKind::Join,
            OperatorData::CrossProduct => OperatorKind::CrossProduct,
            OperatorData::ComparisonJoin { .. } => OperatorKind::ComparisonJoin,
            OperatorData::AnyJoin { .. } => OperatorKind::AnyJoin,
            OperatorData::DelimJoin { .. } => OperatorKind::DelimJoin,
            OperatorData::Aggregate { .. } => OperatorKind::Aggregate,
            OperatorData::Distinct { .. } => OperatorKind::Distinct,
            OperatorData::Order { .. } => OperatorKind::Order,
            OperatorData::Limit { .. } => OperatorKind::Limit,
            OperatorData::Subquery { .. } => OperatorKind::Subquery,
            OperatorData::TableFunction { .. } => OperatorKind::TableFunction,
        }
    }
}

/// A node of the logical plan.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOperator {
    pub data: OperatorData,
    pub children: Vec<LogicalOperator>,
    pub expressions: Vec<Expression>,
    /// Cached output types; refresh via `resolve_operator_types`.
    pub types: Vec<LogicalType>,
}

impl LogicalOperator {
    pub fn new(data: OperatorData, children: Vec<LogicalOperator>) -> Self {
        Self {
            data,
            children,
            expressions: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        self.data.kind()
    }

    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    pub fn get(
        table_index: u32,
        returned_types: Vec<LogicalType>,
        estimated_cardinality: u64,
    ) -> Self {
        LogicalOperator::new(
            OperatorData::Get {
                table_index,
                returned_types,
                estimated_cardinality,
            },
            vec![],
        )
    }

    pub fn filter(predicates: Vec<Expression>, child: LogicalOperator) -> Self {
        let mut op = LogicalOperator::new(OperatorData::Filter, vec![child]);
        op.expressions = predicates;
        op
    }

    pub fn projection(
        table_index: u32,
        expressions: Vec<Expression>,
        child: LogicalOperator,
    ) -> Self {
        let mut op = LogicalOperator::new(OperatorData::Projection { table_index }, vec![child]);
        op.expressions = expressions;
        op
    }

    pub fn join(
        join_type: JoinType,
        predicates: Vec<Expression>,
        left: LogicalOperator,
        right: LogicalOperator,
    ) -> Self {
        let mut op = LogicalOperator::new(OperatorData::Join { join_type }, vec![left, right]);
        op.expressions = predicates;
        op
    }

    pub fn cross_product(left: LogicalOperator, right: LogicalOperator) -> Self {
        LogicalOperator::new(OperatorData::CrossProduct, vec![left, right])
    }

    pub fn comparison_join(
        join_type: JoinType,
        conditions: Vec<JoinCondition>,
        left: LogicalOperator,
        right: LogicalOperator,
    ) -> Self {
        LogicalOperator::new(
            OperatorData::ComparisonJoin {
                join_type,
                conditions,
                left_projection_map: vec![],
                right_projection_map: vec![],
            },
            vec![left, right],
        )
    }

    pub fn aggregate(
        group_index: u32,
        aggregate_index: u32,
        groups: Vec<Expression>,
        aggregates: Vec<Expression>,
        child: LogicalOperator,
    ) -> Self {
        let mut op = LogicalOperator::new(
            OperatorData::Aggregate {
                group_index,
                aggregate_index,
                groups,
            },
            vec![child],
        );
        op.expressions = aggregates;
        op
    }

    pub fn distinct(targets: Vec<Expression>, child: LogicalOperator) -> Self {
        LogicalOperator::new(OperatorData::Distinct { targets }, vec![child])
    }

    pub fn order_by(orders: Vec<BoundOrderByNode>, child: LogicalOperator) -> Self {
        LogicalOperator::new(OperatorData::Order { orders }, vec![child])
    }

    pub fn limit(limit: u64, offset: u64, child: LogicalOperator) -> Self {
        LogicalOperator::new(OperatorData::Limit { limit, offset }, vec![child])
    }

    // -----------------------------------------------------------------------
    // Output bindings and types
    // -----------------------------------------------------------------------

    /// The column bindings this operator advertises to its parent.
    pub fn column_bindings(&self) -> Vec<ColumnBinding> {
        match &self.data {
            OperatorData::Get {
                table_index,
                returned_types,
                ..
            } => generate_bindings(*table_index, returned_types.len()),
            OperatorData::Projection { table_index } => {
                generate_bindings(*table_index, self.expressions.len())
            }
            OperatorData::Subquery {
                table_index,
                returned_types,
            }
            | OperatorData::TableFunction {
                table_index,
                returned_types,
            } => generate_bindings(*table_index, returned_types.len()),
            OperatorData::Filter
            | OperatorData::Distinct { .. }
            | OperatorData::Order { .. }
            | OperatorData::Limit { .. } => self.children[0].column_bindings(),
            OperatorData::Join { .. } | OperatorData::CrossProduct => {
                let mut bindings = self.children[0].column_bindings();
                bindings.extend(self.children[1].column_bindings());
                bindings
            }
            OperatorData::AnyJoin { join_type } | OperatorData::DelimJoin { join_type, .. } => {
                self.join_bindings(*join_type, &[], &[])
            }
            OperatorData::ComparisonJoin {
                join_type,
                left_projection_map,
                right_projection_map,
                ..
            } => self.join_bindings(*join_type, left_projection_map, right_projection_map),
            OperatorData::Aggregate {
                group_index,
                aggregate_index,
                groups,
            } => {
                let mut bindings = generate_bindings(*group_index, groups.len());
                bindings.extend(generate_bindings(*aggregate_index, self.expressions.len()));
                bindings
            }
        }
    }

    fn join_bindings(
        &self,
        join_type: JoinType,
        left_map: &[u32],
        right_map: &[u32],
    ) -> Vec<ColumnBinding> {
        let left = apply_projection_map(self.children[0].column_bindings(), left_map);
        match join_type {
            // Semi and anti joins only produce the left side.
            JoinType::Semi | JoinType::Anti => left,
            _ => {
                let mut bindings = left;
                bindings.extend(apply_projection_map(
                    self.children[1].column_bindings(),
                    right_map,
                ));
                bindings
            }
        }
    }

    /// Recompute the cached output types of this subtree, children first.
    pub fn resolve_operator_types(&mut self) {
        for child in &mut self.children {
            child.resolve_operator_types();
        }
        self.refresh_types();
    }

    /// Recompute only this operator's cached types, assuming the children's
    /// caches are current. Rewriters call this after editing expressions.
    pub fn refresh_types(&mut self) {
        self.types = match &self.data {
            OperatorData::Get { returned_types, .. }
            | OperatorData::Subquery { returned_types, .. }
            | OperatorData::TableFunction { returned_types, .. } => returned_types.clone(),
            OperatorData::Projection { .. } => {
                self.expressions.iter().map(|e| e.return_type()).collect()
            }
            OperatorData::Filter
            | OperatorData::Distinct { .. }
            | OperatorData::Order { .. }
            | OperatorData::Limit { .. } => self.children[0].types.clone(),
            OperatorData::Join { .. } | OperatorData::CrossProduct => {
                let mut types = self.children[0].types.clone();
                types.extend(self.children[1].types.iter().copied());
                types
            }
            OperatorData::AnyJoin { join_type } | OperatorData::DelimJoin { join_type, .. } => {
                self.join_types(*join_type, &[], &[])
            }
            OperatorData::ComparisonJoin {
                join_type,
                left_projection_map,
                right_projection_map,
                ..
            } => self.join_types(*join_type, left_projection_map, right_projection_map),
            OperatorData::Aggregate { groups, .. } => {
                let mut types: Vec<LogicalType> = groups.iter().map(|g| g.return_type()).collect();
                types.extend(self.expressions.iter().map(|e| e.return_type()));
                types
            }
        };
    }

    fn join_types(
        &self,
        join_type: JoinType,
        left_map: &[u32],
        right_map: &[u32],
    ) -> Vec<LogicalType> {
        let left = apply_projection_map(self.children[0].types.clone(), left_map);
        match join_type {
            JoinType::Semi | JoinType::Anti => left,
            _ => {
                let mut types = left;
                types.extend(apply_projection_map(self.children[1].types.clone(), right_map));
                types
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cardinality
    // -----------------------------------------------------------------------

    /// Cardinality estimate for this subtree. Scans report their stored
    /// estimate, joins multiply, limits clamp, everything else passes the
    /// first child through.
    pub fn estimate_cardinality(&self) -> u64 {
        match &self.data {
            OperatorData::Get {
                estimated_cardinality,
                ..
            } => *estimated_cardinality,
            OperatorData::Join { .. }
            | OperatorData::CrossProduct
            | OperatorData::ComparisonJoin { .. }
            | OperatorData::AnyJoin { .. }
            | OperatorData::DelimJoin { .. } => self
                .children
                .iter()
                .map(|c| c.estimate_cardinality())
                .fold(1u64, u64::saturating_mul),
            OperatorData::Limit { limit, .. } => {
                (*limit).min(self.children[0].estimate_cardinality())
            }
            _ => self
                .children
                .first()
                .map(|c| c.estimate_cardinality())
                .unwrap_or(1),
        }
    }

    // -----------------------------------------------------------------------
    // Expression enumeration
    // -----------------------------------------------------------------------

    /// Visit every top-level expression of this operator (the uniform list
    /// plus kind-specific slots). Does not descend into expression subtrees
    /// or into child operators.
    pub fn visit_expressions<F: FnMut(&Expression)>(&self, f: &mut F) {
        for expr in &self.expressions {
            f(expr);
        }
        match &self.data {
            OperatorData::Aggregate { groups, .. } => {
                for group in groups {
                    f(group);
                }
            }
            OperatorData::Distinct { targets } => {
                for target in targets {
                    f(target);
                }
            }
            OperatorData::Order { orders } => {
                for order in orders {
                    f(&order.expression);
                }
            }
            OperatorData::ComparisonJoin { conditions, .. }
            | OperatorData::DelimJoin { conditions, .. } => {
                for cond in conditions {
                    f(&cond.left);
                    f(&cond.right);
                }
            }
            _ => {}
        }
    }

    /// Mutable counterpart of [`visit_expressions`](Self::visit_expressions).
    pub fn visit_expressions_mut<F: FnMut(&mut Expression)>(&mut self, f: &mut F) {
        for expr in &mut self.expressions {
            f(expr);
        }
        match &mut self.data {
            OperatorData::Aggregate { groups, .. } => {
                for group in groups {
                    f(group);
                }
            }
            OperatorData::Distinct { targets } => {
                for target in targets {
                    f(target);
                }
            }
            OperatorData::Order { orders } => {
                for order in orders {
                    f(&mut order.expression);
                }
            }
            OperatorData::ComparisonJoin { conditions, .. }
            | OperatorData::DelimJoin { conditions, .. } => {
                for cond in conditions {
                    f(&mut cond.left);
                    f(&mut cond.right);
                }
            }
            _ => {}
        }
    }
}

fn generate_bindings(table_index: u32, count: usize) -> Vec<ColumnBinding> {
    (0..count as u32)
        .map(|i| ColumnBinding::new(table_index, i))
        .collect()
}

fn apply_projection_map<T: Clone>(items: Vec<T>, map: &[u32]) -> Vec<T> {
    if map.is_empty() {
        return items;
    }
    map.iter().map(|&i| items[i as usize].clone()).collect()
}

/// Allocates fresh, query-unique table indices for synthetic projections.
///
/// The caller seeds it past every index already present in the plan; the
/// optimizer then draws from it whenever it plants a new projection.
#[derive(Debug, Clone)]
pub struct TableIndexAllocator {
    next_index: u32,
}

impl TableIndexAllocator {
    pub fn new(first_free_index: u32) -> Self {
        Self {
            next_index: first_free_index,
        }
    }

    pub fn allocate(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ScalarValue;

    fn scan(table_index: u32, cardinality: u64) -> LogicalOperator {
        LogicalOperator::get(
            table_index,
            vec![LogicalType::BigInt, LogicalType::Varchar],
            cardinality,
        )
    }

    #[test]
    fn test_get_bindings_and_types() {
        let mut op = scan(4, 100);
        op.resolve_operator_types();
        assert_eq!(
            op.column_bindings(),
            vec![ColumnBinding::new(4, 0), ColumnBinding::new(4, 1)]
        );
        assert_eq!(op.types, vec![LogicalType::BigInt, LogicalType::Varchar]);
    }

    #[test]
    fn test_projection_rebases_bindings() {
        let child = scan(0, 10);
        let exprs = vec![Expression::column_ref(
            ColumnBinding::new(0, 1),
            LogicalType::Varchar,
        )];
        let mut proj = LogicalOperator::projection(7, exprs, child);
        proj.resolve_operator_types();
        assert_eq!(proj.column_bindings(), vec![ColumnBinding::new(7, 0)]);
        assert_eq!(proj.types, vec![LogicalType::Varchar]);
    }

    #[test]
    fn test_join_concatenates_children() {
        let mut join = LogicalOperator::cross_product(scan(0, 10), scan(1, 20));
        join.resolve_operator_types();
        assert_eq!(join.column_bindings().len(), 4);
        assert_eq!(join.types.len(), 4);
        assert_eq!(join.estimate_cardinality(), 200);
    }

    #[test]
    fn test_aggregate_bindings_split_groups_and_aggregates() {
        let child = scan(0, 100);
        let groups = vec![Expression::column_ref(
            ColumnBinding::new(0, 0),
            LogicalType::BigInt,
        )];
        let aggregates = vec![Expression::constant(ScalarValue::BigInt(1))];
        let agg = LogicalOperator::aggregate(5, 6, groups, aggregates, child);
        assert_eq!(
            agg.column_bindings(),
            vec![ColumnBinding::new(5, 0), ColumnBinding::new(6, 0)]
        );
    }

    #[test]
    fn test_limit_clamps_cardinality() {
        let limit = LogicalOperator::limit(5, 0, scan(0, 100));
        assert_eq!(limit.estimate_cardinality(), 5);
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let mut alloc = TableIndexAllocator::new(10);
        assert_eq!(alloc.allocate(), 10);
        assert_eq!(alloc.allocate(), 11);
    }
}
