//! # Join-Order Optimizer
//!
//! Dynamic-programming join enumeration over connected subgraphs and their
//! complement pairs (DPccp), after Moerkotte & Neumann, "Dynamic Programming
//! Strikes Back". The pass has three stages:
//!
//! 1. **Extraction**: walk the plan downward, pass through single-child
//!    operators (collecting comparison predicates from filters), recurse
//!    through inner joins and cross products, and record a relation per base
//!    scan. Any reorder-blocking operator (subquery, table function, non-inner
//!    join) makes the whole pass decline.
//! 2. **Graph construction**: each comparison whose two sides reference
//!    non-empty, disjoint relation sets becomes a hyperedge (both directions).
//!    Everything else stays on its operator, untouched.
//! 3. **Enumeration**: fill a DP table keyed by interned relation set with
//!    the cheapest join tree per subset. Every subset is populated before any
//!    superset consults it.
//!
//! The optimizer never mutates the input plan: it returns the best join order
//! as a tree over the extracted relations, and the caller materializes the
//! reordered operator tree (and re-attaches the predicates the graph did not
//! consume).
//!
//! ## Cost model
//!
//! `create_join_tree` keeps the smaller-cardinality side on the right (the
//! hash build side), estimates the join cardinality as the max of the two
//! sides (a foreign-key-join assumption), and accumulates
//! `cost = cardinality + cost(left) + cost(right)`. A richer estimator can be
//! substituted without touching the enumeration.

use crate::error::OptimizerError;
use crate::query_graph::QueryGraph;
use crate::relation_set::{RelationSetManager, RelationSetRef};
use qopt_plan::expr::Expression;
use qopt_plan::operator::{JoinType, LogicalOperator, OperatorData, OperatorKind};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Enumeration limits, in the spirit of a search budget: beyond
/// `max_join_relations` the DP table grows exponentially, so the pass
/// declines and leaves the plan in its original order.
#[derive(Debug, Clone)]
pub struct JoinOrderConfig {
    pub max_join_relations: usize,
}

impl Default for JoinOrderConfig {
    fn default() -> Self {
        Self {
            max_join_relations: 12,
        }
    }
}

/// A base relation discovered during extraction.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Table index of the scan that produced the relation.
    pub table_index: u32,
    /// Cardinality estimated at the top of the scan's single-child chain, so
    /// filters above the scan are accounted.
    pub cardinality: u64,
}

/// DP table entry: the best plan found so far for one relation set.
#[derive(Debug, Clone, Copy)]
struct JoinNode {
    left: Option<RelationSetRef>,
    right: Option<RelationSetRef>,
    cardinality: u64,
    cost: u64,
}

/// The reordered join tree. Leaves carry the dense relation id assigned
/// during extraction; `JoinOrder::relation_tables` maps it back to the
/// operator's table index.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTree {
    Leaf {
        relation: u64,
        table_index: u32,
        cardinality: u64,
    },
    Join {
        /// Probe side: the larger-cardinality input.
        left: Box<JoinTree>,
        /// Build side: the smaller-cardinality input.
        right: Box<JoinTree>,
        cardinality: u64,
        cost: u64,
    },
}

impl JoinTree {
    pub fn cardinality(&self) -> u64 {
        match self {
            JoinTree::Leaf { cardinality, .. } | JoinTree::Join { cardinality, .. } => *cardinality,
        }
    }

    pub fn cost(&self) -> u64 {
        match self {
            JoinTree::Leaf { .. } => 0,
            JoinTree::Join { cost, .. } => *cost,
        }
    }
}

/// Result of a successful enumeration.
#[derive(Debug, Clone)]
pub struct JoinOrder {
    pub tree: JoinTree,
    /// Dense relation id -> table index of the originating scan.
    pub relation_tables: Vec<u32>,
}

/// Per-query join-order optimizer instance.
pub struct JoinOrderOptimizer {
    config: JoinOrderConfig,
    manager: RelationSetManager,
    graph: QueryGraph,
    relations: Vec<Relation>,
    /// table index -> dense relation id.
    relation_mapping: HashMap<u32, u64>,
    /// Comparison predicates collected during extraction (clones; the
    /// originals stay on their operators).
    filters: Vec<Expression>,
    plans: HashMap<RelationSetRef, JoinNode>,
}

impl JoinOrderOptimizer {
    pub fn new(config: JoinOrderConfig) -> Self {
        Self {
            config,
            manager: RelationSetManager::new(),
            graph: QueryGraph::new(),
            relations: Vec::new(),
            relation_mapping: HashMap::new(),
            filters: Vec::new(),
            plans: HashMap::new(),
        }
    }

    /// Compute the best join order for the given plan.
    ///
    /// Returns `Ok(None)` -- and guarantees the input was not touched -- when
    /// the plan contains a reorder blocker, has at most one relation, exceeds
    /// the relation budget, or its join graph is disconnected.
    pub fn optimize(
        &mut self,
        plan: &LogicalOperator,
    ) -> Result<Option<JoinOrder>, OptimizerError> {
        if !self.extract_join_relations(plan) {
            debug!("plan contains unsupported operators; keeping original join order");
            return Ok(None);
        }
        if self.relations.len() <= 1 {
            return Ok(None);
        }
        if self.relations.len() > self.config.max_join_relations {
            debug!(
                relations = self.relations.len(),
                budget = self.config.max_join_relations,
                "too many relations for exhaustive enumeration; keeping original join order"
            );
            return Ok(None);
        }

        // Promote comparisons whose sides touch disjoint relation sets to
        // hyperedges. Predicates that stay single-sided or overlap remain on
        // their operators for the caller to apply.
        let filters = std::mem::take(&mut self.filters);
        for filter in &filters {
            let Expression::Comparison { left, right, .. } = filter else {
                continue;
            };
            let mut left_bindings = HashSet::new();
            let mut right_bindings = HashSet::new();
            self.extract_relation_ids(left, &mut left_bindings)?;
            self.extract_relation_ids(right, &mut right_bindings)?;
            if !left_bindings.is_empty()
                && !right_bindings.is_empty()
                && left_bindings.is_disjoint(&right_bindings)
            {
                let left_set = self.manager.get_relation_set(left_bindings);
                let right_set = self.manager.get_relation_set(right_bindings);
                self.graph.create_edge(&self.manager, left_set, right_set);
                self.graph.create_edge(&self.manager, right_set, left_set);
            }
        }

        // Seed the DP table with the single-relation plans.
        for (i, relation) in self.relations.iter().enumerate() {
            let node = self.manager.get_relation(i as u64);
            self.plans.insert(
                node,
                JoinNode {
                    left: None,
                    right: None,
                    cardinality: relation.cardinality,
                    cost: 0,
                },
            );
        }

        // Enumerate connected subgraphs and complement pairs, starting each
        // round from one relation and excluding everything numbered below it.
        for i in (1..=self.relations.len()).rev() {
            let start = self.manager.get_relation((i - 1) as u64);
            self.emit_csg(start);
            let mut exclusion_set: HashSet<u64> = (0..(i as u64 - 1)).collect();
            self.enumerate_csg_recursive(start, &mut exclusion_set);
        }

        let total = self
            .manager
            .get_relation_set(0..self.relations.len() as u64);
        let Some(&best) = self.plans.get(&total) else {
            // No plan covers every relation: the graph is disconnected (pure
            // cross products). The caller keeps the original order.
            debug!("join graph is disconnected; keeping original join order");
            return Ok(None);
        };
        debug!(
            relations = self.relations.len(),
            cardinality = best.cardinality,
            cost = best.cost,
            "join order found"
        );

        let tree = self.build_tree(total);
        Ok(Some(JoinOrder {
            tree,
            relation_tables: self.relations.iter().map(|r| r.table_index).collect(),
        }))
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Walk down from `input_op`, recording base relations and candidate join
    /// predicates. Returns `false` on any reorder blocker.
    fn extract_join_relations(&mut self, input_op: &LogicalOperator) -> bool {
        let mut op = input_op;
        while op.children.len() == 1 {
            if op.kind() == OperatorKind::Filter {
                for f in &op.expressions {
                    if matches!(f, Expression::Comparison { .. }) {
                        self.filters.push(f.clone());
                    }
                }
            }
            op = &op.children[0];
        }
        match &op.data {
            OperatorData::Subquery { .. } | OperatorData::TableFunction { .. } => {
                // Reordering across these boundaries is not supported.
                return false;
            }
            OperatorData::Join { join_type } => {
                if *join_type != JoinType::Inner {
                    return false;
                }
                for f in &op.expressions {
                    if matches!(f, Expression::Comparison { .. }) {
                        self.filters.push(f.clone());
                    }
                }
            }
            _ => {}
        }
        match &op.data {
            OperatorData::Join { .. } | OperatorData::CrossProduct => {
                self.extract_join_relations(&op.children[0])
                    && self.extract_join_relations(&op.children[1])
            }
            OperatorData::Get { table_index, .. } => {
                let dense = self.relations.len() as u64;
                self.relation_mapping.insert(*table_index, dense);
                self.relations.push(Relation {
                    table_index: *table_index,
                    cardinality: input_op.estimate_cardinality(),
                });
                true
            }
            _ => false,
        }
    }

    /// Map every column reference in `expr` to its dense relation id.
    fn extract_relation_ids(
        &self,
        expr: &Expression,
        out: &mut HashSet<u64>,
    ) -> Result<(), OptimizerError> {
        let mut missing = None;
        expr.visit(&mut |e| {
            if let Expression::BoundColumnRef { binding, .. } = e {
                match self.relation_mapping.get(&binding.table_index) {
                    Some(&dense) => {
                        out.insert(dense);
                    }
                    None => missing = Some(*binding),
                }
            }
        });
        match missing {
            Some(binding) => Err(OptimizerError::BindingNotFound(binding)),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // DPccp enumeration
    // -----------------------------------------------------------------------

    fn emit_csg(&mut self, node: RelationSetRef) {
        // Exclude everything inside the subgraph and every relation numbered
        // below its smallest member.
        let members = &self.manager.get(node).relations;
        let mut exclusion_set: HashSet<u64> = (0..members[0]).collect();
        exclusion_set.extend(members.iter().copied());

        let mut neighbors = self.graph.neighbors(&self.manager, node, &exclusion_set);
        if neighbors.is_empty() {
            return;
        }
        neighbors.sort_unstable();
        for n in neighbors {
            let neighbor = self.manager.get_relation(n);
            // The neighbor list only carries each target's smallest member, so
            // the singleton may not itself be connected; check before emitting.
            if self.graph.is_connected(&self.manager, node, neighbor) {
                self.emit_pair(node, neighbor);
            }
            self.enumerate_cmp_recursive(node, neighbor, &exclusion_set);
        }
    }

    fn enumerate_cmp_recursive(
        &mut self,
        left: RelationSetRef,
        right: RelationSetRef,
        exclusion_set: &HashSet<u64>,
    ) {
        let neighbors = self.graph.neighbors(&self.manager, right, exclusion_set);
        if neighbors.is_empty() {
            return;
        }
        let mut exclusion_set = exclusion_set.clone();
        let mut union_sets = Vec::with_capacity(neighbors.len());
        for &n in &neighbors {
            let neighbor = self.manager.get_relation(n);
            let combined = self.manager.union(right, neighbor);
            if self.plans.contains_key(&combined)
                && self.graph.is_connected(&self.manager, left, combined)
            {
                self.emit_pair(left, combined);
            }
            union_sets.push(combined);
            exclusion_set.insert(n);
        }
        for combined in union_sets {
            self.enumerate_cmp_recursive(left, combined, &exclusion_set);
        }
    }

    fn enumerate_csg_recursive(&mut self, node: RelationSetRef, exclusion_set: &mut HashSet<u64>) {
        let neighbors = self.graph.neighbors(&self.manager, node, exclusion_set);
        if neighbors.is_empty() {
            return;
        }
        let mut union_sets = Vec::with_capacity(neighbors.len());
        for &n in &neighbors {
            let neighbor = self.manager.get_relation(n);
            let new_set = self.manager.union(node, neighbor);
            if self.plans.contains_key(&new_set) {
                self.emit_csg(new_set);
            }
            union_sets.push(new_set);
            exclusion_set.insert(n);
        }
        for new_set in union_sets {
            self.enumerate_csg_recursive(new_set, exclusion_set);
        }
    }

    fn emit_pair(&mut self, left: RelationSetRef, right: RelationSetRef) {
        let (Some(&left_plan), Some(&right_plan)) =
            (self.plans.get(&left), self.plans.get(&right))
        else {
            return;
        };
        let new_set = self.manager.union(left, right);
        let new_plan = Self::create_join_tree(left, left_plan, right, right_plan);
        let better = match self.plans.get(&new_set) {
            Some(existing) => new_plan.cost < existing.cost,
            None => true,
        };
        if better {
            trace!(
                set = %self.manager.get(new_set),
                cardinality = new_plan.cardinality,
                cost = new_plan.cost,
                "new best plan"
            );
            self.plans.insert(new_set, new_plan);
        }
    }

    /// Combine two DP entries into a join. The smaller-cardinality side goes
    /// on the right so the hash join builds on it; the result cardinality is
    /// the max of the inputs (foreign-key-join assumption).
    fn create_join_tree(
        left: RelationSetRef,
        left_plan: JoinNode,
        right: RelationSetRef,
        right_plan: JoinNode,
    ) -> JoinNode {
        if left_plan.cardinality < right_plan.cardinality {
            return Self::create_join_tree(right, right_plan, left, left_plan);
        }
        let cardinality = left_plan.cardinality.max(right_plan.cardinality);
        let cost = cardinality
            .saturating_add(left_plan.cost)
            .saturating_add(right_plan.cost);
        JoinNode {
            left: Some(left),
            right: Some(right),
            cardinality,
            cost,
        }
    }

    fn build_tree(&self, set: RelationSetRef) -> JoinTree {
        let node = self.plans[&set];
        match (node.left, node.right) {
            (Some(left), Some(right)) => JoinTree::Join {
                left: Box::new(self.build_tree(left)),
                right: Box::new(self.build_tree(right)),
                cardinality: node.cardinality,
                cost: node.cost,
            },
            _ => {
                let relation = self.manager.get(set).relations[0];
                JoinTree::Leaf {
                    relation,
                    table_index: self.relations[relation as usize].table_index,
                    cardinality: node.cardinality,
                }
            }
        }
    }
}

impl Default for JoinOrderOptimizer {
    fn default() -> Self {
        Self::new(JoinOrderConfig::default())
    }
}
