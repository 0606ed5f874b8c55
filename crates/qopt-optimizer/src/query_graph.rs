//! # Query Graph
//!
//! The hyperedge set of the join graph. Edges are stored in a trie of the
//! same shape as the relation-set trie: walking the sorted ids of a set
//! descends the trie, and every node passed on the way carries the neighbor
//! lists of the id-prefix it represents. An edge is inserted in both
//! directions for every promoted join predicate, so connectivity queries can
//! always start from the side they hold.

use crate::relation_set::{RelationSetManager, RelationSetRef};
use std::collections::{HashMap, HashSet};
use tracing::trace;

#[derive(Default)]
struct EdgeInfo {
    neighbors: Vec<RelationSetRef>,
    children: HashMap<u64, EdgeInfo>,
}

/// Edge trie over interned relation sets.
#[derive(Default)]
pub struct QueryGraph {
    root: EdgeInfo,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directed edge `left -> right`. Callers insert both directions
    /// per join predicate.
    pub fn create_edge(&mut self, manager: &RelationSetManager, left: RelationSetRef, right: RelationSetRef) {
        trace!(
            left = %manager.get(left),
            right = %manager.get(right),
            "join graph edge"
        );
        let mut node = &mut self.root;
        for &rel in &manager.get(left).relations {
            node = node.children.entry(rel).or_default();
        }
        node.neighbors.push(right);
    }

    /// Walk the trie along each prefix of `set`'s sorted ids, yielding every
    /// neighbor stored on the way. Stops early when the callback returns
    /// `true` or a prefix has no continuation.
    fn enumerate_neighbors<F: FnMut(RelationSetRef) -> bool>(
        &self,
        manager: &RelationSetManager,
        set: RelationSetRef,
        mut callback: F,
    ) {
        let mut node = &self.root;
        for &rel in &manager.get(set).relations {
            match node.children.get(&rel) {
                Some(child) => {
                    for &neighbor in &child.neighbors {
                        if callback(neighbor) {
                            return;
                        }
                    }
                    node = child;
                }
                None => return,
            }
        }
    }

    /// The representative neighbors of `set` under an exclusion set: the
    /// smallest member of every edge target that shares no relation with
    /// `exclusion_set`.
    pub fn neighbors(
        &self,
        manager: &RelationSetManager,
        set: RelationSetRef,
        exclusion_set: &HashSet<u64>,
    ) -> Vec<u64> {
        let mut result = Vec::new();
        self.enumerate_neighbors(manager, set, |neighbor| {
            let members = &manager.get(neighbor).relations;
            if !members.iter().any(|r| exclusion_set.contains(r)) {
                result.push(members[0]);
            }
            false
        });
        result
    }

    /// True iff some edge of `set` points at a subset of `other`.
    pub fn is_connected(
        &self,
        manager: &RelationSetManager,
        set: RelationSetRef,
        other: RelationSetRef,
    ) -> bool {
        let mut connected = false;
        self.enumerate_neighbors(manager, set, |neighbor| {
            if manager.get(other).is_subset(manager.get(neighbor)) {
                connected = true;
                return true;
            }
            false
        });
        connected
    }
}
