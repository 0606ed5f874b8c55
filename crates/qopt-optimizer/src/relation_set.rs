//! # Interned Relation Sets
//!
//! The DP table, the edge trie, and the enumerator all talk about sets of
//! base relations. Sets are interned: a trie keyed by the sorted relation-id
//! sequence guarantees each membership exists exactly once, and every user
//! addresses it through a copyable [`RelationSetRef`]. Identity comparison of
//! two refs replaces deep set comparison everywhere -- same membership, same
//! ref.
//!
//! The canonical sets live in an arena owned by the manager, so refs stay
//! valid for the lifetime of the optimizer instance that created them.

use std::collections::HashMap;
use std::fmt;

/// Handle to an interned relation set. Equality is set identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationSetRef(u32);

/// A sorted, deduplicated set of dense relation ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSet {
    pub relations: Vec<u64>,
}

impl RelationSet {
    pub fn count(&self) -> usize {
        self.relations.len()
    }

    /// True iff `sub` is a subset of `self`. Both sides are sorted, so a
    /// single merge-style scan suffices.
    pub fn is_subset(&self, sub: &RelationSet) -> bool {
        if sub.relations.len() > self.relations.len() {
            return false;
        }
        let mut j = 0;
        for &rel in &self.relations {
            if j == sub.relations.len() {
                break;
            }
            if sub.relations[j] == rel {
                j += 1;
            }
        }
        j == sub.relations.len()
    }
}

impl fmt::Display for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, rel) in self.relations.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", rel)?;
        }
        write!(f, "]")
    }
}

#[derive(Default)]
struct TrieNode {
    set: Option<RelationSetRef>,
    children: HashMap<u64, TrieNode>,
}

/// Interns relation sets; owns the canonical copies.
#[derive(Default)]
pub struct RelationSetManager {
    root: TrieNode,
    sets: Vec<RelationSet>,
}

impl RelationSetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, set: RelationSetRef) -> &RelationSet {
        &self.sets[set.0 as usize]
    }

    /// Intern a sorted, deduplicated id sequence.
    fn get_relation_sorted(&mut self, relations: Vec<u64>) -> RelationSetRef {
        let mut node = &mut self.root;
        for &rel in &relations {
            node = node.children.entry(rel).or_default();
        }
        if let Some(existing) = node.set {
            return existing;
        }
        let set_ref = RelationSetRef(self.sets.len() as u32);
        self.sets.push(RelationSet { relations });
        node.set = Some(set_ref);
        set_ref
    }

    /// Intern the singleton `{index}`.
    pub fn get_relation(&mut self, index: u64) -> RelationSetRef {
        self.get_relation_sorted(vec![index])
    }

    /// Intern an arbitrary collection of ids (sorted and deduplicated here).
    pub fn get_relation_set(&mut self, relations: impl IntoIterator<Item = u64>) -> RelationSetRef {
        let mut sorted: Vec<u64> = relations.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();
        debug_assert!(!sorted.is_empty());
        self.get_relation_sorted(sorted)
    }

    /// Intern the union of two interned sets (two-pointer merge of the sorted
    /// members, duplicates collapsed).
    pub fn union(&mut self, left: RelationSetRef, right: RelationSetRef) -> RelationSetRef {
        let (l, r) = (&self.sets[left.0 as usize], &self.sets[right.0 as usize]);
        let mut merged = Vec::with_capacity(l.relations.len() + r.relations.len());
        let (mut i, mut j) = (0, 0);
        while i < l.relations.len() && j < r.relations.len() {
            if l.relations[i] == r.relations[j] {
                merged.push(l.relations[i]);
                i += 1;
                j += 1;
            } else if l.relations[i] < r.relations[j] {
                merged.push(l.relations[i]);
                i += 1;
            } else {
                merged.push(r.relations[j]);
                j += 1;
            }
        }
        merged.extend_from_slice(&l.relations[i..]);
        merged.extend_from_slice(&r.relations[j..]);
        self.get_relation_sorted(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_by_membership() {
        let mut mgr = RelationSetManager::new();
        let a = mgr.get_relation_set([2, 0, 1]);
        let b = mgr.get_relation_set([0, 1, 2]);
        let c = mgr.get_relation_set([0, 1]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(mgr.get(a).relations, vec![0, 1, 2]);
    }

    #[test]
    fn test_union_dedups_and_interns() {
        let mut mgr = RelationSetManager::new();
        let ab = mgr.get_relation_set([0, 1]);
        let bc = mgr.get_relation_set([1, 2]);
        let abc = mgr.union(ab, bc);
        assert_eq!(mgr.get(abc).relations, vec![0, 1, 2]);
        let direct = mgr.get_relation_set([0, 1, 2]);
        assert_eq!(abc, direct);
    }

    #[test]
    fn test_subset() {
        let sup = RelationSet {
            relations: vec![0, 2, 5, 7],
        };
        let sub = RelationSet {
            relations: vec![2, 7],
        };
        let not_sub = RelationSet {
            relations: vec![2, 6],
        };
        assert!(sup.is_subset(&sub));
        assert!(!sup.is_subset(&not_sub));
        assert!(sup.is_subset(&sup.clone()));
    }
}
