//! # qopt-optimizer: Plan Optimization Passes
//!
//! The two optimization passes of the qopt core, each a single-threaded,
//! per-query instance over a [`qopt_plan`] operator tree:
//!
//! - **Join ordering** ([`join_order`]): extracts the joinable relations and
//!   predicates from a subtree of inner joins and cross products, builds a
//!   join graph, and runs the DPccp dynamic program to find the cheapest join
//!   tree under a max-cardinality cost model. Analysis only -- the caller
//!   materializes the reordered plan from the returned [`join_order::JoinOrder`].
//! - **Compressed materialization** ([`compressed_materialization`]): rewrites
//!   the plan in place, narrowing the columns that flow into materializing
//!   operators (aggregate, distinct, order-by) and removing redundant
//!   decompress/compress round-trips afterwards.
//!
//! ## Module Overview
//!
//! - **`relation_set`**: Interned relation sets with identity comparison.
//! - **`query_graph`**: The hyperedge trie and connectivity queries.
//! - **`join_order`**: Extraction, DPccp enumeration, and the cost model.
//! - **`binding_replacer`**: Single-pass column-binding rewriter.
//! - **`compressed_materialization`**: The compress/decompress rewriter.
//! - **`error`**: The optimizer error type.

pub mod binding_replacer;
pub mod compressed_materialization;
pub mod error;
pub mod join_order;
pub mod query_graph;
pub mod relation_set;

pub use compressed_materialization::CompressedMaterialization;
pub use error::OptimizerError;
pub use join_order::{JoinOrder, JoinOrderConfig, JoinOrderOptimizer, JoinTree};
