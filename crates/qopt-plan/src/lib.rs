//! # qopt-plan: Logical Plan Model
//!
//! This crate defines the data structures the qopt optimizer passes operate
//! on. It is the vocabulary shared between the optimizer and its host (the
//! query planner of the surrounding engine).
//!
//! ## Module Overview
//!
//! - **`operator`**: The mutable logical operator tree -- node kinds, owned
//!   children, expression slots, output bindings and cached types, cardinality
//!   estimation, and the table-index allocator.
//! - **`expr`**: Column bindings, scalar values, and the owned expression tree
//!   (column references, constants, function calls, comparisons).
//! - **`types`**: The logical type vocabulary with the width/signedness
//!   predicates compression decisions are made from.
//! - **`stats`**: Per-binding statistics summaries and the statistics map.
//! - **`functions`**: The compress/decompress/subtract scalar-function family
//!   with evaluation semantics for constant folding and tests.

pub mod expr;
pub mod functions;
pub mod operator;
pub mod stats;
pub mod types;
