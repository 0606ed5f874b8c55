//! # Optimizer Errors
//!
//! Only genuinely broken invariants surface as errors; everything the
//! optimizer can decline gracefully is a non-error outcome. Unsupported plan
//! shapes make the join pass return `None` (input untouched), and arithmetic
//! overflow during range evaluation downgrades a column to "do not compress".
//! What remains is internal breakage -- the host reacts by discarding the
//! optimization attempt and keeping its unrewritten plan.

use qopt_plan::expr::ColumnBinding;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptimizerError {
    /// An invariant of the plan or the statistics map is broken (e.g. a
    /// statistics entry whose type contradicts the binding's output type).
    #[error("internal optimizer error: {0}")]
    Internal(String),

    /// A column reference resolved to no known producer. Always a bug in the
    /// caller or in a previous rewrite, never a data-dependent condition.
    #[error("column binding {0} not found")]
    BindingNotFound(ColumnBinding),
}
