//! # Per-Binding Statistics
//!
//! Column statistics consumed by the compression pass (and, indirectly, by
//! the cost model through scan cardinalities). Statistics are advisory: a
//! missing or partial entry means "unknown" and disables compression for that
//! binding, never an error.
//!
//! The optimizer only *consumes* statistics -- collection is the host's
//! problem. What it does maintain is the map's consistency across rewrites:
//! when a compress projection re-bases a column, the old entry is dropped and
//! a derived entry (the compressed value range) is inserted under the new
//! binding, so downstream decisions keep seeing truthful summaries.

use crate::expr::ColumnBinding;
use crate::types::LogicalType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Summary of the values a column binding can take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistics {
    /// Numeric summary. `min_max` is inclusive; `None` means unknown bounds.
    /// The `ty` records which type the bounds are expressed in and must match
    /// the binding's output type.
    Numeric {
        ty: LogicalType,
        min_max: Option<(i128, i128)>,
    },
    /// String summary. `min`/`max` are the lexicographic extremes (possibly
    /// empty when unknown); `max_length` is the longest value in bytes.
    String {
        min: String,
        max: String,
        max_length: Option<u32>,
    },
}

impl Statistics {
    pub fn numeric(ty: LogicalType, min: i128, max: i128) -> Self {
        Statistics::Numeric {
            ty,
            min_max: Some((min, max)),
        }
    }

    pub fn numeric_unknown(ty: LogicalType) -> Self {
        Statistics::Numeric { ty, min_max: None }
    }

    pub fn string(min: impl Into<String>, max: impl Into<String>, max_length: u32) -> Self {
        Statistics::String {
            min: min.into(),
            max: max.into(),
            max_length: Some(max_length),
        }
    }

    /// The logical type these statistics describe.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Statistics::Numeric { ty, .. } => *ty,
            Statistics::String { .. } => LogicalType::Varchar,
        }
    }

    pub fn numeric_min_max(&self) -> Option<(i128, i128)> {
        match self {
            Statistics::Numeric { min_max, .. } => *min_max,
            Statistics::String { .. } => None,
        }
    }

    pub fn max_string_length(&self) -> Option<u32> {
        match self {
            Statistics::String { max_length, .. } => *max_length,
            Statistics::Numeric { .. } => None,
        }
    }
}

/// Map from column binding to its statistics.
///
/// Plain single-threaded map: the optimizer instance owns it for the duration
/// of one query and destroys it with itself.
pub type StatisticsMap = HashMap<ColumnBinding, Statistics>;
