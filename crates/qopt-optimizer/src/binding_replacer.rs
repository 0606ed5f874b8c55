//! # Column Binding Replacer
//!
//! When a rewrite re-bases columns under a new projection, every reference to
//! the old bindings elsewhere in the plan must follow. The replacer walks the
//! tree once, swaps matching column references to their new binding and type,
//! and refreshes the cached output types of every operator it passed (children
//! first, so pass-through operators pick up their children's new types).
//!
//! The `stop_projection_index` marks the freshly inserted projection by its
//! (globally unique) table index: the replacer refuses to enter it, so the
//! already-rewritten side of the plan is never touched again.

use qopt_plan::expr::{ColumnBinding, Expression};
use qopt_plan::operator::{LogicalOperator, OperatorData};
use qopt_plan::types::LogicalType;

/// One binding substitution.
#[derive(Debug, Clone, Copy)]
pub struct ReplacementBinding {
    pub old_binding: ColumnBinding,
    pub new_binding: ColumnBinding,
    pub new_type: LogicalType,
}

/// Single-pass, in-place binding rewriter.
#[derive(Debug, Default)]
pub struct ColumnBindingReplacer {
    pub replacement_bindings: Vec<ReplacementBinding>,
    /// Table index of the projection below which the walk must not descend.
    pub stop_projection_index: Option<u32>,
}

impl ColumnBindingReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit_operator(&self, op: &mut LogicalOperator) {
        if let (Some(stop), OperatorData::Projection { table_index }) =
            (self.stop_projection_index, &op.data)
        {
            if *table_index == stop {
                return;
            }
        }
        for child in &mut op.children {
            self.visit_operator(child);
        }
        op.visit_expressions_mut(&mut |expr| {
            expr.visit_mut(&mut |e| {
                if let Expression::BoundColumnRef {
                    binding,
                    return_type,
                } = e
                {
                    for replacement in &self.replacement_bindings {
                        if *binding == replacement.old_binding {
                            *binding = replacement.new_binding;
                            *return_type = replacement.new_type;
                        }
                    }
                }
            });
        });
        op.refresh_types();
    }
}
