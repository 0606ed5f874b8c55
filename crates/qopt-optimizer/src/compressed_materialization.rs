//! # Compressed Materialization
//!
//! Materializing operators (hash aggregate, distinct, order-by) buffer their
//! entire input. This pass narrows the buffered representation: below each
//! such operator it plants a *compress* projection that maps eligible columns
//! onto smaller types (integers re-based to their value range, short strings
//! packed into fixed-width slots), and above it a *decompress* projection that
//! restores the original types for the rest of the plan.
//!
//! Eligibility is purely statistics-driven: a column compresses only when the
//! statistics map proves a narrower representation is lossless, and a column
//! consumed by a non-trivial expression of the materializing operator itself
//! is preserved as-is. Columns without usable statistics pass through
//! untouched -- missing information is never an error.
//!
//! A final bottom-up sweep removes redundant round-trips: a decompress whose
//! value travels only through *transparent* operators (pass-through
//! projections, joins that do not inspect it, filters that do not test it,
//! limits) into a matching compress is cut out on both ends, so the column
//! stays narrow across the stretch in between.
//!
//! Rewrites are local and atomic: a step either installs its projection into
//! the parent slot and then re-points the references, or leaves the plan
//! exactly as it was.

use crate::binding_replacer::{ColumnBindingReplacer, ReplacementBinding};
use crate::error::OptimizerError;
use qopt_plan::expr::{ColumnBinding, Expression, ScalarValue};
use qopt_plan::functions;
use qopt_plan::operator::{LogicalOperator, OperatorData, OperatorKind, TableIndexAllocator};
use qopt_plan::stats::{Statistics, StatisticsMap};
use qopt_plan::types::LogicalType;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-child bookkeeping for one materializing operator.
struct ChildInfo {
    bindings_before: Vec<ColumnBinding>,
    types: Vec<LogicalType>,
    can_compress: Vec<bool>,
    bindings_after: Vec<ColumnBinding>,
}

impl ChildInfo {
    fn new(child: &LogicalOperator, referenced_bindings: &HashSet<ColumnBinding>) -> Self {
        let bindings_before = child.column_bindings();
        let can_compress = bindings_before
            .iter()
            .map(|b| !referenced_bindings.contains(b))
            .collect();
        Self {
            bindings_before,
            types: child.types.clone(),
            can_compress,
            bindings_after: Vec::new(),
        }
    }
}

/// Tracks one column through the materializing operator: which output binding
/// carries it, its original type, and whether the output needs decompression.
struct BindingInfo {
    binding: ColumnBinding,
    ty: LogicalType,
    needs_decompression: bool,
    stats: Option<Statistics>,
}

/// All bookkeeping for compressing one materializing operator.
struct MaterializationInfo {
    child_idxs: Vec<usize>,
    child_info: Vec<ChildInfo>,
    /// Keyed by the child (input) binding feeding the materializing operator.
    binding_map: HashMap<ColumnBinding, BindingInfo>,
}

impl MaterializationInfo {
    fn new(
        op: &LogicalOperator,
        child_idxs: Vec<usize>,
        referenced_bindings: &HashSet<ColumnBinding>,
    ) -> Self {
        let child_info = child_idxs
            .iter()
            .map(|&idx| ChildInfo::new(&op.children[idx], referenced_bindings))
            .collect();
        Self {
            child_idxs,
            child_info,
            binding_map: HashMap::new(),
        }
    }
}

/// A compress projection entry: the expression plus the statistics the
/// projected column will carry.
struct CompressExpr {
    expression: Expression,
    stats: Option<Statistics>,
}

/// Per-query compressed-materialization rewriter.
pub struct CompressedMaterialization<'a> {
    allocator: &'a mut TableIndexAllocator,
    statistics_map: StatisticsMap,
    compression_table_indices: HashSet<u32>,
    decompression_table_indices: HashSet<u32>,
}

impl<'a> CompressedMaterialization<'a> {
    pub fn new(allocator: &'a mut TableIndexAllocator, statistics_map: StatisticsMap) -> Self {
        Self {
            allocator,
            statistics_map,
            compression_table_indices: HashSet::new(),
            decompression_table_indices: HashSet::new(),
        }
    }

    /// The statistics map as maintained across all rewrites, for callers that
    /// want to keep using it after the pass.
    pub fn into_statistics_map(self) -> StatisticsMap {
        self.statistics_map
    }

    /// Rewrite the plan in place.
    pub fn compress(&mut self, op: &mut LogicalOperator) -> Result<(), OptimizerError> {
        op.resolve_operator_types();
        let mut path = Vec::new();
        self.compress_internal(op, &mut path)?;
        self.remove_redundant_expressions(op);
        Ok(())
    }

    /// Post-order traversal; `path` addresses the current node from the plan
    /// root so rewrites can always re-point references starting at the root.
    fn compress_internal(
        &mut self,
        root: &mut LogicalOperator,
        path: &mut Vec<usize>,
    ) -> Result<(), OptimizerError> {
        if is_top_n(node_at(root, path)) {
            // A limit directly above an order-by belongs to the Top-N
            // optimizer; continue below the sort.
            path.push(0);
            path.push(0);
            self.compress_internal(root, path)?;
            path.pop();
            path.pop();
            return Ok(());
        }

        let child_count = node_at(root, path).children.len();
        for i in 0..child_count {
            path.push(i);
            self.compress_internal(root, path)?;
            path.pop();
        }

        match node_at(root, path).kind() {
            OperatorKind::Aggregate => self.compress_aggregate(root, path),
            OperatorKind::Distinct => self.compress_distinct(root, path),
            OperatorKind::Order => self.compress_order(root, path),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Per-operator drivers
    // -----------------------------------------------------------------------

    fn compress_aggregate(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
    ) -> Result<(), OptimizerError> {
        let op = node_at(root, path);
        let OperatorData::Aggregate { groups, .. } = &op.data else {
            return Ok(());
        };

        // Columns consumed by aggregate computations, or by group expressions
        // that are more than a bare column reference, must keep their type.
        let mut referenced_bindings = HashSet::new();
        for aggregate in &op.expressions {
            aggregate.referenced_bindings(&mut referenced_bindings);
        }
        for group in groups {
            if !group.is_column_ref() {
                group.referenced_bindings(&mut referenced_bindings);
            }
        }

        let mut info = MaterializationInfo::new(op, vec![0], &referenced_bindings);
        let bindings_out = op.column_bindings();
        for (group_idx, group) in groups.iter().enumerate() {
            if let Expression::BoundColumnRef {
                binding,
                return_type,
            } = group
            {
                info.binding_map.insert(
                    *binding,
                    BindingInfo {
                        binding: bindings_out[group_idx],
                        ty: *return_type,
                        needs_decompression: false,
                        stats: None,
                    },
                );
            }
        }

        self.create_projections(root, path, info)
    }

    fn compress_distinct(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
    ) -> Result<(), OptimizerError> {
        let op = node_at(root, path);
        let OperatorData::Distinct { targets } = &op.data else {
            return Ok(());
        };

        let mut referenced_bindings = HashSet::new();
        for target in targets {
            if !target.is_column_ref() {
                target.referenced_bindings(&mut referenced_bindings);
            }
        }

        let mut info = MaterializationInfo::new(op, vec![0], &referenced_bindings);
        self.map_passthrough_bindings(&mut info);
        self.create_projections(root, path, info)
    }

    fn compress_order(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
    ) -> Result<(), OptimizerError> {
        let op = node_at(root, path);
        let OperatorData::Order { orders } = &op.data else {
            return Ok(());
        };

        let mut referenced_bindings = HashSet::new();
        for order in orders {
            if !order.expression.is_column_ref() {
                order.expression.referenced_bindings(&mut referenced_bindings);
            }
        }

        let mut info = MaterializationInfo::new(op, vec![0], &referenced_bindings);
        self.map_passthrough_bindings(&mut info);
        self.create_projections(root, path, info)
    }

    /// For pass-through materializers (distinct, order-by) every child column
    /// reappears unchanged in the output, under the same binding.
    fn map_passthrough_bindings(&self, info: &mut MaterializationInfo) {
        let child_info = &info.child_info[0];
        let entries: Vec<_> = child_info
            .bindings_before
            .iter()
            .zip(child_info.types.iter())
            .map(|(&binding, &ty)| (binding, ty))
            .collect();
        for (binding, ty) in entries {
            info.binding_map.insert(
                binding,
                BindingInfo {
                    binding,
                    ty,
                    needs_decompression: false,
                    stats: None,
                },
            );
        }
    }

    // -----------------------------------------------------------------------
    // Projection insertion
    // -----------------------------------------------------------------------

    fn create_projections(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
        mut info: MaterializationInfo,
    ) -> Result<(), OptimizerError> {
        let mut compressed_anything = false;
        for i in 0..info.child_idxs.len() {
            let mut compress_exprs = Vec::new();
            if self.try_compress_child(&mut info, i, &mut compress_exprs)? {
                let child_idx = info.child_idxs[i];
                self.create_compress_projection(root, path, child_idx, compress_exprs, &mut info, i)?;
                compressed_anything = true;
            }
        }
        if compressed_anything {
            self.create_decompress_projection(root, path, &info)?;
        }
        Ok(())
    }

    /// Build one compress entry per output column of the child. Returns
    /// whether anything actually compressed; if not, no projection is made.
    fn try_compress_child(
        &mut self,
        info: &mut MaterializationInfo,
        child_i: usize,
        compress_exprs: &mut Vec<CompressExpr>,
    ) -> Result<bool, OptimizerError> {
        let child_info = &info.child_info[child_i];
        let mut compressed_anything = false;
        let mut updates = Vec::with_capacity(child_info.bindings_before.len());
        for i in 0..child_info.bindings_before.len() {
            let binding = child_info.bindings_before[i];
            let ty = child_info.types[i];
            let can_compress = child_info.can_compress[i];
            let compress_expr = self.get_compress_expression(binding, ty, can_compress)?;
            let compressed = compress_expr.is_some();
            match compress_expr {
                Some(expr) => compress_exprs.push(expr),
                None => compress_exprs.push(CompressExpr {
                    expression: Expression::column_ref(binding, ty),
                    stats: self.statistics_map.get(&binding).cloned(),
                }),
            }
            updates.push((binding, compressed));
            compressed_anything |= compressed;
        }
        for (binding, compressed) in updates {
            self.update_binding_info(info, binding, compressed);
        }
        Ok(compressed_anything)
    }

    fn update_binding_info(
        &self,
        info: &mut MaterializationInfo,
        binding: ColumnBinding,
        needs_decompression: bool,
    ) {
        if let Some(binding_info) = info.binding_map.get_mut(&binding) {
            binding_info.needs_decompression = needs_decompression;
            if let Some(stats) = self.statistics_map.get(&binding) {
                binding_info.stats = Some(stats.clone());
            }
        }
    }

    /// Wrap the materializing operator's child in a compress projection and
    /// re-point every reference in the rest of the plan.
    fn create_compress_projection(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
        child_idx: usize,
        compress_exprs: Vec<CompressExpr>,
        info: &mut MaterializationInfo,
        child_i: usize,
    ) -> Result<(), OptimizerError> {
        let table_index = self.allocator.allocate();
        let mut projections = Vec::with_capacity(compress_exprs.len());
        let mut projection_stats = Vec::with_capacity(compress_exprs.len());
        for entry in compress_exprs {
            projections.push(entry.expression);
            projection_stats.push(entry.stats);
        }

        let (bindings_after, new_types) = {
            let materializing_op = node_at_mut(root, path);
            let child = take_operator(&mut materializing_op.children[child_idx]);
            let mut compress_projection =
                LogicalOperator::projection(table_index, projections, child);
            compress_projection.refresh_types();
            materializing_op.children[child_idx] = compress_projection;
            let child_op = &materializing_op.children[child_idx];
            (child_op.column_bindings(), child_op.types.clone())
        };
        self.compression_table_indices.insert(table_index);
        debug!(table_index, "inserted compress projection");

        let child_info = &mut info.child_info[child_i];
        child_info.bindings_after = bindings_after.clone();

        let mut replacer = ColumnBindingReplacer::new();
        for col_idx in 0..child_info.bindings_before.len() {
            let old_binding = child_info.bindings_before[col_idx];
            replacer.replacement_bindings.push(ReplacementBinding {
                old_binding,
                new_binding: bindings_after[col_idx],
                new_type: new_types[col_idx],
            });
            self.statistics_map.remove(&old_binding);
        }
        // The compressed side itself must not be rewritten again.
        replacer.stop_projection_index = Some(table_index);
        replacer.visit_operator(root);

        // Re-key the binding map to the projection's fresh bindings.
        for replacement in &replacer.replacement_bindings {
            if let Some(mut binding_info) = info.binding_map.remove(&replacement.old_binding) {
                if binding_info.binding == replacement.old_binding {
                    binding_info.binding = replacement.new_binding;
                }
                info.binding_map
                    .insert(replacement.new_binding, binding_info);
            }
        }

        for (col_idx, stats) in projection_stats.into_iter().enumerate() {
            if let Some(stats) = stats {
                self.statistics_map.insert(bindings_after[col_idx], stats);
            }
        }
        Ok(())
    }

    /// Wrap the materializing operator in a decompress projection restoring
    /// the original types, and re-point the plan above it.
    fn create_decompress_projection(
        &mut self,
        root: &mut LogicalOperator,
        path: &[usize],
        info: &MaterializationInfo,
    ) -> Result<(), OptimizerError> {
        let (bindings, types) = {
            let op = node_at(root, path);
            (op.column_bindings(), op.types.clone())
        };

        let mut decompress_exprs = Vec::with_capacity(bindings.len());
        let mut statistics: Vec<Option<Statistics>> = Vec::with_capacity(bindings.len());
        for (col_idx, binding) in bindings.iter().enumerate() {
            let mut expr = Expression::column_ref(*binding, types[col_idx]);
            let mut column_stats = None;
            for binding_info in info.binding_map.values() {
                if binding_info.binding != *binding {
                    continue;
                }
                column_stats = binding_info.stats.clone();
                if binding_info.needs_decompression {
                    let stats = binding_info.stats.as_ref().ok_or_else(|| {
                        OptimizerError::Internal(format!(
                            "no statistics for decompression of {binding}"
                        ))
                    })?;
                    expr = get_decompress_expression(expr, binding_info.ty, stats)?;
                }
            }
            statistics.push(column_stats);
            decompress_exprs.push(expr);
        }

        let table_index = self.allocator.allocate();
        {
            let slot = node_at_mut(root, path);
            let inner = take_operator(slot);
            let mut decompress_projection =
                LogicalOperator::projection(table_index, decompress_exprs, inner);
            decompress_projection.refresh_types();
            *slot = decompress_projection;
        }
        self.decompression_table_indices.insert(table_index);
        debug!(table_index, "inserted decompress projection");

        if path.is_empty() {
            // The materializing operator was the root; the decompress
            // projection is the new root and nothing references it yet.
            return Ok(());
        }

        let (new_bindings, new_types) = {
            let projection = node_at(root, path);
            (projection.column_bindings(), projection.types.clone())
        };
        let mut replacer = ColumnBindingReplacer::new();
        for col_idx in 0..bindings.len() {
            replacer.replacement_bindings.push(ReplacementBinding {
                old_binding: bindings[col_idx],
                new_binding: new_bindings[col_idx],
                new_type: new_types[col_idx],
            });
            if let Some(stats) = &statistics[col_idx] {
                self.statistics_map
                    .insert(new_bindings[col_idx], stats.clone());
            }
        }
        replacer.stop_projection_index = Some(table_index);
        replacer.visit_operator(root);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Compression decisions
    // -----------------------------------------------------------------------

    fn get_compress_expression(
        &self,
        binding: ColumnBinding,
        ty: LogicalType,
        can_compress: bool,
    ) -> Result<Option<CompressExpr>, OptimizerError> {
        if !can_compress {
            return Ok(None);
        }
        let Some(stats) = self.statistics_map.get(&binding) else {
            return Ok(None);
        };
        if stats.logical_type() != ty {
            return Err(OptimizerError::Internal(format!(
                "statistics type mismatch for {binding}: {} vs {}",
                stats.logical_type(),
                ty
            )));
        }
        let input = Expression::column_ref(binding, ty);
        if ty.is_integral() {
            Ok(get_integral_compress(input, stats))
        } else if ty == LogicalType::Varchar {
            Ok(get_string_compress(input, stats))
        } else {
            Ok(None)
        }
    }

    // -----------------------------------------------------------------------
    // Redundant-pair elimination
    // -----------------------------------------------------------------------

    fn remove_redundant_expressions(&self, op: &mut LogicalOperator) {
        if self.compression_table_indices.is_empty() || self.decompression_table_indices.is_empty()
        {
            return;
        }
        self.remove_redundant_recursive(op);
    }

    fn remove_redundant_recursive(&self, op: &mut LogicalOperator) {
        for child in &mut op.children {
            self.remove_redundant_recursive(child);
        }
        let OperatorData::Projection { table_index } = &op.data else {
            return;
        };
        if !self.compression_table_indices.contains(table_index) {
            return;
        }
        let Some(decompression_depth) = self.find_decompression_depth(op) else {
            return;
        };
        self.eliminate_redundant_pairs(op, decompression_depth);
    }

    /// Descend the 0th-child chain from a compress projection through the
    /// transparent operators, looking for one of our decompress projections.
    /// Returns the chain depth of the decompression if found.
    fn find_decompression_depth(&self, compression: &LogicalOperator) -> Option<usize> {
        let mut current = &compression.children[0];
        let mut depth = 1;
        loop {
            match &current.data {
                OperatorData::Projection { table_index } => {
                    if self.decompression_table_indices.contains(table_index) {
                        return Some(depth);
                    }
                }
                OperatorData::ComparisonJoin { .. }
                | OperatorData::AnyJoin { .. }
                | OperatorData::DelimJoin { .. }
                | OperatorData::Filter
                | OperatorData::Limit { .. } => {}
                _ => return None,
            }
            if current.children.is_empty() {
                return None;
            }
            current = &current.children[0];
            depth += 1;
        }
    }

    /// For every decompressed column that travels untouched from the
    /// decompression up to this compression, drop the round-trip and keep the
    /// column compressed along the stretch.
    fn eliminate_redundant_pairs(&self, compression: &mut LogicalOperator, decompression_depth: usize) {
        let decompress_bindings = chain_child(compression, decompression_depth).column_bindings();
        let column_count = chain_child(compression, decompression_depth).expressions.len();

        for col_idx in 0..column_count {
            if !matches!(
                chain_child(compression, decompression_depth).expressions[col_idx],
                Expression::BoundFunction { .. }
            ) {
                continue;
            }

            // Track the binding bottom-up through the in-between operators.
            let mut current_binding = decompress_bindings[col_idx];
            let mut current_col_idx = col_idx;
            let mut expressions_in_between: Vec<(usize, usize)> = Vec::new();
            let mut can_remove = true;
            for depth in (1..decompression_depth).rev() {
                let op = chain_child(compression, depth);
                match op.kind() {
                    OperatorKind::Projection => {
                        can_remove = check_projection(
                            op,
                            &mut current_binding,
                            &mut current_col_idx,
                            &mut expressions_in_between,
                            depth,
                        );
                    }
                    OperatorKind::ComparisonJoin => {
                        can_remove = check_comparison_join(op, &current_binding);
                    }
                    OperatorKind::Filter => {
                        can_remove = check_filter(op, &current_binding, &mut current_col_idx);
                    }
                    _ => {}
                }
                if !can_remove {
                    break;
                }
            }
            if !can_remove || current_col_idx >= compression.expressions.len() {
                continue;
            }

            // The column must land in a compress function whose types (and,
            // for integrals, whose range minimum) mirror the decompression.
            let decompression = chain_child(compression, decompression_depth);
            let (decompress_ret, decompress_args) =
                match &decompression.expressions[col_idx] {
                    Expression::BoundFunction {
                        return_type,
                        arguments,
                        ..
                    } => (*return_type, arguments),
                    _ => continue,
                };
            let (compress_ret, compress_args) = match &compression.expressions[current_col_idx] {
                Expression::BoundFunction {
                    return_type,
                    arguments,
                    ..
                } => (*return_type, arguments),
                _ => continue,
            };
            match &compress_args[0] {
                Expression::BoundColumnRef { binding, .. } if *binding == current_binding => {}
                _ => continue,
            }
            if decompress_args[0].return_type() != compress_ret {
                continue;
            }
            debug_assert_eq!(decompress_ret, compress_args[0].return_type());
            if decompress_ret.is_integral() && !min_constants_match(decompress_args, compress_args)
            {
                continue;
            }

            // Replace the decompress by its argument so the column stays
            // compressed.
            let compressed_type = decompress_args[0].return_type();
            let decompression = chain_child_mut(compression, decompression_depth);
            let Expression::BoundFunction { arguments, .. } =
                &mut decompression.expressions[col_idx]
            else {
                continue;
            };
            let argument = arguments.remove(0);
            decompression.expressions[col_idx] = argument;

            // Every bare reference along the chain now carries the compressed
            // type.
            for &(depth, expr_idx) in &expressions_in_between {
                let op = chain_child_mut(compression, depth);
                if let Expression::BoundColumnRef { return_type, .. } =
                    &mut op.expressions[expr_idx]
                {
                    *return_type = compressed_type;
                }
            }

            // And the compress collapses to its (already compressed) input.
            let Expression::BoundFunction { arguments, .. } =
                &mut compression.expressions[current_col_idx]
            else {
                continue;
            };
            let mut argument = arguments.remove(0);
            set_return_type(&mut argument, compressed_type);
            compression.expressions[current_col_idx] = argument;
            debug!(column = col_idx, "eliminated redundant decompress/compress pair");

            // Refresh the cached types along the rewritten stretch.
            for depth in (1..=decompression_depth).rev() {
                chain_child_mut(compression, depth).refresh_types();
            }
            compression.refresh_types();
        }
    }
}

// ---------------------------------------------------------------------------
// Chain checks for redundant-pair elimination
// ---------------------------------------------------------------------------

fn check_projection(
    op: &LogicalOperator,
    current_binding: &mut ColumnBinding,
    current_col_idx: &mut usize,
    expressions_in_between: &mut Vec<(usize, usize)>,
    depth: usize,
) -> bool {
    // Any computation over the column pins its type; only a bare reference
    // may pass it along, and only once.
    for expr in &op.expressions {
        if !expr.is_column_ref() && expr.uses_binding(current_binding) {
            return false;
        }
    }
    let current_bindings = op.column_bindings();
    let target = *current_binding;
    let mut found = false;
    for (expr_idx, expr) in op.expressions.iter().enumerate() {
        let Expression::BoundColumnRef { binding, .. } = expr else {
            continue;
        };
        if *binding == target {
            if found {
                return false;
            }
            *current_col_idx = expr_idx;
            *current_binding = current_bindings[expr_idx];
            expressions_in_between.push((depth, expr_idx));
            found = true;
        }
    }
    found
}

fn check_comparison_join(op: &LogicalOperator, current_binding: &ColumnBinding) -> bool {
    let OperatorData::ComparisonJoin {
        conditions,
        left_projection_map,
        ..
    } = &op.data
    else {
        return false;
    };
    if !left_projection_map.is_empty() {
        return false;
    }
    for condition in conditions {
        if condition.left.uses_binding(current_binding) {
            return false;
        }
    }
    true
}

fn check_filter(
    op: &LogicalOperator,
    current_binding: &ColumnBinding,
    current_col_idx: &mut usize,
) -> bool {
    for expr in &op.expressions {
        if expr.uses_binding(current_binding) {
            return false;
        }
    }
    let current_bindings = op.column_bindings();
    match current_bindings.iter().position(|b| b == current_binding) {
        Some(idx) => {
            *current_col_idx = idx;
            true
        }
        None => false,
    }
}

fn min_constants_match(decompress_args: &[Expression], compress_args: &[Expression]) -> bool {
    match (decompress_args.get(1), compress_args.get(1)) {
        (
            Some(Expression::BoundConstant { value: d }),
            Some(Expression::BoundConstant { value: c }),
        ) => d == c,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Compression decisions
// ---------------------------------------------------------------------------

fn get_integral_compress(input: Expression, stats: &Statistics) -> Option<CompressExpr> {
    let ty = input.return_type();
    if ty.byte_width() == 1 {
        return None;
    }
    let (min, max) = stats.numeric_min_max()?;

    // Evaluate max - min the way the engine would; overflow means the range
    // is unknowable and the column passes through.
    let range_expr = functions::subtract(
        Expression::constant(ScalarValue::from_i128(ty, max)?),
        Expression::constant(ScalarValue::from_i128(ty, min)?),
        LogicalType::HugeInt,
    );
    let range = u64::try_from(functions::evaluate(&range_expr)?.to_i128()?).ok()?;

    let cast_type = if range <= u8::MAX as u64 {
        LogicalType::UTinyInt
    } else if range <= u16::MAX as u64 {
        LogicalType::USmallInt
    } else if range <= u32::MAX as u64 {
        LogicalType::UInteger
    } else {
        LogicalType::UBigInt
    };
    if cast_type.byte_width() >= ty.byte_width() {
        return None;
    }

    let min_value = ScalarValue::from_i128(ty, min)?;
    let expression = functions::integral_compress(input, min_value, cast_type);
    let compress_stats = Statistics::numeric(cast_type, 0, range as i128);
    Some(CompressExpr {
        expression,
        stats: Some(compress_stats),
    })
}

fn get_string_compress(input: Expression, stats: &Statistics) -> Option<CompressExpr> {
    let max_string_length = stats.max_string_length()?;
    let mut cast_type = functions::STRING_COMPRESS_TYPES
        .into_iter()
        .find(|ty| max_string_length < ty.byte_width())?;

    let mut compress_stats = Statistics::numeric_unknown(cast_type);
    if cast_type == LogicalType::USmallInt {
        let (min_str, max_str) = match stats {
            Statistics::String { min, max, .. } => (min, max),
            Statistics::Numeric { .. } => return None,
        };
        let min_numeric = leading_byte(min_str, max_string_length);
        let max_numeric = leading_byte(max_str, max_string_length);
        if max_numeric < u8::MAX {
            cast_type = LogicalType::UTinyInt;
        }
        // Upper bound is max + 1: the slot encoding shifts non-empty strings
        // up by one to keep 0 for the empty string.
        compress_stats =
            Statistics::numeric(cast_type, min_numeric as i128, max_numeric as i128 + 1);
    }

    let expression = functions::string_compress(input, cast_type);
    Some(CompressExpr {
        expression,
        stats: Some(compress_stats),
    })
}

fn get_decompress_expression(
    input: Expression,
    result_type: LogicalType,
    stats: &Statistics,
) -> Result<Expression, OptimizerError> {
    if result_type.is_integral() {
        let (min, _) = stats.numeric_min_max().ok_or_else(|| {
            OptimizerError::Internal("integral decompression without min/max statistics".into())
        })?;
        let min_value = ScalarValue::from_i128(result_type, min).ok_or_else(|| {
            OptimizerError::Internal("statistics minimum does not fit its declared type".into())
        })?;
        Ok(functions::integral_decompress(input, min_value, result_type))
    } else if result_type == LogicalType::Varchar {
        Ok(functions::string_decompress(input))
    } else {
        Err(OptimizerError::Internal(
            "type other than integral/string marked for decompression".into(),
        ))
    }
}

fn leading_byte(s: &str, max_string_length: u32) -> u8 {
    if max_string_length != 0 && !s.is_empty() {
        s.as_bytes()[0]
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tree addressing helpers
// ---------------------------------------------------------------------------

fn is_top_n(op: &LogicalOperator) -> bool {
    op.kind() == OperatorKind::Limit
        && !op.children.is_empty()
        && op.children[0].kind() == OperatorKind::Order
}

fn node_at<'t>(root: &'t LogicalOperator, path: &[usize]) -> &'t LogicalOperator {
    path.iter().fold(root, |node, &i| &node.children[i])
}

fn node_at_mut<'t>(root: &'t mut LogicalOperator, path: &[usize]) -> &'t mut LogicalOperator {
    path.iter().fold(root, |node, &i| &mut node.children[i])
}

fn chain_child(node: &LogicalOperator, depth: usize) -> &LogicalOperator {
    (0..depth).fold(node, |n, _| &n.children[0])
}

fn chain_child_mut(node: &mut LogicalOperator, depth: usize) -> &mut LogicalOperator {
    (0..depth).fold(node, |n, _| &mut n.children[0])
}

/// Move an operator out of its slot; the placeholder is overwritten before
/// the rewrite step returns.
fn take_operator(slot: &mut LogicalOperator) -> LogicalOperator {
    std::mem::replace(slot, LogicalOperator::new(OperatorData::CrossProduct, vec![]))
}

fn set_return_type(expr: &mut Expression, ty: LogicalType) {
    match expr {
        Expression::BoundColumnRef { return_type, .. }
        | Expression::BoundFunction { return_type, .. } => *return_type = ty,
        _ => {}
    }
}
