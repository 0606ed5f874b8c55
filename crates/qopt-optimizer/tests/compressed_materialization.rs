//! End-to-end compressed-materialization tests.
//!
//! Each test builds a small plan with known statistics, runs the compression
//! pass, and inspects the rewritten tree: where compress/decompress
//! projections land, which types the narrowed columns get, how the statistics
//! map is rewired, and when redundant round-trips are eliminated.

use qopt_optimizer::compressed_materialization::CompressedMaterialization;
use qopt_plan::expr::{ColumnBinding, ComparisonType, Expression, FunctionKind, ScalarValue};
use qopt_plan::operator::{
    BoundOrderByNode, JoinCondition, JoinType, LogicalOperator, OperatorData, OperatorKind,
    TableIndexAllocator,
};
use qopt_plan::stats::{Statistics, StatisticsMap};
use qopt_plan::types::LogicalType;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn col(table_index: u32, column_index: u32, ty: LogicalType) -> Expression {
    Expression::column_ref(ColumnBinding::new(table_index, column_index), ty)
}

fn group_by_first_column(scan: LogicalOperator, ty: LogicalType) -> LogicalOperator {
    LogicalOperator::aggregate(1, 2, vec![col(0, 0, ty)], vec![], scan)
}

fn run(
    plan: &mut LogicalOperator,
    statistics: StatisticsMap,
    first_free_index: u32,
) -> StatisticsMap {
    let mut allocator = TableIndexAllocator::new(first_free_index);
    let mut pass = CompressedMaterialization::new(&mut allocator, statistics);
    pass.compress(plan).expect("compression should not error");
    pass.into_statistics_map()
}

fn projection_index(op: &LogicalOperator) -> u32 {
    match &op.data {
        OperatorData::Projection { table_index } => *table_index,
        other => panic!("expected a projection, got {other:?}"),
    }
}

fn function_kind(expr: &Expression) -> FunctionKind {
    match expr {
        Expression::BoundFunction { function, .. } => *function,
        other => panic!("expected a function expression, got {other:?}"),
    }
}

// ===========================================================================
// Integral compression around an aggregate
// ===========================================================================

#[test]
fn test_group_by_int64_narrow_range_compresses_to_utinyint() {
    // GROUP BY k, k BIGINT with min 1000 / max 1255: range 255 fits a single
    // unsigned byte.
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::BigInt);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    let statistics = run(&mut plan, statistics, 3);

    // Root became the decompress projection; below it the aggregate, the
    // compress projection, and the scan.
    assert_eq!(plan.kind(), OperatorKind::Projection);
    let decompress_index = projection_index(&plan);
    let aggregate = &plan.children[0];
    assert_eq!(aggregate.kind(), OperatorKind::Aggregate);
    let compress = &aggregate.children[0];
    let compress_index = projection_index(compress);
    assert_eq!(compress.children[0].kind(), OperatorKind::Get);
    assert_ne!(compress_index, decompress_index);

    // Compress: cast(k - 1000, UTINYINT) over the scan's column.
    let Expression::BoundFunction {
        function,
        return_type,
        arguments,
    } = &compress.expressions[0]
    else {
        panic!("expected a compress function");
    };
    assert_eq!(*function, FunctionKind::IntegralCompress);
    assert_eq!(*return_type, LogicalType::UTinyInt);
    assert_eq!(
        arguments[0],
        col(0, 0, LogicalType::BigInt),
        "compress input should be the scan column"
    );
    assert_eq!(
        arguments[1],
        Expression::constant(ScalarValue::BigInt(1000))
    );

    // The aggregate's group key now reads the compressed column.
    let OperatorData::Aggregate { groups, .. } = &aggregate.data else {
        unreachable!()
    };
    assert_eq!(
        groups[0],
        Expression::column_ref(ColumnBinding::new(compress_index, 0), LogicalType::UTinyInt)
    );

    // Decompress: cast(g, BIGINT) + 1000 over the aggregate's group output.
    let Expression::BoundFunction {
        function,
        return_type,
        arguments,
    } = &plan.expressions[0]
    else {
        panic!("expected a decompress function");
    };
    assert_eq!(*function, FunctionKind::IntegralDecompress);
    assert_eq!(*return_type, LogicalType::BigInt);
    assert_eq!(arguments[0], col(1, 0, LogicalType::UTinyInt));
    assert_eq!(
        arguments[1],
        Expression::constant(ScalarValue::BigInt(1000))
    );
    assert_eq!(plan.types, vec![LogicalType::BigInt]);

    // Statistics moved with the rewrite: the compressed column advertises its
    // re-based range, the old scan binding is gone.
    assert_eq!(
        statistics.get(&ColumnBinding::new(compress_index, 0)),
        Some(&Statistics::numeric(LogicalType::UTinyInt, 0, 255))
    );
    assert!(statistics.get(&ColumnBinding::new(0, 0)).is_none());
}

#[test]
fn test_group_by_range_300_compresses_to_usmallint() {
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::BigInt);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 0, 300),
    );

    run(&mut plan, statistics, 3);

    let compress = &plan.children[0].children[0];
    let Expression::BoundFunction { return_type, .. } = &compress.expressions[0] else {
        panic!("expected a compress function");
    };
    assert_eq!(*return_type, LogicalType::USmallInt);
}

#[test]
fn test_no_statistics_means_no_compression() {
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::BigInt);
    let before = plan.clone();

    run(&mut plan, StatisticsMap::new(), 3);

    let mut expected = before;
    expected.resolve_operator_types();
    assert_eq!(plan, expected, "no statistics, no rewrite");
}

#[test]
fn test_one_byte_column_is_not_compressed() {
    let scan = LogicalOperator::get(0, vec![LogicalType::UTinyInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::UTinyInt);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::UTinyInt, 0, 10),
    );

    run(&mut plan, statistics, 3);
    assert_eq!(plan.kind(), OperatorKind::Aggregate, "already minimal");
}

#[test]
fn test_aggregate_payload_column_is_preserved() {
    // GROUP BY k with an aggregate reading v: v must keep its type even
    // though its statistics would allow compression.
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt, LogicalType::BigInt], 1000);
    let mut plan = LogicalOperator::aggregate(
        1,
        2,
        vec![col(0, 0, LogicalType::BigInt)],
        vec![col(0, 1, LogicalType::BigInt)],
        scan,
    );
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );
    statistics.insert(
        ColumnBinding::new(0, 1),
        Statistics::numeric(LogicalType::BigInt, 0, 5),
    );

    run(&mut plan, statistics, 3);

    let compress = &plan.children[0].children[0];
    assert_eq!(
        function_kind(&compress.expressions[0]),
        FunctionKind::IntegralCompress
    );
    // The payload column passes through as a bare reference.
    assert_eq!(compress.expressions[1], col(0, 1, LogicalType::BigInt));
}

#[test]
fn test_statistics_type_mismatch_fails_loudly() {
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::BigInt);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::string("a", "z", 4),
    );

    let mut allocator = TableIndexAllocator::new(3);
    let mut pass = CompressedMaterialization::new(&mut allocator, statistics);
    assert!(pass.compress(&mut plan).is_err());
}

// ===========================================================================
// String compression
// ===========================================================================

#[test]
fn test_distinct_short_string_compresses_into_slot() {
    // DISTINCT over a VARCHAR with max length 3: packs into a 4-byte slot.
    let scan = LogicalOperator::get(0, vec![LogicalType::Varchar], 1000);
    let mut plan = LogicalOperator::distinct(vec![col(0, 0, LogicalType::Varchar)], scan);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::string("ape", "zoo", 3),
    );

    let statistics = run(&mut plan, statistics, 3);

    assert_eq!(plan.kind(), OperatorKind::Projection);
    let distinct = &plan.children[0];
    assert_eq!(distinct.kind(), OperatorKind::Distinct);
    let compress = &distinct.children[0];
    let compress_index = projection_index(compress);

    let Expression::BoundFunction {
        function,
        return_type,
        ..
    } = &compress.expressions[0]
    else {
        panic!("expected a compress function");
    };
    assert_eq!(*function, FunctionKind::StringCompress);
    assert_eq!(*return_type, LogicalType::UInteger);

    // The distinct target follows the compressed column.
    let OperatorData::Distinct { targets } = &distinct.data else {
        unreachable!()
    };
    assert_eq!(
        targets[0],
        Expression::column_ref(ColumnBinding::new(compress_index, 0), LogicalType::UInteger)
    );

    // Decompression restores VARCHAR.
    assert_eq!(
        function_kind(&plan.expressions[0]),
        FunctionKind::StringDecompress
    );
    assert_eq!(plan.types, vec![LogicalType::Varchar]);

    // Wide string slots advertise no numeric range.
    assert_eq!(
        statistics.get(&ColumnBinding::new(compress_index, 0)),
        Some(&Statistics::numeric_unknown(LogicalType::UInteger))
    );
}

#[test]
fn test_single_char_string_narrows_to_one_byte() {
    // Max length 1 starts at the 2-byte slot; the leading bytes of min/max
    // allow narrowing to a single byte, with the advertised upper bound one
    // past the max leading byte.
    let scan = LogicalOperator::get(0, vec![LogicalType::Varchar], 1000);
    let mut plan = LogicalOperator::distinct(vec![col(0, 0, LogicalType::Varchar)], scan);
    let mut statistics = StatisticsMap::new();
    statistics.insert(ColumnBinding::new(0, 0), Statistics::string("a", "z", 1));

    let statistics = run(&mut plan, statistics, 3);

    let compress = &plan.children[0].children[0];
    let compress_index = projection_index(compress);
    let Expression::BoundFunction { return_type, .. } = &compress.expressions[0] else {
        panic!("expected a compress function");
    };
    assert_eq!(*return_type, LogicalType::UTinyInt);
    assert_eq!(
        statistics.get(&ColumnBinding::new(compress_index, 0)),
        Some(&Statistics::numeric(
            LogicalType::UTinyInt,
            b'a' as i128,
            b'z' as i128 + 1
        ))
    );
}

#[test]
fn test_string_without_max_length_is_not_compressed() {
    let scan = LogicalOperator::get(0, vec![LogicalType::Varchar], 1000);
    let mut plan = LogicalOperator::distinct(vec![col(0, 0, LogicalType::Varchar)], scan);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::String {
            min: String::new(),
            max: String::new(),
            max_length: None,
        },
    );

    run(&mut plan, statistics, 3);
    assert_eq!(plan.kind(), OperatorKind::Distinct);
}

// ===========================================================================
// Order-by compression and the Top-N guard
// ===========================================================================

#[test]
fn test_order_by_compresses_sort_key() {
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = LogicalOperator::order_by(
        vec![BoundOrderByNode {
            expression: col(0, 0, LogicalType::BigInt),
            ascending: true,
            nulls_first: false,
        }],
        scan,
    );
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    run(&mut plan, statistics, 3);

    assert_eq!(plan.kind(), OperatorKind::Projection);
    let order = &plan.children[0];
    assert_eq!(order.kind(), OperatorKind::Order);
    let compress = &order.children[0];
    let compress_index = projection_index(compress);
    let OperatorData::Order { orders } = &order.data else {
        unreachable!()
    };
    assert_eq!(
        orders[0].expression,
        Expression::column_ref(ColumnBinding::new(compress_index, 0), LogicalType::UTinyInt)
    );
}

#[test]
fn test_top_n_shape_is_left_alone() {
    // LIMIT over ORDER BY belongs to the Top-N optimizer; no projections
    // appear around the sort.
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let order = LogicalOperator::order_by(
        vec![BoundOrderByNode {
            expression: col(0, 0, LogicalType::BigInt),
            ascending: true,
            nulls_first: false,
        }],
        scan,
    );
    let mut plan = LogicalOperator::limit(10, 0, order);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    run(&mut plan, statistics, 3);

    assert_eq!(plan.kind(), OperatorKind::Limit);
    assert_eq!(plan.children[0].kind(), OperatorKind::Order);
    assert_eq!(plan.children[0].children[0].kind(), OperatorKind::Get);
}

// ===========================================================================
// Redundant-pair elimination across a join
// ===========================================================================

/// Aggregate(Join(Decompress(Aggregate(Compress(Scan))), Other)) where the
/// outer aggregate groups on the same narrow column: the inner decompress and
/// outer compress must cancel, leaving the column narrow across the join.
#[test]
fn test_redundant_pair_eliminated_across_join() {
    // Inner aggregate groups on k (compressible) and j (no statistics).
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt, LogicalType::BigInt], 1000);
    let inner_aggregate = LogicalOperator::aggregate(
        1,
        2,
        vec![col(0, 0, LogicalType::BigInt), col(0, 1, LogicalType::BigInt)],
        vec![],
        scan,
    );
    // Join on j so the join condition never touches k.
    let other = LogicalOperator::get(3, vec![LogicalType::BigInt], 50);
    let join = LogicalOperator::comparison_join(
        JoinType::Inner,
        vec![JoinCondition {
            left: col(1, 1, LogicalType::BigInt),
            right: col(3, 0, LogicalType::BigInt),
            comparison: ComparisonType::Equal,
        }],
        inner_aggregate,
        other,
    );
    // Outer aggregate groups on k again.
    let mut plan =
        LogicalOperator::aggregate(4, 5, vec![col(1, 0, LogicalType::BigInt)], vec![], join);

    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    run(&mut plan, statistics, 6);

    // Shape: Decompress(Aggregate(Compress(Join(Decompress(Aggregate(
    // Compress(Scan))), Other)))).
    assert_eq!(plan.kind(), OperatorKind::Projection);
    let outer_aggregate = &plan.children[0];
    assert_eq!(outer_aggregate.kind(), OperatorKind::Aggregate);
    let outer_compress = &outer_aggregate.children[0];
    assert_eq!(outer_compress.kind(), OperatorKind::Projection);
    let join = &outer_compress.children[0];
    assert_eq!(join.kind(), OperatorKind::ComparisonJoin);
    let inner_decompress = &join.children[0];
    assert_eq!(inner_decompress.kind(), OperatorKind::Projection);

    // Both ends of the round-trip collapsed to bare references with the
    // compressed type: k never widens between the two aggregates.
    assert!(
        inner_decompress.expressions[0].is_column_ref(),
        "inner decompress of k should be eliminated"
    );
    assert_eq!(
        inner_decompress.expressions[0].return_type(),
        LogicalType::UTinyInt
    );
    assert!(
        outer_compress.expressions[0].is_column_ref(),
        "outer compress of k should be eliminated"
    );
    assert_eq!(
        outer_compress.expressions[0].return_type(),
        LogicalType::UTinyInt
    );

    // j still decompresses normally (it was never compressed: bare colref),
    // and the join condition is untouched apart from retargeted bindings.
    assert!(inner_decompress.expressions[1].is_column_ref());
    let OperatorData::ComparisonJoin { conditions, .. } = &join.data else {
        unreachable!()
    };
    assert_eq!(conditions[0].left.return_type(), LogicalType::BigInt);

    // The outer decompress still restores BIGINT for the plan's consumers.
    assert_eq!(
        function_kind(&plan.expressions[0]),
        FunctionKind::IntegralDecompress
    );
    assert_eq!(plan.types, vec![LogicalType::BigInt]);
}

#[test]
fn test_no_elimination_when_join_condition_uses_the_column() {
    // Same shape, but the join condition tests k itself: the round-trip must
    // stay.
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let inner_aggregate =
        LogicalOperator::aggregate(1, 2, vec![col(0, 0, LogicalType::BigInt)], vec![], scan);
    let other = LogicalOperator::get(3, vec![LogicalType::BigInt], 50);
    let join = LogicalOperator::comparison_join(
        JoinType::Inner,
        vec![JoinCondition {
            left: col(1, 0, LogicalType::BigInt),
            right: col(3, 0, LogicalType::BigInt),
            comparison: ComparisonType::Equal,
        }],
        inner_aggregate,
        other,
    );
    let mut plan =
        LogicalOperator::aggregate(4, 5, vec![col(1, 0, LogicalType::BigInt)], vec![], join);

    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    run(&mut plan, statistics, 6);

    let outer_compress = &plan.children[0].children[0];
    let join = &outer_compress.children[0];
    let inner_decompress = &join.children[0];
    assert_eq!(
        function_kind(&inner_decompress.expressions[0]),
        FunctionKind::IntegralDecompress,
        "decompress must survive when the join reads the column"
    );
    assert_eq!(
        function_kind(&outer_compress.expressions[0]),
        FunctionKind::IntegralCompress
    );
}

// ===========================================================================
// Idempotence
// ===========================================================================

#[test]
fn test_second_pass_changes_nothing() {
    let scan = LogicalOperator::get(0, vec![LogicalType::BigInt], 1000);
    let mut plan = group_by_first_column(scan, LogicalType::BigInt);
    let mut statistics = StatisticsMap::new();
    statistics.insert(
        ColumnBinding::new(0, 0),
        Statistics::numeric(LogicalType::BigInt, 1000, 1255),
    );

    let statistics = run(&mut plan, statistics, 3);
    let after_first = plan.clone();
    run(&mut plan, statistics, 10);

    assert_eq!(plan, after_first, "compression must be idempotent");
}
