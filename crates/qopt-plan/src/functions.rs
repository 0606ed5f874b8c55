//! # Compression Scalar Functions
//!
//! Constructors and evaluation semantics for the scalar functions the
//! optimizer plants into plans:
//!
//! - `integral_compress(x, min) : target  = cast(x - min, target)`
//! - `integral_decompress(y, min) : source = cast(y, source) + min`
//! - `string_compress(s) : slot` -- packs a short string into a fixed-width
//!   unsigned slot; bijective for all strings shorter than the slot.
//! - `string_decompress(v) : VARCHAR` -- exact inverse.
//! - `subtract(a, b)` -- used to evaluate value ranges when deciding whether
//!   a column compresses at all.
//!
//! Evaluation ([`evaluate`]) covers constant-foldable trees only; it is what
//! the range computation and the round-trip tests run on. Any overflow or
//! out-of-range result evaluates to `None`, which callers treat as "do not
//! compress", never as an error.
//!
//! ## String slot layout
//!
//! For a slot of `W` bytes holding a string of length `L < W`, the encoded
//! value places the content bytes at the most-significant positions and the
//! length in the least-significant byte:
//!
//! ```text
//! value = sum(byte[i] * 256^(W-1-i) for i < L) + L
//! ```
//!
//! Content bytes never reach the length byte (the smallest content multiplier
//! is 256^(W-L) >= 256 > L), so the encoding is bijective. The 2-byte slot is
//! special-cased to `first_byte + 1` (0 for the empty string) so that its
//! value range is exactly the `[first_byte(min), first_byte(max) + 1]` window
//! the compression decision advertises, and so that the 1-byte narrowed slot
//! uses the same formula.

use crate::expr::{Expression, FunctionKind, ScalarValue};
use crate::types::LogicalType;

/// The fixed-width slot ladder for string compression, narrowest first.
pub const STRING_COMPRESS_TYPES: [LogicalType; 5] = [
    LogicalType::UTinyInt,
    LogicalType::USmallInt,
    LogicalType::UInteger,
    LogicalType::UBigInt,
    LogicalType::HugeInt,
];

/// `cast(input - min, target)`.
pub fn integral_compress(input: Expression, min: ScalarValue, target: LogicalType) -> Expression {
    Expression::BoundFunction {
        function: FunctionKind::IntegralCompress,
        return_type: target,
        arguments: vec![input, Expression::constant(min)],
    }
}

/// `cast(input, result) + min`.
pub fn integral_decompress(
    input: Expression,
    min: ScalarValue,
    result: LogicalType,
) -> Expression {
    Expression::BoundFunction {
        function: FunctionKind::IntegralDecompress,
        return_type: result,
        arguments: vec![input, Expression::constant(min)],
    }
}

/// Pack a short string into the given unsigned slot type.
pub fn string_compress(input: Expression, target: LogicalType) -> Expression {
    Expression::BoundFunction {
        function: FunctionKind::StringCompress,
        return_type: target,
        arguments: vec![input],
    }
}

/// Unpack a slot back into the original VARCHAR.
pub fn string_decompress(input: Expression) -> Expression {
    Expression::BoundFunction {
        function: FunctionKind::StringDecompress,
        return_type: LogicalType::Varchar,
        arguments: vec![input],
    }
}

/// `left - right` in the given result type.
pub fn subtract(left: Expression, right: Expression, result: LogicalType) -> Expression {
    Expression::BoundFunction {
        function: FunctionKind::Subtract,
        return_type: result,
        arguments: vec![left, right],
    }
}

/// Evaluate a constant-foldable expression tree.
///
/// Returns `None` for anything that is not a constant computation or whose
/// result overflows its declared type.
pub fn evaluate(expr: &Expression) -> Option<ScalarValue> {
    match expr {
        Expression::BoundConstant { value } => Some(value.clone()),
        Expression::BoundFunction {
            function,
            return_type,
            arguments,
        } => {
            let args: Vec<ScalarValue> = arguments
                .iter()
                .map(evaluate)
                .collect::<Option<Vec<_>>>()?;
            apply(*function, *return_type, &args)
        }
        _ => None,
    }
}

fn apply(
    function: FunctionKind,
    return_type: LogicalType,
    args: &[ScalarValue],
) -> Option<ScalarValue> {
    match function {
        FunctionKind::Subtract => {
            let a = args[0].to_i128()?;
            let b = args[1].to_i128()?;
            ScalarValue::from_i128(return_type, a.checked_sub(b)?)
        }
        FunctionKind::IntegralCompress => {
            let x = args[0].to_i128()?;
            let min = args[1].to_i128()?;
            ScalarValue::from_i128(return_type, x.checked_sub(min)?)
        }
        FunctionKind::IntegralDecompress => {
            let y = args[0].to_i128()?;
            let min = args[1].to_i128()?;
            ScalarValue::from_i128(return_type, y.checked_add(min)?)
        }
        FunctionKind::StringCompress => {
            let s = match &args[0] {
                ScalarValue::Varchar(s) => s,
                _ => return None,
            };
            let width = return_type.byte_width();
            let value = encode_string(s.as_bytes(), width)?;
            scalar_from_slot(return_type, value)
        }
        FunctionKind::StringDecompress => {
            let (value, width) = slot_value(&args[0])?;
            let bytes = decode_string(value, width)?;
            Some(ScalarValue::Varchar(String::from_utf8(bytes).ok()?))
        }
    }
}

fn encode_string(bytes: &[u8], width: u32) -> Option<u128> {
    let len = bytes.len() as u32;
    if len >= width {
        return None;
    }
    if width <= 2 {
        // Small-slot formula: empty -> 0, otherwise first byte + 1.
        return Some(bytes.first().map(|&b| b as u128 + 1).unwrap_or(0));
    }
    let mut value = len as u128;
    for (i, &b) in bytes.iter().enumerate() {
        value += (b as u128) << (8 * (width - 1 - i as u32));
    }
    Some(value)
}

fn decode_string(value: u128, width: u32) -> Option<Vec<u8>> {
    if width <= 2 {
        return Some(if value == 0 {
            vec![]
        } else {
            vec![u8::try_from(value - 1).ok()?]
        });
    }
    let len = (value & 0xFF) as u32;
    if len >= width {
        return None;
    }
    let mut bytes = Vec::with_capacity(len as usize);
    for i in 0..len {
        bytes.push((value >> (8 * (width - 1 - i)) & 0xFF) as u8);
    }
    Some(bytes)
}

fn scalar_from_slot(ty: LogicalType, value: u128) -> Option<ScalarValue> {
    Some(match ty {
        LogicalType::UTinyInt => ScalarValue::UTinyInt(u8::try_from(value).ok()?),
        LogicalType::USmallInt => ScalarValue::USmallInt(u16::try_from(value).ok()?),
        LogicalType::UInteger => ScalarValue::UInteger(u32::try_from(value).ok()?),
        LogicalType::UBigInt => ScalarValue::UBigInt(u64::try_from(value).ok()?),
        // The 16-byte slot keeps the raw bit pattern; only bijectivity
        // matters for the widest slot, not numeric order.
        LogicalType::HugeInt => ScalarValue::HugeInt(value as i128),
        _ => return None,
    })
}

fn slot_value(value: &ScalarValue) -> Option<(u128, u32)> {
    Some(match value {
        ScalarValue::UTinyInt(v) => (*v as u128, 1),
        ScalarValue::USmallInt(v) => (*v as u128, 2),
        ScalarValue::UInteger(v) => (*v as u128, 4),
        ScalarValue::UBigInt(v) => (*v as u128, 8),
        ScalarValue::HugeInt(v) => (*v as u128, 16),
        _ => return None,
    })
}
