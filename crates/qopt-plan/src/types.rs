//! # Logical Types
//!
//! The type vocabulary of the plan model. The optimizer cares about three
//! things: the physical width of a type (compression picks the narrowest slot
//! that fits a value range), whether it is integral (only integral and string
//! columns are compressible), and signedness (compressed slots are always
//! unsigned).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type.
///
/// The integral ladder is complete in both signednesses because compression
/// maps a signed source type onto the smallest unsigned type that fits its
/// value range (e.g. `BigInt` with a range of 200 becomes `UTinyInt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    HugeInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    Double,
    Varchar,
}

impl LogicalType {
    /// Width of the in-memory representation in bytes.
    ///
    /// `Varchar` reports the width of the string header, not of the payload;
    /// it only matters for ordering types by width, never for string sizing.
    pub fn byte_width(&self) -> u32 {
        match self {
            LogicalType::Boolean => 1,
            LogicalType::TinyInt | LogicalType::UTinyInt => 1,
            LogicalType::SmallInt | LogicalType::USmallInt => 2,
            LogicalType::Integer | LogicalType::UInteger => 4,
            LogicalType::BigInt | LogicalType::UBigInt | LogicalType::Double => 8,
            LogicalType::HugeInt | LogicalType::Varchar => 16,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt
                | LogicalType::SmallInt
                | LogicalType::Integer
                | LogicalType::BigInt
                | LogicalType::HugeInt
                | LogicalType::UTinyInt
                | LogicalType::USmallInt
                | LogicalType::UInteger
                | LogicalType::UBigInt
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            LogicalType::UTinyInt
                | LogicalType::USmallInt
                | LogicalType::UInteger
                | LogicalType::UBigInt
        )
    }

    /// Inclusive value bounds of an integral type.
    pub fn integral_bounds(&self) -> Option<(i128, i128)> {
        match self {
            LogicalType::TinyInt => Some((i8::MIN as i128, i8::MAX as i128)),
            LogicalType::SmallInt => Some((i16::MIN as i128, i16::MAX as i128)),
            LogicalType::Integer => Some((i32::MIN as i128, i32::MAX as i128)),
            LogicalType::BigInt => Some((i64::MIN as i128, i64::MAX as i128)),
            LogicalType::HugeInt => Some((i128::MIN, i128::MAX)),
            LogicalType::UTinyInt => Some((0, u8::MAX as i128)),
            LogicalType::USmallInt => Some((0, u16::MAX as i128)),
            LogicalType::UInteger => Some((0, u32::MAX as i128)),
            LogicalType::UBigInt => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::TinyInt => "TINYINT",
            LogicalType::SmallInt => "SMALLINT",
            LogicalType::Integer => "INTEGER",
            LogicalType::BigInt => "BIGINT",
            LogicalType::HugeInt => "HUGEINT",
            LogicalType::UTinyInt => "UTINYINT",
            LogicalType::USmallInt => "USMALLINT",
            LogicalType::UInteger => "UINTEGER",
            LogicalType::UBigInt => "UBIGINT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths_are_ordered() {
        assert!(LogicalType::UTinyInt.byte_width() < LogicalType::USmallInt.byte_width());
        assert!(LogicalType::USmallInt.byte_width() < LogicalType::UInteger.byte_width());
        assert!(LogicalType::UInteger.byte_width() < LogicalType::UBigInt.byte_width());
        assert!(LogicalType::UBigInt.byte_width() < LogicalType::HugeInt.byte_width());
    }

    #[test]
    fn test_integral_classification() {
        assert!(LogicalType::BigInt.is_integral());
        assert!(LogicalType::UTinyInt.is_integral());
        assert!(!LogicalType::Varchar.is_integral());
        assert!(!LogicalType::Double.is_integral());
        assert!(LogicalType::UBigInt.is_unsigned());
        assert!(!LogicalType::BigInt.is_unsigned());
    }
}
