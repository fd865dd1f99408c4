//! Builtin conversion and operator tables.
//!
//! These tables are a versioned contract with every front end that
//! performs overload resolution against this runtime: the exact entries,
//! their order, and the numeric promotions applied before the linear scan
//! all determine which overload wins.

use crate::typesystem::types::{Primitive, TypeDesc};

/// The builtin types that participate in conversion and operator
/// resolution. `Decimal` is a value type recognized by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BuiltinType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    Char,
}

/// Map a type onto its builtin form, if it has one.
#[must_use]
pub fn get_builtin(desc: &TypeDesc) -> Option<BuiltinType> {
    if let Some(prim) = desc.as_primitive() {
        return Some(match prim {
            Primitive::Boolean => BuiltinType::Boolean,
            Primitive::I1 => BuiltinType::SByte,
            Primitive::U1 => BuiltinType::Byte,
            Primitive::I2 => BuiltinType::Int16,
            Primitive::U2 => BuiltinType::UInt16,
            Primitive::I4 => BuiltinType::Int32,
            Primitive::U4 => BuiltinType::UInt32,
            Primitive::I8 => BuiltinType::Int64,
            Primitive::U8 => BuiltinType::UInt64,
            Primitive::R4 => BuiltinType::Single,
            Primitive::R8 => BuiltinType::Double,
            Primitive::Char => BuiltinType::Char,
            _ => return None,
        });
    }
    // Decimal is represented as a struct
    if let TypeDesc::Value(_) = desc.strip_prefixes() {
        let class = desc.as_class()?;
        if class.namespace() == "System" && class.name() == "Decimal" {
            return Some(BuiltinType::Decimal);
        }
    }
    None
}

/// True for builtin numeric types (everything builtin except `bool`).
#[must_use]
pub fn is_builtin_numeric(desc: &TypeDesc) -> bool {
    get_builtin(desc).is_some_and(|builtin| builtin != BuiltinType::Boolean)
}

/// One entry of a conversion table.
#[derive(Debug)]
pub struct Conversion {
    /// Conversion target
    pub to: BuiltinType,
    /// Requires an explicit cast
    pub explicit: bool,
}

const fn imp(to: BuiltinType) -> Conversion {
    Conversion { to, explicit: false }
}

const fn exp(to: BuiltinType) -> Conversion {
    Conversion { to, explicit: true }
}

use BuiltinType::{
    Byte, Char, Decimal, Double, Int16, Int32, Int64, SByte, Single, UInt16, UInt32, UInt64,
};

static CONVERT_SBYTE: [Conversion; 11] = [
    imp(Int16),
    imp(Int32),
    imp(Int64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(Byte),
    exp(UInt16),
    exp(UInt32),
    exp(UInt64),
    exp(Char),
];

static CONVERT_BYTE: [Conversion; 11] = [
    imp(Int16),
    imp(UInt16),
    imp(Int32),
    imp(UInt32),
    imp(Int64),
    imp(UInt64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Char),
];

static CONVERT_INT16: [Conversion; 11] = [
    imp(Int32),
    imp(Int64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(UInt16),
    exp(UInt32),
    exp(UInt64),
    exp(Char),
];

static CONVERT_UINT16: [Conversion; 11] = [
    imp(Int32),
    imp(UInt32),
    imp(Int64),
    imp(UInt64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(Char),
];

static CONVERT_INT32: [Conversion; 11] = [
    imp(Int64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(UInt32),
    exp(UInt64),
    exp(Char),
];

static CONVERT_UINT32: [Conversion; 11] = [
    imp(Int64),
    imp(UInt64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(Char),
];

static CONVERT_INT64: [Conversion; 11] = [
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(UInt32),
    exp(UInt64),
    exp(Char),
];

static CONVERT_UINT64: [Conversion; 11] = [
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(UInt32),
    exp(Int64),
    exp(Char),
];

static CONVERT_CHAR: [Conversion; 11] = [
    imp(UInt16),
    imp(Int32),
    imp(UInt32),
    imp(Int64),
    imp(UInt64),
    imp(Single),
    imp(Double),
    imp(Decimal),
    exp(SByte),
    exp(Byte),
    exp(Int16),
];

static CONVERT_SINGLE: [Conversion; 11] = [
    imp(Double),
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(UInt32),
    exp(Int64),
    exp(UInt64),
    exp(Char),
    exp(Decimal),
];

static CONVERT_DOUBLE: [Conversion; 11] = [
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(UInt32),
    exp(Int64),
    exp(UInt64),
    exp(Char),
    exp(Single),
    exp(Decimal),
];

static CONVERT_DECIMAL: [Conversion; 11] = [
    exp(SByte),
    exp(Byte),
    exp(Int16),
    exp(UInt16),
    exp(Int32),
    exp(UInt32),
    exp(Int64),
    exp(UInt64),
    exp(Char),
    exp(Single),
    exp(Double),
];

/// Index mapping each builtin source type to its conversion table.
/// `Boolean` deliberately has no entry: it converts to nothing.
static CONVERT_INDEX: [(BuiltinType, &[Conversion]); 12] = [
    (SByte, &CONVERT_SBYTE),
    (Byte, &CONVERT_BYTE),
    (Int16, &CONVERT_INT16),
    (UInt16, &CONVERT_UINT16),
    (Int32, &CONVERT_INT32),
    (UInt32, &CONVERT_UINT32),
    (Int64, &CONVERT_INT64),
    (UInt64, &CONVERT_UINT64),
    (Char, &CONVERT_CHAR),
    (Single, &CONVERT_SINGLE),
    (Double, &CONVERT_DOUBLE),
    (Decimal, &CONVERT_DECIMAL),
];

/// Look up a builtin conversion from `from` to `to`.
///
/// Implicit entries always match; explicit-only entries match only when
/// `explicit` is set.
#[must_use]
pub fn find_conversion(
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
) -> Option<&'static Conversion> {
    let from = get_builtin(from)?;
    let to = get_builtin(to)?;
    for (source, table) in &CONVERT_INDEX {
        if *source != from {
            continue;
        }
        for conversion in *table {
            if conversion.to == to && (!conversion.explicit || explicit) {
                return Some(conversion);
            }
        }
    }
    None
}

/// One entry of an operator table: result type plus one or two operand
/// types.
#[derive(Debug)]
pub struct Operator {
    /// Result type
    pub out: BuiltinType,
    /// First operand type
    pub in1: BuiltinType,
    /// Second operand type; `None` for unary operators
    pub in2: Option<BuiltinType>,
}

const fn unary(out: BuiltinType, in1: BuiltinType) -> Operator {
    Operator { out, in1, in2: None }
}

const fn binary(out: BuiltinType, in1: BuiltinType, in2: BuiltinType) -> Operator {
    Operator {
        out,
        in1,
        in2: Some(in2),
    }
}

use BuiltinType::Boolean;

/// `+x`
pub static UNARY_PLUS: [Operator; 7] = [
    unary(Int32, Int32),
    unary(UInt32, UInt32),
    unary(Int64, Int64),
    unary(UInt64, UInt64),
    unary(Single, Single),
    unary(Double, Double),
    unary(Decimal, Decimal),
];

/// `-x`; note there is no unsigned entry, which is why `uint` promotes to
/// `long` for this table only
pub static NEG: [Operator; 5] = [
    unary(Int32, Int32),
    unary(Int64, Int64),
    unary(Single, Single),
    unary(Double, Double),
    unary(Decimal, Decimal),
];

/// `!x`
pub static LOGICAL_NOT: [Operator; 1] = [unary(Boolean, Boolean)];

/// `~x`
pub static NOT: [Operator; 4] = [
    unary(Int32, Int32),
    unary(UInt32, UInt32),
    unary(Int64, Int64),
    unary(UInt64, UInt64),
];

macro_rules! arith_table {
    ($name:ident) => {
        /// Binary arithmetic operator table
        pub static $name: [Operator; 7] = [
            binary(Int32, Int32, Int32),
            binary(UInt32, UInt32, UInt32),
            binary(Int64, Int64, Int64),
            binary(UInt64, UInt64, UInt64),
            binary(Single, Single, Single),
            binary(Double, Double, Double),
            binary(Decimal, Decimal, Decimal),
        ];
    };
}

arith_table!(MUL);
arith_table!(DIV);
arith_table!(REM);
arith_table!(ADD);
arith_table!(SUB);

/// `x << y`
pub static SHL: [Operator; 4] = [
    binary(Int32, Int32, Int32),
    binary(UInt32, UInt32, Int32),
    binary(Int64, Int64, Int32),
    binary(UInt64, UInt64, Int32),
];

/// `x >> y`
pub static SHR: [Operator; 4] = [
    binary(Int32, Int32, Int32),
    binary(UInt32, UInt32, Int32),
    binary(Int64, Int64, Int32),
    binary(UInt64, UInt64, Int32),
];

macro_rules! equality_table {
    ($name:ident) => {
        /// Equality operator table (includes the boolean entry)
        pub static $name: [Operator; 8] = [
            binary(Boolean, Int32, Int32),
            binary(Boolean, UInt32, UInt32),
            binary(Boolean, Int64, Int64),
            binary(Boolean, UInt64, UInt64),
            binary(Boolean, Single, Single),
            binary(Boolean, Double, Double),
            binary(Boolean, Decimal, Decimal),
            binary(Boolean, Boolean, Boolean),
        ];
    };
}

equality_table!(EQ);
equality_table!(NE);

macro_rules! relational_table {
    ($name:ident) => {
        /// Relational operator table
        pub static $name: [Operator; 7] = [
            binary(Boolean, Int32, Int32),
            binary(Boolean, UInt32, UInt32),
            binary(Boolean, Int64, Int64),
            binary(Boolean, UInt64, UInt64),
            binary(Boolean, Single, Single),
            binary(Boolean, Double, Double),
            binary(Boolean, Decimal, Decimal),
        ];
    };
}

relational_table!(LT);
relational_table!(GT);
relational_table!(LE);
relational_table!(GE);

macro_rules! bitwise_table {
    ($name:ident) => {
        /// Bitwise/logical operator table
        pub static $name: [Operator; 5] = [
            binary(Boolean, Boolean, Boolean),
            binary(Int32, Int32, Int32),
            binary(UInt32, UInt32, UInt32),
            binary(Int64, Int64, Int64),
            binary(UInt64, UInt64, UInt64),
        ];
    };
}

bitwise_table!(AND);
bitwise_table!(OR);
bitwise_table!(XOR);

/// Find a matching unary operator after numeric promotion.
///
/// All sub-`int` integer types promote to `int32`; `uint32` promotes to
/// `int64` for the negation table only, because negation has no unsigned
/// entry.
#[must_use]
pub fn find_unary_operator(table: &'static [Operator], arg: &TypeDesc) -> Option<&'static Operator> {
    let mut builtin = get_builtin(arg)?;

    if matches!(
        builtin,
        BuiltinType::SByte | BuiltinType::Byte | BuiltinType::Int16 | BuiltinType::UInt16 | BuiltinType::Char
    ) {
        builtin = Int32;
    } else if builtin == UInt32 && std::ptr::eq(table.as_ptr(), NEG.as_ptr()) {
        builtin = Int64;
    }

    table.iter().find(|operator| operator.in1 == builtin)
}

/// Find a matching binary operator after numeric promotion.
///
/// Arithmetic and bitwise operators apply a symmetric promotion ladder
/// (decimal → double → single → ulong → long → uint → int), with two
/// invalid combinations (decimal mixed with float or double) rejected
/// outright and a mixed `uint`+signed escape to `long`. Shift operators
/// promote their operands independently instead.
#[must_use]
pub fn find_binary_operator(
    table: &'static [Operator],
    arg1: &TypeDesc,
    arg2: &TypeDesc,
) -> Option<&'static Operator> {
    let mut type1 = get_builtin(arg1)?;
    let mut type2 = get_builtin(arg2)?;

    let is_shift = std::ptr::eq(table.as_ptr(), SHL.as_ptr())
        || std::ptr::eq(table.as_ptr(), SHR.as_ptr());
    let small_signed = |builtin: BuiltinType| {
        matches!(builtin, SByte | Int16 | Int32 | Int64)
    };
    let small = |builtin: BuiltinType| {
        matches!(
            builtin,
            SByte | Byte | Int16 | UInt16 | Char
        )
    };

    if !is_shift {
        if type1 == Decimal {
            if type2 == Single || type2 == Double {
                return None;
            }
            type2 = Decimal;
        } else if type2 == Decimal {
            if type1 == Single || type1 == Double {
                return None;
            }
            type1 = Decimal;
        } else if type1 == Double {
            type2 = Double;
        } else if type2 == Double {
            type1 = Double;
        } else if type1 == Single {
            type2 = Single;
        } else if type2 == Single {
            type1 = Single;
        } else if type1 == UInt64 {
            if small_signed(type2) {
                return None;
            }
            type2 = UInt64;
        } else if type2 == UInt64 {
            if small_signed(type1) {
                return None;
            }
            type1 = UInt64;
        } else if type1 == Int64 {
            type2 = Int64;
        } else if type2 == Int64 {
            type1 = Int64;
        } else if type1 == UInt32 {
            if matches!(type2, SByte | Int16 | Int32) {
                type1 = Int64;
                type2 = Int64;
            } else {
                type2 = UInt32;
            }
        } else if type2 == UInt32 {
            if matches!(type1, SByte | Int16 | Int32) {
                type1 = Int64;
                type2 = Int64;
            } else {
                type1 = UInt32;
            }
        } else {
            type1 = Int32;
            type2 = Int32;
        }
    } else {
        // Shift operator: promote the arguments separately
        if small(type1) {
            type1 = Int32;
        }
        if small(type2) {
            type2 = Int32;
        }
    }

    table
        .iter()
        .find(|operator| operator.in1 == type1 && operator.in2 == Some(type2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(prim: Primitive) -> TypeDesc {
        TypeDesc::Primitive(prim)
    }

    #[test]
    fn implicit_widening_is_always_allowed() {
        assert!(find_conversion(&prim(Primitive::I1), &prim(Primitive::I2), false).is_some());
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::I8), false).is_some());
        assert!(find_conversion(&prim(Primitive::U1), &prim(Primitive::U8), false).is_some());
        assert!(find_conversion(&prim(Primitive::Char), &prim(Primitive::U2), false).is_some());
        assert!(find_conversion(&prim(Primitive::R4), &prim(Primitive::R8), false).is_some());
    }

    #[test]
    fn narrowing_is_gated_by_the_explicit_flag() {
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::I1), false).is_none());
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::I1), true).is_some());
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::U4), false).is_none());
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::U4), true).is_some());
        assert!(find_conversion(&prim(Primitive::R8), &prim(Primitive::R4), false).is_none());
        assert!(find_conversion(&prim(Primitive::R8), &prim(Primitive::R4), true).is_some());
    }

    #[test]
    fn boolean_converts_to_nothing() {
        assert!(find_conversion(&prim(Primitive::Boolean), &prim(Primitive::I4), true).is_none());
        assert!(find_conversion(&prim(Primitive::I4), &prim(Primitive::Boolean), true).is_none());
    }

    #[test]
    fn unary_promotion() {
        let found = find_unary_operator(&UNARY_PLUS, &prim(Primitive::I1)).unwrap();
        assert_eq!(found.in1, BuiltinType::Int32);

        // uint negation promotes to long; uint unary plus does not
        let neg = find_unary_operator(&NEG, &prim(Primitive::U4)).unwrap();
        assert_eq!(neg.in1, BuiltinType::Int64);
        let plus = find_unary_operator(&UNARY_PLUS, &prim(Primitive::U4)).unwrap();
        assert_eq!(plus.in1, BuiltinType::UInt32);
    }

    #[test]
    fn binary_promotion_ladder() {
        let found = find_binary_operator(&ADD, &prim(Primitive::I2), &prim(Primitive::U1)).unwrap();
        assert_eq!(found.in1, BuiltinType::Int32);

        let found = find_binary_operator(&ADD, &prim(Primitive::I4), &prim(Primitive::R8)).unwrap();
        assert_eq!(found.out, BuiltinType::Double);

        // uint mixed with a small signed type escapes to long
        let found = find_binary_operator(&ADD, &prim(Primitive::U4), &prim(Primitive::I4)).unwrap();
        assert_eq!(found.out, BuiltinType::Int64);
        let found = find_binary_operator(&ADD, &prim(Primitive::U4), &prim(Primitive::U2)).unwrap();
        assert_eq!(found.out, BuiltinType::UInt32);

        // ulong mixed with any signed type is invalid
        assert!(find_binary_operator(&ADD, &prim(Primitive::U8), &prim(Primitive::I4)).is_none());
    }

    #[test]
    fn shift_promotes_operands_independently() {
        let found = find_binary_operator(&SHL, &prim(Primitive::U8), &prim(Primitive::U1)).unwrap();
        assert_eq!(found.in1, BuiltinType::UInt64);
        assert_eq!(found.in2, Some(BuiltinType::Int32));
        // No symmetric ladder: long << long has no entry
        assert!(find_binary_operator(&SHL, &prim(Primitive::I8), &prim(Primitive::I8)).is_none());
    }

    #[test]
    fn comparison_tables_yield_boolean() {
        let found = find_binary_operator(&LT, &prim(Primitive::I1), &prim(Primitive::I2)).unwrap();
        assert_eq!(found.out, BuiltinType::Boolean);
        let found = find_binary_operator(&EQ, &prim(Primitive::Boolean), &prim(Primitive::Boolean))
            .unwrap();
        assert_eq!(found.out, BuiltinType::Boolean);
    }
}
