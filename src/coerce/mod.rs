//! Coercions, casts and overload betterness.
//!
//! Decides whether and how one type converts to another — identity, null
//! literals, builtin numeric conversions, user-defined operators, the
//! reference-type ladder, boxing/unboxing and enum conversions — and which
//! of two candidate types is the "better" conversion target for overload
//! resolution. A parallel constant-coercion path special-cases
//! compile-time constants that fit a narrower type.
//!
//! The conversion and operator tables in [`optable`] and the betterness
//! ordering here are a versioned contract consumed by front ends; see
//! [`better_conversion`].

pub mod optable;
pub mod resolve;

use std::sync::Arc;

use bitflags::bitflags;

use crate::coerce::optable::Conversion;
use crate::typesystem::member::Method;
use crate::typesystem::types::{Primitive, TypeDesc};
use crate::typesystem::{ClassRc, Context};

bitflags! {
    /// Which conversion categories to consider.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ConvertKinds: u32 {
        /// Builtin numeric conversions
        const NUMERIC = 0x01;
        /// User-defined `op_Implicit`/`op_Explicit`
        const USER_DEFINED = 0x02;
        /// Reference-type conversions
        const REFERENCE = 0x04;
        /// Boxing and unboxing
        const BOXING = 0x08;
        /// Enum conversions through the underlying type
        const ENUM = 0x10;
        /// Compile-time constant narrowing
        const CONSTANT = 0x20;
        /// Everything
        const ALL = 0x3F;
    }
}

/// The engine-level machine category of a type, used to pick instruction
/// shapes and constant-cast targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MachineType {
    Void,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Char,
    Int32,
    UInt32,
    Int64,
    UInt64,
    NativeInt,
    NativeUInt,
    Float32,
    Float64,
    NativeFloat,
    Decimal,
    String,
    ObjectRef,
    UnmanagedPtr,
    ManagedPtr,
    ManagedValue,
}

/// Map a type onto its machine category. Enums classify as their
/// underlying type; value types without a builtin shape are managed
/// values.
#[must_use]
pub fn type_to_machine_type(desc: &TypeDesc) -> MachineType {
    let desc = desc.enum_underlying();
    if let Some(prim) = desc.as_primitive() {
        return match prim {
            Primitive::Void => MachineType::Void,
            Primitive::Boolean => MachineType::Boolean,
            Primitive::I1 => MachineType::Int8,
            Primitive::U1 => MachineType::UInt8,
            Primitive::I2 => MachineType::Int16,
            Primitive::U2 => MachineType::UInt16,
            Primitive::Char => MachineType::Char,
            Primitive::I4 => MachineType::Int32,
            Primitive::U4 => MachineType::UInt32,
            Primitive::I8 => MachineType::Int64,
            Primitive::U8 => MachineType::UInt64,
            Primitive::I => MachineType::NativeInt,
            Primitive::U => MachineType::NativeUInt,
            Primitive::R4 => MachineType::Float32,
            Primitive::R8 => MachineType::Float64,
            Primitive::R => MachineType::NativeFloat,
            Primitive::String => MachineType::String,
            Primitive::Object | Primitive::Null => MachineType::ObjectRef,
            Primitive::TypedRef => MachineType::ManagedValue,
        };
    }
    match desc.strip_prefixes() {
        TypeDesc::Value(_) => {
            if optable::get_builtin(&desc) == Some(optable::BuiltinType::Decimal) {
                MachineType::Decimal
            } else {
                MachineType::ManagedValue
            }
        }
        TypeDesc::Pointer(_) | TypeDesc::Method(_) => MachineType::UnmanagedPtr,
        TypeDesc::ByRef(_) => MachineType::ManagedPtr,
        _ => MachineType::ObjectRef,
    }
}

/// The rules that implement one conversion, in application order: box or
/// unbox, apply a builtin conversion, call a user-defined method, then
/// checked-cast to an explicit type.
#[derive(Default)]
pub struct ConvertRules {
    /// Class to box the value as
    pub box_class: Option<ClassRc>,
    /// Class to unbox the value as
    pub unbox_class: Option<ClassRc>,
    /// The boxed/unboxed value type is an enum
    pub box_is_enum: bool,
    /// User-defined conversion operator to call
    pub method: Option<Arc<Method>>,
    /// Explicit type for a checked cast instruction
    pub cast_type: Option<TypeDesc>,
    /// Builtin numeric conversion to apply
    pub builtin: Option<&'static Conversion>,
}

/// A compile-time constant value, for the constant-coercion path.
#[derive(Clone, Copy, Debug)]
pub enum ConstValue {
    /// A 32-bit constant
    Int32(i32),
    /// A 64-bit constant
    Int64(i64),
}

/// Compute the rules to convert `from` into `to`, or `None` when no
/// conversion of the requested `kinds` exists.
///
/// The categories are consulted in a fixed order: identity, null
/// handling, builtin numeric, user-defined, reference, boxing, enum.
#[must_use]
pub fn get_convert_rules(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
    kinds: ConvertKinds,
) -> Option<ConvertRules> {
    // Strip type prefixes before we start
    let from = from.strip_prefixes();
    let to = to.strip_prefixes();

    // If the types are identical at this point, then we are done
    if from.identical(to) {
        return Some(ConvertRules::default());
    }

    // We can never convert to the "null" type
    if matches!(to.as_primitive(), Some(Primitive::Null)) {
        return None;
    }

    // If "from" is null, then "to" must be a reference type
    if matches!(from.as_primitive(), Some(Primitive::Null)) {
        return if kinds.contains(ConvertKinds::REFERENCE) && to.is_reference_type() {
            Some(ConvertRules::default())
        } else {
            None
        };
    }

    if kinds.contains(ConvertKinds::NUMERIC) {
        if let Some(conversion) = optable::find_conversion(from, to, explicit) {
            return Some(ConvertRules {
                builtin: Some(conversion),
                ..ConvertRules::default()
            });
        }
    }

    if kinds.contains(ConvertKinds::USER_DEFINED) {
        for class in [ctx.type_to_class(from), ctx.type_to_class(to)]
            .into_iter()
            .flatten()
        {
            if let Some(method) = find_user_conversion(ctx, &class, from, to, explicit) {
                return Some(ConvertRules {
                    method: Some(method),
                    ..ConvertRules::default()
                });
            }
        }
    }

    if kinds.contains(ConvertKinds::REFERENCE) {
        if let Some(rules) = reference_convert_rules(ctx, from, to, explicit) {
            return Some(rules);
        }
    }

    if kinds.contains(ConvertKinds::BOXING) {
        if let Some(rules) = boxing_convert_rules(ctx, from, to, explicit) {
            return Some(rules);
        }
    }

    if kinds.contains(ConvertKinds::ENUM) && explicit {
        if let Some(rules) = enum_convert_rules(ctx, from, to, explicit) {
            return Some(rules);
        }
    }

    None
}

/// Look for a user-defined conversion operator on `class`, preferring
/// `op_Implicit` and falling back to `op_Explicit` only for casts.
fn find_user_conversion(
    ctx: &Arc<Context>,
    class: &ClassRc,
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
) -> Option<Arc<Method>> {
    if let Some(method) = resolve::resolve_conversion_operator(ctx, class, "op_Implicit", from, to)
    {
        return Some(method);
    }
    if explicit {
        return resolve::resolve_conversion_operator(ctx, class, "op_Explicit", from, to);
    }
    None
}

/// The reference-type ladder.
fn reference_convert_rules(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
) -> Option<ConvertRules> {
    // Both types must be reference types
    if !from.is_reference_type() || !to.is_reference_type() {
        return None;
    }

    // Any reference type can be implicitly coerced to "Object"
    if to.is_object() {
        return Some(ConvertRules::default());
    }

    // "Object" can be explicitly converted into any reference type
    if from.is_object() && explicit {
        return Some(ConvertRules {
            cast_type: Some(to.clone()),
            ..ConvertRules::default()
        });
    }

    // Arrays take the class role of `System.Array`: implicit up to it,
    // explicit back down, and element covariance between each other
    let from_is_array = matches!(from.strip_prefixes(), TypeDesc::Array { .. });
    let to_is_array = matches!(to.strip_prefixes(), TypeDesc::Array { .. });
    if from_is_array || to_is_array {
        if from_is_array && !to_is_array {
            if ctx.type_to_class(to).is_some_and(|class| is_system_array(&class)) {
                return Some(ConvertRules::default());
            }
            return None;
        }
        if to_is_array && !from_is_array {
            if explicit
                && ctx
                    .type_to_class(from)
                    .is_some_and(|class| is_system_array(&class))
            {
                return Some(ConvertRules {
                    cast_type: Some(to.clone()),
                    ..ConvertRules::default()
                });
            }
            return None;
        }
        // Both are arrays: the ranks must be equal, the element types must
        // be references, and there must be a valid conversion between them
        if let (
            TypeDesc::Array {
                elem: elem_from,
                rank: rank_from,
                ..
            },
            TypeDesc::Array {
                elem: elem_to,
                rank: rank_to,
                ..
            },
        ) = (from, to)
        {
            if rank_from == rank_to
                && elem_from.is_reference_type()
                && elem_to.is_reference_type()
            {
                if let Some(mut rules) =
                    get_convert_rules(ctx, elem_from, elem_to, explicit, ConvertKinds::REFERENCE)
                {
                    if rules.cast_type.is_some() {
                        // Move the explicit cast up to the array level
                        rules.cast_type = Some(to.clone());
                    }
                    return Some(rules);
                }
            }
        }
        return None;
    }

    let class_from = ctx.type_to_class(from)?;
    let class_to = ctx.type_to_class(to)?;

    // See if "from" inherits from "to", or vice versa
    if class_from.inherits_from(&class_to) {
        return Some(ConvertRules::default());
    }
    if explicit && class_to.inherits_from(&class_from) {
        return Some(ConvertRules {
            cast_type: Some(to.clone()),
            ..ConvertRules::default()
        });
    }

    // See if "from" implements "to", or is an interface derived from it
    if class_to.is_interface() {
        if class_from.implements(&class_to) {
            return Some(ConvertRules::default());
        }
        if explicit && !class_from.is_sealed() {
            return Some(ConvertRules {
                cast_type: Some(to.clone()),
                ..ConvertRules::default()
            });
        }
    }

    // Explicit interface conversions
    if explicit && class_from.is_interface() {
        if !class_to.is_interface() {
            if !class_to.is_sealed() || class_to.implements(&class_from) {
                // From an interface to a class that may implement it
                return Some(ConvertRules {
                    cast_type: Some(to.clone()),
                    ..ConvertRules::default()
                });
            }
        } else if !class_from.implements(&class_to) {
            // Between unrelated interfaces
            return Some(ConvertRules {
                cast_type: Some(to.clone()),
                ..ConvertRules::default()
            });
        }
    }

    None
}

/// True for the `System.Array` root class.
fn is_system_array(class: &ClassRc) -> bool {
    class.namespace() == "System" && class.name() == "Array"
}

/// Boxing and unboxing rules.
fn boxing_convert_rules(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
) -> Option<ConvertRules> {
    if from.is_value_type() {
        let class_from = ctx.type_to_class(from)?;

        // Value types can always be boxed as "Object"
        if to.is_object() {
            return Some(ConvertRules {
                box_class: Some(class_from),
                box_is_enum: from.is_enum(),
                ..ConvertRules::default()
            });
        }
        if !to.is_reference_type() {
            return None;
        }
        let class_to = ctx.type_to_class(to)?;

        // We can box the value if its class inherits from "to", or "to" is
        // an interface that the value type implements
        if class_to.is_interface() {
            if !class_from.implements(&class_to) {
                return None;
            }
        } else if !class_from.inherits_from(&class_to) {
            return None;
        }
        return Some(ConvertRules {
            box_class: Some(class_from),
            box_is_enum: from.is_enum(),
            ..ConvertRules::default()
        });
    }

    if explicit && from.is_reference_type() && to.is_value_type() {
        let class_from = ctx.type_to_class(from);
        let class_to = ctx.type_to_class(to)?;

        // If the source is "Object", then unboxing is always possible
        if from.is_object() {
            return Some(ConvertRules {
                unbox_class: Some(class_to),
                box_is_enum: to.is_enum(),
                ..ConvertRules::default()
            });
        }
        let class_from = class_from?;

        if class_from.is_interface() {
            if !class_to.implements(&class_from) {
                return None;
            }
        } else if !class_to.inherits_from(&class_from) {
            return None;
        }
        return Some(ConvertRules {
            unbox_class: Some(class_to),
            box_is_enum: to.is_enum(),
            ..ConvertRules::default()
        });
    }

    None
}

/// Explicit enum conversions run through the underlying numeric type.
fn enum_convert_rules(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    explicit: bool,
) -> Option<ConvertRules> {
    if from.is_enum() {
        if to.is_enum() {
            return get_convert_rules(
                ctx,
                &from.enum_underlying(),
                &to.enum_underlying(),
                explicit,
                ConvertKinds::NUMERIC,
            );
        }
        if optable::is_builtin_numeric(to) {
            return get_convert_rules(
                ctx,
                &from.enum_underlying(),
                to,
                explicit,
                ConvertKinds::NUMERIC,
            );
        }
        return None;
    }
    if to.is_enum() && optable::is_builtin_numeric(from) {
        return get_convert_rules(
            ctx,
            from,
            &to.enum_underlying(),
            explicit,
            ConvertKinds::NUMERIC,
        );
    }
    None
}

/// Determine if there is an implicit constant coercion between two types
/// for a particular constant value. Returns the machine type the constant
/// should be re-tagged as, or `None`.
///
/// Consulted only when the general rules fail: an `int` constant that
/// fits a narrower type converts implicitly, and the integer constant
/// zero converts to any enumerated type.
#[must_use]
pub fn can_coerce_const(
    from: &TypeDesc,
    to: &TypeDesc,
    value: ConstValue,
) -> Option<MachineType> {
    let from_prim = from.as_primitive();
    let to_prim = to.as_primitive();

    if let (Some(from_prim), Some(to_prim)) = (from_prim, to_prim) {
        // We can implicitly down-convert some types of constants, but only
        // if the result remains the same
        if from_prim == Primitive::I4 {
            let ConstValue::Int32(value) = value else {
                return None;
            };
            return match to_prim {
                Primitive::I1 if (-128..=127).contains(&value) => Some(MachineType::Int8),
                Primitive::U1 if (0..=255).contains(&value) => Some(MachineType::UInt8),
                Primitive::I2 if (-32768..=32767).contains(&value) => Some(MachineType::Int16),
                Primitive::U2 if (0..=65535).contains(&value) => Some(MachineType::UInt16),
                Primitive::U4 if value >= 0 => Some(MachineType::UInt32),
                Primitive::U8 if value >= 0 => Some(MachineType::UInt64),
                _ => None,
            };
        }
        if from_prim == Primitive::I8 {
            let ConstValue::Int64(value) = value else {
                return None;
            };
            if to_prim == Primitive::U8 && value >= 0 {
                return Some(MachineType::UInt64);
            }
        }
        return None;
    }

    // The integer constant zero coerces to any enumerated type
    if from_prim.is_some() && to.is_enum() {
        let is_zero = match (from_prim?, value) {
            (
                Primitive::I1
                | Primitive::U1
                | Primitive::I2
                | Primitive::U2
                | Primitive::I4
                | Primitive::U4,
                ConstValue::Int32(value),
            ) => value == 0,
            (Primitive::I8 | Primitive::U8, ConstValue::Int64(value)) => value == 0,
            _ => false,
        };
        if is_zero {
            return Some(type_to_machine_type(to));
        }
    }
    None
}

/// True if `from` implicitly coerces to `to`.
#[must_use]
pub fn can_coerce(ctx: &Arc<Context>, from: &TypeDesc, to: &TypeDesc) -> bool {
    get_convert_rules(ctx, from, to, false, ConvertKinds::ALL).is_some()
}

/// True if `from` implicitly coerces to `to` under the given categories.
#[must_use]
pub fn can_coerce_kind(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    kinds: ConvertKinds,
) -> bool {
    get_convert_rules(ctx, from, to, false, kinds).is_some()
}

/// True if a constant of type `from` with the given value coerces to
/// `to`, through the general rules or the constant path.
#[must_use]
pub fn can_coerce_const_value(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    value: ConstValue,
) -> bool {
    can_coerce(ctx, from, to) || can_coerce_const(from, to, value).is_some()
}

/// True if `from` casts explicitly to `to`.
#[must_use]
pub fn can_cast(ctx: &Arc<Context>, from: &TypeDesc, to: &TypeDesc) -> bool {
    get_convert_rules(ctx, from, to, true, ConvertKinds::ALL).is_some()
}

/// The class a checked cast or unbox should test against, for an explicit
/// conversion from `from` to `to`.
#[must_use]
pub fn explicit_conversion_class(
    ctx: &Arc<Context>,
    from: &TypeDesc,
    to: &TypeDesc,
    kinds: ConvertKinds,
) -> Option<ClassRc> {
    let rules = get_convert_rules(ctx, from, to, true, kinds)?;
    if let Some(cast_type) = &rules.cast_type {
        return ctx.type_to_class(cast_type);
    }
    rules.unbox_class
}

/// Which of two candidate types is the better conversion target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Better {
    /// Neither candidate wins
    Neither,
    /// The first candidate wins
    T1,
    /// The second candidate wins
    T2,
}

/// The overload "better conversion" tie-break: given a source type `s`
/// and two candidate target types, identity wins outright, then one-way
/// coercibility, then a fixed table of signed/unsigned preferences.
///
/// This ordering determines overload-resolution determinism and must not
/// be reordered.
#[must_use]
pub fn better_conversion(
    ctx: &Arc<Context>,
    s: &TypeDesc,
    t1: &TypeDesc,
    t2: &TypeDesc,
) -> Better {
    let prim1 = t1.as_primitive();
    let prim2 = t2.as_primitive();

    if t1.identical(t2) {
        Better::Neither
    } else if s.identical(t1) {
        Better::T1
    } else if s.identical(t2) {
        Better::T2
    } else if can_coerce(ctx, t1, t2) && !can_coerce(ctx, t2, t1) {
        Better::T1
    } else if can_coerce(ctx, t2, t1) && !can_coerce(ctx, t1, t2) {
        Better::T2
    } else if prim1 == Some(Primitive::I1)
        && matches!(
            prim2,
            Some(Primitive::U1 | Primitive::U2 | Primitive::U4 | Primitive::U8)
        )
    {
        Better::T1
    } else if prim2 == Some(Primitive::I1)
        && matches!(
            prim1,
            Some(Primitive::U1 | Primitive::U2 | Primitive::U4 | Primitive::U8)
        )
    {
        Better::T2
    } else if prim1 == Some(Primitive::I2)
        && matches!(prim2, Some(Primitive::U2 | Primitive::U4 | Primitive::U8))
    {
        Better::T1
    } else if prim2 == Some(Primitive::I2)
        && matches!(prim1, Some(Primitive::U2 | Primitive::U4 | Primitive::U8))
    {
        Better::T2
    } else if prim1 == Some(Primitive::I4)
        && matches!(prim2, Some(Primitive::U4 | Primitive::U2))
    {
        Better::T1
    } else if prim2 == Some(Primitive::I4)
        && matches!(prim1, Some(Primitive::U4 | Primitive::U2))
    {
        Better::T2
    } else if prim1 == Some(Primitive::I8) && prim2 == Some(Primitive::U8) {
        Better::T1
    } else if prim2 == Some(Primitive::I8) && prim1 == Some(Primitive::U8) {
        Better::T2
    } else {
        Better::Neither
    }
}
