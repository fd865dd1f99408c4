//! Type and addressing information for pluggable code generators.
//!
//! A backend (interpreter or JIT) must not re-derive layout or resolution
//! logic; these helpers give it parameter types (including the implicit
//! `this`), engine-level type classification for instruction selection,
//! and the boxing dispatch that picks the narrowest correct store width.

use std::sync::Arc;

use crate::layout;
use crate::typesystem::member::Method;
use crate::typesystem::types::{MethodSigDesc, Primitive, TypeDesc};
use crate::typesystem::{ClassRc, ClassRef, Context};

pub use crate::coerce::{type_to_machine_type, MachineType};

/// Engine-level classification of a stack value, used to select
/// load/store/return instruction shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineType {
    /// 32-bit integer category (bool, chars, small ints, `i32`, `u32`)
    I4,
    /// 64-bit integer category
    I8,
    /// Native integer / unmanaged pointer category
    I,
    /// Floating-point category (everything widens to native float)
    F,
    /// Object reference
    O,
    /// Managed pointer (by-ref)
    M,
    /// Managed value (a struct by value)
    MV,
    /// Typed reference
    TypedRef,
    /// No value (void returns)
    Invalid,
}

/// Classify a type into its engine category. Enums classify as their
/// underlying type.
#[must_use]
pub fn engine_type_of(desc: &TypeDesc) -> EngineType {
    let desc = desc.enum_underlying();
    if let Some(prim) = desc.as_primitive() {
        return match prim {
            Primitive::Void => EngineType::Invalid,
            Primitive::Boolean
            | Primitive::Char
            | Primitive::I1
            | Primitive::U1
            | Primitive::I2
            | Primitive::U2
            | Primitive::I4
            | Primitive::U4 => EngineType::I4,
            Primitive::I8 | Primitive::U8 => EngineType::I8,
            Primitive::I | Primitive::U => EngineType::I,
            Primitive::R4 | Primitive::R8 | Primitive::R => EngineType::F,
            Primitive::TypedRef => EngineType::TypedRef,
            Primitive::String | Primitive::Object | Primitive::Null => EngineType::O,
        };
    }
    match desc.strip_prefixes() {
        TypeDesc::Value(_) => EngineType::MV,
        TypeDesc::ByRef(_) => EngineType::M,
        TypeDesc::Pointer(_) | TypeDesc::Method(_) => EngineType::I,
        _ => EngineType::O,
    }
}

/// A parameter type as seen by the coder.
#[derive(Clone, Debug)]
pub enum CoderParamType {
    /// The `this` parameter of a value-type owner: a managed pointer, not
    /// the value type itself, so the caller applies by-ref handling
    ValueThisPointer,
    /// An ordinary typed parameter
    Type(TypeDesc),
}

/// The type of parameter `num` of the current method, counting the
/// implicit `this` as parameter 0 when present. Returns `None` for an
/// invalid parameter number.
#[must_use]
pub fn param_type(
    signature: &MethodSigDesc,
    method: &Arc<Method>,
    num: u32,
) -> Option<CoderParamType> {
    if signature.has_this {
        if num == 0 {
            let owner = method.owner()?;
            if owner.is_value_type() {
                return Some(CoderParamType::ValueThisPointer);
            }
            if let Some(synthetic) = owner.synthetic.get() {
                return Some(CoderParamType::Type(synthetic.clone()));
            }
            return Some(CoderParamType::Type(TypeDesc::Class(ClassRef::new(&owner))));
        }
        return signature
            .params
            .get(num as usize - 1)
            .cloned()
            .map(CoderParamType::Type);
    }
    signature
        .params
        .get(num as usize)
        .cloned()
        .map(CoderParamType::Type)
}

/// One entry of the coder's verification stack.
#[derive(Clone, Debug)]
pub struct CoderStackItem {
    /// The managed type, when one applies
    pub type_info: Option<TypeDesc>,
    /// The engine category
    pub engine_type: EngineType,
}

/// Load the arguments `from ..= to` onto the coder stack, invoking
/// `load_arg` for each so the backend can emit its load.
pub fn load_args(
    stack: &mut Vec<CoderStackItem>,
    load_arg: &mut dyn FnMut(u32, &CoderParamType),
    signature: &MethodSigDesc,
    method: &Arc<Method>,
    from: u32,
    to: u32,
) {
    for current in from..=to {
        let Some(param) = param_type(signature, method, current) else {
            continue;
        };
        let item = match &param {
            CoderParamType::ValueThisPointer => CoderStackItem {
                type_info: None,
                engine_type: EngineType::M,
            },
            CoderParamType::Type(desc) => CoderStackItem {
                type_info: Some(desc.clone()),
                engine_type: engine_type_of(desc),
            },
        };
        load_arg(current, &param);
        stack.push(item);
    }
}

/// Build the stack item for a method's return value. Managed-pointer
/// returns carry the by-ref form of their type; `void` returns carry no
/// value at all.
#[must_use]
pub fn return_stack_item(return_type: &TypeDesc) -> CoderStackItem {
    if matches!(return_type.as_primitive(), Some(Primitive::Void)) {
        return CoderStackItem {
            type_info: None,
            engine_type: EngineType::Invalid,
        };
    }
    let engine_type = engine_type_of(return_type);
    if engine_type == EngineType::M {
        CoderStackItem {
            type_info: Some(TypeDesc::ByRef(Arc::new(
                return_type.strip_prefixes().clone(),
            ))),
            engine_type,
        }
    } else {
        CoderStackItem {
            type_info: Some(return_type.clone()),
            engine_type,
        }
    }
}

/// The structural type a class stands for: its synthetic type for
/// compiler-generated classes, otherwise its value or object form.
#[must_use]
pub fn class_to_type(class: &ClassRc) -> TypeDesc {
    if let Some(synthetic) = class.synthetic.get() {
        return synthetic.clone();
    }
    if class.is_value_type() {
        TypeDesc::Value(ClassRef::new(class))
    } else {
        TypeDesc::Class(ClassRef::new(class))
    }
}

/// How to box one value.
#[derive(Clone, Debug)]
pub enum BoxOperation {
    /// Store through a narrower type than the stack value's width
    Smaller {
        /// The box class
        class: ClassRc,
        /// The store width to use
        store_type: TypeDesc,
    },
    /// Store the full value
    Full {
        /// The box class
        class: ClassRc,
        /// Size of the boxed payload in bytes
        size: u32,
    },
}

/// Decide how to box a stack value of category `value_type` into
/// `box_class`, crossing the engine type with the raw element type of the
/// box target to pick the narrowest correct store width.
///
/// Boxing a managed value (or typed reference) requires `static_type` to
/// be identical to the box target's type. Returns `None` for invalid
/// combinations.
#[must_use]
pub fn box_value(
    ctx: &Arc<Context>,
    value_type: EngineType,
    static_type: Option<&TypeDesc>,
    box_class: &ClassRc,
) -> Option<BoxOperation> {
    // Determine the raw version of the boxing type
    let raw_type = class_to_type(box_class).enum_underlying();
    let size = layout::size_of_type(ctx, &raw_type).ok()?;

    if let Some(prim) = raw_type.as_primitive() {
        let native_is_32bit = std::mem::size_of::<usize>() == 4;
        match value_type {
            EngineType::I4 => {
                // Determine if we are boxing a byte, short, or int based
                // on the raw type
                return match prim {
                    Primitive::Boolean | Primitive::I1 | Primitive::U1 => {
                        Some(BoxOperation::Smaller {
                            class: box_class.clone(),
                            store_type: TypeDesc::Primitive(Primitive::I1),
                        })
                    }
                    Primitive::I2 | Primitive::U2 | Primitive::Char => {
                        Some(BoxOperation::Smaller {
                            class: box_class.clone(),
                            store_type: TypeDesc::Primitive(Primitive::I2),
                        })
                    }
                    Primitive::I4 | Primitive::U4 => Some(BoxOperation::Full {
                        class: box_class.clone(),
                        size,
                    }),
                    Primitive::I | Primitive::U if native_is_32bit => {
                        Some(BoxOperation::Full {
                            class: box_class.clone(),
                            size,
                        })
                    }
                    _ => None,
                };
            }
            EngineType::I => {
                return match prim {
                    Primitive::I | Primitive::U => Some(BoxOperation::Full {
                        class: box_class.clone(),
                        size,
                    }),
                    _ => None,
                };
            }
            EngineType::I8 => {
                return match prim {
                    Primitive::I8 | Primitive::U8 => Some(BoxOperation::Full {
                        class: box_class.clone(),
                        size,
                    }),
                    _ => None,
                };
            }
            EngineType::F => {
                // Float or double, based on the raw element type
                return match prim {
                    Primitive::R4 => Some(BoxOperation::Smaller {
                        class: box_class.clone(),
                        store_type: TypeDesc::Primitive(Primitive::R4),
                    }),
                    Primitive::R8 | Primitive::R => Some(BoxOperation::Smaller {
                        class: box_class.clone(),
                        store_type: TypeDesc::Primitive(Primitive::R8),
                    }),
                    _ => None,
                };
            }
            _ => return None,
        }
    }

    if matches!(value_type, EngineType::MV | EngineType::TypedRef) {
        let static_type = static_type?;
        if static_type.identical(&class_to_type(box_class)) {
            return Some(BoxOperation::Full {
                class: box_class.clone(),
                size,
            });
        }
    }
    None
}

/// Box a value reached through a pointer: the static type must be
/// identical to the box target's type.
#[must_use]
pub fn box_pointer(
    ctx: &Arc<Context>,
    static_type: &TypeDesc,
    box_class: &ClassRc,
) -> Option<BoxOperation> {
    let raw_type = class_to_type(box_class).enum_underlying();
    let size = layout::size_of_type(ctx, &raw_type).ok()?;
    if static_type.identical(&class_to_type(box_class)) {
        return Some(BoxOperation::Full {
            class: box_class.clone(),
            size,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::attrs::{FieldAttributes, MethodAttributes, TypeAttributes};
    use crate::typesystem::context::testkit::*;

    fn value_class(
        ctx: &Arc<Context>,
        image: usize,
        row: u32,
        name: &str,
        field_type: TypeDesc,
    ) -> ClassRc {
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let class = make_class(ctx, image, row, name, "System", TypeAttributes::PUBLIC, Some(&value_type));
        add_field(&class, row, "m_value", FieldAttributes::PRIVATE, field_type);
        class
    }

    #[test]
    fn engine_type_classification() {
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::Boolean)), EngineType::I4);
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::U4)), EngineType::I4);
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::I8)), EngineType::I8);
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::R4)), EngineType::F);
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::String)), EngineType::O);
        assert_eq!(engine_type_of(&TypeDesc::Primitive(Primitive::I)), EngineType::I);
        assert_eq!(
            engine_type_of(&TypeDesc::ByRef(Arc::new(TypeDesc::Primitive(Primitive::I4)))),
            EngineType::M
        );
        assert_eq!(
            engine_type_of(&TypeDesc::Pointer(Arc::new(TypeDesc::Primitive(Primitive::I4)))),
            EngineType::I
        );
    }

    #[test]
    fn value_type_this_is_a_managed_pointer() {
        let (ctx, image) = system_context();
        let point = value_class(&ctx, image, 600, "CoderPoint", TypeDesc::Primitive(Primitive::I4));
        let signature = MethodSigDesc {
            has_this: true,
            explicit_this: false,
            call_conv: 0,
            return_type: TypeDesc::Primitive(Primitive::Void),
            params: vec![TypeDesc::Primitive(Primitive::I8)],
        };
        let method = add_method(&point, 600, "Mutate", MethodAttributes::PUBLIC, signature.clone());

        let this = param_type(&signature, &method, 0).unwrap();
        assert!(matches!(this, CoderParamType::ValueThisPointer));

        let first = param_type(&signature, &method, 1).unwrap();
        match first {
            CoderParamType::Type(desc) => {
                assert!(desc.identical(&TypeDesc::Primitive(Primitive::I8)));
            }
            other => panic!("expected a typed parameter, got {other:?}"),
        }
        assert!(param_type(&signature, &method, 2).is_none());
    }

    #[test]
    fn reference_this_is_the_owner_class() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 601, "CoderRef", "App", TypeAttributes::PUBLIC, Some(&object));
        let signature = MethodSigDesc {
            has_this: true,
            explicit_this: false,
            call_conv: 0,
            return_type: TypeDesc::Primitive(Primitive::Void),
            params: vec![],
        };
        let method = add_method(&class, 601, "Touch", MethodAttributes::PUBLIC, signature.clone());

        let this = param_type(&signature, &method, 0).unwrap();
        match this {
            CoderParamType::Type(desc) => {
                assert!(desc.identical(&TypeDesc::Class(ClassRef::new(&class))));
            }
            other => panic!("expected the owner type, got {other:?}"),
        }
    }

    #[test]
    fn load_args_classifies_each_slot() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 602, "CoderArgs", "App", TypeAttributes::PUBLIC, Some(&object));
        let signature = MethodSigDesc {
            has_this: false,
            explicit_this: false,
            call_conv: 0,
            return_type: TypeDesc::Primitive(Primitive::Void),
            params: vec![
                TypeDesc::Primitive(Primitive::I4),
                TypeDesc::Primitive(Primitive::R8),
            ],
        };
        let method = add_method(
            &class,
            602,
            "Go",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            signature.clone(),
        );

        let mut stack = Vec::new();
        let mut loaded = Vec::new();
        load_args(
            &mut stack,
            &mut |index, _| loaded.push(index),
            &signature,
            &method,
            0,
            1,
        );
        assert_eq!(loaded, vec![0, 1]);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].engine_type, EngineType::I4);
        assert_eq!(stack[1].engine_type, EngineType::F);
    }

    #[test]
    fn return_item_wraps_managed_pointers() {
        let void_item = return_stack_item(&TypeDesc::Primitive(Primitive::Void));
        assert_eq!(void_item.engine_type, EngineType::Invalid);
        assert!(void_item.type_info.is_none());

        let byref = TypeDesc::ByRef(Arc::new(TypeDesc::Primitive(Primitive::I4)));
        let item = return_stack_item(&byref);
        assert_eq!(item.engine_type, EngineType::M);
        assert!(item.type_info.is_some());

        let string_item = return_stack_item(&TypeDesc::Primitive(Primitive::String));
        assert_eq!(string_item.engine_type, EngineType::O);
    }

    #[test]
    fn boxing_picks_the_narrowest_store() {
        let (ctx, image) = system_context();
        let byte_class = value_class(&ctx, image, 603, "Byte", TypeDesc::Primitive(Primitive::U1));
        let short_class = value_class(&ctx, image, 604, "Int16", TypeDesc::Primitive(Primitive::I2));
        let int_class = value_class(&ctx, image, 605, "Int32", TypeDesc::Primitive(Primitive::I4));
        let single_class = value_class(&ctx, image, 606, "Single", TypeDesc::Primitive(Primitive::R4));
        let long_class = value_class(&ctx, image, 607, "Int64", TypeDesc::Primitive(Primitive::I8));

        match box_value(&ctx, EngineType::I4, None, &byte_class).unwrap() {
            BoxOperation::Smaller { store_type, .. } => {
                assert!(store_type.identical(&TypeDesc::Primitive(Primitive::I1)));
            }
            other => panic!("expected a narrowing box, got {other:?}"),
        }
        match box_value(&ctx, EngineType::I4, None, &short_class).unwrap() {
            BoxOperation::Smaller { store_type, .. } => {
                assert!(store_type.identical(&TypeDesc::Primitive(Primitive::I2)));
            }
            other => panic!("expected a narrowing box, got {other:?}"),
        }
        match box_value(&ctx, EngineType::I4, None, &int_class).unwrap() {
            BoxOperation::Full { size, .. } => assert_eq!(size, 4),
            other => panic!("expected a full box, got {other:?}"),
        }
        match box_value(&ctx, EngineType::F, None, &single_class).unwrap() {
            BoxOperation::Smaller { store_type, .. } => {
                assert!(store_type.identical(&TypeDesc::Primitive(Primitive::R4)));
            }
            other => panic!("expected a narrowing box, got {other:?}"),
        }
        match box_value(&ctx, EngineType::I8, None, &long_class).unwrap() {
            BoxOperation::Full { size, .. } => assert_eq!(size, 8),
            other => panic!("expected a full box, got {other:?}"),
        }

        // Width mismatches are invalid
        assert!(box_value(&ctx, EngineType::I8, None, &int_class).is_none());
        assert!(box_value(&ctx, EngineType::I4, None, &long_class).is_none());
    }

    #[test]
    fn boxing_managed_values_requires_identical_types() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let pair = make_class(&ctx, image, 608, "BoxPair", "App", TypeAttributes::PUBLIC, Some(&value_type));
        add_field(&pair, 610, "a", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        add_field(&pair, 611, "b", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        let pair_type = TypeDesc::Value(ClassRef::new(&pair));

        let boxed = box_value(&ctx, EngineType::MV, Some(&pair_type), &pair).unwrap();
        match boxed {
            BoxOperation::Full { size, .. } => assert_eq!(size, 8),
            other => panic!("expected a full box, got {other:?}"),
        }

        // A different static type is rejected
        let other_type = TypeDesc::Primitive(Primitive::I4);
        assert!(box_value(&ctx, EngineType::MV, Some(&other_type), &pair).is_none());
        // And a missing static type as well
        assert!(box_value(&ctx, EngineType::MV, None, &pair).is_none());

        assert!(box_pointer(&ctx, &pair_type, &pair).is_some());
        assert!(box_pointer(&ctx, &other_type, &pair).is_none());
    }
}
