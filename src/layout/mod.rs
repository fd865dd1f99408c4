//! Class and type layout.
//!
//! Computes `{instance size, alignment, static-block size, vtable}` for a
//! class, memoized per class and immutable once set. Layout is strictly
//! bottom-up: the parent and every instance value-type field are laid out
//! first, and a cycle (a value type embedding itself) is a typed error
//! detected through a per-class in-layout flag, not a crash.
//!
//! First-time layout is serialized by the owning [`Context`]'s layout
//! lock ("compute once, read many"); readers that hit the memoized result
//! never take the lock.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::typesystem::attrs::{LayoutKind, MethodAttributes};
use crate::typesystem::member::Method;
use crate::typesystem::types::{Primitive, TypeDesc};
use crate::typesystem::{ClassRc, Context};
use crate::Result;

/// Maximum number of vtable slots a class may use.
pub const MAX_VTABLE_SLOTS: u32 = 65535;

/// The memoized physical shape of a class.
#[derive(Debug)]
pub struct LayoutData {
    /// Instance size in bytes (excluding any object header)
    pub size: u32,
    /// Instance alignment in bytes
    pub alignment: u32,
    /// Size of the zero-based static block (not inherited)
    pub static_size: u32,
    /// Virtual dispatch table, indexed by slot
    pub vtable: Vec<Arc<Method>>,
}

/// Size and alignment of a type, as a field or stack value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeLayout {
    /// Size in bytes
    pub size: u32,
    /// Alignment in bytes
    pub alignment: u32,
}

/// Whether layout-control metadata (explicit offsets, RVA-mapped statics)
/// may be honored for `class`.
///
/// This is the seam where an embedder's security manager plugs in; the
/// engine itself grants layout control to every class.
fn layout_control_permitted(_class: &ClassRc) -> bool {
    true
}

/// Lay out `class`, memoizing the result on the class.
///
/// # Errors
/// Returns the typed layout failures of [`crate::Error`]; the class is
/// then permanently unusable and callers must not retry.
pub fn layout_class(ctx: &Arc<Context>, class: &ClassRc) -> Result<Arc<LayoutData>> {
    let resolved = class.resolve();
    if let Some(data) = resolved.layout.get() {
        return Ok(data.clone());
    }
    let _guard = ctx.layout_lock.lock().expect("layout lock poisoned");
    layout_class_locked(ctx, &resolved)
}

/// Size and alignment of `desc` as a field or by-value argument.
///
/// # Errors
/// Fails when a value-type class in `desc` cannot be laid out.
pub fn layout_type(ctx: &Arc<Context>, desc: &TypeDesc) -> Result<TypeLayout> {
    match desc.strip_prefixes() {
        TypeDesc::Value(_) => {
            let class = desc
                .as_class()
                .ok_or_else(|| malformed_error!("value type without a class"))?;
            let data = layout_class(ctx, &class)?;
            Ok(TypeLayout {
                size: data.size,
                alignment: data.alignment,
            })
        }
        other => layout_type_shallow(other),
    }
}

/// Size in bytes of `desc`; the by-value size the invocation engine uses.
///
/// # Errors
/// Same conditions as [`layout_type`].
pub fn size_of_type(ctx: &Arc<Context>, desc: &TypeDesc) -> Result<u32> {
    Ok(layout_type(ctx, desc)?.size)
}

fn layout_class_locked(ctx: &Arc<Context>, class: &ClassRc) -> Result<Arc<LayoutData>> {
    let resolved = class.resolve();
    if let Some(data) = resolved.layout.get() {
        return Ok(data.clone());
    }
    // A layout loop occurs when a class attempts to include itself in a
    // value type field
    if resolved.in_layout.swap(true, Ordering::AcqRel) {
        return Err(crate::Error::LayoutCycle(resolved.token()));
    }
    let result = compute_layout(ctx, &resolved);
    resolved.in_layout.store(false, Ordering::Release);

    let data = result?;
    let data = Arc::new(data);
    let _ = resolved.layout.set(data.clone());
    Ok(data)
}

fn layout_field_type(ctx: &Arc<Context>, desc: &TypeDesc) -> Result<TypeLayout> {
    match desc.strip_prefixes() {
        TypeDesc::Value(_) => {
            // A value type is laid out with the full size and alignment of
            // the class that underlies it
            let class = desc
                .as_class()
                .ok_or_else(|| malformed_error!("value type without a class"))?;
            let data = layout_class_locked(ctx, &class)?;
            Ok(TypeLayout {
                size: data.size,
                alignment: data.alignment,
            })
        }
        other => layout_type_shallow(other),
    }
}

/// Layout of everything that does not recurse into a class body.
fn layout_type_shallow(desc: &TypeDesc) -> Result<TypeLayout> {
    let pointer = TypeLayout {
        size: std::mem::size_of::<usize>() as u32,
        alignment: std::mem::align_of::<usize>() as u32,
    };
    match desc {
        TypeDesc::Primitive(prim) => {
            let layout = match prim {
                Primitive::Boolean | Primitive::I1 | Primitive::U1 => TypeLayout {
                    size: 1,
                    alignment: 1,
                },
                Primitive::Char | Primitive::I2 | Primitive::U2 => TypeLayout {
                    size: 2,
                    alignment: 2,
                },
                Primitive::I4 | Primitive::U4 | Primitive::R4 => TypeLayout {
                    size: 4,
                    alignment: 4,
                },
                Primitive::I8 | Primitive::U8 => TypeLayout {
                    size: 8,
                    alignment: std::mem::align_of::<u64>() as u32,
                },
                Primitive::R8 | Primitive::R => TypeLayout {
                    size: 8,
                    alignment: std::mem::align_of::<f64>() as u32,
                },
                Primitive::I | Primitive::U => pointer,
                Primitive::String | Primitive::Object => pointer,
                Primitive::Void | Primitive::TypedRef | Primitive::Null => {
                    return Err(malformed_error!(
                        "type {:?} has no field layout",
                        prim
                    ))
                }
            };
            Ok(layout)
        }
        // Object references, pointers, byrefs and method pointers are all
        // machine pointers
        _ => Ok(pointer),
    }
}

fn compute_layout(ctx: &Arc<Context>, class: &ClassRc) -> Result<LayoutData> {
    // Lay out the parent class first; a top-level class (normally
    // "System.Object") starts empty
    let (mut size, mut alignment, mut vtable_len, parent_vtable, parent) = match class.parent() {
        Some(parent) => {
            let parent_layout = layout_class_locked(ctx, &parent)
                .map_err(|_| crate::Error::LayoutFailed(class.token()))?;
            (
                parent_layout.size,
                parent_layout.alignment,
                parent_layout.vtable.len() as u32,
                parent_layout.vtable.clone(),
                Some(parent),
            )
        }
        None => (0, 1, 0, Vec::new(), None),
    };

    // The static block is zero-based and recomputed for each class
    let mut static_size: u32 = 0;

    // Lay out the interfaces this class implements; this validates them
    // without contributing to the instance size
    for (_, implemented) in class.implements.iter() {
        let Some(interface) = implemented.upgrade() else {
            continue;
        };
        layout_class_locked(ctx, &interface.resolve())
            .map_err(|_| crate::Error::LayoutFailed(class.token()))?;
    }

    // Explicit layout is honored only when the security check permits
    // layout control for this class
    let mut packing_size: u32 = 0;
    let mut explicit_size: u32 = 0;
    let mut allow_field_layout = false;
    let allow_rva_layout = layout_control_permitted(class);
    if class.attributes().layout_kind() == LayoutKind::Explicit && allow_rva_layout {
        if let Some(&(packing, declared_size)) = class.class_layout.get() {
            if packing != 0 && packing != 1 && packing != 2 && packing != 4 && packing != 8 {
                return Err(crate::Error::LayoutInvalidPacking {
                    token: class.token(),
                    size: packing,
                });
            }
            packing_size = u32::from(packing);
            explicit_size = declared_size;
            allow_field_layout = true;
        }
    }

    // Straight-forward field allocation, which will usually match the
    // algorithm used by the platform C compiler
    let mut max_alignment: u32 = 1;
    for (_, field) in class.fields.iter() {
        if !field.is_static() {
            let mut field_layout = layout_field_type(ctx, field.signature())
                .map_err(|error| match error {
                    crate::Error::LayoutCycle(token) => crate::Error::LayoutCycle(token),
                    _ => crate::Error::LayoutFailed(class.token()),
                })?;

            if packing_size != 0 && packing_size < field_layout.alignment {
                field_layout.alignment = packing_size;
            }

            let explicit = if allow_field_layout {
                field.explicit_offset.get().copied()
            } else {
                None
            };
            if let Some(offset) = explicit {
                // Explicit offset: extend the default class size to include
                // the field
                field.set_offset(offset);
                if offset + field_layout.size > size {
                    size = offset + field_layout.size;
                }
            } else {
                if size % field_layout.alignment != 0 {
                    size += field_layout.alignment - (size % field_layout.alignment);
                }
                field.set_offset(size);
                size += field_layout.size;
            }

            if field_layout.alignment > max_alignment {
                max_alignment = field_layout.alignment;
            }
        } else if !field.is_literal() {
            // RVA-mapped statics live in the image, not the static block,
            // but only when layout control is permitted
            let has_rva = field.rva.get().is_some();
            if !has_rva || !allow_rva_layout {
                let field_layout = layout_field_type(ctx, field.signature())
                    .map_err(|_| crate::Error::LayoutFailed(class.token()))?;
                if static_size % field_layout.alignment != 0 {
                    static_size += field_layout.alignment - (static_size % field_layout.alignment);
                }
                field.set_offset(static_size);
                static_size += field_layout.size;
            }
        }
    }

    // Final class size from explicit sizes and alignment
    if max_alignment > alignment {
        alignment = max_alignment;
    }
    if explicit_size > size {
        size = explicit_size;
    } else if size % alignment != 0 {
        size += alignment - (size % alignment);
    }

    // Allocate vtable slots to the virtual methods in this class
    for (_, method) in class.methods.iter() {
        if !method.attributes.contains(MethodAttributes::VIRTUAL) {
            continue;
        }
        if method.attributes.contains(MethodAttributes::NEW_SLOT) {
            method.set_vtable_index(vtable_len);
            vtable_len += 1;
        } else {
            match find_virtual_ancestor(class, parent.as_ref(), method) {
                Some(slot) => {
                    // Use the same index as the ancestor
                    method.set_vtable_index(slot);
                }
                None => {
                    // No ancestor, or the ancestor is not accessible due to
                    // permission issues: allocate a fresh slot
                    method.set_vtable_index(vtable_len);
                    vtable_len += 1;
                }
            }
        }
    }

    if vtable_len > MAX_VTABLE_SLOTS {
        return Err(crate::Error::VtableOverflow(class.token()));
    }

    // Build the new vtable as {ancestor vtable ++ new slots}, then let
    // every virtual method defined directly on the class overwrite its slot
    let mut slots: Vec<Option<Arc<Method>>> = parent_vtable.into_iter().map(Some).collect();
    slots.resize(vtable_len as usize, None);
    for (_, method) in class.methods.iter() {
        if method.attributes.contains(MethodAttributes::VIRTUAL) {
            if let Some(slot) = method
                .vtable_index()
                .and_then(|index| slots.get_mut(index as usize))
            {
                *slot = Some(method.clone());
            }
        }
    }
    let vtable: Vec<Arc<Method>> = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(crate::Error::LayoutFailed(class.token()))?;
    debug_assert_eq!(vtable.len() as u32, vtable_len);

    Ok(LayoutData {
        size,
        alignment,
        static_size,
        vtable,
    })
}

/// Find the vtable slot of the virtual method in the ancestor chain that
/// `method` overrides.
///
/// Returns `None` both when no ancestor declares a matching virtual and
/// when the matching ancestor is not accessible from the overriding class
/// (the latter deliberately forces a fresh slot).
fn find_virtual_ancestor(
    scope: &ClassRc,
    ancestor: Option<&ClassRc>,
    method: &Arc<Method>,
) -> Option<u32> {
    let mut current = ancestor.cloned();
    while let Some(class) = current {
        for (_, candidate) in class.methods.iter() {
            if candidate.attributes.contains(MethodAttributes::VIRTUAL)
                && candidate.name == method.name
                && candidate.signature().identical(method.signature())
            {
                if candidate.accessible_to(Some(scope)) {
                    return candidate.vtable_index();
                }
                // The ancestor is not accessible from the original class
                return None;
            }
        }
        current = class.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::attrs::{FieldAttributes, MethodAttributes, TypeAttributes};
    use crate::typesystem::context::testkit::*;
    use crate::typesystem::types::{MethodSigDesc, Primitive, TypeDesc};

    fn sig_void() -> MethodSigDesc {
        MethodSigDesc {
            has_this: true,
            explicit_this: false,
            call_conv: 0,
            return_type: TypeDesc::Primitive(Primitive::Void),
            params: Vec::new(),
        }
    }

    fn sig_void_with(params: Vec<TypeDesc>) -> MethodSigDesc {
        MethodSigDesc {
            params,
            ..sig_void()
        }
    }

    #[test]
    fn natural_field_allocation() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 100, "Fields", "App", TypeAttributes::PUBLIC, Some(&object));
        let field_a = add_field(&class, 100, "a", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        let field_b = add_field(&class, 101, "b", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I1));
        let field_c = add_field(&class, 102, "c", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I8));

        let data = layout_class(&ctx, &class).unwrap();
        assert_eq!(field_a.offset(), Some(0));
        assert_eq!(field_b.offset(), Some(4));
        assert_eq!(field_c.offset(), Some(8));
        assert_eq!(data.size, 16);
        assert_eq!(data.alignment, 8);
        assert_eq!(data.static_size, 0);
    }

    #[test]
    fn layout_is_memoized_and_deterministic() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 101, "Memo", "App", TypeAttributes::PUBLIC, Some(&object));
        add_field(&class, 110, "x", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I2));

        let first = layout_class(&ctx, &class).unwrap();
        let second = layout_class(&ctx, &class).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // A fresh, identically built hierarchy lays out identically
        let (ctx2, image2) = system_context();
        let object2 = ctx2.lookup_global("System", "Object").unwrap();
        let class2 = make_class(&ctx2, image2, 101, "Memo", "App", TypeAttributes::PUBLIC, Some(&object2));
        let field2 = add_field(&class2, 110, "x", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I2));
        let data2 = layout_class(&ctx2, &class2).unwrap();
        assert_eq!(data2.size, first.size);
        assert_eq!(data2.alignment, first.alignment);
        assert_eq!(field2.offset(), Some(0));
    }

    #[test]
    fn inherited_fields_precede_own_fields() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 102, "LBase", "App", TypeAttributes::PUBLIC, Some(&object));
        add_field(&base, 120, "head", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        let derived = make_class(&ctx, image, 103, "LDerived", "App", TypeAttributes::PUBLIC, Some(&base));
        let tail = add_field(&derived, 121, "tail", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));

        let data = layout_class(&ctx, &derived).unwrap();
        assert_eq!(tail.offset(), Some(4));
        assert_eq!(data.size, 8);
    }

    #[test]
    fn statics_use_a_separate_zero_based_block() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 104, "Statics", "App", TypeAttributes::PUBLIC, Some(&object));
        let instance = add_field(&class, 130, "i", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        let stat = add_field(
            &class,
            131,
            "s",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            TypeDesc::Primitive(Primitive::I8),
        );
        let literal = add_field(
            &class,
            132,
            "lit",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
            TypeDesc::Primitive(Primitive::I4),
        );

        let data = layout_class(&ctx, &class).unwrap();
        assert_eq!(instance.offset(), Some(0));
        assert_eq!(stat.offset(), Some(0));
        assert_eq!(data.static_size, 8);
        // Literals take no storage at all
        assert_eq!(literal.offset(), None);
    }

    #[test]
    fn embedded_value_type_is_laid_out_recursively() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let point = make_class(&ctx, image, 105, "Point", "App", TypeAttributes::PUBLIC, Some(&value_type));
        add_field(&point, 140, "x", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        add_field(&point, 141, "y", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));

        let holder = make_class(&ctx, image, 106, "Holder", "App", TypeAttributes::PUBLIC, Some(&object));
        let flag = add_field(&holder, 142, "flag", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::Boolean));
        let position = add_field(
            &holder,
            143,
            "position",
            FieldAttributes::PUBLIC,
            TypeDesc::Value(crate::typesystem::ClassRef::new(&point)),
        );

        let data = layout_class(&ctx, &holder).unwrap();
        assert_eq!(flag.offset(), Some(0));
        assert_eq!(position.offset(), Some(4));
        assert_eq!(data.size, 12);
    }

    #[test]
    fn value_type_cycle_is_an_error() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let looped = make_class(&ctx, image, 107, "Looped", "App", TypeAttributes::PUBLIC, Some(&value_type));
        add_field(
            &looped,
            150,
            "again",
            FieldAttributes::PUBLIC,
            TypeDesc::Value(crate::typesystem::ClassRef::new(&looped)),
        );

        assert!(matches!(
            layout_class(&ctx, &looped),
            Err(crate::Error::LayoutCycle(_))
        ));
        // The failed class is left unusable but siblings still lay out
        let object = ctx.lookup_global("System", "Object").unwrap();
        let ok = make_class(&ctx, image, 108, "Fine", "App", TypeAttributes::PUBLIC, Some(&object));
        assert!(layout_class(&ctx, &ok).is_ok());
    }

    #[test]
    fn explicit_layout_honors_offsets_and_size() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let overlay = make_class(
            &ctx,
            image,
            109,
            "Overlay",
            "App",
            TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT,
            Some(&value_type),
        );
        overlay.class_layout.set((4, 32)).unwrap();
        let low = add_field(&overlay, 160, "low", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        low.explicit_offset.set(0).unwrap();
        let high = add_field(&overlay, 161, "high", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I4));
        high.explicit_offset.set(0).unwrap();
        let wide = add_field(&overlay, 162, "wide", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I8));
        wide.explicit_offset.set(8).unwrap();

        let data = layout_class(&ctx, &overlay).unwrap();
        // Overlapping offsets are accepted; the explicit size wins when
        // larger than the span of the fields
        assert_eq!(low.offset(), Some(0));
        assert_eq!(high.offset(), Some(0));
        assert_eq!(wide.offset(), Some(8));
        assert_eq!(data.size, 32);
    }

    #[test]
    fn invalid_packing_is_rejected() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let bad = make_class(
            &ctx,
            image,
            110,
            "BadPack",
            "App",
            TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT,
            Some(&value_type),
        );
        bad.class_layout.set((3, 0)).unwrap();
        assert!(matches!(
            layout_class(&ctx, &bad),
            Err(crate::Error::LayoutInvalidPacking { size: 3, .. })
        ));
    }

    #[test]
    fn packing_caps_field_alignment() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let packed = make_class(
            &ctx,
            image,
            111,
            "Packed",
            "App",
            TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT,
            Some(&value_type),
        );
        packed.class_layout.set((1, 0)).unwrap();
        let small = add_field(&packed, 170, "small", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::U1));
        let big = add_field(&packed, 171, "big", FieldAttributes::PUBLIC, TypeDesc::Primitive(Primitive::I8));
        // Without explicit offsets the bump allocator runs with capped
        // alignment
        let data = layout_class(&ctx, &packed).unwrap();
        assert_eq!(small.offset(), Some(0));
        assert_eq!(big.offset(), Some(1));
        assert_eq!(data.size, 9);
        assert_eq!(data.alignment, 1);
    }

    #[test]
    fn vtable_slots_are_stable_across_inheritance() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 112, "VBase", "App", TypeAttributes::PUBLIC, Some(&object));
        let base_m = add_method(
            &base,
            200,
            "M",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            sig_void(),
        );
        let base_n = add_method(
            &base,
            201,
            "N",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            sig_void(),
        );

        let derived = make_class(&ctx, image, 113, "VDerived", "App", TypeAttributes::PUBLIC, Some(&base));
        let derived_m = add_method(
            &derived,
            202,
            "M",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
            sig_void(),
        );
        let derived_extra = add_method(
            &derived,
            203,
            "Extra",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            sig_void(),
        );

        let base_data = layout_class(&ctx, &base).unwrap();
        let derived_data = layout_class(&ctx, &derived).unwrap();

        let slot_m = base_m.vtable_index().unwrap();
        assert_eq!(base_n.vtable_index().unwrap(), slot_m + 1);
        assert_eq!(base_data.vtable.len(), 2);

        // The override reuses the ancestor's slot; the vtable entry now
        // points at the derived implementation
        assert_eq!(derived_m.vtable_index().unwrap(), slot_m);
        assert!(Arc::ptr_eq(&derived_data.vtable[slot_m as usize], &derived_m));
        assert!(Arc::ptr_eq(
            &derived_data.vtable[base_n.vtable_index().unwrap() as usize],
            &base_n
        ));
        // A new virtual method lands past the inherited slots
        assert!(derived_extra.vtable_index().unwrap() >= base_data.vtable.len() as u32);
        assert_eq!(derived_data.vtable.len(), 3);
    }

    #[test]
    fn override_distinguishes_signatures() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 114, "SigBase", "App", TypeAttributes::PUBLIC, Some(&object));
        add_method(
            &base,
            210,
            "M",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            sig_void_with(vec![TypeDesc::Primitive(Primitive::I4)]),
        );

        let derived = make_class(&ctx, image, 115, "SigDerived", "App", TypeAttributes::PUBLIC, Some(&base));
        let overload = add_method(
            &derived,
            211,
            "M",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
            sig_void_with(vec![TypeDesc::Primitive(Primitive::I8)]),
        );

        layout_class(&ctx, &derived).unwrap();
        // Different signature: no ancestor matches, so a fresh slot
        assert_eq!(overload.vtable_index().unwrap(), 1);
    }

    #[test]
    fn inaccessible_ancestor_forces_fresh_slot() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 116, "HBase", "App", TypeAttributes::PUBLIC, Some(&object));
        // Assembly-private virtual in image 0
        add_method(
            &base,
            220,
            "Hidden",
            MethodAttributes::ASSEMBLY | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
            sig_void(),
        );

        // Derived class lives in another image, so the ancestor's
        // assembly-private method is not accessible from it
        let other = 1;
        let derived = ctx
            .class_create(
                other,
                crate::typesystem::ClassScope::Module(other),
                crate::metadata::token::Token::new(0x0200_0001),
                "HDerived",
                "Lib",
                TypeAttributes::PUBLIC,
                Some(&base),
            )
            .unwrap();
        let shadow = add_method(
            &derived,
            221,
            "Hidden",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
            sig_void(),
        );

        let data = layout_class(&ctx, &derived).unwrap();
        // Not an override: the method got its own slot past the base's
        assert_eq!(shadow.vtable_index().unwrap(), 1);
        assert_eq!(data.vtable.len(), 2);
    }

    #[test]
    fn size_of_shallow_types() {
        let (ctx, _) = system_context();
        let ptr = std::mem::size_of::<usize>() as u32;
        assert_eq!(size_of_type(&ctx, &TypeDesc::Primitive(Primitive::I4)).unwrap(), 4);
        assert_eq!(size_of_type(&ctx, &TypeDesc::Primitive(Primitive::I8)).unwrap(), 8);
        assert_eq!(size_of_type(&ctx, &TypeDesc::Primitive(Primitive::Object)).unwrap(), ptr);
        assert_eq!(
            size_of_type(
                &ctx,
                &TypeDesc::ByRef(Arc::new(TypeDesc::Primitive(Primitive::I4)))
            )
            .unwrap(),
            ptr
        );
    }
}
