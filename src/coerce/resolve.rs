//! Member resolution by name and signature.
//!
//! Walks a class's declaration-ordered method list (and, unless told not
//! to, its ancestors) for a member matching a name, argument list and
//! optional return type, applying accessibility checks against the call
//! scope. An exact signature match wins immediately; otherwise the first
//! candidate whose parameters are merely coercible is remembered and
//! returned when the scan finds nothing exact.

use std::sync::Arc;

use crate::coerce::can_coerce;
use crate::typesystem::attrs::MethodAttributes;
use crate::typesystem::member::Method;
use crate::typesystem::types::TypeDesc;
use crate::typesystem::{ClassRc, Context};

/// Attribute bits that characterize the kind of method being looked up.
fn method_type_attrs() -> MethodAttributes {
    MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME
}

/// Internal worker for locating methods.
#[allow(clippy::too_many_arguments)]
fn resolve_method_worker(
    ctx: &Arc<Context>,
    class: &ClassRc,
    call_scope: Option<&ClassRc>,
    name: &str,
    args: &[TypeDesc],
    return_type: Option<&TypeDesc>,
    attrs: MethodAttributes,
    normal_or_virtual: bool,
    dont_inherit: bool,
) -> Option<Arc<Method>> {
    let mut closest_match: Option<Arc<Method>> = None;
    let mut current = Some(class.resolve());

    while let Some(class) = current {
        for (_, method) in class.methods.iter() {
            // Filter out members that aren't interesting
            if method.name != name
                || method.attributes.intersection(method_type_attrs()) != attrs
            {
                continue;
            }
            if !normal_or_virtual && method.is_virtual() {
                continue;
            }

            // Check that this is the signature we are interested in
            let signature = method.signature();
            if let Some(expected) = return_type {
                if !expected.identical(&signature.return_type) {
                    continue;
                }
            }
            if signature.params.len() != args.len() {
                continue;
            }
            let mut same = true;
            let mut compatible = true;
            for (declared, actual) in signature.params.iter().zip(args) {
                if !declared.identical(actual) {
                    if !can_coerce(ctx, declared, actual) {
                        compatible = false;
                        break;
                    }
                    same = false;
                }
            }
            if !compatible {
                continue;
            }

            // Check the method's access level against the call scope; an
            // inaccessible candidate aborts the whole search
            if !method.accessible_to(call_scope) {
                return None;
            }

            if same {
                // We have an exact match, so return that
                return Some(method.clone());
            }
            if closest_match.is_none() {
                closest_match = Some(method.clone());
            }
        }
        current = if dont_inherit { None } else { class.parent() };
    }

    // Return the closest match if we didn't find an exact match
    closest_match
}

/// Resolve a static method by name and argument types.
#[must_use]
pub fn resolve_static_method(
    ctx: &Arc<Context>,
    class: &ClassRc,
    call_scope: Option<&ClassRc>,
    name: &str,
    args: &[TypeDesc],
) -> Option<Arc<Method>> {
    resolve_method_worker(
        ctx,
        class,
        call_scope,
        name,
        args,
        None,
        MethodAttributes::STATIC,
        false,
        false,
    )
}

/// Resolve an instance method (normal or virtual) by name and argument
/// types.
#[must_use]
pub fn resolve_instance_method(
    ctx: &Arc<Context>,
    class: &ClassRc,
    call_scope: Option<&ClassRc>,
    name: &str,
    args: &[TypeDesc],
) -> Option<Arc<Method>> {
    resolve_method_worker(
        ctx,
        class,
        call_scope,
        name,
        args,
        None,
        MethodAttributes::empty(),
        true,
        false,
    )
}

/// Resolve a constructor by argument types. Constructors are never
/// inherited.
#[must_use]
pub fn resolve_constructor(
    ctx: &Arc<Context>,
    class: &ClassRc,
    call_scope: Option<&ClassRc>,
    args: &[TypeDesc],
) -> Option<Arc<Method>> {
    resolve_method_worker(
        ctx,
        class,
        call_scope,
        ".ctor",
        args,
        Some(&TypeDesc::Primitive(crate::typesystem::Primitive::Void)),
        MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
        false,
        true,
    )
}

/// Resolve a user-defined unary operator (`op_Negation`, ...).
#[must_use]
pub fn resolve_unary_operator(
    ctx: &Arc<Context>,
    class: &ClassRc,
    name: &str,
    arg: &TypeDesc,
) -> Option<Arc<Method>> {
    resolve_method_worker(
        ctx,
        class,
        None,
        name,
        std::slice::from_ref(arg),
        None,
        MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
        false,
        false,
    )
}

/// Resolve a user-defined binary operator (`op_Addition`, ...).
#[must_use]
pub fn resolve_binary_operator(
    ctx: &Arc<Context>,
    class: &ClassRc,
    name: &str,
    arg1: &TypeDesc,
    arg2: &TypeDesc,
) -> Option<Arc<Method>> {
    let args = [arg1.clone(), arg2.clone()];
    resolve_method_worker(
        ctx,
        class,
        None,
        name,
        &args,
        None,
        MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
        false,
        false,
    )
}

/// Resolve a user-defined conversion operator (`op_Implicit` or
/// `op_Explicit`) from `from` to `to`.
#[must_use]
pub fn resolve_conversion_operator(
    ctx: &Arc<Context>,
    class: &ClassRc,
    name: &str,
    from: &TypeDesc,
    to: &TypeDesc,
) -> Option<Arc<Method>> {
    resolve_method_worker(
        ctx,
        class,
        None,
        name,
        std::slice::from_ref(from),
        Some(to),
        MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
        false,
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::attrs::TypeAttributes;
    use crate::typesystem::context::testkit::*;
    use crate::typesystem::types::{MethodSigDesc, Primitive};

    fn static_sig(params: Vec<TypeDesc>, ret: TypeDesc) -> MethodSigDesc {
        MethodSigDesc {
            has_this: false,
            explicit_this: false,
            call_conv: 0,
            return_type: ret,
            params,
        }
    }

    fn instance_sig(params: Vec<TypeDesc>, ret: TypeDesc) -> MethodSigDesc {
        MethodSigDesc {
            has_this: true,
            ..static_sig(params, ret)
        }
    }

    fn i4() -> TypeDesc {
        TypeDesc::Primitive(Primitive::I4)
    }

    fn i8() -> TypeDesc {
        TypeDesc::Primitive(Primitive::I8)
    }

    #[test]
    fn exact_match_beats_coercible_match() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 400, "Calc", "App", TypeAttributes::PUBLIC, Some(&object));
        let with_long = add_method(
            &class,
            400,
            "Run",
            MethodAttributes::PUBLIC,
            instance_sig(vec![i8()], i4()),
        );
        let with_int = add_method(
            &class,
            401,
            "Run",
            MethodAttributes::PUBLIC,
            instance_sig(vec![i4()], i4()),
        );

        let found = resolve_instance_method(&ctx, &class, None, "Run", &[i4()]).unwrap();
        assert!(Arc::ptr_eq(&found, &with_int));
        let found = resolve_instance_method(&ctx, &class, None, "Run", &[i8()]).unwrap();
        assert!(Arc::ptr_eq(&found, &with_long));
    }

    #[test]
    fn first_coercible_candidate_wins_without_exact_match() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 401, "Close", "App", TypeAttributes::PUBLIC, Some(&object));
        // Both candidates accept an I2 argument only through coercion; the
        // declaration order decides
        let first = add_method(
            &class,
            410,
            "Go",
            MethodAttributes::PUBLIC,
            instance_sig(vec![i4()], i4()),
        );
        let _second = add_method(
            &class,
            411,
            "Go",
            MethodAttributes::PUBLIC,
            instance_sig(vec![i8()], i4()),
        );

        // Neither declared parameter is identical to double, but both
        // coerce to it; the first candidate scanned is the one returned
        let found = resolve_instance_method(
            &ctx,
            &class,
            None,
            "Go",
            &[TypeDesc::Primitive(Primitive::R8)],
        )
        .unwrap();
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn methods_are_found_in_ancestors() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 402, "RBase", "App", TypeAttributes::PUBLIC, Some(&object));
        let inherited = add_method(
            &base,
            420,
            "Shared",
            MethodAttributes::PUBLIC,
            instance_sig(vec![], i4()),
        );
        let derived = make_class(&ctx, image, 403, "RDerived", "App", TypeAttributes::PUBLIC, Some(&base));

        let found = resolve_instance_method(&ctx, &derived, None, "Shared", &[]).unwrap();
        assert!(Arc::ptr_eq(&found, &inherited));
    }

    #[test]
    fn constructors_are_not_inherited() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let base = make_class(&ctx, image, 404, "CBase2", "App", TypeAttributes::PUBLIC, Some(&object));
        add_method(
            &base,
            430,
            ".ctor",
            MethodAttributes::PUBLIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            instance_sig(vec![], TypeDesc::Primitive(Primitive::Void)),
        );
        let derived = make_class(&ctx, image, 405, "CDerived2", "App", TypeAttributes::PUBLIC, Some(&base));

        assert!(resolve_constructor(&ctx, &base, None, &[]).is_some());
        assert!(resolve_constructor(&ctx, &derived, None, &[]).is_none());
    }

    #[test]
    fn inaccessible_candidate_aborts_the_search() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 406, "Locked", "App", TypeAttributes::PUBLIC, Some(&object));
        add_method(
            &class,
            440,
            "Secret",
            MethodAttributes::PRIVATE,
            instance_sig(vec![], i4()),
        );
        // A different public class is not allowed in
        let outsider = make_class(&ctx, image, 407, "Outsider", "App", TypeAttributes::PUBLIC, Some(&object));
        assert!(resolve_instance_method(&ctx, &class, Some(&outsider), "Secret", &[]).is_none());
        // The owner itself is
        assert!(resolve_instance_method(&ctx, &class, Some(&class), "Secret", &[]).is_some());
    }

    #[test]
    fn conversion_operator_matches_signature_exactly() {
        let (ctx, image) = system_context();
        let value_type = ctx.lookup_global("System", "ValueType").unwrap();
        let money = make_class(&ctx, image, 408, "Money", "App", TypeAttributes::PUBLIC, Some(&value_type));
        let money_type = TypeDesc::Value(crate::typesystem::ClassRef::new(&money));
        let to_long = add_method(
            &money,
            450,
            "op_Implicit",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
            static_sig(vec![money_type.clone()], i8()),
        );

        let found =
            resolve_conversion_operator(&ctx, &money, "op_Implicit", &money_type, &i8()).unwrap();
        assert!(Arc::ptr_eq(&found, &to_long));
        assert!(
            resolve_conversion_operator(&ctx, &money, "op_Implicit", &money_type, &i4()).is_none()
        );

        // The coercion engine picks the operator up as a user-defined rule
        assert!(crate::coerce::can_coerce(&ctx, &money_type, &i8()));
        let rules = crate::coerce::get_convert_rules(
            &ctx,
            &money_type,
            &i8(),
            false,
            crate::coerce::ConvertKinds::ALL,
        )
        .unwrap();
        assert!(rules.method.is_some());
    }

    #[test]
    fn static_and_instance_lookups_are_disjoint() {
        let (ctx, image) = system_context();
        let object = ctx.lookup_global("System", "Object").unwrap();
        let class = make_class(&ctx, image, 409, "Mixed", "App", TypeAttributes::PUBLIC, Some(&object));
        add_method(
            &class,
            460,
            "OnlyStatic",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            static_sig(vec![], i4()),
        );
        assert!(resolve_static_method(&ctx, &class, None, "OnlyStatic", &[]).is_some());
        assert!(resolve_instance_method(&ctx, &class, None, "OnlyStatic", &[]).is_none());
    }
}
