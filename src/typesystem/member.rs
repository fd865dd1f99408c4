//! Class members: fields, methods, parameters, properties and events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::metadata::token::Token;
use crate::typesystem::attrs::{
    FieldAttributes, MethodAttributes, MethodSemanticsAttributes, ParamAttributes,
};
use crate::typesystem::class::{ClassRc, ClassRef};
use crate::typesystem::types::{MethodSigDesc, TypeDesc};

/// Sentinel vtable index for methods that have not been assigned a slot.
pub const NO_VTABLE_SLOT: u32 = u32::MAX;

/// A field definition.
pub struct Field {
    /// Token
    pub token: Token,
    /// Field name
    pub name: String,
    /// `FieldAttributes`
    pub attributes: FieldAttributes,
    owner: ClassRef,
    signature: TypeDesc,
    /// Byte offset assigned by the layout engine (instance fields within
    /// the instance block, static fields within the static block)
    offset: AtomicU32,
    /// Explicit offset from the `FieldLayout` table
    pub explicit_offset: OnceLock<u32>,
    /// RVA of pre-initialized data from the `FieldRVA` table
    pub rva: OnceLock<u32>,
    /// Constant value from the `Constant` table: (element type, value bits)
    pub constant: OnceLock<(u8, Vec<u8>)>,
    /// Marshaling descriptor blob from the `FieldMarshal` table
    pub marshal: OnceLock<Vec<u8>>,
}

impl Field {
    pub(crate) fn new(
        token: Token,
        name: &str,
        attributes: FieldAttributes,
        signature: TypeDesc,
        owner: ClassRef,
    ) -> Arc<Field> {
        Arc::new(Field {
            token,
            name: name.to_string(),
            attributes,
            owner,
            signature,
            offset: AtomicU32::new(u32::MAX),
            explicit_offset: OnceLock::new(),
            rva: OnceLock::new(),
            constant: OnceLock::new(),
            marshal: OnceLock::new(),
        })
    }

    /// The class that declares this field.
    #[must_use]
    pub fn owner(&self) -> Option<ClassRc> {
        self.owner.upgrade()
    }

    /// The field's type.
    #[must_use]
    pub fn signature(&self) -> &TypeDesc {
        &self.signature
    }

    /// True for per-type storage.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }

    /// True for compile-time constants (no storage at all).
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.attributes.contains(FieldAttributes::LITERAL)
    }

    /// Layout-assigned byte offset, if layout ran.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match self.offset.load(Ordering::Acquire) {
            u32::MAX => None,
            value => Some(value),
        }
    }

    pub(crate) fn set_offset(&self, offset: u32) {
        self.offset.store(offset, Ordering::Release);
    }
}

/// PInvoke forwarding information from the `ImplMap` table.
#[derive(Clone, Debug)]
pub struct PInvokeInfo {
    /// `PInvokeAttributes` bits
    pub mapping_flags: u16,
    /// Native entry-point name
    pub import_name: String,
    /// Native module name (resolved from `ModuleRef`)
    pub import_scope: String,
}

/// A method definition.
#[derive(Debug)]
pub struct Method {
    /// Token
    pub token: Token,
    /// Method name
    pub name: String,
    /// `MethodAttributes`
    pub attributes: MethodAttributes,
    /// `MethodImplAttributes` bits
    pub impl_attributes: u16,
    /// RVA of the method body; 0 for abstract/runtime methods
    pub rva: u32,
    owner: ClassRef,
    signature: Arc<MethodSigDesc>,
    /// Declared parameters, in sequence order
    pub params: boxcar::Vec<Arc<Param>>,
    vtable_index: AtomicU32,
    /// PInvoke forwarding, if any
    pub pinvoke: OnceLock<PInvokeInfo>,
    /// Semantics bits when this method is a property/event accessor
    pub semantics: OnceLock<MethodSemanticsAttributes>,
}

impl Method {
    pub(crate) fn new(
        token: Token,
        name: &str,
        attributes: MethodAttributes,
        impl_attributes: u16,
        rva: u32,
        signature: Arc<MethodSigDesc>,
        owner: ClassRef,
    ) -> Arc<Method> {
        Arc::new(Method {
            token,
            name: name.to_string(),
            attributes,
            impl_attributes,
            rva,
            owner,
            signature,
            params: boxcar::Vec::new(),
            vtable_index: AtomicU32::new(NO_VTABLE_SLOT),
            pinvoke: OnceLock::new(),
            semantics: OnceLock::new(),
        })
    }

    /// The class that declares this method.
    #[must_use]
    pub fn owner(&self) -> Option<ClassRc> {
        self.owner.upgrade()
    }

    /// The method's signature.
    #[must_use]
    pub fn signature(&self) -> &Arc<MethodSigDesc> {
        &self.signature
    }

    /// True for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// True for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.attributes.contains(MethodAttributes::VIRTUAL)
    }

    /// True for constructors (`.ctor`).
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.attributes.contains(MethodAttributes::RT_SPECIAL_NAME) && self.name == ".ctor"
    }

    /// True for the class initializer (`.cctor`).
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.attributes.contains(MethodAttributes::RT_SPECIAL_NAME) && self.name == ".cctor"
    }

    /// The vtable slot assigned by the layout engine, if any.
    #[must_use]
    pub fn vtable_index(&self) -> Option<u32> {
        match self.vtable_index.load(Ordering::Acquire) {
            NO_VTABLE_SLOT => None,
            value => Some(value),
        }
    }

    pub(crate) fn set_vtable_index(&self, index: u32) {
        self.vtable_index.store(index, Ordering::Release);
    }

    /// Member accessibility from `scope`, per the standard access lattice.
    ///
    /// The owning class must itself be accessible; private members are
    /// visible to the owner and types nested inside it; family members to
    /// subtypes; assembly members within the same image.
    #[must_use]
    pub fn accessible_to(&self, scope: Option<&ClassRc>) -> bool {
        let Some(owner) = self.owner().map(|class| class.resolve()) else {
            return false;
        };
        let access = self.attributes.bits() & MethodAttributes::ACCESS_MASK.bits();
        member_accessible(&owner, access, scope)
    }
}

/// Shared member-access check over the 3-bit access field common to
/// fields and methods.
pub(crate) fn member_accessible(owner: &ClassRc, access: u16, scope: Option<&ClassRc>) -> bool {
    const COMPILER_CONTROLLED: u16 = 0x0;
    const PRIVATE: u16 = 0x1;
    const FAM_AND_ASSEM: u16 = 0x2;
    const ASSEMBLY: u16 = 0x3;
    const FAMILY: u16 = 0x4;
    const FAM_OR_ASSEM: u16 = 0x5;

    let scope_resolved = scope.map(|class| class.resolve());
    let same_class = scope_resolved
        .as_ref()
        .is_some_and(|scope_class| Arc::ptr_eq(scope_class, owner));
    let same_image = scope_resolved
        .as_ref()
        .is_some_and(|scope_class| scope_class.image() == owner.image());
    let family = scope_resolved
        .as_ref()
        .is_some_and(|scope_class| scope_class.inherits_from(owner));
    let nested_inside = scope_resolved
        .as_ref()
        .is_some_and(|scope_class| owner.is_nesting_ancestor_of(scope_class));

    match access {
        COMPILER_CONTROLLED | PRIVATE => same_class || nested_inside,
        FAM_AND_ASSEM => family && same_image,
        ASSEMBLY => same_image,
        FAMILY => same_class || nested_inside || family,
        FAM_OR_ASSEM => family || same_image,
        // PUBLIC: gated by the owning class's accessibility only
        _ => owner.accessible_to(scope),
    }
}

impl Field {
    /// Member accessibility from `scope`, per the standard access lattice.
    #[must_use]
    pub fn accessible_to(&self, scope: Option<&ClassRc>) -> bool {
        let Some(owner) = self.owner().map(|class| class.resolve()) else {
            return false;
        };
        let access = self.attributes.bits() & FieldAttributes::ACCESS_MASK.bits();
        member_accessible(&owner, access, scope)
    }
}

/// A method parameter.
#[derive(Debug)]
pub struct Param {
    /// Token
    pub token: Token,
    /// Parameter name; empty for unnamed
    pub name: String,
    /// `ParamAttributes`
    pub attributes: ParamAttributes,
    /// 1-based position; 0 names the return value
    pub sequence: u16,
    /// Constant default from the `Constant` table
    pub constant: OnceLock<(u8, Vec<u8>)>,
}

impl Param {
    pub(crate) fn new(
        token: Token,
        name: &str,
        attributes: ParamAttributes,
        sequence: u16,
    ) -> Arc<Param> {
        Arc::new(Param {
            token,
            name: name.to_string(),
            attributes,
            sequence,
            constant: OnceLock::new(),
        })
    }
}

/// A property definition with its accessor links.
pub struct Property {
    /// Token
    pub token: Token,
    /// Property name
    pub name: String,
    /// `PropertyAttributes` bits
    pub attributes: u16,
    owner: ClassRef,
    /// The property's type
    pub property_type: TypeDesc,
    /// Indexer parameter types
    pub param_types: Vec<TypeDesc>,
    /// Getter, bound via `MethodSemantics`
    pub getter: OnceLock<Arc<Method>>,
    /// Setter, bound via `MethodSemantics`
    pub setter: OnceLock<Arc<Method>>,
}

impl Property {
    pub(crate) fn new(
        token: Token,
        name: &str,
        attributes: u16,
        property_type: TypeDesc,
        param_types: Vec<TypeDesc>,
        owner: ClassRef,
    ) -> Arc<Property> {
        Arc::new(Property {
            token,
            name: name.to_string(),
            attributes,
            owner,
            property_type,
            param_types,
            getter: OnceLock::new(),
            setter: OnceLock::new(),
        })
    }

    /// The class that declares this property.
    #[must_use]
    pub fn owner(&self) -> Option<ClassRc> {
        self.owner.upgrade()
    }
}

/// An event definition with its accessor links.
pub struct Event {
    /// Token
    pub token: Token,
    /// Event name
    pub name: String,
    /// `EventAttributes` bits
    pub attributes: u16,
    owner: ClassRef,
    /// The delegate type of the event
    pub event_type: OnceLock<ClassRef>,
    /// Subscribe accessor
    pub add_on: OnceLock<Arc<Method>>,
    /// Unsubscribe accessor
    pub remove_on: OnceLock<Arc<Method>>,
    /// Raise accessor
    pub fire: OnceLock<Arc<Method>>,
}

impl Event {
    pub(crate) fn new(token: Token, name: &str, attributes: u16, owner: ClassRef) -> Arc<Event> {
        Arc::new(Event {
            token,
            name: name.to_string(),
            attributes,
            owner,
            event_type: OnceLock::new(),
            add_on: OnceLock::new(),
            remove_on: OnceLock::new(),
            fire: OnceLock::new(),
        })
    }

    /// The class that declares this event.
    #[must_use]
    pub fn owner(&self) -> Option<ClassRc> {
        self.owner.upgrade()
    }
}
