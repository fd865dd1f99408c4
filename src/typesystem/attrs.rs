//! Metadata attribute bitmasks (ECMA-335 §II.23.1).

use bitflags::bitflags;

bitflags! {
    /// `TypeAttributes`: visibility, layout and semantics of a type.
    ///
    /// The visibility and layout fields are multi-bit; use
    /// [`TypeAttributes::visibility`] and [`TypeAttributes::layout_kind`]
    /// instead of testing individual bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TypeAttributes: u32 {
        /// Mask for the 3-bit visibility field
        const VISIBILITY_MASK = 0x0000_0007;
        /// Not nested, assembly-visible only
        const NOT_PUBLIC = 0x0000_0000;
        /// Not nested, public
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, visible to the enclosing type only
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, visible to the enclosing type and its subtypes
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly-visible
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family AND assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family OR assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;

        /// Mask for the 2-bit layout field
        const LAYOUT_MASK = 0x0000_0018;
        /// Fields laid out automatically
        const AUTO_LAYOUT = 0x0000_0000;
        /// Fields laid out in declaration order
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields placed at explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;

        /// The type is an interface
        const INTERFACE = 0x0000_0020;
        /// The type cannot be instantiated directly
        const ABSTRACT = 0x0000_0080;
        /// The type cannot be derived from
        const SEALED = 0x0000_0100;
        /// The name is special (e.g. `<Module>`)
        const SPECIAL_NAME = 0x0000_0400;
        /// Imported from COM
        const IMPORT = 0x0000_1000;
        /// Serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Has a class initializer run before first access
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// The runtime treats the name specially
        const RT_SPECIAL_NAME = 0x0000_0800;

        /// Internal marker: this class is an unresolved reference, not a
        /// definition. Cleared when the reference converts in place.
        const REFERENCE = 0x2000_0000;
    }
}

/// The decoded visibility field of [`TypeAttributes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TypeVisibility {
    NotPublic,
    Public,
    NestedPublic,
    NestedPrivate,
    NestedFamily,
    NestedAssembly,
    NestedFamAndAssem,
    NestedFamOrAssem,
}

/// The decoded layout field of [`TypeAttributes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LayoutKind {
    Auto,
    Sequential,
    Explicit,
}

impl TypeAttributes {
    /// Decode the visibility field.
    #[must_use]
    pub fn visibility(&self) -> TypeVisibility {
        match self.bits() & Self::VISIBILITY_MASK.bits() {
            0 => TypeVisibility::NotPublic,
            1 => TypeVisibility::Public,
            2 => TypeVisibility::NestedPublic,
            3 => TypeVisibility::NestedPrivate,
            4 => TypeVisibility::NestedFamily,
            5 => TypeVisibility::NestedAssembly,
            6 => TypeVisibility::NestedFamAndAssem,
            _ => TypeVisibility::NestedFamOrAssem,
        }
    }

    /// Decode the layout field.
    #[must_use]
    pub fn layout_kind(&self) -> LayoutKind {
        match self.bits() & Self::LAYOUT_MASK.bits() {
            0x08 => LayoutKind::Sequential,
            0x10 => LayoutKind::Explicit,
            _ => LayoutKind::Auto,
        }
    }

    /// True if any nested visibility value is set.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.bits() & Self::VISIBILITY_MASK.bits() >= 2
    }
}

bitflags! {
    /// `FieldAttributes`: access and storage of a field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FieldAttributes: u16 {
        /// Mask for the 3-bit access field
        const ACCESS_MASK = 0x0007;
        /// Not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Visible to the owner only
        const PRIVATE = 0x0001;
        /// Family AND assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly-visible
        const ASSEMBLY = 0x0003;
        /// Visible to the owner and its subtypes
        const FAMILY = 0x0004;
        /// Family OR assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;

        /// Per-type storage, not per-instance
        const STATIC = 0x0010;
        /// Writable only inside a constructor
        const INIT_ONLY = 0x0020;
        /// Compile-time constant; takes no storage
        const LITERAL = 0x0040;
        /// Not serialized
        const NOT_SERIALIZED = 0x0080;
        /// The name is special
        const SPECIAL_NAME = 0x0200;
        /// Forwarded to native code
        const PINVOKE_IMPL = 0x2000;
        /// The runtime treats the name specially
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a marshaling descriptor
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Has a default constant
        const HAS_DEFAULT = 0x8000;
        /// Maps to pre-initialized data
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    /// `MethodAttributes`: access, dispatch and naming of a method.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodAttributes: u16 {
        /// Mask for the 3-bit access field
        const ACCESS_MASK = 0x0007;
        /// Not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Visible to the owner only
        const PRIVATE = 0x0001;
        /// Family AND assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly-visible
        const ASSEMBLY = 0x0003;
        /// Visible to the owner and its subtypes
        const FAMILY = 0x0004;
        /// Family OR assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;

        /// No `this` parameter
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Dispatched through the vtable
        const VIRTUAL = 0x0040;
        /// Hide by name+signature, not by name
        const HIDE_BY_SIG = 0x0080;
        /// Always allocate a fresh vtable slot
        const NEW_SLOT = 0x0100;
        /// No body; must be overridden
        const ABSTRACT = 0x0400;
        /// The name is special (operators, accessors)
        const SPECIAL_NAME = 0x0800;
        /// The runtime treats the name specially (.ctor/.cctor)
        const RT_SPECIAL_NAME = 0x1000;
        /// Forwarded to native code
        const PINVOKE_IMPL = 0x2000;
        /// Has security descriptors
        const HAS_SECURITY = 0x4000;
    }
}

bitflags! {
    /// `ParamAttributes`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ParamAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default constant
        const HAS_DEFAULT = 0x1000;
        /// Has a marshaling descriptor
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// `MethodSemanticsAttributes`: the role a method plays for a property
    /// or event.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodSemanticsAttributes: u16 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Miscellaneous helper
        const OTHER = 0x0004;
        /// Event subscribe
        const ADD_ON = 0x0008;
        /// Event unsubscribe
        const REMOVE_ON = 0x0010;
        /// Event raise
        const FIRE = 0x0020;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_decoding() {
        let attrs = TypeAttributes::from_bits_retain(0x0010_0101);
        assert_eq!(attrs.visibility(), TypeVisibility::Public);
        assert!(attrs.contains(TypeAttributes::SEALED));
        assert!(!attrs.is_nested());

        let nested = TypeAttributes::from_bits_retain(0x0000_0003);
        assert_eq!(nested.visibility(), TypeVisibility::NestedPrivate);
        assert!(nested.is_nested());
    }

    #[test]
    fn layout_decoding() {
        assert_eq!(
            TypeAttributes::from_bits_retain(0x10).layout_kind(),
            LayoutKind::Explicit
        );
        assert_eq!(
            TypeAttributes::from_bits_retain(0x08).layout_kind(),
            LayoutKind::Sequential
        );
        assert_eq!(
            TypeAttributes::from_bits_retain(0x00).layout_kind(),
            LayoutKind::Auto
        );
    }

    #[test]
    fn method_access_field() {
        let attrs = MethodAttributes::from_bits_retain(0x0046);
        assert_eq!(
            attrs.bits() & MethodAttributes::ACCESS_MASK.bits(),
            MethodAttributes::PUBLIC.bits()
        );
        assert!(attrs.contains(MethodAttributes::VIRTUAL));
    }
}
