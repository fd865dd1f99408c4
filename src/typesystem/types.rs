//! Structural type descriptors.
//!
//! [`TypeDesc`] is the resolved counterpart of a signature: a closed sum
//! over every type shape the runtime understands, with class-backed shapes
//! holding weak links into the class graph. Primitive shapes are plain
//! values, which makes them process-wide singletons by construction.

use std::sync::Arc;

use crate::typesystem::class::ClassRef;

/// The primitive (element) types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Primitive {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    /// Native-width signed integer (`System.IntPtr`)
    I,
    /// Native-width unsigned integer (`System.UIntPtr`)
    U,
    /// Native float (spilled as `f64` on every supported target)
    R,
    String,
    Object,
    /// `System.TypedReference`
    TypedRef,
    /// The type of the `null` literal; convertible to reference types only
    Null,
}

/// One dimension of a general array.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ArrayDim {
    /// Declared size, if any
    pub size: Option<u32>,
    /// Declared lower bound, if any
    pub lower_bound: Option<i32>,
}

/// A resolved method signature.
#[derive(Clone, Debug)]
pub struct MethodSigDesc {
    /// Instance method (`this` passed implicitly)
    pub has_this: bool,
    /// `this` appears explicitly in the parameter list
    pub explicit_this: bool,
    /// Low calling-convention nibble from the blob
    pub call_conv: u8,
    /// Return type
    pub return_type: TypeDesc,
    /// Parameter types in order, excluding `this`
    pub params: Vec<TypeDesc>,
}

impl MethodSigDesc {
    /// Structural identity: same shape, same parameter and return types.
    #[must_use]
    pub fn identical(&self, other: &MethodSigDesc) -> bool {
        self.has_this == other.has_this
            && self.explicit_this == other.explicit_this
            && self.call_conv == other.call_conv
            && self.return_type.identical(&other.return_type)
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.identical(b))
    }
}

/// A structural type descriptor.
///
/// Class-backed shapes (`Value`, `Class`, `Modified`) hold weak references;
/// the owning [`crate::metadata::image::Image`] keeps the classes alive.
#[derive(Clone, Debug)]
pub enum TypeDesc {
    /// A primitive type
    Primitive(Primitive),
    /// A value type backed by a class definition
    Value(ClassRef),
    /// An object type backed by a class definition
    Class(ClassRef),
    /// An array, single- or multi-dimensional
    Array {
        /// Element type
        elem: Arc<TypeDesc>,
        /// Number of dimensions (1 for szarray)
        rank: u32,
        /// Per-dimension bounds; may be empty for szarray
        dims: Vec<ArrayDim>,
    },
    /// An unmanaged pointer
    Pointer(Arc<TypeDesc>),
    /// A managed by-reference
    ByRef(Arc<TypeDesc>),
    /// A method signature type (function pointers)
    Method(Arc<MethodSigDesc>),
    /// A custom-modifier wrapper
    Modified {
        /// `CMOD_REQD` vs `CMOD_OPT`
        required: bool,
        /// The modifier class
        modifier: ClassRef,
        /// The wrapped type
        inner: Arc<TypeDesc>,
    },
}

impl TypeDesc {
    /// Remove custom-modifier wrappers.
    #[must_use]
    pub fn strip_prefixes(&self) -> &TypeDesc {
        let mut current = self;
        while let TypeDesc::Modified { inner, .. } = current {
            current = inner;
        }
        current
    }

    /// Map well-known `System` classes onto their primitive shape, so that
    /// the class and primitive spellings of e.g. `System.Int32` compare
    /// identical regardless of which corelib (if any) is loaded.
    #[must_use]
    fn canonical_primitive(&self) -> Option<Primitive> {
        match self {
            TypeDesc::Primitive(prim) => Some(*prim),
            TypeDesc::Value(class_ref) | TypeDesc::Class(class_ref) => {
                let class = class_ref.upgrade()?;
                let class = class.resolve();
                if class.namespace() != "System" {
                    return None;
                }
                Some(match class.name() {
                    "Void" => Primitive::Void,
                    "Boolean" => Primitive::Boolean,
                    "Char" => Primitive::Char,
                    "SByte" => Primitive::I1,
                    "Byte" => Primitive::U1,
                    "Int16" => Primitive::I2,
                    "UInt16" => Primitive::U2,
                    "Int32" => Primitive::I4,
                    "UInt32" => Primitive::U4,
                    "Int64" => Primitive::I8,
                    "UInt64" => Primitive::U8,
                    "Single" => Primitive::R4,
                    "Double" => Primitive::R8,
                    "IntPtr" => Primitive::I,
                    "UIntPtr" => Primitive::U,
                    "String" => Primitive::String,
                    "Object" => Primitive::Object,
                    "TypedReference" => Primitive::TypedRef,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    /// Structural identity, following cross-image class links.
    #[must_use]
    pub fn identical(&self, other: &TypeDesc) -> bool {
        let lhs = self.strip_prefixes();
        let rhs = other.strip_prefixes();
        if let (Some(a), Some(b)) = (lhs.canonical_primitive(), rhs.canonical_primitive()) {
            return a == b;
        }
        match (lhs, rhs) {
            (TypeDesc::Primitive(a), TypeDesc::Primitive(b)) => a == b,
            (TypeDesc::Value(a), TypeDesc::Value(b)) | (TypeDesc::Class(a), TypeDesc::Class(b)) => {
                match (a.upgrade(), b.upgrade()) {
                    (Some(class_a), Some(class_b)) => {
                        Arc::ptr_eq(&class_a.resolve(), &class_b.resolve())
                    }
                    _ => false,
                }
            }
            (
                TypeDesc::Array {
                    elem: elem_a,
                    rank: rank_a,
                    dims: dims_a,
                },
                TypeDesc::Array {
                    elem: elem_b,
                    rank: rank_b,
                    dims: dims_b,
                },
            ) => rank_a == rank_b && dims_a == dims_b && elem_a.identical(elem_b),
            (TypeDesc::Pointer(a), TypeDesc::Pointer(b))
            | (TypeDesc::ByRef(a), TypeDesc::ByRef(b)) => a.identical(b),
            (TypeDesc::Method(a), TypeDesc::Method(b)) => a.identical(b),
            _ => false,
        }
    }

    /// True for primitive shapes (after canonicalization).
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.canonical_primitive().is_some()
    }

    /// The canonical primitive shape, if any.
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        self.strip_prefixes().canonical_primitive()
    }

    /// True for value-type shapes: numeric/bool/char primitives and
    /// class-backed value types.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self.strip_prefixes() {
            TypeDesc::Primitive(prim) => !matches!(
                prim,
                Primitive::Void | Primitive::String | Primitive::Object | Primitive::Null
            ),
            TypeDesc::Value(_) => true,
            _ => false,
        }
    }

    /// True for reference-type shapes: `Object`, `String`, classes and
    /// arrays.
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        match self.strip_prefixes() {
            TypeDesc::Primitive(Primitive::String | Primitive::Object) => true,
            TypeDesc::Value(_) => false,
            // A class spelling of a primitive value type is not a reference
            TypeDesc::Class(class_ref) => match self.as_primitive() {
                Some(prim) => matches!(prim, Primitive::String | Primitive::Object),
                None => class_ref.is_valid(),
            },
            TypeDesc::Array { .. } => true,
            _ => false,
        }
    }

    /// True if this is `System.Object` in either spelling.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self.as_primitive(), Some(Primitive::Object))
    }

    /// Array rank, if this is an array.
    #[must_use]
    pub fn rank(&self) -> Option<u32> {
        match self.strip_prefixes() {
            TypeDesc::Array { rank, .. } => Some(*rank),
            _ => None,
        }
    }

    /// Array element type, if this is an array.
    #[must_use]
    pub fn elem_type(&self) -> Option<&TypeDesc> {
        match self.strip_prefixes() {
            TypeDesc::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// The class behind a `Value`/`Class` shape, if any.
    #[must_use]
    pub fn as_class(&self) -> Option<crate::typesystem::ClassRc> {
        match self.strip_prefixes() {
            TypeDesc::Value(class_ref) | TypeDesc::Class(class_ref) => {
                class_ref.upgrade().map(|class| class.resolve())
            }
            _ => None,
        }
    }

    /// True if this is an enum type (a value type extending `System.Enum`).
    #[must_use]
    pub fn is_enum(&self) -> bool {
        match self.strip_prefixes() {
            TypeDesc::Value(class_ref) => class_ref
                .upgrade()
                .map(|class| class.resolve())
                .is_some_and(|class| class.is_enum()),
            _ => false,
        }
    }

    /// For enum types, the underlying numeric type; otherwise `self`.
    ///
    /// Mirrors the metadata rule that an enum's single instance field
    /// carries the underlying type.
    #[must_use]
    pub fn enum_underlying(&self) -> TypeDesc {
        let stripped = self.strip_prefixes();
        if let TypeDesc::Value(class_ref) = stripped {
            if let Some(class) = class_ref.upgrade().map(|class| class.resolve()) {
                if class.is_enum() {
                    if let Some(underlying) = class.enum_underlying_type() {
                        return underlying;
                    }
                }
            }
        }
        stripped.clone()
    }
}

impl Primitive {
    /// True for the numeric/bool/char value primitives.
    #[must_use]
    pub fn is_value(&self) -> bool {
        !matches!(
            self,
            Primitive::Void | Primitive::String | Primitive::Object | Primitive::Null
        )
    }
}
