//! The runtime class representation.
//!
//! A [`Class`] stands for either a type definition or an as-yet-unresolved
//! reference to one. Both live behind the same stable [`ClassRc`] handle:
//! a reference converts *in place* into a definition when the real
//! definition shows up in the same image, and gets *linked* (never copied)
//! to a definition in another image. Handles taken before either event
//! keep working afterwards.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Process-wide class identity counter; nesting-scope hash keys need an
/// identity that survives reference-to-definition conversion.
static NEXT_CLASS_UID: AtomicUsize = AtomicUsize::new(1);

use crate::metadata::token::Token;
use crate::typesystem::attrs::{TypeAttributes, TypeVisibility};
use crate::typesystem::member::{Event, Field, Method, Property};
use crate::typesystem::types::TypeDesc;

/// Identifies one loaded image within its [`crate::typesystem::Context`].
pub type ImageId = usize;

/// Reference-counted handle to a [`Class`].
pub type ClassRc = Arc<Class>;

/// A weak reference to a [`Class`] that prevents the cyclic class graph
/// (parents, interfaces, nesting, vtables) from leaking.
#[derive(Clone, Debug)]
pub struct ClassRef {
    weak: Weak<Class>,
}

impl ClassRef {
    /// Create a new `ClassRef` from a strong reference.
    #[must_use]
    pub fn new(strong: &ClassRc) -> Self {
        ClassRef {
            weak: Arc::downgrade(strong),
        }
    }

    /// A reference to nothing, for tests and default fields.
    #[must_use]
    pub fn dangling() -> Self {
        ClassRef { weak: Weak::new() }
    }

    /// Get a strong reference, or `None` if the class was dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<ClassRc> {
        self.weak.upgrade()
    }

    /// Check if the referenced class is still alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak.strong_count() > 0
    }
}

impl From<ClassRc> for ClassRef {
    fn from(strong: ClassRc) -> Self {
        ClassRef::new(&strong)
    }
}

impl From<&ClassRc> for ClassRef {
    fn from(strong: &ClassRc) -> Self {
        ClassRef::new(strong)
    }
}

/// Where a class name is meaningful: the scope half of the (scope,
/// namespace, name) identity every lookup uses.
#[derive(Clone, Debug)]
pub enum ClassScope {
    /// Global scope of one image (the module)
    Module(ImageId),
    /// Nested inside another class
    Nested(ClassRef),
    /// Imported from another assembly (`AssemblyRef` token in the image
    /// that holds the reference)
    AssemblyRef(ImageId, Token),
}

/// A type definition or reference.
///
/// Members are append-only lists in declaration order; no secondary index
/// is maintained, so callers needing frequent lookup cache at a higher
/// layer.
pub struct Class {
    uid: usize,
    token: AtomicU32,
    image: ImageId,
    name: String,
    namespace: String,
    attributes: AtomicU32,
    scope: ClassScope,
    parent: OnceLock<ClassRef>,
    linked_to: OnceLock<ClassRef>,
    /// All fields this type has, in declaration order
    pub fields: boxcar::Vec<Arc<Field>>,
    /// All methods this type has, in declaration order
    pub methods: boxcar::Vec<Arc<Method>>,
    /// All properties this type has
    pub properties: boxcar::Vec<Arc<Property>>,
    /// All events this type has
    pub events: boxcar::Vec<Arc<Event>>,
    /// All interfaces this class implements
    pub implements: boxcar::Vec<ClassRef>,
    /// All types nested inside this one
    pub nested: boxcar::Vec<ClassRef>,
    /// Explicit (packing, class size) from the `ClassLayout` table
    pub class_layout: OnceLock<(u16, u32)>,
    /// Security permission sets from the `DeclSecurity` table
    pub decl_security: boxcar::Vec<(u16, Vec<u8>)>,
    /// Explicit overrides from the `MethodImpl` table: (body, overridden
    /// declaration token)
    pub method_impls: boxcar::Vec<(Arc<Method>, Token)>,
    /// For compiler-generated array/pointer/method classes: the structural
    /// type this class stands for
    pub synthetic: OnceLock<TypeDesc>,
    pub(crate) layout: OnceLock<Arc<crate::layout::LayoutData>>,
    pub(crate) in_layout: AtomicBool,
}

impl Class {
    pub(crate) fn new(
        image: ImageId,
        token: Token,
        name: &str,
        namespace: &str,
        attributes: TypeAttributes,
        scope: ClassScope,
        parent: Option<ClassRef>,
    ) -> ClassRc {
        let parent_lock = OnceLock::new();
        if let Some(parent_ref) = parent {
            let _ = parent_lock.set(parent_ref);
        }
        Arc::new(Class {
            uid: NEXT_CLASS_UID.fetch_add(1, Ordering::Relaxed),
            token: AtomicU32::new(token.value()),
            image,
            name: name.to_string(),
            namespace: namespace.to_string(),
            attributes: AtomicU32::new(attributes.bits()),
            scope,
            parent: parent_lock,
            linked_to: OnceLock::new(),
            fields: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            events: boxcar::Vec::new(),
            implements: boxcar::Vec::new(),
            nested: boxcar::Vec::new(),
            class_layout: OnceLock::new(),
            decl_security: boxcar::Vec::new(),
            method_impls: boxcar::Vec::new(),
            synthetic: OnceLock::new(),
            layout: OnceLock::new(),
            in_layout: AtomicBool::new(false),
        })
    }

    /// Stable process-wide identity, independent of token reassignment.
    #[must_use]
    pub fn uid(&self) -> usize {
        self.uid
    }

    /// The class's current token (`TypeRef` for references, `TypeDef` for
    /// definitions).
    #[must_use]
    pub fn token(&self) -> Token {
        Token::new(self.token.load(Ordering::Acquire))
    }

    /// The image this class object lives in.
    #[must_use]
    pub fn image(&self) -> ImageId {
        self.image
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type namespace; empty for none.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the full name (`Namespace.Name`) of the type.
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Current attributes.
    #[must_use]
    pub fn attributes(&self) -> TypeAttributes {
        TypeAttributes::from_bits_retain(self.attributes.load(Ordering::Acquire))
    }

    pub(crate) fn set_attributes(&self, mask: TypeAttributes, values: TypeAttributes) {
        let mut current = self.attributes.load(Ordering::Acquire);
        loop {
            let updated = (current & !mask.bits()) | values.bits();
            match self.attributes.compare_exchange_weak(
                current,
                updated,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// True if this class is still an unresolved reference.
    #[must_use]
    pub fn is_ref(&self) -> bool {
        self.attributes().contains(TypeAttributes::REFERENCE)
    }

    /// The scope this class's name is meaningful in.
    #[must_use]
    pub fn scope(&self) -> &ClassScope {
        &self.scope
    }

    /// The nesting parent, if this class is nested inside another.
    #[must_use]
    pub fn nested_parent(&self) -> Option<ClassRc> {
        match &self.scope {
            ClassScope::Nested(parent) => parent.upgrade(),
            _ => None,
        }
    }

    /// Follow cross-image links to the real definition.
    ///
    /// A class that was never imported resolves to itself. Link chains are
    /// short (one hop in well-formed metadata) but are walked fully.
    #[must_use]
    pub fn resolve(self: &Arc<Self>) -> ClassRc {
        let mut current = self.clone();
        loop {
            let next = match current.linked_to.get().and_then(ClassRef::upgrade) {
                Some(target) => target,
                None => return current,
            };
            current = next;
        }
    }

    /// Link this reference to its definition in another image.
    pub(crate) fn link_to(&self, definition: &ClassRc) -> bool {
        self.linked_to.set(ClassRef::new(definition)).is_ok()
    }

    /// True once this reference has been linked to a definition.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked_to.get().is_some()
    }

    /// The declared base type (unresolved handle).
    #[must_use]
    pub fn parent_ref(&self) -> Option<&ClassRef> {
        self.parent.get()
    }

    /// The resolved base type.
    #[must_use]
    pub fn parent(&self) -> Option<ClassRc> {
        self.parent
            .get()
            .and_then(ClassRef::upgrade)
            .map(|parent| parent.resolve())
    }

    pub(crate) fn set_parent(&self, parent: Option<ClassRef>) {
        if let Some(parent_ref) = parent {
            let _ = self.parent.set(parent_ref);
        }
    }

    /// Convert a reference placeholder into a definition in place: clear
    /// the reference marker, attach the parent and take the `TypeDef`
    /// token. All existing handles observe the change.
    pub(crate) fn convert_to_def(
        &self,
        token: Token,
        attributes: TypeAttributes,
        parent: Option<ClassRef>,
    ) {
        self.set_attributes(
            TypeAttributes::from_bits_retain(u32::MAX),
            attributes & !TypeAttributes::REFERENCE,
        );
        self.set_parent(parent);
        self.token.store(token.value(), Ordering::Release);
    }

    /// True if the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.attributes().contains(TypeAttributes::INTERFACE)
    }

    /// True if the type is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.attributes().contains(TypeAttributes::SEALED)
    }

    /// True if the type is a value type (inherits from `System.ValueType`
    /// or `System.Enum`).
    #[must_use]
    pub fn is_value_type(self: &Arc<Self>) -> bool {
        let mut current = self.resolve().parent();
        while let Some(parent) = current {
            if parent.namespace() == "System"
                && (parent.name() == "ValueType" || parent.name() == "Enum")
            {
                return true;
            }
            current = parent.parent();
        }
        false
    }

    /// True if the type is an enum (inherits from `System.Enum`).
    #[must_use]
    pub fn is_enum(self: &Arc<Self>) -> bool {
        let mut current = self.resolve().parent();
        while let Some(parent) = current {
            if parent.namespace() == "System" && parent.name() == "Enum" {
                return true;
            }
            current = parent.parent();
        }
        false
    }

    /// The underlying numeric type of an enum: the type of its single
    /// instance field.
    #[must_use]
    pub fn enum_underlying_type(self: &Arc<Self>) -> Option<TypeDesc> {
        let resolved = self.resolve();
        for (_, field) in resolved.fields.iter() {
            if !field.is_static() {
                return Some(field.signature().clone());
            }
        }
        None
    }

    /// Walk the resolved parent chain looking for `ancestor`.
    ///
    /// A class inherits from itself for the purpose of this test, matching
    /// the lookup the coercion engine performs.
    #[must_use]
    pub fn inherits_from(self: &Arc<Self>, ancestor: &ClassRc) -> bool {
        let target = ancestor.resolve();
        let mut current = Some(self.resolve());
        while let Some(class) = current {
            if Arc::ptr_eq(&class, &target) {
                return true;
            }
            current = class.parent();
        }
        false
    }

    /// True if this class (or an ancestor) implements `interface`,
    /// directly or through another implemented interface.
    #[must_use]
    pub fn implements(self: &Arc<Self>, interface: &ClassRc) -> bool {
        let target = interface.resolve();
        let mut current = Some(self.resolve());
        while let Some(class) = current {
            for (_, implemented) in class.implements.iter() {
                let Some(implemented) = implemented.upgrade() else {
                    continue;
                };
                let implemented = implemented.resolve();
                if Arc::ptr_eq(&implemented, &target) || implemented.implements(&target) {
                    return true;
                }
            }
            current = class.parent();
        }
        false
    }

    /// True if `child` is nested (directly or transitively) inside `self`.
    #[must_use]
    pub fn is_nesting_ancestor_of(self: &Arc<Self>, child: &ClassRc) -> bool {
        let mut current = child.nested_parent();
        while let Some(parent) = current {
            if Arc::ptr_eq(&parent, self) {
                return true;
            }
            current = parent.nested_parent();
        }
        false
    }

    /// The standard visibility lattice: whether this class is accessible
    /// from code in `scope` (`None` for "no particular class").
    ///
    /// Each nested case also requires the nested parent chain to satisfy
    /// accessibility.
    #[must_use]
    pub fn accessible_to(self: &Arc<Self>, scope: Option<&ClassRc>) -> bool {
        let info = self.resolve();
        let scope = scope.map(|class| class.resolve());
        if let Some(ref scope_class) = scope {
            if Arc::ptr_eq(&info, scope_class) {
                // A class is always accessible to itself
                return true;
            }
        }
        match info.attributes().visibility() {
            TypeVisibility::Public => true,
            TypeVisibility::NotPublic | TypeVisibility::NestedAssembly => scope
                .as_ref()
                .is_some_and(|scope_class| scope_class.image() == info.image()),
            TypeVisibility::NestedPublic => match info.nested_parent() {
                Some(parent) => parent.accessible_to(scope.as_ref()),
                None => false,
            },
            TypeVisibility::NestedPrivate => accessible_nested_private(&info, scope.as_ref()),
            TypeVisibility::NestedFamily => accessible_nested_family(&info, scope.as_ref()),
            TypeVisibility::NestedFamAndAssem => {
                accessible_nested_family(&info, scope.as_ref())
                    && scope
                        .as_ref()
                        .is_some_and(|scope_class| scope_class.image() == info.image())
            }
            TypeVisibility::NestedFamOrAssem => {
                accessible_nested_family(&info, scope.as_ref())
                    || scope
                        .as_ref()
                        .is_some_and(|scope_class| scope_class.image() == info.image())
            }
        }
    }
}

/// Nested-private accessibility: the scope must be the nesting parent, or
/// itself nested somewhere inside that parent.
fn accessible_nested_private(info: &ClassRc, scope: Option<&ClassRc>) -> bool {
    let Some(scope) = scope else {
        return false;
    };
    let Some(parent) = info.nested_parent() else {
        return false;
    };
    if Arc::ptr_eq(&parent, scope) {
        return true;
    }
    parent.is_nesting_ancestor_of(scope)
}

/// Nested-family accessibility: nested-private access, or some nesting
/// ancestor of the scope inherits from the nesting parent.
fn accessible_nested_family(info: &ClassRc, scope: Option<&ClassRc>) -> bool {
    if accessible_nested_private(info, scope) {
        return true;
    }
    let Some(parent) = info.nested_parent() else {
        return false;
    };
    let mut current = scope.cloned();
    while let Some(scope_class) = current {
        if scope_class.inherits_from(&parent) {
            return true;
        }
        current = scope_class.nested_parent();
    }
    false
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("token", &self.token())
            .field("fullname", &self.fullname())
            .field("is_ref", &self.is_ref())
            .finish()
    }
}
