//! The process-wide registry of images and class names.
//!
//! A [`Context`] owns every loaded [`Image`] and a concurrent hash table
//! keyed by (scope, namespace, name), which backs class creation,
//! reference deduplication and cross-image import. Lookup and insertion
//! use lock-free maps; the only serialized region is first-time layout
//! (see [`crate::layout`]).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;

use crate::metadata::image::Image;
use crate::metadata::token::Token;
use crate::typesystem::attrs::TypeAttributes;
use crate::typesystem::class::{Class, ClassRc, ClassRef, ClassScope, ImageId};
use crate::typesystem::types::{ArrayDim, TypeDesc};
use crate::Result;

/// The scope half of a class-hash key, normalized to survive the
/// reference-to-definition transition (tokens change, uids do not).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum ScopeKey {
    /// Global scope of an image
    Global(ImageId),
    /// Nested inside the class with this uid
    Nested(usize),
    /// Imported into an image through an assembly reference
    AssemblyRef(ImageId, Token),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct ClassKey {
    scope: ScopeKey,
    namespace: String,
    name: String,
}

fn scope_key(scope: &ClassScope) -> ScopeKey {
    match scope {
        ClassScope::Module(image) => ScopeKey::Global(*image),
        ClassScope::Nested(parent) => ScopeKey::Nested(
            parent
                .upgrade()
                .map(|parent_class| parent_class.uid())
                .unwrap_or(0),
        ),
        ClassScope::AssemblyRef(image, token) => ScopeKey::AssemblyRef(*image, *token),
    }
}

/// Process-wide registry of images and classes.
///
/// Lives for the process lifetime and owns the loaded [`Image`]s, which in
/// turn own all classes, members and heaps (never individually freed).
pub struct Context {
    images: RwLock<Vec<Arc<Image>>>,
    class_hash: DashMap<ClassKey, ClassRc>,
    /// Global-scope definitions by (namespace, name); used for phase-2
    /// fallbacks and `System` type lookups
    global_defs: DashMap<(String, String), ClassRc>,
    /// Synthetic TypeRef rows handed to imports, per importing image
    import_rows: DashMap<ImageId, Arc<AtomicU32>>,
    /// Synthetic AssemblyRef tokens for image-to-image imports
    import_scopes: DashMap<(ImageId, ImageId), Token>,
    pub(crate) layout_lock: Mutex<()>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Arc<Context> {
        Arc::new(Context {
            images: RwLock::new(Vec::new()),
            class_hash: DashMap::new(),
            global_defs: DashMap::new(),
            import_rows: DashMap::new(),
            import_scopes: DashMap::new(),
            layout_lock: Mutex::new(()),
        })
    }

    /// Register `image` and hand it its id. Called during image creation.
    pub(crate) fn attach_image(&self, image: &Arc<Image>) -> ImageId {
        let mut images = self.images.write().expect("image registry poisoned");
        images.push(image.clone());
        images.len() - 1
    }

    /// Get a registered image by id.
    #[must_use]
    pub fn image(&self, id: ImageId) -> Option<Arc<Image>> {
        self.images
            .read()
            .expect("image registry poisoned")
            .get(id)
            .cloned()
    }

    /// Number of loaded images.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.read().expect("image registry poisoned").len()
    }

    /// Look up a class by scope, namespace and name.
    #[must_use]
    pub fn lookup(&self, scope: &ClassScope, namespace: &str, name: &str) -> Option<ClassRc> {
        self.class_hash
            .get(&ClassKey {
                scope: scope_key(scope),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
            .map(|entry| entry.value().clone())
    }

    /// Look up a global-scope *definition* in any image.
    #[must_use]
    pub fn lookup_global(&self, namespace: &str, name: &str) -> Option<ClassRc> {
        self.global_defs
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Create a type definition.
    ///
    /// If a reference placeholder with the same (scope, namespace, name)
    /// already exists it converts in place into the definition; if a
    /// definition already exists the type is multiply defined.
    ///
    /// A parent from another image is imported into `image` first.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeRedefined`] when a definition already
    /// occupies the name.
    pub fn class_create(
        &self,
        image: ImageId,
        scope: ClassScope,
        token: Token,
        name: &str,
        namespace: &str,
        attributes: TypeAttributes,
        parent: Option<&ClassRc>,
    ) -> Result<ClassRc> {
        let parent_ref = match parent {
            Some(parent_class) if parent_class.image() != image => {
                Some(ClassRef::new(&self.class_import(image, parent_class)?))
            }
            Some(parent_class) => Some(ClassRef::new(parent_class)),
            None => None,
        };

        let key = ClassKey {
            scope: scope_key(&scope),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        if let Some(existing) = self.class_hash.get(&key).map(|entry| entry.value().clone()) {
            if !existing.is_ref() {
                return Err(crate::Error::TypeRedefined(token));
            }
            // Convert the reference into a normal class in place
            existing.convert_to_def(token, attributes, parent_ref);
            self.index_global(&scope, &existing);
            return Ok(existing);
        }

        let class = Class::new(image, token, name, namespace, attributes, scope.clone(), parent_ref);
        self.register_nested(&scope, &class);
        self.class_hash.insert(key, class.clone());
        self.index_global(&scope, &class);
        Ok(class)
    }

    /// Create (or reuse) a reference placeholder for a not-yet-seen type.
    #[must_use]
    pub fn class_create_ref(
        &self,
        image: ImageId,
        scope: ClassScope,
        token: Token,
        name: &str,
        namespace: &str,
    ) -> ClassRc {
        let key = ClassKey {
            scope: scope_key(&scope),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        if let Some(existing) = self.class_hash.get(&key) {
            return existing.value().clone();
        }
        let class = Class::new(
            image,
            token,
            name,
            namespace,
            TypeAttributes::REFERENCE,
            scope.clone(),
            None,
        );
        self.register_nested(&scope, &class);
        self.class_hash.insert(key, class.clone());
        class
    }

    /// Import `class` into `image`: return an existing or newly created
    /// reference in that image, linked (not copied) to the original.
    ///
    /// Importing into the class's own image is the identity. Importing a
    /// nested class first imports its nesting parent.
    ///
    /// # Errors
    /// Returns an error if a nesting parent has been dropped.
    pub fn class_import(&self, image: ImageId, class: &ClassRc) -> Result<ClassRc> {
        if class.image() == image {
            return Ok(class.clone());
        }

        let scope = match class.nested_parent() {
            Some(nesting_parent) => {
                let imported_parent = self.class_import(image, &nesting_parent)?;
                ClassScope::Nested(ClassRef::new(&imported_parent))
            }
            None => ClassScope::AssemblyRef(image, self.import_scope_token(image, class.image())),
        };

        let key = ClassKey {
            scope: scope_key(&scope),
            namespace: class.namespace().to_string(),
            name: class.name().to_string(),
        };
        if let Some(existing) = self.class_hash.get(&key).map(|entry| entry.value().clone()) {
            if !existing.is_linked() {
                existing.link_to(class);
            }
            return Ok(existing);
        }

        let token = self.next_import_token(image);
        let reference = Class::new(
            image,
            token,
            class.name(),
            class.namespace(),
            TypeAttributes::REFERENCE,
            scope.clone(),
            None,
        );
        reference.link_to(class);
        self.register_nested(&scope, &reference);
        self.class_hash.insert(key, reference.clone());
        Ok(reference)
    }

    /// Fabricate a synthetic array class over `elem`, used when layout or
    /// the coder needs a class-shaped view of an array type.
    #[must_use]
    pub fn array_class(
        &self,
        image: ImageId,
        elem: TypeDesc,
        rank: u32,
        dims: Vec<ArrayDim>,
    ) -> ClassRc {
        let parent = self
            .lookup_global("System", "Array")
            .map(|array_class| ClassRef::new(&array_class));
        let token = self.next_import_token(image);
        let name = format!("$Synthetic${}", token.row());
        let class = Class::new(
            image,
            token,
            &name,
            "",
            TypeAttributes::SEALED,
            ClassScope::Module(image),
            parent,
        );
        let _ = class.synthetic.set(TypeDesc::Array {
            elem: Arc::new(elem),
            rank,
            dims,
        });
        // The hash entry keeps the synthetic class alive for the lifetime
        // of the context, like any other class
        self.class_hash.insert(
            ClassKey {
                scope: ScopeKey::Global(image),
                namespace: String::new(),
                name,
            },
            class.clone(),
        );
        class
    }

    /// The class behind a type, if it has one: `Value`/`Class` shapes
    /// resolve their link, primitives resolve through the loaded corelib's
    /// `System` namespace.
    #[must_use]
    pub fn type_to_class(&self, desc: &TypeDesc) -> Option<ClassRc> {
        match desc.strip_prefixes() {
            TypeDesc::Value(class_ref) | TypeDesc::Class(class_ref) => {
                class_ref.upgrade().map(|class| class.resolve())
            }
            TypeDesc::Primitive(prim) => {
                use crate::typesystem::types::Primitive;
                let name = match prim {
                    Primitive::Void => "Void",
                    Primitive::Boolean => "Boolean",
                    Primitive::Char => "Char",
                    Primitive::I1 => "SByte",
                    Primitive::U1 => "Byte",
                    Primitive::I2 => "Int16",
                    Primitive::U2 => "UInt16",
                    Primitive::I4 => "Int32",
                    Primitive::U4 => "UInt32",
                    Primitive::I8 => "Int64",
                    Primitive::U8 => "UInt64",
                    Primitive::R4 => "Single",
                    Primitive::R8 | Primitive::R => "Double",
                    Primitive::I => "IntPtr",
                    Primitive::U => "UIntPtr",
                    Primitive::String => "String",
                    Primitive::Object => "Object",
                    Primitive::TypedRef => "TypedReference",
                    Primitive::Null => return None,
                };
                self.lookup_global("System", name)
            }
            _ => None,
        }
    }

    fn index_global(&self, scope: &ClassScope, class: &ClassRc) {
        if matches!(scope, ClassScope::Module(_))
            && !class.is_ref()
            && !class.name().starts_with("$Synthetic$")
        {
            self.global_defs
                .entry((class.namespace().to_string(), class.name().to_string()))
                .or_insert_with(|| class.clone());
        }
    }

    fn register_nested(&self, scope: &ClassScope, class: &ClassRc) {
        if let ClassScope::Nested(parent) = scope {
            if let Some(parent_class) = parent.upgrade() {
                parent_class.nested.push(ClassRef::new(class));
            }
        }
    }

    fn next_import_token(&self, image: ImageId) -> Token {
        let counter = self
            .import_rows
            .entry(image)
            .or_insert_with(|| Arc::new(AtomicU32::new(0x00E0_0000)))
            .clone();
        Token::from_parts(0x01, counter.fetch_add(1, Ordering::Relaxed))
    }

    fn import_scope_token(&self, importer: ImageId, source: ImageId) -> Token {
        *self
            .import_scopes
            .entry((importer, source))
            .or_insert_with(|| Token::from_parts(0x23, 0x00E0_0000 + source as u32))
            .value()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context {
            images: RwLock::new(Vec::new()),
            class_hash: DashMap::new(),
            global_defs: DashMap::new(),
            import_rows: DashMap::new(),
            import_scopes: DashMap::new(),
            layout_lock: Mutex::new(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    //! Shared helpers for building small class graphs in unit tests.

    use super::*;
    use crate::typesystem::attrs::{FieldAttributes, MethodAttributes};
    use crate::typesystem::member::{Field, Method};
    use crate::typesystem::types::MethodSigDesc;

    /// A context pre-seeded with the `System` root types tests rely on.
    pub fn system_context() -> (Arc<Context>, ImageId) {
        let ctx = Context::new();
        let image = 0;
        let object = ctx
            .class_create(
                image,
                ClassScope::Module(image),
                Token::new(0x0200_0001),
                "Object",
                "System",
                TypeAttributes::PUBLIC,
                None,
            )
            .unwrap();
        let value_type = ctx
            .class_create(
                image,
                ClassScope::Module(image),
                Token::new(0x0200_0002),
                "ValueType",
                "System",
                TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
                Some(&object),
            )
            .unwrap();
        ctx.class_create(
            image,
            ClassScope::Module(image),
            Token::new(0x0200_0003),
            "Enum",
            "System",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
            Some(&value_type),
        )
        .unwrap();
        ctx.class_create(
            image,
            ClassScope::Module(image),
            Token::new(0x0200_0004),
            "String",
            "System",
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            Some(&object),
        )
        .unwrap();
        ctx.class_create(
            image,
            ClassScope::Module(image),
            Token::new(0x0200_0005),
            "Array",
            "System",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
            Some(&object),
        )
        .unwrap();
        (ctx, image)
    }

    /// Create a class in the given context with the standard scope.
    pub fn make_class(
        ctx: &Context,
        image: ImageId,
        row: u32,
        name: &str,
        namespace: &str,
        attributes: TypeAttributes,
        parent: Option<&ClassRc>,
    ) -> ClassRc {
        ctx.class_create(
            image,
            ClassScope::Module(image),
            Token::from_parts(0x02, row),
            name,
            namespace,
            attributes,
            parent,
        )
        .unwrap()
    }

    /// Append a field to `class`.
    pub fn add_field(
        class: &ClassRc,
        row: u32,
        name: &str,
        attributes: FieldAttributes,
        signature: TypeDesc,
    ) -> Arc<Field> {
        let field = Field::new(
            Token::from_parts(0x04, row),
            name,
            attributes,
            signature,
            ClassRef::new(class),
        );
        class.fields.push(field.clone());
        field
    }

    /// Append a method to `class`.
    pub fn add_method(
        class: &ClassRc,
        row: u32,
        name: &str,
        attributes: MethodAttributes,
        signature: MethodSigDesc,
    ) -> Arc<Method> {
        let method = Method::new(
            Token::from_parts(0x06, row),
            name,
            attributes,
            0,
            0,
            Arc::new(signature),
            ClassRef::new(class),
        );
        class.methods.push(method.clone());
        method
    }
}
