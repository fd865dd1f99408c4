//! Two-phase `TypeRef` resolution.
//!
//! References may target (a) another already-loaded image, (b) another
//! class within the same image not yet loaded, or (c) a nested parent not
//! yet loaded. Phase 1 resolves every reference whose scope is *not* the
//! current module; references scoped (directly or through a nesting
//! chain) to the current module are deferred, because the local `TypeDef`
//! table has not been parsed yet. Phase 2 re-walks the deferred
//! references after `TypeDef` phase 1 and attaches the final link.

use crate::metadata::loader::LoaderCtx;
use crate::metadata::tables::rows::TypeRefRow;
use crate::metadata::tables::TableId;
use crate::metadata::token::Token;
use crate::typesystem::{ClassRc, ClassRef, ClassScope};
use crate::Result;

struct Phase1<'a, 'b> {
    loader: &'a LoaderCtx<'b>,
    rows: Vec<TypeRefRow>,
    need_phase2: bool,
    first_error: Option<crate::Error>,
}

impl Phase1<'_, '_> {
    fn record(&mut self, error: crate::Error) {
        self.first_error.get_or_insert(error);
    }

    fn unresolved(&mut self, token: Token, namespace: &str, name: &str) {
        self.record(crate::Error::UnresolvedType {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    /// Create (or find) the reference class for one row, creating its
    /// scope row first when the scope is another `TypeRef`.
    fn ensure(&mut self, token: Token) -> Result<Option<ClassRc>> {
        if let Some(existing) = self.loader.image.class_by_token(token) {
            return Ok(Some(existing));
        }
        let Some(row) = self
            .rows
            .iter()
            .find(|row| row.token == token)
            .cloned()
        else {
            return Ok(None);
        };

        let strings = self.loader.image.strings_heap()?;
        let name = strings.get(row.type_name as usize)?.to_string();
        let namespace = strings.get(row.type_namespace as usize)?.to_string();
        let image_id = self.loader.image.id();
        let no_resolve = self.loader.image.load_flags().no_resolve;

        // Row 0 in the scope column means "current module"
        let scope_is_module =
            row.resolution_scope.row == 0 || row.resolution_scope.tag == TableId::Module;

        let class = if scope_is_module {
            self.need_phase2 = true;
            self.loader.ctx.class_create_ref(
                image_id,
                ClassScope::Module(image_id),
                row.token,
                &name,
                &namespace,
            )
        } else {
            match row.resolution_scope.tag {
                TableId::AssemblyRef => {
                    let scope_token = row.resolution_scope.token;
                    let class = self.loader.ctx.class_create_ref(
                        image_id,
                        ClassScope::AssemblyRef(image_id, scope_token),
                        row.token,
                        &name,
                        &namespace,
                    );
                    if !no_resolve && !class.is_linked() {
                        // Look up the type in the referenced assembly's image
                        let target = self
                            .loader
                            .image
                            .assembly_refs
                            .get(&scope_token)
                            .and_then(|entry| entry.value().resolved.get().copied())
                            .and_then(|target_id| self.loader.ctx.image(target_id))
                            .and_then(|target_image| {
                                target_image.classes().find(|candidate| {
                                    !candidate.is_ref()
                                        && candidate.nested_parent().is_none()
                                        && candidate.name() == name
                                        && candidate.namespace() == namespace
                                })
                            });
                        match target {
                            Some(definition) => {
                                class.link_to(&definition);
                            }
                            None => self.unresolved(row.token, &namespace, &name),
                        }
                    }
                    class
                }
                TableId::TypeRef => {
                    // Nested type within another reference; create the
                    // enclosing reference first
                    let Some(enclosing) = self.ensure(row.resolution_scope.token)? else {
                        self.record(malformed_error!(
                            "invalid scope for type reference {}",
                            row.token
                        ));
                        return Ok(None);
                    };
                    if scope_chain_is_module(&enclosing) {
                        self.need_phase2 = true;
                    }
                    let class = self.loader.ctx.class_create_ref(
                        image_id,
                        ClassScope::Nested(ClassRef::new(&enclosing)),
                        row.token,
                        &name,
                        &namespace,
                    );
                    if !no_resolve && !class.is_linked() && enclosing.is_linked() {
                        let target = enclosing.resolve();
                        match self.loader.ctx.lookup(
                            &ClassScope::Nested(ClassRef::new(&target)),
                            &namespace,
                            &name,
                        ) {
                            Some(definition) => {
                                class.link_to(&definition);
                            }
                            None => self.unresolved(row.token, &namespace, &name),
                        }
                    }
                    class
                }
                TableId::ModuleRef => {
                    // Types should be imported from assemblies; module
                    // references only carry PInvoke imports
                    let class = self.loader.ctx.class_create_ref(
                        image_id,
                        ClassScope::Module(image_id),
                        row.token,
                        &name,
                        &namespace,
                    );
                    if !no_resolve {
                        self.unresolved(row.token, &namespace, &name);
                    }
                    class
                }
                _ => {
                    self.record(malformed_error!(
                        "invalid scope for type reference {}",
                        row.token
                    ));
                    return Ok(None);
                }
            }
        };

        self.loader.image.classes.insert(row.token, class.clone());
        Ok(Some(class))
    }
}

/// True if the class's scope chain bottoms out at a module scope (the
/// deferred-to-phase-2 condition).
fn scope_chain_is_module(class: &ClassRc) -> bool {
    let mut current = class.clone();
    loop {
        match current.scope() {
            ClassScope::Module(_) => return true,
            ClassScope::AssemblyRef(..) => return false,
            ClassScope::Nested(parent) => match parent.upgrade() {
                Some(parent_class) => current = parent_class,
                None => return false,
            },
        }
    }
}

/// Phase 1. Returns `Ok(true)` if any reference was deferred to phase 2.
pub(crate) fn resolve_phase1(loader: &LoaderCtx<'_>) -> Result<bool> {
    let Some(table) = loader.image.table::<TypeRefRow>(TableId::TypeRef)? else {
        return Ok(false);
    };
    let mut phase = Phase1 {
        loader,
        rows: table.iter().collect(),
        need_phase2: false,
        first_error: None,
    };
    let tokens: Vec<Token> = phase.rows.iter().map(|row| row.token).collect();
    for token in tokens {
        phase.ensure(token)?;
    }
    match phase.first_error {
        Some(error) => Err(error),
        None => Ok(phase.need_phase2),
    }
}

/// Phase 2: fix up references whose scope chain reaches the current
/// module, now that the local `TypeDef` table is loaded.
///
/// Most same-module references were converted in place by `TypeDef` phase
/// 1 through the shared class hash; whatever is left names a type the
/// module does not define. Assemblers emit such references in object
/// files for types imported from other object files; outside object-file
/// mode they must resolve globally (or within their resolved enclosing
/// scope, for nested references).
pub(crate) fn resolve_phase2(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<TypeRefRow>(TableId::TypeRef)? else {
        return Ok(());
    };
    let no_resolve = loader.image.load_flags().no_resolve;
    let mut first_error = None;

    for row in table.iter() {
        let Some(class) = loader.image.class_by_token(row.token) else {
            continue;
        };
        if !scope_chain_is_module(&class) {
            continue;
        }
        // Converted in place by TypeDef phase 1, or already linked: done
        if !class.is_ref() || class.is_linked() {
            continue;
        }
        if no_resolve {
            continue;
        }

        let resolved = match class.scope() {
            ClassScope::Nested(parent) => parent
                .upgrade()
                .filter(|parent_class| !parent_class.is_ref() || parent_class.is_linked())
                .map(|parent_class| parent_class.resolve())
                .and_then(|target| {
                    loader.ctx.lookup(
                        &ClassScope::Nested(ClassRef::new(&target)),
                        class.namespace(),
                        class.name(),
                    )
                }),
            _ => loader.ctx.lookup_global(class.namespace(), class.name()),
        };

        match resolved {
            Some(definition) => {
                class.link_to(&definition);
            }
            None => {
                first_error.get_or_insert_with(|| crate::Error::UnresolvedType {
                    token: class.token(),
                    namespace: class.namespace().to_string(),
                    name: class.name().to_string(),
                });
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
