//! The phased metadata loader.
//!
//! Builds the class model from the raw tables in a fixed phase order:
//!
//! 1. Module → ModuleRef → Assembly → AssemblyRef (+ OS/processor rows)
//! 2. dependent-assembly linking against already-loaded images
//! 3. `TypeRef` phase 1 (everything whose scope is not the current module)
//! 4. `TypeDef` phase 1 (names, nesting and hierarchy only)
//! 5. `TypeSpec`
//! 6. `TypeRef` phase 2 (deferred same-module references)
//! 7. `TypeDef` phase 2 (fields, methods, params)
//! 8. the remaining tables, in dependency levels, in parallel
//!
//! A reference that is still dangling after phase 2 is a hard load error
//! ([`crate::Error::UnresolvedType`]) unless the image was opened in
//! object-file mode ([`crate::metadata::image::LoadFlags::no_resolve`]).

mod tail;
mod typedef;
mod typeref;

use std::sync::Arc;

use crate::metadata::image::Image;
use crate::metadata::signatures::{MethodSig, TypeSig};
use crate::metadata::tables::rows::{
    AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow,
    AssemblyRefRow, AssemblyRow, ModuleRefRow, ModuleRow, TypeSpecRow,
};
use crate::metadata::tables::TableId;
use crate::metadata::token::Token;
use crate::typesystem::types::{ArrayDim, MethodSigDesc, Primitive, TypeDesc};
use crate::typesystem::{ClassRef, Context};
use crate::Result;

/// Shared state for one image's load.
pub(crate) struct LoaderCtx<'a> {
    pub ctx: &'a Arc<Context>,
    pub image: &'a Arc<Image>,
}

/// Run all load phases for `image`.
pub(crate) fn build(ctx: &Arc<Context>, image: &Arc<Image>) -> Result<()> {
    let loader = LoaderCtx { ctx, image };

    loader.load_module()?;
    loader.load_module_refs()?;
    loader.load_assembly()?;
    loader.load_assembly_refs()?;
    loader.link_dependencies();

    let need_phase2 = typeref::resolve_phase1(&loader)?;
    typedef::load_phase1(&loader)?;
    loader.load_type_specs()?;
    if need_phase2 {
        typeref::resolve_phase2(&loader)?;
    }
    typedef::load_phase2(&loader)?;

    tail::load(&loader)
}

impl LoaderCtx<'_> {
    fn load_module(&self) -> Result<()> {
        let Some(table) = self.image.table::<ModuleRow>(TableId::Module)? else {
            return Ok(());
        };
        if let Some(row) = table.get(1) {
            let strings = self.image.strings_heap()?;
            let _ = self
                .image
                .module_name
                .set(strings.get(row.name as usize)?.to_string());
            if row.mvid != 0 {
                if let Some(guids) = &self.image.guids {
                    let _ = self.image.mvid.set(guids.get(row.mvid as usize)?);
                }
            }
        }
        Ok(())
    }

    fn load_module_refs(&self) -> Result<()> {
        let Some(table) = self.image.table::<ModuleRefRow>(TableId::ModuleRef)? else {
            return Ok(());
        };
        let strings = self.image.strings_heap()?;
        for row in table.iter() {
            self.image
                .module_refs
                .insert(row.token, strings.get(row.name as usize)?.to_string());
        }
        Ok(())
    }

    fn load_assembly(&self) -> Result<()> {
        let Some(table) = self.image.table::<AssemblyRow>(TableId::Assembly)? else {
            return Ok(());
        };
        if let Some(row) = table.get(1) {
            let strings = self.image.strings_heap()?;
            let _ = self.image.assembly.set(crate::metadata::image::AssemblyInfo {
                name: strings.get(row.name as usize)?.to_string(),
                culture: strings.get(row.culture as usize)?.to_string(),
                version: [
                    row.major_version,
                    row.minor_version,
                    row.build_number,
                    row.revision_number,
                ],
                flags: row.flags,
            });
        }
        if let Some(os_rows) = self.image.table::<AssemblyOsRow>(TableId::AssemblyOs)? {
            for row in os_rows.iter() {
                self.image.platform.push(crate::metadata::image::PlatformInfo {
                    id: row.platform_id,
                    version: (row.major_version, row.minor_version),
                });
            }
        }
        if let Some(cpu_rows) =
            self.image.table::<AssemblyProcessorRow>(TableId::AssemblyProcessor)?
        {
            for row in cpu_rows.iter() {
                self.image.platform.push(crate::metadata::image::PlatformInfo {
                    id: row.processor,
                    version: (0, 0),
                });
            }
        }
        Ok(())
    }

    fn load_assembly_refs(&self) -> Result<()> {
        let Some(table) = self.image.table::<AssemblyRefRow>(TableId::AssemblyRef)? else {
            return Ok(());
        };
        let strings = self.image.strings_heap()?;
        for row in table.iter() {
            self.image.assembly_refs.insert(
                row.token,
                Arc::new(crate::metadata::image::AssemblyRefInfo {
                    identity: crate::metadata::image::AssemblyInfo {
                        name: strings.get(row.name as usize)?.to_string(),
                        culture: strings.get(row.culture as usize)?.to_string(),
                        version: [
                            row.major_version,
                            row.minor_version,
                            row.build_number,
                            row.revision_number,
                        ],
                        flags: row.flags,
                    },
                    resolved: std::sync::OnceLock::new(),
                }),
            );
        }
        // The per-reference OS/processor rows only constrain the target;
        // they are read for validity and carried on the image.
        if let Some(os_rows) = self.image.table::<AssemblyRefOsRow>(TableId::AssemblyRefOs)? {
            for row in os_rows.iter() {
                self.image.platform.push(crate::metadata::image::PlatformInfo {
                    id: row.platform_id,
                    version: (row.major_version, row.minor_version),
                });
            }
        }
        if let Some(cpu_rows) =
            self.image
                .table::<AssemblyRefProcessorRow>(TableId::AssemblyRefProcessor)?
        {
            for row in cpu_rows.iter() {
                self.image.platform.push(crate::metadata::image::PlatformInfo {
                    id: row.processor,
                    version: (0, 0),
                });
            }
        }
        Ok(())
    }

    /// Resolve assembly references against images already registered in
    /// the context, by simple name. Unresolved references stay pending;
    /// they only become errors if a `TypeRef` needs them.
    fn link_dependencies(&self) {
        for entry in self.image.assembly_refs.iter() {
            let info = entry.value();
            for id in 0..self.ctx.image_count() {
                let Some(candidate) = self.ctx.image(id) else {
                    continue;
                };
                if candidate
                    .assembly
                    .get()
                    .is_some_and(|assembly| assembly.name == info.identity.name)
                {
                    let _ = info.resolved.set(id);
                    break;
                }
            }
        }
    }

    fn load_type_specs(&self) -> Result<()> {
        let Some(table) = self.image.table::<TypeSpecRow>(TableId::TypeSpec)? else {
            return Ok(());
        };
        let blob = self.image.blob_heap()?;
        for row in table.iter() {
            let bytes = blob.get(row.signature as usize)?;
            let sig = crate::metadata::signatures::SignatureReader::new(bytes).parse_type()?;
            let desc = self.type_from_sig(&sig)?;
            self.image.type_specs.insert(row.token, Arc::new(desc));
        }
        Ok(())
    }

    /// Resolve a raw `TypeDefOrRef` token to a class handle.
    pub(crate) fn class_ref_for_token(&self, token: Token) -> Result<ClassRef> {
        if token.table() == TableId::TypeSpec as u8 {
            // A TypeSpec names a constructed type; only class-backed specs
            // can stand in class position
            let spec = match self.image.type_spec_by_token(token) {
                Some(spec) => spec,
                // A forward reference ahead of the TypeSpec phase (e.g. a
                // TypeDef extends clause) loads the single row on demand
                None => self.load_type_spec_row(token)?,
            };
            return match spec.as_class() {
                Some(class) => Ok(ClassRef::new(&class)),
                None => Err(malformed_error!(
                    "TypeSpec {} does not name a class",
                    token
                )),
            };
        }
        self.image
            .class_by_token(token)
            .map(|class| ClassRef::new(&class))
            .ok_or(crate::Error::TokenNotFound(token))
    }

    fn load_type_spec_row(&self, token: Token) -> Result<Arc<TypeDesc>> {
        let table = self
            .image
            .table::<TypeSpecRow>(TableId::TypeSpec)?
            .ok_or(crate::Error::TokenNotFound(token))?;
        let row = table
            .get(token.row())
            .ok_or(crate::Error::TokenNotFound(token))?;
        let bytes = self.image.blob_heap()?.get(row.signature as usize)?;
        let sig = crate::metadata::signatures::SignatureReader::new(bytes).parse_type()?;
        let desc = Arc::new(self.type_from_sig(&sig)?);
        self.image.type_specs.insert(token, desc.clone());
        Ok(desc)
    }

    /// Convert a parsed signature type into a resolved descriptor.
    pub(crate) fn type_from_sig(&self, sig: &TypeSig) -> Result<TypeDesc> {
        Ok(match sig {
            TypeSig::Void => TypeDesc::Primitive(Primitive::Void),
            TypeSig::Boolean => TypeDesc::Primitive(Primitive::Boolean),
            TypeSig::Char => TypeDesc::Primitive(Primitive::Char),
            TypeSig::I1 => TypeDesc::Primitive(Primitive::I1),
            TypeSig::U1 => TypeDesc::Primitive(Primitive::U1),
            TypeSig::I2 => TypeDesc::Primitive(Primitive::I2),
            TypeSig::U2 => TypeDesc::Primitive(Primitive::U2),
            TypeSig::I4 => TypeDesc::Primitive(Primitive::I4),
            TypeSig::U4 => TypeDesc::Primitive(Primitive::U4),
            TypeSig::I8 => TypeDesc::Primitive(Primitive::I8),
            TypeSig::U8 => TypeDesc::Primitive(Primitive::U8),
            TypeSig::R4 => TypeDesc::Primitive(Primitive::R4),
            TypeSig::R8 => TypeDesc::Primitive(Primitive::R8),
            TypeSig::I => TypeDesc::Primitive(Primitive::I),
            TypeSig::U => TypeDesc::Primitive(Primitive::U),
            TypeSig::String => TypeDesc::Primitive(Primitive::String),
            TypeSig::Object => TypeDesc::Primitive(Primitive::Object),
            TypeSig::TypedByRef => TypeDesc::Primitive(Primitive::TypedRef),
            TypeSig::Ptr(inner) => TypeDesc::Pointer(Arc::new(self.type_from_sig(inner)?)),
            TypeSig::ByRef(inner) => TypeDesc::ByRef(Arc::new(self.type_from_sig(inner)?)),
            // Pinning matters to a GC, not to the type graph
            TypeSig::Pinned(inner) => self.type_from_sig(inner)?,
            TypeSig::ValueType(token) => TypeDesc::Value(self.class_ref_for_token(*token)?),
            TypeSig::Class(token) => TypeDesc::Class(self.class_ref_for_token(*token)?),
            TypeSig::SzArray(inner) => TypeDesc::Array {
                elem: Arc::new(self.type_from_sig(inner)?),
                rank: 1,
                dims: Vec::new(),
            },
            TypeSig::Array {
                elem,
                rank,
                sizes,
                lo_bounds,
            } => {
                let mut dims = Vec::with_capacity(*rank as usize);
                for dim in 0..*rank as usize {
                    dims.push(ArrayDim {
                        size: sizes.get(dim).copied(),
                        lower_bound: lo_bounds.get(dim).copied(),
                    });
                }
                TypeDesc::Array {
                    elem: Arc::new(self.type_from_sig(elem)?),
                    rank: *rank,
                    dims,
                }
            }
            TypeSig::FnPtr(method) => TypeDesc::Method(Arc::new(self.method_sig_from(method)?)),
            TypeSig::Modified {
                required,
                modifier,
                inner,
            } => TypeDesc::Modified {
                required: *required,
                modifier: self.class_ref_for_token(*modifier)?,
                inner: Arc::new(self.type_from_sig(inner)?),
            },
        })
    }

    /// Convert a parsed method signature into a resolved descriptor.
    pub(crate) fn method_sig_from(&self, sig: &MethodSig) -> Result<MethodSigDesc> {
        let mut params = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            params.push(self.type_from_sig(param)?);
        }
        Ok(MethodSigDesc {
            has_this: sig.has_this,
            explicit_this: sig.explicit_this,
            call_conv: sig.call_conv,
            return_type: self.type_from_sig(&sig.return_type)?,
            params,
        })
    }
}
