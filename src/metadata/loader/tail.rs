//! The remaining-table loaders, executed after the class graph exists.
//!
//! Everything here depends only on phases 1-7 of the build order, not on
//! each other, except for `MethodSemantics`/`MethodImpl` which need the
//! events and properties in place first. The independent loaders of each
//! level run in parallel.

use std::sync::Arc;

use rayon::prelude::*;

use crate::metadata::image::{MemberRefInfo, MemberRefSig, StandaloneSig};
use crate::metadata::loader::LoaderCtx;
use crate::metadata::signatures::{SignatureReader, CALL_CONV};
use crate::metadata::tables::rows::{
    ClassLayoutRow, ConstantRow, CustomAttributeRow, DeclSecurityRow, EventMapRow, EventRow,
    ExportedTypeRow, FieldLayoutRow, FieldMarshalRow, FieldRvaRow, FileRow, ImplMapRow,
    InterfaceImplRow, ManifestResourceRow, MemberRefRow, MethodImplRow, MethodSemanticsRow,
    PropertyMapRow, PropertyRow, StandAloneSigRow,
};
use crate::metadata::tables::TableId;
use crate::metadata::token::Token;
use crate::typesystem::attrs::MethodSemanticsAttributes;
use crate::typesystem::member::{Event, PInvokeInfo, Property};
use crate::typesystem::ClassRef;
use crate::Result;

pub(crate) fn load(loader: &LoaderCtx<'_>) -> Result<()> {
    type Step = for<'a, 'b> fn(&'a LoaderCtx<'b>) -> Result<()>;
    let level1: [Step; 12] = [
        load_interface_impls,
        load_events,
        load_properties,
        load_member_refs,
        load_standalone_sigs,
        load_constants,
        load_field_rvas,
        load_field_layouts,
        load_field_marshal,
        load_class_layouts,
        load_decl_security,
        load_manifest,
    ];
    let level2: [Step; 3] = [load_method_semantics, load_method_impls, load_pinvoke];

    for level in [&level1[..], &level2[..]] {
        let results: Vec<Result<()>> = level.par_iter().map(|step| step(loader)).collect();
        for result in results {
            result?;
        }
    }
    load_custom_attributes(loader)
}

fn load_interface_impls(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<InterfaceImplRow>(TableId::InterfaceImpl)? else {
        return Ok(());
    };
    for row in table.iter() {
        let class = loader
            .image
            .class_by_token(Token::from_parts(TableId::TypeDef as u8, row.class))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        let interface = loader.class_ref_for_token(row.interface.token)?;
        class.implements.push(interface);
    }
    Ok(())
}

fn load_events(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(map_table) = loader.image.table::<EventMapRow>(TableId::EventMap)? else {
        return Ok(());
    };
    let Some(event_table) = loader.image.table::<EventRow>(TableId::Event)? else {
        return Ok(());
    };
    let strings = loader.image.strings_heap()?;
    let maps: Vec<EventMapRow> = map_table.iter().collect();
    let total = loader.image.row_count(TableId::Event);

    for (index, map) in maps.iter().enumerate() {
        let class = loader
            .image
            .class_by_token(Token::from_parts(TableId::TypeDef as u8, map.parent))
            .ok_or(crate::Error::TokenNotFound(map.token))?;
        let end = maps
            .get(index + 1)
            .map_or(total + 1, |next| next.event_list);
        if map.event_list == 0 || map.event_list > end || end > total + 1 {
            return Err(crate::Error::BadMemberRange(map.token));
        }
        for rid in map.event_list..end {
            let row = event_table
                .get(rid)
                .ok_or(crate::Error::BadMemberRange(map.token))?;
            let event = Event::new(
                row.token,
                strings.get(row.name as usize)?,
                row.flags,
                ClassRef::new(&class),
            );
            if row.event_type.row != 0 {
                let _ = event
                    .event_type
                    .set(loader.class_ref_for_token(row.event_type.token)?);
            }
            class.events.push(event.clone());
            loader.image.events.insert(row.token, event);
        }
    }
    Ok(())
}

fn load_properties(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(map_table) = loader.image.table::<PropertyMapRow>(TableId::PropertyMap)? else {
        return Ok(());
    };
    let Some(property_table) = loader.image.table::<PropertyRow>(TableId::Property)? else {
        return Ok(());
    };
    let strings = loader.image.strings_heap()?;
    let blob = loader.image.blob_heap()?;
    let maps: Vec<PropertyMapRow> = map_table.iter().collect();
    let total = loader.image.row_count(TableId::Property);

    for (index, map) in maps.iter().enumerate() {
        let class = loader
            .image
            .class_by_token(Token::from_parts(TableId::TypeDef as u8, map.parent))
            .ok_or(crate::Error::TokenNotFound(map.token))?;
        let end = maps
            .get(index + 1)
            .map_or(total + 1, |next| next.property_list);
        if map.property_list == 0 || map.property_list > end || end > total + 1 {
            return Err(crate::Error::BadMemberRange(map.token));
        }
        for rid in map.property_list..end {
            let row = property_table
                .get(rid)
                .ok_or(crate::Error::BadMemberRange(map.token))?;
            let sig = SignatureReader::new(blob.get(row.signature as usize)?).parse_property()?;
            let property_type = loader.type_from_sig(&sig.property_type)?;
            let mut param_types = Vec::with_capacity(sig.params.len());
            for param in &sig.params {
                param_types.push(loader.type_from_sig(param)?);
            }
            let property = Property::new(
                row.token,
                strings.get(row.name as usize)?,
                row.flags,
                property_type,
                param_types,
                ClassRef::new(&class),
            );
            class.properties.push(property.clone());
            loader.image.properties.insert(row.token, property);
        }
    }
    Ok(())
}

fn load_member_refs(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<MemberRefRow>(TableId::MemberRef)? else {
        return Ok(());
    };
    let strings = loader.image.strings_heap()?;
    let blob = loader.image.blob_heap()?;

    for row in table.iter() {
        let class = match row.class.tag {
            TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec => loader
                .class_ref_for_token(row.class.token)?
                .upgrade()
                .ok_or(crate::Error::TokenNotFound(row.class.token))?,
            TableId::MethodDef => {
                // Vararg call-site reference: the owner is the method's class
                let method = loader
                    .image
                    .method_by_token(row.class.token)
                    .ok_or(crate::Error::TokenNotFound(row.class.token))?;
                method
                    .owner()
                    .ok_or(crate::Error::TokenNotFound(row.class.token))?
            }
            // ModuleRef parents carry global members of other modules,
            // which resolve through PInvoke, not through the class graph
            _ => continue,
        };

        let name = strings.get(row.name as usize)?;
        let bytes = blob.get(row.signature as usize)?;
        let signature = if bytes.first().copied().unwrap_or(0) & CALL_CONV::MASK == CALL_CONV::FIELD
        {
            MemberRefSig::Field(
                loader.type_from_sig(&SignatureReader::new(bytes).parse_field()?.field_type)?,
            )
        } else {
            MemberRefSig::Method(Arc::new(
                loader.method_sig_from(&SignatureReader::new(bytes).parse_method()?)?,
            ))
        };

        loader.image.member_refs.insert(
            row.token,
            Arc::new(MemberRefInfo {
                class,
                name: name.to_string(),
                signature,
            }),
        );
    }
    Ok(())
}

fn load_standalone_sigs(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<StandAloneSigRow>(TableId::StandAloneSig)? else {
        return Ok(());
    };
    let blob = loader.image.blob_heap()?;
    for row in table.iter() {
        let bytes = blob.get(row.signature as usize)?;
        let sig = if bytes.first().copied().unwrap_or(0) & CALL_CONV::MASK == CALL_CONV::LOCALS {
            let locals = SignatureReader::new(bytes).parse_locals()?;
            let mut types = Vec::with_capacity(locals.len());
            for local in &locals {
                types.push(loader.type_from_sig(local)?);
            }
            StandaloneSig::Locals(types)
        } else {
            StandaloneSig::Method(Arc::new(
                loader.method_sig_from(&SignatureReader::new(bytes).parse_method()?)?,
            ))
        };
        loader.image.standalone_sigs.insert(row.token, Arc::new(sig));
    }
    Ok(())
}

fn load_constants(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<ConstantRow>(TableId::Constant)? else {
        return Ok(());
    };
    let blob = loader.image.blob_heap()?;
    for row in table.iter() {
        let value = blob.get(row.value as usize)?.to_vec();
        match row.parent.tag {
            TableId::Field => {
                let field = loader
                    .image
                    .field_by_token(row.parent.token)
                    .ok_or(crate::Error::TokenNotFound(row.parent.token))?;
                let _ = field.constant.set((row.base_type, value));
            }
            TableId::Param => {
                let param = loader
                    .image
                    .params
                    .get(&row.parent.token)
                    .map(|entry| entry.value().clone())
                    .ok_or(crate::Error::TokenNotFound(row.parent.token))?;
                let _ = param.constant.set((row.base_type, value));
            }
            // Property defaults are only consulted by compilers; the
            // runtime keeps the blob unattached
            _ => {}
        }
    }
    Ok(())
}

fn load_field_rvas(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<FieldRvaRow>(TableId::FieldRva)? else {
        return Ok(());
    };
    for row in table.iter() {
        let field = loader
            .image
            .field_by_token(Token::from_parts(TableId::Field as u8, row.field))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        let _ = field.rva.set(row.rva);
    }
    Ok(())
}

fn load_field_layouts(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<FieldLayoutRow>(TableId::FieldLayout)? else {
        return Ok(());
    };
    for row in table.iter() {
        let field = loader
            .image
            .field_by_token(Token::from_parts(TableId::Field as u8, row.field))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        let _ = field.explicit_offset.set(row.field_offset);
    }
    Ok(())
}

fn load_field_marshal(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<FieldMarshalRow>(TableId::FieldMarshal)? else {
        return Ok(());
    };
    let blob = loader.image.blob_heap()?;
    for row in table.iter() {
        let descriptor = blob.get(row.native_type as usize)?.to_vec();
        if row.parent.tag == TableId::Field {
            let field = loader
                .image
                .field_by_token(row.parent.token)
                .ok_or(crate::Error::TokenNotFound(row.parent.token))?;
            let _ = field.marshal.set(descriptor);
        }
    }
    Ok(())
}

fn load_class_layouts(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<ClassLayoutRow>(TableId::ClassLayout)? else {
        return Ok(());
    };
    for row in table.iter() {
        let class = loader
            .image
            .class_by_token(Token::from_parts(TableId::TypeDef as u8, row.parent))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        let _ = class.class_layout.set((row.packing_size, row.class_size));
    }
    Ok(())
}

fn load_decl_security(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<DeclSecurityRow>(TableId::DeclSecurity)? else {
        return Ok(());
    };
    let blob = loader.image.blob_heap()?;
    for row in table.iter() {
        let permission_set = blob.get(row.permission_set as usize)?.to_vec();
        if row.parent.tag == TableId::TypeDef {
            let class = loader
                .image
                .class_by_token(row.parent.token)
                .ok_or(crate::Error::TokenNotFound(row.parent.token))?;
            class.decl_security.push((row.action, permission_set));
        }
    }
    Ok(())
}

fn load_manifest(loader: &LoaderCtx<'_>) -> Result<()> {
    let strings = loader.image.strings_heap()?;
    if let Some(table) = loader.image.table::<FileRow>(TableId::File)? {
        for row in table.iter() {
            loader.image.files.insert(
                row.token,
                (strings.get(row.name as usize)?.to_string(), row.flags),
            );
        }
    }
    if let Some(table) = loader.image.table::<ExportedTypeRow>(TableId::ExportedType)? {
        for row in table.iter() {
            loader.image.exported_types.insert(
                row.token,
                (
                    strings.get(row.type_namespace as usize)?.to_string(),
                    strings.get(row.type_name as usize)?.to_string(),
                    row.implementation.token,
                ),
            );
        }
    }
    if let Some(table) = loader
        .image
        .table::<ManifestResourceRow>(TableId::ManifestResource)?
    {
        for row in table.iter() {
            loader.image.resources.insert(
                row.token,
                (
                    strings.get(row.name as usize)?.to_string(),
                    row.flags,
                    row.data_offset,
                ),
            );
        }
    }
    Ok(())
}

fn load_method_semantics(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<MethodSemanticsRow>(TableId::MethodSemantics)? else {
        return Ok(());
    };
    for row in table.iter() {
        let method = loader
            .image
            .method_by_token(Token::from_parts(TableId::MethodDef as u8, row.method))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        let semantics = MethodSemanticsAttributes::from_bits_retain(row.semantics);
        let _ = method.semantics.set(semantics);

        match row.association.tag {
            TableId::Property => {
                let property = loader
                    .image
                    .properties
                    .get(&row.association.token)
                    .map(|entry| entry.value().clone())
                    .ok_or(crate::Error::TokenNotFound(row.association.token))?;
                if semantics.contains(MethodSemanticsAttributes::GETTER) {
                    let _ = property.getter.set(method.clone());
                } else if semantics.contains(MethodSemanticsAttributes::SETTER) {
                    let _ = property.setter.set(method.clone());
                }
            }
            TableId::Event => {
                let event = loader
                    .image
                    .events
                    .get(&row.association.token)
                    .map(|entry| entry.value().clone())
                    .ok_or(crate::Error::TokenNotFound(row.association.token))?;
                if semantics.contains(MethodSemanticsAttributes::ADD_ON) {
                    let _ = event.add_on.set(method.clone());
                } else if semantics.contains(MethodSemanticsAttributes::REMOVE_ON) {
                    let _ = event.remove_on.set(method.clone());
                } else if semantics.contains(MethodSemanticsAttributes::FIRE) {
                    let _ = event.fire.set(method.clone());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn load_method_impls(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<MethodImplRow>(TableId::MethodImpl)? else {
        return Ok(());
    };
    for row in table.iter() {
        let class = loader
            .image
            .class_by_token(Token::from_parts(TableId::TypeDef as u8, row.class))
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        if row.method_body.tag == TableId::MethodDef {
            let body = loader
                .image
                .method_by_token(row.method_body.token)
                .ok_or(crate::Error::TokenNotFound(row.method_body.token))?;
            class.method_impls.push((body, row.method_declaration.token));
        }
    }
    Ok(())
}

fn load_pinvoke(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<ImplMapRow>(TableId::ImplMap)? else {
        return Ok(());
    };
    let strings = loader.image.strings_heap()?;
    for row in table.iter() {
        if row.member_forwarded.tag != TableId::MethodDef {
            continue;
        }
        let method = loader
            .image
            .method_by_token(row.member_forwarded.token)
            .ok_or(crate::Error::TokenNotFound(row.member_forwarded.token))?;
        let scope = loader
            .image
            .module_refs
            .get(&Token::from_parts(TableId::ModuleRef as u8, row.import_scope))
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let _ = method.pinvoke.set(PInvokeInfo {
            mapping_flags: row.mapping_flags,
            import_name: strings.get(row.import_name as usize)?.to_string(),
            import_scope: scope,
        });
    }
    Ok(())
}

/// Custom attributes attach to almost anything; the runtime validates the
/// parent/constructor tokens are in range and keeps the blobs in the heap.
fn load_custom_attributes(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<CustomAttributeRow>(TableId::CustomAttribute)? else {
        return Ok(());
    };
    let blob = loader.image.blob_heap()?;
    for row in table.iter() {
        let _ = blob.get(row.value as usize)?;
        let constructor_rows = loader.image.row_count(match row.constructor.tag {
            TableId::MethodDef => TableId::MethodDef,
            _ => TableId::MemberRef,
        });
        if row.constructor.row == 0 || row.constructor.row > constructor_rows {
            return Err(malformed_error!(
                "Custom attribute {} has an invalid constructor",
                row.token
            ));
        }
    }
    Ok(())
}
