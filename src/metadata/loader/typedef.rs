//! `TypeDef` loading.
//!
//! Phase 1 creates every class with its name, nesting scope and (in a
//! second sweep, once all rows exist) its base-type link, so that forward
//! references — `class A : B {}` with `B` defined later in the token
//! stream — resolve identically to backward ones. Phase 2 walks the
//! contiguous field/method/param token ranges and builds the members.

use std::sync::Arc;

use crate::metadata::loader::LoaderCtx;
use crate::metadata::signatures::SignatureReader;
use crate::metadata::tables::rows::{
    FieldRow, MethodDefRow, NestedClassRow, ParamRow, TypeDefRow,
};
use crate::metadata::tables::TableId;
use crate::metadata::token::Token;
use crate::typesystem::attrs::{
    FieldAttributes, MethodAttributes, ParamAttributes, TypeAttributes,
};
use crate::typesystem::member::{Field, Method, Param};
use crate::typesystem::{ClassRc, ClassRef, ClassScope};
use crate::Result;

/// Find the enclosing type of `child` (a 1-based `TypeDef` row) in the
/// `NestedClass` table: binary search when the image declares the table
/// sorted, linear scan otherwise.
fn find_nested_parent(
    rows: &[NestedClassRow],
    sorted: bool,
    child: u32,
) -> Option<u32> {
    if sorted {
        let mut lo = 0usize;
        let mut hi = rows.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match rows[mid].nested_class.cmp(&child) {
                std::cmp::Ordering::Equal => return Some(rows[mid].enclosing_class),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    } else {
        rows.iter()
            .find(|row| row.nested_class == child)
            .map(|row| row.enclosing_class)
    }
}

/// Phase 1: names, nesting and hierarchy only.
pub(crate) fn load_phase1(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<TypeDefRow>(TableId::TypeDef)? else {
        return Ok(());
    };
    let rows: Vec<TypeDefRow> = table.iter().collect();
    let nested_rows: Vec<NestedClassRow> = match loader
        .image
        .table::<NestedClassRow>(TableId::NestedClass)?
    {
        Some(nested_table) => nested_table.iter().collect(),
        None => Vec::new(),
    };
    let nested_sorted = loader.image.table_info().is_sorted(TableId::NestedClass);

    // Sweep 1: create every class, enclosing types before their nested
    // types (the nesting scope is part of the class's identity)
    for row in &rows {
        ensure_class(loader, &rows, &nested_rows, nested_sorted, row.rid)?;
    }

    // Sweep 2: attach base types; every local TypeDef and TypeRef now has
    // a class object, so forward and backward extends links behave the
    // same
    for row in &rows {
        if row.extends.row == 0 {
            continue;
        }
        let class = loader
            .image
            .class_by_token(row.token)
            .ok_or(crate::Error::TokenNotFound(row.token))?;
        if class.parent_ref().is_some() {
            continue;
        }
        let parent = loader.class_ref_for_token(row.extends.token)?;
        class.set_parent(Some(parent));
    }
    Ok(())
}

fn ensure_class(
    loader: &LoaderCtx<'_>,
    rows: &[TypeDefRow],
    nested_rows: &[NestedClassRow],
    nested_sorted: bool,
    rid: u32,
) -> Result<ClassRc> {
    let token = Token::from_parts(TableId::TypeDef as u8, rid);
    if let Some(existing) = loader.image.class_by_token(token) {
        return Ok(existing);
    }
    let row = rows
        .get(rid as usize - 1)
        .ok_or(crate::Error::TokenNotFound(token))?;

    let strings = loader.image.strings_heap()?;
    let name = strings.get(row.type_name as usize)?.to_string();
    let namespace = strings.get(row.type_namespace as usize)?.to_string();
    let image_id = loader.image.id();

    let scope = match find_nested_parent(nested_rows, nested_sorted, rid) {
        Some(parent_rid) => {
            if parent_rid == rid || parent_rid == 0 || parent_rid as usize > rows.len() {
                return Err(malformed_error!(
                    "invalid nesting parent {} for {}",
                    parent_rid,
                    token
                ));
            }
            let parent = ensure_class(loader, rows, nested_rows, nested_sorted, parent_rid)?;
            ClassScope::Nested(ClassRef::new(&parent))
        }
        None => ClassScope::Module(image_id),
    };

    let class = loader.ctx.class_create(
        image_id,
        scope,
        row.token,
        &name,
        &namespace,
        TypeAttributes::from_bits_retain(row.flags),
        None,
    )?;
    loader.image.classes.insert(row.token, class.clone());
    Ok(class)
}

/// Validate a contiguous member range `[start, end)` against its table.
///
/// Token-range membership is monotonically increasing in the raw table;
/// an unresolved or backward range is metadata corruption.
fn member_range(
    owner: Token,
    start: u32,
    next_start: Option<u32>,
    total_rows: u32,
) -> Result<std::ops::Range<u32>> {
    if start == 0 || total_rows == 0 {
        return Ok(0..0);
    }
    let end = next_start.unwrap_or(total_rows + 1);
    if start > end || end > total_rows + 1 {
        return Err(crate::Error::BadMemberRange(owner));
    }
    Ok(start..end)
}

/// Phase 2: fields, methods and params.
pub(crate) fn load_phase2(loader: &LoaderCtx<'_>) -> Result<()> {
    let Some(table) = loader.image.table::<TypeDefRow>(TableId::TypeDef)? else {
        return Ok(());
    };
    let rows: Vec<TypeDefRow> = table.iter().collect();

    let field_table = loader.image.table::<FieldRow>(TableId::Field)?;
    let method_table = loader.image.table::<MethodDefRow>(TableId::MethodDef)?;
    let param_table = loader.image.table::<ParamRow>(TableId::Param)?;
    let field_rows = loader.image.row_count(TableId::Field);
    let method_rows = loader.image.row_count(TableId::MethodDef);
    let param_rows = loader.image.row_count(TableId::Param);

    let method_defs: Vec<MethodDefRow> = match &method_table {
        Some(methods) => methods.iter().collect(),
        None => Vec::new(),
    };

    for (index, row) in rows.iter().enumerate() {
        let class = loader
            .image
            .class_by_token(row.token)
            .ok_or(crate::Error::TokenNotFound(row.token))?;

        let next = rows.get(index + 1);
        let fields = member_range(
            row.token,
            row.field_list,
            next.map(|next_row| next_row.field_list),
            field_rows,
        )?;
        let methods = member_range(
            row.token,
            row.method_list,
            next.map(|next_row| next_row.method_list),
            method_rows,
        )?;

        if let Some(field_table) = &field_table {
            for rid in fields {
                let field_row = field_table
                    .get(rid)
                    .ok_or(crate::Error::BadMemberRange(row.token))?;
                load_field(loader, &class, &field_row)?;
            }
        }
        if method_table.is_some() {
            for rid in methods {
                let method_row = method_defs
                    .get(rid as usize - 1)
                    .ok_or(crate::Error::BadMemberRange(row.token))?;
                let next_params = method_defs
                    .get(rid as usize)
                    .map(|next_row| next_row.param_list);
                let params = member_range(method_row.token, method_row.param_list, next_params, param_rows)?;
                load_method(loader, &class, method_row, params, param_table.as_ref())?;
            }
        }
    }
    Ok(())
}

fn load_field(loader: &LoaderCtx<'_>, class: &ClassRc, row: &FieldRow) -> Result<()> {
    let strings = loader.image.strings_heap()?;
    let blob = loader.image.blob_heap()?;
    let name = strings.get(row.name as usize)?;
    let sig = SignatureReader::new(blob.get(row.signature as usize)?).parse_field()?;
    let field_type = loader.type_from_sig(&sig.field_type)?;
    let field = Field::new(
        row.token,
        name,
        FieldAttributes::from_bits_retain(row.flags),
        field_type,
        ClassRef::new(class),
    );
    class.fields.push(field.clone());
    loader.image.fields.insert(row.token, field);
    Ok(())
}

fn load_method(
    loader: &LoaderCtx<'_>,
    class: &ClassRc,
    row: &MethodDefRow,
    params: std::ops::Range<u32>,
    param_table: Option<&crate::metadata::tables::MetadataTable<ParamRow>>,
) -> Result<()> {
    let strings = loader.image.strings_heap()?;
    let blob = loader.image.blob_heap()?;
    let name = strings.get(row.name as usize)?;
    let sig = SignatureReader::new(blob.get(row.signature as usize)?).parse_method()?;
    let signature = Arc::new(loader.method_sig_from(&sig)?);
    let method = Method::new(
        row.token,
        name,
        MethodAttributes::from_bits_retain(row.flags),
        row.impl_flags,
        row.rva,
        signature,
        ClassRef::new(class),
    );
    if let Some(param_table) = param_table {
        for rid in params {
            let param_row = param_table
                .get(rid)
                .ok_or(crate::Error::BadMemberRange(row.token))?;
            let param = Param::new(
                param_row.token,
                strings.get(param_row.name as usize)?,
                ParamAttributes::from_bits_retain(param_row.flags),
                param_row.sequence,
            );
            method.params.push(param.clone());
            loader.image.params.insert(param_row.token, param);
        }
    }
    class.methods.push(method.clone());
    loader.image.methods.insert(row.token, method);
    Ok(())
}
