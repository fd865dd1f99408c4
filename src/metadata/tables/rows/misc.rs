use crate::file::io::{read_le_at, read_le_at_dyn};
use crate::metadata::tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfoRef};
use crate::metadata::token::Token;
use crate::Result;

/// The `Constant` table attaches compile-time constant values to fields,
/// params and properties. `TableId` = 0x0B
#[derive(Clone, Debug)]
pub struct ConstantRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Element type of the value (one byte, one padding byte follows)
    pub base_type: u8,
    /// A `HasConstant` coded index naming the owner
    pub parent: CodedIndex,
    /// Index into the `#Blob` heap holding the value bits
    pub value: u32,
}

impl RowReadable for ConstantRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.coded_index_bytes(CodedIndexType::HasConstant) + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        let base_type = read_le_at::<u8>(data, offset)?;
        let _padding = read_le_at::<u8>(data, offset)?;
        Ok(ConstantRow {
            rid,
            token: Token::from_parts(TableId::Constant as u8, rid),
            base_type,
            parent: CodedIndex::read(data, offset, sizes, CodedIndexType::HasConstant)?,
            value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `CustomAttribute` table attaches encoded attribute blobs to almost
/// any other row. `TableId` = 0x0C
#[derive(Clone, Debug)]
pub struct CustomAttributeRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A `HasCustomAttribute` coded index naming the target
    pub parent: CodedIndex,
    /// A `CustomAttributeType` coded index naming the constructor
    pub constructor: CodedIndex,
    /// Index into the `#Blob` heap holding the encoded arguments
    pub value: u32,
}

impl RowReadable for CustomAttributeRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.coded_index_bytes(CodedIndexType::HasCustomAttribute)
            + sizes.coded_index_bytes(CodedIndexType::CustomAttributeType)
            + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(CustomAttributeRow {
            rid,
            token: Token::from_parts(TableId::CustomAttribute as u8, rid),
            parent: CodedIndex::read(data, offset, sizes, CodedIndexType::HasCustomAttribute)?,
            constructor: CodedIndex::read(data, offset, sizes, CodedIndexType::CustomAttributeType)?,
            value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `FieldMarshal` table attaches native marshaling descriptors to
/// fields and params. `TableId` = 0x0D
#[derive(Clone, Debug)]
pub struct FieldMarshalRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A `HasFieldMarshal` coded index naming the owner
    pub parent: CodedIndex,
    /// Index into the `#Blob` heap holding the native type descriptor
    pub native_type: u32,
}

impl RowReadable for FieldMarshalRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.coded_index_bytes(CodedIndexType::HasFieldMarshal) + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(FieldMarshalRow {
            rid,
            token: Token::from_parts(TableId::FieldMarshal as u8, rid),
            parent: CodedIndex::read(data, offset, sizes, CodedIndexType::HasFieldMarshal)?,
            native_type: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `DeclSecurity` table attaches security permission sets to types,
/// methods and assemblies. `TableId` = 0x0E
#[derive(Clone, Debug)]
pub struct DeclSecurityRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// The security action code
    pub action: u16,
    /// A `HasDeclSecurity` coded index naming the target
    pub parent: CodedIndex,
    /// Index into the `#Blob` heap holding the permission set
    pub permission_set: u32,
}

impl RowReadable for DeclSecurityRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.coded_index_bytes(CodedIndexType::HasDeclSecurity) + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(DeclSecurityRow {
            rid,
            token: Token::from_parts(TableId::DeclSecurity as u8, rid),
            action: read_le_at::<u16>(data, offset)?,
            parent: CodedIndex::read(data, offset, sizes, CodedIndexType::HasDeclSecurity)?,
            permission_set: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `FieldLayout` table carries explicit field offsets for
/// explicit-layout types. `TableId` = 0x10
#[derive(Clone, Debug)]
pub struct FieldLayoutRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Byte offset of the field within its type
    pub field_offset: u32,
    /// Index into the `Field` table
    pub field: u32,
}

impl RowReadable for FieldLayoutRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        4 + sizes.table_index_bytes(TableId::Field)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(FieldLayoutRow {
            rid,
            token: Token::from_parts(TableId::FieldLayout as u8, rid),
            field_offset: read_le_at::<u32>(data, offset)?,
            field: read_le_at_dyn(data, offset, sizes.is_large(TableId::Field))?,
        })
    }
}

/// The `FieldRVA` table maps static fields to pre-initialized data in the
/// image. `TableId` = 0x1D
#[derive(Clone, Debug)]
pub struct FieldRvaRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// RVA of the initial data
    pub rva: u32,
    /// Index into the `Field` table
    pub field: u32,
}

impl RowReadable for FieldRvaRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        4 + sizes.table_index_bytes(TableId::Field)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(FieldRvaRow {
            rid,
            token: Token::from_parts(TableId::FieldRva as u8, rid),
            rva: read_le_at::<u32>(data, offset)?,
            field: read_le_at_dyn(data, offset, sizes.is_large(TableId::Field))?,
        })
    }
}

/// The `StandAloneSig` table holds signatures not attached to any member
/// (locals, indirect calls). `TableId` = 0x11
#[derive(Clone, Debug)]
pub struct StandAloneSigRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `#Blob` heap
    pub signature: u32,
}

impl RowReadable for StandAloneSigRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(StandAloneSigRow {
            rid,
            token: Token::from_parts(TableId::StandAloneSig as u8, rid),
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `ImplMap` table records PInvoke forwarding for methods and fields.
/// `TableId` = 0x1C
#[derive(Clone, Debug)]
pub struct ImplMapRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `PInvokeAttributes`
    pub mapping_flags: u16,
    /// A `MemberForwarded` coded index naming the forwarded member
    pub member_forwarded: CodedIndex,
    /// Index into the `#Strings` heap: the native entry point
    pub import_name: u32,
    /// Index into the `ModuleRef` table: the native module
    pub import_scope: u32,
}

impl RowReadable for ImplMapRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.coded_index_bytes(CodedIndexType::MemberForwarded)
            + sizes.str_bytes()
            + sizes.table_index_bytes(TableId::ModuleRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ImplMapRow {
            rid,
            token: Token::from_parts(TableId::ImplMap as u8, rid),
            mapping_flags: read_le_at::<u16>(data, offset)?,
            member_forwarded: CodedIndex::read(data, offset, sizes, CodedIndexType::MemberForwarded)?,
            import_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            import_scope: read_le_at_dyn(data, offset, sizes.is_large(TableId::ModuleRef))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::tables::{MetadataTable, TableInfo};

    #[test]
    fn constant_row_skips_padding() {
        let data: Vec<u8> = vec![
            0x08, 0x00, // ELEMENT_TYPE_I4 + padding
            0x04, 0x00, // parent (tag 0 = Field, row 1)
            0x10, 0x00, // value
        ];
        let sizes = Arc::new(TableInfo::new_test(&[(TableId::Field, 1)], false));
        let table: MetadataTable<ConstantRow> =
            MetadataTable::new(Arc::from(data.as_slice()), 0, 1, sizes).unwrap();
        let row = table.get(1).unwrap();
        assert_eq!(row.base_type, 0x08);
        assert_eq!(row.parent.tag, TableId::Field);
        assert_eq!(row.parent.row, 1);
        assert_eq!(row.value, 0x10);
    }

    #[test]
    fn field_layout_row() {
        let data: Vec<u8> = vec![0x08, 0x00, 0x00, 0x00, 0x02, 0x00];
        let sizes = Arc::new(TableInfo::new_test(&[(TableId::Field, 4)], false));
        let table: MetadataTable<FieldLayoutRow> =
            MetadataTable::new(Arc::from(data.as_slice()), 0, 1, sizes).unwrap();
        let row = table.get(1).unwrap();
        assert_eq!(row.field_offset, 8);
        assert_eq!(row.field, 2);
    }
}
