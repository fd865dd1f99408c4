use crate::file::io::{read_le_at, read_le_at_dyn};
use crate::metadata::tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfoRef};
use crate::metadata::token::Token;
use crate::Result;

/// The `Field` table defines the fields of all types, partitioned into
/// contiguous per-type runs by `TypeDef.field_list`. `TableId` = 0x04
#[derive(Clone, Debug)]
pub struct FieldRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `FieldAttributes`
    pub flags: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Blob` heap (a field signature)
    pub signature: u32,
}

impl RowReadable for FieldRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.str_bytes() + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(FieldRow {
            rid,
            token: Token::from_parts(TableId::Field as u8, rid),
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `MethodDef` table defines the methods of all types, partitioned
/// into contiguous per-type runs by `TypeDef.method_list`. `TableId` = 0x06
#[derive(Clone, Debug)]
pub struct MethodDefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// RVA of the method body; 0 for abstract/runtime methods
    pub rva: u32,
    /// A 2-byte bitmask of type `MethodImplAttributes`
    pub impl_flags: u16,
    /// A 2-byte bitmask of type `MethodAttributes`
    pub flags: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Blob` heap (a method signature)
    pub signature: u32,
    /// First of a contiguous run of rows this method owns in the `Param` table
    pub param_list: u32,
}

impl RowReadable for MethodDefRow {
    #[rustfmt::skip]
    fn row_size(sizes: &TableInfoRef) -> u32 {
        /* rva + impl_flags + flags */ 8 +
        /* name */                     sizes.str_bytes() +
        /* signature */                sizes.blob_bytes() +
        /* param_list */               sizes.table_index_bytes(TableId::Param)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(MethodDefRow {
            rid,
            token: Token::from_parts(TableId::MethodDef as u8, rid),
            rva: read_le_at::<u32>(data, offset)?,
            impl_flags: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            param_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Param))?,
        })
    }
}

/// The `Param` table describes method parameters, partitioned into
/// contiguous per-method runs by `MethodDef.param_list`. `TableId` = 0x08
#[derive(Clone, Debug)]
pub struct ParamRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `ParamAttributes`
    pub flags: u16,
    /// 1-based parameter position; 0 names the return value
    pub sequence: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
}

impl RowReadable for ParamRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        4 + sizes.str_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ParamRow {
            rid,
            token: Token::from_parts(TableId::Param as u8, rid),
            flags: read_le_at::<u16>(data, offset)?,
            sequence: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

/// The `MemberRef` table names fields and methods of other types, local or
/// imported. `TableId` = 0x0A
#[derive(Clone, Debug)]
pub struct MemberRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A `MemberRefParent` coded index naming the owner
    pub class: CodedIndex,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Blob` heap (field or method signature)
    pub signature: u32,
}

impl RowReadable for MemberRefRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.coded_index_bytes(CodedIndexType::MemberRefParent)
            + sizes.str_bytes()
            + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(MemberRefRow {
            rid,
            token: Token::from_parts(TableId::MemberRef as u8, rid),
            class: CodedIndex::read(data, offset, sizes, CodedIndexType::MemberRefParent)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `EventMap` table partitions the `Event` table into per-type runs.
/// `TableId` = 0x12
#[derive(Clone, Debug)]
pub struct EventMapRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `TypeDef` table
    pub parent: u32,
    /// First of a contiguous run of rows in the `Event` table
    pub event_list: u32,
}

impl RowReadable for EventMapRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.table_index_bytes(TableId::TypeDef) + sizes.table_index_bytes(TableId::Event)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(EventMapRow {
            rid,
            token: Token::from_parts(TableId::EventMap as u8, rid),
            parent: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            event_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Event))?,
        })
    }
}

/// The `Event` table defines the events of all types. `TableId` = 0x14
#[derive(Clone, Debug)]
pub struct EventRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `EventAttributes`
    pub flags: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// A `TypeDefOrRef` coded index naming the delegate type
    pub event_type: CodedIndex,
}

impl RowReadable for EventRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.str_bytes() + sizes.coded_index_bytes(CodedIndexType::TypeDefOrRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(EventRow {
            rid,
            token: Token::from_parts(TableId::Event as u8, rid),
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            event_type: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
        })
    }
}

/// The `PropertyMap` table partitions the `Property` table into per-type
/// runs. `TableId` = 0x15
#[derive(Clone, Debug)]
pub struct PropertyMapRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `TypeDef` table
    pub parent: u32,
    /// First of a contiguous run of rows in the `Property` table
    pub property_list: u32,
}

impl RowReadable for PropertyMapRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.table_index_bytes(TableId::TypeDef) + sizes.table_index_bytes(TableId::Property)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(PropertyMapRow {
            rid,
            token: Token::from_parts(TableId::PropertyMap as u8, rid),
            parent: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            property_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Property))?,
        })
    }
}

/// The `Property` table defines the properties of all types. `TableId` = 0x17
#[derive(Clone, Debug)]
pub struct PropertyRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `PropertyAttributes`
    pub flags: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Blob` heap (a property signature)
    pub signature: u32,
}

impl RowReadable for PropertyRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.str_bytes() + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(PropertyRow {
            rid,
            token: Token::from_parts(TableId::Property as u8, rid),
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `MethodSemantics` table binds getter/setter/adder/raiser methods to
/// their property or event. `TableId` = 0x18
#[derive(Clone, Debug)]
pub struct MethodSemanticsRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 2-byte bitmask of type `MethodSemanticsAttributes`
    pub semantics: u16,
    /// Index into the `MethodDef` table
    pub method: u32,
    /// A `HasSemantics` coded index naming the owning event or property
    pub association: CodedIndex,
}

impl RowReadable for MethodSemanticsRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.table_index_bytes(TableId::MethodDef)
            + sizes.coded_index_bytes(CodedIndexType::HasSemantics)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(MethodSemanticsRow {
            rid,
            token: Token::from_parts(TableId::MethodSemantics as u8, rid),
            semantics: read_le_at::<u16>(data, offset)?,
            method: read_le_at_dyn(data, offset, sizes.is_large(TableId::MethodDef))?,
            association: CodedIndex::read(data, offset, sizes, CodedIndexType::HasSemantics)?,
        })
    }
}

/// The `MethodImpl` table records explicit method overrides. `TableId` = 0x19
#[derive(Clone, Debug)]
pub struct MethodImplRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `TypeDef` table: the implementing class
    pub class: u32,
    /// A `MethodDefOrRef` coded index: the implementing body
    pub method_body: CodedIndex,
    /// A `MethodDefOrRef` coded index: the overridden declaration
    pub method_declaration: CodedIndex,
}

impl RowReadable for MethodImplRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.table_index_bytes(TableId::TypeDef)
            + 2 * sizes.coded_index_bytes(CodedIndexType::MethodDefOrRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(MethodImplRow {
            rid,
            token: Token::from_parts(TableId::MethodImpl as u8, rid),
            class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            method_body: CodedIndex::read(data, offset, sizes, CodedIndexType::MethodDefOrRef)?,
            method_declaration: CodedIndex::read(data, offset, sizes, CodedIndexType::MethodDefOrRef)?,
        })
    }
}
