use crate::file::io::{read_le_at, read_le_at_dyn};
use crate::metadata::tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfoRef};
use crate::metadata::token::Token;
use crate::Result;

/// The `TypeRef` table names types defined elsewhere: another image, this
/// module (fixed up in phase 2), or a nested parent. `TableId` = 0x01
#[derive(Clone, Debug)]
pub struct TypeRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A `ResolutionScope` coded index; row 0 means "current module"
    pub resolution_scope: CodedIndex,
    /// Index into the `#Strings` heap
    pub type_name: u32,
    /// Index into the `#Strings` heap
    pub type_namespace: u32,
}

impl RowReadable for TypeRefRow {
    #[rustfmt::skip]
    fn row_size(sizes: &TableInfoRef) -> u32 {
        /* resolution_scope */ sizes.coded_index_bytes(CodedIndexType::ResolutionScope) +
        /* type_name */        sizes.str_bytes() +
        /* type_namespace */   sizes.str_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(TypeRefRow {
            rid,
            token: Token::from_parts(TableId::TypeRef as u8, rid),
            resolution_scope: CodedIndex::read(data, offset, sizes, CodedIndexType::ResolutionScope)?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

/// The `TypeDef` table defines types (classes, interfaces, value types,
/// enums) in the current module. `TableId` = 0x02
#[derive(Clone, Debug)]
pub struct TypeDefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 4-byte bitmask of type `TypeAttributes`
    pub flags: u32,
    /// Index into the `#Strings` heap
    pub type_name: u32,
    /// Index into the `#Strings` heap
    pub type_namespace: u32,
    /// A `TypeDefOrRef` coded index naming the base type; row 0 for none
    pub extends: CodedIndex,
    /// First of a contiguous run of rows this type owns in the `Field` table
    pub field_list: u32,
    /// First of a contiguous run of rows this type owns in the `MethodDef` table
    pub method_list: u32,
}

impl RowReadable for TypeDefRow {
    #[rustfmt::skip]
    fn row_size(sizes: &TableInfoRef) -> u32 {
        /* flags */          4 +
        /* type_name */      sizes.str_bytes() +
        /* type_namespace */ sizes.str_bytes() +
        /* extends */        sizes.coded_index_bytes(CodedIndexType::TypeDefOrRef) +
        /* field_list */     sizes.table_index_bytes(TableId::Field) +
        /* method_list */    sizes.table_index_bytes(TableId::MethodDef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(TypeDefRow {
            rid,
            token: Token::from_parts(TableId::TypeDef as u8, rid),
            flags: read_le_at::<u32>(data, offset)?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            extends: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
            field_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Field))?,
            method_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::MethodDef))?,
        })
    }
}

/// The `TypeSpec` table holds signature blobs describing constructed types
/// (arrays, pointers, byrefs, function pointers). `TableId` = 0x1B
#[derive(Clone, Debug)]
pub struct TypeSpecRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `#Blob` heap
    pub signature: u32,
}

impl RowReadable for TypeSpecRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(TypeSpecRow {
            rid,
            token: Token::from_parts(TableId::TypeSpec as u8, rid),
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `InterfaceImpl` table records which interfaces a type implements.
/// `TableId` = 0x09
#[derive(Clone, Debug)]
pub struct InterfaceImplRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `TypeDef` table
    pub class: u32,
    /// A `TypeDefOrRef` coded index naming the implemented interface
    pub interface: CodedIndex,
}

impl RowReadable for InterfaceImplRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.table_index_bytes(TableId::TypeDef)
            + sizes.coded_index_bytes(CodedIndexType::TypeDefOrRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(InterfaceImplRow {
            rid,
            token: Token::from_parts(TableId::InterfaceImpl as u8, rid),
            class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            interface: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
        })
    }
}

/// The `ClassLayout` table carries explicit packing and size declarations.
/// `TableId` = 0x0F
#[derive(Clone, Debug)]
pub struct ClassLayoutRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Field alignment override; must be 0, 1, 2, 4 or 8
    pub packing_size: u16,
    /// Minimum instance size in bytes
    pub class_size: u32,
    /// Index into the `TypeDef` table
    pub parent: u32,
}

impl RowReadable for ClassLayoutRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + 4 + sizes.table_index_bytes(TableId::TypeDef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ClassLayoutRow {
            rid,
            token: Token::from_parts(TableId::ClassLayout as u8, rid),
            packing_size: read_le_at::<u16>(data, offset)?,
            class_size: read_le_at::<u32>(data, offset)?,
            parent: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
        })
    }
}

/// The `NestedClass` table relates nested types to their enclosing types.
/// May be sorted (binary search) or unsorted (linear scan). `TableId` = 0x29
#[derive(Clone, Debug)]
pub struct NestedClassRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `TypeDef` table: the nested (inner) type
    pub nested_class: u32,
    /// Index into the `TypeDef` table: the enclosing (outer) type
    pub enclosing_class: u32,
}

impl RowReadable for NestedClassRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 * sizes.table_index_bytes(TableId::TypeDef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(NestedClassRow {
            rid,
            token: Token::from_parts(TableId::NestedClass as u8, rid),
            nested_class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            enclosing_class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
        })
    }
}
