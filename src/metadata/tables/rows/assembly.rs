use crate::file::io::{read_le_at, read_le_at_dyn};
use crate::metadata::tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfoRef};
use crate::metadata::token::Token;
use crate::Result;

/// The `Module` table has exactly one row describing the current module.
/// `TableId` = 0x00
#[derive(Clone, Debug)]
pub struct ModuleRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Reserved, always 0
    pub generation: u16,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#GUID` heap: the module version id
    pub mvid: u32,
    /// Reserved edit-and-continue GUID index
    pub enc_id: u32,
    /// Reserved edit-and-continue GUID index
    pub enc_base_id: u32,
}

impl RowReadable for ModuleRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        2 + sizes.str_bytes() + 3 * sizes.guid_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ModuleRow {
            rid,
            token: Token::from_parts(TableId::Module as u8, rid),
            generation: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            mvid: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            enc_id: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            enc_base_id: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
        })
    }
}

/// The `ModuleRef` table names other modules of the same assembly, used
/// mostly as PInvoke import scopes. `TableId` = 0x1A
#[derive(Clone, Debug)]
pub struct ModuleRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Index into the `#Strings` heap
    pub name: u32,
}

impl RowReadable for ModuleRefRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        sizes.str_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ModuleRefRow {
            rid,
            token: Token::from_parts(TableId::ModuleRef as u8, rid),
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

/// The `Assembly` table has at most one row describing this assembly.
/// `TableId` = 0x20
#[derive(Clone, Debug)]
pub struct AssemblyRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Hash algorithm id used for file hashes
    pub hash_alg_id: u32,
    /// Version major component
    pub major_version: u16,
    /// Version minor component
    pub minor_version: u16,
    /// Version build component
    pub build_number: u16,
    /// Version revision component
    pub revision_number: u16,
    /// A 4-byte bitmask of type `AssemblyFlags`
    pub flags: u32,
    /// Index into the `#Blob` heap: the public key
    pub public_key: u32,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Strings` heap
    pub culture: u32,
}

impl RowReadable for AssemblyRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        16 + sizes.blob_bytes() + 2 * sizes.str_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRow {
            rid,
            token: Token::from_parts(TableId::Assembly as u8, rid),
            hash_alg_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

/// The `AssemblyProcessor` table (rarely emitted). `TableId` = 0x21
#[derive(Clone, Debug)]
pub struct AssemblyProcessorRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Processor architecture id
    pub processor: u32,
}

impl RowReadable for AssemblyProcessorRow {
    fn row_size(_sizes: &TableInfoRef) -> u32 {
        4
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, _sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyProcessorRow {
            rid,
            token: Token::from_parts(TableId::AssemblyProcessor as u8, rid),
            processor: read_le_at::<u32>(data, offset)?,
        })
    }
}

/// The `AssemblyOS` table (rarely emitted). `TableId` = 0x22
#[derive(Clone, Debug)]
pub struct AssemblyOsRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// OS platform id
    pub platform_id: u32,
    /// OS version major component
    pub major_version: u32,
    /// OS version minor component
    pub minor_version: u32,
}

impl RowReadable for AssemblyOsRow {
    fn row_size(_sizes: &TableInfoRef) -> u32 {
        12
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, _sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyOsRow {
            rid,
            token: Token::from_parts(TableId::AssemblyOs as u8, rid),
            platform_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u32>(data, offset)?,
            minor_version: read_le_at::<u32>(data, offset)?,
        })
    }
}

/// The `AssemblyRef` table names assemblies this image depends on.
/// `TableId` = 0x23
#[derive(Clone, Debug)]
pub struct AssemblyRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Version major component
    pub major_version: u16,
    /// Version minor component
    pub minor_version: u16,
    /// Version build component
    pub build_number: u16,
    /// Version revision component
    pub revision_number: u16,
    /// A 4-byte bitmask of type `AssemblyFlags`
    pub flags: u32,
    /// Index into the `#Blob` heap: public key or token
    pub public_key_or_token: u32,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Strings` heap
    pub culture: u32,
    /// Index into the `#Blob` heap: hash of the referenced assembly
    pub hash_value: u32,
}

impl RowReadable for AssemblyRefRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        12 + 2 * sizes.blob_bytes() + 2 * sizes.str_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRefRow {
            rid,
            token: Token::from_parts(TableId::AssemblyRef as u8, rid),
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key_or_token: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            hash_value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `AssemblyRefProcessor` table (rarely emitted). `TableId` = 0x24
#[derive(Clone, Debug)]
pub struct AssemblyRefProcessorRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Processor architecture id
    pub processor: u32,
    /// Index into the `AssemblyRef` table
    pub assembly_ref: u32,
}

impl RowReadable for AssemblyRefProcessorRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        4 + sizes.table_index_bytes(TableId::AssemblyRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRefProcessorRow {
            rid,
            token: Token::from_parts(TableId::AssemblyRefProcessor as u8, rid),
            processor: read_le_at::<u32>(data, offset)?,
            assembly_ref: read_le_at_dyn(data, offset, sizes.is_large(TableId::AssemblyRef))?,
        })
    }
}

/// The `AssemblyRefOS` table (rarely emitted). `TableId` = 0x25
#[derive(Clone, Debug)]
pub struct AssemblyRefOsRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// OS platform id
    pub platform_id: u32,
    /// OS version major component
    pub major_version: u32,
    /// OS version minor component
    pub minor_version: u32,
    /// Index into the `AssemblyRef` table
    pub assembly_ref: u32,
}

impl RowReadable for AssemblyRefOsRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        12 + sizes.table_index_bytes(TableId::AssemblyRef)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(AssemblyRefOsRow {
            rid,
            token: Token::from_parts(TableId::AssemblyRefOs as u8, rid),
            platform_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u32>(data, offset)?,
            minor_version: read_le_at::<u32>(data, offset)?,
            assembly_ref: read_le_at_dyn(data, offset, sizes.is_large(TableId::AssemblyRef))?,
        })
    }
}

/// The `File` table names other files of a multi-file assembly.
/// `TableId` = 0x26
#[derive(Clone, Debug)]
pub struct FileRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 4-byte bitmask of type `FileAttributes`
    pub flags: u32,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// Index into the `#Blob` heap: hash of the file contents
    pub hash_value: u32,
}

impl RowReadable for FileRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        4 + sizes.str_bytes() + sizes.blob_bytes()
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(FileRow {
            rid,
            token: Token::from_parts(TableId::File as u8, rid),
            flags: read_le_at::<u32>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            hash_value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

/// The `ExportedType` table re-exports types that live in other files of
/// the assembly. `TableId` = 0x27
#[derive(Clone, Debug)]
pub struct ExportedTypeRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// A 4-byte bitmask of type `TypeAttributes`
    pub flags: u32,
    /// Hint: the `TypeDef` token in the file that defines the type
    pub type_def_id: u32,
    /// Index into the `#Strings` heap
    pub type_name: u32,
    /// Index into the `#Strings` heap
    pub type_namespace: u32,
    /// An `Implementation` coded index naming the defining file/assembly
    pub implementation: CodedIndex,
}

impl RowReadable for ExportedTypeRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        8 + 2 * sizes.str_bytes() + sizes.coded_index_bytes(CodedIndexType::Implementation)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ExportedTypeRow {
            rid,
            token: Token::from_parts(TableId::ExportedType as u8, rid),
            flags: read_le_at::<u32>(data, offset)?,
            type_def_id: read_le_at::<u32>(data, offset)?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            implementation: CodedIndex::read(data, offset, sizes, CodedIndexType::Implementation)?,
        })
    }
}

/// The `ManifestResource` table names embedded or linked resources.
/// `TableId` = 0x28
#[derive(Clone, Debug)]
pub struct ManifestResourceRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Byte offset of the resource within its container
    pub data_offset: u32,
    /// A 4-byte bitmask of type `ManifestResourceAttributes`
    pub flags: u32,
    /// Index into the `#Strings` heap
    pub name: u32,
    /// An `Implementation` coded index; row 0 means "this file"
    pub implementation: CodedIndex,
}

impl RowReadable for ManifestResourceRow {
    fn row_size(sizes: &TableInfoRef) -> u32 {
        8 + sizes.str_bytes() + sizes.coded_index_bytes(CodedIndexType::Implementation)
    }

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self> {
        Ok(ManifestResourceRow {
            rid,
            token: Token::from_parts(TableId::ManifestResource as u8, rid),
            data_offset: read_le_at::<u32>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            implementation: CodedIndex::read(data, offset, sizes, CodedIndexType::Implementation)?,
        })
    }
}
