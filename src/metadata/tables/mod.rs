//! Metadata token tables.
//!
//! The `#~` stream stores type, member and assembly information as a series
//! of fixed-width row tables. This module provides the table identifiers,
//! the size bookkeeping needed to decode variable-width index columns, the
//! compact cross-table [`CodedIndex`] encoding, and a generic typed reader
//! ([`MetadataTable`]) over raw row data.
//!
//! # Key Components
//!
//! - [`TableId`] - enumeration of every table tag this crate understands
//! - [`TableInfo`] - row counts and index widths for one image
//! - [`CodedIndex`] / [`CodedIndexType`] - compact cross-table references
//! - [`MetadataTable`] / [`RowReadable`] - typed access to raw rows
//!
//! Raw row definitions live in the [`rows`] submodule; they carry heap and
//! table *indexes*, never resolved objects. Resolution happens in the
//! loader (see [`crate::metadata::loader`]).

pub mod rows;

use std::marker::PhantomData;
use std::sync::Arc;

use strum::{EnumCount, EnumIter};

use crate::file::io::read_le_at_dyn;
use crate::metadata::token::Token;
use crate::Result;

/// Identifies one metadata table by its ECMA-335 table tag.
///
/// The discriminant is the table tag, i.e. the high byte of every token
/// that points into the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Map a raw table tag back to a `TableId`.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<TableId> {
        use strum::IntoEnumIterator;
        TableId::iter().find(|id| *id as u8 == tag)
    }
}

/// The compact cross-table reference encodings defined by ECMA-335 §II.24.2.6.
///
/// A coded index packs a table selector into the low bits of a row index;
/// the number of selector bits and the set of selectable tables are fixed
/// per encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumCount)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

/// Sentinel in a coded-index target list for tag values that select no table.
const NO_TABLE: Option<TableId> = None;

impl CodedIndexType {
    /// The tables selectable by this encoding, in tag order. `None` entries
    /// are reserved tag values that must not appear in valid metadata.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                NO_TABLE,
                NO_TABLE,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                NO_TABLE,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of tag bits stolen from the row index.
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len() as u32;
        if count <= 1 {
            1
        } else {
            (32 - (count - 1).leading_zeros()) as u8
        }
    }
}

/// A decoded coded index: which table it selects, the 0-allowed row index,
/// and the equivalent plain token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The selected table
    pub tag: TableId,
    /// 1-based row within the selected table; 0 means "no target"
    pub row: u32,
    /// The token form of this reference
    pub token: Token,
}

impl CodedIndex {
    /// Read and decode a coded index column at `*offset`.
    ///
    /// # Errors
    /// Returns an error if the read passes the end of `data` or the tag
    /// selects a reserved table slot.
    pub fn read(
        data: &[u8],
        offset: &mut usize,
        sizes: &TableInfoRef,
        kind: CodedIndexType,
    ) -> Result<CodedIndex> {
        let raw = read_le_at_dyn(data, offset, sizes.is_large_coded(kind))?;
        let bits = kind.tag_bits();
        let tag_value = (raw & ((1 << bits) - 1)) as usize;
        let row = raw >> bits;
        let tables = kind.tables();
        let table = tables
            .get(tag_value)
            .copied()
            .flatten()
            .ok_or_else(|| malformed_error!("Invalid coded index tag {} for {:?}", tag_value, kind))?;
        Ok(CodedIndex {
            tag: table,
            row,
            token: Token::from_parts(table as u8, row),
        })
    }
}

/// Row counts and index widths for every table in one image.
///
/// Determines whether heap indexes are 2 or 4 bytes (from the heap-size
/// flags) and whether table/coded indexes are 2 or 4 bytes (from row
/// counts), exactly as required to walk the fixed-width row data.
pub struct TableInfo {
    rows: [u32; 0x2D],
    sorted: u64,
    large_str: bool,
    large_guid: bool,
    large_blob: bool,
}

/// Cheap-copy reference to a [`TableInfo`] structure.
pub type TableInfoRef = Arc<TableInfo>;

impl TableInfo {
    /// Build table info from per-table row counts, the `sorted` bitvector
    /// and the heap-size flags byte of the `#~` header.
    #[must_use]
    pub fn new(rows: [u32; 0x2D], sorted: u64, heap_flags: u8) -> Self {
        TableInfo {
            rows,
            sorted,
            large_str: heap_flags & 0x01 != 0,
            large_guid: heap_flags & 0x02 != 0,
            large_blob: heap_flags & 0x04 != 0,
        }
    }

    /// Row count of `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// Whether the image declares `table` sorted, enabling binary search.
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.sorted & (1u64 << (table as u8)) != 0
    }

    /// True if plain indexes into `table` need 4 bytes.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.row_count(table) > u32::from(u16::MAX)
    }

    /// True if `#Strings` indexes need 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.large_str
    }

    /// True if `#GUID` indexes need 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.large_guid
    }

    /// True if `#Blob` indexes need 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.large_blob
    }

    /// True if coded indexes of `kind` need 4 bytes: some selectable table
    /// has too many rows for the 16 minus tag bits that remain.
    #[must_use]
    pub fn is_large_coded(&self, kind: CodedIndexType) -> bool {
        let limit = 1u32 << (16 - kind.tag_bits());
        kind.tables()
            .iter()
            .flatten()
            .any(|table| self.row_count(*table) >= limit)
    }

    /// Byte width of a `#Strings` index column.
    #[must_use]
    pub fn str_bytes(&self) -> u32 {
        if self.large_str {
            4
        } else {
            2
        }
    }

    /// Byte width of a `#GUID` index column.
    #[must_use]
    pub fn guid_bytes(&self) -> u32 {
        if self.large_guid {
            4
        } else {
            2
        }
    }

    /// Byte width of a `#Blob` index column.
    #[must_use]
    pub fn blob_bytes(&self) -> u32 {
        if self.large_blob {
            4
        } else {
            2
        }
    }

    /// Byte width of a plain index column into `table`.
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u32 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// Byte width of a coded index column of `kind`.
    #[must_use]
    pub fn coded_index_bytes(&self, kind: CodedIndexType) -> u32 {
        if self.is_large_coded(kind) {
            4
        } else {
            2
        }
    }

    #[cfg(test)]
    /// Special constructor for unit tests.
    pub fn new_test(valid_tables: &[(TableId, u32)], large_heaps: bool) -> Self {
        let mut rows = [0u32; 0x2D];
        for (table, count) in valid_tables {
            rows[*table as usize] = *count;
        }
        let flags = if large_heaps { 0x07 } else { 0 };
        TableInfo::new(rows, 0, flags)
    }
}

/// Trait implemented by raw row types so [`MetadataTable`] can size and
/// parse them generically.
///
/// Row identifiers follow the CLI 1-based indexing scheme.
pub trait RowReadable: Sized + Send {
    /// Size in bytes of one row, given the image's index widths.
    fn row_size(sizes: &TableInfoRef) -> u32;

    /// Parse the row at `*offset`, advancing `offset` past it.
    ///
    /// # Errors
    /// Returns an error if the buffer is exhausted or a column is invalid.
    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfoRef) -> Result<Self>;
}

/// Generic typed reader over one table's raw row data.
pub struct MetadataTable<T> {
    data: Arc<[u8]>,
    offset: usize,
    row_count: u32,
    row_size: u32,
    sizes: TableInfoRef,
    _phantom: PhantomData<T>,
}

impl<T: RowReadable> MetadataTable<T> {
    /// Create a table reader over `row_count` rows starting at `offset`
    /// within the image buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the table extent does not
    /// fit in the buffer.
    pub fn new(
        data: Arc<[u8]>,
        offset: usize,
        row_count: u32,
        sizes: TableInfoRef,
    ) -> Result<Self> {
        let row_size = T::row_size(&sizes);
        let total = u64::from(row_count) * u64::from(row_size);
        if (offset as u64).checked_add(total).is_none_or(|end| end > data.len() as u64) {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(MetadataTable {
            data,
            offset,
            row_count,
            row_size,
            sizes,
            _phantom: PhantomData,
        })
    }

    /// Total size of the table data in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.row_count) * u64::from(self.row_size)
    }

    /// Number of rows in this table.
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Parse the row with the 1-based identifier `rid`.
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<T> {
        if rid == 0 || rid > self.row_count {
            return None;
        }
        let mut offset = self.offset + (rid as usize - 1) * self.row_size as usize;
        T::row_read(&self.data, &mut offset, rid, &self.sizes).ok()
    }

    /// Iterate all rows in rid order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (1..=self.row_count).filter_map(move |rid| self.get(rid))
    }
}

/// Size in bytes of one row of `table`, for tables this crate does not
/// parse into typed rows but must still skip while slicing the `#~` stream.
#[must_use]
pub fn generic_row_size(table: TableId, sizes: &TableInfoRef) -> u32 {
    let str_b = sizes.str_bytes();
    let guid_b = sizes.guid_bytes();
    let blob_b = sizes.blob_bytes();
    let idx = |t: TableId| sizes.table_index_bytes(t);
    let coded = |k: CodedIndexType| sizes.coded_index_bytes(k);
    match table {
        TableId::Module => 2 + str_b + 3 * guid_b,
        TableId::TypeRef => coded(CodedIndexType::ResolutionScope) + 2 * str_b,
        TableId::TypeDef => {
            4 + 2 * str_b
                + coded(CodedIndexType::TypeDefOrRef)
                + idx(TableId::Field)
                + idx(TableId::MethodDef)
        }
        TableId::FieldPtr => idx(TableId::Field),
        TableId::Field => 2 + str_b + blob_b,
        TableId::MethodPtr => idx(TableId::MethodDef),
        TableId::MethodDef => 8 + str_b + blob_b + idx(TableId::Param),
        TableId::ParamPtr => idx(TableId::Param),
        TableId::Param => 4 + str_b,
        TableId::InterfaceImpl => idx(TableId::TypeDef) + coded(CodedIndexType::TypeDefOrRef),
        TableId::MemberRef => coded(CodedIndexType::MemberRefParent) + str_b + blob_b,
        TableId::Constant => 2 + coded(CodedIndexType::HasConstant) + blob_b,
        TableId::CustomAttribute => {
            coded(CodedIndexType::HasCustomAttribute)
                + coded(CodedIndexType::CustomAttributeType)
                + blob_b
        }
        TableId::FieldMarshal => coded(CodedIndexType::HasFieldMarshal) + blob_b,
        TableId::DeclSecurity => 2 + coded(CodedIndexType::HasDeclSecurity) + blob_b,
        TableId::ClassLayout => 6 + idx(TableId::TypeDef),
        TableId::FieldLayout => 4 + idx(TableId::Field),
        TableId::StandAloneSig => blob_b,
        TableId::EventMap => idx(TableId::TypeDef) + idx(TableId::Event),
        TableId::EventPtr => idx(TableId::Event),
        TableId::Event => 2 + str_b + coded(CodedIndexType::TypeDefOrRef),
        TableId::PropertyMap => idx(TableId::TypeDef) + idx(TableId::Property),
        TableId::PropertyPtr => idx(TableId::Property),
        TableId::Property => 2 + str_b + blob_b,
        TableId::MethodSemantics => 2 + idx(TableId::MethodDef) + coded(CodedIndexType::HasSemantics),
        TableId::MethodImpl => idx(TableId::TypeDef) + 2 * coded(CodedIndexType::MethodDefOrRef),
        TableId::ModuleRef => str_b,
        TableId::TypeSpec => blob_b,
        TableId::ImplMap => 2 + coded(CodedIndexType::MemberForwarded) + str_b + idx(TableId::ModuleRef),
        TableId::FieldRva => 4 + idx(TableId::Field),
        TableId::Assembly => 16 + blob_b + 2 * str_b,
        TableId::AssemblyProcessor => 4,
        TableId::AssemblyOs => 12,
        TableId::AssemblyRef => 12 + 2 * blob_b + 2 * str_b,
        TableId::AssemblyRefProcessor => 4 + idx(TableId::AssemblyRef),
        TableId::AssemblyRefOs => 12 + idx(TableId::AssemblyRef),
        TableId::File => 4 + str_b + blob_b,
        TableId::ExportedType => 8 + 2 * str_b + coded(CodedIndexType::Implementation),
        TableId::ManifestResource => 8 + str_b + coded(CodedIndexType::Implementation),
        TableId::NestedClass => 2 * idx(TableId::TypeDef),
        TableId::GenericParam => 4 + coded(CodedIndexType::TypeOrMethodDef) + str_b,
        TableId::MethodSpec => coded(CodedIndexType::MethodDefOrRef) + blob_b,
        TableId::GenericParamConstraint => {
            idx(TableId::GenericParam) + coded(CodedIndexType::TypeDefOrRef)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bits_match_target_counts() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
    }

    #[test]
    fn coded_index_width_tracks_row_counts() {
        let small = Arc::new(TableInfo::new_test(&[(TableId::TypeDef, 100)], false));
        assert!(!small.is_large_coded(CodedIndexType::TypeDefOrRef));

        // 2 tag bits leave 14 row bits, so 1 << 14 rows force 4-byte indexes
        let large = Arc::new(TableInfo::new_test(&[(TableId::TypeDef, 1 << 14)], false));
        assert!(large.is_large_coded(CodedIndexType::TypeDefOrRef));
    }

    #[test]
    fn coded_index_decode() {
        let sizes = Arc::new(TableInfo::new_test(&[(TableId::TypeDef, 10)], false));
        // value 0x0009 = row 2, tag 1 (TypeRef)
        let data = [0x09, 0x00];
        let mut offset = 0;
        let index = CodedIndex::read(&data, &mut offset, &sizes, CodedIndexType::TypeDefOrRef)
            .unwrap();
        assert_eq!(index.tag, TableId::TypeRef);
        assert_eq!(index.row, 2);
        assert_eq!(index.token, Token::new(0x0100_0002));
    }

    #[test]
    fn reserved_coded_tag_is_malformed() {
        let sizes = Arc::new(TableInfo::new_test(&[], false));
        // CustomAttributeType tag 0 is reserved
        let data = [0x00, 0x00];
        let mut offset = 0;
        assert!(CodedIndex::read(
            &data,
            &mut offset,
            &sizes,
            CodedIndexType::CustomAttributeType
        )
        .is_err());
    }

    #[test]
    fn table_id_round_trip() {
        assert_eq!(TableId::from_tag(0x02), Some(TableId::TypeDef));
        assert_eq!(TableId::from_tag(0x29), Some(TableId::NestedClass));
        assert_eq!(TableId::from_tag(0x1E), None);
    }
}
