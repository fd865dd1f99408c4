use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::file::io::read_le_at;
use crate::metadata::tables::{generic_row_size, TableId, TableInfo, TableInfoRef};
use crate::Result;

/// Parsed header of the `#~` (compressed tables) stream.
///
/// The header carries the heap-size flags, the `valid`/`sorted` bitvectors
/// and one row count per present table, followed immediately by the packed
/// row data of every present table in tag order. This type computes where
/// each table's rows begin so the loader can slice them out.
pub struct TablesHeader {
    info: TableInfoRef,
    /// (byte offset within the image buffer, row count) per present table
    offsets: Vec<(TableId, usize, u32)>,
}

impl TablesHeader {
    /// Parse the `#~` stream starting at `offset` within the image buffer.
    ///
    /// Unknown table bits above `GenericParamConstraint` are rejected as
    /// unsupported rather than guessed at, since their unknown row widths
    /// would corrupt every subsequent table slice.
    ///
    /// # Errors
    /// Returns an error for truncated headers, unsupported table bits, or
    /// row data extending past the end of the buffer.
    pub fn new(data: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = offset;
        let _reserved = read_le_at::<u32>(data, &mut cursor)?;
        let _major = read_le_at::<u8>(data, &mut cursor)?;
        let _minor = read_le_at::<u8>(data, &mut cursor)?;
        let heap_flags = read_le_at::<u8>(data, &mut cursor)?;
        let _rid_bits = read_le_at::<u8>(data, &mut cursor)?;
        let valid = read_le_at::<u64>(data, &mut cursor)?;
        let sorted = read_le_at::<u64>(data, &mut cursor)?;

        // Reject table bits this crate has no row widths for: anything
        // past GenericParamConstraint, and the two reserved tags
        if valid & !((1u64 << 0x2D) - 1) != 0 || valid & ((1 << 0x1E) | (1 << 0x1F)) != 0 {
            return Err(crate::Error::NotSupported);
        }

        let mut rows = [0u32; 0x2D];
        for table in TableId::iter() {
            if valid & (1u64 << (table as u8)) != 0 {
                rows[table as usize] = read_le_at::<u32>(data, &mut cursor)?;
            }
        }

        let info: TableInfoRef = Arc::new(TableInfo::new(rows, sorted, heap_flags));

        let mut offsets = Vec::new();
        for table in TableId::iter() {
            let count = info.row_count(table);
            if valid & (1u64 << (table as u8)) == 0 || count == 0 {
                continue;
            }
            offsets.push((table, cursor, count));
            let bytes = u64::from(generic_row_size(table, &info)) * u64::from(count);
            cursor = usize::try_from(cursor as u64 + bytes)
                .map_err(|_| crate::Error::OutOfBounds)?;
            if cursor > data.len() {
                return Err(crate::Error::OutOfBounds);
            }
        }

        Ok(TablesHeader { info, offsets })
    }

    /// Index width bookkeeping for this image.
    #[must_use]
    pub fn info(&self) -> TableInfoRef {
        self.info.clone()
    }

    /// Locate `table` within the image buffer, returning `(offset,
    /// row_count)`, or `None` if the image does not carry it.
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<(usize, u32)> {
        self.offsets
            .iter()
            .find(|(id, _, _)| *id == table)
            .map(|(_, offset, count)| (*offset, *count))
    }

    /// Row count of `table` (0 when absent).
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.info.row_count(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal `#~` stream with a Module table (1 row) and a
    /// TypeDef table (2 rows), small heaps.
    fn build_stream() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved
        data.push(2); // major
        data.push(0); // minor
        data.push(0); // heap flags (all small)
        data.push(1); // rid bits
        let valid: u64 = (1 << 0x00) | (1 << 0x02);
        data.extend_from_slice(&valid.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes()); // sorted
        data.extend_from_slice(&1u32.to_le_bytes()); // Module rows
        data.extend_from_slice(&2u32.to_le_bytes()); // TypeDef rows
        // Module row: 2 + 2 + 3*2 = 10 bytes
        data.extend_from_slice(&[0u8; 10]);
        // TypeDef rows: 4 + 2 + 2 + 2 + 2 + 2 = 14 bytes each
        data.extend_from_slice(&[0u8; 28]);
        data
    }

    #[test]
    fn slices_tables_in_tag_order() {
        let data = build_stream();
        let header = TablesHeader::new(&data, 0).unwrap();
        assert_eq!(header.row_count(TableId::Module), 1);
        assert_eq!(header.row_count(TableId::TypeDef), 2);
        assert_eq!(header.row_count(TableId::MethodDef), 0);

        let (module_offset, _) = header.table(TableId::Module).unwrap();
        let (typedef_offset, count) = header.table(TableId::TypeDef).unwrap();
        assert_eq!(module_offset + 10, typedef_offset);
        assert_eq!(count, 2);
        assert!(header.table(TableId::Field).is_none());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut data = build_stream();
        data.truncate(data.len() - 20);
        assert!(TablesHeader::new(&data, 0).is_err());
    }

    #[test]
    fn unknown_table_bits_are_unsupported() {
        let mut data = build_stream();
        // Set bit 0x2D (beyond GenericParamConstraint)
        data[8] = 0;
        let valid: u64 = 1 << 0x2D;
        data[8..16].copy_from_slice(&valid.to_le_bytes());
        assert!(matches!(
            TablesHeader::new(&data, 0),
            Err(crate::Error::NotSupported)
        ));
    }
}
