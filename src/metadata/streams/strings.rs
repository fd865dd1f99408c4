use std::sync::Arc;

use crate::Result;

/// The `#Strings` heap: null-terminated UTF-8 identifier strings.
///
/// Rows in the metadata tables reference this heap by byte offset. Offset 0
/// is always the empty string. Strings may overlap (a suffix of one entry
/// is a valid entry of its own), so the heap is addressed, not enumerated.
pub struct Strings {
    data: Arc<[u8]>,
    offset: usize,
    size: usize,
}

impl Strings {
    /// Create a view over the `#Strings` stream at `offset..offset + size`
    /// within the image buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream extent does not
    /// fit in the buffer, or [`crate::Error::Empty`] for a zero-length stream.
    pub fn new(data: Arc<[u8]>, offset: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(crate::Error::Empty);
        }
        if offset.checked_add(size).is_none_or(|end| end > data.len()) {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(Strings { data, offset, size })
    }

    /// Get the string starting at heap offset `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is outside the heap or the string is not
    /// terminated or not valid UTF-8.
    pub fn get(&self, index: usize) -> Result<&str> {
        if index >= self.size {
            return Err(crate::Error::OutOfBounds);
        }
        let heap = &self.data[self.offset..self.offset + self.size];
        let tail = &heap[index..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed_error!("Unterminated string at heap offset {}", index))?;
        std::str::from_utf8(&tail[..end])
            .map_err(|_| malformed_error!("Invalid UTF-8 string at heap offset {}", index))
    }

    /// Like [`Strings::get`], but maps the empty string to `None`.
    ///
    /// Metadata rows use heap offset 0 (or an offset of an empty string)
    /// to mean "no namespace".
    ///
    /// # Errors
    /// Same conditions as [`Strings::get`].
    pub fn get_optional(&self, index: usize) -> Result<Option<&str>> {
        let value = self.get(index)?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }
}
