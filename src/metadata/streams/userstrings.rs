use std::sync::Arc;

use widestring::U16String;

use crate::Result;

/// The `#US` heap: length-prefixed UTF-16 user strings referenced by the
/// `ldstr` instruction family.
///
/// Entries use the same compressed length prefix as `#Blob`; the payload
/// is UTF-16LE code units followed by a one-byte "needs special handling"
/// terminal flag.
pub struct UserStrings {
    data: Arc<[u8]>,
    offset: usize,
    size: usize,
}

impl UserStrings {
    /// Create a view over the `#US` stream at `offset..offset + size`
    /// within the image buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream extent does not
    /// fit in the buffer.
    pub fn new(data: Arc<[u8]>, offset: usize, size: usize) -> Result<Self> {
        if offset.checked_add(size).is_none_or(|end| end > data.len()) {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(UserStrings { data, offset, size })
    }

    /// Get the user string at heap offset `index`.
    ///
    /// # Errors
    /// Returns an error if the offset is outside the heap, the payload is
    /// truncated, or its length is not an even number of UTF-16 bytes.
    pub fn get(&self, index: usize) -> Result<U16String> {
        if index >= self.size {
            return Err(crate::Error::OutOfBounds);
        }
        let heap = &self.data[self.offset..self.offset + self.size];
        let tail = &heap[index..];
        let first = tail[0];
        let (length, header) = if first & 0x80 == 0 {
            (usize::from(first), 1)
        } else if first & 0xC0 == 0x80 {
            if tail.len() < 2 {
                return Err(crate::Error::OutOfBounds);
            }
            ((usize::from(first & 0x3F) << 8) | usize::from(tail[1]), 2)
        } else {
            if tail.len() < 4 {
                return Err(crate::Error::OutOfBounds);
            }
            (
                (usize::from(first & 0x1F) << 24)
                    | (usize::from(tail[1]) << 16)
                    | (usize::from(tail[2]) << 8)
                    | usize::from(tail[3]),
                4,
            )
        };
        if header + length > tail.len() {
            return Err(malformed_error!(
                "User string at heap offset {} exceeds stream bounds",
                index
            ));
        }
        // The payload carries 2-byte code units plus the terminal flag byte.
        let chars = length.saturating_sub(1);
        if chars % 2 != 0 {
            return Err(malformed_error!(
                "User string at heap offset {} has odd UTF-16 payload",
                index
            ));
        }
        let units: Vec<u16> = tail[header..header + chars]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(U16String::from_vec(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_utf16_entry() {
        // "Hi" = 0x48 0x00 0x69 0x00, + flag byte, length prefix 5
        let bytes = [0x00u8, 0x05, 0x48, 0x00, 0x69, 0x00, 0x00];
        let us = UserStrings::new(Arc::from(bytes.as_slice()), 0, bytes.len()).unwrap();
        assert_eq!(us.get(1).unwrap().to_string_lossy(), "Hi");
    }

    #[test]
    fn truncated_entry_is_malformed() {
        let bytes = [0x07u8, 0x48, 0x00];
        let us = UserStrings::new(Arc::from(bytes.as_slice()), 0, bytes.len()).unwrap();
        assert!(us.get(0).is_err());
    }
}
