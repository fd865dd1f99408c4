use std::sync::Arc;

use crate::Result;

/// The `#GUID` heap: a packed array of 16-byte GUIDs.
///
/// Unlike the other heaps this one is indexed 1-based by *entry*, not by
/// byte offset; index 0 means "no GUID".
pub struct Guid {
    data: Arc<[u8]>,
    offset: usize,
    size: usize,
}

impl Guid {
    /// Create a view over the `#GUID` stream at `offset..offset + size`
    /// within the image buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream extent does not
    /// fit in the buffer.
    pub fn new(data: Arc<[u8]>, offset: usize, size: usize) -> Result<Self> {
        if offset.checked_add(size).is_none_or(|end| end > data.len()) {
            return Err(crate::Error::OutOfBounds);
        }
        Ok(Guid { data, offset, size })
    }

    /// Get the GUID at 1-based `index`.
    ///
    /// # Errors
    /// Returns an error for index 0 or an index past the end of the heap.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Err(malformed_error!("GUID heap index 0 is reserved"));
        }
        let start = (index - 1)
            .checked_mul(16)
            .ok_or(crate::Error::OutOfBounds)?;
        if start + 16 > self.size {
            return Err(crate::Error::OutOfBounds);
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.data[self.offset + start..self.offset + start + 16]);
        Ok(uguid::Guid::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_based_indexing() {
        let mut bytes = vec![0u8; 32];
        bytes[0] = 0x11;
        bytes[16] = 0x22;
        let guids = Guid::new(Arc::from(bytes.as_slice()), 0, 32).unwrap();
        assert_eq!(guids.get(1).unwrap().to_bytes()[0], 0x11);
        assert_eq!(guids.get(2).unwrap().to_bytes()[0], 0x22);
        assert!(guids.get(0).is_err());
        assert!(guids.get(3).is_err());
    }
}
