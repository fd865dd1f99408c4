//! Little-endian primitive readers.
//!
//! All metadata structures are stored little-endian. Index fields into
//! heaps and tables are either 2 or 4 bytes wide depending on the size of
//! the target, which [`read_le_at_dyn`] handles transparently.

use crate::Result;

/// Types that can be read from a little-endian byte buffer.
pub trait LeRead: Sized {
    /// Width of this type in bytes.
    const SIZE: usize;

    /// Decode `Self` from the start of `data`. The caller guarantees that
    /// at least [`Self::SIZE`](LeRead::SIZE) bytes are available.
    fn from_le_slice(data: &[u8]) -> Self;
}

macro_rules! impl_le_read {
    ($($t:ty),*) => {
        $(impl LeRead for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn from_le_slice(data: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(&data[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(bytes)
            }
        })*
    };
}

impl_le_read!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Read a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the type.
pub fn read_le<T: LeRead>(data: &[u8]) -> Result<T> {
    if data.len() < T::SIZE {
        return Err(crate::Error::OutOfBounds);
    }
    Ok(T::from_le_slice(data))
}

/// Read a `T` at `*offset`, advancing `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at<T: LeRead>(data: &[u8], offset: &mut usize) -> Result<T> {
    let end = offset
        .checked_add(T::SIZE)
        .ok_or(crate::Error::OutOfBounds)?;
    if end > data.len() {
        return Err(crate::Error::OutOfBounds);
    }
    let value = T::from_le_slice(&data[*offset..]);
    *offset = end;
    Ok(value)
}

/// Read an index field that is 4 bytes when `is_large` and 2 bytes otherwise,
/// widening to `u32` either way.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fixed_widths() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_le::<u8>(&data).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&data).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&data).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&data).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i32>(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(), -1);
    }

    #[test]
    fn read_at_advances_offset() {
        let data = [0x10, 0x20, 0x30, 0x40];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x2010);
        assert_eq!(offset, 2);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x4030);
        assert_eq!(offset, 4);
        assert!(read_le_at::<u16>(&data, &mut offset).is_err());
    }

    #[test]
    fn read_dyn_widths() {
        let data = [0xAA, 0xBB, 0xCC, 0xDD];
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&data, &mut offset, false).unwrap(), 0xBBAA);
        offset = 0;
        assert_eq!(
            read_le_at_dyn(&data, &mut offset, true).unwrap(),
            0xDDCC_BBAA
        );
    }

    #[test]
    fn short_input_is_out_of_bounds() {
        assert!(matches!(
            read_le::<u32>(&[0x00]),
            Err(crate::Error::OutOfBounds)
        ));
    }
}
