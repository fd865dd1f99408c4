//! The physical metadata root ("BSJB" header) and its stream directory.

use crate::file::io::read_le_at;
use crate::Result;

/// Magic signature of a CLI metadata root.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// One entry of the stream directory that follows the metadata root header.
#[derive(Clone, Debug)]
pub struct StreamHeader {
    /// Byte offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name (`#~`, `#Strings`, `#US`, `#GUID`, `#Blob`)
    pub name: String,
}

/// Parsed metadata root: version string plus the stream directory.
#[derive(Debug)]
pub struct MetadataRoot {
    /// Runtime version string from the header
    pub version: String,
    /// All streams declared by the directory
    pub streams: Vec<StreamHeader>,
    /// Offset of the metadata root within the image buffer
    pub base_offset: usize,
}

impl MetadataRoot {
    /// Parse a metadata root starting at `offset` within `data`.
    ///
    /// # Errors
    /// Returns an error if the signature is wrong or the header is
    /// truncated.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = offset;
        let signature = read_le_at::<u32>(data, &mut cursor)?;
        if signature != METADATA_SIGNATURE {
            return Err(crate::Error::NotSupported);
        }
        let _major = read_le_at::<u16>(data, &mut cursor)?;
        let _minor = read_le_at::<u16>(data, &mut cursor)?;
        let _reserved = read_le_at::<u32>(data, &mut cursor)?;
        let version_len = read_le_at::<u32>(data, &mut cursor)? as usize;
        if version_len > 255 || cursor + version_len > data.len() {
            return Err(malformed_error!("Invalid metadata version length {}", version_len));
        }
        let version_bytes = &data[cursor..cursor + version_len];
        let version = version_bytes
            .split(|&b| b == 0)
            .next()
            .and_then(|s| std::str::from_utf8(s).ok())
            .ok_or_else(|| malformed_error!("Invalid metadata version string"))?
            .to_string();
        cursor += version_len;

        let _flags = read_le_at::<u16>(data, &mut cursor)?;
        let stream_count = read_le_at::<u16>(data, &mut cursor)?;
        let mut streams = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let stream_offset = read_le_at::<u32>(data, &mut cursor)?;
            let stream_size = read_le_at::<u32>(data, &mut cursor)?;
            let name_start = cursor;
            let name_end = data[cursor..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| cursor + p)
                .ok_or(crate::Error::OutOfBounds)?;
            if name_end - name_start > 31 {
                return Err(malformed_error!("Stream name too long"));
            }
            let name = std::str::from_utf8(&data[name_start..name_end])
                .map_err(|_| malformed_error!("Invalid stream name"))?
                .to_string();
            // Names are nul-padded to the next 4-byte boundary
            cursor = name_end + 1;
            cursor = (cursor - offset + 3) / 4 * 4 + offset;
            streams.push(StreamHeader {
                offset: stream_offset,
                size: stream_size,
                name,
            });
        }

        Ok(MetadataRoot {
            version,
            streams,
            base_offset: offset,
        })
    }

    /// Find a stream by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.streams.iter().find(|header| header.name == name)
    }
}

#[cfg(test)]
pub(crate) fn build_root(streams: &[(&str, &[u8])]) -> Vec<u8> {
    // Test helper: assemble a metadata root from named stream payloads.
    let version = b"v4.0.30319\0\0";
    let mut header = Vec::new();
    header.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&(version.len() as u32).to_le_bytes());
    header.extend_from_slice(version);
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let mut dir_len = 0;
    for (name, _) in streams {
        dir_len += 8 + (name.len() + 1 + 3) / 4 * 4;
    }
    let mut payload_offset = header.len() + dir_len;
    let mut directory = Vec::new();
    let mut payloads = Vec::new();
    for (name, bytes) in streams {
        directory.extend_from_slice(&(payload_offset as u32).to_le_bytes());
        directory.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.push(0);
        while name_bytes.len() % 4 != 0 {
            name_bytes.push(0);
        }
        directory.extend_from_slice(&name_bytes);
        payloads.extend_from_slice(bytes);
        payload_offset += bytes.len();
    }
    header.extend_from_slice(&directory);
    header.extend_from_slice(&payloads);
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let data = build_root(&[("#~", &[1, 2, 3, 4]), ("#Strings", b"\0abc\0")]);
        let root = MetadataRoot::parse(&data, 0).unwrap();
        assert_eq!(root.version, "v4.0.30319");
        assert_eq!(root.streams.len(), 2);
        let tables = root.stream("#~").unwrap();
        assert_eq!(tables.size, 4);
        let strings = root.stream("#Strings").unwrap();
        assert_eq!(strings.size, 5);
        assert_eq!(
            &data[tables.offset as usize..tables.offset as usize + 4],
            &[1, 2, 3, 4]
        );
    }

    #[test]
    fn wrong_signature_is_unsupported() {
        let mut data = build_root(&[]);
        data[0] = 0;
        assert!(matches!(
            MetadataRoot::parse(&data, 0),
            Err(crate::Error::NotSupported)
        ));
    }
}
