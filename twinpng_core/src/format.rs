use std::fmt;

use crate::error::{Error, Result};

/// PNG file signature.
pub const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// zlib stream header written before the first IDAT payload:
/// CM=8 (deflate), CINFO=7 (32 KB window), FLEVEL=3 (maximum compression).
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0xda];

/// Length of the Adler-32 trailer that closes the zlib stream.
pub const ZLIB_TRAILER_SIZE: usize = 4;

/// Bytes of framing around every chunk body:
///   length:u32 + type[4] + crc:u32 = 12
pub const CHUNK_OVERHEAD: usize = 12;

// ── IHDR field values ──────────────────────────────────────────────────────

pub const BIT_DEPTH: u8 = 8;
pub const COLOR_TYPE_RGB: u8 = 2;
pub const COMPRESSION_DEFLATE: u8 = 0;
pub const FILTER_METHOD_ADAPTIVE: u8 = 0;
pub const INTERLACE_NONE: u8 = 0;

/// Size of the IHDR body in bytes.
pub const IMAGE_HEADER_SIZE: usize = 13;

/// Bytes per RGB pixel at bit depth 8.
pub const BYTES_PER_PIXEL: usize = 3;

// ── iDOT ───────────────────────────────────────────────────────────────────

/// Number of independently decodable parts the restart descriptor declares.
pub const RESTART_DIVISOR: u32 = 2;

/// Size of the iDOT body: seven big-endian u32 fields.
pub const RESTART_BODY_SIZE: usize = 28;

/// Framed size of the iDOT chunk. Decoders measure the restart offset from
/// the first byte of this chunk, so the value doubles as the descriptor size
/// field: 24 + 8 × divisor = 12 + 28 = 40.
pub const RESTART_CHUNK_SIZE: u32 = (CHUNK_OVERHEAD + RESTART_BODY_SIZE) as u32;

// ── Chunk types ────────────────────────────────────────────────────────────

/// Four-byte chunk type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

impl ChunkType {
    pub const IHDR: Self = Self(*b"IHDR");
    pub const IDOT: Self = Self(*b"iDOT");
    pub const IDAT: Self = Self(*b"IDAT");
    pub const IEND: Self = Self(*b"IEND");
}

impl fmt::Debug for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// IHDR contents. Everything except the dimensions is fixed: 8-bit truecolour,
/// deflate, adaptive filtering, no interlace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
}

impl ImageHeader {
    /// Serialize to exactly `IMAGE_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; IMAGE_HEADER_SIZE] {
        let mut buf = [0u8; IMAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.width.to_be_bytes());
        buf[4..8].copy_from_slice(&self.height.to_be_bytes());
        buf[8] = BIT_DEPTH;
        buf[9] = COLOR_TYPE_RGB;
        buf[10] = COMPRESSION_DEFLATE;
        buf[11] = FILTER_METHOD_ADAPTIVE;
        buf[12] = INTERLACE_NONE;
        buf
    }

    /// Parse an IHDR body, rejecting anything other than the one layout this
    /// crate writes.
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        if body.len() != IMAGE_HEADER_SIZE {
            return Err(Error::Format(format!(
                "IHDR body is {} bytes, expected {}",
                body.len(),
                IMAGE_HEADER_SIZE
            )));
        }
        let fixed = [
            BIT_DEPTH,
            COLOR_TYPE_RGB,
            COMPRESSION_DEFLATE,
            FILTER_METHOD_ADAPTIVE,
            INTERLACE_NONE,
        ];
        if body[8..] != fixed {
            return Err(Error::Format(format!(
                "unsupported IHDR fields {:02x?} (need 8-bit RGB, no interlace)",
                &body[8..]
            )));
        }
        let (width, height) = (be_u32(body, 0), be_u32(body, 4));
        if width == 0 || height == 0 {
            return Err(Error::Format(format!("IHDR declares an empty {}x{} image", width, height)));
        }
        Ok(Self { width, height })
    }

    /// Length of one filtered scanline: filter byte plus RGB samples.
    pub fn row_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL + 1
    }
}

// ── Restart descriptor ─────────────────────────────────────────────────────

/// Body of the proprietary iDOT chunk.
///
/// A decoder that honours it decodes `first_height` rows from the IDAT data
/// before the restart point, then starts a fresh raw-deflate stream at the
/// IDAT chunk found `restart_offset` bytes after the start of the iDOT chunk
/// and decodes `second_height` more rows from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartDescriptor {
    pub divisor: u32,
    pub reserved: u32,
    /// Height of the part decoded before the restart point.
    pub divided_height: u32,
    pub descriptor_size: u32,
    pub first_height: u32,
    pub second_height: u32,
    pub restart_offset: u32,
}

impl RestartDescriptor {
    /// Descriptor for a two-part split with the fixed divisor and size fields.
    pub fn new(first_height: u32, second_height: u32, restart_offset: u32) -> Self {
        Self {
            divisor: RESTART_DIVISOR,
            reserved: 0,
            divided_height: first_height,
            descriptor_size: RESTART_CHUNK_SIZE,
            first_height,
            second_height,
            restart_offset,
        }
    }

    /// Serialize to exactly `RESTART_BODY_SIZE` big-endian bytes.
    pub fn to_bytes(&self) -> [u8; RESTART_BODY_SIZE] {
        let fields = [
            self.divisor,
            self.reserved,
            self.divided_height,
            self.descriptor_size,
            self.first_height,
            self.second_height,
            self.restart_offset,
        ];
        let mut buf = [0u8; RESTART_BODY_SIZE];
        for (slot, field) in buf.chunks_exact_mut(4).zip(fields) {
            slot.copy_from_slice(&field.to_be_bytes());
        }
        buf
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        if body.len() != RESTART_BODY_SIZE {
            return Err(Error::Format(format!(
                "iDOT body is {} bytes, expected {}",
                body.len(),
                RESTART_BODY_SIZE
            )));
        }
        let descriptor = Self {
            divisor: be_u32(body, 0),
            reserved: be_u32(body, 4),
            divided_height: be_u32(body, 8),
            descriptor_size: be_u32(body, 12),
            first_height: be_u32(body, 16),
            second_height: be_u32(body, 20),
            restart_offset: be_u32(body, 24),
        };
        if descriptor.divisor != RESTART_DIVISOR {
            return Err(Error::Format(format!(
                "iDOT divisor {} unsupported (only {} parts)",
                descriptor.divisor, RESTART_DIVISOR
            )));
        }
        Ok(descriptor)
    }

    /// Total rows the two parts declare.
    pub fn total_height(&self) -> u64 {
        self.first_height as u64 + self.second_height as u64
    }
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_header_layout() {
        let header = ImageHeader {
            width: 0x0102,
            height: 0x0304,
        };
        assert_eq!(
            header.to_bytes(),
            [0, 0, 1, 2, 0, 0, 3, 4, 8, 2, 0, 0, 0]
        );
        assert_eq!(header.row_len(), 0x0102 * 3 + 1);
    }

    #[test]
    fn image_header_rejects_palette() {
        let mut body = ImageHeader { width: 4, height: 4 }.to_bytes();
        body[9] = 3;
        assert!(matches!(
            ImageHeader::from_bytes(&body),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn image_header_rejects_zero_dimensions() {
        for (width, height) in [(0, 5), (5, 0)] {
            let body = ImageHeader { width, height }.to_bytes();
            assert!(matches!(
                ImageHeader::from_bytes(&body),
                Err(Error::Format(_))
            ));
        }
        let body = ImageHeader { width: 5, height: 5 }.to_bytes();
        assert_eq!(ImageHeader::from_bytes(&body).unwrap().width, 5);
    }

    #[test]
    fn restart_descriptor_field_order() {
        let descriptor = RestartDescriptor::new(1, 9, 0x1234);
        let bytes = descriptor.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 1]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 40]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 1]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 9]);
        assert_eq!(&bytes[24..28], &[0, 0, 0x12, 0x34]);
        assert_eq!(RestartDescriptor::from_bytes(&bytes).unwrap(), descriptor);
        assert_eq!(descriptor.total_height(), 10);
    }

    #[test]
    fn restart_descriptor_rejects_other_divisors() {
        let mut bytes = RestartDescriptor::new(1, 1, 0).to_bytes();
        bytes[3] = 4;
        assert!(RestartDescriptor::from_bytes(&bytes).is_err());
    }
}
