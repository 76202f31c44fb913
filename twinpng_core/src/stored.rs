use crate::error::{Error, Result};

/// Header bytes in front of every stored block:
///   flag:u8 + len:u16 LE + nlen:u16 LE = 5
pub const STORED_HEADER_SIZE: usize = 5;

/// Largest payload a single stored block can carry.
pub const MAX_STORED_LEN: usize = u16::MAX as usize;

/// Encoding of a non-final stored block with no payload. Inserted as a flush
/// point and as 5-byte padding.
pub const EMPTY_STORED: [u8; STORED_HEADER_SIZE] = [0x00, 0x00, 0x00, 0xff, 0xff];

/// A verbatim deflate block in its byte-aligned form.
///
/// The first byte carries only BFINAL (BTYPE = 00 and the alignment padding are
/// all zero), which is exactly what a deflate stream looks like at a flush
/// boundary. Every caller inserts stored blocks at such a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBlock<'a> {
    pub is_final: bool,
    pub payload: &'a [u8],
}

impl<'a> StoredBlock<'a> {
    pub fn new(payload: &'a [u8], is_final: bool) -> Self {
        Self { is_final, payload }
    }

    /// An empty block, the cheapest possible unit of padding.
    pub fn empty(is_final: bool) -> Self {
        Self::new(&[], is_final)
    }

    /// Encoded size: header plus payload.
    pub fn encoded_len(&self) -> usize {
        STORED_HEADER_SIZE + self.payload.len()
    }

    /// Append the encoded block to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = u16::try_from(self.payload.len())
            .map_err(|_| Error::StoredTooLong(self.payload.len()))?;
        out.extend_from_slice(&header(len, self.is_final));
        out.extend_from_slice(self.payload);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decode one stored block from the front of `buf`.
    ///
    /// Returns the block (borrowing its payload from `buf`) and the number of
    /// bytes it occupied.
    pub fn decode(buf: &'a [u8]) -> Result<(Self, usize)> {
        Self::decode_at(buf, 0)
    }

    /// Decode the stored block starting at `buf[offset]`. Offsets reported in
    /// errors are positions in `buf`.
    pub fn decode_at(buf: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let rest = buf.get(offset..).unwrap_or_default();
        if rest.len() < STORED_HEADER_SIZE {
            return Err(Error::StoredTruncated {
                offset,
                needed: STORED_HEADER_SIZE,
                available: rest.len(),
            });
        }
        let is_final = match rest[0] {
            0 => false,
            1 => true,
            flag => return Err(Error::BadStoredFlag { offset, flag }),
        };
        let len = u16::from_le_bytes([rest[1], rest[2]]);
        let nlen = u16::from_le_bytes([rest[3], rest[4]]);
        if len != !nlen {
            return Err(Error::StoredLengthMismatch { offset, len, nlen });
        }
        let end = STORED_HEADER_SIZE + len as usize;
        if rest.len() < end {
            return Err(Error::StoredTruncated {
                offset,
                needed: end,
                available: rest.len(),
            });
        }
        Ok((
            Self {
                is_final,
                payload: &rest[STORED_HEADER_SIZE..end],
            },
            end,
        ))
    }
}

/// The five header bytes of a stored block announcing `len` payload bytes.
///
/// Emitting a header without its payload is how a stream is deliberately
/// desynchronized: whatever bytes follow get swallowed as the payload.
pub fn header(len: u16, is_final: bool) -> [u8; STORED_HEADER_SIZE] {
    let [l0, l1] = len.to_le_bytes();
    let [n0, n1] = (!len).to_le_bytes();
    [is_final as u8, l0, l1, n0, n1]
}
