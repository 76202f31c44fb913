use std::fs;
use std::path::Path;

use crate::checksum::{adler32, chunk_crc};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::filter::validate;
use crate::format::{
    ChunkType, ImageHeader, RestartDescriptor, CHUNK_OVERHEAD, PNG_MAGIC, ZLIB_TRAILER_SIZE,
};
use crate::stored::StoredBlock;

/// Decode `prefix ++ payload` as a single raw deflate stream, the way any
/// standard PNG decoder does.
///
/// The stream must end in a final block exactly at the end of the input.
pub fn decode_standard(codec: &dyn Codec, prefix: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let mut stream = Vec::with_capacity(prefix.len() + payload.len());
    stream.extend_from_slice(prefix);
    stream.extend_from_slice(payload);
    let inflated = codec.inflate(&stream)?;
    if !inflated.finished || inflated.consumed != stream.len() {
        return Err(Error::RoundTripMismatch {
            stage: "standard interpretation",
            detail: format!(
                "consumed {} of {} bytes, final block reached: {}",
                inflated.consumed,
                stream.len(),
                inflated.finished
            ),
        });
    }
    Ok(inflated.data)
}

/// Decode the two parts an iDOT-aware decoder sees: whatever `prefix` yields
/// on its own, and `payload` decoded from a fresh state.
///
/// Only the second part has to reach a final block. Bytes after it are
/// ignored, as the zlib trailer would be.
pub fn decode_restart(
    codec: &dyn Codec,
    prefix: &[u8],
    payload: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let first = codec.inflate(prefix)?;
    let second = codec.inflate(payload)?;
    if !second.finished {
        return Err(Error::RoundTripMismatch {
            stage: "restart interpretation",
            detail: format!(
                "no final block after {} of {} bytes",
                second.consumed,
                payload.len()
            ),
        });
    }
    Ok((first.data, second.data))
}

// ── Chunks ─────────────────────────────────────────────────────────────────

/// One CRC-checked chunk.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'b> {
    /// File offset of the chunk's length field.
    pub offset: usize,
    pub kind: ChunkType,
    pub body: &'b [u8],
}

/// Iterates the chunks after the PNG magic, verifying each CRC.
pub struct ChunkIter<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> ChunkIter<'b> {
    /// `bytes` is the whole file; iteration starts after the magic.
    pub fn new(bytes: &'b [u8]) -> Result<Self> {
        if !bytes.starts_with(PNG_MAGIC) {
            return Err(Error::Format("missing PNG signature".into()));
        }
        Ok(Self {
            bytes,
            pos: PNG_MAGIC.len(),
        })
    }

    fn read_chunk(&self, offset: usize) -> Result<(Chunk<'b>, usize)> {
        let rest = &self.bytes[offset..];
        if rest.len() < CHUNK_OVERHEAD {
            return Err(Error::Format(format!(
                "truncated chunk header at offset {}",
                offset
            )));
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let kind = ChunkType([rest[4], rest[5], rest[6], rest[7]]);
        let total = CHUNK_OVERHEAD
            .checked_add(len)
            .filter(|&total| total <= rest.len())
            .ok_or_else(|| {
                Error::Format(format!(
                    "{} chunk at offset {} declares {} bytes, {} remain",
                    kind,
                    offset,
                    len,
                    rest.len() - CHUNK_OVERHEAD
                ))
            })?;
        let body = &rest[8..8 + len];
        let crc_at = 8 + len;
        let declared = u32::from_be_bytes([
            rest[crc_at],
            rest[crc_at + 1],
            rest[crc_at + 2],
            rest[crc_at + 3],
        ]);
        let computed = chunk_crc(&kind.0, body);
        if declared != computed {
            return Err(Error::ChunkCrc {
                kind: kind.to_string(),
                offset,
                declared,
                computed,
            });
        }
        Ok((Chunk { offset, kind, body }, total))
    }
}

impl<'b> Iterator for ChunkIter<'b> {
    type Item = Result<Chunk<'b>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        match self.read_chunk(self.pos) {
            Ok((chunk, used)) => {
                self.pos += used;
                Some(Ok(chunk))
            }
            Err(e) => {
                // A broken chunk ends iteration.
                self.pos = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}

// ── Container ──────────────────────────────────────────────────────────────

/// The parts of a PNG file this crate cares about.
#[derive(Debug, Clone)]
pub struct Container<'b> {
    pub header: ImageHeader,
    /// The iDOT descriptor and the file offset of its chunk.
    pub restart: Option<(RestartDescriptor, usize)>,
    /// IDAT chunks in file order.
    pub data_chunks: Vec<Chunk<'b>>,
}

/// Both readings of a file, decoded and checked.
#[derive(Debug, Clone)]
pub struct Interpretations {
    /// Filtered rows a standard decoder produces.
    pub standard: Vec<u8>,
    /// Filtered rows an iDOT-aware decoder produces before the restart point.
    pub restart_first: Vec<u8>,
    /// Filtered rows an iDOT-aware decoder produces from the restart point.
    pub restart_second: Vec<u8>,
    /// Index into the concatenated IDAT data where the restart begins.
    pub restart_split: usize,
}

impl<'b> Container<'b> {
    pub fn parse(bytes: &'b [u8]) -> Result<Self> {
        let mut header = None;
        let mut restart = None;
        let mut data_chunks = Vec::new();
        let mut ended = false;

        for chunk in ChunkIter::new(bytes)? {
            let chunk = chunk?;
            match chunk.kind {
                ChunkType::IHDR => header = Some(ImageHeader::from_bytes(chunk.body)?),
                ChunkType::IDOT => {
                    restart = Some((RestartDescriptor::from_bytes(chunk.body)?, chunk.offset))
                }
                ChunkType::IDAT => data_chunks.push(chunk),
                ChunkType::IEND => {
                    ended = true;
                    break;
                }
                _ => {}
            }
        }

        let header = header.ok_or_else(|| Error::Format("no IHDR chunk".into()))?;
        if !ended {
            return Err(Error::Format("no IEND chunk".into()));
        }
        if data_chunks.is_empty() {
            return Err(Error::Format("no IDAT chunks".into()));
        }
        Ok(Self {
            header,
            restart,
            data_chunks,
        })
    }

    /// Concatenated IDAT bodies: the zlib stream.
    pub fn zlib_stream(&self) -> Vec<u8> {
        self.data_chunks.iter().flat_map(|c| c.body.iter().copied()).collect()
    }

    /// The iDOT descriptor and the position in [`Container::zlib_stream`]
    /// where an iDOT-aware decoder restarts: the start of the IDAT chunk the
    /// descriptor points at.
    pub fn restart_split(&self) -> Result<(RestartDescriptor, usize)> {
        let (descriptor, idot_offset) = self
            .restart
            .ok_or_else(|| Error::Format("no iDOT chunk".into()))?;
        let target = idot_offset + descriptor.restart_offset as usize;
        let mut split = 0;
        for chunk in &self.data_chunks {
            if chunk.offset == target {
                return Ok((descriptor, split));
            }
            split += chunk.body.len();
        }
        Err(Error::Format(format!(
            "iDOT restart offset {} (file offset {}) is not the start of an IDAT chunk",
            descriptor.restart_offset, target
        )))
    }

    /// Decode and check both readings. Requires an iDOT chunk.
    ///
    /// Checks: zlib header, Adler-32 trailer over the standard reading,
    /// stored block at the restart point, filter bytes of every reading, and
    /// row counts against IHDR and iDOT.
    pub fn decode(&self, codec: &dyn Codec) -> Result<Interpretations> {
        let stream = self.zlib_stream();
        if stream.len() < 2 + ZLIB_TRAILER_SIZE {
            return Err(Error::Format(format!(
                "zlib stream of {} bytes is too short",
                stream.len()
            )));
        }
        let (cmf, flg) = (stream[0], stream[1]);
        if cmf & 0x0f != 8 || (cmf as u16 * 256 + flg as u16) % 31 != 0 || flg & 0x20 != 0 {
            return Err(Error::Format(format!(
                "bad zlib header {:02x} {:02x}",
                cmf, flg
            )));
        }
        let body_end = stream.len() - ZLIB_TRAILER_SIZE;
        let declared_adler = u32::from_be_bytes([
            stream[body_end],
            stream[body_end + 1],
            stream[body_end + 2],
            stream[body_end + 3],
        ]);

        let (descriptor, split) = self.restart_split()?;
        if split < 2 || split > body_end {
            return Err(Error::Format(format!(
                "restart point {} lies outside the deflate data 2..{}",
                split, body_end
            )));
        }
        // Every segment opens with a stored block, so the restart point must
        // decode as one.
        StoredBlock::decode_at(&stream[..body_end], split)?;

        let width = self.header.width;
        let row_len = self.header.row_len();

        let standard = decode_standard(codec, &stream[2..split], &stream[split..body_end])?;
        validate(&standard, width)?;
        let computed_adler = adler32(&standard);
        if computed_adler != declared_adler {
            return Err(Error::RoundTripMismatch {
                stage: "zlib trailer",
                detail: format!(
                    "declared adler32 {:08x}, standard reading gives {:08x}",
                    declared_adler, computed_adler
                ),
            });
        }
        check_rows("standard interpretation", &standard, row_len, self.header.height)?;

        let (restart_first, restart_second) =
            decode_restart(codec, &stream[2..split], &stream[split..])?;
        validate(&restart_first, width)?;
        validate(&restart_second, width)?;
        check_rows("restart first part", &restart_first, row_len, descriptor.first_height)?;
        check_rows(
            "restart second part",
            &restart_second,
            row_len,
            descriptor.second_height,
        )?;

        Ok(Interpretations {
            standard,
            restart_first,
            restart_second,
            restart_split: split,
        })
    }
}

/// A file read from disk with both readings decoded.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub header: ImageHeader,
    pub descriptor: RestartDescriptor,
    pub interpretations: Interpretations,
}

/// Read `path` fully and decode both of its readings.
pub fn decode_file(codec: &dyn Codec, path: impl AsRef<Path>) -> Result<DecodedFile> {
    let bytes = fs::read(path)?;
    let container = Container::parse(&bytes)?;
    let interpretations = container.decode(codec)?;
    let (descriptor, _) = container.restart_split()?;
    Ok(DecodedFile {
        header: container.header,
        descriptor,
        interpretations,
    })
}

/// Fail unless `stream` is exactly `rows` rows of `row_len` bytes.
pub(crate) fn check_rows(
    stage: &'static str,
    stream: &[u8],
    row_len: usize,
    rows: u32,
) -> Result<()> {
    let expected = (rows as usize).checked_mul(row_len);
    if expected != Some(stream.len()) {
        return Err(Error::RoundTripMismatch {
            stage,
            detail: format!(
                "decoded {} bytes, expected {} rows of {} bytes",
                stream.len(),
                rows,
                row_len
            ),
        });
    }
    Ok(())
}
