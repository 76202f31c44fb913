use std::fs;
use std::path::Path;

use log::info;

use crate::checksum::{adler32, chunk_crc};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::filter::{validate, PixelSource};
use crate::format::{
    ChunkType, ImageHeader, RestartDescriptor, CHUNK_OVERHEAD, PNG_MAGIC, RESTART_CHUNK_SIZE,
    ZLIB_HEADER,
};
use crate::packer::{DualPacker, PackOptions, Piece};
use crate::reader::{check_rows, decode_restart, decode_standard};
use crate::stored::{self, StoredBlock};

/// A fully assembled and self-checked file, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub bytes: Vec<u8>,
    pub header: ImageHeader,
    pub descriptor: RestartDescriptor,
    pub pieces: Vec<Piece>,
}

impl BuiltImage {
    /// Rows a standard decoder reads (the IHDR height).
    pub fn standard_height(&self) -> u32 {
        self.header.height
    }

    /// Rows an iDOT-aware decoder reads from the restart point onward.
    pub fn restart_height(&self) -> u32 {
        self.descriptor.second_height
    }
}

/// Builds the dual-interpretation PNG.
///
/// # Layout written
/// ```text
/// [PNG magic]
/// [IHDR]
/// [iDOT]                               ← restart descriptor
/// [IDAT: 78 DA ++ prefix]              ← blank row + dangling stored header
/// [IDAT: payload ++ adler32]           ← restart point
/// [IEND]
/// ```
/// Read straight through, the dangling header in the prefix swallows the first
/// image A segment and the decoder lands on image B. Restarted at the second
/// IDAT, the decoder sees image A and swallows image B instead.
pub struct Writer<'a> {
    codec: &'a dyn Codec,
    options: PackOptions,
}

impl<'a> Writer<'a> {
    pub fn new(codec: &'a dyn Codec) -> Self {
        Self {
            codec,
            options: PackOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PackOptions) -> Self {
        self.options = options;
        self
    }

    /// Pack `a` (shown by iDOT-aware decoders) and `b` (shown by everything
    /// else) into one file held in memory.
    ///
    /// Both interpretations are decoded and checked before this returns.
    pub fn build(&self, a: &PixelSource, b: &PixelSource) -> Result<BuiltImage> {
        let packer = DualPacker::new(self.codec, a, b, self.options)?;
        let packed = packer.pack()?;
        let row_len = packer.row_len();
        let width = packer.width();
        let prefix = build_prefix(row_len)?;
        let standard_height = packed.standard_height();
        let restart_height = packed.restart_height();

        // ── Self checks ─────────────────────────────────────────────────────
        let standard = decode_standard(self.codec, &prefix, &packed.payload)?;
        validate(&standard, width)?;
        check_rows("standard interpretation", &standard, row_len, standard_height)?;

        let (first, second) = decode_restart(self.codec, &prefix, &packed.payload)?;
        validate(&first, width)?;
        validate(&second, width)?;
        let first_height = (first.len() / row_len) as u32;
        check_rows("restart first part", &first, row_len, first_height)?;
        check_rows("restart second part", &second, row_len, restart_height)?;
        if first_height + restart_height != standard_height {
            return Err(Error::RoundTripMismatch {
                stage: "interpretation heights",
                detail: format!(
                    "restart reading has {} + {} rows, standard reading {}",
                    first_height,
                    restart_height,
                    standard_height
                ),
            });
        }

        // ── Assemble ────────────────────────────────────────────────────────
        let header = ImageHeader {
            width,
            height: standard_height,
        };

        let mut first_data = Vec::with_capacity(ZLIB_HEADER.len() + prefix.len());
        first_data.extend_from_slice(&ZLIB_HEADER);
        first_data.extend_from_slice(&prefix);

        let mut second_data = packed.payload;
        second_data.extend_from_slice(&adler32(&standard).to_be_bytes());

        // Measured from the start of the iDOT chunk to the start of the
        // second IDAT chunk.
        let restart_offset = RESTART_CHUNK_SIZE as usize + CHUNK_OVERHEAD + first_data.len();
        let restart_offset = u32::try_from(restart_offset).map_err(|_| {
            Error::Format(format!("restart offset {} overflows u32", restart_offset))
        })?;
        let descriptor =
            RestartDescriptor::new(first_height, restart_height, restart_offset);

        let mut bytes = Vec::with_capacity(
            PNG_MAGIC.len() + 5 * CHUNK_OVERHEAD + 64 + first_data.len() + second_data.len(),
        );
        bytes.extend_from_slice(PNG_MAGIC);
        write_chunk(&mut bytes, ChunkType::IHDR, &header.to_bytes())?;
        write_chunk(&mut bytes, ChunkType::IDOT, &descriptor.to_bytes())?;
        write_chunk(&mut bytes, ChunkType::IDAT, &first_data)?;
        write_chunk(&mut bytes, ChunkType::IDAT, &second_data)?;
        write_chunk(&mut bytes, ChunkType::IEND, &[])?;

        info!(
            "built {}x{} image: {} pieces, restart at +{}, {} bytes",
            header.width,
            header.height,
            packed.pieces.len(),
            restart_offset,
            bytes.len()
        );

        Ok(BuiltImage {
            bytes,
            header,
            descriptor,
            pieces: packed.pieces,
        })
    }

    /// Build and write to `path`. Nothing is created unless every step and
    /// check succeeds.
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        a: &PixelSource,
        b: &PixelSource,
    ) -> Result<BuiltImage> {
        let built = self.build(a, b)?;
        fs::write(path, &built.bytes)?;
        Ok(built)
    }
}

/// The first IDAT's deflate data: a stored block holding one all-zero row,
/// then the bare header of a stored block announcing another row whose bytes
/// never follow in this chunk.
pub fn build_prefix(row_len: usize) -> Result<Vec<u8>> {
    let len = u16::try_from(row_len).map_err(|_| Error::StoredTooLong(row_len))?;
    let blank = vec![0u8; row_len];
    let mut prefix = Vec::with_capacity(row_len + 2 * stored::STORED_HEADER_SIZE);
    StoredBlock::new(&blank, false).write_to(&mut prefix)?;
    prefix.extend_from_slice(&stored::header(len, false));
    Ok(prefix)
}

/// Append `[len:u32 BE][type][body][crc:u32 BE]`.
pub fn write_chunk(out: &mut Vec<u8>, kind: ChunkType, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::Format(format!("{} chunk of {} bytes", kind, body.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&kind.0);
    out.extend_from_slice(body);
    out.extend_from_slice(&chunk_crc(&kind.0, body).to_be_bytes());
    Ok(())
}
