use crate::error::{Error, Result};
use crate::format::BYTES_PER_PIXEL;

/// Filter type "None": the row's samples are stored as-is.
pub const FILTER_NONE: u8 = 0;

/// Bytes shown on either side of a bad filter byte.
const CONTEXT_RADIUS: usize = 10;

/// An 8-bit RGB image held as tightly packed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSource {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl PixelSource {
    /// Wrap `rgb`, which must hold exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if rgb.len() != expected {
            return Err(Error::PixelBufferSize {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }
        Ok(Self { width, height, rgb })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per unfiltered row.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact(0) panics; a zero-width image simply has no row bytes.
        self.rgb.chunks_exact(self.stride().max(1)).take(self.height as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgb
    }
}

/// Scanlines as they appear inside the zlib stream: each row prefixed with
/// its filter-type byte, which is always [`FILTER_NONE`] here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredStream {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl FilteredStream {
    /// Length of one filtered row.
    pub fn row_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL + 1
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Filtered bytes of rows `[start, end)`.
    pub fn rows(&self, start: u32, end: u32) -> &[u8] {
        let row_len = self.row_len();
        &self.bytes[start as usize * row_len..end as usize * row_len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Prefix every row of `source` with filter type 0.
pub fn filter(source: &PixelSource) -> FilteredStream {
    let stride = source.stride();
    let mut bytes = Vec::with_capacity(source.height as usize * (stride + 1));
    if stride == 0 {
        bytes.resize(source.height as usize, FILTER_NONE);
    } else {
        for row in source.rows() {
            bytes.push(FILTER_NONE);
            bytes.extend_from_slice(row);
        }
    }
    FilteredStream {
        width: source.width,
        height: source.height,
        bytes,
    }
}

/// Check that every row-start byte of `stream` is [`FILTER_NONE`].
///
/// This is the acceptance test for a decoded stream: a decoder that landed
/// on the wrong block boundary produces rows whose first byte is arbitrary.
/// A trailing partial row is checked too.
pub fn validate(stream: &[u8], width: u32) -> Result<()> {
    let row_len = width as usize * BYTES_PER_PIXEL + 1;
    for offset in (0..stream.len()).step_by(row_len) {
        let value = stream[offset];
        if value != FILTER_NONE {
            return Err(Error::FilterValidationFailed {
                offset,
                value,
                context: hex_context(stream, offset),
            });
        }
    }
    Ok(())
}

/// Validate `stream` and drop the filter bytes, leaving packed RGB rows.
/// Fails if the stream is not a whole number of rows.
pub fn strip_filter(stream: &[u8], width: u32) -> Result<Vec<u8>> {
    validate(stream, width)?;
    let row_len = width as usize * BYTES_PER_PIXEL + 1;
    if stream.len() % row_len != 0 {
        return Err(Error::Format(format!(
            "{} filtered bytes is not a whole number of {}-byte rows",
            stream.len(),
            row_len
        )));
    }
    let mut rgb = Vec::with_capacity(stream.len() / row_len * (row_len - 1));
    for row in stream.chunks_exact(row_len) {
        rgb.extend_from_slice(&row[1..]);
    }
    Ok(rgb)
}

fn hex_context(stream: &[u8], offset: usize) -> String {
    let start = offset.saturating_sub(CONTEXT_RADIUS);
    let end = (offset + CONTEXT_RADIUS).min(stream.len());
    stream[start..end]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
