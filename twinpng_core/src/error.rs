use thiserror::Error;

/// Everything that can abort a build or reject a container.
///
/// None of these are retried: a build either produces a complete file or
/// nothing at all.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "input images must be the same size: {a_width}x{a_height} vs {b_width}x{b_height}"
    )]
    DimensionMismatch {
        a_width: u32,
        a_height: u32,
        b_width: u32,
        b_height: u32,
    },

    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    PixelBufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("width {width} gives a {row_len}-byte filtered row, which does not fit one stored block")]
    WidthTooLarge { width: u32, row_len: usize },

    #[error("unable to compress {payload_len} bytes to exactly {target} bytes")]
    SizeUnachievable { payload_len: usize, target: usize },

    #[error("bad filter byte {value:#04x} at offset {offset} (surrounding bytes: {context})")]
    FilterValidationFailed {
        offset: usize,
        value: u8,
        context: String,
    },

    #[error("round-trip mismatch in {stage}: {detail}")]
    RoundTripMismatch { stage: &'static str, detail: String },

    #[error("stored block at offset {offset}: length {len:#06x} disagrees with complement {nlen:#06x}")]
    StoredLengthMismatch { offset: usize, len: u16, nlen: u16 },

    #[error("stored block at offset {offset} truncated: needs {needed} bytes, {available} available")]
    StoredTruncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("stored block at offset {offset} has flag byte {flag:#04x}, expected 0 or 1")]
    BadStoredFlag { offset: usize, flag: u8 },

    #[error("stored block payload of {0} bytes exceeds 65535")]
    StoredTooLong(usize),

    #[error("chunk {kind} at offset {offset}: crc {declared:08x} does not match computed {computed:08x}")]
    ChunkCrc {
        kind: String,
        offset: usize,
        declared: u32,
        computed: u32,
    },

    #[error("malformed container: {0}")]
    Format(String),

    #[error(transparent)]
    Codec(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
