/// Output of a raw inflate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inflated {
    /// Everything that could be decoded.
    pub data: Vec<u8>,
    /// Whether a block with BFINAL set was reached.
    pub finished: bool,
    /// Input bytes consumed.
    pub consumed: usize,
}

/// The raw-deflate primitive everything else is built on.
///
/// Implementations must be deterministic: the same input always compresses
/// to the same bytes. The packer relies on that to compute exact segment
/// lengths, and it evaluates trial compressions from several threads at once.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Raw-deflate `raw` from a fresh compressor state and end with a full
    /// flush.
    ///
    /// The output is byte aligned at both ends, contains no final block, and
    /// never refers back to data before its own start, so it can be spliced
    /// between stored blocks.
    fn deflate_flush(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Raw-inflate `compressed`.
    ///
    /// A stream that runs out before a final block is not an error: the bytes
    /// decoded so far are returned with `finished == false`.
    fn inflate(&self, compressed: &[u8]) -> anyhow::Result<Inflated>;
}
