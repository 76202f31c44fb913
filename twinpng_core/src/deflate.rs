use anyhow::Context;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::codec::{Codec, Inflated};

/// Output buffer growth step.
const GROWTH_STEP: usize = 32 * 1024;

/// Raw deflate through `flate2`.
///
/// A new `Compress` is created for every call, which is what guarantees that
/// no back reference crosses a segment boundary.
#[derive(Debug, Clone, Copy)]
pub struct FlateCodec {
    /// Compression level (0 = stored only, 9 = smallest).
    pub level: u32,
}

impl Default for FlateCodec {
    fn default() -> Self {
        Self { level: 9 }
    }
}

impl FlateCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Codec for FlateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn deflate_flush(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut compressor = Compress::new(Compression::new(self.level), false);
        // Worst case deflate expansion is a few bytes per 16 KB stored block;
        // sized so the flush almost always completes in one call.
        let mut out = Vec::with_capacity(raw.len() + raw.len() / 8 + 128);
        loop {
            let consumed = compressor.total_in() as usize;
            compressor
                .compress_vec(&raw[consumed..], &mut out, FlushCompress::Full)
                .context("deflate failed")?;
            let all_in = compressor.total_in() as usize == raw.len();
            if all_in && out.len() < out.capacity() {
                return Ok(out);
            }
            out.reserve(GROWTH_STEP);
        }
    }

    fn inflate(&self, compressed: &[u8]) -> anyhow::Result<Inflated> {
        let mut decompressor = Decompress::new(false);
        let mut out = Vec::with_capacity(compressed.len() * 4 + 64);
        loop {
            if out.len() == out.capacity() {
                out.reserve(GROWTH_STEP);
            }
            let in_before = decompressor.total_in();
            let out_before = decompressor.total_out();
            let consumed = in_before as usize;
            let status = decompressor
                .decompress_vec(&compressed[consumed..], &mut out, FlushDecompress::None)
                .with_context(|| {
                    format!(
                        "inflate failed after {} input bytes ({} decoded)",
                        consumed,
                        out.len()
                    )
                })?;
            let finished = status == Status::StreamEnd;
            let progressed = decompressor.total_in() != in_before
                || decompressor.total_out() != out_before;
            if finished || (!progressed && out.len() < out.capacity()) {
                return Ok(Inflated {
                    data: out,
                    finished,
                    consumed: decompressor.total_in() as usize,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stored::{StoredBlock, EMPTY_STORED};

    #[test]
    fn flush_output_is_not_final_and_inflates_back() {
        let codec = FlateCodec::default();
        let raw: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        let compressed = codec.deflate_flush(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        // A full flush ends with the empty stored block sync marker.
        assert_eq!(&compressed[compressed.len() - 4..], &EMPTY_STORED[1..]);

        let inflated = codec.inflate(&compressed).unwrap();
        assert_eq!(inflated.data, raw);
        assert!(!inflated.finished);
        assert_eq!(inflated.consumed, compressed.len());
    }

    #[test]
    fn same_input_same_bytes() {
        let codec = FlateCodec::new(6);
        let raw = b"deterministic deterministic deterministic".to_vec();
        assert_eq!(
            codec.deflate_flush(&raw).unwrap(),
            codec.deflate_flush(&raw).unwrap()
        );
    }

    #[test]
    fn inflate_stops_at_final_block() {
        let codec = FlateCodec::default();
        let mut stream = codec.deflate_flush(b"hello hello hello").unwrap();
        StoredBlock::new(b"!", true).write_to(&mut stream).unwrap();
        stream.extend_from_slice(b"junk after the end");

        let inflated = codec.inflate(&stream).unwrap();
        assert_eq!(inflated.data, b"hello hello hello!");
        assert!(inflated.finished);
    }

    #[test]
    fn truncated_stored_block_yields_prefix() {
        let codec = FlateCodec::default();
        let mut stream = StoredBlock::new(b"abc", false).encode().unwrap();
        stream.extend_from_slice(&crate::stored::header(100, false));
        let inflated = codec.inflate(&stream).unwrap();
        assert_eq!(inflated.data, b"abc");
        assert!(!inflated.finished);
    }
}
