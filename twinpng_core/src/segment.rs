use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::stored::{StoredBlock, EMPTY_STORED, MAX_STORED_LEN, STORED_HEADER_SIZE};

/// A payload compressed to an exact, caller-chosen byte length.
///
/// Layout:
/// ```text
/// [empty stored] [deflate(payload[..split]) + full flush] [stored(payload[split..])] [empty stored] × padding
/// ```
/// The leading empty stored block puts a byte-aligned flush point in front of
/// the compressed part; the trailing empty blocks cost five bytes each and
/// make up the difference to the target length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    bytes: Vec<u8>,
    tail_len: usize,
    padding: usize,
}

impl Segment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Payload bytes carried verbatim in the stored tail block.
    pub fn tail_len(&self) -> usize {
        self.tail_len
    }

    /// Number of empty stored blocks appended as padding.
    pub fn padding(&self) -> usize {
        self.padding
    }
}

/// Compress `payload` to exactly `target` bytes.
///
/// Tries tail lengths `i = 1, 2, ...`: the first `len - i` bytes are deflated
/// and the last `i` stored verbatim. The first `i` that leaves a non-negative
/// remainder divisible by five is padded out with empty stored blocks.
///
/// Returns [`Error::SizeUnachievable`] when no tail length works. Any segment
/// returned has been inflated again and compared against `payload`.
pub fn compress_to_size(codec: &dyn Codec, payload: &[u8], target: usize) -> Result<Segment> {
    let max_tail = payload.len().saturating_sub(1).min(MAX_STORED_LEN);
    for tail_len in 1..=max_tail {
        // Both stored headers plus the tail already overshoot, and longer
        // tails only grow.
        if 2 * STORED_HEADER_SIZE + tail_len > target {
            break;
        }
        let split = payload.len() - tail_len;

        let mut candidate = EMPTY_STORED.to_vec();
        candidate.extend_from_slice(&codec.deflate_flush(&payload[..split])?);
        StoredBlock::new(&payload[split..], false).write_to(&mut candidate)?;

        let Some(remainder) = target.checked_sub(candidate.len()) else {
            continue;
        };
        if remainder % STORED_HEADER_SIZE != 0 {
            continue;
        }

        let padding = remainder / STORED_HEADER_SIZE;
        for _ in 0..padding {
            candidate.extend_from_slice(&EMPTY_STORED);
        }
        let segment = Segment {
            bytes: candidate,
            tail_len,
            padding,
        };
        verify(codec, &segment, payload, target)?;
        return Ok(segment);
    }

    Err(Error::SizeUnachievable {
        payload_len: payload.len(),
        target,
    })
}

fn verify(codec: &dyn Codec, segment: &Segment, payload: &[u8], target: usize) -> Result<()> {
    if segment.len() != target {
        return Err(Error::RoundTripMismatch {
            stage: "segment length",
            detail: format!("built {} bytes, target {}", segment.len(), target),
        });
    }
    let inflated = codec.inflate(segment.as_bytes())?;
    if inflated.finished || inflated.data != payload {
        return Err(Error::RoundTripMismatch {
            stage: "segment decode",
            detail: format!(
                "{} bytes in, {} bytes back (finished: {})",
                payload.len(),
                inflated.data.len(),
                inflated.finished
            ),
        });
    }
    Ok(())
}
