use log::{debug, error, info};
use rayon::prelude::*;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::filter::{filter, FilteredStream, PixelSource};
use crate::segment::{compress_to_size, Segment};
use crate::stored::{self, StoredBlock, MAX_STORED_LEN, STORED_HEADER_SIZE};

/// Knobs for the packing pass.
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    /// Evaluate trial heights on the rayon pool. The chosen heights, and so
    /// the output bytes, are the same either way.
    pub parallel: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Rows `[start_row, start_row + height)` of both sources, packed as one
/// segment per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub start_row: u32,
    pub height: u32,
}

impl Piece {
    pub fn end_row(&self) -> u32 {
        self.start_row + self.height
    }
}

/// The payload buffer and the row ranges it was built from.
///
/// Layout, per piece:
/// ```text
/// [segment A] [marker] [segment B] [marker]
/// ```
/// where a marker is the bare 5-byte header of a stored block announcing one
/// full row. The last marker is replaced by an empty stored block and the
/// stream closed with an empty final stored block.
#[derive(Debug, Clone)]
pub struct PackedPayload {
    pub payload: Vec<u8>,
    pub pieces: Vec<Piece>,
}

impl PackedPayload {
    /// Source rows up to the end of the last piece. Rows skipped between
    /// pieces are counted: each one is covered by a swallowed row.
    pub fn covered_rows(&self) -> u32 {
        self.pieces.last().map(Piece::end_row).unwrap_or(0)
    }

    /// Rows in the single-stream reading: the blank prefix row, then per piece
    /// one swallowed row and the image B rows.
    pub fn standard_height(&self) -> u32 {
        self.covered_rows() + 2
    }

    /// Rows in the reading that restarts at the payload: per piece the image A
    /// rows and one swallowed row.
    pub fn restart_height(&self) -> u32 {
        self.covered_rows() + 1
    }
}

/// A successful trial: both images' rows compressed to the segment target.
struct Trial {
    height: u32,
    a: Segment,
    b: Segment,
}

/// Splits two equally sized images into row ranges whose segments all have
/// the same exact length, and interleaves them into one payload.
pub struct DualPacker<'a> {
    codec: &'a dyn Codec,
    a: FilteredStream,
    b: FilteredStream,
    width: u32,
    height: u32,
    options: PackOptions,
}

impl<'a> DualPacker<'a> {
    pub fn new(
        codec: &'a dyn Codec,
        a: &PixelSource,
        b: &PixelSource,
        options: PackOptions,
    ) -> Result<Self> {
        if a.width() != b.width() || a.height() != b.height() {
            return Err(Error::DimensionMismatch {
                a_width: a.width(),
                a_height: a.height(),
                b_width: b.width(),
                b_height: b.height(),
            });
        }
        if a.width() == 0 || a.height() == 0 {
            return Err(Error::Format(format!(
                "cannot pack an empty {}x{} image",
                a.width(),
                a.height()
            )));
        }
        let (width, height) = (a.width(), a.height());
        let a = filter(a);
        let b = filter(b);
        if a.row_len() > MAX_STORED_LEN {
            return Err(Error::WidthTooLarge {
                width,
                row_len: a.row_len(),
            });
        }
        Ok(Self {
            codec,
            a,
            b,
            width,
            height,
            options,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Length of one filtered row.
    pub fn row_len(&self) -> usize {
        self.a.row_len()
    }

    /// Exact length of every segment: one row, less the marker that follows.
    pub fn segment_target(&self) -> usize {
        self.row_len() - STORED_HEADER_SIZE
    }

    pub fn pack(&self) -> Result<PackedPayload> {
        // row_len <= MAX_STORED_LEN was checked in new().
        let marker = stored::header(self.row_len() as u16, false);
        let mut payload = Vec::new();
        let mut pieces = Vec::new();

        let mut y = 0;
        while y < self.height {
            let trial = self.search(y)?;
            debug!(
                "rows {}..{}: segments {} bytes (tails {}/{}, padding {}/{})",
                y,
                y + trial.height,
                trial.a.len(),
                trial.a.tail_len(),
                trial.b.tail_len(),
                trial.a.padding(),
                trial.b.padding()
            );
            payload.extend_from_slice(trial.a.as_bytes());
            payload.extend_from_slice(&marker);
            payload.extend_from_slice(trial.b.as_bytes());
            payload.extend_from_slice(&marker);
            pieces.push(Piece {
                start_row: y,
                height: trial.height,
            });
            // The row after each piece is lost to the swallowed segment.
            y += trial.height + 1;
        }

        payload.truncate(payload.len() - STORED_HEADER_SIZE);
        StoredBlock::empty(false).write_to(&mut payload)?;
        StoredBlock::empty(true).write_to(&mut payload)?;

        info!(
            "packed {} rows into {} pieces, payload {} bytes",
            self.height,
            pieces.len(),
            payload.len()
        );
        Ok(PackedPayload { payload, pieces })
    }

    /// Find the tallest piece starting at row `y`.
    ///
    /// Heights 2, 3, ... are tried in order until one fails or the rows run
    /// out; the last success wins. Only if height 2 already fails is height 1
    /// tried, and its failure is fatal.
    fn search(&self, y: u32) -> Result<Trial> {
        let remaining = self.height - y;
        let batch = if self.options.parallel {
            rayon::current_num_threads().max(1) as u32
        } else {
            1
        };

        let mut best = None;
        let mut next = 2;
        'search: while next <= remaining {
            let end = next.saturating_add(batch).min(remaining + 1);
            let heights: Vec<u32> = (next..end).collect();
            let results: Vec<Result<Trial>> = if self.options.parallel {
                heights.par_iter().map(|&h| self.trial(y, h)).collect()
            } else {
                heights.iter().map(|&h| self.trial(y, h)).collect()
            };
            for result in results {
                match result {
                    Ok(trial) => best = Some(trial),
                    Err(Error::SizeUnachievable { payload_len, target }) => {
                        debug!(
                            "row {}: {} bytes do not fit {} bytes, backing off",
                            y, payload_len, target
                        );
                        break 'search;
                    }
                    Err(e) => return Err(e),
                }
            }
            next = end;
        }

        match best {
            Some(trial) => Ok(trial),
            None => self.trial(y, 1).map_err(|e| {
                error!("row {} cannot be packed even on its own: {}", y, e);
                e
            }),
        }
    }

    fn trial(&self, y: u32, height: u32) -> Result<Trial> {
        let target = self.segment_target();
        let a = compress_to_size(self.codec, self.a.rows(y, y + height), target)?;
        let b = compress_to_size(self.codec, self.b.rows(y, y + height), target)?;
        Ok(Trial { height, a, b })
    }
}
