pub mod checksum;
pub mod codec;
pub mod deflate;
pub mod error;
pub mod filter;
pub mod format;
pub mod packer;
pub mod reader;
pub mod segment;
pub mod stored;
pub mod writer;

pub use codec::{Codec, Inflated};
pub use deflate::FlateCodec;
pub use error::{Error, Result};
pub use filter::{FilteredStream, PixelSource};
pub use format::{ImageHeader, RestartDescriptor, PNG_MAGIC};
pub use packer::{DualPacker, PackOptions, PackedPayload, Piece};
pub use reader::{decode_file, Container, DecodedFile, Interpretations};
pub use segment::{compress_to_size, Segment};
pub use stored::StoredBlock;
pub use writer::{BuiltImage, Writer};
