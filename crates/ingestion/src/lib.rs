//! Feed decoding for the FLEX feed converter.
//!
//! This crate handles:
//! - Chunk framing over a byte stream
//! - Tag block parsing (current price, cumulative volume)
//! - Source archive opening and output naming
//! - The conversion pass into the raw store

mod fields;
pub mod archive;
pub mod convert;
pub mod framer;
pub mod tags;
pub mod test_utils;

pub use archive::ArchiveKind;
pub use convert::{convert_file, convert_stream, ConvertSummary, StreamStats};
pub use framer::ChunkFramer;
pub use tags::{parse_chunk, TagIter};
