//! Seekable gzip block archives.
//!
//! An archive is an ordinary multi-member gzip file: decompressed front to back
//! it yields every block joined by [`format::BLOCK_SEP`]. Blocks are packed
//! into gzip members ("frames"), and an index of frames and blocks is hidden in
//! the FEXTRA field of empty gzip members appended at the end. [`Reader`] finds
//! that index by scanning backward from the end of the file and can then open
//! any block by decompressing only its frame.

pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod reader;
pub mod source;
pub mod trailer;
pub mod varint;
pub mod writer;

pub use config::WriterConfig;
pub use error::{Error, Result};
pub use format::{BlockEntry, BLOCK_SEP, DEFAULT_FRAME_LIMIT};
pub use index::Index;
pub use reader::{BlockReader, FrameReader, Reader};
pub use source::{ReadAt, SectionReader};
pub use writer::Writer;
