//! Error types for archive reading and writing.
//!
//! Format errors (`InvalidTrailer`, `MalformedIndex`) are fatal to
//! [`Reader::new`](crate::Reader::new). `NotFound` and `Closed` are per-call and
//! leave the reader or writer usable. I/O errors from the byte source, the sink,
//! or the gzip stream are passed through untouched so callers can tell
//! transient failures from a damaged archive.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid seekable trailer: {0}")]
    InvalidTrailer(&'static str),

    #[error("malformed index: {0}")]
    MalformedIndex(&'static str),

    #[error("{kind} {index} not found (archive has {count})")]
    NotFound {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    #[error("writer is closed")]
    Closed,
}

impl Error {
    /// True for the format errors raised while recovering the index.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::InvalidTrailer(_) | Error::MalformedIndex(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
