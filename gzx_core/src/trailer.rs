//! Index trailer: the index blob hidden in trailing empty gzip members.
//!
//! A gzip decoder treats every trailer segment as an empty member and skips its
//! FEXTRA field, so the archive still decompresses to exactly the block data.
//! The segment layout is documented in [`crate::format`].
//!
//! Segments are written last chunk first, so the segment holding chunk 0 ends
//! the file. [`read_trailer`] walks the chain backward from the end of the
//! source and recovers the chunks in logical order.
//!
//! A frame whose content is empty, stored at level 0, ends with the same 13
//! bytes as a trailer segment. The scan therefore also stops once the chunks
//! gathered so far form an index whose frames end exactly at the scan
//! position.

use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::format::{
    MIN_ARCHIVE_SIZE, TRAILER_CHUNK_MAX, TRAILER_EXTRA_OVERHEAD, TRAILER_PREFIX,
    TRAILER_SUBFIELD_ID, TRAILER_SUFFIX,
};
use crate::index::Index;
use crate::source::ReadAt;

const TAIL_LEN: usize = TRAILER_SUFFIX.len() + 2;
const HEAD_LEN: usize = TRAILER_PREFIX.len() + TRAILER_EXTRA_OVERHEAD;

/// Size on disk of the segment carrying `chunk_len` index bytes.
pub fn segment_len(chunk_len: usize) -> usize {
    HEAD_LEN + chunk_len + TAIL_LEN
}

/// Append one trailer segment for `chunk` to `buf`.
fn put_segment(buf: &mut BytesMut, chunk: &[u8]) {
    debug_assert!(chunk.len() <= TRAILER_CHUNK_MAX);
    let len = chunk.len() as u16;

    buf.reserve(segment_len(chunk.len()));
    buf.put_slice(TRAILER_PREFIX);
    buf.put_u16_le(len + TRAILER_EXTRA_OVERHEAD as u16);
    buf.put_slice(TRAILER_SUBFIELD_ID);
    buf.put_u16_le(len);
    buf.put_slice(chunk);
    buf.put_u16_le(len);
    buf.put_slice(TRAILER_SUFFIX);
}

/// Write `blob` to `sink` as a chain of trailer segments.
///
/// Nothing is written for an empty blob.
pub fn write_trailer(blob: &[u8], sink: &mut impl Write) -> std::io::Result<()> {
    let mut buf = BytesMut::new();
    for chunk in blob.chunks(TRAILER_CHUNK_MAX).rev() {
        buf.clear();
        put_segment(&mut buf, chunk);
        sink.write_all(&buf)?;
    }
    Ok(())
}

/// Index blob recovered from the end of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub index: Vec<u8>,
    /// Offset of the first trailer segment; frame data ends here.
    pub offset: u64,
}

/// Recover the index blob from the end of a `size`-byte source.
///
/// Scanning stops at the first position whose tail does not look like a
/// trailer segment; everything before it is frame data. A tail that matches
/// but whose header is inconsistent is an error.
pub fn read_trailer<R: ReadAt + ?Sized>(source: &R, size: u64) -> Result<Trailer> {
    if size < MIN_ARCHIVE_SIZE {
        return Err(Error::InvalidTrailer("archive smaller than an empty gzip member"));
    }

    let mut blob = Vec::new();
    let mut tail = [0u8; TAIL_LEN];
    let mut head = [0u8; HEAD_LEN];
    let mut off = size;

    while off > MIN_ARCHIVE_SIZE {
        let tail_at = off - TAIL_LEN as u64;
        source.read_exact_at(&mut tail, tail_at)?;
        if tail[2..] != TRAILER_SUFFIX[..] || is_complete(&blob, off) {
            break;
        }
        let chunk_len = u16::from_le_bytes([tail[0], tail[1]]);

        let chunk_at = tail_at
            .checked_sub(chunk_len as u64)
            .ok_or(Error::InvalidTrailer("chunk extends before start of archive"))?;
        let start = blob.len();
        blob.resize(start + chunk_len as usize, 0);
        source.read_exact_at(&mut blob[start..], chunk_at)?;

        let head_at = chunk_at
            .checked_sub(HEAD_LEN as u64)
            .ok_or(Error::InvalidTrailer("segment header before start of archive"))?;
        source.read_exact_at(&mut head, head_at)?;
        check_head(&head, chunk_len)?;

        off = head_at;
    }

    if blob.is_empty() {
        return Err(Error::InvalidTrailer("no index trailer found"));
    }
    tracing::debug!(index_len = blob.len(), offset = off, "recovered index trailer");
    Ok(Trailer {
        index: blob,
        offset: off,
    })
}

/// Whether `blob` already decodes to an index whose frames fill `0..off`.
fn is_complete(blob: &[u8], off: u64) -> bool {
    !blob.is_empty()
        && Index::decode(blob).is_ok_and(|index| index.frames_size() == Some(off))
}

fn check_head(head: &[u8; HEAD_LEN], chunk_len: u16) -> Result<()> {
    let (prefix, rest) = head.split_at(TRAILER_PREFIX.len());
    if prefix != TRAILER_PREFIX {
        return Err(Error::InvalidTrailer("segment header mismatch"));
    }
    let extra_len = u16::from_le_bytes([rest[0], rest[1]]);
    if extra_len as usize != chunk_len as usize + TRAILER_EXTRA_OVERHEAD {
        return Err(Error::InvalidTrailer("extra field length does not match chunk"));
    }
    if rest[2..4] != TRAILER_SUBFIELD_ID[..] {
        return Err(Error::InvalidTrailer("unexpected subfield id"));
    }
    if u16::from_le_bytes([rest[4], rest[5]]) != chunk_len {
        return Err(Error::InvalidTrailer("subfield length does not match chunk"));
    }
    Ok(())
}
