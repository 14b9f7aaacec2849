use serde::{Deserialize, Serialize};

/// Separator written between consecutive blocks of the same frame.
pub const BLOCK_SEP: &[u8; 2] = b"\n\n";

/// Default uncompressed size at which a frame is sealed: 128 KiB.
pub const DEFAULT_FRAME_LIMIT: u64 = 128 * 1024;

// ── Trailer segment layout ─────────────────────────────────────────────────
//
// Each trailer segment is a complete, empty gzip member whose FEXTRA field
// carries one chunk of the index blob:
//
//   PREFIX[10]          magic, CM=deflate, FLG=FEXTRA, MTIME=0, XFL=0, OS=255
//   xlen:u16            chunk_len + 6
//   SUBFIELD_ID[2]
//   chunk_len:u16
//   chunk[chunk_len]
//   chunk_len:u16       duplicate, read first when scanning backward
//   SUFFIX[13]          final stored block of length 0, CRC32=0, ISIZE=0

/// Header of an empty gzip member with the FEXTRA flag set.
pub const TRAILER_PREFIX: &[u8; 10] = &[0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Empty deflate body plus the CRC32/ISIZE footer of an empty member.
pub const TRAILER_SUFFIX: &[u8; 13] = &[
    0x01, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Subfield identifier (SI1, SI2) of the index chunk.
pub const TRAILER_SUBFIELD_ID: &[u8; 2] = &[0x00, 0x00];

/// Bytes of FEXTRA content around the chunk: subfield id, subfield length,
/// and the trailing duplicate length.
pub const TRAILER_EXTRA_OVERHEAD: usize = 6;

/// Largest index chunk carried by one trailer segment (65535 - 6).
pub const TRAILER_CHUNK_MAX: usize = u16::MAX as usize - TRAILER_EXTRA_OVERHEAD;

/// Smallest possible archive: one empty gzip member.
pub const MIN_ARCHIVE_SIZE: u64 = (TRAILER_PREFIX.len() + TRAILER_SUFFIX.len()) as u64;

// ── Block table entry ──────────────────────────────────────────────────────

/// Locates one block inside the decompressed stream of its frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    /// Index into the frame table.
    pub frame: usize,
    /// Uncompressed offset of the block within its frame. Separators written
    /// before the block are counted.
    pub offset: u64,
    /// Uncompressed length of the block, excluding separators.
    pub length: u64,
}

impl BlockEntry {
    pub const fn new(frame: usize, offset: u64, length: u64) -> Self {
        Self {
            frame,
            offset,
            length,
        }
    }

    /// Uncompressed offset one past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}
