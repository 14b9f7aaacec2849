use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::format::{BlockEntry, BLOCK_SEP};
use crate::varint::{decode_varint, encode_varint};

/// Frame table and block table of an archive.
///
/// Serialized form (every field a zig-zag varint):
/// ```text
/// frame_count  frame_len × frame_count
/// block_count  (frame, offset, length) × block_count
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    /// Compressed byte length of each frame, in file order.
    pub frames: Vec<u64>,
    pub blocks: Vec<BlockEntry>,
}

impl Index {
    /// Append the serialized index to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_varint(buf, self.frames.len() as i64);
        for &len in &self.frames {
            encode_varint(buf, len as i64);
        }

        encode_varint(buf, self.blocks.len() as i64);
        for block in &self.blocks {
            encode_varint(buf, block.frame as i64);
            encode_varint(buf, block.offset as i64);
            encode_varint(buf, block.length as i64);
        }
    }

    /// Parse a serialized index. Bytes after the block table are ignored.
    ///
    /// Every block must reference an existing frame, and the blocks plus their
    /// separators must fit in a `u64`; the returned index is safe to address
    /// and sum without further checks.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let frame_count = read_count(&mut buf)?;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            frames.push(read_u64(&mut buf, "negative frame length")?);
        }

        let block_count = read_count(&mut buf)?;
        let mut blocks = Vec::with_capacity(block_count);
        let mut size = 0u64;
        for i in 0..block_count {
            let frame = read_u64(&mut buf, "negative frame reference")?;
            let offset = read_u64(&mut buf, "negative block offset")?;
            let length = read_u64(&mut buf, "negative block length")?;
            if frame >= frames.len() as u64 {
                return Err(Error::MalformedIndex("block references a missing frame"));
            }
            if offset.checked_add(length).is_none() {
                return Err(Error::MalformedIndex("block extent overflows"));
            }
            let sep = if i == 0 { 0 } else { BLOCK_SEP.len() as u64 };
            size = size
                .checked_add(length)
                .and_then(|size| size.checked_add(sep))
                .ok_or(Error::MalformedIndex("blocks overflow the uncompressed size"))?;
            blocks.push(BlockEntry::new(frame as usize, offset, length));
        }

        Ok(Self { frames, blocks })
    }

    /// Total compressed size of all frames.
    pub fn frames_size(&self) -> Option<u64> {
        self.frames
            .iter()
            .try_fold(0u64, |acc, &len| acc.checked_add(len))
    }
}

fn read_u64(buf: &mut &[u8], negative: &'static str) -> Result<u64> {
    u64::try_from(decode_varint(buf)?).map_err(|_| Error::MalformedIndex(negative))
}

/// Read a table length. Each entry takes at least one byte, so a count larger
/// than the bytes left cannot be satisfied and is rejected before allocating.
fn read_count(buf: &mut &[u8]) -> Result<usize> {
    let count = read_u64(buf, "negative table length")?;
    if count > buf.remaining() as u64 {
        return Err(Error::MalformedIndex("table length exceeds index size"));
    }
    Ok(count as usize)
}
