use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::ptr;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};
use crate::format::{BlockEntry, BLOCK_SEP};
use crate::index::Index;
use crate::source::{ReadAt, SectionReader};
use crate::trailer::read_trailer;

/// Decompressed view of one whole frame.
pub type FrameReader<'a, R> = GzDecoder<SectionReader<'a, R>>;

/// Random-access reader for seekable gzip archives.
///
/// # Open sequence
/// 1. Walk the trailer segments backward from the end of the source and
///    reassemble the index blob.
/// 2. Decode the frame table and block table.
/// 3. Precompute each frame's starting byte offset.
///
/// # Access pattern
/// [`open_block`](Reader::open_block) decompresses only the frame holding the
/// block, from the start of that frame up to the end of the block. Passing back
/// the previous [`BlockReader`] lets a forward walk through one frame continue
/// on the already-open gzip stream instead of starting it again.
pub struct Reader<R> {
    source: R,
    index: Index,
    /// Starting byte offset of each frame.
    frame_offsets: Vec<u64>,
}

impl Reader<File> {
    /// Open the archive at `path`. The file is closed when the reader drops.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Self::new(file, size)
    }
}

impl<R: ReadAt> Reader<R> {
    /// Recover the index of a `size`-byte archive held by `source`.
    pub fn new(source: R, size: u64) -> Result<Self> {
        let trailer = read_trailer(&source, size)?;
        let index = Index::decode(&trailer.index)?;

        let end = index
            .frames_size()
            .ok_or(Error::MalformedIndex("frame lengths overflow"))?;
        if end > trailer.offset {
            return Err(Error::MalformedIndex("frames extend into the trailer"));
        }

        let mut frame_offsets = Vec::with_capacity(index.frames.len());
        let mut at = 0u64;
        for &len in &index.frames {
            frame_offsets.push(at);
            at += len;
        }

        tracing::debug!(
            frames = index.frames.len(),
            blocks = index.blocks.len(),
            "opened archive"
        );
        Ok(Self {
            source,
            index,
            frame_offsets,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.index.frames.len()
    }

    pub fn block_count(&self) -> usize {
        self.index.blocks.len()
    }

    /// Compressed length of every frame, in file order.
    pub fn frames(&self) -> &[u64] {
        &self.index.frames
    }

    pub fn blocks(&self) -> &[BlockEntry] {
        &self.index.blocks
    }

    pub fn block(&self, index: usize) -> Option<&BlockEntry> {
        self.index.blocks.get(index)
    }

    /// Byte offset in the archive where frame `index` starts.
    pub fn frame_offset(&self, index: usize) -> Option<u64> {
        self.frame_offsets.get(index).copied()
    }

    /// Size of the fully decompressed archive: all blocks plus separators.
    pub fn uncompressed_size(&self) -> u64 {
        let data: u64 = self.index.blocks.iter().map(|b| b.length).sum();
        let seps = self.index.blocks.len().saturating_sub(1) as u64 * BLOCK_SEP.len() as u64;
        data + seps
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Open a gzip stream over exactly the bytes of frame `index`.
    pub fn open_frame(&self, index: usize) -> Result<FrameReader<'_, R>> {
        let (offset, len) = self.frame_span(index)?;
        Ok(GzDecoder::new(SectionReader::new(&self.source, offset, len)))
    }

    /// Open block `index` for reading.
    ///
    /// `reuse` may carry a reader returned by an earlier call. When it is open
    /// on the same frame and has not read past the start of block `index`, the
    /// open gzip stream is advanced to the block instead of opening a new one.
    /// Otherwise its stream is closed and a fresh one is opened.
    pub fn open_block<'a>(
        &'a self,
        index: usize,
        reuse: Option<BlockReader<'a, R>>,
    ) -> Result<BlockReader<'a, R>> {
        let mut reader = match reuse {
            Some(mut reader) => {
                if !ptr::eq(reader.reader, self) {
                    reader.close();
                    reader.reader = self;
                }
                reader
            }
            None => BlockReader::new(self),
        };
        reader.reposition(index)?;
        Ok(reader)
    }

    /// Read block `index` into memory.
    pub fn read_block(&self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.open_block(index, None)?;
        let mut out = Vec::with_capacity(reader.remaining().min(1 << 20) as usize);
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    fn entry(&self, index: usize) -> Result<BlockEntry> {
        self.index
            .blocks
            .get(index)
            .copied()
            .ok_or(Error::NotFound {
                kind: "block",
                index,
                count: self.index.blocks.len(),
            })
    }

    fn frame_span(&self, index: usize) -> Result<(u64, u64)> {
        match (self.frame_offsets.get(index), self.index.frames.get(index)) {
            (Some(&offset), Some(&len)) => Ok((offset, len)),
            _ => Err(Error::NotFound {
                kind: "frame",
                index,
                count: self.index.frames.len(),
            }),
        }
    }
}

/// Bounded reader over one block's decompressed bytes.
///
/// Reads stop at the end of the block even though the underlying frame stream
/// continues with a separator and the next block. The reader can be moved to
/// another block with [`reposition`](BlockReader::reposition) or by handing it
/// back to [`Reader::open_block`]; either keeps the open frame stream when the
/// target lies ahead in the same frame.
pub struct BlockReader<'a, R> {
    reader: &'a Reader<R>,
    frame: Option<OpenFrame<'a, R>>,
    index: usize,
    /// Decompressed position within the open frame.
    offset: u64,
    remain: u64,
}

struct OpenFrame<'a, R> {
    frame: usize,
    decoder: FrameReader<'a, R>,
}

impl<'a, R: ReadAt> BlockReader<'a, R> {
    fn new(reader: &'a Reader<R>) -> Self {
        Self {
            reader,
            frame: None,
            index: 0,
            offset: 0,
            remain: 0,
        }
    }

    /// Move this reader to the start of block `index`.
    ///
    /// An unknown `index` returns [`Error::NotFound`] and leaves the reader
    /// where it was. If opening or advancing the frame stream fails, the
    /// reader is left closed.
    pub fn reposition(&mut self, index: usize) -> Result<()> {
        let block = self.reader.entry(index)?;
        self.remain = 0;

        let open = match self.frame.take() {
            Some(mut open) if open.frame == block.frame && block.offset >= self.offset => {
                skip(&mut open.decoder, block.offset - self.offset)?;
                tracing::trace!(block = index, frame = block.frame, "reused frame stream");
                open
            }
            stale => {
                drop(stale);
                let mut decoder = self.reader.open_frame(block.frame)?;
                skip(&mut decoder, block.offset)?;
                tracing::trace!(block = index, frame = block.frame, "opened frame stream");
                OpenFrame {
                    frame: block.frame,
                    decoder,
                }
            }
        };

        self.frame = Some(open);
        self.index = index;
        self.offset = block.offset;
        self.remain = block.length;
        Ok(())
    }

    /// Release the frame stream. Further reads return end of stream.
    pub fn close(&mut self) {
        self.frame = None;
        self.remain = 0;
    }

    /// Block this reader is positioned on.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes left before the end of the block.
    pub fn remaining(&self) -> u64 {
        self.remain
    }

    pub fn is_open(&self) -> bool {
        self.frame.is_some()
    }
}

impl<R: ReadAt> Read for BlockReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(open) = self.frame.as_mut() else {
            return Ok(0);
        };
        let want = self.remain.min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }

        let n = open.decoder.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "frame ended inside block",
            ));
        }
        self.offset += n as u64;
        self.remain -= n as u64;
        Ok(n)
    }
}

/// Read and discard exactly `n` bytes.
fn skip(r: &mut impl Read, n: u64) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut r.take(n), &mut io::sink())?;
    if skipped < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "frame ended before block start",
        ));
    }
    Ok(())
}
