use std::io::{self, Read, Write};
use std::mem;

use bytes::BytesMut;
use flate2::write::GzEncoder;

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::format::{BlockEntry, BLOCK_SEP};
use crate::index::Index;
use crate::trailer::write_trailer;

/// Streaming writer for seekable gzip archives.
///
/// # Write contract
/// Call [`write_block`](Writer::write_block) once per logical record. Blocks are
/// packed into gzip members ("frames") separated by [`BLOCK_SEP`]; a frame is
/// sealed at the first block boundary after its uncompressed size reaches
/// [`WriterConfig::frame_limit`]. Call [`close`](Writer::close) to seal the last
/// frame and append the index trailer. Dropping a writer without closing it
/// leaves an archive with no index.
///
/// # Layout written
/// ```text
/// [FRAME 0: blk0 SEP blk1 SEP ... SEP] [FRAME 1: blkK SEP ...] ... [FRAME F-1]
/// [TRAILER SEGMENT: chunk C-1] ... [TRAILER SEGMENT: chunk 0]
/// ```
/// Decompressed front to back, the archive is `blk0 SEP blk1 SEP ... blkN-1`.
pub struct Writer<W: Write> {
    stream: Stream<W>,
    config: WriterConfig,
    index: Index,
    /// Uncompressed bytes written to the open frame, separators included.
    input_size: u64,
    closed: bool,
}

enum Stream<W: Write> {
    /// Between frames.
    Idle(CountingWriter<W>),
    Frame(GzEncoder<CountingWriter<W>>),
    /// Sealing a frame failed and the sink went down with the encoder.
    Lost,
}

impl<W: Write> Writer<W> {
    /// Create a writer with the default 128 KiB frame limit.
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    pub fn with_config(sink: W, config: WriterConfig) -> Self {
        Self {
            stream: Stream::Idle(CountingWriter::new(sink)),
            config,
            index: Index::default(),
            input_size: 0,
            closed: false,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Frames sealed so far.
    pub fn frame_count(&self) -> usize {
        self.index.frames.len()
    }

    /// Blocks written so far.
    pub fn block_count(&self) -> usize {
        self.index.blocks.len()
    }

    /// Write `block` as the next block.
    pub fn write_block(&mut self, block: &[u8]) -> Result<()> {
        let mut src = block;
        self.write_block_from(&mut src).map(|_| ())
    }

    /// Copy everything `src` yields into the next block. Returns the block length.
    ///
    /// If the copy fails part way, the bytes already copied cannot be taken
    /// back out of the frame, so the writer is closed and no index is written.
    pub fn write_block_from(&mut self, src: &mut impl Read) -> Result<u64> {
        if self.closed {
            return Err(Error::Closed);
        }

        if let Stream::Frame(frame) = &mut self.stream {
            frame.write_all(BLOCK_SEP)?;
            self.input_size += BLOCK_SEP.len() as u64;
            if self.input_size >= self.config.frame_limit {
                self.seal_frame()?;
            }
        }
        if !matches!(self.stream, Stream::Frame(_)) {
            self.begin_frame()?;
        }
        let Stream::Frame(frame) = &mut self.stream else {
            return Err(Error::Closed);
        };

        let length = match io::copy(src, frame) {
            Ok(length) => length,
            Err(e) => {
                self.closed = true;
                return Err(e.into());
            }
        };
        self.index.blocks.push(BlockEntry::new(
            self.index.frames.len(),
            self.input_size,
            length,
        ));
        self.input_size += length;
        Ok(length)
    }

    /// Seal the open frame and append the index trailer.
    ///
    /// A second call returns [`Error::Closed`]. If sealing the last frame fails
    /// no trailer is written.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if matches!(self.stream, Stream::Frame(_)) {
            self.seal_frame()?;
        }
        self.closed = true;
        let Stream::Idle(sink) = &mut self.stream else {
            return Err(Error::Closed);
        };

        let mut blob = BytesMut::new();
        self.index.encode(&mut blob);
        write_trailer(&blob, &mut sink.inner)?;
        sink.inner.flush()?;

        tracing::debug!(
            frames = self.index.frames.len(),
            blocks = self.index.blocks.len(),
            index_len = blob.len(),
            "closed archive"
        );
        Ok(())
    }

    /// Consume the writer and return the sink.
    ///
    /// Call [`close`](Writer::close) first; a frame still open here is
    /// finished, but the archive gets no index. Returns `None` if the sink was
    /// lost to a failed frame, or if finishing the open frame fails here.
    pub fn into_inner(self) -> Option<W> {
        match self.stream {
            Stream::Idle(sink) => Some(sink.inner),
            Stream::Frame(frame) => frame.finish().ok().map(|sink| sink.inner),
            Stream::Lost => None,
        }
    }

    fn begin_frame(&mut self) -> Result<()> {
        match mem::replace(&mut self.stream, Stream::Lost) {
            Stream::Idle(mut sink) => {
                sink.count = 0;
                self.input_size = 0;
                self.stream = Stream::Frame(GzEncoder::new(sink, self.config.compression()));
                Ok(())
            }
            other => {
                self.stream = other;
                Err(Error::Closed)
            }
        }
    }

    fn seal_frame(&mut self) -> Result<()> {
        let Stream::Frame(frame) = mem::replace(&mut self.stream, Stream::Lost) else {
            return Err(Error::Closed);
        };
        let sink = match frame.finish() {
            Ok(sink) => sink,
            Err(e) => {
                self.closed = true;
                return Err(e.into());
            }
        };

        tracing::debug!(
            frame = self.index.frames.len(),
            compressed = sink.count,
            uncompressed = self.input_size,
            "sealed frame"
        );
        self.index.frames.push(sink.count);
        self.input_size = 0;
        self.stream = Stream::Idle(sink);
        Ok(())
    }
}

/// Passes writes through to `inner`, counting the bytes accepted.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
