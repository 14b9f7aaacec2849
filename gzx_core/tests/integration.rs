/// Integration tests: archives written by `Writer` must read back block by
/// block through `Reader`, and must stay plain gzip to any other decoder.
use std::io::{Read, Write};

use flate2::read::MultiGzDecoder;

use gzx_core::{BlockEntry, BlockReader, Error, Reader, Writer, WriterConfig, BLOCK_SEP};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Deterministic text-like blocks of varying length, never empty.
fn log_blocks(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let lines = 1 + i * 7 % 13;
            let mut block = Vec::new();
            for j in 0..lines {
                writeln!(block, "entry {i} line {j}: GET /api/v1/items/{} 200", i * 31 + j)
                    .unwrap();
            }
            block.pop();
            block
        })
        .collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn write_archive(blocks: &[Vec<u8>], frame_limit: u64) -> Vec<u8> {
    let mut w = Writer::with_config(Vec::new(), WriterConfig::default().frame_limit(frame_limit));
    for block in blocks {
        w.write_block(block).unwrap();
    }
    w.close().unwrap();
    w.into_inner().unwrap()
}

fn read_all(br: &mut BlockReader<'_, &[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    br.read_to_end(&mut out).unwrap();
    out
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_fresh_open() {
    let blocks = log_blocks(200);
    let data = write_archive(&blocks, 4096);

    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert_eq!(r.block_count(), blocks.len());
    assert!(r.frame_count() > 1);
    for (i, expected) in blocks.iter().enumerate() {
        let mut br = r.open_block(i, None).unwrap();
        assert_eq!(&read_all(&mut br), expected, "block {i}");
        br.close();
    }
}

#[test]
fn test_generic_gzip_sees_joined_blocks() {
    let blocks = log_blocks(64);
    let data = write_archive(&blocks, 2048);
    assert_eq!(gunzip(&data), blocks.join(&BLOCK_SEP[..]));
}

#[test]
fn test_frame_rollover_entries_consistent() {
    let limit = 1000;
    let blocks = log_blocks(120);
    let data = write_archive(&blocks, limit);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert!(r.frame_count() > 1);

    for frame in 0..r.frame_count() {
        let mut plain = Vec::new();
        r.open_frame(frame).unwrap().read_to_end(&mut plain).unwrap();

        let entries: Vec<&BlockEntry> = r.blocks().iter().filter(|b| b.frame == frame).collect();
        assert!(!entries.is_empty());
        assert_eq!(entries[0].offset, 0);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].offset, pair[0].end() + BLOCK_SEP.len() as u64);
        }
        let last = entries[entries.len() - 1];
        assert!(last.end() <= plain.len() as u64);
        if frame + 1 < r.frame_count() {
            // Sealed at the first boundary at or past the limit, separator last.
            assert_eq!(plain.len() as u64, last.end() + BLOCK_SEP.len() as u64);
            assert!(plain.len() as u64 >= limit);
            assert!(plain.ends_with(BLOCK_SEP));
        } else {
            assert_eq!(plain.len() as u64, last.end());
        }
    }
}

#[test]
fn test_reuse_matches_fresh_open() {
    let blocks = log_blocks(150);
    let data = write_archive(&blocks, 3000);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();

    // Increasing walk through every block on one reader.
    let mut br: Option<BlockReader<'_, &[u8]>> = None;
    for (i, expected) in blocks.iter().enumerate() {
        let mut reader = r.open_block(i, br.take()).unwrap();
        assert_eq!(&read_all(&mut reader), expected, "block {i}");
        br = Some(reader);
    }

    // Partially read blocks: the skip must land exactly on the next block.
    let mut reader = r.open_block(0, None).unwrap();
    for i in 1..blocks.len() {
        let mut head = [0u8; 3];
        let n = reader.read(&mut head).unwrap();
        assert!(n > 0);
        reader = r.open_block(i, Some(reader)).unwrap();
        assert_eq!(read_all(&mut reader), blocks[i], "block {i} after partial read");
        reader = r.open_block(i, Some(reader)).unwrap();
    }
}

#[test]
fn test_reuse_same_block_repeatedly() {
    let blocks = log_blocks(10);
    let data = write_archive(&blocks, 1 << 20);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert_eq!(r.frame_count(), 1);

    let mut reader = r.open_block(4, None).unwrap();
    for _ in 0..3 {
        assert_eq!(read_all(&mut reader), blocks[4]);
        // Same block again: the stream is now past its start, so it reopens.
        reader = r.open_block(4, Some(reader)).unwrap();
    }
    // Unread block can be skipped over without reading it.
    reader = r.open_block(7, Some(reader)).unwrap();
    assert_eq!(read_all(&mut reader), blocks[7]);
}

#[test]
fn test_reuse_backward_and_foreign_frame_jumps() {
    let blocks = log_blocks(80);
    let data = write_archive(&blocks, 1500);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert!(r.frame_count() > 2);

    let order = [40usize, 3, 79, 0, 41, 40, 12, 13, 60, 2];
    let mut reader = r.open_block(order[0], None).unwrap();
    for &i in &order {
        reader = r.open_block(i, Some(reader)).unwrap();
        assert_eq!(read_all(&mut reader), blocks[i], "block {i}");
    }

    // A reader from another archive is rebound to this one.
    let other_data = write_archive(&log_blocks(3), 1 << 20);
    let other = Reader::new(other_data.as_slice(), other_data.len() as u64).unwrap();
    let mut foreign = other.open_block(0, None).unwrap();
    let mut scratch = [0u8; 2];
    foreign.read_exact(&mut scratch).unwrap();
    let mut rebound = r.open_block(2, Some(foreign)).unwrap();
    assert_eq!(read_all(&mut rebound), blocks[2]);
}

#[test]
fn test_random_access_pseudo_random_blocks() {
    let blocks: Vec<Vec<u8>> = (0..24)
        .map(|i| pseudo_random_bytes(500 + i * 97, 0xDEAD_BEEF + i as u64))
        .collect();
    let data = write_archive(&blocks, 8 * 1024);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert_eq!(r.read_block(17).unwrap(), blocks[17]);
    assert_eq!(r.read_block(0).unwrap(), blocks[0]);
    assert_eq!(r.read_block(23).unwrap(), blocks[23]);
}

#[test]
fn test_two_block_scenario() {
    let blocks = vec![b"abc".to_vec(), b"defgh".to_vec()];
    let data = write_archive(&blocks, 1 << 20);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();

    assert_eq!(r.block_count(), 2);
    assert_eq!(r.block(0), Some(&BlockEntry::new(0, 0, 3)));
    assert_eq!(r.block(1), Some(&BlockEntry::new(0, 5, 5)));
    assert_eq!(gunzip(&data), b"abc\n\ndefgh");
}

#[test]
fn test_out_of_range_and_too_small() {
    let data = write_archive(&log_blocks(5), 1 << 20);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert!(matches!(r.open_block(5, None), Err(Error::NotFound { .. })));
    assert!(matches!(r.open_block(usize::MAX, None), Err(Error::NotFound { .. })));
    assert!(matches!(r.open_frame(1), Err(Error::NotFound { .. })));
    // The reader stays usable after a lookup failure.
    assert_eq!(r.read_block(4).unwrap(), log_blocks(5)[4]);

    let tiny = &data[..22];
    assert!(matches!(
        Reader::new(tiny, tiny.len() as u64),
        Err(Error::InvalidTrailer(_))
    ));
}

#[test]
fn test_plain_gzip_has_no_index() {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(b"an ordinary gzip file without a trailer").unwrap();
    let data = enc.finish().unwrap();
    assert!(matches!(
        Reader::new(data.as_slice(), data.len() as u64),
        Err(Error::InvalidTrailer(_))
    ));
}

#[test]
fn test_truncated_archive_is_rejected() {
    let data = write_archive(&log_blocks(20), 512);
    let cut = &data[..data.len() - 1];
    let err = Reader::new(cut, cut.len() as u64).err().unwrap();
    assert!(err.is_format(), "expected a format error, got {err}");
}

#[test]
fn test_close_twice_and_write_after_close() {
    let mut w = Writer::new(Vec::new());
    w.write_block(b"payload").unwrap();
    w.close().unwrap();
    assert!(matches!(w.close(), Err(Error::Closed)));
    assert!(matches!(w.write_block(b"more"), Err(Error::Closed)));

    let data = w.into_inner().unwrap();
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert_eq!(r.block_count(), 1);
}

#[test]
fn test_index_spanning_several_trailer_segments() {
    // ~30k blocks produce an index blob larger than one 65529-byte chunk.
    let blocks: Vec<Vec<u8>> = (0..30_000u32).map(|i| i.to_string().into_bytes()).collect();
    let data = write_archive(&blocks, 64 * 1024);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    assert_eq!(r.block_count(), blocks.len());

    let frames_end = r.frame_offset(r.frame_count() - 1).unwrap() + r.frames().last().unwrap();
    assert!(data.len() as u64 - frames_end > 2 * 65535);

    for i in [0, 1, 12_345, 29_999] {
        assert_eq!(r.read_block(i).unwrap(), blocks[i]);
    }
    assert_eq!(gunzip(&data), blocks.join(&BLOCK_SEP[..]));
}

#[test]
fn test_empty_blocks() {
    let blocks = vec![Vec::new(), b"middle".to_vec(), Vec::new()];
    let data = write_archive(&blocks, 1 << 20);
    let r = Reader::new(data.as_slice(), data.len() as u64).unwrap();
    for (i, expected) in blocks.iter().enumerate() {
        assert_eq!(&r.read_block(i).unwrap(), expected);
    }
    assert_eq!(gunzip(&data), b"\n\nmiddle\n\n");
}

#[test]
fn test_empty_last_frame_at_every_level() {
    let blocks = vec![pseudo_random_bytes(40, 3), Vec::new()];
    for level in 0..=9 {
        let config = WriterConfig::default().frame_limit(10).level(level);
        let mut w = Writer::with_config(Vec::new(), config);
        for block in &blocks {
            w.write_block(block).unwrap();
        }
        w.close().unwrap();
        let data = w.into_inner().unwrap();

        let r = Reader::new(data.as_slice(), data.len() as u64)
            .unwrap_or_else(|e| panic!("level {level}: {e}"));
        assert_eq!(r.frame_count(), 2, "level {level}");
        assert_eq!(r.block(1), Some(&BlockEntry::new(1, 0, 0)), "level {level}");
        assert_eq!(r.read_block(0).unwrap(), blocks[0], "level {level}");
        assert!(r.read_block(1).unwrap().is_empty(), "level {level}");
    }
}

#[test]
fn test_index_overflowing_uncompressed_size_is_rejected() {
    let mut archive = Vec::new();
    let mut blob = bytes::BytesMut::new();
    let index = gzx_core::Index {
        frames: vec![0],
        blocks: vec![BlockEntry::new(0, 0, i64::MAX as u64); 3],
    };
    index.encode(&mut blob);
    gzx_core::trailer::write_trailer(&blob, &mut archive).unwrap();

    assert!(matches!(
        Reader::new(archive.as_slice(), archive.len() as u64),
        Err(Error::MalformedIndex(_))
    ));
}

#[test]
fn test_file_backed_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocks.gz");
    let blocks = log_blocks(40);

    let file = std::fs::File::create(&path).unwrap();
    let config = WriterConfig::default().frame_limit(2048);
    let mut w = Writer::with_config(std::io::BufWriter::new(file), config);
    for block in &blocks {
        w.write_block_from(&mut block.as_slice()).unwrap();
    }
    w.close().unwrap();
    drop(w);

    let r = Reader::open(&path).unwrap();
    assert_eq!(r.block_count(), 40);
    let mut reader = r.open_block(0, None).unwrap();
    for (i, expected) in blocks.iter().enumerate() {
        reader = r.open_block(i, Some(reader)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(&out, expected);
    }
}
