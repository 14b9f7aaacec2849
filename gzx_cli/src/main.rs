use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use gzx_core::{BlockEntry, BlockReader, Reader, Writer, WriterConfig, BLOCK_SEP};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "gzx",
    about = "Seekable gzip block archives: pack, inspect, and randomly access blocks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files into an archive, one block per file
    Pack {
        /// Destination archive
        output: PathBuf,
        /// Source files ("-" reads stdin)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Split each input on blank lines ("\n\n") into several blocks
        #[arg(short, long)]
        split: bool,
        /// JSON file with writer settings ({"frame_limit": ..., "level": ...})
        #[arg(long)]
        config: Option<PathBuf>,
        /// Uncompressed bytes per frame before rolling over (default: 131072)
        #[arg(short, long)]
        frame_limit: Option<u64>,
        /// Deflate level 0-9 (default: 6)
        #[arg(short, long)]
        level: Option<u32>,
    },
    /// Decompress the whole archive, exactly as any gzip tool would
    Unpack {
        /// Source archive
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print frame and block table statistics
    Inspect {
        /// Archive to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
        /// Print the tables as JSON
        #[arg(long, conflicts_with = "blocks")]
        json: bool,
    },
    /// Decompress a single block by index
    ///
    /// Only the frame holding the block is read, and only up to the block's end.
    ReadBlock {
        /// Archive
        file: PathBuf,
        /// Zero-based block index to read
        #[arg(short, long)]
        index: usize,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Benchmark random block reads, then a sequential pass reusing one reader
    Bench {
        /// Archive
        file: PathBuf,
        /// Number of random blocks to read
        #[arg(short, long, default_value_t = 1000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn writer_config(
    path: Option<&Path>,
    frame_limit: Option<u64>,
    level: Option<u32>,
) -> anyhow::Result<WriterConfig> {
    let mut config = match path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening config file {:?}", path))?;
            serde_json::from_reader::<_, WriterConfig>(BufReader::new(file))
                .with_context(|| format!("parsing config file {:?}", path))?
        }
        None => WriterConfig::default(),
    };
    if let Some(frame_limit) = frame_limit {
        config = config.frame_limit(frame_limit);
    }
    if let Some(level) = level {
        config = config.level(level);
    }
    anyhow::ensure!(config.frame_limit > 0, "frame limit must be positive");
    Ok(config)
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    if path.to_str() == Some("-") {
        io::stdin().lock().read_to_end(&mut data)?;
    } else {
        File::open(path)
            .with_context(|| format!("opening input file {:?}", path))?
            .read_to_end(&mut data)?;
    }
    Ok(data)
}

/// Split `data` on every occurrence of the block separator.
fn split_blocks(data: &[u8]) -> Vec<&[u8]> {
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + BLOCK_SEP.len() <= data.len() {
        if &data[i..i + BLOCK_SEP.len()] == BLOCK_SEP {
            blocks.push(&data[start..i]);
            i += BLOCK_SEP.len();
            start = i;
        } else {
            i += 1;
        }
    }
    blocks.push(&data[start..]);
    blocks
}

fn open_archive(file: &Path) -> anyhow::Result<Reader<File>> {
    Reader::open(file).with_context(|| format!("opening archive {:?}", file))
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_pack(
    output: PathBuf,
    inputs: Vec<PathBuf>,
    split: bool,
    config: WriterConfig,
) -> anyhow::Result<()> {
    tracing::debug!(?config, "packing");
    let file =
        File::create(&output).with_context(|| format!("creating output file {:?}", output))?;
    let mut writer = Writer::with_config(BufWriter::new(file), config);

    let t0 = Instant::now();
    let mut raw = 0u64;
    for input in &inputs {
        let data = read_input(input)?;
        raw += data.len() as u64;
        if split {
            for block in split_blocks(&data) {
                writer.write_block(block)?;
            }
        } else {
            writer.write_block(&data)?;
        }
    }
    writer.close()?;
    let elapsed = t0.elapsed();
    let (frames, blocks) = (writer.frame_count(), writer.block_count());
    drop(writer);

    let compressed = std::fs::metadata(&output)?.len();
    eprintln!("  frame limit : {}", human_bytes(config.frame_limit));
    eprintln!("  level       : {}", config.level);
    eprintln!("  frames      : {}", frames);
    eprintln!("  blocks      : {}", blocks);
    eprintln!("  raw size    : {}", human_bytes(raw));
    eprintln!("  compressed  : {}", human_bytes(compressed));
    eprintln!("  ratio       : {:.2}x", raw as f64 / compressed as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_unpack(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let file = File::open(&input).with_context(|| format!("opening archive {:?}", input))?;
    let mut src = MultiGzDecoder::new(BufReader::new(file));

    let mut dst: Box<dyn Write> = if output.to_str() == Some("-") {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        ))
    };

    let t0 = Instant::now();
    let total = io::copy(&mut src, &mut dst)?;
    dst.flush()?;
    let elapsed = t0.elapsed();

    eprintln!("  raw size    : {}", human_bytes(total));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

#[derive(Serialize)]
struct InspectReport<'a> {
    file_size: u64,
    uncompressed_size: u64,
    frame_table: &'a [u64],
    block_table: &'a [BlockEntry],
}

fn run_inspect(file: PathBuf, show_blocks: bool, json: bool) -> anyhow::Result<()> {
    let reader = open_archive(&file)?;
    let file_size = reader.get_ref().metadata()?.len();

    if json {
        let report = InspectReport {
            file_size,
            uncompressed_size: reader.uncompressed_size(),
            frame_table: reader.frames(),
            block_table: reader.blocks(),
        };
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    let frames_size: u64 = reader.frames().iter().sum();
    println!("=== gzx archive: {:?} ===", file);
    println!();
    println!("  frames         : {}", reader.frame_count());
    println!("  blocks         : {}", reader.block_count());
    println!("  uncompressed   : {}", human_bytes(reader.uncompressed_size()));
    println!("  frame data     : {}", human_bytes(frames_size));
    println!("  index trailer  : {}", human_bytes(file_size - frames_size));
    println!("  file on disk   : {}", human_bytes(file_size));
    if frames_size > 0 {
        println!(
            "  ratio          : {:.2}x",
            reader.uncompressed_size() as f64 / frames_size as f64
        );
    }

    if show_blocks {
        println!();
        println!(
            "  {:>8}  {:>6}  {:>14}  {:>12}  {:>12}",
            "block", "frame", "frame offset", "offset", "length"
        );
        println!("  {}", "-".repeat(60));
        for (i, b) in reader.blocks().iter().enumerate() {
            println!(
                "  {:>8}  {:>6}  {:>14}  {:>12}  {:>12}",
                i,
                b.frame,
                reader.frame_offset(b.frame).unwrap_or_default(),
                b.offset,
                b.length
            );
        }
    }

    Ok(())
}

fn run_read_block(file: PathBuf, index: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let reader = open_archive(&file)?;
    if let Some(block) = reader.block(index) {
        eprintln!(
            "block {} lives in frame {} (file offset {}), {} bytes into the frame",
            index,
            block.frame,
            reader.frame_offset(block.frame).unwrap_or_default(),
            block.offset
        );
    }

    let t0 = Instant::now();
    let raw = reader.read_block(index)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} in {:.3}ms",
        human_bytes(raw.len() as u64),
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            // Print a hex dump of the first 256 bytes
            let preview = &raw[..raw.len().min(256)];
            println!(
                "--- block {} ({} bytes, first {} shown) ---",
                index,
                raw.len(),
                preview.len()
            );
            for (i, chunk) in preview.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in chunk {
                    print!("{:02x} ", b);
                }
                for _ in chunk.len()..16 {
                    print!("   ");
                }
                print!("  |");
                for b in chunk {
                    if b.is_ascii_graphic() || *b == b' ' {
                        print!("{}", *b as char);
                    } else {
                        print!(".");
                    }
                }
                println!("|");
            }
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }

    Ok(())
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let i = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[i]
}

fn run_bench(file: PathBuf, count: u64, seed: u64) -> anyhow::Result<()> {
    let reader = open_archive(&file)?;
    let block_count = reader.block_count() as u64;
    anyhow::ensure!(block_count > 0, "archive has no blocks");
    anyhow::ensure!(count > 0, "count must be positive");

    // Simple LCG for reproducible random block indices (no external dep)
    let indices: Vec<usize> = {
        let mut rng = seed;
        (0..count)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((rng >> 33) % block_count) as usize
            })
            .collect()
    };

    eprintln!(
        "benchmarking {} random block reads across {} blocks in {} frames...",
        count,
        block_count,
        reader.frame_count()
    );

    let t0 = Instant::now();
    let mut total_raw = 0u64;
    let mut latencies_us: Vec<u64> = Vec::with_capacity(count as usize);
    for &idx in &indices {
        let t = Instant::now();
        let mut block = reader.open_block(idx, None)?;
        total_raw += io::copy(&mut block, &mut io::sink())?;
        latencies_us.push(t.elapsed().as_micros() as u64);
    }
    let random_elapsed = t0.elapsed();
    latencies_us.sort_unstable();

    // Sequential pass, handing the same reader back each time.
    let t0 = Instant::now();
    let mut sequential_raw = 0u64;
    let mut block: Option<BlockReader<'_, File>> = None;
    for idx in 0..reader.block_count() {
        let mut br = reader.open_block(idx, block.take())?;
        sequential_raw += io::copy(&mut br, &mut io::sink())?;
        block = Some(br);
    }
    let sequential_elapsed = t0.elapsed();

    println!();
    println!("=== Random Block Access Benchmark ===");
    println!("  blocks read : {}", count);
    println!("  total raw   : {}", human_bytes(total_raw));
    println!("  elapsed     : {:.3}s", random_elapsed.as_secs_f64());
    println!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / random_elapsed.as_secs_f64()) as u64)
    );
    println!("  latency:");
    println!("    min  : {} µs", latencies_us[0]);
    println!("    p50  : {} µs", percentile(&latencies_us, 0.50));
    println!("    p95  : {} µs", percentile(&latencies_us, 0.95));
    println!("    p99  : {} µs", percentile(&latencies_us, 0.99));
    println!("    max  : {} µs", latencies_us[latencies_us.len() - 1]);
    println!();
    println!("=== Sequential Pass (reused reader) ===");
    println!("  blocks read : {}", block_count);
    println!("  total raw   : {}", human_bytes(sequential_raw));
    println!("  elapsed     : {:.3}s", sequential_elapsed.as_secs_f64());
    println!(
        "  per block   : {:.1} µs",
        sequential_elapsed.as_secs_f64() * 1e6 / block_count as f64
    );

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            output,
            inputs,
            split,
            config,
            frame_limit,
            level,
        } => {
            let config = writer_config(config.as_deref(), frame_limit, level)?;
            run_pack(output, inputs, split, config)
        }
        Commands::Unpack { input, output } => run_unpack(input, output),
        Commands::Inspect { file, blocks, json } => run_inspect(file, blocks, json),
        Commands::ReadBlock {
            file,
            index,
            output,
        } => run_read_block(file, index, output),
        Commands::Bench { file, count, seed } => run_bench(file, count, seed),
    }
}
