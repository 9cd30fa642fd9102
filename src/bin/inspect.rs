//! LodeStream Inspect
//!
//! Prints a visual representation of a stream's regions and entries.
//! Opens an existing stream file, or creates one if the path is absent;
//! can optionally allocate a region and append payloads before printing,
//! which makes it a quick way to poke at a stream from the shell.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lodestream::{Config, Region, Stream};

/// LodeStream inspection tool
#[derive(Parser, Debug)]
#[command(name = "lodestream-inspect")]
#[command(about = "Inspect (and optionally fill) a LodeStream file")]
struct Args {
    /// Stream file; created with --size bytes if it does not exist
    file: PathBuf,

    /// Stream size when creating a fresh file (bytes)
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    size: u64,

    /// Block granularity when creating a fresh file (bytes, power of two)
    #[arg(long, default_value_t = 4096)]
    block_size: u64,

    /// Allocate a region with this entry capacity before printing
    #[arg(long)]
    region_size: Option<u64>,

    /// Append a payload to the last region (repeatable; allocates a region
    /// if the stream has none)
    #[arg(long)]
    append: Vec<String>,

    /// Print payloads as text instead of hex
    #[arg(long)]
    as_text: bool,
}

fn main() -> lodestream::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .block_size(args.block_size)
        .stream_size(args.size)
        .build();
    let stream = Stream::open_file(&args.file, &config)?;

    if let Some(capacity) = args.region_size {
        stream.region_allocate(capacity)?;
    }

    if !args.append.is_empty() {
        let region = match stream.regions().last() {
            Some(region) => region,
            None => stream.region_allocate(64 * 1024)?,
        };
        for payload in &args.append {
            stream.append(region, payload.as_bytes())?;
        }
    }

    print_tree(&stream, args.as_text)?;

    stream.close()
}

/// Render the stream as a tree, one line per region and entry
fn print_tree(stream: &Stream, as_text: bool) -> lodestream::Result<()> {
    let report = stream.recovery_report();
    println!(
        "stream: {} bytes, block size {}, {} region(s) ({} recovered entries, {} truncated)",
        stream.total_size(),
        stream.block_size(),
        stream.region_count(),
        report.entries_recovered,
        report.regions_truncated,
    );

    for (index, region) in stream.regions().enumerate() {
        print_region(stream, index, region, as_text)?;
    }

    Ok(())
}

fn print_region(
    stream: &Stream,
    index: usize,
    region: Region,
    as_text: bool,
) -> lodestream::Result<()> {
    println!(
        "├── region{}: offset {:#x}, generation {}, {} bytes capacity",
        index,
        region.offset(),
        region.generation(),
        stream.region_size(region)?,
    );

    for entry in stream.entries(region)? {
        let data = stream.entry_data(&entry)?;
        print!("│   ├── {:#06x} {:4} bytes  ", entry.offset(), entry.length());
        if as_text {
            println!("{}", String::from_utf8_lossy(data));
        } else {
            for byte in data {
                print!("{:02X} ", byte);
            }
            println!();
        }
    }

    Ok(())
}
