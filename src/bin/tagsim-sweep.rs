//! Runs one trace through a small matrix of tag-cache configurations and
//! prints one summary row per configuration, without any incremental-build
//! or job-graph machinery to decide which configurations are stale.
//!
//! Each configuration gets its own independent [`TagMemory`]; the core is
//! not safe to share across a sweep, so this binary runs the configurations
//! sequentially rather than reaching for a thread pool.

use clap::Parser;
use log::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use tagsim::tagmemory::{Request, TagMemory, TagOptions};
use tagsim::trace::parse_row;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sweep a trace across the optimisation matrix (empty-leaf x non-dirty).
#[derive(Parser, Debug)]
#[command(name = "tagsim-sweep", version = VERSION)]
struct Args {
    /// Memory trace to replay against every configuration in the sweep.
    input: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long = "tag-cache-size", default_value_t = 1 << 16)]
    tag_cache_size: usize,

    #[arg(long = "tag-cache-assoc", default_value_t = 4)]
    tag_cache_assoc: usize,

    #[arg(long = "tag-cache-line-size", default_value_t = 1024)]
    tag_cache_line_size: usize,

    #[arg(long = "tag-cache-struct", num_args = 1.., default_values_t = vec![0, 256])]
    tag_cache_struct: Vec<u32>,

    #[arg(long = "memory-start-addr", default_value_t = 1u64 << 31)]
    memory_start_addr: u64,

    #[arg(long = "memory-size", default_value_t = 1u64 << 29)]
    memory_size: u64,
}

struct SweepPoint {
    label: &'static str,
    options: TagOptions,
}

fn sweep_matrix() -> Vec<SweepPoint> {
    vec![
        SweepPoint { label: "baseline", options: TagOptions::empty() },
        SweepPoint { label: "empty-leaf-opt", options: TagOptions::EMPTY_LEAF_OPT },
        SweepPoint { label: "non-dirty-writes", options: TagOptions::NON_DIRTY_WRITES },
        SweepPoint {
            label: "both-opts",
            options: TagOptions::EMPTY_LEAF_OPT | TagOptions::NON_DIRTY_WRITES,
        },
    ]
}

fn replay_once(args: &Args, options: TagOptions) -> io::Result<TagMemory> {
    let mut tagmem = TagMemory::new(
        args.tag_cache_size,
        args.tag_cache_assoc,
        args.tag_cache_line_size,
        &args.tag_cache_struct,
        args.memory_start_addr,
        args.memory_size,
        options,
    );

    let reader = BufReader::new(File::open(&args.input)?);
    for line in reader.lines() {
        let line = line?;
        if let Some(row) = parse_row(&line) {
            if row.size == 64 {
                tagmem.put_req(Request { write: row.write, addr: row.addr, tags: row.tags });
            }
        }
    }
    Ok(tagmem)
}

fn run(args: Args) -> io::Result<()> {
    println!("config,cacheHits,cacheMisses,cacheWritebacks,totalMemTransactions");
    for point in sweep_matrix() {
        info!("sweeping configuration {}", point.label);
        let mut tagmem = replay_once(&args, point.options)?;
        let report = tagmem.report();
        println!(
            "{},{},{},{},{}",
            point.label,
            tagmem.cache_hits(),
            tagmem.cache_misses(),
            tagmem.cache_writebacks(),
            tagmem.total_mem_transactions,
        );
        debug!("{}", report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tagsim-sweep: {}", e);
            ExitCode::FAILURE
        }
    }
}
