//! Replays a memory trace through a [`tagsim::tagmemory::TagMemory`],
//! printing periodic reports. Trace parsing, CLI argument handling, and
//! periodic reporting are explicitly the driver's concern, not the core's.

use clap::Parser;
use log::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use tagsim::tagmemory::{Request, TagMemory, TagOptions};
use tagsim::trace::parse_row;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Replay a CHERI-style tag cache memory trace against the tag-memory model.
#[derive(Parser, Debug)]
#[command(name = "tagsim-replay", version = VERSION)]
struct Args {
    /// Memory trace to replay, in csv format. Reads stdin if omitted.
    input: Option<PathBuf>,

    /// Turn on verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Number of report periods to run before terminating the simulation.
    #[arg(long = "report-periods", default_value_t = 100_000)]
    report_periods: u64,

    /// Number of requests to replay between each report line.
    #[arg(long = "report-period", default_value_t = 100_000)]
    report_period: u64,

    /// Tag cache size, in bytes.
    #[arg(long = "tag-cache-size", default_value_t = 1 << 16)]
    tag_cache_size: usize,

    /// Tag cache associativity.
    #[arg(long = "tag-cache-assoc", default_value_t = 4)]
    tag_cache_assoc: usize,

    /// Tag cache line size, in bits.
    #[arg(long = "tag-cache-line-size", default_value_t = 1024)]
    tag_cache_line_size: usize,

    /// Grouping factors describing the tag table from leaf to root.
    #[arg(long = "tag-cache-struct", num_args = 1.., default_values_t = vec![0, 256])]
    tag_cache_struct: Vec<u32>,

    /// Track spatial vs. temporal cache hits (slows down the simulation).
    #[arg(long = "tag-cache-count-spatial-temporal")]
    spatial_temporal: bool,

    /// Skip the memory read/writeback of a subtree being created/destroyed
    /// empty.
    #[arg(long = "tag-cache-create-destroy-empty")]
    empty_leaf_opt: bool,

    /// Keep a cached line clean when a write doesn't change its value.
    #[arg(long = "tag-cache-non-dirty-writes")]
    non_dirty_writes: bool,

    /// Address at which the simulated memory window starts.
    #[arg(long = "memory-start-addr", default_value_t = 1u64 << 31)]
    memory_start_addr: u64,

    /// Size of the simulated memory window, in bytes.
    #[arg(long = "memory-size", default_value_t = 1u64 << 29)]
    memory_size: u64,
}

fn options_from(args: &Args) -> TagOptions {
    let mut options = TagOptions::empty();
    options.set(TagOptions::SPATIAL_TEMPORAL, args.spatial_temporal);
    options.set(TagOptions::EMPTY_LEAF_OPT, args.empty_leaf_opt);
    options.set(TagOptions::NON_DIRTY_WRITES, args.non_dirty_writes);
    options
}

fn open_input(path: &Option<PathBuf>) -> io::Result<Box<dyn BufRead>> {
    match path {
        Some(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn config_banner(args: &Args) -> String {
    format!(
        "cachesize={} bytes\ncacheassoc={}\ncachelinesize={} bits\ntablestruct={:?}\n\
         memstart={:#x}\nmemsize={} bytes\nspatial_temporal={}\n\
         create_destroy_empty={}\nnon_dirty_writes={}",
        args.tag_cache_size,
        args.tag_cache_assoc,
        args.tag_cache_line_size,
        args.tag_cache_struct,
        args.memory_start_addr,
        args.memory_size,
        args.spatial_temporal,
        args.empty_leaf_opt,
        args.non_dirty_writes,
    )
}

fn run(args: Args) -> io::Result<()> {
    let options = options_from(&args);
    info!("setting up tag cache model with the following parameters");
    if args.verbose {
        eprintln!("tag cache model parameters:");
        eprint!("{}", textwrap::indent(&config_banner(&args), "  "));
        eprintln!();
    }

    let mut tagmem = TagMemory::new(
        args.tag_cache_size,
        args.tag_cache_assoc,
        args.tag_cache_line_size,
        &args.tag_cache_struct,
        args.memory_start_addr,
        args.memory_size,
        options,
    );

    let input = open_input(&args.input)?;
    let mut reports = 0u64;

    // Report periods are counted against the raw trace line index, matching
    // the original driver: a size-filtered row still advances `i`.
    for (i, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stopping replay: {}", e);
                break;
            }
        };

        if let Some(row) = parse_row(&line) {
            if row.size == 64 {
                tagmem.put_req(Request { write: row.write, addr: row.addr, tags: row.tags });
            }
        }

        if (i as u64) % args.report_period == 0 {
            reports += 1;
            println!("{}", tagmem.report());
        }

        if reports > args.report_periods {
            break;
        }
    }

    info!("simulation complete after {} report periods", reports);
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
            eprintln!("tagsim-replay: {}", e);
            ExitCode::FAILURE
        }
    }
}
