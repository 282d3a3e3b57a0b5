//! `hviz` — GC visualization driver.
//!
//! Runs the sample points-ledger workload against the instrumented heap
//! and writes the animation trace to stdout.  The collector policy is
//! picked on the command line, so one binary demonstrates every mode:
//!
//! ```text
//! hviz --gc mark-compact data/points.log-small > frames.js
//! hviz --gc copying --snapshots frames/ data/points.log-small
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use heapviz_core::error::HeapvizResult;
use heapviz_core::gc::collector::GcMode;
use heapviz_core::gc::heap::Heap;
use heapviz_core::gc::trace::TraceSink;
use heapviz_core::workload;

/// Collector policy flag.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Never collect; heap exhaustion is fatal.
    None,
    /// Eager reference counting (cycles leak).
    RefCount,
    /// Mark live objects, free the dead in place.
    MarkSweep,
    /// Mark, then slide live objects downward.
    MarkCompact,
    /// Cheney-style semi-space evacuation.
    Copying,
}

impl From<Mode> for GcMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::None => GcMode::None,
            Mode::RefCount => GcMode::RefCount,
            Mode::MarkSweep => GcMode::MarkSweep,
            Mode::MarkCompact => GcMode::MarkCompact,
            Mode::Copying => GcMode::Copying,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "hviz",
    version,
    about = "Visualize garbage collection over a toy heap",
    long_about = "Runs a log-crunching workload (parse, group, reduce, rank) against a \
                  2000-word managed heap and emits a trace of every heap event for the \
                  animation renderer."
)]
struct Cli {
    /// Input ledger, one `amount,person,thing` record per line
    #[arg(default_value = "data/points.log-small")]
    input: PathBuf,

    /// Collector policy to demonstrate
    #[arg(long, value_enum, default_value = "mark-sweep")]
    gc: Mode,

    /// Write per-event XPM frames into this directory
    #[arg(long, value_name = "DIR")]
    snapshots: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hviz: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> HeapvizResult<()> {
    let file = File::open(&cli.input)?;
    let mut sink = TraceSink::new(Box::new(std::io::stdout().lock()));
    if let Some(dir) = cli.snapshots {
        std::fs::create_dir_all(&dir)?;
        sink.enable_snapshots(dir);
    }
    log::info!("collector: {:?}, input: {}", cli.gc, cli.input.display());
    let heap = Heap::new_shared(cli.gc.into(), sink);
    workload::run(&heap, BufReader::new(file))
}
