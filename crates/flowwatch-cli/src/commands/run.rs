//! Detection run over a capture directory

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Args;
use flowwatch_ids::{
    run_concurrent, AlarmSink, DirectorySource, IdsConfig, IdsEngine, JsonLinesSink,
};
use tracing::info;

use crate::error::{CliError, CliResult};

/// Arguments of `flowwatch run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory (or single file) of capture text
    #[arg(short, long)]
    pub indir: PathBuf,

    /// Write JSON-lines events here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run each detector group on its own task
    #[arg(long)]
    pub concurrent: bool,
}

/// Totals reported at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records: u64,
    pub dropped: u64,
    pub events: u64,
    pub alarms: u64,
}

fn open_output(path: Option<&PathBuf>) -> CliResult<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(File::create(p)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

/// Execute a run
pub async fn execute(args: RunArgs, config: &IdsConfig) -> CliResult<RunSummary> {
    if !args.indir.exists() {
        return Err(CliError::InvalidInput(format!(
            "{} does not exist",
            args.indir.display()
        )));
    }

    let mut engine = IdsEngine::from_config(config)?;
    let mut source = DirectorySource::open(&args.indir)?;
    let mut sink = JsonLinesSink::new(open_output(args.output.as_ref())?);

    if args.concurrent {
        let (events, drained) =
            run_concurrent(engine.into_schedulers(), source, config.channel_capacity).await?;
        source = drained;
        for event in events {
            sink.emit(event)?;
        }
        sink.flush()?;
    } else {
        engine.run(&mut source, &mut sink)?;
    }

    let stats = source.stats();
    let summary = RunSummary {
        records: stats.records,
        dropped: stats.dropped,
        events: sink.written(),
        alarms: sink.alarms(),
    };
    info!(
        files = stats.files,
        records = summary.records,
        dropped = summary.dropped,
        events = summary.events,
        alarms = summary.alarms,
        "run complete"
    );
    Ok(summary)
}
