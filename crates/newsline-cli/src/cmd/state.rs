//! `newsline state`: inspect or reset persisted first-seen numbers.

use crate::cmd::{StoreArgs, open_kv};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use clap::{Args, Subcommand};
use newsline_core::config::NewslineConfig;
use newsline_core::error::ErrorCode;
use newsline_core::sequence::{KvStore, LoadStatus, SequenceStore};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    #[command(
        about = "Show sequence state",
        long_about = "Show the persisted first-seen counter and how many stories have been seen.",
        after_help = "EXAMPLES:\n    # Summary\n    newsline state show\n\n\
                      # Every key, newest first-seen first\n    newsline state show --keys\n\n\
                      # Machine-readable output\n    newsline state show --json"
    )]
    Show(StateShowArgs),

    #[command(
        about = "Reset sequence state",
        long_about = "Replace the persisted sequence record with an empty one. The next \
                      ordering run numbers every story from 1 again.",
        after_help = "EXAMPLES:\n    # Start numbering from scratch\n    newsline state reset\n\n\
                      # Reset a SQLite state database\n    newsline state reset --backend sqlite"
    )]
    Reset(StateResetArgs),
}

#[derive(Args, Debug)]
pub struct StateShowArgs {
    /// List every key with its number.
    #[arg(long)]
    pub keys: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct StateResetArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Serialize)]
pub struct KeyEntry {
    pub key: String,
    pub sequence: u64,
}

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub backend: String,
    pub status: LoadStatus,
    pub counter: u64,
    pub keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<KeyEntry>>,
}

#[derive(Debug, Serialize)]
pub struct ResetReport {
    pub backend: String,
    pub reset: bool,
}

pub fn run_state(
    command: &StateCommand,
    config: &NewslineConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    match command {
        StateCommand::Show(args) => run_show(args, config, output, project_root),
        StateCommand::Reset(args) => run_reset(args, config, output, project_root),
    }
}

fn open_store(
    config: &NewslineConfig,
    project_root: &Path,
    args: &StoreArgs,
    output: OutputMode,
) -> anyhow::Result<SequenceStore<Box<dyn KvStore>>> {
    match open_kv(config, project_root, args) {
        Ok(kv) => Ok(SequenceStore::new(kv)),
        Err(err) => {
            render_error(output, &CliError::from_code(err.code(), &err))?;
            Err(err.into())
        }
    }
}

fn run_show(
    args: &StateShowArgs,
    config: &NewslineConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(config, project_root, &args.store, output)?;
    let (record, status) = store.inspect();

    if status == LoadStatus::Corrupt {
        render_error(
            output,
            &CliError::from_code(ErrorCode::StateCorrupt, store.kv().describe()),
        )?;
    }

    let entries: Option<Vec<KeyEntry>> = args.keys.then(|| {
        record
            .entries_newest_first()
            .into_iter()
            .map(|(key, sequence)| KeyEntry {
                key: key.to_string(),
                sequence,
            })
            .collect()
    });
    let report = StateReport {
        backend: store.kv().describe(),
        status,
        counter: record.counter,
        keys: record.len(),
        entries,
    };
    render_mode(output, &report, write_show_text, write_show_pretty)
}

fn run_reset(
    args: &StateResetArgs,
    config: &NewslineConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let mut store = open_store(config, project_root, &args.store, output)?;
    if let Err(err) = store.reset() {
        render_error(output, &CliError::from_code(err.code(), &err))?;
        return Err(err.into());
    }
    info!(backend = %store.kv().describe(), "sequence state reset");

    let report = ResetReport {
        backend: store.kv().describe(),
        reset: true,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "reset\t{}", r.backend),
        |r, w| writeln!(w, "Sequence state reset ({})", r.backend),
    )
}

fn status_label(status: LoadStatus) -> &'static str {
    match status {
        LoadStatus::Missing => "missing",
        LoadStatus::Loaded => "ok",
        LoadStatus::Repaired => "repaired",
        LoadStatus::Corrupt => "corrupt",
    }
}

fn write_show_text(report: &StateReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\tcounter={}\tkeys={}",
        report.backend,
        status_label(report.status),
        report.counter,
        report.keys
    )?;
    for entry in report.entries.iter().flatten() {
        writeln!(w, "{}\t{}", entry.sequence, entry.key)?;
    }
    Ok(())
}

fn write_show_pretty(report: &StateReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Sequence state")?;
    pretty_kv(w, "Backend", &report.backend)?;
    pretty_kv(w, "Status", status_label(report.status))?;
    pretty_kv(w, "Counter", report.counter.to_string())?;
    pretty_kv(w, "Keys", report.keys.to_string())?;
    if let Some(entries) = &report.entries {
        writeln!(w)?;
        pretty_section(w, "Keys (newest first)")?;
        for entry in entries {
            writeln!(w, "{:>8}  {}", entry.sequence, entry.key)?;
        }
    }
    Ok(())
}
