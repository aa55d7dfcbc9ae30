pub mod keys;
pub mod order;
pub mod state;

use crate::output::{CliError, OutputMode, render_error};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use newsline_core::config::{NewslineConfig, StoreBackend};
use newsline_core::error::{ErrorCode, StoreError};
use newsline_core::model::{FeedSnapshot, RawItem};
use newsline_core::sequence::{FileKv, KvStore, MemoryKv, SqliteKv};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Backend selector for `--backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    File,
    Sqlite,
    Memory,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::File => Self::File,
            BackendArg::Sqlite => Self::Sqlite,
            BackendArg::Memory => Self::Memory,
        }
    }
}

/// Flags selecting where sequence state lives.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Sequence state backend (overrides `[store] backend`).
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Sequence state path (overrides `[store] path`).
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,
}

impl StoreArgs {
    /// Backend and resolved state path after applying overrides.
    pub fn resolve(&self, config: &NewslineConfig, project_root: &Path) -> (StoreBackend, PathBuf) {
        let backend = self.backend.map_or(config.store.backend, StoreBackend::from);
        let path = match &self.state {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_root.join(path),
            None => config.store.resolved_path(project_root, backend),
        };
        (backend, path)
    }
}

/// Open the configured key-value backend.
pub fn open_kv(
    config: &NewslineConfig,
    project_root: &Path,
    args: &StoreArgs,
) -> Result<Box<dyn KvStore>, StoreError> {
    let (backend, path) = args.resolve(config, project_root);
    let timeout = config.store.lock_timeout();
    Ok(match backend {
        StoreBackend::File => Box::new(FileKv::new(path, timeout)),
        StoreBackend::Sqlite => Box::new(SqliteKv::open(path, timeout)?),
        StoreBackend::Memory => Box::new(MemoryKv::default()),
    })
}

/// Read a feed from a path, or from stdin when `input` is `-`.
pub fn read_feed(input: &str, project_root: &Path, output: OutputMode) -> anyhow::Result<FeedSnapshot> {
    let raw = match read_input(input, project_root) {
        Ok(raw) => raw,
        Err(err) => {
            render_error(output, &CliError::from_code(ErrorCode::FeedUnreadable, &err))?;
            return Err(err).with_context(|| format!("read feed {input}"));
        }
    };

    match FeedSnapshot::from_json(&raw) {
        Ok(snapshot) => Ok(snapshot),
        Err(err) => {
            render_error(output, &CliError::from_code(ErrorCode::FeedParseError, &err))?;
            Err(err).with_context(|| format!("parse feed {input}"))
        }
    }
}

fn read_input(input: &str, project_root: &Path) -> std::io::Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    let path = Path::new(input);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    std::fs::read_to_string(path)
}

/// Publication time as RFC 3339, or `-` when unknown.
pub fn published_label(item: &RawItem) -> String {
    match item.published_millis() {
        0 => "-".to_string(),
        millis => DateTime::<Utc>::from_timestamp_millis(millis)
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339()),
    }
}

/// Single-line cell value; tabs and newlines would break text rows.
pub fn cell(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(
            || "-".to_string(),
            |v| v.replace(['\t', '\n', '\r'], " "),
        )
}
