//! `newsline keys`: show the identity key each feed item resolves to.

use crate::cmd::{cell, read_feed};
use crate::output::{OutputMode, pretty_rule, render_mode};
use clap::Args;
use newsline_core::config::NewslineConfig;
use newsline_core::identity::IdentityResolver;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

#[derive(Args, Debug)]
#[command(
    about = "Show identity keys for a feed",
    long_about = "Resolve the identity key of every item in a feed without touching \
                  sequence state. Items sharing a key are treated as the same story.",
    after_help = "EXAMPLES:\n    # Inspect keys\n    newsline keys feed.json\n\n\
                  # Only items that collide with another item\n    newsline keys feed.json --duplicates\n\n\
                  # Machine-readable output\n    newsline keys feed.json --json"
)]
pub struct KeysArgs {
    /// Feed file, or `-` for stdin.
    #[arg(value_name = "FILE")]
    pub input: String,

    /// Only show items whose key is shared with another item.
    #[arg(long)]
    pub duplicates: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyRow {
    pub index: usize,
    pub key: String,
    pub signal: &'static str,
    pub group_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeysOutput {
    pub count: usize,
    pub distinct: usize,
    pub items: Vec<KeyRow>,
}

pub fn run_keys(
    args: &KeysArgs,
    config: &NewslineConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let snapshot = read_feed(&args.input, project_root, output)?;
    let resolver = IdentityResolver::new(&config.identity);

    let resolved: Vec<_> = snapshot
        .items
        .iter()
        .map(|item| resolver.resolve_explained(item))
        .collect();
    let mut group_sizes: HashMap<&str, usize> = HashMap::new();
    for (key, _) in &resolved {
        *group_sizes.entry(key.as_str()).or_default() += 1;
    }

    let rows: Vec<KeyRow> = snapshot
        .items
        .iter()
        .zip(&resolved)
        .enumerate()
        .map(|(index, (item, (key, signal)))| KeyRow {
            index,
            key: key.to_string(),
            signal: signal.as_str(),
            group_size: group_sizes.get(key.as_str()).copied().unwrap_or(1),
            title: item.title.clone(),
        })
        .filter(|row| !args.duplicates || row.group_size > 1)
        .collect();

    let report = KeysOutput {
        count: rows.len(),
        distinct: group_sizes.len(),
        items: rows,
    };
    render_mode(output, &report, write_text, write_pretty)
}

fn write_text(report: &KeysOutput, w: &mut dyn Write) -> io::Result<()> {
    for row in &report.items {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            row.index,
            row.key,
            row.signal,
            cell(row.title.as_deref())
        )?;
    }
    Ok(())
}

fn write_pretty(report: &KeysOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:>5}  {:<15} KEY", "ITEM", "SIGNAL")?;
    pretty_rule(w)?;
    for row in &report.items {
        let marker = if row.group_size > 1 { "*" } else { " " };
        writeln!(w, "{:>5}{marker} {:<15} {}", row.index, row.signal, row.key)?;
    }
    pretty_rule(w)?;
    writeln!(
        w,
        "{} items, {} distinct stories",
        report.count, report.distinct
    )
}
