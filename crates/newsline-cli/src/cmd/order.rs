//! `newsline order`: dedupe a feed and print it in stable first-seen order.

use crate::cmd::{StoreArgs, cell, open_kv, published_label, read_feed};
use crate::output::{OutputMode, pretty_rule, render_mode};
use clap::Args;
use newsline_core::config::NewslineConfig;
use newsline_core::model::OrderedFeed;
use newsline_core::ordering::OrderingEngine;
use newsline_core::sequence::{KvStore, MemoryKv, SequenceStore};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

#[derive(Args, Debug)]
#[command(
    about = "Dedupe and order a feed",
    long_about = "Collapse duplicate stories in a feed and order the survivors by when each \
                  story was first seen, newest first.\n\n\
                  The feed is a JSON array of items or an object with an `items` array. \
                  First-seen numbers persist in the configured state backend.",
    after_help = "EXAMPLES:\n    # Order a feed file\n    newsline order feed.json\n\n\
                  # Read from stdin and keep the top 40\n    cat feed.json | newsline order - --limit 40\n\n\
                  # Use a SQLite state database\n    newsline order feed.json --backend sqlite\n\n\
                  # Machine-readable output\n    newsline order feed.json --json"
)]
pub struct OrderArgs {
    /// Feed file, or `-` for stdin.
    #[arg(value_name = "FILE")]
    pub input: String,

    /// Maximum number of items to print (overrides `[output] max_items`).
    #[arg(long)]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub fn run_order(
    args: &OrderArgs,
    config: &NewslineConfig,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let snapshot = read_feed(&args.input, project_root, output)?;

    let kv: Box<dyn KvStore> = match open_kv(config, project_root, &args.store) {
        Ok(kv) => kv,
        Err(err) => {
            warn!(code = %err.code(), "sequence state unavailable, ordering without persistence: {err}");
            Box::new(MemoryKv::default())
        }
    };

    let mut engine = OrderingEngine::from_config(config, SequenceStore::new(kv))
        .with_max_items(args.limit.or(config.output.max_items));
    let feed = engine.order_snapshot(&snapshot);

    render_mode(output, &feed, write_text, write_pretty)
}

fn write_text(feed: &OrderedFeed, w: &mut dyn Write) -> io::Result<()> {
    for entry in &feed.items {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            entry.sequence,
            published_label(&entry.item),
            cell(entry.item.source.as_deref()),
            cell(entry.item.title.as_deref()),
            cell(entry.item.link()),
        )?;
    }
    Ok(())
}

fn write_pretty(feed: &OrderedFeed, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{} stories (generated {})", feed.count, feed.generated_utc)?;
    pretty_rule(w)?;
    for (index, entry) in feed.items.iter().enumerate() {
        let item = &entry.item;
        let mut line = format!("{:>3}. {}", index + 1, cell(item.title.as_deref()));
        if item.paywall {
            line.push_str(" [paywall]");
        }
        writeln!(w, "{line}")?;
        writeln!(
            w,
            "     {} | {}",
            cell(item.source.as_deref()),
            published_label(item)
        )?;
        if let Some(link) = item.link() {
            writeln!(w, "     {link}")?;
        }
    }
    Ok(())
}
