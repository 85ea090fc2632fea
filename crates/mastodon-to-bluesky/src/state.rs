use crate::prelude::{println, *};
use colored::Colorize;
use mastodon_to_bluesky_core::state::{load_state, DEFAULT_STATE_FILE};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Args, Clone)]
pub struct StateOptions {
    /// Path of the transfer state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StateSummary {
    pub state_file: PathBuf,
    pub exists: bool,
    pub transferred: usize,
    pub threads: usize,
    pub last_mastodon_id: Option<String>,
    pub last_updated: Option<String>,
}

pub fn state_summary(path: &Path) -> Result<StateSummary> {
    let exists = path.exists();
    let state = load_state(path)?;

    Ok(StateSummary {
        state_file: path.to_path_buf(),
        exists,
        transferred: state.transferred_ids.len(),
        threads: state.threads.len(),
        last_mastodon_id: state.last_mastodon_id,
        last_updated: exists.then(|| state.last_updated.to_rfc3339()),
    })
}

pub async fn run(options: StateOptions, _global: crate::Global) -> Result<()> {
    let summary = state_summary(&options.state_file)?;

    if options.json {
        let json_output = serde_json::to_string_pretty(&summary)
            .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    if !summary.exists {
        println!(
            "No state file at {}, nothing has been transferred yet",
            summary.state_file.display()
        );
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "State file".bold().cyan(),
        summary.state_file.display()
    ]);
    table.add_row(prettytable::row![
        "Transferred".bold().cyan(),
        summary.transferred.to_string().green()
    ]);
    table.add_row(prettytable::row!["Threads".bold().cyan(), summary.threads]);
    table.add_row(prettytable::row![
        "Last post".bold().cyan(),
        summary.last_mastodon_id.as_deref().unwrap_or("-")
    ]);
    table.add_row(prettytable::row![
        "Last updated".bold().cyan(),
        summary.last_updated.as_deref().unwrap_or("-").bright_black()
    ]);
    table.printstd();

    Ok(())
}
