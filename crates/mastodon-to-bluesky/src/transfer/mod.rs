use crate::bluesky::BlueskyClient;
use crate::config::{config_file_path, resolve_credentials};
use crate::mastodon::MastodonClient;
use crate::prelude::{println, *};
use colored::Colorize;
use mastodon_to_bluesky_core::config::PartialConfig;
use mastodon_to_bluesky_core::mastodon::{parse_date, PostFilter};
use mastodon_to_bluesky_core::state::DEFAULT_STATE_FILE;
use mastodon_to_bluesky_core::transfer::TransferStats;
use serde::Serialize;
use std::path::PathBuf;

pub mod manager;

pub use manager::{TransferManager, TransferScope};

#[derive(Debug, clap::Args, Clone)]
pub struct TransferOptions {
    /// Mastodon instance URL
    #[arg(long, env = "MASTODON_INSTANCE")]
    pub mastodon_instance: Option<String>,

    /// Mastodon access token
    #[arg(long, env = "MASTODON_TOKEN", hide_env_values = true)]
    pub mastodon_token: Option<String>,

    /// Bluesky handle (e.g. alice.bsky.social)
    #[arg(long, env = "BLUESKY_HANDLE")]
    pub bluesky_handle: Option<String>,

    /// Bluesky app password
    #[arg(long, env = "BLUESKY_PASSWORD", hide_env_values = true)]
    pub bluesky_password: Option<String>,

    /// Bluesky PDS URL [default: https://bsky.social]
    #[arg(long, env = "BLUESKY_PDS")]
    pub bluesky_pds: Option<String>,

    /// Maximum number of posts to transfer
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Only transfer posts created on or after this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub since: Option<chrono::DateTime<chrono::Utc>>,

    /// Only transfer posts created before this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub until: Option<chrono::DateTime<chrono::Utc>>,

    /// Show what would be transferred without posting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Transfer posts again even if the state file says they were transferred
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Include replies
    #[arg(long)]
    pub include_replies: bool,

    /// Include boosts
    #[arg(long)]
    pub include_boosts: bool,

    /// Include followers-only and direct posts
    #[arg(long)]
    pub include_private: bool,

    /// Path of the transfer state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Config file with credentials [default: ~/.config/mastodon-to-bluesky/config.json]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output the results as JSON
    #[arg(long)]
    pub json: bool,
}

impl TransferOptions {
    fn cli_config(&self) -> PartialConfig {
        PartialConfig {
            mastodon_instance: self.mastodon_instance.clone(),
            mastodon_token: self.mastodon_token.clone(),
            bluesky_handle: self.bluesky_handle.clone(),
            bluesky_password: self.bluesky_password.clone(),
            bluesky_pds: self.bluesky_pds.clone(),
        }
    }

    pub fn scope(&self) -> TransferScope {
        TransferScope {
            limit: self.limit,
            filter: PostFilter {
                since: self.since,
                until: self.until,
                include_replies: self.include_replies,
                include_boosts: self.include_boosts,
                include_private: self.include_private,
            },
            skip_existing: !self.no_skip_existing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferOutput {
    pub dry_run: bool,
    pub stats: TransferStats,
    /// Mastodon ids a dry run would post
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub would_transfer: Vec<String>,
    pub state_file: PathBuf,
}

pub async fn run(options: TransferOptions, global: crate::Global) -> Result<()> {
    let config_path = options.config.clone().or_else(config_file_path);
    let credentials = resolve_credentials(options.cli_config(), config_path.as_deref())?;

    if global.verbose {
        println!("Mastodon instance: {}", credentials.mastodon_instance);
        println!("Bluesky PDS:       {}", credentials.bluesky_pds);
        println!("State file:        {}", options.state_file.display());
        println!();
    }

    let spinner = (!options.json).then(|| new_spinner("Connecting to Mastodon..."));

    let mut mastodon =
        MastodonClient::new(&credentials.mastodon_instance, &credentials.mastodon_token)?;
    let account = mastodon.authenticate().await?;

    if let Some(spinner) = &spinner {
        spinner.set_message("Connecting to Bluesky...");
    }

    let mut bluesky = BlueskyClient::new(
        &credentials.bluesky_pds,
        &credentials.bluesky_handle,
        &credentials.bluesky_password,
    )?;
    let session = bluesky.authenticate().await?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if !options.json {
        println!(
            "{} Mastodon: @{}   Bluesky: @{}",
            "✓".green(),
            account.acct,
            session.handle
        );
        if options.dry_run {
            println!("{}", "Dry run: nothing will be posted".yellow());
        }
    }

    let mut manager =
        TransferManager::new(mastodon, bluesky, options.state_file.clone(), options.dry_run)
            .with_progress(!options.json);
    let scope = options.scope();

    if global.verbose {
        println!(
            "{} post(s) already recorded in the state file",
            manager.state().transferred_ids.len()
        );
    }

    let stats = tokio::select! {
        result = manager.transfer_posts(&scope) => result?,
        _ = tokio::signal::ctrl_c() => {
            return Err(eyre!(
                "Interrupted, progress so far is saved in {}",
                options.state_file.display()
            ));
        }
    };

    let output = TransferOutput {
        dry_run: options.dry_run,
        stats,
        would_transfer: manager.would_transfer().to_vec(),
        state_file: options.state_file,
    };

    if options.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    print_stats(&output);

    Ok(())
}

fn print_stats(output: &TransferOutput) {
    let stats = &output.stats;
    let transferred_label = if output.dry_run {
        "Would transfer"
    } else {
        "Transferred"
    };

    println!("\n{}", "Transfer complete".bold());

    let mut table = new_table();
    table.add_row(prettytable::row!["Processed".bold().cyan(), stats.processed]);
    table.add_row(prettytable::row![
        transferred_label.bold().cyan(),
        stats.transferred.to_string().green()
    ]);
    table.add_row(prettytable::row!["Skipped".bold().cyan(), stats.skipped]);
    table.add_row(prettytable::row![
        "Errors".bold().cyan(),
        if stats.errors > 0 {
            stats.errors.to_string().red()
        } else {
            stats.errors.to_string().normal()
        }
    ]);
    table.printstd();

    if output.dry_run {
        println!(
            "\n{}",
            "This was a dry run. Run again without --dry-run to transfer.".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[command(flatten)]
        options: TransferOptions,
    }

    #[test]
    fn test_scope_defaults() {
        let cli = Cli::parse_from(["transfer"]);
        let scope = cli.options.scope();

        assert!(scope.skip_existing);
        assert!(scope.limit.is_none());
        assert!(!scope.filter.include_private);
        assert_eq!(cli.options.state_file, PathBuf::from(DEFAULT_STATE_FILE));
    }

    #[test]
    fn test_scope_from_flags() {
        let cli = Cli::parse_from([
            "transfer",
            "--limit",
            "5",
            "--since",
            "2024-01-01",
            "--until",
            "2024-02-01",
            "--no-skip-existing",
            "--include-replies",
        ]);
        let scope = cli.options.scope();

        assert_eq!(scope.limit, Some(5));
        assert!(!scope.skip_existing);
        assert!(scope.filter.include_replies);
        assert_eq!(scope.filter.since, Some(parse_date("2024-01-01").unwrap()));
        assert_eq!(scope.filter.until, Some(parse_date("2024-02-01").unwrap()));
    }

    #[test]
    fn test_output_lists_dry_run_ids() {
        let output = TransferOutput {
            dry_run: true,
            stats: TransferStats {
                processed: 1,
                transferred: 1,
                ..Default::default()
            },
            would_transfer: vec!["42".to_string()],
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["would_transfer"], serde_json::json!(["42"]));
        assert_eq!(json["stats"]["transferred"], 1);
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        assert!(Cli::try_parse_from(["transfer", "--since", "last week"]).is_err());
    }
}
