use crate::prelude::*;
use clap::Parser;

mod bluesky;
mod config;
mod error;
mod http;
mod mastodon;
mod prelude;
mod state;
mod transfer;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Transfer your Mastodon posts to Bluesky"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "MASTODON_TO_BLUESKY_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommands {
    /// Check the Mastodon connection and preview recent posts
    TestMastodon(crate::mastodon::preview::TestMastodonOptions),

    /// Transfer posts from Mastodon to Bluesky
    Transfer(crate::transfer::TransferOptions),

    /// Show what the transfer state file records
    State(crate::state::StateOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::TestMastodon(options) => {
            crate::mastodon::preview::run(options, app.global).await
        }
        SubCommands::Transfer(options) => crate::transfer::run(options, app.global).await,
        SubCommands::State(options) => crate::state::run(options, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
