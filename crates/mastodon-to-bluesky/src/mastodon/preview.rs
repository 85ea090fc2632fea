use super::MastodonClient;
use crate::prelude::{println, *};
use colored::Colorize;
use mastodon_to_bluesky_core::mastodon::{
    preview_rows, summarize, MastodonAccount, PostFilter, PostKind, PostSummary, PreviewRow,
};
use serde::Serialize;

/// Rows shown in the preview table
const MAX_PREVIEW_ROWS: usize = 10;

#[derive(Debug, clap::Args, Serialize, Clone)]
pub struct TestMastodonOptions {
    /// Mastodon instance URL (e.g. https://mastodon.social)
    #[arg(long, env = "MASTODON_INSTANCE")]
    pub instance: String,

    /// Mastodon access token
    #[arg(long, env = "MASTODON_TOKEN", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub token: String,

    /// Number of posts to fetch
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Include replies
    #[arg(long)]
    pub include_replies: bool,

    /// Include boosts
    #[arg(long)]
    pub include_boosts: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct PreviewOutput {
    pub account: MastodonAccount,
    pub posts: Vec<PreviewRow>,
    pub summary: PostSummary,
}

/// Fetch recent posts without transferring anything
pub async fn preview_data(options: &TestMastodonOptions) -> Result<PreviewOutput> {
    let instance = mastodon_to_bluesky_core::config::normalize_instance_url(&options.instance);
    let mut client = MastodonClient::new(&instance, &options.token)?;

    let spinner = (!options.json).then(|| new_spinner(&f!("Connecting to {instance}...")));

    let account = client.authenticate().await?;

    if let Some(spinner) = &spinner {
        spinner.set_message(f!("Fetching posts for @{}...", account.username));
    }

    let filter = PostFilter {
        include_replies: options.include_replies,
        include_boosts: options.include_boosts,
        ..Default::default()
    };
    let posts = client.get_posts(Some(options.limit), &filter).await?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    Ok(PreviewOutput {
        account,
        posts: preview_rows(&posts, MAX_PREVIEW_ROWS),
        summary: summarize(&posts),
    })
}

fn format_kind(kind: PostKind) -> String {
    match kind {
        PostKind::Post => kind.to_string().green().to_string(),
        PostKind::Reply => kind.to_string().yellow().to_string(),
        PostKind::Boost => kind.to_string().magenta().to_string(),
    }
}

pub async fn run(options: TestMastodonOptions, _global: crate::Global) -> Result<()> {
    let output = preview_data(&options).await?;

    if options.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    println!(
        "{} Connected as {} (@{})",
        "✓".green(),
        output.account.display_name.bold(),
        output.account.acct
    );

    if output.posts.is_empty() {
        println!("\nNo posts found");
        return Ok(());
    }

    println!(
        "\nShowing {} of {} post(s):\n",
        output.posts.len().to_string().bold(),
        output.summary.total
    );

    let mut table = new_table();
    table.add_row(prettytable::row![
        "ID".bold().cyan(),
        "Date".bold().cyan(),
        "Content".bold().cyan(),
        "Media".bold().cyan(),
        "Type".bold().cyan()
    ]);

    for row in &output.posts {
        table.add_row(prettytable::row![
            row.id.bright_yellow(),
            row.date.bright_black(),
            row.content,
            row.media,
            format_kind(row.kind)
        ]);
    }

    table.printstd();

    let summary = &output.summary;
    println!("\n{}", "Summary".bold());
    println!("  Total posts:     {}", summary.total);
    println!("  With media:      {}", summary.with_media);
    println!("  Replies:         {}", summary.replies);
    println!("  Boosts:          {}", summary.boosts);

    Ok(())
}
