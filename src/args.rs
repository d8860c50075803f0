use clap::{Parser, Subcommand};

/// CLI for scraping daily unique-repository contribution counts from the
/// GitHub commit Search API, with rate-limit handling and resumable,
/// checkpointed progress.
#[derive(Parser)]
#[clap(
    author,
    version,
    about,
    long_about = "Counts how many distinct repositories a GitHub user committed to per day, \
working around the Search API's 1000-result cap, and keeps the series in a JSON file \
that survives interruptions and rate limits."
)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    /// GitHub API token. Falls back to GITHUB_TOKEN, then `gh auth token`.
    #[clap(short, long, global = true)]
    pub token: Option<String>,

    /// Path of the persisted contribution series.
    #[clap(short, long, default_value = "data/contributions.json", global = true)]
    pub data_file: String,

    /// GitHub username whose authored commits are counted.
    #[clap(short, long, global = true)]
    pub username: Option<String>,

    /// First date of the scrape range (YYYY-MM-DD).
    #[clap(short, long, global = true)]
    pub start_date: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Backfill every missing date from the start date through yesterday.
    Scrape,
    /// Refresh today and yesterday plus a bounded batch of failed dates.
    /// Leaves the file untouched when nothing changed.
    Update,
}
