use chrono::NaiveDate;
use clap::Parser;
use dotenv::dotenv;
use std::error::Error;
use std::path::PathBuf;
use tracing::error;

use github_contrib_scraper::{resolve_token, Args, Command, ScrapeConfig, Scraper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize the tracing logger
    tracing_subscriber::fmt::init();

    dotenv().ok();

    let args = Args::parse();

    let mut config = ScrapeConfig::default();
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(start_date) = &args.start_date {
        config.start_date = NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
            .map_err(|e| format!("invalid --start-date {:?}: {}", start_date, e))?;
    }

    // Resolve the credential before anything else; no token means no run.
    let token = match resolve_token(args.token.as_deref()).await {
        Ok(token) => token,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let scraper = Scraper::new(token, config, PathBuf::from(&args.data_file))?;
    match args.command {
        Command::Scrape => scraper.run_scrape().await?,
        Command::Update => scraper.run_update().await?,
    }

    Ok(())
}
