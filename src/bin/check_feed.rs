use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use std::time::Duration;

use feedwatch::feed::{self, canonicalize, create_http_client, parse_feed, REQUEST_TIMEOUT};

/// Fetches one feed and shows how its entries normalize.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Feed URL
    url: String,

    /// Entries to show
    #[arg(short, long, default_value_t = 10)]
    limit: usize,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = REQUEST_TIMEOUT.as_secs())]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = create_http_client()?;

    println!("Checking feed: {}", args.url.bright_yellow());

    let fetched = match feed::fetch_feed(&client, &args.url, Duration::from_secs(args.timeout)).await {
        Ok(fetched) => fetched,
        Err(e) => {
            println!("{}: {}", "Request failed".bright_red(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{}: {}",
        "Content-Type".bright_blue(),
        fetched.content_type.as_deref().unwrap_or("none")
    );
    println!("{}: {}", "Encoding".bright_blue(), fetched.encoding);
    println!("{}: {} bytes", "Body".bright_blue(), fetched.body.len());

    let raw = match parse_feed(&fetched.body, fetched.content_type.as_deref()) {
        Ok(raw) => raw,
        Err(e) => {
            println!("{}: {}", "Parse failed".bright_red(), e);
            std::process::exit(1);
        }
    };
    println!("{}: {}", "Entries".bright_blue(), raw.len().to_string().bright_green());
    println!("{}", "─".repeat(80).dimmed());

    let now = Utc::now();
    for (i, entry) in raw.into_iter().take(args.limit).enumerate() {
        let published_raw = entry
            .published
            .clone()
            .or_else(|| entry.updated.clone())
            .or_else(|| entry.created.clone());
        let canonical = canonicalize(entry, i, &args.url, now);

        println!("{} {}", format!("{:>2}.", i + 1).dimmed(), canonical.title.bold());
        println!("    {}: {}", "id".dimmed(), canonical.id);
        if !canonical.link.is_empty() {
            println!("    {}: {}", "link".dimmed(), canonical.link);
        }
        let fallback = if canonical.published == now {
            " (unresolved, using now)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "    {}: {} <- {}{}",
            "published".dimmed(),
            canonical.published.to_rfc3339(),
            published_raw.as_deref().unwrap_or("-"),
            fallback
        );
    }

    Ok(())
}
