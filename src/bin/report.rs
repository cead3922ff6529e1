use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use cronscan::db::{list_entries, Db, EntryFilter};
use cronscan::Config;

#[derive(Parser, Debug)]
#[command(name = "report")]
#[command(about = "List crontab entries recorded by cronscan")]
struct Args {
    /// Only entries from this host
    #[arg(long)]
    host: Option<String>,

    /// Only entries owned by this user
    #[arg(long)]
    user: Option<String>,

    /// Only entries ingested on this date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Maximum number of entries to print
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    // Read-only: never create or migrate a database here
    let db = Db::existing(config.db_path())?;

    let filter = EntryFilter {
        host_name: args.host,
        user_name: args.user,
        ingested_on: args.date,
        limit: args.limit,
    };
    let entries = list_entries(&db, &filter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries recorded.");
        return Ok(());
    }

    println!(
        "{:>6} {:<10} {:<16} {:<10} {:<8} {:<6} {:<6} {:<6} {:<6} {}",
        "ID", "Date", "Host", "User", "Min", "Hour", "DoM", "Mon", "DoW", "Command"
    );
    println!("{:-<100}", "");
    for entry in &entries {
        println!(
            "{:>6} {:<10} {:<16} {:<10} {:<8} {:<6} {:<6} {:<6} {:<6} {}",
            entry.id.unwrap_or_default(),
            entry.ingested_on.to_string(),
            entry.host_name,
            entry.user_name,
            entry.minute,
            entry.hour,
            entry.day_of_month,
            entry.month,
            entry.day_of_week,
            entry.command
        );
    }
    println!("{:-<100}", "");
    println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });

    Ok(())
}
