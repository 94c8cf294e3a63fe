use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use naarad::config::Config;
use naarad::models::TrackDimension;
use naarad::storage::{self, Storage};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "naarad-admin")]
#[command(about = "Naarad database management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and indexes
    Init,
    /// Add columns missing from an older tracks table
    Migrate,
    /// Run init, then migrate
    InitAll,
    /// Print aggregate counters
    Stats,
    /// Print one track and its clicks
    Show {
        /// Track identifier
        track_id: String,
    },
}

async fn migrate(storage: &dyn Storage) -> Result<()> {
    let added = storage
        .migrate()
        .await
        .context("Migration failed; run `naarad-admin init` first on an empty database")?;
    if added.is_empty() {
        println!("✓ Schema is up to date");
    } else {
        println!("✓ Added {} column(s): {}", added.len(), added.join(", "));
    }
    Ok(())
}

async fn show_stats(storage: &dyn Storage) -> Result<()> {
    let summary = storage.summary().await?;
    println!("Tracks:        {}", summary.total_unique);
    println!("Opens:         {}", summary.total_opens);
    println!("Clicks:        {}", summary.total_clicks);
    println!("Avg opens:     {:.2}", summary.avg_opens);

    for (title, dimension) in [
        ("Top countries", TrackDimension::Country),
        ("Devices", TrackDimension::DeviceType),
        ("Browsers", TrackDimension::Browser),
    ] {
        let rows = storage.group_counts(dimension, 10).await?;
        println!();
        println!("{}:", title);
        for row in rows {
            println!("  {:<30} {}", row.value, row.count);
        }
    }
    Ok(())
}

async fn show_track(storage: &dyn Storage, track_id: &str) -> Result<()> {
    let Some(track) = storage.get_track(track_id).await? else {
        println!("⚠ Track '{}' not found", track_id);
        return Ok(());
    };
    let clicks = storage.list_clicks(track_id).await?;

    println!("{}", serde_json::to_string_pretty(&track)?);
    println!();
    println!("{} click(s)", clicks.len());
    println!("{:<15} {:<10} {}", "Timestamp", "Link", "Target");
    println!("{}", "-".repeat(80));
    for click in clicks {
        println!("{:<15} {:<10} {}", click.timestamp, click.link_id, click.target_url);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = storage::connect(&config.database).await?;

    match cli.command {
        Commands::Init => {
            storage.init().await?;
            println!("✓ Database initialized ({})", config.database.url);
        }
        Commands::Migrate => migrate(storage.as_ref()).await?,
        Commands::InitAll => {
            storage.init().await?;
            println!("✓ Database initialized ({})", config.database.url);
            migrate(storage.as_ref()).await?;
        }
        Commands::Stats => show_stats(storage.as_ref()).await?,
        Commands::Show { track_id } => show_track(storage.as_ref(), &track_id).await?,
    }

    Ok(())
}
