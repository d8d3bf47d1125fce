//! Strata CLI
//!
//! Operator commands for the storage schema and the aggregation index:
//! - Install, check and drop the schema
//! - Inspect pending index entries
//! - Purge expired rows

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use strata::config::generate_default_config;
use strata::*;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "strata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rollup index and schema lifecycle for a bucketed metrics store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the schema if needed and apply pending updates
    Install,

    /// Remove the schema and the operating account
    Drop {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Verify the installed schema version matches this build
    Check,

    /// Show installed and required schema versions
    Version,

    /// List index entries waiting for rollup
    LoadIndex {
        /// Bucket (raw, one_hour, six_hour, twenty_four_hour)
        #[arg(short, long, default_value = "raw")]
        bucket: String,
        /// Load past slices instead of the current one
        #[arg(long)]
        past: bool,
        /// First day of the past walk, YYYY-MM-DD (default: start of retention)
        #[arg(long)]
        start_day: Option<String>,
        /// Page size for the current slice (default: from config)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Delete rows whose TTL has elapsed
    Purge,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_deref());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging)?;

    tracing::info!("Strata v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Store: {} ({} nodes)", config.store.path, config.store.nodes.len());

    let cluster = Arc::new(
        EmbeddedCluster::open(Path::new(&config.store.path), config.store.nodes.clone())
            .with_context(|| format!("opening store {}", config.store.path))?,
    );
    let schema = SchemaManager::new(cluster.clone(), &config.store, &config.schema);

    match cli.command {
        Commands::Install => {
            let version = schema.install().await?;
            println!("Storage schema installed at version {}", version);
        }

        Commands::Drop { yes } => {
            if !yes {
                bail!("refusing to drop the storage schema without --yes");
            }
            schema.drop().await?;
            println!("Storage schema dropped");
        }

        Commands::Check => {
            let version = schema.check_compatibility().await?;
            println!("Storage schema version {} is compatible", version);
        }

        Commands::Version => {
            let required = schema_scripts(&config.schema)
                .folder(Task::Update)?
                .latest_version();
            let installed = match schema.installed_version().await {
                Ok(version) => version.to_string(),
                Err(SchemaError::NotInstalled) | Err(SchemaError::AuthenticationFailed(_)) => {
                    "not installed".to_string()
                }
                Err(e) => return Err(e.into()),
            };
            println!("Installed: {}", installed);
            println!("Required:  {}", required);
        }

        Commands::LoadIndex {
            bucket,
            past,
            start_day,
            page_size,
        } => {
            let bucket: Bucket = bucket.parse()?;
            let policy = Arc::new(MetricsPolicy::try_from(&config.metrics)?);
            let session = schema.connect().await?;
            let dao = Arc::new(MetricsDao::new(session, policy.clone()));
            let now = Utc::now();
            let loader = IndexEntriesLoader::new(dao, now);

            let entries = if past {
                let start = match start_day.as_deref() {
                    Some(day) => parse_day(day)?,
                    None => policy.past_window_start(now),
                };
                loader.load_past_bucket_entries(bucket, start).await?
            } else {
                let page_size = page_size.unwrap_or(policy.index_page_size());
                loader.load_current_index_entries(bucket, page_size).await?
            };

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
                _ => print_entries(&entries),
            }
        }

        Commands::Purge => {
            schema.check_compatibility().await?;
            let removed = cluster.purge_expired(Utc::now()).await?;
            println!("Removed {} expired rows", removed);
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("strata={}", config.level)));

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let registry = tracing_subscriber::registry().with(filter);
    match config.format.as_str() {
        "json" => registry.with(fmt_layer.json()).init(),
        _ => registry.with(fmt_layer).init(),
    }

    Ok(())
}

fn schema_scripts(config: &SchemaConfig) -> Box<dyn ScriptRepository> {
    match &config.scripts_dir {
        Some(dir) => Box::new(DirectoryScripts::new(dir)),
        None => Box::new(ScriptSet::bundled()),
    }
}

fn parse_day(day: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("invalid day {}, expected YYYY-MM-DD", day))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid day {}", day))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn print_entries(entries: &[IndexEntry]) {
    if entries.is_empty() {
        println!("No index entries");
        return;
    }

    println!(
        "{:<18} {:<12} {:>9} {:<18} {:>10} {:>6}",
        "BUCKET", "DAY", "PARTITION", "SLICE", "START ID", "IDS"
    );
    println!("{}", "-".repeat(78));
    for entry in entries {
        println!(
            "{:<18} {:<12} {:>9} {:<18} {:>10} {:>6}",
            entry.bucket.as_str(),
            entry.day.format("%Y-%m-%d"),
            entry.partition,
            entry.collection_time_slice.format("%Y-%m-%d %H:%M"),
            entry.start_schedule_id,
            entry.schedule_ids.len()
        );
    }

    let ids: usize = entries.iter().map(|e| e.schedule_ids.len()).sum();
    println!();
    println!("{} entries, {} schedule ids", entries.len(), ids);
}

fn write_default_config(output: Option<&Path>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Config written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
