//! keylog CLI - command-line access to a keylog data directory

use anyhow::Context;
use clap::{Parser, Subcommand};
use keylog_core::wal::{SegmentManager, SyncPolicy};
use keylog_core::{Db, DbConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Embedded key-value store on a segmented write-ahead log.
#[derive(Parser)]
#[command(name = "keylog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the segment files
    #[arg(global = true, short, long, default_value = keylog_core::config::DATA_DIR)]
    data_dir: PathBuf,

    /// Rotate the active segment past this many bytes
    #[arg(global = true, long, default_value_t = keylog_core::config::ROTATION_THRESHOLD)]
    rotation_threshold: u64,

    /// Compact once the log is larger than this many bytes
    #[arg(global = true, long, default_value_t = keylog_core::config::COMPACTION_THRESHOLD)]
    compaction_threshold: u64,

    /// Only flush appends to the OS instead of syncing each one
    #[arg(global = true, long)]
    no_sync: bool,

    /// Enable debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value of a key
    Get { key: String },

    /// Set a key to a value
    Set { key: String, value: String },

    /// Delete a key
    Delete { key: String },

    /// List segments with their sizes, oldest first
    Segments,

    /// Merge the two oldest historical segments
    Compact,

    /// Print every record of every segment in replay order
    Dump,

    /// Print engine statistics as JSON
    Stats,

    /// Keep the engine open with background maintenance until Ctrl-C
    Run {
        /// Seconds between rotation checks
        #[arg(long, default_value_t = keylog_core::config::ROTATION_CHECK_INTERVAL_SECS)]
        rotation_interval: u64,

        /// Seconds between compaction checks
        #[arg(long, default_value_t = keylog_core::config::COMPACTION_CHECK_INTERVAL_SECS)]
        compaction_interval: u64,
    },
}

impl Cli {
    fn db_config(&self) -> DbConfig {
        let mut config = DbConfig::with_dir(&self.data_dir);
        config.wal.rotation_threshold = self.rotation_threshold;
        config.wal.compaction_threshold = self.compaction_threshold;
        if self.no_sync {
            config.wal.sync_policy = SyncPolicy::None;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.db_config();

    match cli.command {
        Commands::Get { ref key } => {
            let db = open(config)?;
            match db.get(key) {
                Some(value) => println!("{}", value),
                None => println!("(nil)"),
            }
            db.close()?;
        }
        Commands::Set { ref key, ref value } => {
            let db = open(config)?;
            db.set(key, value)?;
            db.close()?;
        }
        Commands::Delete { ref key } => {
            let db = open(config)?;
            db.delete(key)?;
            db.close()?;
        }
        Commands::Segments => {
            let manager = SegmentManager::new(&cli.data_dir)?;
            for name in manager.try_list_segments()? {
                println!("{}\t{}", name, manager.segment_size(&name)?);
            }
        }
        Commands::Compact => {
            let db = open(config)?;
            match db.wal().compact()? {
                Some(stats) => println!(
                    "merged into {} ({} of {} entries kept)",
                    stats.output, stats.entries_written, stats.entries_read
                ),
                None => println!("fewer than two historical segments, nothing to merge"),
            }
            db.close()?;
        }
        Commands::Dump => {
            let db = open(config)?;
            for segment in db.wal().recover()? {
                let (name, entries) = segment?;
                for entry in entries {
                    println!("{}\t{}", name, entry?);
                }
            }
            db.close()?;
        }
        Commands::Stats => {
            let db = open(config)?;
            println!("{}", serde_json::to_string_pretty(&db.stats()?)?);
            db.close()?;
        }
        Commands::Run {
            rotation_interval,
            compaction_interval,
        } => {
            let mut config = config;
            config.rotation_check_interval = Duration::from_secs(rotation_interval);
            config.compaction_check_interval = Duration::from_secs(compaction_interval);

            let db = open(config)?;
            db.start_maintenance()?;
            info!("keylog running on {:?}, press Ctrl-C to stop", cli.data_dir);
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            db.close()?;
            info!("keylog stopped");
        }
    }

    Ok(())
}

fn open(config: DbConfig) -> anyhow::Result<Db> {
    let dir = config.wal.dir.clone();
    Db::open(config).with_context(|| format!("failed to open keylog store in {:?}", dir))
}
