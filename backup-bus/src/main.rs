//! Backup bus client - command line entry point
//!
//! Drives the backup coordinator and restore resolver over the bus.

use anyhow::{bail, Result};
use backup_bus::client::{BackupClient, RestoreClient};
use backup_bus::fs::walker::WalkOptions;
use backup_bus::{utils, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bus host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bus port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up every file under a directory as one instance
    Backup {
        /// Directory to back up
        source: PathBuf,

        /// Logical structure name recorded with the instance
        structure: String,

        /// Scheduled job that triggered this backup
        #[arg(long = "job-id")]
        auto_job_id: Option<i64>,

        /// Follow symbolic links to directories while scanning
        #[arg(long)]
        follow_links: bool,

        /// Only descend this many directory levels below the source
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Restore every file of an instance into a directory
    Restore {
        instance_id: i64,

        /// Destination directory
        destination: PathBuf,
    },

    /// Show the files recorded for an instance
    Plan { instance_id: i64 },

    /// List committed instances, newest first
    List {
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(host) = args.host {
        config.bus.host = host;
    }
    if let Some(port) = args.port {
        config.bus.port = port;
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Using bus at {}", config.bus.address());

    match args.command {
        Command::Backup {
            source,
            structure,
            auto_job_id,
            follow_links,
            max_depth,
        } => {
            let walk = WalkOptions {
                follow_links,
                max_depth,
                ..WalkOptions::default()
            };
            let client = BackupClient::new(config.bus.clone(), config.services.backup.clone())
                .with_walk_options(walk);
            let summary = client.backup_directory(&source, &structure, auto_job_id).await?;
            println!(
                "instance {}: {} file(s), {} bytes",
                summary.instance_id, summary.files, summary.bytes
            );
        }
        Command::Restore {
            instance_id,
            destination,
        } => {
            let client = RestoreClient::new(config.bus.clone(), config.services.restore.clone());
            let report = client.restore_instance(instance_id, &destination).await?;
            for (path, source) in &report.restored {
                println!("restored {} from {}", path, source);
            }
            for (path, reason) in &report.failed {
                println!("FAILED   {}: {}", path, reason);
            }
            if !report.is_complete() {
                bail!("{} file(s) could not be restored", report.failed.len());
            }
        }
        Command::Plan { instance_id } => {
            let client = RestoreClient::new(config.bus.clone(), config.services.restore.clone());
            let plan = client.plan(instance_id).await?;
            println!("structure: {}", plan.instance_structure);
            if let Some(message) = &plan.message {
                println!("{}", message);
            }
            for file in &plan.files {
                println!("{:>12}  {}  {}", file.size, file.hash, file.relative_path);
            }
        }
        Command::List { limit } => {
            let client = RestoreClient::new(config.bus.clone(), config.services.restore.clone());
            for instance in client.list_instances(limit).await? {
                println!(
                    "{:>6}  {}  {:>12}  {}",
                    instance.id, instance.created_at, instance.total_size, instance.structure
                );
            }
        }
    }

    Ok(())
}
