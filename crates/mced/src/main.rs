//! mced: inspect and manage config backups and tracked changes of a
//! Minecraft instance from the command line.
//!
//! Shares the stores of mced-core with the editor and keeps their state in
//! `.mced/state.json` under the instance directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mced::{Config, Workspace};
use mced_core::Backup;

#[derive(Parser, Debug)]
#[command(name = "mced")]
#[command(about = "Minecraft config editor backups and change tracking")]
struct Args {
    /// Path to the Minecraft instance directory
    #[arg(short, long, env = "MCED_INSTANCE_PATH")]
    instance: Option<String>,

    /// Backups kept per config file
    #[arg(long, env = "MCED_MAX_BACKUPS", default_value_t = 5)]
    max_backups: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, list, restore and delete config backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Show or reset tracked setting changes
    #[command(subcommand)]
    Changes(ChangesCommand),

    /// Export or clear the edit changelog
    #[command(subcommand)]
    Changelog(ChangelogCommand),
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Copy a config file into the backup directory
    Create {
        /// Config file, absolute or relative to the instance
        file: String,
        /// Mod that owns the file
        #[arg(short, long = "mod")]
        mod_name: String,
    },
    /// List backups, newest first
    List {
        /// Only backups of this config file
        file: Option<String>,
    },
    /// Write a backup's content back over its config file
    Restore { id: String },
    /// Delete one backup
    Delete { id: String },
    /// Delete every backup
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum ChangesCommand {
    /// List tracked settings
    List {
        /// Include settings that are back at their original value
        #[arg(long)]
        all: bool,
    },
    /// Stop tracking a setting and print its original value
    Reset { mod_id: String, key: String },
    /// Forget all tracked changes
    Clear,
}

#[derive(Subcommand, Debug)]
enum ChangelogCommand {
    /// Write the changelog as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every changelog entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,mced=debug,mced_core=debug"
    } else {
        "info,mced=info,mced_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(args.instance.as_deref())?.with_max_backups(args.max_backups);
    debug!("Instance path: {:?}", config.instance_path);

    let mut workspace = Workspace::open(&config).await?;

    match args.command {
        Command::Backup(command) => run_backup(&mut workspace, command).await,
        Command::Changes(command) => run_changes(&mut workspace, command),
        Command::Changelog(command) => run_changelog(&mut workspace, command),
    }
}

async fn run_backup(workspace: &mut Workspace, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create { file, mod_name } => {
            let backup = workspace.create_backup(&file, &mod_name).await?;
            println!("{}", backup.id);
        }
        BackupCommand::List { file } => {
            let backups = workspace.list_backups(file.as_deref());
            if backups.is_empty() {
                info!("No backups");
            }
            for backup in &backups {
                print_backup(backup);
            }
        }
        BackupCommand::Restore { id } => {
            let backup = workspace.restore_backup(&id).await?;
            info!("Restored {} from {}", backup.config_path, backup.id);
        }
        BackupCommand::Delete { id } => {
            workspace.delete_backup(&id).await?;
            info!("Deleted backup {}", id);
        }
        BackupCommand::Cleanup => {
            let removed = workspace.cleanup_backups().await?;
            info!("Removed {} backup(s)", removed);
        }
    }
    Ok(())
}

fn run_changes(workspace: &mut Workspace, command: ChangesCommand) -> Result<()> {
    match command {
        ChangesCommand::List { all } => {
            for (key, record) in workspace.tracker().iter() {
                if !all && !record.is_modified {
                    continue;
                }
                let marker = if record.is_modified { "*" } else { " " };
                println!(
                    "{} {}\t{} -> {}",
                    marker, key, record.original_value, record.current_value
                );
            }
        }
        ChangesCommand::Reset { mod_id, key } => {
            match workspace.reset_change(&mod_id, &key)? {
                Some(original) => println!("{}", original),
                None => info!("{}:{} is not tracked", mod_id, key),
            }
        }
        ChangesCommand::Clear => {
            let cleared = workspace.clear_changes()?;
            info!("Cleared {} tracked setting(s)", cleared);
        }
    }
    Ok(())
}

fn run_changelog(workspace: &mut Workspace, command: ChangelogCommand) -> Result<()> {
    match command {
        ChangelogCommand::Export { output } => {
            let json = workspace.changelog().export_json()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!(
                        "Exported {} entries to {:?}",
                        workspace.changelog().len(),
                        path
                    );
                }
                None => println!("{}", json),
            }
        }
        ChangelogCommand::Clear => {
            workspace.clear_changelog()?;
        }
    }
    Ok(())
}

fn print_backup(backup: &Backup) {
    println!(
        "{}\t{}\t{}\t{}",
        backup.id,
        backup.created_at.format("%Y-%m-%d %H:%M:%S"),
        backup.mod_name,
        backup.config_path
    );
}
