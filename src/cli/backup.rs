//! Backup CLI commands
//!
//! Implements CLI commands for backup management.

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;

use super::AppContext;
use crate::display::{format_details, format_size, format_snapshot_list};
use crate::engine::retention;
use crate::error::BackupResult;
use crate::models::{BackupDocument, SnapshotId};
use crate::notify::ConsoleSink;
use crate::services::{AutoBackup, BackupService, TickOutcome};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup of the local data
    Create {
        /// Short label appended to the backup name
        #[arg(short, long)]
        label: Option<String>,
    },

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore local data from a backup
    Restore {
        /// Backup id or name (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show what a backup contains
    Info {
        /// Backup id or name (use 'latest' for most recent)
        backup: String,
    },

    /// Delete a backup
    Delete {
        /// Backup id or name
        backup: String,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Save a backup to a local file
    Download {
        /// Backup id or name (use 'latest' for most recent)
        backup: String,

        /// Output file (defaults to the backup name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore local data from a gist shared by link
    Import {
        /// Gist URL or id
        gist: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Back up on a timer until interrupted
    Auto {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
}

/// Handle a backup command
pub async fn handle_backup_command(ctx: &AppContext, cmd: BackupCommands) -> BackupResult<()> {
    let sink = ConsoleSink::new();
    let service = BackupService::new(&ctx.engine, ctx.data.as_ref(), &sink);

    match cmd {
        BackupCommands::Create { label } => {
            println!("Creating backup ({})...", ctx.provider);
            service.backup_now(label.as_deref()).await?;
        }

        BackupCommands::List { verbose } => {
            let snapshots = service.list().await?;
            if snapshots.is_empty() && !ctx.engine.is_signed_in().await {
                println!("Not signed in to {}.", ctx.provider);
                println!("Sign in with: cloudstash auth login");
                return Ok(());
            }
            println!("{}", format_snapshot_list(&snapshots, Utc::now(), verbose));
        }

        BackupCommands::Restore { backup, force } => {
            let snapshot = service.resolve(&backup).await?;
            let details = service.details(&snapshot.id).await?;

            println!("{}", format_details(&snapshot, &details));

            if !force {
                println!("WARNING: This will overwrite ALL current data!");
                println!("A backup of the current data is taken first.");
                println!("To proceed, run again with --force flag:");
                println!("  cloudstash backup restore {} --force", backup);
                return Ok(());
            }

            service.restore(&snapshot.id).await?;
        }

        BackupCommands::Info { backup } => {
            let snapshot = service.resolve(&backup).await?;
            let details = service.details(&snapshot.id).await?;
            println!("{}", format_details(&snapshot, &details));
        }

        BackupCommands::Delete { backup } => {
            let id = match service.resolve(&backup).await {
                Ok(snapshot) => snapshot.id,
                Err(e) if e.is_not_found() => SnapshotId::new(backup),
                Err(e) => return Err(e),
            };
            service.delete(&id).await?;
        }

        BackupCommands::Prune { force } => {
            let policy = ctx.engine.options().retention;
            let snapshots = service.list().await?;
            let expired = retention::select_expired(&snapshots, &policy, ctx.engine.now());

            if expired.is_empty() {
                println!("No backups to prune.");
                println!("Current retention policy: {}", policy.describe());
                println!("You have {} backup(s).", snapshots.len());
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Retention policy: {}", policy.describe());
            println!("Current backups: {}", snapshots.len());
            println!("To be deleted: {}", expired.len());
            for snapshot in &expired {
                println!("  - {}", snapshot.name);
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  cloudstash backup prune --force");
                return Ok(());
            }

            service.prune().await?;
        }

        BackupCommands::Download { backup, output } => {
            let snapshot = service.resolve(&backup).await?;
            let destination = output.unwrap_or_else(|| PathBuf::from(&snapshot.name));
            let bytes = service.download(&snapshot.id, &destination).await?;
            println!("Size: {}", format_size(bytes));
        }

        BackupCommands::Import { gist, force } => {
            let session = ctx.gist_session().await;
            let shared = ctx
                .gist_backend()?
                .fetch_shared(session.as_ref(), &gist)
                .await?;
            let document = BackupDocument::parse(&shared.content)?;

            println!("Shared backup: {} (gist {})", shared.file_name, shared.gist_id);
            println!("  Products: {}", document.products.len());
            println!("  Sales: {}", document.sales.len());
            if let Some(info) = &document.backup_info {
                println!("  Created: {}", info.created.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!();

            if !force {
                println!("WARNING: This will overwrite ALL current data!");
                println!("A backup of the current data is taken first.");
                println!("To proceed, run again with --force flag:");
                println!("  cloudstash backup import {} --force", gist);
                return Ok(());
            }

            service.import(&shared.content).await?;
        }

        BackupCommands::Auto { once } => {
            let auto = AutoBackup::every_minutes(
                ctx.engine.clone(),
                ctx.data.clone(),
                ctx.settings.auto_backup.interval_minutes,
            );

            if once {
                match auto.tick().await {
                    TickOutcome::Created(snapshot) => println!("Backup created: {}", snapshot.name),
                    TickOutcome::Skipped(reason) => println!("Skipped: {:?}", reason),
                    TickOutcome::Failed(message) => println!("Auto-backup failed: {}", message),
                }
                return Ok(());
            }

            if !ctx.settings.auto_backup.enabled {
                println!("Note: auto-backup is disabled in config.json; running anyway.");
            }
            println!(
                "Backing up every {} minute(s). Press Ctrl-C to stop.",
                ctx.settings.auto_backup.interval_minutes
            );
            auto.run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        }
    }

    Ok(())
}
