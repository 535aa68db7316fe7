use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cloudstash::cli::{handle_auth_command, handle_backup_command, AppContext};
use cloudstash::config::{ProviderKind, Settings, StashPaths};
use cloudstash::data::{write_json_atomic, DataSource, JsonFileDataSource};
use cloudstash::models::Dataset;

#[derive(Parser)]
#[command(
    name = "cloudstash",
    version,
    about = "Cloud backup and restore for shop data",
    long_about = "cloudstash saves a shop's products, sales and settings as \
                  timestamped JSON backups in a local directory, a private \
                  GitHub Gist or a Google Drive folder, and restores them."
)]
struct Cli {
    /// Storage provider to use instead of the configured one
    #[arg(long, global = true, value_enum, env = "CLOUDSTASH_PROVIDER")]
    provider: Option<ProviderKind>,

    /// Log what is happening
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(cloudstash::cli::BackupCommands),

    /// Sign in to or out of the storage provider
    #[command(subcommand)]
    Auth(cloudstash::cli::AuthCommands),

    /// Create the configuration and an empty dataset
    Init,

    /// Show current configuration and paths
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,cloudstash=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = StashPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            let ctx = AppContext::build(paths, settings, cli.provider)?;
            handle_backup_command(&ctx, cmd).await?;
        }
        Some(Commands::Auth(cmd)) => {
            let ctx = AppContext::build(paths, settings, cli.provider)?;
            handle_auth_command(&ctx, cmd).await?;
        }
        Some(Commands::Init) => {
            println!("Initializing cloudstash at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;

            let dataset_path = settings.dataset_path(&paths);
            if !dataset_path.exists() {
                write_json_atomic(&dataset_path, &Dataset::new())?;
                println!("Created empty dataset: {}", dataset_path.display());
            }
            println!("Initialization complete!");
            println!();
            println!("Storage provider: {}", settings.provider);
            println!("Run 'cloudstash backup create' to take the first backup.");
        }
        Some(Commands::Config) => {
            let dataset_path = settings.dataset_path(&paths);
            println!("cloudstash Configuration");
            println!("========================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Dataset file:     {}", dataset_path.display());
            println!("Local store:      {}", paths.store_dir().display());
            println!();
            println!("Provider:         {}", cli.provider.unwrap_or(settings.provider));
            println!("Container:        {}", settings.container_name);
            println!("Entry prefix:     {}", settings.entry_prefix);
            println!("Retention:        {}", settings.retention.describe());
            println!(
                "Auto-backup:      {} (every {} minute(s))",
                if settings.auto_backup.enabled { "on" } else { "off" },
                settings.auto_backup.interval_minutes
            );

            if let Ok(dataset) = JsonFileDataSource::new(dataset_path).read_snapshot() {
                println!();
                println!(
                    "Local data:       {} product(s), {} sale(s)",
                    dataset.products.len(),
                    dataset.sales.len()
                );
            }
        }
        None => {
            println!("cloudstash - cloud backup and restore for shop data");
            println!();
            println!("Run 'cloudstash --help' for usage information.");
        }
    }

    Ok(())
}
