mod commands;

use clap::{Parser, Subcommand};
use commands::{
    list_backups::ListBackupsCommand, perform, prune::PruneCommand, restore::RestoreCommand,
    test_alert, upload::UploadCommand,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use xtrasnap_core::BackupRequest;

#[derive(Parser)]
#[command(
    name = "xtrasnap",
    about = "MySQL physical backups on DigitalOcean",
    long_about = "Xtrasnap takes full and incremental XtraBackup backups onto temporary block storage volumes, \
                  uploads them to Spaces and restores them on demand"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "XTRASNAP_CONFIG", help = "Configuration file (default /etc/xtrasnap.json)")]
    config: Option<PathBuf>,

    #[arg(long, env = "XTRASNAP_DO_KEY", help = "DigitalOcean API token")]
    do_key: Option<String>,

    #[arg(long, env = "XTRASNAP_DO_SPACE_ENDPOINT", help = "Spaces endpoint")]
    do_space_endpoint: Option<String>,

    #[arg(long, env = "XTRASNAP_DO_SPACE_NAME", help = "Spaces bucket name")]
    do_space_name: Option<String>,

    #[arg(long, env = "XTRASNAP_DO_SPACE_KEY", help = "Spaces access key")]
    do_space_key: Option<String>,

    #[arg(long, env = "XTRASNAP_DO_SPACE_SECRET", help = "Spaces secret key")]
    do_space_secret: Option<String>,

    #[arg(long, env = "XTRASNAP_MYSQL_DATA_PATH", help = "MySQL data directory")]
    mysql_data_path: Option<PathBuf>,

    #[arg(long, env = "XTRASNAP_PERSISTENT_STORAGE", help = "Directory holding the xtrabackup checkpoint")]
    persistent_storage: Option<PathBuf>,

    #[arg(long, help = "Hostname used as the backup key prefix")]
    hostname: Option<String>,

    #[arg(long, help = "Use this volume instead of creating one; it is never destroyed")]
    existing_volume_id: Option<String>,

    #[arg(long, help = "Use this directory instead of a volume")]
    existing_directory: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Take a full or incremental backup, whichever is due")]
    Perform,

    #[command(about = "Take a full backup")]
    PerformFull,

    #[command(about = "Take an incremental backup")]
    PerformIncremental,

    #[command(about = "Restore the newest backup chain into the MySQL data directory")]
    Restore(RestoreCommand),

    #[command(about = "Upload a file next to the backups")]
    Upload(UploadCommand),

    #[command(about = "Delete backups outside the retention window")]
    Prune(PruneCommand),

    #[command(about = "List backups")]
    ListBackups(ListBackupsCommand),

    #[command(about = "Send a test alert")]
    TestAlert,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    info!("Starting xtrasnap");

    let result = match cli.command {
        Commands::Perform => perform::run(&cli, BackupRequest::Decide).await,
        Commands::PerformFull => perform::run(&cli, BackupRequest::Full).await,
        Commands::PerformIncremental => perform::run(&cli, BackupRequest::Incremental).await,
        Commands::Restore(ref cmd) => cmd.run(&cli).await,
        Commands::Upload(ref cmd) => cmd.run(&cli).await,
        Commands::Prune(ref cmd) => cmd.run(&cli).await,
        Commands::ListBackups(ref cmd) => cmd.run(&cli).await,
        Commands::TestAlert => test_alert::run(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("xtrasnap={}", level)))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {}", e);
    }
}
