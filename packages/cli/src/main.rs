//! cloudsync CLI
//!
//! Drives a local cloudsync deployment (registry database plus blob root, as
//! configured by `config/config.toml` and `CLOUDSYNC__*` variables).

mod local;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use cloudsync_server::config::AppConfig;
use cloudsync_server::error::AppError;
use cloudsync_server::handlers::{file, sync};
use cloudsync_server::models::{Owner, ReconcilePlan, UploadRequest};
use cloudsync_server::state::AppState;
use common::storage::BoxReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Per-owner file store with deduplication and sync planning.
#[derive(Parser)]
#[command(name = "cloudsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Owner whose files are operated on
    #[arg(global = true, short, long, env = "CLOUDSYNC_OWNER")]
    owner: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file, replacing any file with the same name
    Upload {
        path: PathBuf,

        /// Logical name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List files, most recently modified first
    List,

    /// Download a file
    Download {
        name: String,

        /// Destination file or directory
        dest: PathBuf,
    },

    /// Delete a file
    Delete { name: String },

    /// Print the transfer plan for an inventory as JSON
    #[command(group(ArgGroup::new("source").required(true).args(["inventory", "dir"])))]
    Reconcile {
        /// JSON inventory: [{"name", "hash", "last_modified"}]
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Flat directory to build the inventory from
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Reconcile a flat directory and apply the plan
    Sync {
        #[arg(long)]
        dir: PathBuf,

        /// Show the plan without transferring anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{}", render_error(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let owner = cli
        .owner
        .context("An owner is required (--owner or CLOUDSYNC_OWNER)")?;
    let owner = Owner::parse(owner)?;

    let config = AppConfig::load().context("Failed to load config")?;
    let state = AppState::from_config(config).await?;

    match cli.command {
        Commands::Upload { path, name } => upload(&state, &owner, &path, name).await?,
        Commands::List => list(&state, &owner).await?,
        Commands::Download { name, dest } => download(&state, &owner, &name, &dest).await?,
        Commands::Delete { name } => {
            let removed = file::delete_file(&state, &owner, &name).await?;
            println!("Deleted {} ({})", removed.name, removed.content_hash);
        }
        Commands::Reconcile { inventory, dir } => {
            let entries = match (inventory, dir) {
                (Some(path), _) => local::load_inventory(&path).await?,
                (None, Some(dir)) => local::scan_dir(&dir).await?,
                (None, None) => anyhow::bail!("Either --inventory or --dir is required"),
            };
            let plan = sync::reconcile(&state, &owner, entries).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Sync { dir, dry_run } => sync_dir(&state, &owner, &dir, dry_run).await?,
    }

    Ok(())
}

/// File store errors are printed as a `{"code", "message"}` JSON body.
fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AppError>() {
        Some(app_err) => serde_json::to_string(&app_err.to_body())
            .unwrap_or_else(|_| format!("{}: {app_err}", app_err.code())),
        None => format!("Error: {err:#}"),
    }
}

async fn upload(
    state: &AppState,
    owner: &Owner,
    path: &Path,
    name: Option<String>,
) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a name from {}", path.display()))?,
    };

    let handle = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let declared = handle.metadata().await?.len();
    let reader: BoxReader = Box::new(handle);

    let request = UploadRequest::new(name).with_declared_size(declared);
    let record = file::upload_file(state, owner, request, reader).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn list(state: &AppState, owner: &Owner) -> anyhow::Result<()> {
    let listing = file::list_files(state, owner).await?;
    for record in &listing.files {
        println!(
            "{:<40} {:>12} v{:<4} {} {}",
            record.name,
            record.size,
            record.version,
            record.last_modified.to_rfc3339(),
            record.content_hash.get(..12).unwrap_or(&record.content_hash),
        );
    }
    println!("{} file(s)", listing.total);
    Ok(())
}

async fn download(state: &AppState, owner: &Owner, name: &str, dest: &Path) -> anyhow::Result<()> {
    let opened = file::open_file(state, owner, name).await?;

    let (dir, local_name) = if dest.is_dir() {
        (dest.to_path_buf(), opened.record.name.clone())
    } else {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let local_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid destination {}", dest.display()))?;
        (dir, local_name)
    };

    let written = local::write_file(&dir, &local_name, opened.reader).await?;
    println!("Wrote {written} bytes to {}", dir.join(&local_name).display());
    Ok(())
}

async fn sync_dir(state: &AppState, owner: &Owner, dir: &Path, dry_run: bool) -> anyhow::Result<()> {
    let entries = local::scan_dir(dir).await?;
    let plan = sync::reconcile(state, owner, entries).await?;

    if dry_run || plan.is_empty() {
        print_plan(&plan);
        return Ok(());
    }

    let mut failures = 0usize;

    for name in &plan.to_upload {
        let path = local::local_path(dir, name)?;
        let result = async {
            let handle = tokio::fs::File::open(&path).await?;
            let reader: BoxReader = Box::new(handle);
            file::upload_file(state, owner, UploadRequest::new(name.clone()), reader).await?;
            anyhow::Ok(())
        }
        .await;

        match result {
            Ok(()) => println!("uploaded   {name}"),
            Err(e) => {
                warn!(name = %name, error = %e, "Upload failed");
                failures += 1;
            }
        }
    }

    for record in &plan.to_download {
        let result = async {
            let opened = file::download_file(state, owner, record.id).await?;
            local::write_file(dir, &record.name, opened.reader).await
        }
        .await;

        match result {
            Ok(_) => println!("downloaded {}", record.name),
            Err(e) => {
                warn!(name = %record.name, error = %e, "Download failed");
                failures += 1;
            }
        }
    }

    info!(
        uploaded = plan.to_upload.len(),
        downloaded = plan.to_download.len(),
        failures,
        "Sync finished"
    );

    if failures > 0 {
        anyhow::bail!("{failures} transfer(s) failed");
    }
    Ok(())
}

fn print_plan(plan: &ReconcilePlan) {
    if plan.is_empty() {
        println!("Up to date");
        return;
    }
    for name in &plan.to_upload {
        println!("upload     {name}");
    }
    for record in &plan.to_download {
        println!("download   {}", record.name);
    }
}
