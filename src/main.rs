//! # Logger Export CLI (`lgx`)
//!
//! Browse the device directory, preview a device's readings over a date
//! range, export them as CSV/XLSX/PDF, or run the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lgx --config ./config/lgx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lgx init` | Create the directory catalog schema |
//! | `lgx groups` | List directory groups |
//! | `lgx devices <group>` | List the devices of a group |
//! | `lgx dates <device>` | List dates present in a device's data |
//! | `lgx preview <device> --start --end` | Print the HTML preview |
//! | `lgx export <device> --start --end --format <fmt>` | Write an export file |
//! | `lgx serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! lgx export ABC123 --start 2024-01-01 --end 2024-01-10 --format xlsx --output ./out
//! RUST_LOG=debug lgx serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use logger_export::config::{self, Config};
use logger_export::directory::Directory;
use logger_export::logging::init_tracing;
use logger_export::migrate;
use logger_export::models::{DateRange, ExportFormat};
use logger_export::server;
use logger_export::service::ExportService;
use logger_export::traits::build_backend;

/// Logger Export: date-range previews and CSV/XLSX/PDF exports of device
/// time-series data from local or cloud-drive storage.
#[derive(Parser)]
#[command(name = "lgx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lgx.toml")]
    config: PathBuf,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the directory catalog and its schema. Idempotent.
    Init,

    /// List directory groups.
    Groups,

    /// List the devices of a group.
    Devices { group: String },

    /// List the distinct dates present in a device's data.
    Dates { device: String },

    /// Print the HTML preview for a date range (most recent days only).
    Preview {
        device: String,
        /// First date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        start: String,
        /// Last date, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: String,
    },

    /// Export a date range to a file.
    Export {
        device: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// One of `csv`, `xlsx`, `pdf`.
        #[arg(long, default_value = "csv")]
        format: String,
        /// Directory to write the file into.
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(Some(cli.log_level.as_str()))?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg.directory.path).await?;
            println!(
                "Directory catalog initialized at {}",
                cfg.directory.path.display()
            );
        }
        Commands::Groups => {
            let directory = Directory::load(&cfg.directory.path).await?;
            for group in directory.list_groups() {
                println!("{}", group);
            }
        }
        Commands::Devices { group } => {
            let directory = Directory::load(&cfg.directory.path).await?;
            let devices = directory.list_devices_for(&group);
            if devices.is_empty() {
                anyhow::bail!("no devices in group '{}'", group);
            }
            for entry in devices {
                println!("{}\t{}", entry.device_id, entry.display_name);
            }
        }
        Commands::Dates { device } => {
            let service = build_service(&cfg).await?;
            for date in service.available_dates(&device).await? {
                println!("{}", date);
            }
        }
        Commands::Preview { device, start, end } => {
            let range = DateRange::parse(Some(start.as_str()), Some(end.as_str()))?;
            let service = build_service(&cfg).await?;
            let preview = service.preview(&device, &range).await?;
            if preview.truncated {
                tracing::info!(
                    shown_days = preview.dates.len(),
                    "preview limited to the most recent days; export for the full range"
                );
            }
            println!("{}", preview.html);
        }
        Commands::Export {
            device,
            start,
            end,
            format,
            output,
        } => {
            let format = ExportFormat::parse(&format)?;
            let range = DateRange::parse(Some(start.as_str()), Some(end.as_str()))?;
            let service = build_service(&cfg).await?;
            let artifact = service.export(&device, &range, format).await?;

            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let path = output.join(&artifact.file_name);
            std::fs::write(&path, &artifact.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn build_service(cfg: &Config) -> anyhow::Result<ExportService> {
    let directory = Directory::load(&cfg.directory.path).await?;
    let backend = build_backend(cfg)?;
    tracing::debug!(backend = ?backend.kind(), "storage ready");
    Ok(ExportService::new(backend, Arc::new(directory), cfg))
}
