pub mod export;
pub mod session;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use export::{process_export_command, ExportCommand};
use session::run_session;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    session::registry::{ProjectRegistry, DEFAULT_CONFIG},
    storage::record_storage::RecordStorageImpl,
    utils::{
        color::paint,
        dir::{create_application_default_path, create_dir, AppPaths},
        logging::{enable_logging, CLI_PREFIX},
        time::backup_dir_name,
    },
};

#[derive(Parser, Debug)]
#[command(name = "projtrack", version, long_about = None)]
#[command(about = "Toggle timers for your projects and export where the time went", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Configuration file. Defaults to config.toml in the application directory"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Write a starter config.toml if there is none")]
    Init {},
    #[command(about = "Start an interactive tracking session")]
    Run {},
    #[command(about = "Export tracked time as daily and weekly tables")]
    Export {
        #[command(flatten)]
        command: ExportCommand,
    },
    #[command(
        about = "Merge the records of every day log into one line per project. Originals are copied to a backup directory first"
    )]
    Consolidate {
        #[arg(long, help = "Confirm rewriting the day logs")]
        yes: bool,
    },
    #[command(about = "List configured projects")]
    Projects {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let root = match args.dir {
        Some(dir) => {
            create_dir(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    let paths = AppPaths::new(root, args.config);

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &paths.logs(), logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => init_config(&paths),
        Commands::Run {} => run_session(&paths).await,
        Commands::Export { command } => process_export_command(command, &paths).await,
        Commands::Consolidate { yes } => consolidate(&paths, yes).await,
        Commands::Projects {} => list_projects(&paths),
    }
}

fn init_config(paths: &AppPaths) -> Result<()> {
    if paths.config.exists() {
        println!("{} already exists", paths.config.display());
        return Ok(());
    }
    if let Some(parent) = paths.config.parent() {
        create_dir(parent)?;
    }
    std::fs::write(&paths.config, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {:?}", paths.config))?;
    info!("Created {:?}", paths.config);
    println!("Created {}", paths.config.display());
    Ok(())
}

fn list_projects(paths: &AppPaths) -> Result<()> {
    let load = ProjectRegistry::load(&paths.config)?;
    for project in load.registry.projects() {
        println!(
            "{:>2}  {}  {}",
            project.order_index + 1,
            paint(&project.color, "■■"),
            project.name
        );
    }
    if load.dropped > 0 {
        println!("{} more projects are ignored", load.dropped);
    }
    if load.registry.output_percentage() {
        println!("Weekly exports are written as percentages");
    }
    Ok(())
}

async fn consolidate(paths: &AppPaths, yes: bool) -> Result<()> {
    if !yes {
        bail!("Consolidation rewrites every day log. Run again with --yes to proceed");
    }
    let storage = RecordStorageImpl::new(paths.records.clone())?;
    let backup = paths.backup(&backup_dir_name(Local::now().date_naive()));
    let report = storage
        .consolidate(&backup)
        .await
        .context("Failed to consolidate day logs")?;
    println!(
        "Consolidated {} files from {} to {} lines. Originals are in {}",
        report.files,
        report.lines_before,
        report.lines_after,
        backup.display()
    );
    Ok(())
}
