use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{info, warn};

use docsort::config::{default_config_path, load_config, validate_config, Config};
use docsort::error::DocsortError;
use docsort::logging::{init_logging, LogOptions};
use docsort::pipeline::{LogProgress, Pipeline};
use docsort::routing::RoutingTable;
use docsort::secrets::expand_home;
use docsort::worker::batch::EXIT_FATAL;
use docsort::worker::BatchRunner;

#[derive(Parser)]
#[command(
    name = "docsort",
    version,
    about = "Sorts an inbox of PDFs and scans into category folders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every document currently in the input folder
    Run {
        /// Config file (default: $DOCSORT_CONFIG, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Classify and route, but leave files where they are
        #[arg(long)]
        dry_run: bool,
        /// Override the configured input folder
        #[arg(long)]
        input: Option<PathBuf>,
        /// Debug logging when RUST_LOG is unset
        #[arg(short, long)]
        verbose: bool,
        /// Log JSON lines to stdout
        #[arg(long)]
        log_json: bool,
    },
    /// Validate the configuration and print the routing table
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            config,
            dry_run,
            input,
            verbose,
            log_json,
        } => run(
            config,
            dry_run,
            input,
            LogOptions {
                verbose,
                json: log_json,
            },
        ),
        Command::CheckConfig { config } => check_config(config),
    };

    match code {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(EXIT_FATAL as u8)
        }
    }
}

fn load(explicit: Option<PathBuf>) -> Result<Config, DocsortError> {
    let path = default_config_path(explicit)?;
    Ok(load_config(&path)?)
}

fn run(
    config_path: Option<PathBuf>,
    dry_run: bool,
    input: Option<PathBuf>,
    log_options: LogOptions,
) -> Result<i32, DocsortError> {
    let mut config = load(config_path)?;
    if dry_run {
        config.dry_run = true;
    }
    if let Some(input) = input {
        let input = expand_home(&input.to_string_lossy());
        config.input_folder = if input.is_absolute() {
            input
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&input))
                .unwrap_or(input)
        };
        validate_config(&config)?;
    }

    std::fs::create_dir_all(&config.report_folder).map_err(|e| {
        docsort::error::AuditError::CreateDirectory {
            path: config.report_folder.clone(),
            source: e,
        }
    })?;
    init_logging(Some(&config.report_folder), log_options)?;
    info!(
        "docsort v{} sorting {} into {}",
        env!("CARGO_PKG_VERSION"),
        config.input_folder.display(),
        config.output_folder.display()
    );

    let pipeline = Pipeline::from_config(&config)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let runner = BatchRunner::new(pipeline).with_shutdown(shutdown);
    let summary = runner.run(&LogProgress)?;
    if let Some(path) = &summary.report_path {
        info!("Report written to {}", path.display());
    }
    Ok(summary.exit_code())
}

fn check_config(config_path: Option<PathBuf>) -> Result<i32, DocsortError> {
    let config = load(config_path)?;
    let routing = RoutingTable::from_config(&config)?;

    println!("Configuration OK");
    println!("  input:   {}", config.input_folder.display());
    println!("  output:  {}", config.output_folder.display());
    println!("  reports: {}", config.report_folder.display());
    println!("  model:   {} @ {}", config.llm.model, config.llm.api_base);
    println!();

    let rows = routing.describe();
    let width = rows.iter().map(|(c, _, _)| c.len()).max().unwrap_or(0);
    for (category, folder, naming) in rows {
        let marker = if config.fallback_category.as_deref() == Some(category.as_str()) {
            " (fallback)"
        } else {
            ""
        };
        println!(
            "  {:<width$}  {}/{}{}",
            category,
            folder,
            naming,
            marker,
            width = width
        );
    }

    let entities = routing.entity_placeholders();
    if !entities.is_empty() {
        println!();
        println!("  entities requested from the model: {}", entities.join(", "));
    }
    Ok(0)
}
