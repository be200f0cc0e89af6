//! BetterBlocker CLI
//!
//! CLI tool for rebuilding and distributing content blocker bundles.

mod config;
mod sources;
mod transport;
mod watcher;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use ts_rs::TS;

use bb_compiler::{CompilerAdapter, ExternalConverter};
use bb_core::{Broadcast, Event, RuleAggregator};
use bb_updater::{DebouncedTrigger, UpdatePipeline};

use config::Config;
use sources::{FileAntibanner, FileSettings, FileWhitelist};
use transport::{DirectoryTransport, StdoutTransport};
use watcher::InputWatcher;

#[derive(Parser)]
#[command(name = "bb-cli")]
#[command(about = "BetterBlocker content blocker updater")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one update cycle and exit
    Run {
        /// Config file
        #[arg(short, long)]
        config: String,

        /// Also write each bundle to <OUT_DIR>/<bundleId>.json
        #[arg(short, long)]
        out_dir: Option<String>,

        /// Do not stream events to stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Keep content blockers updated while the input files change
    Watch {
        /// Config file
        #[arg(short, long)]
        config: String,

        /// Also write each bundle to <OUT_DIR>/<bundleId>.json
        #[arg(short, long)]
        out_dir: Option<String>,

        /// Do not stream events to stdout
        #[arg(short, long)]
        quiet: bool,
    },

    /// Write TypeScript definitions for the emitted events
    ExportTypes {
        /// Output directory
        #[arg(short, long, default_value = "bindings")]
        out_dir: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(level))
        .target(Target::Stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            out_dir,
            quiet,
        } => cmd_run(&config, out_dir.as_deref(), quiet),
        Commands::Watch {
            config,
            out_dir,
            quiet,
        } => cmd_watch(&config, out_dir.as_deref(), quiet),
        Commands::ExportTypes { out_dir } => cmd_export_types(&out_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: &str) -> Result<Config, String> {
    Config::load(Path::new(path)).map_err(|e| e.to_string())
}

fn build_pipeline(config: &Config, out_dir: Option<&str>, quiet: bool) -> Result<UpdatePipeline, String> {
    let mut notifier = Broadcast::new();
    if !quiet {
        notifier.subscribe(Arc::new(StdoutTransport));
    }
    if let Some(dir) = out_dir {
        notifier.subscribe(Arc::new(DirectoryTransport::new(dir)?));
    }

    let converter = ExternalConverter::new(&config.converter.command)
        .with_args(config.converter.args.clone())
        .with_optimize(config.converter.optimize);

    let aggregator = RuleAggregator::new(
        Arc::new(FileAntibanner::new(config.filters.clone())),
        Arc::new(FileWhitelist::new(config.whitelist.clone())),
        Arc::new(FileSettings::new(config.settings.clone())),
    );

    Ok(UpdatePipeline::new(
        aggregator,
        config.grouping_policy(),
        CompilerAdapter::new(Arc::new(converter)),
        Arc::new(notifier),
    )
    .with_rules_limit(config.rules_limit))
}

fn cmd_run(config_path: &str, out_dir: Option<&str>, quiet: bool) -> Result<(), String> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config, out_dir, quiet)?;

    let result = pipeline.run_cycle();

    if quiet {
        if result.filtering_disabled {
            println!("Filtering is disabled, no bundles updated");
        } else {
            println!("Updated {} bundles", pipeline.policy().bundles().len() + 1);
            println!("  Rules:       {}", result.total_rules);
            println!("  Over limit:  {}", result.any_over_limit);
            println!("  Advanced:    {}", result.advanced_rule_count);
        }
    }

    Ok(())
}

fn cmd_watch(config_path: &str, out_dir: Option<&str>, quiet: bool) -> Result<(), String> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config, out_dir, quiet)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(watch_async(config, pipeline))
}

async fn watch_async(config: Config, pipeline: UpdatePipeline) -> Result<(), String> {
    let mut watcher = InputWatcher::start(&config.watched_paths())?;

    let period = Duration::from_millis(config.debounce_ms);
    let trigger = DebouncedTrigger::with_period(Arc::new(pipeline), period);

    // Application startup counts as a change.
    trigger.request_update();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    log::info!("Press Ctrl-C to stop");
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            Some(()) = watcher.changed() => {
                log::info!("Input files changed");
                trigger.request_update();
            }
        }
    }

    let cycles = trigger.completed_cycles();
    trigger.shutdown().await;
    log::info!("Stopped after {} update cycles", cycles);
    Ok(())
}

fn cmd_export_types(out_dir: &str) -> Result<(), String> {
    fs::create_dir_all(out_dir).map_err(|e| format!("Failed to create '{}': {}", out_dir, e))?;
    Event::export_all_to(out_dir).map_err(|e| format!("Failed to export types: {}", e))?;
    println!("Wrote TypeScript definitions to '{}'", out_dir);
    Ok(())
}
