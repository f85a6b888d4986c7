// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pvbridge tree runner CLI
//!
//! # Usage
//!
//! ```bash
//! # Run a tree with the default (empty) simulated PV set
//! pvbridge-runner run tree.xml
//!
//! # With a configuration file and a faster tick
//! pvbridge-runner run --config pvbridge.toml --tick-interval 2 tree.xml
//!
//! # Log to a file instead of stderr
//! pvbridge-runner run --config pvbridge.toml --log-file run.log tree.xml
//!
//! # Check a configuration and a tree
//! pvbridge-runner validate --config pvbridge.toml --tree tree.xml
//! ```

use clap::{Parser, Subcommand};
use pvbridge_runner::{exit_code, Runner, RunnerConfig, RunnerError};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// pvbridge behavior tree runner
#[derive(Parser, Debug)]
#[command(name = "pvbridge-runner")]
#[command(about = "Run a PV behavior tree against the simulated client")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pause between ticks (milliseconds)
    #[arg(long, global = true)]
    tick_interval: Option<u64>,

    /// Default request timeout (milliseconds)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error) or filter directive
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tick a tree until it settles
    Run {
        /// Tree definition (BTCPP_format 4 XML)
        tree: PathBuf,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "pvbridge.toml")]
        output: PathBuf,
    },

    /// Validate the configuration and, optionally, a tree definition
    Validate {
        /// Tree definition to load against the configuration
        #[arg(short, long)]
        tree: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Commands::GenConfig { output } = &args.command {
        return cmd_gen_config(output);
    }

    let config = build_config(&args)?;
    init_logging(&args, &config)?;

    let tree_path = match &args.command {
        Commands::Run { tree } => tree,
        Commands::Validate { tree } => return cmd_validate(config, tree.as_deref()),
        Commands::GenConfig { .. } => return Ok(()),
    };

    let runner = Runner::new(config)?;
    let tree = runner.load_file(tree_path)?;

    println!("pvbridge runner v{}", env!("CARGO_PKG_VERSION"));
    println!("Tree: {} ({})", tree.id(), tree_path.display());
    println!();

    let code = match runner.run(tree) {
        Ok(status) => {
            println!("Tree finished: {}", status);
            exit_code(status)
        }
        Err(e) => {
            eprintln!("Tree aborted: {}", e);
            2
        }
    };
    runner.shutdown();

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<RunnerConfig, RunnerError> {
    let mut config = match args.config.as_deref() {
        Some(path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };

    // Command line overrides
    if let Some(ms) = args.tick_interval {
        config.runner.tick_interval_ms = ms;
    }
    if let Some(ms) = args.timeout {
        config.bridge.default_timeout_ms = ms;
    }
    if let Some(level) = &args.log_level {
        config.runner.log_level = level.clone();
    }
    config.validate()?;

    Ok(config)
}

fn init_logging(args: &Args, config: &RunnerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = &config.runner.log_level;
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
    Ok(())
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&RunnerConfig::example())?;

    // Add comments
    let content = format!(
        r#"# pvbridge runner configuration
# Generated by pvbridge-runner gen-config
#
# [[sim.pvs]] entries are served by the in-process simulated client.
# kind: int32 | float32 | float64 | enum | text

{}
"#,
        toml_str
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(
    config: RunnerConfig,
    tree: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration valid!");
    println!();
    println!("Default timeout: {} ms", config.bridge.default_timeout_ms);
    println!("Tick interval:   {} ms", config.runner.tick_interval_ms);
    println!("Simulated PVs:   {}", config.sim.pvs.len());
    for pv in &config.sim.pvs {
        println!(
            "  {} ({}) = {}{}",
            pv.name,
            pv.kind,
            pv.value,
            if pv.never_connect { " [never connects]" } else { "" }
        );
    }

    let Some(path) = tree else {
        return Ok(());
    };

    let runner = Runner::new(config)?;
    let result = runner.load_file(path).map(|tree| tree.id().to_string());
    runner.shutdown();
    match result {
        Ok(id) => {
            println!();
            println!("Tree '{}' loaded from {}", id, path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Tree invalid: {}", e);
            std::process::exit(1);
        }
    }
}
