//! `hemisphere-motion` – drives an arm through hemisphere viewpoints.
//!
//! ```text
//! hemisphere-motion [CONFIG]
//! ```
//!
//! 1. Loads `CONFIG` (default `~/.hemi/config.toml`; written with defaults
//!    on first run).
//! 2. Optionally bridges the bus to a rosbridge server.
//! 3. Builds the simulated arm and the sequencer, publishes the built-in
//!    hemisphere when enabled, and runs the sequence.
//! 4. Prints the per-pose table and a summary.
//!
//! The sequence runs on its own task so Ctrl-C is honoured while the arm is
//! moving; an interrupted run writes no partial report.

mod config;

use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use hemi_middleware::{EventBus, RosbridgeClient};
use hemi_runtime::{HemisphereMotion, Report, telemetry};

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("hemisphere-motion");

    print_banner();

    let cfg = match load_config(std::env::args_os().nth(1).map(PathBuf::from)) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let code = runtime.block_on(run(cfg, stop_rx));
    // A move interrupted by Ctrl-C may still be blocking a worker.
    runtime.shutdown_background();
    code
}

/// Explicit paths must exist; the default path is created on first run.
fn load_config(explicit: Option<PathBuf>) -> Result<config::Config, String> {
    if let Some(path) = explicit {
        let cfg = config::load_from(&path)?
            .ok_or_else(|| format!("No config file at {}", path.display()))?;
        println!("  Config loaded from {}", path.display().to_string().bold());
        return Ok(cfg);
    }

    let path = config::config_path();
    match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            Ok(cfg)
        }
        None => {
            let mut cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

async fn run(cfg: config::Config, mut stop_rx: watch::Receiver<bool>) -> ExitCode {
    let settings = match cfg.motion_settings() {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let bus = Arc::new(EventBus::default());

    if let Some(url) = cfg.rosbridge_url.clone() {
        let client = RosbridgeClient::new(Arc::clone(&bus), cfg.topic_map());
        tokio::spawn(async move {
            if let Err(e) = client.run(&url).await {
                error!(url = %url, error = %e, "rosbridge client stopped");
            }
        });
    }

    let (arm, scene) = cfg.sim_world().build();
    let mut motion =
        match HemisphereMotion::new(settings, Arc::clone(&bus), Box::new(arm), Box::new(scene)) {
            Ok(m) => m,
            Err(e) => {
                println!("{}: {}", "Setup failed".red(), e);
                return ExitCode::FAILURE;
            }
        };

    if let Some(sampler) = cfg.sampler() {
        let published = sampler.publish(&bus);
        info!(viewpoints = published, "built-in hemisphere published");
    }

    let report_path = motion.settings().report_path.clone();
    let mut sequence = tokio::spawn(async move { motion.run().await });

    let result = tokio::select! {
        joined = &mut sequence => joined,
        Ok(_) = stop_rx.wait_for(|stopped| *stopped) => {
            sequence.abort();
            println!("{}", "  ✓ Stopped before completion; no report written.".green());
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(Ok(report)) => {
            print_summary(&report, report_path.as_deref());
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            println!("{}: {}", "Run failed".red().bold(), e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "sequence task failed");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(report: &Report, report_path: Option<&Path>) {
    println!();
    print!("{}", report.to_table());
    println!();

    let reached = format!("{}/{}", report.succeeded(), report.len());
    if report.failed() == 0 {
        println!("  {} poses reached within tolerance", reached.green().bold());
    } else {
        println!(
            "  {} poses reached within tolerance, {} not",
            reached.yellow().bold(),
            report.failed().to_string().red().bold()
        );
    }
    if let Some(path) = report_path {
        println!("  Report written to {}", path.display().to_string().bold());
    }
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"  _                _       _"#.bold().cyan());
    println!("{}", r#" | |_  ___ _ __  (_)  ___| |_  ___ _ _ ___"#.bold().cyan());
    println!("{}", r#" | ' \/ -_) '  \ | | (_-<| ' \/ -_) '_/ -_)"#.bold().cyan());
    println!("{}", r#" |_||_\___|_|_|_||_| /__/|_||_\___|_| \___|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "hemisphere-motion".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Viewpoint sequencing for robot arms");
    println!();
}
