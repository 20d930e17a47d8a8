mod cli;
mod config;
mod progress;
mod runner;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use progress::TerminalObserver;
use provision::{
    HostFilesystem, ReconcileOptions, ReconcileSummary, Reconciler, SystemDirectory, Systemd,
};
use runner::HostRunner;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&ui::error_chain(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = config::resolve(cli)?;

    if !cli.dry_run && !cli.quiet && !runner::is_root() {
        ui::warn("Not running as root; account creation will likely fail");
    }

    let systemd = Systemd::connect().context("systemd is not reachable")?;
    let directory = SystemDirectory::new(HostRunner);
    let options = ReconcileOptions {
        dry_run: cli.dry_run,
    };
    let mut observer = TerminalObserver::new(cli.quiet, cli.verbose > 0);

    let summary = Reconciler::new(&config, &directory, &HostFilesystem, &systemd)
        .with_options(options)
        .reconcile_path(&cli.manifest, &mut observer)?;

    if !cli.quiet {
        print_summary(&summary, cli.dry_run);
    }
    Ok(())
}

fn print_summary(summary: &ReconcileSummary, dry_run: bool) {
    println!();
    if dry_run {
        ui::info(&format!(
            "Dry run: {} to create, {} existing, {} ignored",
            summary.planned, summary.existing, summary.ignored
        ));
        return;
    }

    if summary.has_changes() {
        ui::success(&format!("Created {} accounts", summary.provisioned));
    } else {
        ui::info("No accounts to create");
    }
    ui::kv("existing", &summary.existing.to_string());
    ui::kv("ignored", &summary.ignored.to_string());
}
