//! fwaudit - firmware filesystem image auditor.
//!
//! Walks one image (unpacked directory or squashfs), runs the configured
//! checks over every entry and prints a JSON report.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use fwaudit::analyzer::Analyzer;
use fwaudit::common::write_file_with_dirs;
use fwaudit::config::Config;
use fwaudit::plugins::{FileStatCheck, FileTree, GlobalFileChecks};

#[derive(Parser)]
#[command(name = "fwaudit")]
#[command(about = "Audit a firmware filesystem image against a policy")]
struct Cli {
    /// Filesystem image file or path to an unpacked directory
    #[arg(long = "in")]
    input: String,

    /// Config file
    #[arg(long)]
    cfg: String,

    /// Directory to search for the config and included files (repeatable)
    #[arg(long)]
    cfgpath: Vec<PathBuf>,

    /// Report destination, `-` for stdout
    #[arg(long, default_value = "-")]
    out: String,

    /// Directory holding extra data such as file tree snapshots
    /// (default: directory of --cfg)
    #[arg(long)]
    extra: Option<PathBuf>,

    /// Exit with status 1 if any offenders were found
    #[arg(long)]
    ee: bool,

    /// More log output on stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = std::env::var("FWAUDIT_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<bool> {
    let config = Config::load(&cli.cfg, &cli.cfgpath)
        .with_context(|| format!("could not read config file: {}", cli.cfg))?;

    let extra = cli.extra.clone().unwrap_or_else(|| {
        Path::new(&cli.cfg)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });

    let mut analyzer = Analyzer::from_config(&cli.input, &config)
        .with_context(|| format!("could not open image: {}", cli.input))?;
    analyzer.fs_type_supported()?;

    analyzer.add_plugin(Box::new(GlobalFileChecks::new(&config.text)?));
    analyzer.add_plugin(Box::new(FileStatCheck::new(&config.text)?));
    analyzer.add_plugin(Box::new(FileTree::new(&config.text, Some(&extra))?));

    analyzer.run_plugins().context("scan failed")?;

    let report = analyzer.json_report()?;
    if cli.out == "-" {
        println!("{report}");
    } else {
        write_file_with_dirs(&cli.out, format!("{report}\n"))
            .with_context(|| format!("can't write report to: {}", cli.out))?;
    }

    analyzer.cleanup()?;
    Ok(analyzer.has_offenders())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(has_offenders) if cli.ee && has_offenders => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
