mod cli;
mod config;
mod error;
mod output;
mod scanner;
mod utils;

use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::output::OutputWriter;
use crate::scanner::{Scanner, TcpProber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let options = config.effective_scan_options(cli.timeout, cli.concurrency)?;
    let format = config.effective_format(cli.output_format)?;
    if !config.effective_color(cli.no_color) {
        colored::control::set_override(false);
    }

    if format == OutputFormat::Human {
        println!("Starting scan on host {}", cli.host.bold());
    }

    let pb = ProgressBar::new(cli.ports.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} ports scanned ({eta})")?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );

    let scanner = Scanner::new(Arc::new(TcpProber::new()), options).with_progress(pb);
    let report = match scanner.scan(&cli.host, cli.ports).await {
        Ok(report) => report,
        Err(err) => {
            if err.is_host_unreachable() {
                println!("{}", "Hostname could not be resolved".red().bold());
            }
            eprintln!("{} {}", "error:".red().bold(), err);
            process::exit(1);
        }
    };

    OutputWriter::new(format, cli.output_file).write(&report)?;

    Ok(())
}
