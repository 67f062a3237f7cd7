use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::utils::PortRange;

#[derive(Parser, Debug)]
#[command(name = "tcpscan")]
#[command(version)]
#[command(about = "Concurrent TCP connect port scanner", long_about = None)]
#[command(after_help = "Example: tcpscan --host example.com --ports 1-1024")]
pub struct Cli {
    #[arg(short = 'H', long, help = "Target host (IP or domain)")]
    pub host: String,

    #[arg(short, long, help = "Port range (e.g. 20-80)")]
    pub ports: PortRange,

    #[arg(short, long, help = "Number of concurrent connect workers [config default: 100]")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Timeout in milliseconds for each port [config default: 1000]")]
    pub timeout: Option<u64>,

    #[arg(short = 'o', long, value_enum, help = "Output format [config default: human]")]
    pub output_format: Option<OutputFormat>,

    #[arg(short = 'f', long, help = "Output file path")]
    pub output_file: Option<PathBuf>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output")]
    Csv,
}
