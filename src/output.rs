use std::fs::File;
use std::io::{self, Write, BufWriter};
use std::path::PathBuf;
use anyhow::Result;
use colored::*;

use crate::cli::OutputFormat;
use crate::scanner::ScanReport;

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Self {
        Self { format, file }
    }

    pub fn write(&self, report: &ScanReport) -> Result<()> {
        let output = self.render(report)?;

        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    pub fn render(&self, report: &ScanReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_human(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)? + "\n"),
            OutputFormat::Csv => Ok(format_csv(report)),
        }
    }
}

fn format_human(report: &ScanReport) -> String {
    let mut output = String::new();

    if report.open_ports.is_empty() {
        output.push_str(&format!("\n{}\n", "No open ports found".yellow()));
    } else {
        output.push_str(&format!("\n{}\n", "Open ports:".bold()));
        for port in &report.open_ports {
            output.push_str(&format!(
                "Port {} is {}\n",
                port.to_string().bold(),
                "open".green().bold()
            ));
        }
    }

    let summary = format!(
        "{} ports scanned on {} in {}ms",
        report.total_ports,
        report.host,
        report.duration_ms()
    );
    output.push_str(&format!("\n{}\n", summary.as_str().dimmed()));

    output
}

fn format_csv(report: &ScanReport) -> String {
    let mut csv = String::new();
    csv.push_str("host,port,state\n");

    for port in &report.open_ports {
        csv.push_str(&format!("{},{},open\n", report.host, port));
    }

    csv
}
