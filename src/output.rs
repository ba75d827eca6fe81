use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::pipeline::{ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Reports stage progress through the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(
                stage = event.stage,
                elapsed_secs = elapsed.as_secs(),
                "{}",
                event.message
            ),
            None => info!(stage = event.stage, "{}", event.message),
        }
    }
}

pub fn print_summary(report: &RunReport) {
    println!(
        "raven: run {} ({}, {}) complete",
        report.run_label, report.project_id, report.library_type
    );
    for record in &report.records {
        let note = if record.skipped {
            " (skipped)"
        } else if record.tolerated {
            " (tolerated)"
        } else {
            ""
        };
        println!("  {:<40} exit={}{note}", record.stage, record.exit_status);
    }
    if let Some(hits) = &report.viral_hits {
        println!("  viral contigs: {}", hits.contigs);
    }
    println!("results: {}", report.final_dir);
}
