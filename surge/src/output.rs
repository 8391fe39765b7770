use std::path::Path;

use surge_core::{RunReport, WorkloadConfig};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) use human::render_workload;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, workload: &Path, cfg: &WorkloadConfig);
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
