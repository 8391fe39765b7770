use std::path::Path;

use surge_core::{HttpClient, RunConfig, StopReason, Workload, WorkloadConfig};

use crate::cli::{RunArgs, ValidateArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::workload_yaml;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let cfg = load_config(&args.workload, args.overrides.run_config()).await?;

    out.print_header(&args.workload, &cfg);

    let workload = Workload::new(cfg, HttpClient::default())
        .map_err(|e| RunError::from_core("failed to prepare workload", e))?;

    let stop = workload.stop_signal();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && stop.stop(StopReason::Cancelled) {
            tracing::info!("interrupt received, stopping after in-flight requests");
        }
    });

    let report = workload.run().await;
    ctrl_c.abort();
    let report = report.map_err(|e| RunError::from_core("run failed", e))?;

    out.print_summary(&report)
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(report.passed()))
}

/// Loads and validates the workload without sending any request.
pub async fn validate(args: ValidateArgs) -> Result<WorkloadConfig, RunError> {
    load_config(&args.workload, args.overrides.run_config()).await
}

async fn load_config(path: &Path, overrides: RunConfig) -> Result<WorkloadConfig, RunError> {
    let opts = workload_yaml::load_workload_options(path)
        .await
        .map_err(RunError::InvalidInput)?;

    surge_core::workload_from_options(opts, overrides).map_err(|e| {
        RunError::InvalidInput(
            anyhow::Error::new(e).context(format!("invalid workload: {}", path.display())),
        )
    })
}
