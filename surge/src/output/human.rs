use std::fmt::Write as _;
use std::path::Path;

use surge_core::{RunReport, ThinkTime, WorkloadConfig};

mod format;
mod summary;

use format::format_duration;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, workload: &Path, cfg: &WorkloadConfig) {
        println!("{}", render_workload(workload, cfg));
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        print!("{}", render(report));

        let failed: Vec<_> = report.verdict.failed().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for v in failed {
                match v.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", v.metric, v.expression),
                    None => eprintln!(
                        "  {}: {} (only {} samples)",
                        v.metric, v.expression, v.samples
                    ),
                }
            }
        }

        Ok(())
    }
}

/// One block describing what a run will do. Also printed by `surge validate`.
pub(crate) fn render_workload(workload: &Path, cfg: &WorkloadConfig) -> String {
    let mut out = String::new();

    writeln!(out, "workload: {}", workload.display()).ok();
    writeln!(
        out,
        "target: POST {} (timeout {})",
        cfg.target.url,
        format_duration(cfg.target.timeout)
    )
    .ok();

    let duration = cfg.duration.map_or_else(|| "-".to_string(), format_duration);
    let iterations = cfg
        .iterations
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    let think = match cfg.think_time {
        ThinkTime::Fixed(d) => format_duration(d),
        ThinkTime::Uniform { min, max } => {
            format!("{}..{}", format_duration(min), format_duration(max))
        }
    };
    writeln!(
        out,
        "vus: {} duration={duration} iterations/vu={iterations} think_time={think}",
        cfg.vus
    )
    .ok();
    writeln!(
        out,
        "payload: userPrefix={} amount={}",
        cfg.payload.user_prefix, cfg.payload.amount
    )
    .ok();

    let checks = cfg
        .checks
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "checks: {checks}").ok();

    if cfg.thresholds.is_empty() {
        out.push_str("thresholds: -\n");
    } else {
        out.push_str("thresholds:\n");
        for t in &cfg.thresholds {
            let abort = if t.abort_on_fail { " (abortOnFail)" } else { "" };
            writeln!(out, "  {}: {}{abort}", t.metric, t.expression).ok();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::{RunConfig, ThresholdSet, WorkloadOptions, workload_from_options};

    #[test]
    fn render_workload_lists_target_checks_and_thresholds() {
        let cfg = workload_from_options(
            WorkloadOptions {
                vus: Some(10),
                duration: Some(std::time::Duration::from_secs(30)),
                base_url: Some("http://localhost:8080".to_string()),
                thresholds: vec![ThresholdSet {
                    metric: "http_req_failed".to_string(),
                    thresholds: vec!["rate<0.01".into()],
                }],
                ..WorkloadOptions::default()
            },
            RunConfig::default(),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let text = render_workload(Path::new("workload.yaml"), &cfg);
        assert!(text.contains("workload: workload.yaml"));
        assert!(text.contains("target: POST http://localhost:8080/reservas (timeout 1m)"));
        assert!(text.contains("vus: 10 duration=30s iterations/vu=- think_time=0s"));
        assert!(text.contains("checks: status is 202"));
        assert!(text.contains("  http_req_failed: rate<0.01\n"));
    }
}
