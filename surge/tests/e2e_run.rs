use std::process::Command;

use anyhow::Context as _;
use serde::Deserialize;
use surge_testserver::TestServer;

#[derive(Debug, Deserialize)]
struct Check {
    name: String,
    passes: u64,
    fails: u64,
}

#[derive(Debug, Deserialize)]
struct Threshold {
    metric: String,
    expression: String,
    passed: bool,
    samples: u64,
}

#[derive(Debug, Deserialize)]
struct Metric {
    name: String,
    #[serde(default)]
    tags: Vec<(String, String)>,
    values: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SummaryLine {
    kind: String,
    passed: bool,
    stop_reason: String,
    iterations: u64,
    vu_iterations: Vec<u64>,
    checks: Vec<Check>,
    metrics: Vec<Metric>,
    thresholds: Vec<Threshold>,
}

#[tokio::test]
async fn json_output_is_a_single_summary_line() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();

    let dir = tempfile::tempdir().context("tempdir")?;
    let path = dir.path().join("workload.yaml");
    tokio::fs::write(
        &path,
        r#"
vus: 3
iterations: 4
thresholds:
  http_req_failed: ["rate<0.01"]
  "http_req_duration{status:202}": ["p(99)<5s"]
"#,
    )
    .await
    .context("write workload")?;

    let exe = env!("CARGO_BIN_EXE_surge");
    let out = tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .arg("run")
            .arg(&path)
            .arg("--output")
            .arg("json")
            .env("SURGE_BASE_URL", &base_url)
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run surge binary")?;

    let distinct = server.stats().distinct_user_ids();
    server.shutdown().await;

    let stdout = String::from_utf8(out.stdout).context("stdout utf8")?;
    anyhow::ensure!(
        out.status.code() == Some(0),
        "exit {:?}\nstdout:\n{stdout}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    anyhow::ensure!(lines.len() == 1, "expected one JSON line, got:\n{stdout}");
    let summary: SummaryLine = serde_json::from_str(lines[0]).context("parse summary line")?;

    anyhow::ensure!(summary.kind == "summary");
    anyhow::ensure!(summary.passed);
    anyhow::ensure!(summary.stop_reason == "iterations_complete");
    anyhow::ensure!(summary.iterations == 12);
    anyhow::ensure!(summary.vu_iterations == vec![4, 4, 4]);
    anyhow::ensure!(distinct == 12, "server saw {distinct} distinct user ids");

    anyhow::ensure!(summary.checks.len() == 1);
    anyhow::ensure!(summary.checks[0].name == "status is 202");
    anyhow::ensure!((summary.checks[0].passes, summary.checks[0].fails) == (12, 0));

    let latency = summary
        .metrics
        .iter()
        .find(|m| m.name == "http_req_duration" && m.tags.is_empty())
        .context("http_req_duration series")?;
    anyhow::ensure!(latency.values["count"] == 12, "latency: {:?}", latency.values);

    anyhow::ensure!(summary.thresholds.len() == 2);
    anyhow::ensure!(summary.thresholds[1].metric == "http_req_duration{status:202}");
    anyhow::ensure!(summary.thresholds[1].expression == "p(99)<5s");
    anyhow::ensure!(summary.thresholds.iter().all(|t| t.passed && t.samples == 12));

    Ok(())
}

#[tokio::test]
async fn init_then_validate() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let root = dir.path().to_path_buf();
    let exe = env!("CARGO_BIN_EXE_surge");

    let out = tokio::task::spawn_blocking(move || {
        let init = Command::new(exe).arg("init").arg(&root).output()?;
        let again = Command::new(exe).arg("init").arg(&root).output()?;
        let validate = Command::new(exe)
            .arg("validate")
            .arg(root.join("workload.yaml"))
            .arg("--vus")
            .arg("3")
            .env_remove("SURGE_BASE_URL")
            .output()?;
        std::io::Result::Ok((init, again, validate))
    })
    .await
    .context("spawn_blocking join")?
    .context("run surge binary")?;
    let (init, again, validate) = out;

    anyhow::ensure!(init.status.code() == Some(0), "init failed: {init:?}");
    anyhow::ensure!(dir.path().join("workload.yaml").exists());

    anyhow::ensure!(again.status.code() == Some(40), "second init: {again:?}");
    anyhow::ensure!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let stdout = String::from_utf8_lossy(&validate.stdout);
    anyhow::ensure!(
        validate.status.code() == Some(0),
        "validate failed:\n{stdout}\n{}",
        String::from_utf8_lossy(&validate.stderr)
    );
    anyhow::ensure!(stdout.contains("vus: 3 duration=30s"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("target: POST http://localhost:8080/reservas"));
    anyhow::ensure!(stdout.trim_end().ends_with("ok"));

    Ok(())
}
