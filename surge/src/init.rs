use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::InitArgs;

pub(crate) const WORKLOAD_FILE: &str = "workload.yaml";

/// Reservation smoke test: 10 VUs for 30s against a local service.
pub(crate) const STARTER_WORKLOAD: &str = r#"# surge workload
#   surge run workload.yaml
#   surge run workload.yaml --vus 50 --duration 1m --base-url http://staging:8080

vus: 10
duration: 30s
# Per-VU cap; the run ends at whichever of duration/iterations comes first.
# iterations: 100

target:
  baseUrl: http://localhost:8080
  path: /reservas
  timeout: 60s

payload:
  userPrefix: user
  amount: 120.50

# Fixed (300ms) or uniform ({min: 100ms, max: 500ms}).
thinkTime: 300ms

expectStatus: 202

checks:
  - name: status is 202
    status: 202
  - name: has reservationId
    jsonField: reservationId

thresholds:
  http_req_failed:
    - threshold: rate<0.01
      abortOnFail: true
  http_req_duration:
    - p(95)<500
"#;

pub async fn init(args: InitArgs) -> anyhow::Result<PathBuf> {
    let path = args.dir.join(WORKLOAD_FILE);
    write_file(&path, STARTER_WORKLOAD, args.force).await?;
    Ok(path)
}

async fn write_file(path: &Path, contents: &str, force: bool) -> anyhow::Result<()> {
    if !force
        && tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("failed to check file existence: {}", path.display()))?
    {
        anyhow::bail!(
            "refusing to overwrite existing file (use --force): {}",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create dir: {}", parent.display()))?;
    }

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write file: {}", path.display()))
}
