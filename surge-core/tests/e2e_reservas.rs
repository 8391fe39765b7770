mod support;

use std::time::Duration;

use http::StatusCode;
use surge_core::metrics::{HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED};
use surge_core::{
    HttpClient, MetricsAggregator, StopReason, ThinkTime, ThresholdSet, Workload, WorkloadOptions,
};
use surge_metrics::SeriesSnapshot;
use surge_testserver::{TestServer, TestServerOptions};

use support::{config, options, thresholds};

fn smoke_thresholds() -> Vec<ThresholdSet> {
    vec![
        thresholds(HTTP_REQ_FAILED, &["rate<0.01"], false),
        thresholds(HTTP_REQ_DURATION, &["p(95)<500"], false),
    ]
}

fn failed_rate(metrics: &MetricsAggregator) -> Option<(u64, u64)> {
    match metrics.series(HTTP_REQ_FAILED, &[]) {
        Some(SeriesSnapshot::Rate { total, hits }) => Some((total, hits)),
        _ => None,
    }
}

#[tokio::test]
async fn single_accepted_reservation_passes() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let cfg = config(WorkloadOptions {
        thresholds: smoke_thresholds(),
        ..options(server.base_url())
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.iterations, 1);
    assert_eq!(report.checks[0].name, "status is 202");
    assert_eq!((report.checks[0].passes, report.checks[0].fails), (1, 0));
    assert_eq!(failed_rate(&metrics), Some((1, 0)));
    assert!(report.passed());

    assert_eq!(server.stats().requests_total(), 1);
    assert_eq!(server.stats().saw_json_content_type(), 1);
    assert_eq!(server.stats().rejected_payloads(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn server_error_fails_the_check_and_the_rate_threshold() {
    let server = TestServer::start_with(TestServerOptions {
        force_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..TestServerOptions::default()
    })
    .await
    .unwrap_or_else(|e| panic!("{e}"));
    let cfg = config(WorkloadOptions {
        thresholds: smoke_thresholds(),
        ..options(server.base_url())
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!((report.checks[0].passes, report.checks[0].fails), (0, 1));
    assert_eq!(failed_rate(&metrics), Some((1, 1)));
    assert!(!report.passed());

    let failed: Vec<_> = report.verdict.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metric, HTTP_REQ_FAILED);
    assert_eq!(failed[0].expression, "rate<0.01");
    assert_eq!(failed[0].observed, Some(1.0));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_vus_five_iterations_each() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let cfg = config(WorkloadOptions {
        vus: Some(10),
        iterations: Some(5),
        thresholds: smoke_thresholds(),
        ..options(server.base_url())
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.iterations, 50);
    assert_eq!(report.vu_iterations, vec![5; 10]);
    let latency = metrics
        .series(HTTP_REQ_DURATION, &[])
        .map_or(0, |s| s.samples());
    assert_eq!(latency, 50);
    assert_eq!(report.checks[0].passes, 50);
    assert!(report.passed());

    assert_eq!(server.stats().requests_total(), 50);
    assert_eq!(server.stats().distinct_user_ids(), 50);

    let tagged = metrics
        .series(HTTP_REQ_DURATION, &[("status", "202")])
        .map_or(0, |s| s.samples());
    assert_eq!(tagged, 50);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_target_is_a_failed_observation() {
    // Bind and drop to get a port nothing listens on.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap_or_else(|e| panic!("{e}"));
        l.local_addr().unwrap_or_else(|e| panic!("{e}")).port()
    };
    let cfg = config(WorkloadOptions {
        vus: Some(2),
        iterations: Some(2),
        ..options(&format!("http://127.0.0.1:{port}"))
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert!(matches!(
        metrics.series(HTTP_REQ_ERRORS, &[("error_kind", "connect")]),
        Some(SeriesSnapshot::Counter(4))
    ));
    assert_eq!(failed_rate(&metrics), Some((4, 4)));
    assert_eq!(report.iterations, 4);
    assert_eq!(report.checks_failed(), 4);
}

#[tokio::test]
async fn slow_target_times_out_per_request() {
    let server = TestServer::start_with(TestServerOptions {
        delay: Duration::from_millis(500),
        ..TestServerOptions::default()
    })
    .await
    .unwrap_or_else(|e| panic!("{e}"));
    let cfg = config(WorkloadOptions {
        timeout: Some(Duration::from_millis(50)),
        ..options(server.base_url())
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.iterations, 1);
    assert!(matches!(
        metrics.series(HTTP_REQ_ERRORS, &[("error_kind", "timeout")]),
        Some(SeriesSnapshot::Counter(1))
    ));
    assert_eq!(failed_rate(&metrics), Some((1, 1)));

    server.shutdown().await;
}

#[tokio::test]
async fn duration_run_against_live_target() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let cfg = config(WorkloadOptions {
        vus: Some(2),
        duration: Some(Duration::from_millis(300)),
        think_time: Some(ThinkTime::Uniform {
            min: Duration::from_millis(10),
            max: Duration::from_millis(30),
        }),
        ..options(server.base_url())
    });
    let w = Workload::new(cfg, HttpClient::default()).unwrap_or_else(|e| panic!("{e}"));
    let metrics = w.metrics().clone();

    let report = w.run().await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.stop_reason, StopReason::DurationElapsed);
    assert!(report.iterations >= 2);
    assert_eq!(server.stats().requests_total(), report.iterations);
    assert_eq!(report.checks_failed(), 0);
    assert_eq!(failed_rate(&metrics), Some((report.iterations, 0)));

    server.shutdown().await;
}
