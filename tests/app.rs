//! End-to-end tests: the exporter runs in-process with a scripted `btrfs`
//! and is scraped over HTTP.

mod helpers;

use helpers::app::{test_config, TestApp};
use helpers::{Script, ScriptedRunner, DEVICE_STATS_RAID, DEVICE_STATS_SINGLE};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_raid_filesystem_is_exported_over_http() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.healthy("/mnt/raid", DEVICE_STATS_RAID);

    let app = TestApp::start(test_config(&["/mnt/raid"]), runner.clone())
        .await
        .unwrap();

    let body = app
        .wait_for_metrics(
            |body| body.contains("smart_prom_scrape_iterations_total 1"),
            TIMEOUT,
        )
        .await
        .unwrap();

    for (device, devid) in [("/dev/sdc1", "1"), ("/dev/sdb1", "2")] {
        for stat_type in [
            "write_io_errs",
            "read_io_errs",
            "flush_io_errs",
            "corruption_errs",
            "generation_errs",
        ] {
            let line = format!(
                "btrfs_device_stat{{device=\"{device}\",devid=\"{devid}\",stat_type=\"{stat_type}\",path=\"/mnt/raid\"}} 0"
            );
            assert!(body.contains(&line), "missing '{line}' in:\n{body}");
        }
    }
    assert!(body.contains(
        "btrfs_filesystem_usage_bytes{stat_type=\"used\",path=\"/mnt/raid\"} 3612965650432"
    ));
    assert!(body.contains(
        "btrfs_filesystem_usage_bytes{stat_type=\"free_estimated\",path=\"/mnt/raid\"} 9192925765632"
    ));
    assert!(body.contains("# TYPE btrfs_device_stat gauge"));
    assert!(body.contains("# HELP btrfs_device_stat Btrfs device IO error statistics"));
    assert_eq!(app.gauges.device_stat.len(), 10);
    assert_eq!(runner.calls_for("/mnt/raid"), 2);

    let outcome = app.shutdown(TIMEOUT).await.unwrap();
    assert!(outcome.is_ok(), "App::run failed: {outcome:?}");
}

#[tokio::test]
async fn test_metrics_are_served_with_text_exposition_content_type() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.healthy("/mnt/data", DEVICE_STATS_SINGLE);

    let app = TestApp::start(test_config(&["/mnt/data"]), runner)
        .await
        .unwrap();

    let response = reqwest::get(app.metrics_url()).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    app.shutdown(TIMEOUT).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failing_path_does_not_hide_healthy_path() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.healthy("/mnt/good", DEVICE_STATS_SINGLE);
    runner.script("/mnt/bad", Script::Failing);

    let app = TestApp::start(test_config(&["/mnt/bad", "/mnt/good"]), runner.clone())
        .await
        .unwrap();

    let body = app
        .wait_for_metrics(
            |body| body.contains("smart_prom_scrape_iterations_total 1"),
            TIMEOUT,
        )
        .await
        .unwrap();

    assert!(body.contains("path=\"/mnt/good\""));
    let bad_series = body
        .lines()
        .filter(|line| {
            line.starts_with("btrfs_device_stat{")
                || line.starts_with("btrfs_filesystem_usage_bytes{")
        })
        .filter(|line| line.contains("path=\"/mnt/bad\""))
        .count();
    assert_eq!(bad_series, 0, "{body}");
    assert_eq!(runner.calls_for("/mnt/bad"), 2);
    assert_eq!(app.gauges.filesystem_usage.len(), 2);

    app.shutdown(TIMEOUT).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_btrfs_binary_stops_the_exporter_with_an_error() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.script("/mnt/data", Script::ToolMissing);

    let app = TestApp::start(test_config(&["/mnt/data"]), runner)
        .await
        .unwrap();

    let outcome = app.join(TIMEOUT).await.unwrap();
    let err = outcome.unwrap_err();
    assert!(
        format!("{err:#}").contains("cannot be found"),
        "unexpected error: {err:#}"
    );
}

#[tokio::test]
async fn test_no_monitor_paths_still_serves_iteration_counter() {
    let runner = Arc::new(ScriptedRunner::new());
    let app = TestApp::start(test_config(&[]), runner).await.unwrap();

    let body = app
        .wait_for_metrics(
            |body| body.contains("smart_prom_scrape_iterations_total 1"),
            TIMEOUT,
        )
        .await
        .unwrap();
    assert!(!body.contains("btrfs_device_stat{"));

    app.shutdown(TIMEOUT).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_reported_by_build() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config(&[]);
    config.port = occupied.local_addr().unwrap().port();

    let result = TestApp::start(config, Arc::new(ScriptedRunner::new())).await;

    let err = result.err().expect("binding an occupied port must fail");
    assert!(format!("{err:#}").contains("failed to bind metrics endpoint"));
}
