//! Simulated workload observed through the scrape endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use pondmetrics::{
    config::WorkloadConfig,
    handlers::{self, AppState},
    metrics::Registry,
    workload::{self, DemoMetrics},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test(start_paused = true)]
async fn test_workload_progress_is_visible_to_scrapes() {
    let registry = Arc::new(Registry::new());
    let demo = DemoMetrics::register(&registry).unwrap();
    let config = WorkloadConfig::default();
    demo.seed_jobs(&config.seed_job_type, config.seed_job_count)
        .unwrap();

    let handle = workload::spawn(&demo, &config);
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let app = handlers::router(AppState::new(Arc::clone(&registry)));
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();

    handle.shutdown().await;

    assert!(body.contains("job_in_queue{job_type=\"testjob\"} 3\n"));
    assert!(body.contains("pond_temperature_celsius_count 1000\n"));
    assert!(body.contains("pond_temperature_histogram_celsius_count 1000\n"));
    assert!(body.contains("pond_temperature_histogram_celsius_bucket{le=\"+Inf\"} 1000\n"));

    let completed = demo.completed_tasks.get();
    assert!(completed >= 2.0, "expected at least two periods, got {}", completed);
    assert_eq!(demo.ops_queued.get(), 4.0 * (completed + 1.0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_updates() {
    let registry = Registry::new();
    let demo = DemoMetrics::register(&registry).unwrap();

    let handle = workload::spawn(&demo, &WorkloadConfig::default());
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    handle.shutdown().await;

    let queued = demo.ops_queued.get();
    let completed = demo.completed_tasks.get();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(demo.ops_queued.get(), queued);
    assert_eq!(demo.completed_tasks.get(), completed);
}
