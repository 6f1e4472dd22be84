mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{memory_app, rising_bars, sample_provider, send, send_json, FakeProvider};

#[tokio::test]
async fn snapshot_combines_metrics_kd_and_flows() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, body) = send_json(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["ticker"], "2330");
    assert_eq!(body["name"], "台積電");

    let metrics = &body["metrics"];
    assert_eq!(metrics["close"], 129.0);
    assert_eq!(metrics["percent_change"], 0.78);
    assert_eq!(metrics["volume_ratio"], 2.0);
    assert_eq!(metrics["turnover_rate"], 2.0);

    let kd = &body["kd"];
    assert!(kd["k"].as_f64().unwrap() > 50.0);
    assert!(kd["k"].as_f64().unwrap() <= 100.0);

    // Only the latest session counts, in lots
    let flows = &body["net_flows"];
    assert_eq!(flows["by_category"]["foreign"], 3000);
    assert_eq!(flows["by_category"]["trust"], -1000);
    assert_eq!(flows["by_category"]["dealer"], 100);
    assert_eq!(flows["total"], 2100);

    assert_eq!(body["provenance"]["prices"]["status"], "available");
    assert_eq!(body["provenance"]["prices"]["source"], "twse");
}

#[tokio::test]
async fn snapshot_degrades_when_every_provider_fails() {
    let app = memory_app(Arc::new(FakeProvider::failing()));

    let (status, body) = send_json(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);

    assert!(body["metrics"].is_null());
    assert!(body["kd"].is_null());
    assert!(body["net_flows"].is_null());
    assert_eq!(body["provenance"]["prices"]["status"], "failed");
    assert!(body["provenance"]["prices"]["detail"].is_string());
}

#[tokio::test]
async fn snapshot_is_served_from_cache_until_refresh() {
    let provider = Arc::new(sample_provider());
    let app = memory_app(provider.clone());

    send(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    let after_first = provider.call_count();

    send(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    assert_eq!(provider.call_count(), after_first);

    send(&app, "GET", "/api/stocks/2330/snapshot?refresh=true", None).await;
    assert!(provider.call_count() > after_first);
}

#[tokio::test]
async fn kd_series_is_aligned_with_bars() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, body) = send_json(&app, "GET", "/api/stocks/2330/kd?period=5&days=60", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], 5);

    let bars = body["bars"].as_array().unwrap();
    let points = body["points"].as_array().unwrap();
    assert_eq!(bars.len(), 30);
    assert_eq!(points.len(), bars.len());
    assert_eq!(points[0]["k"], 50.0);
    assert_eq!(points[0]["d"], 50.0);
}

#[tokio::test]
async fn kd_rejects_bad_parameters() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, _) = send(&app, "GET", "/api/stocks/2330/kd?period=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/stocks/2330/kd?days=100000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/stocks/not-a-ticker/kd", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn flow_history_has_one_summary_per_session() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, body) = send_json(&app, "GET", "/api/stocks/2330/flows?days=30", None).await;
    assert_eq!(status, StatusCode::OK);

    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["by_category"]["foreign"], 8000);
    assert_eq!(sessions[1]["total"], 2100);
}

#[tokio::test]
async fn scan_filters_and_sorts_by_change() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, body) = send_json(&app, "POST", "/api/scan", Some(json!({ "min_change_pct": 0.5 }))).await;
    assert_eq!(status, StatusCode::OK);

    let tickers: Vec<&str> = body["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["ticker"].as_str().unwrap())
        .collect();
    // 0050 is an ETF and 2603 fell
    assert_eq!(tickers, vec!["2330", "2317"]);
    assert_eq!(body["total_screened"], 4);
}

#[tokio::test]
async fn scan_applies_valuation_and_turnover() {
    let app = memory_app(Arc::new(sample_provider()));

    let (_, cheap) = send_json(&app, "POST", "/api/scan", Some(json!({ "max_pe_ratio": 20.0 }))).await;
    let hits = cheap["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["ticker"], "2317");
    assert_eq!(hits[0]["pe_ratio"], 12.0);

    // 2317 has no share count so its turnover cannot be evaluated
    let (_, active) = send_json(&app, "POST", "/api/scan", Some(json!({ "min_turnover_pct": 10.0 }))).await;
    let hits = active["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["ticker"], "2330");
    assert_eq!(hits[0]["turnover_rate"], 20.0);
}

#[tokio::test]
async fn scan_volume_ratio_skips_history_behind_the_snapshot() {
    let mut provider = sample_provider();
    // 2317 history stops the day before the snapshot session
    provider.bars.insert("2317".to_string(), rising_bars(29));
    let app = memory_app(Arc::new(provider));

    let (status, body) = send_json(&app, "POST", "/api/scan", Some(json!({ "min_volume_ratio": 1.5 }))).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["ticker"], "2330");
    assert_eq!(hits[0]["volume_ratio"], 2.0);
}

#[tokio::test]
async fn scan_rejects_inverted_band() {
    let app = memory_app(Arc::new(sample_provider()));

    let (status, _) = send(
        &app,
        "POST",
        "/api/scan",
        Some(json!({ "min_change_pct": 5.0, "max_change_pct": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scan_without_market_table_is_empty() {
    let app = memory_app(Arc::new(FakeProvider::failing()));

    let (status, body) = send_json(&app, "POST", "/api/scan", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hits"], json!([]));
    assert_eq!(body["market"]["status"], "failed");
}

#[tokio::test]
async fn cache_invalidation_forces_refetch() {
    let provider = Arc::new(sample_provider());
    let app = memory_app(provider.clone());

    send(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    let warm = provider.call_count();

    let (status, _) = send(&app, "DELETE", "/api/cache/2330", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    send(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    let after_ticker = provider.call_count();
    assert!(after_ticker > warm);

    let (status, _) = send(&app, "DELETE", "/api/cache", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    send(&app, "GET", "/api/stocks/2330/snapshot", None).await;
    assert!(provider.call_count() > after_ticker);
}
