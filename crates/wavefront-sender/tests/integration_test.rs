// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::helpers::{deploy_event, next_payload, power_usage_metric, start_proxy_listener, test_config};
use common::mocks::{FailingTransport, RecordingTransport};
use mockito::{Matcher, Server};
use tokio::time::{sleep, timeout};
use wavefront_sender::auth::CspCredentials;
use wavefront_sender::config::{Authorization, CspConfig, DirectConfig, ProxyConfig, SenderConfig};
use wavefront_sender::entities::histogram::WavefrontHistogram;
use wavefront_sender::entities::{
    Centroid, Distribution, Event, HistogramGranularity, Metric, Tags,
};
use wavefront_sender::errors::SenderError;
use wavefront_sender::factory::{ClientFactory, ClientOptions};
use wavefront_sender::transport::DataFormat;
use wavefront_sender::{WavefrontClient, WavefrontMultiClient, WavefrontSender};

const METRIC_LINE: &str =
    "\"new-york.power.usage\" 42422.0 1493773500 source=\"localhost\" \"datacenter\"=\"dc1\"\n";

#[tokio::test]
async fn direct_client_ships_metrics_with_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/report")
        .match_query(Matcher::UrlEncoded("f".into(), "wavefront".into()))
        .match_header("authorization", "Bearer my-token")
        .match_header("content-type", "application/octet-stream")
        .match_body(METRIC_LINE)
        .with_status(202)
        .create_async()
        .await;

    let client = WavefrontClient::direct(
        &DirectConfig::new(&server.url(), Authorization::Token("my-token".to_string())),
        &test_config(),
    )
    .expect("failed to create client");

    client.send_metric(&power_usage_metric());
    assert_eq!(client.flush_now().await, 1);
    mock.assert_async().await;

    client.close().await.expect("close failed");
    assert_eq!(client.get_failure_count(), 0);
}

#[tokio::test]
async fn direct_client_uses_csp_token_for_reports_and_events() {
    let mut server = Server::new_async().await;
    let auth = server
        .mock("POST", "/csp/gateway/am/api/auth/api-tokens/authorize")
        .match_body("api_token=my-api-token")
        .with_status(200)
        .with_body(r#"{"access_token":"csp-access","expires_in":1800,"scope":"aoa:directDataIngestion"}"#)
        .expect(1)
        .create_async()
        .await;
    let report = server
        .mock("POST", "/report")
        .match_query(Matcher::UrlEncoded("f".into(), "wavefront".into()))
        .match_header("authorization", "Bearer csp-access")
        .with_status(200)
        .create_async()
        .await;
    let event = server
        .mock("POST", "/api/v2/event")
        .match_header("authorization", "Bearer csp-access")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJsonString(
            r#"{"name":"event name","hosts":["localhost"],"startTime":1592200048,"endTime":1592201048,"tags":["env","dev"]}"#
                .to_string(),
        ))
        .with_status(200)
        .create_async()
        .await;

    let csp = CspConfig {
        base_url: server.url(),
        credentials: CspCredentials::ApiToken("my-api-token".to_string()),
    };
    let client = WavefrontClient::direct(
        &DirectConfig::new(&server.url(), Authorization::Csp(csp)),
        &SenderConfig {
            compress: true,
            ..test_config()
        },
    )
    .expect("failed to create client");

    client.send_metric(&power_usage_metric());
    client.send_event(&deploy_event());
    assert_eq!(client.flush_now().await, 2);

    auth.assert_async().await;
    report.assert_async().await;
    event.assert_async().await;
    client.close().await.expect("close failed");
}

#[tokio::test]
async fn throttled_flush_keeps_points_queued() {
    let mut server = Server::new_async().await;
    let throttled = server
        .mock("POST", "/report")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(1)
        .create_async()
        .await;

    let client = WavefrontClient::direct(
        &DirectConfig::new(&server.url(), Authorization::None),
        &test_config(),
    )
    .expect("failed to create client");

    client.send_metric(&power_usage_metric());
    assert_eq!(client.flush_now().await, 0);
    assert_eq!(client.queue_size(DataFormat::Wavefront), 1);
    assert_eq!(client.get_failure_count(), 0);
    throttled.assert_async().await;
    throttled.remove_async().await;

    let accepted = server
        .mock("POST", "/report")
        .match_query(Matcher::Any)
        .match_body(METRIC_LINE)
        .with_status(200)
        .create_async()
        .await;
    assert_eq!(client.flush_now().await, 1);
    accepted.assert_async().await;
    client.close().await.expect("close failed");
}

#[tokio::test]
async fn throttled_event_does_not_resend_accepted_events() {
    let mut server = Server::new_async().await;
    let event_mock = |server: &mut Server, name: &str, status: usize| {
        server
            .mock("POST", "/api/v2/event")
            .match_body(Matcher::PartialJsonString(format!(r#"{{"name":"{name}"}}"#)))
            .with_status(status)
            .expect(1)
    };
    let first = event_mock(&mut server, "first", 200).create_async().await;
    let throttled = event_mock(&mut server, "second", 429).create_async().await;

    let client = WavefrontClient::direct(
        &DirectConfig::new(&server.url(), Authorization::Token("my-token".to_string())),
        &test_config(),
    )
    .expect("failed to create client");
    for name in ["first", "second"] {
        client.send_event(&Event {
            name: name.to_string(),
            ..deploy_event()
        });
    }

    assert_eq!(client.flush_now().await, 1);
    assert_eq!(client.queue_size(DataFormat::Event), 1);
    throttled.assert_async().await;
    throttled.remove_async().await;

    let second = event_mock(&mut server, "second", 200).create_async().await;
    assert_eq!(client.flush_now().await, 1);
    assert_eq!(client.flush_now().await, 0);

    first.assert_async().await;
    second.assert_async().await;
    client.close().await.expect("close failed");
    assert_eq!(client.get_failure_count(), 0);
}

#[tokio::test]
async fn background_flush_ships_without_explicit_flush() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/report")
        .match_query(Matcher::Any)
        .with_status(200)
        .create_async()
        .await;

    let client = WavefrontClient::direct(
        &DirectConfig::new(&server.url(), Authorization::None),
        &SenderConfig {
            flush_interval: Duration::from_millis(100),
            ..test_config()
        },
    )
    .expect("failed to create client");
    client.send_metric(&power_usage_metric());

    let matched = timeout(Duration::from_secs(5), async {
        while !mock.matched_async().await {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(matched.is_ok(), "background flush never reached the server");
    assert_eq!(client.queue_size(DataFormat::Wavefront), 0);
    client.close().await.expect("close failed");
}

#[tokio::test]
async fn proxy_client_writes_lines_over_tcp() {
    let (metrics_port, mut metrics_rx) = start_proxy_listener().await;
    let (distribution_port, mut distribution_rx) = start_proxy_listener().await;

    let client = WavefrontClient::proxy(
        &ProxyConfig {
            host: "127.0.0.1".to_string(),
            metrics_port: Some(metrics_port),
            distribution_port: Some(distribution_port),
            ..Default::default()
        },
        &test_config(),
    )
    .expect("failed to create client");

    client.send_metric(&power_usage_metric());
    client.send_distribution(&Distribution {
        name: "request.latency".to_string(),
        centroids: vec![Centroid::new(30.0, 20)],
        granularities: HistogramGranularity::all(),
        timestamp: Some(1493773500),
        source: Some("appServer1".to_string()),
        ..Default::default()
    });
    // No tracing port: the span batch fails and is counted.
    assert_eq!(client.send_span_now(&["\"op\" 1 2\n".to_string()]).await, 0);
    assert_eq!(client.get_failure_count(), 1);

    client.close().await.expect("close failed");

    assert_eq!(next_payload(&mut metrics_rx).await, METRIC_LINE);
    let histogram = next_payload(&mut distribution_rx).await;
    assert_eq!(histogram.lines().count(), 3);
    assert!(histogram.starts_with("!M 1493773500 #20 30.0 \"request.latency\" source=\"appServer1\"\n"));
}

#[tokio::test]
async fn overflow_and_closed_client_are_counted() {
    let transport = Arc::new(RecordingTransport::default());
    let client = WavefrontClient::new(
        transport.clone(),
        &SenderConfig {
            max_queue_size: 5,
            ..test_config()
        },
        false,
    )
    .expect("failed to create client");

    for _ in 0..8 {
        client.send_metric(&power_usage_metric());
    }
    assert_eq!(client.queue_size(DataFormat::Wavefront), 5);
    assert_eq!(client.get_failure_count(), 3);

    client.close().await.expect("close failed");
    assert_eq!(transport.lines(DataFormat::Wavefront).len(), 5);

    client.send_metric(&power_usage_metric());
    assert_eq!(client.get_failure_count(), 4);
    assert_eq!(client.stats().metrics.dropped, 4);
}

#[tokio::test]
async fn failed_final_flush_is_reported() {
    let client = WavefrontClient::new(Arc::new(FailingTransport), &test_config(), false)
        .expect("failed to create client");
    client.send_metric(&power_usage_metric());
    assert_eq!(client.close().await, Err(SenderError::FinalFlush(1)));
    assert_eq!(client.stats().metrics.report_errors, 1);
}

#[tokio::test]
async fn multi_client_sums_member_failures() {
    let build = |invalid: usize| {
        let client = WavefrontClient::new(
            Arc::new(RecordingTransport::default()),
            &test_config(),
            false,
        )
        .expect("failed to create client");
        for _ in 0..invalid {
            client.send_metric(&Metric::default());
        }
        Arc::new(client)
    };
    let multi = WavefrontMultiClient::new()
        .with_sender(build(3))
        .with_sender(build(5));
    assert_eq!(multi.get_failure_count(), 8);

    multi.send_metric(&power_usage_metric());
    assert_eq!(multi.flush_now().await, 2);
    multi.close().await.expect("close failed");
}

#[tokio::test]
async fn factory_builds_http_proxy_client() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/report")
        .match_query(Matcher::UrlEncoded("f".into(), "wavefront".into()))
        .match_header("authorization", Matcher::Missing)
        .match_body(METRIC_LINE)
        .with_status(200)
        .create_async()
        .await;

    let mut factory = ClientFactory::new();
    factory
        .add_client(
            &server.url(),
            ClientOptions {
                sender: test_config(),
                ..Default::default()
            },
        )
        .expect("failed to add client");
    let client = factory.get_client().expect("no client");

    client.send_metric(&power_usage_metric());
    assert_eq!(client.flush_now().await, 1);
    mock.assert_async().await;
    client.close().await.expect("close failed");
}

#[tokio::test]
async fn histogram_minutes_ship_as_distributions() {
    let transport = Arc::new(RecordingTransport::default());
    let client = WavefrontClient::new(transport.clone(), &test_config(), false)
        .expect("failed to create client");
    let now = Arc::new(AtomicI64::new(1_493_773_500_000));
    let histogram = WavefrontHistogram::with_clock({
        let now = Arc::clone(&now);
        move || now.load(Ordering::SeqCst)
    });

    for value in [30.0, 30.0, 50.0] {
        histogram.update(value);
    }
    now.fetch_add(60_000, Ordering::SeqCst);
    for minute in histogram.flush_distributions() {
        client.send_distribution(&minute.into_distribution(
            "request.latency",
            BTreeSet::from([HistogramGranularity::Minute]),
            Some("appServer1".to_string()),
            Tags::new(),
        ));
    }

    assert_eq!(client.flush_now().await, 1);
    assert_eq!(
        transport.lines(DataFormat::Histogram),
        vec!["!M 1493773500 #2 30.0 #1 50.0 \"request.latency\" source=\"appServer1\"\n"]
    );
    client.close().await.expect("close failed");
}
