// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wavefront_sender::config::SenderConfig;
use wavefront_sender::entities::{Event, Metric};

/// Sender settings that never flush on their own during a test
#[allow(dead_code)]
pub fn test_config() -> SenderConfig {
    SenderConfig {
        max_queue_size: 100,
        batch_size: 10,
        flush_interval: Duration::from_secs(3600),
        default_source: Some("test-host".to_string()),
        compress: false,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn power_usage_metric() -> Metric {
    Metric {
        name: "new-york.power.usage".to_string(),
        value: 42422.0,
        timestamp: Some(1493773500),
        source: Some("localhost".to_string()),
        tags: [("datacenter".to_string(), "dc1".to_string())]
            .into_iter()
            .collect(),
    }
}

#[allow(dead_code)]
pub fn deploy_event() -> Event {
    Event {
        name: "event name".to_string(),
        start_millis: 1592200048,
        end_millis: 1592201048,
        source: Some("localhost".to_string()),
        tags: vec!["env".to_string(), "dev".to_string()],
        annotations: [("severity".to_string(), "info".to_string())]
            .into_iter()
            .collect(),
    }
}

/// Bind a local TCP listener standing in for a proxy port.
///
/// Everything received on each accepted connection is forwarded once the peer closes it.
#[allow(dead_code)]
pub async fn start_proxy_listener() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("unable to bind TCP listener");
    let port = listener
        .local_addr()
        .expect("listener has no address")
        .port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = String::new();
                if socket.read_to_string(&mut received).await.is_ok() {
                    let _ = tx.send(received);
                }
            });
        }
    });

    (port, rx)
}

/// Wait for the next payload received by a proxy listener
#[allow(dead_code)]
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for proxy payload")
        .expect("proxy listener stopped")
}
