// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate the completion gateway client against a local server.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::io::Read;
use std::sync::mpsc;
use std::thread;

use promptfs::config::GatewayConfig;
use promptfs::gateway::{CompletionGateway, GatewayError, HttpGateway};
use serial_test::serial;

const TEST_KEY_ENV: &str = "PROMPTFS_TEST_API_KEY";

/// Serve exactly one request, answering with the supplied status and body.
/// The received request body is sent back through the channel.
fn spawn_server(status: u16, body: &'static str) -> (String, mpsc::Receiver<String>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind test server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let url = format!("http://{addr}/v1/chat/completions");
    let (seen_tx, seen_rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut received = String::new();
            let _ = request.as_reader().read_to_string(&mut received);
            let _ = seen_tx.send(received);
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            let _ = request.respond(response);
        }
    });
    (url, seen_rx)
}

fn gateway_for(url: String) -> HttpGateway {
    let config = GatewayConfig {
        endpoint: url,
        key_env: TEST_KEY_ENV.to_owned(),
        ..GatewayConfig::default()
    };
    HttpGateway::from_config(&config)
}

#[test]
#[serial]
fn missing_credential_short_circuits_without_a_call() {
    std::env::remove_var(TEST_KEY_ENV);
    // Port 9 is the discard service; an attempted call would hang or fail
    // with a transport error instead of the credential diagnostic.
    let gateway = gateway_for("http://127.0.0.1:9/unreachable".to_owned());
    assert!(!gateway.has_credential());
    let err = gateway.complete(b"hi").expect_err("must short-circuit");
    assert!(matches!(err, GatewayError::MissingCredential(_)));
    assert!(err.to_string().contains(TEST_KEY_ENV));
}

#[test]
#[serial]
fn successful_exchange_returns_the_completion_text() {
    std::env::set_var(TEST_KEY_ENV, "sk-test");
    let (url, seen) = spawn_server(
        200,
        r#"{"choices":[{"message":{"role":"assistant","content":"pong"}}]}"#,
    );
    let gateway = gateway_for(url);
    assert!(gateway.has_credential());
    let completion = gateway.complete(b"ping").expect("complete");
    assert_eq!(completion, b"pong");
    let request_body = seen.recv().expect("request body");
    assert!(request_body.contains("\"model\""));
    assert!(request_body.contains("ping"));
    assert!(request_body.contains("You are a helpful assistant"));
    std::env::remove_var(TEST_KEY_ENV);
}

#[test]
#[serial]
fn non_success_status_carries_the_body() {
    std::env::set_var(TEST_KEY_ENV, "sk-test");
    let (url, _seen) = spawn_server(503, "overloaded");
    let gateway = gateway_for(url);
    let err = gateway.complete(b"ping").expect_err("must fail");
    match err {
        GatewayError::Status { status, detail } => {
            assert_eq!(status, 503);
            assert!(detail.contains("overloaded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    std::env::remove_var(TEST_KEY_ENV);
}

#[test]
#[serial]
fn body_without_a_completion_is_malformed() {
    std::env::set_var(TEST_KEY_ENV, "sk-test");
    let (url, _seen) = spawn_server(200, r#"{"object":"chat.completion"}"#);
    let gateway = gateway_for(url);
    let err = gateway.complete(b"ping").expect_err("must fail");
    assert!(matches!(err, GatewayError::Malformed(_)));
    assert!(err.to_string().contains("choices[0].message.content"));
    std::env::remove_var(TEST_KEY_ENV);
}
