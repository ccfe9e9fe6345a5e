//! The server over a real socket.

use std::time::Duration;

use tokio::net::TcpListener;

use app_server::config::Environment;
use app_server::lifecycle::{Shutdown, Startup};

mod common;

#[tokio::test]
async fn test_serves_and_shuts_down_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let app = Startup::new(common::test_config(Environment::Test, dir.path()))
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(app.serve(listener, shutdown.wait()));

    let client = reqwest::Client::new();

    let response = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-frame-options"], "deny");
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.text().await.unwrap().contains("Welcome."));

    let response = client
        .post(format!("http://{addr}/anything"))
        .body("x=1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client.get(format!("http://{addr}/missing")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
