//! Proxy procedures over the HTTP transport.

use std::sync::Arc;
use std::time::Duration;

use strata::{ProxyConfig, ProxyService};
use strata_common::StrataError;
use stratad::{ListenAddr, ProxyClient};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Serve a proxy rooted at `root` on an ephemeral TCP port.
async fn spawn_server(root: &TempDir, mount_helper: &str) -> std::net::SocketAddr {
    let config = ProxyConfig::new("ctA")
        .with_root(root.path())
        .with_helpers(mount_helper, "true");
    let service = Arc::new(ProxyService::new(&config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stratad::api::app(service)).await.unwrap();
    });

    addr
}

async fn spawn_proxy(root: &TempDir, mount_helper: &str) -> ProxyClient {
    ProxyClient::new(spawn_server(root, mount_helper).await)
}

#[tokio::test]
async fn calls_before_init_are_rejected() {
    let root = TempDir::new().unwrap();
    let client = spawn_proxy(&root, "true").await;

    let err = client.status().await.unwrap_err();
    assert!(matches!(err, StrataError::NotInitialized));

    let err = client.put("L1").await.unwrap_err();
    assert!(matches!(err, StrataError::NotInitialized));
}

#[tokio::test]
async fn layer_lifecycle_over_http() {
    let root = TempDir::new().unwrap();
    let client = spawn_proxy(&root, "true").await;

    client.init("local", "/layers", &[]).await.unwrap();
    client.create("L1", "").await.unwrap();
    assert!(client.exists("L1").await.unwrap());
    assert!(!client.exists("L2").await.unwrap());

    let dir = client.get("L1", "").await.unwrap();
    assert_eq!(dir, "/layers/L1/merged");

    let metadata = client.get_metadata("L1").await.unwrap();
    assert_eq!(
        metadata.get("Dir").cloned(),
        Some(root.path().join("layers/L1/merged").display().to_string())
    );

    client.put("L1").await.unwrap();
    let err = client.put("L1").await.unwrap_err();
    assert_eq!(err.kind(), "unbalanced_put");
    assert_eq!(err.to_string(), "no such mount: L1");

    client.cleanup().await.unwrap();
    client.remove("L1").await.unwrap();
    assert!(!client.exists("L1").await.unwrap());

    let status = client.status().await.unwrap();
    assert_eq!(status[0], ("Driver".to_string(), "local".to_string()));
}

#[tokio::test]
async fn failing_mount_helper_releases_the_layer() {
    let root = TempDir::new().unwrap();
    let client = spawn_proxy(&root, "false").await;

    client.init("local", "/layers", &[]).await.unwrap();
    client.create("L1", "").await.unwrap();

    let err = client.get("L1", "").await.unwrap_err();
    assert_eq!(err.kind(), "bridge");

    // The driver reference was dropped, so the layer can go.
    client.remove("L1").await.unwrap();
}

#[tokio::test]
async fn unknown_driver_is_a_client_error() {
    let root = TempDir::new().unwrap();
    let client = spawn_proxy(&root, "true").await;

    let err = client.init("zfs", "", &[]).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_driver");
    assert_eq!(err.to_string(), "unknown driver: zfs");
}

#[tokio::test]
async fn malformed_arguments_get_an_error_reply() {
    let root = TempDir::new().unwrap();
    let addr = spawn_server(&root, "true").await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/ProxyAPI.Create"))
        .header("content-type", "application/json")
        .body("{\"Id\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let reply: strata::api::ErrorReply = response.json().await.unwrap();
    assert_eq!(reply.kind, "serialization");
    assert!(!reply.error.is_empty());
}

#[tokio::test]
async fn serves_on_unix_socket() {
    let root = TempDir::new().unwrap();
    let socket = root.path().join("run").join("strata.sock");
    let config = ProxyConfig::new("ctA").with_root(root.path());
    let service = Arc::new(ProxyService::new(&config));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let listen = ListenAddr::Unix(socket.clone());
    let server = tokio::spawn(async move {
        stratad::serve(service, &listen, async {
            let _ = rx.await;
        })
        .await
    });

    for _ in 0..100 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    stream
        .write_all(
            b"POST /ProxyAPI.Status HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 409"), "{response}");
    assert!(response.contains(r#""Kind":"not_initialized""#), "{response}");

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(!socket.exists());
}
