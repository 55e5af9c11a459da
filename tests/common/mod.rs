//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use edge_gateway::accounting::ConnectionAccountant;
use edge_gateway::config::ProxyConfig;
use edge_gateway::routing::RoutingTable;
use edge_gateway::{HttpServer, Shutdown};

/// Start a mock backend on an ephemeral port.
///
/// Every response carries `body` and echoes the received `Host` header
/// back as `x-upstream-host`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let host = head
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("host").then(|| value.trim().to_string())
                            })
                            .unwrap_or_default();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nx-upstream-host: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            host,
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running gateway with handles into its shared state.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
    pub table: Arc<RoutingTable>,
    pub accountant: Arc<dyn ConnectionAccountant>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(mut config: ProxyConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    config.admin.enabled = false;

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let table = server.table();
    let accountant = server.accountant();

    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        updates,
        table,
        accountant,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// GET `path` on the gateway with the given `Host`.
pub async fn get(gateway: &TestGateway, host: &str, path: &str) -> reqwest::Response {
    client()
        .get(gateway.url(path))
        .header("host", host)
        .send()
        .await
        .expect("gateway unreachable")
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// One gateway connection as seen by the mock coordinator.
///
/// Dropping it closes the socket.
pub struct CoordinatorSession {
    pub outbound: mpsc::UnboundedSender<Message>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl CoordinatorSession {
    pub fn send_text(&self, text: &str) {
        self.outbound.send(Message::Text(text.to_string().into())).unwrap();
    }
}

/// Start a WebSocket coordinator; each accepted gateway arrives as a session.
pub async fn start_mock_coordinator() -> (String, mpsc::UnboundedReceiver<CoordinatorSession>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/control", listener.local_addr().unwrap());
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            if sessions_tx
                .send(CoordinatorSession {
                    outbound: out_tx,
                    inbound: in_rx,
                })
                .is_err()
            {
                break;
            }

            tokio::spawn(async move {
                let (mut sink, mut source) = ws.split();
                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => match outgoing {
                            Some(message) => {
                                if sink.send(message).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        incoming = source.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let _ = in_tx.send(text.as_str().to_string());
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                    }
                }
            });
        }
    });

    (url, sessions_rx)
}

/// Next session, failing the test after `within`.
pub async fn next_session(
    sessions: &mut mpsc::UnboundedReceiver<CoordinatorSession>,
    within: Duration,
) -> CoordinatorSession {
    tokio::time::timeout(within, sessions.recv())
        .await
        .expect("gateway did not connect to the coordinator")
        .expect("coordinator stopped")
}
