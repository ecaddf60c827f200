//! Test helpers for integration tests
//!
//! Provides a gateway running on ephemeral ports, a WebSocket client and an
//! HTTP client for the inbound routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use gate_common::GateConfig;
use gate_gateway::{Gateway, RunningGateway};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::fixtures::{sign, MockBackend};

/// How long to wait for any single message
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a test configuration on ephemeral ports
///
/// `overrides` replace the defaults by variable name.
pub fn test_config(overrides: &[(&str, &str)]) -> Result<GateConfig> {
    let mut vars = vec![
        ("GATE_LISTEN_HOST", "127.0.0.1"),
        ("GATE_LISTEN_PORT", "0"),
        ("GATE_INNER_HOST", "127.0.0.1"),
        ("GATE_INNER_PORT", "0"),
        ("GATE_FACADE_CONNECT", "http://127.0.0.1:9/"),
        ("GATE_AUTH_CONNECT", "http://127.0.0.1:9/"),
        ("GATE_ANONYMOUS_METHODS", "facade.public"),
    ];
    vars.extend_from_slice(overrides);

    let config = GateConfig::from_lookup(|key| {
        vars.iter()
            .rev()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).to_string())
    })
    .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    Ok(config)
}

/// Gateway instance that manages lifecycle
pub struct TestGateway {
    pub gateway: RunningGateway,
    pub backend: Arc<MockBackend>,
    pub http: reqwest::Client,
}

impl TestGateway {
    /// Start a gateway with the default test configuration
    pub async fn start() -> Result<Self> {
        Self::start_with(&[]).await
    }

    /// Start a gateway with configuration overrides
    pub async fn start_with(overrides: &[(&str, &str)]) -> Result<Self> {
        let config = test_config(overrides)?;
        let backend = Arc::new(MockBackend::default());

        let gateway = Gateway::new(config)
            .with_backend(backend.clone())
            .start()
            .await?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            gateway,
            backend,
            http,
        })
    }

    /// Client WebSocket address
    pub fn ws_addr(&self) -> SocketAddr {
        self.gateway.client_addr()
    }

    /// Base URL of the inbound-route listener
    pub fn inner_url(&self) -> String {
        format!("http://{}", self.gateway.inner_addr())
    }

    /// Connect a WebSocket client
    pub async fn connect(&self) -> Result<WsClient> {
        WsClient::connect(self.ws_addr(), None).await
    }

    /// Call the `transfer` route the way a backend does; returns the JSON-RPC response
    pub async fn push(&self, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "transfer",
            "params": params,
        });

        let response = self
            .http
            .post(format!("{}/", self.inner_url()))
            .json(&body)
            .send()
            .await?;

        Ok(response.json().await?)
    }

    /// Poll until `check` holds or the timeout passes
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&RunningGateway) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check(&self.gateway) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check(&self.gateway)
    }

    pub async fn shutdown(self) -> Result<()> {
        self.gateway.shutdown().await?;
        Ok(())
    }
}

/// WebSocket client speaking the gateway protocol
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect, optionally through a proxy that sets `X-Forwarded-For`
    pub async fn connect(addr: SocketAddr, forwarded_for: Option<&str>) -> Result<Self> {
        let mut request = format!("ws://{addr}/").into_client_request()?;
        if let Some(forwarded_for) = forwarded_for {
            request
                .headers_mut()
                .insert("x-forwarded-for", HeaderValue::from_str(forwarded_for)?);
        }

        let (stream, _) = connect_async(request).await.context("WebSocket connect failed")?;
        Ok(Self { stream })
    }

    /// Send a raw text frame
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Send a request envelope
    pub async fn send_request(&mut self, id: Value, method: &str, params: Value) -> Result<()> {
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.send_raw(&request.to_string()).await
    }

    /// Send a request and wait for the next message
    pub async fn call(&mut self, id: Value, method: &str, params: Value) -> Result<Value> {
        self.send_request(id, method, params).await?;
        self.next_json().await
    }

    /// Next JSON message, skipping control frames
    pub async fn next_json(&mut self) -> Result<Value> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .context("timed out waiting for a message")?;

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Binary(_))) => bail!("unexpected binary frame"),
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Read the `sign` challenge pushed on connect and return its secret
    pub async fn challenge(&mut self) -> Result<String> {
        let message = self.next_json().await?;
        if message["method"] != "sign" {
            bail!("expected sign challenge, got {message}");
        }

        message["params"]["secret"]
            .as_str()
            .map(String::from)
            .context("challenge without secret")
    }

    /// Complete the handshake as `user`; returns the authorize response
    pub async fn authorize(&mut self, user: &str) -> Result<Value> {
        let secret = self.challenge().await?;
        self.call(
            json!("auth"),
            "auth.authorize",
            json!({ "user": user, "sign": sign(&secret) }),
        )
        .await
    }

    /// Wait for the server to drop the connection
    pub async fn closed_within(&mut self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Close the connection from the client side
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
