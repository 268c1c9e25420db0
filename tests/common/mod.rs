//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use firetail_proxy::config::ProxyConfig;
use firetail_proxy::lifecycle::startup;
use firetail_proxy::validator::{
    RequestValidation, ResponseValidation, ValidationResult, Validator, ValidatorError,
};
use firetail_proxy::{HttpServer, Shutdown};

/// What the mock upstream saw.
#[derive(Default)]
pub struct UpstreamLog {
    pub hits: AtomicUsize,
    pub bodies: Mutex<Vec<String>>,
}

/// Read one HTTP/1.1 request: method plus `Content-Length` bytes of body.
async fn read_request(socket: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return (String::new(), String::new()),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let raw_head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let method = raw_head.split(' ').next().unwrap_or_default().to_string();
    let head = raw_head.to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    (method, String::from_utf8_lossy(&buf[head_end..]).to_string())
}

/// Start a mock upstream that answers every request with a fixed JSON response.
pub async fn start_mock_backend(addr: SocketAddr, status: u16, body: &'static str) -> Arc<UpstreamLog> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let log = Arc::new(UpstreamLog::default());
    let seen = log.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let (method, request_body) = read_request(&mut socket).await;
                        seen.hits.fetch_add(1, Ordering::SeqCst);
                        seen.bodies.lock().unwrap().push(request_body);

                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        // HEAD gets the GET headers and no body.
                        let payload = if method == "HEAD" { "" } else { body };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            payload
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    log
}

/// Validator double with scripted verdicts that records every call.
pub struct RecordingValidator {
    pub request_result: ValidationResult,
    pub response_result: ValidationResult,
    pub delay: Duration,
    pub requests: Mutex<Vec<RequestValidation>>,
    pub responses: Mutex<Vec<ResponseValidation>>,
}

impl RecordingValidator {
    pub fn new(request_result: ValidationResult, response_result: ValidationResult) -> Arc<Self> {
        Self::with_delay(request_result, response_result, Duration::ZERO)
    }

    pub fn passing() -> Arc<Self> {
        Self::new(ValidationResult::valid(), ValidationResult::valid())
    }

    pub fn with_delay(
        request_result: ValidationResult,
        response_result: ValidationResult,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            request_result,
            response_result,
            delay,
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
        })
    }

    pub fn request_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn response_calls(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Validator for RecordingValidator {
    async fn validate_request(
        &self,
        call: RequestValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        self.requests.lock().unwrap().push(call);
        tokio::time::sleep(self.delay).await;
        Ok(self.request_result.clone())
    }

    async fn validate_response(
        &self,
        call: ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        self.responses.lock().unwrap().push(call);
        tokio::time::sleep(self.delay).await;
        Ok(self.response_result.clone())
    }
}

/// Batches received by the mock logging endpoint.
#[derive(Default)]
pub struct LogCollector {
    pub batches: Mutex<Vec<(HeaderMap, String)>>,
}

impl LogCollector {
    /// Every ND-JSON line received so far, parsed.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, body)| {
                body.lines()
                    .filter(|l| !l.is_empty())
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Poll until at least `count` records arrived or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let records = self.records();
            if records.len() >= count || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

async fn collect(
    State(collector): State<Arc<LogCollector>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    collector.batches.lock().unwrap().push((headers, body));
    StatusCode::OK
}

/// Start a mock logging endpoint accepting `POST /logs/bulk`.
pub async fn start_log_collector(addr: SocketAddr) -> Arc<LogCollector> {
    let collector = Arc::new(LogCollector::default());
    let app = axum::Router::new()
        .route("/logs/bulk", post(collect))
        .with_state(collector.clone());
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    collector
}

/// Defaults aimed at loopback test ports.
pub fn test_config(proxy_addr: SocketAddr, upstream_addr: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstream.address = upstream_addr.to_string();
    config.observability.metrics_enabled = false;
    config
}

/// Boot the standard pipeline around `validator` and serve it on the configured address.
pub async fn start_proxy(config: ProxyConfig, validator: Arc<dyn Validator>) -> Shutdown {
    let shutdown = Shutdown::new();
    let booted = startup::bootstrap_with(&config, validator, &shutdown).unwrap();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config, booted.pipeline);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
