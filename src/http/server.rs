//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, limits, timeouts, request ID)
//! - Decide per request whether interception applies
//! - Drive the FilterPipeline frame by frame in both directions
//! - Forward requests to the upstream
//! - Swap the route table on config reload

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{request::Parts, Method, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{self, request_id_of};
use crate::http::response::{self, error_response, strip_hop_by_hop};
use crate::intercept::{
    BodyChunk, ExchangeState, FilterPipeline, HeaderCollector, PipelineError, RequestVerdict,
    ResponseVerdict,
};
use crate::observability::metrics;
use crate::routing::Router as ProxyRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FilterPipeline>,
    pub routes: Arc<ArcSwap<ProxyRouter>>,
    pub client: Client<HttpConnector, Body>,
    pub upstream: Arc<str>,
    pub max_body_size: usize,
}

/// HTTP server for the intercepting proxy.
pub struct HttpServer {
    router: Router,
    routes: Arc<ArcSwap<ProxyRouter>>,
}

impl HttpServer {
    pub fn new(config: ProxyConfig, pipeline: FilterPipeline) -> Self {
        let routes = Arc::new(ArcSwap::from_pointee(ProxyRouter::from_config(
            &config.routes,
            config.firetail.enabled,
        )));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            pipeline: Arc::new(pipeline),
            routes: routes.clone(),
            client,
            upstream: Arc::from(config.upstream.address.as_str()),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self { router, routes }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(GlobalConcurrencyLimitLayer::new(
                config.listener.max_concurrent_requests,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires. Route changes arrive on `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let routes = self.routes.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let router = ProxyRouter::from_config(&config.routes, config.firetail.enabled);
                tracing::info!(routes = router.len(), "Route table reloaded");
                routes.store(Arc::new(router));
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(request.headers());
    let method = request.method().to_string();
    let (parts, body) = request.into_parts();

    let intercepted = state.routes.load().firetail_enabled_for(&parts);
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %parts.uri.path(),
        intercepted,
        "Proxying request"
    );

    let response = if intercepted {
        intercept(&state, &request_id, peer, parts, body).await
    } else {
        pass_through(&state, &request_id, parts, body).await
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Forward without touching the pipeline; bodies stream both ways.
async fn pass_through(state: &AppState, request_id: &str, parts: Parts, body: Body) -> Response {
    let upstream_request = match request::streaming_upstream_request(&state.upstream, &parts, body) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };

    match state.client.request(upstream_request).await {
        Ok(upstream_response) => {
            let (mut parts, body) = upstream_response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            error_response(&PipelineError::Upstream(e.to_string()))
        }
    }
}

async fn intercept(
    state: &AppState,
    request_id: &str,
    peer: SocketAddr,
    parts: Parts,
    body: Body,
) -> Response {
    let pipeline = &state.pipeline;
    let mut exchange = ExchangeState::with_limit(request::request_meta(&parts, peer), state.max_body_size);
    tracing::debug!(request_id = %request_id, exchange_id = %exchange.id(), "Exchange started");

    pipeline.on_request_headers(&mut exchange, HeaderCollector::from_header_map(&parts.headers));

    let verdict = match feed_request(pipeline, &mut exchange, body).await {
        Ok(verdict) => verdict,
        Err(e) => return error_response(&e),
    };

    let forward_body = match verdict {
        RequestVerdict::Forward(body) => body,
        RequestVerdict::Reject(rejection) => {
            pipeline.on_response_headers(
                &mut exchange,
                rejection.status.as_u16(),
                rejection.header_list(),
            );
            let chunk = [BodyChunk::terminal(rejection.body.clone())];
            return match pipeline.on_response_body(&mut exchange, &chunk).await {
                Ok(ResponseVerdict::Replace(response)) => response.into_response(),
                Ok(_) => rejection.into_response(),
                Err(e) => error_response(&e),
            };
        }
        RequestVerdict::Pending | RequestVerdict::PassThrough => exchange.upstream_body(),
    };

    let upstream_request =
        match request::buffered_upstream_request(&state.upstream, &parts, forward_body) {
            Ok(req) => req,
            Err(e) => {
                exchange.finalize();
                return error_response(&e);
            }
        };

    match state.client.request(upstream_request).await {
        Ok(upstream_response) => {
            respond(pipeline, &mut exchange, &parts.method, upstream_response).await
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                exchange_id = %exchange.id(),
                error = %e,
                "Upstream error"
            );
            exchange.finalize();
            error_response(&PipelineError::Upstream(e.to_string()))
        }
    }
}

/// Feed request frames until the pipeline reaches a verdict.
async fn feed_request(
    pipeline: &FilterPipeline,
    exchange: &mut ExchangeState,
    mut body: Body,
) -> Result<RequestVerdict, PipelineError> {
    loop {
        let chunk = match next_data(&mut body).await {
            Ok(Some(data)) => BodyChunk::data(data),
            Ok(None) => BodyChunk::end(),
            Err(e) => {
                tracing::debug!(exchange_id = %exchange.id(), error = %e, "Client aborted request body");
                exchange.finalize();
                return Err(PipelineError::ClientAborted(e.to_string()));
            }
        };
        let last = chunk.last;

        match pipeline.on_request_body(exchange, &[chunk]).await? {
            RequestVerdict::Pending if !last => continue,
            verdict => return Ok(verdict),
        }
    }
}

/// Capture the upstream response and answer with whatever the pipeline decides.
async fn respond(
    pipeline: &FilterPipeline,
    exchange: &mut ExchangeState,
    method: &Method,
    upstream_response: hyper::Response<Incoming>,
) -> Response {
    let (mut parts, mut body) = upstream_response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    pipeline.on_response_headers(
        exchange,
        parts.status.as_u16(),
        HeaderCollector::from_header_map(&parts.headers),
    );

    loop {
        let chunk = match next_data(&mut body).await {
            Ok(Some(data)) => BodyChunk::data(data),
            Ok(None) => BodyChunk::end(),
            Err(e) => {
                exchange.finalize();
                return error_response(&PipelineError::Upstream(e.to_string()));
            }
        };
        let last = chunk.last;

        match pipeline.on_response_body(exchange, &[chunk]).await {
            Ok(ResponseVerdict::Pending) if !last => continue,
            Ok(ResponseVerdict::Release(body)) => return response::rebuild(parts, body, method),
            Ok(ResponseVerdict::Replace(synthesized)) => return synthesized.into_response(),
            Ok(ResponseVerdict::Pending | ResponseVerdict::PassThrough) => {
                return response::rebuild(parts, exchange.response_body().to_bytes(), method)
            }
            Err(e) => return error_response(&e),
        }
    }
}

/// Next data frame of `body`, skipping trailers. `None` at end of stream.
async fn next_data<B>(body: &mut B) -> Result<Option<Bytes>, B::Error>
where
    B: hyper::body::Body<Data = Bytes> + Unpin,
{
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            return Ok(Some(data));
        }
    }
    Ok(None)
}
