use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use eyre::{Result, WrapErr};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::middleware::{request_id_middleware, waf_middleware},
    core::WafEngine,
    ports::http_client::HttpClient,
};

pub const STATUS_PATH: &str = "/_waf/status";

/// Where allowed requests go after inspection
#[derive(Clone)]
pub struct Upstream {
    pub base: Uri,
    pub client: Arc<dyn HttpClient>,
}

/// HTTP surface of the reference host: status endpoint plus the fallback that
/// forwards allowed requests upstream (or answers `200 OK` when there is none).
#[derive(Clone)]
pub struct HttpHandler {
    engine: Arc<WafEngine>,
    upstream: Option<Upstream>,
}

impl HttpHandler {
    pub fn new(engine: Arc<WafEngine>, upstream: Option<Upstream>) -> Self {
        Self { engine, upstream }
    }

    /// Build the router with inspection and request-id layers applied.
    pub fn router(self) -> Router {
        let engine = self.engine.clone();
        Router::new()
            .route(STATUS_PATH, get(status))
            .fallback(forward)
            .with_state(self)
            .layer(middleware::from_fn_with_state(engine, waf_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    fn status_body(&self) -> serde_json::Value {
        serde_json::json!({
            "service": "scorewall",
            "version": env!("CARGO_PKG_VERSION"),
            "max_body_size": self.engine.max_body_size(),
            "locations": self.engine.snapshots(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
    }

    /// Forward the request to the upstream, rewriting the URI and adding
    /// forwarded headers.
    async fn proxy_request(
        &self,
        upstream: &Upstream,
        mut req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>> {
        let original_uri = req.uri().clone();
        let target = upstream_uri(&upstream.base, &original_uri)?;
        *req.uri_mut() = target;

        let original_host = req
            .headers()
            .get(header::HOST)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("unknown"));
        let headers = req.headers_mut();
        if let Some(client_ip) = client_ip(headers, client_addr) {
            headers.insert(
                "X-Forwarded-For",
                client_ip
                    .parse()
                    .map_err(|e| eyre::eyre!("Failed to parse client IP: {}", e))?,
            );
        }
        headers.insert("X-Forwarded-Proto", HeaderValue::from_static("http"));
        headers.insert("X-Forwarded-Host", original_host);

        match upstream.client.send_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!("Upstream request for {} failed: {}", original_uri, e);
                Response::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .body(AxumBody::from("Upstream request failed"))
                    .wrap_err("Failed to build bad gateway response")
            }
        }
    }
}

async fn status(State(handler): State<HttpHandler>) -> Response {
    let body = handler.status_body();
    ([(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

async fn forward(State(handler): State<HttpHandler>, req: Request) -> Response {
    let Some(upstream) = handler.upstream.as_ref() else {
        return (StatusCode::OK, "OK").into_response();
    };

    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    match handler.proxy_request(upstream, req, client_addr).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Request handling error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Join the upstream base with the request's path and query.
fn upstream_uri(base: &Uri, original: &Uri) -> Result<Uri> {
    let base = base.to_string();
    let path_and_query = original.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
        .parse()
        .wrap_err("Failed to build upstream URI")
}

/// First hop of an existing `X-Forwarded-For` chain, then `X-Real-IP`, then the
/// peer address.
fn client_ip(headers: &HeaderMap, client_addr: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string());

    forwarded
        .or_else(|| {
            headers
                .get("X-Real-IP")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| client_addr.map(|addr| addr.ip().to_string()))
}
