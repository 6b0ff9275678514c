use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::time::timeout;

use crate::{
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup,
};

/// Plain HTTP/1.1 client used to forward allowed requests to the upstream.
///
/// Responsibilities:
/// * Sets the `Host` header from the outgoing URI
/// * Tags forwarded requests with `Via`
/// * Applies the configured upstream timeout
/// * Converts between Hyper body and Axum body types
pub struct HttpClientAdapter {
    client: Client<HttpConnector, AxumBody>,
    timeout: Duration,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(HttpConnector::new());

        tracing::info!(timeout = ?request_timeout, "Created upstream HTTP client");
        Ok(Self {
            client,
            timeout: request_timeout,
        })
    }

    /// Inject the headers every forwarded request carries.
    fn add_forwarding_headers(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let host_header_val = match (req.uri().host(), req.uri().port()) {
            (Some(host), Some(port)) => HeaderValue::from_str(&format!("{host}:{}", port.as_u16())),
            (Some(host), None) => HeaderValue::from_str(host),
            (None, _) => {
                return Err(HttpClientError::InvalidRequest(format!(
                    "Outgoing URI has no host: {}",
                    req.uri()
                )));
            }
        }
        .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        let headers = req.headers_mut();
        headers.insert(header::HOST, host_header_val);
        headers.append(header::VIA, HeaderValue::from_static("1.1 scorewall"));
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::add_forwarding_headers(&mut req)?;

        let upstream = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let span = tracing_setup::create_upstream_span(
            &upstream,
            req.method().as_str(),
            req.uri().path(),
        );

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing_request = Request::from_parts(parts, body);

        match timeout(self.timeout, self.client.request(outgoing_request)).await {
            Ok(Ok(response)) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // Axum re-frames the streamed body
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Ok(Err(e)) => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    parent: &span,
                    "Error forwarding {} {} to {}: {}",
                    method,
                    uri,
                    upstream,
                    e
                );
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
            Err(_) => {
                tracing::warn!(parent: &span, "Upstream timeout after {:?}", self.timeout);
                Err(HttpClientError::Timeout(self.timeout))
            }
        }
    }
}
