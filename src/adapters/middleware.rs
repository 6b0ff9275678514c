//! Axum middleware placing the inspection engine in front of the router.
//!
//! [`waf_middleware`] drives one [`RequestContext`] per request through the
//! engine: it resumes on entry, streams body frames into the context while the
//! engine asks for more, and enacts the verdict (403 or a redirect to the
//! location's denied URL). Allowed requests continue with their body intact.
//! At most `max_body_size` bytes (plus the frame that crossed it) are held
//! before the verdict; past that the engine decides on what it has and the
//! remainder streams straight through.
//! [`request_id_middleware`] wraps everything in a request span.
use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use futures_util::{StreamExt, future, stream};
use http_body_util::BodyExt;
use tracing::Instrument;

use crate::{
    core::waf::{Disposition, Event, RequestContext, RequestView, Verdict, WafEngine},
    metrics, tracing_setup,
};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Inspect the request against the location that governs its path.
pub async fn waf_middleware(
    State(engine): State<Arc<WafEngine>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(scope) = engine.scope_for(req.uri().path()).cloned() else {
        return next.run(req).await;
    };
    let span = tracing::Span::current();
    span.record("waf.location", scope.name.as_str());

    let (parts, mut body) = req.into_parts();
    let view = RequestView::from_parts(&parts);
    let mut ctx = engine.new_context();
    let timer = metrics::InspectionTimer::new(&scope.name);

    let mut disposition = engine.resume(&scope, &mut ctx, &view, Event::Enter);
    let mut consumed: Option<BytesMut> = None;
    let mut exhausted = false;

    while disposition == Disposition::Suspend {
        let buffered = consumed.get_or_insert_with(BytesMut::new);
        disposition = match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    buffered.extend_from_slice(&data);
                    match engine.resume(&scope, &mut ctx, &view, Event::BodyChunk(&data)) {
                        // Over the inspection limit: decide now, stream the rest
                        Disposition::Suspend if ctx.is_body_truncated() => {
                            engine.resume(&scope, &mut ctx, &view, Event::BodyComplete)
                        }
                        other => other,
                    }
                }
                // Trailers carry nothing to inspect
                Err(_) => Disposition::Suspend,
            },
            Some(Err(e)) => {
                tracing::warn!(location = %scope.name, "client body read failed: {}", e);
                engine.resume(&scope, &mut ctx, &view, Event::Aborted);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read request body")
                    .into_response();
            }
            None => {
                exhausted = true;
                engine.resume(&scope, &mut ctx, &view, Event::BodyComplete)
            }
        };
    }
    drop(timer);

    let body = match consumed {
        Some(buffered) if exhausted => Body::from(buffered.freeze()),
        Some(buffered) => {
            let prefix = stream::once(future::ready(Ok(buffered.freeze())));
            Body::from_stream(prefix.chain(body.into_data_stream()))
        }
        None => body,
    };
    let req = Request::from_parts(parts, body);

    match disposition {
        Disposition::Finish(verdict) => {
            record_outcome(&scope.name, scope.learning, &ctx);
            span.record("waf.blocked", verdict.block);
            if verdict.block {
                return deny(&verdict);
            }
            next.run(req).await
        }
        _ => next.run(req).await,
    }
}

fn record_outcome(location: &str, learning: bool, ctx: &RequestContext) {
    metrics::increment_processed(location);
    if ctx.decision().is_some_and(|d| d.block) {
        metrics::increment_blocked(location, learning);
    }

    let mut per_zone: HashMap<&'static str, u64> = HashMap::new();
    for record in ctx.matches() {
        *per_zone.entry(record.zone.as_str()).or_default() += 1;
    }
    for (zone, count) in per_zone {
        metrics::add_rule_matches(zone, count);
    }
}

/// Redirect to the denied URL when one is configured, 403 otherwise.
fn deny(verdict: &Verdict) -> Response {
    let redirect = verdict
        .denied_url
        .as_deref()
        .and_then(|url| HeaderValue::from_str(url).ok());

    match redirect {
        Some(location) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        None => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
    }
}

/// Generate a per-request UUID, run the request inside its span and expose it
/// via `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing_setup::create_request_span(
        req.method().as_str(),
        req.uri().path(),
        &request_id,
    );

    let mut response = next.run(req).instrument(span.clone()).await;
    span.record("http.status_code", response.status().as_u16());

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}
