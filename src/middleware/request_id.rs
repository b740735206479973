use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Mints a v4 uuid for every request that arrives without one
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestIds;

impl MakeRequestId for UuidRequestIds {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(value))
    }
}

/// Wraps `router` so each request carries a uuid in its extensions, its trace
/// span and the response headers
///
/// A caller-supplied id is reused only when it parses as a uuid.
pub fn with_request_ids<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let header = HeaderName::from_static(REQUEST_ID_HEADER);
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::map_request(discard_malformed_id))
            .layer(SetRequestIdLayer::new(header.clone(), UuidRequestIds))
            .layer(TraceLayer::new_for_http().make_span_with(span_with_request_id))
            .layer(PropagateRequestIdLayer::new(header)),
    )
}

async fn discard_malformed_id(mut request: Request) -> Request {
    let usable = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|id| Uuid::parse_str(id).is_ok());
    if !usable {
        request.headers_mut().remove(REQUEST_ID_HEADER);
    }
    request
}

fn span_with_request_id(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
