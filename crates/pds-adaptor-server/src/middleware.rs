use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header carrying the caller's trace id.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("traceid");

/// Trace id of the current inbound request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct TraceId(pub HeaderValue);

impl TraceId {
    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or("")
    }
}

/// Preserves the inbound `traceId` or generates one, and echoes it on the response.
pub async fn trace_id(mut req: Request<Body>, next: Next) -> Response {
    let value = req
        .headers()
        .get(&TRACE_ID_HEADER)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(generate_trace_id);

    req.extensions_mut().insert(TraceId(value.clone()));

    let mut res = next.run(req).await;
    res.headers_mut().insert(TRACE_ID_HEADER, value);
    res
}

fn generate_trace_id() -> HeaderValue {
    let id = Uuid::new_v4().simple().to_string();
    // A simple uuid is always a valid header value.
    HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}
