use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::Request;
use rocket::{Data, Response};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Identifier attached to every request and echoed in the `X-Request-Id` response header.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    /// Reuses a caller-supplied id when it is a UUID, so a proxy's id carries through the logs.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| Uuid::parse_str(v).is_ok()) {
            Some(id) => RequestId(id.to_string()),
            None => RequestId::new(),
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Fairing that tags each request with a [`RequestId`] and logs it on the way in and out.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::from_header(request.headers().get_one(REQUEST_ID_HEADER));

        request.local_cache(|| Some(request_id.clone()));
        request.local_cache(|| Some(RequestStart(Instant::now())));

        info!(
            request_id = %request_id.0,
            method = %request.method(),
            uri = %request.uri(),
            "incoming request"
        );
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let elapsed_ms = request
            .local_cache(|| None::<RequestStart>)
            .as_ref()
            .map(|start| start.0.elapsed().as_millis() as u64)
            .unwrap_or_default();

        let status = response.status();

        response.set_header(Header::new(REQUEST_ID_HEADER, request_id.clone()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("Cache-Control", "no-store"));

        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                elapsed_ms,
                "request completed with error"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                elapsed_ms,
                "request completed"
            );
        }
    }
}
