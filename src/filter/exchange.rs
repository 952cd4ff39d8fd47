//! Per-request state shared by the filters of one chain run.

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method, Uri};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use uuid::Uuid;

use crate::routing::CompiledRoute;
use crate::transform::{select_profile, ComplianceProfile};

/// Inbound header carrying a caller-supplied trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Header echoing the gateway-assigned request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity and timing of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Inbound `X-Trace-ID`, or a fresh UUID.
    pub trace_id: String,
    pub start: Instant,
    pub client_ip: IpAddr,
    pub compliance_profile: ComplianceProfile,
    /// Free-form values filters pass to each other.
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(client_ip: IpAddr, headers: &HeaderMap) -> Self {
        let trace_id = headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id: Uuid::new_v4(),
            trace_id,
            start: Instant::now(),
            client_ip,
            compliance_profile: select_profile(headers),
            attributes: HashMap::new(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A matched request on its way through the chain.
///
/// Request-side filters may rewrite `forward_path`, `headers` and the body;
/// `uri` stays as the client sent it.
///
/// `Body` is `Send` but not `Sync`. It sits behind a mutex that is only ever
/// reached through `&mut self`, which keeps `&Exchange` sendable while the
/// response phase awaits.
pub struct Exchange {
    pub context: RequestContext,
    pub route: Arc<CompiledRoute>,
    pub method: Method,
    pub uri: Uri,
    pub forward_path: String,
    pub headers: HeaderMap,
    body: Mutex<Body>,
}

impl Exchange {
    pub fn new(context: RequestContext, route: Arc<CompiledRoute>, parts: Parts, body: Body) -> Self {
        Self {
            context,
            route,
            forward_path: parts.uri.path().to_string(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Mutex::new(body),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Move the request body out, leaving an empty one.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(self.body_mut())
    }

    pub fn set_body(&mut self, body: Body) {
        *self.body_mut() = body;
    }

    fn body_mut(&mut self) -> &mut Body {
        self.body.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn route_id(&self) -> &str {
        &self.route.definition.id
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.route.definition.encryption_key()
    }
}
