//! Response envelopes per compliance profile.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::transform::profile::ComplianceProfile;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Request processed successfully";
pub const OWASP_SUCCESS_MESSAGE: &str = "Success";
pub const LTI_SUCCESS_MESSAGE: &str = "Completed";

/// Default envelope. `None` fields are omitted.
///
/// Payloads are embedded as the raw upstream JSON text, so key order and
/// number precision survive wrapping.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<'a> {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_identity: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwaspSecureApiResponse<'a> {
    pub message: String,
    pub payload: Option<&'a RawValue>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LtiApiResponse<'a> {
    pub lti_success: bool,
    pub lti_message: String,
    pub lti_payload: Option<&'a RawValue>,
}

/// Per-request facts an envelope may carry.
#[derive(Debug, Clone)]
pub struct EnvelopeContext<'a> {
    pub status: StatusCode,
    pub path: &'a str,
    pub request_id: Uuid,
}

/// `OK`, `NOT_FOUND`, `TOO_MANY_REQUESTS`, ...
pub fn status_name(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason
            .to_ascii_uppercase()
            .replace('\'', "")
            .replace([' ', '-'], "_"),
        None => status.as_u16().to_string(),
    }
}

impl ComplianceProfile {
    /// Wrap a successful upstream payload.
    pub fn wrap_success(self, ctx: &EnvelopeContext<'_>, payload: &RawValue) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            ComplianceProfile::Default => serde_json::to_vec(&ApiResponse {
                timestamp: Utc::now(),
                status_code: ctx.status.as_u16(),
                status: status_name(ctx.status),
                message: Some(DEFAULT_SUCCESS_MESSAGE.to_string()),
                data: Some(payload),
                path: None,
                trace_identity: Some(ctx.request_id),
            }),
            ComplianceProfile::Owasp => serde_json::to_vec(&OwaspSecureApiResponse {
                message: OWASP_SUCCESS_MESSAGE.to_string(),
                payload: Some(payload),
                correlation_id: Some(ctx.request_id),
            }),
            ComplianceProfile::Lti => serde_json::to_vec(&LtiApiResponse {
                lti_success: true,
                lti_message: LTI_SUCCESS_MESSAGE.to_string(),
                lti_payload: Some(payload),
            }),
        }
    }

    /// Render an error with a client-safe message.
    pub fn wrap_error(self, ctx: &EnvelopeContext<'_>, message: &str) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            ComplianceProfile::Default => serde_json::to_vec(&ApiResponse {
                timestamp: Utc::now(),
                status_code: ctx.status.as_u16(),
                status: status_name(ctx.status),
                message: Some(message.to_string()),
                data: None,
                path: Some(ctx.path.to_string()),
                trace_identity: Some(ctx.request_id),
            }),
            ComplianceProfile::Owasp => serde_json::to_vec(&OwaspSecureApiResponse {
                message: message.to_string(),
                payload: None,
                correlation_id: Some(ctx.request_id),
            }),
            ComplianceProfile::Lti => serde_json::to_vec(&LtiApiResponse {
                lti_success: false,
                lti_message: message.to_string(),
                lti_payload: None,
            }),
        }
    }
}
