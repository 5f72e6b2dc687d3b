//! Response mapper: pipeline outcomes to uniform HTTP results.
//!
//! Every handler funnels through this module so the wire contract stays
//! uniform: successes carry the outcome's mimetype and bytes; failures
//! carry `{status, error, messages}` (plus the validation report for
//! design-limit rejections). Server errors expose an error category and a
//! message list but never raw filesystem paths.
//!
//! Malformed or ambiguous uploads map to 500, not 4xx; existing clients
//! depend on that mapping, debatable as it is.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::convert::{Outcome, MIME_ZIP};
use crate::error::ServiceError;

/// Uniform error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// HTTP status code, repeated in the body.
    pub status: u16,
    /// Stable error category name.
    pub error: String,
    /// Human-readable explanation(s).
    pub messages: Vec<String>,
    /// Populated only for design-limit rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
}

/// HTTP status class for a service error.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ServiceError::MissingField(_) | ServiceError::ValidationFailed(_) => {
            StatusCode::BAD_REQUEST
        }
        // Upstream data or converter inconsistency: kept as server errors
        // for wire compatibility.
        ServiceError::MalformedInput(_)
        | ServiceError::AmbiguousEntryPoint { .. }
        | ServiceError::AmbiguousOutput { .. }
        | ServiceError::ConversionFailed(_)
        | ServiceError::ResourceAllocation(_)
        | ServiceError::ImportFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let report = match &self {
            ServiceError::ValidationFailed(report) => {
                Some(serde_json::to_value(report).unwrap_or_else(|_| json!({})))
            }
            _ => None,
        };
        let body = ErrorBody {
            status: status.as_u16(),
            error: self.category().to_string(),
            messages: self.messages(),
            report,
        };
        (status, Json(body)).into_response()
    }
}

/// Map a successful pipeline outcome to an HTTP response.
pub fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Document { bytes, mimetype } => {
            ([(header::CONTENT_TYPE, mimetype)], bytes).into_response()
        }
        Outcome::Archive { bytes } => ([(header::CONTENT_TYPE, MIME_ZIP)], bytes).into_response(),
        Outcome::Report(report) => Json(report).into_response(),
    }
}
