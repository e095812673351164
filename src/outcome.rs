//! The normalized result shape that crosses the system boundary.
//!
//! Handler successes and translated errors both end up as the same
//! four-field JSON object:
//!
//! ```json
//! { "code": "200", "success": true, "message": "ok", "data": null }
//! ```

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::response::{IntoResponse, Response};

/// Outcome codes used by the pipeline itself. Business failures carry
/// whatever code the caller chose.
pub mod codes {
    pub const SUCCESS: &str = "200";
    pub const VALIDATION_FAILED: &str = "400";
    pub const AUTH_FAILED: &str = "401";
    pub const NOT_FOUND: &str = "404";
    pub const SYSTEM_FAILURE: &str = "500";
}

const MSG_SUCCESS: &str = "ok";

/// Which of the three exits produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    BusinessFailure,
    SystemFailure,
}

impl OutcomeKind {
    fn default_status(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::BusinessFailure => StatusCode::BAD_REQUEST,
            Self::SystemFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{ code, success, message, data }`. All four fields are always present;
/// `data` serializes as `null` when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    code: String,
    success: bool,
    message: String,
    data: Option<Value>,
    #[serde(skip)]
    kind: OutcomeKind,
    #[serde(skip)]
    status: StatusCode,
}

impl Outcome {
    fn build(kind: OutcomeKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            success: kind == OutcomeKind::Success,
            message: message.into(),
            data: None,
            kind,
            status: kind.default_status(),
        }
    }

    /// `200`, `"ok"`, with `data`.
    pub fn success(data: impl Into<Value>) -> Self {
        Self::build(OutcomeKind::Success, codes::SUCCESS, MSG_SUCCESS).with_data(data)
    }

    /// `200` with a message and no data.
    pub fn success_message(message: impl Into<String>) -> Self {
        Self::build(OutcomeKind::Success, codes::SUCCESS, message)
    }

    /// A success whose data is any serializable value.
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self, Error> {
        Ok(Self::success(serde_json::to_value(data)?))
    }

    pub fn business_failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(OutcomeKind::BusinessFailure, code, message)
    }

    pub fn system_failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(OutcomeKind::SystemFailure, code, message)
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into()).filter(|v| !v.is_null());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// HTTP status used when the outcome is written to a response.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(bytes) => Response::builder().status(self.status).json(bytes),
            Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}
