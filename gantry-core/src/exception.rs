// Uniform HTTP exception shape used on the request error path

use crate::Error;
use serde::Serialize;
use serde_json::{Value, json};

/// Structured HTTP error carried through the request error path.
///
/// Every failure that reaches the response is normalized into this shape:
/// a status code, a machine-readable code, a human message and optional
/// payload data. Errors that are not already an `HttpException` default to
/// status 500.
#[derive(Debug, Clone, Serialize)]
pub struct HttpException {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HttpException {
    pub fn new(message: impl Into<String>, status: u16, code: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, 400, "BadRequestException")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, 401, "UnauthorizedException")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, 403, "ForbiddenException")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, 404, "NotFoundException")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(message, 409, "ConflictException")
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(message, 500, "InternalServerErrorException")
    }

    /// Normalize any runtime error into the uniform exception shape.
    pub fn from_error(error: Error) -> Self {
        match error {
            Error::Exception(e) => e,
            other => Self::new(other.to_string(), other.status_code(), "HttpException"),
        }
    }

    /// The default response body for this exception.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "status": self.status,
            "code": self.code,
            "message": self.message,
        });
        if let Some(data) = &self.data {
            body["data"] = data.clone();
        }
        body
    }
}

impl std::fmt::Display for HttpException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for HttpException {}
