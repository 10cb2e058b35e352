// Error types for the Gantry runtime

use crate::HttpException;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("request-scoped provider {0} requires a context id")]
    MissingContext(String),

    #[error("unsupported scope tag: {0}")]
    UnsupportedScope(String),

    #[error("circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Exception(#[from] HttpException),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code this error maps to when it escapes to a response.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => 404,
            Error::InvalidArgument(_) => 400,
            Error::Deserialization(_) => 400,
            Error::Exception(e) => e.status,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
