//! Unified application error model.
//! One enum covers the host bridge, both HTTP clients, the CSV exporter and the
//! login handshake, so every failure can be surfaced to the widget as a message.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// The host denied or failed to issue an access token.
    #[error("host_auth: {0}")]
    HostAuth(String),
    /// Non-2xx answer from the Grist REST API.
    #[error("api_error: {status} {status_text}\n{body}")]
    Api { status: u16, status_text: String, body: String },
    /// Non-2xx answer from the publish backend, message already extracted.
    #[error("{message}")]
    Publish { message: String },
    #[error("connectivity: {0}")]
    Connectivity(String),
    #[error("csrf_mismatch: {0}")]
    CsrfMismatch(String),
    #[error("auth_timeout: no callback received within {0}s")]
    AuthTimeout(u64),
    #[error("provider_error: {0}")]
    Provider(String),
    #[error("user_input: {0}")]
    UserInput(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::HostAuth(_) => "host_auth",
            AppError::Api { .. } => "api_error",
            AppError::Publish { .. } => "publish_error",
            AppError::Connectivity(_) => "connectivity",
            AppError::CsrfMismatch(_) => "csrf_mismatch",
            AppError::AuthTimeout(_) => "auth_timeout",
            AppError::Provider(_) => "provider_error",
            AppError::UserInput(_) => "user_input",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Text shown to the user, without the code prefix.
    pub fn message(&self) -> String {
        match self {
            AppError::HostAuth(m)
            | AppError::Connectivity(m)
            | AppError::CsrfMismatch(m)
            | AppError::Provider(m)
            | AppError::UserInput(m)
            | AppError::Config(m)
            | AppError::Internal(m) => m.clone(),
            AppError::Publish { message } => message.clone(),
            AppError::Api { status, status_text, body } => format!("Grist API error: {} {}\n{}", status, status_text, body),
            AppError::AuthTimeout(secs) => format!("authentication expired after {}s", secs),
        }
    }

    pub fn host_auth<S: Into<String>>(msg: S) -> Self { AppError::HostAuth(msg.into()) }
    pub fn publish<S: Into<String>>(msg: S) -> Self { AppError::Publish { message: msg.into() } }
    pub fn connectivity<S: Into<String>>(msg: S) -> Self { AppError::Connectivity(msg.into()) }
    pub fn csrf<S: Into<String>>(msg: S) -> Self { AppError::CsrfMismatch(msg.into()) }
    pub fn provider<S: Into<String>>(msg: S) -> Self { AppError::Provider(msg.into()) }
    pub fn user<S: Into<String>>(msg: S) -> Self { AppError::UserInput(msg.into()) }
    pub fn config<S: Into<String>>(msg: S) -> Self { AppError::Config(msg.into()) }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal(msg.into()) }

    /// True for the three ways a login handshake can be rejected.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, AppError::CsrfMismatch(_) | AppError::AuthTimeout(_) | AppError::Provider(_))
    }

    /// HTTP status the callback relay answers a rejected login with.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput(_) => 400,
            AppError::HostAuth(_) | AppError::Provider(_) => 401,
            AppError::CsrfMismatch(_) => 403,
            AppError::AuthTimeout(_) => 408,
            AppError::Api { status, .. } => *status,
            AppError::Publish { .. } => 422,
            AppError::Connectivity(_) => 503,
            AppError::Config(_) | AppError::Internal(_) => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            AppError::Connectivity(format!("unable to reach the server: {}", err))
        } else if err.is_decode() {
            AppError::Internal(format!("invalid response body: {}", err))
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("json: {}", err))
    }
}

impl From<csv_async::Error> for AppError {
    fn from(err: csv_async::Error) -> Self {
        AppError::Internal(format!("csv: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("io: {}", err))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
