use crate::models::{ErrorInfo, ProviderId, RejectionReason};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Maps an upstream HTTP status to the internal error kind.
pub fn http_status_kind(status: u16) -> &'static str {
    match status {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        418 => "REJECTED",
        429 => "RATE_LIMIT",
        500 => "SERVER_ERROR",
        503 => "UNAVAILABLE",
        _ => "UNKNOWN_ERROR",
    }
}

/// Failure reported by a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Internal code, usually provider-prefixed (`EQUIFAX_RATE_LIMIT`).
    pub code: String,
    pub provider: ProviderId,
    pub http_status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: ProviderId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            provider,
            http_status: None,
            message: message.into(),
        }
    }

    /// Builds an error whose code is `<PROVIDER>_<kind>`.
    pub fn prefixed(provider: ProviderId, kind: &str, message: impl Into<String>) -> Self {
        Self::new(
            provider,
            format!("{}_{}", provider.error_prefix(), kind),
            message,
        )
    }

    pub fn from_status(provider: ProviderId, status: u16, body: &str) -> Self {
        let mut err = Self::prefixed(
            provider,
            http_status_kind(status),
            format!("{} returned HTTP {}: {}", provider, status, truncate(body, 200)),
        );
        err.http_status = Some(status);
        err
    }

    pub fn timeout(provider: ProviderId, detail: impl fmt::Display) -> Self {
        Self::prefixed(provider, "TIMEOUT", format!("{} request timed out: {}", provider, detail))
    }

    pub fn network(provider: ProviderId, detail: impl fmt::Display) -> Self {
        Self::prefixed(
            provider,
            "NETWORK_ERROR",
            format!("{} request failed: {}", provider, detail),
        )
    }

    pub fn parse(provider: ProviderId, detail: impl fmt::Display) -> Self {
        Self::prefixed(
            provider,
            "PARSE_ERROR",
            format!("Failed to parse {} response: {}", provider, detail),
        )
    }

    /// True when the error says the provider is unhealthy, as opposed to an answer
    /// about this one document (`*_NOT_FOUND`, `*_EMPTY_DATA`, `*_REJECTED`...).
    /// Only outages count against the circuit breaker.
    pub fn is_outage(&self) -> bool {
        if let Some(status) = self.http_status {
            return status >= 500 || status == 429;
        }
        let kind = self
            .code
            .strip_prefix(self.provider.error_prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(&self.code);
        matches!(
            kind,
            "TIMEOUT"
                | "NETWORK_ERROR"
                | "SERVER_ERROR"
                | "UNAVAILABLE"
                | "RATE_LIMIT"
                | "CIRCUIT_OPEN"
        )
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            name: "ProviderError".to_string(),
            code: self.code.clone(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Document failed format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub input: String,
    pub reason: String,
}

impl ValidationError {
    pub const CODE: &'static str = "INVALID_DOCUMENT";
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid document '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Required upstream data is missing from a provider payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationError {
    pub provider: ProviderId,
    pub field: String,
}

impl NormalizationError {
    pub const CODE: &'static str = "MISSING_DATA";

    pub fn missing(provider: ProviderId, field: impl Into<String>) -> Self {
        Self {
            provider,
            field: field.into(),
        }
    }
}

impl fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: required field '{}' missing from {} payload",
            Self::CODE,
            self.field,
            self.provider
        )
    }
}

impl std::error::Error for NormalizationError {}

/// Scoring rules could not be assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    /// Strict mode and at least one coefficient had to be defaulted.
    Incomplete { missing: Vec<String> },
    /// The configuration store could not be read.
    Unavailable(String),
}

impl RulesError {
    pub fn code(&self) -> &'static str {
        match self {
            RulesError::Incomplete { .. } => "SCORING_RULES_INCOMPLETE",
            RulesError::Unavailable(_) => "SCORING_RULES_UNAVAILABLE",
        }
    }
}

impl fmt::Display for RulesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesError::Incomplete { missing } => write!(
                f,
                "{}: missing coefficients [{}]",
                self.code(),
                missing.join(", ")
            ),
            RulesError::Unavailable(msg) => write!(f, "{}: {}", self.code(), msg),
        }
    }
}

impl std::error::Error for RulesError {}

/// Everything that can stop a score calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringError {
    Validation(ValidationError),
    Provider(ProviderError),
    Normalization(NormalizationError),
    Rules(RulesError),
}

impl ScoringError {
    pub fn rejection_reason(&self) -> RejectionReason {
        match self {
            ScoringError::Validation(_) => RejectionReason::InvalidDocument,
            ScoringError::Normalization(_) => RejectionReason::NoData,
            ScoringError::Provider(_) | ScoringError::Rules(_) => RejectionReason::ServiceError,
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            ScoringError::Validation(e) => ErrorInfo {
                name: "ValidationError".to_string(),
                code: ValidationError::CODE.to_string(),
                message: e.to_string(),
            },
            ScoringError::Provider(e) => e.to_error_info(),
            ScoringError::Normalization(e) => ErrorInfo {
                name: "NormalizationError".to_string(),
                code: NormalizationError::CODE.to_string(),
                message: e.to_string(),
            },
            ScoringError::Rules(e) => ErrorInfo {
                name: "RulesError".to_string(),
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::Validation(e) => write!(f, "Validation error: {}", e),
            ScoringError::Provider(e) => write!(f, "Provider error: {}", e),
            ScoringError::Normalization(e) => write!(f, "Normalization error: {}", e),
            ScoringError::Rules(e) => write!(f, "Rules error: {}", e),
        }
    }
}

impl std::error::Error for ScoringError {}

impl From<ValidationError> for ScoringError {
    fn from(err: ValidationError) -> Self {
        ScoringError::Validation(err)
    }
}

impl From<ProviderError> for ScoringError {
    fn from(err: ProviderError) -> Self {
        ScoringError::Provider(err)
    }
}

impl From<NormalizationError> for ScoringError {
    fn from(err: NormalizationError) -> Self {
        ScoringError::Normalization(err)
    }
}

impl From<RulesError> for ScoringError {
    fn from(err: RulesError) -> Self {
        ScoringError::Rules(err)
    }
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Unauthorized access error.
    Unauthorized(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each variant to a status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
