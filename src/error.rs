//! Error types for the booking intake flow.
//!
//! Raw transport failures (`ApiError`) are classified into a small taxonomy
//! (`ErrorKind`) and carried around as `ApiFailure`, which is what ends up
//! in `BookingState::api_errors`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::booking::state::ResourceKind;
use crate::booking::step::BookingStep;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Raw failure from a remote call, before classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Request could not be sent: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server responded with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map a reqwest failure. reqwest does not report the timeout it was
    /// configured with, so the caller passes it in.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Classified failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never reached the server.
    Network,
    /// The server rejected the payload (4xx with field-level detail).
    Validation,
    /// The resource changed underneath us, e.g. a slot was taken.
    Conflict,
    /// 5xx or an unreadable response.
    Server,
    /// Expired or invalid session token.
    Auth,
    /// No response within the configured bound.
    Timeout,
}

impl ErrorKind {
    /// Short, non-technical message suitable for showing to the client.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network => "We couldn't reach our booking system. Please check your connection and try again.",
            Self::Validation => "Some of the information provided needs attention.",
            Self::Conflict => "That time slot is no longer available. Please choose another.",
            Self::Server => "Something went wrong on our side. Please try again shortly.",
            Self::Auth => "Your session has expired. Please refresh the page.",
            Self::Timeout => "The request took too long. Please try again.",
        }
    }

    /// Whether retrying the same call unchanged can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Server => "server",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// A single field-level complaint, either from the server or from local
/// validation of client-supplied data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A classified failure, as stored in `BookingState::api_errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind} failure: {message}")]
pub struct ApiFailure {
    pub kind: ErrorKind,
    /// Non-technical message for display.
    pub message: String,
    /// HTTP status, when the server answered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
    /// Raw payload or transport message. Only surfaced through
    /// `technical_details()`, never in serialized state.
    #[serde(default, skip_serializing)]
    details: Option<String>,
}

impl ApiFailure {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
            status: None,
            field_errors: Vec::new(),
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_field_errors(mut self, field_errors: Vec<FieldError>) -> Self {
        self.field_errors = field_errors;
        self
    }

    /// Raw error payload, for a "show technical details" affordance.
    pub fn technical_details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

/// Body shapes the API uses for 4xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<FieldError>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a raw remote failure onto the taxonomy.
pub fn classify(error: &ApiError) -> ApiFailure {
    match error {
        ApiError::Transport(msg) => ApiFailure::new(ErrorKind::Network).with_details(msg.clone()),
        ApiError::Timeout(after) => {
            ApiFailure::new(ErrorKind::Timeout).with_details(format!("no response after {after:?}"))
        }
        ApiError::Decode(msg) => ApiFailure::new(ErrorKind::Server).with_details(msg.clone()),
        ApiError::Status { status, body } => {
            let kind = match *status {
                401 | 403 => ErrorKind::Auth,
                409 => ErrorKind::Conflict,
                408 => ErrorKind::Timeout,
                400..=499 => ErrorKind::Validation,
                _ => ErrorKind::Server,
            };
            let mut failure = ApiFailure::new(kind).with_status(*status);
            if !body.is_empty() {
                failure = failure.with_details(body.clone());
            }
            if kind == ErrorKind::Validation {
                if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
                    failure.field_errors = if parsed.errors.is_empty() {
                        parsed
                            .message
                            .filter(|m| !m.trim().is_empty())
                            .map(|m| vec![FieldError::new("", m)])
                            .unwrap_or_default()
                    } else {
                        parsed.errors
                    };
                }
            }
            failure
        }
    }
}

/// Rejected selection or client-info mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("Service {id} is not currently offered")]
    ServiceInactive { id: String },

    #[error("Service id must not be empty")]
    EmptyServiceId,

    #[error("A service must be selected first")]
    NoServiceSelected,

    #[error("A date must be selected first")]
    NoDateSelected,

    #[error("Time slot {id} is not available")]
    SlotUnavailable { id: String },

    #[error("Client information is invalid ({} field(s))", .0.len())]
    InvalidClientInfo(Vec<FieldError>),

    #[error("The booking is already confirmed; reset to start over")]
    AlreadyBooked,
}

/// Outcome of a resource fetch that did not produce a usable value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Failed(#[from] ApiFailure),

    /// A newer request for the same resource was issued (or the session was
    /// reset) before this one settled; its result was discarded.
    #[error("Response for {key} was superseded by a newer request")]
    Superseded { key: String },

    #[error("Cannot fetch {resource}: {reason}")]
    MissingSelection {
        resource: ResourceKind,
        reason: SelectionError,
    },
}

impl FetchError {
    /// The classified failure, if the remote call itself failed.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Two-phase submission errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Booking cannot be submitted from step {step}: {reason}")]
    NotReady { step: BookingStep, reason: String },

    #[error("Client record could not be created: {0}")]
    ClientCreation(ApiFailure),

    #[error("Booking could not be created: {0}")]
    BookingCreation(ApiFailure),

    #[error("The session was reset while the submission was in flight")]
    Discarded,
}

impl SubmissionError {
    /// The classified failure, if a remote phase failed.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::ClientCreation(f) | Self::BookingCreation(f) => Some(f),
            _ => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> ApiError {
        ApiError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn transport_is_network() {
        let f = classify(&ApiError::Transport("connection refused".into()));
        assert_eq!(f.kind, ErrorKind::Network);
        assert_eq!(f.technical_details(), Some("connection refused"));
        assert!(f.status.is_none());
    }

    #[test]
    fn status_codes_map_to_kinds() {
        let cases = [
            (401, ErrorKind::Auth),
            (403, ErrorKind::Auth),
            (409, ErrorKind::Conflict),
            (400, ErrorKind::Validation),
            (422, ErrorKind::Validation),
            (408, ErrorKind::Timeout),
            (500, ErrorKind::Server),
            (503, ErrorKind::Server),
        ];
        for (code, kind) in cases {
            let f = classify(&status(code, ""));
            assert_eq!(f.kind, kind, "HTTP {code}");
            assert_eq!(f.status, Some(code));
        }
    }

    #[test]
    fn validation_body_yields_field_errors() {
        let body = r#"{"errors":[{"field":"email","message":"is invalid"},{"field":"phone","message":"is required"}]}"#;
        let f = classify(&status(422, body));
        assert_eq!(f.kind, ErrorKind::Validation);
        assert_eq!(f.field_errors.len(), 2);
        assert_eq!(f.field_errors[0].field, "email");
        assert_eq!(f.technical_details(), Some(body));
    }

    #[test]
    fn validation_message_only_body() {
        let f = classify(&status(400, r#"{"message":"serviceId is malformed"}"#));
        assert_eq!(f.field_errors, vec![FieldError::new("", "serviceId is malformed")]);
    }

    #[test]
    fn unparseable_validation_body_keeps_raw_details() {
        let f = classify(&status(400, "<html>bad</html>"));
        assert_eq!(f.kind, ErrorKind::Validation);
        assert!(f.field_errors.is_empty());
        assert_eq!(f.technical_details(), Some("<html>bad</html>"));
    }

    #[test]
    fn user_message_hides_raw_payload() {
        let f = classify(&status(500, "stack trace: at db.query()"));
        assert!(!f.message.contains("stack trace"));
        assert_eq!(f.message, ErrorKind::Server.user_message());
    }

    #[test]
    fn raw_details_never_serialized() {
        let json = serde_json::to_value(ApiFailure::new(ErrorKind::Conflict)).unwrap();
        assert_eq!(json["kind"], "conflict");
        assert!(json.get("details").is_none());
        assert!(json.get("status").is_none());

        let f = classify(&status(500, "stack trace: at db.query()"));
        let json = serde_json::to_string(&f).unwrap();
        assert!(!json.contains("stack trace"));
        assert!(!json.contains("details"));
        assert_eq!(f.technical_details(), Some("stack trace: at db.query()"));
    }

    #[test]
    fn component_errors_convert_into_top_level() {
        fn fetch() -> Result<()> {
            Err(FetchError::Superseded {
                key: "services".to_string(),
            })?
        }
        fn health() -> Result<()> {
            Err(ApiError::Timeout(Duration::from_secs(2)))?
        }

        assert!(matches!(fetch(), Err(Error::Fetch(FetchError::Superseded { .. }))));
        let err = health().unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::Timeout(d)) if d == Duration::from_secs(2)));
        assert_eq!(err.to_string(), "API error: Request timed out after 2s");
    }

    #[test]
    fn transient_kinds() {
        assert!(ErrorKind::Network.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Server.is_transient());
        assert!(!ErrorKind::Conflict.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
        assert!(!ErrorKind::Auth.is_transient());
    }
}
