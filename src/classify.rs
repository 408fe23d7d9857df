use std::fmt;

use serde::Serialize;

/// A failed push dispatch, as reported by the provider adapter.
///
/// Carries enough structure for `classify` to decide whether the target
/// subscription is permanently gone or just temporarily unreachable.
#[derive(Debug)]
pub enum DeliveryError {
    /// The provider answered with a non-success status code.
    Status { status: u16, body: String },
    /// The request timed out before the provider answered.
    Timeout(String),
    /// Name resolution failure, connection refused/reset, TLS failure.
    Transport(String),
}

impl DeliveryError {
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: truncate_body(body),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Map a reqwest failure. Timeouts are kept distinct from other
    /// transport-level problems.
    pub fn network(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "push endpoint returned {}: {}", status, body),
            Self::Timeout(msg) => write!(f, "push request timed out: {}", msg),
            Self::Transport(msg) => write!(f, "push transport error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Failure taxonomy. `InvalidSubscription` is the only category that prunes
/// the subscription; everything else is retained for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidSubscription,
    NetworkError,
    ServerError,
    ClientError,
    UnknownError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSubscription => "invalid_subscription",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::UnknownError => "unknown_error",
        }
    }
}

/// Verdict for one failed dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub category: ErrorCategory,
    pub status_code: Option<u16>,
    pub is_invalid_subscription: bool,
}

/// Classify a delivery failure. This is the single source of truth for
/// whether a subscription gets pruned: 404/410 mean the endpoint is
/// permanently gone, every other status and all transport failures are
/// treated as transient.
pub fn classify(error: &DeliveryError) -> Classification {
    match error {
        DeliveryError::Status { status, .. } => {
            let category = match *status {
                404 | 410 => ErrorCategory::InvalidSubscription,
                s if s >= 500 => ErrorCategory::ServerError,
                s if s >= 400 => ErrorCategory::ClientError,
                _ => ErrorCategory::UnknownError,
            };
            Classification {
                category,
                status_code: Some(*status),
                is_invalid_subscription: category == ErrorCategory::InvalidSubscription,
            }
        }
        DeliveryError::Timeout(_) | DeliveryError::Transport(_) => Classification {
            category: ErrorCategory::NetworkError,
            status_code: None,
            is_invalid_subscription: false,
        },
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() > 300 {
        let mut cut = 300;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
