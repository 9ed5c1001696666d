//! Error types and failure classification for the session gate.

use sakshatkar_runtime::StoreError;
use thiserror::Error;

/// Result type alias for session gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Failure reported by the identity provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered with an error response.
    #[error("{message}")]
    Api {
        /// HTTP-like status code
        status: u16,
        /// Machine-readable error code, if the provider sent one
        code: Option<String>,
        /// Human-readable message
        message: String,
    },

    /// The provider could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider is temporarily unavailable.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected before reaching the provider.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Convenience constructor for API errors.
    #[must_use]
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.map(str::to_owned),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unavailable(_))
    }

    /// Bare message, without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Api { message, .. }
            | Self::Network(message)
            | Self::Unavailable(message)
            | Self::InvalidRequest(message) => message,
        }
    }
}

/// Broad class of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The session is gone; the user has to sign in again.
    SessionLoss,

    /// Anything else. The current user is kept.
    ProviderFault,
}

/// Markers that identify a lost or expired session.
///
/// Matched case-insensitively against the error code and message.
const SESSION_LOSS_MARKERS: &[&str] = &[
    "refresh_token_not_found",
    "invalid refresh token",
    "jwt expired",
    "session_not_found",
    "session_expired",
];

/// Classify a provider failure.
///
/// # Examples
///
/// ```
/// use sakshatkar_auth::{classify, FailureClass, ProviderError};
///
/// let err = ProviderError::api(400, Some("refresh_token_not_found"), "Session refresh failed");
/// assert_eq!(classify(&err), FailureClass::SessionLoss);
///
/// let err = ProviderError::api(500, None, "Database timeout");
/// assert_eq!(classify(&err), FailureClass::ProviderFault);
/// ```
#[must_use]
pub fn classify(error: &ProviderError) -> FailureClass {
    let names_session_loss = |text: &str| {
        let text = text.to_ascii_lowercase();
        SESSION_LOSS_MARKERS.iter().any(|marker| text.contains(marker))
    };

    let lost = match error {
        ProviderError::Api { code, message, .. } => {
            code.as_deref().is_some_and(names_session_loss) || names_session_loss(message)
        },
        ProviderError::Network(message)
        | ProviderError::Unavailable(message)
        | ProviderError::InvalidRequest(message) => names_session_loss(message),
    };

    if lost {
        FailureClass::SessionLoss
    } else {
        FailureClass::ProviderFault
    }
}

/// Failure taxonomy used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Session expired or refresh failed.
    RecoverableSessionLoss,

    /// Provider reported some other error.
    ProviderError,

    /// The provider rejected a sign-out the user asked for.
    UserInitiatedSignoutFailure,
}

impl FailureKind {
    /// Stable label for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecoverableSessionLoss => "recoverable-session-loss",
            Self::ProviderError => "provider-error",
            Self::UserInitiatedSignoutFailure => "user-initiated-signout-failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::SessionGate`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// `start()` was already called on this gate.
    #[error("Session gate already started")]
    AlreadyStarted,

    /// The gate has been disposed.
    #[error("Session gate disposed")]
    Disposed,

    /// The identity provider refused the subscription.
    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The underlying store rejected an action.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
