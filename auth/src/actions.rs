//! Session gate actions.
//!
//! Actions are the only way to change [`crate::GateState`]. Callers, the
//! provider event forwarder, and effect results all produce them and they
//! are applied strictly in queue order.

use crate::error::ProviderError;
use crate::state::{NoticeId, Session};
use serde::{Deserialize, Serialize};

/// Kind of auth-state change reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEventKind {
    /// A user signed in.
    SignedIn,

    /// The user signed out (locally or remotely).
    SignedOut,

    /// The access token was refreshed.
    TokenRefreshed,

    /// User attributes changed.
    UserUpdated,
}

/// Auth-state change pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    /// What happened.
    pub kind: AuthEventKind,

    /// Session after the change, if the provider has one.
    pub session: Option<Session>,
}

impl AuthEvent {
    /// Create an event.
    #[must_use]
    pub const fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

/// Session gate actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    // ═══════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════

    /// Look up the current session at startup.
    Initialize,

    /// Handle an auth-state change from the provider.
    AuthEvent(AuthEvent),

    /// Sign the current user out.
    Logout,

    /// A guard refused `path`; send the user to sign in (or away from an
    /// admin page).
    AccessDenied {
        /// Path the user tried to open
        path: String,
    },

    /// The router moved to `path`.
    Navigate {
        /// New location
        path: String,
    },

    /// The UI dismissed a notice.
    DismissNotice {
        /// Notice to remove
        id: NoticeId,
    },

    // ═══════════════════════════════════════════════════════════
    // Effect results
    // ═══════════════════════════════════════════════════════════

    /// Startup session lookup finished (after retries).
    SessionLookupCompleted {
        /// Lookup result
        result: Result<Option<Session>, ProviderError>,
    },

    /// User-initiated sign-out finished.
    SignOutCompleted {
        /// Sign-out result
        result: Result<(), ProviderError>,
    },

    /// Best-effort sign-out after a session loss finished.
    BackgroundSignOutCompleted {
        /// Sign-out result
        result: Result<(), ProviderError>,
    },
}
