//! Session gate state types.
//!
//! [`GateState`] is the single source of truth for "who is signed in and
//! where are they". It is owned by the store loop and published to views as
//! snapshots. All types are `Clone` to support the functional architecture
//! pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a user, as issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a queued notice, unique within one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoticeId(pub u64);

// ═══════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,

    /// Email address.
    pub email: String,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

/// Session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Signed-in user.
    pub user: User,

    /// When the access token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session.
    #[must_use]
    pub const fn new(user: User, expires_at: DateTime<Utc>) -> Self {
        Self { user, expires_at }
    }

    /// Whether the access token is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Gate State
// ═══════════════════════════════════════════════════════════════════════

/// Whether the startup session lookup has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Startup lookup still running. Guards render nothing.
    #[default]
    Initializing,

    /// The gate knows whether a user is signed in.
    Ready,
}

/// Path a user tried to reach before being sent to login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    /// Requested path.
    pub path: String,

    /// When the redirect to login happened.
    pub recorded_at: DateTime<Utc>,
}

/// How a notice should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Informational message.
    Info,

    /// Something the user has to act on.
    Error,

    /// Not tied to a user action; logged, never queued.
    Background,
}

/// User-visible message raised by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Notice ID (used to dismiss it).
    pub id: NoticeId,

    /// Short title.
    pub title: String,

    /// Body text.
    pub description: String,

    /// Severity.
    pub severity: Severity,

    /// When the notice was raised.
    pub raised_at: DateTime<Utc>,
}

/// Root session gate state.
///
/// Only the store loop writes it. Views receive cloned snapshots and should
/// not hold on to one for longer than a render.
///
/// # Examples
///
/// ```
/// # use sakshatkar_auth::{GateState, Phase};
/// let state = GateState::at("/dashboard");
/// assert_eq!(state.phase, Phase::Initializing);
/// assert!(state.user.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    /// Currently signed-in user, if any.
    pub user: Option<User>,

    /// Startup phase.
    pub phase: Phase,

    /// Current route path. Gate redirects are changes of this field.
    pub location: String,

    /// Path to return to after the next successful sign-in.
    pub intent: Option<NavigationIntent>,

    /// Pending notices, oldest first.
    pub notices: Vec<Notice>,

    /// Number of redirects the gate has issued.
    pub redirects: u64,

    /// A user-initiated sign-out is waiting for the provider.
    pub sign_out_pending: bool,

    /// Number of auth events processed so far.
    pub events_processed: u64,

    /// `events_processed` at the time the in-flight session lookup was issued.
    pub pending_lookup: Option<u64>,

    #[serde(default)]
    next_notice: u64,
}

impl GateState {
    /// Initial state for an app opened at `location`.
    #[must_use]
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            user: None,
            phase: Phase::Initializing,
            location: location.into(),
            intent: None,
            notices: Vec::new(),
            redirects: 0,
            sign_out_pending: false,
            events_processed: 0,
            pending_lookup: None,
            next_notice: 0,
        }
    }

    /// Whether the startup lookup is still running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Initializing
    }

    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// Queue a notice and return its ID.
    pub(crate) fn push_notice(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        raised_at: DateTime<Utc>,
    ) -> NoticeId {
        self.next_notice += 1;
        let id = NoticeId(self.next_notice);
        self.notices.push(Notice {
            id,
            title: title.into(),
            description: description.into(),
            severity,
            raised_at,
        });
        id
    }
}

impl Default for GateState {
    fn default() -> Self {
        Self::at("/")
    }
}
