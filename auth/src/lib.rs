//! # Sakshatkar Session Gate
//!
//! The session gate is the client-side control logic that decides who is
//! signed in and where they are allowed to go. It owns:
//!
//! - **Session store**: current user, loading phase, navigation intent
//! - **Auth-event handling**: signed-in, signed-out, token-refreshed, user-updated
//! - **Error classification**: recoverable session loss vs. provider faults
//! - **Route guard**: public, protected and admin routes
//!
//! ## Architecture
//!
//! The gate is a reducer running on a [`sakshatkar_runtime::Store`]:
//!
//! ```text
//! caller / provider event → GateAction → GateReducer → (GateState, Effects)
//!                                              ↑                  │
//!                                              └── provider call ─┘
//! ```
//!
//! Every action goes through one ordered queue, so the published
//! [`GateState`] always reflects the most recently processed auth event.
//! Redirects are expressed as changes of `GateState::location`; the UI
//! router follows them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sakshatkar_auth::{GateConfig, SessionGate};
//!
//! let gate = SessionGate::new(GateConfig::default(), provider, SystemClock, "/dashboard");
//! gate.start().await?;
//!
//! match gate.enter("/settings").await? {
//!     GuardDecision::Render => render_settings(),
//!     GuardDecision::Pending => render_spinner(),
//!     GuardDecision::Redirect { .. } => {} // location already changed
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod actions;
pub mod config;
pub mod environment;
pub mod error;
pub mod gate;
pub mod guard;
pub mod providers;
pub mod reducers;
pub mod routes;
pub mod state;

/// Mock implementations for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use actions::{AuthEvent, AuthEventKind, GateAction};
pub use config::GateConfig;
pub use environment::GateEnvironment;
pub use error::{FailureClass, FailureKind, GateError, ProviderError, Result, classify};
pub use gate::SessionGate;
pub use guard::{GuardDecision, RouteGuard};
pub use providers::{AuthSubscription, IdentityProvider, SubscriptionHandle};
pub use reducers::GateReducer;
pub use routes::{Access, RouteTable};
pub use state::{GateState, NavigationIntent, Notice, NoticeId, Phase, Session, Severity, User, UserId};
