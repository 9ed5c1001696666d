//! Route guard.
//!
//! Decides, for a gate snapshot and a requested path, whether the view may
//! render. The guard is pure; [`crate::SessionGate::enter`] turns a redirect
//! decision into a [`crate::GateAction::AccessDenied`].

use crate::config::GateConfig;
use crate::routes::Access;
use crate::state::GateState;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Startup lookup still running: render nothing, do not redirect.
    Pending,

    /// Render the requested view.
    Render,

    /// Send the user elsewhere.
    Redirect {
        /// Target path
        to: String,
        /// Path to return to after sign-in, if any
        intent: Option<String>,
    },
}

/// Route guard over a [`GateConfig`].
#[derive(Debug, Clone)]
pub struct RouteGuard {
    config: GateConfig,
}

impl RouteGuard {
    /// Create a guard.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide what to do with a request for `path`.
    ///
    /// Public paths always render, so the login page can never redirect to
    /// itself.
    #[must_use]
    pub fn decide(&self, state: &GateState, path: &str) -> GuardDecision {
        if self.config.is_public(path) {
            return GuardDecision::Render;
        }
        if state.is_loading() {
            return GuardDecision::Pending;
        }

        let Some(user) = &state.user else {
            return GuardDecision::Redirect {
                to: self.config.login_path.clone(),
                intent: Some(path.to_string()),
            };
        };

        match self.config.routes.access(path) {
            Access::Admin if !self.config.is_admin(&user.email) => GuardDecision::Redirect {
                to: "/".to_string(),
                intent: None,
            },
            Access::Public | Access::Protected | Access::Admin => GuardDecision::Render,
        }
    }
}
