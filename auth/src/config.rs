//! Session gate configuration.
//!
//! Paths, the admin list and retry behavior are provided by the application,
//! not hardcoded. The defaults match the Sakshatkar web app.

use crate::error::GateError;
use crate::routes::{Access, RouteTable, is_under};
use sakshatkar_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`GateConfig::landing_path`].
pub const ENV_LANDING_PATH: &str = "SAKSHATKAR_LANDING_PATH";
/// Environment variable overriding [`GateConfig::login_path`].
pub const ENV_LOGIN_PATH: &str = "SAKSHATKAR_LOGIN_PATH";
/// Environment variable overriding [`GateConfig::admin_emails`] (comma separated).
pub const ENV_ADMIN_EMAILS: &str = "SAKSHATKAR_ADMIN_EMAILS";
/// Environment variable overriding `init_retry.max_retries`.
pub const ENV_INIT_RETRIES: &str = "SAKSHATKAR_INIT_RETRIES";

/// Session gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Sign-in page.
    ///
    /// Default: `/login`
    pub login_path: String,

    /// Where a sign-in without a recorded intent lands.
    ///
    /// Default: `/dashboard`
    pub landing_path: String,

    /// Paths (and everything below them) that never require a session.
    ///
    /// Default: `/login`, `/signup`, `/auth/callback`, `/reset-password`
    pub public_paths: Vec<String>,

    /// Emails allowed on admin routes. Compared case-insensitively.
    pub admin_emails: Vec<String>,

    /// Route access table.
    pub routes: RouteTable,

    /// Retry policy for transient failures of the startup session lookup.
    pub init_retry: RetryPolicy,

    /// Dismiss notices automatically after this long.
    ///
    /// Default: never
    pub notice_ttl: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
            public_paths: ["/login", "/signup", "/auth/callback", "/reset-password"]
                .map(String::from)
                .to_vec(),
            admin_emails: Vec::new(),
            routes: RouteTable::default(),
            init_retry: RetryPolicy::default(),
            notice_ttl: None,
        }
    }
}

impl GateConfig {
    /// Set the sign-in page.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the default post-sign-in page.
    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.landing_path = path.into();
        self
    }

    /// Add a public path prefix.
    #[must_use]
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }

    /// Add an admin email.
    #[must_use]
    pub fn with_admin_email(mut self, email: impl Into<String>) -> Self {
        self.admin_emails.push(email.into());
        self
    }

    /// Replace the route table.
    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Set the startup lookup retry policy.
    #[must_use]
    pub fn with_init_retry(mut self, policy: RetryPolicy) -> Self {
        self.init_retry = policy;
        self
    }

    /// Dismiss notices automatically after `ttl`.
    #[must_use]
    pub const fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notice_ttl = Some(ttl);
        self
    }

    /// Defaults overlaid with `SAKSHATKAR_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, GateError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` (same keys as [`GateConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if a value is invalid.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_LANDING_PATH) {
            self.landing_path = absolute_path(ENV_LANDING_PATH, path)?;
        }
        if let Some(path) = lookup(ENV_LOGIN_PATH) {
            self.login_path = absolute_path(ENV_LOGIN_PATH, path)?;
        }
        if let Some(emails) = lookup(ENV_ADMIN_EMAILS) {
            self.admin_emails = emails
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(retries) = lookup(ENV_INIT_RETRIES) {
            self.init_retry.max_retries = retries.trim().parse().map_err(|_| {
                GateError::Config(format!("{ENV_INIT_RETRIES} must be a non-negative integer, got {retries:?}"))
            })?;
        }
        Ok(self)
    }

    /// Whether `path` is reachable without a session.
    ///
    /// True for the login page, anything under a public path prefix, and
    /// routes the table marks [`Access::Public`].
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        is_under(path, &self.login_path)
            || self.public_paths.iter().any(|prefix| is_under(path, prefix))
            || self.routes.access(path) == Access::Public
    }

    /// Whether `email` is on the admin list.
    #[must_use]
    pub fn is_admin(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }
}

fn absolute_path(key: &str, value: String) -> Result<String, GateError> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(GateError::Config(format!("{key} must start with '/', got {value:?}")))
    }
}
