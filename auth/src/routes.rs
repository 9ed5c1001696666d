//! Route table: which paths need a signed-in user.
//!
//! Patterns are matched segment by segment:
//!
//! - a literal segment matches itself
//! - `:name` matches any single non-empty segment
//! - a trailing `*` matches the rest of the path, including nothing
//!
//! Paths that match no route are [`Access::Protected`].

use serde::{Deserialize, Serialize};

/// Who may open a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Anyone.
    Public,

    /// Signed-in users.
    Protected,

    /// Signed-in users on the admin list.
    Admin,
}

/// One route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path pattern.
    pub pattern: String,

    /// Required access.
    pub access: Access,
}

/// Ordered list of routes. The first matching pattern wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Empty table; every path is protected.
    #[must_use]
    pub const fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Append a route.
    #[must_use]
    pub fn with_route(mut self, pattern: impl Into<String>, access: Access) -> Self {
        self.routes.push(Route {
            pattern: pattern.into(),
            access,
        });
        self
    }

    /// Registered routes, in match order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Access required for `path`.
    #[must_use]
    pub fn access(&self, path: &str) -> Access {
        let path = normalize(path);
        self.routes
            .iter()
            .find(|route| matches(&route.pattern, path))
            .map_or(Access::Protected, |route| route.access)
    }
}

/// The application's routes.
impl Default for RouteTable {
    fn default() -> Self {
        let public = [
            "/",
            "/login",
            "/signup",
            "/auth/callback",
            "/about",
            "/services",
            "/pricing",
            "/reset-password/*",
        ];
        let protected = [
            "/dashboard",
            "/settings",
            "/self-practice",
            "/topic/:id",
            "/solve/:id",
            "/peer-practice",
            "/peer-practice/:sessionId",
            "/team-coding",
            "/community",
            "/devops-practice",
            "/devops-flow",
            "/hr-interview",
            "/hr-interview/:id",
            "/technical-round",
        ];

        let table = public
            .into_iter()
            .fold(Self::empty(), |table, p| table.with_route(p, Access::Public));
        let table = protected
            .into_iter()
            .fold(table, |table, p| table.with_route(p, Access::Protected));
        table.with_route("/admin/*", Access::Admin)
    }
}

/// Strip query string, fragment and trailing slash.
pub(crate) fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Whether `path` equals `prefix` or lies below it.
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    let path = normalize(path);
    let prefix = normalize(prefix);
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn matches(pattern: &str, path: &str) -> bool {
    let mut wanted = segments(pattern);
    let mut actual = segments(path);

    loop {
        match (wanted.next(), actual.next()) {
            (Some("*"), _) => return wanted.next().is_none(),
            (Some(w), Some(a)) if w.starts_with(':') => {
                if a.is_empty() {
                    return false;
                }
            },
            (Some(w), Some(a)) if w == a => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    normalize(path).split('/').filter(|s| !s.is_empty())
}
