//! Session gate reducer.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//! Provider calls leave the reducer as `Effect::Future` and come back as
//! `*Completed` actions through the same queue as everything else.

mod session;
mod sign_out;

use crate::actions::GateAction;
use crate::config::GateConfig;
use crate::environment::GateEnvironment;
use crate::guard::{GuardDecision, RouteGuard};
use crate::providers::IdentityProvider;
use crate::state::{GateState, NavigationIntent, NoticeId, Severity};
use sakshatkar_core::environment::Clock;
use sakshatkar_core::{SmallVec, delay, effect::Effect, reducer::Reducer, smallvec};
use std::marker::PhantomData;

/// Effects returned by one reduction.
type Effects = SmallVec<[Effect<GateAction>; 4]>;

/// Session gate reducer.
///
/// Owns every transition of [`GateState`]: startup lookup, auth events,
/// sign-out, guard rejections, navigation and notices.
pub struct GateReducer<P, C> {
    guard: RouteGuard,
    _env: PhantomData<fn() -> (P, C)>,
}

impl<P, C> GateReducer<P, C> {
    /// Create a reducer for `config`.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self {
            guard: RouteGuard::new(config),
            _env: PhantomData,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        self.guard.config()
    }

    /// Move to `to` unless the user is already there.
    ///
    /// Returns whether a redirect happened.
    fn redirect(state: &mut GateState, to: &str) -> bool {
        if state.location == to {
            tracing::debug!(to, "Already at redirect target, skipping");
            return false;
        }

        tracing::info!(from = %state.location, to, "Redirecting");
        to.clone_into(&mut state.location);
        state.redirects += 1;
        true
    }

    /// Remember `path` for the next sign-in. Public paths are never recorded.
    fn record_intent(&self, state: &mut GateState, path: &str, clock: &impl Clock) {
        if self.config().is_public(path) {
            tracing::trace!(path, "Not recording intent for public path");
            return;
        }

        tracing::debug!(path, "Recording navigation intent");
        state.intent = Some(NavigationIntent {
            path: path.to_string(),
            recorded_at: clock.now(),
        });
    }

    /// Queue a notice, or only log it for background failures.
    fn raise(
        &self,
        state: &mut GateState,
        title: &str,
        description: &str,
        severity: Severity,
        clock: &impl Clock,
    ) -> Effects {
        if severity == Severity::Background {
            tracing::info!(title, description, "Background failure, not shown to the user");
            return smallvec![Effect::None];
        }

        let id = state.push_notice(title, description, severity, clock.now());
        tracing::debug!(notice_id = id.0, title, "Notice raised");

        match self.config().notice_ttl {
            Some(ttl) => smallvec![delay! {
                duration: ttl,
                action: GateAction::DismissNotice { id }
            }],
            None => smallvec![Effect::None],
        }
    }

    /// Re-run the guard against current state and apply its decision.
    ///
    /// The check in [`crate::SessionGate::enter`] saw an older snapshot; by the
    /// time this action is processed a sign-in may have landed.
    fn access_denied(&self, state: &mut GateState, path: String, clock: &impl Clock) -> Effects {
        match self.guard.decide(state, &path) {
            GuardDecision::Redirect { to, intent } => {
                tracing::info!(path = %path, to = %to, "Access denied");
                state.location = path;
                if let Some(intent) = intent {
                    self.record_intent(state, &intent, clock);
                }
                Self::redirect(state, &to);
            },
            GuardDecision::Render | GuardDecision::Pending => {
                tracing::debug!(path = %path, "Access allowed on re-check");
                state.location = path;
            },
        }
        smallvec![Effect::None]
    }

    fn dismiss_notice(state: &mut GateState, id: NoticeId) -> Effects {
        let before = state.notices.len();
        state.notices.retain(|notice| notice.id != id);
        if state.notices.len() == before {
            tracing::trace!(notice_id = id.0, "Notice already gone");
        }
        smallvec![Effect::None]
    }
}

impl<P, C> Clone for GateReducer<P, C> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            _env: PhantomData,
        }
    }
}

impl<P, C> std::fmt::Debug for GateReducer<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateReducer")
            .field("config", self.config())
            .finish()
    }
}

impl<P, C> Reducer for GateReducer<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    type State = GateState;
    type Action = GateAction;
    type Environment = GateEnvironment<P, C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            GateAction::Initialize => self.initialize(state, env),
            GateAction::SessionLookupCompleted { result } => {
                self.session_lookup_completed(state, result, env)
            },
            GateAction::AuthEvent(event) => self.auth_event(state, event, env),
            GateAction::Logout => Self::logout(state, env),
            GateAction::SignOutCompleted { result } => self.sign_out_completed(state, result, env),
            GateAction::BackgroundSignOutCompleted { result } => {
                self.background_sign_out_completed(state, &result, env)
            },
            GateAction::AccessDenied { path } => self.access_denied(state, path, &env.clock),
            GateAction::Navigate { path } => {
                tracing::trace!(path = %path, "Navigated");
                state.location = path;
                smallvec![Effect::None]
            },
            GateAction::DismissNotice { id } => Self::dismiss_notice(state, id),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockIdentityProvider;
    use crate::state::Phase;
    use sakshatkar_testing::{FixedClock, ReducerTest, test_clock};

    fn reducer() -> GateReducer<MockIdentityProvider, FixedClock> {
        GateReducer::new(GateConfig::default().with_admin_email("admin@sakshatkar.dev"))
    }

    fn env() -> GateEnvironment<MockIdentityProvider, FixedClock> {
        GateEnvironment::new(MockIdentityProvider::new(), test_clock())
    }

    fn ready_at(path: &str, email: Option<&str>) -> GateState {
        let mut state = GateState::at(path);
        state.phase = Phase::Ready;
        state.user = email.map(|e| MockIdentityProvider::session_for(e).user);
        state
    }

    #[test]
    fn redirect_to_current_location_is_noop() {
        let mut state = GateState::at("/login");
        assert!(!GateReducer::<MockIdentityProvider, FixedClock>::redirect(&mut state, "/login"));
        assert_eq!(state.redirects, 0);
    }

    #[test]
    fn access_denied_records_intent_and_redirects() {
        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(ready_at("/", None))
            .when_action(GateAction::AccessDenied {
                path: "/hr-interview/7".to_string(),
            })
            .then_state(|s| {
                assert_eq!(s.location, "/login");
                assert_eq!(s.redirects, 1);
                assert_eq!(s.intent.as_ref().map(|i| i.path.as_str()), Some("/hr-interview/7"));
            })
            .run();
    }

    #[test]
    fn access_denied_rechecks_against_current_state() {
        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(ready_at("/", Some("dev@example.com")))
            .when_action(GateAction::AccessDenied {
                path: "/dashboard".to_string(),
            })
            .then_state(|s| {
                assert_eq!(s.location, "/dashboard");
                assert_eq!(s.redirects, 0);
                assert!(s.intent.is_none());
            })
            .run();
    }

    #[test]
    fn non_admin_is_sent_home_without_intent() {
        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(ready_at("/dashboard", Some("dev@example.com")))
            .when_action(GateAction::AccessDenied {
                path: "/admin/hackathon".to_string(),
            })
            .then_state(|s| {
                assert_eq!(s.location, "/");
                assert_eq!(s.redirects, 1);
                assert!(s.intent.is_none());
            })
            .run();
    }

    #[test]
    fn dismiss_notice_removes_only_that_notice() {
        let mut state = GateState::default();
        let first = state.push_notice("A", "a", Severity::Error, test_clock().now());
        let second = state.push_notice("B", "b", Severity::Error, test_clock().now());

        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(state)
            .when_action(GateAction::DismissNotice { id: first })
            .then_state(move |s| {
                assert_eq!(s.notices.len(), 1);
                assert_eq!(s.notices[0].id, second);
            })
            .run();
    }
}
