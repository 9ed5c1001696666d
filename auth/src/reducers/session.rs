//! Startup session lookup and provider auth events.

use super::{Effects, GateReducer};
use crate::actions::{AuthEvent, AuthEventKind, GateAction};
use crate::environment::GateEnvironment;
use crate::error::{FailureClass, FailureKind, ProviderError, classify};
use crate::providers::IdentityProvider;
use crate::state::{GateState, Phase, Session, Severity};
use sakshatkar_core::environment::Clock;
use sakshatkar_core::{async_effect, effect::Effect, smallvec};
use sakshatkar_runtime::retry::retry_with_predicate;

impl<P, C> GateReducer<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    pub(super) fn initialize(&self, state: &mut GateState, env: &GateEnvironment<P, C>) -> Effects {
        if let Some(issued_at) = state.pending_lookup {
            tracing::debug!(issued_at, "Session lookup already in flight, ignoring Initialize");
            return smallvec![Effect::None];
        }

        state.pending_lookup = Some(state.events_processed);
        tracing::debug!(location = %state.location, "Looking up current session");

        let provider = env.provider.clone();
        let policy = self.config().init_retry.clone();
        smallvec![async_effect! {
            let result = retry_with_predicate(
                &policy,
                || provider.current_session(),
                ProviderError::is_transient,
            )
            .await;
            Some(GateAction::SessionLookupCompleted { result })
        }]
    }

    pub(super) fn session_lookup_completed(
        &self,
        state: &mut GateState,
        result: Result<Option<Session>, ProviderError>,
        env: &GateEnvironment<P, C>,
    ) -> Effects {
        let Some(issued_at) = state.pending_lookup.take() else {
            tracing::warn!("Session lookup result without a lookup in flight, ignoring");
            return smallvec![Effect::None];
        };
        state.phase = Phase::Ready;

        if state.events_processed > issued_at {
            tracing::info!(
                events_since = state.events_processed - issued_at,
                "Auth events arrived during session lookup, discarding stale result"
            );
            return smallvec![Effect::None];
        }

        match result {
            Ok(Some(session)) if session.is_valid_at(env.clock.now()) => {
                tracing::info!(user_id = %session.user.id, "Session restored");
                state.user = Some(session.user);
                smallvec![Effect::None]
            },
            Ok(Some(session)) => {
                tracing::warn!(
                    kind = %FailureKind::RecoverableSessionLoss,
                    user_id = %session.user.id,
                    expired_at = %session.expires_at,
                    "Restored session already expired"
                );
                self.session_loss(state, env)
            },
            Ok(None) => {
                tracing::info!(location = %state.location, "No active session");
                if !self.config().is_public(&state.location) {
                    let location = state.location.clone();
                    self.record_intent(state, &location, &env.clock);
                    let login = self.config().login_path.clone();
                    Self::redirect(state, &login);
                }
                smallvec![Effect::None]
            },
            Err(error) => self.provider_failure(state, &error, env),
        }
    }

    pub(super) fn auth_event(
        &self,
        state: &mut GateState,
        event: AuthEvent,
        env: &GateEnvironment<P, C>,
    ) -> Effects {
        state.events_processed += 1;
        let AuthEvent { kind, session } = event;

        match (kind, session) {
            (AuthEventKind::SignedIn, Some(session)) => {
                tracing::info!(user_id = %session.user.id, "User signed in");
                state.user = Some(session.user);

                let target = state
                    .intent
                    .take()
                    .map_or_else(|| self.config().landing_path.clone(), |intent| intent.path);
                Self::redirect(state, &target);
                smallvec![Effect::None]
            },
            (AuthEventKind::SignedIn, None) => {
                tracing::warn!(
                    kind = %FailureKind::RecoverableSessionLoss,
                    "Signed-in event without a session, treating as refresh failure"
                );
                self.session_loss(state, env)
            },
            (AuthEventKind::SignedOut, _) => {
                tracing::info!("User signed out");
                state.user = None;
                let login = self.config().login_path.clone();
                Self::redirect(state, &login);
                smallvec![Effect::None]
            },
            (AuthEventKind::TokenRefreshed, Some(session)) => {
                tracing::debug!(user_id = %session.user.id, "Token refreshed");
                state.user = Some(session.user);
                smallvec![Effect::None]
            },
            (AuthEventKind::TokenRefreshed, None) => {
                tracing::warn!(
                    kind = %FailureKind::RecoverableSessionLoss,
                    "Token refresh returned no session"
                );
                self.session_loss(state, env)
            },
            (AuthEventKind::UserUpdated, Some(session)) => {
                tracing::debug!(user_id = %session.user.id, "User updated");
                state.user = Some(session.user);
                smallvec![Effect::None]
            },
            (AuthEventKind::UserUpdated, None) => {
                tracing::debug!("User-updated event without a session, ignoring");
                smallvec![Effect::None]
            },
        }
    }

    /// Apply the failure policy to a provider error.
    pub(super) fn provider_failure(
        &self,
        state: &mut GateState,
        error: &ProviderError,
        env: &GateEnvironment<P, C>,
    ) -> Effects {
        match classify(error) {
            FailureClass::SessionLoss => {
                tracing::warn!(kind = %FailureKind::RecoverableSessionLoss, %error, "Session lost");
                self.session_loss(state, env)
            },
            FailureClass::ProviderFault => {
                tracing::warn!(kind = %FailureKind::ProviderError, %error, "Identity provider error");
                self.raise(
                    state,
                    "Authentication Error",
                    error.message(),
                    Severity::Error,
                    &env.clock,
                )
            },
        }
    }

    /// Recoverable session loss: tell the user, forget them, send them to
    /// login and sign out at the provider on a best-effort basis.
    pub(super) fn session_loss(&self, state: &mut GateState, env: &GateEnvironment<P, C>) -> Effects {
        let mut effects = self.raise(
            state,
            "Session Expired",
            "Please log in again to continue.",
            Severity::Error,
            &env.clock,
        );

        state.user = None;
        let location = state.location.clone();
        self.record_intent(state, &location, &env.clock);
        let login = self.config().login_path.clone();
        Self::redirect(state, &login);

        let provider = env.provider.clone();
        effects.push(async_effect! {
            let result = provider.sign_out().await;
            Some(GateAction::BackgroundSignOutCompleted { result })
        });
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::mocks::MockIdentityProvider;
    use crate::state::NavigationIntent;
    use sakshatkar_core::reducer::Reducer as _;
    use sakshatkar_runtime::retry::RetryPolicy;
    use sakshatkar_testing::{
        FixedClock, ManualClock, ReducerTest, assertions, resolve_effects, test_clock,
    };
    use std::time::Duration;

    type TestReducer = GateReducer<MockIdentityProvider, FixedClock>;

    fn fast_config() -> GateConfig {
        GateConfig::default().with_init_retry(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .build(),
        )
    }

    fn reducer() -> TestReducer {
        GateReducer::new(fast_config())
    }

    fn env(provider: &MockIdentityProvider) -> GateEnvironment<MockIdentityProvider, FixedClock> {
        GateEnvironment::new(provider.clone(), test_clock())
    }

    fn lookup(result: Result<Option<Session>, ProviderError>) -> GateAction {
        GateAction::SessionLookupCompleted { result }
    }

    fn event(kind: AuthEventKind, session: Option<Session>) -> GateAction {
        GateAction::AuthEvent(AuthEvent::new(kind, session))
    }

    fn signed_in_at(path: &str) -> GateState {
        let mut state = GateState::at(path);
        state.phase = Phase::Ready;
        state.user = Some(MockIdentityProvider::session_for("dev@example.com").user);
        state
    }

    #[test]
    fn initialize_issues_lookup() {
        let provider = MockIdentityProvider::new();
        ReducerTest::new(reducer())
            .with_env(env(&provider))
            .given_state(GateState::at("/dashboard"))
            .when_action(GateAction::Initialize)
            .then_state(|s| {
                assert_eq!(s.pending_lookup, Some(0));
                assert!(s.is_loading());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn second_initialize_while_in_flight_is_ignored() {
        let provider = MockIdentityProvider::new();
        ReducerTest::new(reducer())
            .with_env(env(&provider))
            .given_state(GateState::at("/dashboard"))
            .given_actions([GateAction::Initialize])
            .when_action(GateAction::Initialize)
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn lookup_retries_transient_errors() {
        let session = MockIdentityProvider::session_for("dev@example.com");
        let provider = MockIdentityProvider::new()
            .with_session(session.clone())
            .script_lookup(Err(ProviderError::Network("connection reset".into())))
            .script_lookup(Err(ProviderError::Unavailable("503".into())));

        let mut state = GateState::at("/dashboard");
        let effects = reducer().reduce(&mut state, GateAction::Initialize, &env(&provider));

        assert_eq!(resolve_effects(effects), vec![lookup(Ok(Some(session)))]);
        assert_eq!(provider.lookup_calls(), 3);
    }

    #[test]
    fn lookup_does_not_retry_session_loss() {
        let expired = ProviderError::api(400, Some("refresh_token_not_found"), "Invalid Refresh Token");
        let provider = MockIdentityProvider::new().script_lookup(Err(expired.clone()));

        let mut state = GateState::at("/dashboard");
        let effects = reducer().reduce(&mut state, GateAction::Initialize, &env(&provider));

        assert_eq!(resolve_effects(effects), vec![lookup(Err(expired))]);
        assert_eq!(provider.lookup_calls(), 1);
    }

    #[test]
    fn restored_session_sets_user_without_redirect() {
        let session = MockIdentityProvider::session_for("dev@example.com");
        let user = session.user.clone();
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/dashboard"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Ok(Some(session))))
            .then_state(move |s| {
                assert_eq!(s.user, Some(user));
                assert_eq!(s.phase, Phase::Ready);
                assert_eq!(s.location, "/dashboard");
                assert_eq!(s.redirects, 0);
            })
            .run();
    }

    #[test]
    fn no_session_on_protected_path_records_intent_and_redirects() {
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/solve/12"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Ok(None)))
            .then_state(|s| {
                assert_eq!(s.location, "/login");
                assert_eq!(s.redirects, 1);
                assert_eq!(
                    s.intent,
                    Some(NavigationIntent {
                        path: "/solve/12".to_string(),
                        recorded_at: test_clock().now(),
                    })
                );
            })
            .run();
    }

    #[test]
    fn no_session_on_public_path_stays() {
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/reset-password/token"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Ok(None)))
            .then_state(|s| {
                assert_eq!(s.location, "/reset-password/token");
                assert_eq!(s.redirects, 0);
                assert!(s.intent.is_none());
            })
            .run();
    }

    #[test]
    fn lookup_result_after_auth_event_is_stale() {
        let session = MockIdentityProvider::session_for("new@example.com");
        let user = session.user.clone();
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/login"))
            .given_actions([
                GateAction::Initialize,
                event(AuthEventKind::SignedIn, Some(session)),
            ])
            .when_action(lookup(Ok(None)))
            .then_state(move |s| {
                assert_eq!(s.user, Some(user));
                assert_eq!(s.phase, Phase::Ready);
                assert!(s.pending_lookup.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn expired_restored_session_is_session_loss() {
        let mut session = MockIdentityProvider::session_for("dev@example.com");
        session.expires_at = test_clock().now() - chrono::Duration::seconds(1);

        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/settings"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Ok(Some(session))))
            .then_state(|s| {
                assert!(s.user.is_none());
                assert_eq!(s.location, "/login");
                assert_eq!(s.notices[0].title, "Session Expired");
            })
            .run();
    }

    #[test]
    fn session_restored_again_after_expiry_is_session_loss() {
        let clock = ManualClock::new(test_clock().now());
        let env = GateEnvironment::new(MockIdentityProvider::new(), clock.clone());
        let reducer = GateReducer::<MockIdentityProvider, ManualClock>::new(fast_config());
        let mut session = MockIdentityProvider::session_for("dev@example.com");
        session.expires_at = clock.now() + chrono::Duration::minutes(30);

        let mut state = GateState::at("/settings");
        let _ = reducer.reduce(&mut state, GateAction::Initialize, &env);
        let _ = reducer.reduce(&mut state, lookup(Ok(Some(session.clone()))), &env);
        assert_eq!(state.user.as_ref(), Some(&session.user));

        clock.advance(chrono::Duration::hours(1));

        let _ = reducer.reduce(&mut state, GateAction::Initialize, &env);
        let effects = reducer.reduce(&mut state, lookup(Ok(Some(session))), &env);

        assert!(state.user.is_none());
        assert_eq!(state.location, "/login");
        assert_eq!(state.intent.as_ref().map(|i| i.path.as_str()), Some("/settings"));
        assert_eq!(state.notices[0].title, "Session Expired");
        assert_eq!(state.notices[0].raised_at, clock.now());
        assertions::assert_has_future_effect(&effects);
    }

    #[test]
    fn provider_fault_keeps_user_and_raises_notice() {
        let error = ProviderError::api(500, None, "Database timeout");
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in_at("/dashboard"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Err(error)))
            .then_state(|s| {
                assert!(s.user.is_some());
                assert_eq!(s.location, "/dashboard");
                assert_eq!(s.notices.len(), 1);
                assert_eq!(s.notices[0].title, "Authentication Error");
                assert_eq!(s.notices[0].description, "Database timeout");
                assert_eq!(s.notices[0].severity, Severity::Error);
            })
            .run();
    }

    #[test]
    fn exhausted_transient_failure_raises_notice() {
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/dashboard"))
            .given_actions([GateAction::Initialize])
            .when_action(lookup(Err(ProviderError::Network("offline".into()))))
            .then_state(|s| {
                assert_eq!(s.phase, Phase::Ready);
                assert_eq!(s.notices.len(), 1);
                assert_eq!(s.notices[0].title, "Authentication Error");
                assert_eq!(s.notices[0].description, "offline");
                assert_eq!(s.notices[0].severity, Severity::Error);
            })
            .run();
    }

    #[test]
    fn failed_background_sign_out_is_not_shown() {
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/login"))
            .when_action(GateAction::BackgroundSignOutCompleted {
                result: Err(ProviderError::Network("offline".into())),
            })
            .then_state(|s| assert!(s.notices.is_empty()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn signed_in_replays_intent_once() {
        let first = MockIdentityProvider::session_for("dev@example.com");
        let second = first.clone();
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(GateState::at("/peer-practice"))
            .given_actions([
                GateAction::Initialize,
                lookup(Ok(None)),
                event(AuthEventKind::SignedIn, Some(first)),
                GateAction::Navigate {
                    path: "/community".to_string(),
                },
            ])
            .when_action(event(AuthEventKind::SignedIn, Some(second)))
            .then_state(|s| {
                // login, then /peer-practice, then landing
                assert_eq!(s.redirects, 3);
                assert_eq!(s.location, "/dashboard");
                assert!(s.intent.is_none());
            })
            .run();
    }

    #[test]
    fn token_refreshed_without_session_is_session_loss() {
        let provider = MockIdentityProvider::new();
        let mut state = signed_in_at("/self-practice");

        let effects = reducer().reduce(
            &mut state,
            event(AuthEventKind::TokenRefreshed, None),
            &env(&provider),
        );

        assert!(state.user.is_none());
        assert_eq!(state.location, "/login");
        assert_eq!(state.intent.as_ref().map(|i| i.path.as_str()), Some("/self-practice"));
        assert_eq!(state.notices[0].description, "Please log in again to continue.");
        assert_eq!(
            resolve_effects(effects),
            vec![GateAction::BackgroundSignOutCompleted { result: Ok(()) }]
        );
        assert_eq!(provider.sign_out_calls(), 1);
    }

    #[test]
    fn token_refresh_failure_matches_session_loss_error() {
        let provider = MockIdentityProvider::new();
        let mut refreshed = signed_in_at("/self-practice");
        let mut failed = refreshed.clone();
        let _ = failed.pending_lookup.insert(0);

        let _ = reducer().reduce(
            &mut refreshed,
            event(AuthEventKind::TokenRefreshed, None),
            &env(&provider),
        );
        let _ = reducer().reduce(
            &mut failed,
            lookup(Err(ProviderError::api(400, Some("refresh_token_not_found"), "Session refresh failed"))),
            &env(&provider),
        );

        assert_eq!(refreshed.user, failed.user);
        assert_eq!(refreshed.location, failed.location);
        assert_eq!(refreshed.intent, failed.intent);
        assert_eq!(refreshed.notices, failed.notices);
    }

    #[test]
    fn signed_out_clears_user_and_redirects() {
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in_at("/dashboard"))
            .when_action(event(AuthEventKind::SignedOut, None))
            .then_state(|s| {
                assert!(s.user.is_none());
                assert_eq!(s.location, "/login");
                assert_eq!(s.events_processed, 1);
            })
            .run();
    }

    #[test]
    fn user_updated_replaces_user_silently() {
        let updated = MockIdentityProvider::session_for("renamed@example.com");
        ReducerTest::new(reducer())
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in_at("/settings"))
            .when_action(event(AuthEventKind::UserUpdated, Some(updated)))
            .then_state(|s| {
                assert_eq!(s.user.as_ref().map(|u| u.email.as_str()), Some("renamed@example.com"));
                assert_eq!(s.redirects, 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
