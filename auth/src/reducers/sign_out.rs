//! User-initiated sign-out.

use super::{Effects, GateReducer};
use crate::actions::GateAction;
use crate::environment::GateEnvironment;
use crate::error::{FailureClass, FailureKind, ProviderError, classify};
use crate::providers::IdentityProvider;
use crate::state::{GateState, Severity};
use sakshatkar_core::environment::Clock;
use sakshatkar_core::{async_effect, effect::Effect, smallvec};

impl<P, C> GateReducer<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    pub(super) fn logout(state: &mut GateState, env: &GateEnvironment<P, C>) -> Effects {
        let Some(user) = &state.user else {
            tracing::debug!("Logout without a signed-in user, nothing to do");
            return smallvec![Effect::None];
        };
        if state.sign_out_pending {
            tracing::debug!(user_id = %user.id, "Sign-out already in flight, ignoring Logout");
            return smallvec![Effect::None];
        }

        tracing::info!(user_id = %user.id, "Signing out");
        state.sign_out_pending = true;

        let provider = env.provider.clone();
        smallvec![async_effect! {
            let result = provider.sign_out().await;
            Some(GateAction::SignOutCompleted { result })
        }]
    }

    pub(super) fn sign_out_completed(
        &self,
        state: &mut GateState,
        result: Result<(), ProviderError>,
        env: &GateEnvironment<P, C>,
    ) -> Effects {
        state.sign_out_pending = false;
        let login = self.config().login_path.clone();

        match result {
            Ok(()) => {
                tracing::info!("Sign-out completed");
                state.user = None;
                state.intent = None;
                Self::redirect(state, &login);
                smallvec![Effect::None]
            },
            Err(error) if classify(&error) == FailureClass::SessionLoss => {
                tracing::warn!(
                    kind = %FailureKind::UserInitiatedSignoutFailure,
                    %error,
                    "Remote session already gone, clearing local state"
                );
                state.user = None;
                state.intent = None;
                Self::redirect(state, &login);
                smallvec![Effect::None]
            },
            Err(error) => {
                tracing::warn!(kind = %FailureKind::UserInitiatedSignoutFailure, %error, "Sign-out failed");
                self.raise(
                    state,
                    "Error",
                    "Failed to log out. Please try again.",
                    Severity::Error,
                    &env.clock,
                )
            },
        }
    }

    /// Best-effort sign-out after a session loss. The user is already on the
    /// login page, so a failure here is never shown.
    pub(super) fn background_sign_out_completed(
        &self,
        state: &mut GateState,
        result: &Result<(), ProviderError>,
        env: &GateEnvironment<P, C>,
    ) -> Effects {
        match result {
            Ok(()) => {
                tracing::debug!("Provider sign-out after session loss completed");
                smallvec![Effect::None]
            },
            Err(error) => {
                tracing::warn!(%error, "Provider sign-out after session loss failed");
                self.raise(
                    state,
                    "Sign-out Error",
                    error.message(),
                    Severity::Background,
                    &env.clock,
                )
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::mocks::MockIdentityProvider;
    use crate::state::Phase;
    use sakshatkar_core::reducer::Reducer as _;
    use sakshatkar_testing::{FixedClock, ReducerTest, assertions, resolve_effects, test_clock};
    use std::time::Duration;

    fn reducer(config: GateConfig) -> GateReducer<MockIdentityProvider, FixedClock> {
        GateReducer::new(config)
    }

    fn env(provider: &MockIdentityProvider) -> GateEnvironment<MockIdentityProvider, FixedClock> {
        GateEnvironment::new(provider.clone(), test_clock())
    }

    fn signed_in() -> GateState {
        let mut state = GateState::at("/dashboard");
        state.phase = Phase::Ready;
        state.user = Some(MockIdentityProvider::session_for("dev@example.com").user);
        state
    }

    #[test]
    fn logout_without_user_is_noop() {
        let provider = MockIdentityProvider::new();
        let mut state = GateState::at("/login");
        state.phase = Phase::Ready;
        let before = state.clone();

        let effects = reducer(GateConfig::default()).reduce(&mut state, GateAction::Logout, &env(&provider));

        assertions::assert_no_effects(effects.as_slice());
        assert_eq!(state, before);
        assert!(resolve_effects(effects).is_empty());
        assert_eq!(provider.sign_out_calls(), 0);
    }

    #[test]
    fn logout_calls_provider_once() {
        let provider = MockIdentityProvider::new();
        ReducerTest::new(reducer(GateConfig::default()))
            .with_env(env(&provider))
            .given_state(signed_in())
            .given_actions([GateAction::Logout])
            .when_action(GateAction::Logout)
            .then_state(|s| assert!(s.sign_out_pending))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn successful_sign_out_clears_user_and_redirects() {
        ReducerTest::new(reducer(GateConfig::default()))
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in())
            .given_actions([GateAction::Logout])
            .when_action(GateAction::SignOutCompleted { result: Ok(()) })
            .then_state(|s| {
                assert!(s.user.is_none());
                assert!(!s.sign_out_pending);
                assert_eq!(s.location, "/login");
                assert_eq!(s.redirects, 1);
            })
            .run();
    }

    #[test]
    fn failed_sign_out_keeps_user_and_raises_notice() {
        ReducerTest::new(reducer(GateConfig::default()))
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in())
            .given_actions([GateAction::Logout])
            .when_action(GateAction::SignOutCompleted {
                result: Err(ProviderError::api(500, None, "Internal error")),
            })
            .then_state(|s| {
                assert!(s.user.is_some());
                assert!(!s.sign_out_pending);
                assert_eq!(s.location, "/dashboard");
                assert_eq!(s.notices[0].title, "Error");
                assert_eq!(s.notices[0].description, "Failed to log out. Please try again.");
            })
            .run();
    }

    #[test]
    fn sign_out_failing_with_session_loss_still_clears_user() {
        ReducerTest::new(reducer(GateConfig::default()))
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in())
            .given_actions([GateAction::Logout])
            .when_action(GateAction::SignOutCompleted {
                result: Err(ProviderError::api(404, Some("session_not_found"), "Session not found")),
            })
            .then_state(|s| {
                assert!(s.user.is_none());
                assert_eq!(s.location, "/login");
                assert!(s.notices.is_empty());
            })
            .run();
    }

    #[test]
    fn notice_ttl_schedules_dismissal() {
        let ttl = Duration::from_secs(5);
        ReducerTest::new(reducer(GateConfig::default().with_notice_ttl(ttl)))
            .with_env(env(&MockIdentityProvider::new()))
            .given_state(signed_in())
            .given_actions([GateAction::Logout])
            .when_action(GateAction::SignOutCompleted {
                result: Err(ProviderError::api(500, None, "Internal error")),
            })
            .then_effects(move |effects| assertions::assert_has_delay_effect(effects, ttl))
            .run();
    }
}
