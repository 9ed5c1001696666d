//! Mock identity provider.

use crate::actions::{AuthEvent, AuthEventKind};
use crate::error::ProviderError;
use crate::providers::{AuthSubscription, IdentityProvider};
use crate::state::{Session, User, UserId};
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};

#[derive(Debug)]
struct Inner {
    session: Option<Session>,
    lookups: VecDeque<Result<Option<Session>, ProviderError>>,
    sign_outs: VecDeque<Result<(), ProviderError>>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<AuthEvent>)>,
    next_subscriber: u64,
    latch: Option<watch::Receiver<bool>>,
    subscribe_error: Option<ProviderError>,
    emit_on_sign_out: bool,
    lookup_calls: usize,
    sign_out_calls: usize,
    subscribe_calls: usize,
}

/// Mock identity provider.
///
/// - Session lookups return scripted results in order, then the current session
/// - Sign-outs return scripted results in order, then `Ok(())`
/// - A successful sign-out clears the session and, like the real service,
///   emits a signed-out event to every subscriber
///
/// Clones share state, so a test can keep one handle while the gate owns
/// another.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MockIdentityProvider {
    /// Create a provider with no session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: None,
                lookups: VecDeque::new(),
                sign_outs: VecDeque::new(),
                subscribers: Vec::new(),
                next_subscriber: 0,
                latch: None,
                subscribe_error: None,
                emit_on_sign_out: true,
                lookup_calls: 0,
                sign_out_calls: 0,
                subscribe_calls: 0,
            })),
        }
    }

    /// A session for `email`, valid for an hour from now.
    #[must_use]
    pub fn session_for(email: &str) -> Session {
        Session::new(User::new(UserId::new(), email), Utc::now() + Duration::hours(1))
    }

    /// Start with an active session.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        self.lock().session = Some(session);
        self
    }

    /// Queue the result of the next unscripted session lookup.
    #[must_use]
    pub fn script_lookup(self, result: Result<Option<Session>, ProviderError>) -> Self {
        self.lock().lookups.push_back(result);
        self
    }

    /// Queue the result of the next sign-out.
    #[must_use]
    pub fn script_sign_out(self, result: Result<(), ProviderError>) -> Self {
        self.lock().sign_outs.push_back(result);
        self
    }

    /// Make `subscribe()` fail.
    #[must_use]
    pub fn failing_subscribe(self, error: ProviderError) -> Self {
        self.lock().subscribe_error = Some(error);
        self
    }

    /// Do not emit a signed-out event when a sign-out succeeds.
    #[must_use]
    pub fn without_sign_out_event(self) -> Self {
        self.lock().emit_on_sign_out = false;
        self
    }

    /// Hold every session lookup until the returned latch is released.
    #[must_use]
    pub fn hold_lookups(&self) -> LookupLatch {
        let (open, gate) = watch::channel(false);
        self.lock().latch = Some(gate);
        LookupLatch { open }
    }

    /// Push an auth event to every active subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) -> usize {
        let mut inner = self.lock();
        if matches!(kind, AuthEventKind::SignedOut) {
            inner.session = None;
        } else if session.is_some() {
            inner.session.clone_from(&session);
        }
        broadcast(&mut inner, &AuthEvent::new(kind, session))
    }

    /// Number of subscriptions not yet cancelled.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Number of `current_session()` calls.
    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.lock().lookup_calls
    }

    /// Number of `sign_out()` calls.
    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.lock().sign_out_calls
    }

    /// Number of `subscribe()` calls.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn broadcast(inner: &mut Inner, event: &AuthEvent) -> usize {
    inner
        .subscribers
        .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    inner.subscribers.len()
}

impl IdentityProvider for MockIdentityProvider {
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, ProviderError>> + Send {
        let (result, latch) = {
            let mut inner = self.lock();
            inner.lookup_calls += 1;
            let result = inner
                .lookups
                .pop_front()
                .unwrap_or_else(|| Ok(inner.session.clone()));
            (result, inner.latch.clone())
        };

        async move {
            if let Some(mut latch) = latch {
                let _ = latch.wait_for(|open| *open).await;
            }
            result
        }
    }

    fn subscribe(&self) -> Result<AuthSubscription, ProviderError> {
        let mut inner = self.lock();
        inner.subscribe_calls += 1;
        if let Some(error) = inner.subscribe_error.clone() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, tx));

        let registry: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(AuthSubscription::new(rx, move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(sid, _)| *sid != id);
            }
        }))
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.sign_out_calls += 1;
            let result = inner.sign_outs.pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                inner.session = None;
                if inner.emit_on_sign_out {
                    broadcast(&mut inner, &AuthEvent::new(AuthEventKind::SignedOut, None));
                }
            }
            result
        };

        async move { result }
    }
}

/// Releases lookups held by [`MockIdentityProvider::hold_lookups`].
///
/// Dropping the latch also releases them.
#[derive(Debug)]
pub struct LookupLatch {
    open: watch::Sender<bool>,
}

impl LookupLatch {
    /// Let held lookups complete.
    pub fn release(self) {
        self.open.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_lookups_then_current_session() {
        let session = MockIdentityProvider::session_for("a@example.com");
        let provider = MockIdentityProvider::new()
            .with_session(session.clone())
            .script_lookup(Err(ProviderError::Network("reset".into())));

        assert!(provider.current_session().await.is_err());
        assert_eq!(provider.current_session().await, Ok(Some(session)));
        assert_eq!(provider.lookup_calls(), 2);
    }

    #[tokio::test]
    async fn sign_out_emits_signed_out_to_subscribers() -> Result<(), ProviderError> {
        let provider =
            MockIdentityProvider::new().with_session(MockIdentityProvider::session_for("a@example.com"));
        let mut subscription = provider.subscribe()?;

        provider.sign_out().await?;

        let event = subscription.next().await;
        assert_eq!(event.map(|e| e.kind), Some(AuthEventKind::SignedOut));
        assert_eq!(provider.current_session().await, Ok(None));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_subscriptions_stop_counting() -> Result<(), ProviderError> {
        let provider = MockIdentityProvider::new();
        let mut first = provider.subscribe()?;
        let _second = provider.subscribe()?;
        assert_eq!(provider.active_subscriptions(), 2);

        first.cancel();
        assert_eq!(provider.active_subscriptions(), 1);
        assert_eq!(provider.emit(AuthEventKind::SignedOut, None), 1);
        Ok(())
    }

    #[tokio::test]
    async fn latch_holds_lookup_until_released() {
        let provider = MockIdentityProvider::new();
        let latch = provider.hold_lookups();

        let lookup = tokio::spawn({
            let provider = provider.clone();
            async move { provider.current_session().await }
        });
        tokio::task::yield_now().await;
        assert!(!lookup.is_finished());

        latch.release();
        assert!(matches!(lookup.await, Ok(Ok(None))));
    }
}
