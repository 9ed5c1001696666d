//! The session gate: store, provider subscription and guard wired together.
//!
//! ```text
//!               ┌──────────── SessionGate ─────────────┐
//!  start() ───▶ │ subscribe ─▶ forwarder task ──┐      │
//!  enter() ───▶ │ RouteGuard ─▶ AccessDenied ───┤      │
//!  logout() ──▶ │                               ▼      │
//!               │                Store<GateState, GateAction>
//!  view() ◀──── │ published snapshots ◀─────────┘      │
//!               └──────────────────────────────────────┘
//! ```

use crate::actions::GateAction;
use crate::config::GateConfig;
use crate::environment::GateEnvironment;
use crate::error::{GateError, Result};
use crate::guard::{GuardDecision, RouteGuard};
use crate::providers::{IdentityProvider, SubscriptionHandle};
use crate::reducers::GateReducer;
use crate::state::{GateState, NoticeId};
use sakshatkar_core::environment::Clock;
use sakshatkar_runtime::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Store type driving the gate.
pub type GateStore<P, C> = Store<GateState, GateAction, GateEnvironment<P, C>, GateReducer<P, C>>;

/// Session gate.
///
/// Create one per app instance, call [`SessionGate::start`] once, and read
/// state through [`SessionGate::view`] or [`SessionGate::subscribe`].
/// [`SessionGate::dispose`] (or dropping the gate) stops everything; no
/// state changes after that, whatever the provider still delivers.
pub struct SessionGate<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    store: GateStore<P, C>,
    provider: P,
    guard: RouteGuard,
    started: AtomicBool,
    listener: Mutex<Listener>,
}

/// Provider subscription and the task draining it.
#[derive(Default)]
struct Listener {
    handle: Option<SubscriptionHandle>,
    forwarder: Option<JoinHandle<()>>,
}

impl Listener {
    fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.cancel();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl<P, C> SessionGate<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    /// Create a gate for an app opened at `location`.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(config: GateConfig, provider: P, clock: C, location: impl Into<String>) -> Self {
        let guard = RouteGuard::new(config.clone());
        let store = Store::new(
            GateState::at(location),
            GateReducer::new(config),
            GateEnvironment::new(provider.clone(), clock),
        );

        Self {
            store,
            provider,
            guard,
            started: AtomicBool::new(false),
            listener: Mutex::new(Listener::default()),
        }
    }

    /// Subscribe to provider events and look up the current session.
    ///
    /// Returns once the lookup has been issued; the gate leaves the loading
    /// phase when its result is processed.
    ///
    /// # Errors
    ///
    /// - [`GateError::AlreadyStarted`] on a second call
    /// - [`GateError::Disposed`] after [`SessionGate::dispose`]
    /// - [`GateError::Provider`] if the provider refuses the subscription
    pub async fn start(&self) -> Result<()> {
        if self.store.is_shut_down() {
            return Err(GateError::Disposed);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session gate already started");
            return Err(GateError::AlreadyStarted);
        }

        let subscription = self.provider.subscribe().inspect_err(|error| {
            tracing::error!(%error, "Identity provider refused the auth subscription");
            self.started.store(false, Ordering::Release);
        })?;
        let (mut events, handle) = subscription.into_parts();
        let store = self.store.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracing::trace!(kind = ?event.kind, "Forwarding auth event");
                if let Err(error) = store.dispatch(GateAction::AuthEvent(event)) {
                    tracing::debug!(%error, "Store closed, stopping auth event forwarder");
                    break;
                }
            }
        });

        {
            let mut listener = self.lock_listener();
            listener.handle = Some(handle);
            listener.forwarder = Some(forwarder);
        }
        tracing::info!("Session gate started");

        self.store.send(GateAction::Initialize).await?;
        Ok(())
    }

    /// Guard a navigation to `path`.
    ///
    /// On `Redirect` the gate has already moved `location`; on `Render` and
    /// `Pending` it records `path` as the current location.
    ///
    /// A denial is checked again when the store processes it, so a sign-in
    /// that landed in between turns it into `Render`. The returned decision
    /// is the one the store applied.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Store`] if the gate has been disposed.
    pub async fn enter(&self, path: &str) -> Result<GuardDecision> {
        let first = self.store.state(|state| self.guard.decide(state, path));
        tracing::debug!(path, decision = ?first, "Route guard decision");

        let action = match &first {
            GuardDecision::Redirect { .. } => GateAction::AccessDenied {
                path: path.to_string(),
            },
            GuardDecision::Render | GuardDecision::Pending => GateAction::Navigate {
                path: path.to_string(),
            },
        };
        self.store.send(action).await?;

        let applied = self
            .store
            .state(|state| applied_decision(&self.guard, state, path, first));
        Ok(applied)
    }

    /// Record router-driven navigation.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Store`] if the gate has been disposed.
    pub async fn navigate(&self, path: impl Into<String>) -> Result<()> {
        self.store
            .send(GateAction::Navigate { path: path.into() })
            .await?;
        Ok(())
    }

    /// Sign the current user out. A no-op when nobody is signed in.
    ///
    /// Returns once the request is queued; the outcome shows up in state.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Store`] if the gate has been disposed.
    pub async fn logout(&self) -> Result<()> {
        self.store.send(GateAction::Logout).await?;
        Ok(())
    }

    /// Remove a notice.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Store`] if the gate has been disposed.
    pub async fn dismiss_notice(&self, id: NoticeId) -> Result<()> {
        self.store.send(GateAction::DismissNotice { id }).await?;
        Ok(())
    }

    /// Latest published state.
    #[must_use]
    pub fn view(&self) -> GateState {
        self.store.state(Clone::clone)
    }

    /// Read part of the latest published state.
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&GateState) -> T,
    {
        self.store.state(f)
    }

    /// Receive every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.store.subscribe()
    }

    /// Wait until no action is queued and no provider call is running.
    pub async fn settled(&self) {
        self.store.settled().await;
    }

    /// Stop listening to the provider and freeze state. Idempotent.
    pub fn dispose(&self) {
        self.lock_listener().stop();
        if !self.store.is_shut_down() {
            tracing::info!("Disposing session gate");
            self.store.shutdown();
        }
    }

    /// Whether [`SessionGate::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.store.is_shut_down()
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Listener> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decision as applied by the store.
///
/// `Navigate` is recorded as-is, so `Render` and `Pending` stand. A denial
/// is re-checked by the reducer against `state`; rerun the same check here.
fn applied_decision(
    guard: &RouteGuard,
    state: &GateState,
    path: &str,
    first: GuardDecision,
) -> GuardDecision {
    match first {
        GuardDecision::Redirect { .. } => guard.decide(state, path),
        decision @ (GuardDecision::Render | GuardDecision::Pending) => decision,
    }
}

impl<P, C> Drop for SessionGate<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    fn drop(&mut self) {
        self.listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        self.store.shutdown();
    }
}

impl<P, C> std::fmt::Debug for SessionGate<P, C>
where
    P: IdentityProvider + Clone + 'static,
    C: Clock + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate")
            .field("started", &self.started.load(Ordering::Acquire))
            .field("disposed", &self.is_disposed())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
