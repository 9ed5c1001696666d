//! Identity provider interface.
//!
//! The gate depends on this trait only; the hosted identity service, its
//! SDK and its wire protocol live behind an implementation of it.
//!
//! ```text
//! ┌──────────────────┐  current_session / sign_out  ┌────────────────────┐
//! │ GateReducer      │ ───────── effects ─────────▶ │ IdentityProvider   │
//! └──────────────────┘                              │                    │
//!          ▲                                        │ subscribe()        │
//!          │ GateAction::AuthEvent                  │   AuthSubscription │
//! ┌──────────────────┐ ◀──────── AuthEvent ──────── │                    │
//! │ Event forwarder  │                              └────────────────────┘
//! └──────────────────┘
//! ```
//!
//! This enables:
//! - **Testing**: [`crate::mocks::MockIdentityProvider`], in-memory and scriptable
//! - **Production**: an adapter over the real identity service

use crate::actions::AuthEvent;
use crate::error::ProviderError;
use crate::state::Session;
use std::future::Future;
use tokio::sync::mpsc;

/// Identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Fetch the current session, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the provider fails or reports an invalid session.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, ProviderError>> + Send;

    /// Subscribe to auth-state changes.
    ///
    /// Events are delivered in the order the provider observed them until the
    /// subscription is cancelled or dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot register a listener.
    fn subscribe(&self) -> Result<AuthSubscription, ProviderError>;

    /// Sign the current user out.
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the sign-out.
    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

/// Live subscription to provider auth events.
#[derive(Debug)]
pub struct AuthSubscription {
    events: mpsc::UnboundedReceiver<AuthEvent>,
    handle: SubscriptionHandle,
}

impl AuthSubscription {
    /// Create a subscription from an event channel and an unsubscribe hook.
    ///
    /// `on_cancel` runs exactly once, on the first `cancel()` or on drop.
    pub fn new<F>(events: mpsc::UnboundedReceiver<AuthEvent>, on_cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events,
            handle: SubscriptionHandle {
                on_cancel: Some(Box::new(on_cancel)),
            },
        }
    }

    /// Wait for the next event. Returns `None` once cancelled or closed.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.events.recv().await
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.events.close();
    }

    /// Split into the event stream and the handle that cancels it.
    ///
    /// Lets one task drain events while another owns cancellation.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<AuthEvent>, SubscriptionHandle) {
        (self.events, self.handle)
    }
}

/// Cancels a provider subscription. Cancels on drop.
pub struct SubscriptionHandle {
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Unsubscribe from the provider. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            tracing::debug!("Cancelling identity provider subscription");
            on_cancel();
        }
    }

    /// Whether `cancel()` already ran.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.on_cancel.is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
