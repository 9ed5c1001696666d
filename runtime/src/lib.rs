//! # Sakshatkar Runtime
//!
//! Runtime implementation for the Sakshatkar session gate.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Single-writer state container driven by one ordered action queue
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to the queue
//! - **Publish point**: Every processed action publishes a state snapshot on a `watch` channel
//!
//! ## Ordering
//!
//! Callers, effects, and external event forwarders all push onto the same
//! queue. One loop task pops actions and runs the reducer to completion
//! before looking at the next one, so state transitions follow queue arrival
//! order exactly.
//!
//! ## Example
//!
//! ```ignore
//! use sakshatkar_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action and wait until the reducer has applied it
//! store.send(Action::DoSomething).await?;
//!
//! // Read the latest published state
//! let value = store.state(|s| s.some_field);
//! ```

use sakshatkar_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Retry logic with exponential backoff
pub mod retry;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned by `send()`/`dispatch()` after `shutdown()`, and by
        /// `send()` when its action was still queued when shutdown began.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// The action loop is gone
        ///
        /// The loop task ended (all handles dropped or the runtime stopped).
        #[error("Store action channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Internal: bookkeeping shared by every handle, the loop, and effect tasks
///
/// `pending` counts queued actions plus running effects. When it drops to
/// zero the store is quiescent and `idle` waiters are woken.
#[derive(Debug, Default)]
struct Tracker {
    pending: AtomicUsize,
    shutdown: AtomicBool,
    idle: Notify,
}

impl Tracker {
    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Internal: RAII guard that finishes one unit of pending work on drop
///
/// Ensures the pending counter is always decremented, even if the effect panics.
struct PendingGuard(Arc<Tracker>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Store module - The runtime for reducers
///
/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{Arc, Effect, Ordering, PendingGuard, Reducer, StoreError, Tracker};
    use std::future::Future;
    use std::marker::PhantomData;
    use std::pin::Pin;
    use tokio::sync::{mpsc, oneshot, watch};

    /// Internal: one queued action plus an optional "processed" acknowledgement
    struct Envelope<A> {
        action: A,
        ack: Option<oneshot::Sender<()>>,
    }

    /// Internal: strong handle to the action queue
    ///
    /// Held by `Store` handles and by running effect tasks. The loop itself
    /// only keeps a weak sender, so the loop ends once every handle and every
    /// effect task is gone.
    struct Queue<A> {
        tx: mpsc::UnboundedSender<Envelope<A>>,
        tracker: Arc<Tracker>,
    }

    impl<A> Clone for Queue<A> {
        fn clone(&self) -> Self {
            Self {
                tx: self.tx.clone(),
                tracker: Arc::clone(&self.tracker),
            }
        }
    }

    impl<A> Queue<A> {
        fn enqueue(&self, action: A, ack: Option<oneshot::Sender<()>>) -> Result<(), StoreError> {
            if self.tracker.is_shut_down() {
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            self.tracker.begin();
            if self.tx.send(Envelope { action, ack }).is_err() {
                self.tracker.finish();
                return Err(StoreError::ChannelClosed);
            }
            Ok(())
        }

        /// Feed an action produced by an effect back into the queue
        fn feedback(&self, action: A) {
            match self.enqueue(action, None) {
                Ok(()) => {
                    tracing::trace!("Effect produced an action, queued for the reducer");
                },
                Err(error) => {
                    tracing::debug!(%error, "Dropping action produced by effect");
                },
            }
        }
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (owned exclusively by the loop task, published as snapshots)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop through the same queue)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(GateState::default(), GateReducer::new(config), env);
    /// store.send(GateAction::Initialize).await?;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        queue: Queue<A>,
        snapshot: watch::Receiver<S>,
        _reducer: PhantomData<fn() -> (E, R)>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + 'static,
        A: Send + 'static,
        S: Clone + Send + Sync + 'static,
        E: Send + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Spawns the action loop on the current Tokio runtime.
        ///
        /// # Panics
        ///
        /// Panics if called outside of a Tokio runtime (from `tokio::spawn`).
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let (publish, snapshot) = watch::channel(initial_state.clone());
            let tracker = Arc::new(Tracker::default());

            let weak = tx.downgrade();
            tokio::spawn(run_loop(
                initial_state,
                reducer,
                environment,
                rx,
                weak,
                publish,
                Arc::clone(&tracker),
            ));

            Self {
                queue: Queue { tx, tracker },
                snapshot,
                _reducer: PhantomData,
            }
        }

        /// Send an action to the store and wait until the reducer applied it
        ///
        /// Returns once the action has been reduced and its snapshot published.
        /// Effects returned by the reducer may still be running.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down,
        ///   including when shutdown began while this action was still queued
        /// - [`StoreError::ChannelClosed`] if the loop task is gone
        #[tracing::instrument(skip_all, name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            let (ack, processed) = oneshot::channel();
            self.queue.enqueue(action, Some(ack))?;

            processed.await.map_err(|_| {
                if self.queue.tracker.is_shut_down() {
                    StoreError::ShutdownInProgress
                } else {
                    StoreError::ChannelClosed
                }
            })
        }

        /// Enqueue an action without waiting for it to be processed
        ///
        /// # Errors
        ///
        /// Same as [`Store::send`], minus the "shut down while queued" case.
        pub fn dispatch(&self, action: A) -> Result<(), StoreError> {
            self.queue.enqueue(action, None)
        }

        /// Read the latest published state via a closure
        ///
        /// ```ignore
        /// let signed_in = store.state(|s| s.user.is_some());
        /// ```
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&self.snapshot.borrow())
        }

        /// Subscribe to published state snapshots
        ///
        /// The receiver always holds the most recent snapshot.
        #[must_use]
        pub fn subscribe(&self) -> watch::Receiver<S> {
            self.snapshot.clone()
        }

        /// Wait until no action is queued and no effect is running
        pub async fn settled(&self) {
            let tracker = &self.queue.tracker;
            loop {
                let notified = tracker.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if tracker.pending.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        }

        /// Stop accepting actions
        ///
        /// Actions still in the queue, and actions produced later by running
        /// effects, are dropped without reaching the reducer. Idempotent.
        pub fn shutdown(&self) {
            if !self.queue.tracker.shutdown.swap(true, Ordering::AcqRel) {
                tracing::info!("Store shutting down");
                metrics::counter!("store.shutdown.initiated").increment(1);
            }
        }

        /// Whether [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shut_down(&self) -> bool {
            self.queue.tracker.is_shut_down()
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                queue: self.queue.clone(),
                snapshot: self.snapshot.clone(),
                _reducer: PhantomData,
            }
        }
    }

    impl<S, A, E, R> std::fmt::Debug for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("pending", &self.queue.tracker.pending.load(Ordering::SeqCst))
                .field("shut_down", &self.queue.tracker.is_shut_down())
                .finish_non_exhaustive()
        }
    }

    /// The single consumer of the action queue
    async fn run_loop<S, A, E, R>(
        mut state: S,
        reducer: R,
        environment: E,
        mut rx: mpsc::UnboundedReceiver<Envelope<A>>,
        weak: mpsc::WeakUnboundedSender<Envelope<A>>,
        publish: watch::Sender<S>,
        tracker: Arc<Tracker>,
    ) where
        R: Reducer<State = S, Action = A, Environment = E>,
        A: Send + 'static,
        S: Clone,
    {
        while let Some(Envelope { action, ack }) = rx.recv().await {
            let _done = PendingGuard(Arc::clone(&tracker));

            if tracker.is_shut_down() {
                tracing::debug!("Dropping queued action: store is shut down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                continue;
            }

            metrics::counter!("store.actions.total").increment(1);

            let effects = {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = reducer.reduce(&mut state, action, &environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            publish.send_replace(state.clone());

            if let Some(queue) = weak.upgrade() {
                let queue = Queue {
                    tx: queue,
                    tracker: Arc::clone(&tracker),
                };
                for effect in effects {
                    execute(effect, &queue);
                }
            } else {
                tracing::debug!("All store handles dropped, skipping effects");
            }

            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }

        tracing::debug!("Store action loop finished");
    }

    /// Start an effect without blocking the loop
    fn execute<A>(effect: Effect<A>, queue: &Queue<A>)
    where
        A: Send + 'static,
    {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
            },
            Effect::Parallel(effects) => {
                tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                for effect in effects {
                    execute(effect, queue);
                }
            },
            effect => {
                metrics::counter!("store.effects.executed").increment(1);
                queue.tracker.begin();
                let guard = PendingGuard(Arc::clone(&queue.tracker));
                let queue = queue.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let task = tokio::spawn(async move {
                        run_inline(effect, &queue).await;
                    });
                    if let Err(error) = task.await {
                        if error.is_panic() {
                            metrics::counter!("store.effects.panicked").increment(1);
                            tracing::error!(%error, "Effect task panicked, its action is lost");
                        } else {
                            tracing::debug!(%error, "Effect task cancelled");
                        }
                    }
                });
            },
        }
    }

    /// Run an effect to completion inside the current task
    fn run_inline<'a, A>(
        effect: Effect<A>,
        queue: &'a Queue<A>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>
    where
        A: Send + 'static,
    {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => {
                    if let Some(action) = fut.await {
                        queue.feedback(action);
                    }
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                    tokio::time::sleep(duration).await;
                    queue.feedback(*action);
                },
                Effect::Parallel(effects) => {
                    for effect in effects {
                        execute(effect, queue);
                    }
                },
                Effect::Sequential(effects) => {
                    tracing::trace!("Executing Effect::Sequential with {} effects", effects.len());
                    for effect in effects {
                        run_inline(effect, queue).await;
                    }
                },
            }
        })
    }
}

// Re-export for convenience
pub use store::Store;
