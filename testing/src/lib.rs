//! # Sakshatkar Testing
//!
//! Testing utilities for Sakshatkar reducers and stores.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect assertions and a helper that resolves effects into the actions
//!   they would feed back to a store
//!
//! ## Example
//!
//! ```ignore
//! use sakshatkar_testing::{ReducerTest, assertions};
//!
//! ReducerTest::new(GateReducer::new(config))
//!     .with_env(test_environment())
//!     .given_state(GateState::default())
//!     .when_action(GateAction::Initialize)
//!     .then_state(|s| assert!(s.is_loading()))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use sakshatkar_core::environment::Clock;


/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use sakshatkar_testing::mocks::FixedClock;
    /// use sakshatkar_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test advances it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// the other to an environment.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::{ReducerTest, assertions, resolve_effects};
