//! Session gate environment.
//!
//! This module defines the environment type for dependency injection
//! in the gate reducer.

use crate::providers::IdentityProvider;
use sakshatkar_core::environment::Clock;

/// Session gate environment.
///
/// # Type Parameters
///
/// - `P`: Identity provider
/// - `C`: Clock
#[derive(Debug, Clone)]
pub struct GateEnvironment<P, C>
where
    P: IdentityProvider + Clone,
    C: Clock,
{
    /// Identity provider.
    pub provider: P,

    /// Clock (timestamps on intents and notices, session validity).
    pub clock: C,
}

impl<P, C> GateEnvironment<P, C>
where
    P: IdentityProvider + Clone,
    C: Clock,
{
    /// Create a new environment.
    #[must_use]
    pub const fn new(provider: P, clock: C) -> Self {
        Self { provider, clock }
    }
}
