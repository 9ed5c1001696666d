//! Mock provider implementations for testing.
//!
//! In-memory, scriptable stand-ins for the identity provider, for use in
//! unit and integration tests.

pub mod identity;

pub use identity::{LookupLatch, MockIdentityProvider};
