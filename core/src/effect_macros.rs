//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when reducers hand provider calls and
//! delayed follow-ups to the runtime.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use sakshatkar_core::async_effect;
///
/// async_effect! {
///     let result = provider.sign_out().await;
///     Some(GateAction::SignOutCompleted { result })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use sakshatkar_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(5),
///     action: GateAction::DismissNotice { id }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
