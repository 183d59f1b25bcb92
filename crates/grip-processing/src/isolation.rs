//! Failure isolation for user supplied callbacks
//!
//! Callbacks run on pipeline threads (detection or dispatch). An error or a
//! panic inside one is converted into [`GripError::CallbackError`] here so the
//! owning loop can log it and carry on.

use grip_core::{GripError, GripResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a callback, turning both returned errors and panics into `CallbackError`
pub fn call_isolated<T>(
    label: &str,
    callback: impl FnOnce() -> anyhow::Result<T>,
) -> GripResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GripError::CallbackError {
            message: format!("{} failed: {:#}", label, e),
        }),
        Err(payload) => Err(GripError::CallbackError {
            message: format!("{} panicked: {}", label, panic_message(payload.as_ref())),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
