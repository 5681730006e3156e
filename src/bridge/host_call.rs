//! HostCallBridge: script promise → host awaitable
//!
//! The inverse direction of the bridge: host code invokes a
//! script-defined (promise-returning) function or method and awaits the
//! settlement as an ordinary host value. Rejection payloads are
//! normalized into a name/message pair; a synchronous throw or a
//! non-promise return value is surfaced as an immediate failure without
//! going through the async path.

use tokio::sync::oneshot;

use crate::engine::promise::Settlement;
use crate::engine::value::{CallOutcome, ScriptValue};
use crate::engine::{EngineState, ScriptRuntime};
use crate::error::{CoreError, Result, ScriptError};

/// Normalize a rejection payload into a host error representation: an
/// error-like object contributes its `message` field (and `name` when
/// present); anything else contributes its string representation.
pub fn normalize_rejection(reason: &ScriptValue) -> ScriptError {
    match reason {
        ScriptValue::Object(map) => {
            let name = map
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("Error")
                .to_string();
            let message = map
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| reason.to_display_string());
            ScriptError { name, message }
        }
        other => ScriptError::new("Error", other.to_display_string()),
    }
}

fn resume_host(
    state: &mut EngineState,
    outcome: std::result::Result<CallOutcome, ScriptError>,
    tx: oneshot::Sender<Result<ScriptValue>>,
) {
    match outcome {
        Err(err) => {
            // Synchronous throw: immediate failure, never awaited.
            let _ = tx.send(Err(CoreError::Bridge(err.to_string())));
        }
        Ok(CallOutcome::Value(value)) => {
            let _ = tx.send(Err(CoreError::Bridge(format!(
                "expected a promise, got {}",
                value.to_display_string()
            ))));
        }
        Ok(CallOutcome::Promise(promise)) => {
            state.on_settle(promise, move |_state, settlement| {
                let result = match settlement {
                    Settlement::Fulfilled(value) => Ok(value.clone()),
                    Settlement::Rejected(reason) => {
                        Err(CoreError::Rejected(normalize_rejection(reason)))
                    }
                };
                let _ = tx.send(result);
            });
        }
    }
}

impl ScriptRuntime {
    /// Invoke a script-defined async function by name and await its
    /// result. Exactly one resumption (success or failure) per call.
    pub async fn call_async(&self, name: &str, args: Vec<ScriptValue>) -> Result<ScriptValue> {
        let (tx, rx) = oneshot::channel();
        let name = name.to_string();
        self.submit(move |state| {
            let outcome = state.call_global(&name, args);
            resume_host(state, outcome, tx);
        });
        rx.await.map_err(|_| CoreError::EngineGone)?
    }

    /// Invoke a method on a script-defined object by name and await its
    /// result.
    pub async fn invoke_async(
        &self,
        object: &str,
        method: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue> {
        let (tx, rx) = oneshot::channel();
        let object = object.to_string();
        let method = method.to_string();
        self.submit(move |state| {
            let outcome = state.call_method(&object, &method, args);
            resume_host(state, outcome, tx);
        });
        rx.await.map_err(|_| CoreError::EngineGone)?
    }
}
