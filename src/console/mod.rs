//! Script-visible console
//!
//! `console.log/info/warn/error` routed into the host's structured
//! logging under the `script` target.

use crate::engine::value::{CallOutcome, ScriptValue};
use crate::engine::EngineState;
use crate::error::ScriptError;

fn render(args: &[ScriptValue]) -> String {
    args.iter()
        .map(|v| v.to_display_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn ok() -> Result<CallOutcome, ScriptError> {
    Ok(CallOutcome::Value(ScriptValue::Undefined))
}

pub(crate) fn install_console(state: &mut EngineState) {
    state.register_method_fn("console", "log", |_state, args| {
        tracing::info!(target: "script", "{}", render(&args));
        ok()
    });
    state.register_method_fn("console", "info", |_state, args| {
        tracing::info!(target: "script", "{}", render(&args));
        ok()
    });
    state.register_method_fn("console", "warn", |_state, args| {
        tracing::warn!(target: "script", "{}", render(&args));
        ok()
    });
    state.register_method_fn("console", "error", |_state, args| {
        tracing::error!(target: "script", "{}", render(&args));
        ok()
    });
}
