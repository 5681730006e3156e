//! Script-visible fetch surface
//!
//! `fetch(url, options?)` returns a promise for a response object
//! exposing `status`, `ok` and lazy promise-returning `text()` / `json()`
//! accessors. The network work runs on the host pool through the
//! [`HttpTransport`] collaborator and settles back through the bridge.
//! Transport failures reject with kind `FetchError`; observed
//! cancellation rejects with kind `AbortError`.

mod transport;

pub use transport::{
    FetchRequest, FetchResponsePayload, HttpMethod, HttpTransport, MockTransport, TransportError,
};

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::engine::value::{CallOutcome, ScriptValue};
use crate::engine::EngineState;
use crate::error::ScriptError;

/// The decoded shape of the `options` argument.
#[derive(Debug, Default, Deserialize)]
struct RequestInit {
    #[serde(default)]
    method: HttpMethod,
    #[serde(default)]
    headers: FxHashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    /// Signal handle from [`install_signal`](crate::ScriptRuntime::install_signal)
    #[serde(default)]
    signal: Option<u64>,
}

/// Register the `fetch` global against the given transport.
pub(crate) fn install_fetch(state: &mut EngineState, transport: Arc<dyn HttpTransport>) {
    state.register_global_fn("fetch", move |state, args| {
        fetch_global(state, &transport, args)
    });
}

fn fetch_global(
    state: &mut EngineState,
    transport: &Arc<dyn HttpTransport>,
    args: Vec<ScriptValue>,
) -> Result<CallOutcome, ScriptError> {
    let url = match args.first() {
        Some(ScriptValue::String(url)) => url.clone(),
        _ => return Err(ScriptError::type_error("fetch requires a url string")),
    };

    let init = match args.get(1) {
        None | Some(ScriptValue::Undefined) | Some(ScriptValue::Null) => RequestInit::default(),
        Some(options) => {
            let doc = options
                .to_json()
                .ok_or_else(|| ScriptError::type_error("fetch options are not serializable"))?;
            serde_json::from_value(doc)
                .map_err(|err| ScriptError::type_error(format!("invalid fetch options: {err}")))?
        }
    };

    let token = match init.signal {
        Some(signal) => Some(state.signal_token(signal).ok_or_else(|| {
            ScriptError::type_error(format!("unknown signal handle {signal}"))
        })?),
        None => None,
    };

    let request = FetchRequest {
        url,
        method: init.method,
        headers: init.headers,
        body: init.body,
    };
    tracing::debug!(url = %request.url, method = ?request.method, "fetch started");

    let transfer = transport.fetch(request, token.clone());
    let fut = async move {
        match transfer.await {
            Ok(payload) => Ok(payload),
            Err(TransportError::Aborted) => Err(ScriptError::aborted()),
            Err(err) => Err(ScriptError::fetch(err.to_string())),
        }
    };

    let promise = state.bridge_future_with(token, fut, response_value);
    Ok(CallOutcome::Promise(promise))
}

/// Build the response object on the engine thread. The body accessors
/// are function handles over the shared payload; each call hands back a
/// fresh promise so consumption stays asynchronous.
fn response_value(state: &mut EngineState, payload: FetchResponsePayload) -> ScriptValue {
    let status = payload.status;
    let ok = payload.ok();
    let body = Arc::new(payload.body);

    let text_body = Arc::clone(&body);
    let text_fn = state.define_function(move |state, _args| {
        let promise = state.create_promise();
        match std::str::from_utf8(&text_body) {
            Ok(text) => state.fulfill_promise(promise, ScriptValue::String(text.to_string())),
            Err(_) => state.reject_promise(
                promise,
                ScriptError::type_error("response body is not valid UTF-8").into(),
            ),
        }
        Ok(CallOutcome::Promise(promise))
    });

    let json_body = body;
    let json_fn = state.define_function(move |state, _args| {
        let promise = state.create_promise();
        match serde_json::from_slice::<serde_json::Value>(&json_body) {
            Ok(doc) => state.fulfill_promise(promise, ScriptValue::from_json(doc)),
            Err(err) => state.reject_promise(
                promise,
                ScriptError::new("SyntaxError", format!("invalid json body: {err}")).into(),
            ),
        }
        Ok(CallOutcome::Promise(promise))
    });

    ScriptValue::object([
        ("status".to_string(), ScriptValue::Number(status as f64)),
        ("ok".to_string(), ScriptValue::Bool(ok)),
        ("text".to_string(), ScriptValue::Function(text_fn)),
        ("json".to_string(), ScriptValue::Function(json_fn)),
    ])
}
