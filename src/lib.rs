//! Cinnabar: an embeddable async bridge for single-threaded script engines
//!
//! A script engine executes on one logical thread, yet the operations
//! scripts care about -- network fetches, timers, cancellation -- are
//! inherently asynchronous and multi-threaded on the host side. Cinnabar
//! is the bridge: it marshals results and errors produced on arbitrary
//! host threads back into the engine's promise/microtask world without
//! violating the single-threaded execution contract, and it lets host
//! code call into script-defined async functions and await the result.
//!
//! # Architecture
//!
//! - [`EngineQueue`]: the single serialization point; all callback
//!   delivery into the engine crosses it.
//! - [`CancellationToken`] / [`AbortController`]: a shared one-shot
//!   cancellation flag with listener notification.
//! - [`TimerRegistry`]: thread-safe table of live one-shot and repeating
//!   timers keyed by opaque handles.
//! - AsyncBridge ([`EngineState::bridge_future`]): host future in,
//!   script promise out; settlement always via the queue.
//! - HostCallBridge ([`ScriptRuntime::call_async`] /
//!   [`ScriptRuntime::invoke_async`]): script promise in, host awaitable
//!   out.
//!
//! # Quick start
//!
//! ```no_run
//! use cinnabar::{CallOutcome, ScriptRuntime, ScriptValue};
//!
//! fn main() -> cinnabar::Result<()> {
//!     let runtime = ScriptRuntime::new()?;
//!     runtime.register_function("greet", |state, _args| {
//!         let promise = state.create_promise();
//!         state.fulfill_promise(promise, ScriptValue::String("hello".into()));
//!         Ok(CallOutcome::Promise(promise))
//!     });
//!     let greeting = futures::executor::block_on(runtime.call_async("greet", Vec::new()))?;
//!     println!("{}", greeting.to_display_string());
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod console;
pub mod engine;
pub mod fetch;
pub mod timers;

mod error;

pub use bridge::host_call::normalize_rejection;
pub use bridge::PendingOperation;
pub use cancel::{AbortController, AbortSignal, CancellationToken};
pub use config::RuntimeConfig;
pub use engine::promise::{PromiseId, Settlement};
pub use engine::value::{CallOutcome, FunctionId, ScriptValue};
pub use engine::{EngineQueue, EngineState, EngineStats, ScriptRuntime, SignalId};
pub use error::{CoreError, Result, ScriptError};
pub use fetch::{
    FetchRequest, FetchResponsePayload, HttpMethod, HttpTransport, MockTransport, TransportError,
};
pub use timers::{TimerId, TimerRegistry};

/// Cinnabar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
