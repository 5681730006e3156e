//! Timer subsystem
//!
//! Timers live in a locked handle table on the host side; their callbacks
//! live engine-side, keyed by the same [`TimerId`]. A host sleep task is
//! armed per timer and fire messages carry only the id, so cancellation
//! is a table operation and never races callback ownership.
//!
//! Race policy ("best effort, no unfire"): a fire that reached the engine
//! queue before `cancel` completed is still delivered; a fire that had
//! not yet been dispatched is suppressed. One-shot timers remove their
//! own table entry before dispatching, so cancelling from inside the
//! callback (or concurrently) is a no-op on an already-removed id.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::engine::queue::ContextShared;
use crate::engine::value::{CallOutcome, FunctionId, ScriptValue};
use crate::engine::EngineState;
use crate::error::ScriptError;

/// Opaque handle to a live timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    /// The numeric form handed to script code.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct TimerEntry {
    repeats: bool,
    abort: Option<tokio::task::AbortHandle>,
}

struct RegistryInner {
    timers: Mutex<FxHashMap<TimerId, TimerEntry>>,
    next_id: AtomicU64,
    ctx: Weak<ContextShared>,
    host: tokio::runtime::Handle,
}

/// Thread-safe table of live timers.
///
/// Creation and cancellation are safe from any thread, including the
/// engine thread itself (script-visible `setTimeout`/`clearTimeout` go
/// through the same registry as host callers).
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<RegistryInner>,
}

impl TimerRegistry {
    pub(crate) fn new(ctx: Weak<ContextShared>, host: tokio::runtime::Handle) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                timers: Mutex::new(FxHashMap::default()),
                next_id: AtomicU64::new(1),
                ctx,
                host,
            }),
        }
    }

    /// Create a timer running `callback` on the engine thread after
    /// `delay` (and every `delay` thereafter when `repeats`).
    ///
    /// The handle is returned synchronously, before the timer can
    /// possibly fire; a zero delay still goes through the host sleep and
    /// the engine queue, never inline.
    pub fn schedule(
        &self,
        delay: Duration,
        repeats: bool,
        callback: impl FnMut(&mut EngineState) + Send + 'static,
    ) -> TimerId {
        let id = TimerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let Some(ctx) = self.inner.ctx.upgrade() else {
            // Engine already torn down: hand back a dead handle.
            return id;
        };

        // Install the callback engine-side first. The queue is FIFO, so
        // the install job always lands before any fire job for this id.
        let cell = RefCell::new(callback);
        ctx.submit_job(Box::new(move |state| {
            state.timer_callbacks.insert(
                id,
                Rc::new(move |state, _args| {
                    (&mut *cell.borrow_mut())(state);
                    Ok(CallOutcome::Value(ScriptValue::Undefined))
                }),
            );
        }));

        self.inner
            .timers
            .lock()
            .unwrap()
            .insert(id, TimerEntry { repeats, abort: None });

        self.arm(id, delay, repeats);
        tracing::debug!(timer = id.0, ?delay, repeats, "timer created");
        id
    }

    /// Create a timer that invokes a script function by handle.
    pub fn schedule_function(&self, fid: FunctionId, delay: Duration, repeats: bool) -> TimerId {
        self.schedule(delay, repeats, move |state| {
            if let Err(err) = state.call_function(fid, Vec::new()) {
                tracing::warn!(function = fid, %err, "uncaught error in timer callback");
            }
        })
    }

    /// Remove the handle and stop future firing. Cancelling an unknown or
    /// already-removed handle is a silent no-op.
    pub fn cancel(&self, id: TimerId) {
        let entry = self.inner.timers.lock().unwrap().remove(&id);
        let Some(entry) = entry else {
            return;
        };
        if let Some(abort) = entry.abort {
            abort.abort();
        }
        // Drop the engine-side callback. Queued after any fire that was
        // already dispatched, so that fire still finds its callback.
        if let Some(ctx) = self.inner.ctx.upgrade() {
            ctx.submit_job(Box::new(move |state| {
                state.timer_callbacks.remove(&id);
            }));
        }
        tracing::debug!(timer = id.0, "timer cancelled");
    }

    /// Number of live (armed, not yet cancelled or completed) timers.
    pub fn live_count(&self) -> usize {
        self.inner.timers.lock().unwrap().len()
    }

    fn arm(&self, id: TimerId, delay: Duration, repeats: bool) {
        let registry = self.clone();
        let handle = self.inner.host.spawn(async move {
            if repeats {
                loop {
                    tokio::time::sleep(delay).await;
                    if !registry.dispatch(id, true) {
                        break;
                    }
                }
            } else {
                tokio::time::sleep(delay).await;
                registry.dispatch(id, false);
            }
        });

        let mut timers = self.inner.timers.lock().unwrap();
        match timers.get_mut(&id) {
            Some(entry) => entry.abort = Some(handle.abort_handle()),
            // Cancelled between insert and arm: stop the sleeper now.
            None => handle.abort(),
        }
    }

    /// Check liveness and enqueue one callback execution. Returns whether
    /// the timer is still live. For one-shot timers the table entry is
    /// removed here, before dispatch.
    fn dispatch(&self, id: TimerId, repeats: bool) -> bool {
        let live = {
            let mut timers = self.inner.timers.lock().unwrap();
            if repeats {
                timers.contains_key(&id)
            } else {
                timers.remove(&id).is_some()
            }
        };
        if !live {
            tracing::trace!(timer = id.0, "fire suppressed, timer cancelled");
            return false;
        }
        let Some(ctx) = self.inner.ctx.upgrade() else {
            return false;
        };
        ctx.submit_job(Box::new(move |state| state.run_timer_callback(id, repeats)));
        true
    }
}

impl EngineState {
    /// Run a fired timer's callback. One-shot callbacks are consumed; a
    /// missing callback means the timer was cancelled after dispatch and
    /// its cleanup already ran, which is not an error.
    pub(crate) fn run_timer_callback(&mut self, id: TimerId, repeats: bool) {
        let callback = if repeats {
            self.timer_callbacks.get(&id).cloned()
        } else {
            self.timer_callbacks.remove(&id)
        };
        let Some(callback) = callback else {
            return;
        };
        if let Err(err) = callback(self, Vec::new()) {
            tracing::warn!(timer = id.0, %err, "uncaught error in timer callback");
        }
    }
}

/// Register `setTimeout` / `setInterval` / `clearTimeout` /
/// `clearInterval` into the engine's global table.
pub(crate) fn install_timer_globals(state: &mut EngineState) {
    state.register_global_fn("setTimeout", |state, args| timer_global(state, args, false));
    state.register_global_fn("setInterval", |state, args| timer_global(state, args, true));
    state.register_global_fn("clearTimeout", clear_timer_global);
    state.register_global_fn("clearInterval", clear_timer_global);
}

fn timer_global(
    state: &mut EngineState,
    args: Vec<ScriptValue>,
    repeats: bool,
) -> Result<CallOutcome, ScriptError> {
    let fid = match args.first() {
        Some(ScriptValue::Function(fid)) => *fid,
        _ => {
            return Err(ScriptError::type_error(
                "timer callback must be a function",
            ))
        }
    };
    let ms = args.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0);
    let ms = if ms.is_finite() && ms > 0.0 { ms } else { 0.0 };
    let id = state
        .timers
        .schedule_function(fid, Duration::from_millis(ms as u64), repeats);
    Ok(CallOutcome::Value(ScriptValue::Number(id.raw() as f64)))
}

fn clear_timer_global(
    state: &mut EngineState,
    args: Vec<ScriptValue>,
) -> Result<CallOutcome, ScriptError> {
    if let Some(id) = args.first().and_then(|v| v.as_f64()) {
        if id.is_finite() && id >= 0.0 {
            state.timers.cancel(TimerId(id as u64));
        }
    }
    // Clearing an unknown handle is a silent no-op.
    Ok(CallOutcome::Value(ScriptValue::Undefined))
}
