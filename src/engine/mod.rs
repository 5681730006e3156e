//! Engine thread and embedding runtime
//!
//! The script engine executes on one dedicated thread. All host threads
//! reach it exclusively through the [`EngineQueue`]; the engine thread
//! drains one queued job at a time and then drains the microtask queue
//! (promise reactions) to empty before taking the next job.
//!
//! [`EngineState`] is the engine-thread-owned world: the promise table,
//! the host-exposed globals/objects, the function table, the signal table
//! and the timer callbacks. It is never touched from another thread.
//! [`ScriptRuntime`] is the embedding handle that owns the engine thread
//! plus the host task pool and wires the subsystems together.

pub mod promise;
pub mod queue;
pub mod value;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::cancel::{AbortSignal, CancellationToken};
use crate::config::RuntimeConfig;
use crate::error::{CoreError, Result, ScriptError};
use crate::fetch::HttpTransport;
use crate::timers::{TimerId, TimerRegistry};

use self::promise::{PromiseId, PromiseSlot};
use self::queue::{ContextShared, EngineJob};
use self::value::{CallOutcome, FunctionId, ScriptValue};

pub use self::queue::EngineQueue;

/// A callable exposed into the engine: a host-provided global, an object
/// method, a function handle, or a timer callback. Engine-thread only.
pub(crate) type ScriptCallable =
    Rc<dyn Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>>;

pub(crate) type Microtask = Box<dyn FnOnce(&mut EngineState)>;

/// Opaque handle to a cancellation signal installed into the engine's
/// signal table, referenceable from script-visible call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(pub(crate) u64);

impl SignalId {
    /// The numeric form handed to script code.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Runtime counters for the engine thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Queued jobs executed
    pub jobs_processed: u64,
    /// Microtasks (promise reactions) executed
    pub microtasks_processed: u64,
    /// Promises created
    pub promises_created: u64,
    /// Promises settled (first settlement only)
    pub promises_settled: u64,
    /// Largest single microtask drain
    pub max_microtask_drain: usize,
}

/// The engine-thread-owned state.
pub struct EngineState {
    pub(crate) promises: FxHashMap<PromiseId, PromiseSlot>,
    pub(crate) next_promise_id: u64,
    pub(crate) microtasks: VecDeque<Microtask>,
    pub(crate) globals: FxHashMap<String, ScriptCallable>,
    pub(crate) objects: FxHashMap<String, FxHashMap<String, ScriptCallable>>,
    pub(crate) functions: FxHashMap<FunctionId, ScriptCallable>,
    pub(crate) next_function_id: u64,
    pub(crate) timer_callbacks: FxHashMap<TimerId, ScriptCallable>,
    pub(crate) signals: FxHashMap<u64, CancellationToken>,
    pub(crate) ctx: Weak<ContextShared>,
    pub(crate) host: tokio::runtime::Handle,
    pub(crate) timers: TimerRegistry,
    pub(crate) config: RuntimeConfig,
    pub(crate) stats: EngineStats,
}

impl EngineState {
    fn new(
        ctx: Weak<ContextShared>,
        host: tokio::runtime::Handle,
        timers: TimerRegistry,
        config: RuntimeConfig,
    ) -> Self {
        let mut state = Self {
            promises: FxHashMap::default(),
            next_promise_id: 1,
            microtasks: VecDeque::new(),
            globals: FxHashMap::default(),
            objects: FxHashMap::default(),
            functions: FxHashMap::default(),
            next_function_id: 1,
            timer_callbacks: FxHashMap::default(),
            signals: FxHashMap::default(),
            ctx,
            host,
            timers,
            config,
            stats: EngineStats::default(),
        };
        crate::timers::install_timer_globals(&mut state);
        crate::console::install_console(&mut state);
        state
    }

    /// Expose a host function as a script-visible global.
    pub fn register_global_fn(
        &mut self,
        name: &str,
        f: impl Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>
            + 'static,
    ) {
        self.globals.insert(name.to_string(), Rc::new(f));
    }

    /// Expose a method on a named script-visible object.
    pub fn register_method_fn(
        &mut self,
        object: &str,
        method: &str,
        f: impl Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>
            + 'static,
    ) {
        self.objects
            .entry(object.to_string())
            .or_default()
            .insert(method.to_string(), Rc::new(f));
    }

    /// Store a callable in the function table and return its handle. This
    /// is how function-valued properties (response body accessors, script
    /// callbacks) travel inside [`ScriptValue`]s.
    pub fn define_function(
        &mut self,
        f: impl Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>
            + 'static,
    ) -> FunctionId {
        let id = self.next_function_id;
        self.next_function_id += 1;
        self.functions.insert(id, Rc::new(f));
        id
    }

    /// Invoke a global by name.
    pub fn call_global(
        &mut self,
        name: &str,
        args: Vec<ScriptValue>,
    ) -> std::result::Result<CallOutcome, ScriptError> {
        let Some(callable) = self.globals.get(name).cloned() else {
            return Err(ScriptError::reference_error(format!(
                "{name} is not defined"
            )));
        };
        callable(self, args)
    }

    /// Invoke a method on a named object.
    pub fn call_method(
        &mut self,
        object: &str,
        method: &str,
        args: Vec<ScriptValue>,
    ) -> std::result::Result<CallOutcome, ScriptError> {
        let Some(methods) = self.objects.get(object) else {
            return Err(ScriptError::reference_error(format!(
                "{object} is not defined"
            )));
        };
        let Some(callable) = methods.get(method).cloned() else {
            return Err(ScriptError::type_error(format!(
                "{object}.{method} is not a function"
            )));
        };
        callable(self, args)
    }

    /// Invoke a callable by function handle.
    pub fn call_function(
        &mut self,
        fid: FunctionId,
        args: Vec<ScriptValue>,
    ) -> std::result::Result<CallOutcome, ScriptError> {
        let Some(callable) = self.functions.get(&fid).cloned() else {
            return Err(ScriptError::type_error(format!(
                "function handle {fid} is not callable"
            )));
        };
        callable(self, args)
    }

    /// Resolve a signal handle to its token.
    pub fn signal_token(&self, id: u64) -> Option<CancellationToken> {
        self.signals.get(&id).cloned()
    }

    /// The timer registry shared with the host side.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Drain the microtask queue to empty. Reactions may enqueue further
    /// microtasks; crossing the configured budget is reported once per
    /// drain since it usually means a reaction loop.
    fn drain_microtasks(&mut self) {
        let mut drained: usize = 0;
        while let Some(task) = self.microtasks.pop_front() {
            task(self);
            drained += 1;
            if drained == self.config.microtask_budget {
                tracing::warn!(
                    budget = self.config.microtask_budget,
                    "microtask drain exceeded budget"
                );
            }
        }
        self.stats.microtasks_processed += drained as u64;
        if drained > self.stats.max_microtask_drain {
            self.stats.max_microtask_drain = drained;
        }
    }
}

fn run_engine_loop(mut rx: tokio::sync::mpsc::UnboundedReceiver<EngineJob>, state: &mut EngineState) {
    while let Some(job) = rx.blocking_recv() {
        job(state);
        state.stats.jobs_processed += 1;
        state.drain_microtasks();
    }
    tracing::debug!("engine thread exiting");
}

/// The embedding handle: owns the engine thread and the host task pool.
///
/// Dropping the runtime (or calling [`shutdown`](Self::shutdown)) closes
/// the queue, waits for the engine thread to drain out, and aborts
/// outstanding host tasks. Callbacks submitted after teardown are dropped
/// without error. Do not drop a `ScriptRuntime` from inside an async
/// task: it owns a tokio runtime, which must be dropped from synchronous
/// code.
pub struct ScriptRuntime {
    ctx: Option<Arc<ContextShared>>,
    timers: TimerRegistry,
    join: Option<thread::JoinHandle<()>>,
    host: tokio::runtime::Runtime,
}

impl ScriptRuntime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        let host = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.host_threads.max(1))
            .thread_name("cinnabar-host")
            .enable_time()
            .build()?;

        let (shared, rx) = ContextShared::new();
        let ctx = Arc::new(shared);
        let timers = TimerRegistry::new(Arc::downgrade(&ctx), host.handle().clone());

        let state_ctx = Arc::downgrade(&ctx);
        let state_host = host.handle().clone();
        let state_timers = timers.clone();
        let join = thread::Builder::new()
            .name("cinnabar-engine".to_string())
            .spawn(move || {
                let mut state = EngineState::new(state_ctx, state_host, state_timers, config);
                run_engine_loop(rx, &mut state);
            })?;

        Ok(Self {
            ctx: Some(ctx),
            timers,
            join: Some(join),
            host,
        })
    }

    /// A cloneable handle for submitting callbacks onto the engine
    /// thread from any thread.
    pub fn queue(&self) -> EngineQueue {
        EngineQueue {
            ctx: self
                .ctx
                .as_ref()
                .map(Arc::downgrade)
                .unwrap_or_else(Weak::new),
        }
    }

    /// Submit a callback for execution on the engine thread. Dropped
    /// silently if the engine has been torn down.
    pub fn submit(&self, callback: impl FnOnce(&mut EngineState) + Send + 'static) {
        if let Some(ctx) = self.ctx.as_ref() {
            ctx.submit_job(Box::new(callback));
        }
    }

    /// The shared timer registry.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// A handle onto the host task pool, for embedders that want to run
    /// their own work next to bridged operations.
    pub fn host_handle(&self) -> tokio::runtime::Handle {
        self.host.handle().clone()
    }

    /// Schedule a one-shot timer from host code.
    pub fn set_timeout(
        &self,
        delay: Duration,
        callback: impl FnMut(&mut EngineState) + Send + 'static,
    ) -> TimerId {
        self.timers.schedule(delay, false, callback)
    }

    /// Schedule a repeating timer from host code.
    pub fn set_interval(
        &self,
        delay: Duration,
        callback: impl FnMut(&mut EngineState) + Send + 'static,
    ) -> TimerId {
        self.timers.schedule(delay, true, callback)
    }

    /// Cancel a timer. Unknown handles are a silent no-op.
    pub fn clear_timer(&self, id: TimerId) {
        self.timers.cancel(id);
    }

    /// Expose a host function as a script-visible global.
    pub fn register_function(
        &self,
        name: &str,
        f: impl Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>
            + Send
            + 'static,
    ) {
        let name = name.to_string();
        self.submit(move |state| {
            state.globals.insert(name, Rc::new(f));
        });
    }

    /// Expose a method on a named script-visible object.
    pub fn register_object_method(
        &self,
        object: &str,
        method: &str,
        f: impl Fn(&mut EngineState, Vec<ScriptValue>) -> std::result::Result<CallOutcome, ScriptError>
            + Send
            + 'static,
    ) {
        let object = object.to_string();
        let method = method.to_string();
        self.submit(move |state| {
            state
                .objects
                .entry(object)
                .or_default()
                .insert(method, Rc::new(f));
        });
    }

    /// Wire the network transport and expose the script-visible `fetch`
    /// global.
    pub fn install_transport(&self, transport: Arc<dyn HttpTransport>) {
        self.submit(move |state| crate::fetch::install_fetch(state, transport));
    }

    /// Install a host-created signal into the engine's signal table so
    /// script-visible call options can reference it by handle.
    pub fn install_signal(&self, signal: &AbortSignal) -> Result<SignalId> {
        let Some(ctx) = self.ctx.as_ref() else {
            return Err(CoreError::EngineGone);
        };
        let id = ctx.next_signal_id.fetch_add(1, Ordering::Relaxed);
        let token = signal.token().clone();
        ctx.submit_job(Box::new(move |state| {
            state.signals.insert(id, token);
        }));
        Ok(SignalId(id))
    }

    /// Snapshot of the engine counters.
    pub async fn stats(&self) -> Result<EngineStats> {
        let (tx, rx) = oneshot::channel();
        self.submit(move |state| {
            let _ = tx.send(state.stats.clone());
        });
        rx.await.map_err(|_| CoreError::EngineGone)
    }

    /// Tear down: close the queue and wait for the engine thread.
    pub fn shutdown(self) {
        // Drop performs the teardown.
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        // Closing the last strong context reference closes the queue;
        // the engine thread drains what it already accepted and exits.
        drop(self.ctx.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
