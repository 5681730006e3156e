//! AsyncBridge: host task → script promise
//!
//! Converts a host asynchronous operation into a script-visible promise.
//! The promise is created synchronously on the engine thread; settlement
//! always travels back through the engine queue, so script code never
//! observes a settlement inside the synchronous turn that started the
//! operation. The settle/cancel race resolves settle-first-wins: only the
//! first settlement of the promise is observable.

pub mod host_call;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use crate::cancel::CancellationToken;
use crate::engine::promise::{PromiseId, Settlement};
use crate::engine::queue::ContextShared;
use crate::engine::value::ScriptValue;
use crate::engine::EngineState;
use crate::error::ScriptError;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// One in-flight host task bound to a script promise.
///
/// Holds only a weak reference to the engine context, so an operation
/// outliving its context keeps nothing alive; its settlement is then
/// silently dropped. Cloned into the completion and cancellation paths;
/// whichever settles first wins at the promise slot.
#[derive(Clone)]
pub struct PendingOperation {
    id: u64,
    promise: PromiseId,
    ctx: Weak<ContextShared>,
    token: Option<CancellationToken>,
}

impl PendingOperation {
    pub(crate) fn new(
        promise: PromiseId,
        ctx: Weak<ContextShared>,
        token: Option<CancellationToken>,
    ) -> Self {
        Self {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            promise,
            ctx,
            token,
        }
    }

    /// The operation's unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The bound promise handle.
    pub fn promise(&self) -> PromiseId {
        self.promise
    }

    /// Whether the observed token (if any) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Marshal a settlement onto the engine thread. May be called from
    /// any thread; dropped silently after context teardown.
    pub fn settle(&self, settlement: Settlement) {
        self.settle_with(move |_state| settlement);
    }

    /// Like [`settle`](Self::settle), but the settlement value is built
    /// on the engine thread with access to engine state (for results
    /// that carry function handles).
    pub fn settle_with(
        &self,
        build: impl FnOnce(&mut EngineState) -> Settlement + Send + 'static,
    ) {
        let Some(ctx) = self.ctx.upgrade() else {
            tracing::trace!(operation = self.id, "context gone, dropping settlement");
            return;
        };
        let promise = self.promise;
        let id = self.id;
        ctx.submit_job(Box::new(move |state| {
            let settlement = build(state);
            tracing::trace!(operation = id, promise = ?promise, "operation settled");
            state.settle_promise(promise, settlement);
        }));
    }
}

impl EngineState {
    /// Bridge a host future into a script-visible promise.
    ///
    /// The future starts on the host pool immediately; the returned
    /// promise is pending when this returns and settles exactly once,
    /// always through the engine queue. When a token is supplied, its
    /// cancellation aborts the host task and rejects the promise with an
    /// `AbortError` -- unless the task settled first.
    pub fn bridge_future<F>(
        &mut self,
        token: Option<CancellationToken>,
        fut: F,
    ) -> PromiseId
    where
        F: Future<Output = std::result::Result<ScriptValue, ScriptError>> + Send + 'static,
    {
        self.bridge_future_with(token, fut, |_state, value| value)
    }

    /// Bridge a host future whose success value needs marshaling on the
    /// engine thread (e.g. results carrying function handles).
    pub fn bridge_future_with<T, F, M>(
        &mut self,
        token: Option<CancellationToken>,
        fut: F,
        marshal: M,
    ) -> PromiseId
    where
        T: Send + 'static,
        F: Future<Output = std::result::Result<T, ScriptError>> + Send + 'static,
        M: FnOnce(&mut EngineState, T) -> ScriptValue + Send + 'static,
    {
        let promise = self.create_promise();
        let op = PendingOperation::new(promise, self.ctx.clone(), token.clone());
        tracing::debug!(operation = op.id(), promise = ?promise, "bridged operation started");

        let complete = op.clone();
        let join = self.host.spawn(async move {
            match fut.await {
                Ok(value) => complete
                    .settle_with(move |state| Settlement::Fulfilled(marshal(state, value))),
                Err(err) => complete.settle(Settlement::Rejected(ScriptValue::from(err))),
            }
        });

        if let Some(token) = token {
            let abort = join.abort_handle();
            let cancel_op = op;
            token.on_cancel(move || {
                abort.abort();
                cancel_op.settle(Settlement::Rejected(ScriptValue::from(ScriptError::aborted())));
            });
        }

        promise
    }
}
