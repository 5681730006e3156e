//! EngineThreadQueue
//!
//! The single serialization point between host threads and the engine.
//! Every callback that must observe or mutate engine state crosses this
//! queue; nothing else may touch the engine from another thread.

use std::sync::atomic::AtomicU64;
use std::sync::Weak;

use tokio::sync::mpsc;

use crate::engine::EngineState;

/// A unit of work for the engine thread.
pub(crate) type EngineJob = Box<dyn FnOnce(&mut EngineState) + Send>;

/// The strong half of the queue, owned by the runtime. When the runtime
/// drops this, the channel closes and the engine thread drains out.
pub(crate) struct ContextShared {
    pub(crate) tx: mpsc::UnboundedSender<EngineJob>,
    pub(crate) next_signal_id: AtomicU64,
}

impl ContextShared {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<EngineJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_signal_id: AtomicU64::new(1),
            },
            rx,
        )
    }

    /// Enqueue a job; silently dropped once the engine has exited.
    pub(crate) fn submit_job(&self, job: EngineJob) {
        if self.tx.send(job).is_err() {
            tracing::trace!("engine gone, dropping queued callback");
        }
    }
}

/// A cloneable handle for submitting callbacks to the engine thread.
///
/// `submit` may be called from any thread and never blocks the caller.
/// Each submitted callback runs exactly once, on the engine thread, and
/// runs to completion before the engine takes the next queued callback.
/// There is no cross-source ordering guarantee. If the owning engine has
/// been torn down before the callback runs, the callback is dropped
/// without error; the handle itself never keeps a torn-down engine alive.
#[derive(Clone)]
pub struct EngineQueue {
    pub(crate) ctx: Weak<ContextShared>,
}

impl EngineQueue {
    /// Enqueue `callback` for execution on the engine thread.
    pub fn submit(&self, callback: impl FnOnce(&mut EngineState) + Send + 'static) {
        match self.ctx.upgrade() {
            Some(ctx) => ctx.submit_job(Box::new(callback)),
            None => tracing::trace!("engine gone, dropping queued callback"),
        }
    }

    /// Whether the owning engine is still accepting callbacks.
    pub fn is_live(&self) -> bool {
        self.ctx
            .upgrade()
            .map(|ctx| !ctx.tx.is_closed())
            .unwrap_or(false)
    }
}
