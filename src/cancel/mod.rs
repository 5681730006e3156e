//! Cancellation primitives
//!
//! One [`CancellationToken`] is shared between a canceller (usually an
//! [`AbortController`]) and every operation that opted to observe it.
//! The flag is one-shot: once cancelled it stays cancelled, and each
//! listener is notified at most once.

use std::sync::{Arc, Mutex};

type Listener = Box<dyn FnOnce() + Send>;

struct TokenState {
    cancelled: bool,
    listeners: Vec<Listener>,
}

/// A shared, observable, one-shot cancellation flag.
///
/// All methods are safe to call concurrently from any thread. A single
/// lock protects the flag and the listener list so a racing `cancel` and
/// `on_cancel` can never lose a notification: the listener either lands
/// in the list before the flag flips (and is invoked by `cancel`) or
/// observes the flipped flag and is invoked immediately.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenState {
                cancelled: false,
                listeners: Vec::new(),
            })),
        }
    }

    /// Flip the flag and synchronously invoke every registered listener
    /// in registration order. Idempotent: later calls are no-ops.
    pub fn cancel(&self) {
        let listeners = {
            let mut state = self.state.lock().unwrap();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.listeners)
        };
        // Invoked outside the lock so a listener may touch the token.
        for listener in listeners {
            listener();
        }
    }

    /// Mutation-free read of the flag.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap().cancelled
    }

    /// Register a listener. If the token is already cancelled the
    /// listener is invoked synchronously before this returns, rather
    /// than being lost.
    pub fn on_cancel(&self, listener: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.cancelled {
                state.listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The observable half of a controller/signal pair.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// Whether the paired controller has aborted.
    pub fn aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register an abort listener; fires immediately if already aborted.
    pub fn on_abort(&self, listener: impl FnOnce() + Send + 'static) {
        self.token.on_cancel(listener);
    }

    /// The underlying token, for wiring into cancellable operations.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// The canceller half of a controller/signal pair.
///
/// Calling [`abort`](Self::abort) flips the paired signal to cancelled
/// and notifies its listeners.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the paired signal.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort the paired signal. Idempotent.
    pub fn abort(&self) {
        self.signal.token.cancel();
    }
}
