//! Promise table
//!
//! Promises are engine-thread state addressed by opaque [`PromiseId`]
//! handles. A promise settles exactly once: the slot transitions from
//! pending to settled and every later settlement attempt is discarded.
//! Reactions (the `then`-equivalent) are never run inline; they are
//! delivered through the microtask queue, including when they are
//! registered against an already-settled promise.

use crate::engine::value::ScriptValue;
use crate::engine::EngineState;

/// Opaque handle to a promise in the engine's promise table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromiseId(pub(crate) u64);

/// The settled outcome of a promise.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

/// A settlement reaction. Runs on the engine thread with full access to
/// engine state, so it can settle chained promises or start new work.
pub(crate) type Reaction = Box<dyn FnOnce(&mut EngineState, &Settlement)>;

pub(crate) enum PromiseSlot {
    Pending { reactions: Vec<Reaction> },
    Settled(Settlement),
}

impl EngineState {
    /// Allocate a fresh pending promise and return its handle.
    pub fn create_promise(&mut self) -> PromiseId {
        let id = PromiseId(self.next_promise_id);
        self.next_promise_id += 1;
        self.promises.insert(
            id,
            PromiseSlot::Pending {
                reactions: Vec::new(),
            },
        );
        self.stats.promises_created += 1;
        id
    }

    /// Settle a promise. The first settlement wins; later attempts are
    /// silently discarded, as are settlements of unknown handles (a
    /// handle from a context that has since been recycled).
    pub fn settle_promise(&mut self, id: PromiseId, settlement: Settlement) {
        let Some(slot) = self.promises.get_mut(&id) else {
            tracing::trace!(promise = id.0, "settlement for unknown promise dropped");
            return;
        };
        let reactions = match slot {
            PromiseSlot::Pending { reactions } => std::mem::take(reactions),
            PromiseSlot::Settled(_) => return,
        };
        *slot = PromiseSlot::Settled(settlement.clone());
        self.stats.promises_settled += 1;
        for reaction in reactions {
            let settlement = settlement.clone();
            self.microtasks
                .push_back(Box::new(move |state| reaction(state, &settlement)));
        }
    }

    /// Fulfill a promise with a value.
    pub fn fulfill_promise(&mut self, id: PromiseId, value: ScriptValue) {
        self.settle_promise(id, Settlement::Fulfilled(value));
    }

    /// Reject a promise with a reason.
    pub fn reject_promise(&mut self, id: PromiseId, reason: ScriptValue) {
        self.settle_promise(id, Settlement::Rejected(reason));
    }

    /// Register a settlement reaction (`then`-equivalent). If the promise
    /// has already settled the reaction is enqueued as a microtask with
    /// the recorded settlement, so registration order never loses a
    /// notification.
    pub fn on_settle(
        &mut self,
        id: PromiseId,
        reaction: impl FnOnce(&mut EngineState, &Settlement) + 'static,
    ) {
        let reaction: Reaction = Box::new(reaction);
        match self.promises.get_mut(&id) {
            Some(PromiseSlot::Pending { reactions }) => reactions.push(reaction),
            Some(PromiseSlot::Settled(settlement)) => {
                let settlement = settlement.clone();
                self.microtasks
                    .push_back(Box::new(move |state| reaction(state, &settlement)));
            }
            None => {
                tracing::trace!(promise = id.0, "reaction on unknown promise dropped");
            }
        }
    }

    /// The settlement of a promise, if it has settled.
    pub fn promise_settlement(&self, id: PromiseId) -> Option<&Settlement> {
        match self.promises.get(&id) {
            Some(PromiseSlot::Settled(settlement)) => Some(settlement),
            _ => None,
        }
    }

    /// Whether the handle refers to a live (pending or settled) promise.
    pub fn has_promise(&self, id: PromiseId) -> bool {
        self.promises.contains_key(&id)
    }
}
