//! AsyncBridge and engine queue tests: settle-exactly-once, the
//! cancel/settle race, queue ordering and teardown behavior.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cinnabar::{
    normalize_rejection, CancellationToken, ScriptValue, Settlement,
};
use common::{runtime, wait_until, Counter};

#[test]
fn test_promise_settles_exactly_once() {
    let rt = runtime();
    let (tx, rx) = mpsc::channel();

    rt.submit(move |state| {
        let promise = state.create_promise();
        state.fulfill_promise(promise, ScriptValue::Number(1.0));
        state.reject_promise(promise, ScriptValue::String("too late".into()));
        state.fulfill_promise(promise, ScriptValue::Number(2.0));
        tx.send(state.promise_settlement(promise).cloned()).unwrap();
    });

    let settlement = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(settlement, Some(Settlement::Fulfilled(ScriptValue::Number(1.0))));
}

#[test]
fn test_reaction_runs_exactly_once() {
    let rt = runtime();
    let counter = Counter::new();

    let c = counter.clone();
    rt.submit(move |state| {
        let promise = state.create_promise();
        state.on_settle(promise, move |_state, _settlement| c.bump());
        state.fulfill_promise(promise, ScriptValue::Number(1.0));
        state.reject_promise(promise, ScriptValue::Number(2.0));
    });

    assert!(wait_until(Duration::from_secs(2), || counter.get() == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.get(), 1);
}

#[test]
fn test_reaction_on_settled_promise_still_fires() {
    let rt = runtime();
    let (tx, rx) = mpsc::channel();

    rt.submit(move |state| {
        let promise = state.create_promise();
        state.fulfill_promise(promise, ScriptValue::Number(7.0));
        // Registered after settlement: delivered through a microtask,
        // never lost.
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
    });

    let settlement = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(settlement, Settlement::Fulfilled(ScriptValue::Number(7.0)));
}

#[test]
fn test_bridged_future_resolves_through_queue() {
    let rt = runtime();
    let (tx, rx) = mpsc::channel();

    rt.submit(move |state| {
        let promise = state.bridge_future(None, async { Ok(ScriptValue::Number(7.0)) });
        // Never settled synchronously inside the bridge.
        assert!(state.promise_settlement(promise).is_none());
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
    });

    let settlement = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(settlement, Settlement::Fulfilled(ScriptValue::Number(7.0)));
}

#[test]
fn test_bridged_future_rejection_carries_kind_and_message() {
    let rt = runtime();
    let (tx, rx) = mpsc::channel();

    rt.submit(move |state| {
        let promise = state.bridge_future(None, async {
            Err(cinnabar::ScriptError::fetch("connection refused"))
        });
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
    });

    match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
        Settlement::Rejected(reason) => {
            let err = normalize_rejection(&reason);
            assert_eq!(err.name, "FetchError");
            assert_eq!(err.message, "connection refused");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_cancellation_rejects_pending_bridge_with_abort_error() {
    let rt = runtime();
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel();

    let t = token.clone();
    rt.submit(move |state| {
        let promise = state.bridge_future(Some(t), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ScriptValue::Undefined)
        });
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
    });

    std::thread::sleep(Duration::from_millis(50));
    token.cancel();

    match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
        Settlement::Rejected(reason) => {
            assert_eq!(normalize_rejection(&reason).name, "AbortError");
        }
        other => panic!("expected AbortError rejection, got {other:?}"),
    }
}

#[test]
fn test_settle_first_wins_over_late_cancellation() {
    let rt = runtime();
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel();

    let t = token.clone();
    let (promise_tx, promise_rx) = mpsc::channel();
    rt.submit(move |state| {
        let promise = state.bridge_future(Some(t), async { Ok(ScriptValue::Number(3.0)) });
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
        promise_tx.send(promise).unwrap();
    });

    let promise = promise_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first, Settlement::Fulfilled(ScriptValue::Number(3.0)));

    // The task already settled; the late cancellation enqueues a
    // rejection that the promise slot must discard.
    token.cancel();

    let (tx, rx) = mpsc::channel();
    rt.submit(move |state| {
        state.on_settle(promise, move |_state, settlement| {
            tx.send(settlement.clone()).unwrap();
        });
    });
    let observed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(observed, Settlement::Fulfilled(ScriptValue::Number(3.0)));
}

#[test]
fn test_queue_preserves_submission_order_per_source() {
    let rt = runtime();
    let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let o = order.clone();
        rt.submit(move |_state| o.lock().unwrap().push(i));
    }

    assert!(wait_until(Duration::from_secs(2), || {
        order.lock().unwrap().len() == 10
    }));
    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_queue_callback_runs_to_completion_before_next() {
    let rt = runtime();
    let (tx, rx) = mpsc::channel();

    // The first job settles a promise; its reactions (microtasks) must
    // run before the second job observes the world.
    let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let t1 = trace.clone();
    rt.submit(move |state| {
        let promise = state.create_promise();
        let t = t1.clone();
        state.on_settle(promise, move |_state, _settlement| {
            t.lock().unwrap().push("reaction");
        });
        state.fulfill_promise(promise, ScriptValue::Undefined);
        t1.lock().unwrap().push("job1");
    });
    let t2 = trace.clone();
    rt.submit(move |state| {
        let _ = state;
        t2.lock().unwrap().push("job2");
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["job1", "reaction", "job2"]);
}

#[test]
fn test_teardown_drops_pending_work_silently() {
    let rt = runtime();
    let queue = rt.queue();

    rt.submit(|state| {
        let _ = state.bridge_future(None, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ScriptValue::Undefined)
        });
    });
    std::thread::sleep(Duration::from_millis(50));

    drop(rt);
    assert!(!queue.is_live());
    // Dropped without error, never delivered.
    queue.submit(|_state| panic!("must not run after teardown"));
    std::thread::sleep(Duration::from_millis(50));
}
