//! HostCallBridge tests: awaiting script-defined async functions and
//! methods from host code, rejection normalization, and the immediate
//! failure paths.

mod common;

use std::time::Duration;

use cinnabar::{CallOutcome, CoreError, ScriptError, ScriptValue};
use common::runtime;
use futures::executor::block_on;

#[test]
fn test_call_async_resolves_with_value() {
    let rt = runtime();
    rt.register_function("answer", |state, _args| {
        let promise = state.create_promise();
        state.fulfill_promise(promise, ScriptValue::Number(42.0));
        Ok(CallOutcome::Promise(promise))
    });

    let value = block_on(rt.call_async("answer", Vec::new())).unwrap();
    assert_eq!(value, ScriptValue::Number(42.0));
}

#[test]
fn test_call_async_rejection_uses_string_payload() {
    let rt = runtime();
    rt.register_function("explode", |state, _args| {
        let promise = state.create_promise();
        state.reject_promise(promise, ScriptValue::String("boom".into()));
        Ok(CallOutcome::Promise(promise))
    });

    match block_on(rt.call_async("explode", Vec::new())) {
        Err(CoreError::Rejected(err)) => {
            assert_eq!(err.name, "Error");
            assert_eq!(err.message, "boom");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_call_async_rejection_uses_error_object_fields() {
    let rt = runtime();
    rt.register_function("abort_me", |state, _args| {
        let promise = state.create_promise();
        state.reject_promise(promise, ScriptError::aborted().into());
        Ok(CallOutcome::Promise(promise))
    });

    match block_on(rt.call_async("abort_me", Vec::new())) {
        Err(CoreError::Rejected(err)) => {
            assert_eq!(err.name, "AbortError");
            assert_eq!(err.message, "The operation was aborted");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_call_async_with_delayed_settlement() {
    let rt = runtime();
    rt.register_function("eventually", |state, _args| {
        let promise = state.create_promise();
        state
            .timers()
            .schedule(Duration::from_millis(30), false, move |state| {
                state.fulfill_promise(promise, ScriptValue::String("done".into()));
            });
        Ok(CallOutcome::Promise(promise))
    });

    let value = block_on(rt.call_async("eventually", Vec::new())).unwrap();
    assert_eq!(value, ScriptValue::String("done".into()));
}

#[test]
fn test_synchronous_throw_is_immediate_bridge_error() {
    let rt = runtime();
    rt.register_function("thrower", |_state, _args| {
        Err(ScriptError::type_error("bad argument"))
    });

    match block_on(rt.call_async("thrower", Vec::new())) {
        Err(CoreError::Bridge(message)) => {
            assert!(message.contains("bad argument"), "got: {message}");
        }
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[test]
fn test_non_promise_return_is_bridge_error() {
    let rt = runtime();
    rt.register_function("plain", |_state, _args| {
        Ok(CallOutcome::Value(ScriptValue::Number(5.0)))
    });

    match block_on(rt.call_async("plain", Vec::new())) {
        Err(CoreError::Bridge(message)) => {
            assert!(message.contains("expected a promise"), "got: {message}");
        }
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[test]
fn test_unknown_function_is_bridge_error() {
    let rt = runtime();
    match block_on(rt.call_async("missing", Vec::new())) {
        Err(CoreError::Bridge(message)) => {
            assert!(message.contains("missing is not defined"), "got: {message}");
        }
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[test]
fn test_invoke_async_method() {
    let rt = runtime();
    rt.register_object_method("calculator", "double", |state, args| {
        let n = args.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let promise = state.create_promise();
        state
            .timers()
            .schedule(Duration::from_millis(20), false, move |state| {
                state.fulfill_promise(promise, ScriptValue::Number(n * 2.0));
            });
        Ok(CallOutcome::Promise(promise))
    });

    let value = block_on(rt.invoke_async(
        "calculator",
        "double",
        vec![ScriptValue::Number(21.0)],
    ))
    .unwrap();
    assert_eq!(value, ScriptValue::Number(42.0));
}

#[test]
fn test_invoke_async_unknown_object_and_method() {
    let rt = runtime();
    rt.register_object_method("calculator", "double", |state, _args| {
        let promise = state.create_promise();
        state.fulfill_promise(promise, ScriptValue::Undefined);
        Ok(CallOutcome::Promise(promise))
    });

    match block_on(rt.invoke_async("nowhere", "double", Vec::new())) {
        Err(CoreError::Bridge(message)) => {
            assert!(message.contains("nowhere is not defined"), "got: {message}");
        }
        other => panic!("expected bridge error, got {other:?}"),
    }

    match block_on(rt.invoke_async("calculator", "triple", Vec::new())) {
        Err(CoreError::Bridge(message)) => {
            assert!(
                message.contains("calculator.triple is not a function"),
                "got: {message}"
            );
        }
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[test]
fn test_console_methods_are_callable() {
    let rt = runtime();
    let (tx, rx) = std::sync::mpsc::channel();
    rt.submit(move |state| {
        let log = state.call_method(
            "console",
            "log",
            vec![
                ScriptValue::String("value:".into()),
                ScriptValue::Number(7.0),
            ],
        );
        let warn = state.call_method("console", "warn", vec![ScriptValue::Undefined]);
        tx.send(log.is_ok() && warn.is_ok()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
}

#[test]
fn test_stats_report_engine_activity() {
    let rt = runtime();
    rt.register_function("answer", |state, _args| {
        let promise = state.create_promise();
        state.fulfill_promise(promise, ScriptValue::Number(42.0));
        Ok(CallOutcome::Promise(promise))
    });
    let _ = block_on(rt.call_async("answer", Vec::new())).unwrap();

    let stats = block_on(rt.stats()).unwrap();
    assert!(stats.jobs_processed >= 2);
    assert!(stats.promises_created >= 1);
    assert!(stats.promises_settled >= 1);
    assert!(stats.microtasks_processed >= 1);
}
