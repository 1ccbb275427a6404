//! Callback dispatch: ordering, injection, panic isolation, and the
//! commander-end collection.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use commandeer::{
    CallbackDescriptor, CallbackEvent, Commander, HandlerCoroutine, Job, NodeState, RuntimeError,
    Value, PLEDGE,
};
use serde_json::json;

type Log = Arc<Mutex<Vec<String>>>;

fn log_cb(log: &Log, label: &'static str) -> CallbackDescriptor {
    let log = Arc::clone(log);
    CallbackDescriptor::sync(move || {
        if let Ok(mut guard) = log.lock() {
            guard.push(label.to_string());
        }
    })
}

#[tokio::test]
async fn callbacks_fire_in_insertion_order_with_injection() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let handler = HandlerCoroutine::from_fn("unit", PLEDGE, |_node| async { Ok(json!("v")) });

    handler.add_callback_functions(
        CallbackEvent::AtHandlerStart,
        [
            log_cb(&log, "first"),
            CallbackDescriptor::new({
                let log = Arc::clone(&log);
                move || {
                    let log = Arc::clone(&log);
                    async move {
                        tokio::task::yield_now().await;
                        if let Ok(mut guard) = log.lock() {
                            guard.push("second".to_string());
                        }
                    }
                }
            }),
            CallbackDescriptor::sync_with_node({
                let log = Arc::clone(&log);
                move |node| {
                    if let Ok(mut guard) = log.lock() {
                        guard.push(format!("third:{}", node.name()));
                    }
                }
            }),
        ],
    );
    handler.add_callback_functions(CallbackEvent::AtHandlerEnd, [log_cb(&log, "end")]);

    handler.wait().await.expect("outcome");
    assert_eq!(
        *log.lock().expect("log"),
        vec!["first", "second", "third:unit", "end"]
    );
}

#[tokio::test]
async fn panicking_callback_is_suppressed() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let handler = HandlerCoroutine::from_fn("sturdy", PLEDGE, |_node| async { Ok(json!(1)) });

    handler.add_callback_functions(
        CallbackEvent::AtHandlerStart,
        [
            CallbackDescriptor::sync(|| panic!("boom")),
            log_cb(&log, "survivor"),
        ],
    );

    let value = handler.wait().await.expect("outcome");
    assert_eq!(value, json!(1));
    assert_eq!(handler.state(), NodeState::Done);
    assert_eq!(*log.lock().expect("log"), vec!["survivor"]);
}

#[test]
fn unknown_event_names_are_rejected() {
    let err = CallbackEvent::from_str("at_midnight").unwrap_err();
    assert!(matches!(
        &err,
        RuntimeError::InvalidCallbackEvent { name } if name == "at_midnight"
    ));
    assert_eq!(err.as_label(), "runtime_invalid_callback_event");

    assert_eq!(
        CallbackEvent::from_str("at_job_end").expect("known"),
        CallbackEvent::AtJobEnd
    );
}

#[test]
fn failing_job_fires_exception_then_end() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let job = Job::from_fn("doomed", PLEDGE, |_node| async {
        Err(commandeer::TaskError::failed("E"))
    });
    job.add_callback_functions(CallbackEvent::AtException, [log_cb(&log, "exception")]);
    job.add_callback_functions(CallbackEvent::AtJobEnd, [log_cb(&log, "end")]);

    let value = Commander::new().run(vec![job.clone()], true).expect("run");

    assert_eq!(*log.lock().expect("log"), vec!["exception", "end"]);
    assert_eq!(job.state(), NodeState::Failed);
    assert_eq!(job.exception(), Some(commandeer::TaskError::failed("E")));
    // A failed drain leaves no top-level result to adopt.
    assert_eq!(value, Value::Null);
}

#[test]
fn commander_end_callbacks_fire_for_scheduled_nodes() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let commander = Commander::new();

    commander
        .node()
        .add_callback_functions(CallbackEvent::AtCommanderEnd, [log_cb(&log, "root")]);

    let job = Job::from_fn("worker", PLEDGE, |_node| async { Ok(json!(1)) });
    job.add_callback_functions(CallbackEvent::AtCommanderEnd, [log_cb(&log, "worker")]);

    commander.run(vec![job], true).expect("run");
    assert_eq!(*log.lock().expect("log"), vec!["root", "worker"]);
}

#[test]
fn callback_exception_does_not_alter_node_state() {
    let job = Job::from_fn("steady", PLEDGE, |_node| async { Ok(json!("ok")) });
    job.add_callback_functions(
        CallbackEvent::AtJobEnd,
        [CallbackDescriptor::sync(|| panic!("end-cb"))],
    );

    let value = Commander::new().run(vec![job.clone()], true).expect("run");
    assert_eq!(job.state(), NodeState::Done);
    assert_eq!(value, json!("ok"));
}
