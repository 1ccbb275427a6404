//! Edge helpers: chains, conditional routing, and cyclic graphs over the
//! tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use commandeer::{
    add_conditional_edge, add_edge, shared_data, CallbackDescriptor, CallbackEvent, Commander,
    HandlerCoroutine, Job, NodeState, TaskNode, Value, PLEDGE,
};
use serde_json::json;

/// Appends `name` to `nodes` and bumps `count` in the shared data slot.
fn record(node: &TaskNode, name: &str) {
    node.with_data(|value| {
        if let Some(nodes) = value["nodes"].as_array_mut() {
            nodes.push(json!(name));
        }
        let count = value["count"].as_i64().unwrap_or(0);
        value["count"] = json!(count + 1);
    });
}

fn count_of(node: &TaskNode) -> i64 {
    node.with_data(|value| value["count"].as_i64().unwrap_or(0))
        .unwrap_or(0)
}

fn job_1() -> Job {
    Job::from_fn("job-1", PLEDGE, |node| async move {
        record(&node, "job_1");
        Ok(Value::Null)
    })
}

fn job_2() -> Job {
    Job::from_fn("job-2", PLEDGE, |node| async move {
        record(&node, "job_2");
        let next = if count_of(&node) % 3 == 0 {
            "job_1"
        } else {
            "handler_1"
        };
        Ok(json!(next))
    })
}

fn handler_1() -> HandlerCoroutine {
    HandlerCoroutine::from_fn("handler-1", PLEDGE, |node| async move {
        record(&node, "handler_1");
        let next = if count_of(&node) > 4 {
            "handler_2"
        } else {
            "job_2"
        };
        Ok(json!(next))
    })
}

fn handler_2() -> HandlerCoroutine {
    HandlerCoroutine::from_fn("handler-2", PLEDGE, |node| async move {
        record(&node, "handler_2");
        Ok(Value::Null)
    })
}

fn recorded_nodes(data: &commandeer::SharedData) -> Vec<String> {
    data.lock()
        .expect("data")["nodes"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[test]
fn simple_edges_chain_in_order() {
    let commander = Commander::new();
    let data = shared_data(json!({ "count": 0, "nodes": [] }));

    let (job_1, handler_1, job_2, handler_2) = (job_1(), handler_1(), job_2(), handler_2());
    job_1.set_data(data.clone());
    add_edge(&job_1, &handler_1, Some(data.clone()));
    add_edge(&handler_1, &job_2, Some(data.clone()));
    add_edge(&job_2, &handler_2, Some(data.clone()));

    commander.run(vec![job_1], true).expect("run");

    assert_eq!(
        recorded_nodes(&data),
        vec!["job_1", "handler_1", "job_2", "handler_2"]
    );
    assert_eq!(data.lock().expect("data")["count"], json!(4));
}

#[test]
fn conditional_edges_route_through_a_cycle() {
    let commander = Commander::new();
    let data = shared_data(json!({ "count": 0, "nodes": [] }));

    let (job_1, handler_1, job_2, handler_2) = (job_1(), handler_1(), job_2(), handler_2());
    let map: HashMap<String, TaskNode> = [
        ("job_1".to_string(), job_1.task_node().clone()),
        ("job_2".to_string(), job_2.task_node().clone()),
        ("handler_1".to_string(), handler_1.task_node().clone()),
        ("handler_2".to_string(), handler_2.task_node().clone()),
    ]
    .into_iter()
    .collect();

    job_1.set_data(data.clone());
    add_edge(&job_1, &handler_1, Some(data.clone()));
    add_conditional_edge(&handler_1, map.clone(), Some(data.clone()));
    add_conditional_edge(&job_2, map, Some(data.clone()));

    commander.run(vec![job_1], true).expect("run");

    assert_eq!(
        recorded_nodes(&data),
        vec!["job_1", "handler_1", "job_2", "job_1", "handler_1", "handler_2"]
    );
    assert_eq!(data.lock().expect("data")["count"], json!(6));
}

#[test]
fn conditional_edge_ignores_unknown_results() {
    let commander = Commander::new();
    let first = Job::from_fn("first", PLEDGE, |_node| async { Ok(json!("missing")) });
    let second = Job::from_fn("second", PLEDGE, |_node| async { Ok(json!("ran")) });

    let map: HashMap<String, TaskNode> =
        [("known".to_string(), second.task_node().clone())].into_iter().collect();
    add_conditional_edge(&first, map, None);

    commander.run(vec![first.clone()], true).expect("run");
    assert_eq!(first.state(), NodeState::Done);
    assert_eq!(second.state(), NodeState::Pending);
}

#[test]
fn edge_successor_is_parented_to_the_commander() {
    let commander = Commander::new();
    let a = Job::from_fn("a", PLEDGE, |_node| async { Ok(Value::Null) });
    let b = Job::from_fn("b", PLEDGE, |_node| async { Ok(Value::Null) });

    let starts = Arc::new(Mutex::new(Vec::new()));
    b.add_callback_functions(
        CallbackEvent::AtJobStart,
        [CallbackDescriptor::sync_with_node({
            let starts = Arc::clone(&starts);
            move |node| {
                if let Ok(mut guard) = starts.lock() {
                    guard.push(node.parent().map(|p| p.name()));
                }
            }
        })],
    );

    add_edge(&a, &b, None);
    commander.run(vec![a], true).expect("run");

    assert_eq!(
        *starts.lock().expect("starts"),
        vec![Some("commander".to_string())]
    );
    assert_eq!(b.state(), NodeState::Done);
}

#[test]
fn edge_chain_fires_callbacks_in_order() {
    let commander = Commander::new();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let log_cb = |label: &'static str| {
        let log = Arc::clone(&log);
        CallbackDescriptor::sync(move || {
            if let Ok(mut guard) = log.lock() {
                guard.push(label.to_string());
            }
        })
    };

    let a = Job::from_fn("a", PLEDGE, |_node| async { Ok(json!("a")) });
    let b = Job::from_fn("b", PLEDGE, |_node| async { Ok(json!("b")) });
    a.add_callback_functions(CallbackEvent::AtJobStart, [log_cb("start:a")]);
    a.add_callback_functions(CallbackEvent::AtJobEnd, [log_cb("end:a")]);
    b.add_callback_functions(CallbackEvent::AtJobStart, [log_cb("start:b")]);
    b.add_callback_functions(CallbackEvent::AtJobEnd, [log_cb("end:b")]);
    commander
        .node()
        .add_callback_functions(CallbackEvent::AtCommanderEnd, [log_cb("commander-end")]);

    add_edge(&a, &b, None);
    commander.run(vec![a], true).expect("run");

    assert_eq!(
        *log.lock().expect("log"),
        vec!["start:a", "end:a", "start:b", "end:b", "commander-end"]
    );
}
