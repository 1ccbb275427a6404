//! Commander loop behavior: run/exit lifecycle, ordering, emptiness, and
//! the threadsafe bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use commandeer::{
    CallbackDescriptor, CallbackEvent, Commander, Config, HandlerCoroutine, Job, NodeId,
    NodeState, RuntimeError, TaskError, Value, PLEDGE,
};
use serde_json::json;

fn echo_job(value: i64) -> Job {
    Job::from_fn("echo", PLEDGE, move |_node| async move { Ok(json!(value)) })
}

/// A job whose body spins (cooperatively) until released.
fn gated_job(release: &Arc<AtomicBool>) -> Job {
    let release = Arc::clone(release);
    Job::from_fn("gated", PLEDGE, move |_node| {
        let release = Arc::clone(&release);
        async move {
            while !release.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Ok(Value::Null)
        }
    })
}

fn spawn_run(
    commander: &Commander,
    jobs: Vec<Job>,
    auto_exit: bool,
) -> thread::JoinHandle<Result<Value, RuntimeError>> {
    let commander = commander.clone();
    thread::spawn(move || commander.run(jobs, auto_exit))
}

fn wait_until(condition: impl Fn() -> bool) {
    while !condition() {
        thread::yield_now();
    }
}

#[test]
fn echo_job_runs_to_completion() {
    let commander = Commander::new();
    assert!(commander.is_empty());

    let job = echo_job(42);
    let value = commander.run(vec![job.clone()], true).expect("run");

    assert_eq!(value, json!(42));
    assert_eq!(job.result(), json!(42));
    assert_eq!(job.state(), NodeState::Done);
    assert!(commander.is_empty());
    assert!(!commander.running_status());
}

#[test]
fn run_twice_is_rejected() {
    let commander = Commander::new();
    let release = Arc::new(AtomicBool::new(false));
    let runner = spawn_run(&commander, vec![gated_job(&release)], true);

    wait_until(|| commander.running_status());
    let err = commander.run(vec![echo_job(1)], true).unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyRunning));

    release.store(true, Ordering::SeqCst);
    runner.join().expect("join").expect("first run");
    assert!(!commander.running_status());
}

#[test]
fn submissions_require_a_running_loop() {
    let commander = Commander::new();
    let err = commander.put_job_threadsafe(&echo_job(1)).unwrap_err();
    assert!(matches!(err, RuntimeError::NotRunning));

    let handler = HandlerCoroutine::from_fn("h", PLEDGE, |_| async { Ok(Value::Null) });
    let err = commander.call_handler_threadsafe(&handler).unwrap_err();
    assert!(matches!(err, RuntimeError::NotRunning));
}

#[tokio::test]
async fn put_job_requires_a_running_loop() {
    let commander = Commander::new();
    let err = commander.put_job(&echo_job(1)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotRunning));
}

#[test]
fn exit_returns_supplied_value_and_waits() {
    let commander = Commander::new();
    let runner = spawn_run(&commander, vec![], false);

    wait_until(|| commander.running_status());
    commander.exit(json!("bye"), true);
    assert!(!commander.running_status());

    let value = runner.join().expect("join").expect("run");
    assert_eq!(value, json!("bye"));
}

#[test]
fn wait_for_exit_on_idle_commander_returns_immediately() {
    let commander = Commander::new();
    assert_eq!(commander.wait_for_exit(), Value::Null);
}

#[test]
fn threadsafe_submission_from_foreign_thread() {
    let commander = Commander::new();
    let runner = spawn_run(&commander, vec![], false);
    wait_until(|| commander.running_status());

    let flag = Arc::new(AtomicBool::new(false));
    let job = {
        let flag = Arc::clone(&flag);
        Job::from_fn("flagger", PLEDGE, move |_node| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
    };

    let waiter = {
        let commander = commander.clone();
        thread::spawn(move || commander.wait_for_exit())
    };

    commander.put_job_threadsafe(&job).expect("accepted");
    wait_until(|| commander.is_empty());
    assert!(flag.load(Ordering::SeqCst));

    commander.exit(json!(7), true);
    assert_eq!(waiter.join().expect("join"), json!(7));
    assert_eq!(runner.join().expect("join").expect("run"), json!(7));
}

#[test]
fn run_auto_starts_loop_when_idle() {
    let commander = Commander::new();
    let job = echo_job(9);
    let value = commander.run_auto(vec![job.clone()], true).expect("run_auto");
    assert_eq!(value, Some(json!(9)));
    assert_eq!(job.state(), NodeState::Done);
}

#[test]
fn run_auto_delegates_to_running_loop() {
    let commander = Commander::new();
    let release = Arc::new(AtomicBool::new(false));
    let runner = spawn_run(&commander, vec![gated_job(&release)], true);
    wait_until(|| commander.running_status());

    let second = echo_job(5);
    let outcome = commander.run_auto(vec![second.clone()], true).expect("run_auto");
    assert!(outcome.is_none());

    wait_until(|| second.is_terminal());
    release.store(true, Ordering::SeqCst);
    runner.join().expect("join").expect("run");
    assert_eq!(second.result(), json!(5));
}

#[test]
fn jobs_dequeue_in_submission_order() {
    let commander = Commander::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let jobs: Vec<Job> = (1..=5)
        .map(|index| {
            let order = Arc::clone(&order);
            Job::from_fn("ordered", PLEDGE, move |_node| {
                let order = Arc::clone(&order);
                async move {
                    if let Ok(mut guard) = order.lock() {
                        guard.push(index);
                    }
                    Ok(Value::Null)
                }
            })
        })
        .collect();

    commander.run(jobs, true).expect("run");
    assert_eq!(*order.lock().expect("order"), vec![1, 2, 3, 4, 5]);
}

#[test]
fn body_can_exit_the_commander() {
    let commander = Commander::new();
    let job = Job::from_fn("quitter", PLEDGE, |node| async move {
        node.exit_commander(json!("from-body"))
            .map_err(TaskError::failed)?;
        Ok(Value::Null)
    });

    let value = commander.run(vec![job], false).expect("run");
    assert_eq!(value, json!("from-body"));
}

#[test]
fn scheduled_nodes_get_sequence_ids() {
    let job = echo_job(1);
    assert_eq!(job.id(), None);
    Commander::new().run(vec![job.clone()], true).expect("run");
    assert!(matches!(job.id(), Some(NodeId::Seq(_))));
}

#[test]
fn named_nodes_keep_their_name() {
    let job = echo_job(1);
    job.set_id("bootstrap");
    Commander::new().run(vec![job.clone()], true).expect("run");
    assert_eq!(job.id(), Some(NodeId::Name("bootstrap".into())));
}

#[test]
fn top_level_jobs_are_parented_to_the_commander() {
    let commander = Commander::new();
    let seen = Arc::new(Mutex::new(None));
    let job = echo_job(3);
    job.add_callback_functions(
        CallbackEvent::AtJobStart,
        [CallbackDescriptor::sync_with_node({
            let seen = Arc::clone(&seen);
            move |node| {
                let chain: Vec<String> = node.ancestor_chain().iter().map(|n| n.name()).collect();
                if let Ok(mut guard) = seen.lock() {
                    *guard = Some(chain);
                }
            }
        })],
    );

    commander.run(vec![job], true).expect("run");
    assert_eq!(
        seen.lock().expect("seen").clone(),
        Some(vec!["commander".to_string()])
    );
}

#[test]
fn shutdown_grace_is_bounded() {
    let cfg = Config {
        queue_capacity: 0,
        grace: Duration::from_millis(100),
    };
    let commander = Commander::with_config(cfg);

    let slow = HandlerCoroutine::from_fn("slow", PLEDGE, |_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Value::Null)
    });
    // A terminate callback that never finishes keeps the node from draining.
    slow.add_callback_functions(
        CallbackEvent::AtTerminate,
        [CallbackDescriptor::new(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })],
    );

    let starter = {
        let slow = slow.clone();
        Job::from_fn("starter", PLEDGE, move |node| {
            let slow = slow.clone();
            async move {
                node.call_handler(&slow).map_err(TaskError::failed)?;
                Ok(Value::Null)
            }
        })
    };

    let runner = spawn_run(&commander, vec![starter], false);
    wait_until(|| slow.state() == NodeState::Running);
    commander.exit(Value::Null, true);

    let result = runner.join().expect("join");
    match result {
        Err(RuntimeError::GraceExceeded { stuck, .. }) => {
            assert!(stuck.contains(&"slow".to_string()));
        }
        other => panic!("expected GraceExceeded, got {other:?}"),
    }
}
