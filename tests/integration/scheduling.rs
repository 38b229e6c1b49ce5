//! Scheduling behaviour of the worker pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crew::core::task::{TaskId, TaskStatus};
use crew::Error;

use crate::fixtures::{pool_with, wait_all, wait_for_status, Script, ScriptedAgent, TEST_TIMEOUT};

/// Given a ceiling of 1 and two eligible tasks with priorities 1 and 5
/// Then the priority-5 task starts first
#[tokio::test]
async fn test_higher_priority_starts_first() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(1, &agent);

    pool.spawn("low priority", 1, &[]).unwrap();
    pool.spawn("high priority", 5, &[]).unwrap();
    wait_all(&pool).await;

    assert_eq!(agent.started(), vec!["high priority", "low priority"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ceiling_limits_running_workers() {
    let agent = ScriptedAgent::new();
    let gates: Vec<Arc<Notify>> = (0..3).map(|_| Arc::new(Notify::new())).collect();
    for (i, gate) in gates.iter().enumerate() {
        agent.script(&format!("gated {}", i), Script::Gate(gate.clone()));
    }
    let pool = pool_with(2, &agent);

    let ids: Vec<TaskId> = (0..3)
        .map(|i| pool.spawn(&format!("gated {}", i), 1, &[]).unwrap())
        .collect();

    wait_for_status(&pool, ids[0], TaskStatus::Running).await;
    wait_for_status(&pool, ids[1], TaskStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(pool.active_count(), 2);
    assert_eq!(pool.get_status(&ids[2]).unwrap().status, TaskStatus::Pending);

    for gate in &gates {
        gate.notify_one();
    }
    let results = wait_all(&pool).await;

    assert!(results.values().all(|r| r.status == TaskStatus::Completed));
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_unknown_dependency_rejected() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(2, &agent);

    let err = pool
        .spawn("needs ghost", 1, &[TaskId::from_seq(7)])
        .unwrap_err();

    assert!(matches!(err, Error::UnknownDependency(_)));
    assert!(pool.get_workers().is_empty());
}

/// A task can only name tasks that already exist, so the only edge that
/// can close a cycle is one onto the task being admitted.
#[tokio::test]
async fn test_self_reference_rejected() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(2, &agent);

    let a = pool.spawn("a", 1, &[]).unwrap();
    let b = pool.spawn("b", 1, &[a]).unwrap();
    let err = pool.spawn("c", 1, &[b, TaskId::from_seq(2)]).unwrap_err();

    assert!(matches!(err, Error::DependencyCycle { .. }));
    assert_eq!(pool.get_workers().len(), 2);
}

#[tokio::test]
async fn test_empty_description_rejected() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(2, &agent);
    assert!(matches!(pool.spawn("", 1, &[]), Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_ids_are_distinct() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(4, &agent);

    let ids: HashSet<TaskId> = (0..50)
        .map(|i| pool.spawn(&format!("task {}", i), i % 3, &[]).unwrap())
        .collect();

    assert_eq!(ids.len(), 50);
    wait_all(&pool).await;
}

/// Given B fails and A depends on B
/// Then A ends blocked and never runs
#[tokio::test]
async fn test_failed_dependency_blocks_dependent() {
    let agent = ScriptedAgent::new();
    agent.script("b", Script::Fail("exploit did not land".to_string()));
    let pool = pool_with(2, &agent);

    let b = pool.spawn("b", 1, &[]).unwrap();
    let a = pool.spawn("a", 1, &[b]).unwrap();
    let results = wait_all(&pool).await;

    assert_eq!(results[&b].status, TaskStatus::Failed);
    assert_eq!(results[&b].error.as_deref(), Some("exploit did not land"));
    assert_eq!(results[&b].tools_used, vec!["echo"]);

    assert_eq!(results[&a].status, TaskStatus::Blocked);
    assert!(results[&a].tools_used.is_empty());
    assert!(results[&a].result.is_none());
    assert!(!agent.started().contains(&"a".to_string()));
}

#[tokio::test]
async fn test_dependency_completes_before_dependent_starts() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(4, &agent);

    let scan = pool.spawn("scan", 1, &[]).unwrap();
    let report = pool.spawn("report", 9, &[scan]).unwrap();
    let results = wait_all(&pool).await;

    assert_eq!(agent.started(), vec!["scan", "report"]);
    let scan_done = results[&scan].finished_at.unwrap();
    let report_started = results[&report].started_at.unwrap();
    assert!(scan_done <= report_started);
}

#[tokio::test]
async fn test_wait_for_empty_returns_immediately() {
    let agent = ScriptedAgent::new();
    let gate = Arc::new(Notify::new());
    agent.script("slow", Script::Gate(gate.clone()));
    let pool = pool_with(1, &agent);
    pool.spawn("slow", 1, &[]).unwrap();

    let results = tokio::time::timeout(Duration::from_millis(100), pool.wait_for(Some(&[])))
        .await
        .expect("empty wait should not block");
    assert!(results.is_empty());

    gate.notify_one();
    wait_all(&pool).await;
}

#[tokio::test]
async fn test_wait_for_terminal_ids_launches_nothing() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(2, &agent);

    let id = pool.spawn("once", 1, &[]).unwrap();
    wait_all(&pool).await;
    let started_before = agent.started().len();

    let results = tokio::time::timeout(Duration::from_millis(100), pool.wait_for(Some(&[id])))
        .await
        .expect("terminal wait should not block");

    assert_eq!(results[&id].status, TaskStatus::Completed);
    assert_eq!(results[&id].result.as_deref(), Some("result for once"));
    assert_eq!(agent.started().len(), started_before);
}

#[tokio::test]
async fn test_wait_for_omits_unknown_ids() {
    let agent = ScriptedAgent::new();
    let pool = pool_with(2, &agent);

    let id = pool.spawn("known", 1, &[]).unwrap();
    let results = tokio::time::timeout(
        TEST_TIMEOUT,
        pool.wait_for(Some(&[id, TaskId::from_seq(99)])),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results.contains_key(&id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_waiters_are_all_released() {
    let agent = ScriptedAgent::new();
    let gate = Arc::new(Notify::new());
    agent.script("shared", Script::Gate(gate.clone()));
    let pool = pool_with(2, &agent);

    let id = pool.spawn("shared", 1, &[]).unwrap();
    let other = pool.spawn("other", 1, &[]).unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    pool.wait_for(Some(&[id])).await
                } else {
                    pool.wait_for(None).await
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.notify_one();

    for waiter in waiters {
        let results = tokio::time::timeout(TEST_TIMEOUT, waiter)
            .await
            .expect("waiter starved")
            .unwrap();
        assert_eq!(results[&id].status, TaskStatus::Completed);
        assert_eq!(results[&id].result.as_deref(), Some("released"));
        if let Some(other_record) = results.get(&other) {
            assert!(other_record.is_terminal());
        }
    }
}

#[tokio::test]
async fn test_panicking_agent_recorded_as_failure() {
    let agent = ScriptedAgent::new();
    agent.script("explodes", Script::Panic);
    let pool = pool_with(2, &agent);

    let bad = pool.spawn("explodes", 1, &[]).unwrap();
    let good = pool.spawn("fine", 1, &[]).unwrap();
    let results = wait_all(&pool).await;

    assert_eq!(results[&bad].status, TaskStatus::Failed);
    assert!(results[&bad]
        .error
        .as_deref()
        .unwrap()
        .contains("scripted panic in explodes"));
    assert_eq!(results[&good].status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_get_status_does_not_wait() {
    let agent = ScriptedAgent::new();
    let gate = Arc::new(Notify::new());
    agent.script("parked", Script::Gate(gate.clone()));
    let pool = pool_with(1, &agent);

    let id = pool.spawn("parked", 1, &[]).unwrap();
    let running = wait_for_status(&pool, id, TaskStatus::Running).await;
    assert!(running.started_at.is_some());
    assert!(running.result.is_none());

    gate.notify_one();
    let done = wait_for_status(&pool, id, TaskStatus::Completed).await;
    assert_eq!(done.result.as_deref(), Some("released"));
    assert_eq!(done.tools_used, vec!["echo"]);
}

#[tokio::test]
async fn test_spawn_while_waiting_for_all() {
    let agent = ScriptedAgent::new();
    let gate = Arc::new(Notify::new());
    agent.script("first", Script::Gate(gate.clone()));
    let pool = pool_with(2, &agent);

    pool.spawn("first", 1, &[]).unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.wait_for(None).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let late = pool.spawn("late", 1, &[]).unwrap();
    gate.notify_one();

    let results = tokio::time::timeout(TEST_TIMEOUT, waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[&late].status, TaskStatus::Completed);
}
