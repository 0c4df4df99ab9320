//! Integration tests for the task scheduler
//!
//! Covers the critical-path scenario, exactly-once execution, and
//! failure blocking.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use monorail::core::diagnostics::DisplayMode;
use monorail::core::scheduler::{
    TaskContext, TaskOutcome, TaskRunner, TaskScheduler, TaskStatus,
};
use monorail::error::SchedulerError;

struct CountingRunner {
    name: String,
    starts: Arc<Mutex<Vec<String>>>,
    outcome: fn() -> TaskOutcome,
}

#[async_trait]
impl TaskRunner for CountingRunner {
    async fn run(&self, _ctx: TaskContext) -> TaskOutcome {
        self.starts.lock().unwrap().push(self.name.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        (self.outcome)()
    }
}

fn runner(
    name: &str,
    starts: &Arc<Mutex<Vec<String>>>,
    outcome: fn() -> TaskOutcome,
) -> Arc<dyn TaskRunner> {
    Arc::new(CountingRunner {
        name: name.to_string(),
        starts: Arc::clone(starts),
        outcome,
    })
}

/// Scenario: T1->T3, T2->T3, T3->T5, T4->T5 with parallelism 2
#[tokio::test]
async fn test_critical_path_scenario() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = TaskScheduler::new(2, DisplayMode::Local).quiet();
    for name in ["t1", "t2", "t3", "t4", "t5"] {
        scheduler
            .add_task(name, runner(name, &starts, || TaskOutcome::Success))
            .unwrap();
    }
    scheduler.add_dependencies("t3", &["t1", "t2"]).unwrap();
    scheduler.add_dependencies("t5", &["t3", "t4"]).unwrap();

    scheduler.execute().await.unwrap();

    let cpl = scheduler.critical_path_lengths();
    assert_eq!(cpl["t5"], 0);
    assert_eq!(cpl["t3"], 1);
    assert_eq!(cpl["t4"], 1);
    assert_eq!(cpl["t1"], 2);
    assert_eq!(cpl["t2"], 2);

    let order = starts.lock().unwrap().clone();
    let first_two: HashSet<&str> = order[..2].iter().map(String::as_str).collect();
    assert_eq!(
        first_two,
        HashSet::from(["t1", "t2"]),
        "the deepest tasks claim the two slots first"
    );
}

#[tokio::test]
async fn test_every_eligible_node_runs_exactly_once() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = TaskScheduler::new(3, DisplayMode::Local).quiet();
    let names = ["a", "b", "c", "d", "e", "f"];
    for name in names {
        scheduler
            .add_task(name, runner(name, &starts, || TaskOutcome::Success))
            .unwrap();
    }
    scheduler.add_dependencies("c", &["a", "b"]).unwrap();
    scheduler.add_dependencies("d", &["c"]).unwrap();
    scheduler.add_dependencies("e", &["c"]).unwrap();
    scheduler.add_dependencies("f", &["d", "e"]).unwrap();

    scheduler.execute().await.unwrap();

    let order = starts.lock().unwrap().clone();
    assert_eq!(order.len(), names.len());
    let unique: HashSet<&String> = order.iter().collect();
    assert_eq!(unique.len(), names.len(), "no task ran twice");
    for name in names {
        assert_eq!(scheduler.status_of(name), Some(TaskStatus::Success));
    }
}

#[tokio::test]
async fn test_descendants_of_failure_blocked_exactly_once() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = TaskScheduler::new(4, DisplayMode::Local).quiet();
    scheduler
        .add_task("root", runner("root", &starts, || TaskOutcome::Failure(Vec::new())))
        .unwrap();
    for name in ["mid1", "mid2", "leaf", "bystander"] {
        scheduler
            .add_task(name, runner(name, &starts, || TaskOutcome::Success))
            .unwrap();
    }
    scheduler.add_dependencies("mid1", &["root"]).unwrap();
    scheduler.add_dependencies("mid2", &["root"]).unwrap();
    // leaf descends from the failure through both mids; it must still be
    // counted blocked once
    scheduler.add_dependencies("leaf", &["mid1", "mid2"]).unwrap();

    let err = scheduler.execute().await.unwrap_err();
    match err {
        SchedulerError::TasksFailed { failed, blocked } => {
            assert_eq!(failed, 1);
            assert_eq!(blocked, 3, "mid1, mid2, leaf");
        }
        other => panic!("expected TasksFailed, got {other}"),
    }
    assert_eq!(scheduler.status_of("bystander"), Some(TaskStatus::Success));
    assert_eq!(scheduler.status_of("leaf"), Some(TaskStatus::Blocked));

    let order = starts.lock().unwrap().clone();
    assert!(!order.iter().any(|n| n.starts_with("mid") || n == "leaf"));
}

#[tokio::test]
async fn test_parallelism_bound_is_respected() {
    struct GaugeRunner {
        active: Arc<Mutex<(usize, usize)>>,
    }

    #[async_trait]
    impl TaskRunner for GaugeRunner {
        async fn run(&self, _ctx: TaskContext) -> TaskOutcome {
            {
                let mut gauge = self.active.lock().unwrap();
                gauge.0 += 1;
                gauge.1 = gauge.1.max(gauge.0);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.lock().unwrap().0 -= 1;
            TaskOutcome::Success
        }
    }

    let active = Arc::new(Mutex::new((0usize, 0usize)));
    let mut scheduler = TaskScheduler::new(2, DisplayMode::Local).quiet();
    for i in 0..6 {
        scheduler
            .add_task(
                &format!("task{i}"),
                Arc::new(GaugeRunner {
                    active: Arc::clone(&active),
                }),
            )
            .unwrap();
    }
    scheduler.execute().await.unwrap();

    let peak = active.lock().unwrap().1;
    assert!(peak <= 2, "at most two tasks in flight, saw {peak}");
}
