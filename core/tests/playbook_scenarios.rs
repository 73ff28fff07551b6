//! Playbook engine scenarios: step ordering, rollback walk, policy
//! denial, preconditions, and continue-on-failure.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use chimera_core::domain::drift::DriftSeverity;
use chimera_core::domain::events::EventKind;
use chimera_core::domain::playbook::{
    Action, Playbook, PlaybookStep, Precondition, StepStatus,
};
use chimera_core::domain::policy::Policy;
use chimera_core::domain::ports::{BuildPort, EventBusPort, RemoteExecutorPort};
use chimera_core::domain::services::playbook_engine::{
    PlaybookContext, PlaybookEngine, PlaybookOutcome,
};
use chimera_core::infrastructure::event_bus::EventBus;

use common::{node, record_events, FakeBuild, FakeExecutor};

fn step(id: &str, command: &str, rollback: Option<&str>) -> PlaybookStep {
    PlaybookStep {
        id: id.to_string(),
        name: format!("step {id}"),
        action: Action::ExecShell {
            command: command.to_string(),
        },
        params: BTreeMap::new(),
        timeout_seconds: 30,
        rollback: rollback.map(|cmd| Action::ExecShell {
            command: cmd.to_string(),
        }),
        continue_on_failure: false,
    }
}

fn fixture(executor: FakeExecutor) -> (PlaybookEngine, Arc<EventBus>, Arc<FakeExecutor>) {
    let bus = Arc::new(EventBus::new());
    let executor = Arc::new(executor);
    let engine = PlaybookEngine::new(
        Arc::clone(&executor) as Arc<dyn RemoteExecutorPort>,
        FakeBuild::ok("fp-AAA") as Arc<dyn BuildPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
    );
    (engine, bus, executor)
}

fn operator_policy() -> Policy {
    // ExecShell steps authorize against Deploy.
    Policy::with_builtin_roles().bind("op", "operator")
}

#[tokio::test]
async fn test_failure_rolls_back_completed_steps_in_reverse() {
    // Only step c's command fails; the rollback commands succeed.
    let (engine, bus, executor) = fixture(FakeExecutor::new().failing_exec_containing("fail-here"));
    let events = record_events(&bus, &[EventKind::PlaybookRolledBack]);

    let playbook = Playbook::new(
        "pb-s5",
        "three step",
        "1.0.0",
        vec![
            step("a", "touch /tmp/a", Some("rollback-a")),
            step("b", "touch /tmp/b", Some("rollback-b")),
            step("c", "fail-here", Some("rollback-c")),
        ],
    )
    .validate()
    .unwrap();

    let ctx = PlaybookContext::new(node("root@n1:22"), "op");
    let run = engine
        .execute(&playbook, &operator_policy(), &ctx)
        .await
        .unwrap();

    assert_eq!(run.outcome, PlaybookOutcome::RolledBack);
    let statuses: Vec<(String, StepStatus)> = run
        .results
        .iter()
        .map(|r| (r.step_id.clone(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("a".to_string(), StepStatus::Ok),
            ("b".to_string(), StepStatus::Ok),
            ("c".to_string(), StepStatus::Fail),
        ]
    );
    // Reverse order: b rolled back before a; c never completed, so its
    // rollback is not attempted.
    assert_eq!(run.rolled_back_steps, vec!["b".to_string(), "a".to_string()]);
    assert_eq!(events.lock().len(), 1);

    // Rollback actions actually reached the executor, in reverse order.
    let calls = executor.calls();
    let rollback_calls: Vec<&String> = calls
        .iter()
        .filter(|c| c.contains("rollback-"))
        .collect();
    assert_eq!(rollback_calls.len(), 2);
    assert!(rollback_calls[0].contains("rollback-b"));
    assert!(rollback_calls[1].contains("rollback-a"));
}

#[tokio::test]
async fn test_policy_denial_aborts_without_executing() {
    let (engine, bus, executor) = fixture(FakeExecutor::new());
    let events = record_events(&bus, &[EventKind::PlaybookFailed]);

    let playbook = Playbook::new(
        "pb-denied",
        "restricted",
        "1.0.0",
        vec![step("s1", "echo hello", None)],
    )
    .validate()
    .unwrap();

    // viewer lacks Deploy, which ExecShell requires.
    let policy = Policy::with_builtin_roles().bind("alice", "viewer");
    let ctx = PlaybookContext::new(node("root@n1:22"), "alice");
    let run = engine.execute(&playbook, &policy, &ctx).await.unwrap();

    assert_eq!(run.outcome, PlaybookOutcome::Failed);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].status, StepStatus::Denied);
    assert!(executor.calls().is_empty());
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn test_unmet_precondition_skips_playbook() {
    let (engine, bus, executor) = fixture(FakeExecutor::new());
    let events = record_events(&bus, &[EventKind::PlaybookSkipped]);

    let playbook = Playbook::new(
        "pb-preconditions",
        "critical only",
        "1.0.0",
        vec![step("s1", "echo hello", None)],
    )
    .with_preconditions(vec![Precondition::SeverityAtLeast {
        severity: DriftSeverity::Critical,
    }])
    .validate()
    .unwrap();

    let mut ctx = PlaybookContext::new(node("root@n1:22"), "op");
    ctx.severity = Some(DriftSeverity::Low);
    let run = engine
        .execute(&playbook, &operator_policy(), &ctx)
        .await
        .unwrap();

    assert_eq!(run.outcome, PlaybookOutcome::Skipped);
    assert!(run.results.is_empty());
    assert!(executor.calls().is_empty());
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn test_continue_on_failure_keeps_going() {
    let (engine, bus, _executor) = fixture(FakeExecutor::new().failing_exec("n1"));
    let events = record_events(&bus, &[EventKind::PlaybookCompleted]);

    let mut tolerant = step("s1", "flaky command", None);
    tolerant.continue_on_failure = true;
    let playbook = Playbook::new(
        "pb-tolerant",
        "tolerant",
        "1.0.0",
        vec![
            tolerant,
            PlaybookStep {
                action: Action::WaitSeconds { seconds: 1 },
                ..step("s2", "unused", None)
            },
        ],
    )
    .validate()
    .unwrap();

    let ctx = PlaybookContext::new(node("root@n1:22"), "op");
    let run = engine
        .execute(&playbook, &operator_policy(), &ctx)
        .await
        .unwrap();

    assert_eq!(run.outcome, PlaybookOutcome::Completed);
    assert_eq!(run.results[0].status, StepStatus::Fail);
    assert_eq!(run.results[1].status, StepStatus::Ok);
    assert_eq!(events.lock().len(), 1);
}

#[tokio::test]
async fn test_unvalidated_playbook_is_rejected() {
    let (engine, _bus, _executor) = fixture(FakeExecutor::new());
    let playbook = Playbook::new("pb-raw", "raw", "1.0.0", vec![step("s1", "echo", None)]);
    let ctx = PlaybookContext::new(node("root@n1:22"), "op");
    assert!(engine
        .execute(&playbook, &operator_policy(), &ctx)
        .await
        .is_err());
}
