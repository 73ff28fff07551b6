//! End-to-end deploy and rollback scenarios over in-memory fakes.

mod common;

use std::sync::Arc;

use chimera_core::application::deploy_fleet::DeployFleet;
use chimera_core::application::execute_local::ExecuteLocalDeployment;
use chimera_core::application::rollback::RollbackDeployment;
use chimera_core::application::NodeOutcome;
use chimera_core::domain::deployment::DeploymentStatus;
use chimera_core::domain::events::EventKind;
use chimera_core::domain::ports::{EventBusPort, RemoteExecutorPort, SessionPort};
use chimera_core::domain::session::ConfigPath;
use chimera_core::infrastructure::config::OperationTimeouts;
use chimera_core::infrastructure::event_bus::EventBus;

use common::{fingerprint, node, record_events, FakeBuild, FakeExecutor, FakeSessions};

fn deploy_fixture(executor: FakeExecutor) -> (DeployFleet, Arc<EventBus>, Arc<FakeExecutor>) {
    let bus = Arc::new(EventBus::new());
    let executor = Arc::new(executor);
    let deploy = DeployFleet::new(
        FakeBuild::ok("fp-AAA"),
        Arc::clone(&executor) as Arc<dyn RemoteExecutorPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
        OperationTimeouts::default(),
    );
    (deploy, bus, executor)
}

#[tokio::test]
async fn test_happy_path_deploy_completes_on_all_nodes() {
    let (deploy, bus, _executor) = deploy_fixture(FakeExecutor::new());
    let events = record_events(
        &bus,
        &[
            EventKind::DeploymentStarted,
            EventKind::BuildCompleted,
            EventKind::DeploymentCompleted,
            EventKind::DeploymentFailed,
        ],
    );

    let targets = [node("root@n1:22"), node("root@n2:22")];
    let outcome = deploy
        .execute(&ConfigPath::new("./default.nix"), "echo ok", "chimera", &targets)
        .await
        .unwrap();

    assert_eq!(outcome.status, DeploymentStatus::Completed);
    assert_eq!(outcome.fingerprint, Some(fingerprint("fp-AAA")));
    assert_eq!(
        outcome.outcomes,
        vec![
            (node("root@n1:22"), NodeOutcome::Ok),
            (node("root@n2:22"), NodeOutcome::Ok),
        ]
    );

    let kinds: Vec<EventKind> = events.lock().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::DeploymentStarted,
            EventKind::BuildCompleted,
            EventKind::DeploymentCompleted,
        ]
    );
}

#[tokio::test]
async fn test_partial_sync_failure_still_completes() {
    let (deploy, _bus, executor) = deploy_fixture(FakeExecutor::new().failing_sync("n2"));

    let targets = [node("root@n1:22"), node("root@n2:22")];
    let outcome = deploy
        .execute(&ConfigPath::new("./default.nix"), "echo ok", "chimera", &targets)
        .await
        .unwrap();

    assert_eq!(outcome.status, DeploymentStatus::Completed);
    assert_eq!(outcome.succeeded_nodes(), 1);
    assert_eq!(outcome.outcomes[0], (node("root@n1:22"), NodeOutcome::Ok));
    match &outcome.outcomes[1] {
        (n, NodeOutcome::Fail(reason)) => {
            assert_eq!(n, &node("root@n2:22"));
            assert!(reason.starts_with("sync"));
        }
        other => panic!("expected sync failure on n2, got {other:?}"),
    }

    // The failed node must not receive the command.
    let execs: Vec<String> = executor
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("exec"))
        .collect();
    assert!(execs.iter().all(|c| c.contains("n1")));
}

#[tokio::test]
async fn test_all_sync_failures_fail_the_deployment() {
    let (deploy, bus, executor) =
        deploy_fixture(FakeExecutor::new().failing_sync("n1").failing_sync("n2"));
    let events = record_events(
        &bus,
        &[EventKind::DeploymentCompleted, EventKind::DeploymentFailed],
    );

    let targets = [node("root@n1:22"), node("root@n2:22")];
    let outcome = deploy
        .execute(&ConfigPath::new("./default.nix"), "echo ok", "chimera", &targets)
        .await
        .unwrap();

    assert_eq!(outcome.status, DeploymentStatus::Failed);
    assert_eq!(outcome.succeeded_nodes(), 0);
    assert_eq!(outcome.outcomes.len(), 2);

    let kinds: Vec<EventKind> = events.lock().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::DeploymentFailed]);

    // No exec is attempted when every sync failed.
    assert!(executor.calls().iter().all(|c| !c.starts_with("exec")));
}

#[tokio::test]
async fn test_build_failure_covers_every_target() {
    let bus = Arc::new(EventBus::new());
    let executor = Arc::new(FakeExecutor::new());
    let deploy = DeployFleet::new(
        FakeBuild::failing("syntax error in module"),
        Arc::clone(&executor) as Arc<dyn RemoteExecutorPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
        OperationTimeouts::default(),
    );
    let events = record_events(&bus, &[EventKind::DeploymentFailed]);

    let targets = [node("root@n1:22"), node("root@n2:22")];
    let outcome = deploy
        .execute(&ConfigPath::new("./broken.nix"), "echo ok", "chimera", &targets)
        .await
        .unwrap();

    assert_eq!(outcome.status, DeploymentStatus::Failed);
    assert_eq!(outcome.outcomes.len(), 2);
    assert!(outcome.outcomes.iter().all(|(_, o)| !o.is_ok()));
    assert_eq!(events.lock().len(), 1);
    // Nothing was synced or executed.
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_empty_targets_is_a_validation_error() {
    let (deploy, _bus, _executor) = deploy_fixture(FakeExecutor::new());
    let err = deploy
        .execute(&ConfigPath::new("./default.nix"), "echo ok", "chimera", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("validation"));
}

#[tokio::test]
async fn test_local_deployment_drives_the_full_lifecycle() {
    let bus = Arc::new(EventBus::new());
    let sessions = Arc::new(FakeSessions::default());
    let local = ExecuteLocalDeployment::new(
        FakeBuild::ok("fp-AAA"),
        Arc::clone(&sessions) as Arc<dyn SessionPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
        OperationTimeouts::default(),
    );
    let events = record_events(
        &bus,
        &[
            EventKind::DeploymentStarted,
            EventKind::BuildCompleted,
            EventKind::DeploymentCompleted,
        ],
    );

    let session_id = local
        .execute(&ConfigPath::new("./default.nix"), "server --port 80", "web")
        .await
        .unwrap();

    assert_eq!(session_id.as_str(), "web");
    let kinds: Vec<EventKind> = events.lock().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::DeploymentStarted,
            EventKind::BuildCompleted,
            EventKind::DeploymentCompleted,
        ]
    );

    let calls = sessions.calls.lock().clone();
    assert_eq!(calls[0], "create web");
    assert!(calls[1].starts_with("run web"));
}

#[tokio::test]
async fn test_local_deployment_build_failure_publishes_failed() {
    let bus = Arc::new(EventBus::new());
    let sessions = Arc::new(FakeSessions::default());
    let local = ExecuteLocalDeployment::new(
        FakeBuild::failing("missing input"),
        Arc::clone(&sessions) as Arc<dyn SessionPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
        OperationTimeouts::default(),
    );
    let events = record_events(&bus, &[EventKind::DeploymentFailed]);

    let err = local
        .execute(&ConfigPath::new("./broken.nix"), "server", "web")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing input"));
    assert_eq!(events.lock().len(), 1);
    // The session is never touched when the build fails.
    assert!(sessions.calls.lock().is_empty());
}

#[tokio::test]
async fn test_rollback_returns_result_for_every_target() {
    let bus = Arc::new(EventBus::new());
    let executor = Arc::new(FakeExecutor::new().failing_rollback("n2"));
    let rollback = RollbackDeployment::new(
        Arc::clone(&executor) as Arc<dyn RemoteExecutorPort>,
        Arc::clone(&bus) as Arc<dyn EventBusPort>,
        OperationTimeouts::default(),
    );
    let events = record_events(&bus, &[EventKind::DeploymentRolledBack]);

    let targets = [node("root@n1:22"), node("root@n2:22"), node("root@n3:22")];
    let outcomes = rollback.execute(&targets, Some(12)).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].1.is_ok());
    assert!(!outcomes[1].1.is_ok());
    assert!(outcomes[2].1.is_ok());

    // One rolled-back event per successful node.
    assert_eq!(events.lock().len(), 2);
}
