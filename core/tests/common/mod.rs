//! Shared in-memory fakes for use-case integration tests.

// Each integration test binary compiles this module separately and uses
// a different subset of it.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use chimera_core::domain::events::{DomainEvent, EventKind};
use chimera_core::domain::fingerprint::Fingerprint;
use chimera_core::domain::node::Node;
use chimera_core::domain::ports::{
    BuildPort, EventBusPort, PortError, PortResult, RemoteExecutorPort, SessionPort,
};
use chimera_core::domain::session::{ConfigPath, SessionId};
use chimera_core::infrastructure::event_bus::EventBus;

/// Build port that hands back a fixed fingerprint, or fails.
pub struct FakeBuild {
    pub result: Result<String, String>,
}

impl FakeBuild {
    pub fn ok(fingerprint: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(fingerprint.to_string()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(reason.to_string()),
        })
    }
}

#[async_trait]
impl BuildPort for FakeBuild {
    async fn build(&self, _path: &ConfigPath) -> PortResult<Fingerprint> {
        match &self.result {
            Ok(fingerprint) => Ok(Fingerprint::new(fingerprint.clone())
                .expect("fake fingerprint must be valid")),
            Err(reason) => Err(PortError::failed("build", reason.clone())),
        }
    }

    async fn instantiate(&self, path: &ConfigPath) -> PortResult<String> {
        Ok(format!("/nix/store/{path}.drv"))
    }

    async fn shell(&self, _path: &ConfigPath, command: &str) -> PortResult<String> {
        Ok(command.to_string())
    }
}

/// Remote executor with scriptable per-host failures and a call log.
#[derive(Default)]
pub struct FakeExecutor {
    pub sync_fail: HashSet<String>,
    pub exec_fail: HashSet<String>,
    pub exec_fail_markers: Vec<String>,
    pub rollback_fail: HashSet<String>,
    pub unreachable: HashSet<String>,
    pub fingerprints: Mutex<HashMap<String, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint(self, host: &str, fingerprint: &str) -> Self {
        self.fingerprints
            .lock()
            .insert(host.to_string(), fingerprint.to_string());
        self
    }

    pub fn failing_sync(mut self, host: &str) -> Self {
        self.sync_fail.insert(host.to_string());
        self
    }

    pub fn failing_exec(mut self, host: &str) -> Self {
        self.exec_fail.insert(host.to_string());
        self
    }

    /// Fail any exec whose command contains `marker`, on any host.
    pub fn failing_exec_containing(mut self, marker: &str) -> Self {
        self.exec_fail_markers.push(marker.to_string());
        self
    }

    pub fn failing_rollback(mut self, host: &str) -> Self {
        self.rollback_fail.insert(host.to_string());
        self
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteExecutorPort for FakeExecutor {
    async fn sync_closure(&self, nodes: &[Node], fingerprint: &Fingerprint) -> PortResult<()> {
        for node in nodes {
            self.calls
                .lock()
                .push(format!("sync {} {fingerprint}", node.host));
            if self.sync_fail.contains(&node.host) {
                return Err(PortError::failed("sync_closure", "rsync exited 23"));
            }
        }
        Ok(())
    }

    async fn exec(&self, nodes: &[Node], command: &str) -> PortResult<()> {
        for node in nodes {
            self.calls.lock().push(format!("exec {} {command}", node.host));
            if self.exec_fail.contains(&node.host)
                || self.exec_fail_markers.iter().any(|m| command.contains(m))
            {
                return Err(PortError::failed("exec", "ssh exited 1"));
            }
        }
        Ok(())
    }

    async fn current_fingerprint(&self, node: &Node) -> PortResult<Option<Fingerprint>> {
        if self.unreachable.contains(&node.host) {
            return Err(PortError::unreachable(node));
        }
        Ok(self
            .fingerprints
            .lock()
            .get(&node.host)
            .map(|raw| Fingerprint::new(raw.clone()).expect("fake fingerprint must be valid")))
    }

    async fn rollback(&self, nodes: &[Node], generation: Option<u32>) -> PortResult<()> {
        for node in nodes {
            self.calls
                .lock()
                .push(format!("rollback {} {generation:?}", node.host));
            if self.rollback_fail.contains(&node.host) {
                return Err(PortError::failed("rollback", "no previous generation"));
            }
        }
        Ok(())
    }
}

/// Session port backed by a set, with a call log.
#[derive(Default)]
pub struct FakeSessions {
    pub sessions: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionPort for FakeSessions {
    async fn create(&self, id: &SessionId) -> PortResult<bool> {
        self.calls.lock().push(format!("create {id}"));
        Ok(self.sessions.lock().insert(id.to_string()))
    }

    async fn list(&self) -> PortResult<Vec<SessionId>> {
        Ok(self
            .sessions
            .lock()
            .iter()
            .map(|s| SessionId::new(s.clone()).expect("fake session ids are non-empty"))
            .collect())
    }

    async fn kill(&self, id: &SessionId) -> PortResult<bool> {
        Ok(self.sessions.lock().remove(id.as_str()))
    }

    async fn run(&self, id: &SessionId, command: &str) -> PortResult<bool> {
        self.calls.lock().push(format!("run {id} {command}"));
        Ok(true)
    }

    async fn attach_command(&self, id: &SessionId) -> PortResult<String> {
        Ok(format!("tmux attach -t {id}"))
    }
}

/// Subscribe a recorder to the given kinds; returns the shared log.
pub fn record_events(bus: &EventBus, kinds: &[EventKind]) -> Arc<Mutex<Vec<DomainEvent>>> {
    let log: Arc<Mutex<Vec<DomainEvent>>> = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let log_clone = Arc::clone(&log);
        bus.subscribe(
            *kind,
            Arc::new(move |event| {
                let log = Arc::clone(&log_clone);
                Box::pin(async move {
                    log.lock().push(event);
                    Ok(())
                })
            }),
        );
    }
    log
}

pub fn node(spec: &str) -> Node {
    Node::parse(spec).expect("test node spec must parse")
}

pub fn fingerprint(raw: &str) -> Fingerprint {
    Fingerprint::new(raw).expect("test fingerprint must be valid")
}
