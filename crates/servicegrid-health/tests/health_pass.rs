//! Full health passes with the real prober.
//!
//! Registry and lock files live in a temp dir, the queue is an in-memory
//! fake, healthy endpoints are local TCP listeners speaking just enough
//! HTTP, and custom checks are shell scripts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use servicegrid_health::*;
use servicegrid_lock::NamedLock;
use servicegrid_queue::{JobQueue, QueueResult};
use servicegrid_state::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Fixtures ───────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingQueue {
    statuses: Vec<QueueJobStatus>,
    delay: Duration,
    status_calls: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
}

impl JobQueue for RecordingQueue {
    async fn status(&self, _job_ids: &[JobId]) -> QueueResult<Vec<QueueJobStatus>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.statuses.clone())
    }

    async fn cancel(&self, job_id: &str) -> QueueResult<()> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

impl RecordingQueue {
    fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

/// A listener that answers `200 OK` and counts connections.
async fn healthy_endpoint() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
        }
    });
    (port, hits)
}

async fn unreachable_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn running(job_id: &str) -> QueueJobStatus {
    QueueJobStatus {
        job_id: job_id.to_string(),
        state: QueueJobState::Running,
        host: Some("127.0.0.1".to_string()),
        elapsed: Duration::from_secs(120),
    }
}

fn service(id: &str, script: Option<PathBuf>, jobs: &[(&str, u16)]) -> Service {
    Service {
        id: id.to_string(),
        health_check_script: script,
        jobs: jobs
            .iter()
            .map(|(job_id, port)| ServiceJob::pending(*job_id, *port))
            .collect(),
    }
}

fn write_registry(dir: &Path, services: Vec<Service>) -> PathBuf {
    let path = dir.join("cluster.json");
    let list = ServiceList { services };
    std::fs::write(&path, serde_json::to_string_pretty(&list).unwrap()).unwrap();
    path
}

fn coordinator_config(dir: &Path, registry_path: PathBuf) -> CoordinatorConfig {
    CoordinatorConfig {
        registry_path,
        scheduling_lock: NamedLock::new("scheduling", dir.join(".scheduler.lock")),
        health_lock: NamedLock::new("health", dir.join(".scheduler.health.lock")),
        expiration: ExpirationPolicy::new(Duration::from_secs(9 * 3600 + 30 * 60)),
    }
}

fn prober(script_timeout: Duration) -> Prober {
    Prober::new(script_timeout, Duration::from_millis(500))
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn assert_no_locks(dir: &Path) {
    assert!(!dir.join(".scheduler.lock").exists());
    assert!(!dir.join(".scheduler.health.lock").exists());
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_job_is_cancelled_healthy_job_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let (healthy_port, _) = healthy_endpoint().await;
    let dead_port = unreachable_port().await;
    let registry = write_registry(
        dir.path(),
        vec![service("S", None, &[("J1", healthy_port), ("J2", dead_port)])],
    );
    let queue = RecordingQueue {
        statuses: vec![running("J1"), running("J2")],
        ..Default::default()
    };

    let coordinator = HealthCoordinator::new(
        coordinator_config(dir.path(), registry),
        queue,
        prober(Duration::from_secs(5)),
    );
    let outcome = coordinator.run_pass().await;

    assert_eq!(
        outcome,
        PassOutcome::Completed(PassSummary { probed: 2, cancelled: 1, skipped: 0 })
    );
    assert_eq!(coordinator.queue().cancelled(), vec!["J2"]);
    assert_no_locks(dir.path());
}

#[cfg(unix)]
#[tokio::test]
async fn custom_script_exit_code_decides() {
    let dir = tempfile::tempdir().unwrap();
    let (port, hits) = healthy_endpoint().await;
    let pass = write_script(dir.path(), "pass.sh", "exit 0");
    let fail = write_script(dir.path(), "fail.sh", "exit 2");
    let registry = write_registry(
        dir.path(),
        vec![
            service("good", Some(pass), &[("100", port)]),
            service("bad", Some(fail), &[("200", port)]),
        ],
    );
    let queue = RecordingQueue {
        statuses: vec![running("100"), running("200")],
        ..Default::default()
    };

    let coordinator = HealthCoordinator::new(
        coordinator_config(dir.path(), registry),
        queue,
        prober(Duration::from_secs(10)),
    );
    coordinator.run_pass().await;

    assert_eq!(coordinator.queue().cancelled(), vec!["200"]);
    // Neither verdict consulted the HTTP endpoint.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_no_locks(dir.path());
}

#[cfg(unix)]
#[tokio::test]
async fn hanging_script_cancels_without_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let (port, hits) = healthy_endpoint().await;
    let hang = write_script(dir.path(), "hang.sh", "exec sleep 30");
    let registry = write_registry(dir.path(), vec![service("slow", Some(hang), &[("300", port)])]);
    let queue = RecordingQueue {
        statuses: vec![running("300")],
        ..Default::default()
    };

    let coordinator = HealthCoordinator::new(
        coordinator_config(dir.path(), registry),
        queue,
        prober(Duration::from_millis(300)),
    );
    coordinator.run_pass().await;

    assert_eq!(coordinator.queue().cancelled(), vec!["300"]);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_script_falls_back_to_http_probe() {
    let dir = tempfile::tempdir().unwrap();
    let (port, hits) = healthy_endpoint().await;
    let registry = write_registry(
        dir.path(),
        vec![service(
            "orphaned",
            Some(dir.path().join("does-not-exist.sh")),
            &[("400", port)],
        )],
    );
    let queue = RecordingQueue {
        statuses: vec![running("400")],
        ..Default::default()
    };

    let coordinator = HealthCoordinator::new(
        coordinator_config(dir.path(), registry),
        queue,
        prober(Duration::from_secs(5)),
    );
    coordinator.run_pass().await;

    assert!(coordinator.queue().cancelled().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expiring_job_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let dead_port = unreachable_port().await;
    let registry = write_registry(dir.path(), vec![service("S", None, &[("500", dead_port)])]);
    let mut status = running("500");
    status.elapsed = Duration::from_secs(9 * 3600 + 45 * 60);
    let queue = RecordingQueue {
        statuses: vec![status],
        ..Default::default()
    };

    let coordinator = HealthCoordinator::new(
        coordinator_config(dir.path(), registry),
        queue,
        prober(Duration::from_secs(5)),
    );
    let outcome = coordinator.run_pass().await;

    assert_eq!(
        outcome,
        PassOutcome::Completed(PassSummary { probed: 0, cancelled: 0, skipped: 1 })
    );
    assert!(coordinator.queue().cancelled().is_empty());
}

#[tokio::test]
async fn overlapping_passes_one_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let (port, _) = healthy_endpoint().await;
    let registry = write_registry(dir.path(), vec![service("S", None, &[("600", port)])]);

    let make = |delay| {
        HealthCoordinator::new(
            coordinator_config(dir.path(), registry.clone()),
            RecordingQueue {
                statuses: vec![running("600")],
                delay,
                ..Default::default()
            },
            prober(Duration::from_secs(5)),
        )
    };
    let first = make(Duration::from_millis(200));
    let second = make(Duration::ZERO);

    // The second pass starts while the first is still refreshing.
    let (a, b) = tokio::join!(first.run_pass(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.run_pass().await
    });

    assert!(matches!(a, PassOutcome::Completed(_)));
    assert_eq!(
        b,
        PassOutcome::Aborted {
            during: PassState::AcquiringSchedLock,
            reason: AbortReason::SchedulingLockHeld,
        }
    );
    assert_eq!(second.queue().status_calls.load(Ordering::SeqCst), 0);
    assert_no_locks(dir.path());
}
