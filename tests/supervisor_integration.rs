//! Integration tests for the Supervisor
//!
//! These spawn real processes (`/bin/sleep`, `/bin/sh`) and check them
//! against the OS process table.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use minit::manager::{sys, LivenessRecord, LivenessStore, ManagerError, StartOutcome, StopOutcome};
use minit::resolver::{ResolveError, Resolver};
use minit::units::UnitStore;
use minit::Supervisor;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/minit-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn supervisor(dir: &Path, stop_timeout: Duration) -> Supervisor {
    Supervisor::new(
        UnitStore::new(dir.join("units")),
        Resolver::new(dir.join("app"), "/"),
        LivenessStore::new(dir.join("run")),
        stop_timeout,
    )
}

async fn add_service(supervisor: &Supervisor, name: &str, exec_start: &str) {
    let content = format!(
        "[Unit]\nDescription=Test {}\n\n[Service]\nType=simple\nExecStart={}\n",
        name, exec_start
    );
    supervisor.add(name, Some(&content)).await.unwrap();
}

fn started_pid(outcome: StartOutcome) -> u32 {
    match outcome {
        StartOutcome::Started { pid } => pid,
        other => panic!("expected a fresh start, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_status_stop() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "test-start", "/bin/sleep 60").await;

    let pid = started_pid(supervisor.start("test-start").await.unwrap());

    let status = supervisor.status("test-start.service").await.unwrap();
    assert!(status.is_active());
    assert_eq!(status.pid, Some(pid));
    assert!(status.since.is_some());

    assert_eq!(
        supervisor.stop("test-start").await.unwrap(),
        StopOutcome::Stopped { pid }
    );
    assert!(!supervisor.status("test-start").await.unwrap().is_active());
    assert!(!dir.join("run/test-start.service.pid").exists());
    assert!(!dir.join("run/test-start.service.lock").exists());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "test-active", "/bin/sleep 60").await;

    let pid = started_pid(supervisor.start("test-active").await.unwrap());
    assert_eq!(
        supervisor.start("TEST-ACTIVE").await.unwrap(),
        StartOutcome::AlreadyRunning { pid }
    );

    supervisor.stop("test-active").await.unwrap();
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stop_not_active() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "test-stop-inactive", "/bin/sleep 60").await;

    assert_eq!(
        supervisor.stop("test-stop-inactive").await.unwrap(),
        StopOutcome::NotRunning
    );
    // Units that were never defined can be stopped too
    assert_eq!(
        supervisor.stop("never-defined").await.unwrap(),
        StopOutcome::NotRunning
    );

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_queries_leave_no_lock_files() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));

    for name in ["ghost-1", "ghost-2", "Ghost-3.service"] {
        assert!(!supervisor.status(name).await.unwrap().is_active());
        assert_eq!(supervisor.stop(name).await.unwrap(), StopOutcome::NotRunning);
    }
    let leftovers: Vec<_> = fs::read_dir(dir.join("run"))
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");

    // Removing a running unit keeps its lock; removing an idle one drops it
    add_service(&supervisor, "busy", "/bin/sleep 60").await;
    add_service(&supervisor, "idle", "/bin/sleep 60").await;
    supervisor.start("busy").await.unwrap();
    supervisor.start("idle").await.unwrap();
    supervisor.stop("idle").await.unwrap();
    fs::write(dir.join("run/idle.service.lock"), "").unwrap();

    supervisor.remove("busy").await.unwrap();
    supervisor.remove("idle").await.unwrap();
    assert!(dir.join("run/busy.service.lock").exists());
    assert!(dir.join("run/busy.service.pid").exists());
    assert!(!dir.join("run/idle.service.lock").exists());

    supervisor.stop("busy").await.unwrap();
    assert!(!dir.join("run/busy.service.lock").exists());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_missing_executable_leaves_no_record() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));

    match supervisor.start("missing-unit").await {
        Err(ManagerError::Resolve(ResolveError::ExecutableNotFound(path))) => {
            assert!(path.starts_with(dir.join("app/missing-unit")));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!dir.join("run/missing-unit.service.pid").exists());
    assert!(!supervisor.status("missing-unit").await.unwrap().is_active());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_conventional_executable() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));

    // No definition at all: <app>/<short>/<name>
    let app_dir = dir.join("app/worker");
    fs::create_dir_all(&app_dir).unwrap();
    let program = app_dir.join("Acme.Worker");
    fs::write(&program, "#!/bin/sh\nexec sleep 60\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    }

    let pid = started_pid(supervisor.start("Acme.Worker").await.unwrap());
    assert_eq!(supervisor.status("acme.worker").await.unwrap().pid, Some(pid));
    supervisor.stop("Acme.Worker").await.unwrap();

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_reused_pid_is_not_running() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    let liveness = LivenessStore::new(dir.join("run"));

    // Our own PID is certainly alive, but with a different start time
    liveness
        .write(&LivenessRecord {
            unit: "svcA.service".into(),
            pid: std::process::id(),
            start_time: "1".into(),
            command: "/bin/sleep 60".into(),
            started_at: Utc::now(),
        })
        .await
        .unwrap();

    let status = supervisor.status("svcA").await.unwrap();
    assert!(!status.is_active());
    assert!(liveness.read("svcA").await.unwrap().is_none());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stale_record_does_not_block_start() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    let liveness = LivenessStore::new(dir.join("run"));
    add_service(&supervisor, "stale", "/bin/sleep 60").await;

    liveness
        .write(&LivenessRecord {
            unit: "stale.service".into(),
            pid: std::process::id(),
            start_time: "1".into(),
            command: "/bin/sleep 60".into(),
            started_at: Utc::now(),
        })
        .await
        .unwrap();

    // A stale record must neither report "already running" nor be stopped
    let pid = started_pid(supervisor.start("stale").await.unwrap());
    assert_ne!(pid, std::process::id());
    supervisor.stop("stale").await.unwrap();

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_exited_process_is_not_running() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "oneshot", "/bin/true").await;

    supervisor.start("oneshot").await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if !supervisor.status("oneshot").await.unwrap().is_active() {
            break;
        }
        assert!(Instant::now() < deadline, "/bin/true still reported running");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!dir.join("run/oneshot.service.pid").exists());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stop_kills_descendants() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "tree", "/bin/sh -c \"sleep 60 & sleep 60 & wait\"").await;

    let pid = started_pid(supervisor.start("tree").await.unwrap());

    let mut children = Vec::new();
    for _ in 0..100 {
        children = sys::descendants(pid).unwrap();
        if children.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(children.len() >= 2, "expected two sleeping children");

    supervisor.stop("tree").await.unwrap();
    for child in children {
        assert!(!sys::is_alive(child.pid, &child.start_time).unwrap());
    }

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stop_reaches_group_after_main_process_exits() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    let worker_file = dir.join("worker.pid");
    add_service(
        &supervisor,
        "forker",
        &format!("/bin/sh -c \"sleep 60 & echo $! > {}\"", worker_file.display()),
    )
    .await;

    let pid = started_pid(supervisor.start("forker").await.unwrap());

    // The shell exits right after backgrounding its worker
    let deadline = Instant::now() + Duration::from_secs(5);
    let worker: u32 = loop {
        let text = fs::read_to_string(&worker_file).unwrap_or_default();
        let main_gone = !supervisor.status("forker").await.unwrap().is_active();
        if let (true, Ok(pid)) = (main_gone, text.trim().parse()) {
            break pid;
        }
        assert!(Instant::now() < deadline, "worker never started");
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    let worker_token = sys::process_info(worker).unwrap().unwrap().start_time;

    // The record survives so the leftover group can still be stopped
    assert!(dir.join("run/forker.service.pid").exists());

    assert_eq!(
        supervisor.stop("forker").await.unwrap(),
        StopOutcome::Stopped { pid }
    );
    assert!(!sys::is_alive(worker, &worker_token).unwrap());
    assert!(!dir.join("run/forker.service.pid").exists());
    assert_eq!(supervisor.stop("forker").await.unwrap(), StopOutcome::NotRunning);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(1));
    add_service(&supervisor, "stubborn", "/bin/sh -c \"trap '' TERM; sleep 60\"").await;

    let pid = started_pid(supervisor.start("stubborn").await.unwrap());
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let begun = Instant::now();
    assert_eq!(
        supervisor.stop("stubborn").await.unwrap(),
        StopOutcome::Stopped { pid }
    );
    assert!(begun.elapsed() >= Duration::from_secs(1));
    assert!(!supervisor.status("stubborn").await.unwrap().is_active());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_concurrent_start_spawns_once() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "svcA", "/bin/sleep 60").await;

    let a = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start("svcA").await.unwrap() }
    });
    let b = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start("svcA").await.unwrap() }
    });
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let fresh = [&a, &b]
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started { .. }))
        .count();
    assert_eq!(fresh, 1, "exactly one start should spawn: {a:?} {b:?}");
    assert_eq!(a.pid(), b.pid());

    supervisor.stop("svcA").await.unwrap();
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_restart_after_stop_gets_new_pid() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "test-restart", "/bin/sleep 60").await;

    let pid1 = started_pid(supervisor.start("test-restart").await.unwrap());
    supervisor.stop("test-restart").await.unwrap();
    let pid2 = started_pid(supervisor.start("test-restart").await.unwrap());
    assert_ne!(pid1, pid2);

    supervisor.stop("test-restart").await.unwrap();
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_output_is_captured() {
    let dir = unique_test_dir();
    let supervisor = supervisor(&dir, Duration::from_secs(5));
    add_service(&supervisor, "chatty", "/bin/sh -c \"echo hello from chatty; sleep 60\"").await;

    supervisor.start("chatty").await.unwrap();
    let log_path = supervisor.log_path("chatty");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !fs::read_to_string(&log_path).unwrap_or_default().contains("hello from chatty") {
        assert!(Instant::now() < deadline, "output never reached {}", log_path.display());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    supervisor.stop("chatty").await.unwrap();
    let _ = fs::remove_dir_all(dir);
}
