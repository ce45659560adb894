use super::*;
use crate::config::SupervisorPolicy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn app(name: &str, command: &str, args: &[&str]) -> AppDescriptor {
    AppDescriptor {
        name: name.to_string(),
        cwd: PathBuf::from("/"),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        env: HashMap::new(),
        stop_signal: "SIGTERM".to_string(),
    }
}

fn sleeper(name: &str) -> AppDescriptor {
    app(name, "/bin/sleep", &["30"])
}

fn policy(max_restarts: u32, backoff_base_ms: u64) -> SupervisorPolicy {
    SupervisorPolicy {
        max_restarts,
        backoff_base_ms,
        backoff_max_ms: backoff_base_ms * 4,
        grace_period_ms: 2000,
        min_uptime_ms: None,
    }
}

fn supervisor(policy: SupervisorPolicy, apps: Vec<AppDescriptor>) -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorConfig { policy, apps })
}

/// Poll `name` until `pred` holds or `timeout` passes
async fn wait_until(
    sup: &ProcessSupervisor,
    name: &str,
    timeout: Duration,
    pred: impl Fn(&ProcessEntry) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if sup.inspect(name, |e| pred(e)).await.unwrap() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn kill_externally(pid: u32) {
    nix::sys::signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
}

fn is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn test_new_entries_start_stopped() {
    let sup = supervisor(policy(3, 50), vec![sleeper("a"), sleeper("b")]);

    assert_eq!(sup.names(), &["a".to_string(), "b".to_string()]);
    let state = sup.inspect("a", |e| (e.state, e.pid, e.restart_count)).await.unwrap();
    assert_eq!(state, (ProcessState::Stopped, None, 0));
}

#[tokio::test]
async fn test_start_runs_process() {
    let sup = supervisor(policy(3, 50), vec![sleeper("web")]);

    let outcome = sup.start("web").await.unwrap();
    let pid = match outcome {
        StartOutcome::Started { pid } => pid,
        other => panic!("Expected Started, got {:?}", other),
    };

    let (state, entry_pid, restarts) = sup
        .inspect("web", |e| (e.state, e.pid, e.restart_count))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Running);
    assert_eq!(entry_pid, Some(pid));
    assert_eq!(restarts, 0);
    assert!(sup.inspect("web", |e| e.uptime().is_some()).await.unwrap());

    sup.stop("web").await.unwrap();
}

#[tokio::test]
async fn test_start_twice_is_noop() {
    let sup = supervisor(policy(3, 50), vec![sleeper("web")]);

    let first = sup.start("web").await.unwrap();
    let second = sup.start("web").await.unwrap();
    assert_eq!(second, StartOutcome::AlreadyRunning { pid: first.pid() });

    sup.stop("web").await.unwrap();
}

#[tokio::test]
async fn test_start_unknown_app() {
    let sup = supervisor(policy(3, 50), vec![sleeper("web")]);
    assert!(matches!(
        sup.start("nope").await,
        Err(SupervisorError::AppNotFound(_))
    ));
}

#[tokio::test]
async fn test_spawn_failure_leaves_entry_stopped() {
    let sup = supervisor(
        policy(3, 50),
        vec![app("ghost", "/nonexistent/binary", &[])],
    );

    let result = sup.start("ghost").await;
    assert!(matches!(result, Err(SupervisorError::Spawn { .. })));

    let (state, pid, restarts) = sup
        .inspect("ghost", |e| (e.state, e.pid, e.restart_count))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Stopped);
    assert_eq!(pid, None);
    assert_eq!(restarts, 0);
}

#[tokio::test]
async fn test_stop_graceful_and_idempotent() {
    let sup = supervisor(policy(3, 50), vec![sleeper("web")]);
    let pid = sup.start("web").await.unwrap().pid();

    match sup.stop("web").await.unwrap() {
        StopOutcome::Stopped { exit, forced } => {
            assert!(!forced);
            assert_eq!(exit.signal, Some(Signal::SIGTERM as i32));
        }
        other => panic!("Expected Stopped, got {:?}", other),
    }

    let (state, entry_pid) = sup.inspect("web", |e| (e.state, e.pid)).await.unwrap();
    assert_eq!(state, ProcessState::Stopped);
    assert_eq!(entry_pid, None);
    assert!(!is_alive(pid));

    assert_eq!(sup.stop("web").await.unwrap(), StopOutcome::AlreadyStopped);
}

#[tokio::test]
async fn test_stop_force_kills_after_grace_period() {
    let mut stubborn = app("stubborn", "/bin/sh", &["-c", "trap '' TERM; sleep 30"]);
    stubborn.stop_signal = "SIGTERM".to_string();
    let mut p = policy(3, 50);
    p.grace_period_ms = 300;
    let sup = supervisor(p, vec![stubborn]);

    sup.start("stubborn").await.unwrap();
    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    match sup.stop("stubborn").await.unwrap() {
        StopOutcome::Stopped { exit, forced } => {
            assert!(forced);
            assert_eq!(exit.signal, Some(Signal::SIGKILL as i32));
        }
        other => panic!("Expected Stopped, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(
        sup.inspect("stubborn", |e| e.state).await.unwrap(),
        ProcessState::Stopped
    );
}

#[tokio::test]
async fn test_custom_stop_signal() {
    let mut web = sleeper("web");
    web.stop_signal = "SIGINT".to_string();
    let sup = supervisor(policy(3, 50), vec![web]);

    sup.start("web").await.unwrap();
    match sup.stop("web").await.unwrap() {
        StopOutcome::Stopped { exit, .. } => assert_eq!(exit.signal, Some(Signal::SIGINT as i32)),
        other => panic!("Expected Stopped, got {:?}", other),
    }
}

#[tokio::test]
async fn test_crash_triggers_restart() {
    let sup = supervisor(policy(3, 50), vec![sleeper("frontend")]);
    let first_pid = sup.start("frontend").await.unwrap().pid();

    kill_externally(first_pid);

    let restarted = wait_until(&sup, "frontend", Duration::from_secs(3), |e| {
        e.state == ProcessState::Running && e.pid.is_some() && e.pid != Some(first_pid)
    })
    .await;
    assert!(restarted, "frontend should be running again");

    let (restarts, signal) = sup
        .inspect("frontend", |e| (e.restart_count, e.last_exit_signal))
        .await
        .unwrap();
    assert_eq!(restarts, 1);
    assert_eq!(signal, Some(Signal::SIGKILL as i32));

    sup.stop("frontend").await.unwrap();
}

#[tokio::test]
async fn test_restart_budget_exhausted() {
    let sup = supervisor(
        policy(2, 10),
        vec![app("flaky", "/bin/sh", &["-c", "exit 3"])],
    );
    sup.start("flaky").await.unwrap();

    let exhausted = wait_until(&sup, "flaky", Duration::from_secs(3), |e| e.budget_exhausted).await;
    assert!(exhausted, "flaky should exhaust its budget");

    let (state, restarts, code) = sup
        .inspect("flaky", |e| (e.state, e.restart_count, e.last_exit_code))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Crashed);
    assert_eq!(restarts, 3);
    assert_eq!(code, Some(3));

    let alerts = sup.alerts().active();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].name, "flaky");

    // No further automatic action
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        sup.inspect("flaky", |e| (e.state, e.restart_count)).await.unwrap(),
        (ProcessState::Crashed, 3)
    );
}

#[tokio::test]
async fn test_manual_start_clears_exhausted_budget() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut flaky = app(
        "flaky",
        "/bin/sh",
        &["-c", "test -f ready && exec sleep 30; exit 1"],
    );
    flaky.cwd = dir.path().to_path_buf();
    let sup = supervisor(policy(0, 10), vec![flaky]);

    sup.start("flaky").await.unwrap();
    assert!(wait_until(&sup, "flaky", Duration::from_secs(2), |e| e.budget_exhausted).await);
    assert_eq!(sup.alerts().active().len(), 1);

    std::fs::write(dir.path().join("ready"), b"").unwrap();
    sup.start("flaky").await.unwrap();

    let (state, exhausted, restarts) = sup
        .inspect("flaky", |e| (e.state, e.budget_exhausted, e.restart_count))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Running);
    assert!(!exhausted);
    assert_eq!(restarts, 1);
    assert!(sup.alerts().active().is_empty());

    sup.stop("flaky").await.unwrap();
}

#[tokio::test]
async fn test_stop_cancels_pending_restart() {
    let sup = supervisor(
        policy(3, 500),
        vec![app("flaky", "/bin/sh", &["-c", "exit 1"])],
    );
    sup.start("flaky").await.unwrap();

    assert!(
        wait_until(&sup, "flaky", Duration::from_secs(2), |e| e.state == ProcessState::Crashed)
            .await
    );
    assert_eq!(sup.stop("flaky").await.unwrap(), StopOutcome::AlreadyStopped);

    tokio::time::sleep(Duration::from_millis(800)).await;
    let (state, restarts) = sup
        .inspect("flaky", |e| (e.state, e.restart_count))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Stopped);
    assert_eq!(restarts, 1);
}

#[tokio::test]
async fn test_restart_replaces_process() {
    let sup = supervisor(policy(3, 50), vec![sleeper("api")]);
    let old_pid = sup.start("api").await.unwrap().pid();

    let outcome = sup.restart("api").await.unwrap();
    let new_pid = match outcome {
        StartOutcome::Started { pid } => pid,
        other => panic!("Expected Started, got {:?}", other),
    };

    assert_ne!(old_pid, new_pid);
    assert!(!is_alive(old_pid));
    assert_eq!(
        sup.inspect("api", |e| (e.state, e.restart_count)).await.unwrap(),
        (ProcessState::Running, 0)
    );

    sup.stop("api").await.unwrap();
}

#[tokio::test]
async fn test_stop_then_start_never_overlaps() {
    let sup = supervisor(policy(3, 50), vec![sleeper("api")]);
    let old_pid = sup.start("api").await.unwrap().pid();

    let (stopped, started) = tokio::join!(sup.stop("api"), sup.start("api"));
    assert!(matches!(stopped.unwrap(), StopOutcome::Stopped { .. }));
    let new_pid = match started.unwrap() {
        StartOutcome::Started { pid } => pid,
        other => panic!("Expected Started after stop, got {:?}", other),
    };

    assert_ne!(old_pid, new_pid);
    assert!(!is_alive(old_pid));
    assert!(is_alive(new_pid));

    sup.stop("api").await.unwrap();
}

#[tokio::test]
async fn test_long_run_resets_consecutive_crashes() {
    let mut p = policy(1, 10);
    p.min_uptime_ms = Some(100);
    let sup = supervisor(p, vec![sleeper("worker")]);
    let mut pid = sup.start("worker").await.unwrap().pid();

    for round in 1..=2u32 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        kill_externally(pid);

        let previous = pid;
        assert!(
            wait_until(&sup, "worker", Duration::from_secs(3), |e| {
                e.state == ProcessState::Running && e.pid != Some(previous) && e.pid.is_some()
            })
            .await,
            "round {} should restart",
            round
        );
        pid = sup.inspect("worker", |e| e.pid).await.unwrap().unwrap();
        assert_eq!(
            sup.inspect("worker", |e| e.restart_count).await.unwrap(),
            round
        );
    }

    sup.stop("worker").await.unwrap();
}

#[tokio::test]
async fn test_restart_delays_double_per_crash() {
    // Restarts at roughly 300ms, 900ms and 2100ms after the first crash
    let sup = supervisor(
        policy(3, 300),
        vec![app("flaky", "/bin/sh", &["-c", "exit 1"])],
    );
    sup.start("flaky").await.unwrap();

    let mut reached = Vec::new();
    for count in 1..=3 {
        assert!(
            wait_until(&sup, "flaky", Duration::from_secs(5), |e| e.restart_count >= count)
                .await
        );
        reached.push(tokio::time::Instant::now());
    }

    let first_gap = reached[1] - reached[0];
    let second_gap = reached[2] - reached[1];
    assert!(first_gap >= Duration::from_millis(250), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(550), "second gap {:?}", second_gap);
    assert!(second_gap > first_gap);

    sup.stop("flaky").await.unwrap();
}

#[tokio::test]
async fn test_stopped_entry_drops_run_details() {
    let sup = supervisor(policy(3, 50), vec![sleeper("web")]);

    sup.start("web").await.unwrap();
    assert!(sup.inspect("web", |e| e.started_at.is_some()).await.unwrap());

    sup.stop("web").await.unwrap();
    let (state, pid, started_at, uptime) = sup
        .inspect("web", |e| (e.state, e.pid, e.started_at, e.uptime()))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Stopped);
    assert_eq!(pid, None);
    assert_eq!(started_at, None);
    assert_eq!(uptime, None);
}

#[tokio::test]
async fn test_exhausted_flag_survives_stop_until_manual_start() {
    let sup = supervisor(
        policy(0, 10),
        vec![app("flaky", "/bin/sh", &["-c", "exit 2"])],
    );
    sup.start("flaky").await.unwrap();
    assert!(wait_until(&sup, "flaky", Duration::from_secs(2), |e| e.budget_exhausted).await);

    assert_eq!(sup.stop("flaky").await.unwrap(), StopOutcome::AlreadyStopped);
    let (state, exhausted, started_at) = sup
        .inspect("flaky", |e| (e.state, e.budget_exhausted, e.started_at))
        .await
        .unwrap();
    assert_eq!(state, ProcessState::Stopped);
    assert!(exhausted);
    assert_eq!(started_at, None);
    assert_eq!(sup.alerts().active().len(), 1);
}
