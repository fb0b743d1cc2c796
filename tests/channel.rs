// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end tests driving the public API across real processes-in-miniature:
// each test spins up one primary `Channel` and one or more secondary
// `Channel`s in a shared temp directory and exercises them over real
// AF_UNIX sockets.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use mp_channel::{channel_init, primary_alive, ChannelConfig, Message, Role, StaticEnv};

fn config(dir: &Path) -> ChannelConfig {
    ChannelConfig {
        socket_dir: dir.to_path_buf(),
        socket_prefix: "mp_test".to_string(),
        primary_lock_path: dir.join("primary.lock"),
    }
}

fn env(role: Role, init_complete: bool) -> Arc<dyn mp_channel::RuntimeEnv> {
    Arc::new(StaticEnv::new(role, move || init_complete))
}

#[test]
fn send_reaches_a_registered_handler() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();

    let received: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let received2 = received.clone();
    primary
        .register(
            "greet",
            Arc::new(move |msg, _ctx| {
                *received2.lock().unwrap() = Some(msg.param.clone());
                Ok(())
            }),
        )
        .unwrap();

    let secondary = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();
    secondary
        .send(None, Message::with_param("greet", b"hello".to_vec()))
        .unwrap();

    wait_until(Duration::from_secs(2), || received.lock().unwrap().is_some());
    assert_eq!(received.lock().unwrap().as_deref(), Some(&b"hello"[..]));
}

#[test]
fn request_reply_round_trip_carries_the_response_back() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();
    primary
        .register(
            "add",
            Arc::new(|msg, ctx| {
                let sum: u8 = msg.param.iter().copied().sum();
                ctx.reply(Message::with_param("add", vec![sum])).unwrap();
                Ok(())
            }),
        )
        .unwrap();

    let secondary = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();
    let report = secondary
        .request("add", vec![2, 3, 4], Duration::from_secs(2))
        .unwrap();

    assert_eq!(report.nb_sent, 1);
    assert_eq!(report.nb_received, 1);
    assert_eq!(report.replies[0].1.param, vec![9]);
}

#[test]
fn duplicate_handler_registration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();
    primary.register("dup", Arc::new(|_m, _c| Ok(()))).unwrap();
    let err = primary.register("dup", Arc::new(|_m, _c| Ok(()))).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
}

#[test]
fn request_with_no_handler_times_out_once_init_is_complete() {
    let dir = tempfile::tempdir().unwrap();
    let _primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();
    let secondary = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();

    let err = secondary
        .request("missing", vec![], Duration::from_millis(200))
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}

#[test]
fn request_with_no_handler_before_init_complete_is_quietly_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let _primary = channel_init(config(dir.path()), env(Role::Primary, false)).unwrap();
    let secondary = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();

    let report = secondary
        .request("missing", vec![], Duration::from_secs(1))
        .unwrap();
    assert_eq!(report.nb_sent, 0);
    assert_eq!(report.nb_received, 0);
}

#[test]
fn broadcast_send_reaches_every_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();
    let _ = primary; // keep alive for the duration of the test

    let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));

    let mut secondaries = Vec::new();
    for _ in 0..3 {
        let s = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();
        let c2 = counter.clone();
        s.register(
            "tick",
            Arc::new(move |_m, _c| {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
        secondaries.push(s);
    }

    primary.send(None, Message::new("tick")).unwrap();

    wait_until(Duration::from_secs(2), || counter.load(Ordering::SeqCst) == 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn primary_alive_reflects_the_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    assert!(!primary_alive(&cfg).unwrap());

    let primary = channel_init(cfg.clone(), env(Role::Primary, true)).unwrap();
    assert!(primary_alive(&cfg).unwrap());
    drop(primary);
}

#[test]
fn file_descriptor_ownership_transfers_with_the_message() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();

    let seen_fd: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
    let seen_fd2 = seen_fd.clone();
    primary
        .register(
            "handoff",
            Arc::new(move |msg, _ctx| {
                if let Some(fd) = msg.fds.first() {
                    *seen_fd2.lock().unwrap() = Some(fd.as_raw_fd());
                }
                Ok(())
            }),
        )
        .unwrap();

    let secondary = channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap();
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let owned: std::os::fd::OwnedFd = tmp.into_file().into();

    let mut msg = Message::new("handoff");
    msg.fds.push(owned);
    secondary.send(None, msg).unwrap();

    wait_until(Duration::from_secs(2), || seen_fd.lock().unwrap().is_some());
    assert!(seen_fd.lock().unwrap().unwrap() >= 0);
}

#[test]
fn racing_requests_to_the_same_peer_and_name_reject_the_loser() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();
    primary
        .register(
            "race",
            Arc::new(|_msg, ctx| {
                std::thread::sleep(Duration::from_millis(300));
                ctx.reply(Message::new("race")).unwrap();
                Ok(())
            }),
        )
        .unwrap();

    let secondary = Arc::new(channel_init(config(dir.path()), env(Role::Secondary, true)).unwrap());
    let barrier = Arc::new(Barrier::new(2));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let secondary = secondary.clone();
        let barrier = barrier.clone();
        handles.push(std::thread::spawn(move || {
            barrier.wait();
            secondary.request("race", vec![], Duration::from_secs(2))
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists))
        .count();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(rejected, 1, "exactly one racing request should be rejected");
    assert_eq!(succeeded, 1, "the other racing request should complete normally");
}

#[test]
fn broadcast_reaps_a_stale_peer_socket_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let primary = channel_init(config(dir.path()), env(Role::Primary, true)).unwrap();

    let stale_path = dir.path().join("mp_test_stale_0");
    {
        // Bind then drop without unlinking: a listening endpoint that has
        // gone away but left its socket file behind in the directory.
        let _stale = std::os::unix::net::UnixDatagram::bind(&stale_path).unwrap();
    }
    assert!(stale_path.exists());

    primary.send(None, Message::new("tick")).unwrap();

    assert!(
        !stale_path.exists(),
        "primary broadcast should reap the stale peer socket"
    );
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(pred(), "condition did not become true within {timeout:?}");
}
