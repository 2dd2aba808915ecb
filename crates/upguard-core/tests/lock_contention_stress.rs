//! Concurrency tests for the update lock
//!
//! Each thread gets its own `Coordinator`, so every attempt goes through a
//! separate open file description, exactly like separate processes would.
//!
//! Validates:
//! - Exactly one holder per scope identity
//! - Release makes the lock available again
//! - Distinct identities never contend

use std::{
    sync::{Arc, Barrier},
    thread,
};

use tempfile::TempDir;
use upguard_core::{Config, Coordinator, LockAttempt, ScopeIdentity};

fn contend(root: &std::path::Path, scope: &str, agents: usize) -> Vec<LockAttempt> {
    let barrier = Arc::new(Barrier::new(agents));

    let handles: Vec<_> = (0..agents)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let root = root.to_path_buf();
            let scope = scope.to_string();
            thread::spawn(move || -> Result<(LockAttempt, Coordinator), upguard_core::Error> {
                let coordinator = Coordinator::new(Config::rooted_at(&root))?;
                let scope = ScopeIdentity::new(scope)?;
                let lock = coordinator.lock_for(&scope);
                barrier.wait();
                // Keep the coordinator (and any hold) alive until joined
                Ok((lock.try_acquire()?, coordinator))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked").expect("lock fault"))
        .collect();

    results.into_iter().map(|(attempt, _)| attempt).collect()
}

#[test]
fn ten_agents_one_winner() {
    let dir = TempDir::new().expect("tempdir");
    let attempts = contend(dir.path(), "com.example.App", 10);

    let winners = attempts.iter().filter(|a| a.is_acquired()).count();
    assert_eq!(winners, 1, "exactly one agent should hold the lock");
}

#[test]
fn fifty_agents_one_winner() {
    let dir = TempDir::new().expect("tempdir");
    let attempts = contend(dir.path(), "com.example.App", 50);

    let winners = attempts.iter().filter(|a| a.is_acquired()).count();
    assert_eq!(winners, 1);

    let with_pid = attempts
        .iter()
        .filter(|a| matches!(a, LockAttempt::Contended { holder_pid: Some(_) }))
        .count();
    assert!(with_pid <= 49);
}

#[test]
fn lock_is_reacquirable_after_release() {
    let dir = TempDir::new().expect("tempdir");
    let scope = ScopeIdentity::new("com.example.App").expect("scope");

    let first = Coordinator::new(Config::rooted_at(dir.path())).expect("coordinator");
    let second = Coordinator::new(Config::rooted_at(dir.path())).expect("coordinator");

    for _ in 0..20 {
        assert!(first.lock_for(&scope).try_lock());
        assert!(!second.lock_for(&scope).try_lock());
        first.lock_for(&scope).unlock();

        assert!(second.lock_for(&scope).try_lock());
        assert!(!first.lock_for(&scope).try_lock());
        second.lock_for(&scope).unlock();
    }
}

#[test]
fn distinct_scopes_never_contend() {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path().to_path_buf();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let root = root.clone();
            thread::spawn(move || {
                let coordinator = Coordinator::new(Config::rooted_at(&root)).expect("coordinator");
                let scope = ScopeIdentity::new(format!("com.example.App{i}")).expect("scope");
                coordinator.lock_for(&scope).try_lock()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("thread panicked"));
    }
}
