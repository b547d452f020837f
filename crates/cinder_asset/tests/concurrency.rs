mod common;

use cinder_asset::{AssetKind, AssetManager, AssetServer};
use cinder_core::math::DeterministicRng;
use common::{manager_with, pixmap, Event, ScriptedLoader, PhaseLog};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ROOTS: [(&str, &[&str]); 4] = [
    ("hud", &["font", "icons"]),
    ("menu", &["font", "panel"]),
    ("map", &["tiles", "icons"]),
    ("panel", &["frame"]),
];

fn graph_manager(log: &Arc<PhaseLog>) -> AssetManager {
    let mut loader = ScriptedLoader::new(AssetKind::Pixmap, Arc::clone(log));
    for (root, deps) in ROOTS {
        loader = loader.depends(root, deps);
    }
    manager_with(loader)
}

/// Every cached entry is held by its callers plus the cached entries that
/// depend on it.
fn check_counts(manager: &AssetManager, holds: &[usize]) {
    let cached = manager.loaded_descriptors();
    for desc in &cached {
        let by_callers = ROOTS
            .iter()
            .position(|(root, _)| *root == desc.path())
            .map_or(0, |i| holds[i]);
        let by_dependents = cached
            .iter()
            .filter(|d| {
                manager
                    .dependencies_of(d)
                    .is_some_and(|deps| deps.contains(desc))
            })
            .count();
        assert_eq!(
            manager.reference_count(desc),
            by_callers + by_dependents,
            "refcount of {desc}\n{}",
            manager.diagnostics()
        );
    }
    for (i, (root, _)) in ROOTS.iter().enumerate() {
        if holds[i] > 0 {
            assert!(manager.is_loaded(&pixmap(root)), "{root} is held but not cached");
        }
    }
}

enum Command {
    Step,
    Report(Sender<[usize; ROOTS.len()]>),
}

/// Random loads and releases through a server on another thread, one per
/// `Step`. Releases whatever it still holds once the commands stop.
fn spawn_helper(server: AssetServer, commands: Receiver<Command>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = DeterministicRng::new(0xfeed);
        let mut holds = [0usize; ROOTS.len()];
        for command in commands {
            match command {
                Command::Step => {
                    let i = rng.next_below(ROOTS.len());
                    let desc = pixmap(ROOTS[i].0);
                    if holds[i] > 0 && rng.next_bool() {
                        server.release(&desc).unwrap();
                        holds[i] -= 1;
                    } else {
                        server.load(&desc);
                        holds[i] += 1;
                    }
                }
                Command::Report(reply) => reply.send(holds).unwrap(),
            }
        }
        for (i, (root, _)) in ROOTS.iter().enumerate() {
            for _ in 0..holds[i] {
                server.release(&pixmap(root)).unwrap();
            }
        }
    })
}

/// Wait for the helper to catch up, then settle everything and check.
fn check_with_helper(manager: &mut AssetManager, commands: &Sender<Command>, holds: &[usize]) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    commands.send(Command::Report(tx)).unwrap();
    let helper_holds = rx.recv().unwrap();
    let combined: Vec<usize> = holds.iter().zip(helper_holds).map(|(a, b)| a + b).collect();
    manager.finish_loading();
    check_counts(manager, &combined);
}

#[test]
fn random_interleavings_keep_counts_consistent() {
    let log = Arc::new(PhaseLog::default());
    let mut manager = graph_manager(&log);
    let owner = thread::current().id();
    let (commands, inbox) = crossbeam_channel::unbounded();
    let helper = spawn_helper(manager.server(), inbox);
    let mut rng = DeterministicRng::new(0x5eed);
    let mut holds = [0usize; ROOTS.len()];

    for step in 0..1000 {
        let i = rng.next_below(ROOTS.len());
        let desc = pixmap(ROOTS[i].0);
        match rng.next_below(6) {
            0 | 1 => {
                manager.load(&desc);
                holds[i] += 1;
            }
            2 if holds[i] > 0 => {
                manager.release(&desc).unwrap();
                holds[i] -= 1;
            }
            3 => {
                manager.update();
            }
            4 => commands.send(Command::Step).unwrap(),
            _ => check_with_helper(&mut manager, &commands, &holds),
        }
        if step % 97 == 0 {
            check_with_helper(&mut manager, &commands, &holds);
        }
    }

    for (i, (root, _)) in ROOTS.iter().enumerate() {
        for _ in 0..holds[i] {
            manager.release(&pixmap(root)).unwrap();
        }
    }
    drop(commands);
    helper.join().unwrap();
    manager.finish_loading();

    assert!(manager.loaded_descriptors().is_empty(), "{}", manager.diagnostics());
    assert_eq!(manager.in_flight(), 0);
    let finalized = log.count(|e| matches!(e, Event::Finalize(..)));
    let disposed = log.count(|e| matches!(e, Event::Dispose(..)));
    assert!(finalized > 0);
    assert_eq!(finalized, disposed);
    let stats = manager.stats();
    assert_eq!(stats.finalized, stats.disposed);
    assert_eq!(stats.failed, 0);

    for event in log.events() {
        match event {
            Event::Finalize(path, on) | Event::Dispose(path, on) => {
                assert_eq!(on, owner, "{path} settled off the owning thread")
            }
            Event::AsyncLoad(path, on) => {
                assert_ne!(on, owner, "{path} loaded on the owning thread")
            }
            Event::Dependencies(_) => {}
        }
    }
}

#[test]
fn servers_on_many_threads_agree_with_the_owner() {
    let log = Arc::new(PhaseLog::default());
    let mut manager = graph_manager(&log);
    let server = manager.server();

    let workers: Vec<_> = (0..6u64)
        .map(|seed| {
            let server = server.clone();
            thread::spawn(move || {
                let mut rng = DeterministicRng::new(seed);
                let mut held = Vec::new();
                for _ in 0..50 {
                    let (root, _) = ROOTS[rng.next_below(ROOTS.len())];
                    let desc = pixmap(root);
                    if rng.next_bool() || held.is_empty() {
                        server.load(&desc);
                        held.push(desc);
                    } else {
                        let at = rng.next_below(held.len());
                        let desc = held.swap_remove(at);
                        server.release(&desc).unwrap();
                    }
                }
                held
            })
        })
        .collect();

    // Keep finalizing while the servers run.
    while workers.iter().any(|w| !w.is_finished()) {
        manager.update();
        thread::sleep(Duration::from_millis(1));
    }
    let held: Vec<_> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();
    manager.finish_loading();

    let mut holds = [0usize; ROOTS.len()];
    for desc in &held {
        let i = ROOTS.iter().position(|(r, _)| *r == desc.path()).unwrap();
        holds[i] += 1;
    }
    check_counts(&manager, &holds);

    for desc in &held {
        server.release(desc).unwrap();
    }
    manager.update();
    assert!(manager.loaded_descriptors().is_empty());
    assert_eq!(
        log.count(|e| matches!(e, Event::Finalize(..))),
        log.count(|e| matches!(e, Event::Dispose(..)))
    );
}
