//! Thread activity registry.
//!
//! Rust cannot capture the stack of another running thread, so threads that
//! matter for diagnostics register themselves here and record what they are
//! doing. [`all_backtraces`] renders the registry for the backtraces endpoint.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::Mutex;

struct ThreadEntry {
    name: String,
    activity: &'static str,
    started_at: Instant,
}

lazy_static! {
    static ref REGISTRY: Mutex<BTreeMap<u64, ThreadEntry>> = Mutex::new(BTreeMap::new());
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Point-in-time view of a registered thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub id: u64,
    pub name: String,
    pub activity: &'static str,
    pub age: Duration,
}

/// Registration handle; the thread is removed from the registry on drop.
#[derive(Debug)]
pub struct ThreadRegistration {
    id: u64,
}

impl ThreadRegistration {
    /// Registry id of this thread.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record what the thread is doing now.
    pub fn set_activity(&self, activity: &'static str) {
        if let Some(entry) = REGISTRY.lock().get_mut(&self.id) {
            entry.activity = activity;
        }
    }
}

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        REGISTRY.lock().remove(&self.id);
    }
}

/// Register the calling thread under `name`.
pub fn register_thread(name: impl Into<String>) -> ThreadRegistration {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    REGISTRY.lock().insert(
        id,
        ThreadEntry {
            name: name.into(),
            activity: "starting",
            started_at: Instant::now(),
        },
    );
    ThreadRegistration { id }
}

/// All currently registered threads, ordered by registration.
pub fn registered_threads() -> Vec<ThreadSnapshot> {
    let now = Instant::now();
    REGISTRY
        .lock()
        .iter()
        .map(|(id, entry)| ThreadSnapshot {
            id: *id,
            name: entry.name.clone(),
            activity: entry.activity,
            age: now.saturating_duration_since(entry.started_at),
        })
        .collect()
}

/// Plain-text dump of every registered thread plus the caller's own stack.
pub fn all_backtraces() -> String {
    let mut out = String::new();
    for thread in registered_threads() {
        let _ = writeln!(
            out,
            "Thread '{}' (#{}, running {:.3}s):\n    in '{}'\n",
            thread.name,
            thread.id,
            thread.age.as_secs_f64(),
            thread.activity
        );
    }

    let current = std::thread::current();
    let _ = writeln!(
        out,
        "Thread '{}' (current):\n{}",
        current.name().unwrap_or("unnamed"),
        Backtrace::force_capture()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u64) -> Option<ThreadSnapshot> {
        registered_threads().into_iter().find(|t| t.id == id)
    }

    #[test]
    fn test_register_and_drop() {
        let registration = register_thread("activity-test-drop");
        let id = registration.id();

        let entry = snapshot(id).unwrap();
        assert_eq!(entry.name, "activity-test-drop");
        assert_eq!(entry.activity, "starting");

        drop(registration);
        assert!(snapshot(id).is_none());
    }

    #[test]
    fn test_set_activity() {
        let registration = register_thread("activity-test-update");
        registration.set_activity("reading headers");

        assert_eq!(snapshot(registration.id()).unwrap().activity, "reading headers");
    }

    #[test]
    fn test_all_backtraces_lists_threads() {
        let registration = register_thread("activity-test-dump");
        registration.set_activity("waiting for peer");

        let dump = all_backtraces();
        assert!(dump.contains("Thread 'activity-test-dump'"));
        assert!(dump.contains("in 'waiting for peer'"));
        assert!(dump.contains("(current)"));
    }

    #[test]
    fn test_registration_from_other_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let handle = std::thread::spawn(move || {
            let registration = register_thread("activity-test-worker");
            registration.set_activity("busy");
            tx.send(registration.id()).unwrap();
            done_rx.recv().unwrap();
        });

        let id = rx.recv().unwrap();
        assert_eq!(snapshot(id).unwrap().activity, "busy");

        done_tx.send(()).unwrap();
        handle.join().unwrap();
        assert!(snapshot(id).is_none());
    }
}
