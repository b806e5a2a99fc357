//! Single-writer / multiple-reader access lock guarding the group store.
//!
//! Acquisitions are served in arrival order: every caller draws a ticket and
//! waits until its ticket is at the head of the line *and* the lock is in a
//! compatible state. Consecutive readers therefore share the lock, while a
//! waiting writer holds back every reader that arrived after it, so writers
//! cannot be starved by a steady stream of readers.
//!
//! The lock is not reentrant. Callers must not request a second acquisition
//! on the same thread while holding a guard.

use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::GroupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Idle,
    Reading(usize),
    Writing,
}

#[derive(Debug)]
struct LockState {
    access: Access,
    next_ticket: u64,
    serving: u64,
}

/// Admission state machine. The data itself sits in a `RwLock` that is only
/// taken once the gate has admitted the caller, so it never contends.
#[derive(Debug)]
struct Gate {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                access: Access::Idle,
                next_ticket: 0,
                serving: 0,
            }),
            changed: Condvar::new(),
        }
    }

    fn admit_reader(&self) -> ReadAdmission<'_> {
        let mut state = self.state.lock();
        let ticket = take_ticket(&mut state);
        while state.serving != ticket || state.access == Access::Writing {
            self.changed.wait(&mut state);
        }
        state.access = match state.access {
            Access::Reading(n) => Access::Reading(n + 1),
            _ => Access::Reading(1),
        };
        state.serving += 1;
        drop(state);
        // the next ticket may be another reader that can join right away
        self.changed.notify_all();
        ReadAdmission { gate: self }
    }

    fn admit_writer(&self) -> WriteAdmission<'_> {
        let mut state = self.state.lock();
        let ticket = take_ticket(&mut state);
        while state.serving != ticket || state.access != Access::Idle {
            self.changed.wait(&mut state);
        }
        state.access = Access::Writing;
        state.serving += 1;
        WriteAdmission { gate: self }
    }
}

fn take_ticket(state: &mut LockState) -> u64 {
    let ticket = state.next_ticket;
    state.next_ticket += 1;
    ticket
}

struct ReadAdmission<'a> {
    gate: &'a Gate,
}

impl Drop for ReadAdmission<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.access = match state.access {
            Access::Reading(n) if n > 1 => Access::Reading(n - 1),
            _ => Access::Idle,
        };
        drop(state);
        self.gate.changed.notify_all();
    }
}

struct WriteAdmission<'a> {
    gate: &'a Gate,
}

impl Drop for WriteAdmission<'_> {
    fn drop(&mut self) {
        self.gate.state.lock().access = Access::Idle;
        self.gate.changed.notify_all();
    }
}

pub struct AccessLock<T> {
    gate: Gate,
    durable: Option<DurableLock>,
    data: RwLock<T>,
}

impl<T> AccessLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            gate: Gate::new(),
            durable: None,
            data: RwLock::new(data),
        }
    }

    /// Additionally serialize writers across processes through an advisory
    /// lock on `path`.
    pub fn with_durable(data: T, path: impl Into<PathBuf>) -> Self {
        let mut lock = Self::new(data);
        lock.durable = Some(DurableLock { path: path.into() });
        lock
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Current state, for diagnostics and tests.
    pub fn access(&self) -> Access {
        self.gate.state.lock().access
    }

    /// Block until shared access is granted.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let admission = self.gate.admit_reader();
        ReadGuard {
            data: self.data.read(),
            _admission: admission,
        }
    }

    /// Block until exclusive access is granted. With a durable backend the
    /// advisory file lock is taken after the in-process one.
    pub fn write(&self) -> Result<WriteGuard<'_, T>, GroupError> {
        let admission = self.gate.admit_writer();
        // on error the admission is dropped and the next ticket goes ahead
        let file = self
            .durable
            .as_ref()
            .map(DurableLock::acquire)
            .transpose()?;
        Ok(WriteGuard {
            data: self.data.write(),
            file,
            _admission: admission,
        })
    }
}

impl<T: Default> Default for AccessLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// Fields drop in declaration order: the data guard goes before the admission
// is handed back.
pub struct ReadGuard<'a, T> {
    data: RwLockReadGuard<'a, T>,
    _admission: ReadAdmission<'a>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

pub struct WriteGuard<'a, T> {
    data: RwLockWriteGuard<'a, T>,
    file: Option<DurableFile>,
    _admission: WriteAdmission<'a>,
}

impl<T> WriteGuard<'_, T> {
    pub fn is_durable(&self) -> bool {
        self.file.is_some()
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// Lock file held for the duration of one write acquisition.
struct DurableFile(File);

impl Drop for DurableFile {
    fn drop(&mut self) {
        if let Err(err) = self.0.unlock() {
            tracing::warn!(error = %err, "Failed to release durable write lock");
        }
    }
}

#[derive(Debug)]
struct DurableLock {
    path: PathBuf,
}

impl DurableLock {
    fn acquire(&self) -> Result<DurableFile, GroupError> {
        let storage_err = |source: std::io::Error| GroupError::Storage {
            path: self.path.display().to_string(),
            source,
        };
        ensure_parent(&self.path).map_err(storage_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(storage_err)?;
        file.lock().map_err(storage_err)?;
        tracing::trace!(path = %self.path.display(), "Durable write lock acquired");
        Ok(DurableFile(file))
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const SHORT: Duration = Duration::from_millis(100);

    #[test]
    fn test_idle_read_write_transitions() {
        let lock = AccessLock::new(1);
        assert_eq!(lock.access(), Access::Idle);
        {
            let a = lock.read();
            let b = lock.read();
            assert_eq!(*a + *b, 2);
            assert_eq!(lock.access(), Access::Reading(2));
        }
        assert_eq!(lock.access(), Access::Idle);
        {
            let mut w = lock.write().unwrap();
            *w = 5;
            assert_eq!(lock.access(), Access::Writing);
        }
        assert_eq!(lock.access(), Access::Idle);
        assert_eq!(*lock.read(), 5);
    }

    #[test]
    fn test_concurrent_readers_do_not_block_each_other() {
        let lock = Arc::new(AccessLock::new(()));
        let readers = 8;
        let barrier = Arc::new(Barrier::new(readers));
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let _guard = lock.read();
                    // every reader holds the lock while waiting for the others
                    barrier.wait();
                    tx.send(()).unwrap();
                })
            })
            .collect();

        for _ in 0..readers {
            rx.recv_timeout(WAIT).expect("reader was blocked");
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.access(), Access::Idle);
    }

    #[test]
    fn test_writer_waits_for_readers() {
        let lock = Arc::new(AccessLock::new(0));
        let reader = lock.read();

        let (tx, rx) = mpsc::channel();
        let writer = {
            let lock = lock.clone();
            thread::spawn(move || {
                let mut guard = lock.write().unwrap();
                *guard += 1;
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(SHORT).is_err(), "writer entered while a reader was active");
        drop(reader);
        rx.recv_timeout(WAIT).expect("writer never acquired the lock");
        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn test_readers_wait_for_writer() {
        let lock = Arc::new(AccessLock::new(0));
        let mut writer = lock.write().unwrap();

        let (tx, rx) = mpsc::channel();
        let reader = {
            let lock = lock.clone();
            thread::spawn(move || {
                let value = *lock.read();
                tx.send(value).unwrap();
            })
        };

        assert!(rx.recv_timeout(SHORT).is_err(), "reader entered while writing");
        *writer = 42;
        drop(writer);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
        reader.join().unwrap();
    }

    #[test]
    fn test_waiting_writer_holds_back_new_readers() {
        let lock = Arc::new(AccessLock::new(Vec::<&'static str>::new()));
        let first_reader = lock.read();

        let (writer_tx, writer_rx) = mpsc::channel();
        let writer = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.write().unwrap().push("writer");
                writer_tx.send(()).unwrap();
            })
        };
        // let the writer take its ticket
        while lock.gate.state.lock().next_ticket < 2 {
            thread::sleep(Duration::from_millis(5));
        }

        let (reader_tx, reader_rx) = mpsc::channel();
        let late_reader = {
            let lock = lock.clone();
            thread::spawn(move || {
                let seen = (*lock.read()).clone();
                reader_tx.send(seen).unwrap();
            })
        };

        assert!(reader_rx.recv_timeout(SHORT).is_err(), "late reader overtook waiting writer");
        drop(first_reader);
        writer_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(reader_rx.recv_timeout(WAIT).unwrap(), vec!["writer"]);
        writer.join().unwrap();
        late_reader.join().unwrap();
    }

    #[test]
    fn test_writers_are_exclusive() {
        let lock = Arc::new(AccessLock::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        let mut guard = lock.write().unwrap();
                        let current = *guard;
                        thread::yield_now();
                        *guard = current + 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.read(), 1000);
    }

    #[test]
    fn test_durable_backend_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("groups.lock");
        let lock = AccessLock::with_durable(0, &path);
        assert!(lock.is_durable());
        {
            let guard = lock.write().unwrap();
            assert!(guard.is_durable());
        }
        assert!(path.exists());
        assert_eq!(lock.access(), Access::Idle);
        // the file lock is released with the guard
        let _again = lock.write().unwrap();
    }

    #[test]
    fn test_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AccessLock<Vec<String>>>();
    }

    #[test]
    fn test_failed_durable_acquire_releases_admission() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        // the lock file's parent is a regular file
        let lock = AccessLock::with_durable(7, blocker.join("groups.lock"));

        assert_eq!(lock.write().err().map(|e| e.kind()), Some("storage"));
        assert_eq!(lock.access(), Access::Idle);
        assert_eq!(*lock.read(), 7);
        assert!(lock.write().is_err());
    }
}
