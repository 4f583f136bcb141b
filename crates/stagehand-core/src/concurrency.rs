use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Exclusive advisory lock on a file, released on drop.
pub struct StoreLock {
    lock_file: File,
}

impl StoreLock {
    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = Self::open(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C lets the current install finish; the second exits.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current install (Ctrl-C again to abort)...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type Shared<T> = Result<T, Arc<CoreError>>;

struct Call<K, T> {
    key: K,
    outcome: Mutex<Option<Shared<T>>>,
    done: Condvar,
}

/// A single in-flight operation slot.
///
/// While an operation runs, a caller with an equal key joins it and receives
/// the same outcome; a caller with a different key waits for the slot to
/// settle and then runs its own. The slot is cleared whether the operation
/// succeeded, failed or panicked, so the next caller always starts fresh.
pub struct Flight<K, T> {
    current: Mutex<Option<Arc<Call<K, T>>>>,
    settled: Condvar,
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
            settled: Condvar::new(),
        }
    }
}

impl<K: PartialEq + Clone, T: Clone> Flight<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is running right now.
    pub fn busy(&self) -> bool {
        lock(&self.current).is_some()
    }

    /// Run `work` under `key`, or join an equal in-flight call.
    ///
    /// Errors are shared between every participant as [`CoreError::Shared`].
    pub fn run(&self, key: K, work: impl FnOnce() -> Result<T, CoreError>) -> Result<T, CoreError> {
        let mut slot = lock(&self.current);
        loop {
            match slot.as_ref() {
                None => break,
                Some(call) if call.key == key => {
                    let call = Arc::clone(call);
                    drop(slot);
                    debug!("joining in-flight operation");
                    return Self::wait(&call);
                }
                Some(_) => {
                    debug!("waiting for in-flight operation to settle");
                    slot = self.settled.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        let call = Arc::new(Call {
            key,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        *slot = Some(Arc::clone(&call));
        drop(slot);

        let settle = Settle { flight: self, call };
        let shared: Shared<T> = work().map_err(Arc::new);
        *lock(&settle.call.outcome) = Some(shared.clone());
        drop(settle);
        shared.map_err(CoreError::Shared)
    }

    fn wait(call: &Call<K, T>) -> Result<T, CoreError> {
        let mut outcome = lock(&call.outcome);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone().map_err(CoreError::Shared);
            }
            outcome = call.done.wait(outcome).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Releases the slot when the leader finishes, including by unwinding.
struct Settle<'a, K, T> {
    flight: &'a Flight<K, T>,
    call: Arc<Call<K, T>>,
}

impl<K, T> Drop for Settle<'_, K, T> {
    fn drop(&mut self) {
        {
            let mut outcome = lock(&self.call.outcome);
            if outcome.is_none() {
                *outcome = Some(Err(Arc::new(CoreError::Io(std::io::Error::other(
                    "in-flight operation panicked",
                )))));
            }
        }
        self.call.done.notify_all();
        *lock(&self.flight.current) = None;
        self.flight.settled.notify_all();
    }
}
