use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    atomic::{AtomicBool, AtomicU8, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use crate::error::StartError;

/// Lifecycle of a stage's background worker.
///
/// `Stopped -> Running` on start, `Running -> Stopping` on stop, and
/// `Stopping -> Stopped` once the worker thread has actually exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
    Stopping,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Stopped => 0,
            WorkerState::Running => 1,
            WorkerState::Stopping => 2,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// What `stop()` managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no running worker.
    NotRunning,
    /// The worker exited and was joined.
    Joined,
    /// The join timeout elapsed; the worker keeps finishing in the background.
    Detached,
}

struct WorkerThread {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Marks the worker dead however its body ends, panics included.
struct ExitGuard {
    alive: Arc<AtomicBool>,
    _done: Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Start/stop bookkeeping shared by every stage.
///
/// `start` and `stop` serialize on an internal mutex; the submit path only
/// reads atomics so it never waits on a concurrent stop.
pub(crate) struct Lifecycle {
    name: &'static str,
    state: AtomicU8,
    alive: Arc<AtomicBool>,
    worker: Mutex<Option<WorkerThread>>,
}

impl Lifecycle {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU8::new(WorkerState::Stopped.as_u8()),
            alive: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        if self.load() == WorkerState::Stopping {
            // A detached worker may have exited since the last stop().
            match self.worker.try_lock() {
                Ok(mut slot) => self.reap(&mut slot),
                Err(TryLockError::Poisoned(e)) => self.reap(&mut e.into_inner()),
                Err(TryLockError::WouldBlock) => {}
            }
        }
        self.load()
    }

    /// True while started and the worker thread has not exited on its own.
    pub(crate) fn is_running(&self) -> bool {
        self.load() == WorkerState::Running && self.alive.load(Ordering::Acquire)
    }

    /// Runs `prepare` and, if it succeeds, hands its result to `body` on a
    /// new worker thread. `prepare` runs under the lifecycle lock, so it is
    /// never concurrent with another start or stop.
    pub(crate) fn start<R, P, F>(&self, prepare: P, body: F) -> Result<(), StartError>
    where
        R: Send + 'static,
        P: FnOnce() -> Result<R, StartError>,
        F: FnOnce(R, CancellationToken) + Send + 'static,
    {
        let mut slot = self.lock();
        self.reap(&mut slot);
        match self.load() {
            WorkerState::Running => {
                log::warn!("{} is already running", self.name);
                return Err(StartError::AlreadyRunning(self.name));
            }
            WorkerState::Stopping => {
                log::warn!("{} is still stopping", self.name);
                return Err(StartError::StillStopping(self.name));
            }
            WorkerState::Stopped => {}
        }

        let resource = prepare()?;

        let cancel = CancellationToken::new();
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let guard = ExitGuard {
            alive: Arc::clone(&self.alive),
            _done: done_tx,
        };
        self.alive.store(true, Ordering::Release);

        let token = cancel.clone();
        let handle = std::thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || {
                let _guard = guard;
                body(resource, token);
            })
            .map_err(|source| {
                self.alive.store(false, Ordering::Release);
                StartError::Spawn {
                    name: self.name,
                    source,
                }
            })?;

        *slot = Some(WorkerThread {
            cancel,
            handle,
            done,
        });
        self.store(WorkerState::Running);
        Ok(())
    }

    /// Signals the worker and waits for it. `None` waits until it exits;
    /// `Some(timeout)` gives up after `timeout` and leaves it detached.
    pub(crate) fn stop(&self, timeout: Option<Duration>) -> StopOutcome {
        let mut slot = self.lock();
        self.reap(&mut slot);
        match self.load() {
            WorkerState::Running => {}
            WorkerState::Stopping => {
                log::warn!("{} is already stopping", self.name);
                return StopOutcome::NotRunning;
            }
            WorkerState::Stopped => {
                log::warn!("{} is not running", self.name);
                return StopOutcome::NotRunning;
            }
        }

        self.store(WorkerState::Stopping);
        let Some(worker) = slot.take() else {
            self.store(WorkerState::Stopped);
            return StopOutcome::NotRunning;
        };

        log::info!("stopping {}...", self.name);
        worker.cancel.cancel();
        let exited = match timeout {
            None => true,
            Some(timeout) => !matches!(
                worker.done.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            ),
        };

        if exited {
            if worker.handle.join().is_err() {
                log::error!("{} worker panicked", self.name);
            }
            self.store(WorkerState::Stopped);
            log::info!("{} stopped", self.name);
            StopOutcome::Joined
        } else {
            log::warn!(
                "{} worker did not exit within {:?}, leaving it to finish in the background",
                self.name,
                timeout.unwrap_or_default()
            );
            *slot = Some(worker);
            StopOutcome::Detached
        }
    }

    fn reap(&self, slot: &mut Option<WorkerThread>) {
        if self.load() != WorkerState::Stopping {
            return;
        }
        match slot.take() {
            Some(worker) if worker.handle.is_finished() => {
                if worker.handle.join().is_err() {
                    log::error!("{} worker panicked", self.name);
                }
                self.store(WorkerState::Stopped);
            }
            Some(worker) => *slot = Some(worker),
            None => self.store(WorkerState::Stopped),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WorkerThread>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn store(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(worker) = self.lock().take() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
