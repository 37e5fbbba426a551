use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tokio::sync::watch;

#[derive(Debug, Default)]
struct SignalState {
    version: u64,
    shut_down: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Changed,
    TimedOut,
    Shutdown,
}

/// Version counter bumped on every accepted insert.
///
/// Waiting lookups remember the version they composed against and sleep until it moves,
/// either on the condvar (threads) or on the watch channel (tokio tasks).
#[derive(Debug)]
pub(crate) struct TfSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
    version: watch::Sender<u64>,
}

impl TfSignal {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Mutex::new(SignalState::default()),
            condvar: Condvar::new(),
            version,
        }
    }

    // the state is two plain integers, a panicking holder cannot leave it torn
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn version(&self) -> u64 {
        self.lock().version
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    pub(crate) fn notify(&self) {
        let mut state = self.lock();
        state.version += 1;
        self.version.send_replace(state.version);
        self.condvar.notify_all();
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        state.version += 1;
        self.version.send_replace(state.version);
        self.condvar.notify_all();
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Blocks the calling thread until the version differs from `seen`, the deadline passes
    /// or the buffer shuts down. Without a deadline only the last two end the wait.
    pub(crate) fn wait_for_change(&self, seen: u64, deadline: Option<Instant>) -> WaitOutcome {
        let mut state = self.lock();
        loop {
            if state.shut_down {
                return WaitOutcome::Shutdown;
            }
            if state.version != seen {
                return WaitOutcome::Changed;
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    match self.condvar.wait_timeout(state, deadline - now) {
                        Ok((state, _)) => state,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self
                    .condvar
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
