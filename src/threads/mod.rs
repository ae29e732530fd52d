//! The two worker threads behind every handle, and their start-up and shutdown.
//!
//! The I/O thread runs the wire session's event loop; the completion thread invokes the
//! application's callbacks. Shutdown follows one protocol:
//!
//!  1. `close` sets `close_requested` and wakes the I/O thread.
//!  2. The I/O thread leaves its loop (on `close_requested`, on `Step::Closing`, or when the
//!     session becomes unrecoverable) and, on its way out, pushes a closing sentinel onto the
//!     completion queue.
//!  3. `close` joins the I/O thread (or detaches it, if `close` is running on it) and pushes a
//!     sentinel of its own.
//!  4. The completion thread delivers everything in order up to the first sentinel it pops once
//!     `close_requested` is set, drains whatever was queued after it once more, and exits. A
//!     sentinel popped earlier (the I/O thread gave up on an unrecoverable session) is skipped.
//!  5. `close` joins the completion thread, or detaches it if `close` is running on it.

use crate::handle::Handle;
use failure::format_err;
use slog::{debug, error};
use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

mod completion;
mod io;

pub(crate) use self::io::WAKE;

/// Which of a handle's workers a thread is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerRole {
    Io,
    Completion,
}

thread_local! {
    static ROLE: Cell<Option<(u64, WorkerRole)>> = const { Cell::new(None) };
}

fn set_role(handle: &Handle, role: WorkerRole) {
    ROLE.with(|r| r.set(Some((handle.id, role))));
}

/// The role the current thread plays for `handle`, if any.
pub(crate) fn current_role(handle: &Handle) -> Option<WorkerRole> {
    ROLE.with(|r| match r.get() {
        Some((id, role)) if id == handle.id => Some(role),
        _ => None,
    })
}

/// Rendezvous for the initializing thread and both workers.
///
/// Each worker counts itself in and then waits for the other, so neither proceeds until both are
/// running.
pub(crate) struct StartGate {
    waiting: Mutex<usize>,
    cond: Condvar,
}

impl StartGate {
    pub(crate) fn new(threads: usize) -> Self {
        StartGate {
            waiting: Mutex::new(threads),
            cond: Condvar::new(),
        }
    }

    /// Called by a worker once it is running.
    pub(crate) fn arrive(&self) {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        *waiting = waiting.saturating_sub(1);
        self.cond.notify_all();
        while *waiting > 0 {
            waiting = self
                .cond
                .wait(waiting)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Called by the initializing thread.
    pub(crate) fn wait(&self) {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        while *waiting > 0 {
            waiting = self
                .cond
                .wait(waiting)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Opens the gate without waiting for the remaining arrivals.
    pub(crate) fn abandon(&self) {
        *self.waiting.lock().unwrap_or_else(PoisonError::into_inner) = 0;
        self.cond.notify_all();
    }
}

/// The worker threads of one handle.
pub(crate) struct Adaptor {
    io: Mutex<Option<JoinHandle<()>>>,
    completion: Mutex<Option<JoinHandle<()>>>,
}

impl Adaptor {
    /// Starts both workers and returns once both are running.
    pub(crate) fn start(
        handle: &Arc<Handle>,
        poll: mio::Poll,
        events_capacity: usize,
    ) -> Result<Adaptor, failure::Error> {
        // keep the handle referenced while initialization is in progress
        let _guard = handle.refs.guard();
        let gate = Arc::new(StartGate::new(2));
        debug!(handle.logger, "starting threads...");

        let io = {
            let handle = handle.clone();
            let gate = gate.clone();
            thread::Builder::new()
                .name(format!("zk-io-{}", handle.id))
                .spawn(move || io::run(handle, poll, gate, events_capacity))
                .map_err(|e| format_err!("failed to spawn I/O thread: {}", e))?
        };

        let completion = {
            let handle = handle.clone();
            let gate = gate.clone();
            thread::Builder::new()
                .name(format!("zk-completion-{}", handle.id))
                .spawn(move || completion::run(handle, gate))
        };
        let completion = match completion {
            Ok(t) => t,
            Err(e) => {
                error!(handle.logger, "failed to spawn completion thread"; "error" => %e);
                handle.close_requested.store(true, Ordering::Release);
                gate.abandon();
                let _ = handle.waker.wake();
                let _ = io.join();
                return Err(format_err!("failed to spawn completion thread: {}", e));
            }
        };

        gate.wait();
        Ok(Adaptor {
            io: Mutex::new(Some(io)),
            completion: Mutex::new(Some(completion)),
        })
    }

    /// Joins both workers, detaching instead whichever one the caller is running on.
    ///
    /// The caller must already have set `close_requested` and woken the I/O thread.
    pub(crate) fn finish(&self, handle: &Handle) {
        let me = current_role(handle);

        if let Some(io) = take(&self.io) {
            if me == Some(WorkerRole::Io) {
                debug!(handle.logger, "detaching I/O thread from itself");
                drop(io);
            } else if io.join().is_err() {
                error!(handle.logger, "I/O thread panicked");
            }
        }

        // the I/O thread may have left long ago, and its sentinel been skipped; when running on
        // it, its own sentinel would only come once we return
        handle.queue.close();

        if let Some(completion) = take(&self.completion) {
            if me == Some(WorkerRole::Completion) {
                debug!(handle.logger, "detaching completion thread from itself");
                drop(completion);
            } else if completion.join().is_err() {
                error!(handle.logger, "completion thread panicked");
            }
        }
    }
}

fn take(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}
