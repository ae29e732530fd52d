use super::{set_role, StartGate, WorkerRole};
use crate::dispatch;
use crate::handle::Handle;
use crate::queue::Entry;
use slog::debug;
use std::sync::Arc;

pub(super) fn run(handle: Arc<Handle>, gate: Arc<StartGate>) {
    let _ref = handle.refs.guard();
    set_role(&handle, WorkerRole::Completion);
    gate.arrive();
    debug!(handle.logger, "started completion thread");

    loop {
        handle.queue.wait();
        // a sentinel seen before close was requested only means the I/O thread gave up on an
        // unrecoverable session; keep the handle referenced until the application closes it
        if process_completions(&handle) && handle.is_closing() {
            break;
        }
    }
    // the I/O thread is gone, but application threads may have raced a last entry in
    process_completions(&handle);

    debug!(handle.logger, "completion thread terminated");
}

/// Dispatches queued entries in order until the queue is empty or the closing sentinel comes up.
///
/// Returns whether the sentinel was seen.
fn process_completions(handle: &Handle) -> bool {
    while let Some(entry) = handle.queue.pop() {
        let _ref = handle.refs.guard();
        match entry {
            Entry::Completion { token, result } => {
                dispatch::completion(token, result, &handle.logger)
            }
            Entry::Watch {
                event_type,
                state,
                path,
                token,
            } => dispatch::watch(event_type, state, path, token, &handle.logger),
            Entry::Closing => return true,
        }
    }
    false
}
