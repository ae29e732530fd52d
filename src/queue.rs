use crate::proto::Reply;
use crate::{CompletionToken, WatchToken, ZkError};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) enum Entry {
    Completion {
        token: CompletionToken,
        result: Result<Reply, ZkError>,
    },
    Watch {
        event_type: i32,
        state: i32,
        path: Option<String>,
        token: WatchToken,
    },
    /// Pushed by the I/O thread when it exits, and by `close`.
    Closing,
}

/// Completions and watch events that are ready to be handed to the application, in order.
///
/// The wire session pushes onto the queue from `process`; the handle's completion thread is the
/// only consumer. Callbacks are invoked with the queue unlocked, so a callback may issue new
/// requests on the same handle.
pub struct CompletionQueue {
    entries: Mutex<VecDeque<Entry>>,
    cond: Condvar,
}

impl CompletionQueue {
    pub(crate) fn new() -> Self {
        CompletionQueue {
            entries: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        // entries are only ever pushed or popped under the lock, so a panic elsewhere cannot
        // leave the deque half-updated
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: Entry) {
        self.lock().push_back(entry);
        self.cond.notify_all();
    }

    /// Marks a request as finished.
    ///
    /// `result` is either the successful reply or the error the request failed with, including
    /// `ConnectionLoss` and `OperationTimeout` for requests the connection failed under.
    pub fn complete(&self, token: CompletionToken, result: Result<Reply, ZkError>) {
        self.push(Entry::Completion { token, result });
    }

    /// Queues a watch notification for delivery.
    ///
    /// `event_type` and `state` are the raw codes from the wire; `path` must be `None` exactly
    /// for session events.
    pub fn deliver(&self, event_type: i32, state: i32, path: Option<String>, token: WatchToken) {
        self.push(Entry::Watch {
            event_type,
            state,
            path,
            token,
        });
    }

    /// Number of entries not yet taken by the completion thread.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn close(&self) {
        self.push(Entry::Closing);
    }

    pub(crate) fn pop(&self) -> Option<Entry> {
        self.lock().pop_front()
    }

    /// Blocks until there is at least one entry.
    pub(crate) fn wait(&self) {
        let mut entries = self.lock();
        while entries.is_empty() {
            entries = self
                .cond
                .wait(entries)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("len", &self.len())
            .finish()
    }
}
