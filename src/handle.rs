use crate::context::StateCell;
use crate::proto::WireSession;
use crate::refcount::RefCount;
use crate::{CompletionQueue, SessionState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The state shared by a `ZooKeeper`, its two worker threads, and any call in flight on it.
///
/// The wire session lives here, so it stays alive until the last of those lets go, even if the
/// application dropped its `ZooKeeper` long before.
pub(crate) struct Handle {
    /// Distinguishes this handle's worker threads from those of other handles.
    pub(crate) id: u64,
    pub(crate) session: Arc<dyn WireSession>,
    pub(crate) refs: RefCount,
    pub(crate) state: Arc<StateCell>,
    pub(crate) close_requested: AtomicBool,
    pub(crate) queue: CompletionQueue,
    /// Interrupts the I/O thread's poll.
    pub(crate) waker: mio::Waker,
    pub(crate) logger: slog::Logger,
}

impl Handle {
    pub(crate) fn new(
        session: Arc<dyn WireSession>,
        state: Arc<StateCell>,
        waker: mio::Waker,
        logger: slog::Logger,
    ) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Handle {
            id,
            session,
            refs: RefCount::new(),
            state,
            close_requested: AtomicBool::new(false),
            queue: CompletionQueue::new(),
            waker,
            logger: logger.new(slog::o!("handle" => id)),
        }
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.get()
    }
}
