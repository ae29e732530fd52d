//! The contract between the dispatch engine and the wire session it drives.
//!
//! A [`WireSession`] owns the network protocol: it encodes requests, keeps track of the ones that
//! are outstanding, and decodes replies and watch notifications. The engine never inspects the
//! protocol. It only
//!
//!  - hands the session requests from application threads (`submit`),
//!  - runs the session's single-step event loop on the I/O thread (`interest` and `process`), and
//!  - drains the [`CompletionQueue`] the session fills, invoking the application's callbacks on the
//!    completion thread.
//!
//! The session is called concurrently from application threads and the I/O thread, so it must
//! protect its own bookkeeping; the engine adds no lock around it.

use crate::{CompletionQueue, CompletionToken, DefaultWatcher, ZkError};
use std::ops;
use std::os::unix::io::RawFd;
use std::time::Duration;

mod request;
mod response;
mod watch;

pub use self::request::{OpCode, Request};
pub use self::response::Reply;
pub use self::watch::{Watch, WatchType};

/// A request together with everything needed to complete it.
#[derive(Debug)]
pub struct Submission {
    /// The request id, from [`xid::next`](crate::xid::next).
    pub xid: i32,
    /// What to send.
    pub request: Request,
    /// Must be pushed onto the completion queue with the request's result, or dropped.
    pub completion: CompletionToken,
}

/// Socket readiness, in either direction: what the session wants to wait for, and what the I/O
/// thread observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub read: bool,
    pub write: bool,
}

impl Readiness {
    pub const NONE: Readiness = Readiness {
        read: false,
        write: false,
    };
    pub const READ: Readiness = Readiness {
        read: true,
        write: false,
    };
    pub const WRITE: Readiness = Readiness {
        read: false,
        write: true,
    };

    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

impl ops::BitOr for Readiness {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Readiness {
            read: self.read || rhs.read,
            write: self.write || rhs.write,
        }
    }
}

impl ops::BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// What the session wants the I/O thread to wait for before the next processing step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    /// The connected socket, if there is one.
    pub fd: Option<RawFd>,
    /// The readiness to wait for on `fd`.
    pub readiness: Readiness,
    /// Upper bound on the wait; the session is processed when it expires even if nothing is ready.
    pub timeout: Duration,
}

/// The outcome of one processing step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Keep going.
    Continue,
    /// The session has shut down; the I/O thread should exit.
    Closing,
}

/// The network half of a ZooKeeper client.
pub trait WireSession: Send + Sync + 'static {
    /// Installs the persistent watcher that receives session events and events for watches left
    /// with [`Watch::Global`]. Called once, before any other method.
    fn set_watcher(&self, watcher: DefaultWatcher);

    /// Queues a request for sending.
    ///
    /// On `Err`, the session must drop `submission.completion` without pushing it; no completion
    /// is ever delivered for a request whose submission failed.
    fn submit(&self, submission: Submission) -> Result<(), ZkError>;

    /// What to poll for before the next call to `process`.
    fn interest(&self) -> Interest;

    /// Does whatever work `ready` allows: sends queued requests, reads replies, and pushes the
    /// completions and watch events that became ready onto `queue`, in order.
    ///
    /// A completion or watch token the session drops here may own the application's last
    /// handle, in which case the handle closes on this thread and calls `flush_send_queue`
    /// before `process` returns. The session must therefore not hold its own lock while it drops
    /// tokens.
    fn process(&self, ready: Readiness, queue: &CompletionQueue) -> Result<Step, ZkError>;

    /// True once the session can no longer make progress (expired, or authentication failed).
    fn is_unrecoverable(&self) -> bool;

    /// Synchronously sends everything still queued, giving up after `timeout`.
    ///
    /// Called from the thread closing the handle, concurrently with the I/O thread.
    fn flush_send_queue(&self, timeout: Duration) -> Result<(), ZkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_combines() {
        let mut r = Readiness::NONE;
        assert!(r.is_empty());
        r |= Readiness::READ;
        assert_eq!(r | Readiness::WRITE, Readiness { read: true, write: true });
        assert!(!r.is_empty());
    }
}
