use super::{set_role, StartGate, WorkerRole};
use crate::handle::Handle;
use crate::proto::{Interest, Readiness, Step};
use mio::unix::SourceFd;
use mio::{Events, Poll, Registry, Token};
use slog::{debug, info, trace, warn};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

pub(crate) const WAKE: Token = Token(0);
const SESSION: Token = Token(1);

/// Pushes the closing sentinel when the I/O thread leaves its loop, however it leaves it.
struct CloseOnExit<'a>(&'a Handle);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.queue.close();
    }
}

pub(super) fn run(handle: Arc<Handle>, mut poll: Poll, gate: Arc<StartGate>, capacity: usize) {
    let _ref = handle.refs.guard();
    set_role(&handle, WorkerRole::Io);
    gate.arrive();
    let _sentinel = CloseOnExit(&handle);
    let log = &handle.logger;
    debug!(log, "started IO thread");

    let mut events = Events::with_capacity(capacity);
    let mut registered: Option<RawFd> = None;

    while !handle.is_closing() {
        let interest = handle.session.interest();
        if let Err(e) = register(poll.registry(), &mut registered, &interest) {
            warn!(log, "failed to register session socket"; "fd" => ?interest.fd, "error" => %e);
        }

        if let Err(e) = poll.poll(&mut events, Some(interest.timeout)) {
            if e.kind() != io::ErrorKind::Interrupted {
                warn!(log, "poll failed"; "error" => %e);
            }
            events.clear();
        }

        let mut ready = Readiness::NONE;
        for event in events.iter() {
            match event.token() {
                SESSION => {
                    if event.is_readable() || event.is_read_closed() || event.is_error() {
                        ready |= Readiness::READ;
                    }
                    if event.is_writable() || event.is_write_closed() {
                        ready |= Readiness::WRITE;
                    }
                }
                // the waker only exists to cut the poll short
                WAKE => trace!(log, "woken up"),
                _ => unreachable!(),
            }
        }

        match handle.session.process(ready, &handle.queue) {
            Ok(Step::Continue) => {}
            Ok(Step::Closing) => {
                debug!(log, "session is closing");
                break;
            }
            Err(e) => debug!(log, "processing step failed"; "error" => %e),
        }

        // check the current state of the session and terminate if it is unrecoverable
        if handle.session.is_unrecoverable() {
            info!(log, "session is unrecoverable"; "state" => ?handle.state());
            break;
        }
    }

    if let Some(fd) = registered {
        // the session may already have closed the socket
        let _ = poll.registry().deregister(&mut SourceFd(&fd));
    }
    debug!(log, "IO thread terminated");
}

fn to_mio(readiness: Readiness) -> Option<mio::Interest> {
    match (readiness.read, readiness.write) {
        (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
        (true, false) => Some(mio::Interest::READABLE),
        (false, true) => Some(mio::Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Brings the poller's registration of the session socket in line with `interest`.
///
/// The socket is re-registered on every iteration: the poller is edge-triggered, and
/// re-registering re-arms it, so readiness the session left unconsumed is reported again.
fn register(
    registry: &Registry,
    registered: &mut Option<RawFd>,
    interest: &Interest,
) -> io::Result<()> {
    let wanted = interest
        .fd
        .and_then(|fd| to_mio(interest.readiness).map(|i| (fd, i)));

    match (*registered, wanted) {
        (Some(old), Some((fd, i))) if old == fd => {
            if registry.reregister(&mut SourceFd(&fd), SESSION, i).is_err() {
                // the socket was closed and its descriptor reused since the last iteration
                *registered = None;
                registry.register(&mut SourceFd(&fd), SESSION, i)?;
                *registered = Some(fd);
            }
        }
        (old, wanted) => {
            if let Some(old) = old {
                let _ = registry.deregister(&mut SourceFd(&old));
                *registered = None;
            }
            if let Some((fd, i)) = wanted {
                registry.register(&mut SourceFd(&fd), SESSION, i)?;
                *registered = Some(fd);
            }
        }
    }
    Ok(())
}
