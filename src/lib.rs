//! This crate provides a multi-threaded, callback-driven client for interacting with
//! [Apache ZooKeeper](https://zookeeper.apache.org/), a highly reliable distributed service for
//! maintaining configuration information, naming, providing distributed synchronization, and
//! providing group services.
//!
//! # About ZooKeeper
//!
//! The [ZooKeeper Overview](https://zookeeper.apache.org/doc/current/zookeeperOver.html) provides
//! a thorough introduction to ZooKeeper, but we'll repeat the most important points here. At its
//! [heart](https://zookeeper.apache.org/doc/current/zookeeperOver.html#sc_designGoals), ZooKeeper
//! is a [hierarchical key-value
//! store](https://zookeeper.apache.org/doc/current/zookeeperOver.html#sc_dataModelNameSpace) (that
//! is, keys can have "sub-keys"), which additional mechanisms that guarantee consistent operation
//! across client and server failures. Keys in ZooKeeper look like paths (e.g., `/key/subkey`), and
//! every item along a path is called a
//! "[Znode](https://zookeeper.apache.org/doc/current/zookeeperOver.html#Nodes+and+ephemeral+nodes)".
//! Each Znode (including those with children) can also have associated data, which can be queried
//! and updated like in other key-value stores. Clients can also set
//! [watches](https://zookeeper.apache.org/doc/current/zookeeperOver.html#Conditional+updates+and+watches)
//! on Znodes to be notified when they change.
//!
//! # How this client works
//!
//! A [`ZooKeeper`] wraps a [`WireSession`](proto::WireSession), which speaks the network
//! protocol, and runs two threads on its behalf:
//!
//!  - the I/O thread polls the session's socket and lets the session process whatever it can, and
//!  - the completion thread invokes the callbacks and watchers of the application, one at a time,
//!    in the order the session made them ready.
//!
//! Every operation returns as soon as its request has been handed to the session. The result
//! arrives later, on the completion thread, through the callback passed along with the request.
//! If no callback is given, the result is discarded. An `Err` returned by the operation itself
//! means the request was never submitted, and its callback will never be invoked.
//!
//! To wait for a result, pair the request with [`callback::oneshot`]:
//!
//! ```rust,ignore
//! let zk = ZooKeeperBuilder::default().start(session)?;
//! let (cb, stat) = callback::oneshot();
//! zk.exists("/example", WatchMode::None, Some(cb))?;
//! match stat.await? {
//!     Ok(stat) => println!("exists: {:?}", stat),
//!     Err(ZkError::NoNode) => println!("no such node"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```
//!
//! # Watches
//!
//! Read operations (`exists`, `get_data`, `get_children`) can leave a watch behind. With
//! [`WatchMode::Global`], the event goes to the default watcher given to the
//! [`ZooKeeperBuilder`], which also receives all session state changes. With
//! [`WatchMode::Custom`], it goes to a watcher of its own, which is invoked at most once.
//!
//! By the time a watcher sees a session event, [`ZooKeeper::state`] already reports the state it
//! carries.
//!
//! # Closing
//!
//! [`ZooKeeper::close`] (or dropping the handle) stops both threads. It may be called from any
//! thread, including from within a callback. Requests still outstanding in the session when it
//! goes away are abandoned without their callbacks being invoked; a future obtained from
//! [`callback::oneshot`] for such a request resolves to an error.

use failure::bail;
use slog::{debug, info, o, trace, warn};
use std::borrow::Cow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

pub mod callback;
mod context;
mod dispatch;
mod error;
mod handle;
#[cfg(test)]
mod mock;
pub mod proto;
mod queue;
mod refcount;
mod threads;
mod types;

pub use self::callback::{
    AclCallback, Callback, ChildrenCallback, DataCallback, StatCallback, StringCallback,
    VoidCallback, Watcher,
};
pub use self::context::{CompletionToken, DefaultWatcher, Disposal, ReplyShape, WatchToken};
pub use self::error::ZkError;
pub use self::queue::CompletionQueue;
pub use self::refcount::xid;
pub use self::types::*;

use self::context::{Slot, StateCell};
use self::handle::Handle;
use self::proto::{Request, Submission, Watch, WireSession};
use self::threads::Adaptor;

/// Whether, and to whom, a read operation leaves a watch behind.
#[derive(Clone)]
pub enum WatchMode {
    /// Leave no watch.
    None,
    /// Notify the default watcher of the handle.
    Global,
    /// Notify this watcher, once.
    Custom(Arc<dyn Watcher>),
}

impl From<Arc<dyn Watcher>> for WatchMode {
    fn from(w: Arc<dyn Watcher>) -> Self {
        WatchMode::Custom(w)
    }
}

/// Builder that allows customizing options for ZooKeeper handles.
#[derive(Clone)]
pub struct ZooKeeperBuilder {
    logger: slog::Logger,
    watcher: Option<Arc<dyn Watcher>>,
    flush_timeout: Duration,
    events_capacity: usize,
}

impl Default for ZooKeeperBuilder {
    fn default() -> Self {
        ZooKeeperBuilder {
            logger: slog::Logger::root(slog::Discard, o!()),
            watcher: None,
            flush_timeout: Duration::from_secs(1),
            events_capacity: 16,
        }
    }
}

impl ZooKeeperBuilder {
    /// Set the logger that should be used internally in the ZooKeeper client.
    ///
    /// By default, all logging is disabled. See also [the `slog`
    /// documentation](https://docs.rs/slog).
    pub fn set_logger(&mut self, l: slog::Logger) -> &mut Self {
        self.logger = l;
        self
    }

    /// Set the default watcher, which receives session state changes and the events of watches
    /// left with [`WatchMode::Global`].
    pub fn set_watcher(&mut self, w: Arc<dyn Watcher>) -> &mut Self {
        self.watcher = Some(w);
        self
    }

    /// Set how long `close` waits for requests that have not been sent yet.
    ///
    /// Defaults to one second.
    pub fn set_flush_timeout(&mut self, t: Duration) -> &mut Self {
        self.flush_timeout = t;
        self
    }

    /// Set how many readiness events the I/O thread collects per poll.
    pub fn set_events_capacity(&mut self, n: usize) -> &mut Self {
        self.events_capacity = n;
        self
    }

    /// Take ownership of `session` and start the worker threads driving it.
    ///
    /// Returns once both threads are running.
    pub fn start(self, session: Arc<dyn WireSession>) -> Result<ZooKeeper, failure::Error> {
        if self.events_capacity == 0 {
            bail!("the I/O thread must be able to collect at least one event per poll");
        }

        let poll = mio::Poll::new()?;
        let waker = mio::Waker::new(poll.registry(), threads::WAKE)?;

        let state = Arc::new(StateCell::new(SessionState::Connecting));
        session.set_watcher(DefaultWatcher::new(state.clone(), self.watcher));

        let handle = Arc::new(Handle::new(session, state, waker, self.logger));
        let adaptor = Adaptor::start(&handle, poll, self.events_capacity)?;
        info!(handle.logger, "session handle started");

        Ok(ZooKeeper {
            handle,
            adaptor,
            flush_timeout: self.flush_timeout,
        })
    }
}

/// A handle to a ZooKeeper session.
///
/// All operations may be called concurrently from any number of threads.
pub struct ZooKeeper {
    handle: Arc<Handle>,
    adaptor: Adaptor,
    flush_timeout: Duration,
}

impl ZooKeeper {
    /// Start a handle around `session` with the default options.
    ///
    /// See [`ZooKeeperBuilder::start`].
    pub fn new(session: Arc<dyn WireSession>) -> Result<Self, failure::Error> {
        ZooKeeperBuilder::default().start(session)
    }

    /// The session state most recently reported by the wire session.
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Create a node with the given `path` with `data` as its contents.
    ///
    /// The callback receives the path of the node that was created, which differs from `path`
    /// for sequential nodes.
    ///
    /// If `mode` is sequential, `path` may end in a `/`, which leaves the node's name to be just
    /// the sequence number. The callback receives `ZkError::NodeExists` if a node with the same
    /// path already exists, `ZkError::NoNode` if the parent node does not, and
    /// `ZkError::NoChildrenForEphemerals` if the parent is ephemeral.
    pub fn create<D, A>(
        &self,
        path: &str,
        data: D,
        acl: A,
        mode: CreateMode,
        callback: Option<StringCallback>,
    ) -> Result<(), ZkError>
    where
        D: Into<Cow<'static, [u8]>>,
        A: Into<Cow<'static, [Acl]>>,
    {
        validate_path(path, mode.is_sequential())?;
        let acl = acl.into();
        if acl.is_empty() {
            return Err(ZkError::InvalidAcl);
        }
        let request = Request::Create {
            path: path.to_string(),
            data: data.into(),
            acl,
            mode,
        };
        self.submit(request, Slot::String(callback))
    }

    /// Delete the node at `path`.
    ///
    /// The callback receives `ZkError::BadVersion` if `version` is given and does not match the
    /// node's version, and `ZkError::NotEmpty` if the node has children.
    pub fn delete(
        &self,
        path: &str,
        version: Option<i32>,
        callback: Option<VoidCallback>,
    ) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::Delete {
            path: path.to_string(),
            version: version.unwrap_or(-1),
        };
        self.submit(request, Slot::Void(callback))
    }

    /// Check whether a node exists at `path`, and retrieve its `Stat` if it does.
    ///
    /// A watch is left even if the node does not exist, in which case it fires when the node is
    /// created.
    pub fn exists(
        &self,
        path: &str,
        watch: WatchMode,
        callback: Option<StatCallback>,
    ) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::Exists {
            path: path.to_string(),
            watch: self.watch(watch),
        };
        self.submit(request, Slot::Stat(callback))
    }

    /// Retrieve the data and `Stat` of the node at `path`.
    pub fn get_data(
        &self,
        path: &str,
        watch: WatchMode,
        callback: Option<DataCallback>,
    ) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::GetData {
            path: path.to_string(),
            watch: self.watch(watch),
        };
        self.submit(request, Slot::Data(callback))
    }

    /// Replace the data of the node at `path`, if `version` is `None` or matches its version.
    pub fn set_data<D>(
        &self,
        path: &str,
        data: D,
        version: Option<i32>,
        callback: Option<StatCallback>,
    ) -> Result<(), ZkError>
    where
        D: Into<Cow<'static, [u8]>>,
    {
        validate_path(path, false)?;
        let request = Request::SetData {
            path: path.to_string(),
            data: data.into(),
            version: version.unwrap_or(-1),
        };
        self.submit(request, Slot::Stat(callback))
    }

    /// Retrieve the names of the children of the node at `path`, and its `Stat`.
    pub fn get_children(
        &self,
        path: &str,
        watch: WatchMode,
        callback: Option<ChildrenCallback>,
    ) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::GetChildren {
            path: path.to_string(),
            watch: self.watch(watch),
        };
        self.submit(request, Slot::Children(callback))
    }

    /// Retrieve the ACL of the node at `path`, and its `Stat`.
    pub fn get_acl(&self, path: &str, callback: Option<AclCallback>) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::GetAcl {
            path: path.to_string(),
        };
        self.submit(request, Slot::Acl(callback))
    }

    /// Replace the ACL of the node at `path`, if `version` is `None` or matches its ACL version.
    pub fn set_acl<A>(
        &self,
        path: &str,
        acl: A,
        version: Option<i32>,
        callback: Option<VoidCallback>,
    ) -> Result<(), ZkError>
    where
        A: Into<Cow<'static, [Acl]>>,
    {
        validate_path(path, false)?;
        let acl = acl.into();
        if acl.is_empty() {
            return Err(ZkError::InvalidAcl);
        }
        let request = Request::SetAcl {
            path: path.to_string(),
            acl,
            version: version.unwrap_or(-1),
        };
        self.submit(request, Slot::Void(callback))
    }

    /// Make sure the server this session is connected to has caught up with the leader on
    /// `path`.
    pub fn sync(&self, path: &str, callback: Option<VoidCallback>) -> Result<(), ZkError> {
        validate_path(path, false)?;
        let request = Request::Sync {
            path: path.to_string(),
        };
        self.submit(request, Slot::Void(callback))
    }

    /// Add authentication information to the session.
    ///
    /// The callback is invoked with `scheme` as its path. `cert` is not handed back to it; a
    /// callback that needs the certificate has to capture it. A rejected certificate fails the
    /// callback with `ZkError::AuthFailed`, and typically ends the session as well.
    pub fn add_auth(
        &self,
        scheme: &str,
        cert: &[u8],
        callback: Option<VoidCallback>,
    ) -> Result<(), ZkError> {
        if scheme.is_empty() {
            return Err(ZkError::BadArguments);
        }
        let request = Request::Auth {
            scheme: scheme.to_string(),
            cert: cert.to_vec(),
        };
        self.submit(request, Slot::Void(callback))
    }

    /// Close the handle, stopping both of its threads.
    ///
    /// Requests that have not been sent yet are flushed first, for at most the flush timeout the
    /// handle was built with. A flush failure is returned, but the handle is torn down all the
    /// same.
    ///
    /// Closing an already closing handle returns `ZkError::Closing` and has no further effect.
    pub fn close(&self) -> Result<(), ZkError> {
        let handle = &*self.handle;
        let _ref = handle.refs.guard();
        if handle.close_requested.swap(true, Ordering::AcqRel) {
            debug!(handle.logger, "handle is already closing");
            return Err(ZkError::Closing);
        }
        info!(handle.logger, "closing session handle"; "state" => ?handle.state());

        let flushed = handle.session.flush_send_queue(self.flush_timeout);
        if let Err(e) = flushed {
            warn!(handle.logger, "failed to flush outstanding requests"; "error" => %e);
        }
        if let Err(e) = handle.waker.wake() {
            warn!(handle.logger, "failed to wake the I/O thread"; "error" => %e);
        }

        self.adaptor.finish(handle);
        debug!(handle.logger, "session handle closed");
        flushed
    }

    fn watch(&self, mode: WatchMode) -> Watch {
        match mode {
            WatchMode::None => Watch::None,
            WatchMode::Global => Watch::Global,
            WatchMode::Custom(w) => Watch::Custom(WatchToken::one_shot(self.handle.state.clone(), w)),
        }
    }

    fn submit(&self, request: Request, slot: Slot) -> Result<(), ZkError> {
        let handle = &*self.handle;
        let _ref = handle.refs.guard();

        let completion = CompletionToken::new(request.path(), slot);
        if handle.is_closing() || handle.state().is_terminal() || handle.session.is_unrecoverable()
        {
            debug!(handle.logger, "rejecting request on a defunct session";
                   "path" => completion.path(), "state" => ?handle.state());
            return Err(ZkError::InvalidState);
        }

        let xid = xid::next();
        trace!(handle.logger, "submitting request";
               "xid" => xid, "opcode" => ?request.opcode(), "path" => completion.path());
        handle
            .session
            .submit(Submission {
                xid,
                request,
                completion,
            })
            .map_err(|e| {
                debug!(handle.logger, "submission failed"; "xid" => xid, "error" => %e);
                e
            })
    }
}

impl Drop for ZooKeeper {
    fn drop(&mut self) {
        if !self.handle.is_closing() {
            let _ = self.close();
        }
    }
}

fn is_invalid_char(c: char) -> bool {
    matches!(c,
        '\u{0}'..='\u{1f}'
        | '\u{7f}'..='\u{9f}'
        | '\u{e000}'..='\u{f8ff}'
        | '\u{fff0}'..='\u{ffff}')
}

/// Checks `path` the way the server would, so that malformed requests never leave the client.
fn validate_path(path: &str, sequential: bool) -> Result<(), ZkError> {
    if !path.starts_with('/') {
        return Err(ZkError::BadArguments);
    }
    if path.len() == 1 {
        return Ok(());
    }

    let mut components: Vec<&str> = path[1..].split('/').collect();
    // a sequential node may be named by its sequence number alone
    if sequential && components.last() == Some(&"") {
        components.pop();
    }
    for c in components {
        if c.is_empty() || c == "." || c == ".." || c.chars().any(is_invalid_char) {
            return Err(ZkError::BadArguments);
        }
    }
    Ok(())
}
