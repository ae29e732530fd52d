//! Typed interfaces the application implements to receive results and watch events.
//!
//! Every asynchronous operation on [`ZooKeeper`](crate::ZooKeeper) takes an optional
//! `Arc<dyn Callback<T>>`, where `T` is the shape of the operation's result. Callbacks are always
//! invoked on the handle's completion thread, one at a time, in the order the wire session marked
//! the results ready. Plain closures implement both traits, and [`oneshot`] bridges a single
//! result into a `Future`.

use crate::{Acl, Stat, WatchedEvent, ZkError};
use failure::format_err;
use futures::channel::oneshot as chan;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Receives the completion result of one request.
///
/// `path` is the path the request targeted (the auth scheme for `add_auth`). When `result` is an
/// error it may be either the service's own answer to the request, or
/// [`ZkError::ConnectionLoss`]/[`ZkError::OperationTimeout`] if the connection failed while the
/// request was outstanding.
pub trait Callback<T>: Send + Sync {
    /// Called exactly once per request this callback was registered with.
    fn on_result(&self, path: &str, result: Result<T, ZkError>);
}

impl<T, F> Callback<T> for F
where
    F: Fn(&str, Result<T, ZkError>) + Send + Sync,
{
    fn on_result(&self, path: &str, result: Result<T, ZkError>) {
        self(path, result)
    }
}

/// Callback for requests that only report success or failure (`delete`, `set_acl`, `sync`,
/// `add_auth`).
pub type VoidCallback = Arc<dyn Callback<()>>;
/// Callback for `create`; receives the path of the created node.
pub type StringCallback = Arc<dyn Callback<String>>;
/// Callback for `exists` and `set_data`.
pub type StatCallback = Arc<dyn Callback<Stat>>;
/// Callback for `get_data`.
pub type DataCallback = Arc<dyn Callback<(Vec<u8>, Stat)>>;
/// Callback for `get_children`.
pub type ChildrenCallback = Arc<dyn Callback<(Vec<String>, Stat)>>;
/// Callback for `get_acl`.
pub type AclCallback = Arc<dyn Callback<(Vec<Acl>, Stat)>>;

/// Receives watch notifications.
///
/// A watcher passed to a single `exists`, `get_data` or `get_children` call fires at most once.
/// The default watcher given to [`ZooKeeperBuilder`](crate::ZooKeeperBuilder) receives every
/// session event and any number of node events for the lifetime of the handle.
pub trait Watcher: Send + Sync {
    /// Called with the event that triggered the watch. For session events, the handle's state
    /// already reflects `event.state` when this runs.
    fn on_event(&self, event: &WatchedEvent);
}

impl<F> Watcher for F
where
    F: Fn(&WatchedEvent) + Send + Sync,
{
    fn on_event(&self, event: &WatchedEvent) {
        self(event)
    }
}

/// Creates a callback whose single result is delivered to the returned future.
///
/// If the callback is dropped without being invoked (for example because the handle was closed
/// while the request was still outstanding) the future resolves to an error.
pub fn oneshot<T>() -> (Arc<dyn Callback<T>>, Pending<T>)
where
    T: Send + 'static,
{
    let (tx, rx) = chan::channel();
    let tx = Mutex::new(Some(tx));
    let cb = move |_: &str, result: Result<T, ZkError>| {
        if let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) {
            // if receiver doesn't care, we don't either
            let _ = tx.send(result);
        }
    };
    (Arc::new(cb), Pending { rx })
}

/// The future half of [`oneshot`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Pending<T> {
    #[pin]
    rx: chan::Receiver<Result<T, ZkError>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<Result<T, ZkError>, failure::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        self.project()
            .rx
            .poll(cx)
            .map(|r| r.map_err(|e| format_err!("request completed without a result: {:?}", e)))
    }
}
