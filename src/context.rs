//! Per-request and per-watch contexts, and the tokens that carry them through the wire session.
//!
//! A context is created by the thread that issues a request, moved into the wire session inside a
//! token, and moved back out exactly once when the session hands the token to the dispatcher.
//! Tokens are not `Clone`: a completion can only be dispatched by consuming its token, so a
//! double dispatch cannot be expressed. A token that is dropped instead (because submission failed,
//! or because the session was torn down with the request outstanding) frees its context without
//! invoking anything.

use crate::callback::{
    AclCallback, ChildrenCallback, DataCallback, StatCallback, StringCallback, VoidCallback,
    Watcher,
};
use crate::SessionState;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// The result shape a request produces, and therefore the `Reply` variant its wire session must
/// deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyShape {
    /// No value.
    Void,
    /// A path.
    String,
    /// A `Stat`.
    Stat,
    /// Node data and its `Stat`.
    Data,
    /// Child names and the parent's `Stat`.
    Children,
    /// An ACL list and the node's `Stat`.
    Acl,
}

/// The typed callback slot of a completion context.
///
/// The variant fixes the shape even when the caller registered no callback, so the dispatcher can
/// still check what the session delivered.
pub(crate) enum Slot {
    Void(Option<VoidCallback>),
    String(Option<StringCallback>),
    Stat(Option<StatCallback>),
    Data(Option<DataCallback>),
    Children(Option<ChildrenCallback>),
    Acl(Option<AclCallback>),
}

impl Slot {
    fn shape(&self) -> ReplyShape {
        match self {
            Slot::Void(_) => ReplyShape::Void,
            Slot::String(_) => ReplyShape::String,
            Slot::Stat(_) => ReplyShape::Stat,
            Slot::Data(_) => ReplyShape::Data,
            Slot::Children(_) => ReplyShape::Children,
            Slot::Acl(_) => ReplyShape::Acl,
        }
    }

    fn is_registered(&self) -> bool {
        match self {
            Slot::Void(cb) => cb.is_some(),
            Slot::String(cb) => cb.is_some(),
            Slot::Stat(cb) => cb.is_some(),
            Slot::Data(cb) => cb.is_some(),
            Slot::Children(cb) => cb.is_some(),
            Slot::Acl(cb) => cb.is_some(),
        }
    }
}

pub(crate) struct CompletionContext {
    pub(crate) path: String,
    pub(crate) slot: Slot,
}

/// Owns the context of one outstanding request.
///
/// Created by [`ZooKeeper`](crate::ZooKeeper) for every request and handed to
/// [`WireSession::submit`](crate::proto::WireSession::submit). The session must eventually either
/// push it onto the completion queue together with the request's result, or drop it.
pub struct CompletionToken(Box<CompletionContext>);

impl CompletionToken {
    pub(crate) fn new(path: impl Into<String>, slot: Slot) -> Self {
        CompletionToken(Box::new(CompletionContext {
            path: path.into(),
            slot,
        }))
    }

    /// The path the request targets.
    pub fn path(&self) -> &str {
        &self.0.path
    }

    /// The result shape the request expects.
    pub fn shape(&self) -> ReplyShape {
        self.0.slot.shape()
    }

    /// Whether the application registered a callback for this request.
    pub fn has_callback(&self) -> bool {
        self.0.slot.is_registered()
    }

    pub(crate) fn into_context(self) -> CompletionContext {
        *self.0
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("path", &self.0.path)
            .field("shape", &self.shape())
            .field("callback", &self.has_callback())
            .finish()
    }
}

/// The session state of a handle, shared with every watch context the handle creates.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicI32);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        StateCell(AtomicI32::new(state.code()))
    }

    pub(crate) fn get(&self) -> SessionState {
        let code = self.0.load(Ordering::Acquire);
        SessionState::from_code(code).expect("state cell only ever holds valid states")
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state.code(), Ordering::Release);
    }
}

/// Whether a watch context survives delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposal {
    /// Destroyed after its first delivery.
    OneShot,
    /// Lives as long as the handle and may be delivered any number of times.
    Persistent,
}

pub(crate) struct WatchContext {
    pub(crate) state: Arc<StateCell>,
    pub(crate) watcher: Option<Arc<dyn Watcher>>,
}

enum Carrier {
    OneShot(Box<WatchContext>),
    Persistent(Arc<WatchContext>),
}

/// Carries a watch context to the dispatcher.
///
/// One-shot tokens own their context and are created by `exists`, `get_data` and `get_children`
/// calls that pass a watcher. Persistent tokens are minted from the handle's [`DefaultWatcher`].
pub struct WatchToken(Carrier);

impl WatchToken {
    pub(crate) fn one_shot(state: Arc<StateCell>, watcher: Arc<dyn Watcher>) -> Self {
        WatchToken(Carrier::OneShot(Box::new(WatchContext {
            state,
            watcher: Some(watcher),
        })))
    }

    /// Whether the context is destroyed after this delivery.
    pub fn disposal(&self) -> Disposal {
        match self.0 {
            Carrier::OneShot(_) => Disposal::OneShot,
            Carrier::Persistent(_) => Disposal::Persistent,
        }
    }

    pub(crate) fn context(&self) -> &WatchContext {
        match self.0 {
            Carrier::OneShot(ref ctx) => &**ctx,
            Carrier::Persistent(ref ctx) => &**ctx,
        }
    }
}

impl fmt::Debug for WatchToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WatchToken")
            .field("disposal", &self.disposal())
            .field("watcher", &self.context().watcher.is_some())
            .finish()
    }
}

/// The handle's persistent session watcher.
///
/// Handed to the wire session once, when the handle starts. The session mints a token from it
/// for every session event, and for node events that were registered against the default watcher.
#[derive(Clone)]
pub struct DefaultWatcher(Arc<WatchContext>);

impl DefaultWatcher {
    pub(crate) fn new(state: Arc<StateCell>, watcher: Option<Arc<dyn Watcher>>) -> Self {
        DefaultWatcher(Arc::new(WatchContext { state, watcher }))
    }

    /// A token that delivers an event to the default watcher.
    pub fn token(&self) -> WatchToken {
        WatchToken(Carrier::Persistent(self.0.clone()))
    }
}

impl fmt::Debug for DefaultWatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DefaultWatcher")
            .field("watcher", &self.0.watcher.is_some())
            .finish()
    }
}
