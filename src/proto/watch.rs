use crate::{WatchToken, WatchedEventType};

/// The watch a read request leaves behind on the server.
#[derive(Debug)]
pub enum Watch {
    /// No watch.
    None,
    /// Deliver the triggering event to the handle's default watcher.
    Global,
    /// Deliver the triggering event to a one-shot watcher.
    Custom(WatchToken),
}

impl Watch {
    /// The watch flag as it goes on the wire.
    pub fn to_u8(&self) -> u8 {
        if let Watch::None = *self {
            0
        } else {
            1
        }
    }
}

/// Describes what a `Watch` is looking for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WatchType {
    /// Watching for changes to children.
    Child,
    /// Watching for changes to data.
    Data,
    /// Watching for the creation of a node at the given path.
    Exist,
}

impl WatchType {
    /// Whether an event of type `event` on the watched path fires a watch of this type.
    pub fn triggered_by(self, event: WatchedEventType) -> bool {
        match (self, event) {
            (WatchType::Child, WatchedEventType::NodeDeleted)
            | (WatchType::Child, WatchedEventType::NodeChildrenChanged) => true,
            (WatchType::Child, _) => false,
            (WatchType::Data, WatchedEventType::NodeDeleted)
            | (WatchType::Data, WatchedEventType::NodeDataChanged) => true,
            (WatchType::Data, _) => false,
            (WatchType::Exist, WatchedEventType::NodeChildrenChanged) => false,
            (WatchType::Exist, WatchedEventType::Session) => false,
            (WatchType::Exist, _) => true,
        }
    }
}
