/// Represents a change on the ZooKeeper that a `Watcher` is able to respond to.
///
/// The `WatchedEvent` includes exactly what happened, the current state of the session, and the
/// path of the znode that was involved in the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedEvent {
    /// The trigger that caused the watch to hit.
    pub event_type: WatchedEventType,
    /// The state of the client's session when the event was generated.
    pub state: SessionState,
    /// The path of the znode that was involved.
    ///
    /// This is `None` exactly when `event_type` is `WatchedEventType::Session`.
    pub path: Option<String>,
}

/// Enumeration of connectivity states a session handle can be in.
///
/// The state is updated from session events delivered by the wire session, before any watcher
/// sees the event that caused the transition.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The serving cluster has expired this session. The session is no longer valid; a new handle
    /// must be created to access the ensemble again.
    Expired = -112,
    /// Authentication has failed -- the session requires a new handle.
    AuthFailed = -113,
    /// The client is not connected to any server in the ensemble and is trying to (re)connect.
    Connecting = 1,
    /// The client is connected to a server in the ensemble.
    Connected = 3,
}

impl SessionState {
    /// Maps a raw state code as reported by the wire session.
    ///
    /// Returns `None` for any value outside the four known states.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -112 => Some(SessionState::Expired),
            -113 => Some(SessionState::AuthFailed),
            1 => Some(SessionState::Connecting),
            3 => Some(SessionState::Connected),
            _ => None,
        }
    }

    /// The raw code of this state.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// True if no further requests can succeed on a session in this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::AuthFailed)
    }
}

/// Enumeration of types of events that may occur on the znode.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchedEventType {
    /// The connectivity state of the session changed. Events of this type carry no path.
    Session = -1,
    /// The server will no longer watch a node for this client, probably due to a resource
    /// constraint.
    NotWatching = -2,
    /// Issued when a znode at a given path is created.
    NodeCreated = 1,
    /// Issued when a znode at a given path is deleted.
    NodeDeleted = 2,
    /// Issued when the data of a watched znode are altered. This event value is issued whenever a
    /// *set* operation occurs without an actual contents check, so there is no guarantee the data
    /// actually changed.
    NodeDataChanged = 3,
    /// Issued when the children of a watched znode are created or deleted. This event is not issued
    /// when the data within children is altered.
    NodeChildrenChanged = 4,
}

impl WatchedEventType {
    /// Maps a raw event type from the wire, or `None` for a type this client does not know.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(WatchedEventType::Session),
            -2 => Some(WatchedEventType::NotWatching),
            1 => Some(WatchedEventType::NodeCreated),
            2 => Some(WatchedEventType::NodeDeleted),
            3 => Some(WatchedEventType::NodeDataChanged),
            4 => Some(WatchedEventType::NodeChildrenChanged),
            _ => None,
        }
    }
}
