use failure::Fail;

/// Result codes reported by ZooKeeper operations.
///
/// The same type is used for both error channels of a request: the *submission* result returned
/// directly from the call that enqueues the request, and the *completion* result handed to the
/// typed callback once the request finishes. A successful result is simply `Ok`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Fail)]
#[repr(i32)]
pub enum ZkError {
    /// System and server-side errors. This is never thrown by the server, it shouldn't be used
    /// other than to indicate a range.
    #[fail(display = "system error")]
    SystemError = -1,
    /// A runtime inconsistency was found.
    #[fail(display = "runtime inconsistency")]
    RuntimeInconsistency = -2,
    /// A data inconsistency was found.
    #[fail(display = "data inconsistency")]
    DataInconsistency = -3,
    /// Connection to the server has been lost.
    #[fail(display = "connection to the server has been lost")]
    ConnectionLoss = -4,
    /// Error while marshalling or unmarshalling data.
    #[fail(display = "error while marshalling or unmarshalling data")]
    MarshallingError = -5,
    /// Operation is unimplemented.
    #[fail(display = "operation is unimplemented")]
    Unimplemented = -6,
    /// Operation timeout.
    #[fail(display = "operation timed out")]
    OperationTimeout = -7,
    /// Invalid arguments.
    #[fail(display = "invalid arguments")]
    BadArguments = -8,
    /// The handle is closing, or the session is expired or failed authentication.
    #[fail(display = "invalid handle state")]
    InvalidState = -9,
    /// Attempted to read a node that does not exist.
    #[fail(display = "target node does not exist")]
    NoNode = -101,
    /// Not authenticated.
    #[fail(display = "insufficient authentication")]
    NoAuth = -102,
    /// Version conflict in `set` operation.
    #[fail(display = "target node has different version than expected")]
    BadVersion = -103,
    /// Ephemeral nodes may not have children.
    #[fail(display = "parent node is ephemeral, and cannot have children")]
    NoChildrenForEphemerals = -108,
    /// Request to create node that already exists.
    #[fail(display = "target node already exists")]
    NodeExists = -110,
    /// The node has children.
    #[fail(display = "target node has children")]
    NotEmpty = -111,
    /// The session has been expired by the server.
    #[fail(display = "session expired")]
    SessionExpired = -112,
    /// Invalid callback specified.
    #[fail(display = "invalid callback")]
    InvalidCallback = -113,
    /// Invalid `Acl` specified.
    #[fail(display = "the given ACL is invalid")]
    InvalidAcl = -114,
    /// Client authentication failed.
    #[fail(display = "client authentication failed")]
    AuthFailed = -115,
    /// ZooKeeper is closing.
    #[fail(display = "handle is closing")]
    Closing = -116,
    /// Session moved to another server, so operation is ignored.
    #[fail(display = "session moved to another server")]
    SessionMoved = -118,
}

impl ZkError {
    /// The numeric code used by the ZooKeeper C client for this error.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Maps a numeric result code back to a `ZkError`.
    ///
    /// Returns `None` for `0` (success) and for codes this client does not know about.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => ZkError::SystemError,
            -2 => ZkError::RuntimeInconsistency,
            -3 => ZkError::DataInconsistency,
            -4 => ZkError::ConnectionLoss,
            -5 => ZkError::MarshallingError,
            -6 => ZkError::Unimplemented,
            -7 => ZkError::OperationTimeout,
            -8 => ZkError::BadArguments,
            -9 => ZkError::InvalidState,
            -101 => ZkError::NoNode,
            -102 => ZkError::NoAuth,
            -103 => ZkError::BadVersion,
            -108 => ZkError::NoChildrenForEphemerals,
            -110 => ZkError::NodeExists,
            -111 => ZkError::NotEmpty,
            -112 => ZkError::SessionExpired,
            -113 => ZkError::InvalidCallback,
            -114 => ZkError::InvalidAcl,
            -115 => ZkError::AuthFailed,
            -116 => ZkError::Closing,
            -118 => ZkError::SessionMoved,
            _ => return None,
        })
    }

    /// True for errors caused by losing contact with the ensemble rather than by the request.
    pub fn is_connection_error(self) -> bool {
        matches!(self, ZkError::ConnectionLoss | ZkError::OperationTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_the_c_values() {
        assert_eq!(ZkError::NoNode.code(), -101);
        assert_eq!(ZkError::from_code(-4), Some(ZkError::ConnectionLoss));
        assert_eq!(ZkError::from_code(0), None);
        assert_eq!(ZkError::from_code(-117), None);
    }

    #[test]
    fn connection_errors() {
        assert!(ZkError::ConnectionLoss.is_connection_error());
        assert!(ZkError::OperationTimeout.is_connection_error());
        assert!(!ZkError::NoNode.is_connection_error());
    }

    #[test]
    fn display() {
        assert_eq!(ZkError::NodeExists.to_string(), "target node already exists");
    }
}
