mod acl;
pub use self::acl::*;

mod watch;
pub use self::watch::*;

/// The metadata the server keeps for a znode.
///
/// Zxids order changes across the whole ensemble, versions count the changes made to one part of
/// the node, and the two time fields are the server's wall clock and only informative.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Stat {
    /// Zxid of the change that created the node.
    pub czxid: i64,
    /// Zxid of the latest change to the node's data.
    pub mzxid: i64,
    /// Creation time, in milliseconds since the epoch.
    pub ctime: i64,
    /// Time of the latest data change, in milliseconds since the epoch.
    pub mtime: i64,
    /// Data version, as checked by `set_data` and `delete`.
    pub version: i32,
    /// Child list version.
    pub cversion: i32,
    /// ACL version, as checked by `set_acl`.
    pub aversion: i32,
    /// Id of the session owning an ephemeral node, 0 for any other node.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    /// Zxid of the latest change to the child list.
    pub pzxid: i64,
}

/// How `create` makes a node: whether it outlives the session, and whether its name gets a
/// sequence number.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    Persistent = 0,
    /// Removed by the server when the creating session ends.
    Ephemeral = 1,
    /// The server appends the parent's next sequence number to the name, as ten zero-padded
    /// digits.
    PersistentSequential = 2,
    EphemeralSequential = 3,
    /// A persistent node the server may remove once its last child is gone. Creating a child
    /// under it can therefore fail with `ZkError::NoNode`.
    Container = 4,
}

impl CreateMode {
    /// True if the server will append a sequence number to the requested path.
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }

    /// True if the node is removed when the creating session ends.
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_modes() {
        let flags: Vec<_> = [
            CreateMode::Persistent,
            CreateMode::Ephemeral,
            CreateMode::PersistentSequential,
            CreateMode::EphemeralSequential,
            CreateMode::Container,
        ]
        .iter()
        .map(|m| (m.is_sequential(), m.is_ephemeral()))
        .collect();
        assert_eq!(
            flags,
            vec![
                (false, false),
                (false, true),
                (true, false),
                (true, true),
                (false, false),
            ]
        );
        assert_eq!(CreateMode::Container as i32, 4);
    }
}
