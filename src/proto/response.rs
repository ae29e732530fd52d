use crate::{Acl, ReplyShape, Stat};

/// The successful result of a request, as delivered by the wire session.
///
/// Each variant matches one [`ReplyShape`]; a session must answer a request with the variant its
/// completion token expects. `Sync` is the exception: it may be answered with either `Empty` or
/// the synced path, which is discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    String(String),
    Stat(Stat),
    GetData { bytes: Vec<u8>, stat: Stat },
    GetChildren { children: Vec<String>, stat: Stat },
    GetAcl { acl: Vec<Acl>, stat: Stat },
}

impl Reply {
    pub fn shape(&self) -> ReplyShape {
        match *self {
            Reply::Empty => ReplyShape::Void,
            Reply::String(_) => ReplyShape::String,
            Reply::Stat(_) => ReplyShape::Stat,
            Reply::GetData { .. } => ReplyShape::Data,
            Reply::GetChildren { .. } => ReplyShape::Children,
            Reply::GetAcl { .. } => ReplyShape::Acl,
        }
    }
}
