use super::watch::{Watch, WatchType};
use crate::{Acl, CreateMode, WatchToken};
use std::borrow::Cow;
use std::mem;

/// A request for the wire session to put on the wire.
#[derive(Debug)]
pub enum Request {
    Create {
        path: String,
        data: Cow<'static, [u8]>,
        acl: Cow<'static, [Acl]>,
        mode: CreateMode,
    },
    Delete {
        path: String,
        version: i32,
    },
    Exists {
        path: String,
        watch: Watch,
    },
    GetData {
        path: String,
        watch: Watch,
    },
    SetData {
        path: String,
        data: Cow<'static, [u8]>,
        version: i32,
    },
    GetChildren {
        path: String,
        watch: Watch,
    },
    GetAcl {
        path: String,
    },
    SetAcl {
        path: String,
        acl: Cow<'static, [Acl]>,
        version: i32,
    },
    Sync {
        path: String,
    },
    Auth {
        scheme: String,
        cert: Vec<u8>,
    },
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(i32)]
pub enum OpCode {
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetACL = 6,
    SetACL = 7,
    Synchronize = 9,
    GetChildren2 = 12,
    Auth = 100,
}

impl Request {
    pub fn opcode(&self) -> OpCode {
        match *self {
            Request::Create { .. } => OpCode::Create,
            Request::Delete { .. } => OpCode::Delete,
            Request::Exists { .. } => OpCode::Exists,
            Request::GetData { .. } => OpCode::GetData,
            Request::SetData { .. } => OpCode::SetData,
            Request::GetChildren { .. } => OpCode::GetChildren2,
            Request::GetAcl { .. } => OpCode::GetACL,
            Request::SetAcl { .. } => OpCode::SetACL,
            Request::Sync { .. } => OpCode::Synchronize,
            Request::Auth { .. } => OpCode::Auth,
        }
    }

    /// The path this request targets; the scheme for `Auth`.
    pub fn path(&self) -> &str {
        match *self {
            Request::Create { ref path, .. }
            | Request::Delete { ref path, .. }
            | Request::Exists { ref path, .. }
            | Request::GetData { ref path, .. }
            | Request::SetData { ref path, .. }
            | Request::GetChildren { ref path, .. }
            | Request::GetAcl { ref path }
            | Request::SetAcl { ref path, .. }
            | Request::Sync { ref path } => path,
            Request::Auth { ref scheme, .. } => scheme,
        }
    }

    /// True if the request asks the server to leave a watch behind.
    pub fn is_watching(&self) -> bool {
        match *self {
            Request::Exists { ref watch, .. }
            | Request::GetData { ref watch, .. }
            | Request::GetChildren { ref watch, .. } => watch.to_u8() == 1,
            _ => false,
        }
    }

    /// Takes the custom watch out of a watchable read.
    ///
    /// The request keeps `Watch::Global` in its place, so it still serializes with the watch flag
    /// set; the caller becomes responsible for the returned token until the server's answer shows
    /// whether the watch was actually left behind.
    pub fn take_custom_watch(&mut self) -> Option<(String, WatchToken, WatchType)> {
        let wtype = match *self {
            Request::GetData { .. } => WatchType::Data,
            Request::GetChildren { .. } => WatchType::Child,
            Request::Exists { .. } => WatchType::Exist,
            _ => return None,
        };
        match *self {
            Request::GetData {
                ref path,
                ref mut watch,
            }
            | Request::GetChildren {
                ref path,
                ref mut watch,
            }
            | Request::Exists {
                ref path,
                ref mut watch,
            } => {
                if let Watch::Custom(_) = *watch {
                    if let Watch::Custom(w) = mem::replace(watch, Watch::Global) {
                        return Some((path.clone(), w, wtype));
                    }
                }
                None
            }
            _ => None,
        }
    }
}
