//! An in-memory wire session for exercising the engine.
//!
//! Requests are executed against a local tree as soon as they are submitted. Their results, and
//! any watch events they trigger, are announced to the "client" side as length-prefixed frames
//! over a Unix socket pair, so the I/O thread only sees them once the socket polls readable, in
//! the order the frames were written.

use crate::proto::{Interest, OpCode, Readiness, Reply, Request, Step, Submission};
use crate::proto::{WatchType, WireSession};
use crate::{
    Acl, CompletionQueue, CompletionToken, DefaultWatcher, SessionState, Stat, WatchToken,
    WatchedEventType, ZkError,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::mem;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const REPLY: i32 = 0;
const EVENT: i32 = 1;
const CLOSE: i32 = 2;
const ABANDON: i32 = 3;

struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    stat: Stat,
}

type PendingEvent = (i32, i32, Option<String>, WatchToken);

struct Inner {
    watcher: Option<DefaultWatcher>,
    nodes: BTreeMap<String, Node>,
    zxid: i64,

    server: UnixStream,
    /// Bytes we have not yet deserialized.
    inbox: Vec<u8>,

    replies: HashMap<i32, (CompletionToken, Result<Reply, ZkError>)>,
    held: Option<Vec<i32>>,
    events: HashMap<i32, PendingEvent>,
    next_event: i32,

    /// Custom registered watchers (path -> watcher)
    watches: HashMap<String, Vec<(WatchToken, WatchType)>>,
    /// Watches left for the default watcher (path -> types)
    global: HashMap<String, Vec<WatchType>>,

    reject: Option<ZkError>,
    flush_result: Result<(), ZkError>,
    flushed: usize,
    unrecoverable: bool,
}

pub(crate) struct MockSession {
    client: UnixStream,
    inner: Mutex<Inner>,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        let (client, server) = UnixStream::pair().expect("socketpair");
        client.set_nonblocking(true).expect("nonblocking");

        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                acl: Acl::open_unsafe().to_vec(),
                stat: Stat::default(),
            },
        );

        MockSession {
            client,
            inner: Mutex::new(Inner {
                watcher: None,
                nodes,
                zxid: 0,
                server,
                inbox: Vec::new(),
                replies: HashMap::new(),
                held: None,
                events: HashMap::new(),
                next_event: 1,
                watches: HashMap::new(),
                global: HashMap::new(),
                reject: None,
                flush_result: Ok(()),
                flushed: 0,
                unrecoverable: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Fails the next submission with `err`.
    pub(crate) fn reject_next(&self, err: ZkError) {
        self.lock().reject = Some(err);
    }

    pub(crate) fn fail_flush(&self, err: ZkError) {
        self.lock().flush_result = Err(err);
    }

    pub(crate) fn flushed(&self) -> usize {
        self.lock().flushed
    }

    /// Keeps replies back until `release`.
    pub(crate) fn hold(&self) {
        self.lock().held = Some(Vec::new());
    }

    pub(crate) fn release(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        for xid in inner.held.take().unwrap_or_default() {
            inner.send(REPLY, xid);
        }
    }

    /// Number of requests whose result has not been pushed onto the completion queue yet.
    pub(crate) fn outstanding(&self) -> usize {
        self.lock().replies.len()
    }

    /// Reports a session state change to the default watcher.
    pub(crate) fn session_event(&self, state: SessionState) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let token = inner.watcher.as_ref().expect("watcher installed").token();
        inner.event(WatchedEventType::Session, state.code(), None, token);
    }

    /// Another client changes the data of `path`.
    pub(crate) fn external_set(&self, path: &str, data: &[u8]) {
        let request = Request::SetData {
            path: path.to_string(),
            data: data.to_vec().into(),
            version: -1,
        };
        self.lock()
            .execute(&request)
            .expect("external set_data failed");
    }

    /// The server shuts the session down.
    pub(crate) fn server_close(&self) {
        self.lock().send(CLOSE, 0);
    }

    /// The I/O thread gives up on every held request, dropping their completions unanswered.
    pub(crate) fn abandon_held(&self) {
        self.lock().send(ABANDON, 0);
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn watch_type(request: &Request) -> Option<WatchType> {
    match *request {
        Request::GetData { .. } => Some(WatchType::Data),
        Request::GetChildren { .. } => Some(WatchType::Child),
        Request::Exists { .. } => Some(WatchType::Exist),
        _ => None,
    }
}

impl Inner {
    fn send(&mut self, kind: i32, id: i32) {
        let mut frame = Vec::with_capacity(12);
        frame.write_i32::<BigEndian>(8).expect("Vec::write should never fail");
        frame.write_i32::<BigEndian>(kind).expect("Vec::write should never fail");
        frame.write_i32::<BigEndian>(id).expect("Vec::write should never fail");
        self.server
            .write_all(&frame)
            .expect("UnixStream::write should never fail");
    }

    fn event(&mut self, et: WatchedEventType, state: i32, path: Option<String>, token: WatchToken) {
        let id = self.next_event;
        self.next_event += 1;
        self.events.insert(id, (et as i32, state, path, token));
        self.send(EVENT, id);
    }

    fn trigger(&mut self, path: &str, et: WatchedEventType) {
        let connected = SessionState::Connected.code();

        let fire = match self.watches.get_mut(path) {
            Some(watchers) => {
                let (fire, keep): (Vec<_>, Vec<_>) = mem::take(watchers)
                    .into_iter()
                    .partition(|(_, wtype)| wtype.triggered_by(et));
                *watchers = keep;
                fire
            }
            None => Vec::new(),
        };
        if self.watches.get(path).map_or(false, Vec::is_empty) {
            self.watches.remove(path);
        }
        for (token, _) in fire {
            self.event(et, connected, Some(path.to_string()), token);
        }

        let global = match self.global.get_mut(path) {
            Some(wtypes) => {
                let before = wtypes.len();
                wtypes.retain(|wtype| !wtype.triggered_by(et));
                before != wtypes.len()
            }
            None => false,
        };
        if global {
            let token = self.watcher.as_ref().expect("watcher installed").token();
            self.event(et, connected, Some(path.to_string()), token);
        }
    }

    fn node(&self, path: &str) -> Result<&Node, ZkError> {
        self.nodes.get(path).ok_or(ZkError::NoNode)
    }

    fn execute(&mut self, request: &Request) -> Result<Reply, ZkError> {
        match *request {
            Request::Create {
                ref path,
                ref data,
                ref acl,
                mode,
            } => {
                let parent = parent_of(path).to_string();
                let cversion = match self.nodes.get(&parent) {
                    None => return Err(ZkError::NoNode),
                    Some(p) if p.stat.ephemeral_owner != 0 => {
                        return Err(ZkError::NoChildrenForEphemerals)
                    }
                    Some(p) => p.stat.cversion,
                };
                let path = if mode.is_sequential() {
                    format!("{}{:010}", path, cversion)
                } else {
                    path.clone()
                };
                if self.nodes.contains_key(&path) {
                    return Err(ZkError::NodeExists);
                }

                self.zxid += 1;
                let stat = Stat {
                    czxid: self.zxid,
                    mzxid: self.zxid,
                    pzxid: self.zxid,
                    ephemeral_owner: if mode.is_ephemeral() { 1 } else { 0 },
                    data_length: data.len() as i32,
                    ..Stat::default()
                };
                self.nodes.insert(
                    path.clone(),
                    Node {
                        data: data.to_vec(),
                        acl: acl.to_vec(),
                        stat,
                    },
                );
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.stat.cversion += 1;
                    p.stat.num_children += 1;
                    p.stat.pzxid = self.zxid;
                }
                self.trigger(&path, WatchedEventType::NodeCreated);
                self.trigger(&parent, WatchedEventType::NodeChildrenChanged);
                Ok(Reply::String(path))
            }
            Request::Delete { ref path, version } => {
                let node = self.node(path)?;
                if version != -1 && version != node.stat.version {
                    return Err(ZkError::BadVersion);
                }
                if node.stat.num_children != 0 {
                    return Err(ZkError::NotEmpty);
                }
                self.zxid += 1;
                self.nodes.remove(path);
                let parent = parent_of(path).to_string();
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.stat.cversion += 1;
                    p.stat.num_children -= 1;
                    p.stat.pzxid = self.zxid;
                }
                self.trigger(path, WatchedEventType::NodeDeleted);
                self.trigger(&parent, WatchedEventType::NodeChildrenChanged);
                Ok(Reply::Empty)
            }
            Request::Exists { ref path, .. } => Ok(Reply::Stat(self.node(path)?.stat)),
            Request::GetData { ref path, .. } => {
                let node = self.node(path)?;
                Ok(Reply::GetData {
                    bytes: node.data.clone(),
                    stat: node.stat,
                })
            }
            Request::SetData {
                ref path,
                ref data,
                version,
            } => {
                self.zxid += 1;
                let zxid = self.zxid;
                let node = self.nodes.get_mut(path.as_str()).ok_or(ZkError::NoNode)?;
                if version != -1 && version != node.stat.version {
                    return Err(ZkError::BadVersion);
                }
                node.data = data.to_vec();
                node.stat.version += 1;
                node.stat.mzxid = zxid;
                node.stat.data_length = data.len() as i32;
                let stat = node.stat;
                self.trigger(path, WatchedEventType::NodeDataChanged);
                Ok(Reply::Stat(stat))
            }
            Request::GetChildren { ref path, .. } => {
                let stat = self.node(path)?.stat;
                let prefix = if path == "/" {
                    "/".to_string()
                } else {
                    format!("{}/", path)
                };
                let children = self
                    .nodes
                    .keys()
                    .filter(|k| k.len() > prefix.len() && k.starts_with(&prefix))
                    .map(|k| &k[prefix.len()..])
                    .filter(|rest| !rest.contains('/'))
                    .map(String::from)
                    .collect();
                Ok(Reply::GetChildren { children, stat })
            }
            Request::GetAcl { ref path } => {
                let node = self.node(path)?;
                Ok(Reply::GetAcl {
                    acl: node.acl.clone(),
                    stat: node.stat,
                })
            }
            Request::SetAcl {
                ref path,
                ref acl,
                version,
            } => {
                let node = self.nodes.get_mut(path.as_str()).ok_or(ZkError::NoNode)?;
                if version != -1 && version != node.stat.aversion {
                    return Err(ZkError::BadVersion);
                }
                node.acl = acl.to_vec();
                node.stat.aversion += 1;
                Ok(Reply::Empty)
            }
            Request::Sync { ref path } => Ok(Reply::String(path.clone())),
            Request::Auth { ref scheme, .. } if scheme == "digest" => Ok(Reply::Empty),
            Request::Auth { .. } => Err(ZkError::AuthFailed),
        }
    }
}

impl WireSession for MockSession {
    fn set_watcher(&self, watcher: DefaultWatcher) {
        self.lock().watcher = Some(watcher);
    }

    fn submit(&self, submission: Submission) -> Result<(), ZkError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if let Some(e) = inner.reject.take() {
            return Err(e);
        }

        let Submission {
            xid,
            mut request,
            completion,
        } = submission;
        let custom = request.take_custom_watch();
        let global = custom.is_none() && request.is_watching();
        let result = inner.execute(&request);

        // normally, watches are *only* added for successful operations
        // the exception to this is if an exists call fails with NoNode
        let leaves_watch = result.is_ok()
            || (request.opcode() == OpCode::Exists && result == Err(ZkError::NoNode));
        if leaves_watch {
            if let Some((path, token, wtype)) = custom {
                inner.watches.entry(path).or_default().push((token, wtype));
            } else if let (true, Some(wtype)) = (global, watch_type(&request)) {
                inner
                    .global
                    .entry(request.path().to_string())
                    .or_default()
                    .push(wtype);
            }
        }

        inner.replies.insert(xid, (completion, result));
        match inner.held {
            Some(ref mut held) => held.push(xid),
            None => inner.send(REPLY, xid),
        }
        Ok(())
    }

    fn interest(&self) -> Interest {
        Interest {
            fd: Some(self.client.as_raw_fd()),
            readiness: Readiness::READ,
            timeout: Duration::from_millis(100),
        }
    }

    fn process(&self, ready: Readiness, queue: &CompletionQueue) -> Result<Step, ZkError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if ready.read {
            let mut buf = [0u8; 512];
            loop {
                match (&self.client).read(&mut buf) {
                    Ok(0) => return Err(ZkError::ConnectionLoss),
                    Ok(n) => inner.inbox.extend_from_slice(&buf[..n]),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(_) => return Err(ZkError::ConnectionLoss),
                }
            }
        }

        let mut step = Step::Continue;
        let mut abandoned = Vec::new();
        let mut instart = 0;
        while inner.inbox.len() - instart >= 4 {
            let length = (&inner.inbox[instart..])
                .read_i32::<BigEndian>()
                .map_err(|_| ZkError::MarshallingError)? as usize;
            if inner.inbox.len() - instart < length + 4 {
                break;
            }
            let mut frame = &inner.inbox[instart + 4..instart + 4 + length];
            let kind = frame
                .read_i32::<BigEndian>()
                .map_err(|_| ZkError::MarshallingError)?;
            let id = frame
                .read_i32::<BigEndian>()
                .map_err(|_| ZkError::MarshallingError)?;
            instart += length + 4;

            match kind {
                REPLY => {
                    if let Some((token, result)) = inner.replies.remove(&id) {
                        queue.complete(token, result);
                    }
                }
                EVENT => {
                    if let Some((et, state, path, token)) = inner.events.remove(&id) {
                        queue.deliver(et, state, path, token);
                        let terminal = SessionState::from_code(state).map_or(false, |s| s.is_terminal());
                        if et == WatchedEventType::Session as i32 && terminal {
                            inner.unrecoverable = true;
                        }
                    }
                }
                ABANDON => {
                    for xid in inner.held.take().unwrap_or_default() {
                        abandoned.extend(inner.replies.remove(&xid));
                    }
                }
                _ => step = Step::Closing,
            }
        }
        inner.inbox.drain(..instart);

        // dropping a completion may close the handle, which calls back into flush_send_queue
        drop(guard);
        drop(abandoned);
        Ok(step)
    }

    fn is_unrecoverable(&self) -> bool {
        self.lock().unrecoverable
    }

    fn flush_send_queue(&self, _timeout: Duration) -> Result<(), ZkError> {
        let mut inner = self.lock();
        inner.flushed += 1;
        inner.flush_result
    }
}
