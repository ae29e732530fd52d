//! Turns raw results from the wire session into calls on the application's typed interfaces.

use crate::callback::Callback;
use crate::context::{CompletionContext, Slot};
use crate::proto::Reply;
use crate::{
    CompletionToken, ReplyShape, SessionState, WatchToken, WatchedEvent, WatchedEventType,
    ZkError,
};
use slog::{crit, debug, error, info, trace};
use std::process;
use std::sync::Arc;

/// Delivers the result of one request and destroys its context.
///
/// On failure the reply carries nothing and nothing is read from it. A reply whose shape does not
/// match what the request expects is a wire session bug; the callback sees `MarshallingError`.
pub(crate) fn completion(
    token: CompletionToken,
    result: Result<Reply, ZkError>,
    logger: &slog::Logger,
) {
    let CompletionContext { path, slot } = token.into_context();
    let p = &path;
    match slot {
        Slot::Void(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::Void, p, logger, |r| match r {
                // sync answers with the synced path, which nobody needs
                Reply::Empty | Reply::String(_) => Ok(()),
                r => Err(r),
            }),
        ),
        Slot::String(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::String, p, logger, |r| match r {
                Reply::String(s) => Ok(s),
                r => Err(r),
            }),
        ),
        Slot::Stat(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::Stat, p, logger, |r| match r {
                Reply::Stat(stat) => Ok(stat),
                r => Err(r),
            }),
        ),
        Slot::Data(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::Data, p, logger, |r| match r {
                Reply::GetData { bytes, stat } => Ok((bytes, stat)),
                r => Err(r),
            }),
        ),
        Slot::Children(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::Children, p, logger, |r| match r {
                Reply::GetChildren { children, stat } => Ok((children, stat)),
                r => Err(r),
            }),
        ),
        Slot::Acl(cb) => deliver(
            p,
            cb,
            reshape(result, ReplyShape::Acl, p, logger, |r| match r {
                Reply::GetAcl { acl, stat } => Ok((acl, stat)),
                r => Err(r),
            }),
        ),
    }
    // the context (path and callback reference) is dropped here, after the callback returned
}

fn reshape<T, F>(
    result: Result<Reply, ZkError>,
    expected: ReplyShape,
    path: &str,
    logger: &slog::Logger,
    f: F,
) -> Result<T, ZkError>
where
    F: FnOnce(Reply) -> Result<T, Reply>,
{
    let reply = result?;
    f(reply).map_err(|got| {
        error!(logger, "wire session delivered a mismatched reply";
               "path" => path, "expected" => ?expected, "got" => ?got.shape());
        ZkError::MarshallingError
    })
}

fn deliver<T>(path: &str, cb: Option<Arc<dyn Callback<T>>>, result: Result<T, ZkError>) {
    if let Some(cb) = cb {
        cb.on_result(path, result);
    }
}

/// Raw watch codes this client cannot interpret.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Violation {
    EventType(i32),
    SessionState(i32),
}

/// Maps the raw codes of a watch notification.
///
/// The session state is only returned for session events; node events carry whatever state the
/// server saw, which is not checked.
fn decode(
    event_type: i32,
    state: i32,
) -> Result<(WatchedEventType, Option<SessionState>), Violation> {
    let event_type =
        WatchedEventType::from_code(event_type).ok_or(Violation::EventType(event_type))?;
    if event_type != WatchedEventType::Session {
        return Ok((event_type, None));
    }
    let state = SessionState::from_code(state).ok_or(Violation::SessionState(state))?;
    Ok((event_type, Some(state)))
}

/// Delivers one watch notification.
///
/// For session events the handle's state is updated before the watcher runs. An event type or
/// session state outside the known set aborts the process: the handle would otherwise keep
/// accepting requests on a connection whose state nobody knows.
///
/// One-shot contexts are destroyed once the watcher returns; the default watcher's context is left
/// alone.
pub(crate) fn watch(
    event_type: i32,
    state: i32,
    path: Option<String>,
    token: WatchToken,
    logger: &slog::Logger,
) {
    let (event_type, session) = match decode(event_type, state) {
        Ok(decoded) => decoded,
        Err(violation) => {
            crit!(logger, "wire session delivered an unknown watch event";
                  "violation" => ?violation, "path" => ?path);
            // the logger may be asynchronous, or discard everything
            eprintln!("mt-zookeeper: unknown watch event {:?}, aborting", violation);
            process::abort();
        }
    };
    let ctx = token.context();

    let state = match session {
        Some(new) => {
            debug!(logger, "got session event"; "state" => ?new);
            let old = ctx.state.get();
            ctx.state.set(new);
            if old != new {
                info!(logger, "session state changed"; "from" => ?old, "to" => ?new);
            }
            new
        }
        // node events with a state code we don't know report the handle's state instead
        None => SessionState::from_code(state).unwrap_or_else(|| ctx.state.get()),
    };

    let event = WatchedEvent {
        event_type,
        state,
        path,
    };
    trace!(logger, "delivering watch event"; "event" => ?event, "disposal" => ?token.disposal());

    if let Some(ref w) = ctx.watcher {
        w.on_event(&event);
    }
    drop(token);
}
