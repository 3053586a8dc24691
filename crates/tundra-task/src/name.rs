//! The name server: task discovery by well-known string names.
//!
//! Requests and replies cross the rendezvous as bytes with a one-byte tag;
//! the helpers here build and parse them so clients never touch the wire
//! layout directly.

use std::collections::BTreeMap;

use tracing::debug;

use crate::task::{Syscall, Task, TaskId, Wake};

/// Receive buffer capacity of the name server (tag byte + name).
pub const NAME_MSG_CAP: usize = 256;

/// Reply capacity a who-is sender needs (tag byte + tid).
pub const WHOIS_REPLY_CAP: usize = 5;

const TAG_REGISTER: u8 = 0x01;
const TAG_WHOIS: u8 = 0x02;
const TAG_NOT_FOUND: u8 = 0x00;
const TAG_FOUND: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRequest {
    Register(String),
    WhoIs(String),
}

impl NameRequest {
    pub fn encode(&self) -> Vec<u8> {
        let (tag, name) = match self {
            NameRequest::Register(name) => (TAG_REGISTER, name),
            NameRequest::WhoIs(name) => (TAG_WHOIS, name),
        };
        let mut bytes = Vec::with_capacity(1 + name.len());
        bytes.push(tag);
        bytes.extend_from_slice(name.as_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&tag, name) = bytes.split_first()?;
        let name = std::str::from_utf8(name).ok()?.to_owned();
        match tag {
            TAG_REGISTER => Some(NameRequest::Register(name)),
            TAG_WHOIS => Some(NameRequest::WhoIs(name)),
            _ => None,
        }
    }
}

/// Parse a who-is reply into the mapped tid, or `None` inside the outer
/// `Some` when the name was not registered. The outer `None` means the
/// reply was malformed (e.g. truncated by a too-small reply buffer).
pub fn decode_whois_reply(bytes: &[u8]) -> Option<Option<TaskId>> {
    match bytes.split_first()? {
        (&TAG_NOT_FOUND, []) => Some(None),
        (&TAG_FOUND, tid) => {
            let tid = u32::from_le_bytes(tid.try_into().ok()?);
            Some(Some(TaskId(tid)))
        }
        _ => None,
    }
}

/// Build the send that registers the calling task under `name`.
pub fn register(name_server: TaskId, name: &str) -> Syscall {
    Syscall::Send {
        to: name_server,
        msg: NameRequest::Register(name.to_owned()).encode(),
        reply_cap: 4,
    }
}

/// Build the send that looks up `name`.
pub fn who_is(name_server: TaskId, name: &str) -> Syscall {
    Syscall::Send {
        to: name_server,
        msg: NameRequest::WhoIs(name.to_owned()).encode(),
        reply_cap: WHOIS_REPLY_CAP,
    }
}

/// The server task: an endless receive/dispatch/reply loop over the name
/// map. Registering an existing name overwrites the mapping.
#[derive(Debug, Default)]
pub struct NameServer {
    names: BTreeMap<String, TaskId>,
}

impl NameServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self, from: TaskId, msg: &[u8]) -> Vec<u8> {
        match NameRequest::decode(msg) {
            Some(NameRequest::Register(name)) => {
                debug!(name, tid = from.0, "name registered");
                self.names.insert(name, from);
                0u32.to_le_bytes().to_vec()
            }
            Some(NameRequest::WhoIs(name)) => match self.names.get(&name) {
                Some(tid) => {
                    let mut reply = vec![TAG_FOUND];
                    reply.extend_from_slice(&tid.0.to_le_bytes());
                    reply
                }
                None => vec![TAG_NOT_FOUND],
            },
            None => panic!("malformed name request from {from:?}"),
        }
    }
}

impl Task for NameServer {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match wake {
            Wake::Started | Wake::Resumed => Syscall::Receive { cap: NAME_MSG_CAP },
            Wake::Received { from, msg } => Syscall::Reply {
                to: from,
                reply: self.handle(from, &msg),
            },
            other => panic!("name server got unexpected wake {other:?}"),
        }
    }
}
