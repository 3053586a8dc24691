//! The time server and its tick notifier.
//!
//! The host posts [`TICK_EVENT`] at the tick rate with the current
//! monotonic millisecond count as the payload. A subordinate notifier task
//! forwards each tick to the time server over the normal rendezvous, which
//! keeps the server itself a plain receive loop: notifies are replied to
//! immediately, delay requests park the sender on a min-heap and the reply
//! that eventually wakes it is sent once its wake tick is due.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use tracing::debug;

use crate::task::{EventId, Syscall, Task, TaskId, Wake};

/// Periodic tick event the host drives the time server with. The payload
/// is the current monotonic time in milliseconds.
pub const TICK_EVENT: EventId = EventId(60);

/// Receive buffer capacity of the time server.
pub const TIME_MSG_CAP: usize = 9;

const TAG_NOTIFY: u8 = 0x01;
const TAG_DELAY: u8 = 0x02;

const OK_REPLY: [u8; 4] = [0; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRequest {
    /// One tick elapsed; `now_ms` is the tick event payload.
    Notify { now_ms: u64 },
    /// Reply to this request only after `ticks` milliseconds have passed.
    Delay { ticks: u32 },
}

impl TimeRequest {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TimeRequest::Notify { now_ms } => {
                let mut bytes = Vec::with_capacity(9);
                bytes.push(TAG_NOTIFY);
                bytes.extend_from_slice(&now_ms.to_le_bytes());
                bytes
            }
            TimeRequest::Delay { ticks } => {
                let mut bytes = Vec::with_capacity(5);
                bytes.push(TAG_DELAY);
                bytes.extend_from_slice(&ticks.to_le_bytes());
                bytes
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes.split_first()? {
            (&TAG_NOTIFY, rest) => Some(TimeRequest::Notify {
                now_ms: u64::from_le_bytes(rest.try_into().ok()?),
            }),
            (&TAG_DELAY, rest) => Some(TimeRequest::Delay {
                ticks: u32::from_le_bytes(rest.try_into().ok()?),
            }),
            _ => None,
        }
    }
}

/// Build the send that sleeps the calling task for `ms` milliseconds.
pub fn sleep(time_server: TaskId, ms: u32) -> Syscall {
    Syscall::Send {
        to: time_server,
        msg: TimeRequest::Delay { ticks: ms }.encode(),
        reply_cap: OK_REPLY.len(),
    }
}

/// A sleeper parked on the heap. Ordered by wake tick, ties by insertion
/// sequence, so wake-ups are strictly monotone in target tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DelayEntry {
    wake_tick: u64,
    seq: u64,
    tid: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    DestructorSet,
    Running,
}

/// The time server task.
pub struct TimeServer {
    pending: BinaryHeap<Reverse<DelayEntry>>,
    replies: VecDeque<(TaskId, Vec<u8>)>,
    now: u64,
    seq: u64,
    phase: Phase,
}

impl Default for TimeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeServer {
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            replies: VecDeque::new(),
            now: 0,
            seq: 0,
            phase: Phase::Fresh,
        }
    }

    /// Queue replies for every sleeper whose wake tick is due.
    fn drain_due(&mut self) {
        while let Some(Reverse(entry)) = self.pending.peek().copied() {
            if entry.wake_tick > self.now {
                break;
            }
            self.pending.pop();
            self.replies.push_back((entry.tid, OK_REPLY.to_vec()));
        }
    }

    /// Emit the next queued reply, or go back to receiving.
    fn next_step(&mut self) -> Syscall {
        match self.replies.pop_front() {
            Some((to, reply)) => Syscall::Reply { to, reply },
            None => Syscall::Receive { cap: TIME_MSG_CAP },
        }
    }

    fn handle(&mut self, from: TaskId, msg: &[u8]) {
        // `now` is read once per served request.
        match TimeRequest::decode(msg) {
            Some(TimeRequest::Notify { now_ms }) => {
                self.now = self.now.max(now_ms);
                self.replies.push_back((from, OK_REPLY.to_vec()));
            }
            Some(TimeRequest::Delay { ticks }) => {
                self.seq += 1;
                self.pending.push(Reverse(DelayEntry {
                    wake_tick: self.now + u64::from(ticks),
                    seq: self.seq,
                    tid: from,
                }));
            }
            None => panic!("malformed time request from {from:?}"),
        }
        self.drain_due();
    }
}

impl Task for TimeServer {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match (self.phase, wake) {
            (Phase::Fresh, Wake::Started) => {
                self.phase = Phase::DestructorSet;
                Syscall::SetDestructor(Box::new(|| debug!("time server exited")))
            }
            (Phase::DestructorSet, Wake::Resumed) => {
                self.phase = Phase::Running;
                Syscall::Create {
                    priority: 0,
                    task: Box::new(TickNotifier::new()),
                }
            }
            (Phase::Running, Wake::Created { .. }) => Syscall::Receive { cap: TIME_MSG_CAP },
            (Phase::Running, Wake::Received { from, msg }) => {
                self.handle(from, &msg);
                self.next_step()
            }
            (Phase::Running, Wake::Resumed) => self.next_step(),
            (_, other) => panic!("time server got unexpected wake {other:?}"),
        }
    }
}

/// Child task that turns the host's tick event into notify messages.
#[derive(Debug, Default)]
pub struct TickNotifier {
    parent: Option<TaskId>,
}

impl TickNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Task for TickNotifier {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match wake {
            Wake::Started => Syscall::ParentTid,
            Wake::Parent(Some(parent)) => {
                self.parent = Some(parent);
                Syscall::AwaitEvent(TICK_EVENT)
            }
            Wake::Parent(None) => panic!("tick notifier must be spawned by the time server"),
            Wake::Event { payload } => Syscall::Send {
                to: self.parent.expect("parent resolved before first tick"),
                msg: TimeRequest::Notify { now_ms: payload }.encode(),
                reply_cap: OK_REPLY.len(),
            },
            Wake::Sent { .. } => Syscall::AwaitEvent(TICK_EVENT),
            other => panic!("tick notifier got unexpected wake {other:?}"),
        }
    }
}
