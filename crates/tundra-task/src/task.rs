//! The task-side surface of the kernel.
//!
//! A task is a state machine: the kernel resumes it with the result of its
//! previous request ([`Wake`]) and the task answers with its next request
//! ([`Syscall`]). Exactly one request is outstanding per task, so every
//! suspension point is explicit.

/// Integer task identifier, unique while the task is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

/// Scheduling priority. Lower values run first; tasks of equal priority
/// run FIFO.
pub type Priority = u8;

/// Identifier of a kernel event posted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u32);

/// Cleanup hook run once, right before a task's exit is made visible.
pub type Destructor = Box<dyn FnOnce()>;

/// The result a task is resumed with.
#[derive(Debug)]
pub enum Wake {
    /// First resume after spawn.
    Started,
    /// A void request (yield, reply, set-destructor) completed.
    Resumed,
    /// The send completed: the receiver's reply, truncated to the
    /// sender's reply capacity.
    Sent { reply: Vec<u8> },
    /// A sender rendezvoused with this task's receive.
    Received { from: TaskId, msg: Vec<u8> },
    /// The awaited event fired.
    Event { payload: u64 },
    /// A child task was created.
    Created { tid: TaskId },
    /// The awaited task exited (`found == false`: no such task).
    Waited { found: bool },
    /// Own task id.
    Tid(TaskId),
    /// Parent task id (`None` for tasks spawned by the host).
    Parent(Option<TaskId>),
}

/// The next request a task makes of the kernel.
pub enum Syscall {
    /// Give way to same-priority peers.
    Yield,
    /// Return from the entry function; runs the destructor and releases
    /// waiters.
    Exit,
    /// Block until `to` receives this message and replies. The message is
    /// truncated to the receiver's buffer capacity; the reply to
    /// `reply_cap`.
    Send {
        to: TaskId,
        msg: Vec<u8>,
        reply_cap: usize,
    },
    /// Block until some task sends; the message is truncated to `cap`.
    Receive { cap: usize },
    /// Unblock a sender that is reply-blocked on this task. Non-blocking.
    Reply { to: TaskId, reply: Vec<u8> },
    /// Block until the event fires.
    AwaitEvent(EventId),
    /// Spawn a child task.
    Create {
        priority: Priority,
        task: Box<dyn Task>,
    },
    /// Block until the given task exits.
    Wait(TaskId),
    /// Register the cleanup hook (replacing any previous one).
    SetDestructor(Destructor),
    /// Own task id.
    MyTid,
    /// Parent task id.
    ParentTid,
}

impl Syscall {
    /// Request name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Syscall::Yield => "yield",
            Syscall::Exit => "exit",
            Syscall::Send { .. } => "send",
            Syscall::Receive { .. } => "receive",
            Syscall::Reply { .. } => "reply",
            Syscall::AwaitEvent(_) => "await_event",
            Syscall::Create { .. } => "create",
            Syscall::Wait(_) => "wait",
            Syscall::SetDestructor(_) => "set_destructor",
            Syscall::MyTid => "my_tid",
            Syscall::ParentTid => "parent_tid",
        }
    }
}

/// A cooperative task.
pub trait Task {
    fn resume(&mut self, wake: Wake) -> Syscall;
}
