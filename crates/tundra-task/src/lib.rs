//! Cooperative microkernel for engine services.
//!
//! Tasks are explicit state machines resumed by a deterministic,
//! single-threaded [`Kernel`]. Communication is a blocking
//! send/receive/reply rendezvous with byte-buffer truncation on both
//! directions; events posted by the host unblock [`Syscall::AwaitEvent`]
//! waiters. Two always-on services ship with the kernel: a name server for
//! discovery and a time server for delayed wake-ups.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod kernel;
pub mod name;
pub mod task;
pub mod time;

pub use kernel::Kernel;
pub use name::{decode_whois_reply, NameRequest, NameServer, NAME_MSG_CAP, WHOIS_REPLY_CAP};
pub use task::{Destructor, EventId, Priority, Syscall, Task, TaskId, Wake};
pub use time::{TickNotifier, TimeRequest, TimeServer, TICK_EVENT, TIME_MSG_CAP};
