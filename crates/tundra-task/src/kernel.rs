//! The cooperative kernel: scheduling, rendezvous, events, exit.
//!
//! Single-threaded and deterministic. Tasks run until they issue a request;
//! blocking requests park them on the relevant queue, non-blocking requests
//! resume them ahead of same-priority peers (only [`Syscall::Yield`]
//! rotates the queue). Nothing here is asynchronous: the host calls
//! [`Kernel::step`]/[`Kernel::run_until_idle`] and posts events explicitly.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::name::NameServer;
use crate::task::{Destructor, EventId, Priority, Syscall, Task, TaskId, Wake};
use crate::time::TimeServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Ready,
    /// Waiting for `to` to receive the stored message.
    SendBlocked { to: TaskId, reply_cap: usize },
    /// Message delivered; waiting for `to` to reply.
    ReplyBlocked { to: TaskId, reply_cap: usize },
    ReceiveBlocked { cap: usize },
    EventBlocked(EventId),
    WaitBlocked(TaskId),
    Exited,
}

struct Tcb {
    priority: Priority,
    parent: Option<TaskId>,
    task: Option<Box<dyn Task>>,
    state: RunState,
    /// Wake to deliver on the next run; present iff the task is ready.
    pending: Option<Wake>,
    /// Senders queued against this task, in arrival order.
    senders: VecDeque<TaskId>,
    /// Outgoing message while send-blocked.
    out_msg: Option<Vec<u8>>,
    destructor: Option<Destructor>,
    /// Tasks blocked in `Wait` on this one.
    waiters: Vec<TaskId>,
}

enum Requeue {
    /// Continue ahead of same-priority peers (non-blocking request).
    Front,
    /// Go behind same-priority peers (yield, fresh wake-up).
    Back,
}

fn truncated(mut bytes: Vec<u8>, cap: usize) -> Vec<u8> {
    bytes.truncate(cap);
    bytes
}

/// The kernel. Owns every task; dropping it drops them all.
#[derive(Default)]
pub struct Kernel {
    tasks: BTreeMap<TaskId, Tcb>,
    ready: BTreeMap<Priority, VecDeque<TaskId>>,
    event_waiters: BTreeMap<EventId, VecDeque<TaskId>>,
    next_tid: u32,
    ns_tid: Option<TaskId>,
    ts_tid: Option<TaskId>,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task with no parent.
    pub fn spawn(&mut self, priority: Priority, task: Box<dyn Task>) -> TaskId {
        self.spawn_inner(priority, task, None)
    }

    fn spawn_inner(
        &mut self,
        priority: Priority,
        task: Box<dyn Task>,
        parent: Option<TaskId>,
    ) -> TaskId {
        self.next_tid += 1;
        let tid = TaskId(self.next_tid);
        debug!(tid = tid.0, priority, "task spawned");

        self.tasks.insert(
            tid,
            Tcb {
                priority,
                parent,
                task: Some(task),
                state: RunState::Ready,
                pending: Some(Wake::Started),
                senders: VecDeque::new(),
                out_msg: None,
                destructor: None,
                waiters: Vec::new(),
            },
        );
        self.ready.entry(priority).or_default().push_back(tid);
        tid
    }

    /// Spawn the two always-on services (name server, then time server) and
    /// capture their tids.
    pub fn create_services(&mut self) -> (TaskId, TaskId) {
        let ns = self.spawn(0, Box::new(NameServer::new()));
        let ts = self.spawn(0, Box::new(TimeServer::new()));
        self.ns_tid = Some(ns);
        self.ts_tid = Some(ts);
        (ns, ts)
    }

    pub fn name_server_tid(&self) -> Option<TaskId> {
        self.ns_tid
    }

    pub fn time_server_tid(&self) -> Option<TaskId> {
        self.ts_tid
    }

    /// Whether the task exists and has not exited.
    pub fn alive(&self, tid: TaskId) -> bool {
        self.tasks
            .get(&tid)
            .map(|tcb| tcb.state != RunState::Exited)
            .unwrap_or(false)
    }

    /// Fire an event. Waiters are released in the order they started
    /// waiting, all carrying the same payload.
    pub fn post_event(&mut self, event: EventId, payload: u64) {
        let Some(mut waiters) = self.event_waiters.remove(&event) else {
            return;
        };
        trace!(event = event.0, waiters = waiters.len(), "event posted");
        while let Some(tid) = waiters.pop_front() {
            self.make_ready(tid, Wake::Event { payload }, Requeue::Back);
        }
    }

    /// Run one task until its next request. Returns false when no task is
    /// ready.
    pub fn step(&mut self) -> bool {
        let Some(tid) = self.pop_ready() else {
            return false;
        };

        let tcb = self.tasks.get_mut(&tid).expect("ready task exists");
        let wake = tcb.pending.take().expect("ready task has a pending wake");
        let mut task = tcb.task.take().expect("ready task has a body");

        let syscall = task.resume(wake);
        trace!(tid = tid.0, syscall = syscall.kind(), "request");

        if matches!(syscall, Syscall::Exit) {
            drop(task);
            self.exit_task(tid);
        } else {
            self.tasks.get_mut(&tid).expect("task exists").task = Some(task);
            self.dispatch(tid, syscall);
        }
        true
    }

    /// Step until every task is blocked or exited. Returns the number of
    /// steps taken.
    pub fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        steps
    }

    fn pop_ready(&mut self) -> Option<TaskId> {
        let priority = *self.ready.keys().next()?;
        let queue = self.ready.get_mut(&priority).expect("queue exists");
        let tid = queue.pop_front().expect("ready queues are never empty");
        if queue.is_empty() {
            self.ready.remove(&priority);
        }
        Some(tid)
    }

    fn make_ready(&mut self, tid: TaskId, wake: Wake, position: Requeue) {
        let tcb = self.tasks.get_mut(&tid).expect("task exists");
        debug_assert!(tcb.state != RunState::Exited);
        tcb.state = RunState::Ready;
        tcb.pending = Some(wake);
        let queue = self.ready.entry(tcb.priority).or_default();
        match position {
            Requeue::Front => queue.push_front(tid),
            Requeue::Back => queue.push_back(tid),
        }
    }

    fn exit_task(&mut self, tid: TaskId) {
        let tcb = self.tasks.get_mut(&tid).expect("task exists");
        tcb.state = RunState::Exited;
        if let Some(destructor) = tcb.destructor.take() {
            destructor();
        }
        debug!(tid = tid.0, "task exited");

        let waiters = std::mem::take(&mut tcb.waiters);
        for waiter in waiters {
            self.make_ready(waiter, Wake::Waited { found: true }, Requeue::Back);
        }
    }

    fn dispatch(&mut self, tid: TaskId, syscall: Syscall) {
        match syscall {
            Syscall::Exit => unreachable!("exit handled by step"),

            Syscall::Yield => {
                self.make_ready(tid, Wake::Resumed, Requeue::Back);
            }

            Syscall::Send {
                to,
                msg,
                reply_cap,
            } => {
                assert!(self.alive(to), "{tid:?} sent to dead task {to:?}");

                let receiver = self.tasks.get_mut(&to).expect("receiver exists");
                if let RunState::ReceiveBlocked { cap } = receiver.state {
                    let delivered = truncated(msg, cap);
                    self.make_ready(
                        to,
                        Wake::Received {
                            from: tid,
                            msg: delivered,
                        },
                        Requeue::Back,
                    );
                    let sender = self.tasks.get_mut(&tid).expect("sender exists");
                    sender.state = RunState::ReplyBlocked { to, reply_cap };
                } else {
                    receiver.senders.push_back(tid);
                    let sender = self.tasks.get_mut(&tid).expect("sender exists");
                    sender.state = RunState::SendBlocked { to, reply_cap };
                    sender.out_msg = Some(msg);
                }
            }

            Syscall::Receive { cap } => {
                let receiver = self.tasks.get_mut(&tid).expect("receiver exists");
                if let Some(sender_tid) = receiver.senders.pop_front() {
                    let sender = self.tasks.get_mut(&sender_tid).expect("sender exists");
                    let RunState::SendBlocked { to, reply_cap } = sender.state else {
                        panic!("queued sender {sender_tid:?} is not send-blocked");
                    };
                    debug_assert_eq!(to, tid);
                    sender.state = RunState::ReplyBlocked { to, reply_cap };
                    let msg = truncated(
                        sender.out_msg.take().expect("send-blocked task has a message"),
                        cap,
                    );
                    self.make_ready(
                        tid,
                        Wake::Received {
                            from: sender_tid,
                            msg,
                        },
                        Requeue::Front,
                    );
                } else {
                    receiver.state = RunState::ReceiveBlocked { cap };
                }
            }

            Syscall::Reply { to, reply } => {
                let target = self
                    .tasks
                    .get_mut(&to)
                    .unwrap_or_else(|| panic!("reply to unknown task {to:?}"));
                match target.state {
                    RunState::ReplyBlocked {
                        to: sent_to,
                        reply_cap,
                    } if sent_to == tid => {
                        let reply = truncated(reply, reply_cap);
                        self.make_ready(to, Wake::Sent { reply }, Requeue::Back);
                    }
                    _ => panic!("{to:?} is not awaiting a reply from {tid:?}"),
                }
                self.make_ready(tid, Wake::Resumed, Requeue::Front);
            }

            Syscall::AwaitEvent(event) => {
                let tcb = self.tasks.get_mut(&tid).expect("task exists");
                tcb.state = RunState::EventBlocked(event);
                self.event_waiters.entry(event).or_default().push_back(tid);
            }

            Syscall::Create { priority, task } => {
                let child = self.spawn_inner(priority, task, Some(tid));
                self.make_ready(tid, Wake::Created { tid: child }, Requeue::Front);
            }

            Syscall::Wait(target) => match self.tasks.get(&target).map(|tcb| tcb.state) {
                None => {
                    self.make_ready(tid, Wake::Waited { found: false }, Requeue::Front);
                }
                Some(RunState::Exited) => {
                    self.make_ready(tid, Wake::Waited { found: true }, Requeue::Front);
                }
                Some(_) => {
                    self.tasks
                        .get_mut(&target)
                        .expect("target exists")
                        .waiters
                        .push(tid);
                    let waiter = self.tasks.get_mut(&tid).expect("waiter exists");
                    waiter.state = RunState::WaitBlocked(target);
                }
            },

            Syscall::SetDestructor(destructor) => {
                let tcb = self.tasks.get_mut(&tid).expect("task exists");
                tcb.destructor = Some(destructor);
                self.make_ready(tid, Wake::Resumed, Requeue::Front);
            }

            Syscall::MyTid => {
                self.make_ready(tid, Wake::Tid(tid), Requeue::Front);
            }

            Syscall::ParentTid => {
                let parent = self.tasks.get(&tid).expect("task exists").parent;
                self.make_ready(tid, Wake::Parent(parent), Requeue::Front);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs a fixed script of syscalls, recording every wake.
    struct Scripted {
        script: Vec<fn(&Wake) -> Syscall>,
        step: usize,
        pub log: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl Task for Scripted {
        fn resume(&mut self, wake: Wake) -> Syscall {
            self.log.borrow_mut().push(format!("{wake:?}"));
            let f = self.script.get(self.step).copied().unwrap_or(|_| Syscall::Exit);
            self.step += 1;
            f(&wake)
        }
    }

    fn scripted(
        script: Vec<fn(&Wake) -> Syscall>,
    ) -> (Scripted, std::rc::Rc<std::cell::RefCell<Vec<String>>>) {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        (
            Scripted {
                script,
                step: 0,
                log: log.clone(),
            },
            log,
        )
    }

    #[test]
    fn tasks_run_in_priority_then_fifo_order() {
        let mut kernel = Kernel::new();
        let order = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        struct Tagged(u32, std::rc::Rc<std::cell::RefCell<Vec<u32>>>);
        impl Task for Tagged {
            fn resume(&mut self, _wake: Wake) -> Syscall {
                self.1.borrow_mut().push(self.0);
                Syscall::Exit
            }
        }

        kernel.spawn(2, Box::new(Tagged(20, order.clone())));
        kernel.spawn(1, Box::new(Tagged(10, order.clone())));
        kernel.spawn(1, Box::new(Tagged(11, order.clone())));
        kernel.spawn(0, Box::new(Tagged(0, order.clone())));

        kernel.run_until_idle();
        assert_eq!(*order.borrow(), vec![0, 10, 11, 20]);
    }

    #[test]
    fn yield_rotates_within_a_priority() {
        let mut kernel = Kernel::new();
        let order = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        struct YieldOnce(u32, std::rc::Rc<std::cell::RefCell<Vec<u32>>>);
        impl Task for YieldOnce {
            fn resume(&mut self, wake: Wake) -> Syscall {
                self.1.borrow_mut().push(self.0);
                match wake {
                    Wake::Started => Syscall::Yield,
                    _ => Syscall::Exit,
                }
            }
        }

        kernel.spawn(1, Box::new(YieldOnce(1, order.clone())));
        kernel.spawn(1, Box::new(YieldOnce(2, order.clone())));
        kernel.run_until_idle();
        assert_eq!(*order.borrow(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn my_tid_matches_the_spawn_result() {
        let mut kernel = Kernel::new();
        let out = std::rc::Rc::new(std::cell::RefCell::new(None));

        struct Introspect(std::rc::Rc<std::cell::RefCell<Option<TaskId>>>);
        impl Task for Introspect {
            fn resume(&mut self, wake: Wake) -> Syscall {
                match wake {
                    Wake::Started => Syscall::MyTid,
                    Wake::Tid(tid) => {
                        *self.0.borrow_mut() = Some(tid);
                        Syscall::Exit
                    }
                    other => panic!("unexpected wake {other:?}"),
                }
            }
        }

        let tid = kernel.spawn(3, Box::new(Introspect(out.clone())));
        kernel.run_until_idle();
        assert_eq!(*out.borrow(), Some(tid));
        assert!(!kernel.alive(tid));
    }

    #[test]
    fn wait_on_unknown_task_reports_not_found() {
        let mut kernel = Kernel::new();
        let (task, log) = scripted(vec![|_| Syscall::Wait(TaskId(404))]);
        kernel.spawn(0, Box::new(task));
        kernel.run_until_idle();

        let log = log.borrow();
        assert!(log[1].contains("found: false"), "got {:?}", log[1]);
    }

    #[test]
    fn destructor_runs_before_waiters_wake() {
        let mut kernel = Kernel::new();
        let order = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        struct Dying {
            log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
            yielded: bool,
        }
        impl Task for Dying {
            fn resume(&mut self, wake: Wake) -> Syscall {
                match wake {
                    Wake::Started => {
                        let log = self.log.clone();
                        Syscall::SetDestructor(Box::new(move || {
                            log.borrow_mut().push("destructor");
                        }))
                    }
                    // Yield once so the waiter gets to block on us first.
                    _ if !self.yielded => {
                        self.yielded = true;
                        Syscall::Yield
                    }
                    _ => Syscall::Exit,
                }
            }
        }

        struct Waiter(TaskId, std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>);
        impl Task for Waiter {
            fn resume(&mut self, wake: Wake) -> Syscall {
                match wake {
                    Wake::Started => Syscall::Wait(self.0),
                    Wake::Waited { found } => {
                        assert!(found);
                        self.1.borrow_mut().push("waiter woke");
                        Syscall::Exit
                    }
                    other => panic!("unexpected wake {other:?}"),
                }
            }
        }

        let dying = kernel.spawn(
            0,
            Box::new(Dying {
                log: order.clone(),
                yielded: false,
            }),
        );
        kernel.spawn(0, Box::new(Waiter(dying, order.clone())));
        kernel.run_until_idle();

        assert_eq!(*order.borrow(), vec!["destructor", "waiter woke"]);
    }
}
