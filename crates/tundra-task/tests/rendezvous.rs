use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use tundra_task::{Kernel, Syscall, Task, TaskId, Wake};

/// Receives one message and echoes it back as the reply.
struct EchoOnce {
    cap: usize,
    seen: Rc<RefCell<Option<Vec<u8>>>>,
}

impl Task for EchoOnce {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match wake {
            Wake::Started => Syscall::Receive { cap: self.cap },
            Wake::Received { from, msg } => {
                *self.seen.borrow_mut() = Some(msg.clone());
                Syscall::Reply {
                    to: from,
                    reply: msg,
                }
            }
            Wake::Resumed => Syscall::Exit,
            other => panic!("unexpected wake {other:?}"),
        }
    }
}

/// Sends one message and records the reply it observes.
struct SendOnce {
    to: TaskId,
    msg: Vec<u8>,
    reply_cap: usize,
    reply: Rc<RefCell<Option<Vec<u8>>>>,
}

impl Task for SendOnce {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match wake {
            Wake::Started => Syscall::Send {
                to: self.to,
                msg: self.msg.clone(),
                reply_cap: self.reply_cap,
            },
            Wake::Sent { reply } => {
                *self.reply.borrow_mut() = Some(reply);
                Syscall::Exit
            }
            other => panic!("unexpected wake {other:?}"),
        }
    }
}

fn rendezvous(msg: Vec<u8>, recv_cap: usize, reply_cap: usize) -> (Vec<u8>, Vec<u8>) {
    let mut kernel = Kernel::new();
    let seen = Rc::new(RefCell::new(None));
    let reply = Rc::new(RefCell::new(None));

    let receiver = kernel.spawn(
        0,
        Box::new(EchoOnce {
            cap: recv_cap,
            seen: seen.clone(),
        }),
    );
    kernel.spawn(
        0,
        Box::new(SendOnce {
            to: receiver,
            msg,
            reply_cap,
            reply: reply.clone(),
        }),
    );

    kernel.run_until_idle();
    let seen = seen.borrow().clone().expect("receiver got the message");
    let reply = reply.borrow().clone().expect("sender got the reply");
    (seen, reply)
}

#[test]
fn a_large_reply_truncates_to_the_senders_buffer() {
    // 64-byte reply into a 16-byte reply buffer: the sender sees the first
    // 16 bytes unchanged, and is unblocked.
    let msg: Vec<u8> = (0..64).collect();
    let (seen, reply) = rendezvous(msg.clone(), 128, 16);
    assert_eq!(seen, msg);
    assert_eq!(reply, msg[..16].to_vec());
}

#[test]
fn a_large_message_truncates_to_the_receivers_buffer() {
    let msg: Vec<u8> = (0..64).collect();
    let (seen, reply) = rendezvous(msg.clone(), 16, 128);
    assert_eq!(seen, msg[..16].to_vec());
    assert_eq!(reply, msg[..16].to_vec());
}

#[test]
fn receive_first_rendezvous_works_too() {
    // Receiver spawned first runs first and blocks in receive before the
    // sender ever runs.
    let (seen, reply) = rendezvous(vec![1, 2, 3], 8, 8);
    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(reply, vec![1, 2, 3]);
}

#[test]
fn send_first_rendezvous_queues_until_the_receive() {
    // Sender at a better priority issues its send before the receiver
    // first runs; the message queues against the receiver.
    let mut kernel = Kernel::new();
    let seen = Rc::new(RefCell::new(None));
    let reply = Rc::new(RefCell::new(None));

    // Receiver spawned first to obtain its tid, but at a worse priority so
    // the sender's send happens while the receiver has not yet received.
    struct LateReceiver {
        seen: Rc<RefCell<Option<Vec<u8>>>>,
    }
    impl Task for LateReceiver {
        fn resume(&mut self, wake: Wake) -> Syscall {
            match wake {
                Wake::Started => Syscall::Receive { cap: 64 },
                Wake::Received { from, msg } => {
                    *self.seen.borrow_mut() = Some(msg.clone());
                    Syscall::Reply {
                        to: from,
                        reply: msg,
                    }
                }
                Wake::Resumed => Syscall::Exit,
                other => panic!("unexpected wake {other:?}"),
            }
        }
    }

    let receiver = kernel.spawn(5, Box::new(LateReceiver { seen: seen.clone() }));
    kernel.spawn(
        0,
        Box::new(SendOnce {
            to: receiver,
            msg: vec![9, 9, 9],
            reply_cap: 8,
            reply: reply.clone(),
        }),
    );

    kernel.run_until_idle();
    assert_eq!(seen.borrow().clone(), Some(vec![9, 9, 9]));
    assert_eq!(reply.borrow().clone(), Some(vec![9, 9, 9]));
}

#[test]
fn queued_senders_are_served_in_arrival_order() {
    let mut kernel = Kernel::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    struct TwoReceives {
        order: Rc<RefCell<Vec<u8>>>,
        served: u8,
    }
    impl Task for TwoReceives {
        fn resume(&mut self, wake: Wake) -> Syscall {
            match wake {
                Wake::Started => Syscall::Receive { cap: 8 },
                Wake::Received { from, msg } => {
                    self.order.borrow_mut().push(msg[0]);
                    Syscall::Reply {
                        to: from,
                        reply: vec![],
                    }
                }
                Wake::Resumed => {
                    self.served += 1;
                    if self.served < 2 {
                        Syscall::Receive { cap: 8 }
                    } else {
                        Syscall::Exit
                    }
                }
                other => panic!("unexpected wake {other:?}"),
            }
        }
    }

    let receiver = kernel.spawn(9, Box::new(TwoReceives { order: order.clone(), served: 0 }));
    let sink = Rc::new(RefCell::new(None));
    kernel.spawn(
        0,
        Box::new(SendOnce {
            to: receiver,
            msg: vec![1],
            reply_cap: 0,
            reply: sink.clone(),
        }),
    );
    kernel.spawn(
        0,
        Box::new(SendOnce {
            to: receiver,
            msg: vec![2],
            reply_cap: 0,
            reply: Rc::new(RefCell::new(None)),
        }),
    );

    kernel.run_until_idle();
    assert_eq!(*order.borrow(), vec![1, 2]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The sender observes exactly the bytes the receiver wrote, truncated
    /// first to the receiver's buffer and then to the sender's.
    #[test]
    fn rendezvous_preserves_bytes_up_to_truncation(
        msg in prop::collection::vec(any::<u8>(), 0..96),
        recv_cap in 0usize..96,
        reply_cap in 0usize..96,
    ) {
        let (seen, reply) = rendezvous(msg.clone(), recv_cap, reply_cap);

        let expect_seen: Vec<u8> = msg.iter().copied().take(recv_cap).collect();
        let expect_reply: Vec<u8> =
            expect_seen.iter().copied().take(reply_cap).collect();

        prop_assert_eq!(seen, expect_seen);
        prop_assert_eq!(reply, expect_reply);
    }
}
