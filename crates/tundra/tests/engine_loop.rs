//! The two cores working together: the movement tick driven by a periodic
//! kernel task that sleeps on the time server between ticks.

use std::cell::RefCell;
use std::rc::Rc;

use tundra::movement::{
    AgentRecord, ArrivalState, EntityId, GridNav, MoveConfig, MoveRegistry, PreferredVelocity,
    Vec2, Vec3, WorldStore,
};
use tundra::task::{time, Kernel, Syscall, Task, TaskId, Wake, TICK_EVENT};

struct Sim {
    registry: MoveRegistry,
    world: WorldStore,
    nav: GridNav,
    ticks: u32,
}

impl Sim {
    fn new() -> Self {
        let mut registry = MoveRegistry::new(MoveConfig::default());
        let mut world = WorldStore::new();
        let mut nav = GridNav::new(32, 32, 8.0);

        let agent = EntityId(1);
        world.insert(
            agent,
            AgentRecord {
                pos: Vec3::new(10.0, 0.0, 10.0),
                ..AgentRecord::default()
            },
        );
        registry.add_entity(&world, &mut nav, agent);
        assert!(registry.set_dest(&world, &mut nav, agent, Vec2::new(14.0, 10.0)));

        Self {
            registry,
            world,
            nav,
            ticks: 0,
        }
    }

    fn tick(&mut self) {
        self.registry
            .tick(&mut self.world, &mut self.nav, &PreferredVelocity);
        self.ticks += 1;
    }
}

/// Periodic driver: sleep 50 ms on the time server, run one movement tick,
/// repeat.
struct MoveTickTask {
    ts: TaskId,
    sim: Rc<RefCell<Sim>>,
    remaining: u32,
}

impl Task for MoveTickTask {
    fn resume(&mut self, wake: Wake) -> Syscall {
        match wake {
            Wake::Started => time::sleep(self.ts, 50),
            Wake::Sent { .. } => {
                self.sim.borrow_mut().tick();
                self.remaining -= 1;
                if self.remaining == 0 {
                    Syscall::Exit
                } else {
                    time::sleep(self.ts, 50)
                }
            }
            other => panic!("unexpected wake {other:?}"),
        }
    }
}

#[test]
fn the_time_server_paces_the_movement_tick() {
    let mut kernel = Kernel::new();
    let (_ns, ts) = kernel.create_services();

    let sim = Rc::new(RefCell::new(Sim::new()));
    let driver = kernel.spawn(
        1,
        Box::new(MoveTickTask {
            ts,
            sim: sim.clone(),
            remaining: 60,
        }),
    );

    // Drive 60 Hz tick events until the driver has run all its ticks.
    let mut now = 0u64;
    let mut events = 0u32;
    while kernel.alive(driver) {
        kernel.run_until_idle();
        now += 16;
        kernel.post_event(TICK_EVENT, now);
        events += 1;
        assert!(events < 10_000, "driver never finished");
    }
    kernel.run_until_idle();

    let sim = sim.borrow();
    assert_eq!(sim.ticks, 60);

    // 60 sleeps of 50 ms at a 16 ms tick: at least 3000 ms must have
    // elapsed on the kernel clock.
    assert!(now >= 3000, "woke too early: {now} ms");

    // The simulation actually moved the agent to its destination.
    assert_eq!(
        sim.registry.arrival_state(EntityId(1)),
        Some(ArrivalState::Arrived)
    );
    let pos = sim.world.get(EntityId(1)).unwrap().pos.xz();
    let dist = pos.distance(Vec2::new(14.0, 10.0));
    assert!(dist < 1.5, "agent should be at its destination, {dist} away");
}
