//! Worker threads: the loop shared by VIP and ordinary workers, parameterized
//! by [`Role`] rather than duplicated — the same structure used by an
//! interpreter pool's per-slot loop, one generic loop body with a parameter
//! that changes which queue/condvar it waits on.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::coordinator::Coordinator;
use crate::handler;

/// Which queue a worker pulls from. Carries no extra data — `Coordinator`
/// already tracks `vip_busy` and worker ids are passed separately — it only
/// selects which `take_*`/`complete_*` pair the loop calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Vip,
    Ordinary,
}

/// Per-worker counters, reported in the `Stat-Thread-*` response headers.
/// Each worker owns exactly one `WorkerStats` and is its only writer; the
/// handler it invokes borrows it mutably for the duration of one request.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub id: usize,
    pub total: u64,
    pub static_served: u64,
    pub dynamic_served: u64,
}

impl WorkerStats {
    fn new(id: usize) -> Self {
        Self {
            id,
            total: 0,
            static_served: 0,
            dynamic_served: 0,
        }
    }
}

/// One worker thread: a role, an id, a handle on the shared coordinator, and
/// its own stats counters.
pub struct Worker {
    id: usize,
    role: Role,
    coordinator: Arc<Coordinator>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl Worker {
    pub fn new(id: usize, role: Role, coordinator: Arc<Coordinator>) -> Self {
        Self {
            id,
            role,
            coordinator,
            stats: Arc::new(Mutex::new(WorkerStats::new(id))),
        }
    }

    /// A clone of the shared stats handle, for callers that want to read
    /// counters (e.g. an admin endpoint, or tests) without owning the worker.
    pub fn stats(&self) -> Arc<Mutex<WorkerStats>> {
        Arc::clone(&self.stats)
    }

    /// Spawn the worker's loop on a named OS thread. Never returns — the loop
    /// runs for the lifetime of the process.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        let name = match self.role {
            Role::Vip => "vip-worker".to_string(),
            Role::Ordinary => format!("worker-{}", self.id),
        };
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .expect("failed to spawn worker thread")
    }

    fn run(self) {
        loop {
            let req = match self.role {
                Role::Vip => self.coordinator.take_vip(self.id),
                Role::Ordinary => self.coordinator.take_ordinary(self.id),
            };
            let fd = req.fd();

            {
                let mut stats = self.stats.lock().expect("worker stats mutex poisoned");
                stats.total += 1;
            }

            handler::handle(req, &self.stats);

            match self.role {
                Role::Vip => self.coordinator.complete_vip(fd),
                Role::Ordinary => self.coordinator.complete_ordinary(fd),
            }
        }
    }
}
