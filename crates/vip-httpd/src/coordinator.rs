//! The admission coordinator: capacity enforcement, VIP/ordinary arbitration,
//! and the five overload policies, all behind one mutex and four condition
//! variables.
//!
//! Every method here either runs on the accept-loop thread (`admit_vip`,
//! `admit_ordinary`) or on a worker thread (`take_vip`, `take_ordinary`,
//! `complete_vip`, `complete_ordinary`). None of them hold the lock across a
//! blocking socket read/write — `take_*` returns the owned [`Request`] to the
//! caller, who serves it with the lock released.

use std::net::TcpStream;
use std::os::unix::io::RawFd;
use std::sync::{Condvar, Mutex};
use std::time::{Instant, SystemTime};

use rand::Rng;

use crate::config::OverloadPolicy;
use crate::queue::{Request, RequestQueue, RunningSet};

struct CoordinatorState {
    vip: RequestQueue,
    waiting: RequestQueue,
    running: RunningSet,
    vip_busy: bool,
}

/// A snapshot of queue lengths and the VIP-busy flag, useful for tests and
/// for the invariant assertions that would otherwise require reaching
/// through the lock from outside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub vip_len: usize,
    pub waiting_len: usize,
    pub running_len: usize,
    pub vip_busy: bool,
}

impl Snapshot {
    pub fn total(&self) -> usize {
        self.vip_len + self.waiting_len + self.running_len
    }
}

/// Shared scheduling state: the three queues, `vip_busy`, capacity, and the
/// overload policy applied to ordinary admission when capacity is exhausted.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    pool_size: usize,
    policy: OverloadPolicy,
    vip_available: Condvar,
    ordinary_available: Condvar,
    capacity_freed: Condvar,
    all_empty: Condvar,
}

impl Coordinator {
    pub fn new(pool_size: usize, policy: OverloadPolicy) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                vip: RequestQueue::new(),
                waiting: RequestQueue::new(),
                running: RunningSet::new(),
                vip_busy: false,
            }),
            pool_size,
            policy,
            vip_available: Condvar::new(),
            ordinary_available: Condvar::new(),
            capacity_freed: Condvar::new(),
            all_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().expect("coordinator mutex poisoned")
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            vip_len: state.vip.len(),
            waiting_len: state.waiting.len(),
            running_len: state.running.len(),
            vip_busy: state.vip_busy,
        }
    }

    // ── Admission (accept-loop thread) ──────────────────────────────────────

    /// Admit a VIP connection. Blocks until capacity allows it; VIP requests
    /// are never dropped.
    pub fn admit_vip(&self, stream: TcpStream, arrival: Instant, arrival_wall: SystemTime) {
        let mut state = self.lock();
        while state.running.len() + state.waiting.len() + state.vip.len() >= self.pool_size {
            tracing::debug!("vip admission blocked on capacity");
            state = self
                .capacity_freed
                .wait(state)
                .expect("coordinator mutex poisoned");
        }
        state.vip.append_new(stream, arrival, arrival_wall);
        drop(state);
        self.vip_available.notify_one();
    }

    /// Admit an ordinary connection, applying the configured overload policy
    /// if the shared waiting+running budget is already exhausted.
    pub fn admit_ordinary(&self, stream: TcpStream, arrival: Instant, arrival_wall: SystemTime) {
        let mut state = self.lock();

        if state.running.len() + state.waiting.len() < self.pool_size {
            state.waiting.append_new(stream, arrival, arrival_wall);
            drop(state);
            self.ordinary_available.notify_one();
            return;
        }

        match self.policy {
            OverloadPolicy::Block => {
                while state.running.len() + state.waiting.len() >= self.pool_size {
                    state = self
                        .capacity_freed
                        .wait(state)
                        .expect("coordinator mutex poisoned");
                }
                state.waiting.append_new(stream, arrival, arrival_wall);
                drop(state);
                self.ordinary_available.notify_one();
            }
            OverloadPolicy::DropTail => {
                tracing::debug!("drop-tail: capacity exhausted, closing new connection");
                drop(stream);
            }
            OverloadPolicy::DropHead => {
                if !state.waiting.is_empty() {
                    if let Some(evicted) = state.waiting.remove_front() {
                        tracing::debug!(fd = evicted.fd(), "drop-head: evicting oldest waiting connection");
                        drop(evicted.stream);
                    }
                    state.waiting.append_new(stream, arrival, arrival_wall);
                    drop(state);
                    self.ordinary_available.notify_one();
                } else {
                    tracing::debug!("drop-head: no waiting requests to evict, closing new connection");
                    drop(stream);
                }
            }
            OverloadPolicy::BlockFlush => {
                while !(state.running.is_empty() && state.waiting.is_empty() && state.vip.is_empty()) {
                    state = self.all_empty.wait(state).expect("coordinator mutex poisoned");
                }
                tracing::debug!("block-flush: all queues drained, dropping new connection");
                drop(stream);
            }
            OverloadPolicy::Random => {
                if state.waiting.is_empty() {
                    tracing::debug!("random: waiting queue empty, closing new connection");
                    drop(stream);
                    return;
                }
                let victims = state.waiting.len().div_ceil(2);
                let mut rng = rand::thread_rng();
                for _ in 0..victims {
                    if state.waiting.is_empty() {
                        break;
                    }
                    let idx = rng.gen_range(0..state.waiting.len());
                    if let Some(evicted) = state.waiting.remove_by_index(idx) {
                        drop(evicted.stream);
                    }
                }
                tracing::debug!(victims, "random: dropped waiting connections");
                state.waiting.append_new(stream, arrival, arrival_wall);
                drop(state);
                self.ordinary_available.notify_one();
            }
        }
    }

    // ── Dispatch (worker threads) ───────────────────────────────────────────

    /// Block until a VIP request is available, move it into `running`, and
    /// return it. Marks `vip_busy = true` for the duration.
    pub fn take_vip(&self, worker_id: usize) -> Request {
        let mut state = self.lock();
        while state.vip.is_empty() {
            state = self
                .vip_available
                .wait(state)
                .expect("coordinator mutex poisoned");
        }
        state.vip_busy = true;
        let mut req = state.vip.remove_front().expect("vip queue just checked non-empty");
        req.mark_dispatched(worker_id);
        state.running.insert(req.fd());
        req
    }

    /// Block until the ordinary-worker wait predicate breaks — `waiting` is
    /// non-empty, `vip` is empty, and no VIP worker is mid-request — then move
    /// the oldest waiting request into `running` and return it.
    pub fn take_ordinary(&self, worker_id: usize) -> Request {
        let mut state = self.lock();
        loop {
            if !state.waiting.is_empty() && state.vip.is_empty() && !state.vip_busy {
                break;
            }
            if !state.vip.is_empty() {
                state = self
                    .vip_available
                    .wait(state)
                    .expect("coordinator mutex poisoned");
            } else {
                state = self
                    .ordinary_available
                    .wait(state)
                    .expect("coordinator mutex poisoned");
            }
        }
        let mut req = state
            .waiting
            .remove_front()
            .expect("waiting queue just checked non-empty");
        req.mark_dispatched(worker_id);
        state.running.insert(req.fd());
        req
    }

    /// Called by the VIP worker after it finishes serving `fd`.
    pub fn complete_vip(&self, fd: RawFd) {
        let mut state = self.lock();
        let removed = state.running.remove(fd);
        debug_assert!(removed, "vip worker completed a request not tracked in running");
        state.vip_busy = false;
        let drained = state.running.is_empty() && state.waiting.is_empty() && state.vip.is_empty();
        drop(state);

        self.capacity_freed.notify_all();
        if drained {
            self.all_empty.notify_one();
        }
        self.ordinary_available.notify_all();
    }

    /// Called by an ordinary worker after it finishes serving `fd`.
    pub fn complete_ordinary(&self, fd: RawFd) {
        let mut state = self.lock();
        let removed = state.running.remove(fd);
        debug_assert!(removed, "ordinary worker completed a request not tracked in running");
        let drained = state.running.is_empty() && state.waiting.is_empty() && state.vip.is_empty();
        drop(state);

        self.capacity_freed.notify_one();
        if drained {
            self.all_empty.notify_one();
        }
    }
}
