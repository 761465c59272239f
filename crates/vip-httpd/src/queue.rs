//! The bounded queue primitive shared by the VIP and waiting sets, plus the
//! lightweight tracker used for the running set.
//!
//! [`RequestQueue`] is a thin `VecDeque` wrapper with no locking of its own —
//! every caller holds `CoordinatorState`'s mutex while touching it. Requests
//! move between queues by value (ownership transfer), so "a request lives in
//! exactly one queue at a time" is a structural property of the type rather
//! than something callers must maintain by convention.
//!
//! `running` does not hold full `Request`s the way `vip` and `waiting` do:
//! once a worker takes a request out of `vip`/`waiting` it must drop the
//! coordinator lock before performing blocking I/O on the socket, so the
//! `Request` (and its `TcpStream`) lives on the worker's stack for the
//! duration of the handler call, not inside any synchronized collection.
//! [`RunningSet`] tracks only what the capacity invariant and the `dh`/`bf`
//! policies actually need while a request is in flight: its identity and
//! count. This avoids the original's by-value linear-scan pattern, where the
//! same list node is aliased by both the list and the thread serving it — a
//! live socket can't live in both a list and a worker's stack at once, so
//! the running set holds only the lightweight identity it needs.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant, SystemTime};

/// One accepted connection, awaiting or undergoing service.
///
/// `dispatch` and `handler_id` are `None` until the request transitions from
/// `waiting`/`vip` into `running`, at which point [`Request::mark_dispatched`]
/// fills them in. `arrival` is monotonic (`Instant`) so dispatch latency is a
/// plain subtraction; `arrival_wall` is a `SystemTime` snapshot taken at the
/// same moment, kept alongside it purely so the `Stat-Req-Arrival` /
/// `Stat-Req-Dispatch` response headers can be rendered as wall-clock
/// `<sec>.<usec>` the way `request.c`'s `gettimeofday`-stamped fields are.
pub struct Request {
    pub stream: TcpStream,
    pub arrival: Instant,
    pub arrival_wall: SystemTime,
    pub dispatch: Option<Duration>,
    pub handler_id: Option<usize>,
}

impl Request {
    fn new(stream: TcpStream, arrival: Instant, arrival_wall: SystemTime) -> Self {
        Self {
            stream,
            arrival,
            arrival_wall,
            dispatch: None,
            handler_id: None,
        }
    }

    /// Stable identity for a request while its socket stays open.
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Stamp `dispatch` (elapsed time since `arrival`) and `handler_id`.
    /// Called exactly once, at the moment a request moves from `waiting`/`vip`
    /// into `running`.
    pub fn mark_dispatched(&mut self, worker_id: usize) {
        self.dispatch = Some(self.arrival.elapsed());
        self.handler_id = Some(worker_id);
    }
}

/// An ordered sequence of [`Request`]s: FIFO append, front-remove,
/// by-value-remove, by-index-remove.
#[derive(Default)]
pub struct RequestQueue {
    items: VecDeque<Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a new `Request` from a freshly accepted connection and push
    /// it to the tail. Both timestamps must be captured by the caller *before*
    /// the coordinator lock was acquired, and from the same instant.
    pub fn append_new(&mut self, stream: TcpStream, arrival: Instant, arrival_wall: SystemTime) {
        self.items.push_back(Request::new(stream, arrival, arrival_wall));
    }

    /// Pop the head of the queue, or `None` if empty.
    pub fn remove_front(&mut self) -> Option<Request> {
        self.items.pop_front()
    }

    /// Remove and return the first request whose connection matches `fd`.
    pub fn remove_by_value(&mut self, fd: RawFd) -> Option<Request> {
        let pos = self.items.iter().position(|r| r.fd() == fd)?;
        self.items.remove(pos)
    }

    /// Remove and return the `index`-th request. Used only by the `random`
    /// overload policy.
    pub fn remove_by_index(&mut self, index: usize) -> Option<Request> {
        self.items.remove(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Tracks requests currently being served: identity and count only, since the
/// live `Request` (and its socket) lives on the serving worker's stack rather
/// than in a synchronized collection. See the module-level doc for why.
#[derive(Default)]
pub struct RunningSet {
    fds: Vec<RawFd>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `fd` has begun running. Called exactly when a `Request`
    /// transitions out of `vip`/`waiting`.
    pub fn insert(&mut self, fd: RawFd) {
        self.fds.push(fd);
    }

    /// Record that `fd` has finished running. Returns `true` if `fd` was
    /// present (it always should be — callers may `debug_assert!` on this).
    pub fn remove(&mut self, fd: RawFd) -> bool {
        match self.fds.iter().position(|&f| f == fd) {
            Some(pos) => {
                self.fds.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}
