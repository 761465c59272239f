// crates/vip-httpd/tests/overload_policies.rs
// One test per overload policy, covering the literal admission/eviction
// behavior each one must produce when capacity is exhausted.

use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use vip_httpd::config::OverloadPolicy;
use vip_httpd::coordinator::Coordinator;

fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

/// "Drop-tail, pool=2, threads=1, alg=dt: submit three concurrent GETs.
/// Exactly one is served immediately, exactly one waits, exactly one is
/// dropped."
#[test]
fn drop_tail_admits_pool_size_and_drops_the_rest() {
    let coord = Coordinator::new(2, OverloadPolicy::DropTail);

    let (_c1, s1) = connected_pair();
    coord.admit_ordinary(s1, Instant::now(), SystemTime::now());
    let running = coord.take_ordinary(0); // "served immediately" by the one worker

    let (_c2, s2) = connected_pair();
    coord.admit_ordinary(s2, Instant::now(), SystemTime::now());
    assert_eq!(coord.snapshot().waiting_len, 1, "second request should be waiting");

    let (_c3, s3) = connected_pair();
    coord.admit_ordinary(s3, Instant::now(), SystemTime::now());

    let snap = coord.snapshot();
    assert_eq!(snap.running_len, 1, "running slot holds the first request");
    assert_eq!(snap.waiting_len, 1, "waiting slot still holds only the second request");
    assert_eq!(snap.total(), 2, "third request was dropped, not enqueued");

    coord.complete_ordinary(running.fd());
}

/// "Drop-head, pool=2, threads=1, alg=dh: submit three GETs A, B, C with
/// |waiting|=1 (A running, B waiting). On C's arrival, B's connection is
/// closed without response; C is served after A."
#[test]
fn drop_head_evicts_b_and_serves_c_after_a() {
    let coord = Coordinator::new(2, OverloadPolicy::DropHead);

    let (_ca, sa) = connected_pair();
    let fd_a = sa.as_raw_fd();
    coord.admit_ordinary(sa, Instant::now(), SystemTime::now());
    let running_a = coord.take_ordinary(0);
    assert_eq!(running_a.fd(), fd_a);

    let (_cb, sb) = connected_pair();
    coord.admit_ordinary(sb, Instant::now(), SystemTime::now());
    assert_eq!(coord.snapshot().waiting_len, 1);

    let (_cc, sc) = connected_pair();
    let fd_c = sc.as_raw_fd();
    coord.admit_ordinary(sc, Instant::now(), SystemTime::now());

    // B was evicted; the surviving waiting request is C.
    assert_eq!(coord.snapshot().waiting_len, 1);
    let next = coord.take_ordinary(1);
    assert_eq!(next.fd(), fd_c, "C must be the only waiting survivor after B's eviction");

    coord.complete_ordinary(running_a.fd());
    coord.complete_ordinary(next.fd());
}

/// "Block-and-flush, pool=2, alg=bf: submit three GETs; the third arrives
/// while both slots are occupied. The third's connection closes only after
/// the first two complete and both queues drain."
#[test]
fn block_and_flush_waits_for_full_drain_before_dropping() {
    let coord = Arc::new(Coordinator::new(2, OverloadPolicy::BlockFlush));

    let (_c1, s1) = connected_pair();
    coord.admit_ordinary(s1, Instant::now(), SystemTime::now());
    let running1 = coord.take_ordinary(0);

    let (_c2, s2) = connected_pair();
    coord.admit_ordinary(s2, Instant::now(), SystemTime::now());
    let running2 = coord.take_ordinary(1);

    assert_eq!(coord.snapshot().running_len, 2);

    let coord2 = Arc::clone(&coord);
    let (_c3, s3) = connected_pair();
    let handle = thread::spawn(move || {
        coord2.admit_ordinary(s3, Instant::now(), SystemTime::now());
    });

    thread::sleep(Duration::from_millis(50));
    assert!(
        !handle.is_finished(),
        "bf must hold the third connection open until running and waiting both drain"
    );

    coord.complete_ordinary(running1.fd());
    thread::sleep(Duration::from_millis(50));
    assert!(
        !handle.is_finished(),
        "bf must still wait with one request left running"
    );

    coord.complete_ordinary(running2.fd());
    handle.join().expect("admitter thread panicked");

    // The third connection was dropped, not enqueued.
    assert_eq!(coord.snapshot().total(), 0);
}

/// Random policy: dropping `ceil(|waiting|/2)` victims leaves
/// `k - ceil(k/2) + 1` waiting requests, and the new request is always among
/// the survivors.
#[test]
fn random_drops_ceiling_half_and_keeps_the_new_request() {
    let coord = Coordinator::new(4, OverloadPolicy::Random);
    for _ in 0..4 {
        let (_c, s) = connected_pair();
        coord.admit_ordinary(s, Instant::now(), SystemTime::now());
    }
    assert_eq!(coord.snapshot().waiting_len, 4);

    let (_c, s) = connected_pair();
    let new_fd = s.as_raw_fd();
    coord.admit_ordinary(s, Instant::now(), SystemTime::now());

    // k=4 (pool full with 0 running, 4 waiting); ceil(4/2) = 2 victims.
    assert_eq!(coord.snapshot().waiting_len, 4 - 2 + 1);

    // Drain the survivors and confirm the new request is among them.
    let mut seen_new = false;
    while coord.snapshot().waiting_len > 0 {
        let req = coord.take_ordinary(0);
        if req.fd() == new_fd {
            seen_new = true;
        }
        coord.complete_ordinary(req.fd());
    }
    assert!(seen_new, "the newly admitted request must never be a random victim of its own admission");
}

#[test]
fn random_with_empty_waiting_drops_new_connection() {
    // pool_size=1 with one request already running leaves |waiting|=0, so
    // the next ordinary admission has nothing to drop from and must itself
    // be discarded.
    let coord = Coordinator::new(1, OverloadPolicy::Random);
    let (_c1, s1) = connected_pair();
    coord.admit_ordinary(s1, Instant::now(), SystemTime::now());
    let running = coord.take_ordinary(0);
    assert_eq!(coord.snapshot().waiting_len, 0);

    let (_c2, s2) = connected_pair();
    coord.admit_ordinary(s2, Instant::now(), SystemTime::now());
    assert_eq!(coord.snapshot().waiting_len, 0, "new connection must be dropped, not queued");

    coord.complete_ordinary(running.fd());
}
