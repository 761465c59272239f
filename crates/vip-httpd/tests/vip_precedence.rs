// crates/vip-httpd/tests/vip_precedence.rs
// Strict VIP precedence: while a VIP request is queued or being served, no
// ordinary worker may advance past its wait predicate.

use std::net::{TcpListener, TcpStream};
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

#[test]
fn ordinary_worker_waits_while_vip_queued() {
    let coord = Arc::new(Coordinator::new(4, OverloadPolicy::Block));

    let (_c1, s1) = connected_pair();
    coord.admit_vip(s1, Instant::now(), SystemTime::now());
    assert_eq!(coord.snapshot().vip_len, 1);

    let (_c2, s2) = connected_pair();
    coord.admit_ordinary(s2, Instant::now(), SystemTime::now());

    let coord2 = Arc::clone(&coord);
    let handle = thread::spawn(move || coord2.take_ordinary(0));

    thread::sleep(Duration::from_millis(50));
    assert!(
        !handle.is_finished(),
        "ordinary worker must not take the waiting request while a VIP request is still queued"
    );

    let vip_req = coord.take_vip(99);
    coord.complete_vip(vip_req.fd());

    let ordinary_req = handle.join().expect("ordinary worker thread panicked");
    drop(ordinary_req);
}

#[test]
fn ordinary_worker_waits_while_vip_mid_request() {
    let coord = Arc::new(Coordinator::new(4, OverloadPolicy::Block));

    let (_c1, s1) = connected_pair();
    coord.admit_vip(s1, Instant::now(), SystemTime::now());
    let vip_req = coord.take_vip(99);
    assert!(coord.snapshot().vip_busy, "vip_busy must be set once the VIP worker holds the request");

    let (_c2, s2) = connected_pair();
    coord.admit_ordinary(s2, Instant::now(), SystemTime::now());

    let coord2 = Arc::clone(&coord);
    let handle = thread::spawn(move || coord2.take_ordinary(0));

    thread::sleep(Duration::from_millis(50));
    assert!(
        !handle.is_finished(),
        "ordinary worker must not proceed while vip_busy is set, even with an empty vip queue"
    );

    coord.complete_vip(vip_req.fd());
    drop(vip_req);

    let ordinary_req = handle.join().expect("ordinary worker thread panicked");
    assert_eq!(ordinary_req.handler_id, Some(0));
}

#[test]
fn vip_requests_served_in_arrival_order() {
    let coord = Coordinator::new(4, OverloadPolicy::Block);
    let mut fds = Vec::new();
    for _ in 0..3 {
        let (_c, s) = connected_pair();
        fds.push(std::os::unix::io::AsRawFd::as_raw_fd(&s));
        coord.admit_vip(s, Instant::now(), SystemTime::now());
    }
    for expected_fd in fds {
        let req = coord.take_vip(0);
        assert_eq!(req.fd(), expected_fd);
        coord.complete_vip(req.fd());
    }
}
