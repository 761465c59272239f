//! The top-level entry point: binds the listening socket, starts the worker
//! pool, and runs the accept loop that classifies and admits connections.
//! The Rust counterpart of `server.c`'s `main`.

use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::worker::{Role, Worker};

/// Runs the server until the listening socket errors out. Blocks forever on
/// success — there is no graceful shutdown path, matching `server.c`'s
/// unconditional `while (1)`.
pub fn run(config: ServerConfig) -> io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))?;
    tracing::info!(
        port = config.port,
        threads = config.threads,
        queue_size = config.queue_size,
        policy = ?config.policy,
        "server listening"
    );

    let coordinator = Arc::new(Coordinator::new(config.queue_size, config.policy));

    for id in 0..config.threads {
        Worker::new(id, Role::Ordinary, Arc::clone(&coordinator)).spawn();
    }
    Worker::new(config.threads, Role::Vip, Arc::clone(&coordinator)).spawn();

    loop {
        let (stream, _addr) = listener.accept()?;
        let arrival = Instant::now();
        let arrival_wall = SystemTime::now();

        let is_vip = classify(&stream);
        let span = tracing::debug_span!("conn", fd = std::os::unix::io::AsRawFd::as_raw_fd(&stream), is_vip);
        let _enter = span.enter();

        if is_vip {
            coordinator.admit_vip(stream, arrival, arrival_wall);
        } else {
            coordinator.admit_ordinary(stream, arrival, arrival_wall);
        }
    }
}

/// Peeks the request line to tell a `REAL` (VIP) request from everything
/// else, without consuming any bytes. On a peek error, fails safe toward the
/// VIP path — the Rust analogue of `getRequestMetaData`'s `return 1` when
/// `recv` itself fails.
fn classify(stream: &std::net::TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match stream.peek(&mut buf) {
        Ok(n) => {
            let text = String::from_utf8_lossy(&buf[..n]);
            let method = text.split_whitespace().next().unwrap_or("");
            method.eq_ignore_ascii_case("REAL")
        }
        Err(err) => {
            tracing::warn!(error = %err, "peek classification failed, treating as VIP");
            true
        }
    }
}
