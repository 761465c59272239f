//! Error types that cross a fallible-result boundary.
//!
//! In-process invariants (poisoned mutexes, a request missing from `running`)
//! are still handled the way the rest of this crate's texture does it —
//! `.expect()` with a descriptive message, or `debug_assert!` — rather than
//! through these types, which exist only where a caller needs to inspect and
//! react to *why* something failed.

use std::io;

/// Errors constructing a [`crate::config::ServerConfig`] from CLI input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("#threads must be positive, got {0}")]
    NonPositiveThreads(i64),

    #[error("queue size must be positive, got {0}")]
    NonPositiveQueueSize(i64),

    #[error("unknown scheduling algorithm: {0}")]
    UnknownPolicy(String),
}

/// Errors produced while handling one request, before a response could be
/// formed at all (as opposed to the HTTP-level 404/403/501 outcomes, which
/// are not errors — they are valid, fully-formed responses).
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to read request line: {0}")]
    ReadRequestLine(#[source] io::Error),

    #[error("failed to write response: {0}")]
    WriteResponse(#[source] io::Error),

    #[error("failed to map file into memory: {0}")]
    Mmap(#[source] io::Error),

    #[error("failed to spawn CGI process: {0}")]
    CgiSpawn(#[source] io::Error),
}
