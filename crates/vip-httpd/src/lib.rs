//! A concurrent, bounded-capacity HTTP/1.0 server that multiplexes ordinary
//! (`GET`) and priority (`REAL`) requests across a fixed worker pool behind a
//! single admission coordinator.
//!
//! See [`config`] for the CLI-facing configuration surface, [`server`] for
//! the top-level `run` entry point, and [`coordinator`] for the scheduling
//! policy this crate exists to implement.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod queue;
pub mod server;
pub mod worker;

pub use config::{OverloadPolicy, ServerConfig};
pub use error::{ConfigError, HandlerError};
pub use server::run;
