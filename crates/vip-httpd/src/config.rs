//! Server configuration: the validated, typed form of `server <port> <threads>
//! <queue_size> <schedalg>`.
//!
//! This module owns validation only; argument *parsing* (flag names, `--help`,
//! arity) lives in `crates/vip-httpd-cli` via `clap`. Keeping the two separate
//! means the validation rules — positive thread/queue counts, a known policy
//! token — are testable without spawning a process.

use std::str::FromStr;

use crate::error::ConfigError;

/// The overload policy applied to an ordinary request admitted when
/// `running.len() + waiting.len() == pool_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// Wait for capacity, then enqueue.
    Block,
    /// Drop-tail: close the new connection.
    DropTail,
    /// Drop-head: evict the oldest waiting request, enqueue the new one.
    DropHead,
    /// Block-and-flush: wait for all three queues to drain, then drop the new connection.
    BlockFlush,
    /// Drop ~half of the waiting set at random, then enqueue the new request.
    Random,
}

impl FromStr for OverloadPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "dt" => Ok(Self::DropTail),
            "dh" => Ok(Self::DropHead),
            "bf" => Ok(Self::BlockFlush),
            "random" => Ok(Self::Random),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub threads: usize,
    pub queue_size: usize,
    pub policy: OverloadPolicy,
}

impl ServerConfig {
    /// Validates raw CLI input into a `ServerConfig`.
    ///
    /// `threads` and `queue_size` are taken as `i64` so that non-positive
    /// (including negative) input can be reported with the offending value,
    /// matching the original's `#threads must be positive` / `queue size must
    /// be positive` messages.
    pub fn new(port: u16, threads: i64, queue_size: i64, policy: &str) -> Result<Self, ConfigError> {
        if threads <= 0 {
            return Err(ConfigError::NonPositiveThreads(threads));
        }
        if queue_size <= 0 {
            return Err(ConfigError::NonPositiveQueueSize(queue_size));
        }
        let policy = policy.parse()?;
        Ok(Self {
            port,
            threads: threads as usize,
            queue_size: queue_size as usize,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_parses_each_policy_token() {
        for token in ["block", "dt", "dh", "bf", "random"] {
            let cfg = ServerConfig::new(8080, 4, 16, token).expect("valid config");
            assert_eq!(cfg.port, 8080);
            assert_eq!(cfg.threads, 4);
            assert_eq!(cfg.queue_size, 16);
        }
    }

    #[test]
    fn zero_threads_rejected() {
        let err = ServerConfig::new(8080, 0, 16, "block").unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveThreads(0)));
    }

    #[test]
    fn negative_threads_rejected() {
        let err = ServerConfig::new(8080, -3, 16, "block").unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveThreads(-3)));
    }

    #[test]
    fn zero_queue_size_rejected() {
        let err = ServerConfig::new(8080, 4, 0, "block").unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveQueueSize(0)));
    }

    #[test]
    fn unknown_policy_rejected() {
        let err = ServerConfig::new(8080, 4, 16, "yolo").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy(ref s) if s == "yolo"));
    }

    #[test]
    fn policy_tokens_are_case_sensitive() {
        assert!("BLOCK".parse::<OverloadPolicy>().is_err());
    }
}
