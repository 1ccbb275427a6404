//! # Global runtime configuration.
//!
//! [`Config`] defines the commander's behavior: job queue capacity and the
//! shutdown grace period.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use commandeer::Config;
//!
//! let mut cfg = Config::default();
//! cfg.queue_capacity = 64;
//! cfg.grace = Duration::from_secs(10);
//!
//! assert_eq!(cfg.queue_capacity, 64);
//! ```

use std::time::Duration;

/// Global configuration for a [`Commander`](crate::Commander).
///
/// Controls the job queue bound and how long shutdown waits for running
/// bodies to finish.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the job queue (0 = unbounded).
    ///
    /// With a bounded queue, `put_job` suspends while the queue is full.
    pub queue_capacity: usize,
    /// Maximum time shutdown waits for running bodies before giving up
    /// and reporting them stuck.
    pub grace: Duration,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `queue_capacity = 0` (unbounded)
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            grace: Duration::from_secs(30),
        }
    }
}
