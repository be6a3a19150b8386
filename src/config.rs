//! # Worker configuration.
//!
//! Provides [`ProducerConfig`] and [`ConsumerConfig`], the construction-time
//! settings for the two worker roles. Both are plain structs with public
//! fields; build them with struct-update syntax over `Default`.
//!
//! ## Sentinel values
//! - Producer `work_timeout = 0s` → run `work` as fast as possible (the loop
//!   still yields between iterations).
//! - Consumer `queue_capacity = 0` → unbounded work queue.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use prodcon::{ConsumerConfig, ProducerConfig};
//!
//! let prod = ProducerConfig {
//!     work_timeout: Duration::from_millis(10),
//! };
//! let cons = ConsumerConfig {
//!     max_buffer_size: 5,
//!     work_timeout: Duration::from_secs(2),
//!     ..Default::default()
//! };
//! assert!(!cons.lossy_queue);
//! assert_eq!(prod.work_timeout, Duration::from_millis(10));
//! ```

use std::time::Duration;

/// Configuration for a [`Producer`](crate::Producer).
///
/// ## Field semantics
/// - `work_timeout`: target cadence between `work` calls (`0s` = as fast as
///   possible)
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Target time between consecutive `work` invocations.
    ///
    /// The loop compensates for the duration of `work` itself: with a cadence
    /// of 10ms and a `work` that takes 3ms, the loop sleeps roughly 7ms.
    /// `Duration::ZERO` removes the pause entirely.
    pub work_timeout: Duration,
}

impl Default for ProducerConfig {
    /// Default configuration:
    ///
    /// - `work_timeout = 0s` (as fast as possible)
    fn default() -> Self {
        Self {
            work_timeout: Duration::ZERO,
        }
    }
}

/// Configuration for a [`Consumer`](crate::Consumer).
///
/// ## Field semantics
/// - `work_timeout`: doubles as the dequeue timeout and the batch-age
///   threshold
/// - `max_buffer_size`: batch-size threshold (min 1; clamped by the loop)
/// - `lossy_queue`: whether the owned queue evicts its oldest item when full
/// - `queue_capacity`: owned queue capacity (`0` = unbounded)
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Time budget used twice per iteration: both the per-item dequeue
    /// timeout and the "batch is old enough" trigger threshold.
    ///
    /// A small value makes an idle consumer observe `set_stopped` quickly;
    /// a large value batches longer.
    pub work_timeout: Duration,

    /// Number of buffered items that triggers a `work` call.
    ///
    /// Values below 1 are treated as 1.
    pub max_buffer_size: usize,

    /// When `true`, the owned queue never rejects a put at capacity: the
    /// oldest item is evicted first and counted as dropped.
    pub lossy_queue: bool,

    /// Capacity of the owned queue.
    ///
    /// - `0` = unbounded
    /// - `n > 0` = at most `n` items buffered between producer and consumer
    pub queue_capacity: usize,
}

impl ConsumerConfig {
    /// Returns the batch-size threshold clamped to a minimum of 1.
    ///
    /// The work loop uses this value so a zero threshold cannot produce
    /// empty batches.
    #[inline]
    pub fn max_buffer_clamped(&self) -> usize {
        self.max_buffer_size.max(1)
    }
}

impl Default for ConsumerConfig {
    /// Default configuration:
    ///
    /// - `work_timeout = 5s`
    /// - `max_buffer_size = 1` (hand every item over as its own batch)
    /// - `lossy_queue = false`
    /// - `queue_capacity = 0` (unbounded)
    fn default() -> Self {
        Self {
            work_timeout: Duration::from_secs(5),
            max_buffer_size: 1,
            lossy_queue: false,
            queue_capacity: 0,
        }
    }
}
