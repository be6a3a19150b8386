//! # prodcon
//!
//! **Prodcon** is a producer/consumer pipeline library for Rust.
//!
//! It provides primitives to run user-supplied work functions inside
//! supervised execution contexts, wired together through gated and
//! optionally-lossy work queues. The crate is designed as a building
//! block for polling pipelines such as instrument acquisition, batch
//! aggregation, and periodic export.
//!
//! ## Architecture
//! ### Overview
//! ```text
//! ┌───────────────────────────────┐      ┌───────────────────────────────┐
//! │  Producer (handle)            │      │  Consumer (handle)            │
//! │  - StateCell (shared flag)    │      │  - StateCell (shared flag)    │
//! │  - subscriber ReadyQueues     │      │  - work ReadyQueue            │
//! │  - result + message channels  │      │  - result + message channels  │
//! └──────┬────────────────────────┘      └──────┬────────────────────────┘
//!        ▼ spawns per run                       ▼ spawns per run
//! ┌───────────────────────────────┐      ┌───────────────────────────────┐
//! │  produce loop                 │      │  consume loop                 │
//! │  work ──► offer to each queue─┼──────┼─► get_timeout ──► buffer      │
//! │       └─► send result         │      │   trigger? ──► work(batch)    │
//! │  pause one cadence            │      │            └─► send result    │
//! └───────────────────────────────┘      └───────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! start_new:
//!   retire previous run (set_stopped + join)
//!     ──► fresh result + message channels
//!       ──► state = Started
//!         ──► spawn work loop + result/message listeners
//!
//! stop paths:
//!   set_stopped              observed within one work_timeout;
//!                            a consumer drops its partial buffer
//!   set_stop_at_queue_end    consumer flushes one final batch, then stops
//!   drop of the handle       signals set_stopped so no context is stranded
//! ```
//!
//! ## Features
//!
//! | Area              | Description                                            | Key types / traits |
//! |-------------------|--------------------------------------------------------|--------------------|
//! | **Worker roles**  | Continuous-poll producers, threshold-batching consumers | [`Produce`], [`Consume`], [`Producer`], [`Consumer`] |
//! | **Work queues**   | Gated, bounded, optionally-lossy fan-out buffers        | [`ReadyQueue`], [`enqueue`] |
//! | **Lifecycle**     | Tri-state flag shared by handle and execution context   | [`LifecycleState`], [`StateCell`] |
//! | **Channels**      | Per-run result + message channels with callbacks        | [`Worker`], [`MessagePort`] |
//! | **Configuration** | Work cadence, batch thresholds, queue shape             | [`ProducerConfig`], [`ConsumerConfig`] |
//! | **Errors**        | Typed failures that hand the payload back               | [`WorkerError`], [`PutError`], [`GetError`], [`SendError`] |
//!
//! ## Example
//! ```no_run
//! use async_trait::async_trait;
//! use std::time::Duration;
//! use prodcon::{
//!     Consume, Consumer, ConsumerConfig, MessagePort, Produce, Producer,
//!     ProducerConfig, StateCell, Worker,
//! };
//!
//! /// Emits an increasing counter every 5ms.
//! struct Sampler;
//!
//! impl Worker for Sampler {
//!     type Output = u64;
//!     type Message = ();
//! }
//!
//! #[async_trait]
//! impl Produce for Sampler {
//!     type Context = u64;
//!
//!     async fn work(&self, n: &mut u64, _: &StateCell, _: &mut MessagePort<()>) -> u64 {
//!         *n += 1;
//!         *n
//!     }
//! }
//!
//! /// Sums batches of ten samples.
//! struct Summer;
//!
//! #[async_trait]
//! impl Worker for Summer {
//!     type Output = u64;
//!     type Message = ();
//!
//!     async fn on_result_ready(&self, sum: u64) {
//!         println!("batch sum: {sum}");
//!     }
//! }
//!
//! #[async_trait]
//! impl Consume for Summer {
//!     type Item = u64;
//!     type Context = ();
//!
//!     async fn work(
//!         &self,
//!         batch: Vec<u64>,
//!         _: &mut (),
//!         _: &StateCell,
//!         _: &mut MessagePort<()>,
//!     ) -> u64 {
//!         batch.iter().sum()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut consumer = Consumer::new(
//!         Summer,
//!         ConsumerConfig {
//!             max_buffer_size: 10,
//!             ..ConsumerConfig::default()
//!         },
//!     );
//!     consumer.start_new().await.unwrap();
//!
//!     let mut producer = Producer::new(
//!         Sampler,
//!         ProducerConfig {
//!             work_timeout: Duration::from_millis(5),
//!         },
//!     )
//!     .with_subscribers(vec![consumer.work_queue()]);
//!     producer.start_new().await.unwrap();
//!
//!     tokio::time::sleep(Duration::from_millis(200)).await;
//!     producer.shutdown().await;
//!     consumer.shutdown().await;
//! }
//! ```

mod channel;
mod config;
mod error;
mod queue;
mod state;
mod workers;

// ---- Public re-exports ----

pub use channel::MessagePort;
pub use config::{ConsumerConfig, ProducerConfig};
pub use error::{GetError, PutError, SendError, WorkerError};
pub use queue::{enqueue, ReadyQueue};
pub use state::{LifecycleState, StateCell};
pub use workers::{Consume, Consumer, Produce, Producer, Worker};
