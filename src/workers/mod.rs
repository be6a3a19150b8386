//! # Worker roles and their lifecycle controllers.
//!
//! This module provides the core worker-related types:
//! - [`Worker`] - base trait naming a worker and receiving its run's output
//! - [`Produce`] / [`Producer`] - continuous-poll work loop fanning results out to queues
//! - [`Consume`] / [`Consumer`] - batching work loop fed from a [`ReadyQueue`](crate::ReadyQueue)
//!
//! ## Architecture
//! ```text
//! Handle (owned by the caller)          Execution context (spawned per run)
//!   Producer / Consumer                   work loop + 2 listener tasks
//!        │                                        │
//!        ├── StateCell ◄──── polled every pass ───┤
//!        ├── message channel ◄─── two-way ────────┤
//!        └── result channel ◄──── one per work ───┘
//! ```
//!
//! A handle outlives its runs: [`Producer::start_new`] / [`Consumer::start_new`]
//! retire the previous execution context (stop + join) before spawning a fresh
//! one with fresh channels, so two generations never overlap.

mod consumer;
mod producer;
mod worker;

pub use consumer::{Consume, Consumer};
pub use producer::{Produce, Producer};
pub use worker::Worker;
