//! # Producer: continuous-poll worker fanning results out to subscribers.
//!
//! A [`Producer`] runs user [`Produce::work`] on a fixed cadence and pushes
//! each result two ways: best-effort into every subscriber [`ReadyQueue`],
//! and unconditionally onto the result channel.
//!
//! ## Diagram
//! ```text
//!  Producer handle                      execution context
//!  ───────────────                      ──────────────────────────────
//!  start_new ──────spawn──────────────▶ on_start
//!  set_stopped ────(state flag)───────▶ loop: work
//!  send_message ───(message channel)──▶ │     ├─ offer ─▶ subscriber queues
//!  on_result_ready ◀─(result channel)──┘     └─ send ──▶ result channel
//!                                       │     pause to hold the cadence
//!                                       on_stop
//! ```
//!
//! ## Rules
//! - Delivery to subscribers is at most once per queue and never blocks:
//!   a full or not-ready queue costs that subscriber the result, counted in
//!   [`Producer::subscriber_drops`] and on the queue itself.
//! - The result channel always gets the result, whatever the subscribers do.
//! - Only the state flag ends the loop; a dead subscriber never does.
//! - The subscriber set is frozen while a run is live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{self, Instant};

use crate::channel::{message_pair, MessagePort};
use crate::config::ProducerConfig;
use crate::error::{SendError, WorkerError};
use crate::queue::ReadyQueue;
use crate::state::{LifecycleState, StateCell};
use crate::workers::worker::{spawn_listeners, Worker, WorkerCore, WorkerRun};

/// Shaved off the cadence sleep so the next due-check lands on time rather
/// than a hair late.
const CADENCE_EPSILON: Duration = Duration::from_micros(1);

/// # Work contract of a producer.
///
/// `work` is called once per cadence interval and returns one result; the
/// result type must be `Clone` so it can fan out to several queues. State
/// that lives for the whole run goes in [`Context`](Produce::Context),
/// created by `on_start` and handed back to `on_stop`.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use prodcon::{MessagePort, Produce, StateCell, Worker};
///
/// struct Ticker;
///
/// impl Worker for Ticker {
///     type Output = u64;
///     type Message = ();
/// }
///
/// #[async_trait]
/// impl Produce for Ticker {
///     type Context = u64;
///
///     async fn work(
///         &self,
///         count: &mut u64,
///         _state: &StateCell,
///         _port: &mut MessagePort<()>,
///     ) -> u64 {
///         let current = *count;
///         *count += 1;
///         current
///     }
/// }
/// ```
#[async_trait]
pub trait Produce: Worker<Output: Clone> {
    /// Run-scoped state threaded through every `work` call.
    type Context: Send + Default + 'static;

    /// Called once when the run begins. The default builds a default
    /// context.
    async fn on_start(
        &self,
        state: &StateCell,
        port: &mut MessagePort<Self::Message>,
    ) -> Self::Context {
        let _ = (state, port);
        Self::Context::default()
    }

    /// Produces one result. Call `state.set_stopped()` to end the run from
    /// inside; poll `port.try_recv()` to react to supervisor messages.
    async fn work(
        &self,
        cx: &mut Self::Context,
        state: &StateCell,
        port: &mut MessagePort<Self::Message>,
    ) -> Self::Output;

    /// Called once after the loop exits, consuming the context.
    async fn on_stop(
        &self,
        cx: Self::Context,
        state: &StateCell,
        port: &mut MessagePort<Self::Message>,
    ) {
        let _ = (cx, state, port);
    }
}

/// Supervisor handle for a producer worker.
///
/// Owns the subscriber set and the lifecycle of the producing execution
/// context. Dropping the handle signals the context to stop.
pub struct Producer<P: Produce> {
    imp: Arc<P>,
    core: WorkerCore<P::Message>,
    config: ProducerConfig,
    subscribers: Vec<ReadyQueue<P::Output>>,
    fanout_drops: Arc<AtomicU64>,
}

impl<P: Produce> Producer<P> {
    /// Creates a handle around a worker implementation. No run starts until
    /// [`start_new`](Producer::start_new).
    pub fn new(imp: P, config: ProducerConfig) -> Self {
        Self {
            imp: Arc::new(imp),
            core: WorkerCore::new(),
            config,
            subscribers: Vec::new(),
            fanout_drops: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Construction-time form of [`set_subscribers`](Producer::set_subscribers).
    pub fn with_subscribers(mut self, subscribers: Vec<ReadyQueue<P::Output>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the subscriber set. Fails while a run is live; the live
    /// loop works off the snapshot it took at spawn time.
    pub fn set_subscribers(
        &mut self,
        subscribers: Vec<ReadyQueue<P::Output>>,
    ) -> Result<(), WorkerError> {
        if self.is_running() {
            return Err(WorkerError::SubscribersLocked);
        }
        self.subscribers = subscribers;
        Ok(())
    }

    /// Starts a fresh run: any live run is stopped and fully joined first,
    /// then new channels are built and the work loop plus its two listeners
    /// are spawned.
    ///
    /// Fails with [`WorkerError::NoSubscribers`] if the subscriber set is
    /// empty; a producer with nowhere to publish is a wiring mistake worth
    /// failing loudly at the call site.
    pub async fn start_new(&mut self) -> Result<(), WorkerError> {
        if self.subscribers.is_empty() {
            return Err(WorkerError::NoSubscribers);
        }
        self.core.retire().await;

        let (port, peer) = message_pair::<P::Message>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<P::Output>();

        self.core.state().set_started();
        let context = tokio::spawn(produce_loop(
            Arc::clone(&self.imp),
            Arc::clone(self.core.state()),
            self.subscribers.clone(),
            self.config.clone(),
            result_tx,
            port,
            Arc::clone(&self.fanout_drops),
        ));
        let (result_listener, message_listener) =
            spawn_listeners(&self.imp, self.core.state(), result_rx, peer.from_context);

        self.core.install(WorkerRun::new(
            context,
            result_listener,
            message_listener,
            peer.to_context,
        ));
        Ok(())
    }

    /// Current lifecycle state.
    pub fn get_state(&self) -> LifecycleState {
        self.core.get_state()
    }

    /// Shared handle to the state flag, e.g. for test probes or external
    /// stop buttons.
    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(self.core.state())
    }

    /// Requests an immediate stop. Idempotent; returns without waiting.
    pub fn set_stopped(&self) {
        self.core.set_stopped();
    }

    /// True while the execution context of the current run is alive.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Delivers a message to the execution context; it surfaces on the
    /// context's `port.recv`/`try_recv`. The message comes back in the
    /// error when no run can receive it.
    pub fn send_message(&self, message: P::Message) -> Result<(), SendError<P::Message>> {
        self.core.send_message(message)
    }

    /// Awaits the current run's full exit: execution context and both
    /// listeners. Does not request a stop by itself.
    pub async fn join(&mut self) {
        self.core.join().await;
    }

    /// `set_stopped` plus `join`. Call this from teardown paths so no
    /// execution context outlives the application.
    pub async fn shutdown(&mut self) {
        self.core.shutdown().await;
    }

    /// Results dropped by this producer's fan-out across all subscribers
    /// since the handle was built.
    pub fn subscriber_drops(&self) -> u64 {
        self.fanout_drops.load(Ordering::Relaxed)
    }

    /// Borrows the worker implementation, e.g. to read state its callbacks
    /// collected.
    pub fn worker(&self) -> &P {
        &self.imp
    }
}

async fn produce_loop<P: Produce>(
    imp: Arc<P>,
    state: Arc<StateCell>,
    subscribers: Vec<ReadyQueue<P::Output>>,
    config: ProducerConfig,
    results: mpsc::UnboundedSender<P::Output>,
    mut port: MessagePort<P::Message>,
    drops: Arc<AtomicU64>,
) {
    let mut cx = imp.on_start(&state, &mut port).await;

    let mut last_worked = Instant::now();
    while state.get() != LifecycleState::Stopped {
        if last_worked.elapsed() >= config.work_timeout {
            last_worked = Instant::now();
            let result = imp.work(&mut cx, &state, &mut port).await;

            for queue in &subscribers {
                if !queue.offer(result.clone()) {
                    drops.fetch_add(1, Ordering::Relaxed);
                }
            }
            if results.send(result).is_err() && state.get() != LifecycleState::Stopped {
                eprintln!(
                    "[prodcon] producer '{}' result listener is gone",
                    imp.name()
                );
            }
        }

        // hold the cadence without drifting: sleep whatever remains of the
        // interval, and just yield when nothing does
        let pause = config
            .work_timeout
            .saturating_sub(last_worked.elapsed())
            .saturating_sub(CADENCE_EPSILON);
        if pause.is_zero() {
            task::yield_now().await;
        } else {
            time::sleep(pause).await;
        }
    }

    drop(results);
    imp.on_stop(cx, &state, &mut port).await;
}
