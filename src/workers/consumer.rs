//! # Consumer: threshold-triggered batching worker over one owned queue.
//!
//! A [`Consumer`] owns a [`ReadyQueue`], buffers what arrives, and hands
//! batches to user [`Consume::work`] when a trigger fires.
//!
//! ## Diagram
//! ```text
//!  Consumer handle                        execution context
//!  ───────────────                        ─────────────────────────────
//!  start_new ───set_ready, spawn────────▶ on_start
//!  set_stopped ─────────(state flag)────▶ loop: get_timeout ─▶ buffer
//!  set_stop_at_queue_end (state flag)───▶ │     trigger? ─▶ work(batch)
//!  on_result_ready ◀──(result channel)───┘         └─ send result
//!                                         set_not_ready (drains)
//!                                         on_stop
//! ```
//!
//! ## Rules
//! - A batch flushes when any trigger holds: buffer length ≥
//!   `max_buffer_size`, the batch is older than `work_timeout`, or a drain
//!   was requested via `set_stop_at_queue_end`.
//! - Triggers are evaluated only when an item arrives. An idle consumer just
//!   cycles its bounded dequeue, which is how it notices `set_stopped`.
//! - `set_stop_at_queue_end` flushes exactly one final batch and the loop
//!   then stops itself; `set_stopped` stops now and discards any partial
//!   buffer.
//! - The closing drain (`set_not_ready`) runs on every exit path, so a
//!   retired consumer leaves an empty, closed queue behind.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;

use crate::channel::{message_pair, MessagePort};
use crate::config::ConsumerConfig;
use crate::error::{SendError, WorkerError};
use crate::queue::ReadyQueue;
use crate::state::{LifecycleState, StateCell};
use crate::workers::worker::{spawn_listeners, Worker, WorkerCore, WorkerRun};

/// # Work contract of a consumer.
///
/// `work` receives whole batches in arrival order. Run-scoped state goes in
/// [`Context`](Consume::Context), created by `on_start` and handed back to
/// `on_stop`.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use prodcon::{Consume, MessagePort, StateCell, Worker};
///
/// struct Averager;
///
/// impl Worker for Averager {
///     type Output = f64;
///     type Message = ();
/// }
///
/// #[async_trait]
/// impl Consume for Averager {
///     type Item = f64;
///     type Context = ();
///
///     async fn work(
///         &self,
///         batch: Vec<f64>,
///         _cx: &mut (),
///         _state: &StateCell,
///         _port: &mut MessagePort<()>,
///     ) -> f64 {
///         batch.iter().sum::<f64>() / batch.len() as f64
///     }
/// }
/// ```
#[async_trait]
pub trait Consume: Worker {
    /// Payload type of the owned queue.
    type Item: Send + 'static;

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

    /// Handles one batch of buffered items and returns the batch result.
    /// The batch is never empty.
    async fn work(
        &self,
        batch: Vec<Self::Item>,
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

/// Supervisor handle for a consumer worker.
///
/// The owned queue is created at construction from the config's capacity and
/// lossiness, and lives across runs; producers keep their clones of it
/// through restarts. Dropping the handle signals the context to stop.
pub struct Consumer<C: Consume> {
    imp: Arc<C>,
    core: WorkerCore<C::Message>,
    config: ConsumerConfig,
    queue: ReadyQueue<C::Item>,
}

impl<C: Consume> Consumer<C> {
    /// Creates a handle around a worker implementation. No run starts and
    /// the queue stays closed until [`start_new`](Consumer::start_new).
    pub fn new(imp: C, config: ConsumerConfig) -> Self {
        let queue = ReadyQueue::with_options(config.lossy_queue, config.queue_capacity);
        Self {
            imp: Arc::new(imp),
            core: WorkerCore::new(),
            config,
            queue,
        }
    }

    /// Clones the handle to the owned queue, for wiring into producer
    /// subscriber sets or external [`enqueue`](crate::enqueue) calls.
    pub fn work_queue(&self) -> ReadyQueue<C::Item> {
        self.queue.clone()
    }

    /// Requests a graceful drain: the loop flushes one final batch on the
    /// next arrival and then stops itself. Use
    /// [`set_stopped`](Consumer::set_stopped) to stop an idle consumer.
    pub fn set_stop_at_queue_end(&self) {
        self.core.state().set_stop_at_queue_end();
    }

    /// Starts a fresh run: any live run is stopped and fully joined first
    /// (its exit drains and closes the queue), then the queue reopens and
    /// the work loop plus its two listeners are spawned.
    pub async fn start_new(&mut self) -> Result<(), WorkerError> {
        self.core.retire().await;
        // reopen the intake only after the prior run's closing drain
        self.queue.set_ready();

        let (port, peer) = message_pair::<C::Message>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<C::Output>();

        self.core.state().set_started();
        let context = tokio::spawn(consume_loop(
            Arc::clone(&self.imp),
            Arc::clone(self.core.state()),
            self.queue.clone(),
            self.config.clone(),
            result_tx,
            port,
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
    pub fn send_message(&self, message: C::Message) -> Result<(), SendError<C::Message>> {
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

    /// Borrows the worker implementation, e.g. to read state its callbacks
    /// collected.
    pub fn worker(&self) -> &C {
        &self.imp
    }
}

async fn consume_loop<C: Consume>(
    imp: Arc<C>,
    state: Arc<StateCell>,
    queue: ReadyQueue<C::Item>,
    config: ConsumerConfig,
    results: mpsc::UnboundedSender<C::Output>,
    mut port: MessagePort<C::Message>,
) {
    let max_buffer = config.max_buffer_clamped();

    let mut cx = imp.on_start(&state, &mut port).await;
    let mut buffer: Vec<C::Item> = Vec::new();

    let mut last_worked = Instant::now();
    while state.get() != LifecycleState::Stopped {
        match queue.get_timeout(config.work_timeout).await {
            Ok(item) => buffer.push(item),
            Err(_) => {
                // nothing arrived; loop around so a stop request gets seen
                task::yield_now().await;
                continue;
            }
        }

        let flush = buffer.len() >= max_buffer
            || last_worked.elapsed() >= config.work_timeout
            || state.get() == LifecycleState::StopAtQueueEnd;
        if !flush {
            continue;
        }

        last_worked = Instant::now();
        let batch = mem::take(&mut buffer);
        let result = imp.work(batch, &mut cx, &state, &mut port).await;
        if results.send(result).is_err() && state.get() != LifecycleState::Stopped {
            eprintln!(
                "[prodcon] consumer '{}' result listener is gone",
                imp.name()
            );
        }

        if state.get() == LifecycleState::StopAtQueueEnd {
            state.set_stopped();
            break;
        }
    }

    drop(results);
    queue.set_not_ready();
    imp.on_stop(cx, &state, &mut port).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time;

    use crate::config::ProducerConfig;
    use crate::queue::enqueue;
    use crate::workers::producer::{Produce, Producer};

    struct Batcher {
        batches: Mutex<Vec<Vec<u64>>>,
        works: AtomicUsize,
        stops: AtomicUsize,
    }

    impl Batcher {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                works: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Worker for Batcher {
        type Output = Vec<u64>;
        type Message = ();

        fn name(&self) -> &str {
            "batcher"
        }

        async fn on_result_ready(&self, batch: Vec<u64>) {
            self.batches.lock().unwrap().push(batch);
        }
    }

    #[async_trait]
    impl Consume for Batcher {
        type Item = u64;
        type Context = ();

        async fn work(
            &self,
            batch: Vec<u64>,
            _: &mut (),
            _: &StateCell,
            _: &mut MessagePort<()>,
        ) -> Vec<u64> {
            self.works.fetch_add(1, Ordering::SeqCst);
            batch
        }

        async fn on_stop(&self, _: (), _: &StateCell, _: &mut MessagePort<()>) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Feed;

    impl Worker for Feed {
        type Output = u64;
        type Message = ();
    }

    #[async_trait]
    impl Produce for Feed {
        type Context = u64;

        async fn work(&self, next: &mut u64, _: &StateCell, _: &mut MessagePort<()>) -> u64 {
            let current = *next;
            *next += 1;
            current
        }
    }

    async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_size_threshold_yields_exact_batches() {
        let mut consumer = Consumer::new(
            Batcher::new(),
            ConsumerConfig {
                max_buffer_size: 5,
                work_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );
        consumer.start_new().await.unwrap();

        let mut producer = Producer::new(
            Feed,
            ProducerConfig {
                work_timeout: Duration::from_millis(10),
            },
        )
        .with_subscribers(vec![consumer.work_queue()]);
        producer.start_new().await.unwrap();

        time::sleep(Duration::from_millis(400)).await;
        producer.shutdown().await;
        time::timeout(Duration::from_secs(10), consumer.shutdown())
            .await
            .expect("consumer must observe the stop within its dequeue timeout");

        let batches = consumer.worker().batches.lock().unwrap().clone();
        assert!(!batches.is_empty());
        assert_eq!(consumer.worker().works.load(Ordering::SeqCst), batches.len());

        let mut expected_next = 0u64;
        for batch in &batches {
            assert_eq!(batch.len(), 5, "only the size trigger may fire here");
            for &value in batch {
                assert_eq!(value, expected_next, "batches are consecutive and ordered");
                expected_next += 1;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_at_queue_end_flushes_exactly_once() {
        let mut consumer = Consumer::new(
            Batcher::new(),
            ConsumerConfig {
                max_buffer_size: 100,
                work_timeout: Duration::from_secs(60),
                ..Default::default()
            },
        );
        consumer.start_new().await.unwrap();
        let queue = consumer.work_queue();

        for i in 0..3 {
            enqueue(&queue, i).await;
        }
        wait_for("items to move into the batch buffer", || queue.empty()).await;
        assert_eq!(consumer.worker().works.load(Ordering::SeqCst), 0);

        consumer.set_stop_at_queue_end();
        enqueue(&queue, 3).await; // wakes the blocked dequeue

        time::timeout(Duration::from_secs(5), consumer.join())
            .await
            .expect("the drain must end the run on its own");

        assert_eq!(consumer.get_state(), LifecycleState::Stopped);
        assert!(!consumer.is_running());
        assert_eq!(
            *consumer.worker().batches.lock().unwrap(),
            vec![vec![0, 1, 2, 3]],
            "one final work call flushes everything buffered"
        );
        assert_eq!(consumer.worker().works.load(Ordering::SeqCst), 1);
        assert_eq!(consumer.worker().stops.load(Ordering::SeqCst), 1);
        assert!(!queue.is_ready(), "the closing drain marks the queue not ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_set_stopped_discards_partial_buffer() {
        let mut consumer = Consumer::new(
            Batcher::new(),
            ConsumerConfig {
                max_buffer_size: 100,
                work_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        consumer.start_new().await.unwrap();
        let queue = consumer.work_queue();

        enqueue(&queue, 1).await;
        enqueue(&queue, 2).await;
        wait_for("items to move into the batch buffer", || queue.empty()).await;

        consumer.set_stopped();
        time::timeout(Duration::from_secs(5), consumer.join())
            .await
            .expect("join must return within one dequeue timeout");

        assert!(
            consumer.worker().batches.lock().unwrap().is_empty(),
            "immediate stop discards the partial buffer"
        );
        assert_eq!(consumer.worker().works.load(Ordering::SeqCst), 0);
        assert_eq!(consumer.worker().stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_age_triggers_on_next_arrival() {
        let mut consumer = Consumer::new(
            Batcher::new(),
            ConsumerConfig {
                max_buffer_size: 2,
                work_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        consumer.start_new().await.unwrap();
        let queue = consumer.work_queue();

        // first two items flush via the size trigger and reset the batch age
        enqueue(&queue, 10).await;
        enqueue(&queue, 11).await;
        wait_for("the size-triggered batch", || {
            consumer.worker().works.load(Ordering::SeqCst) >= 1
        })
        .await;

        // the third arrives long after work_timeout, so it flushes alone
        time::sleep(Duration::from_millis(1500)).await;
        enqueue(&queue, 12).await;
        wait_for("the age-triggered batch", || {
            consumer.worker().works.load(Ordering::SeqCst) >= 2
        })
        .await;

        consumer.shutdown().await;
        assert_eq!(
            *consumer.worker().batches.lock().unwrap(),
            vec![vec![10, 11], vec![12]]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_reopens_the_queue() {
        let mut consumer = Consumer::new(
            Batcher::new(),
            ConsumerConfig {
                max_buffer_size: 1,
                work_timeout: Duration::from_millis(50),
                lossy_queue: true,
                queue_capacity: 2,
            },
        );
        let queue = consumer.work_queue();
        assert!(queue.is_lossy());
        assert_eq!(queue.capacity(), 2);
        assert!(!queue.is_ready(), "the intake opens at start_new");

        consumer.start_new().await.unwrap();
        assert!(queue.is_ready());
        enqueue(&queue, 7).await;
        wait_for("the first run's batch", || {
            consumer.worker().works.load(Ordering::SeqCst) >= 1
        })
        .await;

        consumer.shutdown().await;
        assert!(!queue.is_ready());

        consumer.start_new().await.unwrap();
        assert!(queue.is_ready(), "a restart must reopen the intake");
        enqueue(&queue, 8).await;
        wait_for("the second run's batch", || {
            consumer.worker().works.load(Ordering::SeqCst) >= 2
        })
        .await;

        consumer.shutdown().await;
        assert_eq!(
            *consumer.worker().batches.lock().unwrap(),
            vec![vec![7], vec![8]]
        );
    }
}
