//! # Worker: supervisor-side callbacks and per-run plumbing.
//!
//! [`Worker`] is the trait both roles share: it names the result and message
//! payload types and carries the two supervisor-side callbacks. The rest of
//! this module is the machinery behind a handle:
//!
//! ```text
//!  handle (Producer / Consumer)
//!    ├─ WorkerCore ── Arc<StateCell> ──────────────┐
//!    │      └─ WorkerRun (one generation)          │ shared flag
//!    │            ├─ context JoinHandle ───────────▶ work loop
//!    │            ├─ result listener ◀── result channel
//!    │            ├─ message listener ◀── message channel
//!    │            └─ sender behind send_message
//! ```
//!
//! ## Rules
//! - At most one run per handle; a new run is installed only after the
//!   previous one fully exited (`retire`).
//! - Listener tasks exit when their channel closes. That is the normal end
//!   of a run; it is only worth a warning when the state says the run should
//!   still be live.
//! - Callback panics are caught and logged; they never take the listener
//!   down (a panicking `on_result_ready` must not lose later results).

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SendError;
use crate::state::{LifecycleState, StateCell};

/// # Shared contract of producer and consumer workers.
///
/// Names the payload types and provides the two supervisor-side callbacks,
/// both no-ops by default. The callbacks run on dedicated listener tasks,
/// concurrently with the execution context, so they may be slow without
/// stalling the work loop.
///
/// # Example
/// ```
/// use prodcon::Worker;
///
/// struct Sensor;
///
/// impl Worker for Sensor {
///     type Output = f64;
///     type Message = String;
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// What one `work` call produces.
    type Output: Send + 'static;

    /// Payload carried on the message channel, both directions.
    type Message: Send + 'static;

    /// Stable name used in warnings.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called on the supervisor side for every result the work loop emits.
    async fn on_result_ready(&self, result: Self::Output) {
        let _ = result;
    }

    /// Called on the supervisor side for every message the execution context
    /// sends through its port.
    async fn on_message_ready(&self, message: Self::Message) {
        let _ = message;
    }
}

/// One generation of a worker: the execution context, its two listeners,
/// and the sender behind `send_message`.
pub(crate) struct WorkerRun<M> {
    context: JoinHandle<()>,
    result_listener: JoinHandle<()>,
    message_listener: JoinHandle<()>,
    to_context: mpsc::UnboundedSender<M>,
}

impl<M> WorkerRun<M> {
    pub(crate) fn new(
        context: JoinHandle<()>,
        result_listener: JoinHandle<()>,
        message_listener: JoinHandle<()>,
        to_context: mpsc::UnboundedSender<M>,
    ) -> Self {
        Self {
            context,
            result_listener,
            message_listener,
            to_context,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.context.is_finished()
    }

    pub(crate) fn send(&self, message: M) -> Result<(), SendError<M>> {
        self.to_context.send(message).map_err(|e| SendError(e.0))
    }

    /// Awaits the context and both listeners. The context exiting drops the
    /// channel senders, which is what lets the listeners drain and finish.
    pub(crate) async fn join(self) {
        let _ = self.context.await;
        let _ = self.result_listener.await;
        let _ = self.message_listener.await;
    }
}

/// State and run bookkeeping shared by both handle types.
pub(crate) struct WorkerCore<M> {
    state: Arc<StateCell>,
    run: Option<WorkerRun<M>>,
}

impl<M> WorkerCore<M> {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            run: None,
        }
    }

    pub(crate) fn state(&self) -> &Arc<StateCell> {
        &self.state
    }

    pub(crate) fn get_state(&self) -> LifecycleState {
        self.state.get()
    }

    pub(crate) fn set_stopped(&self) {
        self.state.set_stopped();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(WorkerRun::is_alive)
    }

    pub(crate) fn send_message(&self, message: M) -> Result<(), SendError<M>> {
        match &self.run {
            Some(run) => run.send(message),
            None => Err(SendError(message)),
        }
    }

    /// Stops and fully joins the live run, if any. Callers set up the next
    /// generation only after this returns.
    pub(crate) async fn retire(&mut self) {
        if let Some(run) = self.run.take() {
            self.state.set_stopped();
            run.join().await;
        }
    }

    pub(crate) async fn join(&mut self) {
        if let Some(run) = self.run.take() {
            run.join().await;
        }
    }

    pub(crate) async fn shutdown(&mut self) {
        self.state.set_stopped();
        self.join().await;
    }

    pub(crate) fn install(&mut self, run: WorkerRun<M>) {
        self.run = Some(run);
    }
}

impl<M> Drop for WorkerCore<M> {
    fn drop(&mut self) {
        // a dropped handle must not strand its execution context
        self.state.set_stopped();
    }
}

/// Spawns the two listener tasks for one run: each drains its channel into
/// the matching callback until the channel closes.
pub(crate) fn spawn_listeners<W: Worker>(
    imp: &Arc<W>,
    state: &Arc<StateCell>,
    results: mpsc::UnboundedReceiver<W::Output>,
    messages: mpsc::UnboundedReceiver<W::Message>,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let result_listener = tokio::spawn({
        let imp = Arc::clone(imp);
        let state = Arc::clone(state);
        let mut rx = results;
        async move {
            while let Some(result) = rx.recv().await {
                let fut = imp.on_result_ready(result);
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    eprintln!(
                        "[prodcon] worker '{}' on_result_ready panicked: {:?}",
                        imp.name(),
                        panic_err
                    );
                }
            }
            warn_if_unexpected(&state, imp.name(), "result");
        }
    });

    let message_listener = tokio::spawn({
        let imp = Arc::clone(imp);
        let state = Arc::clone(state);
        let mut rx = messages;
        async move {
            while let Some(message) = rx.recv().await {
                let fut = imp.on_message_ready(message);
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    eprintln!(
                        "[prodcon] worker '{}' on_message_ready panicked: {:?}",
                        imp.name(),
                        panic_err
                    );
                }
            }
            warn_if_unexpected(&state, imp.name(), "message");
        }
    });

    (result_listener, message_listener)
}

/// A closed channel is the normal end-of-run signal; it only indicates an
/// unexpected peer exit when the state says the run should still be live.
fn warn_if_unexpected(state: &StateCell, name: &str, channel: &str) {
    let current = state.get();
    if current != LifecycleState::Stopped {
        eprintln!(
            "[prodcon] worker '{}' {} channel closed while state={}",
            name,
            channel,
            current.as_label()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Probe {
        results: Mutex<Vec<u32>>,
        messages: Mutex<Vec<&'static str>>,
        panics_left: AtomicUsize,
    }

    impl Probe {
        fn new(panics: usize) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
                panics_left: AtomicUsize::new(panics),
            })
        }
    }

    #[async_trait]
    impl Worker for Probe {
        type Output = u32;
        type Message = &'static str;

        fn name(&self) -> &str {
            "probe"
        }

        async fn on_result_ready(&self, result: u32) {
            if self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                panic!("callback blew up");
            }
            self.results.lock().unwrap().push(result);
        }

        async fn on_message_ready(&self, message: &'static str) {
            self.messages.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn test_listeners_dispatch_then_exit_on_close() {
        let imp = Probe::new(0);
        let state = Arc::new(StateCell::new());
        state.set_stopped();

        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (results, messages) = spawn_listeners(&imp, &state, result_rx, message_rx);

        result_tx.send(1).unwrap();
        result_tx.send(2).unwrap();
        message_tx.send("hello").unwrap();
        drop(result_tx);
        drop(message_tx);

        results.await.unwrap();
        messages.await.unwrap();
        assert_eq!(*imp.results.lock().unwrap(), vec![1, 2]);
        assert_eq!(*imp.messages.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_callback_panic_does_not_kill_listener() {
        let imp = Probe::new(1);
        let state = Arc::new(StateCell::new());

        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (_message_tx, message_rx) = mpsc::unbounded_channel();
        let (results, _messages) = spawn_listeners(&imp, &state, result_rx, message_rx);

        result_tx.send(1).unwrap(); // panics inside the callback
        result_tx.send(2).unwrap();
        drop(result_tx);

        results.await.unwrap();
        assert_eq!(
            *imp.results.lock().unwrap(),
            vec![2],
            "the result after the panic must still arrive"
        );
    }

    #[tokio::test]
    async fn test_core_send_without_run_returns_message() {
        let core: WorkerCore<&'static str> = WorkerCore::new();
        assert!(!core.is_running());

        let err = core.send_message("lost").unwrap_err();
        assert_eq!(err.into_inner(), "lost");
    }

    #[tokio::test]
    async fn test_dropping_core_signals_stop() {
        let core: WorkerCore<()> = WorkerCore::new();
        let state = Arc::clone(core.state());
        state.set_started();

        drop(core);
        assert!(state.is_stopped());
    }

    #[tokio::test]
    async fn test_retire_joins_the_previous_run() {
        let mut core: WorkerCore<()> = WorkerCore::new();
        let state = Arc::clone(core.state());
        state.set_started();

        let loop_state = Arc::clone(&state);
        let context = tokio::spawn(async move {
            while !loop_state.is_stopped() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        let (to_context, _from_supervisor) = mpsc::unbounded_channel();
        let idle = || tokio::spawn(async {});
        core.install(WorkerRun::new(context, idle(), idle(), to_context));
        assert!(core.is_running());

        core.retire().await;
        assert!(!core.is_running());
        assert!(state.is_stopped());
    }
}
