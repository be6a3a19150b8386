//! # ReadyQueue: gated, bounded, optionally-lossy fan-out buffer.
//!
//! [`ReadyQueue`] is the unit that wires producers to a consumer. Producers
//! hold cloned handles and [`offer`](ReadyQueue::offer) results into it; the
//! owning consumer pulls with a bounded-timeout [`get_timeout`](ReadyQueue::get_timeout).
//! The `ready` flag lets the consumer open and close its intake without the
//! producers noticing.
//!
//! ## Diagram
//! ```text
//!   producer A ──offer──┐
//!                       ├──▶ [ready? full?] ──▶ VecDeque ──get──▶ consumer
//!   producer B ──offer──┘          │
//!                                  ▼ declined / evicted
//!                            dropped counter
//! ```
//!
//! ## What it guarantees
//! - `offer` never waits and never evicts: a not-ready or full queue declines
//!   the item and counts it as dropped.
//! - Lossy `put` never waits either: at capacity the oldest item is evicted
//!   (and counted) before the new one goes in.
//! - `set_not_ready` marks the queue closed and drains it in one step.
//! - `put`/`get` and the fullness checks are safe under concurrent writers.
//!
//! ## What it does **not** guarantee
//! - No delivery guarantee to any individual subscriber; fan-out is
//!   best-effort, at most once per queue.
//! - No ordering across producers: items interleave in arrival order.
//!
//! ## Example
//! ```
//! use prodcon::ReadyQueue;
//!
//! let queue: ReadyQueue<u32> = ReadyQueue::bounded(8);
//! assert!(!queue.offer(1), "not ready yet");
//!
//! queue.set_ready();
//! assert!(queue.offer(1));
//! assert_eq!(queue.size(), 1);
//! assert_eq!(queue.try_get().ok(), Some(1));
//! assert_eq!(queue.dropped(), 1);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};

use crate::error::{GetError, PutError};

struct Shared<T> {
    buf: Mutex<VecDeque<T>>,
    ready: AtomicBool,
    lossy: bool,
    /// 0 = unbounded.
    capacity: usize,
    dropped: AtomicU64,
    /// Signaled when an item lands in the buffer.
    avail: Notify,
    /// Signaled when a slot opens up.
    space: Notify,
}

/// Cheaply clonable handle to one shared queue.
///
/// Cloning clones the reference: all handles see the same buffer, readiness
/// flag and drop counter.
pub struct ReadyQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ReadyQueue<T> {
    /// Creates a non-lossy queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self::with_options(false, 0)
    }

    /// Creates a non-lossy queue holding at most `capacity` items
    /// (`0` = unbounded, same as [`unbounded`](ReadyQueue::unbounded)).
    pub fn bounded(capacity: usize) -> Self {
        Self::with_options(false, capacity)
    }

    /// Creates a lossy queue holding at most `capacity` items; at capacity
    /// the oldest item is evicted to make room. `0` = unbounded, which
    /// never fills and therefore never evicts.
    pub fn lossy(capacity: usize) -> Self {
        Self::with_options(true, capacity)
    }

    pub(crate) fn with_options(lossy: bool, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                buf: Mutex::new(VecDeque::new()),
                ready: AtomicBool::new(false),
                lossy,
                capacity,
                dropped: AtomicU64::new(0),
                avail: Notify::new(),
                space: Notify::new(),
            }),
        }
    }

    /// Opens the queue for `offer` traffic. New queues start not ready.
    pub fn set_ready(&self) {
        self.shared.ready.store(true, Ordering::SeqCst);
    }

    /// Closes the queue for `offer` traffic and drains buffered items, as
    /// one step: a get after this call cannot see pre-close items.
    pub fn set_not_ready(&self) {
        let mut buf = self.lock();
        self.shared.ready.store(false, Ordering::SeqCst);
        buf.clear();
        drop(buf);
        // every waiting putter now has room
        self.shared.space.notify_waiters();
    }

    /// True if the queue accepts `offer` traffic.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Best-effort insert for producer fan-out: accepts iff the queue is
    /// ready and not full, and never evicts. Declined items are counted in
    /// [`dropped`](ReadyQueue::dropped).
    ///
    /// This is deliberately stricter than a lossy `put`: a producer offering
    /// into a full lossy queue drops its own newest result rather than
    /// evicting a buffered one.
    pub fn offer(&self, item: T) -> bool {
        if !self.is_ready() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let accepted = {
            let mut buf = self.lock();
            if self.shared.capacity != 0 && buf.len() >= self.shared.capacity {
                false
            } else {
                buf.push_back(item);
                true
            }
        };
        if accepted {
            self.shared.avail.notify_one();
        } else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Inserts `item`, waiting for a slot if the queue is bounded, non-lossy
    /// and full. Lossy queues never wait.
    ///
    /// The readiness flag does not gate `put`: checking `is_ready` first is
    /// the producer's job, which is exactly what [`offer`](ReadyQueue::offer)
    /// packages up.
    pub async fn put(&self, mut item: T) {
        loop {
            let notified = self.shared.space.notified();
            match self.try_insert(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
            notified.await;
        }
    }

    /// Inserts `item` without waiting.
    pub fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        self.try_insert(item).map_err(PutError::Full)
    }

    /// Inserts `item`, waiting at most `timeout` for a slot. The rejected
    /// item comes back inside [`PutError::Timeout`].
    pub async fn put_timeout(&self, mut item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let deadline = deadline_after(timeout);
        loop {
            let notified = self.shared.space.notified();
            match self.try_insert(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                // a slot may have opened right at the deadline
                return self.try_insert(item).map_err(PutError::Timeout);
            }
        }
    }

    /// Removes and returns the oldest item, waiting for one to arrive.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.shared.avail.notified();
            if let Some(item) = self.pop_now() {
                return item;
            }
            notified.await;
        }
    }

    /// Removes and returns the oldest item without waiting.
    pub fn try_get(&self) -> Result<T, GetError> {
        self.pop_now().ok_or(GetError::Empty)
    }

    /// Removes and returns the oldest item, waiting at most `timeout`.
    ///
    /// Items buffered before `set_not_ready` are not observable here; items
    /// put afterwards are, so residual traffic still drains.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<T, GetError> {
        let deadline = deadline_after(timeout);
        loop {
            let notified = self.shared.avail.notified();
            if let Some(item) = self.pop_now() {
                return Ok(item);
            }
            if time::timeout_at(deadline, notified).await.is_err() {
                return self.pop_now().ok_or(GetError::Timeout);
            }
        }
    }

    /// True if a bounded queue is at capacity. Unbounded queues are never
    /// full.
    pub fn full(&self) -> bool {
        self.shared.capacity != 0 && self.lock().len() >= self.shared.capacity
    }

    /// True if the buffer holds no items.
    pub fn empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of buffered items.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Configured capacity (`0` = unbounded).
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// True if puts at capacity evict the oldest item instead of waiting.
    pub fn is_lossy(&self) -> bool {
        self.shared.lossy
    }

    /// Total items lost at this queue: lossy evictions plus declined offers.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Insert under the capacity rule: lossy queues evict the oldest item at
    /// capacity (counted as dropped), non-lossy queues hand the item back.
    fn try_insert(&self, item: T) -> Result<(), T> {
        let mut buf = self.lock();
        if self.shared.capacity != 0 && buf.len() >= self.shared.capacity {
            if !self.shared.lossy {
                return Err(item);
            }
            buf.pop_front();
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buf.push_back(item);
        drop(buf);
        self.shared.avail.notify_one();
        Ok(())
    }

    fn pop_now(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.shared.space.notify_one();
        }
        item
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // no user code runs under this lock, so a poisoned guard is still sound
        self.shared.buf.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Clone for ReadyQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ReadyQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("ready", &self.is_ready())
            .field("size", &self.size())
            .field("capacity", &self.shared.capacity)
            .field("lossy", &self.shared.lossy)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Pushes `item` into `queue`, waiting for room if needed.
///
/// External code injecting into a consumer's queue goes through this
/// indirection so items can later be wrapped or tagged without touching
/// call sites.
pub async fn enqueue<T>(queue: &ReadyQueue<T>, item: T) {
    queue.put(item).await;
}

/// Saturates far in the future so an enormous timeout means "wait forever"
/// instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lossy_keeps_last_k_in_order() {
        let queue: ReadyQueue<u32> = ReadyQueue::lossy(3);
        queue.set_ready();
        for i in 0..7 {
            queue.put(i).await; // never waits on a lossy queue
        }

        assert_eq!(queue.size(), 3);
        assert_eq!(queue.dropped(), 4);
        assert_eq!(queue.try_get().ok(), Some(4));
        assert_eq!(queue.try_get().ok(), Some(5));
        assert_eq!(queue.try_get().ok(), Some(6));
        assert!(queue.empty());
    }

    #[tokio::test]
    async fn test_offer_respects_ready_gate() {
        let queue: ReadyQueue<u32> = ReadyQueue::bounded(4);

        assert!(!queue.offer(1));
        assert!(queue.empty(), "not-ready queue must stay empty under offer");
        assert_eq!(queue.dropped(), 1);

        queue.set_ready();
        assert!(queue.offer(2));
        assert_eq!(queue.try_get().ok(), Some(2));
    }

    #[tokio::test]
    async fn test_offer_declines_when_full_even_if_lossy() {
        let queue: ReadyQueue<&'static str> = ReadyQueue::lossy(2);
        queue.set_ready();

        assert!(queue.offer("a"));
        assert!(queue.offer("b"));
        assert!(!queue.offer("c"), "offer must not evict");

        assert_eq!(queue.size(), 2);
        assert_eq!(queue.try_get().ok(), Some("a"));
        assert_eq!(queue.dropped(), 1);
    }

    #[tokio::test]
    async fn test_put_ignores_ready_flag() {
        let queue: ReadyQueue<u32> = ReadyQueue::bounded(2);
        queue.put(5).await;
        assert_eq!(queue.size(), 1, "gating is the producer's job, not put's");
        assert_eq!(queue.try_get().ok(), Some(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_nonlossy_put_waits_for_space() {
        let queue: ReadyQueue<u32> = ReadyQueue::bounded(1);
        queue.put(1).await;

        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.put(2).await })
        };

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.size(), 1, "second put must wait for a slot");

        assert_eq!(queue.try_get().ok(), Some(1));
        writer.await.unwrap();
        assert_eq!(queue.try_get().ok(), Some(2));
    }

    #[tokio::test]
    async fn test_nonlossy_rejections_return_the_item() {
        let queue: ReadyQueue<u32> = ReadyQueue::bounded(1);
        queue.put(1).await;

        match queue.try_put(2) {
            Err(PutError::Full(item)) => assert_eq!(item, 2),
            other => panic!("expected Full, got {other:?}"),
        }
        match queue.put_timeout(3, Duration::from_millis(30)).await {
            Err(PutError::Timeout(item)) => assert_eq!(item, 3),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(queue.dropped(), 0, "rejected items are returned, not dropped");
    }

    #[tokio::test]
    async fn test_get_timeout_empty_then_late_arrival() {
        let queue: ReadyQueue<u32> = ReadyQueue::unbounded();

        assert_eq!(
            queue.get_timeout(Duration::from_millis(30)).await,
            Err(GetError::Timeout)
        );
        assert_eq!(queue.try_get(), Err(GetError::Empty));

        let feeder = {
            let queue = queue.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(20)).await;
                queue.put(9).await;
            })
        };
        assert_eq!(queue.get_timeout(Duration::from_secs(2)).await, Ok(9));
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_not_ready_drains() {
        let queue: ReadyQueue<u32> = ReadyQueue::unbounded();
        queue.set_ready();
        for i in 0..3 {
            queue.put(i).await;
        }

        queue.set_not_ready();
        assert!(!queue.is_ready());
        assert!(queue.empty());
        assert_eq!(queue.try_get(), Err(GetError::Empty));
    }

    #[tokio::test]
    async fn test_unbounded_is_never_full() {
        let queue: ReadyQueue<u32> = ReadyQueue::unbounded();
        queue.set_ready();
        for i in 0..1000 {
            assert!(queue.offer(i));
        }
        assert!(!queue.full());
        assert_eq!(queue.size(), 1000);
        assert_eq!(queue.dropped(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_means_unbounded() {
        let queue: ReadyQueue<u32> = ReadyQueue::bounded(0);
        for i in 0..100 {
            queue.put(i).await;
        }
        assert!(!queue.full());
        assert_eq!(queue.capacity(), 0);
        assert_eq!(queue.size(), 100);

        let lossy: ReadyQueue<u32> = ReadyQueue::lossy(0);
        for i in 0..100 {
            lossy.put(i).await;
        }
        assert_eq!(lossy.size(), 100, "an unbounded lossy queue never evicts");
        assert_eq!(lossy.dropped(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_the_buffer() {
        let a: ReadyQueue<u32> = ReadyQueue::bounded(4);
        let b = a.clone();
        a.set_ready();

        assert!(b.is_ready());
        b.put(7).await;
        assert_eq!(a.try_get().ok(), Some(7));
        assert!(b.is_lossy() == a.is_lossy() && a.capacity() == 4);
    }
}
