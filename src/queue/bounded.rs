//! # Bounded FIFO queue with parked producers and consumers.
//!
//! [`BoundedQueue`] buffers at most `capacity` items. Producers that find it
//! full park **with their item** in a FIFO wait list; consumers that find it
//! empty park in another FIFO wait list.
//!
//! ## Hand-off rules
//! ```text
//! put(item):
//!   ├─ consumer parked? ──► hand item to the oldest consumer (buffer bypassed)
//!   ├─ buffer not full? ──► push_back
//!   └─ otherwise        ──► park producer (item stays with the wait entry)
//!
//! take():
//!   ├─ buffer not empty? ──► pop_front, then admit the oldest parked producer's item
//!   └─ otherwise         ──► park consumer
//! ```
//!
//! ## Invariants
//! - `len() <= capacity()` at all times.
//! - Consumers are parked only while the buffer is empty; producers only while it is full.
//!
//! ## Cancellation
//! Dropping a waiting `put` withdraws its item. Dropping a waiting `take` that
//! was already handed an item gives the item back to the queue: to the next
//! consumer, or to the buffer head. When the buffer is full its newest item is
//! moved to the head of the producer list as a *restored* entry (no waiter
//! behind it), so FIFO order holds and nothing is lost or duplicated. Restored
//! entries survive `close` and stay drainable. A `put` dropped in the same
//! instant its item is admitted counts as delivered.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;

use super::error::{QueueError, TakeError};

/// Producer parked on a full queue; `done` is `None` for restored items.
struct Producer<T> {
    id: u64,
    item: T,
    done: Option<oneshot::Sender<Result<(), T>>>,
}

/// Consumer parked on an empty queue.
struct Consumer<T> {
    id: u64,
    slot: oneshot::Sender<T>,
}

struct State<T> {
    items: VecDeque<T>,
    producers: VecDeque<Producer<T>>,
    consumers: VecDeque<Consumer<T>>,
    closed: bool,
    next_waiter: u64,
}

impl<T> State<T> {
    fn next_id(&mut self) -> u64 {
        self.next_waiter += 1;
        self.next_waiter
    }

    /// Hands `item` to a parked consumer or buffers it; gives it back when full.
    fn offer(&mut self, mut item: T, capacity: usize) -> Result<(), T> {
        while let Some(consumer) = self.consumers.pop_front() {
            match consumer.slot.send(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
        }
        if self.items.len() < capacity {
            self.items.push_back(item);
            Ok(())
        } else {
            Err(item)
        }
    }

    /// Pops the head and admits the oldest parked producer into the freed slot.
    fn pop(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        if let Some(producer) = self.producers.pop_front() {
            self.items.push_back(producer.item);
            if let Some(done) = producer.done {
                let _ = done.send(Ok(()));
            }
        }
        Some(item)
    }

    /// Returns an item recovered from a vanished consumer to the front of the line.
    fn restore(&mut self, mut item: T, capacity: usize) {
        while let Some(consumer) = self.consumers.pop_front() {
            match consumer.slot.send(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
        }
        if self.items.len() >= capacity {
            if let Some(newest) = self.items.pop_back() {
                let id = self.next_id();
                self.producers.push_front(Producer {
                    id,
                    item: newest,
                    done: None,
                });
            }
        }
        self.items.push_front(item);
    }

    fn remove_producer(&mut self, id: u64) -> Option<T> {
        let pos = self.producers.iter().position(|p| p.id == id)?;
        self.producers.remove(pos).map(|p| p.item)
    }

    fn remove_consumer(&mut self, id: u64) -> bool {
        match self.consumers.iter().position(|c| c.id == id) {
            Some(pos) => {
                self.consumers.remove(pos);
                true
            }
            None => false,
        }
    }
}

struct Inner<T> {
    capacity: usize,
    state: Mutex<State<T>>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded multi-producer multi-consumer FIFO queue.
///
/// Cheap to clone; clones share the same buffer.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.inner.capacity)
            .field("len", &st.items.len())
            .field("producers", &st.producers.len())
            .field("consumers", &st.consumers.len())
            .field("closed", &st.closed)
            .finish()
    }
}

enum Put<T> {
    Done(Result<(), QueueError<T>>),
    Parked(ProducerWait<T>),
}

enum Take<T> {
    Done(Result<T, TakeError>),
    Parked(ConsumerWait<T>),
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    producers: VecDeque::new(),
                    consumers: VecDeque::new(),
                    closed: false,
                    next_waiter: 0,
                }),
            }),
        }
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of buffered items (parked producers not included).
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of producers parked on a full queue.
    pub fn waiting_producers(&self) -> usize {
        self.inner.lock().producers.len()
    }

    /// Number of consumers parked on an empty queue.
    pub fn waiting_consumers(&self) -> usize {
        self.inner.lock().consumers.len()
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Enqueues `item`, parking while the queue is full.
    pub async fn put(&self, item: T) -> Result<(), QueueError<T>> {
        match self.begin_put(item) {
            Put::Done(res) => res,
            Put::Parked(mut wait) => wait.recv().await,
        }
    }

    /// Enqueues `item` only if it fits right now.
    pub fn try_put(&self, item: T) -> Result<(), QueueError<T>> {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(QueueError::Closed(item));
        }
        st.offer(item, self.inner.capacity).map_err(QueueError::Full)
    }

    /// Enqueues `item`, parking at most `wait` while the queue is full.
    ///
    /// On timeout the item is withdrawn and returned in [`QueueError::Timeout`].
    pub async fn put_timeout(&self, item: T, wait: Duration) -> Result<(), QueueError<T>> {
        let mut parked = match self.begin_put(item) {
            Put::Done(res) => return res,
            Put::Parked(parked) => parked,
        };
        let answer = time::timeout(wait, parked.recv()).await;
        match answer {
            Ok(res) => res,
            Err(_elapsed) => parked.withdraw(),
        }
    }

    /// Dequeues the oldest item, parking while the queue is empty.
    ///
    /// After [`close`](Self::close), remaining items are still returned; then
    /// [`TakeError::Closed`].
    pub async fn take(&self) -> Result<T, TakeError> {
        match self.begin_take() {
            Take::Done(res) => res,
            Take::Parked(mut wait) => wait.recv().await,
        }
    }

    /// Dequeues the oldest item if one is buffered.
    pub fn try_take(&self) -> Result<T, TakeError> {
        let mut st = self.inner.lock();
        match st.pop() {
            Some(item) => Ok(item),
            None if st.closed => Err(TakeError::Closed),
            None => Err(TakeError::Empty),
        }
    }

    /// Dequeues the oldest item, parking at most `wait` while the queue is empty.
    pub async fn take_timeout(&self, wait: Duration) -> Result<T, TakeError> {
        let mut parked = match self.begin_take() {
            Take::Done(res) => return res,
            Take::Parked(parked) => parked,
        };
        let answer = time::timeout(wait, parked.recv()).await;
        match answer {
            Ok(res) => res,
            Err(_elapsed) => Err(TakeError::Timeout),
        }
    }

    /// Closes the queue.
    ///
    /// Parked producers get their item back in [`QueueError::Closed`], parked
    /// consumers get [`TakeError::Closed`], later puts are rejected. Buffered
    /// and restored items stay available to `take`. Idempotent.
    pub fn close(&self) {
        let (producers, consumers) = {
            let mut st = self.inner.lock();
            st.closed = true;
            let (restored, parked): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut st.producers)
                .into_iter()
                .partition(|p: &Producer<T>| p.done.is_none());
            st.producers = restored;
            (parked, std::mem::take(&mut st.consumers))
        };
        for producer in producers {
            if let Some(done) = producer.done {
                let _ = done.send(Err(producer.item));
            }
        }
        drop(consumers);
    }

    fn begin_put(&self, item: T) -> Put<T> {
        let mut st = self.inner.lock();
        if st.closed {
            return Put::Done(Err(QueueError::Closed(item)));
        }
        match st.offer(item, self.inner.capacity) {
            Ok(()) => Put::Done(Ok(())),
            Err(item) => {
                let id = st.next_id();
                let (done, rx) = oneshot::channel();
                st.producers.push_back(Producer {
                    id,
                    item,
                    done: Some(done),
                });
                Put::Parked(ProducerWait {
                    inner: Arc::clone(&self.inner),
                    id,
                    rx,
                    finished: false,
                })
            }
        }
    }

    fn begin_take(&self) -> Take<T> {
        let mut st = self.inner.lock();
        if let Some(item) = st.pop() {
            return Take::Done(Ok(item));
        }
        if st.closed {
            return Take::Done(Err(TakeError::Closed));
        }
        let id = st.next_id();
        let (slot, rx) = oneshot::channel();
        st.consumers.push_back(Consumer { id, slot });
        Take::Parked(ConsumerWait {
            inner: Arc::clone(&self.inner),
            id,
            rx,
            finished: false,
        })
    }
}

/// A parked `put`; withdraws its item when dropped unanswered.
struct ProducerWait<T> {
    inner: Arc<Inner<T>>,
    id: u64,
    rx: oneshot::Receiver<Result<(), T>>,
    finished: bool,
}

impl<T> ProducerWait<T> {
    async fn recv(&mut self) -> Result<(), QueueError<T>> {
        let answer = (&mut self.rx).await;
        self.finished = true;
        match answer {
            Ok(Ok(())) => Ok(()),
            Ok(Err(item)) => Err(QueueError::Closed(item)),
            // unanswered: reclaim the item if it is still parked
            Err(_) => match self.inner.lock().remove_producer(self.id) {
                Some(item) => Err(QueueError::Closed(item)),
                None => Ok(()),
            },
        }
    }

    /// Takes the item back after a timeout, unless it was answered meanwhile.
    fn withdraw(&mut self) -> Result<(), QueueError<T>> {
        self.finished = true;
        let removed = self.inner.lock().remove_producer(self.id);
        if let Some(item) = removed {
            return Err(QueueError::Timeout(item));
        }
        match self.rx.try_recv() {
            Ok(Err(item)) => Err(QueueError::Closed(item)),
            _ => Ok(()),
        }
    }
}

impl<T> Drop for ProducerWait<T> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.inner.lock().remove_producer(self.id);
        }
    }
}

/// A parked `take`; gives a late hand-off back to the queue when dropped.
struct ConsumerWait<T> {
    inner: Arc<Inner<T>>,
    id: u64,
    rx: oneshot::Receiver<T>,
    finished: bool,
}

impl<T> ConsumerWait<T> {
    async fn recv(&mut self) -> Result<T, TakeError> {
        let res = (&mut self.rx).await;
        self.finished = true;
        res.map_err(|_| TakeError::Closed)
    }
}

impl<T> Drop for ConsumerWait<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut st = self.inner.lock();
        if st.remove_consumer(self.id) {
            return;
        }
        if let Ok(item) = self.rx.try_recv() {
            st.restore(item, self.inner.capacity);
        }
    }
}
