//! Result sink: matches finished items to the callers waiting for them.
//!
//! Every `process` call registers its [`RequestId`] before its item enters the
//! chain. The item comes back either through the sink queue (success) or
//! straight from the failing stage (error); whichever arrives resolves the
//! registration exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::queue::BoundedQueue;

/// Pipeline-unique request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// An item travelling through the chain, tagged with its request.
#[derive(Debug)]
pub(crate) struct Envelope<T> {
    pub id: RequestId,
    pub value: T,
}

/// Failure path available to every stage regardless of the final output type.
pub(crate) trait ErrorSink: Send + Sync + 'static {
    fn fail(&self, id: RequestId, err: PipelineError);
}

type Reply<O> = oneshot::Sender<Result<O, PipelineError>>;

struct SinkState<O> {
    pending: HashMap<RequestId, Reply<O>>,
    closed: bool,
}

/// Registry of outstanding requests.
pub(crate) struct Sink<O> {
    state: Mutex<SinkState<O>>,
}

impl<O: Send + 'static> Sink<O> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState<O>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id`; fails once the sink is closed.
    pub fn register(&self, id: RequestId) -> Result<oneshot::Receiver<Result<O, PipelineError>>, PipelineError> {
        let mut st = self.lock();
        if st.closed {
            return Err(PipelineError::Terminated);
        }
        let (tx, rx) = oneshot::channel();
        st.pending.insert(id, tx);
        Ok(rx)
    }

    /// Resolves `id`; later deliveries for the same id are ignored.
    pub fn deliver(&self, id: RequestId, res: Result<O, PipelineError>) {
        let reply = self.lock().pending.remove(&id);
        if let Some(reply) = reply {
            let _ = reply.send(res);
        }
    }

    /// Forgets `id` without resolving it.
    pub fn discard(&self, id: RequestId) {
        let reply = self.lock().pending.remove(&id);
        drop(reply);
    }

    /// Resolves every outstanding request with `Terminated` and refuses new ones.
    ///
    /// Returns how many requests were outstanding.
    pub fn close(&self) -> usize {
        let pending = {
            let mut st = self.lock();
            st.closed = true;
            std::mem::take(&mut st.pending)
        };
        let n = pending.len();
        for (_, reply) in pending {
            let _ = reply.send(Err(PipelineError::Terminated));
        }
        n
    }

    pub fn outstanding(&self) -> usize {
        self.lock().pending.len()
    }
}

impl<O: Send + 'static> ErrorSink for Sink<O> {
    fn fail(&self, id: RequestId, err: PipelineError) {
        self.deliver(id, Err(err));
    }
}

/// Drains the sink queue, resolving each request with its final value.
pub(crate) async fn collect<O: Send + 'static>(
    queue: BoundedQueue<Envelope<O>>,
    sink: Arc<Sink<O>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = queue.take() => match next {
                Ok(env) => sink.deliver(env.id, Ok(env.value)),
                Err(_) => break,
            },
        }
    }
}

/// Withdraws a registration if the caller stops waiting.
pub(crate) struct Registration<'a, O: Send + 'static> {
    pub sink: &'a Sink<O>,
    pub id: RequestId,
}

impl<O: Send + 'static> Drop for Registration<'_, O> {
    fn drop(&mut self) {
        self.sink.discard(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_delivery_wins() {
        let sink = Sink::<u32>::new();
        let rx = sink.register(RequestId(1)).unwrap();
        sink.fail(
            RequestId(1),
            PipelineError::Stage {
                stage: "parse".into(),
                error: "bad".into(),
            },
        );
        sink.deliver(RequestId(1), Ok(5));
        assert!(matches!(rx.await.unwrap(), Err(PipelineError::Stage { .. })));
        assert_eq!(sink.outstanding(), 0);
    }

    #[tokio::test]
    async fn close_terminates_outstanding_and_refuses_new() {
        let sink = Sink::<u32>::new();
        let a = sink.register(RequestId(1)).unwrap();
        let b = sink.register(RequestId(2)).unwrap();
        assert_eq!(sink.close(), 2);
        assert_eq!(a.await.unwrap(), Err(PipelineError::Terminated));
        assert_eq!(b.await.unwrap(), Err(PipelineError::Terminated));
        assert_eq!(sink.register(RequestId(3)).unwrap_err(), PipelineError::Terminated);
    }

    #[tokio::test]
    async fn collector_delivers_values() {
        let sink = Arc::new(Sink::<&'static str>::new());
        let queue = BoundedQueue::new(4);
        let token = CancellationToken::new();
        let rx = sink.register(RequestId(7)).unwrap();
        let join = tokio::spawn(collect(queue.clone(), Arc::clone(&sink), token.clone()));

        queue
            .put(Envelope {
                id: RequestId(7),
                value: "done",
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Ok("done"));

        token.cancel();
        join.await.unwrap();
    }

    #[test]
    fn dropped_registration_is_withdrawn() {
        let sink = Sink::<u32>::new();
        let _rx = sink.register(RequestId(1)).unwrap();
        drop(Registration {
            sink: &sink,
            id: RequestId(1),
        });
        assert_eq!(sink.outstanding(), 0);
    }
}
