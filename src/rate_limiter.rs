//! FIFO request throttling for a single downstream API.

use std::{
    collections::VecDeque,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::oneshot,
    time::{self, Instant},
};

use crate::errors::RateLimitError;

/// A queued task, type-erased so one queue can hold tasks of any output type.
trait Pending: Send {
    fn dispatch(self: Box<Self>) -> BoxFuture<'static, ()>;
    fn reject(self: Box<Self>, err: RateLimitError);
}

struct Entry<F, T> {
    task: F,
    tx: oneshot::Sender<Result<T, RateLimitError>>,
}

impl<F, Fut, T> Pending for Entry<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    fn dispatch(self: Box<Self>) -> BoxFuture<'static, ()> {
        let Entry { task, tx } = *self;
        Box::pin(async move {
            let out = task().await;
            let _ = tx.send(Ok(out));
        })
    }

    fn reject(self: Box<Self>, err: RateLimitError) {
        let _ = self.tx.send(Err(err));
    }
}

#[derive(Default)]
struct State {
    queue: VecDeque<Box<dyn Pending>>,
    processing: bool,
    last_dispatch: Option<Instant>,
}

struct Inner {
    min_interval: Duration,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Throttles calls to one downstream dependency to at most N dispatches per second.
///
/// Tasks are never dropped or retried: they wait in a FIFO queue drained by a single
/// worker, which spaces consecutive dispatches at least `1 / N` seconds apart (measured
/// dispatch to dispatch, not completion to dispatch) and awaits each task before
/// starting the next. Separate instances share nothing.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.inner.min_interval)
            .field("queued", &self.queue_len())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` dispatches per second.
    ///
    /// A ceiling of zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1);
        Self::with_min_interval(Duration::from_secs(1) / rps)
    }

    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                min_interval,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Number of entries waiting for dispatch. The running task is not counted.
    pub fn queue_len(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// Enqueues `task` and returns a future settling with exactly the task's output.
    ///
    /// The entry is queued when this function is called, not when the returned future
    /// is first polled, so call order is dispatch order. Must be called from within a
    /// Tokio runtime.
    ///
    /// Fails only with [`RateLimitError::Cleared`] if [`clear`](Self::clear) removed the
    /// entry before dispatch, or [`RateLimitError::Stopped`] if the task panicked.
    pub fn execute<T, F, Fut>(&self, task: F) -> impl Future<Output = Result<T, RateLimitError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let start_worker = {
            let mut state = self.inner.state();
            state.queue.push_back(Box::new(Entry { task, tx }));
            !std::mem::replace(&mut state.processing, true)
        };

        if start_worker {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }

        async move { rx.await.unwrap_or(Err(RateLimitError::Stopped)) }
    }

    /// Rejects every queued entry with [`RateLimitError::Cleared`].
    ///
    /// A task already dispatched keeps running and settles normally.
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.state().queue.drain(..).collect();
        if !drained.is_empty() {
            tracing::debug!(cleared = drained.len(), "rate limiter queue cleared");
        }
        for entry in drained {
            entry.reject(RateLimitError::Cleared);
        }
    }
}

/// The single draining worker. Exits, clearing the processing flag, once the queue is empty.
async fn drain(inner: Arc<Inner>) {
    loop {
        let wait = {
            let mut state = inner.state();
            if state.queue.is_empty() {
                state.processing = false;
                return;
            }
            state
                .last_dispatch
                .map(|at| inner.min_interval.saturating_sub(at.elapsed()))
                .unwrap_or_default()
        };

        if !wait.is_zero() {
            time::sleep(wait).await;
        }

        let entry = {
            let mut state = inner.state();
            match state.queue.pop_front() {
                Some(entry) => {
                    state.last_dispatch = Some(Instant::now());
                    entry
                }
                None => {
                    state.processing = false;
                    return;
                }
            }
        };

        // A panicking task drops its sender; the caller sees `Stopped` and the queue keeps moving.
        if AssertUnwindSafe(entry.dispatch()).catch_unwind().await.is_err() {
            tracing::warn!("rate limited task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::join_all;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_dispatches_by_min_interval() {
        let limiter = RateLimiter::new(5);
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let stamps = Arc::clone(&stamps);
                limiter.execute(move || async move {
                    stamps.lock().unwrap().push(Instant::now());
                })
            })
            .collect();
        join_all(calls).await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 6);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interval_counts_from_dispatch_not_completion() {
        let limiter = RateLimiter::new(2);
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let stamps = Arc::clone(&stamps);
                limiter.execute(move || async move {
                    stamps.lock().unwrap().push(Instant::now());
                    time::sleep(Duration::from_millis(400)).await;
                })
            })
            .collect();
        join_all(calls).await;

        let stamps = stamps.lock().unwrap();
        let gap = stamps[1] - stamps[0];
        assert!(gap >= Duration::from_millis(500));
        assert!(gap < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_in_enqueue_order() {
        let limiter = RateLimiter::new(50);
        let order = Arc::new(Mutex::new(Vec::new()));

        // Later tasks finish faster; order must still follow submission.
        let calls: Vec<_> = (0..10u64)
            .map(|tag| {
                let order = Arc::clone(&order);
                limiter.execute(move || async move {
                    order.lock().unwrap().push(tag);
                    time::sleep(Duration::from_millis(50 - tag * 5)).await;
                    tag
                })
            })
            .collect();

        let results = join_all(calls).await;

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(
            results.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            (0..10).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn forwards_task_output_verbatim() {
        let limiter = RateLimiter::new(10);

        let ok = limiter.execute(|| async { Ok::<_, String>(7) }).await;
        let err = limiter
            .execute(|| async { Err::<u32, _>("boom".to_string()) })
            .await;

        assert_eq!(ok, Ok(Ok(7)));
        assert_eq!(err, Ok(Err("boom".to_string())));
    }

    #[tokio::test]
    async fn clear_rejects_queued_but_not_in_flight() {
        let limiter = RateLimiter::new(1);
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = limiter.execute(move || async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            "first"
        });
        let first = tokio::spawn(first);
        started_rx.await.unwrap();

        let second = limiter.execute(|| async { "second" });
        let third = limiter.execute(|| async { "third" });
        assert_eq!(limiter.queue_len(), 2);

        limiter.clear();
        assert_eq!(limiter.queue_len(), 0);
        release_tx.send(()).unwrap();

        assert_eq!(first.await.unwrap(), Ok("first"));
        assert_eq!(second.await, Err(RateLimitError::Cleared));
        assert_eq!(third.await, Err(RateLimitError::Cleared));
    }

    #[tokio::test]
    async fn panicking_task_does_not_stall_the_queue() {
        let limiter = RateLimiter::new(100);

        let bad = limiter.execute(|| async { None::<()>.expect("task blew up") });
        let good = limiter.execute(|| async { 1 });

        assert_eq!(bad.await, Err::<(), _>(RateLimitError::Stopped));
        assert_eq!(good.await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn instances_do_not_share_budgets() {
        let a = RateLimiter::new(1);
        let b = RateLimiter::new(1);
        let start = Instant::now();

        let (ra, rb) = tokio::join!(
            a.execute(|| async { Instant::now() }),
            b.execute(|| async { Instant::now() })
        );

        assert!(ra.unwrap() - start < Duration::from_millis(10));
        assert!(rb.unwrap() - start < Duration::from_millis(10));
    }
}
