//! Per-query plumbing shared by every adapter: progress reporting and cancellation.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Context threaded through one balance query.
///
/// Carries the optional human-readable progress sink and the caller's cancellation
/// token. Clones share both.
#[derive(Clone, Default)]
pub struct QueryContext {
    progress: Option<Arc<ProgressFn>>,
    cancel: CancellationToken,
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emits one diagnostic line.
    pub fn report(&self, message: impl AsRef<str>) {
        if let Some(progress) = &self.progress {
            progress(message.as_ref());
        }
    }

    /// Context whose progress lines are indented under the caller's.
    pub fn nested(&self) -> Self {
        let progress = self.progress.clone().map(|outer| {
            Arc::new(move |msg: &str| outer(&format!("  {msg}"))) as Arc<ProgressFn>
        });
        Self {
            progress,
            cancel: self.cancel.clone(),
        }
    }

    /// Runs `fut` until it settles or the query is cancelled.
    pub async fn cancellable<T, Fut>(&self, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            res = fut => res,
        }
    }

    /// Races `fut` against a `limit` timer and the cancellation token.
    ///
    /// First to settle wins; the losers are dropped.
    pub async fn timed<T, Fut>(
        &self,
        stage: &'static str,
        limit: Duration,
        fut: Fut,
    ) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            res = time::timeout(limit, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout { stage, after: limit }),
            },
        }
    }
}

/// Shortens an address for logs and progress lines.
pub(crate) fn short(address: &str) -> String {
    let mut out: String = address.chars().take(12).collect();
    if address.chars().count() > 12 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timed_reports_the_stage_on_timeout() {
        let ctx = QueryContext::new();
        let res: Result<(), _> = ctx
            .timed("query", Duration::from_secs(3), async {
                time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            res,
            Err(ProviderError::Timeout { stage: "query", after }) if after == Duration::from_secs(3)
        ));
    }

    #[tokio::test]
    async fn timed_yields_to_cancellation() {
        let token = CancellationToken::new();
        let ctx = QueryContext::new().with_cancellation(token.clone());
        token.cancel();

        let res: Result<(), _> = ctx
            .timed("connect", Duration::from_secs(60), futures::future::pending())
            .await;
        assert!(matches!(res, Err(ProviderError::Cancelled)));
    }

    #[test]
    fn nested_progress_is_indented() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let ctx = QueryContext::new().with_progress(move |m| sink.lock().unwrap().push(m.to_string()));

        ctx.report("outer");
        ctx.nested().report("inner");

        assert_eq!(*lines.lock().unwrap(), ["outer", "  inner"]);
    }

    #[test]
    fn shortens_long_addresses() {
        assert_eq!(short("5F5522o328T8MNsjDBTW"), "5F5522o328T8...");
        assert_eq!(short("abc"), "abc");
    }
}
