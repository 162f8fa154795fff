//! Per-call context: correlation, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use revtrail_core::errors::{ExError, ExErrorKind};
use revtrail_core_types::RequestContext;
use revtrail_store::CommitFence;

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Token observing this source
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every token; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the source is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Context passed to every engine operation
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub request: RequestContext,
    /// Overrides the policy's default deadline
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn decorate(&self, err: ExError) -> ExError {
        let err = err.with_request_id(self.request.request_id.clone());
        match &self.request.trace_id {
            Some(trace_id) => err.with_trace_id(trace_id.clone()),
            None => err,
        }
    }
}

/// Run `fut` under the context's cancellation and deadline
///
/// Cancellation wins over the deadline, and both win over a future that
/// becomes ready in the same poll. Every error leaving this function carries
/// the operation name and the request's correlation ids.
pub(crate) async fn guarded<T, F>(
    op: &'static str,
    ctx: &CallContext,
    default_timeout: Option<Duration>,
    fut: F,
) -> Result<T, ExError>
where
    F: Future<Output = Result<T, ExError>>,
{
    run_guarded(op, ctx, default_timeout, None, fut).await
}

/// [`guarded`] for a write committing through `fence`
///
/// When cancellation or the deadline fires, the fence is aborted so the
/// write can no longer land. If the write already reached its commit, the
/// call waits for it and reports what actually happened.
pub(crate) async fn guarded_write<T, F>(
    op: &'static str,
    ctx: &CallContext,
    default_timeout: Option<Duration>,
    fence: &CommitFence,
    fut: F,
) -> Result<T, ExError>
where
    F: Future<Output = Result<T, ExError>>,
{
    run_guarded(op, ctx, default_timeout, Some(fence), fut).await
}

async fn run_guarded<T, F>(
    op: &'static str,
    ctx: &CallContext,
    default_timeout: Option<Duration>,
    fence: Option<&CommitFence>,
    fut: F,
) -> Result<T, ExError>
where
    F: Future<Output = Result<T, ExError>>,
{
    if ctx.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
        if let Some(fence) = fence {
            fence.abort(ExErrorKind::Cancelled);
        }
        return Err(ctx.decorate(cancelled(op)));
    }

    let deadline = ctx.timeout.or(default_timeout);
    let cancel = async {
        match &ctx.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let timer = async {
        match deadline {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    tokio::pin!(fut);
    let result = tokio::select! {
        biased;
        _ = cancel => Err(cancelled(op)),
        _ = timer => Err(ExError::new(ExErrorKind::Timeout)
            .with_op(op)
            .with_message(format!("deadline of {}ms exceeded", deadline.map_or(0, |d| d.as_millis())))),
        result = &mut fut => Ok(result),
    };

    let result = match result {
        Ok(result) => result,
        // A commit under way cannot be vetoed; its outcome is the answer
        Err(interrupted) => match fence {
            Some(fence) if !fence.abort(interrupted.kind()) => fut.await,
            _ => Err(interrupted),
        },
    };

    result.map_err(|err| {
        let err = if err.op().is_none() { err.with_op(op) } else { err };
        ctx.decorate(err)
    })
}

fn cancelled(op: &'static str) -> ExError {
    ExError::new(ExErrorKind::Cancelled)
        .with_op(op)
        .with_message("cancelled by caller")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pre_cancelled_never_polls() {
        let source = CancelSource::new();
        source.cancel();
        let ctx = CallContext::new().with_cancel(source.token());

        let polled = std::cell::Cell::new(false);

        let result: Result<(), ExError> = guarded("op", &ctx, None, async {
            polled.set(true);
            Ok(())
        })
        .await;
        assert!(!polled.get());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Cancelled);
        assert_eq!(err.op(), Some("op"));
        assert_eq!(err.request_id(), Some(&ctx.request.request_id));
    }

    #[tokio::test]
    async fn test_deadline_elapses() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let result: Result<(), ExError> = guarded("op", &ctx, None, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ExErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_context_timeout_overrides_default() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(10));
        let result = guarded("op", &ctx, Some(Duration::from_millis(1)), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ExError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_mid_flight() {
        let source = CancelSource::new();
        let ctx = CallContext::new().with_cancel(source.token());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let call = guarded("op", &ctx, None, async move {
            let _ = started_tx.send(());
            std::future::pending::<Result<(), ExError>>().await
        });
        let canceller = async {
            let _ = started_rx.await;
            source.cancel();
        };
        let (result, ()) = tokio::join!(call, canceller);
        assert_eq!(result.unwrap_err().kind(), ExErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_source_does_not_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        drop(source);
        let ctx = CallContext::new().with_cancel(token);
        let result = guarded("op", &ctx, None, async { Ok::<_, ExError>("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_inner_error_keeps_its_op() {
        let ctx = CallContext::new();
        let result: Result<(), ExError> = guarded("outer", &ctx, None, async {
            Err(ExError::new(ExErrorKind::Conflict).with_op("append"))
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.op(), Some("append"));
        assert!(err.request_id().is_some());
    }

    #[tokio::test]
    async fn test_deadline_aborts_uncommitted_write() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let fence = CommitFence::new();
        let writer = fence.clone();

        let result = guarded_write("record", &ctx, None, &fence, async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer.commit("insert_next", || Ok(1))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ExErrorKind::Timeout);
        assert_eq!(
            fence.check("insert_next").unwrap_err().kind(),
            ExErrorKind::Timeout
        );
    }

    #[tokio::test]
    async fn test_deadline_after_commit_reports_the_write() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let fence = CommitFence::new();
        let writer = fence.clone();

        let result = guarded_write("record", &ctx, None, &fence, async move {
            let version = writer.commit("insert_next", || Ok(4))?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ExError>(version)
        })
        .await;
        assert_eq!(result.unwrap(), 4);
        assert!(fence.is_committed());
    }

    #[tokio::test]
    async fn test_pre_cancelled_write_aborts_fence() {
        let source = CancelSource::new();
        source.cancel();
        let ctx = CallContext::new().with_cancel(source.token());
        let fence = CommitFence::new();

        let result: Result<(), ExError> =
            guarded_write("record", &ctx, None, &fence, async { Ok(()) }).await;
        assert_eq!(result.unwrap_err().kind(), ExErrorKind::Cancelled);
        assert_eq!(
            fence.check("insert_next").unwrap_err().kind(),
            ExErrorKind::Cancelled
        );
    }
}
