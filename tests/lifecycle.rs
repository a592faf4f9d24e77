//! Concurrency properties of the pipeline lifecycle state machine, exercised
//! through scriptable stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use diagmon::pipeline::{Pipeline, PipelineError, PipelineStages, PipelineState};

/// Stages whose run blocks like a live event-stream read: it ends when the
/// stop action "flushes" (notifies) or when the run token is cancelled.
#[derive(Default)]
struct BlockingStages {
    runs: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    aborts: Arc<AtomicUsize>,
    flushed: Arc<Notify>,
    running: Arc<Notify>,
}

impl PipelineStages for BlockingStages {
    fn run(&self, token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>> {
        let runs = self.runs.clone();
        let flushed = self.flushed.clone();
        let running = self.running.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            // notify_one stores a permit, so the handshake cannot be lost
            // even if the test notifies before this future is first polled.
            running.notify_one();
            tokio::select! {
                _ = flushed.notified() => Ok(()),
                _ = token.cancelled() => Err(PipelineError::Aborted),
            }
        }
        .boxed()
    }

    fn stop(&self, _token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>> {
        let stops = self.stops.clone();
        let flushed = self.flushed.clone();
        async move {
            stops.fetch_add(1, Ordering::SeqCst);
            flushed.notify_one();
            Ok(())
        }
        .boxed()
    }

    fn abort(&self) -> BoxFuture<'static, ()> {
        let aborts = self.aborts.clone();
        async move {
            aborts.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }
}

/// Waits until the run action has actually started.
async fn started(stages_running: &Notify, runs: &AtomicUsize) {
    if runs.load(Ordering::SeqCst) > 0 {
        return;
    }
    let notified = stages_running.notified();
    if runs.load(Ordering::SeqCst) > 0 {
        return;
    }
    notified.await;
}

#[tokio::test]
async fn concurrent_run_calls_start_one_run() {
    let stages = BlockingStages::default();
    let (runs, running, flushed) = (stages.runs.clone(), stages.running.clone(), stages.flushed.clone());
    let pipeline = Arc::new(Pipeline::new(stages));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let p = pipeline.clone();
            tokio::spawn(async move { p.run(CancellationToken::new()).await })
        })
        .collect();

    started(&running, &runs).await;
    flushed.notify_one();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn stop_while_running_reaches_stopped_with_one_stop() {
    let stages = BlockingStages::default();
    let (runs, running, stops) = (stages.runs.clone(), stages.running.clone(), stages.stops.clone());
    let pipeline = Arc::new(Pipeline::new(stages));

    let runner = pipeline.clone();
    let run = tokio::spawn(async move { runner.run(CancellationToken::new()).await });
    started(&running, &runs).await;
    assert_eq!(pipeline.state(), PipelineState::Running);

    let (s1, s2) = tokio::join!(
        pipeline.stop(CancellationToken::new()),
        pipeline.stop(CancellationToken::new())
    );
    s1.unwrap();
    s2.unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn external_cancel_and_dispose_fire_abort_once() {
    let stages = BlockingStages::default();
    let (runs, running, aborts) = (stages.runs.clone(), stages.running.clone(), stages.aborts.clone());
    let pipeline = Arc::new(Pipeline::new(stages));

    let token = CancellationToken::new();
    let (runner, run_token) = (pipeline.clone(), token.clone());
    let run = tokio::spawn(async move { runner.run(run_token).await });
    started(&running, &runs).await;

    // Both abort triggers at once.
    token.cancel();
    let disposer = pipeline.clone();
    let dispose = tokio::spawn(async move { disposer.dispose().await });

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("a cancelled run must unblock promptly")
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Aborted)));
    dispose.await.unwrap();

    assert_eq!(aborts.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.state(), PipelineState::Disposed);
}

#[tokio::test]
async fn dispose_unblocks_a_blocked_run() {
    let stages = BlockingStages::default();
    let (runs, running, aborts) = (stages.runs.clone(), stages.running.clone(), stages.aborts.clone());
    let pipeline = Arc::new(Pipeline::new(stages));

    let runner = pipeline.clone();
    let run = tokio::spawn(async move { runner.run(CancellationToken::new()).await });
    started(&running, &runs).await;

    // The caller never cancels its own token; disposal alone must unblock.
    tokio::time::timeout(Duration::from_secs(5), pipeline.dispose())
        .await
        .expect("dispose must not hang on a blocked run");
    let result = run.await.unwrap();
    assert!(matches!(result, Err(PipelineError::Aborted)));
    assert_eq!(aborts.load(Ordering::SeqCst), 1);

    // Disposed is terminal and sticky.
    assert_eq!(pipeline.state(), PipelineState::Disposed);
    assert!(matches!(
        pipeline.run(CancellationToken::new()).await,
        Err(PipelineError::Disposed)
    ));
}

#[tokio::test]
async fn double_dispose_is_a_noop() {
    let pipeline = Pipeline::new(BlockingStages::default());
    pipeline.dispose().await;
    pipeline.dispose().await;
    assert_eq!(pipeline.state(), PipelineState::Disposed);
}

#[tokio::test]
async fn stop_without_run_is_an_invalid_transition() {
    let pipeline = Pipeline::new(BlockingStages::default());
    let err = pipeline.stop(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition {
            from: PipelineState::Unstarted,
            ..
        }
    ));
    assert!(err.is_state_error());
}
