//! Generic lifecycle of a collection activity.
//!
//! A [`Pipeline`] wraps a set of mode-specific [`PipelineStages`] into a
//! safely start-able, stoppable, abortable and disposable unit of work:
//! - [`run`](Pipeline::run) and [`stop`](Pipeline::stop) are idempotent:
//!   concurrent callers share the first task, a second run is never started.
//! - the abort action executes **at most once**, no matter how many triggers
//!   fire it (external cancellation, disposal, a cancelled run or stop).
//! - [`dispose`](Pipeline::dispose) is idempotent, unblocks any in-flight
//!   operation, waits for it to settle while discarding its outcome, and
//!   releases resources exactly once.
//!
//! Every collection mode reuses this one state machine; the modes only supply
//! their stage actions. See the [`collect`](crate::collect) module.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

pub mod error;

pub use error::PipelineError;

/// The lifecycle phase of a [`Pipeline`].
///
/// Valid transitions: `Unstarted → Running → Stopping → Stopped`, plus
/// `Running → Stopped` when the run action completes on its own, and any
/// state `→ Disposed`, which is terminal and sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Unstarted,
    Running,
    Stopping,
    Stopped,
    Disposed,
}

/// The mode-specific actions driven by a [`Pipeline`].
///
/// Methods return boxed futures instead of borrowing `self`, so that the
/// pipeline can cache and share the resulting tasks; implementations
/// typically clone an inner `Arc` into the future.
pub trait PipelineStages: Send + Sync + 'static {
    /// The main collection work. The token is cancelled when the caller
    /// cancels or the pipeline is disposed; the future must then complete
    /// with [`PipelineError::Aborted`] promptly.
    fn run(&self, token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>>;

    /// Requests a graceful shutdown of the collection. The run future is
    /// expected to complete on its own once the flush is over.
    fn stop(&self, token: CancellationToken) -> BoxFuture<'static, Result<(), PipelineError>> {
        let _ = token;
        async { Ok(()) }.boxed()
    }

    /// Forced teardown, without waiting for a graceful flush.
    fn abort(&self) -> BoxFuture<'static, ()> {
        async {}.boxed()
    }

    /// Final resource release. Called exactly once, from `Pipeline::dispose`,
    /// after all outstanding activity has settled.
    fn dispose(&self) -> BoxFuture<'static, ()> {
        async {}.boxed()
    }
}

type SharedTask = Shared<BoxFuture<'static, Result<(), PipelineError>>>;
type SharedAbort = Shared<BoxFuture<'static, ()>>;

/// A controllable, cancellable, idempotent collection activity.
///
/// Construct one with [`Pipeline::new`] (or the mode constructors in
/// [`collect`](crate::collect)), drive it with [`run`](Self::run), end it with
/// [`stop`](Self::stop) or by cancelling the run token, and always
/// [`dispose`](Self::dispose) it when done, typically in the caller's
/// teardown path.
pub struct Pipeline {
    core: Arc<Core>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

struct Core {
    stages: Box<dyn PipelineStages>,
    /// Cancelled by `dispose` to unblock any suspended run or stop.
    dispose_token: CancellationToken,
    /// The state register. Single lock per pipeline: no two transitions can
    /// interleave, and the cached tasks are read/written under the same lock.
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: PipelineState,
    run_task: Option<SharedTask>,
    stop_task: Option<SharedTask>,
    abort_task: Option<SharedAbort>,
}

impl Pipeline {
    pub fn new<S: PipelineStages>(stages: S) -> Self {
        Self {
            core: Arc::new(Core {
                stages: Box::new(stages),
                dispose_token: CancellationToken::new(),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// The current lifecycle phase.
    pub fn state(&self) -> PipelineState {
        self.core.inner.lock().unwrap().state
    }

    /// Starts the collection, or awaits the already-started one.
    ///
    /// The first call transitions `Unstarted → Running` and begins the run
    /// action under a token linked to both `token` and the pipeline's own
    /// dispose token. Subsequent calls await the same task; a second run is
    /// never started. When the run action completes or fails, the pipeline
    /// transitions to `Stopped`.
    ///
    /// Cancelling `token` (or disposing the pipeline) routes through the
    /// abort action and surfaces [`PipelineError::Aborted`].
    ///
    /// # Errors
    /// [`PipelineError::Disposed`] if the pipeline has been disposed.
    pub async fn run(&self, token: CancellationToken) -> Result<(), PipelineError> {
        let task = {
            let mut inner = self.core.inner.lock().unwrap();
            if inner.state == PipelineState::Disposed {
                return Err(PipelineError::Disposed);
            }
            match &inner.run_task {
                Some(task) => task.clone(),
                None => {
                    let task = Core::run_stage(Arc::clone(&self.core), token).boxed().shared();
                    // Spawn a driver so the run makes progress even if every
                    // caller drops its handle before completion.
                    tokio::spawn(task.clone());
                    inner.run_task = Some(task.clone());
                    task
                }
            }
        };
        task.await
    }

    /// Requests a graceful shutdown, or awaits the already-requested one.
    ///
    /// Transitions `Running → Stopping`, runs the stop action, then reaches
    /// `Stopped`. Idempotent under concurrent callers: the stop action runs
    /// once. After a successful stop, the run task completes with `Ok(())`.
    ///
    /// # Errors
    /// [`PipelineError::InvalidTransition`] if the pipeline was never started
    /// (stopping an unstarted pipeline is caller misuse, not a no-op), and
    /// [`PipelineError::Disposed`] after disposal.
    pub async fn stop(&self, token: CancellationToken) -> Result<(), PipelineError> {
        let task = {
            let mut inner = self.core.inner.lock().unwrap();
            if inner.state == PipelineState::Disposed {
                return Err(PipelineError::Disposed);
            }
            match &inner.stop_task {
                Some(task) => task.clone(),
                None => {
                    let task = Core::stop_stage(Arc::clone(&self.core), token).boxed().shared();
                    tokio::spawn(task.clone());
                    inner.stop_task = Some(task.clone());
                    task
                }
            }
        };
        task.await
    }

    /// Disposes the pipeline. Terminal, idempotent, never fails.
    ///
    /// Cancels the internal token (which unblocks any suspended run or stop),
    /// waits for the outstanding run/stop/abort tasks while discarding their
    /// results, then runs the stage dispose action exactly once.
    pub async fn dispose(&self) {
        let (run_task, stop_task) = {
            let mut inner = self.core.inner.lock().unwrap();
            if inner.state == PipelineState::Disposed {
                return;
            }
            inner.state = PipelineState::Disposed;
            (inner.run_task.clone(), inner.stop_task.clone())
        };
        self.core.dispose_token.cancel();

        // Outstanding activity settles before resources are released.
        // Their errors are discarded: resource release must not fail.
        if let Some(task) = run_task {
            let _ = task.await;
        }
        if let Some(task) = stop_task {
            let _ = task.await;
        }
        let abort_task = self.core.inner.lock().unwrap().abort_task.clone();
        if let Some(task) = abort_task {
            task.await;
        }

        self.core.stages.dispose().await;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // A dropped-but-not-disposed pipeline must not leave its run task
        // blocked forever on the event stream.
        self.core.dispose_token.cancel();
    }
}

impl Core {
    async fn run_stage(core: Arc<Core>, caller: CancellationToken) -> Result<(), PipelineError> {
        let linked = core.dispose_token.child_token();
        core.transition(PipelineState::Running, &[PipelineState::Unstarted])?;

        let mut stage = core.stages.run(linked.clone());
        let result = tokio::select! {
            res = &mut stage => res,
            _ = caller.cancelled() => {
                // Forward the caller's cancellation, then let the stage
                // observe it and unwind.
                linked.cancel();
                stage.await
            }
        };

        // Whatever the outcome, the pipeline is no longer running. The stop
        // path may have won the race to Stopped already; that is fine.
        core.transition_silent(
            PipelineState::Stopped,
            &[PipelineState::Running, PipelineState::Stopping],
        );

        match result {
            Err(PipelineError::Aborted) => {
                core.abort_once().await;
                Err(PipelineError::Aborted)
            }
            other => other,
        }
    }

    async fn stop_stage(core: Arc<Core>, caller: CancellationToken) -> Result<(), PipelineError> {
        let linked = core.dispose_token.child_token();
        core.transition(PipelineState::Stopping, &[PipelineState::Running])?;

        let mut stage = core.stages.stop(linked.clone());
        let result = tokio::select! {
            res = &mut stage => res,
            _ = caller.cancelled() => {
                linked.cancel();
                stage.await
            }
        };

        core.transition_silent(PipelineState::Stopped, &[PipelineState::Stopping]);

        match result {
            Err(PipelineError::Aborted) => {
                core.abort_once().await;
                Err(PipelineError::Aborted)
            }
            other => other,
        }
    }

    /// Runs the stage abort action, at most once per pipeline.
    ///
    /// Cooperative on purpose: overlapping triggers (external cancellation,
    /// disposal, a cancelled stop) all await the same cached task instead of
    /// fighting over a state transition.
    async fn abort_once(self: &Arc<Self>) {
        let task = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.abort_task {
                Some(task) => task.clone(),
                None => {
                    let task = self.stages.abort().shared();
                    inner.abort_task = Some(task.clone());
                    task
                }
            }
        };
        task.await
    }

    /// Moves to `to` if the current state is one of `allowed_from`, otherwise
    /// fails with a pipeline-state error.
    fn transition(&self, to: PipelineState, allowed_from: &[PipelineState]) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if allowed_from.contains(&inner.state) {
            inner.state = to;
            Ok(())
        } else if inner.state == PipelineState::Disposed {
            Err(PipelineError::Disposed)
        } else {
            Err(PipelineError::InvalidTransition {
                from: inner.state,
                to,
            })
        }
    }

    /// Like [`transition`](Self::transition), but losing the race is not an
    /// error. Used where two valid paths (run completion and stop completion)
    /// both lead to `Stopped`.
    fn transition_silent(&self, to: PipelineState, allowed_from: &[PipelineState]) {
        let mut inner = self.inner.lock().unwrap();
        if allowed_from.contains(&inner.state) {
            inner.state = to;
        }
    }
}
