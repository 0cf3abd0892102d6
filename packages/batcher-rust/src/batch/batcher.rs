//! The batching engine: intake, size/age triggers and dispatch to the commit.
//!
//! Submitters hand operations to a single run loop over a bounded mpsc
//! channel. The run loop is the only writer of the live group and its timer,
//! so the group needs no lock. Commits run inline in the run loop: at most
//! one commit is in flight per batcher, and groups are committed in the
//! order their triggers fired.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use opbatch_core::{BatchError, Commit, Context, Operation, Operations};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::BatcherConfig;
use super::state::{BatcherState, StateCell};

/// Why a group was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Size,
    Age,
    Shutdown,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Age => "age",
            Self::Shutdown => "shutdown",
        }
    }
}

struct Shared<T, R> {
    commit: Arc<dyn Commit<T, R>>,
    config: BatcherConfig,
    tx: mpsc::Sender<Operation<T, R>>,
    // Taken by the first `run`; `None` afterwards.
    rx: Mutex<Option<mpsc::Receiver<Operation<T, R>>>>,
    state: StateCell,
}

/// Accumulates submitted operations and flushes them in groups to a
/// [`Commit`].
///
/// Cloning is cheap and every clone drives the same engine. The engine does
/// nothing until [`Batcher::run`] (or [`Batcher::spawn`]) is driving it;
/// submissions made before that are buffered up to
/// [`BatcherConfig::queue_capacity`].
pub struct Batcher<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for Batcher<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> Batcher<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Creates a batcher that flushes into `commit`.
    #[must_use]
    pub fn new<C>(commit: C, config: BatcherConfig) -> Self
    where
        C: Commit<T, R>,
    {
        let (tx, rx) = mpsc::channel(config.intake_capacity());
        Self {
            shared: Arc::new(Shared {
                commit: Arc::new(commit),
                config,
                tx,
                rx: Mutex::new(Some(rx)),
                state: StateCell::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    /// Current run-loop state.
    #[must_use]
    pub fn state(&self) -> BatcherState {
        self.shared.state.get()
    }

    /// True once the run loop has stopped accepting operations.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.tx.is_closed()
    }

    /// Hands `value` to the run loop and returns its operation handle.
    ///
    /// Returns as soon as the run loop's intake has accepted the operation;
    /// it never waits for the commit. Use [`Operation::wait`] for the result.
    ///
    /// # Errors
    ///
    /// - `BatchError::Closed` if the run loop has terminated.
    /// - The context's error if `ctx` ends before the hand-off completes.
    pub async fn submit(&self, ctx: &Context, value: T) -> Result<Operation<T, R>, BatchError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let permit = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            permit = self.shared.tx.reserve() => permit.map_err(|_| BatchError::Closed)?,
        };

        let op = Operation::new(value);
        permit.send(op.clone());
        Ok(op)
    }

    /// Drives the engine until `ctx` ends.
    ///
    /// On cancellation the intake is closed, operations still queued are
    /// drained, and everything pending is force-flushed through the commit
    /// with the ended context. Members the commit leaves unresolved at that
    /// point are resolved with the context's error, so no waiter is left
    /// behind by shutdown.
    ///
    /// The returned future must be driven to completion. Dropping it early
    /// (aborting the spawned task, or losing a `select!`) drops the intake
    /// and the live group with their members unresolved, and the state never
    /// reaches `Stopped`.
    ///
    /// # Errors
    ///
    /// Always returns an error: the context's error once shutdown flushing
    /// has completed, or `BatchError::NotRestartable` if the run loop was
    /// already started.
    pub async fn run(&self, ctx: &Context) -> Result<(), BatchError> {
        let rx = self
            .shared
            .rx
            .lock()
            .take()
            .ok_or(BatchError::NotRestartable)?;

        let config = &self.shared.config;
        info!(
            max_size = config.max_size,
            max_age_ms = u64::try_from(config.max_age.as_millis()).unwrap_or(u64::MAX),
            queue_capacity = config.queue_capacity,
            "batcher run loop started"
        );

        let run_loop = RunLoop {
            shared: &self.shared,
            rx,
            group: Operations::new(),
            deadline: None,
        };
        let err = run_loop.run(ctx).await;

        info!(reason = %err, "batcher run loop stopped");
        Err(err)
    }

    /// Spawns [`Batcher::run`] onto the current tokio runtime.
    pub fn spawn(&self, ctx: Context) -> JoinHandle<Result<(), BatchError>> {
        let batcher = self.clone();
        tokio::spawn(async move { batcher.run(&ctx).await })
    }
}

impl<T, R> Shared<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Invokes the commit for one frozen group.
    ///
    /// A panicking commit cannot resolve anything further, so the members it
    /// left unresolved are resolved with `CommitPanicked`.
    async fn dispatch(&self, ctx: &Context, ops: &mut Operations<T, R>, trigger: Trigger) {
        debug!(trigger = trigger.as_str(), size = ops.len(), "flushing group");

        let committed = AssertUnwindSafe(self.commit.commit(ctx, ops))
            .catch_unwind()
            .await;

        if committed.is_err() {
            let resolved = ops.resolve_remaining(&BatchError::CommitPanicked);
            error!(
                trigger = trigger.as_str(),
                resolved, "commit panicked, remaining operations resolved with an error"
            );
        }
    }
}

/// State owned exclusively by one invocation of the run loop.
struct RunLoop<'a, T, R> {
    shared: &'a Shared<T, R>,
    rx: mpsc::Receiver<Operation<T, R>>,
    group: Operations<T, R>,
    // Armed when the first member of a group arrives and `max_age > 0`.
    deadline: Option<Instant>,
}

impl<T, R> RunLoop<'_, T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn run(mut self, ctx: &Context) -> BatchError {
        let reason = loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                err = ctx.done() => break err,
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush(ctx, Trigger::Age).await;
                }
                op = self.rx.recv() => match op {
                    Some(op) => self.accept(ctx, op).await,
                    // `Shared` holds a sender for as long as this loop runs.
                    None => break BatchError::Closed,
                },
            }
        };

        self.shutdown(ctx, &reason).await;
        reason
    }

    async fn accept(&mut self, ctx: &Context, op: Operation<T, R>) {
        if self.group.is_empty() {
            self.shared.state.set(BatcherState::Accumulating);
            // An age past the end of representable time never fires.
            self.deadline = self
                .shared
                .config
                .age_trigger()
                .and_then(|max_age| Instant::now().checked_add(max_age));
        }

        self.group.push(op);

        if let Some(max_size) = self.shared.config.size_trigger() {
            if self.group.len() >= max_size {
                self.flush(ctx, Trigger::Size).await;
            }
        }
    }

    async fn flush(&mut self, ctx: &Context, trigger: Trigger) {
        self.deadline = None;
        let mut ops = std::mem::take(&mut self.group);
        if ops.is_empty() {
            self.shared.state.set(BatcherState::Idle);
            return;
        }

        self.shared.state.set(BatcherState::Flushing);
        self.shared.dispatch(ctx, &mut ops, trigger).await;

        let unresolved = ops.unresolved_count();
        if unresolved > 0 {
            warn!(
                trigger = trigger.as_str(),
                size = ops.len(),
                unresolved,
                "commit returned without resolving every operation"
            );
        }

        self.shared.state.set(BatcherState::Idle);
    }

    async fn shutdown(mut self, ctx: &Context, reason: &BatchError) {
        self.deadline = None;

        // Closing first makes late submitters fail with `Closed`; `recv` then
        // yields everything already queued (including outstanding permits)
        // before returning `None`.
        self.rx.close();
        while let Some(op) = self.rx.recv().await {
            self.group.push(op);
        }

        let mut pending = std::mem::take(&mut self.group);
        if !pending.is_empty() {
            self.shared.state.set(BatcherState::Flushing);
        }

        let chunk = self
            .shared
            .config
            .size_trigger()
            .unwrap_or_else(|| pending.len());
        while !pending.is_empty() {
            let rest = pending.split_off(chunk);
            self.shared
                .dispatch(ctx, &mut pending, Trigger::Shutdown)
                .await;

            let forced = pending.resolve_remaining(reason);
            if forced > 0 {
                debug!(forced, "resolved operations left pending at shutdown");
            }
            pending = rest;
        }

        self.shared.state.set(BatcherState::Stopped);
    }
}
