use crate::config::EngineConfig;
use crate::engine::executor::{self, TaskFailure, TaskOutcome};
use crate::engine::report::RunReport;
use crate::engine::state::RunState;
use crate::engine::{EngineError, ShutdownTrigger};
use crate::task::FailureReason;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// The control loop driving one run to completion.
///
/// Event-driven on task completion, with a fixed fallback tick so retry
/// backoff gates are re-checked even when nothing completes. All mutation
/// of the run state happens here, under one lock, so two scheduling passes
/// can neither double-dispatch a task nor over-subscribe a category.
pub(crate) async fn run_loop(
    state: Arc<Mutex<RunState>>,
    config: EngineConfig,
    shutdown: ShutdownTrigger,
) -> Result<RunReport, EngineError> {
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<TaskOutcome>(64);
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        if shutdown.is_requested() {
            let mut st = state.lock().await;
            if !st.shutdown_requested {
                st.shutdown_requested = true;
                info!("graceful shutdown: no new dispatches, draining running tasks");
            }
        }

        dispatch_pass(&state, &config, &outcome_tx).await?;

        {
            let mut st = state.lock().await;
            if st.shutdown_requested {
                if !st.has_running() {
                    st.cancel_pending();
                    return Ok(st.build_report());
                }
            } else if st.is_finished() {
                return Ok(st.build_report());
            }
        }

        tokio::select! {
            outcome = outcome_rx.recv() => {
                if let Some(outcome) = outcome {
                    handle_outcome(&state, &config, outcome).await;
                    // Drain whatever else finished while we held the lock,
                    // so one pass sees every completion signal.
                    while let Ok(extra) = outcome_rx.try_recv() {
                        handle_outcome(&state, &config, extra).await;
                    }
                }
            }
            _ = ticker.tick() => {}
            _ = shutdown.notified() => {}
        }
    }
}

/// Dispatch every ready-and-assignable task, highest priority first.
///
/// A pass that dispatches nothing while the queue is non-empty and nothing
/// is running must be explained: either failed dependencies (cascade the
/// block) or a pending retry backoff. Anything else is a deadlock and
/// aborts the run rather than spinning forever.
async fn dispatch_pass(
    state: &Arc<Mutex<RunState>>,
    config: &EngineConfig,
    outcomes: &mpsc::Sender<TaskOutcome>,
) -> Result<(), EngineError> {
    let now = Instant::now();
    let mut dispatches = Vec::new();

    {
        let mut st = state.lock().await;
        if st.shutdown_requested {
            return Ok(());
        }

        while let Some(id) = st.next_ready(now) {
            if let Some(dispatch) = st.dispatch(&id, config) {
                dispatches.push(dispatch);
            }
        }

        if dispatches.is_empty() && !st.has_running() && !st.queue_is_empty() {
            let cascaded = st.cascade_failures();
            for (blocked, dep) in &cascaded {
                warn!(task = %blocked, "blocked by failed dependency {dep}");
            }
            if cascaded.is_empty() && !st.has_backoff_waiters(now) {
                let stuck = st.queued_ids();
                error!(
                    "deadlock: {} queued task(s) can never become ready",
                    stuck.len()
                );
                return Err(EngineError::Deadlock { stuck });
            }
        }
    }

    for dispatch in dispatches {
        info!(
            task = %dispatch.id,
            category = %dispatch.category,
            attempt = dispatch.attempt,
            "dispatching task"
        );
        executor::spawn(dispatch, outcomes.clone());
    }
    Ok(())
}

/// Apply one attempt's outcome: complete, retry, or fail terminally.
async fn handle_outcome(
    state: &Arc<Mutex<RunState>>,
    config: &EngineConfig,
    outcome: TaskOutcome,
) {
    let mut st = state.lock().await;
    st.release_slot(&outcome.id);

    match outcome.result {
        Ok(action_outcome) => {
            debug!(task = %outcome.id, "task completed");
            st.complete(&outcome.id, outcome.finished_at, action_outcome.log);
        }
        Err(failure) => {
            let reason = failure_reason(&failure);
            if st.retry_allowed(&outcome.id, config.default_max_attempts) {
                let attempt = st.attempts(&outcome.id);
                let delay = retry_delay(config, attempt);
                warn!(
                    task = %outcome.id,
                    attempt,
                    "attempt failed ({reason}); retrying in {delay:?}"
                );
                st.schedule_retry(&outcome.id, Instant::now() + delay);
            } else {
                error!(task = %outcome.id, "task failed terminally: {reason}");
                st.fail_terminal(&outcome.id, reason, Some(outcome.finished_at));
                for (blocked, dep) in st.cascade_failures() {
                    warn!(task = %blocked, "blocked by failed dependency {dep}");
                }
            }
        }
    }
}

fn failure_reason(failure: &TaskFailure) -> FailureReason {
    match failure {
        TaskFailure::Action(error) => FailureReason::ActionFailed(error.to_string()),
        TaskFailure::TimedOut(timeout) => FailureReason::TimedOut {
            seconds: timeout.as_secs(),
        },
        TaskFailure::Panicked(message) => FailureReason::Panicked(message.clone()),
    }
}

/// Linear backoff scaled by attempt count, with a little jitter so
/// same-tick retries don't land on the same instant.
fn retry_delay(config: &EngineConfig, attempts: u32) -> Duration {
    let base = config
        .retry_backoff()
        .saturating_mul(attempts.max(1));
    base + Duration::from_millis(rand::rng().random_range(0..=250))
}
