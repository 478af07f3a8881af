//! Recurring update loop with start/stop control.
//!
//! The loop wakes every `tick`, re-reads the interval (in ticks) and runs an
//! update cycle once that many ticks have passed since the previous cycle. The
//! first tick always runs. A stop request is honoured between cycles only; a
//! cycle that has started always runs to completion.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{error, info, warn};

use crate::farm::{FarmError, RunSummary};

pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Snapshot of the loop state.
#[derive(Clone, Debug, Default)]
pub struct LoopStatus {
    pub running: bool,
    /// Outcome of the most recent cycle; errors are kept as their message.
    pub last_result: Option<Result<RunSummary, String>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

pub struct UpdateLoop<C, I> {
    tick: Duration,
    interval_ticks: I,
    cycle: C,
}

impl<C, Fut, I> UpdateLoop<C, I>
where
    C: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<RunSummary, FarmError>> + Send + 'static,
    I: Fn() -> u64 + Send + 'static,
{
    /// `interval_ticks` is consulted at every tick, so edits to its source
    /// take effect without a restart.
    pub fn new(tick: Duration, interval_ticks: I, cycle: C) -> Self {
        Self {
            tick,
            interval_ticks,
            cycle,
        }
    }

    /// Runs until `cancel` turns true (or its sender is dropped).
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>, status: Arc<Mutex<LoopStatus>>) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks_since_run: Option<u64> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *cancel.borrow() {
                break;
            }

            let every = (self.interval_ticks)().max(1);
            let due = match ticks_since_run.as_mut() {
                None => true,
                Some(n) => {
                    *n += 1;
                    *n >= every
                }
            };
            if !due {
                continue;
            }

            info!(every_ticks = every, "starting update cycle");
            let outcome = (self.cycle)().await;
            match &outcome {
                Ok(summary) => info!(
                    rows = summary.rows,
                    succeeded = summary.success_count,
                    failed = summary.failed_symbols.len(),
                    "update cycle finished"
                ),
                Err(err) => error!(%err, "update cycle failed"),
            }
            {
                let mut s = lock(&status);
                s.last_result = Some(outcome.map_err(|e| e.to_string()));
                s.last_run_at = Some(Utc::now());
            }
            ticks_since_run = Some(0);
        }

        lock(&status).running = false;
        info!("update loop stopped");
    }
}

fn lock(status: &Mutex<LoopStatus>) -> MutexGuard<'_, LoopStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns at most one running [`UpdateLoop`].
#[derive(Default)]
pub struct UpdateLoopController {
    status: Arc<Mutex<LoopStatus>>,
    active: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl UpdateLoopController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the loop. Returns `false` when one is already running.
    pub fn start<C, Fut, I>(&mut self, update_loop: UpdateLoop<C, I>) -> bool
    where
        C: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RunSummary, FarmError>> + Send + 'static,
        I: Fn() -> u64 + Send + 'static,
    {
        if self.is_running() {
            warn!("update loop already running");
            return false;
        }
        let (tx, rx) = watch::channel(false);
        lock(&self.status).running = true;
        let status = Arc::clone(&self.status);
        let handle = tokio::spawn(update_loop.run(rx, status));
        self.active = Some((tx, handle));
        true
    }

    /// Signals the loop and waits for the in-flight cycle to finish. Returns
    /// `false` when nothing was running.
    pub async fn stop(&mut self) -> bool {
        let Some((tx, handle)) = self.active.take() else {
            return false;
        };
        let _ = tx.send(true);
        if let Err(err) = handle.await {
            warn!(%err, "update loop task ended abnormally");
            lock(&self.status).running = false;
        }
        true
    }

    pub fn status(&self) -> LoopStatus {
        lock(&self.status).clone()
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}
