use crate::reconcile::{Reconcile, UpdateOutcome};
use duration_string::DurationString;
use log::{debug, info, warn};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread::sleep,
    time::Duration,
};

/// Runs the passes one after another with a fixed delay between them.
///
/// The next pass starts `interval` after the previous one finished, so a slow
/// pass is never overlapped by the next one. The `running` flag is held for
/// the whole pass, a tick arriving while it is held is skipped.
pub struct Scheduler {
    interval: Duration,
    running: AtomicBool,
}

struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Scheduler {
            interval,
            running: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> Option<PassGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PassGuard(&self.running))
    }

    /// Run a single pass, unless another one is still in progress.
    pub fn tick(&self, reconciler: &dyn Reconcile) -> Option<UpdateOutcome> {
        let Some(_guard) = self.acquire() else {
            warn!("The previous update is still running, skipping this check.");
            return None;
        };

        let outcome = reconciler.reconcile();
        match &outcome {
            UpdateOutcome::NoChange { commit } => debug!("No updates, still at {}.", commit.short()),
            UpdateOutcome::Updated { before, after, .. } => {
                debug!("Updated from {} to {}.", before.short(), after.short())
            }
            UpdateOutcome::Failed(err) => debug!("Pass failed at {}.", err.stage()),
        }
        Some(outcome)
    }

    /// Run a pass, then wait the full interval.
    pub fn step(&self, reconciler: &dyn Reconcile) -> Option<UpdateOutcome> {
        let outcome = self.tick(reconciler);
        debug!("Next check in {}.", DurationString::new(self.interval));
        sleep(self.interval);
        outcome
    }

    /// Run the first pass immediately and then keep going forever.
    pub fn run(&self, reconciler: &dyn Reconcile) {
        info!(
            "Starting schedule in every {}.",
            DurationString::new(self.interval)
        );

        loop {
            self.step(reconciler);
        }
    }
}
