//! Periodic re-evaluation.
//!
//! The scheduler task owns the [`SyncCoordinator`] and runs every evaluation
//! inline, so evaluations are strictly serial. An evaluation runs on:
//! - the interval tick (first tick one period after spawn; missed ticks skipped)
//! - a [`ControlEvent::StandDown`] from the sync server
//!
//! The initial selection already ran in [`SyncCoordinator::start`].

use std::time::Duration;

use mastersync_runtime::Prober;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::driver::ControlEvent;
use crate::sync::{Evaluation, SyncCoordinator, TransportDriver};

/// Handle to a running scheduler.
pub struct SchedulerHandle<P, D> {
    stop: watch::Sender<bool>,
    task: JoinHandle<SyncCoordinator<P, D>>,
}

impl<P, D> SchedulerHandle<P, D> {
    /// Stops the scheduler after the evaluation in progress, if any.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Waits for the scheduler to stop and returns the coordinator.
    ///
    /// Returns `None` if the scheduler task panicked.
    pub async fn join(self) -> Option<SyncCoordinator<P, D>> {
        self.task.await.ok()
    }
}

/// Spawns the scheduler task.
pub fn spawn<P, D>(
    coordinator: SyncCoordinator<P, D>,
    period: Duration,
    control: mpsc::Receiver<ControlEvent>,
) -> SchedulerHandle<P, D>
where
    P: Prober + 'static,
    D: TransportDriver + 'static,
{
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(coordinator, period, control, stop_rx));
    SchedulerHandle { stop, task }
}

async fn run<P, D>(
    mut coordinator: SyncCoordinator<P, D>,
    period: Duration,
    mut control: mpsc::Receiver<ControlEvent>,
    mut stop: watch::Receiver<bool>,
) -> SyncCoordinator<P, D>
where
    P: Prober,
    D: TransportDriver,
{
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "Sync scheduler started");

    loop {
        tokio::select! {
            () = async { let _ = stop.wait_for(|stopped| *stopped).await; } => break,

            _ = ticks.tick() => {
                report(coordinator.evaluate().await);
            }

            Some(event) = control.recv() => match event {
                ControlEvent::StandDown { primary } => {
                    info!(primary = %primary, "Re-evaluating after stand-down notice");
                    report(coordinator.evaluate().await);
                }
            },
        }
    }

    debug!("Sync scheduler stopped");
    coordinator
}

fn report(evaluation: Evaluation) {
    match evaluation {
        Evaluation::Unchanged { best } => debug!(best = %best, "Sync has not changed"),
        Evaluation::Switched { from, to, notified } => info!(
            from = ?from.as_ref().map(mastersync_core::Address::as_str),
            to = %to,
            notified = notified.len(),
            "Sync switched primary"
        ),
    }
}
