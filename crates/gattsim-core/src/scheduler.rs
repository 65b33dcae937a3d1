//! Periodic jobs feeding the peripheral's command queue.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::runtime::{Command, PeripheralHandle};

/// What a scheduler pushes on every period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledJob {
    /// Value regeneration and notification fan-out.
    Tick,
    /// Advertising data refresh.
    RefreshAdvertising,
}

impl ScheduledJob {
    fn command(self) -> Command {
        match self {
            Self::Tick => Command::Tick,
            Self::RefreshAdvertising => Command::RefreshAdvertising,
        }
    }
}

/// A self-rescheduling timer that queues one command per period.
///
/// The first command is queued one period after spawning. Missed periods are
/// not replayed.
#[derive(Debug)]
pub struct PeriodicUpdateScheduler {
    job: ScheduledJob,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PeriodicUpdateScheduler {
    /// Spawns the timer on the current runtime.
    #[must_use]
    pub fn spawn(job: ScheduledJob, period: Duration, handle: PeripheralHandle) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(Self::run(job, period, handle, token.clone()));
        info!(?job, period_ms = period.as_millis(), "scheduler started");
        Self { job, token, task }
    }

    async fn run(
        job: ScheduledJob,
        period: Duration,
        handle: PeripheralHandle,
        token: CancellationToken,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = token.cancelled() => break,
                sent = handle.send(job.command()) => {
                    if sent.is_err() {
                        debug!(?job, "peripheral stopped, scheduler exiting");
                        break;
                    }
                }
            }
        }
    }

    /// Which job this scheduler runs.
    #[must_use]
    pub const fn job(&self) -> ScheduledJob {
        self.job
    }

    /// Whether the timer task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancels the timer and waits for its task to end. No command is queued
    /// after this returns.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            debug!(job = ?self.job, error = %e, "scheduler task ended abnormally");
        }
        info!(job = ?self.job, "scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{self, Command};
    use tokio::sync::{broadcast, mpsc};

    fn queue() -> (PeripheralHandle, mpsc::Receiver<Command>) {
        let (events, _) = broadcast::channel(4);
        runtime::channel(16, events)
    }

    fn drain(rx: &mut mpsc::Receiver<Command>) -> Vec<Command> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_queues_one_command_per_period() {
        let (handle, mut rx) = queue();
        let scheduler =
            PeriodicUpdateScheduler::spawn(ScheduledJob::Tick, Duration::from_millis(500), handle);

        tokio::time::sleep(Duration::from_millis(1250)).await;
        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|c| matches!(c, Command::Tick)));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_commands() {
        let (handle, mut rx) = queue();
        let scheduler = PeriodicUpdateScheduler::spawn(
            ScheduledJob::RefreshAdvertising,
            Duration::from_millis(500),
            handle,
        );
        assert_eq!(scheduler.job(), ScheduledJob::RefreshAdvertising);

        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.shutdown().await;
        let before = drain(&mut rx).len();
        assert_eq!(before, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_peripheral_stops() {
        let (handle, rx) = queue();
        let scheduler =
            PeriodicUpdateScheduler::spawn(ScheduledJob::Tick, Duration::from_millis(100), handle);
        drop(rx);

        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert!(!scheduler.is_running());
    }
}
