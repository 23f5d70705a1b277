use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Local;
use cron::Schedule;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::sync::Synchronizer;

/// Parses a cron expression. Classic five-field expressions (`0 0 * * *`)
/// are accepted and run at second zero.
pub fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).with_context(|| format!("invalid cron expression '{expr}'"))
}

/// Fires catalog sync cycles on a cron schedule in server-local time.
pub struct SyncScheduler {
    schedule: Schedule,
    synchronizer: Arc<Synchronizer>,
}

impl SyncScheduler {
    pub fn new(schedule: Schedule, synchronizer: Arc<Synchronizer>) -> Self {
        Self { schedule, synchronizer }
    }

    /// Spawns the timer loop. Each tick runs its cycle on its own task, so a
    /// slow cycle never delays the timer; a tick that lands on a running
    /// cycle is turned away by the synchronizer. The loop exits once
    /// `shutdown` flips or its sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(schedule = %self.schedule, "sync scheduler started");

            loop {
                let Some(next) = self.schedule.upcoming(Local).next() else {
                    warn!("sync schedule has no upcoming fire times, scheduler stopping");
                    break;
                };
                let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
                debug!(next = %next, wait_secs = wait.as_secs(), "next catalog sync scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {},
                    _ = shutdown.changed() => {
                        info!("sync scheduler stopping");
                        break;
                    },
                }

                let synchronizer = Arc::clone(&self.synchronizer);
                tokio::spawn(async move {
                    // Outcomes are logged by the synchronizer itself.
                    let _ = synchronizer.run_cycle().await;
                });
            }
        })
    }
}
