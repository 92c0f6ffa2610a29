//! Worker pool and watchdog.
//!
//! Workers drain the submission queue and drive jobs end-to-end through the
//! orchestrator. The watchdog is the sole cancellation mechanism: it fails
//! jobs that outlive the processing deadline and releases their claims.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

use cityhall_core::domain::job::JobId;

use crate::orchestrator::Orchestrator;

pub fn spawn_workers(
    orchestrator: Arc<Orchestrator>,
    queue_rx: UnboundedReceiver<JobId>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let shared_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

    (0..workers.max(1))
        .map(|index| {
            let orchestrator = Arc::clone(&orchestrator);
            let shared_rx = Arc::clone(&shared_rx);
            let worker_id = format!("worker-{index}");

            tokio::spawn(async move {
                info!(
                    event_name = "worker.started",
                    worker_id = %worker_id,
                    "job worker started"
                );
                loop {
                    let next = { shared_rx.lock().await.recv().await };
                    match next {
                        Some(job_id) => orchestrator.run_job(&job_id, &worker_id).await,
                        None => break,
                    }
                }
                info!(
                    event_name = "worker.stopped",
                    worker_id = %worker_id,
                    "job worker stopped"
                );
            })
        })
        .collect()
}

pub fn spawn_watchdog(orchestrator: Arc<Orchestrator>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            orchestrator.sweep_stale_jobs().await;
        }
    })
}
