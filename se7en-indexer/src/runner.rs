//! Background Runner
//!
//! Drives ingestion and reconciliation on independent timers. Each task
//! runs its ticks one at a time: a slow tick delays the next one instead
//! of overlapping it. Shutdown is observed between ticks, so a tick in
//! flight always runs to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::reconciler::CycleReconciler;
use crate::subscriber::EventSubscriber;

/// Background runner
pub struct BackgroundRunner {
    subscriber: Option<(Arc<EventSubscriber>, Duration)>,
    reconciler: Option<(Arc<CycleReconciler>, Duration)>,
}

impl Default for BackgroundRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self {
            subscriber: None,
            reconciler: None,
        }
    }

    /// Schedule ingestion ticks
    pub fn with_subscriber(mut self, subscriber: Arc<EventSubscriber>, every: Duration) -> Self {
        self.subscriber = Some((subscriber, every));
        self
    }

    /// Schedule reconciliation passes
    pub fn with_reconciler(mut self, reconciler: Arc<CycleReconciler>, every: Duration) -> Self {
        self.reconciler = Some((reconciler, every));
        self
    }

    /// Spawn the scheduled tasks
    pub fn start(self) -> RunnerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = Arc::new(RwLock::new(true));
        let mut tasks = Vec::new();

        if let Some((subscriber, every)) = self.subscriber {
            tasks.push(spawn_task(
                "ingest",
                every,
                running.clone(),
                shutdown_rx.clone(),
                move || {
                    let subscriber = subscriber.clone();
                    async move {
                        // Errors are logged and audited by the tick itself
                        let _ = subscriber.tick().await;
                    }
                },
            ));
        }

        if let Some((reconciler, every)) = self.reconciler {
            tasks.push(spawn_task(
                "reconcile",
                every,
                running.clone(),
                shutdown_rx.clone(),
                move || {
                    let reconciler = reconciler.clone();
                    async move {
                        if let Err(e) = reconciler.run_pass().await {
                            error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                },
            ));
        }

        info!(tasks = tasks.len(), "Background runner started");
        RunnerHandle {
            shutdown_tx,
            running,
            tasks,
        }
    }
}

fn spawn_task<F, Fut>(
    name: &'static str,
    every: Duration,
    running: Arc<RwLock<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!(task = name, "Received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    if *running.read().await {
                        job().await;
                    }
                }
            }
        }

        info!(task = name, "Task stopped");
    })
}

/// Handle to the running tasks
pub struct RunnerHandle {
    shutdown_tx: watch::Sender<bool>,
    running: Arc<RwLock<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stop all tasks and wait for them to finish their current tick
    pub async fn stop(self) {
        *self.running.write().await = false;
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task panicked");
            }
        }
    }

    /// Skip ticks until resumed
    pub async fn pause(&self) {
        *self.running.write().await = false;
    }

    pub async fn resume(&self) {
        *self.running.write().await = true;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Number of spawned tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runner_handle() {
        let handle = BackgroundRunner::new().start();
        assert_eq!(handle.task_count(), 0);
        assert!(handle.is_running().await);

        handle.pause().await;
        assert!(!handle.is_running().await);

        handle.resume().await;
        assert!(handle.is_running().await);

        handle.stop().await;
    }
}
