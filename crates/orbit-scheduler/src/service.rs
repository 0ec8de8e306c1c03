use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orbit_core::SchedulerConfig;
use orbit_store::Store;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::backend::{RunGenerator, RunInserter, StoreBackend};
use crate::error::{Result, SchedulerError};
use crate::materializer::{MaterializeReport, Materializer, MaterializerSettings};

/// Periodic host for the [`Materializer`].
///
/// At most one pass is in flight: the loop awaits each pass before taking
/// the next tick, and a pass that overruns the interval simply delays the
/// following one.
pub struct SchedulerService<G = StoreBackend, I = StoreBackend> {
    store: Arc<Store>,
    materializer: Arc<Materializer<G, I>>,
    interval: Duration,
}

impl SchedulerService {
    pub fn new(store: Arc<Store>, config: &SchedulerConfig) -> Self {
        Self::with_materializer(
            store,
            Materializer::new(MaterializerSettings::from_config(config)),
            config.loop_interval(),
        )
    }
}

impl<G, I> SchedulerService<G, I>
where
    G: RunGenerator + Send + Sync + 'static,
    I: RunInserter + Send + Sync + 'static,
{
    pub fn with_materializer(
        store: Arc<Store>,
        materializer: Materializer<G, I>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            materializer: Arc::new(materializer),
            interval,
        }
    }

    /// Run one pass on the blocking pool.
    pub async fn run_pass(&self, cancel: Arc<AtomicBool>) -> Result<MaterializeReport> {
        let store = Arc::clone(&self.store);
        let materializer = Arc::clone(&self.materializer);
        tokio::task::spawn_blocking(move || {
            let mut conn = store.lock()?;
            materializer.run_once(&mut conn, &cancel)
        })
        .await
        .map_err(|e| SchedulerError::Join(e.to_string()))?
    }

    /// Main loop. Runs a pass immediately, then every `interval`, until
    /// `shutdown` broadcasts `true` or its sender goes away. A pass in
    /// progress at shutdown is abandoned and rolled back.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let settings = self.materializer.settings();
        info!(
            interval_secs = self.interval.as_secs_f64(),
            deployment_batch_size = settings.deployment_batch_size,
            max_runs = settings.max_runs,
            insert_batch_size = settings.insert_batch_size,
            "scheduler service started"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let watcher = {
            let cancel = Arc::clone(&cancel);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                cancel.store(true, Ordering::SeqCst);
            })
        };

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_pass(Arc::clone(&cancel)).await {
                        Ok(report) => debug!(?report, "scheduling pass complete"),
                        Err(SchedulerError::Cancelled) => {
                            info!("scheduling pass cancelled");
                            break;
                        }
                        Err(e) => error!("scheduling pass failed: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        watcher.abort();
        info!("scheduler service shutting down");
    }
}
