//! Periodic ticks, the process-wide single-flight gate, and the per-source
//! worker pool.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use defer_lite::defer;
use log::{debug, error, info};
use stable_eyre::{
    eyre::{eyre, Context},
    Result,
};
use time::{OffsetDateTime, PrimitiveDateTime, Time};
use tokio::{
    select,
    sync::Semaphore,
    task::JoinSet,
    time::{interval, interval_at, Instant, MissedTickBehavior},
};

use crate::{config::Retention, housekeeping, lake::Lake, pipeline::Pipeline, store::Store};

/// Upper bound on concurrently processed data sources.
const WORKER_POOL: usize = 50;

/// Fires the ingestion pipeline on a periodic tick and the housekeeping sweep
/// daily at midnight, with one single-flight gate across both.
pub struct Scheduler<S, L> {
    pipeline: Arc<Pipeline<S, L>>,
    store: Arc<S>,
    processing_root: PathBuf,
    retention: Retention,
    tick: Duration,
    running: Arc<AtomicBool>,
    workers: Arc<Semaphore>,
}

impl<S: Store + 'static, L: Lake + 'static> Scheduler<S, L> {
    /// Create a scheduler firing the ingestion pipeline every `tick`.
    pub fn new(
        pipeline: Arc<Pipeline<S, L>>,
        store: Arc<S>,
        processing_root: PathBuf,
        retention: Retention,
        tick: Duration,
    ) -> Self {
        Self {
            pipeline,
            store,
            processing_root,
            retention,
            tick,
            running: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Semaphore::new(WORKER_POOL)),
        }
    }

    /// Drive both periodic tasks until the process exits.
    pub async fn run(&self) -> Result<()> {
        let mut ingestion = interval(self.tick);
        ingestion.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut housekeeping = interval_at(next_midnight()?, Duration::from_secs(24 * 60 * 60));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "scheduler running: ingestion every {:?}, housekeeping daily at midnight",
            self.tick
        );
        loop {
            select! {
                _ = ingestion.tick() => self.ingestion_tick().await,
                _ = housekeeping.tick() => self.housekeeping_tick().await,
            }
        }
    }

    /// One ingestion tick. Overlapping ticks are dropped, never queued.
    pub async fn ingestion_tick(&self) {
        let Some(_flight) = Flight::acquire(&self.running) else {
            debug!("previous run still in flight, skipping ingestion tick");
            return;
        };

        if let Err(err) = self.ingest_all().await {
            error!("ingestion tick failed: {err:?}");
        }
    }

    /// One housekeeping tick, behind the same gate as ingestion.
    pub async fn housekeeping_tick(&self) {
        let Some(_flight) = Flight::acquire(&self.running) else {
            debug!("previous run still in flight, skipping housekeeping tick");
            return;
        };

        let sweep =
            housekeeping::sweep(self.store.as_ref(), &self.processing_root, self.retention);
        if let Err(err) = sweep.await {
            error!("housekeeping tick failed: {err:?}");
        }
    }

    /// Dispatch one worker per active data source through the pool and wait
    /// for all of them. A failing data source is logged at the worker boundary
    /// and never aborts its siblings.
    async fn ingest_all(&self) -> Result<()> {
        debug!("starting ingestion run");
        defer! { debug!("exited ingestion run"); }

        let sources = self
            .store
            .active_data_sources()
            .await
            .context("load data sources")?;
        debug!("dispatching {} data source(s)", sources.len());

        let mut workers = JoinSet::new();
        for source in sources {
            let permit = Arc::clone(&self.workers)
                .acquire_owned()
                .await
                .context("acquire worker permit")?;
            let pipeline = Arc::clone(&self.pipeline);
            let store = Arc::clone(&self.store);

            workers.spawn(async move {
                let _permit = permit;
                let folders = match store.active_folder_paths(source.id).await {
                    Ok(folders) => folders,
                    Err(err) => {
                        error!("loading folder paths for {} failed: {err:?}", source.name);
                        return;
                    }
                };
                if let Err(err) = pipeline.run(&source, &folders).await {
                    error!("data source {} failed: {err:?}", source.name);
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!("data source worker panicked: {err}");
            }
        }
        Ok(())
    }
}

/// Holding a `Flight` means the process-wide run is ours. Dropping it releases
/// the gate on every exit path, faults included.
struct Flight {
    gate: Arc<AtomicBool>,
}

impl Flight {
    fn acquire(gate: &Arc<AtomicBool>) -> Option<Self> {
        gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| Self {
                gate: Arc::clone(gate),
            })
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

/// The tokio instant of the next UTC midnight.
fn next_midnight() -> Result<Instant> {
    let now = OffsetDateTime::now_utc();
    let tomorrow = now
        .date()
        .next_day()
        .ok_or_else(|| eyre!("calendar overflow"))?;
    let until = PrimitiveDateTime::new(tomorrow, Time::MIDNIGHT).assume_utc() - now;
    let until = Duration::try_from(until).unwrap_or(Duration::from_secs(24 * 60 * 60));
    Ok(Instant::now() + until)
}
