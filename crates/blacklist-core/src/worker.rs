//! Background workers that drain lifecycle candidates on a fixed period.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::engine::LifecycleEngine;
use crate::scheduler::{IntervalTask, SchedulerError};
use crate::store::AddressStore;

pub const ARCHIVE_TASK: &str = "archive-addresses";
pub const EXPIRY_TASK: &str = "delete-expired-addresses";

/// Run `step` until it reports no more work or `cancel` fires.
///
/// A step in flight when the token fires is dropped, which rolls back its
/// transaction. Returns the number of steps that reported work.
pub async fn drain<F, Fut>(cancel: &CancellationToken, mut step: F) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut processed = 0;
    loop {
        let did_work = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            did_work = step() => did_work,
        };
        if !did_work {
            break;
        }
        processed += 1;
    }
    processed
}

/// Counts from a single archive pass followed by a single expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub archived: usize,
    pub deleted: usize,
}

pub async fn sweep_once<S: AddressStore>(
    engine: &LifecycleEngine<S>,
    cancel: &CancellationToken,
) -> SweepReport {
    let archived = drain(cancel, || engine.archive_one_candidate()).await;
    let deleted = drain(cancel, || engine.delete_one_expired_candidate()).await;
    SweepReport { archived, deleted }
}

/// The archive and expiry tasks for one engine.
pub struct LifecycleWorkers {
    archive: IntervalTask,
    expiry: IntervalTask,
}

impl LifecycleWorkers {
    pub fn new<S: AddressStore>(engine: Arc<LifecycleEngine<S>>, config: &WorkerConfig) -> Self {
        let archive_engine = Arc::clone(&engine);
        let archive = IntervalTask::new(ARCHIVE_TASK, config.archive_period(), move |cancel| {
            let engine = Arc::clone(&archive_engine);
            async move {
                let archived = drain(&cancel, || engine.archive_one_candidate()).await;
                if archived > 0 {
                    tracing::info!(archived, "archive pass finished");
                }
                Ok(())
            }
        });

        let expiry = IntervalTask::new(EXPIRY_TASK, config.expiry_period(), move |cancel| {
            let engine = Arc::clone(&engine);
            async move {
                let deleted = drain(&cancel, || engine.delete_one_expired_candidate()).await;
                if deleted > 0 {
                    tracing::info!(deleted, "expiry pass finished");
                }
                Ok(())
            }
        });

        Self { archive, expiry }
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        self.archive.start()?;
        self.expiry.start()
    }

    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        let archive = self.archive.stop().await;
        let expiry = self.expiry.stop().await;
        archive.and(expiry)
    }

    pub fn is_running(&self) -> bool {
        self.archive.is_running() && self.expiry.is_running()
    }
}
