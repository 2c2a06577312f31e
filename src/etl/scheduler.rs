//! Bounded concurrent extraction
//!
//! One task per source entity, at most `concurrency` of them in flight. Each task
//! extracts under its own timeout, transforms, and enqueues onto the entity's
//! lane. Failed or timed-out extractions are logged and dropped.

use super::{Extractor, LaneRouter, Transformer, partition};
use crate::model::{NormalizedRecord, SourceEntity};
use eyre::{Result, WrapErr};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// How one extraction task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Enqueued,
    Failed,
    TimedOut,
    LaneClosed,
}

/// Totals for the extraction phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub sources: usize,
    pub enqueued: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Records dropped because the lane worker was already gone
    pub undeliverable: usize,
}

impl ExtractReport {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Enqueued => self.enqueued += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::LaneClosed => self.undeliverable += 1,
        }
    }
}

/// Admission-controlled fan-out over the source list
#[derive(Debug, Clone)]
pub struct ExtractScheduler {
    concurrency: usize,
    timeout: Duration,
}

impl ExtractScheduler {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency,
            timeout,
        }
    }

    /// Extract every source, then close all lane queues
    ///
    /// Returns only after every task has finished. The router is consumed so the
    /// queues close exactly once, after the last task has dropped its sender.
    pub async fn run<E, T>(
        &self,
        sources: Vec<SourceEntity>,
        extractor: Arc<E>,
        transformer: Arc<T>,
        router: LaneRouter,
    ) -> Result<ExtractReport>
    where
        E: Extractor + 'static,
        E::Item: 'static,
        T: Transformer<Input = E::Item, Output = NormalizedRecord> + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut report = ExtractReport {
            sources: sources.len(),
            ..ExtractReport::default()
        };

        log::info!(
            "[Extract] Starting {} sources with at most {} in flight",
            sources.len().cyan(),
            self.concurrency.cyan()
        );

        for (position, entity) in sources.into_iter().enumerate() {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .wrap_err("Extraction permit pool closed")?;

            let lane = partition::lane_for(position, router.lanes());
            let sender = router.sender(lane);
            let extractor = Arc::clone(&extractor);
            let transformer = Arc::clone(&transformer);
            let timeout = self.timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let raw = match tokio::time::timeout(timeout, extractor.extract(&entity)).await {
                    Ok(Ok(raw)) => raw,
                    Ok(Err(e)) => {
                        log::warn!("[Extract] Failed for {}: {:#}", entity.name, e);
                        return Outcome::Failed;
                    }
                    Err(_) => {
                        log::warn!(
                            "[Extract] Timed out for {} after {:?}",
                            entity.name,
                            timeout
                        );
                        return Outcome::TimedOut;
                    }
                };

                let record = transformer.transform(raw);
                match sender.send(record).await {
                    Ok(()) => Outcome::Enqueued,
                    Err(_) => {
                        log::error!("[Extract] Lane {} closed, dropping {}", lane, entity.name);
                        Outcome::LaneClosed
                    }
                }
            });

            while let Some(finished) = tasks.try_join_next() {
                report.tally(finished.wrap_err("Extraction task panicked")?);
            }
        }

        while let Some(finished) = tasks.join_next().await {
            report.tally(finished.wrap_err("Extraction task panicked")?);
        }

        router.close();

        log::info!(
            "[Extract] Done: {} enqueued, {} failed, {} timed out",
            report.enqueued.green(),
            report.failed.red(),
            report.timed_out.yellow()
        );
        Ok(report)
    }
}
