//! Fixed-size worker pool fanning a symbol universe out to [`HarvestWorker`]s.
//!
//! Workers are built once, up front, each with its own provider client and
//! cache connection. A run hands every worker a clone of a shared job queue;
//! results come back over a channel in completion order.

use std::{
    collections::VecDeque,
    error::Error as StdError,
    future::Future,
    num::NonZeroUsize,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures::{FutureExt, Stream, StreamExt, future::try_join_all};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    harvest::{HarvestJob, HarvestWorker},
    models::harvest::{FailureReason, HarvestResult},
};

const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to initialize worker {index}: {source}")]
    Init {
        index: usize,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Worker count used when none is configured: the host's parallelism.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

pub struct WorkerPool {
    workers: Vec<Arc<HarvestWorker>>,
}

impl WorkerPool {
    /// Builds `worker_count` workers (at least one) concurrently. The first
    /// initialization failure aborts the whole pool.
    pub async fn initialize<F, Fut, E>(worker_count: usize, mut init: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<HarvestWorker, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let count = worker_count.max(1);
        let pending = (0..count).map(|index| {
            let built = init(index);
            async move {
                built.await.map_err(|e| PoolError::Init {
                    index,
                    source: e.into(),
                })
            }
        });
        let workers = try_join_all(pending)
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();
        info!(workers = count, "worker pool ready");
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Dispatches `symbols` over the pool. Every symbol yields exactly one
    /// result on the returned stream, including symbols whose worker panicked.
    pub fn run(&self, symbols: Vec<String>, job: Arc<HarvestJob>) -> HarvestStream {
        let total = symbols.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(symbols)));
        let (tx, rx) = mpsc::unbounded_channel();

        let handles = self
            .workers
            .iter()
            .take(total.max(1))
            .map(|worker| {
                let worker = Arc::clone(worker);
                let queue = Arc::clone(&queue);
                let job = Arc::clone(&job);
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(symbol) = next_symbol(&queue) {
                        let result = AssertUnwindSafe(worker.harvest(&symbol, &job))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|payload| {
                                let message = panic_message(payload.as_ref());
                                warn!(worker = worker.id(), symbol = %symbol, message = %message, "worker panicked");
                                HarvestResult::failure(
                                    symbol.clone(),
                                    FailureReason::Panicked(message),
                                )
                            });
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        HarvestStream {
            rx,
            total,
            started: Instant::now(),
            handles,
        }
    }
}

fn next_symbol(queue: &Mutex<VecDeque<String>>) -> Option<String> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Harvest results in completion order.
pub struct HarvestStream {
    rx: mpsc::UnboundedReceiver<HarvestResult>,
    total: usize,
    started: Instant,
    handles: Vec<JoinHandle<()>>,
}

impl HarvestStream {
    /// Number of symbols submitted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Drains the stream, logging progress every ten completions.
    pub async fn collect_report(mut self) -> PoolReport {
        let mut results = Vec::with_capacity(self.total);
        let mut failed_symbols = Vec::new();
        while let Some(result) = self.next().await {
            if !result.is_success() {
                failed_symbols.push(result.symbol.clone());
            }
            results.push(result);
            let done = results.len();
            if done % PROGRESS_EVERY == 0 || done == self.total {
                info!(
                    completed = done,
                    total = self.total,
                    failed = failed_symbols.len(),
                    "harvest progress"
                );
            }
        }

        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(%err, "worker task ended abnormally");
            }
        }

        let elapsed = self.started.elapsed();
        let report = PoolReport {
            success_count: results.len() - failed_symbols.len(),
            results,
            failed_symbols,
            elapsed,
        };
        info!(
            succeeded = report.success_count,
            failed = report.failed_symbols.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "harvest finished"
        );
        report
    }
}

impl Stream for HarvestStream {
    type Item = HarvestResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Outcome of one pool run.
#[derive(Debug)]
pub struct PoolReport {
    /// In completion order.
    pub results: Vec<HarvestResult>,
    pub success_count: usize,
    pub failed_symbols: Vec<String>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        cache::MemoryCache,
        harvest::{HarvestMode, test_support::FakeProvider},
        models::clock::RunClock,
        selection::test_support::contract,
    };

    fn job() -> Arc<HarvestJob> {
        Arc::new(HarvestJob {
            mode: HarvestMode::Chain {
                horizons: vec![30],
                half_width: 1,
            },
            clock: RunClock::at(Utc.with_ymd_and_hms(2025, 9, 2, 15, 0, 0).unwrap()),
        })
    }

    fn provider(symbols: &[&str], panic_on: Option<&str>) -> FakeProvider {
        let mut provider = FakeProvider {
            panic_on: panic_on.map(str::to_string),
            ..Default::default()
        };
        for s in symbols {
            provider.chains.insert(
                s.to_string(),
                vec![
                    contract(s, 30, 100.0, "call"),
                    contract(s, 30, 105.0, "call"),
                ],
            );
        }
        provider
    }

    async fn pool(workers: usize, cache: MemoryCache, panic_on: Option<&'static str>) -> WorkerPool {
        let symbols = ["A", "B", "C", "D", "E", "F", "G"];
        WorkerPool::initialize(workers, |i| {
            let cache = cache.clone();
            async move {
                Ok::<_, std::io::Error>(HarvestWorker::new(
                    i,
                    Box::new(provider(&symbols, panic_on)),
                    Box::new(cache),
                ))
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failures_are_isolated_per_symbol() {
        // D and G have no cached price.
        let cache = MemoryCache::with_prices([("A", 100.0), ("B", 100.0), ("C", 100.0), ("E", 100.0), ("F", 100.0)]);
        let pool = pool(3, cache, None).await;
        let symbols: Vec<String> = ["A", "B", "C", "D", "E", "F", "G"].map(String::from).to_vec();

        let report = pool.run(symbols, job()).collect_report().await;
        assert_eq!(report.results.len(), 7);
        assert_eq!(report.success_count, 5);
        let failed: HashSet<_> = report.failed_symbols.iter().map(String::as_str).collect();
        assert_eq!(failed, HashSet::from(["D", "G"]));
        assert!(
            report
                .results
                .iter()
                .filter(|r| !r.is_success())
                .all(|r| r.rows.is_empty()
                    && r.failure_reason() == Some(&FailureReason::PriceUnavailable))
        );
        let seen: HashSet<_> = report.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_symbol_still_reports() {
        let cache = MemoryCache::with_prices([("A", 100.0), ("B", 100.0), ("C", 100.0)]);
        let pool = pool(2, cache, Some("B")).await;

        let report = pool
            .run(vec!["A".into(), "B".into(), "C".into()], job())
            .collect_report()
            .await;
        assert_eq!(report.results.len(), 3);
        let b = report.results.iter().find(|r| r.symbol == "B").unwrap();
        assert!(matches!(b.failure_reason(), Some(FailureReason::Panicked(m)) if m.contains("blew up")));
        assert_eq!(report.success_count, 2);
    }

    #[tokio::test]
    async fn init_failure_aborts_pool() {
        let result = WorkerPool::initialize(3, |i| async move {
            if i == 1 {
                Err(std::io::Error::other("no route to cache"))
            } else {
                Ok(HarvestWorker::new(
                    i,
                    Box::new(FakeProvider::default()),
                    Box::new(MemoryCache::new()),
                ))
            }
        })
        .await;
        assert!(matches!(result, Err(PoolError::Init { index: 1, .. })));
    }

    #[tokio::test]
    async fn empty_universe_yields_empty_report() {
        let pool = pool(2, MemoryCache::new(), None).await;
        let report = pool.run(Vec::new(), job()).collect_report().await;
        assert!(report.results.is_empty());
        assert_eq!(report.success_count, 0);
    }
}
