//! Run-level entry points: chain discovery, contract detail, update cycles and
//! snapshot paging.
//!
//! [`Farmer`] wires the pieces together for one run: it loads the symbols,
//! builds a [`WorkerPool`] through a [`WorkerFactory`], drains the results and
//! hands the merged rows to the sinks. Run-level problems (missing inputs,
//! pool initialization, sink writes) surface as [`FarmError`]; per-symbol
//! problems only show up in the [`RunSummary`].

use std::{
    error::Error as StdError,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared_utils::settings::read_minutes;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    cache::{CacheError, QuoteCache, RedisCache, chain_snapshot_key},
    config::FarmerConfig,
    harvest::{HarvestJob, HarvestMode, HarvestWorker},
    models::{
        clock::RunClock,
        contract::RawContract,
        handoff::{HandoffError, HandoffPlan},
        option::{ChainRow, FilteredOption},
        universe::{Universe, UniverseError},
    },
    pool::{PoolError, PoolReport, WorkerPool},
    providers::{
        OptionsDataProvider, ProviderError, ProviderInitError,
        polygon_rest::{PolygonProvider, PolygonSettings},
    },
    scheduler::UpdateLoop,
    sink::{
        ChainFileSink, ContractFileSink, DataSink, Reconciliation, SinkError, UpdateSnapshotSink,
        csv_files::chain_file_path, merge, read_csv, reconcile, store_chain_snapshot,
    },
};

pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum FarmError {
    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("sink write failed: {0}")]
    Sink(#[from] SinkError),

    #[error("no symbols to harvest")]
    NoSymbols,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("provider setup failed: {0}")]
    ProviderInit(#[from] ProviderInitError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("worker setup failed: {0}")]
    Setup(#[source] BoxError),
}

/// Builds the per-worker resources. Each call must return a fresh provider
/// client and cache connection.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn provider(&self) -> Result<Box<dyn OptionsDataProvider>, BoxError>;
    async fn cache(&self) -> Result<Box<dyn QuoteCache>, BoxError>;
}

/// Polygon + Redis.
pub struct LiveFactory {
    polygon: PolygonSettings,
    redis_url: String,
}

impl LiveFactory {
    pub fn new(polygon: PolygonSettings, redis_url: impl Into<String>) -> Self {
        Self {
            polygon,
            redis_url: redis_url.into(),
        }
    }

    /// Reads `POLYGON_API_KEY` (and the optional `REDIS_URL` override) and
    /// applies the `[api]` and `[cache]` sections.
    pub fn from_config(config: &FarmerConfig) -> Result<Self, ProviderInitError> {
        let mut polygon = PolygonSettings::from_env()?
            .with_requests_per_second(config.api.requests_per_second);
        polygon.base_url = config.api.base_url.clone();
        polygon.retry = config.api.retry_policy();
        polygon.timeout = Duration::from_secs(config.api.timeout_secs.max(1));

        let redis_url = shared_utils::env::get_env_var_opt(crate::config::REDIS_URL_ENV)
            .unwrap_or_else(|| config.cache.redis_url.clone());
        Ok(Self::new(polygon, redis_url))
    }
}

#[async_trait]
impl WorkerFactory for LiveFactory {
    async fn provider(&self) -> Result<Box<dyn OptionsDataProvider>, BoxError> {
        Ok(Box::new(PolygonProvider::new(&self.polygon)?))
    }

    async fn cache(&self) -> Result<Box<dyn QuoteCache>, BoxError> {
        Ok(Box::new(RedisCache::connect(&self.redis_url).await?))
    }
}

/// Outcome of one run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Symbols submitted to the pool.
    pub symbols: usize,
    pub rows: usize,
    /// File (chain, update) or directory (detail) written; `None` when there
    /// was nothing to write.
    pub path: Option<PathBuf>,
    pub success_count: usize,
    pub failed_symbols: Vec<String>,
    pub elapsed: Duration,
    /// Present for detail and update runs.
    pub reconciliation: Option<Reconciliation>,
}

impl RunSummary {
    fn from_report(report: &PoolReport, rows: usize, started: Instant) -> Self {
        Self {
            symbols: report.results.len(),
            rows,
            path: None,
            success_count: report.success_count,
            failed_symbols: report.failed_symbols.clone(),
            elapsed: started.elapsed(),
            reconciliation: None,
        }
    }
}

/// One page of today's chain file.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotPage {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub rows: Vec<ChainRow>,
}

/// Rows `(page-1)*page_size ..` of the chain file for `clock`'s date. Page
/// numbers start at 1; page 0 is treated as page 1.
pub fn snapshot_page(
    chain_dir: &Path,
    clock: &RunClock,
    page: usize,
    page_size: usize,
) -> Result<SnapshotPage, FarmError> {
    let path = chain_file_path(chain_dir, clock);
    if !path.exists() {
        return Err(HandoffError::Missing(path).into());
    }
    let all: Vec<ChainRow> = read_csv(&path)?;
    let page = page.max(1);
    let page_size = page_size.max(1);
    let rows = all
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();
    Ok(SnapshotPage {
        page,
        page_size,
        total: all.len(),
        rows,
    })
}

pub struct Farmer {
    config: FarmerConfig,
    factory: Arc<dyn WorkerFactory>,
}

impl Farmer {
    pub fn new(config: FarmerConfig, factory: Arc<dyn WorkerFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &FarmerConfig {
        &self.config
    }

    /// Discovers the ATM chain of every configured symbol and writes
    /// `OptionChain_{YYYYMMDD}.csv` plus its JSON copy in the cache.
    pub async fn run_chain_discovery(&self) -> Result<RunSummary, FarmError> {
        let started = Instant::now();
        let clock = RunClock::now();
        let universe = Universe::load(
            &self.config.universe.symbols,
            self.config.universe.file.as_deref(),
        )?;
        info!(symbols = universe.len(), "starting chain discovery");

        let mode = HarvestMode::Chain {
            horizons: self.config.selection.horizons.clone(),
            half_width: self.config.selection.half_width,
        };
        let report = self.harvest(universe.into_vec(), mode, clock).await?;
        let rows = merge(&report.results);
        let mut summary = RunSummary::from_report(&report, rows.len(), started);

        if rows.is_empty() {
            warn!("chain discovery produced no rows; nothing written");
            return Ok(summary);
        }

        // No chain file unless the cache is reachable too.
        let cache = self.factory.cache().await.map_err(FarmError::Setup)?;
        let sink = ChainFileSink::new(&self.config.output.chain_dir, clock);
        summary.path = Some(sink.write(&rows).await?);
        store_chain_snapshot(cache.as_ref(), &chain_snapshot_key(&clock.date_stamp()), &rows)
            .await?;

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Pulls snapshot metrics for the contracts listed in today's chain file,
    /// writing one file and one cache hash per contract.
    pub async fn run_contract_detail(&self) -> Result<RunSummary, FarmError> {
        let started = Instant::now();
        let clock = RunClock::now();
        let plan = Arc::new(self.read_plan(&clock)?);
        info!(
            symbols = plan.expected.len(),
            contracts = plan.expected_tickers().len(),
            "starting contract detail"
        );

        let (mut summary, rows) = self
            .harvest_planned(HarvestMode::Detail { plan: plan.clone() }, &plan, clock, started)
            .await?;
        if !rows.is_empty() {
            let dir = &self.config.output.contracts_dir;
            ContractFileSink::new(dir).write(&rows).await?;
            summary.path = Some(dir.clone());
        }
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// One update cycle: re-selects around current prices, mirrors rows to
    /// the cache and writes `Updater/OptionContracts_{YYYYMMDD}_{HHMM}.csv`.
    pub async fn run_update_cycle(&self) -> Result<RunSummary, FarmError> {
        let started = Instant::now();
        let clock = RunClock::now();
        let plan = Arc::new(self.read_plan(&clock)?);
        info!(symbols = plan.expected.len(), "starting update cycle");

        let (mut summary, rows) = self
            .harvest_planned(HarvestMode::Update { plan: plan.clone() }, &plan, clock, started)
            .await?;
        if !rows.is_empty() {
            let sink = UpdateSnapshotSink::new(&self.config.output.contracts_dir, clock);
            summary.path = Some(sink.write(&rows).await?);
        }
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Page `page` (1-based) of today's chain file.
    pub fn snapshot_page(&self, page: usize, page_size: usize) -> Result<SnapshotPage, FarmError> {
        snapshot_page(&self.config.output.chain_dir, &RunClock::now(), page, page_size)
    }

    /// Fetches the current snapshot of one contract.
    pub async fn fetch_contract(
        &self,
        symbol: &str,
        option_id: &str,
    ) -> Result<RawContract, FarmError> {
        let provider = self.factory.provider().await.map_err(FarmError::Setup)?;
        Ok(provider.fetch_snapshot(symbol, option_id).await?)
    }

    /// Builds an [`UpdateLoop`] that runs [`Self::run_update_cycle`], reading
    /// the interval file at every tick.
    pub fn update_loop(
        self: &Arc<Self>,
    ) -> UpdateLoop<
        impl FnMut() -> BoxFuture<'static, Result<RunSummary, FarmError>> + Send + 'static,
        impl Fn() -> u64 + Send + 'static,
    > {
        let update = self.config.update.clone();
        let farmer = Arc::clone(self);
        UpdateLoop::new(
            update.tick(),
            move || {
                let minutes = read_minutes(&update.interval_file, update.default_interval_minutes);
                update.minutes_to_ticks(minutes)
            },
            move || {
                let farmer = Arc::clone(&farmer);
                let cycle: BoxFuture<'static, _> =
                    Box::pin(async move { farmer.run_update_cycle().await });
                cycle
            },
        )
    }

    fn read_plan(&self, clock: &RunClock) -> Result<HandoffPlan, FarmError> {
        let path = chain_file_path(&self.config.output.chain_dir, clock);
        let plan = HandoffPlan::read(&path)?;
        if plan.expected.is_empty() {
            return Err(FarmError::NoSymbols);
        }
        Ok(plan)
    }

    async fn harvest_planned(
        &self,
        mode: HarvestMode,
        plan: &HandoffPlan,
        clock: RunClock,
        started: Instant,
    ) -> Result<(RunSummary, Vec<FilteredOption>), FarmError> {
        let report = self.harvest(plan.symbols(), mode, clock).await?;
        let rows = merge(&report.results);
        let mut summary = RunSummary::from_report(&report, rows.len(), started);
        summary.reconciliation = Some(reconcile(&plan.expected_tickers(), &rows));
        if rows.is_empty() {
            warn!("no rows produced; nothing written");
        }
        Ok((summary, rows))
    }

    async fn harvest(
        &self,
        symbols: Vec<String>,
        mode: HarvestMode,
        clock: RunClock,
    ) -> Result<PoolReport, FarmError> {
        if symbols.is_empty() {
            return Err(FarmError::NoSymbols);
        }
        let workers = self.config.pool.worker_count().min(symbols.len());
        let factory = Arc::clone(&self.factory);
        let pool = WorkerPool::initialize(workers, |index| {
            let factory = Arc::clone(&factory);
            async move {
                let provider = factory.provider().await?;
                let cache = factory.cache().await?;
                Ok::<_, BoxError>(HarvestWorker::new(index, provider, cache))
            }
        })
        .await?;

        let job = Arc::new(HarvestJob { mode, clock });
        Ok(pool.run(symbols, job).collect_report().await)
    }
}
