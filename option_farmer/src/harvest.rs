//! The per-symbol unit of work.
//!
//! A [`HarvestWorker`] owns its provider and cache connection and turns one
//! symbol into one [`HarvestResult`]. Every failure is folded into the result
//! as a [`FailureReason`], so a bad symbol never disturbs the others.

use std::{sync::Arc, time::Instant};

use tracing::{debug, warn};

use crate::{
    cache::QuoteCache,
    models::{
        clock::RunClock,
        contract::RawContract,
        handoff::HandoffPlan,
        harvest::{FailureReason, HarvestResult},
        option::FilteredOption,
        request_params::{DateBounds, StrikeBounds},
    },
    providers::{OptionsDataProvider, ProviderError},
    selection::{RowContext, harvest_ladders},
    sink::mirror_rows,
};

/// Which endpoint feeds the worker and what it does with the rows.
#[derive(Clone, Debug)]
pub enum HarvestMode {
    /// Reference contracts within price/date bounds; rows are not cached.
    Chain { horizons: Vec<u32>, half_width: usize },
    /// Chain snapshot restricted to the contracts chain discovery selected;
    /// rows are mirrored to the cache.
    Detail { plan: Arc<HandoffPlan> },
    /// Chain snapshot re-selected around the current price; rows are
    /// mirrored to the cache.
    Update { plan: Arc<HandoffPlan> },
}

impl HarvestMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chain { .. } => "chain",
            Self::Detail { .. } => "detail",
            Self::Update { .. } => "update",
        }
    }

    pub fn horizons(&self) -> &[u32] {
        match self {
            Self::Chain { horizons, .. } => horizons,
            Self::Detail { plan } | Self::Update { plan } => &plan.horizons,
        }
    }

    pub fn half_width(&self) -> usize {
        match self {
            Self::Chain { half_width, .. } => *half_width,
            Self::Detail { plan } | Self::Update { plan } => plan.half_width,
        }
    }

    pub fn mirrors_to_cache(&self) -> bool {
        !matches!(self, Self::Chain { .. })
    }
}

/// Everything a worker needs to know about the run it is part of.
#[derive(Clone, Debug)]
pub struct HarvestJob {
    pub mode: HarvestMode,
    pub clock: RunClock,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    FetchPrice,
    FetchContracts,
    Select,
    Mirror,
}

pub struct HarvestWorker {
    id: usize,
    provider: Box<dyn OptionsDataProvider>,
    cache: Box<dyn QuoteCache>,
}

impl HarvestWorker {
    pub fn new(
        id: usize,
        provider: Box<dyn OptionsDataProvider>,
        cache: Box<dyn QuoteCache>,
    ) -> Self {
        Self {
            id,
            provider,
            cache,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Harvests one symbol. Never fails: errors become the result's outcome.
    pub async fn harvest(&self, symbol: &str, job: &HarvestJob) -> HarvestResult {
        let started = Instant::now();
        match self.run_stages(symbol, job).await {
            Ok(rows) => {
                debug!(
                    worker = self.id,
                    symbol,
                    mode = job.mode.name(),
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "harvested"
                );
                HarvestResult::success(symbol, rows)
            }
            Err(reason) => {
                warn!(worker = self.id, symbol, mode = job.mode.name(), %reason, "harvest failed");
                HarvestResult::failure(symbol, reason)
            }
        }
    }

    async fn run_stages(
        &self,
        symbol: &str,
        job: &HarvestJob,
    ) -> Result<Vec<FilteredOption>, FailureReason> {
        self.trace(symbol, Stage::FetchPrice);
        let price = self
            .cache
            .read_last(symbol)
            .await
            .map_err(|e| FailureReason::Cache(e.to_string()))?
            .ok_or(FailureReason::PriceUnavailable)?;

        self.trace(symbol, Stage::FetchContracts);
        let contracts = self.fetch_contracts(symbol, price, job).await?;

        self.trace(symbol, Stage::Select);
        let ctx = RowContext {
            symbol,
            as_of: job.clock.local(),
            today: job.clock.today(),
        };
        let selected = harvest_ladders(
            &contracts,
            price,
            job.mode.horizons(),
            job.mode.half_width(),
            ctx,
        );
        if selected.usable == 0 && selected.malformed > 0 {
            return Err(FailureReason::MalformedData(format!(
                "all {} records malformed",
                selected.malformed
            )));
        }
        if selected.expiries.is_empty() {
            return Err(FailureReason::FetchFailure(
                "no future expiries returned".to_string(),
            ));
        }
        if selected.rows.is_empty() {
            return Err(FailureReason::EmptyResult);
        }

        if job.mode.mirrors_to_cache() {
            self.trace(symbol, Stage::Mirror);
            mirror_rows(self.cache.as_ref(), &selected.rows)
                .await
                .map_err(|e| FailureReason::Cache(e.to_string()))?;
        }

        Ok(selected.rows)
    }

    async fn fetch_contracts(
        &self,
        symbol: &str,
        price: f64,
        job: &HarvestJob,
    ) -> Result<Vec<RawContract>, FailureReason> {
        let contracts = match &job.mode {
            HarvestMode::Chain {
                horizons,
                half_width,
            } => {
                let strikes = StrikeBounds::around(price, *half_width);
                let dates = DateBounds::for_horizons(job.clock.today(), horizons);
                self.provider.fetch_chain(symbol, strikes, dates).await
            }
            HarvestMode::Detail { .. } | HarvestMode::Update { .. } => {
                self.provider.fetch_contract_detail(symbol).await
            }
        }
        .map_err(provider_failure)?;

        if contracts.is_empty() {
            return Err(FailureReason::FetchFailure(
                "no contracts returned".to_string(),
            ));
        }

        if let HarvestMode::Detail { plan } = &job.mode {
            let Some(expected) = plan.expected_for(symbol) else {
                return Err(FailureReason::EmptyResult);
            };
            return Ok(contracts
                .into_iter()
                .filter(|c| c.ticker.as_ref().is_some_and(|t| expected.contains(t)))
                .collect());
        }
        Ok(contracts)
    }

    fn trace(&self, symbol: &str, stage: Stage) {
        debug!(worker = self.id, symbol, ?stage, "stage");
    }
}

fn provider_failure(err: ProviderError) -> FailureReason {
    if err.is_auth() {
        FailureReason::Auth
    } else {
        FailureReason::FetchFailure(err.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-process provider shared by the worker, pool and farm tests.

    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use crate::{
        models::{
            contract::RawContract,
            request_params::{DateBounds, StrikeBounds},
        },
        providers::{AuthSnafu, NotFoundSnafu, OptionsDataProvider, ProviderError},
    };

    #[derive(Default)]
    pub struct FakeProvider {
        pub chains: HashMap<String, Vec<RawContract>>,
        pub reject_key: bool,
        pub panic_on: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        fn lookup(&self, symbol: &str) -> Result<Vec<RawContract>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_key {
                return AuthSnafu.fail();
            }
            if self.panic_on.as_deref() == Some(symbol) {
                panic!("provider blew up on {symbol}");
            }
            Ok(self.chains.get(symbol).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl OptionsDataProvider for FakeProvider {
        async fn fetch_chain(
            &self,
            symbol: &str,
            _strikes: StrikeBounds,
            _dates: DateBounds,
        ) -> Result<Vec<RawContract>, ProviderError> {
            self.lookup(symbol)
        }

        async fn fetch_contract_detail(
            &self,
            symbol: &str,
        ) -> Result<Vec<RawContract>, ProviderError> {
            self.lookup(symbol)
        }

        async fn fetch_snapshot(
            &self,
            symbol: &str,
            option_id: &str,
        ) -> Result<RawContract, ProviderError> {
            self.lookup(symbol)?
                .into_iter()
                .find(|c| c.ticker.as_deref() == Some(option_id))
                .ok_or_else(|| NotFoundSnafu { what: option_id }.build())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeProvider;
    use super::*;
    use crate::{
        cache::MemoryCache,
        models::{atm::AtmLabel, clock::RunClock},
        selection::test_support::{contract, today},
    };
    use chrono::{TimeZone, Utc};
    use indexmap::{IndexMap, IndexSet};

    fn clock() -> RunClock {
        // 11:00 in New York on `today()`.
        RunClock::at(Utc.with_ymd_and_hms(2025, 9, 2, 15, 0, 0).unwrap())
    }

    fn chain(symbol: &str) -> Vec<RawContract> {
        let mut out = Vec::new();
        for days in [8u64, 29] {
            for strike in [95.0, 100.0, 105.0] {
                out.push(contract(symbol, days, strike, "call"));
                out.push(contract(symbol, days, strike, "put"));
            }
        }
        out
    }

    fn worker(provider: FakeProvider, cache: MemoryCache) -> HarvestWorker {
        HarvestWorker::new(0, Box::new(provider), Box::new(cache))
    }

    fn chain_job() -> HarvestJob {
        HarvestJob {
            mode: HarvestMode::Chain {
                horizons: vec![7, 30],
                half_width: 1,
            },
            clock: clock(),
        }
    }

    #[tokio::test]
    async fn chain_mode_selects_without_caching() {
        let mut provider = FakeProvider::default();
        provider.chains.insert("AAPL".into(), chain("AAPL"));
        let cache = MemoryCache::with_prices([("AAPL", 100.2)]);

        let result = worker(provider, cache.clone()).harvest("AAPL", &chain_job()).await;
        assert!(result.is_success());
        assert_eq!(result.rows.len(), 12);
        assert!(result.rows.iter().any(|r| r.atm_label == AtmLabel::Above(1)));
        assert!(cache.contract_keys().is_empty());
    }

    #[tokio::test]
    async fn missing_price_fails_before_fetching() {
        let provider = FakeProvider::default();
        let w = worker(provider, MemoryCache::new());
        let result = w.harvest("AAPL", &chain_job()).await;
        assert_eq!(result.failure_reason(), Some(&FailureReason::PriceUnavailable));
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn rejected_key_maps_to_auth() {
        let provider = FakeProvider {
            reject_key: true,
            ..Default::default()
        };
        let w = worker(provider, MemoryCache::with_prices([("AAPL", 100.0)]));
        let result = w.harvest("AAPL", &chain_job()).await;
        assert_eq!(result.failure_reason(), Some(&FailureReason::Auth));
    }

    #[tokio::test]
    async fn only_expired_contracts_is_a_fetch_failure() {
        let mut provider = FakeProvider::default();
        provider
            .chains
            .insert("AAPL".into(), vec![contract("AAPL", 0, 100.0, "call")]);
        let w = worker(provider, MemoryCache::with_prices([("AAPL", 100.0)]));
        let result = w.harvest("AAPL", &chain_job()).await;
        assert!(matches!(
            result.failure_reason(),
            Some(FailureReason::FetchFailure(_))
        ));
    }

    #[tokio::test]
    async fn all_malformed_records() {
        let mut provider = FakeProvider::default();
        provider
            .chains
            .insert("AAPL".into(), vec![RawContract::default(); 3]);
        let w = worker(provider, MemoryCache::with_prices([("AAPL", 100.0)]));
        let result = w.harvest("AAPL", &chain_job()).await;
        assert!(matches!(
            result.failure_reason(),
            Some(FailureReason::MalformedData(_))
        ));
    }

    #[tokio::test]
    async fn detail_mode_restricts_to_plan_and_mirrors() {
        let mut provider = FakeProvider::default();
        let full = chain("AAPL");
        let keep: IndexSet<String> = full
            .iter()
            .filter(|c| c.strike_price == Some(100.0))
            .filter_map(|c| c.ticker.clone())
            .collect();
        provider.chains.insert("AAPL".into(), full);

        let plan = HandoffPlan {
            horizons: vec![7, 30],
            half_width: 1,
            expected: IndexMap::from([("AAPL".to_string(), keep.clone())]),
        };
        let job = HarvestJob {
            mode: HarvestMode::Detail {
                plan: Arc::new(plan),
            },
            clock: clock(),
        };
        let cache = MemoryCache::with_prices([("AAPL", 100.0)]);

        let result = worker(provider, cache.clone()).harvest("AAPL", &job).await;
        assert!(result.is_success());
        assert_eq!(result.rows.len(), keep.len());
        assert!(result.rows.iter().all(|r| keep.contains(&r.option_ticker)));
        assert_eq!(cache.contract_keys().len(), keep.len());
    }

    #[tokio::test]
    async fn cache_failure_mid_symbol_leaves_no_rows_behind() {
        let mut provider = FakeProvider::default();
        provider.chains.insert("AAPL".into(), chain("AAPL"));
        let plan = HandoffPlan {
            horizons: vec![7, 30],
            half_width: 1,
            expected: IndexMap::from([(
                "AAPL".to_string(),
                chain("AAPL")
                    .into_iter()
                    .filter_map(|c| c.ticker)
                    .collect::<IndexSet<String>>(),
            )]),
        };
        let job = HarvestJob {
            mode: HarvestMode::Detail {
                plan: Arc::new(plan),
            },
            clock: clock(),
        };
        let cache = MemoryCache::with_prices([("AAPL", 100.0)]);
        cache.fail_on_row(3);

        let result = worker(provider, cache.clone()).harvest("AAPL", &job).await;
        assert!(!result.is_success());
        assert!(matches!(result.failure_reason(), Some(FailureReason::Cache(_))));
        assert!(result.rows.is_empty());
        assert!(cache.contract_keys().is_empty());
    }
}
