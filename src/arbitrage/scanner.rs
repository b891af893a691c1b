//! Two-phase opportunity scanner.
//!
//! Tickers are cheap, books are expensive. The scanner pairs venues on ticker
//! prices first, drops everything that cannot be profitable or transferable,
//! and only then walks order books for the survivors under a time budget.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::asset::is_same_asset;
use super::calculator::{evaluate, Opportunity, PriceSource};
use super::detector::{build_candidates, Candidate, Quote};
use super::fees::FeeSchedule;
use super::liquidity::{collect_metrics, LiquidityFilter};
use crate::config::Config;
use crate::feed::{CapabilityPolicy, ExchangeFeed, TransferAction};
use crate::metrics;
use crate::orderbook::{vwap, PriceLevel};
use crate::utils::{call_with_deadline, secs_f64};

/// Scanner knobs that do not change per call.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum quote age and cross-quote skew.
    pub max_staleness: Duration,
    /// What an undeterminable capability means.
    pub capability_policy: CapabilityPolicy,
    /// Deadline for each capability probe.
    pub capability_timeout: Duration,
    /// Budget for one whole scan.
    pub scan_budget: Duration,
    /// Concurrent candidate book fetches.
    pub orderbook_concurrency: usize,
    /// Levels requested per book.
    pub orderbook_depth: usize,
    /// Minimum size at the best level.
    pub min_top_of_book_size: Decimal,
    /// Use ticker prices when a book cannot fill the amount.
    pub allow_ticker_fallback: bool,
    /// Volume and market-cap thresholds.
    pub liquidity: LiquidityFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_staleness: Duration::from_secs(5),
            capability_policy: CapabilityPolicy::FailOpen,
            capability_timeout: Duration::from_millis(500),
            scan_budget: Duration::from_secs(10),
            orderbook_concurrency: 8,
            orderbook_depth: 20,
            min_top_of_book_size: Decimal::new(1, 4),
            allow_ticker_fallback: false,
            liquidity: LiquidityFilter::default(),
        }
    }
}

impl ScanOptions {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_staleness: secs_f64(config.max_quote_staleness_seconds),
            capability_policy: CapabilityPolicy::from_fail_open(
                config.fail_open_on_unknown_capability,
            ),
            capability_timeout: Duration::from_millis(config.capability_timeout_ms),
            scan_budget: Duration::from_millis(config.scan_budget_ms),
            orderbook_concurrency: config.orderbook_concurrency.max(1),
            orderbook_depth: config.orderbook_depth.max(1),
            min_top_of_book_size: config.min_top_of_book_size,
            allow_ticker_fallback: config.allow_ticker_fallback_on_thin_book,
            liquidity: LiquidityFilter::from_config(config),
        }
    }
}

/// Funnel counts for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Feeds queried.
    pub feeds: usize,
    /// Feeds whose tickers failed or timed out.
    pub feed_errors: usize,
    /// Quotes collected.
    pub quotes: usize,
    /// Quotes dropped by the volume/market-cap prefilter.
    pub prefiltered: usize,
    /// Symbols quoted on at least two venues.
    pub symbols: usize,
    /// Ordered venue pairs considered.
    pub pairs: usize,
    /// Pairs rejected as stale.
    pub rejected_stale: usize,
    /// Pairs rejected by the raw price-difference prefilter.
    pub rejected_price_diff: usize,
    /// Candidates with no fee-adjusted profit.
    pub rejected_unprofitable: usize,
    /// Candidates that may be different assets.
    pub rejected_asset: usize,
    /// Candidates whose withdraw or deposit is disallowed.
    pub rejected_capability: usize,
    /// Candidates dropped by the per-symbol liquidity filter.
    pub rejected_liquidity: usize,
    /// Candidates whose books were too thin.
    pub rejected_thin_book: usize,
    /// Candidates left unpriced when the budget ran out.
    pub unfinished: usize,
    /// Opportunities returned.
    pub opportunities: usize,
}

/// A candidate that passed the ticker-phase checks.
#[derive(Debug, Clone)]
struct Screened {
    candidate: Candidate,
    buy_withdraw: bool,
    sell_deposit: bool,
}

/// Outcome of pricing one candidate against books.
#[derive(Debug)]
enum BookVerdict {
    Accepted(Box<Opportunity>),
    Unprofitable,
    ThinBook,
    Capability,
}

/// Finds fee-adjusted cross-venue opportunities.
#[derive(Debug, Clone, Default)]
pub struct OpportunityScanner {
    fees: FeeSchedule,
    options: ScanOptions,
}

impl OpportunityScanner {
    /// Create a scanner.
    pub fn new(fees: FeeSchedule, options: ScanOptions) -> Self {
        Self { fees, options }
    }

    /// Create from config values.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        Ok(Self::new(
            FeeSchedule::from_config(config)?,
            ScanOptions::from_config(config),
        ))
    }

    /// Scanner options.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Fee schedule.
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Ranked opportunities, best `profit_pct` first.
    pub async fn scan(
        &self,
        feeds: &[Arc<dyn ExchangeFeed>],
        amount: Decimal,
        min_profit_pct: Decimal,
        min_price_diff_pct: Decimal,
    ) -> Vec<Opportunity> {
        self.scan_with_report(feeds, amount, min_profit_pct, min_price_diff_pct)
            .await
            .0
    }

    /// Like [`scan`](Self::scan), also returning funnel counts.
    #[instrument(skip_all, fields(feeds = feeds.len(), amount = %amount))]
    pub async fn scan_with_report(
        &self,
        feeds: &[Arc<dyn ExchangeFeed>],
        amount: Decimal,
        min_profit_pct: Decimal,
        min_price_diff_pct: Decimal,
    ) -> (Vec<Opportunity>, ScanReport) {
        let _timer = metrics::timer_scan();
        let deadline = Instant::now() + self.options.scan_budget;
        let mut report = ScanReport {
            feeds: feeds.len(),
            ..Default::default()
        };

        if amount <= Decimal::ZERO {
            warn!(amount = %amount, "Scan amount must be positive");
            return (Vec::new(), report);
        }

        // Phase 1: tickers
        let market = self.collect_quotes(feeds, deadline, &mut report).await;
        report.symbols = market.values().filter(|q| q.len() >= 2).count();

        // Phase 2: ordered venue pairs
        let (candidates, stats) = build_candidates(
            &market,
            OffsetDateTime::now_utc(),
            self.options.max_staleness,
            min_price_diff_pct,
        );
        report.pairs = stats.pairs;
        report.rejected_stale = stats.stale;
        report.rejected_price_diff = stats.price_diff;
        metrics::add_candidates(candidates.len() as u64);

        // Phase 3: fees, same asset, capabilities
        let mut screened = self
            .screen(candidates, amount, min_profit_pct, deadline, &mut report)
            .await;

        if self.options.liquidity.is_active() {
            let symbol_metrics = collect_metrics(&market);
            let before = screened.len();
            screened.retain(|s| {
                symbol_metrics
                    .get(&s.candidate.symbol)
                    .map_or(true, |m| self.options.liquidity.passes(m.quote_volume, m.market_cap))
            });
            report.rejected_liquidity = before - screened.len();
        }

        // Phase 4: order books
        let mut opportunities = self
            .price_with_books(screened, amount, min_profit_pct, deadline, &mut report)
            .await;

        opportunities.sort_by(|a, b| {
            b.profit_pct
                .cmp(&a.profit_pct)
                .then_with(|| a.symbol.cmp(&b.symbol))
                .then_with(|| a.buy_venue.cmp(&b.buy_venue))
                .then_with(|| a.sell_venue.cmp(&b.sell_venue))
        });

        report.opportunities = opportunities.len();
        metrics::add_opportunities_detected(opportunities.len() as u64);

        info!(
            quotes = report.quotes,
            pairs = report.pairs,
            opportunities = report.opportunities,
            unfinished = report.unfinished,
            "Scan complete"
        );

        (opportunities, report)
    }

    /// Fetch every feed's tickers concurrently and group them by symbol.
    async fn collect_quotes(
        &self,
        feeds: &[Arc<dyn ExchangeFeed>],
        deadline: Instant,
        report: &mut ScanReport,
    ) -> BTreeMap<String, Vec<Quote>> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let fetched = futures::future::join_all(feeds.iter().map(|feed| async move {
            let tickers = call_with_deadline("tickers", budget, feed.get_tickers()).await;
            (feed.clone(), tickers)
        }))
        .await;

        let mut market: BTreeMap<String, Vec<Quote>> = BTreeMap::new();

        for (feed, tickers) in fetched {
            let Some(tickers) = tickers else {
                warn!(venue = feed.venue(), "No tickers from feed");
                report.feed_errors += 1;
                continue;
            };

            let prefilter = self
                .options
                .liquidity
                .applies_to(feed.transport(), tickers.len());

            for (symbol, ticker) in tickers {
                if ticker.price <= Decimal::ZERO {
                    continue;
                }
                if prefilter && !self.options.liquidity.ticker_passes(&ticker) {
                    report.prefiltered += 1;
                    continue;
                }

                report.quotes += 1;
                market.entry(symbol).or_default().push(Quote {
                    feed: feed.clone(),
                    venue: feed.venue().to_string(),
                    ticker,
                });
            }
        }

        market
    }

    /// Ticker-price profitability, same-asset check and quick capability probes.
    async fn screen(
        &self,
        candidates: Vec<Candidate>,
        amount: Decimal,
        min_profit_pct: Decimal,
        deadline: Instant,
        report: &mut ScanReport,
    ) -> Vec<Screened> {
        let mut survivors = Vec::new();

        for candidate in candidates {
            let breakdown = evaluate(
                &self.fees,
                &candidate.buy.venue,
                &candidate.sell.venue,
                &candidate.base_asset,
                candidate.buy.price(),
                candidate.sell.price(),
                amount,
            );
            if candidate.sell.price() <= candidate.buy.price()
                || !breakdown.is_profitable(min_profit_pct)
            {
                report.rejected_unprofitable += 1;
                continue;
            }

            if !is_same_asset(
                &candidate.buy.venue,
                &candidate.buy.ticker.symbol,
                &candidate.sell.venue,
                &candidate.sell.ticker.symbol,
            ) {
                debug!(
                    symbol = %candidate.symbol,
                    buy = %candidate.buy.venue,
                    sell = %candidate.sell.venue,
                    "Skipping candidate: possibly different assets"
                );
                report.rejected_asset += 1;
                continue;
            }

            survivors.push(candidate);
        }

        let capabilities = self.probe_capabilities(&survivors, deadline).await;
        let allowed = |venue: &str, base: &str, action: TransferAction| {
            capabilities
                .get(&(venue.to_string(), base.to_string(), action))
                .copied()
                .unwrap_or_else(|| self.options.capability_policy.resolve(None))
        };

        let mut screened = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let buy_withdraw = allowed(&candidate.buy.venue, &candidate.base_asset, TransferAction::Withdraw);
            let sell_deposit = allowed(&candidate.sell.venue, &candidate.base_asset, TransferAction::Deposit);

            if !buy_withdraw || !sell_deposit {
                debug!(
                    symbol = %candidate.symbol,
                    buy = %candidate.buy.venue,
                    sell = %candidate.sell.venue,
                    buy_withdraw,
                    sell_deposit,
                    "Skipping candidate: transfer disabled"
                );
                report.rejected_capability += 1;
                continue;
            }

            screened.push(Screened {
                candidate,
                buy_withdraw,
                sell_deposit,
            });
        }

        screened
    }

    /// Probe each distinct (venue, asset, action) once, concurrently, each under its own deadline.
    async fn probe_capabilities(
        &self,
        candidates: &[Candidate],
        deadline: Instant,
    ) -> HashMap<(String, String, TransferAction), bool> {
        let mut seen = HashSet::new();
        let mut probes = Vec::new();

        for candidate in candidates {
            let legs = [
                (&candidate.buy, TransferAction::Withdraw),
                (&candidate.sell, TransferAction::Deposit),
            ];
            for (quote, action) in legs {
                let key = (quote.venue.clone(), candidate.base_asset.clone(), action);
                if seen.insert(key.clone()) {
                    probes.push((key, quote.feed.clone()));
                }
            }
        }

        let timeout = self
            .options
            .capability_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let policy = self.options.capability_policy;

        let results = futures::future::join_all(probes.into_iter().map(|(key, feed)| async move {
            let (_, base, action) = &key;
            let probe = async {
                match action {
                    TransferAction::Withdraw => feed.supports_withdraw(base).await,
                    TransferAction::Deposit => feed.supports_deposit(base).await,
                }
            };
            let label = match action {
                TransferAction::Withdraw => "supports_withdraw",
                TransferAction::Deposit => "supports_deposit",
            };
            let answer = call_with_deadline(label, timeout, probe).await.flatten();
            (key, policy.resolve(answer))
        }))
        .await;

        results.into_iter().collect()
    }

    /// Walk books for every screened candidate with bounded parallelism until the deadline.
    async fn price_with_books(
        &self,
        screened: Vec<Screened>,
        amount: Decimal,
        min_profit_pct: Decimal,
        deadline: Instant,
        report: &mut ScanReport,
    ) -> Vec<Opportunity> {
        let total = screened.len();
        let mut finished = 0usize;
        let mut opportunities = Vec::new();

        let mut verdicts = pin!(stream::iter(screened)
            .map(|s| self.price_candidate(s, amount, min_profit_pct, deadline))
            .buffer_unordered(self.options.orderbook_concurrency.max(1)));

        loop {
            match tokio::time::timeout_at(deadline, verdicts.next()).await {
                Ok(Some(verdict)) => {
                    finished += 1;
                    match verdict {
                        BookVerdict::Accepted(opportunity) => opportunities.push(*opportunity),
                        BookVerdict::Unprofitable => report.rejected_unprofitable += 1,
                        BookVerdict::ThinBook => report.rejected_thin_book += 1,
                        BookVerdict::Capability => report.rejected_capability += 1,
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        finished,
                        total,
                        budget_ms = self.options.scan_budget.as_millis() as u64,
                        "Scan budget exhausted, keeping completed results"
                    );
                    break;
                }
            }
        }

        report.unfinished = total - finished;
        opportunities
    }

    /// VWAP for `amount`, or `None` when the book is too thin.
    fn executable_price(&self, levels: &[PriceLevel], amount: Decimal) -> Option<Decimal> {
        let top = levels.first()?;
        if top.size < self.options.min_top_of_book_size {
            return None;
        }
        vwap(levels, amount)
    }

    /// Resolve a book side to a price, falling back to the ticker when allowed.
    fn side_price(
        &self,
        levels: Option<&[PriceLevel]>,
        ticker_price: Decimal,
        amount: Decimal,
    ) -> Option<(Decimal, PriceSource)> {
        match levels.and_then(|l| self.executable_price(l, amount)) {
            Some(price) => Some((price, PriceSource::OrderBook)),
            None if self.options.allow_ticker_fallback => Some((ticker_price, PriceSource::Ticker)),
            None => None,
        }
    }

    async fn price_candidate(
        &self,
        screened: Screened,
        amount: Decimal,
        min_profit_pct: Decimal,
        deadline: Instant,
    ) -> BookVerdict {
        let Screened {
            candidate,
            buy_withdraw,
            sell_deposit,
        } = screened;
        let depth = self.options.orderbook_depth;
        let started = std::time::Instant::now();

        let (buy_book, sell_book) = tokio::join!(
            candidate.buy.feed.get_order_book(&candidate.symbol, depth),
            candidate.sell.feed.get_order_book(&candidate.symbol, depth),
        );
        metrics::record_orderbook_fetch_latency(started, "scanner");

        if let Err(e) = &buy_book {
            debug!(venue = %candidate.buy.venue, error = %e, "Buy book unavailable");
        }
        if let Err(e) = &sell_book {
            debug!(venue = %candidate.sell.venue, error = %e, "Sell book unavailable");
        }

        let buy = self.side_price(
            buy_book.as_ref().ok().map(|b| b.asks.as_slice()),
            candidate.buy.price(),
            amount,
        );
        let sell = self.side_price(
            sell_book.as_ref().ok().map(|b| b.bids.as_slice()),
            candidate.sell.price(),
            amount,
        );
        let (Some((buy_price, buy_source)), Some((sell_price, sell_source))) = (buy, sell) else {
            debug!(symbol = %candidate.symbol, "Thin book, discarding candidate");
            return BookVerdict::ThinBook;
        };

        if sell_price <= buy_price {
            return BookVerdict::Unprofitable;
        }

        let breakdown = evaluate(
            &self.fees,
            &candidate.buy.venue,
            &candidate.sell.venue,
            &candidate.base_asset,
            buy_price,
            sell_price,
            amount,
        );
        if !breakdown.is_profitable(min_profit_pct) {
            return BookVerdict::Unprofitable;
        }

        // Currency metadata is more authoritative than the quick probe
        let timeout = self
            .options
            .capability_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let (buy_meta, sell_meta) = tokio::join!(
            call_with_deadline(
                "currency_details",
                timeout,
                candidate.buy.feed.get_currency_details(&candidate.base_asset),
            ),
            call_with_deadline(
                "currency_details",
                timeout,
                candidate.sell.feed.get_currency_details(&candidate.base_asset),
            ),
        );
        let buy_withdraw = buy_meta
            .flatten()
            .and_then(|d| d.withdraw_enabled())
            .unwrap_or(buy_withdraw);
        let sell_deposit = sell_meta
            .flatten()
            .and_then(|d| d.deposit_enabled())
            .unwrap_or(sell_deposit);

        if !buy_withdraw || !sell_deposit {
            return BookVerdict::Capability;
        }

        BookVerdict::Accepted(Box::new(Opportunity {
            symbol: candidate.symbol,
            buy_venue: candidate.buy.venue,
            sell_venue: candidate.sell.venue,
            buy_price,
            sell_price,
            profit_pct: breakdown.profit_pct,
            net_profit: breakdown.net_profit,
            amount,
            buy_withdraw_allowed: buy_withdraw,
            sell_deposit_allowed: sell_deposit,
            buy_source,
            sell_source,
            detected_at: OffsetDateTime::now_utc(),
        }))
    }
}
