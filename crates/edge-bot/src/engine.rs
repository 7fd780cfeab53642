//! The engine: cooperative loops over shared, singly-owned state.
//!
//! Six perpetual tasks run under one parent: feed refresh, scan
//! (evaluation + entry), monitor (exit evaluation), passive quoting,
//! catalyst watch, and reconciliation. Each loop sleeps on a
//! `tokio::select!` against the shutdown channel, catches and logs any
//! error from a single cycle, and continues - no task's failure
//! terminates the process.
//!
//! Shutdown is structured: `run()` joins every loop, then drains all
//! in-flight exits via `close_all().await` before returning. The
//! process must not terminate with open positions still exiting.
//!
//! Entry ordering discipline: the registry is re-checked immediately
//! before placement, placement carries a bounded timeout, and
//! registration happens only after the awaited confirmation returns -
//! never optimistically.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use edge_common::Side;

use crate::config::BotConfig;
use crate::executor::{entry_limit_price, place_with_timeout, Executor, OrderRequest};
use crate::feed::{CatalystSource, MarketFeed};
use crate::journal::TradeJournal;
use crate::passive::PassiveQuoter;
use crate::position::manager::PositionManager;
use crate::position::reconcile::{PositionLedger, Reconciler};
use crate::position::Position;
use crate::risk::RiskLedger;
use crate::state::{BroadcastSignal, BroadcastState, CatalystStore, TelemetryStore};
use crate::strategy::edge::EdgeEvaluator;
use crate::strategy::router::StrategyRouter;
use crate::types::Market;

/// Handle used by signal handlers to request shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        // Every receiver sees the message; an error only means the
        // engine already stopped.
        let _ = self.tx.send(());
    }
}

/// The trade gate and position lifecycle engine.
pub struct Engine {
    config: BotConfig,
    feed: Arc<dyn MarketFeed>,
    executor: Arc<dyn Executor>,
    catalyst_source: Arc<dyn CatalystSource>,

    telemetry: Arc<TelemetryStore>,
    broadcast: Arc<BroadcastState>,
    catalyst: Arc<CatalystStore>,
    risk: Arc<RiskLedger>,
    router: StrategyRouter,
    evaluator: EdgeEvaluator,
    positions: Arc<PositionManager>,
    reconciler: Reconciler,
    passive: PassiveQuoter,

    /// Latest scan's market universe, shared with reconciliation.
    latest_markets: RwLock<Vec<Market>>,

    shutdown_tx: broadcast::Sender<()>,
}

impl Engine {
    pub fn new(
        config: BotConfig,
        feed: Arc<dyn MarketFeed>,
        executor: Arc<dyn Executor>,
        ledger: Arc<dyn PositionLedger>,
        catalyst_source: Arc<dyn CatalystSource>,
    ) -> Self {
        let telemetry = Arc::new(TelemetryStore::new(config.telemetry.tick_capacity));
        let broadcast_state = Arc::new(BroadcastState::new());
        let catalyst = Arc::new(CatalystStore::new());
        let risk = Arc::new(RiskLedger::new());
        let journal = Arc::new(TradeJournal::new(&config.journal_path));

        let router = StrategyRouter::new(&config.strategies, config.signals.base_boost);
        let evaluator = EdgeEvaluator::new(
            config.signals.clone(),
            config.trading.clone(),
            config.risk.clone(),
            config.strategies.clone(),
            config.bankroll,
        );
        let positions = Arc::new(PositionManager::new(
            config.position.clone(),
            config.trading.order_timeout(),
            feed.clone(),
            executor.clone(),
            risk.clone(),
            journal,
        ));
        let reconciler = Reconciler::new(config.reconcile.clone(), ledger, positions.clone());
        let passive = PassiveQuoter::new(
            config.passive.clone(),
            executor.clone(),
            config.trading.order_timeout(),
        );
        let (shutdown_tx, _) = broadcast::channel(4);

        Self {
            config,
            feed,
            executor,
            catalyst_source,
            telemetry,
            broadcast: broadcast_state,
            catalyst,
            risk,
            router,
            evaluator,
            positions,
            reconciler,
            passive,
            latest_markets: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    pub fn positions(&self) -> Arc<PositionManager> {
        self.positions.clone()
    }

    /// Run all loops until shutdown, then drain exits.
    pub async fn run(self: Arc<Self>) {
        info!(
            mode = %self.config.mode,
            assets = ?self.config.assets,
            bankroll = %self.config.bankroll,
            "engine starting"
        );

        let handles: Vec<JoinHandle<()>> = vec![
            self.clone().spawn_loop(
                "feed",
                Duration::from_secs(self.config.trading.feed_interval_secs),
                |engine| async move { engine.feed_cycle().await },
            ),
            self.clone().spawn_loop(
                "scan",
                Duration::from_secs(self.config.trading.scan_interval_secs),
                |engine| async move { engine.scan_cycle().await },
            ),
            self.clone().spawn_loop(
                "monitor",
                Duration::from_secs(self.config.trading.monitor_interval_secs),
                |engine| async move { engine.positions.monitor_once(Utc::now()).await },
            ),
            self.clone().spawn_loop(
                "passive",
                Duration::from_secs(60),
                |engine| async move { engine.passive_cycle().await },
            ),
            self.clone().spawn_loop(
                "catalyst",
                Duration::from_secs(self.config.trading.catalyst_poll_secs),
                |engine| async move { engine.catalyst_cycle().await },
            ),
            self.clone().spawn_loop(
                "reconcile",
                Duration::from_secs(self.config.trading.reconcile_interval_secs),
                |engine| async move { engine.reconcile_cycle().await },
            ),
        ];

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "task join failed");
            }
        }

        // Drain in-flight exits before the process is allowed to stop.
        self.positions.close_all().await;

        let stats = self.positions.session_stats();
        info!(
            trades = stats.closed,
            wins = stats.wins,
            pnl = %stats.total_pnl,
            "session complete"
        );
    }

    /// Spawn one perpetual loop: run a cycle, sleep, repeat; exit on
    /// shutdown. A cycle's panic-free errors are handled inside the
    /// cycle functions themselves.
    fn spawn_loop<F, Fut>(
        self: Arc<Self>,
        name: &'static str,
        interval: Duration,
        cycle: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Engine>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            info!(task = name, interval_secs = interval.as_secs(), "loop started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(task = name, "loop stopping");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        cycle(self.clone()).await;
                    }
                }
            }
        })
    }

    /// Refresh spot ticks and the funding cache for every configured
    /// asset. This loop is the only writer of telemetry.
    async fn feed_cycle(&self) {
        let now = Utc::now();
        for asset in &self.config.assets {
            match self.feed.spot_price(*asset).await {
                Ok(price) => self.telemetry.record_tick(*asset, price, now),
                Err(e) => debug!(asset = %asset, error = %e, "spot refresh failed"),
            }

            let ttl = chrono::Duration::seconds(self.config.telemetry.funding_ttl_secs);
            if self.telemetry.funding_stale(*asset, ttl, now) {
                match self.feed.funding_rate(*asset).await {
                    Ok(rate) => self.telemetry.store_funding(*asset, rate, now),
                    Err(e) => debug!(asset = %asset, error = %e, "funding refresh failed"),
                }
            }
        }
    }

    /// One scan pass: evaluate every active market and enter where the
    /// gate passes.
    async fn scan_cycle(&self) {
        let markets = match self.feed.active_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "market scan failed");
                return;
            }
        };
        info!(count = markets.len(), "scanned active markets");

        // Anchor first, so the broadcast write precedes dependent reads.
        let markets = self.router.order_for_scan(markets);
        *self.latest_markets.write() = markets.clone();

        for market in &markets {
            if self.positions.has_open(&market.market_id) {
                debug!(market_id = %market.market_id, "gate: position open - skip");
                continue;
            }
            if self.positions.open_count() >= self.config.trading.max_positions {
                info!(
                    cap = self.config.trading.max_positions,
                    "gate: at position capacity - stopping scan"
                );
                break;
            }

            let now = Utc::now();
            let routed = self.router.route(market);
            let telemetry = routed
                .asset
                .map(|a| self.telemetry.snapshot(a))
                .unwrap_or_default();
            let anchor_telemetry = self.telemetry.snapshot(self.router.anchor());
            let risk = self.risk.snapshot(now);

            let verdict = self.evaluator.evaluate(
                market,
                routed.asset,
                &routed.profile,
                &telemetry,
                &anchor_telemetry,
                &self.broadcast,
                &self.catalyst,
                &risk,
                now,
            );

            // Anchor broadcast: a passing directional read on a big
            // window move opens the lag window for dependents.
            if routed.asset == Some(self.router.anchor()) && verdict.pass {
                if let (Some(direction), Some(pct_move)) =
                    (verdict.direction, telemetry.pct_move_from_open())
                {
                    if pct_move.abs() >= self.config.strategies.lag.min_anchor_move {
                        self.broadcast.publish(BroadcastSignal {
                            asset: self.router.anchor(),
                            direction,
                            magnitude: pct_move,
                            fired_at: now,
                            expires_at: now
                                + chrono::Duration::seconds(self.config.strategies.lag.expiry_secs),
                        });
                    }
                }
            }

            if verdict.pass {
                self.enter_position(market, &verdict).await;
            }
        }
    }

    /// Place the entry order and register the position. Registration
    /// happens if and only if placement confirmed; the registry is
    /// re-checked right before placement so no interleaved task can
    /// double-enter the market.
    async fn enter_position(&self, market: &Market, verdict: &crate::strategy::EdgeVerdict) {
        let Some(direction) = verdict.direction else {
            return;
        };
        if self.positions.has_open(&market.market_id) {
            warn!(market_id = %market.market_id, "entry aborted: position appeared mid-scan");
            return;
        }

        let Some(limit_price) =
            entry_limit_price(market, direction, self.config.trading.slippage_tolerance)
        else {
            warn!(market_id = %market.market_id, "entry aborted: no limit price");
            return;
        };
        if limit_price <= Decimal::ZERO {
            return;
        }
        let shares = (verdict.stake / limit_price).round_dp(4);

        info!(
            market_id = %market.market_id,
            strategy = %verdict.strategy,
            side = %direction,
            credits = verdict.total_credits,
            edge = %verdict.edge,
            stake = %verdict.stake,
            limit = %limit_price,
            "edge found - placing entry order"
        );

        let request = OrderRequest::new(
            &market.market_id,
            market.token_for(direction),
            direction,
            Side::Buy,
            limit_price,
            shares,
        );
        let confirmation = match place_with_timeout(
            self.executor.as_ref(),
            &request,
            self.config.trading.order_timeout(),
        )
        .await
        {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(
                    market_id = %market.market_id,
                    error = %e,
                    "order failed - position not registered"
                );
                return;
            }
        };

        let position = Position::from_confirmed_order(
            market.market_id.clone(),
            market.question.clone(),
            verdict.asset,
            direction,
            market.token_for(direction).to_string(),
            verdict.stake,
            market.deadline,
            verdict.strategy_label(),
            confirmation,
        );
        match self.positions.register(position) {
            Ok(()) => self.risk.record_open(verdict.stake, Utc::now()),
            Err(e) => {
                // Invariant violation: confirmed order for an already
                // open market. Surfaced loudly, never swallowed.
                error!(market_id = %market.market_id, error = %e, "registration rejected");
            }
        }
    }

    async fn passive_cycle(&self) {
        let markets = self.latest_markets.read().clone();
        if markets.is_empty() {
            return;
        }
        self.passive
            .tick(&markets, &self.positions, Utc::now())
            .await;
    }

    /// Poll the external catalyst source. The watcher only sets the
    /// flag; clearing on expiry is owned by the evaluator that checks
    /// it.
    async fn catalyst_cycle(&self) {
        match self.catalyst_source.poll().await {
            Ok(Some(flag)) => {
                info!(
                    asset = %flag.asset,
                    direction = %flag.direction,
                    reason = %flag.reason,
                    "catalyst flag set"
                );
                self.catalyst.set(flag);
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "catalyst poll failed"),
        }
    }

    async fn reconcile_cycle(&self) {
        let markets = self.latest_markets.read().clone();
        match self.reconciler.reconcile(&markets, Utc::now()).await {
            Ok(report) => {
                if !report.adopted.is_empty() {
                    info!(count = report.adopted.len(), "reconcile: orphans adopted");
                }
            }
            Err(e) => warn!(error = %e, "reconcile failed"),
        }
    }
}
