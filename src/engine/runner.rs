//! The detection and execution loop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::events::{EngineEvent, EVENT_CAPACITY};
use crate::arbitrage::{ExecutionCoordinator, Opportunity, OpportunityDetector};
use crate::error::EngineError;
use crate::orderbook::QuoteConsolidator;
use crate::risk::{RiskAlert, RiskGovernor, Severity};
use crate::session::{JournalEntry, JournalSink, SessionController, SessionSummary};
use crate::trading::ExecutionResult;
use crate::utils::now_ms;
use crate::venue::{VenueId, VenueRegistry};

/// Loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// First venue of the pair.
    pub left_venue: VenueId,
    /// Second venue of the pair.
    pub right_venue: VenueId,
    /// Symbols to watch on both venues.
    pub symbols: Vec<String>,
    /// Detection tick.
    pub detection_interval_ms: u64,
    /// Consolidated quotes untouched for this long are dropped.
    pub evict_after_ms: i64,
    /// How long to wait for in-flight executions on shutdown.
    pub drain_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            left_venue: VenueId::from("left"),
            right_venue: VenueId::from("right"),
            symbols: vec!["ETH/USDT".to_string()],
            detection_interval_ms: 200,
            evict_after_ms: 60_000,
            drain_timeout_ms: 5_000,
        }
    }
}

/// Shared state readable while the engine runs.
#[derive(Clone)]
pub struct EngineHandles {
    /// Risk governor.
    pub risk: Arc<RwLock<RiskGovernor>>,
    /// Session controller.
    pub session: Arc<RwLock<SessionController>>,
    /// Latest consolidated quotes.
    pub quotes: Arc<QuoteConsolidator>,
    /// Event bus.
    pub events: broadcast::Sender<EngineEvent>,
}

/// Ties venues, detection, risk, execution and the session together.
pub struct TradingEngine {
    config: EngineConfig,
    registry: Arc<VenueRegistry>,
    consolidator: Arc<QuoteConsolidator>,
    detector: OpportunityDetector,
    executor: Arc<ExecutionCoordinator>,
    risk: Arc<RwLock<RiskGovernor>>,
    session: Arc<RwLock<SessionController>>,
    journal: Arc<dyn JournalSink>,
    events: broadcast::Sender<EngineEvent>,
    in_flight: Arc<DashSet<String>>,
    fatal_rx: mpsc::UnboundedReceiver<EngineError>,
}

impl TradingEngine {
    /// Wire an engine. The coordinator's fatal alerts are routed to the loop.
    pub fn new(
        config: EngineConfig,
        registry: Arc<VenueRegistry>,
        detector: OpportunityDetector,
        executor: ExecutionCoordinator,
        risk: RiskGovernor,
        session: SessionController,
        journal: Arc<dyn JournalSink>,
    ) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let consolidator = QuoteConsolidator::new(
            config.left_venue.clone(),
            config.right_venue.clone(),
            detector.config().max_venue_clock_skew_ms,
        );

        Self {
            config,
            registry,
            consolidator: Arc::new(consolidator),
            detector,
            executor: Arc::new(executor.with_fatal_alerts(fatal_tx)),
            risk: Arc::new(RwLock::new(risk)),
            session: Arc::new(RwLock::new(session)),
            journal,
            events,
            in_flight: Arc::new(DashSet::new()),
            fatal_rx,
        }
    }

    /// Handles for status reporting and operator actions.
    pub fn handles(&self) -> EngineHandles {
        EngineHandles {
            risk: self.risk.clone(),
            session: self.session.clone(),
            quotes: self.consolidator.clone(),
            events: self.events.clone(),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Run until shutdown, the session bound, a risk stop or an unhedged
    /// position. The session is exported in every case.
    ///
    /// Returns the summary on a clean stop, [`EngineError::RiskLimitExceeded`]
    /// when the breaker tripped and [`EngineError::UnwindFailure`] when an
    /// unwind failed.
    #[instrument(skip_all, fields(left = %self.config.left_venue, right = %self.config.right_venue))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<SessionSummary, EngineError> {
        self.connect().await?;
        let ingest = self.spawn_ingest();

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ExecutionResult>();
        let mut ticker = interval(Duration::from_millis(self.config.detection_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop: Option<EngineError> = None;

        info!(symbols = ?self.config.symbols, "Trading engine started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                }
                Some(result) = result_rx.recv() => {
                    if let Some(err) = self.on_result(result).await {
                        stop = Some(err);
                        break;
                    }
                }
                Some(alert) = self.fatal_rx.recv() => {
                    self.on_fatal_alert(&alert).await;
                }
                _ = ticker.tick() => {
                    let now = now_ms();
                    if !self.session.read().await.should_continue(now) {
                        info!("Session bound reached");
                        break;
                    }
                    self.tick(now, &result_tx).await;
                }
            }
        }

        self.drain(&mut result_rx, &mut stop).await;
        for handle in ingest {
            handle.abort();
        }

        let summary = self.session.read().await.export(self.journal.as_ref(), now_ms()).await;
        self.broadcast(EngineEvent::SessionSummary(summary.clone()));
        info!(
            trades = summary.trades,
            total_pnl = %summary.total_pnl,
            stopped_by = ?stop.as_ref().map(|e| e.to_string()),
            "Trading engine stopped"
        );

        match stop {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn connect(&self) -> Result<(), EngineError> {
        let symbols = &self.config.symbols;
        let results = join_all(self.registry.handles().map(|handle| {
            let adapter = handle.adapter.clone();
            async move { (adapter.id().clone(), adapter.connect(symbols).await) }
        }))
        .await;

        let failed: Vec<String> = results
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(venue, _)| venue.to_string())
            .collect();
        if !failed.is_empty() {
            error!(venues = ?failed, "Venue connection failed");
            return Err(EngineError::ConnectFailed(failed.join(", ")));
        }
        Ok(())
    }

    fn spawn_ingest(&self) -> Vec<JoinHandle<()>> {
        self.registry
            .handles()
            .map(|handle| {
                let adapter = handle.adapter.clone();
                let consolidator = self.consolidator.clone();
                let symbols = self.config.symbols.clone();
                tokio::spawn(async move {
                    let venue = adapter.id().clone();
                    let mut quotes = adapter.watch_quotes(&symbols);
                    while let Some(mut quote) = quotes.next().await {
                        quote.received_at_ms = now_ms();
                        if let Err(e) = consolidator.update(quote) {
                            debug!(venue = %venue, error = %e, "Quote dropped");
                        }
                    }
                    warn!(venue = %venue, "Quote stream ended");
                })
            })
            .collect()
    }

    async fn tick(&self, now: i64, result_tx: &mpsc::UnboundedSender<ExecutionResult>) {
        let evicted = self.consolidator.evict(self.config.evict_after_ms, now);
        if evicted > 0 {
            debug!(evicted, "Evicted idle symbols");
        }

        let views: Vec<_> = self
            .consolidator
            .fresh(self.detector.config().min_book_bbo_age_ms, now)
            .into_iter()
            .filter(|view| !self.in_flight.contains(&view.symbol))
            .collect();
        if views.is_empty() {
            return;
        }

        for opportunity in self.detector.scan(&views, now) {
            self.on_opportunity(opportunity, now, result_tx).await;
        }
    }

    async fn on_opportunity(
        &self,
        opportunity: Opportunity,
        now: i64,
        result_tx: &mpsc::UnboundedSender<ExecutionResult>,
    ) {
        self.session.write().await.record_opportunity(&opportunity);
        self.journal(JournalEntry::Opportunity(opportunity.clone())).await;
        self.broadcast(EngineEvent::OpportunityDetected(opportunity.clone()));

        {
            let mut risk = self.risk.write().await;
            if let Err(rejection) = risk.check(&opportunity, now) {
                info!(id = %opportunity.id, reason = %rejection, "Opportunity blocked by risk");
                return;
            }
            if !self.in_flight.insert(opportunity.symbol.clone()) {
                return;
            }
            risk.reserve(opportunity.notional);
        }

        let executor = self.executor.clone();
        let tx = result_tx.clone();
        tokio::spawn(async move {
            let result = executor.execute(&opportunity, now_ms()).await;
            if tx.send(result).is_err() {
                warn!(id = %opportunity.id, "Engine gone before execution result");
            }
        });
    }

    /// Book a result. Returns the error that stops the loop, if any.
    async fn on_result(&self, result: ExecutionResult) -> Option<EngineError> {
        self.journal(JournalEntry::Execution(result.clone())).await;
        self.broadcast(EngineEvent::ExecutionCompleted(result.clone()));

        let stop_reason = {
            let mut risk = self.risk.write().await;
            risk.update(&result, now_ms());
            risk.should_stop(Some(&result))
        };
        self.session.write().await.record_trade(&result);
        self.in_flight.remove(&result.opportunity.symbol);

        if result.is_fatal() {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "unwind failed".to_string());
            let venue = result
                .unwind
                .as_ref()
                .map(|u| u.venue.clone())
                .unwrap_or_else(|| result.opportunity.buy_venue.clone());
            self.trip(format!("unhedged position on {venue}: {reason}")).await;
            return Some(EngineError::UnwindFailure {
                venue,
                symbol: result.opportunity.symbol.clone(),
                reason,
            });
        }

        if let Some(reason) = stop_reason {
            let reason = reason.to_string();
            self.trip(reason.clone()).await;
            return Some(EngineError::RiskLimitExceeded(reason));
        }
        None
    }

    async fn on_fatal_alert(&self, alert: &EngineError) {
        let alert = RiskAlert::new("unwind_failure", Severity::Critical, alert.to_string());
        self.journal(JournalEntry::RiskAlert(alert.clone())).await;
        self.broadcast(EngineEvent::RiskAlert(alert));
    }

    async fn trip(&self, reason: String) {
        let alert = self.risk.write().await.halt(reason);
        self.journal(JournalEntry::RiskAlert(alert.clone())).await;
        self.broadcast(EngineEvent::RiskAlert(alert));
    }

    /// Wait for in-flight executions so none is left unbooked.
    async fn drain(
        &mut self,
        result_rx: &mut mpsc::UnboundedReceiver<ExecutionResult>,
        stop: &mut Option<EngineError>,
    ) {
        let deadline = Instant::now() + Duration::from_millis(self.config.drain_timeout_ms);
        while !self.in_flight.is_empty() {
            match timeout_at(deadline, result_rx.recv()).await {
                Ok(Some(result)) => {
                    if let Some(err) = self.on_result(result).await {
                        if stop.is_none() || matches!(err, EngineError::UnwindFailure { .. }) {
                            *stop = Some(err);
                        }
                    }
                }
                _ => {
                    warn!(pending = self.in_flight.len(), "Executions still in flight at shutdown");
                    break;
                }
            }
        }
        while let Ok(alert) = self.fatal_rx.try_recv() {
            self.on_fatal_alert(&alert).await;
        }
    }

    async fn journal(&self, entry: JournalEntry) {
        if let Err(e) = self.journal.record(&entry).await {
            error!(event = entry.label(), error = %e, "Journal write failed");
        }
    }

    fn broadcast(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
