//! Venue adapter capability interface and the registry of live handles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::types::{Balance, OrderResult, Quote, VenueId, VenueRules};
use crate::error::{ValidationError, VenueError};
use crate::orderbook::OrderBook;
use crate::trading::ExecutionLeg;

/// Stream of quotes produced by one venue.
pub type QuoteStream = BoxStream<'static, Quote>;

/// Fixed capability set every venue implementation provides.
///
/// Wire protocols, authentication and retries live behind this trait.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue identifier.
    fn id(&self) -> &VenueId;

    /// Open connectivity for the given symbols.
    async fn connect(&self, symbols: &[String]) -> bool;

    /// Live top-of-book stream for the given symbols.
    fn watch_quotes(&self, symbols: &[String]) -> QuoteStream;

    /// Fetch an L2 snapshot with up to `depth` levels per side.
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, VenueError>;

    /// Place one order.
    async fn place_order(&self, leg: &ExecutionLeg) -> Result<OrderResult, VenueError>;

    /// Cancel an order. `Ok(false)` means nothing was left open to cancel.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<bool, VenueError>;

    /// Balances keyed by asset code.
    async fn fetch_balances(&self) -> Result<HashMap<String, Balance>, VenueError>;

    /// Liveness probe.
    async fn health_check(&self) -> bool;
}

/// A live adapter plus its precision rules.
#[derive(Clone)]
pub struct VenueHandle {
    /// Adapter implementation.
    pub adapter: Arc<dyn VenueAdapter>,
    /// Precision and minimum-notional rules.
    pub rules: VenueRules,
}

impl std::fmt::Debug for VenueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueHandle")
            .field("venue", self.adapter.id())
            .field("rules", &self.rules)
            .finish()
    }
}

/// Registry resolving venue ids to live adapter handles.
#[derive(Debug, Clone, Default)]
pub struct VenueRegistry {
    handles: HashMap<VenueId, VenueHandle>,
}

impl VenueRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own id.
    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>, rules: VenueRules) {
        let id = adapter.id().clone();
        self.handles.insert(id, VenueHandle { adapter, rules });
    }

    /// Builder-style registration.
    pub fn with(mut self, adapter: Arc<dyn VenueAdapter>, rules: VenueRules) -> Self {
        self.register(adapter, rules);
        self
    }

    /// Resolve a venue to its handle.
    pub fn resolve(&self, venue: &VenueId) -> Result<&VenueHandle, ValidationError> {
        self.handles
            .get(venue)
            .ok_or_else(|| ValidationError::UnknownVenue(venue.clone()))
    }

    /// All registered handles.
    pub fn handles(&self) -> impl Iterator<Item = &VenueHandle> {
        self.handles.values()
    }

    /// Number of registered venues.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no venue is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::PaperVenue;

    #[test]
    fn resolve_unknown_venue_fails() {
        let registry = VenueRegistry::new()
            .with(Arc::new(PaperVenue::new("left")), VenueRules::default());

        assert!(registry.resolve(&VenueId::from("left")).is_ok());
        assert_eq!(
            registry.resolve(&VenueId::from("nowhere")).unwrap_err(),
            ValidationError::UnknownVenue(VenueId::from("nowhere"))
        );
        assert_eq!(registry.len(), 1);
    }
}
