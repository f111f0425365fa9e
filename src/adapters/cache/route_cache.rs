//! Route Status Cache - Active Order Routes With Reference Dependencies
//!
//! Routes are registered by order management and removed when the route
//! closes. The adjuster mutates reference fields in place through
//! [`RouteStatusCache::update`].

use dashmap::DashMap;
use tracing::debug;

use crate::domain::route::{RouteId, RouteStatus};
use crate::ports::store::SnapshotSource;

/// Concurrent route id -> route status cache.
#[derive(Default)]
pub struct RouteStatusCache {
    routes: DashMap<RouteId, RouteStatus>,
}

impl RouteStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a route.
    pub fn register(&self, route: RouteStatus) {
        debug!(
            route_id = %route.route_id,
            reference = %route.reference_ticker,
            strategy = %route.strategy,
            "route registered"
        );
        self.routes.insert(route.route_id.clone(), route);
    }

    /// Drop a closed route, returning its final state.
    pub fn close(&self, route_id: &str) -> Option<RouteStatus> {
        self.routes.remove(route_id).map(|(_, route)| route)
    }

    pub fn get(&self, route_id: &str) -> Option<RouteStatus> {
        self.routes.get(route_id).map(|r| r.value().clone())
    }

    /// Ids of every route driven by the given reference ticker.
    pub fn routes_for_reference(&self, reference_ticker: &str) -> Vec<RouteId> {
        self.routes
            .iter()
            .filter(|r| r.reference_ticker == reference_ticker)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Mutate a route in place. Returns `None` if the route has closed.
    pub fn update<R>(&self, route_id: &str, f: impl FnOnce(&mut RouteStatus) -> R) -> Option<R> {
        self.routes.get_mut(route_id).map(|mut r| f(r.value_mut()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl SnapshotSource<RouteStatus> for RouteStatusCache {
    fn snapshot(&self) -> Vec<RouteStatus> {
        self.routes.iter().map(|r| r.value().clone()).collect()
    }
}
