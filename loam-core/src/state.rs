//! Process-wide state: the graph cache and the trained residual cell.
//!
//! Both live behind one [`ProcessState`] object so tests can construct
//! isolated instances; the convenience singleton exists for callers that
//! hold no state of their own. Writes are serialised per entry by the
//! cache's shard locks; readers take snapshots. The external lifecycle
//! manager is expected to call [`ProcessState::clear_cache`] on
//! shutdown.

use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::graph::LayeredHypergraph;

static GLOBAL: Lazy<ProcessState> = Lazy::new(ProcessState::new);

/// Owns everything that outlives a single entry-point call.
#[derive(Debug, Default)]
pub struct ProcessState {
    graphs: DashMap<String, LayeredHypergraph>,
    residual: RwLock<Option<Vec<f32>>>,
}

impl ProcessState {
    /// Creates an empty state. Tests construct their own so runs stay
    /// isolated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide singleton.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Caches a graph under its farm identifier, replacing any previous
    /// entry.
    pub fn cache_graph(&self, graph: LayeredHypergraph) {
        debug!(farm_id = %graph.farm_id(), "caching graph");
        self.graphs.insert(graph.farm_id().to_owned(), graph);
    }

    /// Returns a snapshot of the cached graph for a farm, if any.
    #[must_use]
    pub fn get_cached_graph(&self, farm_id: &str) -> Option<LayeredHypergraph> {
        self.graphs.get(farm_id).map(|entry| entry.value().clone())
    }

    /// Drops one farm's cached graph. Returns whether an entry existed.
    pub fn evict_graph(&self, farm_id: &str) -> bool {
        self.graphs.remove(farm_id).is_some()
    }

    /// Number of cached graphs.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.graphs.len()
    }

    /// Releases every cached graph, device- and host-resident alike.
    pub fn clear_cache(&self) {
        let released = self.graphs.len();
        self.graphs.clear();
        info!(released, "graph cache cleared");
    }

    /// Stores (or clears) the trained residual coefficients.
    pub fn set_residual(&self, coefficients: Option<Vec<f32>>) {
        let mut cell = self
            .residual
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cell = coefficients;
    }

    /// Snapshot of the trained residual coefficients, if any.
    #[must_use]
    pub fn residual(&self) -> Option<Vec<f32>> {
        self.residual
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LayeredHypergraph;
    use loam_test_support::two_layer_config;

    #[test]
    fn cache_round_trips_by_farm_id() {
        let state = ProcessState::new();
        let graph = LayeredHypergraph::build(&two_layer_config("farm-c"))
            .expect("fixture is valid");
        state.cache_graph(graph.clone());
        assert_eq!(state.get_cached_graph("farm-c"), Some(graph));
        assert!(state.get_cached_graph("elsewhere").is_none());
    }

    #[test]
    fn evict_and_clear_release_entries() {
        let state = ProcessState::new();
        for farm in ["a", "b"] {
            state.cache_graph(
                LayeredHypergraph::build(&two_layer_config(farm)).expect("fixture is valid"),
            );
        }
        assert!(state.evict_graph("a"));
        assert!(!state.evict_graph("a"));
        assert_eq!(state.cached_count(), 1);
        state.clear_cache();
        assert_eq!(state.cached_count(), 0);
    }

    #[test]
    fn residual_cell_takes_snapshots() {
        let state = ProcessState::new();
        assert!(state.residual().is_none());
        state.set_residual(Some(vec![0.1, -0.2]));
        assert_eq!(state.residual(), Some(vec![0.1, -0.2]));
        state.set_residual(None);
        assert!(state.residual().is_none());
    }
}
