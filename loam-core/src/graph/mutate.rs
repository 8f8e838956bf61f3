//! Topology mutation: hyperedge insertion/removal and vertex addition.
//!
//! Mutation is in-place; the graph exclusively owns its storage, so these
//! are the only entry points that write. Inserting into an unmaterialised
//! layer creates it with zero-initialised features for all existing
//! vertices.

use tracing::{instrument, warn};

use crate::{
    error::GraphError,
    graph::{Layer, LayerTag, LayeredHypergraph},
};

impl LayeredHypergraph {
    /// Adds a hyperedge to a layer, creating the layer when absent.
    /// Member ids that are not indexed vertices are dropped; when every
    /// member drops, the edge is skipped and `false` is returned.
    #[instrument(name = "core.add_hyperedge", skip(self, metadata), fields(farm_id = %self.farm_id()))]
    pub fn add_hyperedge(
        &mut self,
        layer: LayerTag,
        edge_id: &str,
        vertex_ids: &[String],
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        let members: Vec<usize> = vertex_ids
            .iter()
            .filter_map(|id| {
                let row = self.vertex_row(id);
                if row.is_none() {
                    warn!(edge = edge_id, vertex = %id, "dropping unknown member vertex");
                }
                row
            })
            .collect();
        if members.is_empty() {
            warn!(edge = edge_id, "skipping hyperedge with no indexed members");
            return false;
        }
        let (vertices, depth) = (self.vertex_count(), self.history_depth());
        let stored = self
            .layers
            .entry(layer)
            .or_insert_with(|| Layer::empty(layer, vertices, depth));
        stored.incidence.push_column(&members);
        stored.edge_ids.push(edge_id.to_owned());
        stored.edge_metadata.push(metadata);
        true
    }

    /// Removes a hyperedge column and its metadata. Returns `false` when
    /// the layer or the edge is unknown.
    #[instrument(name = "core.remove_hyperedge", skip(self), fields(farm_id = %self.farm_id()))]
    pub fn remove_hyperedge(&mut self, layer: LayerTag, edge_id: &str) -> bool {
        let Some(stored) = self.layers.get_mut(&layer) else {
            return false;
        };
        let Some(col) = stored.edge_ids.iter().position(|id| id == edge_id) else {
            return false;
        };
        stored.incidence.remove_column(col);
        stored.edge_ids.remove(col);
        stored.edge_metadata.remove(col);
        true
    }

    /// Indexes a new vertex, appending a zero row to every layer's
    /// incidence, features, and history.
    ///
    /// # Errors
    /// Fails with [`GraphError::DuplicateVertex`] when the id is already
    /// indexed.
    #[instrument(name = "core.add_vertex", err, skip(self), fields(farm_id = %self.farm_id()))]
    pub fn add_vertex(&mut self, vertex_id: &str) -> Result<(), GraphError> {
        if self.vertex_index.contains_key(vertex_id) {
            return Err(GraphError::DuplicateVertex {
                vertex: vertex_id.to_owned(),
            });
        }
        let row = self.vertex_ids.len();
        self.vertex_ids.push(vertex_id.to_owned());
        self.vertex_index.insert(vertex_id.to_owned(), row);
        for stored in self.layers.values_mut() {
            stored.incidence.push_empty_row();
            stored.features.push_zero_row();
            stored.history.push_zero_vertex();
        }
        Ok(())
    }
}
