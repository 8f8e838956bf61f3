//! The feature write path: snapshot updates and ring reads.
//!
//! A push writes the reading into the current feature row *and* into the
//! history ring at the layer's write head, then advances the shared head.
//! On the parallel lane the row write is a kernel over the feature
//! dimension, avoiding per-element host stores.

use tracing::instrument;

use crate::{
    backend::launch,
    dense::DenseMatrix,
    error::{GraphError, Result},
    graph::{LayerTag, LayeredHypergraph},
};

impl LayeredHypergraph {
    /// Pushes a feature reading for one vertex: the first
    /// `min(values.len(), d_l)` channels update the snapshot row and the
    /// ring slot at the write head, and the layer's clock advances. A
    /// wider reading grows the layer's feature dimension, zero-padding
    /// every pre-existing row and history slot.
    ///
    /// # Errors
    /// Fails with `LayerNotFound` / `VertexNotFound` when the layer is
    /// not materialised or the vertex is not indexed.
    #[instrument(
        name = "core.push_features",
        err,
        skip(self, values),
        fields(farm_id = %self.farm_id(), channels = values.len())
    )]
    pub fn push_features(
        &mut self,
        layer: LayerTag,
        vertex_id: &str,
        values: &[f32],
    ) -> Result<()> {
        let row = self
            .vertex_row(vertex_id)
            .ok_or_else(|| GraphError::VertexNotFound {
                vertex: vertex_id.to_owned(),
            })?;
        let backend = self.kernel_backend();
        let available = self.available_layers();
        let stored = self
            .layers
            .get_mut(&layer)
            .ok_or_else(|| GraphError::LayerNotFound {
                layer: layer.as_str().to_owned(),
                available,
            })?;

        if values.len() > stored.features.cols() {
            stored.features.grow_cols(values.len());
            stored.history.grow_width(values.len());
        }
        let width = stored.features.cols();
        let offset = row * width;
        let snapshot_row = &mut stored.features.data_mut()[offset..offset + width];
        launch(backend, snapshot_row, |feature| {
            values.get(feature).copied().unwrap_or(0.0)
        })?;
        stored.history.record(row, values);
        stored.history.advance();
        Ok(())
    }

    /// Returns one vertex's history in a layer as a `d_l × L` matrix,
    /// oldest reading first, host-resident.
    ///
    /// # Errors
    /// Fails with `LayerNotFound` / `VertexNotFound` when the layer is
    /// not materialised or the vertex is not indexed.
    pub fn get_history(&self, layer: LayerTag, vertex_id: &str) -> Result<DenseMatrix> {
        let stored = self.layer_or_err(layer)?;
        let row = self
            .vertex_row(vertex_id)
            .ok_or_else(|| GraphError::VertexNotFound {
                vertex: vertex_id.to_owned(),
            })?;
        Ok(stored.history.vertex_history(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use loam_test_support::two_layer_config;

    fn graph() -> LayeredHypergraph {
        LayeredHypergraph::build(&two_layer_config("farm-h")).expect("fixture is valid")
    }

    #[test]
    fn push_updates_snapshot_and_ring_together() {
        let mut graph = graph();
        graph
            .push_features(LayerTag::Soil, "v1", &[0.31, 18.5, 1.2, 6.8])
            .expect("v1 is indexed");
        let soil = graph.layer(LayerTag::Soil).expect("soil is materialised");
        let row = graph.vertex_row("v1").expect("v1 is indexed");
        assert_eq!(soil.features().get(row, 0), 0.31);
        assert_eq!(soil.history().len(), 1);
        assert_eq!(soil.history().head(), 1);
        assert_eq!(soil.history().value_back(row, 0, 0), Some(0.31));
    }

    #[test]
    fn push_saturates_length_at_ring_depth() {
        let mut graph = graph();
        let depth = graph.history_depth();
        for step in 0..depth + 5 {
            graph
                .push_features(LayerTag::Soil, "v1", &[step as f32, 0.0, 0.0, 0.0])
                .expect("v1 is indexed");
        }
        let soil = graph.layer(LayerTag::Soil).expect("soil is materialised");
        assert_eq!(soil.history().len(), depth);
        let history = graph
            .get_history(LayerTag::Soil, "v1")
            .expect("history exists");
        assert_eq!(history.cols(), depth);
        assert_eq!(history.get(0, depth - 1), (depth + 4) as f32);
        assert_eq!(history.get(0, 0), 5.0);
    }

    #[test]
    fn wider_push_grows_the_layer_dimension() {
        let mut graph = graph();
        let wide = vec![1.0; LayerTag::Soil.feature_width() + 2];
        graph
            .push_features(LayerTag::Soil, "v2", &wide)
            .expect("v2 is indexed");
        let soil = graph.layer(LayerTag::Soil).expect("soil is materialised");
        assert_eq!(soil.features().cols(), wide.len());
        assert_eq!(soil.history().width(), wide.len());
        let untouched = graph.vertex_row("v1").expect("v1 is indexed");
        assert_eq!(soil.features().get(untouched, wide.len() - 1), 0.0);
    }

    #[test]
    fn unknown_targets_fail_with_typed_errors() {
        let mut graph = graph();
        let err = graph
            .push_features(LayerTag::Vision, "v1", &[1.0])
            .expect_err("vision is not materialised");
        assert!(matches!(err, CoreError::Graph(GraphError::LayerNotFound { .. })));
        let err = graph
            .push_features(LayerTag::Soil, "ghost", &[1.0])
            .expect_err("ghost is not indexed");
        assert!(matches!(err, CoreError::Graph(GraphError::VertexNotFound { .. })));
    }
}
