//! Read-side queries: cross-layer reductions, vertex lookups, edge
//! aggregation, and multi-layer feature assembly.
//!
//! Absence semantics follow the contract's dual: missing layers on the
//! *query precondition* path (`cross_layer_query`, `aggregate_by_edge`,
//! `multi_layer_features`) fail with a typed error, while the per-vertex
//! lookup returns a miss record so read-only dashboards never throw.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    dense::DenseMatrix,
    error::Result,
    graph::{LayerTag, LayeredHypergraph},
};

/// Reduction applied per hyperedge over member feature rows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeReducer {
    /// Column sums of member rows: `Bᵀ · F`.
    Sum,
    /// Column means, dividing by `max(degree, 1)`.
    Mean,
    /// Per-feature minimum over members (host loop).
    Min,
    /// Per-feature maximum over members (host loop).
    Max,
}

/// Outcome of a per-vertex layer lookup. Misses are data, not failures.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VertexQuery {
    /// The vertex is indexed and the layer is materialised.
    Found {
        /// The queried vertex id.
        vertex_id: String,
        /// The queried layer tag.
        layer: String,
        /// Hyperedges of this layer the vertex belongs to.
        edge_ids: Vec<String>,
        /// The vertex's current feature row.
        features: Vec<f32>,
    },
    /// The layer or the vertex does not exist.
    Missing {
        /// What was missing, naming the entity.
        error: String,
        /// Alternatives the caller could query instead.
        available: Vec<String>,
    },
}

impl LayeredHypergraph {
    /// Counts, for every hyperedge pair across two layers, the vertices
    /// the pair shares: the dense `|E_a| × |E_b|` matrix `Bᵀ_a · B_b`.
    ///
    /// # Errors
    /// Fails with `LayerNotFound` when either layer is not materialised.
    #[instrument(name = "core.cross_layer_query", err, skip(self), fields(farm_id = %self.farm_id()))]
    pub fn cross_layer_query(&self, layer_a: LayerTag, layer_b: LayerTag) -> Result<DenseMatrix> {
        let a = self.layer_or_err(layer_a)?;
        let b = self.layer_or_err(layer_b)?;
        let shared = a
            .incidence
            .transpose_product(&b.incidence, self.kernel_backend())?;
        Ok(shared)
    }

    /// Looks one vertex up in one layer, returning its edge memberships
    /// and current feature row, or a miss record naming what was absent.
    #[must_use]
    pub fn query_layer(&self, layer: LayerTag, vertex_id: &str) -> VertexQuery {
        let Some(stored) = self.layer(layer) else {
            return VertexQuery::Missing {
                error: format!("layer `{}` is not materialised", layer.as_str()),
                available: self.available_layers(),
            };
        };
        let Some(row) = self.vertex_row(vertex_id) else {
            return VertexQuery::Missing {
                error: format!("vertex `{vertex_id}` is not indexed"),
                available: self.vertex_ids().to_vec(),
            };
        };
        let edge_ids = (0..stored.incidence.cols())
            .filter(|&col| stored.incidence.get(row, col) != 0.0)
            .map(|col| stored.edge_ids[col].clone())
            .collect();
        VertexQuery::Found {
            vertex_id: vertex_id.to_owned(),
            layer: layer.as_str().to_owned(),
            edge_ids,
            features: stored.features.row(row).to_vec(),
        }
    }

    /// Reduces member feature rows per hyperedge, producing `|E_l| × d_l`.
    ///
    /// # Errors
    /// Fails with `LayerNotFound` when the layer is not materialised.
    #[instrument(name = "core.aggregate_by_edge", err, skip(self), fields(farm_id = %self.farm_id()))]
    pub fn aggregate_by_edge(&self, layer: LayerTag, reducer: EdgeReducer) -> Result<DenseMatrix> {
        let stored = self.layer_or_err(layer)?;
        match reducer {
            EdgeReducer::Sum => {
                let sums = stored
                    .incidence
                    .transpose_apply(&stored.features, self.kernel_backend())?;
                Ok(sums)
            }
            EdgeReducer::Mean => {
                let mut sums = stored
                    .incidence
                    .transpose_apply(&stored.features, self.kernel_backend())?;
                let degrees = stored.incidence.column_degrees();
                let width = sums.cols();
                for (edge, degree) in degrees.iter().enumerate() {
                    let scale = 1.0 / degree.max(1.0);
                    for feature in 0..width {
                        let value = sums.get(edge, feature) * scale;
                        sums.set(edge, feature, value);
                    }
                }
                Ok(sums)
            }
            EdgeReducer::Min => Ok(fold_by_edge(stored, f32::INFINITY, f32::min)),
            EdgeReducer::Max => Ok(fold_by_edge(stored, f32::NEG_INFINITY, f32::max)),
        }
    }

    /// Horizontally concatenates the feature matrices of the listed
    /// layers: `|V| × Σd_l`, in list order. Residency is preserved.
    ///
    /// # Errors
    /// Fails with `LayerNotFound` when any listed layer is missing.
    pub fn multi_layer_features(&self, layers: &[LayerTag]) -> Result<DenseMatrix> {
        let mut parts = Vec::with_capacity(layers.len());
        for &tag in layers {
            parts.push(&self.layer_or_err(tag)?.features);
        }
        Ok(DenseMatrix::hconcat(&parts)
            .unwrap_or_else(|| DenseMatrix::zeros(self.vertex_count(), 0)))
    }
}

/// Host scalar fallback for reducers without a sparse-product form.
fn fold_by_edge(stored: &super::Layer, identity: f32, fold: fn(f32, f32) -> f32) -> DenseMatrix {
    let width = stored.features.cols();
    let mut out = DenseMatrix::zeros(stored.incidence.cols(), width);
    for edge in 0..stored.incidence.cols() {
        let members = stored.incidence.column_rows(edge);
        for feature in 0..width {
            let reduced = members
                .iter()
                .map(|&row| stored.features.get(row as usize, feature))
                .fold(identity, fold);
            out.set(edge, feature, if members.is_empty() { 0.0 } else { reduced });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, GraphError};
    use loam_test_support::two_layer_config;

    fn graph() -> LayeredHypergraph {
        LayeredHypergraph::build(&two_layer_config("farm-q")).expect("fixture is valid")
    }

    #[test]
    fn cross_layer_counts_shared_vertices() {
        let shared = graph()
            .cross_layer_query(LayerTag::Soil, LayerTag::Irrigation)
            .expect("both layers are materialised");
        assert_eq!((shared.rows(), shared.cols()), (1, 1));
        assert_eq!(shared.get(0, 0), 1.0);
    }

    #[test]
    fn cross_layer_missing_layer_is_typed() {
        let err = graph()
            .cross_layer_query(LayerTag::Soil, LayerTag::Vision)
            .expect_err("vision is not materialised");
        assert!(matches!(
            err,
            CoreError::Graph(GraphError::LayerNotFound { .. })
        ));
    }

    #[test]
    fn query_layer_reports_memberships() {
        let graph = graph();
        match graph.query_layer(LayerTag::Soil, "v2") {
            VertexQuery::Found { edge_ids, features, .. } => {
                assert_eq!(edge_ids, vec!["e1".to_owned()]);
                assert_eq!(features.len(), LayerTag::Soil.feature_width());
            }
            VertexQuery::Missing { error, .. } => panic!("unexpected miss: {error}"),
        }
    }

    #[test]
    fn query_layer_miss_lists_alternatives() {
        let graph = graph();
        match graph.query_layer(LayerTag::Soil, "ghost") {
            VertexQuery::Missing { error, available } => {
                assert!(error.contains("ghost"));
                assert_eq!(available.len(), graph.vertex_count());
            }
            VertexQuery::Found { .. } => panic!("ghost must miss"),
        }
    }

    #[test]
    fn mean_aggregation_divides_by_degree() {
        let mut graph = graph();
        graph
            .push_features(LayerTag::Soil, "v1", &[0.2, 10.0, 1.0, 6.0])
            .expect("v1 is indexed");
        graph
            .push_features(LayerTag::Soil, "v2", &[0.4, 20.0, 2.0, 8.0])
            .expect("v2 is indexed");
        let means = graph
            .aggregate_by_edge(LayerTag::Soil, EdgeReducer::Mean)
            .expect("soil is materialised");
        assert!((means.get(0, 0) - 0.3).abs() < 1e-6);
        assert!((means.get(0, 1) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn multi_layer_features_concatenates_widths() {
        let widths = LayerTag::Soil.feature_width() + LayerTag::Irrigation.feature_width();
        let joined = graph()
            .multi_layer_features(&[LayerTag::Soil, LayerTag::Irrigation])
            .expect("both layers are materialised");
        assert_eq!(joined.cols(), widths);
        assert_eq!(joined.rows(), 3);
    }
}
