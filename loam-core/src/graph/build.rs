//! Graph construction from a validated farm configuration.

use std::collections::{BTreeMap, HashMap};
use std::env;

use tracing::{debug, instrument, warn};

use crate::{
    backend::Residency,
    config::{ConfigError, FarmConfig},
    dense::{DenseMatrix, HistoryRing},
    sparse::CscMatrix,
};

use super::{DEFAULT_HISTORY_DEPTH, HISTORY_DEPTH_ENV, Layer, LayeredHypergraph};

/// Resolves the ring depth for newly materialised layers, honouring the
/// `HISTORY_SIZE` override when it parses to a positive integer.
#[must_use]
pub fn default_history_depth() -> usize {
    history_depth_from(env::var(HISTORY_DEPTH_ENV).ok().as_deref())
}

fn history_depth_from(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&depth| depth > 0)
        .unwrap_or(DEFAULT_HISTORY_DEPTH)
}

impl LayeredHypergraph {
    /// Builds a graph from a farm configuration.
    ///
    /// Vertices are indexed in declaration order; the row coordinate is
    /// shared by every layer. Each active layer with at least one
    /// surviving edge gets an incidence matrix, zeroed features, and a
    /// zeroed history ring. Hyperedge members that are not indexed
    /// vertices are dropped silently (logged, not an error); an edge whose
    /// members all drop is skipped entirely. Layers with no edges are not
    /// materialised.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the configuration fails validation.
    #[instrument(name = "core.build_hypergraph", err, skip(config), fields(farm_id = %config.farm_id))]
    pub fn build(config: &FarmConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let vertex_ids: Vec<String> =
            config.vertices.iter().map(|vertex| vertex.id.clone()).collect();
        let vertex_index: HashMap<String, usize> = vertex_ids
            .iter()
            .enumerate()
            .map(|(row, id)| (id.clone(), row))
            .collect();
        let history_depth = default_history_depth();

        let mut layers = BTreeMap::new();
        for tag in config.active_layer_tags() {
            let mut columns: Vec<Vec<usize>> = Vec::new();
            let mut edge_ids = Vec::new();
            let mut edge_metadata = Vec::new();
            for edge in config.edges.iter().filter(|edge| edge.layer == tag.as_str()) {
                let members: Vec<usize> = edge
                    .vertex_ids
                    .iter()
                    .filter_map(|id| {
                        let row = vertex_index.get(id).copied();
                        if row.is_none() {
                            warn!(edge = %edge.id, vertex = %id, "dropping unknown member vertex");
                        }
                        row
                    })
                    .collect();
                if members.is_empty() {
                    warn!(edge = %edge.id, layer = tag.as_str(), "skipping edge with no indexed members");
                    continue;
                }
                columns.push(members);
                edge_ids.push(edge.id.clone());
                edge_metadata.push(edge.metadata.clone());
            }
            if edge_ids.is_empty() {
                continue;
            }
            let width = tag.feature_width();
            layers.insert(
                tag,
                Layer {
                    incidence: CscMatrix::from_columns(vertex_ids.len(), &columns),
                    features: DenseMatrix::zeros(vertex_ids.len(), width),
                    history: HistoryRing::new(vertex_ids.len(), width, history_depth),
                    edge_ids,
                    edge_metadata,
                },
            );
        }

        debug!(
            vertices = vertex_ids.len(),
            layers = layers.len(),
            history_depth,
            "hypergraph built"
        );
        Ok(Self {
            farm_id: config.farm_id.clone(),
            vertex_ids,
            vertex_index,
            layers,
            residency: Residency::Host,
            history_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LayerTag;
    use loam_test_support::two_layer_config;
    use rstest::rstest;

    #[rstest]
    #[case::unset(None, DEFAULT_HISTORY_DEPTH)]
    #[case::positive(Some("48"), 48)]
    #[case::zero(Some("0"), DEFAULT_HISTORY_DEPTH)]
    #[case::garbage(Some("lots"), DEFAULT_HISTORY_DEPTH)]
    fn history_depth_override_parses_tolerantly(
        #[case] raw: Option<&str>,
        #[case] expected: usize,
    ) {
        assert_eq!(history_depth_from(raw), expected);
    }

    #[test]
    fn build_materialises_only_layers_with_edges() {
        let mut config = two_layer_config("farm-1");
        config.active_layers.push("vision".to_owned());
        let graph = LayeredHypergraph::build(&config).expect("config is valid");
        assert!(graph.layer(LayerTag::Soil).is_some());
        assert!(graph.layer(LayerTag::Irrigation).is_some());
        assert!(graph.layer(LayerTag::Vision).is_none());
    }

    #[test]
    fn build_drops_unknown_members_and_empty_edges() {
        let mut config = two_layer_config("farm-1");
        config.edges[0].vertex_ids.push("ghost".to_owned());
        config.edges.push(crate::config::EdgeDef {
            id: "all-ghosts".to_owned(),
            layer: "soil".to_owned(),
            vertex_ids: vec!["phantom".to_owned()],
            metadata: serde_json::Map::new(),
        });
        let graph = LayeredHypergraph::build(&config).expect("config is valid");
        let soil = graph.layer(LayerTag::Soil).expect("soil is materialised");
        assert!(!soil.edge_ids().iter().any(|id| id == "all-ghosts"));
        assert_eq!(soil.incidence().rows(), graph.vertex_count());
        assert_eq!(soil.incidence().cols(), soil.edge_ids().len());
    }

    #[test]
    fn build_shares_the_vertex_index_across_layers() {
        let config = two_layer_config("farm-1");
        let graph = LayeredHypergraph::build(&config).expect("config is valid");
        for (_, layer) in graph.layers() {
            assert_eq!(layer.incidence().rows(), graph.vertex_count());
            assert_eq!(layer.features().rows(), graph.vertex_count());
            assert_eq!(layer.history().vertices(), graph.vertex_count());
        }
    }
}
