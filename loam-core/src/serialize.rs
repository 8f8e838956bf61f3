//! The opaque serialization contract for graph state.
//!
//! A graph crosses the boundary as plain data: parallel incidence
//! triplet arrays, nested dense feature and history arrays, ring
//! pointers, and host-side identifiers and metadata. No device-resident
//! storage is ever referenced; a host materialisation pass precedes
//! serialization on every path, including failures. Deserialisation
//! validates the top-level key set and wraps each per-layer
//! reconstruction failure with the layer name.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::{
    dense::{DenseMatrix, HistoryRing},
    graph::{Layer, LayerTag, LayeredHypergraph},
    sparse::CscMatrix,
};

/// Stable codes describing [`SerializeError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SerializeErrorCode {
    /// A required top-level key was absent.
    MissingKey,
    /// The payload was not an object.
    NotAnObject,
    /// The payload object did not match the serialized graph shape.
    Malformed,
    /// A layer tag did not belong to the closed set.
    UnknownLayerTag,
    /// A layer failed to reconstruct.
    LayerRebuild,
}

impl SerializeErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingKey => "SERIALIZE_MISSING_KEY",
            Self::NotAnObject => "SERIALIZE_NOT_AN_OBJECT",
            Self::Malformed => "SERIALIZE_MALFORMED",
            Self::UnknownLayerTag => "SERIALIZE_UNKNOWN_LAYER_TAG",
            Self::LayerRebuild => "SERIALIZE_LAYER_REBUILD",
        }
    }
}

impl fmt::Display for SerializeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while rehydrating serialized graph state.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SerializeError {
    /// A required top-level key was absent.
    #[error("serialized graph state is missing key `{key}`")]
    MissingKey {
        /// The absent key.
        key: &'static str,
    },
    /// The payload was not an object.
    #[error("serialized graph state must be an object")]
    NotAnObject,
    /// The payload object did not match the serialized graph shape.
    #[error("serialized graph state is malformed: {message}")]
    Malformed {
        /// What the typed deserialiser reported.
        message: String,
    },
    /// A layer tag did not belong to the closed set.
    #[error("serialized graph state names unknown layer `{layer}`")]
    UnknownLayerTag {
        /// The offending tag.
        layer: String,
    },
    /// A layer failed to reconstruct.
    #[error("layer `{layer}`: {message}")]
    LayerRebuild {
        /// The layer that failed.
        layer: String,
        /// What went wrong inside it.
        message: String,
    },
}

impl SerializeError {
    /// Retrieve the stable [`SerializeErrorCode`] for this error.
    pub const fn code(&self) -> SerializeErrorCode {
        match self {
            Self::MissingKey { .. } => SerializeErrorCode::MissingKey,
            Self::NotAnObject => SerializeErrorCode::NotAnObject,
            Self::Malformed { .. } => SerializeErrorCode::Malformed,
            Self::UnknownLayerTag { .. } => SerializeErrorCode::UnknownLayerTag,
            Self::LayerRebuild { .. } => SerializeErrorCode::LayerRebuild,
        }
    }
}

/// Top-level keys every serialized graph must carry.
const REQUIRED_KEYS: [&str; 4] = ["farm_id", "n_vertices", "vertex_index", "layers"];

/// One layer in boundary form.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SerializedLayer {
    /// Incidence entry rows, parallel with the other two arrays.
    pub incidence_rows: Vec<u32>,
    /// Incidence entry columns.
    pub incidence_cols: Vec<u32>,
    /// Incidence entry values.
    pub incidence_vals: Vec<f32>,
    /// Row dimension of the incidence matrix.
    pub n_vertices: usize,
    /// Column dimension of the incidence matrix.
    pub n_edges: usize,
    /// Current feature snapshot, `|V| × d`.
    pub vertex_features: Vec<Vec<f32>>,
    /// Full ring buffer, `|V| × d × H`.
    pub feature_history: Vec<Vec<Vec<f32>>>,
    /// Next ring write slot.
    pub history_head: usize,
    /// Valid ring entries.
    pub history_length: usize,
    /// Hyperedge metadata, column-aligned.
    pub edge_metadata: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Global vertex identifiers in row order.
    pub vertex_ids: Vec<String>,
    /// Hyperedge identifiers, column-aligned.
    pub edge_ids: Vec<String>,
}

/// A graph in boundary form.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SerializedGraph {
    /// The farm this graph belongs to.
    pub farm_id: String,
    /// Global vertex count.
    pub n_vertices: usize,
    /// Vertex id to row coordinate.
    pub vertex_index: BTreeMap<String, usize>,
    /// Per-layer state, keyed by layer tag.
    pub layers: BTreeMap<String, SerializedLayer>,
}

/// Serializes a graph into boundary form after a host materialisation
/// pass.
#[instrument(name = "core.serialize_graph", skip(graph), fields(farm_id = %graph.farm_id()))]
#[must_use]
pub fn serialize_graph(graph: &LayeredHypergraph) -> SerializedGraph {
    let host = graph.ensure_host();
    let mut layers = BTreeMap::new();
    for (tag, layer) in host.layers() {
        let (rows, cols, vals) = layer.incidence().to_triplets();
        layers.insert(
            tag.as_str().to_owned(),
            SerializedLayer {
                incidence_rows: rows,
                incidence_cols: cols,
                incidence_vals: vals,
                n_vertices: layer.incidence().rows(),
                n_edges: layer.incidence().cols(),
                vertex_features: layer.features().to_rows(),
                feature_history: history_to_nested(layer.history()),
                history_head: layer.history().head(),
                history_length: layer.history().len(),
                edge_metadata: layer.edge_metadata().to_vec(),
                vertex_ids: host.vertex_ids().to_vec(),
                edge_ids: layer.edge_ids().to_vec(),
            },
        );
    }
    SerializedGraph {
        farm_id: host.farm_id().to_owned(),
        n_vertices: host.vertex_count(),
        vertex_index: host
            .vertex_ids()
            .iter()
            .enumerate()
            .map(|(row, id)| (id.clone(), row))
            .collect(),
        layers,
    }
}

/// Validates the top-level key set of a loose JSON payload before typed
/// deserialisation. Read-side callers that receive opaque state use
/// this; typed callers go straight to [`deserialize_graph`].
///
/// # Errors
/// Returns [`SerializeError::NotAnObject`] or
/// [`SerializeError::MissingKey`] on malformed payloads, and wraps
/// everything [`deserialize_graph`] reports.
pub fn graph_from_value(value: &serde_json::Value) -> Result<LayeredHypergraph, SerializeError> {
    let object = value.as_object().ok_or(SerializeError::NotAnObject)?;
    for key in REQUIRED_KEYS {
        if !object.contains_key(key) {
            return Err(SerializeError::MissingKey { key });
        }
    }
    let state: SerializedGraph =
        serde_json::from_value(value.clone()).map_err(|err| SerializeError::Malformed {
            message: err.to_string(),
        })?;
    deserialize_graph(&state)
}

/// Rehydrates a graph from boundary form, host-resident.
///
/// # Errors
/// Returns [`SerializeError::UnknownLayerTag`] for a tag outside the
/// closed set, and [`SerializeError::LayerRebuild`] (prefixed with the
/// layer name) when a layer's arrays are dimensionally inconsistent.
#[instrument(name = "core.deserialize_graph", err, skip(state), fields(farm_id = %state.farm_id))]
pub fn deserialize_graph(state: &SerializedGraph) -> Result<LayeredHypergraph, SerializeError> {
    let mut vertex_ids = vec![String::new(); state.n_vertices];
    for (id, &row) in &state.vertex_index {
        if row >= state.n_vertices {
            return Err(SerializeError::LayerRebuild {
                layer: "<vertex_index>".to_owned(),
                message: format!("vertex `{id}` maps to row {row} of {}", state.n_vertices),
            });
        }
        vertex_ids[row] = id.clone();
    }
    let vertex_index: HashMap<String, usize> = state
        .vertex_index
        .iter()
        .map(|(id, &row)| (id.clone(), row))
        .collect();

    let mut layers = BTreeMap::new();
    let mut history_depth = crate::graph::DEFAULT_HISTORY_DEPTH;
    for (name, serialized) in &state.layers {
        let tag = LayerTag::parse(name).ok_or_else(|| SerializeError::UnknownLayerTag {
            layer: name.clone(),
        })?;
        let layer = rebuild_layer(serialized, state.n_vertices).map_err(|message| {
            SerializeError::LayerRebuild {
                layer: name.clone(),
                message,
            }
        })?;
        history_depth = layer.history().depth();
        layers.insert(tag, layer);
    }

    Ok(LayeredHypergraph::from_parts(
        state.farm_id.clone(),
        vertex_ids,
        vertex_index,
        layers,
        history_depth,
    ))
}

fn rebuild_layer(serialized: &SerializedLayer, n_vertices: usize) -> Result<Layer, String> {
    if serialized.n_vertices != n_vertices {
        return Err(format!(
            "layer tracks {} vertices, graph has {n_vertices}",
            serialized.n_vertices
        ));
    }
    let nnz = serialized.incidence_rows.len();
    if serialized.incidence_cols.len() != nnz || serialized.incidence_vals.len() != nnz {
        return Err("incidence triplet arrays disagree in length".to_owned());
    }
    if serialized.edge_ids.len() != serialized.n_edges
        || serialized.edge_metadata.len() != serialized.n_edges
    {
        return Err(format!(
            "{} edges but {} ids and {} metadata entries",
            serialized.n_edges,
            serialized.edge_ids.len(),
            serialized.edge_metadata.len()
        ));
    }

    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); serialized.n_edges];
    for (index, (&row, &col)) in serialized
        .incidence_rows
        .iter()
        .zip(&serialized.incidence_cols)
        .enumerate()
    {
        if row as usize >= n_vertices {
            return Err(format!("entry {index} references row {row} of {n_vertices}"));
        }
        let column = columns
            .get_mut(col as usize)
            .ok_or_else(|| format!("entry {index} references column {col}"))?;
        column.push(row as usize);
    }
    let incidence = CscMatrix::from_columns(n_vertices, &columns);

    let features = DenseMatrix::from_rows(&serialized.vertex_features)
        .ok_or_else(|| "ragged vertex_features rows".to_owned())?;
    if features.rows() != n_vertices {
        return Err(format!(
            "vertex_features has {} rows for {n_vertices} vertices",
            features.rows()
        ));
    }

    let width = features.cols();
    let depth = serialized
        .feature_history
        .first()
        .and_then(|vertex| vertex.first())
        .map_or(crate::graph::DEFAULT_HISTORY_DEPTH, Vec::len);
    if serialized.feature_history.len() != n_vertices {
        return Err(format!(
            "feature_history tracks {} vertices of {n_vertices}",
            serialized.feature_history.len()
        ));
    }
    let mut history = HistoryRing::new(n_vertices, width, depth);
    for (vertex, channels) in serialized.feature_history.iter().enumerate() {
        if channels.len() != width {
            return Err(format!(
                "feature_history vertex {vertex} has {} channels of {width}",
                channels.len()
            ));
        }
        for (feature, slots) in channels.iter().enumerate() {
            if slots.len() != depth {
                return Err(format!(
                    "feature_history vertex {vertex} channel {feature} has {} slots of {depth}",
                    slots.len()
                ));
            }
            let base = (vertex * width + feature) * depth;
            history.data_mut()[base..base + depth].copy_from_slice(slots);
        }
    }
    history.restore_pointers(serialized.history_head, serialized.history_length);

    Ok(Layer {
        incidence,
        features,
        history,
        edge_ids: serialized.edge_ids.clone(),
        edge_metadata: serialized.edge_metadata.clone(),
    })
}

fn history_to_nested(ring: &HistoryRing) -> Vec<Vec<Vec<f32>>> {
    let (vertices, width, depth) = (ring.vertices(), ring.width(), ring.depth());
    let data = ring.data();
    (0..vertices)
        .map(|vertex| {
            (0..width)
                .map(|feature| {
                    let base = (vertex * width + feature) * depth;
                    data[base..base + depth].to_vec()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::invariant_violations;
    use loam_test_support::two_layer_config;

    fn seeded_graph() -> LayeredHypergraph {
        let mut graph = LayeredHypergraph::build(&two_layer_config("farm-s"))
            .expect("fixture is valid");
        for step in 0..5 {
            graph
                .push_features(
                    LayerTag::Soil,
                    "v1",
                    &[0.2 + step as f32 * 0.01, 17.0, 1.0, 6.4],
                )
                .expect("v1 is indexed");
        }
        graph
            .push_features(LayerTag::Irrigation, "v3", &[12.0, 2.1, 1.0])
            .expect("v3 is indexed");
        graph
    }

    #[test]
    fn round_trip_preserves_everything_observable() {
        let graph = seeded_graph();
        let state = serialize_graph(&graph);
        let back = deserialize_graph(&state).expect("state rehydrates");
        assert_eq!(back, graph);
        assert!(invariant_violations(&back).is_empty());
    }

    #[test]
    fn round_trip_survives_json() {
        let graph = seeded_graph();
        let json = serde_json::to_value(serialize_graph(&graph)).expect("state serializes");
        let back = graph_from_value(&json).expect("payload rehydrates");
        assert_eq!(back, graph);
    }

    #[test]
    fn missing_top_level_key_is_named() {
        let graph = seeded_graph();
        let mut json = serde_json::to_value(serialize_graph(&graph)).expect("state serializes");
        json.as_object_mut()
            .expect("state is an object")
            .remove("vertex_index");
        let err = graph_from_value(&json).expect_err("missing key must fail");
        assert_eq!(err, SerializeError::MissingKey { key: "vertex_index" });
    }

    #[test]
    fn layer_failures_carry_the_layer_name() {
        let graph = seeded_graph();
        let mut state = serialize_graph(&graph);
        state
            .layers
            .get_mut("soil")
            .expect("soil is serialized")
            .incidence_rows
            .push(99);
        let err = deserialize_graph(&state).expect_err("corrupt layer must fail");
        match err {
            SerializeError::LayerRebuild { layer, .. } => assert_eq!(layer, "soil"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_layer_tag_is_rejected() {
        let graph = seeded_graph();
        let mut state = serialize_graph(&graph);
        let soil = state.layers.remove("soil").expect("soil is serialized");
        state.layers.insert("hydroponics".to_owned(), soil);
        let err = deserialize_graph(&state).expect_err("unknown tag must fail");
        assert!(matches!(err, SerializeError::UnknownLayerTag { .. }));
    }

    #[test]
    fn incidence_pattern_survives_the_triplets() {
        let graph = seeded_graph();
        let state = serialize_graph(&graph);
        let soil = &state.layers["soil"];
        assert_eq!(soil.incidence_rows.len(), soil.incidence_cols.len());
        assert_eq!(soil.incidence_vals, vec![1.0; soil.incidence_rows.len()]);
        let back = deserialize_graph(&state).expect("state rehydrates");
        let rebuilt = back.layer(LayerTag::Soil).expect("soil rehydrated");
        let original = graph.layer(LayerTag::Soil).expect("soil exists");
        assert_eq!(rebuilt.incidence(), original.incidence());
    }
}
