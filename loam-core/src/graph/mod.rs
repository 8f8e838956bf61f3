//! The layered hypergraph engine.
//!
//! A farm is one [`LayeredHypergraph`]: a global vertex index shared by up
//! to seven [`Layer`]s, each materialising a sparse incidence matrix, a
//! dense feature matrix, and a fixed-capacity history ring over the same
//! row coordinates. Cross-layer relationships reduce to sparse transpose
//! products; per-vertex reductions reduce to kernel launches on the
//! graph's resident backend.
//!
//! Submodules: construction ([`LayeredHypergraph::build`]), queries,
//! topology mutation, the feature/history write path, residency transfer,
//! and the invariant checker used by the test suites.

mod build;
mod history;
mod invariants;
mod mutate;
mod query;
mod residency;

pub use invariants::invariant_violations;
pub use query::{EdgeReducer, VertexQuery};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, Residency, parallel_available},
    dense::{DenseMatrix, HistoryRing},
    error::GraphError,
    sparse::CscMatrix,
};

/// Default history ring depth: 24 h of 15-minute snapshots.
pub const DEFAULT_HISTORY_DEPTH: usize = 96;

/// Environment knob overriding the default ring depth for new graphs.
pub const HISTORY_DEPTH_ENV: &str = "HISTORY_SIZE";

/// The closed set of farm instrumentation layers.
///
/// # Examples
/// ```
/// use loam_core::LayerTag;
///
/// let tag = LayerTag::parse("crop_requirements").expect("tag is in the set");
/// assert_eq!(tag, LayerTag::CropRequirements);
/// assert_eq!(tag.feature_width(), 5);
/// assert_eq!(LayerTag::parse("hydroponics"), None);
/// ```
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayerTag {
    /// Soil probes: moisture, temperature, conductivity, pH.
    Soil,
    /// Irrigation plant: flow rate, pressure, valve state.
    Irrigation,
    /// Weather stations: temperature, humidity, precipitation, wind, solar.
    Weather,
    /// Grow lighting: PAR, DLI, spectrum index.
    Lighting,
    /// Crop targets: yield, growth progress, N/P/K targets.
    CropRequirements,
    /// Nutrient probes: N, P, K.
    Npk,
    /// Camera analytics: canopy, growth stage, anomaly score, NDVI.
    Vision,
}

impl LayerTag {
    /// Every layer tag, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Soil,
        Self::Irrigation,
        Self::Weather,
        Self::Lighting,
        Self::CropRequirements,
        Self::Npk,
        Self::Vision,
    ];

    /// Returns the tag used in payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soil => "soil",
            Self::Irrigation => "irrigation",
            Self::Weather => "weather",
            Self::Lighting => "lighting",
            Self::CropRequirements => "crop_requirements",
            Self::Npk => "npk",
            Self::Vision => "vision",
        }
    }

    /// Parses a payload tag; returns `None` for anything outside the set.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == raw)
    }

    /// The authoritative feature dimension for this layer.
    #[must_use]
    pub const fn feature_width(self) -> usize {
        match self {
            Self::Soil | Self::Vision => 4,
            Self::Irrigation | Self::Lighting | Self::Npk => 3,
            Self::Weather | Self::CropRequirements => 5,
        }
    }

    /// Human channel names, index-aligned with the feature columns.
    #[must_use]
    pub const fn feature_names(self) -> &'static [&'static str] {
        match self {
            Self::Soil => &["moisture", "temperature", "conductivity", "ph"],
            Self::Irrigation => &["flow_rate", "pressure", "valve_state"],
            Self::Weather => &[
                "temperature",
                "humidity",
                "precipitation",
                "wind_speed",
                "solar_rad",
            ],
            Self::Lighting => &["par", "dli", "spectrum_index"],
            Self::CropRequirements => &[
                "target_yield",
                "growth_progress",
                "n_target",
                "p_target",
                "k_target",
            ],
            Self::Npk => &["nitrogen", "phosphorus", "potassium"],
            Self::Vision => &["canopy_coverage", "growth_stage", "anomaly_score", "ndvi"],
        }
    }

    /// The anomaly classification reported for alerts on this layer.
    #[must_use]
    pub const fn anomaly_type(self) -> &'static str {
        match self {
            Self::Soil | Self::Weather => "environmental",
            Self::Npk => "nutrient_imbalance",
            Self::Vision => "visual_anomaly",
            Self::Lighting => "light_anomaly",
            Self::Irrigation => "irrigation_fault",
            Self::CropRequirements => "unknown",
        }
    }
}

/// One instrumentation layer: numeric arrays plus host-only metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub(crate) incidence: CscMatrix,
    pub(crate) features: DenseMatrix,
    pub(crate) history: HistoryRing,
    pub(crate) edge_ids: Vec<String>,
    pub(crate) edge_metadata: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl Layer {
    pub(crate) fn empty(tag: LayerTag, vertices: usize, history_depth: usize) -> Self {
        let width = tag.feature_width();
        Self {
            incidence: CscMatrix::with_rows(vertices),
            features: DenseMatrix::zeros(vertices, width),
            history: HistoryRing::new(vertices, width, history_depth),
            edge_ids: Vec::new(),
            edge_metadata: Vec::new(),
        }
    }

    /// The vertex-to-hyperedge incidence matrix.
    #[must_use]
    pub fn incidence(&self) -> &CscMatrix {
        &self.incidence
    }

    /// The current feature snapshot, `|V| × d`.
    #[must_use]
    pub fn features(&self) -> &DenseMatrix {
        &self.features
    }

    /// The feature history ring, `|V| × d × H`.
    #[must_use]
    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    /// Hyperedge identifiers, column-aligned with the incidence matrix.
    #[must_use]
    pub fn edge_ids(&self) -> &[String] {
        &self.edge_ids
    }

    /// Hyperedge metadata, column-aligned with the incidence matrix.
    #[must_use]
    pub fn edge_metadata(&self) -> &[serde_json::Map<String, serde_json::Value>] {
        &self.edge_metadata
    }

    /// Finds the incidence column of a hyperedge id.
    #[must_use]
    pub fn edge_position(&self, edge_id: &str) -> Option<usize> {
        self.edge_ids.iter().position(|id| id == edge_id)
    }
}

/// A farm's layered hypergraph. Owns all layer storage exclusively.
#[derive(Clone, Debug, PartialEq)]
pub struct LayeredHypergraph {
    farm_id: String,
    vertex_ids: Vec<String>,
    vertex_index: HashMap<String, usize>,
    layers: BTreeMap<LayerTag, Layer>,
    residency: Residency,
    history_depth: usize,
}

impl LayeredHypergraph {
    /// Reassembles a graph from rehydrated parts. The caller (the
    /// serialization boundary) is responsible for dimensional validation.
    pub(crate) fn from_parts(
        farm_id: String,
        vertex_ids: Vec<String>,
        vertex_index: HashMap<String, usize>,
        layers: BTreeMap<LayerTag, Layer>,
        history_depth: usize,
    ) -> Self {
        Self {
            farm_id,
            vertex_ids,
            vertex_index,
            layers,
            residency: Residency::Host,
            history_depth,
        }
    }

    /// The farm identifier this graph belongs to.
    #[must_use]
    pub fn farm_id(&self) -> &str {
        &self.farm_id
    }

    /// Number of globally indexed vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_ids.len()
    }

    /// Vertex identifiers in row order.
    #[must_use]
    pub fn vertex_ids(&self) -> &[String] {
        &self.vertex_ids
    }

    /// Resolves a vertex id to its shared row coordinate.
    #[must_use]
    pub fn vertex_row(&self, vertex_id: &str) -> Option<usize> {
        self.vertex_index.get(vertex_id).copied()
    }

    /// Borrows one layer if it is materialised.
    #[must_use]
    pub fn layer(&self, tag: LayerTag) -> Option<&Layer> {
        self.layers.get(&tag)
    }

    /// Iterates materialised layers in canonical tag order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerTag, &Layer)> {
        self.layers.iter().map(|(&tag, layer)| (tag, layer))
    }

    /// Where the graph's numeric arrays currently live.
    #[must_use]
    pub const fn residency(&self) -> Residency {
        self.residency
    }

    /// The ring depth used when a new layer is materialised.
    #[must_use]
    pub const fn history_depth(&self) -> usize {
        self.history_depth
    }

    /// Tags of the materialised layers, for miss diagnostics.
    #[must_use]
    pub fn available_layers(&self) -> Vec<String> {
        self.layers.keys().map(|tag| tag.as_str().to_owned()).collect()
    }

    pub(crate) fn layer_or_err(&self, tag: LayerTag) -> Result<&Layer, GraphError> {
        self.layers.get(&tag).ok_or_else(|| GraphError::LayerNotFound {
            layer: tag.as_str().to_owned(),
            available: self.available_layers(),
        })
    }

    /// The backend kernels over this graph's storage dispatch to. Device
    /// residency cannot outlive the parallel lane, but guard anyway so a
    /// rehydrated graph from a parallel build degrades to host execution.
    pub(crate) fn kernel_backend(&self) -> Backend {
        if parallel_available() {
            self.residency.backend()
        } else {
            Backend::Host
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_tags_round_trip_and_stay_closed() {
        for tag in LayerTag::ALL {
            assert_eq!(LayerTag::parse(tag.as_str()), Some(tag));
            assert_eq!(tag.feature_names().len(), tag.feature_width());
        }
        assert_eq!(LayerTag::parse("hydroponics"), None);
    }

    #[test]
    fn serde_tags_match_payload_strings() {
        let json = serde_json::to_string(&LayerTag::CropRequirements).expect("serializes");
        assert_eq!(json, "\"crop_requirements\"");
        let tag: LayerTag = serde_json::from_str("\"npk\"").expect("deserializes");
        assert_eq!(tag, LayerTag::Npk);
    }
}
