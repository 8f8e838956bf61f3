//! Farm configuration: the plain-data input to graph construction.
//!
//! Callers hand the core a JSON-shaped profile (farm identity, active
//! layers, zones, model toggles, vertex and hyperedge definitions). The
//! types here deserialize that payload and validate the structural rules
//! before any storage is allocated. Unknown *member vertex ids* inside an
//! edge are tolerated (dropped at build time); an unknown *layer tag* is a
//! configuration error.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::LayerTag;

/// Stable codes describing [`ConfigError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ConfigErrorCode {
    /// The farm identifier was empty.
    EmptyFarmId,
    /// A layer tag did not belong to the closed layer set.
    UnknownLayerTag,
    /// Two zones shared an identifier.
    DuplicateZoneId,
    /// Two vertex definitions shared an identifier.
    DuplicateVertexId,
    /// Two hyperedge definitions shared an identifier within a layer.
    DuplicateEdgeId,
    /// A farm type tag did not belong to the closed set.
    UnknownFarmType,
}

impl ConfigErrorCode {
    /// Return the stable machine-readable representation of this error code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyFarmId => "CONFIG_EMPTY_FARM_ID",
            Self::UnknownLayerTag => "CONFIG_UNKNOWN_LAYER_TAG",
            Self::DuplicateZoneId => "CONFIG_DUPLICATE_ZONE_ID",
            Self::DuplicateVertexId => "CONFIG_DUPLICATE_VERTEX_ID",
            Self::DuplicateEdgeId => "CONFIG_DUPLICATE_EDGE_ID",
            Self::UnknownFarmType => "CONFIG_UNKNOWN_FARM_TYPE",
        }
    }
}

impl fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while validating a [`FarmConfig`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConfigError {
    /// The farm identifier was empty.
    #[error("farm_id must not be empty")]
    EmptyFarmId,
    /// A layer tag did not belong to the closed layer set.
    #[error("unknown layer tag `{layer}` in {context}")]
    UnknownLayerTag {
        /// The offending tag.
        layer: String,
        /// Where the tag appeared (`active_layers` or an edge id).
        context: String,
    },
    /// Two zones shared an identifier.
    #[error("zone id `{id}` is defined more than once")]
    DuplicateZoneId {
        /// The duplicated zone id.
        id: String,
    },
    /// Two vertex definitions shared an identifier.
    #[error("vertex id `{id}` is defined more than once")]
    DuplicateVertexId {
        /// The duplicated vertex id.
        id: String,
    },
    /// Two hyperedge definitions shared an identifier within a layer.
    #[error("edge id `{id}` is defined more than once in layer `{layer}`")]
    DuplicateEdgeId {
        /// The duplicated edge id.
        id: String,
        /// The layer both definitions target.
        layer: String,
    },
    /// A farm type tag did not belong to the closed set.
    #[error("unknown farm type `{farm_type}`; expected open_field, greenhouse, or hybrid")]
    UnknownFarmType {
        /// The offending tag.
        farm_type: String,
    },
}

impl ConfigError {
    /// Retrieve the stable [`ConfigErrorCode`] for this error.
    pub const fn code(&self) -> ConfigErrorCode {
        match self {
            Self::EmptyFarmId => ConfigErrorCode::EmptyFarmId,
            Self::UnknownLayerTag { .. } => ConfigErrorCode::UnknownLayerTag,
            Self::DuplicateZoneId { .. } => ConfigErrorCode::DuplicateZoneId,
            Self::DuplicateVertexId { .. } => ConfigErrorCode::DuplicateVertexId,
            Self::DuplicateEdgeId { .. } => ConfigErrorCode::DuplicateEdgeId,
            Self::UnknownFarmType { .. } => ConfigErrorCode::UnknownFarmType,
        }
    }
}

/// Farm production style, which decides the synthetic topology and which
/// layers a demo dataset carries.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmType {
    /// Outdoor beds only; no lighting or vision instrumentation.
    #[default]
    OpenField,
    /// Fully covered growing with lighting and camera coverage.
    Greenhouse,
    /// Mixed estate: the first zones are greenhouses, the rest open field.
    Hybrid,
}

impl FarmType {
    /// Returns the tag used in payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenField => "open_field",
            Self::Greenhouse => "greenhouse",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parses a payload tag; returns `None` for anything outside the set.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open_field" => Some(Self::OpenField),
            "greenhouse" => Some(Self::Greenhouse),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// Whether any zone of this farm type is covered (and therefore carries
    /// lighting and vision instrumentation).
    #[must_use]
    pub const fn has_greenhouses(self) -> bool {
        matches!(self, Self::Greenhouse | Self::Hybrid)
    }
}

/// One irrigation/management zone of the farm.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ZoneConfig {
    /// Zone identifier, unique within the farm.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form zone classification (`greenhouse`, `open_field`, ...).
    #[serde(default)]
    pub zone_type: String,
    /// Zone area in square metres.
    #[serde(default)]
    pub area_m2: f32,
    /// Optional soil classification.
    #[serde(default)]
    pub soil_type: Option<String>,
}

/// Which analytics the farm has switched on. Everything defaults to on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ModelToggles {
    /// Irrigation scheduling.
    pub irrigation: bool,
    /// Nutrient deficit scoring.
    pub nutrients: bool,
    /// Yield forecasting.
    pub yield_forecast: bool,
    /// Statistical-process-control anomaly detection.
    pub anomaly_detection: bool,
}

impl Default for ModelToggles {
    fn default() -> Self {
        Self {
            irrigation: true,
            nutrients: true,
            yield_forecast: true,
            anomaly_detection: true,
        }
    }
}

/// A vertex definition: one physical or logical entity.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VertexDef {
    /// Opaque vertex identifier, unique within the farm.
    pub id: String,
    /// Entity kind (`sensor`, `valve`, `crop_bed`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A hyperedge definition: a typed relation over a vertex subset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EdgeDef {
    /// Edge identifier, unique within its layer.
    pub id: String,
    /// Owning layer tag.
    pub layer: String,
    /// Member vertex ids. Unknown ids are dropped at build time.
    #[serde(default)]
    pub vertex_ids: Vec<String>,
    /// Free-form metadata carried host-side.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The complete farm profile handed to `build_graph`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FarmConfig {
    /// Farm identifier; keys the process-wide graph cache.
    pub farm_id: String,
    /// Farm production style.
    #[serde(default)]
    pub farm_type: FarmType,
    /// Layer tags the farm actually instruments.
    #[serde(default)]
    pub active_layers: Vec<String>,
    /// Zone definitions.
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Analytics toggles.
    #[serde(default)]
    pub models: ModelToggles,
    /// Vertex definitions.
    #[serde(default)]
    pub vertices: Vec<VertexDef>,
    /// Hyperedge definitions.
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

impl FarmConfig {
    /// Validates the structural rules before graph construction.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] encountered: empty farm id, a
    /// layer tag outside the closed set, or duplicated zone, vertex, or
    /// per-layer edge identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.farm_id.trim().is_empty() {
            return Err(ConfigError::EmptyFarmId);
        }
        for layer in &self.active_layers {
            if LayerTag::parse(layer).is_none() {
                return Err(ConfigError::UnknownLayerTag {
                    layer: layer.clone(),
                    context: "active_layers".to_owned(),
                });
            }
        }
        let mut zone_ids = HashSet::new();
        for zone in &self.zones {
            if !zone_ids.insert(zone.id.as_str()) {
                return Err(ConfigError::DuplicateZoneId {
                    id: zone.id.clone(),
                });
            }
        }
        let mut vertex_ids = HashSet::new();
        for vertex in &self.vertices {
            if !vertex_ids.insert(vertex.id.as_str()) {
                return Err(ConfigError::DuplicateVertexId {
                    id: vertex.id.clone(),
                });
            }
        }
        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if LayerTag::parse(&edge.layer).is_none() {
                return Err(ConfigError::UnknownLayerTag {
                    layer: edge.layer.clone(),
                    context: format!("edge `{}`", edge.id),
                });
            }
            if !edge_ids.insert((edge.layer.as_str(), edge.id.as_str())) {
                return Err(ConfigError::DuplicateEdgeId {
                    id: edge.id.clone(),
                    layer: edge.layer.clone(),
                });
            }
        }
        Ok(())
    }

    /// The validated set of active layer tags, in declaration order.
    #[must_use]
    pub fn active_layer_tags(&self) -> Vec<LayerTag> {
        self.active_layers
            .iter()
            .filter_map(|raw| LayerTag::parse(raw))
            .collect()
    }
}
