//! Nutrient deficit scoring against crop requirement targets.
//!
//! Per-vertex N/P/K deficits are weighted, scaled by growth stage, and
//! normalised into a `[0, 1]` severity. A confirming vision anomaly
//! doubles the severity. Zone roll-up averages over the `npk` layer's
//! hyperedges and ORs the visual confirmation across members.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::graph::{LayerTag, LayeredHypergraph};

use super::{clamp01, edge_any, edge_mean};

/// Vision anomaly score above which a deficit counts as visually
/// confirmed.
const VISUAL_CONFIRM_THRESHOLD: f32 = 0.5;

/// Relative importance of the three macronutrient deficits.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct NutrientWeights {
    /// Nitrogen weight.
    pub n: f32,
    /// Phosphorus weight.
    pub p: f32,
    /// Potassium weight.
    pub k: f32,
}

impl Default for NutrientWeights {
    fn default() -> Self {
        Self {
            n: 0.50,
            p: 0.25,
            k: 0.25,
        }
    }
}

/// One zone's nutrient standing.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NutrientRecord {
    /// Nutrient zone (npk hyperedge id).
    pub zone_id: String,
    /// Mean nitrogen shortfall over members.
    pub nitrogen_deficit: f32,
    /// Mean phosphorus shortfall over members.
    pub phosphorus_deficit: f32,
    /// Mean potassium shortfall over members.
    pub potassium_deficit: f32,
    /// Severity in `[0, 1]`.
    pub severity_score: f32,
    /// Tier derived from the severity.
    pub urgency: String,
    /// Human amendment suggestion.
    pub suggested_amendment: String,
    /// Whether any member had a confirming vision anomaly.
    pub visual_confirmed: bool,
}

/// Scores nutrient deficits per zone.
///
/// Requires the `npk` and `crop_requirements` layers; returns an empty
/// vector when either is absent. The `vision` layer, when present,
/// doubles the severity of visually confirmed deficits.
#[instrument(name = "core.nutrient_report", skip(graph), fields(farm_id = %graph.farm_id()))]
#[must_use]
pub fn nutrient_report(
    graph: &LayeredHypergraph,
    weights: NutrientWeights,
) -> Vec<NutrientRecord> {
    let (Some(npk), Some(crops)) = (
        graph.layer(LayerTag::Npk),
        graph.layer(LayerTag::CropRequirements),
    ) else {
        debug!("npk or crop_requirements layer missing, nothing to score");
        return Vec::new();
    };
    let vision = graph.layer(LayerTag::Vision);
    let vertices = graph.vertex_count();

    // Host-side maximum requirement, the severity normaliser.
    let req_max = (0..vertices)
        .flat_map(|row| (2..5).map(move |col| (row, col)))
        .map(|(row, col)| crops.features().get(row, col))
        .fold(0.0_f32, f32::max);

    let mut deficits = vec![[0.0_f32; 3]; vertices];
    let mut severities = vec![0.0_f32; vertices];
    let mut confirmed = vec![false; vertices];
    for row in 0..vertices {
        let current = npk.features().row(row);
        for nutrient in 0..3 {
            let required = crops.features().get(row, nutrient + 2);
            deficits[row][nutrient] =
                (required - current.get(nutrient).copied().unwrap_or(0.0)).max(0.0);
        }
        let growth_weight = 1.5 - 0.5 * clamp01(crops.features().get(row, 1));
        let weighted = weights.n * deficits[row][0]
            + weights.p * deficits[row][1]
            + weights.k * deficits[row][2];
        let mut severity = clamp01(weighted * growth_weight / (req_max.max(1.0) * 1.5));
        if let Some(vision) = vision {
            if vision.features().get(row, 2) > VISUAL_CONFIRM_THRESHOLD {
                severity = clamp01(severity * 2.0);
                confirmed[row] = true;
            }
        }
        severities[row] = severity;
    }

    let nitrogen: Vec<f32> = deficits.iter().map(|d| d[0]).collect();
    let phosphorus: Vec<f32> = deficits.iter().map(|d| d[1]).collect();
    let potassium: Vec<f32> = deficits.iter().map(|d| d[2]).collect();

    (0..npk.incidence().cols())
        .map(|edge| {
            let n = edge_mean(npk, edge, &nitrogen);
            let p = edge_mean(npk, edge, &phosphorus);
            let k = edge_mean(npk, edge, &potassium);
            let severity = edge_mean(npk, edge, &severities);
            NutrientRecord {
                zone_id: npk.edge_ids()[edge].clone(),
                nitrogen_deficit: n,
                phosphorus_deficit: p,
                potassium_deficit: k,
                severity_score: severity,
                urgency: urgency_tier(severity).to_owned(),
                suggested_amendment: amendment(n, p, k),
                visual_confirmed: edge_any(npk, edge, &confirmed),
            }
        })
        .collect()
}

/// Urgency tiers over the unit severity interval.
fn urgency_tier(severity: f32) -> &'static str {
    if severity < 0.25 {
        "low"
    } else if severity < 0.5 {
        "medium"
    } else if severity < 0.75 {
        "high"
    } else {
        "critical"
    }
}

/// Composes the amendment suggestion from the positive deficits.
fn amendment(nitrogen: f32, phosphorus: f32, potassium: f32) -> String {
    let names: Vec<&str> = [
        (nitrogen, "nitrogen"),
        (phosphorus, "phosphorus"),
        (potassium, "potassium"),
    ]
    .iter()
    .filter(|(deficit, _)| *deficit > 0.0)
    .map(|&(_, name)| name)
    .collect();
    if names.is_empty() {
        "none".to_owned()
    } else {
        format!("apply {} fertilizer", names.join(", "))
    }
}
