//! The predictive model family.
//!
//! Every model consumes a graph in any residency and emits host-side
//! plain-data records. Missing *required* layers are not errors: the model
//! returns an empty vector and the caller's dashboard simply shows
//! nothing. Numeric guards (zero degrees, vanishing variance) are handled
//! locally by replacement or no-op.

pub mod anomaly;
pub mod irrigation;
pub mod nutrients;
pub mod yield_forecast;

pub use anomaly::{AnomalyRecord, detect_anomalies};
pub use irrigation::{IrrigationRecord, WeatherForecast, irrigation_schedule};
pub use nutrients::{NutrientRecord, NutrientWeights, nutrient_report};
pub use yield_forecast::{
    StressFactors, TrainOutcome, TrainReport, YieldRecord, forecast_yield, train_yield_residual,
};

use crate::graph::Layer;

/// Clamp to the unit interval; every stress factor and severity lives here.
pub(crate) fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Mean of a per-vertex series over one hyperedge's members, with the
/// degree floored at one so empty edges read as zero rather than NaN.
pub(crate) fn edge_mean(layer: &Layer, edge: usize, per_vertex: &[f32]) -> f32 {
    let members = layer.incidence().column_rows(edge);
    let sum: f32 = members
        .iter()
        .map(|&row| per_vertex.get(row as usize).copied().unwrap_or(0.0))
        .sum();
    sum / (members.len() as f32).max(1.0)
}

/// True when any member of one hyperedge has a truthy flag.
pub(crate) fn edge_any(layer: &Layer, edge: usize, flags: &[bool]) -> bool {
    layer
        .incidence()
        .column_rows(edge)
        .iter()
        .any(|&row| flags.get(row as usize).copied().unwrap_or(false))
}
