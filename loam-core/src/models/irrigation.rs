//! Irrigation scheduling: a day-by-day water balance per vertex, rolled
//! up per irrigation zone.
//!
//! Reference evapotranspiration comes from the caller's forecast when one
//! is supplied, otherwise from a simplified Hargreaves proxy over the
//! weather layer. The balance propagates day to day, crediting the
//! recommended volume back so tomorrow starts from watered soil.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::graph::{LayerTag, LayeredHypergraph};

use super::{clamp01, edge_mean};

/// Wilting-point moisture threshold (volume fraction).
const WILTING_POINT: f32 = 0.15;
/// Field-capacity moisture (volume fraction).
const FIELD_CAPACITY: f32 = 0.35;
/// Cap on a single day's recommended volume fraction.
const VOLUME_CAP: f32 = 0.10;
/// Effective root-zone depth in millimetres.
const EFFECTIVE_DEPTH_MM: f32 = 1000.0;

/// Optional per-day forecast vectors, each of length up to the horizon.
/// Days beyond the vectors fall back to on-graph statistics.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct WeatherForecast {
    /// Forecast precipitation per day, millimetres.
    pub precip_forecast: Vec<f32>,
    /// Forecast reference evapotranspiration per day, millimetres.
    pub et0_forecast: Vec<f32>,
}

/// One zone-day scheduling decision.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IrrigationRecord {
    /// Irrigation zone (hyperedge id) or vertex id when no zones exist.
    pub zone_id: String,
    /// Day within the horizon, starting at 1.
    pub day: u32,
    /// Whether any watering is recommended.
    pub irrigate: bool,
    /// Recommended volume, litres per square metre.
    pub volume_liters: f32,
    /// Projected moisture after the day's losses, volume fraction.
    pub projected_moisture: f32,
    /// Scheduling priority in `[0, 1]`.
    pub priority: f32,
    /// Which inequality fired for this decision.
    pub trigger_reason: String,
}

struct VertexDay {
    projected: f32,
    recommended: f32,
    priority: f32,
    reason: &'static str,
}

/// Schedules irrigation over `horizon_days` days.
///
/// Requires the `soil` and `weather` layers; returns an empty vector when
/// either is absent. The `crop_requirements` layer refines the crop
/// coefficient and the `irrigation` layer defines the zones; both are
/// optional.
#[instrument(
    name = "core.irrigation_schedule",
    skip(graph, forecast),
    fields(farm_id = %graph.farm_id(), horizon_days = horizon_days)
)]
#[must_use]
pub fn irrigation_schedule(
    graph: &LayeredHypergraph,
    horizon_days: u32,
    forecast: &WeatherForecast,
) -> Vec<IrrigationRecord> {
    let (Some(soil), Some(weather)) = (graph.layer(LayerTag::Soil), graph.layer(LayerTag::Weather))
    else {
        debug!("soil or weather layer missing, nothing to schedule");
        return Vec::new();
    };
    let crops = graph.layer(LayerTag::CropRequirements);
    let vertices = graph.vertex_count();
    if vertices == 0 || horizon_days == 0 {
        return Vec::new();
    }

    // Fallback precipitation: the mean of current readings, host-side.
    let mean_precip = (0..vertices)
        .map(|row| weather.features().get(row, 2))
        .sum::<f32>()
        / vertices as f32;

    let mut moisture: Vec<f32> = (0..vertices).map(|row| soil.features().get(row, 0)).collect();
    let mut records = Vec::new();

    for day in 0..horizon_days as usize {
        let precip = forecast.precip_forecast.get(day).copied().unwrap_or(mean_precip);
        let days: Vec<VertexDay> = (0..vertices)
            .map(|row| {
                let et0 = forecast.et0_forecast.get(day).copied().unwrap_or_else(|| {
                    let temp = weather.features().get(row, 0);
                    let solar = weather.features().get(row, 4);
                    hargreaves_et0(temp, solar)
                });
                let crop_coeff = crops.map_or(1.0, |layer| {
                    0.3 + 0.9 * clamp01(layer.features().get(row, 1))
                });
                step_water_balance(moisture[row], et0, crop_coeff, precip)
            })
            .collect();

        for (row, state) in days.iter().enumerate() {
            moisture[row] = state.projected + state.recommended;
        }

        match graph.layer(LayerTag::Irrigation) {
            Some(zones) if zones.incidence().cols() > 0 => {
                let projected: Vec<f32> = days.iter().map(|d| d.projected).collect();
                let recommended: Vec<f32> = days.iter().map(|d| d.recommended).collect();
                let priorities: Vec<f32> = days.iter().map(|d| d.priority).collect();
                for edge in 0..zones.incidence().cols() {
                    let volume = edge_mean(zones, edge, &recommended);
                    let members = zones.incidence().column_rows(edge);
                    let reason = members
                        .iter()
                        .map(|&row| days[row as usize].reason)
                        .fold("moisture_adequate", worse_reason);
                    records.push(IrrigationRecord {
                        zone_id: zones.edge_ids()[edge].clone(),
                        day: day as u32 + 1,
                        irrigate: volume > 0.0,
                        volume_liters: volume * 1000.0,
                        projected_moisture: edge_mean(zones, edge, &projected),
                        priority: edge_mean(zones, edge, &priorities),
                        trigger_reason: reason.to_owned(),
                    });
                }
            }
            _ => {
                for (row, state) in days.iter().enumerate() {
                    records.push(IrrigationRecord {
                        zone_id: graph.vertex_ids()[row].clone(),
                        day: day as u32 + 1,
                        irrigate: state.recommended > 0.0,
                        volume_liters: state.recommended * 1000.0,
                        projected_moisture: state.projected,
                        priority: state.priority,
                        trigger_reason: state.reason.to_owned(),
                    });
                }
            }
        }
    }
    records
}

/// Simplified Hargreaves reference evapotranspiration proxy, millimetres.
fn hargreaves_et0(temp: f32, solar: f32) -> f32 {
    0.0023 * (temp + 17.8) * (0.3 * temp.abs()).max(2.0).sqrt() * solar
}

fn step_water_balance(moisture: f32, et0: f32, crop_coeff: f32, precip: f32) -> VertexDay {
    let projected = (moisture - (et0 * crop_coeff + precip) / EFFECTIVE_DEPTH_MM).max(0.0);
    let (recommended, reason) = if projected < WILTING_POINT {
        let volume = (FIELD_CAPACITY - projected).min(VOLUME_CAP);
        if moisture < WILTING_POINT {
            (volume, "below_wilting_point")
        } else {
            (volume, "projected_deficit")
        }
    } else {
        (0.0, "moisture_adequate")
    };
    VertexDay {
        projected,
        recommended,
        priority: clamp01((WILTING_POINT - projected) / (FIELD_CAPACITY - WILTING_POINT)),
        reason,
    }
}

fn worse_reason(acc: &'static str, next: &'static str) -> &'static str {
    fn rank(reason: &str) -> u8 {
        match reason {
            "below_wilting_point" => 2,
            "projected_deficit" => 1,
            _ => 0,
        }
    }
    if rank(next) > rank(acc) { next } else { acc }
}
