//! Correlated multi-layer synthetic data generation.
//!
//! One call produces a complete demo dataset for a farm type: a shared
//! 15-minute time grid, shared rainfall and irrigation forcing, and one
//! correlated time-series block per instrumented layer. Everything is
//! driven by a single 64-bit seed; each layer derives its own stream by
//! adding a small offset, so a single layer can be reproduced in
//! isolation. The host backend is bitwise-deterministic per seed.

mod correlate;
mod forcing;
mod lighting;
mod mask;
mod npk;
mod soil;
mod vision;
mod weather;

pub use lighting::LightingSeries;
pub use mask::BitMatrix;
pub use npk::NpkSeries;
pub use soil::SoilSeries;
pub use vision::VisionSeries;
pub use weather::WeatherSeries;

pub(crate) use correlate::correlated_noise;
pub(crate) use forcing::{Forcing, shared_forcing};

use std::env;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{config::FarmType, dense::DenseMatrix};

/// Default sampling cadence, minutes.
pub const DEFAULT_CADENCE_MINUTES: u32 = 15;
/// Environment knob overriding the sampling cadence.
pub const CADENCE_ENV: &str = "LOAM_CADENCE_MINUTES";
/// Default per-channel dropout rate.
pub const DEFAULT_DROPOUT_RATE: f32 = 0.03;
/// Environment knob overriding the dropout rate.
pub const DROPOUT_ENV: &str = "LOAM_DROPOUT_RATE";

/// Zones per synthetic farm. Hybrid farms split them two greenhouse,
/// four open field.
const N_ZONES: usize = 6;
/// Greenhouse zones on a hybrid farm.
const HYBRID_GREENHOUSE_ZONES: usize = 2;
/// Soil sensors per zone.
const SENSORS_PER_ZONE: usize = 2;
/// Weather stations per farm.
const N_STATIONS: usize = 2;
/// Crop beds per covered zone (vision coverage).
const BEDS_PER_ZONE: usize = 4;

/// Per-layer seed offsets so cross-layer tests can reproduce one layer
/// without generating the rest.
const SEED_WEATHER: u64 = 1;
const SEED_SOIL: u64 = 2;
const SEED_NPK: u64 = 3;
const SEED_LIGHTING: u64 = 4;
const SEED_VISION: u64 = 5;
const SEED_FORCING: u64 = 6;

/// The shared sampling grid.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TimeGrid {
    pub n_steps: usize,
    pub cadence_minutes: u32,
}

impl TimeGrid {
    fn new(days: u32, cadence_minutes: u32) -> Self {
        Self {
            n_steps: (days as usize * 24 * 60) / cadence_minutes as usize,
            cadence_minutes,
        }
    }

    /// Absolute hours since the grid start.
    pub fn abs_hours(&self, step: usize) -> f32 {
        step as f32 * self.cadence_minutes as f32 / 60.0
    }

    /// Hour of day in `[0, 24)`.
    pub fn hour_of_day(&self, step: usize) -> f32 {
        self.abs_hours(step) % 24.0
    }

    /// Fractional day since the grid start.
    pub fn day_of(&self, step: usize) -> f32 {
        self.abs_hours(step) / 24.0
    }

    /// Step length in hours.
    pub fn step_hours(&self) -> f32 {
        self.cadence_minutes as f32 / 60.0
    }
}

/// How missing samples are encoded.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Missingness {
    /// Always `nan+mask`.
    pub encoding: String,
    /// Per-channel dropout probability.
    pub dropout_rate: f32,
}

/// Reproducibility guarantees per backend.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Reproducibility {
    /// Host guarantee: `bitwise`.
    pub host: String,
    /// Accelerator guarantee: `statistical`.
    pub accelerator: String,
}

/// One synthetic zone.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ZoneTopology {
    /// Zone identifier.
    pub zone_id: String,
    /// `greenhouse` or `open_field`.
    pub zone_type: String,
    /// Layers instrumented in this zone.
    pub active_layers: Vec<String>,
}

/// Soil sensor placement, index-aligned arrays.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SensorBank {
    /// Sensor identifiers.
    pub sensor_id: Vec<String>,
    /// Owning zone per sensor.
    pub zone_id: Vec<String>,
}

/// Weather station placement.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StationBank {
    /// Station identifiers.
    pub station_id: Vec<String>,
}

/// The synthetic farm's physical layout.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Topology {
    /// Zone count.
    pub n_zones: usize,
    /// Zone descriptors.
    pub zones: Vec<ZoneTopology>,
    /// Soil sensor placement.
    pub soil_sensors: SensorBank,
    /// Weather station placement.
    pub weather_stations: StationBank,
}

/// Per-valve irrigation series derived from the shared impulses.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IrrigationSeries {
    /// Valve identifiers, one per zone.
    pub valve_ids: Vec<String>,
    /// Zone each valve feeds.
    pub zone_ids: Vec<String>,
    /// Applied millimetres, `n_steps × n_valves`.
    pub applied_mm: Vec<Vec<f32>>,
}

/// Every generated layer block. Lighting and vision only exist when the
/// farm has greenhouses.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LayerBlocks {
    /// Soil sensor series.
    pub soil: SoilSeries,
    /// Weather station series.
    pub weather: WeatherSeries,
    /// Irrigation valve series.
    pub irrigation: IrrigationSeries,
    /// Weekly nutrient series.
    pub npk: NpkSeries,
    /// Lighting series; greenhouse farms only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<LightingSeries>,
    /// Vision series; greenhouse farms only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<VisionSeries>,
}

/// The complete plain-data synthetic dataset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SyntheticDataset {
    /// Requested farm type tag.
    pub farm_type: String,
    /// Simulated days.
    pub days: u32,
    /// Driving seed.
    pub seed: u64,
    /// Sampling cadence, minutes.
    pub cadence_minutes: u32,
    /// Samples on the grid.
    pub n_steps: usize,
    /// Monotonic sample times, hours from start.
    pub time_hours: Vec<f32>,
    /// Missingness encoding.
    pub missingness: Missingness,
    /// Determinism guarantees.
    pub reproducibility: Reproducibility,
    /// Farm layout.
    pub topology: Topology,
    /// Generated series per layer.
    pub layers: LayerBlocks,
    /// Always `ok`.
    pub status: String,
}

/// Resolves the sampling cadence, honouring the environment override.
#[must_use]
pub fn cadence_minutes() -> u32 {
    env::var(CADENCE_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|&cadence| cadence > 0)
        .unwrap_or(DEFAULT_CADENCE_MINUTES)
}

/// Resolves the dropout rate, honouring the environment override.
#[must_use]
pub fn dropout_rate() -> f32 {
    env::var(DROPOUT_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|rate| (0.0..1.0).contains(rate))
        .unwrap_or(DEFAULT_DROPOUT_RATE)
}

/// Generates the complete demo dataset for a farm type.
///
/// `days` is clamped to at least one. Identical `(seed, farm_type,
/// days)` inputs produce element-wise identical output on the host
/// backend.
#[instrument(
    name = "core.generate_synthetic",
    fields(farm_type = farm_type.as_str(), days = days, seed = seed)
)]
#[must_use]
pub fn generate_synthetic(farm_type: FarmType, days: u32, seed: u64) -> SyntheticDataset {
    let days = days.max(1);
    let cadence = cadence_minutes();
    let dropout = dropout_rate();
    let grid = TimeGrid::new(days, cadence);
    let topology = build_topology(farm_type);

    let forcing = shared_forcing(seed.wrapping_add(SEED_FORCING), &grid, N_ZONES);
    let weather = weather::generate(
        seed.wrapping_add(SEED_WEATHER),
        &grid,
        N_STATIONS,
        &forcing,
        dropout,
    );
    let soil = soil::generate(
        seed.wrapping_add(SEED_SOIL),
        &grid,
        &topology.soil_sensors,
        &forcing,
        dropout,
    );
    let npk = npk::generate(seed.wrapping_add(SEED_NPK), days, N_ZONES, dropout);
    let (lighting, vision) = if farm_type.has_greenhouses() {
        let covered: Vec<String> = topology
            .zones
            .iter()
            .filter(|zone| zone.zone_type == "greenhouse")
            .map(|zone| zone.zone_id.clone())
            .collect();
        (
            Some(lighting::generate(
                seed.wrapping_add(SEED_LIGHTING),
                &grid,
                &covered,
                dropout,
            )),
            Some(vision::generate(
                seed.wrapping_add(SEED_VISION),
                &grid,
                &covered,
                BEDS_PER_ZONE,
                dropout,
            )),
        )
    } else {
        (None, None)
    };
    let irrigation = irrigation_series(&topology, &forcing);

    info!(
        n_steps = grid.n_steps,
        zones = N_ZONES,
        greenhouses = farm_type.has_greenhouses(),
        "synthetic dataset generated"
    );
    SyntheticDataset {
        farm_type: farm_type.as_str().to_owned(),
        days,
        seed,
        cadence_minutes: cadence,
        n_steps: grid.n_steps,
        time_hours: (0..grid.n_steps).map(|step| grid.abs_hours(step)).collect(),
        missingness: Missingness {
            encoding: "nan+mask".to_owned(),
            dropout_rate: dropout,
        },
        reproducibility: Reproducibility {
            host: "bitwise".to_owned(),
            accelerator: "statistical".to_owned(),
        },
        topology,
        layers: LayerBlocks {
            soil,
            weather,
            irrigation,
            npk,
            lighting,
            vision,
        },
        status: "ok".to_owned(),
    }
}

fn build_topology(farm_type: FarmType) -> Topology {
    let zones: Vec<ZoneTopology> = (0..N_ZONES)
        .map(|index| {
            let covered = match farm_type {
                FarmType::Greenhouse => true,
                FarmType::OpenField => false,
                FarmType::Hybrid => index < HYBRID_GREENHOUSE_ZONES,
            };
            let mut active_layers = vec![
                "soil".to_owned(),
                "irrigation".to_owned(),
                "weather".to_owned(),
                "npk".to_owned(),
                "crop_requirements".to_owned(),
            ];
            if covered {
                active_layers.push("lighting".to_owned());
                active_layers.push("vision".to_owned());
            }
            ZoneTopology {
                zone_id: format!("zone-{}", index + 1),
                zone_type: if covered { "greenhouse" } else { "open_field" }.to_owned(),
                active_layers,
            }
        })
        .collect();

    let mut sensor_id = Vec::with_capacity(N_ZONES * SENSORS_PER_ZONE);
    let mut sensor_zone = Vec::with_capacity(N_ZONES * SENSORS_PER_ZONE);
    for zone in &zones {
        for sensor in 0..SENSORS_PER_ZONE {
            sensor_id.push(format!("{}-soil-{}", zone.zone_id, sensor + 1));
            sensor_zone.push(zone.zone_id.clone());
        }
    }

    Topology {
        n_zones: N_ZONES,
        zones,
        soil_sensors: SensorBank {
            sensor_id,
            zone_id: sensor_zone,
        },
        weather_stations: StationBank {
            station_id: (0..N_STATIONS).map(|s| format!("station-{}", s + 1)).collect(),
        },
    }
}

/// Tiles the shared irrigation impulses into per-valve applied-mm series.
fn irrigation_series(topology: &Topology, forcing: &Forcing) -> IrrigationSeries {
    let valve_ids: Vec<String> = topology
        .zones
        .iter()
        .map(|zone| format!("{}-valve", zone.zone_id))
        .collect();
    IrrigationSeries {
        valve_ids,
        zone_ids: topology.zones.iter().map(|zone| zone.zone_id.clone()).collect(),
        applied_mm: forcing.irrigation_mm.to_rows(),
    }
}

/// Writes `NaN` into every masked position of the given channel blocks.
pub(crate) fn apply_mask(mask: &BitMatrix, channels: &mut [&mut DenseMatrix]) {
    for matrix in channels.iter_mut() {
        for row in 0..mask.rows() {
            for col in 0..mask.cols() {
                if mask.get(row, col) {
                    matrix.set(row, col, f32::NAN);
                }
            }
        }
    }
}

/// Draws an independent dropout mask.
pub(crate) fn draw_mask(
    rng: &mut rand::rngs::StdRng,
    rows: usize,
    cols: usize,
    dropout: f32,
) -> BitMatrix {
    use rand::Rng;
    let mut mask = BitMatrix::new(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            if rng.gen_bool(f64::from(dropout)) {
                mask.set(row, col, true);
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn grid_matches_the_fifteen_minute_default() {
        let grid = TimeGrid::new(1, DEFAULT_CADENCE_MINUTES);
        assert_eq!(grid.n_steps, 96);
        assert_eq!(grid.abs_hours(1), 0.25);
        assert_eq!(grid.hour_of_day(96), 0.0);
    }

    #[rstest]
    #[case::open_field(FarmType::OpenField, 0)]
    #[case::greenhouse(FarmType::Greenhouse, N_ZONES)]
    #[case::hybrid(FarmType::Hybrid, HYBRID_GREENHOUSE_ZONES)]
    fn topology_splits_covered_zones(#[case] farm_type: FarmType, #[case] covered: usize) {
        let topology = build_topology(farm_type);
        assert_eq!(topology.n_zones, N_ZONES);
        assert_eq!(
            topology
                .zones
                .iter()
                .filter(|zone| zone.zone_type == "greenhouse")
                .count(),
            covered
        );
        for zone in &topology.zones {
            let has_vision = zone.active_layers.iter().any(|layer| layer == "vision");
            assert_eq!(has_vision, zone.zone_type == "greenhouse");
        }
    }

    #[test]
    fn hybrid_puts_greenhouses_first() {
        let topology = build_topology(FarmType::Hybrid);
        assert_eq!(topology.zones[0].zone_type, "greenhouse");
        assert_eq!(topology.zones[1].zone_type, "greenhouse");
        assert!(topology.zones[2..].iter().all(|zone| zone.zone_type == "open_field"));
    }

    #[test]
    fn dataset_carries_the_contract_header() {
        let dataset = generate_synthetic(FarmType::Hybrid, 1, 99);
        assert_eq!(dataset.status, "ok");
        assert_eq!(dataset.missingness.encoding, "nan+mask");
        assert_eq!(dataset.reproducibility.host, "bitwise");
        assert_eq!(dataset.n_steps, dataset.time_hours.len());
        let mut previous = -1.0;
        for &hour in &dataset.time_hours {
            assert!(hour > previous);
            previous = hour;
        }
        assert!(dataset.layers.lighting.is_some());
        assert!(dataset.layers.vision.is_some());
    }

    #[test]
    fn open_field_omits_covered_layers() {
        let dataset = generate_synthetic(FarmType::OpenField, 1, 5);
        assert!(dataset.layers.lighting.is_none());
        assert!(dataset.layers.vision.is_none());
    }

    // NaN sentinels defeat `PartialEq`, so determinism is compared on the
    // serialized projection where they become `null`.
    #[test]
    fn identical_seeds_are_bitwise_identical() {
        let left = generate_synthetic(FarmType::Hybrid, 2, 1234);
        let right = generate_synthetic(FarmType::Hybrid, 2, 1234);
        assert_eq!(
            serde_json::to_string(&left).expect("dataset serializes"),
            serde_json::to_string(&right).expect("dataset serializes")
        );
    }

    #[test]
    fn different_seeds_differ() {
        let left = generate_synthetic(FarmType::OpenField, 1, 1);
        let right = generate_synthetic(FarmType::OpenField, 1, 2);
        assert_ne!(
            serde_json::to_string(&left).expect("dataset serializes"),
            serde_json::to_string(&right).expect("dataset serializes")
        );
    }
}
