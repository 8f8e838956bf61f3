//! Synthetic soil sensor series.
//!
//! Moisture follows a leaky bucket: exponential drying per sensor plus
//! the shared rainfall and irrigation impulses, a small diurnal ripple,
//! and correlated noise, clamped to `[0.03, 0.95]`. Temperature couples
//! to the diurnal cycle and inversely to moisture; conductivity is
//! inversely related to moisture; pH drifts slowly inside `[4.5, 8.5]`.
//! All four channels of a sensor share one dropout mask.

use std::f32::consts::TAU;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

use super::{BitMatrix, Forcing, SensorBank, TimeGrid, apply_mask, correlated_noise, draw_mask};

/// Moisture lower clamp.
const MOISTURE_MIN: f32 = 0.03;
/// Moisture upper clamp.
const MOISTURE_MAX: f32 = 0.95;
/// Millimetres of water that raise moisture by one volume-fraction unit.
const MM_PER_FRACTION: f32 = 400.0;

/// Soil sensor series block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SoilSeries {
    /// Sensor identifiers, column-aligned with every matrix.
    pub sensor_ids: Vec<String>,
    /// Owning zone per sensor.
    pub zone_ids: Vec<String>,
    /// Volumetric moisture fraction in `[0.03, 0.95]`.
    pub moisture: Vec<Vec<f32>>,
    /// Soil temperature, °C.
    pub temperature: Vec<Vec<f32>>,
    /// Electrical conductivity, dS/m.
    pub conductivity: Vec<Vec<f32>>,
    /// Soil pH in `[4.5, 8.5]`.
    pub ph: Vec<Vec<f32>>,
    /// Shared per-sensor dropout mask.
    pub missing_mask: BitMatrix,
}

pub(crate) fn generate(
    seed: u64,
    grid: &TimeGrid,
    sensors: &SensorBank,
    forcing: &Forcing,
    dropout: f32,
) -> SoilSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_sensors = sensors.sensor_id.len();
    let zone_of = zone_indices(&sensors.zone_id);

    let decay: Vec<f32> = (0..n_sensors).map(|_| rng.gen_range(0.0008..0.0025)).collect();
    let base_conductivity: Vec<f32> = (0..n_sensors).map(|_| rng.gen_range(0.8..1.4)).collect();
    let base_ph: Vec<f32> = (0..n_sensors).map(|_| rng.gen_range(6.0..7.2)).collect();
    let noise = correlated_noise(&mut rng, grid.n_steps, n_sensors);

    let mut moisture = DenseMatrix::zeros(grid.n_steps, n_sensors);
    let mut temperature = DenseMatrix::zeros(grid.n_steps, n_sensors);
    let mut conductivity = DenseMatrix::zeros(grid.n_steps, n_sensors);
    let mut ph = DenseMatrix::zeros(grid.n_steps, n_sensors);

    let mut level: Vec<f32> = (0..n_sensors).map(|_| rng.gen_range(0.22..0.38)).collect();
    for step in 0..grid.n_steps {
        let hour = grid.hour_of_day(step);
        let diurnal = (TAU * hour / 24.0 - 1.0).sin();
        for sensor in 0..n_sensors {
            let zone = zone_of[sensor];
            let inflow_mm = forcing.rain_mm[step]
                + forcing
                    .irrigation_mm
                    .get(step, zone.min(forcing.irrigation_mm.cols().saturating_sub(1)));
            let next = level[sensor] * (-decay[sensor]).exp()
                + inflow_mm / MM_PER_FRACTION
                + 0.002 * diurnal
                + 0.003 * noise.get(step, sensor);
            level[sensor] = next.clamp(MOISTURE_MIN, MOISTURE_MAX);
            moisture.set(step, sensor, level[sensor]);
            temperature.set(
                step,
                sensor,
                15.0 + 4.0 * diurnal - 6.0 * (level[sensor] - 0.3)
                    + 0.3 * noise.get(step, sensor),
            );
            conductivity.set(
                step,
                sensor,
                (base_conductivity[sensor] * (1.0 + 0.6 * (0.3 - level[sensor]))
                    + 0.05 * noise.get(step, sensor))
                .max(0.05),
            );
            ph.set(
                step,
                sensor,
                (base_ph[sensor]
                    + 0.2 * (TAU * grid.day_of(step) / 60.0).sin()
                    + 0.02 * noise.get(step, sensor))
                .clamp(4.5, 8.5),
            );
        }
    }

    let missing_mask = draw_mask(&mut rng, grid.n_steps, n_sensors, dropout);
    apply_mask(
        &missing_mask,
        &mut [&mut moisture, &mut temperature, &mut conductivity, &mut ph],
    );

    SoilSeries {
        sensor_ids: sensors.sensor_id.clone(),
        zone_ids: sensors.zone_id.clone(),
        moisture: moisture.to_rows(),
        temperature: temperature.to_rows(),
        conductivity: conductivity.to_rows(),
        ph: ph.to_rows(),
        missing_mask,
    }
}

/// Maps each sensor to its zone's index by first appearance order.
fn zone_indices(zone_ids: &[String]) -> Vec<usize> {
    let mut seen: Vec<&String> = Vec::new();
    zone_ids
        .iter()
        .map(|zone| {
            if let Some(index) = seen.iter().position(|&s| s == zone) {
                index
            } else {
                seen.push(zone);
                seen.len() - 1
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::shared_forcing;

    fn series(dropout: f32) -> SoilSeries {
        let grid = TimeGrid {
            n_steps: 3 * 96,
            cadence_minutes: 15,
        };
        let forcing = shared_forcing(206, &grid, 2);
        let sensors = SensorBank {
            sensor_id: vec![
                "zone-1-soil-1".to_owned(),
                "zone-1-soil-2".to_owned(),
                "zone-2-soil-1".to_owned(),
            ],
            zone_id: vec!["zone-1".to_owned(), "zone-1".to_owned(), "zone-2".to_owned()],
        };
        generate(200, &grid, &sensors, &forcing, dropout)
    }

    #[test]
    fn moisture_honours_its_clamp() {
        let soil = series(0.03);
        for row in &soil.moisture {
            for &value in row {
                if value.is_finite() {
                    assert!((MOISTURE_MIN..=MOISTURE_MAX).contains(&value));
                }
            }
        }
    }

    #[test]
    fn sensor_dropout_hits_every_channel_at_once() {
        let soil = series(0.10);
        assert!(soil.missing_mask.count_set() > 0);
        for step in 0..soil.moisture.len() {
            for sensor in 0..soil.sensor_ids.len() {
                let masked = soil.missing_mask.get(step, sensor);
                assert_eq!(soil.moisture[step][sensor].is_nan(), masked);
                assert_eq!(soil.temperature[step][sensor].is_nan(), masked);
                assert_eq!(soil.conductivity[step][sensor].is_nan(), masked);
                assert_eq!(soil.ph[step][sensor].is_nan(), masked);
            }
        }
    }

    #[test]
    fn ph_stays_in_agronomic_bounds() {
        let soil = series(0.0);
        for row in &soil.ph {
            for &value in row {
                assert!((4.5..=8.5).contains(&value));
            }
        }
    }

    #[test]
    fn zone_indices_follow_first_appearance() {
        let ids = vec![
            "zone-1".to_owned(),
            "zone-1".to_owned(),
            "zone-2".to_owned(),
            "zone-1".to_owned(),
        ];
        assert_eq!(zone_indices(&ids), vec![0, 0, 1, 0]);
    }
}
