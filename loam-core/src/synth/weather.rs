//! Synthetic weather station series.
//!
//! Temperature follows a diurnal sinusoid with per-station baseline
//! offsets; humidity is anti-correlated with temperature; precipitation
//! replays the shared rain forcing; wind, pressure, solar radiation, and
//! an ET₀ proxy are derived on the same grid. One mask covers every
//! channel of a station, so a station outage drops all of its readings.

use std::f32::consts::TAU;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

use super::{BitMatrix, Forcing, TimeGrid, apply_mask, correlated_noise, draw_mask};

/// Diurnal temperature amplitude, °C.
const TEMP_AMPLITUDE: f32 = 8.0;
/// Temperature baseline, °C.
const TEMP_BASELINE: f32 = 19.0;
/// Diurnal phase shift, radians.
const TEMP_PHASE: f32 = -1.0;
/// Humidity response to temperature, percentage points per °C.
const HUMIDITY_SLOPE: f32 = -0.9;
/// Peak clear-sky solar radiation, W/m².
const SOLAR_PEAK: f32 = 900.0;
/// Solar attenuation multiplier on rainy steps.
const RAIN_ATTENUATION: f32 = 0.25;

/// Weather station series block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WeatherSeries {
    /// Station identifiers, column-aligned with every matrix.
    pub station_ids: Vec<String>,
    /// Air temperature, °C.
    pub temperature: Vec<Vec<f32>>,
    /// Relative humidity, percent.
    pub humidity: Vec<Vec<f32>>,
    /// Precipitation, millimetres per step.
    pub precipitation: Vec<Vec<f32>>,
    /// Wind speed, m/s.
    pub wind_speed: Vec<Vec<f32>>,
    /// Wind direction, degrees.
    pub wind_direction: Vec<Vec<f32>>,
    /// Barometric pressure, hPa.
    pub pressure: Vec<Vec<f32>>,
    /// Solar radiation, W/m².
    pub solar_rad: Vec<Vec<f32>>,
    /// Reference evapotranspiration proxy, millimetres per step.
    pub et0_proxy: Vec<Vec<f32>>,
    /// Shared per-station dropout mask.
    pub missing_mask: BitMatrix,
}

pub(crate) fn generate(
    seed: u64,
    grid: &TimeGrid,
    n_stations: usize,
    forcing: &Forcing,
    dropout: f32,
) -> WeatherSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let offsets: Vec<f32> = (0..n_stations).map(|_| rng.gen_range(-1.5..1.5)).collect();
    let temp_noise = correlated_noise(&mut rng, grid.n_steps, n_stations);
    let humidity_noise = correlated_noise(&mut rng, grid.n_steps, n_stations);
    let wind_noise = correlated_noise(&mut rng, grid.n_steps, n_stations);
    let pressure_noise = correlated_noise(&mut rng, grid.n_steps, n_stations);

    let mut temperature = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut humidity = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut precipitation = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut wind_speed = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut wind_direction = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut pressure = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut solar_rad = DenseMatrix::zeros(grid.n_steps, n_stations);
    let mut et0_proxy = DenseMatrix::zeros(grid.n_steps, n_stations);

    for step in 0..grid.n_steps {
        let hour = grid.hour_of_day(step);
        let diurnal = (TAU * hour / 24.0 + TEMP_PHASE).sin();
        let solar_arc = (TAU * (hour - 6.0) / 24.0).sin().max(0.0);
        let rain = forcing.rain_mm[step];
        for station in 0..n_stations {
            let temp = TEMP_BASELINE
                + TEMP_AMPLITUDE * diurnal
                + offsets[station]
                + 0.8 * temp_noise.get(step, station);
            temperature.set(step, station, temp);
            humidity.set(
                step,
                station,
                (60.0 + HUMIDITY_SLOPE * (temp - TEMP_BASELINE)
                    + 4.0 * humidity_noise.get(step, station))
                .clamp(5.0, 100.0),
            );
            precipitation.set(step, station, rain);
            wind_speed.set(
                step,
                station,
                (3.0 + 1.5 * (TAU * hour / 24.0 - 2.0).sin()
                    + 1.2 * wind_noise.get(step, station))
                .max(0.0),
            );
            wind_direction.set(
                step,
                station,
                (180.0 + 60.0 * wind_noise.get(step, station)).rem_euclid(360.0),
            );
            pressure.set(
                step,
                station,
                1013.0
                    + 4.0 * (TAU * grid.day_of(step) / 7.0).sin()
                    + 1.5 * pressure_noise.get(step, station),
            );
            let attenuation = if rain > 0.0 { RAIN_ATTENUATION } else { 1.0 };
            let solar = SOLAR_PEAK * solar_arc * attenuation;
            solar_rad.set(step, station, solar);
            et0_proxy.set(
                step,
                station,
                0.0023 * (temp + 17.8) * (0.3 * temp.abs()).max(2.0).sqrt()
                    * (solar * 0.0036)
                    * grid.step_hours(),
            );
        }
    }

    let missing_mask = draw_mask(&mut rng, grid.n_steps, n_stations, dropout);
    apply_mask(
        &missing_mask,
        &mut [
            &mut temperature,
            &mut humidity,
            &mut precipitation,
            &mut wind_speed,
            &mut wind_direction,
            &mut pressure,
            &mut solar_rad,
            &mut et0_proxy,
        ],
    );

    WeatherSeries {
        station_ids: (0..n_stations).map(|s| format!("station-{}", s + 1)).collect(),
        temperature: temperature.to_rows(),
        humidity: humidity.to_rows(),
        precipitation: precipitation.to_rows(),
        wind_speed: wind_speed.to_rows(),
        wind_direction: wind_direction.to_rows(),
        pressure: pressure.to_rows(),
        solar_rad: solar_rad.to_rows(),
        et0_proxy: et0_proxy.to_rows(),
        missing_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::shared_forcing;

    fn series() -> WeatherSeries {
        let grid = TimeGrid {
            n_steps: 2 * 96,
            cadence_minutes: 15,
        };
        let forcing = shared_forcing(106, &grid, 6);
        generate(100, &grid, 2, &forcing, 0.05)
    }

    #[test]
    fn nights_are_dark_and_noons_are_bright() {
        let weather = series();
        // Step 0 is midnight; step 48 is noon of day one.
        for station in 0..2 {
            let midnight = weather.solar_rad[0][station];
            let noon = weather.solar_rad[48][station];
            if midnight.is_finite() {
                assert_eq!(midnight, 0.0);
            }
            if noon.is_finite() {
                assert!(noon > 100.0, "noon radiation was {noon}");
            }
        }
    }

    #[test]
    fn humidity_moves_against_temperature() {
        let weather = series();
        let mut pairs: Vec<(f32, f32)> = Vec::new();
        for (temps, humids) in weather.temperature.iter().zip(&weather.humidity) {
            for (&t, &h) in temps.iter().zip(humids) {
                if t.is_finite() && h.is_finite() {
                    pairs.push((t, h));
                }
            }
        }
        let n = pairs.len() as f32;
        let (mt, mh) = (
            pairs.iter().map(|p| p.0).sum::<f32>() / n,
            pairs.iter().map(|p| p.1).sum::<f32>() / n,
        );
        let cov: f32 = pairs.iter().map(|&(t, h)| (t - mt) * (h - mh)).sum::<f32>() / n;
        assert!(cov < 0.0, "expected anti-correlation, covariance {cov}");
    }

    #[test]
    fn mask_and_nan_positions_agree() {
        let weather = series();
        for step in 0..weather.temperature.len() {
            for station in 0..2 {
                let masked = weather.missing_mask.get(step, station);
                assert_eq!(weather.temperature[step][station].is_nan(), masked);
                assert_eq!(weather.et0_proxy[step][station].is_nan(), masked);
            }
        }
    }

    #[test]
    fn humidity_stays_in_physical_bounds() {
        let weather = series();
        for row in &weather.humidity {
            for &value in row {
                if value.is_finite() {
                    assert!((5.0..=100.0).contains(&value));
                }
            }
        }
    }
}
