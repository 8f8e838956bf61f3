//! Synthetic grow-lighting series for covered zones.
//!
//! PAR follows a clipped sinusoid scaled by a per-zone peak; the daily
//! light integral accumulates PAR over the day and resets at midnight;
//! the duty cycle and a bounded spectrum index are derived on the same
//! grid.

use std::f32::consts::TAU;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

use super::{BitMatrix, TimeGrid, apply_mask, correlated_noise, draw_mask};

/// Phase shift of the PAR arc, radians.
const PAR_PHASE: f32 = 1.1;
/// Fraction of the zone peak above which fixtures count as on.
const DUTY_THRESHOLD: f32 = 0.1;
/// µmol-to-mol conversion for the DLI integral.
const MICROMOL_TO_MOL: f32 = 1e-6;

/// Lighting series block, one column per covered zone.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LightingSeries {
    /// Covered zone identifiers, column-aligned with every matrix.
    pub zone_ids: Vec<String>,
    /// Photosynthetically active radiation, µmol/m²/s.
    pub par: Vec<Vec<f32>>,
    /// Daily light integral so far, mol/m².
    pub dli_cumulative: Vec<Vec<f32>>,
    /// Fixture duty cycle, 0 or 1.
    pub duty_cycle: Vec<Vec<f32>>,
    /// Bounded spectrum index.
    pub spectrum_index: Vec<Vec<f32>>,
    /// Per-zone dropout mask.
    pub missing_mask: BitMatrix,
}

pub(crate) fn generate(
    seed: u64,
    grid: &TimeGrid,
    covered_zones: &[String],
    dropout: f32,
) -> LightingSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_zones = covered_zones.len();
    let peaks: Vec<f32> = (0..n_zones).map(|_| rng.gen_range(600.0..900.0)).collect();
    let noise = correlated_noise(&mut rng, grid.n_steps, n_zones);

    let mut par = DenseMatrix::zeros(grid.n_steps, n_zones);
    let mut dli_cumulative = DenseMatrix::zeros(grid.n_steps, n_zones);
    let mut duty_cycle = DenseMatrix::zeros(grid.n_steps, n_zones);
    let mut spectrum_index = DenseMatrix::zeros(grid.n_steps, n_zones);

    let step_seconds = grid.step_hours() * 3600.0;
    let mut integral = vec![0.0_f32; n_zones];
    for step in 0..grid.n_steps {
        let hour = grid.hour_of_day(step);
        if hour == 0.0 {
            integral.iter_mut().for_each(|dli| *dli = 0.0);
        }
        let arc = (TAU * hour / 24.0 - PAR_PHASE).sin().max(0.0);
        for zone in 0..n_zones {
            let level = (arc * peaks[zone] + 8.0 * noise.get(step, zone)).max(0.0);
            par.set(step, zone, level);
            integral[zone] += level * step_seconds * MICROMOL_TO_MOL;
            dli_cumulative.set(step, zone, integral[zone]);
            duty_cycle.set(
                step,
                zone,
                if level > DUTY_THRESHOLD * peaks[zone] { 1.0 } else { 0.0 },
            );
            spectrum_index.set(
                step,
                zone,
                (0.75 + 0.15 * (TAU * grid.day_of(step) / 10.0).sin()).clamp(0.0, 1.0),
            );
        }
    }

    let missing_mask = draw_mask(&mut rng, grid.n_steps, n_zones, dropout);
    apply_mask(
        &missing_mask,
        &mut [
            &mut par,
            &mut dli_cumulative,
            &mut duty_cycle,
            &mut spectrum_index,
        ],
    );

    LightingSeries {
        zone_ids: covered_zones.to_vec(),
        par: par.to_rows(),
        dli_cumulative: dli_cumulative.to_rows(),
        duty_cycle: duty_cycle.to_rows(),
        spectrum_index: spectrum_index.to_rows(),
        missing_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> LightingSeries {
        let grid = TimeGrid {
            n_steps: 2 * 96,
            cadence_minutes: 15,
        };
        generate(400, &grid, &["zone-1".to_owned(), "zone-2".to_owned()], 0.0)
    }

    #[test]
    fn par_is_never_negative() {
        let lighting = series();
        for row in &lighting.par {
            for &value in row {
                assert!(value >= 0.0);
            }
        }
    }

    #[test]
    fn dli_accumulates_within_a_day_and_resets() {
        let lighting = series();
        // Late afternoon of day one outshines its morning.
        assert!(lighting.dli_cumulative[70][0] >= lighting.dli_cumulative[30][0]);
        // Midnight of day two starts a fresh integral.
        assert!(lighting.dli_cumulative[96][0] <= lighting.dli_cumulative[95][0]);
    }

    #[test]
    fn duty_cycle_is_binary() {
        let lighting = series();
        for row in &lighting.duty_cycle {
            for &value in row {
                assert!(value == 0.0 || value == 1.0);
            }
        }
        assert!(lighting.duty_cycle.iter().flatten().any(|&v| v == 1.0));
    }
}
