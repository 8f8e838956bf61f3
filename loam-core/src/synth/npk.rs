//! Synthetic nutrient series on a weekly cadence.
//!
//! Per-zone N/P/K baselines drift linearly downward as crops feed, with
//! step-ups every fourth week when fertiliser goes down. Organic matter
//! follows a slow seasonal sinusoid. Values are clamped to agronomic
//! ranges and all channels of a zone share one dropout mask.

use std::f32::consts::TAU;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

use super::{BitMatrix, apply_mask, correlated_noise, draw_mask};

/// Weekly depletion, milligrams per kilogram.
const WEEKLY_DRIFT: f32 = 1.8;
/// Weeks between fertilisation events.
const FERTILIZE_EVERY_WEEKS: usize = 4;

/// Weekly nutrient series block.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NpkSeries {
    /// Zone identifiers, column-aligned with every matrix.
    pub zone_ids: Vec<String>,
    /// Sample times, hours from the grid start (one per week).
    pub sample_hours: Vec<f32>,
    /// Nitrogen, mg/kg.
    pub nitrogen: Vec<Vec<f32>>,
    /// Phosphorus, mg/kg.
    pub phosphorus: Vec<Vec<f32>>,
    /// Potassium, mg/kg.
    pub potassium: Vec<Vec<f32>>,
    /// Organic matter, percent.
    pub organic_matter: Vec<Vec<f32>>,
    /// Shared per-zone dropout mask.
    pub missing_mask: BitMatrix,
}

pub(crate) fn generate(seed: u64, days: u32, n_zones: usize, dropout: f32) -> NpkSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_weeks = (days as usize).div_ceil(7).max(1);

    let base_n: Vec<f32> = (0..n_zones).map(|_| rng.gen_range(45.0..85.0)).collect();
    let base_p: Vec<f32> = (0..n_zones).map(|_| rng.gen_range(30.0..60.0)).collect();
    let base_k: Vec<f32> = (0..n_zones).map(|_| rng.gen_range(40.0..75.0)).collect();
    let noise = correlated_noise(&mut rng, n_weeks, n_zones);

    let mut nitrogen = DenseMatrix::zeros(n_weeks, n_zones);
    let mut phosphorus = DenseMatrix::zeros(n_weeks, n_zones);
    let mut potassium = DenseMatrix::zeros(n_weeks, n_zones);
    let mut organic_matter = DenseMatrix::zeros(n_weeks, n_zones);

    for week in 0..n_weeks {
        let step_ups = week / FERTILIZE_EVERY_WEEKS;
        for zone in 0..n_zones {
            let replenished = step_ups as f32 * rng.gen_range(12.0..24.0);
            let drift = WEEKLY_DRIFT * week as f32;
            let wobble = noise.get(week, zone);
            nitrogen.set(
                week,
                zone,
                (base_n[zone] - drift + replenished + 2.0 * wobble).clamp(5.0, 150.0),
            );
            phosphorus.set(
                week,
                zone,
                (base_p[zone] - 0.6 * drift + 0.5 * replenished + 1.5 * wobble)
                    .clamp(3.0, 100.0),
            );
            potassium.set(
                week,
                zone,
                (base_k[zone] - 0.8 * drift + 0.7 * replenished + 1.5 * wobble)
                    .clamp(5.0, 120.0),
            );
            organic_matter.set(
                week,
                zone,
                (3.2 + 0.5 * (TAU * week as f32 / 52.0).sin() + 0.05 * wobble).clamp(0.5, 8.0),
            );
        }
    }

    let missing_mask = draw_mask(&mut rng, n_weeks, n_zones, dropout);
    apply_mask(
        &missing_mask,
        &mut [
            &mut nitrogen,
            &mut phosphorus,
            &mut potassium,
            &mut organic_matter,
        ],
    );

    NpkSeries {
        zone_ids: (0..n_zones).map(|z| format!("zone-{}", z + 1)).collect(),
        sample_hours: (0..n_weeks).map(|week| week as f32 * 24.0 * 7.0).collect(),
        nitrogen: nitrogen.to_rows(),
        phosphorus: phosphorus.to_rows(),
        potassium: potassium.to_rows(),
        organic_matter: organic_matter.to_rows(),
        missing_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_cadence_follows_the_day_count() {
        let series = generate(300, 28, 3, 0.0);
        assert_eq!(series.sample_hours.len(), 4);
        assert_eq!(series.nitrogen.len(), 4);
        assert_eq!(series.sample_hours[1], 168.0);
    }

    #[test]
    fn short_runs_still_produce_one_sample() {
        let series = generate(301, 2, 3, 0.0);
        assert_eq!(series.nitrogen.len(), 1);
    }

    #[test]
    fn values_stay_in_agronomic_ranges() {
        let series = generate(302, 84, 6, 0.0);
        for (n_row, (p_row, k_row)) in series
            .nitrogen
            .iter()
            .zip(series.phosphorus.iter().zip(&series.potassium))
        {
            for &n in n_row {
                assert!((5.0..=150.0).contains(&n));
            }
            for &p in p_row {
                assert!((3.0..=100.0).contains(&p));
            }
            for &k in k_row {
                assert!((5.0..=120.0).contains(&k));
            }
        }
    }

    #[test]
    fn fertilisation_steps_lift_depleted_zones() {
        let series = generate(303, 84, 2, 0.0);
        // Week 3 is fully depleted; week 4 has had one fertilisation event.
        let depleted = series.nitrogen[3][0];
        let fed = series.nitrogen[4][0];
        assert!(fed > depleted - WEEKLY_DRIFT, "step-up must offset drift");
    }
}
