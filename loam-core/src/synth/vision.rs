//! Synthetic vision analytics for covered zones.
//!
//! Pest and disease events spread along each zone's line of beds: the
//! per-step event probability is amplified by how many adjacent beds
//! were flagged on the previous step. The anomaly code is a signed byte
//! (`-1` missing, `0` none, `1` pest, `2` disease); confidence inflates
//! on positive events; canopy coverage follows a saturating growth curve
//! plus correlated noise.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::dense::DenseMatrix;

use super::{BitMatrix, TimeGrid, apply_mask, correlated_noise, draw_mask};

/// Baseline per-step event probability.
const EVENT_BASE_P: f64 = 0.004;
/// Probability amplification per neighbour flagged on the previous step.
const NEIGHBOUR_AMPLIFICATION: f64 = 0.12;

/// Anomaly code for a missing sample.
const CODE_MISSING: i8 = -1;
/// Anomaly code for a clean bed.
const CODE_NONE: i8 = 0;
/// Anomaly code for a pest event.
const CODE_PEST: i8 = 1;
/// Anomaly code for a disease event.
const CODE_DISEASE: i8 = 2;

/// Vision series block, one column per crop bed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VisionSeries {
    /// Bed identifiers, column-aligned with every matrix.
    pub bed_ids: Vec<String>,
    /// Owning zone per bed.
    pub zone_ids: Vec<String>,
    /// Event codes: `-1` missing, `0` none, `1` pest, `2` disease.
    pub anomaly_code: Vec<Vec<i8>>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: Vec<Vec<f32>>,
    /// Canopy coverage, percent.
    pub canopy_coverage: Vec<Vec<f32>>,
    /// Per-bed dropout mask.
    pub missing_mask: BitMatrix,
}

pub(crate) fn generate(
    seed: u64,
    grid: &TimeGrid,
    covered_zones: &[String],
    beds_per_zone: usize,
    dropout: f32,
) -> VisionSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_beds = covered_zones.len() * beds_per_zone;
    let mut bed_ids = Vec::with_capacity(n_beds);
    let mut zone_ids = Vec::with_capacity(n_beds);
    for zone in covered_zones {
        for bed in 0..beds_per_zone {
            bed_ids.push(format!("{zone}-bed-{}", bed + 1));
            zone_ids.push(zone.clone());
        }
    }

    let noise = correlated_noise(&mut rng, grid.n_steps, n_beds);
    let mut codes = vec![vec![CODE_NONE; n_beds]; grid.n_steps];
    let mut confidence = DenseMatrix::zeros(grid.n_steps, n_beds);
    let mut canopy = DenseMatrix::zeros(grid.n_steps, n_beds);

    let mut previous_flagged = vec![false; n_beds];
    for step in 0..grid.n_steps {
        let mut flagged = vec![false; n_beds];
        let progress = step as f32 / grid.n_steps.max(1) as f32;
        for bed in 0..n_beds {
            let neighbours = line_neighbours(bed, beds_per_zone)
                .into_iter()
                .filter(|&n| previous_flagged[n])
                .count();
            let probability = EVENT_BASE_P + NEIGHBOUR_AMPLIFICATION * neighbours as f64;
            let event = rng.gen_bool(probability.min(1.0));
            let code = if event {
                flagged[bed] = true;
                if rng.gen_bool(0.6) { CODE_PEST } else { CODE_DISEASE }
            } else {
                CODE_NONE
            };
            codes[step][bed] = code;
            confidence.set(
                step,
                bed,
                if event {
                    rng.gen_range(0.80..0.98)
                } else {
                    rng.gen_range(0.50..0.70)
                },
            );
            canopy.set(
                step,
                bed,
                (20.0 + 75.0 * (1.0 - (-3.0 * progress).exp()) + 1.5 * noise.get(step, bed))
                    .clamp(0.0, 100.0),
            );
        }
        previous_flagged = flagged;
    }

    let missing_mask = draw_mask(&mut rng, grid.n_steps, n_beds, dropout);
    apply_mask(&missing_mask, &mut [&mut confidence, &mut canopy]);
    for step in 0..grid.n_steps {
        for bed in 0..n_beds {
            if missing_mask.get(step, bed) {
                codes[step][bed] = CODE_MISSING;
            }
        }
    }

    VisionSeries {
        bed_ids,
        zone_ids,
        anomaly_code: codes,
        confidence: confidence.to_rows(),
        canopy_coverage: canopy.to_rows(),
        missing_mask,
    }
}

/// Beds adjacent on the same zone's line.
fn line_neighbours(bed: usize, beds_per_zone: usize) -> Vec<usize> {
    let zone_start = (bed / beds_per_zone) * beds_per_zone;
    let zone_end = zone_start + beds_per_zone;
    let mut neighbours = Vec::with_capacity(2);
    if bed > zone_start {
        neighbours.push(bed - 1);
    }
    if bed + 1 < zone_end {
        neighbours.push(bed + 1);
    }
    neighbours
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn series(dropout: f32) -> VisionSeries {
        let grid = TimeGrid {
            n_steps: 2 * 96,
            cadence_minutes: 15,
        };
        generate(500, &grid, &["zone-1".to_owned(), "zone-2".to_owned()], 4, dropout)
    }

    #[rstest]
    #[case::zone_interior(1, vec![0, 2])]
    #[case::zone_left_edge(0, vec![1])]
    #[case::zone_right_edge(3, vec![2])]
    #[case::second_zone_left_edge(4, vec![5])]
    fn neighbours_never_cross_zone_lines(#[case] bed: usize, #[case] expected: Vec<usize>) {
        assert_eq!(line_neighbours(bed, 4), expected);
    }

    #[test]
    fn codes_stay_in_the_alphabet() {
        let vision = series(0.05);
        for row in &vision.anomaly_code {
            for &code in row {
                assert!(
                    [CODE_MISSING, CODE_NONE, CODE_PEST, CODE_DISEASE].contains(&code)
                );
            }
        }
    }

    #[test]
    fn masked_positions_carry_the_missing_code() {
        let vision = series(0.10);
        for step in 0..vision.anomaly_code.len() {
            for bed in 0..vision.bed_ids.len() {
                let masked = vision.missing_mask.get(step, bed);
                assert_eq!(vision.anomaly_code[step][bed] == CODE_MISSING, masked);
                assert_eq!(vision.confidence[step][bed].is_nan(), masked);
            }
        }
    }

    #[test]
    fn canopy_grows_towards_saturation() {
        let vision = series(0.0);
        let early = vision.canopy_coverage[2][0];
        let late = vision.canopy_coverage[190][0];
        assert!(late > early, "canopy must grow: early {early}, late {late}");
    }
}
