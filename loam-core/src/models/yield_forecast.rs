//! Yield forecasting: an FAO-style stress-multiplier base with an
//! optional trained ridge residual on top.
//!
//! The base estimate multiplies the potential yield by four stress
//! coefficients, each clipped to `[0, 1]`. When a residual coefficient
//! vector has been trained and its length matches the assembled feature
//! width, the final estimate adds `X · β` and the confidence interval
//! tightens from ±20 % to ±10 %.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    dense::DenseMatrix,
    error::{CoreError, Result},
    graph::{LayerTag, LayeredHypergraph},
};

use super::{clamp01, edge_mean};

/// Ridge regularisation strength.
const RIDGE_LAMBDA: f32 = 1.0;
/// Confidence-interval half width without a residual model.
const FAO_CI: f32 = 0.20;
/// Confidence-interval half width with a residual model.
const RESIDUAL_CI: f32 = 0.10;
/// DLI (mol/m²/day) treated as fully light-saturated.
const DLI_SATURATION: f32 = 20.0;

/// Layers whose feature rows feed the residual design matrix, in order.
const RESIDUAL_LAYERS: [LayerTag; 4] = [
    LayerTag::Soil,
    LayerTag::Lighting,
    LayerTag::CropRequirements,
    LayerTag::Vision,
];

/// The four stress multipliers, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct StressFactors {
    /// Water stress from soil moisture.
    pub ks: f32,
    /// Nutrient stress from N/P/K shortfalls.
    pub kn: f32,
    /// Light stress from daily light integral.
    pub kl: f32,
    /// Weather stress from temperature.
    pub kw: f32,
}

/// One crop bed's forecast.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct YieldRecord {
    /// Crop bed (crop_requirements hyperedge id).
    pub crop_bed_id: String,
    /// Point estimate, kilograms per square metre.
    pub yield_estimate_kg_m2: f32,
    /// Lower confidence bound.
    pub yield_lower: f32,
    /// Upper confidence bound.
    pub yield_upper: f32,
    /// Confidence level reported alongside the interval.
    pub confidence: f32,
    /// Mean stress multipliers over the bed's members.
    pub stress_factors: StressFactors,
    /// Which model produced the estimate: `fao_only` or
    /// `fao_plus_residual`.
    pub model_layer: String,
}

/// Training status record for the residual fit.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TrainReport {
    /// `trained` or `insufficient_data`.
    pub status: String,
    /// Observations used (or available) for the fit.
    pub n_observations: usize,
    /// Coefficient count of the assembled design matrix.
    pub n_coefficients: usize,
}

/// A completed training attempt: the status record plus the fitted
/// coefficients when the fit succeeded.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainOutcome {
    /// The plain-data status record.
    pub report: TrainReport,
    /// Fitted ridge coefficients, present only on success.
    pub coefficients: Option<Vec<f32>>,
}

/// Forecasts yield per crop bed.
///
/// Requires the `crop_requirements` layer; returns an empty vector when
/// it is absent. Soil, npk, lighting, weather, and vision refine the
/// estimate when materialised; a missing optional layer contributes no
/// stress (its coefficient reads 1).
#[instrument(
    name = "core.yield_forecast",
    skip(graph, residual),
    fields(farm_id = %graph.farm_id(), residual = residual.is_some())
)]
#[must_use]
pub fn forecast_yield(
    graph: &LayeredHypergraph,
    residual: Option<&[f32]>,
) -> Vec<YieldRecord> {
    let Some(crops) = graph.layer(LayerTag::CropRequirements) else {
        debug!("crop_requirements layer missing, nothing to forecast");
        return Vec::new();
    };
    let vertices = graph.vertex_count();
    let stresses: Vec<StressFactors> = (0..vertices).map(|row| stress_at(graph, row)).collect();
    let fao: Vec<f32> = (0..vertices)
        .map(|row| {
            let potential = crops.features().get(row, 0);
            let s = stresses[row];
            potential * s.ks * s.kn * s.kl * s.kw
        })
        .collect();

    let design = assemble_design(graph);
    let corrected: Option<Vec<f32>> = residual.and_then(|beta| {
        if beta.len() != design.cols() {
            warn!(
                beta = beta.len(),
                features = design.cols(),
                "residual coefficient width mismatch, falling back to FAO base"
            );
            return None;
        }
        Some(
            (0..vertices)
                .map(|row| {
                    let adjustment: f32 = design
                        .row(row)
                        .iter()
                        .zip(beta)
                        .map(|(&x, &b)| x * b)
                        .sum();
                    fao[row] + adjustment
                })
                .collect(),
        )
    });

    let (estimates, half_width, model_layer, confidence) = match &corrected {
        Some(values) => (values.as_slice(), RESIDUAL_CI, "fao_plus_residual", 0.90),
        None => (fao.as_slice(), FAO_CI, "fao_only", 0.80),
    };

    let (ks, kn, kl, kw): (Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>) = (
        stresses.iter().map(|s| s.ks).collect(),
        stresses.iter().map(|s| s.kn).collect(),
        stresses.iter().map(|s| s.kl).collect(),
        stresses.iter().map(|s| s.kw).collect(),
    );

    (0..crops.incidence().cols())
        .map(|edge| {
            let estimate = edge_mean(crops, edge, estimates).max(0.0);
            YieldRecord {
                crop_bed_id: crops.edge_ids()[edge].clone(),
                yield_estimate_kg_m2: estimate,
                yield_lower: estimate * (1.0 - half_width),
                yield_upper: estimate * (1.0 + half_width),
                confidence,
                stress_factors: StressFactors {
                    ks: edge_mean(crops, edge, &ks),
                    kn: edge_mean(crops, edge, &kn),
                    kl: edge_mean(crops, edge, &kl),
                    kw: edge_mean(crops, edge, &kw),
                },
                model_layer: model_layer.to_owned(),
            }
        })
        .collect()
}

/// Fits the ridge residual against observed yields.
///
/// Assembles the design matrix on host, builds residual targets
/// `r = y − ŷ_fao` for every observed-and-indexed vertex, and solves
/// `(XᵀX + λI) β = Xᵀr` in `f32`. Needs at least `p + 1` observations
/// for `p` coefficients; fewer produce an `insufficient_data` status and
/// leave the trained state untouched.
///
/// # Errors
/// Fails with a numeric error when the regularised normal equations
/// cannot be factorised.
#[instrument(
    name = "core.train_yield_residual",
    err,
    skip(graph, outcomes),
    fields(farm_id = %graph.farm_id(), outcomes = outcomes.len())
)]
pub fn train_yield_residual(
    graph: &LayeredHypergraph,
    outcomes: &BTreeMap<String, f32>,
) -> Result<TrainOutcome> {
    let design = assemble_design(graph);
    let coefficients = design.cols();

    let mut rows: Vec<usize> = Vec::new();
    let mut targets: Vec<f32> = Vec::new();
    if graph.layer(LayerTag::CropRequirements).is_some() {
        for (vertex_id, &observed) in outcomes {
            let Some(row) = graph.vertex_row(vertex_id) else {
                warn!(vertex = %vertex_id, "skipping outcome for unindexed vertex");
                continue;
            };
            rows.push(row);
            targets.push(observed - fao_at(graph, row));
        }
    }

    if rows.len() < coefficients + 1 {
        warn!(
            observations = rows.len(),
            coefficients,
            "not enough observations for a residual fit"
        );
        return Ok(TrainOutcome {
            report: TrainReport {
                status: "insufficient_data".to_owned(),
                n_observations: rows.len(),
                n_coefficients: coefficients,
            },
            coefficients: None,
        });
    }

    let x = DMatrix::<f32>::from_fn(rows.len(), coefficients, |i, j| design.get(rows[i], j));
    let r = DMatrix::<f32>::from_fn(rows.len(), 1, |i, _| targets[i]);
    let normal = x.transpose() * &x + DMatrix::<f32>::identity(coefficients, coefficients) * RIDGE_LAMBDA;
    let rhs = x.transpose() * r;
    let beta = normal
        .cholesky()
        .ok_or(CoreError::Numeric {
            context: "factorising the ridge normal equations",
        })?
        .solve(&rhs);

    Ok(TrainOutcome {
        report: TrainReport {
            status: "trained".to_owned(),
            n_observations: rows.len(),
            n_coefficients: coefficients,
        },
        coefficients: Some(beta.column(0).iter().copied().collect()),
    })
}

/// Per-vertex stress multipliers; missing optional layers read as
/// unstressed.
fn stress_at(graph: &LayeredHypergraph, row: usize) -> StressFactors {
    let ks = graph.layer(LayerTag::Soil).map_or(1.0, |soil| {
        clamp01((soil.features().get(row, 0) - 0.15) / (0.35 - 0.15))
    });
    let kn = nutrient_stress(graph, row);
    let kl = graph.layer(LayerTag::Lighting).map_or(1.0, |lighting| {
        clamp01(lighting.features().get(row, 1) / DLI_SATURATION)
    });
    let kw = graph.layer(LayerTag::Weather).map_or(1.0, |weather| {
        temperature_stress(weather.features().get(row, 0))
    });
    StressFactors { ks, kn, kl, kw }
}

fn nutrient_stress(graph: &LayeredHypergraph, row: usize) -> f32 {
    let (Some(npk), Some(crops)) = (
        graph.layer(LayerTag::Npk),
        graph.layer(LayerTag::CropRequirements),
    ) else {
        return 1.0;
    };
    let mut ratio_sum = 0.0;
    let mut counted = 0;
    for nutrient in 0..3 {
        let required = crops.features().get(row, nutrient + 2);
        if required > 0.0 {
            let deficit = (required - npk.features().get(row, nutrient)).max(0.0);
            ratio_sum += deficit / required;
            counted += 1;
        }
    }
    if counted == 0 {
        1.0
    } else {
        clamp01(1.0 - ratio_sum / counted as f32)
    }
}

/// Piecewise-linear temperature response: dead below 5 °C and above
/// 40 °C, optimal between 15 °C and 30 °C.
fn temperature_stress(temp: f32) -> f32 {
    if temp < 5.0 {
        0.0
    } else if temp < 15.0 {
        (temp - 5.0) / 10.0
    } else if temp <= 30.0 {
        1.0
    } else if temp < 40.0 {
        (40.0 - temp) / 10.0
    } else {
        0.0
    }
}

fn fao_at(graph: &LayeredHypergraph, row: usize) -> f32 {
    let potential = graph
        .layer(LayerTag::CropRequirements)
        .map_or(0.0, |crops| crops.features().get(row, 0));
    let s = stress_at(graph, row);
    potential * s.ks * s.kn * s.kl * s.kw
}

/// Assembles the residual design matrix: feature rows of the available
/// residual layers plus two derived columns (cumulative DLI over the
/// lighting ring, and the composite soil health score).
fn assemble_design(graph: &LayeredHypergraph) -> DenseMatrix {
    let vertices = graph.vertex_count();
    let mut parts: Vec<DenseMatrix> = Vec::new();
    for tag in RESIDUAL_LAYERS {
        if let Some(layer) = graph.layer(tag) {
            parts.push(layer.features().clone());
        }
    }
    let mut derived = DenseMatrix::zeros(vertices, 2);
    for row in 0..vertices {
        derived.set(row, 0, cumulative_dli(graph, row));
        derived.set(row, 1, soil_health(graph, row));
    }
    parts.push(derived);
    let borrowed: Vec<&DenseMatrix> = parts.iter().collect();
    DenseMatrix::hconcat(&borrowed).unwrap_or_else(|| DenseMatrix::zeros(vertices, 0))
}

/// Sums the DLI channel over every valid lighting ring slot.
fn cumulative_dli(graph: &LayeredHypergraph, row: usize) -> f32 {
    graph.layer(LayerTag::Lighting).map_or(0.0, |lighting| {
        let ring = lighting.history();
        (0..ring.len())
            .filter_map(|steps_back| ring.value_back(row, 1, steps_back))
            .sum()
    })
}

/// Composite soil health in `[0, 1]`: weighted trapezoid ramps around
/// agronomic optima for moisture, temperature, pH, and conductivity.
fn soil_health(graph: &LayeredHypergraph, row: usize) -> f32 {
    graph.layer(LayerTag::Soil).map_or(0.0, |soil| {
        let m = trapezoid(soil.features().get(row, 0), 0.15, 0.25, 0.35, 0.45);
        let t = trapezoid(soil.features().get(row, 1), 5.0, 15.0, 25.0, 35.0);
        let ph = trapezoid(soil.features().get(row, 3), 4.5, 6.0, 7.0, 8.5);
        let c = trapezoid(soil.features().get(row, 2), 0.2, 0.8, 1.6, 2.2);
        0.3 * m + 0.25 * t + 0.25 * ph + 0.2 * c
    })
}

/// Ramp up over `[lo, lo_ok]`, flat 1 over `[lo_ok, hi_ok]`, ramp down
/// over `[hi_ok, hi]`, zero outside.
fn trapezoid(value: f32, lo: f32, lo_ok: f32, hi_ok: f32, hi: f32) -> f32 {
    if value <= lo || value >= hi {
        0.0
    } else if value < lo_ok {
        (value - lo) / (lo_ok - lo)
    } else if value <= hi_ok {
        1.0
    } else {
        (hi - value) / (hi - hi_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_test_support::{assert_close, seeded_model_graph, two_layer_config};
    use proptest::prelude::*;
    use rstest::rstest;

    fn forecast_graph() -> LayeredHypergraph {
        seeded_model_graph(
            "farm-y",
            &[
                (LayerTag::Soil, &[0.30, 20.0, 1.2, 6.5]),
                (LayerTag::Weather, &[22.0, 0.6, 0.0, 2.0, 15.0]),
                (LayerTag::Npk, &[70.0, 55.0, 65.0]),
                (LayerTag::Lighting, &[450.0, 18.0, 0.7]),
                (LayerTag::CropRequirements, &[4.0, 0.6, 80.0, 60.0, 70.0]),
                (LayerTag::Vision, &[60.0, 0.6, 0.1, 0.7]),
            ],
        )
    }

    #[test]
    fn fao_only_without_trained_residual() {
        let records = forecast_yield(&forecast_graph(), None);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.model_layer, "fao_only");
            assert_close(record.yield_lower, record.yield_estimate_kg_m2 * 0.8, 1e-4);
            assert_close(record.yield_upper, record.yield_estimate_kg_m2 * 1.2, 1e-4);
            assert!(record.yield_estimate_kg_m2 > 0.0);
        }
    }

    #[test]
    fn stress_factors_stay_in_unit_interval() {
        for record in forecast_yield(&forecast_graph(), None) {
            let s = record.stress_factors;
            for factor in [s.ks, s.kn, s.kl, s.kw] {
                assert!((0.0..=1.0).contains(&factor), "factor {factor} escaped [0, 1]");
            }
        }
    }

    #[rstest]
    #[case::frozen(2.0, 0.0)]
    #[case::cool_ramp(10.0, 0.5)]
    #[case::optimal_low(15.0, 1.0)]
    #[case::optimal_high(30.0, 1.0)]
    #[case::hot_ramp(35.0, 0.5)]
    #[case::scorched(42.0, 0.0)]
    fn temperature_response_is_piecewise_linear(#[case] temp: f32, #[case] expected: f32) {
        assert_close(temperature_stress(temp), expected, 1e-6);
    }

    #[test]
    fn training_with_too_few_observations_reports_status() {
        let graph = forecast_graph();
        let outcomes: BTreeMap<String, f32> = [("v1".to_owned(), 4.1)].into();
        let outcome = train_yield_residual(&graph, &outcomes).expect("fit attempt runs");
        assert_eq!(outcome.report.status, "insufficient_data");
        assert_eq!(outcome.report.n_observations, 1);
        assert!(outcome.coefficients.is_none());
    }

    #[test]
    fn trained_residual_switches_the_model_layer() {
        let graph = forecast_graph();
        let width = assemble_design(&graph).cols();
        // Synthetic coefficients stand in for a trained fit so the switch
        // itself is observable.
        let beta = vec![0.0_f32; width];
        let records = forecast_yield(&graph, Some(&beta));
        for record in &records {
            assert_eq!(record.model_layer, "fao_plus_residual");
            assert_close(record.yield_lower, record.yield_estimate_kg_m2 * 0.9, 1e-4);
        }
    }

    #[test]
    fn mismatched_residual_width_falls_back() {
        let records = forecast_yield(&forecast_graph(), Some(&[1.0, 2.0]));
        assert!(records.iter().all(|r| r.model_layer == "fao_only"));
    }

    #[test]
    fn missing_crop_layer_yields_empty() {
        let graph = crate::graph::LayeredHypergraph::build(&two_layer_config("farm-y2"))
            .expect("fixture is valid");
        assert!(forecast_yield(&graph, None).is_empty());
    }

    proptest! {
        #[test]
        fn trapezoid_is_bounded(value in -100.0_f32..100.0) {
            let score = trapezoid(value, 0.15, 0.25, 0.35, 0.45);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn temperature_stress_is_bounded(temp in -50.0_f32..80.0) {
            let stress = temperature_stress(temp);
            prop_assert!((0.0..=1.0).contains(&stress));
        }
    }
}
