//! Statistical-process-control anomaly detection over the history rings.
//!
//! Each layer with at least [`MIN_HISTORY`] snapshots is screened channel
//! by channel against four Western Electric rules relative to the rolling
//! mean and standard deviation of the valid ring window. Rule three
//! (four of five beyond 1σ) is recorded in the fired-rule list when some
//! other rule raises, but never raises on its own; changing that needs a
//! product decision, not a code one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::graph::{LayerTag, LayeredHypergraph};

/// Minimum valid ring length before a layer is screened.
const MIN_HISTORY: usize = 8;
/// Variance floor below which no alert is raised.
const SIGMA_FLOOR: f32 = 1e-8;
/// Sampling cadence backing the timestamp window, minutes.
const CADENCE_MINUTES: i64 = 15;
/// Raw vision anomaly score that flags a vertex for cross-layer
/// correlation without emitting a record.
const VISION_RAW_THRESHOLD: f32 = 0.7;

/// One channel alert.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AnomalyRecord {
    /// The vertex the alert fired on.
    pub vertex_id: String,
    /// Layer tag.
    pub layer: String,
    /// Channel name within the layer.
    pub feature: String,
    /// Layer-level anomaly classification.
    pub anomaly_type: String,
    /// `alarm` or `warning`.
    pub severity: String,
    /// The current snapshot value.
    pub current_value: f32,
    /// Rolling mean over the valid ring window.
    pub rolling_mean: f32,
    /// Rolling standard deviation over the valid ring window.
    pub rolling_std: f32,
    /// `|current − mean| / std`.
    pub sigma_deviation: f32,
    /// Names of every rule that fired, including the non-alerting one.
    pub anomaly_rules: Vec<String>,
    /// Whether soil and vision agreed on this vertex.
    pub cross_layer_confirmed: bool,
    /// Start of the observation window.
    pub timestamp_start: DateTime<Utc>,
    /// End of the observation window.
    pub timestamp_end: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default)]
struct RuleHits {
    three_sigma: bool,
    two_of_three: bool,
    four_of_five: bool,
    same_side: bool,
}

impl RuleHits {
    fn names(self) -> Vec<String> {
        let mut names = Vec::new();
        if self.three_sigma {
            names.push("3sigma".to_owned());
        }
        if self.two_of_three {
            names.push("2of3_beyond_2sigma".to_owned());
        }
        if self.four_of_five {
            names.push("4of5_beyond_1sigma".to_owned());
        }
        if self.same_side {
            names.push("8_same_side".to_owned());
        }
        names
    }

    /// Rule three alone never raises.
    const fn raises(self) -> bool {
        self.three_sigma || self.two_of_three || self.same_side
    }

    const fn severity(self) -> &'static str {
        if self.three_sigma { "alarm" } else { "warning" }
    }
}

/// Screens every layer with enough history and returns the alert records,
/// cross-layer escalation applied. `now` anchors the timestamp windows;
/// the caller supplies the clock.
#[instrument(name = "core.detect_anomalies", skip(graph), fields(farm_id = %graph.farm_id()))]
#[must_use]
pub fn detect_anomalies(graph: &LayeredHypergraph, now: DateTime<Utc>) -> Vec<AnomalyRecord> {
    let mut records = Vec::new();
    let mut soil_flagged = vec![false; graph.vertex_count()];
    let mut vision_flagged = vec![false; graph.vertex_count()];

    // The raw vision score flags vertices for correlation regardless of
    // how much vision history has accumulated.
    if let Some(vision) = graph.layer(LayerTag::Vision) {
        for (row, flag) in vision_flagged.iter_mut().enumerate() {
            if vision.features().get(row, 2) > VISION_RAW_THRESHOLD {
                *flag = true;
            }
        }
    }

    for (tag, layer) in graph.layers() {
        let ring = layer.history();
        if ring.len() < MIN_HISTORY {
            debug!(layer = tag.as_str(), len = ring.len(), "not enough history, skipping");
            continue;
        }
        let window_start = now - Duration::minutes(CADENCE_MINUTES * ring.len() as i64);
        for row in 0..graph.vertex_count() {
            for feature in 0..layer.features().cols() {
                let current = layer.features().get(row, feature);
                let Some((mean, std)) = rolling_stats(ring, row, feature) else {
                    continue;
                };
                if std < SIGMA_FLOOR {
                    continue;
                }
                let hits = evaluate_rules(ring, row, feature, current, mean, std);
                if !hits.raises() {
                    continue;
                }
                match tag {
                    LayerTag::Soil => soil_flagged[row] = true,
                    LayerTag::Vision => vision_flagged[row] = true,
                    _ => {}
                }
                records.push(AnomalyRecord {
                    vertex_id: graph.vertex_ids()[row].clone(),
                    layer: tag.as_str().to_owned(),
                    feature: feature_name(tag, feature),
                    anomaly_type: tag.anomaly_type().to_owned(),
                    severity: hits.severity().to_owned(),
                    current_value: current,
                    rolling_mean: mean,
                    rolling_std: std,
                    sigma_deviation: (current - mean).abs() / std,
                    anomaly_rules: hits.names(),
                    cross_layer_confirmed: false,
                    timestamp_start: window_start,
                    timestamp_end: now,
                });
            }
        }
    }

    escalate_cross_layer(graph, &mut records, &soil_flagged, &vision_flagged);
    records
}

/// Promotes every record of vertices that look anomalous in both soil
/// and vision: warnings become alarms and the confirmation flag is set.
fn escalate_cross_layer(
    graph: &LayeredHypergraph,
    records: &mut [AnomalyRecord],
    soil_flagged: &[bool],
    vision_flagged: &[bool],
) {
    for record in records.iter_mut() {
        let Some(row) = graph.vertex_row(&record.vertex_id) else {
            continue;
        };
        if soil_flagged[row] && vision_flagged[row] {
            record.cross_layer_confirmed = true;
            if record.severity == "warning" {
                record.severity = "alarm".to_owned();
            }
        }
    }
}

/// Rolling mean and population standard deviation over the valid ring
/// window of one channel. `None` for an empty window.
fn rolling_stats(
    ring: &crate::dense::HistoryRing,
    vertex: usize,
    feature: usize,
) -> Option<(f32, f32)> {
    let len = ring.len();
    if len == 0 {
        return None;
    }
    let values = (0..len).filter_map(|back| ring.value_back(vertex, feature, back));
    let (mut sum, mut count) = (0.0_f32, 0usize);
    let mut collected = Vec::with_capacity(len);
    for value in values {
        sum += value;
        count += 1;
        collected.push(value);
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f32;
    let variance =
        collected.iter().map(|value| (value - mean).powi(2)).sum::<f32>() / count as f32;
    Some((mean, variance.sqrt()))
}

/// Evaluates the four rules against the current value and the most
/// recent ring entries preceding the write head.
fn evaluate_rules(
    ring: &crate::dense::HistoryRing,
    vertex: usize,
    feature: usize,
    current: f32,
    mean: f32,
    std: f32,
) -> RuleHits {
    let window = |preceding: usize| -> Vec<f32> {
        std::iter::once(current)
            .chain((0..preceding).filter_map(|back| ring.value_back(vertex, feature, back)))
            .collect()
    };
    let beyond = |values: &[f32], sigmas: f32| {
        values
            .iter()
            .filter(|&&value| (value - mean).abs() > sigmas * std)
            .count()
    };

    let two_of_three_window = window(2);
    let four_of_five_window = window(4);
    let same_side_window = window(7);

    RuleHits {
        three_sigma: (current - mean).abs() > 3.0 * std,
        two_of_three: beyond(&two_of_three_window, 2.0) >= 2,
        four_of_five: beyond(&four_of_five_window, 1.0) >= 4,
        same_side: same_side_window.len() == 8
            && (same_side_window.iter().all(|&value| value > mean)
                || same_side_window.iter().all(|&value| value < mean)),
    }
}

fn feature_name(tag: LayerTag, feature: usize) -> String {
    tag.feature_names()
        .get(feature)
        .map_or_else(|| format!("f{feature}"), |&name| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_test_support::seeded_model_graph;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z")
            .expect("literal timestamp parses")
            .with_timezone(&Utc)
    }

    /// Thirty stable moisture readings with a tiny deterministic wobble.
    fn stable_then(spike: f32) -> LayeredHypergraph {
        let mut graph = seeded_model_graph("farm-a", &[]);
        for step in 0..30 {
            let wobble = if step % 2 == 0 { 0.005 } else { -0.005 };
            graph
                .push_features(LayerTag::Soil, "v1", &[0.30 + wobble, 18.0, 1.1, 6.5])
                .expect("v1 is indexed");
        }
        graph
            .push_features(LayerTag::Soil, "v1", &[spike, 18.0, 1.1, 6.5])
            .expect("v1 is indexed");
        graph
    }

    #[test]
    fn three_sigma_spike_raises_an_alarm() {
        let records = detect_anomalies(&stable_then(0.35), now());
        let moisture = records
            .iter()
            .find(|r| r.layer == "soil" && r.feature == "moisture" && r.vertex_id == "v1")
            .expect("the moisture spike must alert");
        assert_eq!(moisture.severity, "alarm");
        assert_eq!(moisture.anomaly_type, "environmental");
        assert!(moisture.anomaly_rules.contains(&"3sigma".to_owned()));
        assert!(moisture.sigma_deviation > 3.0);
        assert_eq!(moisture.timestamp_end, now());
        assert_eq!(
            moisture.timestamp_end - moisture.timestamp_start,
            Duration::minutes(15 * 31)
        );
    }

    #[test]
    fn short_history_is_skipped_entirely() {
        let mut graph = seeded_model_graph("farm-a2", &[]);
        for _ in 0..MIN_HISTORY - 1 {
            graph
                .push_features(LayerTag::Soil, "v1", &[0.30, 18.0, 1.1, 6.5])
                .expect("v1 is indexed");
        }
        assert!(detect_anomalies(&graph, now()).is_empty());
    }

    #[test]
    fn constant_series_never_alerts() {
        let mut graph = seeded_model_graph("farm-a3", &[]);
        for _ in 0..20 {
            graph
                .push_features(LayerTag::Soil, "v1", &[0.30, 18.0, 1.1, 6.5])
                .expect("v1 is indexed");
        }
        // Sigma collapses to zero; the guard must hold even for a jump.
        graph
            .push_features(LayerTag::Soil, "v1", &[0.30, 18.0, 1.1, 6.5])
            .expect("v1 is indexed");
        assert!(detect_anomalies(&graph, now()).is_empty());
    }

    #[test]
    fn cross_layer_agreement_escalates_warnings() {
        let mut graph = stable_then(0.35);
        // Park the raw vision score above the correlation threshold.
        graph
            .push_features(LayerTag::Vision, "v1", &[60.0, 0.5, 0.9, 0.6])
            .expect("v1 is indexed");
        let records = detect_anomalies(&graph, now());
        let soil_records: Vec<_> = records
            .iter()
            .filter(|r| r.vertex_id == "v1" && r.layer == "soil")
            .collect();
        assert!(!soil_records.is_empty());
        assert!(soil_records.iter().all(|r| r.cross_layer_confirmed));
        assert!(soil_records.iter().all(|r| r.severity == "alarm"));
    }

    #[test]
    fn vision_raw_score_alone_emits_no_record() {
        let mut graph = seeded_model_graph("farm-a4", &[]);
        for _ in 0..12 {
            graph
                .push_features(LayerTag::Vision, "v2", &[60.0, 0.5, 0.95, 0.6])
                .expect("v2 is indexed");
        }
        let records = detect_anomalies(&graph, now());
        assert!(records.iter().all(|r| r.layer != "vision" || r.vertex_id != "v2"));
    }
}
