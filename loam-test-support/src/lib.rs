//! Shared fixtures for the loam test suites.
//!
//! Provides canonical farm configurations (the two-layer micro farm used
//! by engine tests and the fully instrumented model farm used by the
//! analytics tests), feature seeding helpers, and float assertions with
//! useful failure output.

use loam_core::config::{EdgeDef, FarmConfig, FarmType, ModelToggles, VertexDef, ZoneConfig};
use loam_core::graph::{LayerTag, LayeredHypergraph};

/// Installs a compact `tracing` subscriber for a test run. Safe to call
/// from every test; only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .compact()
        .try_init();
}

fn vertex(id: &str, kind: &str) -> VertexDef {
    VertexDef {
        id: id.to_owned(),
        kind: kind.to_owned(),
    }
}

fn edge(id: &str, layer: &str, members: &[&str]) -> EdgeDef {
    EdgeDef {
        id: id.to_owned(),
        layer: layer.to_owned(),
        vertex_ids: members.iter().map(|&m| m.to_owned()).collect(),
        metadata: serde_json::Map::new(),
    }
}

/// The micro farm: three vertices, one soil edge `e1 = {v1, v2}` and one
/// irrigation edge `e2 = {v2, v3}`. The cross-layer product of this
/// fixture is the literal `[[1]]`.
#[must_use]
pub fn two_layer_config(farm_id: &str) -> FarmConfig {
    FarmConfig {
        farm_id: farm_id.to_owned(),
        farm_type: FarmType::OpenField,
        active_layers: vec!["soil".to_owned(), "irrigation".to_owned()],
        zones: vec![ZoneConfig {
            id: "zone-a".to_owned(),
            name: "Zone A".to_owned(),
            zone_type: "open_field".to_owned(),
            area_m2: 120.0,
            soil_type: Some("loam".to_owned()),
        }],
        models: ModelToggles::default(),
        vertices: vec![
            vertex("v1", "sensor"),
            vertex("v2", "sensor"),
            vertex("v3", "valve"),
        ],
        edges: vec![
            edge("e1", "soil", &["v1", "v2"]),
            edge("e2", "irrigation", &["v2", "v3"]),
        ],
    }
}

/// The model farm: four crop beds instrumented on every layer, split
/// into two irrigation/npk/crop zones (`zone-a = {v1, v2}`,
/// `zone-b = {v3, v4}`) with farm-wide soil, weather, lighting, and
/// vision coverage.
#[must_use]
pub fn model_farm_config(farm_id: &str) -> FarmConfig {
    let all = ["v1", "v2", "v3", "v4"];
    FarmConfig {
        farm_id: farm_id.to_owned(),
        farm_type: FarmType::Greenhouse,
        active_layers: LayerTag::ALL.iter().map(|tag| tag.as_str().to_owned()).collect(),
        zones: vec![
            ZoneConfig {
                id: "zone-a".to_owned(),
                name: "Zone A".to_owned(),
                zone_type: "greenhouse".to_owned(),
                area_m2: 240.0,
                soil_type: Some("loam".to_owned()),
            },
            ZoneConfig {
                id: "zone-b".to_owned(),
                name: "Zone B".to_owned(),
                zone_type: "greenhouse".to_owned(),
                area_m2: 260.0,
                soil_type: Some("clay".to_owned()),
            },
        ],
        models: ModelToggles::default(),
        vertices: all.iter().map(|&id| vertex(id, "crop_bed")).collect(),
        edges: vec![
            edge("soil-all", "soil", &all),
            edge("weather-all", "weather", &all),
            edge("light-all", "lighting", &all),
            edge("vision-all", "vision", &all),
            edge("irr-a", "irrigation", &["v1", "v2"]),
            edge("irr-b", "irrigation", &["v3", "v4"]),
            edge("npk-a", "npk", &["v1", "v2"]),
            edge("npk-b", "npk", &["v3", "v4"]),
            edge("crop-a", "crop_requirements", &["v1", "v2"]),
            edge("crop-b", "crop_requirements", &["v3", "v4"]),
        ],
    }
}

/// Builds the model farm and pushes one identical reading to every
/// vertex of the given layers.
#[must_use]
pub fn seeded_model_graph(
    farm_id: &str,
    readings: &[(LayerTag, &[f32])],
) -> LayeredHypergraph {
    let mut graph =
        LayeredHypergraph::build(&model_farm_config(farm_id)).expect("model farm config is valid");
    for &(layer, values) in readings {
        push_uniform(&mut graph, layer, values);
    }
    graph
}

/// Pushes the same reading to every vertex of a layer.
pub fn push_uniform(graph: &mut LayeredHypergraph, layer: LayerTag, values: &[f32]) {
    for vertex_id in graph.vertex_ids().to_vec() {
        graph
            .push_features(layer, &vertex_id, values)
            .expect("fixture vertices are indexed");
    }
}

/// Asserts two floats agree within `tol`, printing both on failure.
#[track_caller]
pub fn assert_close(left: f32, right: f32, tol: f32) {
    assert!(
        (left - right).abs() <= tol,
        "expected {left} ≈ {right} (tolerance {tol})"
    );
}

/// Asserts two slices agree element-wise within `tol`.
#[track_caller]
pub fn assert_all_close(left: &[f32], right: &[f32], tol: f32) {
    assert_eq!(left.len(), right.len(), "length mismatch");
    for (index, (&l, &r)) in left.iter().zip(right).enumerate() {
        assert!(
            (l - r).abs() <= tol,
            "index {index}: expected {l} ≈ {r} (tolerance {tol})"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_validate_and_build() {
        two_layer_config("t").validate().expect("micro farm is valid");
        model_farm_config("m").validate().expect("model farm is valid");
        let graph = seeded_model_graph("m", &[(LayerTag::Soil, &[0.3, 18.0, 1.1, 6.5])]);
        assert_eq!(graph.vertex_count(), 4);
        assert_eq!(
            graph
                .layer(LayerTag::Soil)
                .expect("soil is materialised")
                .history()
                .len(),
            4
        );
    }
}
