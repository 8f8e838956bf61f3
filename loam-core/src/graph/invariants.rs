//! Structural invariant checks for the layered hypergraph.
//!
//! Every public operation must leave these invariants intact; the test
//! suites call [`invariant_violations`] after each mutation. The checker
//! reports every violation it finds rather than stopping at the first,
//! which keeps failure output useful when a mutation breaks several
//! aligned dimensions at once.

use super::LayeredHypergraph;

/// Returns a human-readable description of every violated invariant, or
/// an empty vector for a structurally sound graph.
#[must_use]
pub fn invariant_violations(graph: &LayeredHypergraph) -> Vec<String> {
    let mut violations = Vec::new();
    let vertices = graph.vertex_count();

    if graph.vertex_ids().len() != vertices {
        violations.push("vertex id list and vertex count disagree".to_owned());
    }
    for (row, id) in graph.vertex_ids().iter().enumerate() {
        if graph.vertex_row(id) != Some(row) {
            violations.push(format!("vertex `{id}` does not index back to row {row}"));
        }
    }

    for (tag, layer) in graph.layers() {
        let name = tag.as_str();
        if layer.incidence.rows() != vertices {
            violations.push(format!(
                "{name}: incidence has {} rows for {vertices} vertices",
                layer.incidence.rows()
            ));
        }
        let cols = layer.incidence.cols();
        if cols != layer.edge_ids.len() || cols != layer.edge_metadata.len() {
            violations.push(format!(
                "{name}: {cols} incidence columns, {} edge ids, {} metadata entries",
                layer.edge_ids.len(),
                layer.edge_metadata.len()
            ));
        }
        for col in 0..cols {
            if layer
                .incidence
                .column_rows(col)
                .iter()
                .any(|&row| row as usize >= vertices)
            {
                violations.push(format!(
                    "{name}: edge `{}` references a row outside the vertex index",
                    layer.edge_ids[col]
                ));
            }
        }
        if layer.features.rows() != vertices {
            violations.push(format!(
                "{name}: features have {} rows for {vertices} vertices",
                layer.features.rows()
            ));
        }
        if layer.history.vertices() != vertices {
            violations.push(format!(
                "{name}: history tracks {} vertices of {vertices}",
                layer.history.vertices()
            ));
        }
        if layer.history.width() != layer.features.cols() {
            violations.push(format!(
                "{name}: history width {} disagrees with feature width {}",
                layer.history.width(),
                layer.features.cols()
            ));
        }
        if layer.history.len() > layer.history.depth() {
            violations.push(format!(
                "{name}: history length {} exceeds depth {}",
                layer.history.len(),
                layer.history.depth()
            ));
        }
        if layer.history.depth() > 0 && layer.history.head() >= layer.history.depth() {
            violations.push(format!(
                "{name}: history head {} outside ring of depth {}",
                layer.history.head(),
                layer.history.depth()
            ));
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_test_support::two_layer_config;

    #[test]
    fn freshly_built_graph_is_sound() {
        let graph = LayeredHypergraph::build(&two_layer_config("farm-i"))
            .expect("fixture is valid");
        assert_eq!(invariant_violations(&graph), Vec::<String>::new());
    }

    #[test]
    fn soundness_survives_a_mutation_storm() {
        let mut graph = LayeredHypergraph::build(&two_layer_config("farm-i2"))
            .expect("fixture is valid");
        graph.add_vertex("v4").expect("v4 is new");
        graph.add_hyperedge(
            crate::graph::LayerTag::Npk,
            "npk-1",
            &["v1".to_owned(), "v4".to_owned()],
            serde_json::Map::new(),
        );
        graph
            .push_features(crate::graph::LayerTag::Npk, "v4", &[60.0, 30.0, 45.0])
            .expect("npk was just materialised");
        assert!(graph.remove_hyperedge(crate::graph::LayerTag::Soil, "e1"));
        assert_eq!(invariant_violations(&graph), Vec::<String>::new());
    }
}
