//! The external contract surface: callable entry points with plain-data
//! inputs and outputs.
//!
//! Every entry point is synchronous and runs to completion before it
//! returns; the caller serialises access per farm. Entry points that
//! take serialized state prefer the process cache (keyed by farm id)
//! and fall back to rehydration, so opaque-state callers and hot-cache
//! callers share one code path. Returned payloads never reference
//! device-resident storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    config::{ConfigError, FarmConfig, FarmType},
    error::{GraphError, Result},
    graph::{LayerTag, LayeredHypergraph, VertexQuery},
    models::{
        AnomalyRecord, IrrigationRecord, NutrientRecord, NutrientWeights, TrainReport,
        WeatherForecast, YieldRecord, detect_anomalies as run_anomalies, forecast_yield,
        irrigation_schedule as run_irrigation, nutrient_report as run_nutrients,
        train_yield_residual as fit_residual,
    },
    serialize::{SerializedGraph, deserialize_graph, serialize_graph},
    state::ProcessState,
    synth::{SyntheticDataset, generate_synthetic as run_generator},
};

/// Builds a graph from a farm configuration, caches it, and returns its
/// serialized state.
///
/// # Errors
/// Fails with a configuration error when the profile is malformed.
#[instrument(name = "api.build_graph", err, skip(state, config), fields(farm_id = %config.farm_id))]
pub fn build_graph(state: &ProcessState, config: &FarmConfig) -> Result<SerializedGraph> {
    let mut graph = LayeredHypergraph::build(config)?;
    graph.to_device();
    let serialized = serialize_graph(&graph);
    state.cache_graph(graph);
    Ok(serialized)
}

/// Looks the zone's vertex up in every materialised layer.
///
/// Misses come back as miss records per layer, never as failures.
///
/// # Errors
/// Fails only when the serialized state itself cannot be rehydrated.
#[instrument(name = "api.query_farm_status", err, skip(state, graph_state))]
pub fn query_farm_status(
    state: &ProcessState,
    graph_state: &SerializedGraph,
    zone_id: &str,
) -> Result<BTreeMap<String, VertexQuery>> {
    let graph = resolve_graph(state, graph_state)?;
    Ok(graph
        .layers()
        .map(|(tag, _)| (tag.as_str().to_owned(), graph.query_layer(tag, zone_id)))
        .collect())
}

/// Runs the irrigation scheduler over a horizon.
///
/// # Errors
/// Fails only when the serialized state itself cannot be rehydrated.
#[instrument(
    name = "api.irrigation_schedule",
    err,
    skip(state, graph_state, forecast),
    fields(horizon_days = horizon_days)
)]
pub fn irrigation_schedule(
    state: &ProcessState,
    graph_state: &SerializedGraph,
    horizon_days: u32,
    forecast: &WeatherForecast,
) -> Result<Vec<IrrigationRecord>> {
    let graph = resolve_graph(state, graph_state)?;
    Ok(run_irrigation(&graph, horizon_days.max(1), forecast))
}

/// Runs the nutrient deficit scorer with the default weights.
///
/// # Errors
/// Fails only when the serialized state itself cannot be rehydrated.
#[instrument(name = "api.nutrient_report", err, skip(state, graph_state))]
pub fn nutrient_report(
    state: &ProcessState,
    graph_state: &SerializedGraph,
) -> Result<Vec<NutrientRecord>> {
    let graph = resolve_graph(state, graph_state)?;
    Ok(run_nutrients(&graph, NutrientWeights::default()))
}

/// Runs the yield forecaster, applying the trained residual when one is
/// present in process state.
///
/// # Errors
/// Fails only when the serialized state itself cannot be rehydrated.
#[instrument(name = "api.yield_forecast", err, skip(state, graph_state))]
pub fn yield_forecast(
    state: &ProcessState,
    graph_state: &SerializedGraph,
) -> Result<Vec<YieldRecord>> {
    let graph = resolve_graph(state, graph_state)?;
    let residual = state.residual();
    Ok(forecast_yield(&graph, residual.as_deref()))
}

/// Runs the anomaly detector. `now` anchors the timestamp windows; the
/// external collaborator supplies the clock.
///
/// # Errors
/// Fails only when the serialized state itself cannot be rehydrated.
#[instrument(name = "api.detect_anomalies", err, skip(state, graph_state))]
pub fn detect_anomalies(
    state: &ProcessState,
    graph_state: &SerializedGraph,
    now: DateTime<Utc>,
) -> Result<Vec<AnomalyRecord>> {
    let graph = resolve_graph(state, graph_state)?;
    Ok(run_anomalies(&graph, now))
}

/// Pushes a feature reading and returns fresh serialized state with the
/// snapshot and history advanced. The cached graph, when present, is
/// mutated in place and re-cached so hot callers skip rehydration.
///
/// # Errors
/// Fails with `LayerNotFound` / `VertexNotFound` for unknown targets,
/// or a deserialisation error for corrupt state.
#[instrument(
    name = "api.update_features",
    err,
    skip(state, graph_state, features),
    fields(layer = layer, vertex_id = vertex_id)
)]
pub fn update_features(
    state: &ProcessState,
    graph_state: &SerializedGraph,
    layer: &str,
    vertex_id: &str,
    features: &[f32],
) -> Result<SerializedGraph> {
    let mut graph = resolve_graph(state, graph_state)?;
    let tag = LayerTag::parse(layer).ok_or_else(|| GraphError::LayerNotFound {
        layer: layer.to_owned(),
        available: graph.available_layers(),
    })?;
    graph.push_features(tag, vertex_id, features)?;
    let serialized = serialize_graph(&graph);
    state.cache_graph(graph);
    Ok(serialized)
}

/// Fits the yield residual against observed outcomes and stores the
/// coefficients in process state on success.
///
/// # Errors
/// Fails when the serialized state cannot be rehydrated or the ridge
/// system cannot be factorised; too few observations are a status, not
/// an error.
#[instrument(name = "api.train_yield_residual", err, skip(state, graph_state, outcomes))]
pub fn train_yield_residual(
    state: &ProcessState,
    graph_state: &SerializedGraph,
    outcomes: &BTreeMap<String, f32>,
) -> Result<TrainReport> {
    let graph = resolve_graph(state, graph_state)?;
    let outcome = fit_residual(&graph, outcomes)?;
    if let Some(coefficients) = outcome.coefficients {
        state.set_residual(Some(coefficients));
    }
    Ok(outcome.report)
}

/// Generates the synthetic demo dataset for a farm type tag.
///
/// # Errors
/// Fails with a configuration error for a tag outside the closed set.
#[instrument(
    name = "api.generate_synthetic",
    err,
    fields(farm_type = farm_type, days = days, seed = seed)
)]
pub fn generate_synthetic(farm_type: &str, days: u32, seed: u64) -> Result<SyntheticDataset> {
    let parsed = FarmType::parse(farm_type).ok_or_else(|| ConfigError::UnknownFarmType {
        farm_type: farm_type.to_owned(),
    })?;
    Ok(run_generator(parsed, days, seed))
}

/// Prefers the cached graph for the state's farm id; rehydrates (and
/// caches) on a miss.
fn resolve_graph(
    state: &ProcessState,
    graph_state: &SerializedGraph,
) -> Result<LayeredHypergraph> {
    if let Some(cached) = state.get_cached_graph(&graph_state.farm_id) {
        return Ok(cached);
    }
    let graph = deserialize_graph(graph_state)?;
    state.cache_graph(graph.clone());
    Ok(graph)
}
