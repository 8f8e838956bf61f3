//! Loam core library: the layered hypergraph computation core for farm
//! analytics.
//!
//! A farm is one layered hypergraph: up to seven instrumentation layers
//! sharing a global vertex index, each materialising a sparse incidence
//! matrix, a dense feature snapshot, and a fixed-capacity history ring.
//! On top of the engine sit four predictive models (irrigation
//! scheduling, nutrient deficit scoring, yield forecasting with a
//! trainable ridge residual, and Western Electric anomaly detection), a
//! correlated multi-layer synthetic data generator, and a plain-data
//! contract surface that serialises graph state across the process
//! boundary without leaking device storage.
//!
//! # Determinism
//!
//! The host backend is bitwise-reproducible per seed; the parallel lane
//! guarantees statistical reproducibility only. Every public call is
//! synchronous and drains its kernel queue before returning.

pub mod api;
pub mod backend;
pub mod config;
pub mod dense;
pub mod error;
pub mod graph;
pub mod models;
pub mod serialize;
pub mod sparse;
pub mod state;
pub mod synth;

pub use crate::{
    backend::{Backend, BackendError, Residency, launch, parallel_available, select_backend},
    config::{ConfigError, ConfigErrorCode, EdgeDef, FarmConfig, FarmType, ModelToggles, VertexDef, ZoneConfig},
    dense::{DenseMatrix, HistoryRing},
    error::{CoreError, CoreErrorCode, GraphError, GraphErrorCode, Result},
    graph::{EdgeReducer, Layer, LayerTag, LayeredHypergraph, VertexQuery, invariant_violations},
    models::{
        AnomalyRecord, IrrigationRecord, NutrientRecord, NutrientWeights, StressFactors,
        TrainOutcome, TrainReport, WeatherForecast, YieldRecord,
    },
    serialize::{
        SerializeError, SerializeErrorCode, SerializedGraph, SerializedLayer, deserialize_graph,
        graph_from_value, serialize_graph,
    },
    sparse::CscMatrix,
    state::ProcessState,
    synth::{BitMatrix, SyntheticDataset, generate_synthetic},
};
