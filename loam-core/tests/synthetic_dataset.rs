//! Dataset-level properties of the synthetic generator.

use loam_core::api;

#[test]
fn host_generation_is_deterministic_per_seed() {
    let left = api::generate_synthetic("hybrid", 3, 20_260_801).expect("tag is valid");
    let right = api::generate_synthetic("hybrid", 3, 20_260_801).expect("tag is valid");
    assert_eq!(
        serde_json::to_string(&left).expect("dataset serializes"),
        serde_json::to_string(&right).expect("dataset serializes")
    );
}

#[test]
fn the_grid_is_uniform_at_fifteen_minutes() {
    let dataset = api::generate_synthetic("open_field", 2, 7).expect("tag is valid");
    assert_eq!(dataset.cadence_minutes, 15);
    assert_eq!(dataset.n_steps, 2 * 96);
    assert_eq!(dataset.time_hours.len(), dataset.n_steps);
    for (step, window) in dataset.time_hours.windows(2).enumerate() {
        assert!(
            (window[1] - window[0] - 0.25).abs() < 1e-6,
            "non-uniform step at {step}"
        );
    }
    assert_eq!(dataset.time_hours[0], 0.0);
}

#[test]
fn soil_moisture_is_bounded_and_masks_match_nans() {
    let dataset = api::generate_synthetic("greenhouse", 4, 99).expect("tag is valid");
    let soil = &dataset.layers.soil;
    for (step, row) in soil.moisture.iter().enumerate() {
        for (sensor, &value) in row.iter().enumerate() {
            let masked = soil.missing_mask.get(step, sensor);
            assert_eq!(value.is_nan(), masked, "step {step} sensor {sensor}");
            if value.is_finite() {
                assert!((0.0..=1.0).contains(&value));
            }
            // The shared soil mask drops every channel of the sensor.
            assert_eq!(soil.temperature[step][sensor].is_nan(), masked);
            assert_eq!(soil.conductivity[step][sensor].is_nan(), masked);
            assert_eq!(soil.ph[step][sensor].is_nan(), masked);
        }
    }
}

#[test]
fn hybrid_topology_splits_two_greenhouse_four_open() {
    let dataset = api::generate_synthetic("hybrid", 1, 13).expect("tag is valid");
    let zones = &dataset.topology.zones;
    assert_eq!(dataset.topology.n_zones, 6);
    assert_eq!(zones.len(), 6);
    assert!(zones[..2].iter().all(|z| z.zone_type == "greenhouse"));
    assert!(zones[2..].iter().all(|z| z.zone_type == "open_field"));
    for zone in &zones[2..] {
        assert!(
            !zone.active_layers.iter().any(|layer| layer == "vision"),
            "open-field zone {} must not declare vision",
            zone.zone_id
        );
    }
    // Covered layers only span the greenhouse zones.
    let lighting = dataset.layers.lighting.as_ref().expect("hybrid has lighting");
    assert_eq!(lighting.zone_ids, vec!["zone-1", "zone-2"]);
}

#[test]
fn irrigation_series_tile_the_zone_impulses() {
    let dataset = api::generate_synthetic("open_field", 4, 55).expect("tag is valid");
    let irrigation = &dataset.layers.irrigation;
    assert_eq!(irrigation.valve_ids.len(), dataset.topology.n_zones);
    assert_eq!(irrigation.applied_mm.len(), dataset.n_steps);
    let total: f32 = irrigation
        .applied_mm
        .iter()
        .flatten()
        .filter(|mm| mm.is_finite())
        .sum();
    assert!(total > 0.0, "impulses must fire over four days");
}

#[test]
fn weather_and_npk_blocks_are_dimensionally_consistent() {
    let dataset = api::generate_synthetic("greenhouse", 8, 3).expect("tag is valid");
    let weather = &dataset.layers.weather;
    let stations = weather.station_ids.len();
    for block in [
        &weather.temperature,
        &weather.humidity,
        &weather.precipitation,
        &weather.solar_rad,
        &weather.et0_proxy,
    ] {
        assert_eq!(block.len(), dataset.n_steps);
        assert!(block.iter().all(|row| row.len() == stations));
    }
    let npk = &dataset.layers.npk;
    assert_eq!(npk.sample_hours.len(), 2);
    assert_eq!(npk.nitrogen.len(), 2);
    assert!(npk.nitrogen.iter().all(|row| row.len() == 6));
}

#[test]
fn dropout_rate_lands_near_the_default() {
    let dataset = api::generate_synthetic("open_field", 7, 42).expect("tag is valid");
    let soil = &dataset.layers.soil;
    let cells = soil.moisture.len() * soil.sensor_ids.len();
    let dropped = soil.missing_mask.count_set();
    let rate = dropped as f32 / cells as f32;
    assert!(
        (0.005..=0.08).contains(&rate),
        "dropout rate {rate} strayed far from 0.03"
    );
}
