use std::sync::Once;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use starchart_dataset::{normalize_dataset, CanonicalDataset, CanonicalSystem, NormalizationError};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(starchart_logging::initialize_for_tests);
}

#[test]
fn end_to_end_resolves_every_field() {
    init_logging();
    let raw = json!({
        "systems": { "sol": { "name": "Sol" } },
        "system_pixels": { "sol": [100, 200] },
        "sectors": { "Core": ["sol"] }
    });

    let dataset = normalize_dataset(&raw);
    let sol = dataset.system("sol").expect("sol normalized");

    assert_eq!(sol.coords, Some(json!([100, 200])));
    assert_eq!(sol.grid, None);
    assert_eq!(sol.sector_name(), Some("Core"));
    assert_eq!(
        serde_json::to_value(sol).unwrap(),
        json!({ "name": "Sol", "coords": [100, 200], "sector": "Core" })
    );
    assert!(dataset.normalization_errors.is_empty());
}

#[test]
fn entity_fields_take_precedence_over_tables() {
    init_logging();
    let raw = json!({
        "systems": { "sol": { "coords": [9, 9], "grid": "K-7", "sector": "Home" } },
        "system_pixels": { "sol": [1, 1] },
        "system_grid": { "sol": "A-1" },
        "sectors": { "Core": ["sol"] }
    });

    let sol = normalize_dataset(&raw).systems["sol"].clone();

    assert_eq!(sol.coords, Some(json!([9, 9])));
    assert_eq!(sol.grid, Some(json!("K-7")));
    assert_eq!(sol.sector_name(), Some("Home"));
}

#[test]
fn legacy_position_table_is_used_without_primary() {
    init_logging();
    let raw = json!({
        "systems": { "sol": {} },
        "endpoint_pixels": { "sol": [5, 6] }
    });

    let dataset = normalize_dataset(&raw);
    assert_eq!(dataset.systems["sol"].coords_pair(), Some((5.0, 6.0)));
}

#[test]
fn primary_position_table_shadows_legacy_even_when_missing_id() {
    init_logging();
    let raw = json!({
        "systems": { "sol": {} },
        "system_pixels": { "vega": [1, 1] },
        "endpoint_pixels": { "sol": [5, 6] }
    });

    let dataset = normalize_dataset(&raw);
    assert_eq!(dataset.systems["sol"].coords, None);
}

#[test]
fn duplicate_sector_membership_resolves_to_last_group() {
    init_logging();
    let raw = json!({
        "systems": { "sol": {} },
        "sectors": { "A": ["sol"], "B": ["sol"] }
    });

    let dataset = normalize_dataset(&raw);
    assert_eq!(dataset.systems["sol"].sector_name(), Some("B"));
}

#[test]
fn missing_lookups_stay_absent() {
    init_logging();
    let raw = json!({ "systems": { "rogue": { "name": "Rogue" } } });

    let rogue = &normalize_dataset(&raw).systems["rogue"];
    assert_eq!(rogue.coords, None);
    assert_eq!(rogue.grid, None);
    assert_eq!(rogue.sector, None);
    assert_eq!(serde_json::to_value(rogue).unwrap(), json!({ "name": "Rogue" }));
}

#[test]
fn renormalizing_canonical_output_changes_nothing() {
    init_logging();
    let raw = json!({
        "systems": {
            "sol": { "name": "Sol" },
            "vega": { "name": "Vega", "grid": "B-2" }
        },
        "system_pixels": { "sol": [100, 200], "vega": [3, 4] },
        "system_grid": { "sol": "A-1", "vega": "Z-9" },
        "sectors": { "Core": ["sol"], "Lyra": ["vega"] }
    });

    let first = normalize_dataset(&raw);
    let second = normalize_dataset(&first.to_value());

    for (id, system) in &first.systems {
        let again = &second.systems[id];
        assert_eq!(again.coords, system.coords);
        assert_eq!(again.grid, system.grid);
        assert_eq!(again.sector, system.sector);
    }
    assert_eq!(second, first);
}

#[test]
fn unrelated_top_level_fields_survive() {
    init_logging();
    let raw = json!({
        "systems": { "sol": {} },
        "routes": [{ "from": "sol", "to": "vega" }],
        "meta": { "version": 3 }
    });

    let dataset = normalize_dataset(&raw);
    assert_eq!(dataset.extra.get("routes"), raw.get("routes"));
    assert_eq!(dataset.extra.get("meta"), raw.get("meta"));
    assert!(dataset.extra.get("systems").is_none());
}

#[test]
fn invalid_input_degrades_to_empty_dataset() {
    init_logging();
    for raw in [Value::Null, json!(42), json!("systems"), json!([1, 2])] {
        let dataset = normalize_dataset(&raw);
        assert_eq!(dataset, CanonicalDataset::empty());
        assert_eq!(dataset.to_value(), json!({ "systems": {} }));
    }
}

#[test]
fn bad_entity_is_recorded_and_others_continue() {
    init_logging();
    let raw = json!({
        "systems": {
            "bad": "not a record",
            "sol": { "name": "Sol" }
        },
        "system_pixels": { "sol": [1, 2], "bad": [3, 4] }
    });

    let dataset = normalize_dataset(&raw);

    assert_eq!(
        dataset.normalization_errors,
        vec![NormalizationError {
            system_id: "bad".to_string(),
            message: "expected an object, found a string".to_string(),
        }]
    );
    assert_eq!(dataset.systems["bad"], CanonicalSystem::default());
    assert_eq!(dataset.systems["sol"].coords, Some(json!([1, 2])));
    assert_eq!(
        dataset.to_value()["_normalizationErrors"],
        json!([{ "systemId": "bad", "message": "expected an object, found a string" }])
    );
}

#[test]
fn malformed_coords_do_not_block_normalization() {
    init_logging();
    let raw = json!({
        "systems": { "odd": { "coords": [1] }, "sol": {} },
        "system_pixels": { "sol": [1, 2] }
    });

    let dataset = normalize_dataset(&raw);

    assert!(dataset.normalization_errors.is_empty());
    assert_eq!(dataset.systems["odd"].coords, Some(json!([1])));
    assert_eq!(dataset.systems["odd"].coords_pair(), None);
    assert_eq!(dataset.systems["sol"].coords_pair(), Some((1.0, 2.0)));
}

#[test]
fn null_entity_is_resolved_from_tables() {
    init_logging();
    let raw = json!({
        "systems": { "sol": null },
        "system_grid": { "sol": "A-1" }
    });

    let dataset = normalize_dataset(&raw);
    assert_eq!(dataset.systems["sol"].grid, Some(json!("A-1")));
    assert!(dataset.normalization_errors.is_empty());
}

#[test]
fn stale_error_list_is_not_carried_over() {
    init_logging();
    let raw = json!({
        "systems": { "sol": {} },
        "_normalizationErrors": [{ "systemId": "gone", "message": "old" }]
    });

    let dataset = normalize_dataset(&raw);
    assert!(dataset.normalization_errors.is_empty());
    assert!(dataset.to_value().get("_normalizationErrors").is_none());
}

#[test]
fn entities_keep_document_order() {
    init_logging();
    let raw = json!({
        "systems": { "zeta": {}, "alpha": {}, "mid": 3, "beta": null },
        "system_pixels": { "alpha": [1, 1] }
    });

    let dataset = normalize_dataset(&raw);
    let ids: Vec<&str> = dataset.systems.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid", "beta"]);

    let value = dataset.to_value();
    let serialized: Vec<&str> = value["systems"]
        .as_object()
        .expect("systems object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(serialized, ids);
}
