use std::collections::HashMap;
use std::convert::Infallible;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use starchart_logging::{chart_warn, critical, validate};

use crate::types::{
    CanonicalDataset, CanonicalSystem, NormalizationError, PixelSource, ERRORS_FIELD,
    SECTORS_FIELD, SYSTEMS_FIELD, SYSTEM_GRID_FIELD,
};

/// Resolve every entity of a raw dataset into its canonical form.
///
/// This is the only implementation of the algorithm; the background worker
/// calls it too. Never panics: invalid input degrades to an empty dataset and
/// per-entity problems are collected into `normalization_errors`.
pub fn normalize_dataset(raw: &Value) -> CanonicalDataset {
    let Some(raw) = raw.as_object() else {
        return critical("normalize_dataset: empty or invalid raw dataset", || {
            Ok::<_, Infallible>(CanonicalDataset::empty())
        })
        .unwrap_or_default();
    };

    let tables = LookupTables::from_raw(raw);
    let mut systems = IndexMap::new();
    let mut errors = Vec::new();

    match raw.get(SYSTEMS_FIELD) {
        Some(Value::Object(entities)) => {
            for (id, entity) in entities {
                let system = match resolve_system(id, entity, &tables) {
                    Ok(system) => system,
                    Err(message) => {
                        chart_warn!("Failed to normalize system {}: {}", id, message);
                        errors.push(NormalizationError {
                            system_id: id.clone(),
                            message,
                        });
                        CanonicalSystem::default()
                    }
                };
                systems.insert(id.clone(), system);
            }
        }
        None | Some(Value::Null) => {}
        Some(_) => chart_warn!("normalize_dataset: `systems` is not an object; treating as empty"),
    }

    let mut extra = raw.clone();
    extra.remove(SYSTEMS_FIELD);
    // Errors from an earlier pass are recomputed, never carried over.
    extra.remove(ERRORS_FIELD);

    if !errors.is_empty() {
        chart_warn!(
            "Normalization completed with {} error(s) across {} system(s)",
            errors.len(),
            systems.len()
        );
    }

    CanonicalDataset {
        systems,
        normalization_errors: errors,
        extra,
    }
}

struct LookupTables<'a> {
    pixels: Option<&'a Map<String, Value>>,
    grid: Option<&'a Map<String, Value>>,
    sector_by_system: HashMap<String, String>,
}

impl<'a> LookupTables<'a> {
    fn from_raw(raw: &'a Map<String, Value>) -> Self {
        let pixels = PixelSource::detect(raw)
            .field_name()
            .and_then(|field| raw.get(field))
            .and_then(Value::as_object);
        let grid = raw.get(SYSTEM_GRID_FIELD).and_then(Value::as_object);
        let sector_by_system = build_sector_index(raw.get(SECTORS_FIELD));
        Self {
            pixels,
            grid,
            sector_by_system,
        }
    }
}

/// Reverse the group table into id -> group name.
///
/// An id listed under several groups ends up with the last one in document order.
fn build_sector_index(sectors: Option<&Value>) -> HashMap<String, String> {
    let mut index = HashMap::new();
    let Some(sectors) = sectors.and_then(Value::as_object) else {
        return index;
    };
    for (sector_name, members) in sectors {
        match members {
            Value::Array(ids) => {
                for id in ids {
                    match id {
                        Value::String(id) => {
                            index.insert(id.clone(), sector_name.clone());
                        }
                        Value::Number(id) => {
                            index.insert(id.to_string(), sector_name.clone());
                        }
                        _ => chart_warn!("Sector {} lists a non-id member: {}", sector_name, id),
                    }
                }
            }
            Value::Null => {}
            _ => chart_warn!("Sector {} membership is not a list; skipping", sector_name),
        }
    }
    index
}

fn resolve_system(
    id: &str,
    entity: &Value,
    tables: &LookupTables<'_>,
) -> Result<CanonicalSystem, String> {
    let mut fields = match entity {
        Value::Object(fields) => fields.clone(),
        Value::Null => Map::new(),
        other => return Err(format!("expected an object, found {}", json_kind(other))),
    };

    let coords = take_present(&mut fields, "coords").or_else(|| lookup(tables.pixels, id));
    if let Some(coords) = &coords {
        validate(
            is_coordinate_pair(coords),
            &format!("System {id} has invalid coords format"),
        );
    }
    let grid = take_present(&mut fields, "grid").or_else(|| lookup(tables.grid, id));
    let sector = take_present(&mut fields, "sector").or_else(|| {
        tables
            .sector_by_system
            .get(id)
            .map(|name| Value::String(name.clone()))
    });

    Ok(CanonicalSystem {
        coords,
        grid,
        sector,
        fields,
    })
}

fn take_present(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    fields.remove(key).filter(|value| !value.is_null())
}

fn lookup(table: Option<&Map<String, Value>>, id: &str) -> Option<Value> {
    table
        .and_then(|table| table.get(id))
        .filter(|value| !value.is_null())
        .cloned()
}

fn is_coordinate_pair(value: &Value) -> bool {
    matches!(value.as_array().map(Vec::as_slice), Some([x, y]) if x.is_number() && y.is_number())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
