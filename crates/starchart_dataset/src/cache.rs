use std::fmt;

use serde_json::{Map, Value};
use starchart_logging::chart_warn;

use crate::types::{PixelSource, SECTORS_FIELD, SYSTEMS_FIELD, SYSTEM_GRID_FIELD};
use crate::NormalizerSettings;

/// Lookup key for a normalized dataset.
///
/// Small datasets are keyed by their exact serialization. Large ones use a
/// [`Fingerprint`], which can alias two different inputs that share every
/// count and the same leading ids; that risk is accepted in exchange for a key
/// whose cost does not grow with the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Exact(String),
    Fingerprint(Fingerprint),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub system_count: usize,
    pub pixel_count: usize,
    pub pixel_source: PixelSource,
    pub grid_count: usize,
    pub sector_count: usize,
    pub sample: Vec<String>,
}

impl CacheKey {
    /// Derive the key for `raw`, or `None` when the input cannot be cached.
    pub fn derive(raw: &Value, settings: &NormalizerSettings) -> Option<Self> {
        let map = raw.as_object()?;
        let system_count = entry_count(map, SYSTEMS_FIELD);

        if system_count < settings.exact_key_threshold {
            return match serde_json::to_string(raw) {
                Ok(serialized) => Some(CacheKey::Exact(serialized)),
                Err(err) => {
                    chart_warn!("Failed to generate cache key: {}", err);
                    None
                }
            };
        }

        let pixel_source = PixelSource::detect(map);
        let pixel_count = pixel_source
            .field_name()
            .map_or(0, |field| entry_count(map, field));

        let mut ids: Vec<&String> = map
            .get(SYSTEMS_FIELD)
            .and_then(Value::as_object)
            .map(|systems| systems.keys().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        let sample = ids
            .into_iter()
            .take(settings.fingerprint_sample)
            .cloned()
            .collect();

        Some(CacheKey::Fingerprint(Fingerprint {
            system_count,
            pixel_count,
            pixel_source,
            grid_count: entry_count(map, SYSTEM_GRID_FIELD),
            sector_count: entry_count(map, SECTORS_FIELD),
            sample,
        }))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Exact(serialized) => f.write_str(serialized),
            CacheKey::Fingerprint(print) => write!(
                f,
                "{}|{}|{}|{}|{}|{}",
                print.system_count,
                print.pixel_count,
                print.pixel_source.field_name().unwrap_or(""),
                print.grid_count,
                print.sector_count,
                print.sample.join(",")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub size: usize,
    /// Live keys, only filled in when requested.
    pub keys: Option<Vec<String>>,
}

fn entry_count(map: &Map<String, Value>, field: &str) -> usize {
    map.get(field)
        .and_then(Value::as_object)
        .map_or(0, Map::len)
}
