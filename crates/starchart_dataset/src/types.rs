use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SYSTEMS_FIELD: &str = "systems";
pub const SYSTEM_PIXELS_FIELD: &str = "system_pixels";
pub const ENDPOINT_PIXELS_FIELD: &str = "endpoint_pixels";
pub const SYSTEM_GRID_FIELD: &str = "system_grid";
pub const SECTORS_FIELD: &str = "sectors";
pub const ERRORS_FIELD: &str = "_normalizationErrors";

/// Normalized dataset: the raw document with `systems` replaced by resolved entities.
///
/// Every top-level field other than `systems` is carried through untouched in
/// `extra`, including the lookup tables the entities were resolved from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalDataset {
    /// Entities in document order.
    #[serde(default)]
    pub systems: IndexMap<String, CanonicalSystem>,
    #[serde(
        rename = "_normalizationErrors",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub normalization_errors: Vec<NormalizationError>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CanonicalDataset {
    /// The safe default used for missing or invalid input: `{ "systems": {} }`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn system(&self, id: &str) -> Option<&CanonicalSystem> {
        self.systems.get(id)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// One entity with its position, grid cell and sector resolved.
///
/// Unresolved fields stay `None` and are omitted when serialized, so consumers
/// can tell "unknown" apart from any real value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalSystem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CanonicalSystem {
    /// Coordinates as an `(x, y)` pair when they are a well-formed numeric pair.
    pub fn coords_pair(&self) -> Option<(f64, f64)> {
        match self.coords.as_ref()?.as_array()?.as_slice() {
            [x, y] => Some((x.as_f64()?, y.as_f64()?)),
            _ => None,
        }
    }

    pub fn sector_name(&self) -> Option<&str> {
        self.sector.as_ref()?.as_str()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationError {
    #[serde(rename = "systemId")]
    pub system_id: String,
    pub message: String,
}

/// Which position table a raw dataset resolves coordinates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelSource {
    SystemPixels,
    EndpointPixels,
    Absent,
}

impl PixelSource {
    /// `system_pixels` wins whenever it is present, even if it lacks a given id.
    pub fn detect(raw: &Map<String, Value>) -> Self {
        if is_present(raw.get(SYSTEM_PIXELS_FIELD)) {
            PixelSource::SystemPixels
        } else if is_present(raw.get(ENDPOINT_PIXELS_FIELD)) {
            PixelSource::EndpointPixels
        } else {
            PixelSource::Absent
        }
    }

    pub fn field_name(self) -> Option<&'static str> {
        match self {
            PixelSource::SystemPixels => Some(SYSTEM_PIXELS_FIELD),
            PixelSource::EndpointPixels => Some(ENDPOINT_PIXELS_FIELD),
            PixelSource::Absent => None,
        }
    }
}

pub(crate) fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}
