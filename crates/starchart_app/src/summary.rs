use std::fmt;

use starchart_dataset::NormalizationError;
use starchart_store::StateTree;

/// What the inspector prints after loading a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub systems: usize,
    pub without_coords: usize,
    pub without_grid: usize,
    pub without_sector: usize,
    pub errors: Vec<NormalizationError>,
    pub mode: String,
    /// Selected id with its canonical JSON, when the id resolves.
    pub selected: Option<(String, Option<String>)>,
}

impl Summary {
    pub fn of(state: &StateTree) -> Self {
        let systems = state.dataset.systems.values();
        let selected = state.selected_system().map(|id| {
            let json = state
                .dataset
                .system(id)
                .and_then(|system| serde_json::to_string_pretty(system).ok());
            (id.to_string(), json)
        });

        Self {
            systems: state.dataset.systems.len(),
            without_coords: systems.clone().filter(|s| s.coords.is_none()).count(),
            without_grid: systems.clone().filter(|s| s.grid.is_none()).count(),
            without_sector: systems.filter(|s| s.sector.is_none()).count(),
            errors: state.dataset.normalization_errors.clone(),
            mode: state.mode.to_string(),
            selected,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "systems:          {}", self.systems)?;
        writeln!(f, "without coords:   {}", self.without_coords)?;
        writeln!(f, "without grid:     {}", self.without_grid)?;
        writeln!(f, "without sector:   {}", self.without_sector)?;
        writeln!(f, "mode:             {}", self.mode)?;
        writeln!(f, "errors:           {}", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  {}: {}", error.system_id, error.message)?;
        }
        match &self.selected {
            None => writeln!(f, "selected:         none"),
            Some((id, None)) => writeln!(f, "selected:         {id} (not in dataset)"),
            Some((id, Some(json))) => writeln!(f, "selected:         {id}\n{json}"),
        }
    }
}
