use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use starchart_dataset::CanonicalDataset;
use thiserror::Error;

/// Application state snapshot.
///
/// Snapshots are never modified after they are published; each mutation
/// builds a new tree that shares every untouched `Arc` slot with the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTree {
    pub config: Arc<ViewerConfig>,
    pub dataset: Arc<CanonicalDataset>,
    pub campaign: Arc<Campaign>,
    pub access: Arc<Access>,
    pub selection: Selection,
    pub mode: Mode,
    pub editor: Arc<EditorState>,
}

impl StateTree {
    pub fn new(
        config: ViewerConfig,
        dataset: Option<Arc<CanonicalDataset>>,
        campaign: Option<Campaign>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dataset: dataset.unwrap_or_else(|| Arc::new(CanonicalDataset::empty())),
            campaign: Arc::new(campaign.unwrap_or_default()),
            access: Arc::new(Access::default()),
            selection: Selection::default(),
            mode: Mode::default(),
            editor: Arc::new(EditorState::default()),
        }
    }

    pub fn selected_system(&self) -> Option<&str> {
        self.selection.system.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Enables warnings for rejected actions.
    #[serde(default)]
    pub debug: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Campaign bookkeeping. The store keeps it but never looks inside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Campaign {
    pub factions: Vec<Value>,
    pub system_control: Vec<Value>,
    pub actors: Vec<Value>,
    pub asset_requests: Vec<Value>,
    pub budgets: Budgets,
    pub actor_types: Vec<Value>,
    pub asset_catalog: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    pub players: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    pub tier: String,
    pub player_id: Option<String>,
    pub factions: Vec<String>,
    pub capabilities: Capabilities,
}

impl Default for Access {
    fn default() -> Self {
        Self {
            tier: "viewer".to_string(),
            player_id: None,
            factions: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_edit_own_actors: bool,
    pub can_edit_faction_actors: bool,
    pub can_edit_system_control: bool,
    pub can_see_gm_only: bool,
}

/// Partial update for [`Access`]; `None` fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessPatch {
    pub tier: Option<String>,
    pub player_id: Option<Option<String>>,
    pub factions: Option<Vec<String>>,
    pub capabilities: Option<Capabilities>,
}

impl AccessPatch {
    pub(crate) fn apply(self, access: &mut Access) {
        if let Some(tier) = self.tier {
            access.tier = tier;
        }
        if let Some(player_id) = self.player_id {
            access.player_id = player_id;
        }
        if let Some(factions) = self.factions {
            access.factions = factions;
        }
        if let Some(capabilities) = self.capabilities {
            access.capabilities = capabilities;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub system: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Navcom,
    Strategic,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Navcom, Mode::Strategic];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Navcom => "navcom",
            Mode::Strategic => "strategic",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode `{0}`")]
pub struct ModeParseError(pub String);

impl FromStr for Mode {
    type Err = ModeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| ModeParseError(value.to_string()))
    }
}

/// An editor job as queued by the editor UI; its contents are not interpreted here.
pub type EditorJob = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditorState {
    pub enabled: bool,
    pub jobs: Vec<EditorJob>,
    /// Active interaction, `None` when idle.
    pub mode: Option<EditorMode>,
    pub selected_route: Option<String>,
}

/// Interaction the editor UI is in the middle of, e.g. placing or relocating a system.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorMode {
    pub name: String,
    pub pending_data: Option<Value>,
}
