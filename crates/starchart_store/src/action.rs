use std::sync::Arc;

use serde_json::Value;
use starchart_dataset::CanonicalDataset;

use crate::{AccessPatch, Campaign};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// User picked a system on the map, or cleared the pick.
    SelectSystem(Option<String>),
    /// Switch the viewer mode; unknown names are rejected.
    SetMode(String),
    /// Replace the whole dataset, e.g. after an editor batch was applied.
    SetDataset(Option<Arc<CanonicalDataset>>),
    SetCampaign(Option<Campaign>),
    /// Merge the given fields into the viewer's access record.
    SetAccess(AccessPatch),
    SetEditorEnabled(bool),
    /// Queue an editor job; must be a JSON object.
    AddEditorJob(Value),
    ClearEditorJobs,
    SetEditorMode {
        name: String,
        pending_data: Option<Value>,
    },
    ClearEditorMode,
    SetSelectedRoute(Option<String>),
}
