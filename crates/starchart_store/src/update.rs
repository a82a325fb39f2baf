use std::sync::Arc;

use serde_json::Value;
use starchart_dataset::CanonicalDataset;
use starchart_logging::chart_warn;

use crate::{Action, EditorMode, Mode, ScopePath, Selection, StateTree};

/// Pure reducer: applies an action to a snapshot.
///
/// Returns the next snapshot and the scope it changed. A rejected action
/// returns the same `Arc` and no scope; the input snapshot is never modified.
pub fn update(state: &Arc<StateTree>, action: Action) -> (Arc<StateTree>, Option<ScopePath>) {
    let debug = state.config.debug;
    match action {
        Action::SelectSystem(system) => changed(
            state,
            ["selection"],
            |next| next.selection = Selection { system },
        ),
        Action::SetMode(name) => match name.parse::<Mode>() {
            Ok(mode) => changed(state, ["mode"], |next| next.mode = mode),
            Err(err) => rejected(state, debug, &format!("Attempt to set {err}")),
        },
        Action::SetDataset(dataset) => changed(state, ["dataset"], |next| {
            next.dataset = dataset.unwrap_or_else(|| Arc::new(CanonicalDataset::empty()));
        }),
        Action::SetCampaign(campaign) => changed(state, ["campaign"], |next| {
            if let Some(campaign) = campaign {
                next.campaign = Arc::new(campaign);
            }
        }),
        Action::SetAccess(patch) => changed(state, ["access"], |next| {
            patch.apply(Arc::make_mut(&mut next.access));
        }),
        Action::SetEditorEnabled(enabled) => changed(state, ["editor", "enabled"], |next| {
            Arc::make_mut(&mut next.editor).enabled = enabled;
        }),
        Action::AddEditorJob(job) => match job {
            Value::Object(job) => changed(state, ["editor", "jobs"], |next| {
                Arc::make_mut(&mut next.editor).jobs.push(job);
            }),
            other => rejected(
                state,
                debug,
                &format!("Ignoring editor job that is not an object: {other}"),
            ),
        },
        Action::ClearEditorJobs => changed(state, ["editor", "jobs"], |next| {
            Arc::make_mut(&mut next.editor).jobs.clear();
        }),
        Action::SetEditorMode { name, pending_data } => {
            changed(state, ["editor", "mode"], |next| {
                Arc::make_mut(&mut next.editor).mode = Some(EditorMode { name, pending_data });
            })
        }
        Action::ClearEditorMode => changed(state, ["editor", "mode"], |next| {
            Arc::make_mut(&mut next.editor).mode = None;
        }),
        Action::SetSelectedRoute(route) => changed(state, ["editor", "selectedRoute"], |next| {
            Arc::make_mut(&mut next.editor).selected_route = route;
        }),
    }
}

fn changed<const N: usize>(
    state: &Arc<StateTree>,
    scope: [&str; N],
    apply: impl FnOnce(&mut StateTree),
) -> (Arc<StateTree>, Option<ScopePath>) {
    let mut next = StateTree::clone(state);
    apply(&mut next);
    (Arc::new(next), Some(ScopePath::from(scope)))
}

fn rejected(
    state: &Arc<StateTree>,
    debug: bool,
    message: &str,
) -> (Arc<StateTree>, Option<ScopePath>) {
    if debug {
        chart_warn!("[STATE] {}", message);
    }
    (Arc::clone(state), None)
}
