//! Starchart store: application state, pure reducer and batched subscriptions.
mod action;
mod scope;
mod state;
mod store;
mod update;

pub use action::Action;
pub use scope::ScopePath;
pub use state::{
    Access, AccessPatch, Budgets, Campaign, Capabilities, EditorJob, EditorMode, EditorState,
    Mode, ModeParseError, Selection, StateTree, ViewerConfig,
};
pub use store::{Actions, Store, StoreSettings, Subscription, SubscriptionId};
pub use update::update;
