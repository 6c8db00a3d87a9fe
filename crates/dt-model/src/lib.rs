//! dt-model: hierarchical equation-based models.
//!
//! Contains:
//! - builder (declarative `ModelBuilder`, one-way `save()` into a `Model`)
//! - layout (the canonical depth-first ordering every flat operation shares)
//! - model (frozen model, flattening, derivative evaluation, path lookups)
//! - history (signal store, commit/override, delayed lookups)
//! - scope (formula evaluation context)
//! - handle (typed handles for declared quantities)

pub mod builder;
pub mod error;
pub mod handle;
pub mod history;
mod layout;
pub mod model;
pub mod scope;

pub use builder::ModelBuilder;
pub use error::{LookupError, ModelError, ModelResult};
pub use handle::{InputRef, NodeRef, ParamRef, Signal, StateRef, VarRef};
pub use history::{CommitMode, Signals, find_floor_index};
pub use model::Model;
pub use scope::{Formula, Scope};
