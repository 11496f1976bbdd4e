//! Mutation-tracking state container.
//!
//! A [`Store`] wraps one JSON document. Callers mutate it through a
//! writable [`TreeView`] inside [`Store::mutate`]; the engine silently
//! records every elementary change, merges overlapping edits, and returns
//! a minimal ordered list of [`PatchOp`]s. Subscriptions are declared
//! either explicitly with path patterns ([`Store::select`], `*` matching
//! one segment and `**` the rest of the path) or implicitly by reading
//! ([`Store::autorun`], which tracks whatever the reaction touched on its
//! last run). Patch lists replay onto another store with
//! [`Store::mutate_from_patches`], optionally routing through registered
//! [`PatchDelegate`]s.
//!
//! Everything is single-threaded and synchronous: a commit, its patch
//! compilation, and subscriber dispatch all happen on the caller's stack.
//!
//! # Quick start
//!
//! ```
//! use serde_json::json;
//! use trellis_state::{path, Store};
//!
//! let store = Store::new(json!({"count": 1, "words": ["a"]}));
//!
//! let patches = store.mutate(|s| {
//!     s.set("count", 2)?;
//!     s.child("words").push("b")
//! })?;
//! assert_eq!(patches.len(), 2);
//! assert_eq!(store.get(&path!("count")), Some(json!(2)));
//! assert_eq!(store.get(&path!("words")), Some(json!(["a", "b"])));
//! # Ok::<(), trellis_state::StateError>(())
//! ```

mod apply;
mod combine;
mod error;
mod mutation;
mod op;
mod path;
mod selector;
mod store;
mod view;

pub use combine::combine_patches;
pub use error::{value_type_name, StateError, StateResult};
pub use op::{OpKind, PatchOp};
pub use path::{Path, APPEND};
pub use store::{PatchDelegate, Reaction, SelectOptions, Selection, Store};
pub use view::{ReadView, TreeView};
