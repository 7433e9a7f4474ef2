//! Live collection mirror.
//!
//! A [`CollectionMirror`] keeps a local, incrementally-updated copy of
//! one remote table: it subscribes to the table's change feed, seeds
//! itself from a snapshot query, and then applies every reported
//! insert/update/delete in arrival order. Consumers read the current
//! state directly or watch a channel of immutable snapshots.

pub mod mirror;
pub mod reconcile;

pub use mirror::{CollectionMirror, MirrorSnapshot};
