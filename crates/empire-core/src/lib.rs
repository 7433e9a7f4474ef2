//! Record model and backend abstraction for the Lambda Empire
//! membership suite.
//!
//! Hosted tables (profiles, events, communications, ...) are exposed to
//! the rest of the suite through the [`Backend`] trait: one-shot
//! snapshot queries, table-scoped change subscriptions, the current
//! authenticated user, role assignments, and record patches. Rows are
//! opaque [`Record`]s — a mandatory `id` plus a dynamic field map —
//! because their schemas live server-side.

pub mod backend;
pub mod event;
pub mod memory;
pub mod query;
pub mod record;

pub use backend::*;
pub use event::*;
pub use memory::MemoryBackend;
pub use query::*;
pub use record::*;
