//! Reconciliation rules for applying feed events to mirrored rows.

use empire_core::{ChangeEvent, Record};
use tracing::debug;

/// Apply one change event to an ordered row set. Returns whether the
/// rows changed.
///
/// Rules, in the order the feed delivers events:
/// - insert: ignored if the id is already present, else appended;
/// - update: shallow-merged into the matching row; dropped if the id
///   is unknown (no synthetic insert);
/// - delete: removes the matching row, no-op otherwise.
///
/// The invariant this maintains: at most one row per id.
pub fn apply(rows: &mut Vec<Record>, event: ChangeEvent) -> bool {
    match event {
        ChangeEvent::Inserted(record) => {
            if rows.iter().any(|r| r.id == record.id) {
                debug!(id = %record.id, "duplicate insert ignored");
                return false;
            }
            rows.push(record);
            true
        }
        ChangeEvent::Updated { id, fields } => match rows.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.merge(&fields);
                true
            }
            None => {
                debug!(id = %id, "update for unknown id dropped");
                false
            }
        },
        ChangeEvent::Deleted(id) => {
            let before = rows.len();
            rows.retain(|r| r.id != id);
            rows.len() != before
        }
    }
}
