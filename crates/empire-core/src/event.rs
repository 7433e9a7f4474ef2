use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::{Record, RecordId, Value};

/// A change reported by the backend's feed for one table.
///
/// Updates carry only the fields that changed; consumers shallow-merge
/// them over their copy of the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    Inserted(Record),
    Updated {
        id: RecordId,
        fields: BTreeMap<String, Value>,
    },
    Deleted(RecordId),
}

impl ChangeEvent {
    /// The id of the record this event concerns.
    pub fn record_id(&self) -> &str {
        match self {
            ChangeEvent::Inserted(record) => &record.id,
            ChangeEvent::Updated { id, .. } => id,
            ChangeEvent::Deleted(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serde_round_trip() {
        let events = vec![
            ChangeEvent::Inserted(Record::new("E1").with_field("title", Value::String("Gala".into()))),
            ChangeEvent::Updated {
                id: "E1".into(),
                fields: {
                    let mut m = BTreeMap::new();
                    m.insert("title".into(), Value::String("Spring Gala".into()));
                    m
                },
            },
            ChangeEvent::Deleted("E1".into()),
        ];
        for e in &events {
            let json = serde_json::to_string(e).unwrap();
            let back: ChangeEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(*e, back);
        }
    }

    #[test]
    fn record_id_accessor() {
        let e = ChangeEvent::Deleted("C3".into());
        assert_eq!(e.record_id(), "C3");
        let e = ChangeEvent::Inserted(Record::new("C4"));
        assert_eq!(e.record_id(), "C4");
    }
}
