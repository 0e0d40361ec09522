use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persist::GameStateSnapshot;
use crate::scene::Transform;

/// Display format used for `SlotRecord::saved_time`.
pub const SAVED_TIME_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";

/// Everything written to one slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub record_type: String,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub saved_time: String,
    #[serde(default)]
    pub saved_map: String,
    #[serde(default)]
    pub game_options: String,
    #[serde(default)]
    pub principal_transform: Transform,
    #[serde(default)]
    pub use_principal_transform: bool,
    #[serde(default)]
    pub state: GameStateSnapshot,
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

impl SlotRecord {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.saved_at = Some(now);
        self.saved_time = now.format(SAVED_TIME_FORMAT).to_string();
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn stamp_sets_timestamp_and_display_string() {
        let mut record = SlotRecord::new("SavedGameState");
        let now = Utc
            .with_ymd_and_hms(2024, 3, 9, 17, 4, 5)
            .single()
            .expect("valid time");

        record.stamp(now);

        assert_eq!(record.saved_at, Some(now));
        assert_eq!(record.saved_time, "2024.03.09-17.04.05");
    }

    #[test]
    fn missing_optional_fields_decode_to_defaults() {
        let record: SlotRecord =
            serde_json::from_str(r#"{ "record_type": "SavedGameState" }"#).expect("decode");
        assert_eq!(record, SlotRecord::new("SavedGameState"));
        assert!(record.state.is_empty());
    }
}
