use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to live quest subscribers.
///
/// These carry no payload beyond the quest id: they are invalidation
/// signals, not deltas. A client that receives one re-fetches current
/// state, and a client that missed one catches up on its next fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A participant's check-ins changed in this quest.
    ScoreboardUpdate { quest_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoreboard_update_wire_shape() {
        let event = RoomEvent::ScoreboardUpdate {
            quest_id: Uuid::nil(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "scoreboard_update",
                "quest_id": "00000000-0000-0000-0000-000000000000",
            })
        );
    }
}
