use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CardId, SetId};

/// Kind of entity a dirty record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyItemType {
    Set,
}

impl DirtyItemType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DirtyItemType::Set => "set",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "set" => Some(DirtyItemType::Set),
            _ => None,
        }
    }
}

/// A set with local changes that have not been pushed to the backend.
///
/// Membership is keyed by `item_id`; `marked_at` records the first mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyItem {
    pub item_id: SetId,
    #[serde(rename = "type")]
    pub item_type: DirtyItemType,
    pub marked_at: DateTime<Utc>,
}

impl DirtyItem {
    #[must_use]
    pub fn set(item_id: SetId, marked_at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            item_type: DirtyItemType::Set,
            marked_at,
        }
    }
}

/// A card with local changes, keyed by `(set_id, card_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyCard {
    pub set_id: SetId,
    pub card_id: CardId,
    pub marked_at: DateTime<Utc>,
}

impl DirtyCard {
    #[must_use]
    pub fn new(set_id: SetId, card_id: CardId, marked_at: DateTime<Utc>) -> Self {
        Self {
            set_id,
            card_id,
            marked_at,
        }
    }

    #[must_use]
    pub fn key(&self) -> (&SetId, &CardId) {
        (&self.set_id, &self.card_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn dirty_item_type_round_trips_through_str() {
        let ty = DirtyItemType::Set;
        assert_eq!(DirtyItemType::parse(ty.as_str()), Some(ty));
        assert_eq!(DirtyItemType::parse("card"), None);
    }

    #[test]
    fn dirty_item_serializes_type_tag() {
        let item = DirtyItem::set(SetId::new("s1"), fixed_now());
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["itemId"], "s1");
        assert_eq!(json["type"], "set");
    }
}
