use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryId;
use crate::domain::listing::{ActorId, ListingId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    ClickPhone,
    AddFavorite,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [Self::View, Self::ClickPhone, Self::AddFavorite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::ClickPhone => "click_phone",
            Self::AddFavorite => "add_favorite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" => Some(Self::View),
            "click_phone" => Some(Self::ClickPhone),
            "add_favorite" => Some(Self::AddFavorite),
            _ => None,
        }
    }
}

/// One append-only record of an actor touching a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: i64,
    /// `None` for anonymous sessions.
    pub actor_id: Option<ActorId>,
    pub listing_id: ListingId,
    pub category_id: CategoryId,
    pub kind: InteractionKind,
    pub duration_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Event payload accepted by the recording path before storage assigns an id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInteraction {
    pub actor_id: Option<ActorId>,
    pub listing_id: ListingId,
    pub category_id: CategoryId,
    pub kind: InteractionKind,
    pub duration_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::InteractionKind;

    #[test]
    fn interaction_kind_parses_wire_names() {
        for kind in InteractionKind::ALL {
            assert_eq!(InteractionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(InteractionKind::parse("share"), None);
    }
}
