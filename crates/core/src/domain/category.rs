use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
}

impl CategoryNode {
    /// Two categories are siblings when they are distinct and share a parent.
    /// Root categories have no siblings.
    pub fn is_sibling_of(&self, other: &CategoryNode) -> bool {
        self.id != other.id && self.parent_id.is_some() && self.parent_id == other.parent_id
    }

    pub fn name_matches(&self, fragment: &str) -> bool {
        self.name.to_lowercase().contains(&fragment.trim().to_lowercase())
    }
}
