use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// How a group is managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    #[default]
    Manual,
    Synced,
    System,
}

impl GroupType {
    pub const ALL: [&'static str; 3] = ["MANUAL", "SYNCED", "SYSTEM"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Synced => "SYNCED",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "SYNCED" => Ok(Self::Synced),
            "SYSTEM" => Ok(Self::System),
            _ => Err(UnknownVariant::new("group type", s, &Self::ALL)),
        }
    }
}

/// A collection of users granted access to resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub group_type: GroupType,
    pub is_active: bool,
    /// Ids of member users.
    pub users: Vec<String>,
}

/// Criteria for listing groups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupsFilter {
    pub name: Option<String>,
    pub group_type: Option<GroupType>,
    pub is_active: Option<bool>,
}

impl GroupsFilter {
    /// The name to filter on, if one is set and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Whether `group` satisfies the type and activity criteria.
    ///
    /// Names are filtered by the API, not here.
    pub fn matches(&self, group: &Group) -> bool {
        if self.group_type.is_some_and(|t| t != group.group_type) {
            return false;
        }
        if self.is_active.is_some_and(|active| active != group.is_active) {
            return false;
        }
        true
    }
}

/// Changes to apply to an existing group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupUpdate {
    pub id: String,
    pub name: String,
    /// Members before the update.
    pub old_users: Vec<String>,
    /// Members after the update.
    pub new_users: Vec<String>,
}

impl GroupUpdate {
    /// Users in `new_users` but not in `old_users`, sorted.
    pub fn added_users(&self) -> Vec<String> {
        difference(&self.new_users, &self.old_users)
    }

    /// Users in `old_users` but not in `new_users`, sorted.
    pub fn removed_users(&self) -> Vec<String> {
        difference(&self.old_users, &self.new_users)
    }
}

fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: BTreeSet<&String> = right.iter().collect();
    left.iter()
        .filter(|id| !right.contains(id))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
