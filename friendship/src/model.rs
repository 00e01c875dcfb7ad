use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::transition::RelationState;

pub const CUSTOM_TIER_MAX_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "pending",
            FriendshipStatus::Accepted => "accepted",
            FriendshipStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FriendshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendshipStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FriendshipStatus::Pending),
            "accepted" => Ok(FriendshipStatus::Accepted),
            "rejected" => Ok(FriendshipStatus::Rejected),
            other => Err(ValidationError::new(format!("unknown friendship status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    CloseFriends,
    #[default]
    Acquaintances,
    Family,
    Work,
    Custom,
}

impl TierKind {
    pub const ALL: [TierKind; 5] = [
        TierKind::CloseFriends,
        TierKind::Acquaintances,
        TierKind::Family,
        TierKind::Work,
        TierKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::CloseFriends => "close_friends",
            TierKind::Acquaintances => "acquaintances",
            TierKind::Family => "family",
            TierKind::Work => "work",
            TierKind::Custom => "custom",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TierKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::new(format!("unknown tier '{}'", s)))
    }
}

/// Classification of an accepted friendship. The label is only meaningful
/// for [`TierKind::Custom`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    #[serde(rename = "tier")]
    pub kind: TierKind,
    #[serde(rename = "customTier", default, skip_serializing_if = "Option::is_none")]
    pub custom_label: Option<String>,
}

impl Tier {
    pub fn new(kind: TierKind, custom_label: Option<&str>) -> Result<Tier, ValidationError> {
        let tier = Tier {
            kind,
            custom_label: custom_label
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(str::to_string),
        };
        tier.validate()?;
        Ok(tier)
    }

    pub fn parse(kind: &str, custom_label: Option<&str>) -> Result<Tier, ValidationError> {
        Tier::new(kind.parse()?, custom_label)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match (&self.kind, &self.custom_label) {
            (TierKind::Custom, Some(label)) => {
                if label.trim().is_empty() {
                    return Err(ValidationError::new("custom tier label is blank"));
                }
                if label.graphemes(true).count() > CUSTOM_TIER_MAX_LENGTH {
                    return Err(ValidationError::new("custom tier label is too long"));
                }
                Ok(())
            }
            (_, None) => Ok(()),
            (kind, Some(_)) => Err(ValidationError::new(format!(
                "custom label is only allowed for the custom tier, got '{}'",
                kind
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: Uuid,
    pub user_id: Uuid,
    pub friend_id: Uuid,
    pub status: FriendshipStatus,
    #[serde(flatten)]
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    /// A fresh pending request from `user_id` to `friend_id`.
    pub fn request(user_id: Uuid, friend_id: Uuid, now: DateTime<Utc>) -> Friendship {
        Friendship {
            id: Uuid::new_v4(),
            user_id,
            friend_id,
            status: FriendshipStatus::Pending,
            tier: Tier::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user_id: &Uuid) -> bool {
        self.user_id == *user_id || self.friend_id == *user_id
    }

    pub fn direction(&self, viewer: &Uuid) -> Option<Direction> {
        if self.user_id == *viewer {
            Some(Direction::Outgoing)
        } else if self.friend_id == *viewer {
            Some(Direction::Incoming)
        } else {
            None
        }
    }

    pub fn counterpart(&self, viewer: &Uuid) -> Option<Uuid> {
        match self.direction(viewer)? {
            Direction::Outgoing => Some(self.friend_id),
            Direction::Incoming => Some(self.user_id),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, FriendshipStatus::Pending | FriendshipStatus::Accepted)
    }

    /// Relation of `viewer` to the counterpart as described by this record.
    pub fn relation_state(&self, viewer: &Uuid) -> Option<RelationState> {
        match self.status {
            FriendshipStatus::Pending => self.direction(viewer).map(RelationState::Pending),
            FriendshipStatus::Accepted => self.direction(viewer).map(|_| RelationState::Accepted),
            FriendshipStatus::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub second_name: String,
    pub city: String,
}

/// A friendship as shown in a list owned by one user: the direction is
/// relative to that owner and the counterpart profile is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipView {
    #[serde(flatten)]
    pub friendship: Friendship,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub counterpart: Option<UserProfile>,
}

impl FriendshipView {
    pub fn new(friendship: Friendship, owner: &Uuid, counterpart: Option<UserProfile>) -> FriendshipView {
        FriendshipView {
            direction: friendship.direction(owner),
            friendship,
            counterpart,
        }
    }

    pub fn id(&self) -> Uuid {
        self.friendship.id
    }

    pub fn counterpart_id(&self, owner: &Uuid) -> Option<Uuid> {
        self.friendship.counterpart(owner)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    #[default]
    None,
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

/// Value of the per-counterpart status lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: RelationStatus,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub friendship: Option<FriendshipView>,
}

impl StatusEntry {
    pub fn none() -> StatusEntry {
        StatusEntry::default()
    }

    pub fn from_state(state: RelationState, friendship: Option<FriendshipView>) -> StatusEntry {
        StatusEntry {
            status: state.status(),
            direction: state.direction(),
            friendship,
        }
    }

    pub fn rejected(friendship: FriendshipView) -> StatusEntry {
        StatusEntry {
            status: RelationStatus::Rejected,
            direction: None,
            friendship: Some(friendship),
        }
    }

    /// `rejected` is terminal for the record, so the pair is back to `None`.
    pub fn relation_state(&self) -> RelationState {
        match (self.status, self.direction) {
            (RelationStatus::Pending, Some(direction)) => RelationState::Pending(direction),
            (RelationStatus::Accepted, _) => RelationState::Accepted,
            (RelationStatus::Blocked, Some(direction)) => RelationState::Blocked(direction),
            (RelationStatus::Blocked, None) => RelationState::Blocked(Direction::Outgoing),
            _ => RelationState::None,
        }
    }
}
