//! Relationship state machine for one unordered pair of users, seen from the
//! acting user.

use serde::{Deserialize, Serialize};

use crate::model::{Direction, RelationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationState {
    None,
    Pending(Direction),
    Accepted,
    Blocked(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Send,
    Accept,
    Reject,
    Cancel,
    Remove,
    UpdateTier,
    Block,
    Unblock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("friend request already exists")]
    AlreadyPending,
    #[error("users are already friends")]
    AlreadyFriends,
    #[error("relationship is blocked")]
    Blocked,
    #[error("only the recipient can answer a friend request")]
    NotRequestRecipient,
    #[error("only the sender can cancel a friend request")]
    NotRequestSender,
    #[error("friend request is not pending")]
    NotPending,
    #[error("not an accepted friendship")]
    NotFriends,
    #[error("user is not blocked")]
    NotBlocked,
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        if self.is_forbidden() {
            "forbidden"
        } else {
            "conflict"
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            TransitionError::Blocked
                | TransitionError::NotRequestRecipient
                | TransitionError::NotRequestSender
        )
    }
}

impl RelationState {
    pub fn apply(self, action: Action) -> Result<RelationState, TransitionError> {
        use Direction::{Incoming, Outgoing};
        use RelationState::*;

        match (self, action) {
            (_, Action::Block) => Ok(Blocked(Outgoing)),

            (None, Action::Send) => Ok(Pending(Outgoing)),
            (Pending(_), Action::Send) => Err(TransitionError::AlreadyPending),
            (Accepted, Action::Send) => Err(TransitionError::AlreadyFriends),
            (Blocked(_), Action::Send) => Err(TransitionError::Blocked),

            (Pending(Incoming), Action::Accept) => Ok(Accepted),
            (Pending(Incoming), Action::Reject) => Ok(None),
            (Pending(Outgoing), Action::Accept | Action::Reject) => {
                Err(TransitionError::NotRequestRecipient)
            }
            (_, Action::Accept | Action::Reject) => Err(TransitionError::NotPending),

            (Pending(Outgoing), Action::Cancel) => Ok(None),
            (Pending(Incoming), Action::Cancel) => Err(TransitionError::NotRequestSender),
            (_, Action::Cancel) => Err(TransitionError::NotPending),

            (Accepted, Action::Remove) => Ok(None),
            (Accepted, Action::UpdateTier) => Ok(Accepted),
            (_, Action::Remove | Action::UpdateTier) => Err(TransitionError::NotFriends),

            (Blocked(Outgoing), Action::Unblock) => Ok(None),
            (_, Action::Unblock) => Err(TransitionError::NotBlocked),
        }
    }

    pub fn status(&self) -> RelationStatus {
        match self {
            RelationState::None => RelationStatus::None,
            RelationState::Pending(_) => RelationStatus::Pending,
            RelationState::Accepted => RelationStatus::Accepted,
            RelationState::Blocked(_) => RelationStatus::Blocked,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            RelationState::Pending(direction) | RelationState::Blocked(direction) => Some(*direction),
            _ => Option::None,
        }
    }
}
