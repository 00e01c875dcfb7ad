use async_trait::async_trait;
use chrono::{DateTime, Utc};
use friendship::{Friendship, FriendshipStatus, TierKind, UserProfile};
use uuid::Uuid;

use crate::session::Session;
use crate::user::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record already exists")]
    Duplicate,

    #[error("unable to get postgres client: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Which friendships a paginated listing selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendshipFilter {
    /// Pending requests addressed to the user.
    Incoming(Uuid),
    /// Pending requests sent by the user.
    Outgoing(Uuid),
    Accepted(Uuid),
    AcceptedWithTier(Uuid, TierKind),
    /// Accepted friendships of the user whose counterpart is in the list.
    AcceptedWith(Uuid, Vec<Uuid>),
}

impl FriendshipFilter {
    pub fn matches(&self, friendship: &Friendship) -> bool {
        let accepted = friendship.status == FriendshipStatus::Accepted;
        let pending = friendship.status == FriendshipStatus::Pending;
        match self {
            FriendshipFilter::Incoming(user_id) => pending && friendship.friend_id == *user_id,
            FriendshipFilter::Outgoing(user_id) => pending && friendship.user_id == *user_id,
            FriendshipFilter::Accepted(user_id) => accepted && friendship.involves(user_id),
            FriendshipFilter::AcceptedWithTier(user_id, tier) => {
                accepted && friendship.involves(user_id) && friendship.tier.kind == *tier
            }
            FriendshipFilter::AcceptedWith(user_id, others) => {
                accepted
                    && friendship
                        .counterpart(user_id)
                        .is_some_and(|counterpart| others.contains(&counterpart))
            }
        }
    }
}

#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), StorageError>;
    async fn get_user(&self, id: &Uuid) -> Result<Option<User>, StorageError>;
    async fn get_password_hash(&self, id: &Uuid) -> Result<Option<String>, StorageError>;
    /// Unknown ids are skipped.
    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, StorageError>;
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError>;
    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, StorageError>;
}

#[async_trait]
pub trait FriendshipStorage: Send + Sync {
    async fn get_friendship(&self, id: &Uuid) -> Result<Option<Friendship>, StorageError>;
    /// The record of the unordered pair, whichever side sent it.
    async fn get_between(&self, a: &Uuid, b: &Uuid) -> Result<Option<Friendship>, StorageError>;
    /// Fails with [`StorageError::Duplicate`] when the pair already has a record.
    async fn create_friendship(&self, friendship: &Friendship) -> Result<(), StorageError>;
    /// Persists status, tier and `updated_at`.
    async fn update_friendship(&self, friendship: &Friendship) -> Result<(), StorageError>;
    async fn delete_friendship(&self, id: &Uuid) -> Result<bool, StorageError>;
    async fn count_friendships(&self, filter: &FriendshipFilter) -> Result<u64, StorageError>;
    /// Newest first, ties broken by id.
    async fn list_friendships(
        &self,
        filter: &FriendshipFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Friendship>, StorageError>;
    async fn friend_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError>;
    /// Counterparts of every pending or accepted record of the user.
    async fn connected_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError>;
    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Friendship>, StorageError>;

    /// Records the block and deletes the pair's friendship, returning it.
    async fn block(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<Option<Friendship>, StorageError>;
    async fn unblock(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError>;
    async fn is_blocked(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError>;
    /// Users blocked by or blocking `user_id`.
    async fn blocked_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError>;
}

pub trait Storage: FriendshipStorage + UserStorage + SessionStorage {}

impl<T: FriendshipStorage + UserStorage + SessionStorage> Storage for T {}
