use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use friendship::{Friendship, FriendshipStatus, UserProfile};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FriendshipFilter, FriendshipStorage, SessionStorage, StorageError, UserStorage};
use crate::session::Session;
use crate::user::User;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, (User, String)>,
    sessions: HashMap<Uuid, Session>,
    friendships: HashMap<Uuid, Friendship>,
    blocks: HashSet<(Uuid, Uuid)>,
}

impl Tables {
    fn between(&self, a: &Uuid, b: &Uuid) -> Option<&Friendship> {
        self.friendships
            .values()
            .find(|f| f.involves(a) && f.involves(b))
    }
}

/// Process-local storage for development and tests.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

#[async_trait]
impl UserStorage for MemoryStorage {
    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id()) {
            return Err(StorageError::Duplicate);
        }
        tables
            .users
            .insert(user.id(), (user.clone(), password_hash.to_string()));
        Ok(())
    }

    async fn get_user(&self, id: &Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.tables.read().await.users.get(id).map(|(user, _)| user.clone()))
    }

    async fn get_password_hash(&self, id: &Uuid) -> Result<Option<String>, StorageError> {
        Ok(self.tables.read().await.users.get(id).map(|(_, hash)| hash.clone()))
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, StorageError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .map(|(user, _)| user.profile())
            .collect())
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, StorageError> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }
}

#[async_trait]
impl FriendshipStorage for MemoryStorage {
    async fn get_friendship(&self, id: &Uuid) -> Result<Option<Friendship>, StorageError> {
        Ok(self.tables.read().await.friendships.get(id).cloned())
    }

    async fn get_between(&self, a: &Uuid, b: &Uuid) -> Result<Option<Friendship>, StorageError> {
        Ok(self.tables.read().await.between(a, b).cloned())
    }

    async fn create_friendship(&self, friendship: &Friendship) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables
            .between(&friendship.user_id, &friendship.friend_id)
            .is_some()
        {
            return Err(StorageError::Duplicate);
        }
        tables.friendships.insert(friendship.id, friendship.clone());
        Ok(())
    }

    async fn update_friendship(&self, friendship: &Friendship) -> Result<(), StorageError> {
        if let Some(stored) = self.tables.write().await.friendships.get_mut(&friendship.id) {
            stored.status = friendship.status;
            stored.tier = friendship.tier.clone();
            stored.updated_at = friendship.updated_at;
        }
        Ok(())
    }

    async fn delete_friendship(&self, id: &Uuid) -> Result<bool, StorageError> {
        Ok(self.tables.write().await.friendships.remove(id).is_some())
    }

    async fn count_friendships(&self, filter: &FriendshipFilter) -> Result<u64, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.friendships.values().filter(|f| filter.matches(f)).count() as u64)
    }

    async fn list_friendships(
        &self,
        filter: &FriendshipFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Friendship>, StorageError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Friendship> = tables
            .friendships
            .values()
            .filter(|f| filter.matches(f))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn friend_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .friendships
            .values()
            .filter(|f| f.status == FriendshipStatus::Accepted)
            .filter_map(|f| f.counterpart(user_id))
            .collect())
    }

    async fn connected_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .friendships
            .values()
            .filter(|f| f.is_active())
            .filter_map(|f| f.counterpart(user_id))
            .collect())
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Friendship>, StorageError> {
        let mut tables = self.tables.write().await;
        let expired: Vec<Uuid> = tables
            .friendships
            .values()
            .filter(|f| f.status == FriendshipStatus::Pending && f.created_at < cutoff)
            .map(|f| f.id)
            .collect();
        Ok(expired
            .iter()
            .filter_map(|id| tables.friendships.remove(id))
            .collect())
    }

    async fn block(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<Option<Friendship>, StorageError> {
        let mut tables = self.tables.write().await;
        tables.blocks.insert((*blocker_id, *blocked_id));
        let removed = tables.between(blocker_id, blocked_id).map(|f| f.id);
        Ok(removed.and_then(|id| tables.friendships.remove(&id)))
    }

    async fn unblock(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError> {
        Ok(self
            .tables
            .write()
            .await
            .blocks
            .remove(&(*blocker_id, *blocked_id)))
    }

    async fn is_blocked(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .blocks
            .contains(&(*blocker_id, *blocked_id)))
    }

    async fn blocked_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .blocks
            .iter()
            .filter_map(|&(blocker, blocked)| {
                if blocker == *user_id {
                    Some(blocked)
                } else if blocked == *user_id {
                    Some(blocker)
                } else {
                    None
                }
            })
            .collect())
    }
}
