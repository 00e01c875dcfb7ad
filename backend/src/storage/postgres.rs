use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use friendship::{Friendship, FriendshipStatus, Tier, UserProfile};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use super::{FriendshipFilter, FriendshipStorage, SessionStorage, StorageError, UserStorage};
use crate::session::Session;
use crate::user::User;

const FRIENDSHIP_COLUMNS: &str =
    "id, user_id, friend_id, status, tier, custom_tier, created_at, updated_at";

fn map_err(err: tokio_postgres::Error) -> StorageError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StorageError::Duplicate
    } else {
        StorageError::Postgres(err)
    }
}

fn friendship_from_row(row: &Row) -> Result<Friendship, StorageError> {
    let status: String = row.get(3);
    let tier: String = row.get(4);
    let custom_tier: Option<String> = row.get(5);
    Ok(Friendship {
        id: row.get(0),
        user_id: row.get(1),
        friend_id: row.get(2),
        status: status
            .parse::<FriendshipStatus>()
            .map_err(|err| StorageError::Corrupt(err.to_string()))?,
        tier: Tier {
            kind: tier
                .parse()
                .map_err(|err: friendship::ValidationError| StorageError::Corrupt(err.to_string()))?,
            custom_label: custom_tier,
        },
        created_at: row.get(6),
        updated_at: row.get(7),
    })
}

fn friendships_from_rows(rows: Vec<Row>) -> Result<Vec<Friendship>, StorageError> {
    rows.iter().map(friendship_from_row).collect()
}

fn user_from_row(row: &Row) -> User {
    User::from_parts(
        row.get(0),
        row.get(1),
        row.get(2),
        row.get(3),
        row.get(4),
        row.get(5),
    )
}

/// `WHERE` clause of a filter and its parameters, numbered from `$1`.
fn filter_clause(filter: &FriendshipFilter) -> (&'static str, Vec<&(dyn ToSql + Sync)>) {
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let clause = match filter {
        FriendshipFilter::Incoming(user_id) => {
            params.push(user_id);
            "status = 'pending' AND friend_id = $1"
        }
        FriendshipFilter::Outgoing(user_id) => {
            params.push(user_id);
            "status = 'pending' AND user_id = $1"
        }
        FriendshipFilter::Accepted(user_id) => {
            params.push(user_id);
            "status = 'accepted' AND (user_id = $1 OR friend_id = $1)"
        }
        FriendshipFilter::AcceptedWithTier(user_id, tier) => {
            params.push(user_id);
            params.push(tier_param(tier));
            "status = 'accepted' AND (user_id = $1 OR friend_id = $1) AND tier = $2"
        }
        FriendshipFilter::AcceptedWith(user_id, others) => {
            params.push(user_id);
            params.push(others);
            "status = 'accepted' AND ((user_id = $1 AND friend_id = ANY($2)) OR (friend_id = $1 AND user_id = ANY($2)))"
        }
    };
    (clause, params)
}

fn tier_param(tier: &friendship::TierKind) -> &'static (dyn ToSql + Sync) {
    match tier {
        friendship::TierKind::CloseFriends => &"close_friends",
        friendship::TierKind::Acquaintances => &"acquaintances",
        friendship::TierKind::Family => &"family",
        friendship::TierKind::Work => &"work",
        friendship::TierKind::Custom => &"custom",
    }
}

pub struct PostgresStorage {
    pool: Pool,
}

impl PostgresStorage {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn query_ids(&self, sql: &str, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(sql).await?;
        let rows = client.query(&stmt, &[user_id]).await?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

#[async_trait]
impl UserStorage for PostgresStorage {
    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "INSERT INTO users (id, first_name, second_name, birthdate, biography, city, password_hash) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ).await?;

        client.execute(
            &stmt,
            &[&user.id(), &user.first_name(), &user.second_name(), user.birthdate(), &user.biography(), &user.city(), &password_hash]
        ).await.map_err(map_err)?;

        Ok(())
    }

    async fn get_user(&self, id: &Uuid) -> Result<Option<User>, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "SELECT id, first_name, second_name, birthdate, biography, city FROM users WHERE id = $1"
        ).await?;
        let row = client.query_opt(&stmt, &[id]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_password_hash(&self, id: &Uuid) -> Result<Option<String>, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached("SELECT password_hash FROM users WHERE id = $1").await?;
        let row = client.query_opt(&stmt, &[id]).await?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "SELECT id, first_name, second_name, city FROM users WHERE id = ANY($1)"
        ).await?;
        let ids = ids.to_vec();
        let rows = client.query(&stmt, &[&ids]).await?;
        Ok(rows
            .into_iter()
            .map(|row| UserProfile {
                id: row.get(0),
                first_name: row.get(1),
                second_name: row.get(2),
                city: row.get(3),
            })
            .collect())
    }
}

#[async_trait]
impl SessionStorage for PostgresStorage {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "INSERT INTO sessions (id, user_id, data, created_at) VALUES ($1, $2, $3, $4)"
        ).await?;

        client.execute(
            &stmt,
            &[&session.id(), &session.user_id(), session.data(), &session.created_at()]
        ).await.map_err(map_err)?;

        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "SELECT id, user_id, data, created_at FROM sessions WHERE id = $1"
        ).await?;
        let row = client.query_opt(&stmt, &[id]).await?;
        Ok(row.map(|row| Session::from_parts(row.get(0), row.get(1), row.get(2), row.get(3))))
    }
}

#[async_trait]
impl FriendshipStorage for PostgresStorage {
    async fn get_friendship(&self, id: &Uuid) -> Result<Option<Friendship>, StorageError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {} FROM friendships WHERE id = $1", FRIENDSHIP_COLUMNS);
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[id]).await?;
        row.as_ref().map(friendship_from_row).transpose()
    }

    async fn get_between(&self, a: &Uuid, b: &Uuid) -> Result<Option<Friendship>, StorageError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM friendships WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)",
            FRIENDSHIP_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[a, b]).await?;
        row.as_ref().map(friendship_from_row).transpose()
    }

    async fn create_friendship(&self, friendship: &Friendship) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "INSERT INTO friendships (id, user_id, friend_id, status, tier, custom_tier, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ).await?;

        client.execute(
            &stmt,
            &[
                &friendship.id,
                &friendship.user_id,
                &friendship.friend_id,
                &friendship.status.as_str(),
                &friendship.tier.kind.as_str(),
                &friendship.tier.custom_label,
                &friendship.created_at,
                &friendship.updated_at,
            ]
        ).await.map_err(map_err)?;

        Ok(())
    }

    async fn update_friendship(&self, friendship: &Friendship) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "UPDATE friendships SET status = $2, tier = $3, custom_tier = $4, updated_at = $5 WHERE id = $1"
        ).await?;

        client.execute(
            &stmt,
            &[
                &friendship.id,
                &friendship.status.as_str(),
                &friendship.tier.kind.as_str(),
                &friendship.tier.custom_label,
                &friendship.updated_at,
            ]
        ).await.map_err(map_err)?;

        Ok(())
    }

    async fn delete_friendship(&self, id: &Uuid) -> Result<bool, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached("DELETE FROM friendships WHERE id = $1").await?;
        Ok(client.execute(&stmt, &[id]).await? > 0)
    }

    async fn count_friendships(&self, filter: &FriendshipFilter) -> Result<u64, StorageError> {
        let (clause, params) = filter_clause(filter);
        let client = self.pool.get().await?;
        let sql = format!("SELECT COUNT(*) FROM friendships WHERE {}", clause);
        let stmt = client.prepare_cached(&sql).await?;
        let count: i64 = client.query_one(&stmt, &params).await?.get(0);
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list_friendships(
        &self,
        filter: &FriendshipFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Friendship>, StorageError> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::from(limit);
        let (clause, mut params) = filter_clause(filter);
        let sql = format!(
            "SELECT {} FROM friendships WHERE {} ORDER BY created_at DESC, id LIMIT ${} OFFSET ${}",
            FRIENDSHIP_COLUMNS,
            clause,
            params.len() + 1,
            params.len() + 2
        );
        params.push(&limit);
        params.push(&offset);

        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(&sql).await?;
        friendships_from_rows(client.query(&stmt, &params).await?)
    }

    async fn friend_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        self.query_ids(
            "SELECT CASE WHEN user_id = $1 THEN friend_id ELSE user_id END FROM friendships WHERE status = 'accepted' AND (user_id = $1 OR friend_id = $1)",
            user_id,
        ).await
    }

    async fn connected_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        self.query_ids(
            "SELECT CASE WHEN user_id = $1 THEN friend_id ELSE user_id END FROM friendships WHERE status IN ('pending', 'accepted') AND (user_id = $1 OR friend_id = $1)",
            user_id,
        ).await
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Friendship>, StorageError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "DELETE FROM friendships WHERE status = 'pending' AND created_at < $1 RETURNING {}",
            FRIENDSHIP_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        friendships_from_rows(client.query(&stmt, &[&cutoff]).await?)
    }

    async fn block(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<Option<Friendship>, StorageError> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        let stmt = transaction.prepare_cached(
            "INSERT INTO user_blocks (blocker_id, blocked_id, created_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING"
        ).await?;
        transaction.execute(&stmt, &[blocker_id, blocked_id]).await?;

        let sql = format!(
            "DELETE FROM friendships WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1) RETURNING {}",
            FRIENDSHIP_COLUMNS
        );
        let stmt = transaction.prepare_cached(&sql).await?;
        let removed = transaction.query_opt(&stmt, &[blocker_id, blocked_id]).await?;

        transaction.commit().await?;
        removed.as_ref().map(friendship_from_row).transpose()
    }

    async fn unblock(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "DELETE FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2"
        ).await?;
        Ok(client.execute(&stmt, &[blocker_id, blocked_id]).await? > 0)
    }

    async fn is_blocked(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool, StorageError> {
        let client = self.pool.get().await?;
        let stmt = client.prepare_cached(
            "SELECT 1 FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2"
        ).await?;
        Ok(client.query_opt(&stmt, &[blocker_id, blocked_id]).await?.is_some())
    }

    async fn blocked_ids(&self, user_id: &Uuid) -> Result<Vec<Uuid>, StorageError> {
        self.query_ids(
            "SELECT CASE WHEN blocker_id = $1 THEN blocked_id ELSE blocker_id END FROM user_blocks WHERE blocker_id = $1 OR blocked_id = $1",
            user_id,
        ).await
    }
}
