//! Friendship rules on top of storage, the status cache and the event
//! publisher.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use friendship::{
    Action, Friendship, FriendshipStatus, FriendshipView, PageRequest, Paginated, Pagination,
    RelationState, StatusEntry, Tier, TierKind, TransitionError, UserProfile, ValidationError,
};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_SUGGESTIONS_LIMIT, MAX_SUGGESTIONS_LIMIT};
use crate::errors::ServiceError;
use crate::events::{EventKind, EventPublisher, FriendshipEvent};
use crate::session::Session;
use crate::status_cache::StatusCache;
use crate::storage::{FriendshipFilter, Storage, StorageError};
use crate::user::{self, User, UserRegisterPayload};

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub request_ttl: Duration,
    pub suggestions_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            request_ttl: Duration::days(30),
            suggestions_limit: DEFAULT_SUGGESTIONS_LIMIT,
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        ServiceSettings {
            request_ttl: Duration::days(i64::from(config.friend_request_ttl_days)),
            suggestions_limit: config.suggestions_limit,
        }
    }
}

pub fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ValidationError::new(format!("'{}' is not a valid id", value)).into())
}

pub struct FriendshipService {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn StatusCache>,
    events: Arc<dyn EventPublisher>,
    settings: ServiceSettings,
}

impl FriendshipService {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn StatusCache>,
        events: Arc<dyn EventPublisher>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            storage,
            cache,
            events,
            settings,
        }
    }

    pub async fn register(&self, payload: UserRegisterPayload) -> Result<Uuid> {
        user::validate_password(&payload.password)?;
        let user = User::new(
            &payload.first_name,
            &payload.second_name,
            &payload.birthdate,
            &payload.biography,
            &payload.city,
        )?;
        let password_hash = user::hash_password(&payload.password)
            .map_err(|err| ServiceError::Internal(format!("unable to hash password: {}", err)))?;

        match self.storage.create_user(&user, &password_hash).await {
            Ok(()) => Ok(user.id()),
            Err(StorageError::Duplicate) => Err(ServiceError::Conflict("user already exists".to_string())),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the new session id to use as a bearer token.
    pub async fn login(&self, user_id: &str, password: &str) -> Result<Uuid> {
        let user_id = Uuid::parse_str(user_id).map_err(|_| ServiceError::Unauthorized)?;
        let password_hash = self
            .storage
            .get_password_hash(&user_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;
        if !user::verify_password(password, &password_hash) {
            log::debug!("unable to authenticate user {}", user_id);
            return Err(ServiceError::Unauthorized);
        }

        let session = Session::new(user_id, serde_json::json!({}));
        self.storage.create_session(&session).await?;
        Ok(session.id())
    }

    pub async fn authenticate(&self, token: &str) -> Result<Uuid> {
        let session_id = Uuid::parse_str(token).map_err(|_| ServiceError::Unauthorized)?;
        match self.storage.get_session(&session_id).await? {
            Some(session) => Ok(session.user_id()),
            None => Err(ServiceError::Unauthorized),
        }
    }

    pub async fn get_user(&self, id: &Uuid) -> Result<User> {
        self.storage
            .get_user(id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    async fn ensure_user(&self, id: &Uuid) -> Result<()> {
        self.get_user(id).await.map(|_| ())
    }

    /// Relation of `viewer` to `other`: blocks take precedence over the record.
    async fn relation(&self, viewer: &Uuid, other: &Uuid) -> Result<(RelationState, Option<Friendship>)> {
        if self.storage.is_blocked(viewer, other).await? {
            return Ok((RelationState::Blocked(friendship::Direction::Outgoing), None));
        }
        if self.storage.is_blocked(other, viewer).await? {
            return Ok((RelationState::Blocked(friendship::Direction::Incoming), None));
        }
        let friendship = self.storage.get_between(viewer, other).await?;
        let state = friendship
            .as_ref()
            .and_then(|f| f.relation_state(viewer))
            .unwrap_or(RelationState::None);
        Ok((state, friendship))
    }

    /// The friendship with `id` if `viewer` takes part in it.
    async fn participant_friendship(&self, viewer: &Uuid, id: &Uuid) -> Result<Friendship> {
        match self.storage.get_friendship(id).await? {
            Some(friendship) if friendship.involves(viewer) => Ok(friendship),
            _ => Err(ServiceError::NotFound("friendship")),
        }
    }

    async fn invalidate(&self, a: &Uuid, b: &Uuid) {
        if let Err(err) = self.cache.invalidate_pair(a, b).await {
            log::warn!("unable to invalidate cached status: {}", err);
        }
    }

    async fn emit(&self, event: FriendshipEvent) {
        if let Err(err) = self.events.publish(&event).await {
            log::warn!("unable to publish {:?} event: {}", event.kind, err);
        }
    }

    /// Invalidates the pair and publishes the change.
    async fn changed(&self, kind: EventKind, actor: &Uuid, target: &Uuid, friendship: Option<&Friendship>) {
        self.invalidate(actor, target).await;
        self.emit(FriendshipEvent::new(kind, Some(*actor), *target, friendship.cloned()))
            .await;
    }

    async fn view(&self, friendship: Friendship, owner: &Uuid) -> Result<FriendshipView> {
        let mut views = self.enrich(owner, vec![friendship]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::Internal("enrichment dropped a record".to_string()))
    }

    async fn enrich(&self, owner: &Uuid, friendships: Vec<Friendship>) -> Result<Vec<FriendshipView>> {
        let ids: Vec<Uuid> = friendships
            .iter()
            .filter_map(|f| f.counterpart(owner))
            .collect();
        let profiles: HashMap<Uuid, UserProfile> = self
            .storage
            .get_profiles(&ids)
            .await?
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect();

        Ok(friendships
            .into_iter()
            .map(|f| {
                let counterpart = f.counterpart(owner).and_then(|id| profiles.get(&id).cloned());
                FriendshipView::new(f, owner, counterpart)
            })
            .collect())
    }

    pub async fn send_request(&self, viewer: &Uuid, friend_id: &Uuid) -> Result<FriendshipView> {
        if viewer == friend_id {
            return Err(ValidationError::new("cannot send a friend request to yourself").into());
        }
        self.ensure_user(friend_id).await?;
        let (state, _) = self.relation(viewer, friend_id).await?;
        state.apply(Action::Send)?;

        let friendship = Friendship::request(*viewer, *friend_id, Utc::now());
        match self.storage.create_friendship(&friendship).await {
            Ok(()) => {}
            Err(StorageError::Duplicate) => return Err(TransitionError::AlreadyPending.into()),
            Err(err) => return Err(err.into()),
        }
        log::debug!("friend request {} from {} to {}", friendship.id, viewer, friend_id);

        self.changed(EventKind::RequestSent, viewer, friend_id, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    pub async fn accept_request(&self, viewer: &Uuid, id: &Uuid) -> Result<FriendshipView> {
        let mut friendship = self.participant_friendship(viewer, id).await?;
        current_state(&friendship, viewer).apply(Action::Accept)?;

        friendship.status = FriendshipStatus::Accepted;
        friendship.updated_at = Utc::now();
        self.storage.update_friendship(&friendship).await?;

        self.changed(EventKind::RequestAccepted, viewer, &friendship.user_id, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    /// The record is deleted; the response carries it marked as rejected.
    pub async fn reject_request(&self, viewer: &Uuid, id: &Uuid) -> Result<FriendshipView> {
        let mut friendship = self.participant_friendship(viewer, id).await?;
        current_state(&friendship, viewer).apply(Action::Reject)?;

        self.storage.delete_friendship(id).await?;
        friendship.status = FriendshipStatus::Rejected;
        friendship.updated_at = Utc::now();

        self.changed(EventKind::RequestRejected, viewer, &friendship.user_id, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    pub async fn cancel_request(&self, viewer: &Uuid, id: &Uuid) -> Result<FriendshipView> {
        let friendship = self.participant_friendship(viewer, id).await?;
        current_state(&friendship, viewer).apply(Action::Cancel)?;

        self.storage.delete_friendship(id).await?;

        self.changed(EventKind::RequestCancelled, viewer, &friendship.friend_id, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    pub async fn remove_friend(&self, viewer: &Uuid, id: &Uuid) -> Result<FriendshipView> {
        let friendship = self.participant_friendship(viewer, id).await?;
        current_state(&friendship, viewer).apply(Action::Remove)?;

        self.storage.delete_friendship(id).await?;

        let counterpart = friendship.counterpart(viewer).unwrap_or(friendship.friend_id);
        self.changed(EventKind::FriendRemoved, viewer, &counterpart, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    pub async fn update_tier(&self, viewer: &Uuid, id: &Uuid, tier: Tier) -> Result<FriendshipView> {
        tier.validate()?;
        let mut friendship = self.participant_friendship(viewer, id).await?;
        current_state(&friendship, viewer).apply(Action::UpdateTier)?;

        friendship.tier = tier;
        friendship.updated_at = Utc::now();
        self.storage.update_friendship(&friendship).await?;

        let counterpart = friendship.counterpart(viewer).unwrap_or(friendship.friend_id);
        self.changed(EventKind::TierUpdated, viewer, &counterpart, Some(&friendship))
            .await;
        self.view(friendship, viewer).await
    }

    pub async fn block_user(&self, viewer: &Uuid, target: &Uuid) -> Result<()> {
        if viewer == target {
            return Err(ValidationError::new("cannot block yourself").into());
        }
        self.ensure_user(target).await?;

        let removed = self.storage.block(viewer, target).await?;
        if let Some(friendship) = &removed {
            log::debug!("block of {} by {} removed friendship {}", target, viewer, friendship.id);
        }
        self.changed(EventKind::UserBlocked, viewer, target, removed.as_ref())
            .await;
        Ok(())
    }

    pub async fn unblock_user(&self, viewer: &Uuid, target: &Uuid) -> Result<()> {
        let (state, _) = self.relation(viewer, target).await?;
        state.apply(Action::Unblock)?;

        self.storage.unblock(viewer, target).await?;
        self.changed(EventKind::UserUnblocked, viewer, target, None).await;
        Ok(())
    }

    async fn page(&self, owner: &Uuid, filter: FriendshipFilter, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        let total = self.storage.count_friendships(&filter).await?;
        let pagination = Pagination::new(page.page, page.limit, total);
        let friendships = self
            .storage
            .list_friendships(&filter, pagination.offset(page.limit), page.limit)
            .await?;
        let data = self.enrich(owner, friendships).await?;
        Ok(Paginated::new(data, pagination))
    }

    pub async fn pending_requests(&self, viewer: &Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(viewer, FriendshipFilter::Incoming(*viewer), page).await
    }

    pub async fn sent_requests(&self, viewer: &Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(viewer, FriendshipFilter::Outgoing(*viewer), page).await
    }

    /// Views are relative to `user_id`, the owner of the list.
    pub async fn friends(&self, user_id: &Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(user_id, FriendshipFilter::Accepted(*user_id), page).await
    }

    pub async fn mutual_friends(&self, viewer: &Uuid, other: &Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let others_friends = self.storage.friend_ids(other).await?;
        self.page(viewer, FriendshipFilter::AcceptedWith(*viewer, others_friends), page)
            .await
    }

    pub async fn friends_by_tier(&self, viewer: &Uuid, tier: TierKind, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(viewer, FriendshipFilter::AcceptedWithTier(*viewer, tier), page)
            .await
    }

    /// Friends of friends ranked by the number of mutual friends.
    pub async fn suggestions(&self, viewer: &Uuid, limit: Option<u32>) -> Result<Vec<UserProfile>> {
        let limit = limit
            .map(|limit| limit as usize)
            .unwrap_or(self.settings.suggestions_limit)
            .clamp(1, MAX_SUGGESTIONS_LIMIT);

        let mut excluded: HashSet<Uuid> = self.storage.connected_ids(viewer).await?.into_iter().collect();
        excluded.extend(self.storage.blocked_ids(viewer).await?);
        excluded.insert(*viewer);

        let mut mutual_counts: HashMap<Uuid, usize> = HashMap::new();
        for friend in self.storage.friend_ids(viewer).await? {
            for candidate in self.storage.friend_ids(&friend).await? {
                if !excluded.contains(&candidate) {
                    *mutual_counts.entry(candidate).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(Uuid, usize)> = mutual_counts.into_iter().collect();
        ranked.sort_by_key(|&(id, count)| (Reverse(count), id));
        ranked.truncate(limit);

        let ids: Vec<Uuid> = ranked.iter().map(|&(id, _)| id).collect();
        let mut profiles: HashMap<Uuid, UserProfile> = self
            .storage
            .get_profiles(&ids)
            .await?
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect();
        Ok(ids.iter().filter_map(|id| profiles.remove(id)).collect())
    }

    pub async fn status(&self, viewer: &Uuid, other: &Uuid) -> Result<StatusEntry> {
        if viewer == other {
            return Ok(StatusEntry::none());
        }
        match self.cache.get(viewer, other).await {
            Ok(Some(entry)) => return Ok(entry),
            Ok(None) => {}
            Err(err) => log::warn!("status cache is unavailable: {}", err),
        }

        let (state, friendship) = self.relation(viewer, other).await?;
        let view = match friendship {
            Some(friendship) => Some(self.view(friendship, viewer).await?),
            None => None,
        };
        let entry = StatusEntry::from_state(state, view);

        if let Err(err) = self.cache.set(viewer, other, &entry).await {
            log::warn!("unable to cache status: {}", err);
        }
        Ok(entry)
    }

    /// Deletes pending requests older than the configured time to live.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.settings.request_ttl;
        let removed = self.storage.delete_pending_created_before(cutoff).await?;
        log::info!("removed {} friend requests created before {}", removed.len(), cutoff);

        for friendship in &removed {
            self.invalidate(&friendship.user_id, &friendship.friend_id).await;
            self.emit(FriendshipEvent::new(
                EventKind::RequestsExpired,
                None,
                friendship.friend_id,
                Some(friendship.clone()),
            ))
            .await;
        }
        Ok(removed.len() as u64)
    }
}

fn current_state(friendship: &Friendship, viewer: &Uuid) -> RelationState {
    friendship
        .relation_state(viewer)
        .unwrap_or(RelationState::None)
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use friendship::{Direction, RelationStatus};

    use super::*;
    use crate::events::MemoryPublisher;
    use crate::status_cache::MemoryStatusCache;
    use crate::storage::{FriendshipStorage, MemoryStorage, SessionStorage, UserStorage};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        events: Arc<MemoryPublisher>,
        service: FriendshipService,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let events = Arc::new(MemoryPublisher::new());
            let service = FriendshipService::new(
                storage.clone(),
                Arc::new(MemoryStatusCache::new(StdDuration::from_secs(60))),
                events.clone(),
                ServiceSettings::default(),
            );
            Self { storage, events, service }
        }

        async fn user(&self, name: &str) -> Uuid {
            let user = User::new(name, "Tester", "1990-01-01", "", "Paris").unwrap();
            self.storage.create_user(&user, "unused").await.unwrap();
            user.id()
        }

        async fn friends(&self, a: &Uuid, b: &Uuid) {
            let request = self.service.send_request(a, b).await.unwrap();
            self.service.accept_request(b, &request.id()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn request_lifecycle_updates_status() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("Alice").await, fx.user("Bob").await);

        let sent = fx.service.send_request(&a, &b).await.unwrap();
        assert_eq!(sent.direction, Some(Direction::Outgoing));
        assert_eq!(sent.counterpart.as_ref().map(|p| p.id), Some(b));

        let status = fx.service.status(&b, &a).await.unwrap();
        assert_eq!(status.status, RelationStatus::Pending);
        assert_eq!(status.direction, Some(Direction::Incoming));

        let accepted = fx.service.accept_request(&b, &sent.id()).await.unwrap();
        assert_eq!(accepted.id(), sent.id());
        assert_eq!(accepted.friendship.status, FriendshipStatus::Accepted);
        // the cached pending entry was invalidated
        let status = fx.service.status(&b, &a).await.unwrap();
        assert_eq!(status.status, RelationStatus::Accepted);
        assert_eq!(status.direction, None);

        assert_eq!(
            fx.events.kinds().await,
            vec![EventKind::RequestSent, EventKind::RequestAccepted]
        );
    }

    #[tokio::test]
    async fn only_participants_see_a_friendship() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("A").await, fx.user("B").await, fx.user("C").await);
        let sent = fx.service.send_request(&a, &b).await.unwrap();

        let err = fx.service.accept_request(&c, &sent.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("friendship")));
        let err = fx.service.accept_request(&a, &sent.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::NotRequestRecipient)));
        let err = fx.service.cancel_request(&b, &sent.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::NotRequestSender)));
    }

    #[tokio::test]
    async fn reverse_request_conflicts_with_pending_one() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("A").await, fx.user("B").await);
        fx.service.send_request(&a, &b).await.unwrap();

        let err = fx.service.send_request(&b, &a).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::AlreadyPending)));
        let err = fx.service.send_request(&a, &a).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = fx.service.send_request(&a, &Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("user")));
    }

    #[tokio::test]
    async fn removal_is_open_to_either_friend_once() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("A").await, fx.user("B").await);
        let sent = fx.service.send_request(&a, &b).await.unwrap();

        let err = fx.service.remove_friend(&a, &sent.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::NotFriends)));

        fx.service.accept_request(&b, &sent.id()).await.unwrap();
        let removed = fx.service.remove_friend(&b, &sent.id()).await.unwrap();
        assert_eq!(removed.counterpart_id(&b), Some(a));
        assert!(fx.storage.get_friendship(&sent.id()).await.unwrap().is_none());

        let err = fx.service.remove_friend(&a, &sent.id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("friendship")));
        assert_eq!(fx.events.kinds().await.last(), Some(&EventKind::FriendRemoved));
    }

    #[tokio::test]
    async fn block_deletes_friendship_and_prevents_requests() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("A").await, fx.user("B").await);
        fx.friends(&a, &b).await;

        fx.service.block_user(&b, &a).await.unwrap();
        assert!(fx.storage.get_between(&a, &b).await.unwrap().is_none());

        let err = fx.service.send_request(&a, &b).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::Blocked)));
        // only the blocker can lift the block
        let err = fx.service.unblock_user(&a, &b).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transition(TransitionError::NotBlocked)));

        let status = fx.service.status(&a, &b).await.unwrap();
        assert_eq!(status.status, RelationStatus::Blocked);
        assert_eq!(status.direction, Some(Direction::Incoming));

        fx.service.unblock_user(&b, &a).await.unwrap();
        assert_eq!(fx.service.status(&a, &b).await.unwrap().status, RelationStatus::None);
        fx.service.send_request(&a, &b).await.unwrap();
    }

    #[tokio::test]
    async fn tiers_are_validated_and_listed() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("A").await, fx.user("B").await, fx.user("C").await);
        fx.friends(&a, &b).await;
        fx.friends(&a, &c).await;
        let with_b = fx.storage.get_between(&a, &b).await.unwrap().unwrap();

        let tier = Tier::new(TierKind::Custom, Some("climbing")).unwrap();
        let updated = fx.service.update_tier(&a, &with_b.id, tier.clone()).await.unwrap();
        assert_eq!(updated.friendship.tier, tier);

        let custom = fx
            .service
            .friends_by_tier(&a, TierKind::Custom, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(custom.data.len(), 1);
        assert_eq!(custom.data[0].counterpart_id(&a), Some(b));
        let acquaintances = fx
            .service
            .friends_by_tier(&a, TierKind::Acquaintances, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(acquaintances.pagination.total_items, 1);

        let invalid = Tier {
            kind: TierKind::Family,
            custom_label: Some("cousins".to_string()),
        };
        assert!(matches!(
            fx.service.update_tier(&a, &with_b.id, invalid).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn suggestions_rank_friends_of_friends() {
        let fx = Fixture::new();
        let me = fx.user("Me").await;
        let (b, c) = (fx.user("B").await, fx.user("C").await);
        let (d, e, blocked) = (fx.user("D").await, fx.user("E").await, fx.user("X").await);
        fx.friends(&me, &b).await;
        fx.friends(&me, &c).await;
        fx.friends(&b, &d).await;
        fx.friends(&c, &d).await;
        fx.friends(&c, &e).await;
        fx.friends(&b, &blocked).await;
        fx.friends(&b, &c).await;
        fx.service.block_user(&blocked, &me).await.unwrap();

        let suggestions = fx.service.suggestions(&me, None).await.unwrap();
        let ids: Vec<Uuid> = suggestions.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![d, e]);

        let limited = fx.service.suggestions(&me, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, d);
    }

    #[tokio::test]
    async fn mutual_friends_are_views_of_the_viewer() {
        let fx = Fixture::new();
        let (a, b, c, d) = (fx.user("A").await, fx.user("B").await, fx.user("C").await, fx.user("D").await);
        fx.friends(&a, &c).await;
        fx.friends(&b, &c).await;
        fx.friends(&a, &d).await;

        let mutual = fx.service.mutual_friends(&a, &b, PageRequest::default()).await.unwrap();
        assert_eq!(mutual.data.len(), 1);
        assert_eq!(mutual.data[0].counterpart_id(&a), Some(c));
        assert_eq!(mutual.data[0].counterpart.as_ref().map(|p| p.first_name.as_str()), Some("C"));
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_requests() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("A").await, fx.user("B").await, fx.user("C").await);
        let old = Friendship::request(a, b, Utc::now() - Duration::days(31));
        fx.storage.create_friendship(&old).await.unwrap();
        fx.service.send_request(&a, &c).await.unwrap();

        assert_eq!(fx.service.cleanup_expired().await.unwrap(), 1);
        assert!(fx.storage.get_friendship(&old.id).await.unwrap().is_none());
        assert_eq!(fx.service.cleanup_expired().await.unwrap(), 0);
        assert!(fx.events.kinds().await.contains(&EventKind::RequestsExpired));
    }

    #[tokio::test]
    async fn sessions_authenticate_their_user() {
        let fx = Fixture::new();
        let a = fx.user("A").await;
        let session = Session::new(a, serde_json::json!({}));
        fx.storage.create_session(&session).await.unwrap();

        assert_eq!(fx.service.authenticate(&session.id().to_string()).await.unwrap(), a);
        assert!(matches!(
            fx.service.authenticate("garbage").await,
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            fx.service.authenticate(&Uuid::new_v4().to_string()).await,
            Err(ServiceError::Unauthorized)
        ));
    }
}
