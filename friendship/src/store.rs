//! Client-side friendship state store.
//!
//! The store caches the calling user's relationships in independent buckets
//! and applies the server's response to them after every call. State lives
//! behind one lock that is never held across a remote call, so concurrent
//! fetches of different buckets do not interfere and the last response wins
//! per bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::FriendshipApi;
use crate::cache::KeyedCache;
use crate::error::{Error, ErrorInfo, Result, ValidationError};
use crate::model::{Direction, FriendshipView, StatusEntry, Tier, TierKind, UserProfile};
use crate::pagination::{PageRequest, Paginated, Pagination, DEFAULT_PAGE_SIZE};
use crate::transition::RelationState;

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub status_ttl: Duration,
    pub cache_capacity: usize,
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            status_ttl: Duration::from_secs(300),
            cache_capacity: 256,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// One paginated view of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
    pub status: LoadStatus,
    pub error: Option<ErrorInfo>,
    page_size: u32,
}

impl<T> Bucket<T> {
    pub fn new(page_size: u32) -> Bucket<T> {
        Bucket {
            data: Vec::new(),
            pagination: Pagination::default(),
            status: LoadStatus::Idle,
            error: None,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn begin(&mut self) {
        self.status = LoadStatus::Loading;
        self.error = None;
    }

    fn fill(&mut self, page: Paginated<T>, page_size: u32) {
        self.data = page.data;
        self.pagination = page.pagination;
        self.page_size = page_size.max(1);
        self.status = LoadStatus::Succeeded;
        self.error = None;
    }

    /// Keeps the previous data so the view stays available.
    fn fail(&mut self, error: ErrorInfo) {
        self.status = LoadStatus::Failed;
        self.error = Some(error);
    }

    fn record_error(&mut self, error: ErrorInfo) {
        self.error = Some(error);
    }

    fn recount(&mut self, total_items: u64) {
        self.pagination = self.pagination.with_total(self.page_size, total_items);
    }
}

impl Bucket<FriendshipView> {
    pub fn contains(&self, friendship_id: &Uuid) -> bool {
        self.data.iter().any(|view| view.id() == *friendship_id)
    }

    pub fn get(&self, friendship_id: &Uuid) -> Option<&FriendshipView> {
        self.data.iter().find(|view| view.id() == *friendship_id)
    }

    /// Removing an id that is not present is a no-op.
    fn remove(&mut self, friendship_id: &Uuid) -> Option<FriendshipView> {
        let position = self.data.iter().position(|view| view.id() == *friendship_id)?;
        let removed = self.data.remove(position);
        self.recount(self.pagination.total_items.saturating_sub(1));
        Some(removed)
    }

    /// Puts `view` first; a record with the same id is replaced, never duplicated.
    fn prepend(&mut self, view: FriendshipView) {
        let total_items = match self.data.iter().position(|item| item.id() == view.id()) {
            Some(position) => {
                self.data.remove(position);
                self.pagination.total_items
            }
            None => self.pagination.total_items + 1,
        };
        self.data.insert(0, view);
        self.recount(total_items);
    }

    fn replace(&mut self, view: &FriendshipView) -> bool {
        match self.data.iter_mut().find(|item| item.id() == view.id()) {
            Some(item) => {
                *item = view.clone();
                true
            }
            None => false,
        }
    }

    fn remove_counterpart(&mut self, owner: &Uuid, counterpart: &Uuid) -> usize {
        let before = self.data.len();
        self.data
            .retain(|view| view.counterpart_id(owner).as_ref() != Some(counterpart));
        let removed = before - self.data.len();
        if removed > 0 {
            self.recount(self.pagination.total_items.saturating_sub(removed as u64));
        }
        removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Friends,
    Pending,
    Sent,
    Mutual,
    Tier(TierKind),
    FriendsOf(Uuid),
    Suggestions,
    Global,
}

struct FriendshipState {
    page_size: u32,
    friends: Bucket<FriendshipView>,
    pending: Bucket<FriendshipView>,
    sent: Bucket<FriendshipView>,
    mutual: Bucket<FriendshipView>,
    by_tier: HashMap<TierKind, Bucket<FriendshipView>>,
    suggestions: Bucket<UserProfile>,
    friends_by_user: KeyedCache<Uuid, Bucket<FriendshipView>>,
    status_lookup: KeyedCache<Uuid, StatusEntry>,
    last_error: Option<ErrorInfo>,
}

impl FriendshipState {
    fn new(config: &StoreConfig) -> FriendshipState {
        let page_size = config.page_size.max(1);
        FriendshipState {
            page_size,
            friends: Bucket::new(page_size),
            pending: Bucket::new(page_size),
            sent: Bucket::new(page_size),
            mutual: Bucket::new(page_size),
            by_tier: HashMap::new(),
            suggestions: Bucket::new(page_size),
            friends_by_user: KeyedCache::new(config.status_ttl, config.cache_capacity),
            status_lookup: KeyedCache::new(config.status_ttl, config.cache_capacity),
            last_error: None,
        }
    }

    fn with_bucket<F>(&mut self, slot: Slot, update: F)
    where
        F: FnOnce(&mut Bucket<FriendshipView>),
    {
        let page_size = self.page_size;
        match slot {
            Slot::Friends => update(&mut self.friends),
            Slot::Pending => update(&mut self.pending),
            Slot::Sent => update(&mut self.sent),
            Slot::Mutual => update(&mut self.mutual),
            Slot::Tier(kind) => update(
                self.by_tier
                    .entry(kind)
                    .or_insert_with(|| Bucket::new(page_size)),
            ),
            Slot::FriendsOf(user_id) => {
                self.friends_by_user
                    .upsert_with(user_id, || Bucket::new(page_size), update)
            }
            Slot::Suggestions | Slot::Global => {}
        }
    }

    fn record_error(&mut self, slot: Slot, error: ErrorInfo) {
        match slot {
            Slot::Suggestions => self.suggestions.record_error(error),
            Slot::Global => self.last_error = Some(error),
            slot => self.with_bucket(slot, |bucket| bucket.record_error(error)),
        }
    }

    fn friend_buckets_mut(&mut self) -> impl Iterator<Item = &mut Bucket<FriendshipView>> {
        std::iter::once(&mut self.friends).chain(self.by_tier.values_mut())
    }

    /// Every bucket holding the viewer's own records.
    fn all_buckets_mut(&mut self) -> impl Iterator<Item = &mut Bucket<FriendshipView>> {
        [&mut self.friends, &mut self.pending, &mut self.sent, &mut self.mutual]
            .into_iter()
            .chain(self.by_tier.values_mut())
    }
}

/// Injectable container owning the friendship cache of one signed-in user.
pub struct FriendshipStore {
    api: Arc<dyn FriendshipApi>,
    viewer: Uuid,
    state: RwLock<FriendshipState>,
}

impl FriendshipStore {
    pub fn new(api: Arc<dyn FriendshipApi>, viewer: Uuid, config: StoreConfig) -> FriendshipStore {
        FriendshipStore {
            api,
            viewer,
            state: RwLock::new(FriendshipState::new(&config)),
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    async fn fail<T>(&self, slot: Slot, err: Error) -> Result<T> {
        log::debug!("friendship operation failed: {}", err);
        self.state.write().await.record_error(slot, err.info());
        Err(err)
    }

    pub async fn send_request(&self, target: Uuid) -> Result<FriendshipView> {
        if target == self.viewer {
            let err = ValidationError::new("cannot send a friend request to yourself");
            return self.fail(Slot::Sent, err.into()).await;
        }

        match self.api.send_request(target).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.sent.prepend(view.clone());
                state.status_lookup.insert(
                    target,
                    StatusEntry::from_state(RelationState::Pending(Direction::Outgoing), Some(view.clone())),
                );
                Ok(view)
            }
            Err(err) => self.fail(Slot::Sent, err).await,
        }
    }

    pub async fn accept_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        match self.api.accept_request(friendship_id).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.pending.remove(&friendship_id);
                state.friends.prepend(view.clone());
                if let Some(bucket) = state.by_tier.get_mut(&view.friendship.tier.kind) {
                    bucket.prepend(view.clone());
                }
                let entry = StatusEntry::from_state(RelationState::Accepted, Some(view.clone()));
                for endpoint in [view.friendship.user_id, view.friendship.friend_id] {
                    state.status_lookup.insert(endpoint, entry.clone());
                }
                Ok(view)
            }
            Err(err) => self.fail(Slot::Pending, err).await,
        }
    }

    pub async fn reject_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        match self.api.reject_request(friendship_id).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.pending.remove(&friendship_id);
                if let Some(counterpart) = view.counterpart_id(&self.viewer) {
                    state
                        .status_lookup
                        .insert(counterpart, StatusEntry::rejected(view.clone()));
                }
                Ok(view)
            }
            Err(err) => self.fail(Slot::Pending, err).await,
        }
    }

    pub async fn cancel_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        match self.api.cancel_request(friendship_id).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.sent.remove(&friendship_id);
                if let Some(counterpart) = view.counterpart_id(&self.viewer) {
                    state.status_lookup.insert(counterpart, StatusEntry::none());
                }
                Ok(view)
            }
            Err(err) => self.fail(Slot::Sent, err).await,
        }
    }

    pub async fn remove_friend(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        match self.api.remove_friend(friendship_id).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.friend_buckets_mut().for_each(|bucket| {
                    bucket.remove(&friendship_id);
                });
                state.mutual.remove(&friendship_id);
                state.friends_by_user.for_each_fresh_mut(|_, bucket| {
                    bucket.remove(&friendship_id);
                });
                if let Some(counterpart) = view.counterpart_id(&self.viewer) {
                    state.status_lookup.insert(counterpart, StatusEntry::none());
                }
                Ok(view)
            }
            Err(err) => self.fail(Slot::Friends, err).await,
        }
    }

    pub async fn update_tier(&self, friendship_id: Uuid, tier: Tier) -> Result<FriendshipView> {
        if let Err(err) = tier.validate() {
            return self.fail(Slot::Friends, err.into()).await;
        }

        match self.api.update_tier(friendship_id, &tier).await {
            Ok(view) => {
                let mut state = self.state.write().await;
                state.friends.replace(&view);
                for (kind, bucket) in state.by_tier.iter_mut() {
                    if *kind == view.friendship.tier.kind {
                        bucket.prepend(view.clone());
                    } else {
                        bucket.remove(&friendship_id);
                    }
                }
                if let Some(counterpart) = view.counterpart_id(&self.viewer) {
                    if state.status_lookup.contains(&counterpart) {
                        state.status_lookup.insert(
                            counterpart,
                            StatusEntry::from_state(RelationState::Accepted, Some(view.clone())),
                        );
                    }
                }
                Ok(view)
            }
            Err(err) => self.fail(Slot::Friends, err).await,
        }
    }

    pub async fn block_user(&self, target: Uuid) -> Result<()> {
        if target == self.viewer {
            let err = ValidationError::new("cannot block yourself");
            return self.fail(Slot::Friends, err.into()).await;
        }

        match self.api.block_user(target).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                let viewer = self.viewer;
                let removed: usize = state
                    .all_buckets_mut()
                    .map(|bucket| bucket.remove_counterpart(&viewer, &target))
                    .sum();
                log::debug!("blocked {}, dropped {} cached friendship entries", target, removed);
                state.status_lookup.insert(
                    target,
                    StatusEntry::from_state(RelationState::Blocked(Direction::Outgoing), None),
                );
                Ok(())
            }
            Err(err) => self.fail(Slot::Friends, err).await,
        }
    }

    pub async fn unblock_user(&self, target: Uuid) -> Result<()> {
        match self.api.unblock_user(target).await {
            Ok(()) => {
                self.state.write().await.status_lookup.invalidate(&target);
                Ok(())
            }
            Err(err) => self.fail(Slot::Global, err).await,
        }
    }

    async fn begin(&self, slot: Slot) {
        self.state.write().await.with_bucket(slot, Bucket::begin);
    }

    async fn settle(
        &self,
        slot: Slot,
        limit: u32,
        result: Result<Paginated<FriendshipView>>,
    ) -> Result<Paginated<FriendshipView>> {
        let mut state = self.state.write().await;
        match result {
            Ok(page) => {
                state.with_bucket(slot, |bucket| bucket.fill(page.clone(), limit));
                Ok(page)
            }
            Err(err) => {
                log::debug!("unable to fetch {:?}: {}", slot, err);
                state.with_bucket(slot, |bucket| bucket.fail(err.info()));
                Err(err)
            }
        }
    }

    pub async fn get_pending_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        self.begin(Slot::Pending).await;
        let result = self.api.pending_requests(page).await;
        self.settle(Slot::Pending, page.limit, result).await
    }

    pub async fn get_sent_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        self.begin(Slot::Sent).await;
        let result = self.api.sent_requests(page).await;
        self.settle(Slot::Sent, page.limit, result).await
    }

    /// Friends of `user_id`, or of the signed-in user when `None`.
    pub async fn get_friends(&self, user_id: Option<Uuid>, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        let user_id = user_id.unwrap_or(self.viewer);
        let slot = if user_id == self.viewer {
            Slot::Friends
        } else {
            Slot::FriendsOf(user_id)
        };
        self.begin(slot).await;
        let result = self.api.friends(user_id, page).await;
        self.settle(slot, page.limit, result).await
    }

    pub async fn get_mutual_friends(&self, user_id: Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        self.begin(Slot::Mutual).await;
        let result = self.api.mutual_friends(user_id, page).await;
        self.settle(Slot::Mutual, page.limit, result).await
    }

    pub async fn get_friends_by_tier(&self, tier: TierKind, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let page = page.normalized();
        self.begin(Slot::Tier(tier)).await;
        let result = self.api.friends_by_tier(tier, page).await;
        self.settle(Slot::Tier(tier), page.limit, result).await
    }

    pub async fn get_friend_suggestions(&self) -> Result<Vec<UserProfile>> {
        self.state.write().await.suggestions.begin();
        let result = self.api.suggestions(None).await;

        let mut state = self.state.write().await;
        match result {
            Ok(profiles) => {
                let total = profiles.len() as u64;
                let limit = u32::try_from(profiles.len()).unwrap_or(u32::MAX).max(1);
                state
                    .suggestions
                    .fill(Paginated::new(profiles.clone(), Pagination::new(1, limit, total)), limit);
                Ok(profiles)
            }
            Err(err) => {
                state.suggestions.fail(err.info());
                Err(err)
            }
        }
    }

    pub async fn check_friendship_status(&self, target: Uuid) -> Result<StatusEntry> {
        match self.api.status(target).await {
            Ok(entry) => {
                self.state
                    .write()
                    .await
                    .status_lookup
                    .insert(target, entry.clone());
                Ok(entry)
            }
            Err(err) => self.fail(Slot::Global, err).await,
        }
    }

    pub async fn cleanup_expired_requests(&self) -> Result<u64> {
        match self.api.cleanup_expired().await {
            Ok(deleted) => {
                log::info!("server removed {} expired friend requests", deleted);
                Ok(deleted)
            }
            Err(err) => self.fail(Slot::Global, err).await,
        }
    }

    pub async fn friends(&self) -> Bucket<FriendshipView> {
        self.state.read().await.friends.clone()
    }

    pub async fn pending_requests(&self) -> Bucket<FriendshipView> {
        self.state.read().await.pending.clone()
    }

    pub async fn sent_requests(&self) -> Bucket<FriendshipView> {
        self.state.read().await.sent.clone()
    }

    pub async fn mutual_friends(&self) -> Bucket<FriendshipView> {
        self.state.read().await.mutual.clone()
    }

    pub async fn friends_by_tier(&self, tier: TierKind) -> Option<Bucket<FriendshipView>> {
        self.state.read().await.by_tier.get(&tier).cloned()
    }

    pub async fn friends_of(&self, user_id: &Uuid) -> Option<Bucket<FriendshipView>> {
        self.state.read().await.friends_by_user.get(user_id).cloned()
    }

    pub async fn suggestions(&self) -> Bucket<UserProfile> {
        self.state.read().await.suggestions.clone()
    }

    /// Cached status for `user_id`; `None` once the entry went stale.
    pub async fn status_of(&self, user_id: &Uuid) -> Option<StatusEntry> {
        self.state.read().await.status_lookup.get(user_id).cloned()
    }

    pub async fn last_error(&self) -> Option<ErrorInfo> {
        self.state.read().await.last_error.clone()
    }

    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.write().await;
        state.status_lookup.purge_expired() + state.friends_by_user.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Friendship;

    fn view(owner: Uuid, counterpart: Uuid) -> FriendshipView {
        FriendshipView::new(Friendship::request(owner, counterpart, Utc::now()), &owner, None)
    }

    fn loaded(items: Vec<FriendshipView>, total: u64) -> Bucket<FriendshipView> {
        let mut bucket = Bucket::new(10);
        let pagination = Pagination::new(1, 10, total);
        bucket.fill(Paginated::new(items, pagination), 10);
        bucket
    }

    #[test]
    fn prepend_never_duplicates() {
        let owner = Uuid::new_v4();
        let item = view(owner, Uuid::new_v4());
        let mut bucket = loaded(vec![item.clone()], 1);

        bucket.prepend(item.clone());
        assert_eq!(bucket.data.len(), 1);
        assert_eq!(bucket.pagination.total_items, 1);

        bucket.prepend(view(owner, Uuid::new_v4()));
        assert_eq!(bucket.data.len(), 2);
        assert_eq!(bucket.pagination.total_items, 2);
        assert_eq!(bucket.data[1].id(), item.id());
    }

    #[test]
    fn remove_keeps_pagination_consistent() {
        let owner = Uuid::new_v4();
        let items: Vec<_> = (0..10).map(|_| view(owner, Uuid::new_v4())).collect();
        let first = items[0].id();
        let mut bucket = loaded(items, 11);
        assert_eq!(bucket.pagination.total_pages, 2);

        assert!(bucket.remove(&first).is_some());
        assert!(bucket.remove(&first).is_none());
        assert_eq!(bucket.pagination.total_items, 10);
        assert_eq!(bucket.pagination.total_pages, 1);
        assert!(bucket.pagination.validate(bucket.data.len()).is_ok());
    }

    #[test]
    fn remove_counterpart_drops_every_match() {
        let owner = Uuid::new_v4();
        let blocked = Uuid::new_v4();
        let keep = view(owner, Uuid::new_v4());
        let mut bucket = loaded(vec![view(owner, blocked), keep.clone(), view(blocked, owner)], 3);

        assert_eq!(bucket.remove_counterpart(&owner, &blocked), 2);
        assert_eq!(bucket.data, vec![keep]);
        assert_eq!(bucket.pagination.total_items, 1);
    }

    #[test]
    fn failed_fetch_keeps_stale_data() {
        let owner = Uuid::new_v4();
        let mut bucket = loaded(vec![view(owner, Uuid::new_v4())], 1);
        bucket.begin();
        assert_eq!(bucket.status, LoadStatus::Loading);
        bucket.fail(ErrorInfo::new("boom", None));
        assert_eq!(bucket.status, LoadStatus::Failed);
        assert_eq!(bucket.data.len(), 1);
    }
}
