use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{Error, ErrorInfo, Result};
use crate::model::{FriendshipView, StatusEntry, Tier, TierKind, UserProfile};
use crate::pagination::{PageRequest, Paginated};
use crate::wire::{
    CleanupResult, DataResponse, MessageResponse, SendRequestPayload, SuggestionsQuery,
    UpdateTierPayload,
};

/// Remote side of the friendship store. One method per request the store can
/// make; every call is a plain request/response round trip.
#[async_trait]
pub trait FriendshipApi: Send + Sync {
    async fn send_request(&self, friend_id: Uuid) -> Result<FriendshipView>;
    async fn accept_request(&self, friendship_id: Uuid) -> Result<FriendshipView>;
    async fn reject_request(&self, friendship_id: Uuid) -> Result<FriendshipView>;
    async fn cancel_request(&self, friendship_id: Uuid) -> Result<FriendshipView>;
    async fn remove_friend(&self, friendship_id: Uuid) -> Result<FriendshipView>;
    async fn update_tier(&self, friendship_id: Uuid, tier: &Tier) -> Result<FriendshipView>;
    async fn block_user(&self, user_id: Uuid) -> Result<()>;
    async fn unblock_user(&self, user_id: Uuid) -> Result<()>;
    async fn pending_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>>;
    async fn sent_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>>;
    async fn friends(&self, user_id: Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>>;
    async fn mutual_friends(&self, user_id: Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>>;
    async fn friends_by_tier(&self, tier: TierKind, page: PageRequest) -> Result<Paginated<FriendshipView>>;
    async fn suggestions(&self, limit: Option<u32>) -> Result<Vec<UserProfile>>;
    async fn status(&self, user_id: Uuid) -> Result<StatusEntry>;
    async fn cleanup_expired(&self) -> Result<u64>;
}

/// [`FriendshipApi`] over HTTP with a bearer session token.
#[derive(Debug, Clone)]
pub struct HttpFriendshipApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpFriendshipApi {
    pub fn new(base_url: &str, token: &str) -> HttpFriendshipApi {
        HttpFriendshipApi::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token: &str) -> HttpFriendshipApi {
        HttpFriendshipApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/friendships{}", self.base_url, path);
        log::debug!("{} {}", method, url);
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn data<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response: DataResponse<T> = decode(builder.send().await?).await?;
        Ok(response.data)
    }

    async fn page(&self, path: &str, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        let builder = self.request(Method::GET, path).query(&page.normalized());
        let page: Paginated<FriendshipView> = decode(builder.send().await?).await?;
        page.validate()?;
        Ok(page)
    }

    async fn message(&self, builder: RequestBuilder) -> Result<()> {
        let response: MessageResponse = decode(builder.send().await?).await?;
        log::debug!("server replied: {}", response.message);
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;
    if status.is_success() {
        return Ok(serde_json::from_slice(&body)?);
    }
    match serde_json::from_slice::<ErrorInfo>(&body) {
        Ok(info) => Err(Error::Remote {
            status: status.as_u16(),
            message: info.message,
            code: info.code,
        }),
        Err(_) => Err(Error::Remote {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            code: None,
        }),
    }
}

#[async_trait]
impl FriendshipApi for HttpFriendshipApi {
    async fn send_request(&self, friend_id: Uuid) -> Result<FriendshipView> {
        self.data(
            self.request(Method::POST, "/requests")
                .json(&SendRequestPayload { friend_id }),
        )
        .await
    }

    async fn accept_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        self.data(self.request(Method::PUT, &format!("/{}/accept", friendship_id)))
            .await
    }

    async fn reject_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        self.data(self.request(Method::PUT, &format!("/{}/reject", friendship_id)))
            .await
    }

    async fn cancel_request(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        self.data(self.request(Method::DELETE, &format!("/requests/{}", friendship_id)))
            .await
    }

    async fn remove_friend(&self, friendship_id: Uuid) -> Result<FriendshipView> {
        self.data(self.request(Method::DELETE, &format!("/{}", friendship_id)))
            .await
    }

    async fn update_tier(&self, friendship_id: Uuid, tier: &Tier) -> Result<FriendshipView> {
        self.data(
            self.request(Method::PUT, &format!("/{}/tier", friendship_id))
                .json(&UpdateTierPayload::from(tier)),
        )
        .await
    }

    async fn block_user(&self, user_id: Uuid) -> Result<()> {
        self.message(self.request(Method::POST, &format!("/block/{}", user_id)))
            .await
    }

    async fn unblock_user(&self, user_id: Uuid) -> Result<()> {
        self.message(self.request(Method::DELETE, &format!("/block/{}", user_id)))
            .await
    }

    async fn pending_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page("/requests/pending", page).await
    }

    async fn sent_requests(&self, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page("/requests/sent", page).await
    }

    async fn friends(&self, user_id: Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(&format!("/{}/friends", user_id), page).await
    }

    async fn mutual_friends(&self, user_id: Uuid, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(&format!("/{}/mutual", user_id), page).await
    }

    async fn friends_by_tier(&self, tier: TierKind, page: PageRequest) -> Result<Paginated<FriendshipView>> {
        self.page(&format!("/tier/{}", tier), page).await
    }

    async fn suggestions(&self, limit: Option<u32>) -> Result<Vec<UserProfile>> {
        self.data(
            self.request(Method::GET, "/suggestions")
                .query(&SuggestionsQuery { limit }),
        )
        .await
    }

    async fn status(&self, user_id: Uuid) -> Result<StatusEntry> {
        self.data(self.request(Method::GET, &format!("/status/{}", user_id)))
            .await
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let result: CleanupResult = self.data(self.request(Method::DELETE, "/cleanup")).await?;
        Ok(result.deleted)
    }
}
