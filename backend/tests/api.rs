use std::sync::Arc;
use std::time::Duration as StdDuration;

use actix_web::http::{header, Method, StatusCode};
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use friendship::wire::{CleanupResult, DataResponse, MessageResponse};
use friendship::{
    Direction, ErrorInfo, Friendship, FriendshipStatus, FriendshipView, Paginated, RelationStatus,
    StatusEntry, TierKind, UserProfile,
};
use serde_json::json;
use uuid::Uuid;

use friendship_backend::events::MemoryPublisher;
use friendship_backend::routes;
use friendship_backend::service::{FriendshipService, ServiceSettings};
use friendship_backend::session::Session;
use friendship_backend::status_cache::MemoryStatusCache;
use friendship_backend::storage::{FriendshipStorage, MemoryStorage, SessionStorage, UserStorage};
use friendship_backend::user::User;

struct Fixture {
    storage: Arc<MemoryStorage>,
    service: Arc<FriendshipService>,
}

impl Fixture {
    fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let service = Arc::new(FriendshipService::new(
            storage.clone(),
            Arc::new(MemoryStatusCache::new(StdDuration::from_secs(60))),
            Arc::new(MemoryPublisher::new()),
            ServiceSettings::default(),
        ));
        Self { storage, service }
    }

    /// A user with an open session; returns the id and the bearer token.
    async fn user(&self, name: &str) -> (Uuid, String) {
        let user = User::new(name, "Tester", "1990-01-01", "", "Berlin").unwrap();
        self.storage.create_user(&user, "unused").await.unwrap();
        let session = Session::new(user.id(), json!({}));
        self.storage.create_session(&session).await.unwrap();
        (user.id(), session.id().to_string())
    }

    async fn befriend(&self, a: Uuid, b: Uuid) {
        let mut friendship = Friendship::request(a, b, Utc::now());
        friendship.status = FriendshipStatus::Accepted;
        self.storage.create_friendship(&friendship).await.unwrap();
    }
}

macro_rules! app {
    ($fx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($fx.service.clone()))
                .configure(routes::configure),
        )
        .await
    };
}

fn request(method: Method, uri: &str, token: &str) -> test::TestRequest {
    test::TestRequest::default()
        .method(method)
        .uri(uri)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
}

fn send(token: &str, friend_id: Uuid) -> test::TestRequest {
    request(Method::POST, "/friendships/requests", token).set_json(json!({ "friendId": friend_id }))
}

#[actix_web::test]
async fn request_lifecycle() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, bob_token) = fx.user("Bob").await;

    let resp = test::call_service(&app, send(&alice_token, bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: DataResponse<FriendshipView> = test::read_body_json(resp).await;
    assert_eq!(sent.data.direction, Some(Direction::Outgoing));
    assert_eq!(sent.data.counterpart.as_ref().map(|p| p.first_name.as_str()), Some("Bob"));

    let req = request(Method::GET, "/friendships/requests/pending", &bob_token).to_request();
    let pending: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pending.pagination.total_items, 1);
    assert_eq!(pending.data[0].direction, Some(Direction::Incoming));

    let accept_uri = format!("/friendships/{}/accept", sent.data.id());
    let resp = test::call_service(&app, request(Method::PUT, &accept_uri, &alice_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let info: ErrorInfo = test::read_body_json(resp).await;
    assert_eq!(info.code.as_deref(), Some("forbidden"));

    let resp = test::call_service(&app, request(Method::PUT, &accept_uri, &bob_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let accepted: DataResponse<FriendshipView> = test::read_body_json(resp).await;
    assert_eq!(accepted.data.friendship.status, FriendshipStatus::Accepted);

    let req = request(Method::GET, &format!("/friendships/{}/friends", alice), &bob_token).to_request();
    let friends: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(friends.data.len(), 1);
    assert_eq!(friends.data[0].counterpart_id(&alice), Some(bob));

    let req = request(Method::GET, &format!("/friendships/status/{}", bob), &alice_token).to_request();
    let status: DataResponse<StatusEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.data.status, RelationStatus::Accepted);
}

#[actix_web::test]
async fn invalid_requests_are_rejected() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, bob_token) = fx.user("Bob").await;

    let resp = test::call_service(&app, send(&alice_token, alice).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let info: ErrorInfo = test::read_body_json(resp).await;
    assert_eq!(info.code.as_deref(), Some("validation"));

    let resp = test::call_service(&app, send(&alice_token, Uuid::new_v4()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/friendships/requests")
        .set_json(json!({ "friendId": bob }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    let resp = test::call_service(&app, send("not-a-session", bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, send(&alice_token, bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = test::call_service(&app, send(&alice_token, bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let resp = test::call_service(&app, send(&bob_token, alice).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let info: ErrorInfo = test::read_body_json(resp).await;
    assert_eq!(info.message, "friend request already exists");

    let req = request(Method::PUT, "/friendships/not-an-id/accept", &bob_token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn strangers_cannot_see_a_friendship() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (_, alice_token) = fx.user("Alice").await;
    let (bob, _) = fx.user("Bob").await;
    let (_, carol_token) = fx.user("Carol").await;

    let sent: DataResponse<FriendshipView> = test::call_and_read_body_json(&app, send(&alice_token, bob).to_request()).await;

    let uri = format!("/friendships/requests/{}", sent.data.id());
    let resp = test::call_service(&app, request(Method::DELETE, &uri, &carol_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, request(Method::DELETE, &uri, &alice_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = test::call_service(&app, request(Method::DELETE, &uri, &alice_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn rejected_request_frees_the_pair() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, bob_token) = fx.user("Bob").await;

    let sent: DataResponse<FriendshipView> = test::call_and_read_body_json(&app, send(&alice_token, bob).to_request()).await;
    let uri = format!("/friendships/{}/reject", sent.data.id());
    let rejected: DataResponse<FriendshipView> =
        test::call_and_read_body_json(&app, request(Method::PUT, &uri, &bob_token).to_request()).await;
    assert_eq!(rejected.data.friendship.status, FriendshipStatus::Rejected);

    let req = request(Method::GET, &format!("/friendships/status/{}", alice), &bob_token).to_request();
    let status: DataResponse<StatusEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.data.status, RelationStatus::None);

    let resp = test::call_service(&app, send(&bob_token, alice).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn blocks_prevent_requests_until_lifted() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, bob_token) = fx.user("Bob").await;
    fx.befriend(alice, bob).await;

    let uri = format!("/friendships/block/{}", alice);
    let blocked: MessageResponse =
        test::call_and_read_body_json(&app, request(Method::POST, &uri, &bob_token).to_request()).await;
    assert_eq!(blocked.message, "user blocked");

    let resp = test::call_service(&app, send(&alice_token, bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = request(Method::GET, &format!("/friendships/status/{}", bob), &alice_token).to_request();
    let status: DataResponse<StatusEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.data.status, RelationStatus::Blocked);
    assert_eq!(status.data.direction, Some(Direction::Incoming));

    let req = request(Method::GET, &format!("/friendships/{}/friends", alice), &alice_token).to_request();
    let friends: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert!(friends.data.is_empty());

    // only the blocker may unblock
    let resp = test::call_service(
        &app,
        request(Method::DELETE, &format!("/friendships/block/{}", bob), &alice_token).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let resp = test::call_service(&app, request(Method::DELETE, &uri, &bob_token).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, send(&alice_token, bob).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn tiers_are_updated_and_listed() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, _) = fx.user("Bob").await;
    fx.befriend(alice, bob).await;
    let friendship = fx.storage.get_between(&alice, &bob).await.unwrap().unwrap();
    let uri = format!("/friendships/{}/tier", friendship.id);

    let req = request(Method::PUT, &uri, &alice_token)
        .set_json(json!({ "tier": "best_friends" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    let req = request(Method::PUT, &uri, &alice_token)
        .set_json(json!({ "tier": "family", "customTier": "cousins" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = request(Method::PUT, &uri, &alice_token)
        .set_json(json!({ "tier": "custom", "customTier": "climbing" }))
        .to_request();
    let updated: DataResponse<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated.data.friendship.tier.kind, TierKind::Custom);
    assert_eq!(updated.data.friendship.tier.custom_label.as_deref(), Some("climbing"));

    let req = request(Method::GET, "/friendships/tier/custom", &alice_token).to_request();
    let custom: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(custom.data.len(), 1);
    let req = request(Method::GET, "/friendships/tier/family", &alice_token).to_request();
    let family: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert!(family.data.is_empty());

    let req = request(Method::GET, "/friendships/tier/rivals", &alice_token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn pending_requests_are_paginated() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (me, my_token) = fx.user("Me").await;
    for i in 0..25 {
        let (sender, _) = fx.user(&format!("Sender{}", i)).await;
        let request = Friendship::request(sender, me, Utc::now() - Duration::minutes(i));
        fx.storage.create_friendship(&request).await.unwrap();
    }

    let req = request(Method::GET, "/friendships/requests/pending?page=3&limit=10", &my_token).to_request();
    let page: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.pagination.current_page, 3);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.total_items, 25);

    let req = request(Method::GET, "/friendships/requests/pending?page=9&limit=10", &my_token).to_request();
    let page: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page.pagination.current_page, 3);

    let req = request(Method::GET, "/friendships/requests/pending", &my_token).to_request();
    let first: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(first.data.len(), 10);
    assert!(first.data[0].friendship.created_at >= first.data[9].friendship.created_at);

    let req = request(Method::GET, "/friendships/requests/sent", &my_token).to_request();
    let sent: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sent.pagination.total_items, 0);
    assert_eq!(sent.pagination.total_pages, 1);
}

#[actix_web::test]
async fn suggestions_and_mutual_friends() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (me, my_token) = fx.user("Me").await;
    let (b, _) = fx.user("B").await;
    let (c, _) = fx.user("C").await;
    let (d, _) = fx.user("D").await;
    let (e, _) = fx.user("E").await;
    fx.befriend(me, b).await;
    fx.befriend(me, c).await;
    fx.befriend(b, d).await;
    fx.befriend(c, d).await;
    fx.befriend(c, e).await;

    let req = request(Method::GET, "/friendships/suggestions", &my_token).to_request();
    let suggestions: DataResponse<Vec<UserProfile>> = test::call_and_read_body_json(&app, req).await;
    let ids: Vec<Uuid> = suggestions.data.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![d, e]);

    let req = request(Method::GET, "/friendships/suggestions?limit=1", &my_token).to_request();
    let limited: DataResponse<Vec<UserProfile>> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(limited.data.len(), 1);

    let req = request(Method::GET, &format!("/friendships/{}/mutual", d), &my_token).to_request();
    let mutual: Paginated<FriendshipView> = test::call_and_read_body_json(&app, req).await;
    let mut ids: Vec<Uuid> = mutual.data.iter().filter_map(|v| v.counterpart_id(&me)).collect();
    ids.sort();
    let mut expected = vec![b, c];
    expected.sort();
    assert_eq!(ids, expected);
}

#[actix_web::test]
async fn cleanup_deletes_expired_requests() {
    let fx = Fixture::new();
    let app = app!(fx);
    let (alice, alice_token) = fx.user("Alice").await;
    let (bob, _) = fx.user("Bob").await;
    let (carol, _) = fx.user("Carol").await;
    let expired = Friendship::request(alice, bob, Utc::now() - Duration::days(45));
    fx.storage.create_friendship(&expired).await.unwrap();
    let resp = test::call_service(&app, send(&alice_token, carol).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = request(Method::DELETE, "/friendships/cleanup", &alice_token).to_request();
    let result: DataResponse<CleanupResult> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(result.data.deleted, 1);
    assert!(fx.storage.get_friendship(&expired.id).await.unwrap().is_none());
    assert!(fx.storage.get_between(&alice, &carol).await.unwrap().is_some());
}

#[actix_web::test]
async fn register_and_login() {
    let fx = Fixture::new();
    let app = app!(fx);

    let req = test::TestRequest::post()
        .uri("/user/register")
        .set_json(json!({
            "first_name": "Dana",
            "second_name": "Scully",
            "birthdate": "1964-02-23",
            "city": "Washington",
            "password": "trustno1!",
        }))
        .to_request();
    let registered: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let user_id = registered["user_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "id": user_id, "password": "wrong password" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "id": user_id, "password": "trustno1!" }))
        .to_request();
    let login: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let token = login["token"].as_str().unwrap().to_string();

    let req = request(Method::GET, "/friendships/requests/pending", &token).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri(&format!("/user/get/{}", user_id)).to_request();
    let user: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user["first_name"], "Dana");

    let req = test::TestRequest::post()
        .uri("/user/register")
        .set_json(json!({
            "first_name": "Fox",
            "second_name": "Mulder",
            "birthdate": "1961-10-13",
            "city": "Washington",
            "password": "short",
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}
