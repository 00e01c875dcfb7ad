use actix_web::{error, web, Error, HttpResponse};
use actix_web_httpauth::extractors::bearer::{self, BearerAuth};
use friendship::wire::{
    CleanupResult, DataResponse, MessageResponse, SendRequestPayload, SuggestionsQuery,
    UpdateTierPayload,
};
use friendship::{PageRequest, TierKind, ValidationError};
use futures::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::service::{parse_id, FriendshipService};
use crate::user::UserRegisterPayload;

const MAX_SIZE: usize = 262_144; // max payload size is 256k

type Service = web::Data<FriendshipService>;

async fn read_json<T: DeserializeOwned>(mut payload: web::Payload) -> Result<T, Error> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if (body.len() + chunk.len()) > MAX_SIZE {
            return Err(error::ErrorBadRequest("overflow"));
        }
        body.extend_from_slice(&chunk);
    }

    match serde_json::from_slice::<T>(&body) {
        Ok(value) => Ok(value),
        Err(err) => {
            log::debug!("unable to parse json data: {:?}", err);
            Err(ServiceError::from(ValidationError::new(format!("unable to parse json data: {}", err))).into())
        }
    }
}

async fn viewer(service: &Service, auth: &BearerAuth) -> Result<Uuid, ServiceError> {
    service.authenticate(auth.token()).await
}

async fn register_user(service: Service, payload: web::Payload) -> Result<HttpResponse, Error> {
    let user_data = read_json::<UserRegisterPayload>(payload).await?;
    let user_id = service.register(user_data).await?;

    #[derive(Debug, Serialize)]
    struct UserRegisterResponse {
        user_id: String,
    }
    Ok(HttpResponse::Ok().json(UserRegisterResponse { user_id: user_id.to_string() }))
}

async fn login(service: Service, payload: web::Payload) -> Result<HttpResponse, Error> {
    #[derive(Debug, Deserialize)]
    struct LoginPayload {
        id: String,
        password: String,
    }

    let login_data = read_json::<LoginPayload>(payload).await?;
    let token = service.login(&login_data.id, &login_data.password).await?;

    #[derive(Debug, Serialize)]
    struct UserLoginResponse {
        token: String,
    }
    Ok(HttpResponse::Ok().json(UserLoginResponse { token: token.to_string() }))
}

async fn get_user(service: Service, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let id = parse_id(&path)?;
    Ok(HttpResponse::Ok().json(service.get_user(&id).await?))
}

async fn send_request(service: Service, auth: BearerAuth, payload: web::Payload) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let request = read_json::<SendRequestPayload>(payload).await?;
    let view = service.send_request(&user_id, &request.friend_id).await?;
    Ok(HttpResponse::Created().json(DataResponse::new(view)))
}

async fn pending_requests(service: Service, auth: BearerAuth, page: web::Query<PageRequest>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    Ok(HttpResponse::Ok().json(service.pending_requests(&user_id, page.into_inner()).await?))
}

async fn sent_requests(service: Service, auth: BearerAuth, page: web::Query<PageRequest>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    Ok(HttpResponse::Ok().json(service.sent_requests(&user_id, page.into_inner()).await?))
}

async fn cancel_request(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let view = service.cancel_request(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(view)))
}

async fn accept_request(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let view = service.accept_request(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(view)))
}

async fn reject_request(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let view = service.reject_request(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(view)))
}

async fn update_tier(
    service: Service,
    auth: BearerAuth,
    path: web::Path<String>,
    payload: web::Payload,
) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let id = parse_id(&path)?;
    let tier = read_json::<UpdateTierPayload>(payload)
        .await?
        .into_tier()
        .map_err(ServiceError::from)?;
    let view = service.update_tier(&user_id, &id, tier).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(view)))
}

async fn remove_friend(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let view = service.remove_friend(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(view)))
}

async fn block_user(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    service.block_user(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("user blocked")))
}

async fn unblock_user(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    service.unblock_user(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("user unblocked")))
}

async fn friends(
    service: Service,
    auth: BearerAuth,
    path: web::Path<String>,
    page: web::Query<PageRequest>,
) -> Result<HttpResponse, Error> {
    viewer(&service, &auth).await?;
    let owner = parse_id(&path)?;
    Ok(HttpResponse::Ok().json(service.friends(&owner, page.into_inner()).await?))
}

async fn mutual_friends(
    service: Service,
    auth: BearerAuth,
    path: web::Path<String>,
    page: web::Query<PageRequest>,
) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let other = parse_id(&path)?;
    Ok(HttpResponse::Ok().json(service.mutual_friends(&user_id, &other, page.into_inner()).await?))
}

async fn friends_by_tier(
    service: Service,
    auth: BearerAuth,
    path: web::Path<String>,
    page: web::Query<PageRequest>,
) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let tier = path.parse::<TierKind>().map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(service.friends_by_tier(&user_id, tier, page.into_inner()).await?))
}

async fn suggestions(service: Service, auth: BearerAuth, query: web::Query<SuggestionsQuery>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let profiles = service.suggestions(&user_id, query.limit).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(profiles)))
}

async fn status(service: Service, auth: BearerAuth, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let user_id = viewer(&service, &auth).await?;
    let entry = service.status(&user_id, &parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(entry)))
}

async fn cleanup(service: Service, auth: BearerAuth) -> Result<HttpResponse, Error> {
    viewer(&service, &auth).await?;
    let deleted = service.cleanup_expired().await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(CleanupResult { deleted })))
}

/// Registers every route. Static `/friendships/...` resources go before the
/// `/{id}` ones so that e.g. `/suggestions` is never taken for an id.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/user/register").route(web::post().to(register_user)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/user/get/{id}").route(web::get().to(get_user)))
        .service(
            web::scope("/friendships")
                .app_data(bearer::Config::default().realm("Restricted area").scope("friendship"))
                .service(web::resource("/requests").route(web::post().to(send_request)))
                .service(web::resource("/requests/pending").route(web::get().to(pending_requests)))
                .service(web::resource("/requests/sent").route(web::get().to(sent_requests)))
                .service(web::resource("/requests/{id}").route(web::delete().to(cancel_request)))
                .service(web::resource("/suggestions").route(web::get().to(suggestions)))
                .service(web::resource("/cleanup").route(web::delete().to(cleanup)))
                .service(
                    web::resource("/block/{user_id}")
                        .route(web::post().to(block_user))
                        .route(web::delete().to(unblock_user)),
                )
                .service(web::resource("/status/{user_id}").route(web::get().to(status)))
                .service(web::resource("/tier/{tier}").route(web::get().to(friends_by_tier)))
                .service(web::resource("/{id}/accept").route(web::put().to(accept_request)))
                .service(web::resource("/{id}/reject").route(web::put().to(reject_request)))
                .service(web::resource("/{id}/tier").route(web::put().to(update_tier)))
                .service(web::resource("/{user_id}/friends").route(web::get().to(friends)))
                .service(web::resource("/{user_id}/mutual").route(web::get().to(mutual_friends)))
                .service(web::resource("/{id}").route(web::delete().to(remove_friend))),
        );
}
