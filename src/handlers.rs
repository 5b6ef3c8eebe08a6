use actix_web::{delete, get, post, put, web, HttpResponse};
use log::debug;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::models::{
    CreateTweetRequest, LoginRequest, MessageResponse, RegisterUserRequest, TokenResponse,
    UpdateTweetRequest, UpdateUserRequest,
};
use crate::services::{TweetService, UserService};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(register)
        .service(login)
        .service(auth_test)
        .service(list_users)
        .service(update_user)
        .service(delete_user)
        .service(create_tweet)
        .service(list_tweets)
        .service(update_tweet)
        .service(delete_tweet);
}

#[get("/health_check")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[post("/users/register")]
pub async fn register(
    users: web::Data<UserService>,
    body: web::Json<RegisterUserRequest>,
) -> Result<HttpResponse, ApiError> {
    users.register(&body.username, &body.password).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("User registered successfully.")))
}

#[post("/users/login")]
pub async fn login(
    users: web::Data<UserService>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let token = users.login(&body.username, &body.password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[get("/users/test")]
pub async fn auth_test(_auth: Authenticated) -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse::new("You're authenticated!"))
}

#[get("/users")]
pub async fn list_users(users: web::Data<UserService>) -> HttpResponse {
    let all = users.list_users().await;
    debug!("Listing {} users", all.len());
    HttpResponse::Ok().json(all)
}

#[put("/users/{username}")]
pub async fn update_user(
    _auth: Authenticated,
    users: web::Data<UserService>,
    username: web::Path<String>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = users
        .update_user(
            &username,
            body.username.as_deref(),
            body.password.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/users/{username}")]
pub async fn delete_user(
    _auth: Authenticated,
    users: web::Data<UserService>,
    username: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    users.delete_user(&username).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("User deleted successfully.")))
}

#[post("/tweets")]
pub async fn create_tweet(
    _auth: Authenticated,
    tweets: web::Data<TweetService>,
    body: web::Json<CreateTweetRequest>,
) -> Result<HttpResponse, ApiError> {
    let tweet = tweets.create_tweet(&body.username, &body.content).await?;
    Ok(HttpResponse::Ok().json(tweet))
}

#[get("/tweets")]
pub async fn list_tweets(tweets: web::Data<TweetService>) -> HttpResponse {
    let all = tweets.list_tweets().await;
    debug!("Listing {} tweets", all.len());
    HttpResponse::Ok().json(all)
}

// A non-numeric id fails path extraction, which answers 404.
#[put("/tweets/{id}")]
pub async fn update_tweet(
    _auth: Authenticated,
    tweets: web::Data<TweetService>,
    id: web::Path<i64>,
    body: web::Json<UpdateTweetRequest>,
) -> Result<HttpResponse, ApiError> {
    let tweet = tweets.update_tweet(id.into_inner(), &body.content).await?;
    Ok(HttpResponse::Ok().json(tweet))
}

#[delete("/tweets/{id}")]
pub async fn delete_tweet(
    _auth: Authenticated,
    tweets: web::Data<TweetService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    tweets.delete_tweet(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Tweet deleted.")))
}
