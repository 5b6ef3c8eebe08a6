pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod seed;
pub mod services;

use actix_web::web;
use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::db::{IdentityStore, InMemoryIdentityStore, InMemoryTweetStore, TweetStore};
use crate::services::{TweetService, UserService};

/// Shared handles for the HTTP workers. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub users: web::Data<UserService>,
    pub tweets: web::Data<TweetService>,
    pub tokens: web::Data<TokenIssuer>,
}

impl AppState {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        tweet_store: Arc<dyn TweetStore>,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            users: web::Data::new(UserService::new(identity.clone(), tokens.clone())),
            tweets: web::Data::new(TweetService::new(identity, tweet_store)),
            tokens: web::Data::from(tokens),
        }
    }

    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            Arc::new(InMemoryIdentityStore::new(
                config.password_policy.clone(),
                config.bcrypt_cost,
            )),
            Arc::new(InMemoryTweetStore::new()),
            Arc::new(TokenIssuer::new(config.jwt_key.as_bytes(), config.token_ttl)),
        )
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.users.clone())
            .app_data(self.tweets.clone())
            .app_data(self.tokens.clone())
            .configure(handlers::configure);
    }
}
