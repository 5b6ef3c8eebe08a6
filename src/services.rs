use chrono::Utc;
use log::{error, info};
use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::db::{IdentityStore, TweetStore};
use crate::error::ApiError;
use crate::models::{NewTweet, Tweet, User};

fn supplied(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub struct UserService {
    identity: Arc<dyn IdentityStore>,
    tokens: Arc<TokenIssuer>,
}

impl UserService {
    pub fn new(identity: Arc<dyn IdentityStore>, tokens: Arc<TokenIssuer>) -> Self {
        Self { identity, tokens }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, ApiError> {
        if self.identity.find_by_name(username).await.is_some() {
            return Err(ApiError::Conflict("Username is already taken.".to_string()));
        }
        let user = self.identity.create(User::new(username), password).await?;
        info!("Registered user {} ({})", user.username, user.user_id);
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let invalid = || ApiError::Unauthorized("Invalid credentials.".to_string());

        let user = self.identity.find_by_name(username).await.ok_or_else(invalid)?;
        if !self.identity.check_password(&user, password).await? {
            return Err(invalid());
        }

        self.tokens.issue().map_err(|e| {
            error!("Failed to issue token: {}", e);
            ApiError::Internal(e.to_string())
        })
    }

    pub async fn update_user(
        &self,
        current_username: &str,
        new_username: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<User, ApiError> {
        let mut user = self
            .identity
            .find_by_name(current_username)
            .await
            .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;

        let rename = supplied(new_username).filter(|name| *name != current_username);
        let new_password = supplied(new_password);

        // Nothing is written until both changes are known to be acceptable.
        if let Some(new_username) = rename {
            self.identity.validate_username(new_username)?;
            if self.identity.find_by_name(new_username).await.is_some() {
                return Err(ApiError::Conflict("Username is already taken.".to_string()));
            }
        }
        if let Some(new_password) = new_password {
            self.identity.validate_password(new_password)?;
        }

        if let Some(new_username) = rename {
            user.username = new_username.to_string();
        }
        let mut user = self.identity.update(user).await?;

        if let Some(new_password) = new_password {
            let token = self.identity.generate_reset_token(&user).await?;
            user = self
                .identity
                .reset_password(&user, &token, new_password)
                .await?;
        }

        info!("Updated user {} ({})", user.username, user.user_id);
        Ok(user)
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), ApiError> {
        let user = self
            .identity
            .find_by_name(username)
            .await
            .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;
        self.identity.delete(&user).await?;
        info!("Deleted user {} ({})", user.username, user.user_id);
        Ok(())
    }

    pub async fn list_users(&self) -> Vec<User> {
        self.identity.users().await
    }
}

pub struct TweetService {
    identity: Arc<dyn IdentityStore>,
    tweets: Arc<dyn TweetStore>,
}

impl TweetService {
    pub fn new(identity: Arc<dyn IdentityStore>, tweets: Arc<dyn TweetStore>) -> Self {
        Self { identity, tweets }
    }

    pub async fn create_tweet(&self, username: &str, content: &str) -> Result<Tweet, ApiError> {
        let user = self
            .identity
            .find_by_name(username)
            .await
            .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;

        let tweet = self
            .tweets
            .add(NewTweet {
                content: content.to_string(),
                user_id: user.user_id,
                username: user.username,
                created_at: Utc::now(),
            })
            .await?;
        info!("Tweet created successfully: {}", tweet.id);
        Ok(tweet)
    }

    pub async fn list_tweets(&self) -> Vec<Tweet> {
        self.tweets.tweets().await
    }

    pub async fn update_tweet(&self, id: i64, content: &str) -> Result<Tweet, ApiError> {
        let mut tweet = self.find(id).await?;
        tweet.content = content.to_string();
        tweet.updated_at = Some(Utc::now());
        Ok(self.tweets.update(tweet).await?)
    }

    pub async fn delete_tweet(&self, id: i64) -> Result<(), ApiError> {
        let tweet = self.find(id).await?;
        self.tweets.remove(&tweet).await?;
        info!("Tweet deleted: {}", id);
        Ok(())
    }

    async fn find(&self, id: i64) -> Result<Tweet, ApiError> {
        self.tweets
            .find_by_id(id)
            .await
            .ok_or_else(|| ApiError::NotFound("Tweet not found.".to_string()))
    }
}
