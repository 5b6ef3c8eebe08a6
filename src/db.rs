use async_trait::async_trait;
use bcrypt::{hash, verify};
use chrono::Utc;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IdentityError, StoreError};
use crate::models::{NewTweet, Tweet, User};

const USERNAME_EXTRA_CHARS: &str = "-._@+";

// The range bcrypt accepts for its work factor.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_name(&self, username: &str) -> Option<User>;
    /// Hashes `password` and stores the user. Fails if the name is taken or
    /// the name/password break the store's rules.
    async fn create(&self, user: User, password: &str) -> Result<User, StoreError>;
    async fn delete(&self, user: &User) -> Result<(), StoreError>;
    async fn check_password(&self, user: &User, password: &str) -> Result<bool, StoreError>;
    /// Checks a candidate username against the store's rules without writing.
    fn validate_username(&self, username: &str) -> Result<(), StoreError>;
    /// Checks a candidate password against the store's policy without writing.
    fn validate_password(&self, password: &str) -> Result<(), StoreError>;
    async fn generate_reset_token(&self, user: &User) -> Result<String, StoreError>;
    async fn reset_password(
        &self,
        user: &User,
        token: &str,
        new_password: &str,
    ) -> Result<User, StoreError>;
    /// Persists profile changes (currently the username). The credential is
    /// only ever replaced through `reset_password`.
    async fn update(&self, user: User) -> Result<User, StoreError>;
    async fn users(&self) -> Vec<User>;
}

#[async_trait]
pub trait TweetStore: Send + Sync {
    async fn add(&self, tweet: NewTweet) -> Result<Tweet, StoreError>;
    async fn find_by_id(&self, id: i64) -> Option<Tweet>;
    async fn update(&self, tweet: Tweet) -> Result<Tweet, StoreError>;
    async fn remove(&self, tweet: &Tweet) -> Result<(), StoreError>;
    async fn tweets(&self) -> Vec<Tweet>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 4,
            require_digit: false,
            require_lowercase: false,
            require_uppercase: false,
            require_non_alphanumeric: false,
        }
    }
}

impl PasswordPolicy {
    pub fn validate(&self, password: &str) -> Vec<IdentityError> {
        let mut errors = Vec::new();
        if password.chars().count() < self.min_length {
            errors.push(IdentityError::new(
                "PasswordTooShort",
                format!("Passwords must be at least {} characters.", self.min_length),
            ));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(IdentityError::new(
                "PasswordRequiresDigit",
                "Passwords must have at least one digit ('0'-'9').",
            ));
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            errors.push(IdentityError::new(
                "PasswordRequiresLower",
                "Passwords must have at least one lowercase ('a'-'z').",
            ));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            errors.push(IdentityError::new(
                "PasswordRequiresUpper",
                "Passwords must have at least one uppercase ('A'-'Z').",
            ));
        }
        if self.require_non_alphanumeric && password.chars().all(|c| c.is_alphanumeric()) {
            errors.push(IdentityError::new(
                "PasswordRequiresNonAlphanumeric",
                "Passwords must have at least one non alphanumeric character.",
            ));
        }
        errors
    }
}

fn username_error(username: &str) -> Option<IdentityError> {
    let valid = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || USERNAME_EXTRA_CHARS.contains(c));
    if valid {
        None
    } else {
        Some(IdentityError::new(
            "InvalidUserName",
            format!(
                "Username '{}' is invalid, can only contain letters or digits.",
                username
            ),
        ))
    }
}

#[derive(Default)]
struct IdentityState {
    users: HashMap<Uuid, User>,
    by_name: HashMap<String, Uuid>,
    reset_tokens: HashMap<String, Uuid>,
}

pub struct InMemoryIdentityStore {
    state: RwLock<IdentityState>,
    policy: PasswordPolicy,
    bcrypt_cost: u32,
}

impl InMemoryIdentityStore {
    pub fn new(policy: PasswordPolicy, bcrypt_cost: u32) -> Self {
        Self {
            state: RwLock::new(IdentityState::default()),
            policy,
            bcrypt_cost,
        }
    }

    fn hash_password(&self, password: &str) -> Result<String, StoreError> {
        self.validate_password(password)?;
        Ok(hash(password.as_bytes(), self.bcrypt_cost)?)
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_name(&self, username: &str) -> Option<User> {
        let state = self.state.read().await;
        state
            .by_name
            .get(username)
            .and_then(|id| state.users.get(id))
            .cloned()
    }

    async fn create(&self, mut user: User, password: &str) -> Result<User, StoreError> {
        self.validate_username(&user.username)?;
        user.password_hash = self.hash_password(password)?;

        let mut state = self.state.write().await;
        if state.by_name.contains_key(&user.username) {
            return Err(StoreError::Rejected(vec![IdentityError::duplicate_user_name(
                &user.username,
            )]));
        }
        state.by_name.insert(user.username.clone(), user.user_id);
        state.users.insert(user.user_id, user.clone());
        debug!("Stored user {} ({})", user.username, user.user_id);
        Ok(user)
    }

    async fn delete(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let removed = state
            .users
            .remove(&user.user_id)
            .ok_or(StoreError::UserNotFound)?;
        state.by_name.remove(&removed.username);
        state.reset_tokens.retain(|_, owner| *owner != removed.user_id);
        Ok(())
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool, StoreError> {
        let stored_hash = {
            let state = self.state.read().await;
            match state.users.get(&user.user_id) {
                Some(stored) => stored.password_hash.clone(),
                None => return Ok(false),
            }
        };
        Ok(verify(password, &stored_hash)?)
    }

    fn validate_username(&self, username: &str) -> Result<(), StoreError> {
        match username_error(username) {
            Some(err) => Err(StoreError::Rejected(vec![err])),
            None => Ok(()),
        }
    }

    fn validate_password(&self, password: &str) -> Result<(), StoreError> {
        let errors = self.policy.validate(password);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Rejected(errors))
        }
    }

    async fn generate_reset_token(&self, user: &User) -> Result<String, StoreError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user.user_id) {
            return Err(StoreError::UserNotFound);
        }
        let token = Uuid::new_v4().simple().to_string();
        state.reset_tokens.insert(token.clone(), user.user_id);
        Ok(token)
    }

    async fn reset_password(
        &self,
        user: &User,
        token: &str,
        new_password: &str,
    ) -> Result<User, StoreError> {
        // The token is spent whether or not the new password is accepted.
        {
            let mut state = self.state.write().await;
            if state.reset_tokens.get(token) != Some(&user.user_id) {
                return Err(StoreError::rejected("InvalidToken", "Invalid token."));
            }
            state.reset_tokens.remove(token);
        }

        let password_hash = self.hash_password(new_password)?;

        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&user.user_id)
            .ok_or(StoreError::UserNotFound)?;
        stored.password_hash = password_hash;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn update(&self, user: User) -> Result<User, StoreError> {
        self.validate_username(&user.username)?;

        let mut state = self.state.write().await;
        let old_name = state
            .users
            .get(&user.user_id)
            .map(|u| u.username.clone())
            .ok_or(StoreError::UserNotFound)?;

        if old_name != user.username {
            if let Some(owner) = state.by_name.get(&user.username) {
                if *owner != user.user_id {
                    return Err(StoreError::Rejected(vec![
                        IdentityError::duplicate_user_name(&user.username),
                    ]));
                }
            }
            state.by_name.remove(&old_name);
            state.by_name.insert(user.username.clone(), user.user_id);
        }

        let stored = state
            .users
            .get_mut(&user.user_id)
            .ok_or(StoreError::UserNotFound)?;
        stored.username = user.username;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn users(&self) -> Vec<User> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        users
    }
}

fn validate_content(content: &str) -> Result<(), StoreError> {
    if content.trim().is_empty() {
        return Err(StoreError::rejected("EmptyContent", "Content is required."));
    }
    Ok(())
}

struct TweetState {
    rows: BTreeMap<i64, Tweet>,
    next_id: i64,
}

pub struct InMemoryTweetStore {
    state: RwLock<TweetState>,
}

impl InMemoryTweetStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TweetState {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for InMemoryTweetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TweetStore for InMemoryTweetStore {
    async fn add(&self, tweet: NewTweet) -> Result<Tweet, StoreError> {
        validate_content(&tweet.content)?;

        let mut state = self.state.write().await;
        let id = state.next_id;
        state.next_id += 1;
        let tweet = Tweet {
            id,
            content: tweet.content,
            created_at: tweet.created_at,
            updated_at: None,
            user_id: tweet.user_id,
            username: tweet.username,
        };
        state.rows.insert(id, tweet.clone());
        Ok(tweet)
    }

    async fn find_by_id(&self, id: i64) -> Option<Tweet> {
        self.state.read().await.rows.get(&id).cloned()
    }

    async fn update(&self, tweet: Tweet) -> Result<Tweet, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&tweet.id)
            .ok_or(StoreError::TweetNotFound(tweet.id))?;
        validate_content(&tweet.content)?;
        // Only the content and its edit time are mutable.
        stored.content = tweet.content;
        stored.updated_at = tweet.updated_at;
        Ok(stored.clone())
    }

    async fn remove(&self, tweet: &Tweet) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .rows
            .remove(&tweet.id)
            .map(|_| ())
            .ok_or(StoreError::TweetNotFound(tweet.id))
    }

    async fn tweets(&self) -> Vec<Tweet> {
        self.state.read().await.rows.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_store() -> InMemoryIdentityStore {
        InMemoryIdentityStore::new(PasswordPolicy::default(), MIN_BCRYPT_COST)
    }

    fn new_tweet(content: &str) -> NewTweet {
        NewTweet {
            content: content.to_string(),
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn default_policy_only_checks_length() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("pass").is_empty());
        assert_eq!(policy.validate("abc")[0].code, "PasswordTooShort");
    }

    #[test]
    fn strict_policy_reports_every_failure() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        };
        let codes: Vec<String> = policy.validate("abc").into_iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                "PasswordTooShort",
                "PasswordRequiresDigit",
                "PasswordRequiresUpper",
                "PasswordRequiresNonAlphanumeric",
            ]
        );
        assert!(policy.validate("Abcdef1!").is_empty());
    }

    #[tokio::test]
    async fn create_hashes_the_password() {
        let store = identity_store();
        let user = store.create(User::new("alice"), "pass").await.unwrap();

        assert_ne!(user.password_hash, "pass");
        assert!(store.check_password(&user, "pass").await.unwrap());
        assert!(!store.check_password(&user, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username() {
        let store = identity_store();
        store.create(User::new("bob"), "pass").await.unwrap();

        let err = store.create(User::new("bob"), "pass").await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected(ref e) if e[0].code == "DuplicateUserName"));
        assert_eq!(store.users().await.len(), 1);
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let store = identity_store();
        store.create(User::new("bob"), "pass").await.unwrap();
        store.create(User::new("Bob"), "pass").await.unwrap();

        assert!(store.find_by_name("BOB").await.is_none());
        assert_eq!(store.users().await.len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_invalid_username() {
        let store = identity_store();
        let err = store.create(User::new("has space"), "pass").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(ref e) if e[0].code == "InvalidUserName"));
    }

    #[tokio::test]
    async fn rename_moves_the_name_index() {
        let store = identity_store();
        let mut user = store.create(User::new("old"), "pass").await.unwrap();
        user.username = "new".to_string();

        store.update(user).await.unwrap();

        assert!(store.find_by_name("old").await.is_none());
        assert!(store.find_by_name("new").await.is_some());
    }

    #[tokio::test]
    async fn rename_onto_taken_name_is_rejected() {
        let store = identity_store();
        store.create(User::new("taken"), "pass").await.unwrap();
        let mut user = store.create(User::new("carol"), "pass").await.unwrap();
        user.username = "taken".to_string();

        assert!(store.update(user).await.is_err());
        assert!(store.find_by_name("carol").await.is_some());
    }

    #[tokio::test]
    async fn update_never_touches_the_credential() {
        let store = identity_store();
        let mut user = store.create(User::new("dave"), "pass").await.unwrap();
        user.password_hash = "garbage".to_string();

        let updated = store.update(user).await.unwrap();

        assert!(store.check_password(&updated, "pass").await.unwrap());
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let store = identity_store();
        let user = store.create(User::new("erin"), "pass").await.unwrap();
        let token = store.generate_reset_token(&user).await.unwrap();

        store.reset_password(&user, &token, "newpass").await.unwrap();
        let again = store.reset_password(&user, &token, "other").await;

        assert!(again.is_err());
        assert!(store.check_password(&user, "newpass").await.unwrap());
        assert!(!store.check_password(&user, "pass").await.unwrap());
    }

    #[tokio::test]
    async fn reset_token_is_bound_to_its_user() {
        let store = identity_store();
        let erin = store.create(User::new("erin"), "pass").await.unwrap();
        let frank = store.create(User::new("frank"), "pass").await.unwrap();
        let token = store.generate_reset_token(&erin).await.unwrap();

        let err = store.reset_password(&frank, &token, "stolen").await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected(ref e) if e[0].code == "InvalidToken"));
        assert!(store.check_password(&frank, "pass").await.unwrap());
    }

    #[tokio::test]
    async fn reset_with_weak_password_keeps_old_one() {
        let store = identity_store();
        let user = store.create(User::new("gary"), "pass").await.unwrap();
        let token = store.generate_reset_token(&user).await.unwrap();

        let err = store.reset_password(&user, &token, "x").await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected(ref e) if e[0].code == "PasswordTooShort"));
        assert!(store.check_password(&user, "pass").await.unwrap());
        assert!(store.state.read().await.reset_tokens.is_empty());
        assert!(store.reset_password(&user, &token, "longer").await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_user() {
        let store = identity_store();
        let user = store.create(User::new("hank"), "pass").await.unwrap();

        store.delete(&user).await.unwrap();

        assert!(store.find_by_name("hank").await.is_none());
        assert!(matches!(store.delete(&user).await, Err(StoreError::UserNotFound)));
    }

    #[tokio::test]
    async fn tweet_ids_increase_and_are_not_reused() {
        let store = InMemoryTweetStore::new();
        let first = store.add(new_tweet("one")).await.unwrap();
        let second = store.add(new_tweet("two")).await.unwrap();
        store.remove(&second).await.unwrap();
        let third = store.add(new_tweet("three")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(third.id, 3);
        assert_eq!(store.tweets().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let store = InMemoryTweetStore::new();
        assert!(store.add(new_tweet("   ")).await.is_err());
        assert!(store.tweets().await.is_empty());
    }

    #[tokio::test]
    async fn update_keeps_creation_time() {
        let store = InMemoryTweetStore::new();
        let tweet = store.add(new_tweet("hello")).await.unwrap();
        let mut edited = tweet.clone();
        edited.content = "edited".to_string();
        edited.created_at = Utc::now() + chrono::Duration::days(1);
        edited.updated_at = Some(Utc::now());

        let stored = store.update(edited).await.unwrap();

        assert_eq!(stored.content, "edited");
        assert_eq!(stored.created_at, tweet.created_at);
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_of_missing_tweet_fails() {
        let store = InMemoryTweetStore::new();
        let tweet = store.add(new_tweet("hello")).await.unwrap();
        store.remove(&tweet).await.unwrap();

        assert!(matches!(store.update(tweet).await, Err(StoreError::TweetNotFound(1))));
    }
}
