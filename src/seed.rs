use fake::faker::internet::en::Username;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use log::{debug, info};

use crate::error::ApiError;
use crate::services::{TweetService, UserService};

pub const SEED_PASSWORD: &str = "password123";

// Gives up on a slot after this many name collisions in a row.
const MAX_NAME_ATTEMPTS: usize = 20;

fn fake_username() -> String {
    Username()
        .fake::<String>()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Fills the stores with fake users and tweets through the regular services.
/// Returns the usernames that were created.
pub async fn seed(
    users: &UserService,
    tweets: &TweetService,
    num_users: usize,
    tweets_per_user: usize,
) -> Result<Vec<String>, ApiError> {
    info!("Creating {} users...", num_users);
    let mut created = Vec::with_capacity(num_users);

    for i in 0..num_users {
        let mut attempts = 0;
        let user = loop {
            attempts += 1;
            let username = fake_username();
            if username.is_empty() {
                if attempts < MAX_NAME_ATTEMPTS {
                    continue;
                }
                break None;
            }
            match users.register(&username, SEED_PASSWORD).await {
                Ok(user) => break Some(user),
                Err(ApiError::Conflict(_)) if attempts < MAX_NAME_ATTEMPTS => continue,
                Err(ApiError::Conflict(_)) => break None,
                Err(e) => return Err(e),
            }
        };
        let Some(user) = user else {
            debug!("Skipped seed user {}: no free name", i + 1);
            continue;
        };
        debug!("Created user {}/{}: {}", i + 1, num_users, user.username);

        for _ in 0..tweets_per_user {
            let content: String = Sentence(3..10).fake();
            tweets.create_tweet(&user.username, &content).await?;
        }
        created.push(user.username);
    }

    info!(
        "Seeding completed: {} users, {} tweets",
        created.len(),
        created.len() * tweets_per_user
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use crate::db::{
        IdentityStore, InMemoryIdentityStore, InMemoryTweetStore, PasswordPolicy, TweetStore,
        MIN_BCRYPT_COST,
    };
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn seeded_users_can_log_in() {
        let identity: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new(
            PasswordPolicy::default(),
            MIN_BCRYPT_COST,
        ));
        let store: Arc<dyn TweetStore> = Arc::new(InMemoryTweetStore::new());
        let users = UserService::new(
            identity.clone(),
            Arc::new(TokenIssuer::new(b"testkey", Duration::hours(1))),
        );
        let tweets = TweetService::new(identity, store);

        let names = seed(&users, &tweets, 3, 2).await.unwrap();

        assert_eq!(users.list_users().await.len(), names.len());
        assert_eq!(tweets.list_tweets().await.len(), names.len() * 2);
        for name in &names {
            assert!(users.login(name, SEED_PASSWORD).await.is_ok());
        }
    }
}
