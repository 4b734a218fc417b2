use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pixelforge_core::types::DbId;

use super::UserStore;
use crate::models::user::{NewUser, User};
use crate::repositories::UserRepo;
use crate::DbPool;

/// [`UserStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, input: &NewUser) -> Result<Option<User>, sqlx::Error> {
        UserRepo::create(&self.pool, input).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, sqlx::Error> {
        UserRepo::find_by_id(&self.pool, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        UserRepo::find_by_email(&self.pool, email).await
    }
}

#[derive(Default)]
struct Inner {
    next_id: DbId,
    users: BTreeMap<DbId, User>,
}

/// In-process [`UserStore`] enforcing the same unique-email rule.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, input: &NewUser) -> Result<Option<User>, sqlx::Error> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| u.email == input.email) {
            return Ok(None);
        }
        inner.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: inner.next_id,
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, sqlx::Error> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "ada".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        let first = store.create(&new_user("ada@example.com")).await.unwrap();
        assert!(first.is_some());
        assert!(store.create(&new_user("ada@example.com")).await.unwrap().is_none());
        assert!(store.create(&new_user("bob@example.com")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lookups_find_the_created_user() {
        let store = MemoryUserStore::new();
        let user = store
            .create(&new_user("ada@example.com"))
            .await
            .unwrap()
            .unwrap();

        let by_email = store.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().email, "ada@example.com");
        assert!(store.find_by_email("nobody@example.com").await.unwrap().is_none());
    }
}
