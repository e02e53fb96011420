use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewUser, Role, StoreError, User, UserStore};

/// Credential store held entirely in memory, used by the test suite. A
/// single mutex spans every read-modify-write, which gives the same
/// one-winner guarantee as the conditional updates in the Postgres store.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().expect("user store lock poisoned");
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: Role::User,
            is_verified: false,
            verification_token: Some(new.verification_token),
            reset_password_token: None,
            reset_password_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().expect("user store lock poisoned");
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().expect("user store lock poisoned");
        Ok(users.get(&id).cloned())
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().expect("user store lock poisoned");
        let user = users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token));
        Ok(user.map(|u| {
            u.is_verified = true;
            u.verification_token = None;
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let mut users = self.users.lock().expect("user store lock poisoned");
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("no user with id {id}")))?;
        user.reset_password_token = Some(token.to_string());
        user.reset_password_expires_at = Some(expires_at);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().expect("user store lock poisoned");
        let user = users.values_mut().find(|u| {
            u.reset_password_token.as_deref() == Some(token)
                && u.reset_password_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(user.map(|u| {
            u.password_hash = new_password_hash.to_string();
            u.reset_password_token = None;
            u.reset_password_expires_at = None;
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sample(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            verification_token: "tok-abc".into(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        store.create(sample("a@x.com")).await.expect("first create");
        let err = store.create(sample("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let store = InMemoryUserStore::new();
        store.create(sample("a@x.com")).await.expect("create");

        let first = store
            .consume_verification_token("tok-abc")
            .await
            .expect("consume");
        let user = first.expect("first consumption matches");
        assert!(user.is_verified);
        assert!(user.verification_token.is_none());

        let second = store
            .consume_verification_token("tok-abc")
            .await
            .expect("consume");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn concurrent_verification_has_one_winner() {
        let store = Arc::new(InMemoryUserStore::new());
        store.create(sample("a@x.com")).await.expect("create");

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.consume_verification_token("tok-abc").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.consume_verification_token("tok-abc").await })
        };
        let (a, b) = (
            a.await.expect("join").expect("store"),
            b.await.expect("join").expect("store"),
        );
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn expired_reset_token_does_not_match() {
        let store = InMemoryUserStore::new();
        let user = store.create(sample("a@x.com")).await.expect("create");
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        store
            .set_reset_token(user.id, "reset-tok", past)
            .await
            .expect("set token");

        let consumed = store
            .consume_reset_token("reset-tok", "new-hash", OffsetDateTime::now_utc())
            .await
            .expect("consume");
        assert!(consumed.is_none());

        // Token string still matches, only the expiry gate failed.
        let user = store.find_by_id(user.id).await.expect("find").unwrap();
        assert_eq!(user.reset_password_token.as_deref(), Some("reset-tok"));
    }

    #[tokio::test]
    async fn reset_token_consumption_replaces_hash_and_clears_state() {
        let store = InMemoryUserStore::new();
        let user = store.create(sample("a@x.com")).await.expect("create");
        let future = OffsetDateTime::now_utc() + time::Duration::minutes(15);
        store
            .set_reset_token(user.id, "reset-tok", future)
            .await
            .expect("set token");

        let consumed = store
            .consume_reset_token("reset-tok", "new-hash", OffsetDateTime::now_utc())
            .await
            .expect("consume")
            .expect("token matches");
        assert_eq!(consumed.password_hash, "new-hash");
        assert!(consumed.reset_password_token.is_none());
        assert!(consumed.reset_password_expires_at.is_none());
    }
}
