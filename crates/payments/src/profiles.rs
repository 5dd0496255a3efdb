//! Read-through cache of account display data.
//!
//! Notification payloads name counterparties ("Alice accepted your quote");
//! those reads happen after commit and tolerate 60 seconds of staleness.
//! Financial reads never come through here. Every account write path
//! invalidates the written account's entry.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::debug;

use toolbelt_core::{AccountId, AccountRole, Email};

use crate::models::Account;
use crate::store::{Store, StoreError};

const PROFILE_TTL: Duration = Duration::from_secs(60);
const PROFILE_CAPACITY: u64 = 1_000;

/// The displayable slice of an account.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub account_id: AccountId,
    pub display_name: String,
    pub email: Email,
    pub role: AccountRole,
}

impl From<&Account> for Profile {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            role: account.role,
        }
    }
}

/// Short-TTL read-through cache over account profiles.
#[derive(Clone)]
pub struct ProfileCache {
    store: Arc<dyn Store>,
    cache: Cache<AccountId, Profile>,
}

impl ProfileCache {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let cache = Cache::builder()
            .max_capacity(PROFILE_CAPACITY)
            .time_to_live(PROFILE_TTL)
            .build();

        Self { store, cache }
    }

    /// Fetch a profile, serving from cache when fresh.
    ///
    /// Missing accounts are not negatively cached; each lookup goes to the
    /// store until the account exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the fallback read fails.
    pub async fn get(&self, account_id: AccountId) -> Result<Option<Profile>, StoreError> {
        if let Some(profile) = self.cache.get(&account_id).await {
            debug!(%account_id, "profile cache hit");
            return Ok(Some(profile));
        }

        let Some(account) = self.store.get_account(account_id).await? else {
            return Ok(None);
        };

        let profile = Profile::from(&account);
        self.cache.insert(account_id, profile.clone()).await;
        Ok(Some(profile))
    }

    /// Drop the cached entry for an account after a write.
    pub async fn invalidate(&self, account_id: AccountId) {
        self.cache.invalidate(&account_id).await;
    }
}

#[cfg(test)]
mod tests {
    use toolbelt_core::Tier;

    use crate::store::memory::MemoryStore;

    use super::*;

    async fn seeded_store() -> (Arc<MemoryStore>, Account) {
        let store = Arc::new(MemoryStore::new());
        let account = Account::new(
            Email::parse("alice@example.com").unwrap(),
            "Alice",
            AccountRole::Tradesperson,
        );
        store.insert_account(&account).await.unwrap();
        (store, account)
    }

    async fn rename(store: &MemoryStore, account: &Account, name: &str) {
        let mut updated = account.clone();
        updated.display_name = name.to_owned();
        let mut tx = store.begin().await.unwrap();
        tx.update_account(&updated).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn serves_cached_profile_until_invalidated() {
        let (store, account) = seeded_store().await;
        let profiles = ProfileCache::new(store.clone());

        let first = profiles.get(account.id).await.unwrap().unwrap();
        assert_eq!(first.display_name, "Alice");

        // A store write the cache was not told about is invisible...
        rename(&store, &account, "Alicia").await;
        let stale = profiles.get(account.id).await.unwrap().unwrap();
        assert_eq!(stale.display_name, "Alice");

        // ...until the entry is invalidated.
        profiles.invalidate(account.id).await;
        let fresh = profiles.get(account.id).await.unwrap().unwrap();
        assert_eq!(fresh.display_name, "Alicia");
    }

    #[tokio::test]
    async fn missing_accounts_are_not_negatively_cached() {
        let store = Arc::new(MemoryStore::new());
        let profiles = ProfileCache::new(store.clone());
        let id = AccountId::generate();

        assert!(profiles.get(id).await.unwrap().is_none());

        // The account appears later; the next read must see it.
        let mut account = Account::new(
            Email::parse("late@example.com").unwrap(),
            "Late Larry",
            AccountRole::Tradesperson,
        );
        account.id = id;
        account.subscription.tier = Tier::Pro;
        store.insert_account(&account).await.unwrap();

        let found = profiles.get(id).await.unwrap().unwrap();
        assert_eq!(found.display_name, "Late Larry");
    }
}
