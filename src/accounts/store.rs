use std::sync::Arc;

use tracing::debug;

use crate::kv::keys::{USER_PREFIX, decode_user_key, user_key};
use crate::kv::{self, KeyValueStore};

use super::error::Result;
use super::models::UserRecord;

/// User records persisted in the shared key-value store
#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(kv::load_record(self.store.as_ref(), &user_key(user_id)).await?)
    }

    pub async fn put_user(&self, user: &UserRecord) -> Result<()> {
        kv::save_record(self.store.as_ref(), &user_key(&user.user_id), user, None).await?;
        debug!(user_id = %user.user_id, accounts = user.accounts.len(), "Stored user record");
        Ok(())
    }

    /// Every known user id, found by prefix listing
    pub async fn list_user_ids(&self) -> Result<Vec<String>> {
        let keys = self.store.list(USER_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| decode_user_key(key))
            .map(str::to_owned)
            .collect())
    }
}
