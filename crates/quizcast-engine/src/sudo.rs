//! Sudo registry — the flat set of privileged user ids.
//!
//! Membership is the whole check; command-level authorization happens in the
//! router before the engine is reached.

use quizcast_core::error::Result;
use quizcast_core::traits::{collections, Store};
use quizcast_core::types::SudoUser;
use std::sync::Arc;

#[derive(Clone)]
pub struct SudoRegistry {
    store: Arc<dyn Store>,
    /// Configured root admin: always sudo, never revocable at runtime.
    root: Option<i64>,
}

impl SudoRegistry {
    pub fn new(store: Arc<dyn Store>, root: Option<i64>) -> Self {
        Self { store, root }
    }

    pub async fn grant(&self, user_id: i64, granted_by: i64) -> Result<SudoUser> {
        let user = SudoUser {
            user_id,
            granted_by,
            granted_at: chrono::Utc::now(),
        };
        self.store
            .put(collections::SUDO_USERS, &user_id.to_string(), crate::doc(&user))
            .await?;
        tracing::info!("🔑 sudo granted to user {user_id} by {granted_by}");
        Ok(user)
    }

    /// Revoking marks the record revoked rather than deleting it, keeping
    /// the grant trail. Returns false if the user was not sudo.
    pub async fn revoke(&self, user_id: i64) -> Result<bool> {
        let key = user_id.to_string();
        if self.store.get(collections::SUDO_USERS, &key).await?.is_none() {
            return Ok(false);
        }
        let apply = |cur: Option<serde_json::Value>| {
            let mut doc = cur.unwrap_or(serde_json::Value::Null);
            doc["revoked"] = serde_json::json!(true);
            doc
        };
        self.store
            .atomic_update(collections::SUDO_USERS, &key, &apply)
            .await?;
        tracing::info!("🔒 sudo revoked for user {user_id}");
        Ok(true)
    }

    pub async fn is_sudo(&self, user_id: i64) -> Result<bool> {
        if self.root == Some(user_id) {
            return Ok(true);
        }
        Ok(self
            .store
            .get(collections::SUDO_USERS, &user_id.to_string())
            .await?
            .is_some_and(|doc| !doc["revoked"].as_bool().unwrap_or(false)))
    }

    pub async fn list(&self) -> Result<Vec<SudoUser>> {
        let pred =
            |r: &serde_json::Value| !r["revoked"].as_bool().unwrap_or(false);
        let docs = self.store.list_where(collections::SUDO_USERS, &pred).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::memory_store;

    #[tokio::test]
    async fn test_root_is_always_sudo() {
        let sudo = SudoRegistry::new(memory_store(), Some(7));
        assert!(sudo.is_sudo(7).await.unwrap());
        assert!(!sudo.is_sudo(8).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_and_revoke() {
        let sudo = SudoRegistry::new(memory_store(), None);
        assert!(!sudo.is_sudo(42).await.unwrap());

        sudo.grant(42, 7).await.unwrap();
        assert!(sudo.is_sudo(42).await.unwrap());
        assert_eq!(sudo.list().await.unwrap().len(), 1);

        assert!(sudo.revoke(42).await.unwrap());
        assert!(!sudo.is_sudo(42).await.unwrap());
        assert!(sudo.list().await.unwrap().is_empty());

        assert!(!sudo.revoke(99).await.unwrap());
    }
}
