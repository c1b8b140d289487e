use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::UserStore;
use crate::{
    error::WalletError,
    models::{Chain, CustomToken, NewNotification, Notification, TokenKey, UserId, UserSettings},
};

#[derive(Default)]
struct UserState {
    hidden: HashSet<TokenKey>,
    custom: Vec<CustomToken>,
    settings: UserSettings,
    notifications: Vec<Notification>,
}

/// Process-local [`UserStore`], used without a database and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    sessions: RwLock<HashMap<String, UserId>>,
    users: RwLock<HashMap<UserId, UserState>>,
    next_notification_id: AtomicI64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: HashMap<String, UserId>) -> Self {
        Self {
            sessions: RwLock::new(sessions),
            ..Self::default()
        }
    }

    pub async fn add_session(&self, session: &str, user: &str) {
        self.sessions
            .write()
            .await
            .insert(session.to_string(), user.to_string());
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn authenticate(&self, session: &str) -> Result<UserId, WalletError> {
        self.sessions
            .read()
            .await
            .get(session)
            .cloned()
            .ok_or(WalletError::Unauthorized)
    }

    async fn hidden_tokens(&self, user: &UserId) -> Result<HashSet<TokenKey>, WalletError> {
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .map(|u| u.hidden.clone())
            .unwrap_or_default())
    }

    async fn set_token_hidden(
        &self,
        user: &UserId,
        token: &TokenKey,
        hidden: bool,
    ) -> Result<(), WalletError> {
        let mut users = self.users.write().await;
        let state = users.entry(user.clone()).or_default();
        if hidden {
            state.hidden.insert(token.clone());
        } else {
            state.hidden.remove(token);
        }
        Ok(())
    }

    async fn custom_tokens(
        &self,
        user: &UserId,
        chain: Option<Chain>,
    ) -> Result<Vec<CustomToken>, WalletError> {
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .map(|u| {
                u.custom
                    .iter()
                    .filter(|t| chain.map_or(true, |c| t.chain == c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_custom_tokens(
        &self,
        user: &UserId,
        tokens: &[CustomToken],
    ) -> Result<(), WalletError> {
        let mut users = self.users.write().await;
        let state = users.entry(user.clone()).or_default();
        for token in tokens {
            let key = token.key();
            match state.custom.iter_mut().find(|t| t.key() == key) {
                Some(existing) => *existing = token.clone(),
                None => state.custom.push(token.clone()),
            }
        }
        Ok(())
    }

    async fn settings(&self, user: &UserId) -> Result<UserSettings, WalletError> {
        Ok(self
            .users
            .read()
            .await
            .get(user)
            .map(|u| u.settings.clone())
            .unwrap_or_default())
    }

    async fn save_settings(
        &self,
        user: &UserId,
        settings: &UserSettings,
    ) -> Result<(), WalletError> {
        self.users
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .settings = settings.clone();
        Ok(())
    }

    async fn notifications(&self, user: &UserId) -> Result<Vec<Notification>, WalletError> {
        let mut list = self
            .users
            .read()
            .await
            .get(user)
            .map(|u| u.notifications.clone())
            .unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn add_notification(
        &self,
        user: &UserId,
        notification: NewNotification,
    ) -> Result<Notification, WalletError> {
        let record = Notification {
            id: self.next_notification_id.fetch_add(1, Ordering::Relaxed) + 1,
            kind: notification.kind,
            chain: notification.chain,
            message: notification.message,
            tx_hash: notification.tx_hash,
            read: false,
            created_at: Utc::now(),
        };
        self.users
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .notifications
            .push(record.clone());
        Ok(record)
    }

    async fn mark_notifications_read(
        &self,
        user: &UserId,
        ids: Option<&[i64]>,
    ) -> Result<u64, WalletError> {
        let mut users = self.users.write().await;
        let Some(state) = users.get_mut(user) else {
            return Ok(0);
        };
        let mut changed = 0;
        for n in state.notifications.iter_mut() {
            if !n.read && ids.map_or(true, |ids| ids.contains(&n.id)) {
                n.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    fn user() -> UserId {
        "alice".to_string()
    }

    fn token(address: &str) -> CustomToken {
        CustomToken {
            chain: Chain::Ethereum,
            address: address.to_string(),
            symbol: "TKN".to_string(),
            decimals: 18,
        }
    }

    #[tokio::test]
    async fn test_unknown_session_is_unauthorized() {
        let store = MemoryUserStore::new();
        store.add_session("s3cret", "alice").await;

        assert_eq!(store.authenticate("s3cret").await.unwrap(), "alice");
        assert_eq!(
            store.authenticate("nope").await.unwrap_err(),
            WalletError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_custom_tokens_have_set_semantics() {
        let store = MemoryUserStore::new();
        let a = "0x1111111111111111111111111111111111111111";
        store.add_custom_tokens(&user(), &[token(a)]).await.unwrap();
        let mut renamed = token(a);
        renamed.symbol = "NEW".to_string();
        store.add_custom_tokens(&user(), &[renamed]).await.unwrap();

        let tokens = store.custom_tokens(&user(), Some(Chain::Ethereum)).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, "NEW");
        assert!(store
            .custom_tokens(&user(), Some(Chain::Bsc))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_hide_and_unhide() {
        let store = MemoryUserStore::new();
        let key = TokenKey::new(Chain::Bsc, "0x1111111111111111111111111111111111111111");

        store.set_token_hidden(&user(), &key, true).await.unwrap();
        store.set_token_hidden(&user(), &key, true).await.unwrap();
        assert_eq!(store.hidden_tokens(&user()).await.unwrap().len(), 1);

        store.set_token_hidden(&user(), &key, false).await.unwrap();
        assert!(store.hidden_tokens(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_selected_notifications_read() {
        let store = MemoryUserStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let n = store
                .add_notification(
                    &user(),
                    NewNotification {
                        kind: NotificationKind::TransactionSubmitted,
                        chain: Chain::Ethereum,
                        message: format!("tx {}", i),
                        tx_hash: None,
                    },
                )
                .await
                .unwrap();
            ids.push(n.id);
        }

        assert_eq!(store.mark_notifications_read(&user(), Some(&ids[..1])).await.unwrap(), 1);
        assert_eq!(store.mark_notifications_read(&user(), None).await.unwrap(), 2);

        let list = store.notifications(&user()).await.unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|n| n.read));
        assert_eq!(list[0].id, ids[2]);
    }
}
