//! Per-user state: sessions, hidden and custom tokens, settings, notifications.

mod memory;
mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;

pub use memory::MemoryUserStore;
pub use postgres::PostgresUserStore;

use crate::{
    error::WalletError,
    models::{Chain, CustomToken, NewNotification, Notification, TokenKey, UserId, UserSettings},
};

/// Persistence collaborator keyed by the authenticated user.
///
/// Token addresses arrive already normalized; implementations keep set
/// semantics on (chain, address).
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolve a session token, `Unauthorized` when unknown.
    async fn authenticate(&self, session: &str) -> Result<UserId, WalletError>;

    async fn hidden_tokens(&self, user: &UserId) -> Result<HashSet<TokenKey>, WalletError>;

    async fn set_token_hidden(
        &self,
        user: &UserId,
        token: &TokenKey,
        hidden: bool,
    ) -> Result<(), WalletError>;

    /// Custom tokens on `chain`, or on every chain when `None`.
    async fn custom_tokens(
        &self,
        user: &UserId,
        chain: Option<Chain>,
    ) -> Result<Vec<CustomToken>, WalletError>;

    /// Insert or replace by (chain, address).
    async fn add_custom_tokens(
        &self,
        user: &UserId,
        tokens: &[CustomToken],
    ) -> Result<(), WalletError>;

    async fn settings(&self, user: &UserId) -> Result<UserSettings, WalletError>;

    async fn save_settings(&self, user: &UserId, settings: &UserSettings)
        -> Result<(), WalletError>;

    /// Newest first.
    async fn notifications(&self, user: &UserId) -> Result<Vec<Notification>, WalletError>;

    async fn add_notification(
        &self,
        user: &UserId,
        notification: NewNotification,
    ) -> Result<Notification, WalletError>;

    /// Mark the given notifications (all when `None`) as read; returns how many changed.
    async fn mark_notifications_read(
        &self,
        user: &UserId,
        ids: Option<&[i64]>,
    ) -> Result<u64, WalletError>;
}
