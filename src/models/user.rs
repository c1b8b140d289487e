use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Chain;

/// Authenticated user, resolved from a session token by the user store.
pub type UserId = String;

/// Per-user preferences that change what the wallet views return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserSettings {
    /// Drop zero-balance custom tokens from the wallet view
    pub hide_zero_balances: bool,
    /// Record a notification whenever the user broadcasts a transaction
    pub notifications_enabled: bool,
    pub default_chain: Option<Chain>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            hide_zero_balances: false,
            notifications_enabled: true,
            default_chain: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TransactionSubmitted,
    CustomTokenAdded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TransactionSubmitted => "transaction_submitted",
            NotificationKind::CustomTokenAdded => "custom_token_added",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction_submitted" => Some(NotificationKind::TransactionSubmitted),
            "custom_token_added" => Some(NotificationKind::CustomTokenAdded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub chain: Chain,
    pub message: String,
    pub tx_hash: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification as recorded, before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub chain: Chain,
    pub message: String,
    pub tx_hash: Option<String>,
}
