mod bitcoin;
mod chain;
mod swap;
mod token;
mod transaction;
mod user;

pub use bitcoin::{AddressStats, BitcoinBalance, ConfirmationStatus, TxConfirmation, Utxo};
pub use chain::{Chain, ChainFamily};
pub use swap::{AllowanceCheck, RouterSwapParams, SwapQuote, SwapRequest, SwapToken, SwapTransaction};
pub use token::{
    is_native_token, CustomToken, HistoricPrice, MarketToken, NativeBalance, TokenKey, WalletToken,
    NATIVE_TOKEN_ADDRESS, NATIVE_TOKEN_DECIMALS,
};
pub use transaction::{
    group_by_date, Direction, EvmCall, SubmittedTransaction, TransactionGroup, TxStatus,
    UnsignedTransaction, WalletTransaction,
};
pub use user::{NewNotification, Notification, NotificationKind, UserId, UserSettings};
