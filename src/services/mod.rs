//! Operations exposed to the HTTP layer, composed from adapters, caches and
//! the user store.

mod bitcoin;
mod swap;
mod wallet;

pub use bitcoin::BitcoinService;
pub use swap::{referrer_fee, SwapService};
pub use wallet::WalletService;
