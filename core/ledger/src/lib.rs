// tally/core/ledger/src/lib.rs

// Re-export modules
pub mod balances;
pub mod changes;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod rate;
pub mod roles;
pub mod token;
pub mod voucher;

pub use balances::{AccountBalance, BalanceStore, Release, SessionId};
pub use changes::StateChanges;
pub use config::{ConfigError, LedgerConfig, LedgerParams, RateConfig, RoleGrant};
pub use error::{LedgerError, Result};
pub use events::{LedgerEvent, SettledEntry};
pub use ledger::{CallContext, Ledger, LedgerState, PayoutEntry};
pub use rate::{ExchangeRate, MAX_DECIMALS};
pub use roles::{AccessControl, Role};
pub use token::{BackingToken, FungibleToken, InMemoryToken, TokenError};
pub use voucher::{AuthorizedVoucher, Direction, VerifyContext, VoucherAuthenticator, VoucherPayload};

// Re-export primitives used throughout the public API
pub use tally_primitives::{Address, ChainId, Hash, Signature, U256};
